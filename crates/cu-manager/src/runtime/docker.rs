//! Container runtime backed by the `docker` command line client

use super::traits::{ContainerInfo, ContainerRuntime, ContainerSpec, ContainerStatus};
use crate::error::{RuntimeError, RuntimeResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Drives containers through the docker CLI.
///
/// Every invocation runs under a timeout so a wedged daemon cannot stall the
/// reconcile loop.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    timeout: Duration,
    stop_timeout_secs: u64,
}

impl DockerCli {
    pub fn new(timeout: Duration, stop_timeout_secs: u64) -> Self {
        Self {
            binary: "docker".to_string(),
            timeout,
            stop_timeout_secs,
        }
    }

    /// Use a different client binary (e.g. `podman`)
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn exec(&self, args: &[String], target: &str) -> RuntimeResult<String> {
        let command = args.first().cloned().unwrap_or_default();
        debug!(binary = %self.binary, ?args, "Running container command");

        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| RuntimeError::Timeout {
                command: command.clone(),
                timeout: self.timeout,
            })?
            .map_err(RuntimeError::Spawn)?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(classify_failure(command, stderr, target))
        }
    }

    async fn inspect(&self, name: &str) -> RuntimeResult<Vec<ContainerInfo>> {
        let args = [
            "inspect".to_string(),
            "--type".to_string(),
            "container".to_string(),
            name.to_string(),
        ];
        let stdout = self.exec(&args, name).await?;
        parse_inspect(&stdout)
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), 10)
    }
}

fn classify_failure(command: String, stderr: String, target: &str) -> RuntimeError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("no such container") || lower.contains("no such object") {
        RuntimeError::NotFound(target.to_string())
    } else if lower.contains("conflict") && lower.contains("already in use") {
        RuntimeError::Conflict(target.to_string())
    } else {
        RuntimeError::CommandFailed { command, stderr }
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    #[instrument(skip(self))]
    async fn list(&self) -> RuntimeResult<Vec<ContainerInfo>> {
        let args = [
            "ps".to_string(),
            "--format".to_string(),
            "{{.Names}}".to_string(),
        ];
        let stdout = self.exec(&args, "").await?;
        // Containers can vanish between `ps` and `inspect`
        let mut found = Vec::new();
        for name in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(info) = self.get(name).await? {
                found.push(info);
            }
        }
        Ok(found)
    }

    async fn get(&self, name: &str) -> RuntimeResult<Option<ContainerInfo>> {
        match self.inspect(name).await {
            Ok(mut found) => Ok(found.pop()),
            Err(RuntimeError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, spec), fields(container = %spec.name))]
    async fn create(&self, spec: &ContainerSpec) -> RuntimeResult<()> {
        self.exec(&create_args(spec), &spec.name).await.map(|_| ())
    }

    async fn start(&self, name: &str) -> RuntimeResult<()> {
        self.exec(&["start".to_string(), name.to_string()], name)
            .await
            .map(|_| ())
    }

    async fn stop(&self, name: &str) -> RuntimeResult<()> {
        let args = [
            "stop".to_string(),
            "-t".to_string(),
            self.stop_timeout_secs.to_string(),
            name.to_string(),
        ];
        self.exec(&args, name).await.map(|_| ())
    }

    async fn remove(&self, name: &str) -> RuntimeResult<()> {
        self.exec(&["rm".to_string(), name.to_string()], name)
            .await
            .map(|_| ())
    }
}

/// Arguments of `docker create` for `spec`. The image comes last.
fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "create".to_string(),
        "--name".to_string(),
        spec.name.clone(),
        "--network".to_string(),
        spec.network.clone(),
    ];
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    for port in &spec.ports {
        args.push("-p".to_string());
        args.push(format!("{}:{}/tcp", port.host_port, port.container_port));
    }
    args.push(spec.image.clone());
    args
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectEntry {
    name: String,
    #[serde(default)]
    state: InspectState,
    #[serde(default)]
    network_settings: InspectNetwork,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    #[serde(default)]
    status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectNetwork {
    #[serde(default)]
    ports: Option<BTreeMap<String, Option<Vec<InspectBinding>>>>,
    #[serde(rename = "IPAddress", default)]
    ip_address: Option<String>,
    #[serde(default)]
    networks: Option<BTreeMap<String, InspectEndpoint>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectBinding {
    #[serde(default)]
    host_port: String,
}

#[derive(Debug, Deserialize)]
struct InspectEndpoint {
    #[serde(rename = "IPAddress", default)]
    ip_address: Option<String>,
}

/// Parse `docker inspect` output into [`ContainerInfo`] values
pub(crate) fn parse_inspect(raw: &str) -> RuntimeResult<Vec<ContainerInfo>> {
    let entries: Vec<InspectEntry> =
        serde_json::from_str(raw).map_err(|e| RuntimeError::Parse(e.to_string()))?;

    Ok(entries
        .into_iter()
        .map(|entry| {
            let mut host_ports: Vec<u16> = entry
                .network_settings
                .ports
                .unwrap_or_default()
                .into_values()
                .flatten()
                .flatten()
                .filter_map(|b| b.host_port.parse().ok())
                .collect();
            // IPv4 and IPv6 bindings repeat the same host port
            host_ports.dedup();

            let ip_address = entry
                .network_settings
                .networks
                .unwrap_or_default()
                .into_values()
                .filter_map(|n| n.ip_address)
                .chain(entry.network_settings.ip_address)
                .find(|ip| !ip.is_empty());

            ContainerInfo {
                name: entry.name.trim_start_matches('/').to_string(),
                status: ContainerStatus::parse(&entry.state.status),
                host_ports,
                ip_address,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::PortMapping;

    const INSPECT: &str = r#"[
      {
        "Name": "/controller_1_2",
        "State": {"Status": "running", "Running": true},
        "NetworkSettings": {
          "IPAddress": "",
          "Ports": {
            "7090/tcp": [
              {"HostIp": "0.0.0.0", "HostPort": "7090"},
              {"HostIp": "::", "HostPort": "7090"}
            ],
            "9000/tcp": null
          },
          "Networks": {
            "smart_care_network": {"IPAddress": "172.18.0.3"}
          }
        }
      },
      {
        "Name": "/catalog",
        "State": {"Status": "exited"},
        "NetworkSettings": {"Ports": {}, "Networks": {}}
      }
    ]"#;

    #[test]
    fn test_parse_inspect() {
        let parsed = parse_inspect(INSPECT).unwrap();
        assert_eq!(parsed.len(), 2);

        let c = &parsed[0];
        assert_eq!(c.name, "controller_1_2");
        assert!(c.status.is_running());
        assert_eq!(c.host_ports, vec![7090]);
        assert_eq!(c.ip_address.as_deref(), Some("172.18.0.3"));

        let other = &parsed[1];
        assert_eq!(other.status, ContainerStatus::Exited);
        assert!(other.host_ports.is_empty());
        assert!(other.ip_address.is_none());
    }

    #[test]
    fn test_parse_inspect_rejects_garbage() {
        assert!(matches!(parse_inspect("not json"), Err(RuntimeError::Parse(_))));
    }

    #[test]
    fn test_create_args_layout() {
        let mut env = BTreeMap::new();
        env.insert("CU_PORT".to_string(), "7090".to_string());
        env.insert("ROOM_IDS".to_string(), "1,2".to_string());
        let spec = ContainerSpec {
            image: "controller_image".into(),
            name: "controller_1_2".into(),
            network: "smart_care_network".into(),
            env,
            ports: vec![PortMapping::same(7090)],
        };

        let args = create_args(&spec);
        assert_eq!(
            args,
            vec![
                "create",
                "--name",
                "controller_1_2",
                "--network",
                "smart_care_network",
                "-e",
                "CU_PORT=7090",
                "-e",
                "ROOM_IDS=1,2",
                "-p",
                "7090:7090/tcp",
                "controller_image",
            ]
        );
    }

    #[test]
    fn test_missing_container_is_not_found() {
        let err = classify_failure(
            "inspect".into(),
            "Error: No such object: controller_9".into(),
            "controller_9",
        );
        assert!(matches!(err, RuntimeError::NotFound(name) if name == "controller_9"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let cli = DockerCli::new(Duration::from_secs(5), 1).with_binary("definitely-not-docker-cli");
        let err = cli.list().await.unwrap_err();
        assert!(matches!(err, RuntimeError::Spawn(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_skips_containers_gone_before_inspect() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("docker");
        std::fs::write(
            &script,
            r#"#!/bin/sh
case "$1" in
  ps) printf 'controller_1_2\ngone\n' ;;
  inspect)
    for last; do :; done
    if [ "$last" = "gone" ]; then
      echo "Error: No such object: gone" >&2
      exit 1
    fi
    echo '[{"Name": "/controller_1_2", "State": {"Status": "running"}, "NetworkSettings": {"Ports": {"7090/tcp": [{"HostPort": "7090"}]}}}]'
    ;;
esac
"#,
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cli = DockerCli::new(Duration::from_secs(5), 1).with_binary(script.to_string_lossy());
        let listed = cli.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "controller_1_2");
        assert_eq!(listed[0].host_ports, vec![7090]);
        assert_eq!(cli.get("gone").await.unwrap(), None);
    }
}
