//! JSON file state backend
//!
//! The file holds a single object mapping controller names to room id lists,
//! e.g. `{"controller_1_2": [1, 2], "controller_5": [5]}`. Key order is the
//! controller order and is preserved across saves.

use super::traits::StateBackend;
use crate::error::{StateError, StateResult};
use async_trait::async_trait;
use cu_types::{ControllerAssignment, ControllerName, RoomId};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Persists assignments to a JSON file, rewriting it atomically on every save
#[derive(Debug, Clone)]
pub struct FileStateBackend {
    path: PathBuf,
}

impl FileStateBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StateError {
        StateError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn decode(raw: &str) -> StateResult<Vec<ControllerAssignment>> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Object(map) = value else {
        return Err(StateError::Corrupt("top level is not an object".to_string()));
    };

    map.into_iter()
        .map(|(name, rooms)| {
            let rooms: Vec<RoomId> = serde_json::from_value(rooms).map_err(|e| {
                StateError::Corrupt(format!("rooms of {} are not a list of ids: {}", name, e))
            })?;
            Ok(ControllerAssignment::new(ControllerName::new(name), rooms))
        })
        .collect()
}

fn encode(assignments: &[ControllerAssignment]) -> StateResult<String> {
    let mut map = Map::with_capacity(assignments.len());
    for a in assignments {
        map.insert(a.name.to_string(), serde_json::to_value(&a.rooms)?);
    }
    Ok(serde_json::to_string_pretty(&Value::Object(map))?)
}

#[async_trait]
impl StateBackend for FileStateBackend {
    async fn load(&self) -> StateResult<Option<Vec<ControllerAssignment>>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        decode(&raw).map(Some)
    }

    async fn save(&self, assignments: &[ControllerAssignment]) -> StateResult<()> {
        let body = encode(assignments)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, body).await.map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        debug!(path = %self.path.display(), controllers = assignments.len(), "State saved to file");
        Ok(())
    }
}
