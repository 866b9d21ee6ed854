//! Startup recovery against fake collaborators

mod common;

use common::{assignment, Fleet};
use cu_manager::runtime::{ContainerInfo, ContainerStatus, RuntimeCall};
use cu_manager::state::{FileStateBackend, InMemoryStateBackend, StateBackend};
use cu_types::FleetEvent;
use std::sync::Arc;

fn container(name: &str, status: ContainerStatus, port: Option<u16>) -> ContainerInfo {
    ContainerInfo {
        name: name.to_string(),
        status,
        host_ports: port.into_iter().collect(),
        ip_address: Some("10.0.0.9".to_string()),
    }
}

#[tokio::test]
async fn test_adopts_running_controllers_without_state_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("controller_manager_state.json");
    let fleet = Fleet::with_backend(Arc::new(FileStateBackend::new(&path)));

    fleet
        .runtime
        .insert(container("controller_1_2", ContainerStatus::Running, Some(7090)))
        .await;
    fleet
        .runtime
        .insert(container("mosquitto", ContainerStatus::Running, Some(1883)))
        .await;
    fleet.controllers.serve("controller_1_2", &[1, 2]);

    let mut reconciler = fleet.reconciler().await;
    let mut events = reconciler.subscribe();
    let report = reconciler.recover().await;

    assert_eq!(report.adopted, 1);
    assert_eq!(report.unreachable, 0);
    assert_eq!(
        reconciler.state().assignments(),
        &[assignment("controller_1_2", &[1, 2])]
    );
    assert_eq!(fleet.registry.entries()["controller_1_2"], 7090);

    // The rebuilt state is on disk
    let saved = FileStateBackend::new(&path).load().await.unwrap();
    assert_eq!(saved, Some(vec![assignment("controller_1_2", &[1, 2])]));

    let event = events.try_recv().unwrap();
    assert!(matches!(event.event, FleetEvent::ControllerRecovered { .. }));
}

#[tokio::test]
async fn test_stopped_controller_is_started() {
    let backend = InMemoryStateBackend::with_state(vec![assignment("controller_1_2", &[1, 2])]);
    let fleet = Fleet::with_backend(Arc::new(backend));
    fleet
        .runtime
        .insert(container("controller_1_2", ContainerStatus::Exited, Some(7090)))
        .await;
    fleet.controllers.serve("controller_1_2", &[1, 2]);

    let mut reconciler = fleet.reconciler().await;
    let report = reconciler.recover().await;

    assert_eq!(report.started, 1);
    assert_eq!(report.recreated, 0);
    assert_eq!(report.adopted, 1);
    assert_eq!(
        fleet.runtime.calls().await,
        vec![RuntimeCall::Start("controller_1_2".to_string())]
    );
    assert_eq!(
        reconciler.state().assignments(),
        &[assignment("controller_1_2", &[1, 2])]
    );
}

#[tokio::test]
async fn test_missing_controllers_are_recreated_in_place() {
    let backend = InMemoryStateBackend::with_state(vec![
        assignment("controller_1_2", &[1, 2]),
        assignment("controller_3", &[3]),
    ]);
    let fleet = Fleet::with_backend(Arc::new(backend));

    let mut reconciler = fleet.reconciler().await;
    let report = reconciler.recover().await;

    assert_eq!(report.recreated, 2);
    assert_eq!(report.adopted, 2);
    assert_eq!(
        reconciler.state().assignments(),
        &[
            assignment("controller_1_2", &[1, 2]),
            assignment("controller_3", &[3]),
        ]
    );
    assert_eq!(fleet.port_of("controller_1_2").await, Some(7090));
    assert_eq!(fleet.port_of("controller_3").await, Some(7091));
    assert_eq!(fleet.registry.entries().len(), 2);
}

#[tokio::test]
async fn test_live_rooms_override_saved_rooms() {
    let backend = InMemoryStateBackend::with_state(vec![assignment("controller_1_2", &[1, 2])]);
    let fleet = Fleet::with_backend(Arc::new(backend));
    fleet
        .runtime
        .insert(container("controller_1_2", ContainerStatus::Running, Some(7090)))
        .await;
    fleet.controllers.serve("controller_1_2", &[1, 2, 7]);

    let mut reconciler = fleet.reconciler().await;
    reconciler.recover().await;

    assert_eq!(
        reconciler.state().assignments(),
        &[assignment("controller_1_2", &[1, 2, 7])]
    );
    assert!(fleet.runtime.calls().await.is_empty());
}

#[tokio::test]
async fn test_unreachable_controller_is_not_adopted() {
    let fleet = Fleet::new();
    fleet
        .runtime
        .insert(container("controller_9", ContainerStatus::Running, None))
        .await;

    let mut reconciler = fleet.reconciler().await;
    let report = reconciler.recover().await;

    assert_eq!(report.unreachable, 1);
    assert_eq!(report.adopted, 0);
    assert!(reconciler.state().is_empty());
    assert!(fleet.registry.entries().is_empty());
}

#[tokio::test]
async fn test_saved_controller_without_rooms_is_dropped() {
    let backend = InMemoryStateBackend::with_state(vec![
        assignment("controller_5", &[]),
        assignment("controller_1", &[1]),
    ]);
    let fleet = Fleet::with_backend(Arc::new(backend));
    fleet
        .runtime
        .insert(container("controller_1", ContainerStatus::Running, Some(7090)))
        .await;
    fleet.controllers.serve("controller_1", &[1]);

    let mut reconciler = fleet.reconciler().await;
    reconciler.recover().await;

    assert_eq!(
        reconciler.state().assignments(),
        &[assignment("controller_1", &[1])]
    );
    assert_eq!(
        fleet.backend.load().await.unwrap(),
        Some(vec![assignment("controller_1", &[1])])
    );
}

#[tokio::test]
async fn test_recovered_fleet_needs_no_changes() {
    let backend = InMemoryStateBackend::with_state(vec![assignment("controller_1_2", &[1, 2])]);
    let fleet = Fleet::with_backend(Arc::new(backend));
    fleet
        .runtime
        .insert(container("controller_1_2", ContainerStatus::Running, Some(7090)))
        .await;
    fleet.controllers.serve("controller_1_2", &[1, 2]);
    fleet.catalog.set(&[1, 2]);

    let mut reconciler = fleet.reconciler().await;
    reconciler.recover().await;
    let report = reconciler.reconcile_once().await.unwrap();

    assert!(report.is_noop());
    assert!(fleet.runtime.calls().await.is_empty());
}
