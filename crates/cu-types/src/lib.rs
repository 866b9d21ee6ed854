//! CU Types - Core types for the control-unit fleet
//!
//! The control-unit manager spreads the rooms known to the catalog across a
//! pool of controller containers. This crate holds the vocabulary shared by
//! the manager and anything that talks to it.
//!
//! ## Key Concepts
//!
//! - **RoomId**: The unit of work handed out to controllers
//! - **ControllerName**: Deterministic name derived from a controller's rooms
//! - **ControllerAssignment**: A controller and the rooms it currently serves
//! - **CatalogResponse**: The `{success, content}` envelope spoken by the catalog
//!   and by the controllers themselves
//! - **ServiceDescriptor**: What gets published to the catalog for discovery
//! - **Events**: Fleet lifecycle stream for observability

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod assignment;
pub mod catalog;
pub mod controller;
pub mod events;
pub mod ids;

// Re-export main types
pub use assignment::ControllerAssignment;
pub use catalog::{CatalogResponse, EndpointSpec, RoomRecord, ServiceDescriptor};
pub use controller::{RoomsListing, RoomsRequest};
pub use events::{EventSeverity, FleetEvent, FleetEventEnvelope};
pub use ids::{ControllerName, RoomId};
