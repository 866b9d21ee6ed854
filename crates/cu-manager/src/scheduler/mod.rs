//! Reconciler, controller lifecycle and startup recovery

mod lifecycle;
mod reconciler;
mod recovery;
mod template;

pub use reconciler::{
    Collaborators, PassReport, Reconciler, ReconcilerSettings, UpdateOutcome,
};
pub use recovery::RecoveryReport;
pub use template::ControllerTemplate;
