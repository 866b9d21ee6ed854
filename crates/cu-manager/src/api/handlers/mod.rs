//! API request handlers

mod controllers;
mod events;
mod health;

pub use controllers::*;
pub use events::*;
pub use health::*;
