//! Controller room assignments

use crate::{ControllerName, RoomId};
use serde::{Deserialize, Serialize};

/// A controller together with the rooms it serves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerAssignment {
    /// Container / registration name
    pub name: ControllerName,

    /// Rooms in the order they were assigned
    pub rooms: Vec<RoomId>,
}

impl ControllerAssignment {
    pub fn new(name: ControllerName, rooms: Vec<RoomId>) -> Self {
        Self { name, rooms }
    }

    /// Whether this controller serves exactly `rooms`, ignoring order
    pub fn serves_exactly(&self, rooms: &[RoomId]) -> bool {
        let mut mine = self.rooms.clone();
        let mut theirs = rooms.to_vec();
        mine.sort_unstable();
        theirs.sort_unstable();
        mine == theirs
    }
}
