//! Request and response bodies of the controller's own HTTP API

use crate::{CatalogResponse, RoomId};
use serde::{Deserialize, Serialize};

/// Body of `POST /rooms`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomsRequest {
    pub rooms: Vec<RoomId>,
}

/// Answer of `GET /rooms`.
///
/// Controllers answer with the standard envelope, older builds with a bare array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RoomsListing {
    Bare(Vec<RoomId>),
    Envelope(CatalogResponse<Vec<RoomId>>),
}

impl RoomsListing {
    /// The rooms served, or `None` if the controller reported failure
    pub fn into_rooms(self) -> Option<Vec<RoomId>> {
        match self {
            RoomsListing::Bare(rooms) => Some(rooms),
            RoomsListing::Envelope(resp) if resp.success => Some(resp.content.unwrap_or_default()),
            RoomsListing::Envelope(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_accepts_envelope_and_bare() {
        let env: RoomsListing =
            serde_json::from_str(r#"{"success": true, "status": 200, "content": [3, 4]}"#).unwrap();
        assert_eq!(env.into_rooms(), Some(vec![RoomId::new(3), RoomId::new(4)]));

        let bare: RoomsListing = serde_json::from_str("[5]").unwrap();
        assert_eq!(bare.into_rooms(), Some(vec![RoomId::new(5)]));
    }

    #[test]
    fn test_listing_failure_is_none() {
        let env: RoomsListing =
            serde_json::from_str(r#"{"success": false, "message": "boom"}"#).unwrap();
        assert_eq!(env.into_rooms(), None);
    }
}
