//! JSON text frames exchanged with the venue-search backend.

use crate::domain::correlation::CorrelationId;
use crate::domain::error::ChannelError;
use crate::domain::query::{Spot, SpotQuery};
use serde::{Deserialize, Serialize};

/// Outbound message.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage<'a> {
    #[serde(rename = "getSpotsNearby")]
    GetSpotsNearby {
        #[serde(rename = "requestId")]
        request_id: CorrelationId,
        #[serde(flatten)]
        query: &'a SpotQuery,
    },
}

impl<'a> ClientMessage<'a> {
    pub fn spots_nearby(request_id: CorrelationId, query: &'a SpotQuery) -> Self {
        ClientMessage::GetSpotsNearby { request_id, query }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Inbound message. Types owned by other collaborators land in `Other`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "spotsNearbyResponse", rename_all = "camelCase")]
    SpotsNearbyResponse {
        request_id: String,
        #[serde(default)]
        spots: Option<Vec<Spot>>,
        #[serde(default)]
        error: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// Outcome carried by a `spotsNearbyResponse`. A non-empty error field wins
/// over spots; an empty one counts as absent.
pub fn response_outcome(
    spots: Option<Vec<Spot>>,
    error: Option<String>,
) -> Result<Vec<Spot>, ChannelError> {
    match error.filter(|message| !message.is_empty()) {
        Some(message) => Err(ChannelError::RemoteQuery(message)),
        None => Ok(spots.unwrap_or_default()),
    }
}
