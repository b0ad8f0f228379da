//! JSON UI protocol for webview-style embedders.
//!
//! Semantically the same messages as the binary protocol, discriminated by a
//! `_msg_id` field holding a string topic name.

use serde::Serialize;

use crate::track::{RadarPlane, RadarTrack, SimStatus, SystemState, UserPlane, UserTrack};
use crate::wire::DecodeError;

/// Outbound message for a webview host, tagged with `_msg_id`.
#[derive(Debug, Serialize)]
#[serde(tag = "_msg_id")]
pub enum UiMessage<'a> {
    #[serde(rename = "FLT_ADD")]
    FlightAdd(&'a RadarPlane),
    #[serde(rename = "FLT_REMOVE")]
    FlightRemove { id: u32 },
    #[serde(rename = "FLT_UPDATE")]
    FlightUpdate(&'a RadarTrack),
    #[serde(rename = "UAC_ADD")]
    UserAdd(&'a UserPlane),
    #[serde(rename = "UAC_REMOVE")]
    UserRemove,
    #[serde(rename = "UAC_UPDATE")]
    UserUpdate(&'a UserTrack),
    #[serde(rename = "SRV_STATE")]
    ServerState(ServerStateBody),
    #[serde(rename = "SRV_RESYNC")]
    Resync(ResyncBody<'a>),
}

impl UiMessage<'_> {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// `SRV_STATE` payload: `simStatus` 1 (disconnected) or 2 (connected, with
/// `simName`), `srvStatus` 1 (stopped) / 2 (running) / 3 (device connected).
#[derive(Debug, Serialize)]
pub struct ServerStateBody {
    #[serde(rename = "simStatus")]
    pub sim_status: u8,
    #[serde(rename = "simName", skip_serializing_if = "Option::is_none")]
    pub sim_name: Option<String>,
    #[serde(rename = "srvStatus")]
    pub srv_status: u8,
}

impl From<&SystemState> for ServerStateBody {
    fn from(state: &SystemState) -> Self {
        let (sim_status, sim_name) = match &state.sim {
            SimStatus::Disconnected => (1, None),
            SimStatus::Connected { name } => (2, Some(name.clone())),
        };
        Self {
            sim_status,
            sim_name,
            srv_status: state.srv.as_code(),
        }
    }
}

/// `SRV_RESYNC` payload: the paired snapshot.
#[derive(Debug, Serialize)]
pub struct ResyncBody<'a> {
    pub radar: &'a [RadarPlane],
    pub user: Option<&'a UserPlane>,
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A request parsed from a webview message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiRequest {
    Resync,
    RequestState,
    Modify {
        sim_connection: Option<bool>,
        server_open: Option<bool>,
    },
    Props {
        reconnect_to_sim: Option<bool>,
    },
}

/// Parse an inbound webview message by its `_msg_id`.
pub fn parse_ui_request(text: &str) -> Result<UiRequest, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|_| DecodeError::Malformed)?;
    let id = value["_msg_id"].as_str().ok_or(DecodeError::Malformed)?;

    match id {
        "SRV_RESYNC" => Ok(UiRequest::Resync),
        "ALL_RQST_STATE" => Ok(UiRequest::RequestState),
        "SRV_MODIFY" => Ok(UiRequest::Modify {
            sim_connection: value["simConnection"].as_bool(),
            server_open: value["serverOpen"].as_bool(),
        }),
        "SRV_PROPS" => Ok(UiRequest::Props {
            reconnect_to_sim: value["reconnectToSim"].as_bool(),
        }),
        other => Err(DecodeError::UnknownMessage(other.to_owned())),
    }
}
