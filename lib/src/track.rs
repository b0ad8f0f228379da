//! Aircraft track payloads shared by the binary and JSON UI protocols.

use serde::{Deserialize, Serialize};

/// One position sample of a radar (AI traffic) aircraft.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarTrack {
    pub id: u32,
    pub longitude: f64,
    pub latitude: f64,
    /// True heading, degrees.
    pub heading: f64,
    /// True altitude, feet.
    pub altitude: i32,
    /// Altitude above ground, feet.
    pub ground_altitude: i32,
    /// Indicated airspeed, knots.
    pub indicated_speed: i32,
    /// Ground speed, knots.
    pub ground_speed: i32,
    /// Vertical speed, feet per second.
    pub vertical_speed: i32,
}

/// Radar aircraft with identity, as carried by add and resync messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarPlane {
    #[serde(flatten)]
    pub track: RadarTrack,
    #[serde(rename = "planeModel")]
    pub model: String,
    pub callsign: String,
}

/// One position sample of the user aircraft.
///
/// `heading`/`altitude` are the cockpit values (gyro heading, indicated
/// altitude); `real_heading`/`real_altitude` are the true ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTrack {
    pub longitude: f64,
    pub latitude: f64,
    pub heading: f64,
    pub altitude: i32,
    pub ground_altitude: i32,
    pub indicated_speed: i32,
    pub ground_speed: i32,
    pub vertical_speed: i32,
    pub real_altitude: i32,
    pub real_heading: f64,
}

/// User aircraft with identity, as carried by add and resync messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPlane {
    #[serde(flatten)]
    pub track: UserTrack,
    #[serde(rename = "planeModel")]
    pub model: String,
    pub callsign: String,
}

/// Simulator link side of the system state.
#[derive(Debug, Clone, PartialEq)]
pub enum SimStatus {
    Disconnected,
    Connected { name: String },
}

/// Device server side of the system state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrvStatus {
    Stopped,
    Running,
    DeviceConnected,
}

impl SrvStatus {
    pub fn as_code(self) -> u8 {
        match self {
            Self::Stopped => 1,
            Self::Running => 2,
            Self::DeviceConnected => 3,
        }
    }
}

/// Combined system state announced to UIs on every transition.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemState {
    pub sim: SimStatus,
    pub srv: SrvStatus,
}
