//! Aircraft trackers fed by simulator telemetry.

pub mod radar;
pub mod user;

use airlink::{RadarPlane, RadarTrack, UserPlane, UserTrack};

/// Events emitted by the trackers toward the UI bridge.
pub trait TrafficSink {
    fn radar_add(&mut self, plane: &RadarPlane);
    fn radar_update(&mut self, track: &RadarTrack);
    fn radar_remove(&mut self, id: u32);
    fn radar_resync(&mut self, planes: Vec<RadarPlane>);
    fn user_add(&mut self, plane: &UserPlane);
    fn user_update(&mut self, track: &UserTrack);
    fn user_remove(&mut self);
    fn user_resync(&mut self, plane: &UserPlane);
}

/// Samples parked at origin-near coordinates with low altitude are loading
/// artifacts, not positions.
pub(crate) fn in_loading_limbo(longitude: f64, latitude: f64, altitude: i32) -> bool {
    longitude < 1.0 && longitude > -1.0 && latitude < 1.0 && latitude > -1.0 && altitude < 1000
}
