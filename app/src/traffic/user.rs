//! User aircraft tracker.
//!
//! Singleton counterpart of the radar: the radar hands over whichever object
//! identifies as user-controlled, and this tracker follows it with its own
//! richer schema (gyro heading, indicated altitude).

use tracing::{debug, info, warn};

use airlink::{UserPlane, UserTrack};

use super::{TrafficSink, in_loading_limbo};
use crate::rt::ReqTarget;
use crate::sim::decode::{Reader, Truncated};
use crate::sim::link::SimLink;
use crate::sim::{
    DataModel, OBJECT_ID_USER, ObjectId, RequestId, RequestPeriod, VarDef, VarKind,
};

const IDENT_VARS: &[VarDef] = &[
    VarDef {
        kind: VarKind::Str64,
        name: "ATC AIRLINE",
        unit: None,
    },
    VarDef {
        kind: VarKind::Str8,
        name: "ATC FLIGHT NUMBER",
        unit: None,
    },
    VarDef {
        kind: VarKind::Str32,
        name: "ATC MODEL",
        unit: None,
    },
    VarDef {
        kind: VarKind::Str128,
        name: "TITLE",
        unit: None,
    },
];

const TRACK_VARS: &[VarDef] = &[
    VarDef {
        kind: VarKind::F64,
        name: "PLANE LONGITUDE",
        unit: Some("degrees"),
    },
    VarDef {
        kind: VarKind::F64,
        name: "PLANE LATITUDE",
        unit: Some("degrees"),
    },
    VarDef {
        kind: VarKind::F64,
        name: "PLANE HEADING DEGREES GYRO",
        unit: Some("degrees"),
    },
    VarDef {
        kind: VarKind::F64,
        name: "PLANE HEADING DEGREES TRUE",
        unit: Some("degrees"),
    },
    VarDef {
        kind: VarKind::I32,
        name: "INDICATED ALTITUDE",
        unit: Some("feet"),
    },
    VarDef {
        kind: VarKind::I32,
        name: "PLANE ALTITUDE",
        unit: Some("feet"),
    },
    VarDef {
        kind: VarKind::I32,
        name: "PLANE ALT ABOVE GROUND",
        unit: Some("feet"),
    },
    VarDef {
        kind: VarKind::I32,
        name: "AIRSPEED INDICATED",
        unit: Some("knots"),
    },
    VarDef {
        kind: VarKind::I32,
        name: "GROUND VELOCITY",
        unit: Some("knots"),
    },
    VarDef {
        kind: VarKind::I32,
        name: "VERTICAL SPEED",
        unit: Some("feet/second"),
    },
];

pub struct LocalAircraft {
    ident_model: DataModel,
    track_model: DataModel,
    object_id: ObjectId,
    callsign: String,
    model: String,
    spawned: bool,
    track_request: RequestId,
    last_track: UserTrack,
}

impl LocalAircraft {
    pub fn new() -> Self {
        Self {
            ident_model: DataModel::new("AircraftIdent", IDENT_VARS),
            track_model: DataModel::new("AircraftTrack", TRACK_VARS),
            object_id: 0,
            callsign: String::new(),
            model: String::new(),
            spawned: false,
            track_request: 0,
            last_track: UserTrack::default(),
        }
    }

    pub fn initialize(&mut self, link: &mut SimLink<ReqTarget>, sink: &mut dyn TrafficSink) {
        link.register_data_model(&mut self.track_model);
        link.register_data_model(&mut self.ident_model);

        if self.object_id != 0 {
            self.remove(link, sink);
        }
    }

    /// Follow a new object. Replacing an existing user aircraft removes the
    /// old one first; setting the same object again is a no-op.
    pub fn set(
        &mut self,
        link: &mut SimLink<ReqTarget>,
        object_id: ObjectId,
        sink: &mut dyn TrafficSink,
    ) {
        if self.object_id == object_id {
            return;
        }
        if self.object_id != 0 {
            warn!("Replacing local aircraft");
            self.remove(link, sink);
        }
        self.object_id = object_id;

        link.request_data_on_sim_object(
            object_id,
            &self.ident_model,
            ReqTarget::UserIdent,
            RequestPeriod::Once,
        );
    }

    /// Identification response; stale responses for a previously tracked
    /// object are dropped.
    pub fn handle_ident(
        &mut self,
        link: &mut SimLink<ReqTarget>,
        object_id: ObjectId,
        data: &[u8],
    ) {
        if self.object_id != object_id {
            debug!("Rejected ident response - local aircraft has changed");
            return;
        }
        let ident = match decode_ident(data) {
            Ok(ident) => ident,
            Err(e) => {
                warn!("user tracker: bad ident payload: {e}");
                return;
            }
        };

        self.callsign = format!("{}{}", ident.airline, ident.flight_number);
        self.model = ident.model;
        info!(
            "Local aircraft identified: {} - {} - type: {} variant: {}",
            object_id, self.callsign, self.model, ident.title
        );

        self.track_request = link.request_data_on_sim_object(
            OBJECT_ID_USER,
            &self.track_model,
            ReqTarget::UserTrack,
            RequestPeriod::Second,
        );
    }

    /// Periodic position sample.
    pub fn handle_track(&mut self, data: &[u8], sink: &mut dyn TrafficSink) {
        let track = match decode_track(data) {
            Ok(track) => track,
            Err(e) => {
                warn!("user tracker: bad track payload: {e}");
                return;
            }
        };
        if in_loading_limbo(track.longitude, track.latitude, track.altitude) {
            return;
        }

        self.last_track = track;
        if self.spawned {
            sink.user_update(&track);
        } else {
            self.spawned = true;
            info!("Spawned local aircraft");
            sink.user_add(&UserPlane {
                track,
                model: self.model.clone(),
                callsign: self.callsign.clone(),
            });
        }
    }

    /// Stop following the current object and clear all state. Fires the
    /// remove event only if the aircraft had spawned.
    pub fn remove(&mut self, link: &mut SimLink<ReqTarget>, sink: &mut dyn TrafficSink) {
        if self.spawned {
            sink.user_remove();
        }
        debug!("Removed local aircraft");

        if self.track_request != 0 {
            link.cancel_data_on_sim_object(self.track_request);
        }
        self.spawned = false;
        self.track_request = 0;
        self.object_id = 0;
        self.last_track = UserTrack::default();
        self.callsign.clear();
        self.model.clear();
    }

    /// Replay the last accepted sample for a snapshot request.
    pub fn resync(&self, sink: &mut dyn TrafficSink) {
        if !self.spawned {
            return;
        }
        sink.user_resync(&UserPlane {
            track: self.last_track,
            model: self.model.clone(),
            callsign: self.callsign.clone(),
        });
    }
}

struct UserIdent {
    airline: String,
    flight_number: String,
    model: String,
    title: String,
}

fn decode_ident(data: &[u8]) -> Result<UserIdent, Truncated> {
    let mut rd = Reader::new(data);
    Ok(UserIdent {
        airline: rd.str_fixed(64)?,
        flight_number: rd.str_fixed(8)?,
        model: rd.str_fixed(32)?,
        title: rd.str_fixed(128)?,
    })
}

fn decode_track(data: &[u8]) -> Result<UserTrack, Truncated> {
    let mut rd = Reader::new(data);
    let longitude = rd.f64()?;
    let latitude = rd.f64()?;
    let heading = rd.f64()?;
    let real_heading = rd.f64()?;
    let altitude = rd.i32()?;
    let real_altitude = rd.i32()?;
    let ground_altitude = rd.i32()?;
    let indicated_speed = rd.i32()?;
    let ground_speed = rd.i32()?;
    let vertical_speed = rd.i32()?;
    Ok(UserTrack {
        longitude,
        latitude,
        heading,
        altitude,
        ground_altitude,
        indicated_speed,
        ground_speed,
        vertical_speed,
        real_altitude,
        real_heading,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::channel::testing::{ChannelCall, MockChannel};
    use crate::traffic::testing::TestSink;

    fn setup() -> (
        LocalAircraft,
        SimLink<ReqTarget>,
        crate::sim::channel::testing::MockHandle,
        TestSink,
    ) {
        let (channel, handle) = MockChannel::new();
        let mut link = SimLink::new(channel);
        assert!(link.initialize("test"));
        let mut aircraft = LocalAircraft::new();
        let mut sink = TestSink::default();
        aircraft.initialize(&mut link, &mut sink);
        (aircraft, link, handle, sink)
    }

    fn put_str(buf: &mut Vec<u8>, s: &str, width: usize) {
        let bytes = s.as_bytes();
        buf.extend_from_slice(&bytes[..bytes.len().min(width)]);
        buf.resize(buf.len() + width.saturating_sub(bytes.len()), 0);
    }

    fn ident_payload(airline: &str, number: &str, model: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        put_str(&mut buf, airline, 64);
        put_str(&mut buf, number, 8);
        put_str(&mut buf, model, 32);
        put_str(&mut buf, "Generic Airliner", 128);
        buf
    }

    fn track_payload(lon: f64, lat: f64, indicated_alt: i32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&lon.to_le_bytes());
        buf.extend_from_slice(&lat.to_le_bytes());
        buf.extend_from_slice(&84.0f64.to_le_bytes());
        buf.extend_from_slice(&86.5f64.to_le_bytes());
        buf.extend_from_slice(&indicated_alt.to_le_bytes());
        buf.extend_from_slice(&(indicated_alt + 120).to_le_bytes());
        buf.extend_from_slice(&(indicated_alt - 900).to_le_bytes());
        buf.extend_from_slice(&140i32.to_le_bytes());
        buf.extend_from_slice(&150i32.to_le_bytes());
        buf.extend_from_slice(&3i32.to_le_bytes());
        buf
    }

    fn spawn(aircraft: &mut LocalAircraft, link: &mut SimLink<ReqTarget>, sink: &mut TestSink) {
        aircraft.set(link, 42, sink);
        aircraft.handle_ident(link, 42, &ident_payload("DLH", "123", "B738"));
        aircraft.handle_track(&track_payload(13.4, 52.5, 5000), sink);
    }

    #[test]
    fn callsign_is_airline_and_flight_number() {
        let (mut aircraft, mut link, handle, mut sink) = setup();
        spawn(&mut aircraft, &mut link, &mut sink);

        assert_eq!(sink.user_adds.len(), 1);
        let add = &sink.user_adds[0];
        assert_eq!(add.callsign, "DLH123");
        assert_eq!(add.model, "B738");
        assert_eq!(add.track.altitude, 5000);
        assert_eq!(add.track.real_altitude, 5120);
        assert_eq!(add.track.heading, 84.0);
        assert_eq!(add.track.real_heading, 86.5);

        // Tracking subscribed on the user object handle at SECOND period.
        assert!(matches!(
            handle.calls().last().unwrap(),
            ChannelCall::Request {
                object: OBJECT_ID_USER,
                period: RequestPeriod::Second,
                ..
            }
        ));
    }

    #[test]
    fn setting_the_same_object_is_a_no_op() {
        let (mut aircraft, mut link, handle, mut sink) = setup();
        aircraft.set(&mut link, 42, &mut sink);
        handle.clear_calls();
        aircraft.set(&mut link, 42, &mut sink);
        assert!(handle.calls().is_empty());
    }

    #[test]
    fn replacing_fires_remove_for_spawned_prior() {
        let (mut aircraft, mut link, _handle, mut sink) = setup();
        spawn(&mut aircraft, &mut link, &mut sink);

        aircraft.set(&mut link, 43, &mut sink);
        assert_eq!(sink.user_removes, 1);

        // The old tracking subscription was cancelled.
        aircraft.handle_track(&track_payload(13.4, 52.5, 6000), &mut sink);
        assert_eq!(sink.user_adds.len(), 2, "new object spawns afresh");
    }

    #[test]
    fn stale_ident_is_rejected() {
        let (mut aircraft, mut link, handle, mut sink) = setup();
        aircraft.set(&mut link, 42, &mut sink);
        handle.clear_calls();

        aircraft.handle_ident(&mut link, 41, &ident_payload("DLH", "123", "B738"));
        assert!(handle.calls().is_empty(), "no tracking for a stale ident");
    }

    #[test]
    fn limbo_samples_are_discarded() {
        let (mut aircraft, mut link, _handle, mut sink) = setup();
        aircraft.set(&mut link, 42, &mut sink);
        aircraft.handle_ident(&mut link, 42, &ident_payload("DLH", "123", "B738"));

        aircraft.handle_track(&track_payload(0.5, 0.5, 800), &mut sink);
        assert!(sink.user_adds.is_empty());

        aircraft.handle_track(&track_payload(13.4, 52.5, 5000), &mut sink);
        assert_eq!(sink.user_adds.len(), 1);
    }

    #[test]
    fn updates_follow_the_first_sample() {
        let (mut aircraft, mut link, _handle, mut sink) = setup();
        spawn(&mut aircraft, &mut link, &mut sink);

        aircraft.handle_track(&track_payload(13.5, 52.6, 5200), &mut sink);
        assert_eq!(sink.user_adds.len(), 1);
        assert_eq!(sink.user_updates.len(), 1);
        assert_eq!(sink.user_updates[0].altitude, 5200);
    }

    #[test]
    fn remove_fires_only_when_spawned() {
        let (mut aircraft, mut link, _handle, mut sink) = setup();
        aircraft.set(&mut link, 42, &mut sink);
        aircraft.remove(&mut link, &mut sink);
        assert_eq!(sink.user_removes, 0);

        spawn(&mut aircraft, &mut link, &mut sink);
        aircraft.remove(&mut link, &mut sink);
        assert_eq!(sink.user_removes, 1);
    }

    #[test]
    fn resync_replays_the_last_sample() {
        let (mut aircraft, mut link, _handle, mut sink) = setup();

        aircraft.resync(&mut sink);
        assert!(sink.user_resyncs.is_empty(), "nothing before spawn");

        spawn(&mut aircraft, &mut link, &mut sink);
        aircraft.handle_track(&track_payload(13.5, 52.6, 5200), &mut sink);

        aircraft.resync(&mut sink);
        assert_eq!(sink.user_resyncs.len(), 1);
        assert_eq!(sink.user_resyncs[0].track.altitude, 5200);
        assert_eq!(sink.user_resyncs[0].callsign, "DLH123");
    }
}
