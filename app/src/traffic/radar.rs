//! Traffic radar — tracks every AI aircraft near the user.
//!
//! Each object goes through identify -> track: identification is scheduled
//! five seconds after the object appears (objects found by the initial scan
//! identify immediately), and the first accepted position sample marks the
//! aircraft as spawned.

use tracing::{info, warn};

use airlink::{RadarPlane, RadarTrack};

use super::{TrafficSink, in_loading_limbo};
use crate::clock;
use crate::rt::ReqTarget;
use crate::sim::decode::{Reader, Truncated};
use crate::sim::link::SimLink;
use crate::sim::{DataModel, ObjectId, ObjectType, RequestId, RequestPeriod, VarDef, VarKind};

const IDENT_DELAY_MS: i64 = clock::sec_to_ms(5);
const SCAN_RADIUS_M: u32 = 200_000;
const CALLSIGN_MAX: usize = 15;
const MODEL_MAX: usize = 7;

const IDENT_VARS: &[VarDef] = &[
    VarDef {
        kind: VarKind::Str32,
        name: "ATC MODEL",
        unit: None,
    },
    VarDef {
        kind: VarKind::Str32,
        name: "ATC ID",
        unit: None,
    },
    VarDef {
        kind: VarKind::I32,
        name: "IS USER SIM",
        unit: Some("bool"),
    },
];

const INFO_VARS: &[VarDef] = &[
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
        name: "PLANE HEADING DEGREES TRUE",
        unit: Some("degrees"),
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

struct Airplane {
    object_id: ObjectId,
    /// `Some(t)`: identification scheduled at `t`. `None`: identification has
    /// started (or finished).
    spawn_time: Option<i64>,
    is_user: bool,
    spawned: bool,
    ident_request: RequestId,
    callsign: String,
    model: String,
    radar_request: RequestId,
    last_track: RadarTrack,
}

pub struct AirplaneRadar {
    ident_model: DataModel,
    info_model: DataModel,
    airplanes: Vec<Airplane>,
}

impl AirplaneRadar {
    pub fn new() -> Self {
        Self {
            ident_model: DataModel::new("RadarIdent", IDENT_VARS),
            info_model: DataModel::new("RadarInfo", INFO_VARS),
            airplanes: Vec::new(),
        }
    }

    /// Session setup: register schemas, sweep the airspace for objects that
    /// already exist, and watch for arrivals and departures.
    pub fn initialize(&mut self, link: &mut SimLink<ReqTarget>, sink: &mut dyn TrafficSink) {
        link.register_data_model(&mut self.ident_model);
        link.register_data_model(&mut self.info_model);

        self.remove_all(sink);

        link.request_data_on_sim_object_type(
            ObjectType::Aircraft,
            &self.ident_model,
            ReqTarget::RadarScan,
            SCAN_RADIUS_M,
        );
        link.request_data_on_sim_object_type(
            ObjectType::Helicopter,
            &self.ident_model,
            ReqTarget::RadarScan,
            SCAN_RADIUS_M,
        );
        link.subscribe_to_object_added();
        link.subscribe_to_object_removed();
    }

    pub fn shutdown(&mut self, sink: &mut dyn TrafficSink) {
        self.remove_all(sink);
    }

    /// Track a new object; identification is scheduled shortly after arrival
    /// so the object has settled by the time we ask. Idempotent.
    pub fn add(&mut self, object_id: ObjectId, now: i64) {
        if self.find(object_id).is_some() {
            return;
        }
        self.airplanes.push(Airplane {
            object_id,
            spawn_time: Some(now + IDENT_DELAY_MS),
            is_user: false,
            spawned: false,
            ident_request: 0,
            callsign: String::new(),
            model: String::new(),
            radar_request: 0,
            last_track: RadarTrack {
                id: object_id,
                ..RadarTrack::default()
            },
        });
    }

    /// Returns true when the removed record was the user aircraft, which the
    /// caller hands off to the user tracker.
    pub fn remove(&mut self, object_id: ObjectId, sink: &mut dyn TrafficSink) -> bool {
        let Some(pos) = self.airplanes.iter().position(|a| a.object_id == object_id) else {
            return false;
        };
        let airplane = self.airplanes.remove(pos);
        fire_remove(&airplane, sink)
    }

    fn remove_all(&mut self, sink: &mut dyn TrafficSink) -> bool {
        let mut user_removed = false;
        for airplane in self.airplanes.drain(..) {
            user_removed |= fire_remove(&airplane, sink);
        }
        user_removed
    }

    /// Periodic tick: kick off identification for records whose delay has
    /// elapsed. At most one identification is in flight per record.
    pub fn on_update(&mut self, link: &mut SimLink<ReqTarget>, now: i64) {
        for idx in 0..self.airplanes.len() {
            if self.airplanes[idx].spawn_time.is_some_and(|t| t <= now) {
                self.airplanes[idx].spawn_time = None;
                let object_id = self.airplanes[idx].object_id;
                let request = link.request_data_on_sim_object(
                    object_id,
                    &self.ident_model,
                    ReqTarget::RadarIdent,
                    RequestPeriod::Once,
                );
                self.airplanes[idx].ident_request = request;
            }
        }
    }

    /// Result of the initial airspace scan. The object is treated as already
    /// settled: identification applies immediately.
    pub fn handle_scan(
        &mut self,
        link: &mut SimLink<ReqTarget>,
        object_id: ObjectId,
        data: &[u8],
        now: i64,
    ) -> Option<ObjectId> {
        if object_id == 0 {
            return None;
        }
        self.add(object_id, now);
        if let Some(idx) = self.position(object_id) {
            self.airplanes[idx].spawn_time = None;
        }
        self.apply_ident(link, object_id, data)
    }

    /// Identification response. Returns the object id when it turned out to
    /// be the user aircraft.
    pub fn handle_ident(
        &mut self,
        link: &mut SimLink<ReqTarget>,
        object_id: ObjectId,
        data: &[u8],
    ) -> Option<ObjectId> {
        let idx = self.position(object_id)?;
        self.airplanes[idx].ident_request = 0;
        self.apply_ident(link, object_id, data)
    }

    fn apply_ident(
        &mut self,
        link: &mut SimLink<ReqTarget>,
        object_id: ObjectId,
        data: &[u8],
    ) -> Option<ObjectId> {
        let (model, callsign, is_user) = match decode_ident(data) {
            Ok(fields) => fields,
            Err(e) => {
                warn!("radar: bad ident payload for {object_id}: {e}");
                return None;
            }
        };
        let idx = self.position(object_id)?;

        if is_user {
            self.airplanes[idx].is_user = true;
            return Some(object_id);
        }

        {
            let airplane = &mut self.airplanes[idx];
            airplane.callsign = truncated(&callsign, CALLSIGN_MAX);
            airplane.model = truncated(&model, MODEL_MAX);
            info!("Radar identified: {} - {}", object_id, airplane.callsign);
        }

        let request = link.request_data_on_sim_object(
            object_id,
            &self.info_model,
            ReqTarget::RadarTrack,
            RequestPeriod::Second,
        );
        self.airplanes[idx].radar_request = request;
        None
    }

    /// Periodic position sample.
    pub fn handle_track(&mut self, object_id: ObjectId, data: &[u8], sink: &mut dyn TrafficSink) {
        let track = match decode_info(object_id, data) {
            Ok(track) => track,
            Err(e) => {
                warn!("radar: bad track payload for {object_id}: {e}");
                return;
            }
        };
        let Some(idx) = self.position(object_id) else {
            return;
        };
        if in_loading_limbo(track.longitude, track.latitude, track.altitude) {
            return;
        }

        let airplane = &mut self.airplanes[idx];
        airplane.last_track = track;
        if airplane.spawned {
            sink.radar_update(&track);
        } else {
            airplane.spawned = true;
            info!("Spawned aircraft {object_id}");
            sink.radar_add(&RadarPlane {
                track,
                model: airplane.model.clone(),
                callsign: airplane.callsign.clone(),
            });
        }
    }

    /// Snapshot of every spawned, non-user aircraft.
    pub fn resync(&mut self, sink: &mut dyn TrafficSink) {
        let planes: Vec<RadarPlane> = self
            .airplanes
            .iter()
            .filter(|a| a.spawn_time.is_none() && !a.is_user && a.spawned)
            .map(|a| RadarPlane {
                track: a.last_track,
                model: a.model.clone(),
                callsign: a.callsign.clone(),
            })
            .collect();
        sink.radar_resync(planes);
    }

    fn find(&self, object_id: ObjectId) -> Option<&Airplane> {
        self.airplanes.iter().find(|a| a.object_id == object_id)
    }

    fn position(&self, object_id: ObjectId) -> Option<usize> {
        self.airplanes.iter().position(|a| a.object_id == object_id)
    }
}

/// Events fire only for records whose identification has started; the user
/// aircraft never emits radar events.
fn fire_remove(airplane: &Airplane, sink: &mut dyn TrafficSink) -> bool {
    if airplane.spawn_time.is_some() {
        return false;
    }
    if airplane.is_user {
        return true;
    }
    if airplane.spawned {
        sink.radar_remove(airplane.object_id);
    }
    false
}

fn truncated(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_owned();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_owned()
}

fn decode_ident(data: &[u8]) -> Result<(String, String, bool), Truncated> {
    let mut rd = Reader::new(data);
    let model = rd.str_fixed(32)?;
    let callsign = rd.str_fixed(32)?;
    let is_user = rd.i32()? != 0;
    Ok((model, callsign, is_user))
}

fn decode_info(object_id: ObjectId, data: &[u8]) -> Result<RadarTrack, Truncated> {
    let mut rd = Reader::new(data);
    Ok(RadarTrack {
        id: object_id,
        longitude: rd.f64()?,
        latitude: rd.f64()?,
        heading: rd.f64()?,
        altitude: rd.i32()?,
        ground_altitude: rd.i32()?,
        indicated_speed: rd.i32()?,
        ground_speed: rd.i32()?,
        vertical_speed: rd.i32()?,
    })
}
