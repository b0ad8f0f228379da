//! Bridge between the trackers and the UI fan-out.
//!
//! The bridge is the only producer of outbound UI messages and the only
//! consumer-side entry point for inbound commands. Tracker events are
//! serialized once and broadcast; every WebSocket consumer applies its own
//! backpressure downstream. Inbound commands queue up here and are executed
//! on the real-time thread.

use std::collections::VecDeque;
use std::sync::Mutex;

use bytes::Bytes;
use tokio::sync::broadcast;

use airlink::{
    RadarPlane, RadarTrack, SystemState, Topic, UserPlane, UserTrack, encode_radar_add,
    encode_radar_remove, encode_radar_update, encode_send_all_data, encode_system_props,
    encode_system_state, encode_user_add, encode_user_remove, encode_user_update,
};

use crate::traffic::TrafficSink;

/// A UI command waiting for the real-time thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxCmd {
    Resync,
    ChangeSimLinkStatus,
    ChangeServerStatus,
    ReconnectToSim,
}

/// Bounded-lock inbound queue: producers are UI threads, the consumer is the
/// real-time thread, one item per lock acquisition.
#[derive(Default)]
pub struct RxQueue {
    items: Mutex<VecDeque<(RxCmd, u64)>>,
}

impl RxQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, cmd: RxCmd, value: u64) {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back((cmd, value));
    }

    pub fn pop(&self) -> Option<(RxCmd, u64)> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    pub fn clear(&self) {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

/// One serialized frame on its way to every consumer.
#[derive(Debug, Clone)]
pub struct OutboundMsg {
    pub topic: Topic,
    pub frame: Bytes,
}

pub struct Bridge {
    tx: broadcast::Sender<OutboundMsg>,
    /// Halves of an in-flight resync: the second arrival flushes the pair.
    pending_resync: Option<(Option<Vec<RadarPlane>>, Option<UserPlane>)>,
}

impl Bridge {
    pub fn new(tx: broadcast::Sender<OutboundMsg>) -> Self {
        Self {
            tx,
            pending_resync: None,
        }
    }

    fn send(&self, topic: Topic, frame: Vec<u8>) {
        // A send with no consumers is fine.
        let _ = self.tx.send(OutboundMsg {
            topic,
            frame: frame.into(),
        });
    }

    pub fn send_system_state(&self, state: &SystemState) {
        self.send(Topic::ModifySystemState, encode_system_state(state));
    }

    pub fn send_system_props(&self, allow_reconnect: bool) {
        self.send(Topic::ModifySystemProps, encode_system_props(allow_reconnect));
    }

    /// Drop any half-built resync; called on session reset.
    pub fn clear_pending_resync(&mut self) {
        self.pending_resync = None;
    }

    fn flush_resync(&mut self, pair: (Option<Vec<RadarPlane>>, Option<UserPlane>)) {
        let radar = pair.0.unwrap_or_default();
        let frame = encode_send_all_data(&radar, pair.1.as_ref());
        self.send(Topic::SendAllData, frame);
    }
}

impl TrafficSink for Bridge {
    fn radar_add(&mut self, plane: &RadarPlane) {
        self.send(Topic::RadarAddAircraft, encode_radar_add(plane));
    }

    fn radar_update(&mut self, track: &RadarTrack) {
        self.send(Topic::RadarUpdateAircraft, encode_radar_update(track));
    }

    fn radar_remove(&mut self, id: u32) {
        self.send(Topic::RadarRemoveAircraft, encode_radar_remove(id));
    }

    fn radar_resync(&mut self, planes: Vec<RadarPlane>) {
        match self.pending_resync.take() {
            None => self.pending_resync = Some((Some(planes), None)),
            Some(mut pair) => {
                pair.0 = Some(planes);
                self.flush_resync(pair);
            }
        }
    }

    fn user_add(&mut self, plane: &UserPlane) {
        self.send(Topic::UserAddAircraft, encode_user_add(plane));
    }

    fn user_update(&mut self, track: &UserTrack) {
        self.send(Topic::UserUpdateAircraft, encode_user_update(track));
    }

    fn user_remove(&mut self) {
        self.send(Topic::UserRemoveAircraft, encode_user_remove());
    }

    fn user_resync(&mut self, plane: &UserPlane) {
        match self.pending_resync.take() {
            None => self.pending_resync = Some((None, Some(plane.clone()))),
            Some(mut pair) => {
                pair.1 = Some(plane.clone());
                self.flush_resync(pair);
            }
        }
    }
}
