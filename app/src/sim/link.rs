//! Subscription registry over the vendor channel.
//!
//! The link hands out process-unique ids for data models, requests and
//! mapped events, and routes channel dispatches back to their owners. Owners
//! are identified by a caller-supplied `Copy` tag instead of stored closures,
//! so delivery never re-enters the component that issued the request.

use tracing::{debug, error, warn};

use super::channel::{Dispatch, ServerInfo, SimChannel};
use super::{
    DataModel, EventId, GroupId, ModelId, ObjectId, ObjectType, PacketId, RequestId, RequestPeriod,
};
use crate::clock;

// System event ids reserved below the user event range.
const SYS_EVENT_OBJECT_ADDED: EventId = 1;
const SYS_EVENT_OBJECT_REMOVED: EventId = 2;
const SYS_EVENT_SIM_START: EventId = 3;
const SYS_EVENT_SIM_STOP: EventId = 4;
const SYS_EVENT_PAUSE: EventId = 5;
const USER_EVENTS_BASE: EventId = 6;

/// One-shot requests silently expire this long after they are issued.
const REQUEST_TTL_MS: i64 = clock::sec_to_ms(60);

struct Request<T> {
    request_id: RequestId,
    object_id: ObjectId,
    model_id: ModelId,
    repeatable: bool,
    target: T,
    deadline: i64,
    packet_id: PacketId,
}

struct EventHook<T> {
    event_id: EventId,
    target: T,
}

/// An event pumped out of [`SimLink::run_callbacks`], already resolved to the
/// request or mapped event it belongs to.
#[derive(Debug)]
pub enum LinkEvent<T> {
    Open(ServerInfo),
    Quit,
    Exception {
        code: u32,
        arg_index: u32,
        name: &'static str,
    },
    ObjectAdded {
        kind: ObjectType,
        object_id: ObjectId,
    },
    ObjectRemoved {
        kind: ObjectType,
        object_id: ObjectId,
    },
    SimStart,
    SimStop,
    Pause(bool),
    Data {
        target: T,
        object_id: ObjectId,
        data: Vec<u8>,
    },
    Event {
        target: T,
        data: [u32; 5],
    },
}

pub struct SimLink<T> {
    channel: Box<dyn SimChannel>,
    next_model_id: ModelId,
    next_request_id: RequestId,
    next_event_id: EventId,
    requests: Vec<Request<T>>,
    events: Vec<EventHook<T>>,
}

impl<T: Copy> SimLink<T> {
    pub fn new(channel: Box<dyn SimChannel>) -> Self {
        Self {
            channel,
            next_model_id: 1,
            next_request_id: 1,
            next_event_id: USER_EVENTS_BASE,
            requests: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Open a session. Resets all id counters; any previous session is closed
    /// first.
    pub fn initialize(&mut self, app_name: &str) -> bool {
        if self.channel.is_open() {
            self.shutdown();
        }
        if self.channel.open(app_name).is_err() {
            return false;
        }
        self.next_model_id = 1;
        self.next_request_id = 1;
        self.next_event_id = USER_EVENTS_BASE;
        true
    }

    /// Close the session and forget every pending request and mapped event.
    pub fn shutdown(&mut self) {
        self.channel.close();
        self.requests.clear();
        self.events.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_open()
    }

    /// Pump at most one event from the channel. Returns whether more may be
    /// pending, plus the routed event if one was produced. Never blocks.
    pub fn run_callbacks(&mut self, now: i64) -> (bool, Option<LinkEvent<T>>) {
        if !self.channel.is_open() {
            return (false, None);
        }

        let Some(dispatch) = self.channel.next_dispatch() else {
            return (false, None);
        };

        match dispatch {
            Dispatch::Null => {
                self.sweep_expired(now);
                (false, None)
            }

            Dispatch::Open(info) => (true, Some(LinkEvent::Open(info))),

            Dispatch::Quit => {
                self.shutdown();
                (true, Some(LinkEvent::Quit))
            }

            Dispatch::Exception(info) => {
                if let Some(pos) = self
                    .requests
                    .iter()
                    .position(|r| r.packet_id == info.packet_id)
                {
                    debug!(
                        "sim link: packet {} - request has been dismissed",
                        info.packet_id
                    );
                    self.requests.remove(pos);
                }
                let event = LinkEvent::Exception {
                    code: info.code,
                    arg_index: info.arg_index,
                    name: stringify_exception(info.code),
                };
                (true, Some(event))
            }

            Dispatch::ObjectData {
                request_id,
                object_id,
                data,
            } => {
                let Some(pos) = self.requests.iter().position(|r| r.request_id == request_id)
                else {
                    debug!("sim link: data for unknown request {request_id}");
                    return (true, None);
                };
                // One-shot requests are removed before delivery.
                let target = if self.requests[pos].repeatable {
                    self.requests[pos].target
                } else {
                    self.requests.remove(pos).target
                };
                (
                    true,
                    Some(LinkEvent::Data {
                        target,
                        object_id,
                        data,
                    }),
                )
            }

            Dispatch::ObjectDataByType {
                request_id,
                object_id,
                data,
            } => {
                // Delivered once per matching object; the request itself
                // stays until its deadline.
                let Some(request) = self.requests.iter().find(|r| r.request_id == request_id)
                else {
                    debug!("sim link: data for unknown type request {request_id}");
                    return (true, None);
                };
                (
                    true,
                    Some(LinkEvent::Data {
                        target: request.target,
                        object_id,
                        data,
                    }),
                )
            }

            Dispatch::SystemEvent { event_id, data } => {
                let event = match event_id {
                    SYS_EVENT_SIM_START => Some(LinkEvent::SimStart),
                    SYS_EVENT_SIM_STOP => Some(LinkEvent::SimStop),
                    SYS_EVENT_PAUSE => Some(LinkEvent::Pause(data != 0)),
                    other => {
                        warn!("sim link: unknown system event {other}");
                        None
                    }
                };
                (true, event)
            }

            Dispatch::ObjectEvent {
                event_id,
                kind,
                object_id,
            } => {
                let event = match event_id {
                    SYS_EVENT_OBJECT_ADDED => Some(LinkEvent::ObjectAdded { kind, object_id }),
                    SYS_EVENT_OBJECT_REMOVED => Some(LinkEvent::ObjectRemoved { kind, object_id }),
                    other => {
                        warn!("sim link: unknown object event {other}");
                        None
                    }
                };
                (true, event)
            }

            Dispatch::ClientEvent { event_id, data } => {
                let event = self
                    .events
                    .iter()
                    .find(|e| e.event_id == event_id)
                    .map(|hook| LinkEvent::Event {
                        target: hook.target,
                        data,
                    });
                (true, event)
            }
        }
    }

    fn sweep_expired(&mut self, now: i64) {
        self.requests.retain(|r| {
            if !r.repeatable && r.deadline <= now {
                debug!("sim link: packet {} - request timed out", r.packet_id);
                false
            } else {
                true
            }
        });
    }

    /// Register a data model, assigning it a session-unique id. On failure
    /// the definition is cleared and the model stays unregistered.
    pub fn register_data_model(&mut self, model: &mut DataModel) -> bool {
        if self.next_model_id == ModelId::MAX {
            self.next_model_id = 1;
        }
        let id = self.next_model_id;
        self.next_model_id += 1;

        for var in model.vars {
            if self
                .channel
                .add_to_data_definition(id, var.name, var.unit, var.kind)
                .is_err()
            {
                error!(
                    "sim link: failed to add var {} to model {}",
                    var.name, model.name
                );
                self.channel.clear_data_definition(id);
                model.model_id = 0;
                return false;
            }
        }
        model.model_id = id;
        true
    }

    /// Subscribe to data for one object. Returns the request id, or 0 on
    /// failure.
    pub fn request_data_on_sim_object(
        &mut self,
        object_id: ObjectId,
        model: &DataModel,
        target: T,
        period: RequestPeriod,
    ) -> RequestId {
        if self.next_request_id == RequestId::MAX {
            self.next_request_id = 1;
        }
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        match self
            .channel
            .request_object_data(request_id, model.model_id, object_id, period)
        {
            Err(e) => {
                error!("sim link: failed to request data on object {object_id}: {e}");
                0
            }
            Ok(packet_id) => {
                self.requests.push(Request {
                    request_id,
                    object_id,
                    model_id: model.model_id,
                    repeatable: period.is_repeatable(),
                    target,
                    deadline: clock::steady_now_ms() + REQUEST_TTL_MS,
                    packet_id,
                });
                request_id
            }
        }
    }

    /// Cancel a previous subscription and drop its registry entry.
    pub fn cancel_data_on_sim_object(&mut self, request_id: RequestId) {
        let Some(pos) = self.requests.iter().position(|r| r.request_id == request_id) else {
            return;
        };
        let request = self.requests.remove(pos);
        if self
            .channel
            .request_object_data(
                request.request_id,
                request.model_id,
                request.object_id,
                RequestPeriod::Never,
            )
            .is_err()
        {
            error!(
                "sim link: failed to cancel request data on object {}",
                request.object_id
            );
        }
    }

    /// Query every object of `kind` within `radius_m`; the callback target is
    /// invoked once per match until the request expires.
    pub fn request_data_on_sim_object_type(
        &mut self,
        kind: ObjectType,
        model: &DataModel,
        target: T,
        radius_m: u32,
    ) -> RequestId {
        if self.next_request_id == RequestId::MAX {
            self.next_request_id = 1;
        }
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        match self
            .channel
            .request_object_data_by_type(request_id, model.model_id, radius_m, kind)
        {
            Err(e) => {
                error!("sim link: failed to request data on object type {kind:?}: {e}");
                0
            }
            Ok(packet_id) => {
                self.requests.push(Request {
                    request_id,
                    object_id: 0,
                    model_id: model.model_id,
                    repeatable: false,
                    target,
                    deadline: clock::steady_now_ms() + REQUEST_TTL_MS,
                    packet_id,
                });
                request_id
            }
        }
    }

    /// Map a named simulator event. Returns the event id, or 0 on failure.
    pub fn map_event(&mut self, name: &str, target: T) -> EventId {
        if self.next_event_id == EventId::MAX {
            return 0;
        }
        let event_id = self.next_event_id;
        self.next_event_id += 1;

        if self.channel.map_client_event(event_id, name).is_err() {
            error!("sim link: failed to map event {name}");
            return 0;
        }
        self.events.push(EventHook { event_id, target });
        event_id
    }

    pub fn add_event_to_group(&mut self, event_id: EventId, group: GroupId) {
        if self.channel.add_event_to_group(event_id, group).is_err() {
            error!("sim link: failed to add event {event_id} to group {group}");
        }
    }

    pub fn transmit_event(&mut self, event_id: EventId, value: u32) {
        if self.channel.transmit_event(event_id, value).is_err() {
            error!("sim link: failed to transmit event {event_id}");
        }
    }

    pub fn transmit_event_ex(&mut self, object_id: ObjectId, event_id: EventId, data: [u32; 5]) {
        if self
            .channel
            .transmit_event_ex(object_id, event_id, data)
            .is_err()
        {
            error!("sim link: failed to transmit event {event_id}");
        }
    }

    pub fn subscribe_to_object_added(&mut self) -> bool {
        self.subscribe_system(SYS_EVENT_OBJECT_ADDED, "ObjectAdded")
    }

    pub fn subscribe_to_object_removed(&mut self) -> bool {
        self.subscribe_system(SYS_EVENT_OBJECT_REMOVED, "ObjectRemoved")
    }

    pub fn subscribe_to_sim_start(&mut self) -> bool {
        self.subscribe_system(SYS_EVENT_SIM_START, "SimStart")
    }

    pub fn subscribe_to_sim_stop(&mut self) -> bool {
        self.subscribe_system(SYS_EVENT_SIM_STOP, "SimStop")
    }

    pub fn subscribe_to_pause(&mut self) -> bool {
        self.subscribe_system(SYS_EVENT_PAUSE, "Pause")
    }

    fn subscribe_system(&mut self, event_id: EventId, name: &str) -> bool {
        let ok = self.channel.subscribe_system_event(event_id, name).is_ok();
        if !ok {
            error!("sim link: failed to subscribe to system event {name}");
        }
        ok
    }
}

fn stringify_exception(code: u32) -> &'static str {
    match code {
        0 => "NONE",
        1 => "ERROR",
        2 => "SIZE_MISMATCH",
        3 => "UNRECOGNIZED_ID",
        4 => "UNOPENED",
        5 => "VERSION_MISMATCH",
        6 => "TOO_MANY_GROUPS",
        7 => "NAME_UNRECOGNIZED",
        8 => "TOO_MANY_EVENT_NAMES",
        9 => "EVENT_ID_DUPLICATE",
        10 => "TOO_MANY_MAPS",
        11 => "TOO_MANY_OBJECTS",
        12 => "TOO_MANY_REQUESTS",
        17 => "INVALID_DATA_TYPE",
        18 => "INVALID_DATA_SIZE",
        19 => "DATA_ERROR",
        20 => "INVALID_ARRAY",
        24 => "OPERATION_INVALID_FOR_OBJECT_TYPE",
        25 => "ILLEGAL_OPERATION",
        26 => "ALREADY_SUBSCRIBED",
        27 => "INVALID_ENUM",
        28 => "DEFINITION_ERROR",
        29 => "DUPLICATE_ID",
        30 => "DATUM_ID",
        31 => "OUT_OF_BOUNDS",
        32 => "ALREADY_CREATED",
        _ => "UNKNOWN",
    }
}
