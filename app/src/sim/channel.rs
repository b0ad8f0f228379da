//! The vendor telemetry channel boundary.
//!
//! Everything past [`SimChannel`] belongs to the simulator vendor: an opaque
//! request/response pipe with opaque object handles. The link layers its
//! subscription registry on top and never assumes anything about timing or
//! delivery beyond what the trait promises.

use std::fmt;

use super::{EventId, ModelId, ObjectId, ObjectType, PacketId, RequestId, RequestPeriod, VarKind};

/// Handshake info delivered with the open event.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub app_name: String,
    pub app_version: (u32, u32),
    pub server_version: (u32, u32),
}

/// A simulator-level exception tied to a previously sent packet.
#[derive(Debug, Clone, Copy)]
pub struct ExceptionInfo {
    pub code: u32,
    pub packet_id: PacketId,
    pub arg_index: u32,
}

/// One event pumped from the channel. `Null` is the idle marker the link uses
/// to sweep expired requests.
#[derive(Debug, Clone)]
pub enum Dispatch {
    Null,
    Open(ServerInfo),
    Quit,
    Exception(ExceptionInfo),
    ObjectData {
        request_id: RequestId,
        object_id: ObjectId,
        data: Vec<u8>,
    },
    ObjectDataByType {
        request_id: RequestId,
        object_id: ObjectId,
        data: Vec<u8>,
    },
    SystemEvent {
        event_id: EventId,
        data: u32,
    },
    ObjectEvent {
        event_id: EventId,
        kind: ObjectType,
        object_id: ObjectId,
    },
    ClientEvent {
        event_id: EventId,
        data: [u32; 5],
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel is not open (or the backend is absent).
    NotOpen,
    /// The backend rejected the call.
    Rejected,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotOpen => write!(f, "simulator channel is not open"),
            Self::Rejected => write!(f, "simulator channel rejected the call"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Vendor channel operations used by the link. Every send returns the packet
/// id the backend assigned, so exceptions can be traced back to requests.
pub trait SimChannel: Send {
    fn open(&mut self, app_name: &str) -> Result<(), ChannelError>;
    fn close(&mut self);
    fn is_open(&self) -> bool;

    /// Pump at most one pending event. Must not block.
    fn next_dispatch(&mut self) -> Option<Dispatch>;

    fn add_to_data_definition(
        &mut self,
        model: ModelId,
        name: &str,
        unit: Option<&str>,
        kind: VarKind,
    ) -> Result<PacketId, ChannelError>;
    fn clear_data_definition(&mut self, model: ModelId);

    fn request_object_data(
        &mut self,
        request: RequestId,
        model: ModelId,
        object: ObjectId,
        period: RequestPeriod,
    ) -> Result<PacketId, ChannelError>;
    fn request_object_data_by_type(
        &mut self,
        request: RequestId,
        model: ModelId,
        radius_m: u32,
        kind: ObjectType,
    ) -> Result<PacketId, ChannelError>;

    fn subscribe_system_event(
        &mut self,
        event: EventId,
        name: &str,
    ) -> Result<PacketId, ChannelError>;
    fn map_client_event(&mut self, event: EventId, name: &str) -> Result<PacketId, ChannelError>;
    fn add_event_to_group(
        &mut self,
        event: EventId,
        group: super::GroupId,
    ) -> Result<PacketId, ChannelError>;
    fn transmit_event(&mut self, event: EventId, value: u32) -> Result<PacketId, ChannelError>;
    fn transmit_event_ex(
        &mut self,
        object: ObjectId,
        event: EventId,
        data: [u32; 5],
    ) -> Result<PacketId, ChannelError>;
}

/// Placeholder backend for hosts without a simulator attached. `open` always
/// fails, which keeps the session in its reconnect loop.
#[derive(Debug, Default)]
pub struct NullChannel;

impl SimChannel for NullChannel {
    fn open(&mut self, _app_name: &str) -> Result<(), ChannelError> {
        Err(ChannelError::NotOpen)
    }

    fn close(&mut self) {}

    fn is_open(&self) -> bool {
        false
    }

    fn next_dispatch(&mut self) -> Option<Dispatch> {
        None
    }

    fn add_to_data_definition(
        &mut self,
        _model: ModelId,
        _name: &str,
        _unit: Option<&str>,
        _kind: VarKind,
    ) -> Result<PacketId, ChannelError> {
        Err(ChannelError::NotOpen)
    }

    fn clear_data_definition(&mut self, _model: ModelId) {}

    fn request_object_data(
        &mut self,
        _request: RequestId,
        _model: ModelId,
        _object: ObjectId,
        _period: RequestPeriod,
    ) -> Result<PacketId, ChannelError> {
        Err(ChannelError::NotOpen)
    }

    fn request_object_data_by_type(
        &mut self,
        _request: RequestId,
        _model: ModelId,
        _radius_m: u32,
        _kind: ObjectType,
    ) -> Result<PacketId, ChannelError> {
        Err(ChannelError::NotOpen)
    }

    fn subscribe_system_event(
        &mut self,
        _event: EventId,
        _name: &str,
    ) -> Result<PacketId, ChannelError> {
        Err(ChannelError::NotOpen)
    }

    fn map_client_event(&mut self, _event: EventId, _name: &str) -> Result<PacketId, ChannelError> {
        Err(ChannelError::NotOpen)
    }

    fn add_event_to_group(
        &mut self,
        _event: EventId,
        _group: super::GroupId,
    ) -> Result<PacketId, ChannelError> {
        Err(ChannelError::NotOpen)
    }

    fn transmit_event(&mut self, _event: EventId, _value: u32) -> Result<PacketId, ChannelError> {
        Err(ChannelError::NotOpen)
    }

    fn transmit_event_ex(
        &mut self,
        _object: ObjectId,
        _event: EventId,
        _data: [u32; 5],
    ) -> Result<PacketId, ChannelError> {
        Err(ChannelError::NotOpen)
    }
}
