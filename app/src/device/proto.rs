//! Device wire protocol: packet formats and constants.
//!
//! All packets are packed little-endian with a single-byte type tag first.

use byteorder::{ByteOrder, LittleEndian};

pub const PROTO_VERSION: u8 = 4;
pub const PROTO_REVISION: u8 = 14;

pub const DEFAULT_PORT: u16 = 4209;
/// MTU(1500) - IP frame(96) - UDP header(64)
pub const MAX_PACKET_SIZE: usize = 1340;

pub const CONNECT_TIMEOUT_MS: i64 = 3 * 1000;
pub const TIMEOUT_MS: i64 = 10 * 1000;
pub const HEARTBEAT_MS: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Unknown = 0,
    Heartbeat = 1,
    ConnNego = 2,
    Protocol = 3,
    Drop = 4,
}

impl PacketType {
    pub fn from_u8(tag: u8) -> Self {
        match tag {
            1 => Self::Heartbeat,
            2 => Self::ConnNego,
            3 => Self::Protocol,
            4 => Self::Drop,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DropReason {
    Invalid = 0,
    Banned = 1,
    Disconnected = 2,
    Full = 3,
    InvalidProto = 4,
    Kicked = 5,
    TimedOut = 6,
    // 7 (Local) and 8 (ConnectTimeout) are client-side only.
    InvalidPacket = 9,
}

/// Server-to-client RPC codes carried in a `Protocol` packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientRpc {
    None = 0,
    RebootDev = 1,
}

/// Input ids recognized by the device manager.
pub const INPUT_RADIO_STBY: u32 = 0x8597_8597;

pub fn heartbeat() -> [u8; 1] {
    [PacketType::Heartbeat as u8]
}

pub fn conn_nego(proto: u8, rev: u8) -> [u8; 3] {
    [PacketType::ConnNego as u8, proto, rev]
}

/// Server response to a negotiation: the extended form carrying the slot id.
pub fn conn_nego_response(proto: u8, rev: u8, user: u8) -> [u8; 4] {
    [PacketType::ConnNego as u8, proto, rev, user]
}

pub fn drop_packet(reason: DropReason) -> [u8; 2] {
    [PacketType::Drop as u8, reason as u8]
}

pub fn rpc(code: ClientRpc) -> [u8; 2] {
    [PacketType::Protocol as u8, code as u8]
}

/// Parse a client `CONNECT_NEGO`: `(proto, rev)`.
pub fn parse_conn_nego(buf: &[u8]) -> Option<(u8, u8)> {
    if buf.len() < 3 || PacketType::from_u8(buf[0]) != PacketType::ConnNego {
        return None;
    }
    Some((buf[1], buf[2]))
}

/// Parse an `INPUT` application packet: `(input_id, input_data)`.
///
/// Layout: header, 3 reserved bytes, two little-endian u32 fields.
pub fn parse_input(buf: &[u8]) -> Option<(u32, u32)> {
    if buf.len() < 12 || PacketType::from_u8(buf[0]) != PacketType::Protocol {
        return None;
    }
    let input_id = LittleEndian::read_u32(&buf[4..8]);
    let input_data = LittleEndian::read_u32(&buf[8..12]);
    Some((input_id, input_data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conn_nego_round_trip_preserves_version() {
        let packet = conn_nego(PROTO_VERSION, PROTO_REVISION);
        assert_eq!(parse_conn_nego(&packet), Some((4, 14)));

        // The extended response parses as a plain nego too.
        let response = conn_nego_response(PROTO_VERSION, PROTO_REVISION, 3);
        assert_eq!(parse_conn_nego(&response), Some((4, 14)));
        assert_eq!(response[3], 3);
    }

    #[test]
    fn undersized_nego_is_rejected() {
        assert_eq!(parse_conn_nego(&[PacketType::ConnNego as u8, 4]), None);
        assert_eq!(parse_conn_nego(&[]), None);
    }

    #[test]
    fn drop_packet_layout() {
        assert_eq!(drop_packet(DropReason::Full), [4, 3]);
        assert_eq!(drop_packet(DropReason::InvalidProto), [4, 4]);
        assert_eq!(drop_packet(DropReason::TimedOut), [4, 6]);
        assert_eq!(drop_packet(DropReason::InvalidPacket), [4, 9]);
    }

    #[test]
    fn input_packet_round_trip() {
        let mut buf = vec![PacketType::Protocol as u8, 0, 0, 0];
        buf.extend_from_slice(&INPUT_RADIO_STBY.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        assert_eq!(parse_input(&buf), Some((INPUT_RADIO_STBY, 1)));
    }

    #[test]
    fn short_input_is_rejected() {
        let buf = [PacketType::Protocol as u8, 0, 0, 0, 1, 2];
        assert_eq!(parse_input(&buf), None);
    }

    #[test]
    fn unknown_tags_map_to_unknown() {
        assert_eq!(PacketType::from_u8(0), PacketType::Unknown);
        assert_eq!(PacketType::from_u8(200), PacketType::Unknown);
        assert_eq!(PacketType::from_u8(1), PacketType::Heartbeat);
    }
}
