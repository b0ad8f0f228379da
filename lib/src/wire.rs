//! Binary UI protocol — MessagePack frames with a leading topic tag.
//!
//! Outbound payloads are maps keyed by small integers (see the topic table in
//! the UI protocol docs); inbound requests are parsed tolerantly, accepting
//! both integer keys and stringified integer keys.

use thiserror::Error;

use rmp::decode::{self, NumValueReadError, ValueReadError};
use rmp::encode;

use crate::topic::Topic;
use crate::track::{RadarPlane, RadarTrack, SimStatus, SystemState, UserPlane, UserTrack};

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("frame is empty or truncated")]
    Truncated,
    #[error("unknown topic {0}")]
    UnknownTopic(u8),
    #[error("unexpected value type")]
    UnexpectedType,
    #[error("map key is not an index")]
    BadKey,
    #[error("unknown message id {0}")]
    UnknownMessage(String),
    #[error("malformed message")]
    Malformed,
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

// All writers target a Vec, which cannot fail; results are discarded.

fn frame(topic: Topic) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    let _ = encode::write_uint(&mut buf, topic as u64);
    buf
}

fn put_uint(buf: &mut Vec<u8>, v: u64) {
    let _ = encode::write_uint(buf, v);
}

fn put_sint(buf: &mut Vec<u8>, v: i64) {
    let _ = encode::write_sint(buf, v);
}

fn put_f64(buf: &mut Vec<u8>, v: f64) {
    let _ = encode::write_f64(buf, v);
}

fn put_str(buf: &mut Vec<u8>, v: &str) {
    let _ = encode::write_str(buf, v);
}

fn put_map(buf: &mut Vec<u8>, len: u32) {
    let _ = encode::write_map_len(buf, len);
}

fn put_array(buf: &mut Vec<u8>, len: u32) {
    let _ = encode::write_array_len(buf, len);
}

fn put_radar_track(buf: &mut Vec<u8>, t: &RadarTrack) {
    put_uint(buf, 0);
    put_uint(buf, t.id as u64);
    put_uint(buf, 1);
    put_f64(buf, t.longitude);
    put_uint(buf, 2);
    put_f64(buf, t.latitude);
    put_uint(buf, 3);
    put_f64(buf, t.heading);
    put_uint(buf, 4);
    put_sint(buf, t.altitude as i64);
    put_uint(buf, 5);
    put_sint(buf, t.ground_altitude as i64);
    put_uint(buf, 6);
    put_sint(buf, t.indicated_speed as i64);
    put_uint(buf, 7);
    put_sint(buf, t.ground_speed as i64);
    put_uint(buf, 8);
    put_sint(buf, t.vertical_speed as i64);
}

fn put_radar_plane(buf: &mut Vec<u8>, p: &RadarPlane) {
    put_map(buf, 11);
    put_radar_track(buf, &p.track);
    put_uint(buf, 9);
    put_str(buf, &p.model);
    put_uint(buf, 10);
    put_str(buf, &p.callsign);
}

fn put_user_track(buf: &mut Vec<u8>, t: &UserTrack) {
    put_uint(buf, 0);
    put_f64(buf, t.longitude);
    put_uint(buf, 1);
    put_f64(buf, t.latitude);
    put_uint(buf, 2);
    put_f64(buf, t.heading);
    put_uint(buf, 3);
    put_sint(buf, t.altitude as i64);
    put_uint(buf, 4);
    put_sint(buf, t.ground_altitude as i64);
    put_uint(buf, 5);
    put_sint(buf, t.indicated_speed as i64);
    put_uint(buf, 6);
    put_sint(buf, t.ground_speed as i64);
    put_uint(buf, 7);
    put_sint(buf, t.vertical_speed as i64);
    put_uint(buf, 8);
    put_sint(buf, t.real_altitude as i64);
    put_uint(buf, 9);
    put_f64(buf, t.real_heading);
}

fn put_user_plane(buf: &mut Vec<u8>, p: &UserPlane) {
    put_map(buf, 12);
    put_user_track(buf, &p.track);
    put_uint(buf, 10);
    put_str(buf, &p.model);
    put_uint(buf, 11);
    put_str(buf, &p.callsign);
}

pub fn encode_radar_add(plane: &RadarPlane) -> Vec<u8> {
    let mut buf = frame(Topic::RadarAddAircraft);
    put_radar_plane(&mut buf, plane);
    buf
}

pub fn encode_radar_update(track: &RadarTrack) -> Vec<u8> {
    let mut buf = frame(Topic::RadarUpdateAircraft);
    put_map(&mut buf, 9);
    put_radar_track(&mut buf, track);
    buf
}

pub fn encode_radar_remove(id: u32) -> Vec<u8> {
    let mut buf = frame(Topic::RadarRemoveAircraft);
    put_map(&mut buf, 1);
    put_uint(&mut buf, 0);
    put_uint(&mut buf, id as u64);
    buf
}

pub fn encode_user_add(plane: &UserPlane) -> Vec<u8> {
    let mut buf = frame(Topic::UserAddAircraft);
    put_user_plane(&mut buf, plane);
    buf
}

pub fn encode_user_update(track: &UserTrack) -> Vec<u8> {
    let mut buf = frame(Topic::UserUpdateAircraft);
    put_map(&mut buf, 10);
    put_user_track(&mut buf, track);
    buf
}

pub fn encode_user_remove() -> Vec<u8> {
    frame(Topic::UserRemoveAircraft)
}

/// The combined resync snapshot: `[radar_snapshot, user_snapshot]`.
pub fn encode_send_all_data(radar: &[RadarPlane], user: Option<&UserPlane>) -> Vec<u8> {
    let mut buf = frame(Topic::SendAllData);
    put_array(&mut buf, 2);
    put_array(&mut buf, radar.len() as u32);
    for plane in radar {
        put_radar_plane(&mut buf, plane);
    }
    match user {
        Some(plane) => put_user_plane(&mut buf, plane),
        None => {
            let _ = encode::write_nil(&mut buf);
        }
    }
    buf
}

/// System state: `{0: 1 | [2, sim_name], 1: srv_code}`.
pub fn encode_system_state(state: &SystemState) -> Vec<u8> {
    let mut buf = frame(Topic::ModifySystemState);
    put_map(&mut buf, 2);
    put_uint(&mut buf, 0);
    match &state.sim {
        SimStatus::Disconnected => put_uint(&mut buf, 1),
        SimStatus::Connected { name } => {
            put_array(&mut buf, 2);
            put_uint(&mut buf, 2);
            put_str(&mut buf, name);
        }
    }
    put_uint(&mut buf, 1);
    put_uint(&mut buf, state.srv.as_code() as u64);
    buf
}

pub fn encode_system_props(allow_reconnect: bool) -> Vec<u8> {
    let mut buf = frame(Topic::ModifySystemProps);
    put_map(&mut buf, 1);
    put_uint(&mut buf, 0);
    let _ = encode::write_bool(&mut buf, allow_reconnect);
    buf
}

// ---------------------------------------------------------------------------
// Decoding (client -> server)
// ---------------------------------------------------------------------------

/// A request parsed from an inbound binary frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    SendAllData,
    ModifySystemState {
        sim: Option<bool>,
        server: Option<bool>,
    },
    ModifySystemProps {
        reconnect: Option<bool>,
    },
}

fn value_err<E: rmp::decode::RmpReadErr>(e: ValueReadError<E>) -> DecodeError {
    match e {
        ValueReadError::TypeMismatch(_) => DecodeError::UnexpectedType,
        _ => DecodeError::Truncated,
    }
}

fn num_err<E: rmp::decode::RmpReadErr>(e: NumValueReadError<E>) -> DecodeError {
    match e {
        NumValueReadError::TypeMismatch(_) | NumValueReadError::OutOfRange => {
            DecodeError::UnexpectedType
        }
        _ => DecodeError::Truncated,
    }
}

/// Read a map key that is either an integer or a stringified integer.
fn read_key(rd: &mut &[u8]) -> Result<u32, DecodeError> {
    match rd.first() {
        None => Err(DecodeError::Truncated),
        Some(&b) if (0xa0..=0xbf).contains(&b) || (0xd9..=0xdb).contains(&b) => {
            let len = decode::read_str_len(rd).map_err(value_err)? as usize;
            if rd.len() < len {
                return Err(DecodeError::Truncated);
            }
            let (raw, rest) = rd.split_at(len);
            *rd = rest;
            std::str::from_utf8(raw)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(DecodeError::BadKey)
        }
        Some(_) => decode::read_int(rd).map_err(|_| DecodeError::BadKey),
    }
}

/// Parse a map of `{index: bool}` entries. Unknown indices are ignored.
fn read_bool_map(rd: &mut &[u8], out: &mut [Option<bool>]) -> Result<(), DecodeError> {
    let len = decode::read_map_len(rd).map_err(value_err)?;
    for _ in 0..len {
        let key = read_key(rd)?;
        let value = decode::read_bool(rd).map_err(value_err)?;
        if let Some(slot) = out.get_mut(key as usize) {
            *slot = Some(value);
        }
    }
    Ok(())
}

/// Decode an inbound frame into a [`ClientRequest`].
pub fn decode_request(data: &[u8]) -> Result<ClientRequest, DecodeError> {
    let mut rd = data;
    let tag: u8 = decode::read_int(&mut rd).map_err(num_err)?;
    let topic = Topic::from_u8(tag).ok_or(DecodeError::UnknownTopic(tag))?;

    match topic {
        Topic::SendAllData => Ok(ClientRequest::SendAllData),
        Topic::ModifySystemState => {
            let mut flags = [None; 2];
            read_bool_map(&mut rd, &mut flags)?;
            Ok(ClientRequest::ModifySystemState {
                sim: flags[0],
                server: flags[1],
            })
        }
        Topic::ModifySystemProps => {
            let mut flags = [None; 1];
            read_bool_map(&mut rd, &mut flags)?;
            Ok(ClientRequest::ModifySystemProps {
                reconnect: flags[0],
            })
        }
        other => Err(DecodeError::UnknownTopic(other as u8)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal MessagePack value walker for asserting on encoded frames.
    #[derive(Debug, Clone, PartialEq)]
    enum Val {
        U(u64),
        I(i64),
        F(f64),
        S(String),
        B(bool),
        Nil,
        Arr(Vec<Val>),
        Map(Vec<(Val, Val)>),
    }

    fn read_value(rd: &mut &[u8]) -> Val {
        let b = *rd.first().expect("truncated");
        match b {
            0x00..=0x7f | 0xcc..=0xcf => Val::U(decode::read_int(rd).unwrap()),
            0xe0..=0xff | 0xd0..=0xd3 => Val::I(decode::read_int(rd).unwrap()),
            0xca => Val::F(decode::read_f32(rd).unwrap() as f64),
            0xcb => Val::F(decode::read_f64(rd).unwrap()),
            0xc0 => {
                decode::read_nil(rd).unwrap();
                Val::Nil
            }
            0xc2 | 0xc3 => Val::B(decode::read_bool(rd).unwrap()),
            0xa0..=0xbf | 0xd9..=0xdb => {
                let len = decode::read_str_len(rd).unwrap() as usize;
                let (raw, rest) = rd.split_at(len);
                *rd = rest;
                Val::S(String::from_utf8(raw.to_vec()).unwrap())
            }
            0x90..=0x9f | 0xdc | 0xdd => {
                let len = decode::read_array_len(rd).unwrap();
                Val::Arr((0..len).map(|_| read_value(rd)).collect())
            }
            0x80..=0x8f | 0xde | 0xdf => {
                let len = decode::read_map_len(rd).unwrap();
                Val::Map(
                    (0..len)
                        .map(|_| {
                            let k = read_value(rd);
                            let v = read_value(rd);
                            (k, v)
                        })
                        .collect(),
                )
            }
            other => panic!("unhandled marker {other:#x}"),
        }
    }

    fn sample_plane() -> RadarPlane {
        RadarPlane {
            track: RadarTrack {
                id: 42,
                longitude: 13.4,
                latitude: 52.5,
                heading: 270.0,
                altitude: 5000,
                ground_altitude: 4800,
                indicated_speed: 250,
                ground_speed: 260,
                vertical_speed: -12,
            },
            model: "B738".into(),
            callsign: "DLH123".into(),
        }
    }

    #[test]
    fn radar_add_round_trip() {
        let plane = sample_plane();
        let buf = encode_radar_add(&plane);

        let mut rd = buf.as_slice();
        assert_eq!(read_value(&mut rd), Val::U(Topic::RadarAddAircraft as u64));
        let Val::Map(entries) = read_value(&mut rd) else {
            panic!("expected map payload");
        };
        assert!(rd.is_empty());
        assert_eq!(entries.len(), 11);
        assert_eq!(entries[0], (Val::U(0), Val::U(42)));
        assert_eq!(entries[1], (Val::U(1), Val::F(13.4)));
        assert_eq!(entries[2], (Val::U(2), Val::F(52.5)));
        assert_eq!(entries[3], (Val::U(3), Val::F(270.0)));
        assert_eq!(entries[4], (Val::U(4), Val::U(5000)));
        assert_eq!(entries[8], (Val::U(8), Val::I(-12)));
        assert_eq!(entries[9], (Val::U(9), Val::S("B738".into())));
        assert_eq!(entries[10], (Val::U(10), Val::S("DLH123".into())));
    }

    #[test]
    fn radar_update_has_no_identity() {
        let plane = sample_plane();
        let buf = encode_radar_update(&plane.track);
        let mut rd = buf.as_slice();
        read_value(&mut rd);
        let Val::Map(entries) = read_value(&mut rd) else {
            panic!("expected map payload");
        };
        assert_eq!(entries.len(), 9);
    }

    #[test]
    fn radar_remove_exact_bytes() {
        // topic 5, fixmap(1), key 0, id 7
        assert_eq!(encode_radar_remove(7), vec![0x05, 0x81, 0x00, 0x07]);
    }

    #[test]
    fn user_remove_is_topic_only() {
        assert_eq!(encode_user_remove(), vec![0x08]);
    }

    #[test]
    fn send_all_data_shape() {
        let plane = sample_plane();
        let buf = encode_send_all_data(std::slice::from_ref(&plane), None);
        let mut rd = buf.as_slice();
        assert_eq!(read_value(&mut rd), Val::U(1));
        let Val::Arr(parts) = read_value(&mut rd) else {
            panic!("expected array payload");
        };
        assert_eq!(parts.len(), 2);
        let Val::Arr(radar) = &parts[0] else {
            panic!("expected radar snapshot array");
        };
        assert_eq!(radar.len(), 1);
        assert_eq!(parts[1], Val::Nil);
    }

    #[test]
    fn system_state_connected_carries_name() {
        let buf = encode_system_state(&SystemState {
            sim: SimStatus::Connected {
                name: "MSFS".into(),
            },
            srv: crate::SrvStatus::DeviceConnected,
        });
        let mut rd = buf.as_slice();
        assert_eq!(read_value(&mut rd), Val::U(2));
        let Val::Map(entries) = read_value(&mut rd) else {
            panic!("expected map payload");
        };
        assert_eq!(
            entries[0],
            (Val::U(0), Val::Arr(vec![Val::U(2), Val::S("MSFS".into())]))
        );
        assert_eq!(entries[1], (Val::U(1), Val::U(3)));
    }

    #[test]
    fn decode_send_all_request() {
        assert_eq!(decode_request(&[0x01]), Ok(ClientRequest::SendAllData));
    }

    #[test]
    fn decode_state_request_int_keys() {
        // {0: true, 1: false}
        let frame = [0x02, 0x82, 0x00, 0xc3, 0x01, 0xc2];
        assert_eq!(
            decode_request(&frame),
            Ok(ClientRequest::ModifySystemState {
                sim: Some(true),
                server: Some(false),
            })
        );
    }

    #[test]
    fn decode_state_request_string_keys() {
        // {"0": true}
        let frame = [0x02, 0x81, 0xa1, b'0', 0xc3];
        assert_eq!(
            decode_request(&frame),
            Ok(ClientRequest::ModifySystemState {
                sim: Some(true),
                server: None,
            })
        );
    }

    #[test]
    fn decode_props_request() {
        let frame = [0x03, 0x81, 0x00, 0xc2];
        assert_eq!(
            decode_request(&frame),
            Ok(ClientRequest::ModifySystemProps {
                reconnect: Some(false),
            })
        );
    }

    #[test]
    fn decode_rejects_unknown_topic() {
        assert_eq!(decode_request(&[0x63]), Err(DecodeError::UnknownTopic(99)));
        // Server-to-client topics are not valid requests.
        assert_eq!(decode_request(&[0x04]), Err(DecodeError::UnknownTopic(4)));
    }

    #[test]
    fn decode_rejects_non_bool_value() {
        // {0: 17}
        let frame = [0x02, 0x81, 0x00, 0x11];
        assert_eq!(decode_request(&frame), Err(DecodeError::UnexpectedType));
    }

    #[test]
    fn decode_rejects_empty_frame() {
        assert_eq!(decode_request(&[]), Err(DecodeError::Truncated));
    }

    #[test]
    fn decode_ignores_unknown_indices() {
        // {5: true}
        let frame = [0x02, 0x81, 0x05, 0xc3];
        assert_eq!(
            decode_request(&frame),
            Ok(ClientRequest::ModifySystemState {
                sim: None,
                server: None,
            })
        );
    }
}
