//! Slot-based connection-oriented transport over UDP.
//!
//! A fixed slot table holds every peer; slot 0 is a fake loopback peer that
//! is never wire-connected, so a connection count above one always means at
//! least one real device. Peers negotiate a protocol version on connect and
//! are kept alive by heartbeats until they time out.

use std::net::{SocketAddr, UdpSocket};

use tracing::{info, warn};

use super::proto::{
    self, DropReason, HEARTBEAT_MS, MAX_PACKET_SIZE, PROTO_REVISION, PROTO_VERSION, PacketType,
    TIMEOUT_MS,
};
use crate::clock;

pub type SlotId = u8;

pub const USER_SLOTS: usize = 3;
pub const SLOTS: usize = USER_SLOTS + 1;

/// Minimal datagram surface, so timer and dispatch logic can be driven by an
/// in-memory socket in tests.
pub trait PacketSocket {
    fn send_to(&self, buf: &[u8], addr: SocketAddr);
    /// Non-blocking receive; `None` when nothing is pending.
    fn try_recv(&self, buf: &mut [u8]) -> Option<(usize, SocketAddr)>;
}

impl PacketSocket for UdpSocket {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) {
        if let Err(e) = UdpSocket::send_to(self, buf, addr) {
            warn!("device transport: send to {addr} failed: {e}");
        }
    }

    fn try_recv(&self, buf: &mut [u8]) -> Option<(usize, SocketAddr)> {
        match self.recv_from(buf) {
            Ok(received) => Some(received),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => None,
            Err(e) => {
                warn!("device transport: recv failed: {e}");
                None
            }
        }
    }
}

/// One peer table entry.
#[derive(Debug, Clone)]
pub struct Slot {
    id: SlotId,
    connected: bool,
    endpoint: Option<SocketAddr>,
    last_recv: i64,
    last_send: i64,
}

impl Slot {
    fn new(id: SlotId) -> Self {
        Self {
            id,
            connected: false,
            endpoint: None,
            last_recv: 0,
            last_send: 0,
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// `None` for the fake peer at slot 0.
    pub fn endpoint(&self) -> Option<SocketAddr> {
        self.endpoint
    }
}

/// Connection lifecycle and payload events produced by one tick.
/// `connected` carries the table count after the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected {
        slot: SlotId,
        endpoint: SocketAddr,
        connected: u16,
    },
    Disconnected {
        slot: SlotId,
        endpoint: Option<SocketAddr>,
        connected: u16,
    },
    Data {
        slot: SlotId,
        payload: Vec<u8>,
    },
}

pub struct Transport<S> {
    socket: Option<S>,
    slots: [Slot; SLOTS],
    connected_count: u16,
    nearest_free_slot: usize,
    tick_start: i64,
    tick_end: i64,
}

impl<S: PacketSocket> Transport<S> {
    pub fn new() -> Self {
        Self {
            socket: None,
            slots: std::array::from_fn(|i| Slot::new(i as SlotId)),
            connected_count: 0,
            nearest_free_slot: 0,
            tick_start: 0,
            tick_end: 0,
        }
    }

    /// Adopt a bound socket and reset the table. The fake peer takes slot 0
    /// without emitting a connect event.
    pub fn prepare(&mut self, socket: S) {
        self.reset();
        self.socket = Some(socket);
        self.connect_slot(None);
    }

    fn reset(&mut self) {
        self.nearest_free_slot = 0;
        self.connected_count = 0;
        for slot in &mut self.slots {
            slot.connected = false;
            slot.endpoint = None;
        }
    }

    pub fn shutdown(&mut self) {
        self.socket = None;
    }

    pub fn is_prepared(&self) -> bool {
        self.socket.is_some()
    }

    /// One transport tick: drain the socket, then run timers.
    pub fn run(&mut self, events: &mut Vec<TransportEvent>) {
        self.tick_start = clock::steady_now_ms();

        let mut buf = [0u8; MAX_PACKET_SIZE];
        loop {
            let received = match &self.socket {
                Some(socket) => socket.try_recv(&mut buf),
                None => None,
            };
            let Some((len, endpoint)) = received else {
                break;
            };
            let now = self.tick_start;
            self.handle_packet(&buf[..len], endpoint, now, events);
        }

        self.tick_end = clock::steady_now_ms();
        self.update_timers(self.tick_end, events);
        self.check_tick();
    }

    fn check_tick(&self) {
        let duration = self.tick_end - self.tick_start;
        if duration > clock::sec_to_ms(1) {
            warn!("Tick took {duration} ms");
        }
    }

    // -- dispatch ----------------------------------------------------------

    pub(super) fn handle_packet(
        &mut self,
        buf: &[u8],
        endpoint: SocketAddr,
        now: i64,
        events: &mut Vec<TransportEvent>,
    ) {
        let Some(&tag) = buf.first() else {
            return;
        };
        let kind = PacketType::from_u8(tag);

        let Some(idx) = self.find_connection(endpoint) else {
            if kind == PacketType::ConnNego {
                self.handle_new_connection(buf, endpoint, now, events);
            }
            return;
        };

        match kind {
            PacketType::Drop => {
                let endpoint = self.slots[idx].endpoint;
                self.disconnect_internal(idx);
                events.push(TransportEvent::Disconnected {
                    slot: idx as SlotId,
                    endpoint,
                    connected: self.connected_count,
                });
            }

            PacketType::Protocol => {
                self.slots[idx].last_recv = now;
                events.push(TransportEvent::Data {
                    slot: idx as SlotId,
                    payload: buf.to_vec(),
                });
            }

            PacketType::Heartbeat => {
                self.slots[idx].last_recv = now;
            }

            PacketType::ConnNego => {
                self.handle_reconnection(buf, idx, endpoint, now, events);
            }

            PacketType::Unknown => {}
        }
    }

    fn handle_new_connection(
        &mut self,
        buf: &[u8],
        endpoint: SocketAddr,
        now: i64,
        events: &mut Vec<TransportEvent>,
    ) {
        let Some((proto, rev)) = proto::parse_conn_nego(buf) else {
            return;
        };
        if self.connected_count as usize >= SLOTS {
            self.send_raw(&proto::drop_packet(DropReason::Full), endpoint);
            return;
        }
        if proto != PROTO_VERSION || rev != PROTO_REVISION {
            self.send_raw(&proto::drop_packet(DropReason::InvalidProto), endpoint);
            return;
        }

        let idx = self.connect_slot(Some(endpoint));
        self.send_raw(
            &proto::conn_nego_response(PROTO_VERSION, PROTO_REVISION, idx as SlotId),
            endpoint,
        );
        self.slots[idx].last_send = now;
        self.slots[idx].last_recv = now;
        events.push(TransportEvent::Connected {
            slot: idx as SlotId,
            endpoint,
            connected: self.connected_count,
        });
    }

    fn handle_reconnection(
        &mut self,
        buf: &[u8],
        idx: usize,
        endpoint: SocketAddr,
        now: i64,
        events: &mut Vec<TransportEvent>,
    ) {
        match proto::parse_conn_nego(buf) {
            Some((proto, rev)) if proto == PROTO_VERSION && rev == PROTO_REVISION => {
                self.send_raw(
                    &proto::conn_nego_response(PROTO_VERSION, PROTO_REVISION, idx as SlotId),
                    endpoint,
                );
                self.slots[idx].last_send = now;
                self.slots[idx].last_recv = now;
            }
            Some(_) => {
                self.disconnect(idx, DropReason::InvalidProto, events);
            }
            None => {
                self.disconnect(idx, DropReason::Kicked, events);
            }
        }
    }

    // -- slot management ---------------------------------------------------

    fn connect_slot(&mut self, endpoint: Option<SocketAddr>) -> usize {
        self.connected_count += 1;

        let idx = self.nearest_free_slot;
        let slot = &mut self.slots[idx];
        slot.connected = true;
        slot.endpoint = endpoint;
        slot.last_recv = 0;
        slot.last_send = 0;

        // Least free non-zero index, or the table size when full.
        self.nearest_free_slot = self
            .slots
            .iter()
            .enumerate()
            .skip(idx + 1)
            .find(|(_, s)| !s.connected)
            .map(|(i, _)| i)
            .unwrap_or(SLOTS);
        idx
    }

    fn disconnect_internal(&mut self, idx: usize) {
        let slot = &mut self.slots[idx];
        slot.connected = false;
        slot.endpoint = None;
        self.connected_count -= 1;
        if self.nearest_free_slot > idx {
            self.nearest_free_slot = idx;
        }
    }

    fn disconnect(
        &mut self,
        idx: usize,
        reason: DropReason,
        events: &mut Vec<TransportEvent>,
    ) -> bool {
        if !self.slots[idx].connected {
            return false;
        }
        let endpoint = self.slots[idx].endpoint;
        if let Some(endpoint) = endpoint {
            self.send_raw(&proto::drop_packet(reason), endpoint);
        }
        self.disconnect_internal(idx);
        events.push(TransportEvent::Disconnected {
            slot: idx as SlotId,
            endpoint,
            connected: self.connected_count,
        });
        true
    }

    /// Forcibly drop a peer. Slot 0 cannot be kicked.
    pub fn kick(&mut self, id: SlotId, events: &mut Vec<TransportEvent>) -> bool {
        let idx = id as usize;
        if idx == 0 || idx >= SLOTS {
            return false;
        }
        self.disconnect(idx, DropReason::Kicked, events)
    }

    pub fn kick_all(&mut self, events: &mut Vec<TransportEvent>) {
        for idx in 1..SLOTS {
            if self.slots[idx].connected {
                self.disconnect(idx, DropReason::Kicked, events);
            }
        }
    }

    // -- timers ------------------------------------------------------------

    pub(super) fn update_timers(&mut self, now: i64, events: &mut Vec<TransportEvent>) {
        for idx in 1..SLOTS {
            if !self.slots[idx].connected {
                continue;
            }

            if now - self.slots[idx].last_recv >= TIMEOUT_MS {
                self.disconnect(idx, DropReason::TimedOut, events);
                info!("{idx} timed out");
                continue;
            }

            if now - self.slots[idx].last_send >= HEARTBEAT_MS {
                if let Some(endpoint) = self.slots[idx].endpoint {
                    self.send_raw(&proto::heartbeat(), endpoint);
                }
                self.slots[idx].last_send = now;
            }
        }
    }

    // -- sending -----------------------------------------------------------

    fn send_raw(&self, buf: &[u8], endpoint: SocketAddr) {
        if let Some(socket) = &self.socket {
            socket.send_to(buf, endpoint);
        }
    }

    /// Send to one connected peer. Slot 0 swallows the payload.
    pub fn send(&mut self, id: SlotId, buf: &[u8]) {
        let idx = id as usize;
        if idx == 0 || idx >= SLOTS || !self.slots[idx].connected {
            return;
        }
        if let Some(endpoint) = self.slots[idx].endpoint {
            self.send_raw(buf, endpoint);
        }
        self.slots[idx].last_send = self.tick_start;
    }

    pub fn send_to_all(&mut self, buf: &[u8]) {
        for idx in 1..SLOTS {
            if !self.slots[idx].connected {
                continue;
            }
            if let Some(endpoint) = self.slots[idx].endpoint {
                self.send_raw(buf, endpoint);
            }
            self.slots[idx].last_send = self.tick_start;
        }
    }

    // -- queries -----------------------------------------------------------

    pub fn connection_count(&self) -> u16 {
        self.connected_count
    }

    pub fn connected_slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter().filter(|s| s.connected)
    }

    fn find_connection(&self, endpoint: SocketAddr) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.connected && s.endpoint == Some(endpoint))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::*;
    use crate::device::proto::{ClientRpc, conn_nego, drop_packet, rpc};

    #[derive(Default)]
    struct Inner {
        inbound: VecDeque<(Vec<u8>, SocketAddr)>,
        sent: Vec<(Vec<u8>, SocketAddr)>,
    }

    #[derive(Clone, Default)]
    struct TestSocket {
        inner: Rc<RefCell<Inner>>,
    }

    impl TestSocket {
        fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
            self.inner.borrow().sent.clone()
        }

        fn sent_to(&self, addr: SocketAddr) -> Vec<Vec<u8>> {
            self.inner
                .borrow()
                .sent
                .iter()
                .filter(|(_, a)| *a == addr)
                .map(|(b, _)| b.clone())
                .collect()
        }

        fn clear(&self) {
            self.inner.borrow_mut().sent.clear();
        }

        fn push_inbound(&self, buf: &[u8], from: SocketAddr) {
            self.inner
                .borrow_mut()
                .inbound
                .push_back((buf.to_vec(), from));
        }
    }

    impl PacketSocket for TestSocket {
        fn send_to(&self, buf: &[u8], addr: SocketAddr) {
            self.inner.borrow_mut().sent.push((buf.to_vec(), addr));
        }

        fn try_recv(&self, buf: &mut [u8]) -> Option<(usize, SocketAddr)> {
            let (data, addr) = self.inner.borrow_mut().inbound.pop_front()?;
            buf[..data.len()].copy_from_slice(&data);
            Some((data.len(), addr))
        }
    }

    fn peer(n: u8) -> SocketAddr {
        format!("10.0.0.{n}:4210").parse().unwrap()
    }

    fn setup() -> (Transport<TestSocket>, TestSocket) {
        let socket = TestSocket::default();
        let mut transport = Transport::new();
        transport.prepare(socket.clone());
        (transport, socket)
    }

    fn connect(
        transport: &mut Transport<TestSocket>,
        addr: SocketAddr,
        now: i64,
    ) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        transport.handle_packet(
            &conn_nego(PROTO_VERSION, PROTO_REVISION),
            addr,
            now,
            &mut events,
        );
        events
    }

    #[test]
    fn fake_peer_occupies_slot_zero() {
        let (transport, _socket) = setup();
        assert_eq!(transport.connection_count(), 1);
        let slots: Vec<_> = transport.connected_slots().collect();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].id(), 0);
        assert_eq!(slots[0].endpoint(), None);
    }

    #[test]
    fn four_clients_fill_the_table_then_full() {
        let (mut transport, socket) = setup();

        for n in 1..=3u8 {
            let events = connect(&mut transport, peer(n), 0);
            assert_eq!(
                events,
                vec![TransportEvent::Connected {
                    slot: n,
                    endpoint: peer(n),
                    connected: 1 + n as u16,
                }]
            );
            let replies = socket.sent_to(peer(n));
            assert_eq!(
                replies[0],
                proto::conn_nego_response(PROTO_VERSION, PROTO_REVISION, n).to_vec()
            );
        }
        assert_eq!(transport.connection_count(), 4);

        let events = connect(&mut transport, peer(4), 0);
        assert!(events.is_empty());
        assert_eq!(
            socket.sent_to(peer(4)),
            vec![drop_packet(DropReason::Full).to_vec()]
        );
        assert_eq!(transport.connection_count(), 4);
    }

    #[test]
    fn wrong_version_is_rejected_without_a_slot() {
        let (mut transport, socket) = setup();
        let mut events = Vec::new();
        transport.handle_packet(&conn_nego(3, PROTO_REVISION), peer(1), 0, &mut events);
        assert!(events.is_empty());
        assert_eq!(
            socket.sent_to(peer(1)),
            vec![drop_packet(DropReason::InvalidProto).to_vec()]
        );
        assert_eq!(transport.connection_count(), 1);
    }

    #[test]
    fn undersized_nego_from_unknown_peer_is_ignored() {
        let (mut transport, socket) = setup();
        let mut events = Vec::new();
        transport.handle_packet(&[PacketType::ConnNego as u8], peer(1), 0, &mut events);
        assert!(events.is_empty());
        assert!(socket.sent().is_empty());
    }

    #[test]
    fn heartbeat_then_timeout() {
        let (mut transport, socket) = setup();
        connect(&mut transport, peer(1), 0);
        socket.clear();

        // t = 1s: heartbeat due, no timeout yet.
        let mut events = Vec::new();
        transport.update_timers(HEARTBEAT_MS, &mut events);
        assert!(events.is_empty());
        assert_eq!(socket.sent_to(peer(1)), vec![proto::heartbeat().to_vec()]);
        socket.clear();

        // Heartbeat is not re-sent immediately.
        transport.update_timers(HEARTBEAT_MS + 10, &mut events);
        assert!(socket.sent().is_empty());

        // t = 10s since last receive: timed out.
        transport.update_timers(TIMEOUT_MS, &mut events);
        assert_eq!(
            events,
            vec![TransportEvent::Disconnected {
                slot: 1,
                endpoint: Some(peer(1)),
                connected: 1,
            }]
        );
        assert_eq!(
            socket.sent_to(peer(1)),
            vec![drop_packet(DropReason::TimedOut).to_vec()]
        );
    }

    #[test]
    fn traffic_defers_the_timeout() {
        let (mut transport, _socket) = setup();
        connect(&mut transport, peer(1), 0);

        let mut events = Vec::new();
        transport.handle_packet(&proto::heartbeat(), peer(1), 9_000, &mut events);
        transport.update_timers(TIMEOUT_MS, &mut events);
        assert!(events.is_empty(), "recent receive resets the timeout");

        transport.update_timers(9_000 + TIMEOUT_MS, &mut events);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn protocol_payload_is_delivered_and_refreshes_the_peer() {
        let (mut transport, _socket) = setup();
        connect(&mut transport, peer(1), 0);

        let packet = rpc(ClientRpc::None);
        let mut events = Vec::new();
        transport.handle_packet(&packet, peer(1), 5_000, &mut events);
        assert_eq!(
            events,
            vec![TransportEvent::Data {
                slot: 1,
                payload: packet.to_vec(),
            }]
        );

        transport.update_timers(5_000 + TIMEOUT_MS - 1, &mut events);
        assert_eq!(events.len(), 1, "no timeout while traffic flows");
    }

    #[test]
    fn peer_drop_frees_the_slot_silently() {
        let (mut transport, socket) = setup();
        connect(&mut transport, peer(1), 0);
        socket.clear();

        let mut events = Vec::new();
        transport.handle_packet(&drop_packet(DropReason::Disconnected), peer(1), 0, &mut events);
        assert_eq!(
            events,
            vec![TransportEvent::Disconnected {
                slot: 1,
                endpoint: Some(peer(1)),
                connected: 1,
            }]
        );
        assert!(socket.sent().is_empty(), "no reply to a drop");
    }

    #[test]
    fn reconnect_nego_re_replies_with_the_same_slot() {
        let (mut transport, socket) = setup();
        connect(&mut transport, peer(1), 0);
        socket.clear();

        let events = connect(&mut transport, peer(1), 5_000);
        assert!(events.is_empty(), "reconnect is not a new connection");
        assert_eq!(
            socket.sent_to(peer(1)),
            vec![proto::conn_nego_response(PROTO_VERSION, PROTO_REVISION, 1).to_vec()]
        );
        assert_eq!(transport.connection_count(), 2);
    }

    #[test]
    fn reconnect_with_wrong_version_drops_the_peer() {
        let (mut transport, socket) = setup();
        connect(&mut transport, peer(1), 0);
        socket.clear();

        let mut events = Vec::new();
        transport.handle_packet(&conn_nego(PROTO_VERSION, 13), peer(1), 0, &mut events);
        assert!(matches!(
            events[0],
            TransportEvent::Disconnected { slot: 1, .. }
        ));
        assert_eq!(
            socket.sent_to(peer(1)),
            vec![drop_packet(DropReason::InvalidProto).to_vec()]
        );
    }

    #[test]
    fn kick_drops_a_slot_but_never_slot_zero() {
        let (mut transport, socket) = setup();
        connect(&mut transport, peer(1), 0);
        socket.clear();

        let mut events = Vec::new();
        assert!(!transport.kick(0, &mut events));
        assert!(!transport.kick(200, &mut events));
        assert!(transport.kick(1, &mut events));
        assert_eq!(
            socket.sent_to(peer(1)),
            vec![drop_packet(DropReason::Kicked).to_vec()]
        );
        assert!(!transport.kick(1, &mut events), "already free");
    }

    #[test]
    fn nearest_free_slot_reuses_the_lowest_index() {
        let (mut transport, _socket) = setup();
        for n in 1..=3u8 {
            connect(&mut transport, peer(n), 0);
        }

        let mut events = Vec::new();
        transport.kick(2, &mut events);

        let events = connect(&mut transport, peer(9), 0);
        assert!(matches!(
            events[0],
            TransportEvent::Connected { slot: 2, .. }
        ));
    }

    #[test]
    fn run_drains_the_socket_and_runs_timers() {
        let (mut transport, socket) = setup();
        socket.push_inbound(&conn_nego(PROTO_VERSION, PROTO_REVISION), peer(1));
        socket.push_inbound(&conn_nego(PROTO_VERSION, PROTO_REVISION), peer(2));

        let mut events = Vec::new();
        transport.run(&mut events);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, TransportEvent::Connected { .. }))
                .count(),
            2
        );
        assert_eq!(transport.connection_count(), 3);
    }

    #[test]
    fn send_skips_the_fake_peer() {
        let (mut transport, socket) = setup();
        connect(&mut transport, peer(1), 0);
        socket.clear();

        transport.send(0, &[9, 9]);
        assert!(socket.sent().is_empty());

        transport.send_to_all(&[9, 9]);
        assert_eq!(socket.sent_to(peer(1)), vec![vec![9, 9]]);
    }
}
