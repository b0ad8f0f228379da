//! UDP device server and the manager that interprets device input.

pub mod proto;
pub mod radio;
pub mod transport;

use std::net::{SocketAddr, UdpSocket};

use tracing::{error, info};

use self::proto::{ClientRpc, INPUT_RADIO_STBY};
use self::radio::Radio;
use self::transport::{SlotId, Transport, TransportEvent};

use crate::rt::ReqTarget;
use crate::sim::link::SimLink;

/// Stateful wrapper around the transport: start/stop and admin operations.
pub struct DeviceServer {
    transport: Transport<UdpSocket>,
    bind: SocketAddr,
    active: bool,
}

impl DeviceServer {
    pub fn new(bind: SocketAddr) -> Self {
        Self {
            transport: Transport::new(),
            bind,
            active: false,
        }
    }

    /// Bind the socket and open the slot table. Bind failure leaves the
    /// server stopped.
    pub fn start(&mut self) -> bool {
        if self.active {
            return true;
        }
        info!("Starting server...");

        let socket = match UdpSocket::bind(self.bind) {
            Ok(socket) => socket,
            Err(e) => {
                error!("Failed to bind at {}: {e}", self.bind);
                return false;
            }
        };
        if let Err(e) = socket.set_nonblocking(true) {
            error!("Failed to configure socket: {e}");
            return false;
        }
        info!("Listening on {}", self.bind);

        self.transport.prepare(socket);
        self.active = true;
        true
    }

    /// Kick every peer and close the socket.
    pub fn stop(&mut self, events: &mut Vec<TransportEvent>) {
        if !self.active {
            return;
        }
        info!("Stopping server...");
        self.transport.kick_all(events);
        self.transport.shutdown();
        self.active = false;
        info!("Server stopped");
    }

    pub fn run(&mut self, events: &mut Vec<TransportEvent>) {
        if self.active {
            self.transport.run(events);
        }
    }

    pub fn is_running(&self) -> bool {
        self.active
    }

    pub fn kick(&mut self, id: SlotId, events: &mut Vec<TransportEvent>) {
        if self.transport.kick(id, events) {
            info!("{id} has been kicked!");
        }
    }

    pub fn kick_all(&mut self, events: &mut Vec<TransportEvent>) {
        self.transport.kick_all(events);
    }

    pub fn send_to_all(&mut self, buf: &[u8]) {
        self.transport.send_to_all(buf);
    }

    pub fn connection_count(&self) -> u16 {
        self.transport.connection_count()
    }

    pub fn print_status(&self) {
        info!(
            "Currently connected users: {}",
            self.transport.connection_count()
        );
        for slot in self.transport.connected_slots() {
            match slot.endpoint() {
                None => info!(" - ID: {} - ADDRESS: SERVER", slot.id()),
                Some(endpoint) => info!(" - ID: {} - ADDRESS: {}", slot.id(), endpoint),
            }
        }
    }
}

/// Interprets device traffic and tracks whether a real device is attached.
///
/// The fake peer holds slot 0, so "more than one connection" means at least
/// one real client.
pub struct DeviceManager {
    connected: bool,
    pub radio: Radio,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self {
            connected: false,
            radio: Radio::new(),
        }
    }

    /// Re-evaluate the device-connected boolean after a connection change.
    /// Returns the new state when it transitioned.
    pub fn update_connected(&mut self, connection_count: u16) -> Option<bool> {
        let now_connected = connection_count >= 2;
        if now_connected == self.connected {
            return None;
        }
        self.connected = now_connected;
        Some(now_connected)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Route an `INPUT` packet to its consumer.
    pub fn handle_input(
        &mut self,
        link: &mut SimLink<ReqTarget>,
        input_id: u32,
        input_data: u32,
    ) {
        if input_id == INPUT_RADIO_STBY {
            self.radio.adjust(link, input_data);
        }
    }

    /// Admin request: reboot every attached device into dev mode.
    pub fn reboot_into_dev_mode(&mut self, server: &mut DeviceServer) {
        server.send_to_all(&proto::rpc(ClientRpc::RebootDev));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_start_is_idempotent_and_stop_clears() {
        let mut server = DeviceServer::new("127.0.0.1:0".parse().unwrap());
        assert!(server.start());
        assert!(server.is_running());
        assert!(server.start());
        assert_eq!(server.connection_count(), 1, "fake peer only");

        let mut events = Vec::new();
        server.stop(&mut events);
        assert!(!server.is_running());
        server.stop(&mut events);
    }

    #[test]
    fn device_connected_tracks_real_clients_only() {
        let mut manager = DeviceManager::new();
        // Fake peer alone: not connected.
        assert_eq!(manager.update_connected(1), None);
        // First real client.
        assert_eq!(manager.update_connected(2), Some(true));
        // Second client: no transition.
        assert_eq!(manager.update_connected(3), None);
        assert_eq!(manager.update_connected(2), None);
        // Last real client gone.
        assert_eq!(manager.update_connected(1), Some(false));
        assert!(!manager.is_connected());
    }
}
