//! Session state over the link: connection tracking and reconnect backoff.

use tracing::{error, info};

use super::link::{LinkEvent, SimLink};
use crate::clock::{self, NEVER};

/// Grace period for the open handshake after a successful channel open.
const CONNECT_TIMEOUT_MS: i64 = clock::sec_to_ms(5 * 60);
/// Cooldown before retrying after a failed open or a lost connection.
const RECONNECT_COOLDOWN_MS: i64 = clock::sec_to_ms(60);

/// Session-level view of one pumped link event.
#[derive(Debug)]
pub enum SessionEvent<T> {
    /// The open handshake completed.
    Connected,
    /// The simulator quit on us.
    Disconnected,
    /// Any other link event, passed through for routing.
    Link(LinkEvent<T>),
}

pub struct SimSession<T> {
    pub link: SimLink<T>,
    app_name: String,
    next_reconnect: i64,
    connected: bool,
    allow_reconnect: bool,
    sim_name: String,
}

impl<T: Copy> SimSession<T> {
    pub fn new(link: SimLink<T>, app_name: String) -> Self {
        Self {
            link,
            app_name,
            next_reconnect: NEVER,
            connected: false,
            allow_reconnect: true,
            sim_name: String::new(),
        }
    }

    /// Attempt to open the channel. Arms the reconnect timer either way: a
    /// short cooldown on failure, a long handshake grace period on success.
    pub fn initialize(&mut self, now: i64) -> bool {
        if !self.link.initialize(&self.app_name) {
            self.next_reconnect = now + RECONNECT_COOLDOWN_MS;
            return false;
        }
        self.next_reconnect = now + CONNECT_TIMEOUT_MS;
        true
    }

    /// Reconnect poll; call once per tick.
    pub fn maybe_reconnect(&mut self, now: i64) {
        if !self.connected && self.next_reconnect <= now {
            self.initialize(now);
        }
    }

    /// Pump one link event. Handshake and quit are absorbed into session
    /// state; everything else passes through.
    pub fn step(&mut self, now: i64) -> (bool, Option<SessionEvent<T>>) {
        let (more, event) = self.link.run_callbacks(now);
        let event = match event {
            None => None,
            Some(LinkEvent::Open(info)) => {
                self.sim_name = info.app_name.clone();
                if self.connected {
                    None
                } else {
                    self.connected = true;
                    info!(
                        "Connected to {} {}.{}",
                        info.app_name, info.app_version.0, info.app_version.1
                    );
                    Some(SessionEvent::Connected)
                }
            }
            Some(LinkEvent::Quit) => self
                .on_disconnected(true, now)
                .then_some(SessionEvent::Disconnected),
            Some(LinkEvent::Exception {
                code,
                arg_index,
                name,
            }) => {
                error!("sim link exception: {code} {name} argument {arg_index:#x}");
                None
            }
            Some(other) => Some(SessionEvent::Link(other)),
        };
        (more, event)
    }

    /// Close the session locally. Returns whether a connection was dropped.
    pub fn shutdown(&mut self, now: i64) -> bool {
        self.link.shutdown();
        self.on_disconnected(false, now)
    }

    fn on_disconnected(&mut self, reconnect: bool, now: i64) -> bool {
        self.next_reconnect = if reconnect && self.allow_reconnect {
            now + RECONNECT_COOLDOWN_MS
        } else {
            NEVER
        };
        let was_connected = self.connected;
        self.connected = false;
        if was_connected {
            info!("Disconnected from simulator");
        }
        was_connected
    }

    pub fn allow_reconnect(&mut self, value: bool, now: i64) {
        if value {
            self.next_reconnect = if self.link.is_connected() {
                now + CONNECT_TIMEOUT_MS
            } else {
                now + RECONNECT_COOLDOWN_MS
            };
            self.allow_reconnect = true;
        } else {
            self.next_reconnect = NEVER;
            self.allow_reconnect = false;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_reconnect_allowed(&self) -> bool {
        self.allow_reconnect
    }

    pub fn sim_name(&self) -> &str {
        &self.sim_name
    }
}
