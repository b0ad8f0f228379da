//! Real-time thread: sole owner of the simulator/device mutation domain.
//!
//! One cooperative thread ticks every 20 ms under `cmd_mutex`. UI-side code
//! reaches the domain only through [`RtShared::enter_cmd_mode`], and the
//! inbound command queue is drained at the end of every tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use tracing::{debug, info};

use airlink::{SimStatus, SrvStatus, SystemState};

use crate::bridge::{Bridge, RxCmd, RxQueue};
use crate::clock;
use crate::device::transport::TransportEvent;
use crate::device::{DeviceManager, DeviceServer, proto};
use crate::sim::link::LinkEvent;
use crate::sim::session::{SessionEvent, SimSession};
use crate::sim::ObjectType;
use crate::traffic::radar::AirplaneRadar;
use crate::traffic::user::LocalAircraft;

/// Owner tags for link requests and mapped events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReqTarget {
    /// Initial airspace scan result.
    RadarScan,
    /// Scheduled radar identification.
    RadarIdent,
    /// Periodic radar position sample.
    RadarTrack,
    /// User aircraft identification.
    UserIdent,
    /// Periodic user position sample.
    UserTrack,
    /// One-shot standby frequency read.
    RadioFreq,
    /// COM standby set event.
    RadioStby,
}

const TICK_MS: u64 = 20;

/// Everything the real-time thread owns.
pub struct RtCore {
    pub session: SimSession<ReqTarget>,
    pub radar: AirplaneRadar,
    pub user: LocalAircraft,
    pub server: DeviceServer,
    pub manager: DeviceManager,
    pub bridge: Bridge,
    pub rx: Arc<RxQueue>,
    events: Vec<TransportEvent>,
}

impl RtCore {
    pub fn new(
        session: SimSession<ReqTarget>,
        server: DeviceServer,
        bridge: Bridge,
        rx: Arc<RxQueue>,
    ) -> Self {
        Self {
            session,
            radar: AirplaneRadar::new(),
            user: LocalAircraft::new(),
            server,
            manager: DeviceManager::new(),
            bridge,
            rx,
            events: Vec::new(),
        }
    }

    /// One mutation pass: device traffic, simulator callbacks, radar timers,
    /// then queued UI commands.
    pub fn tick(&mut self, now: i64) {
        self.run_device();
        self.session.maybe_reconnect(now);
        self.pump_session(now);
        self.radar.on_update(&mut self.session.link, now);
        self.drain_commands(now);
    }

    // -- device ------------------------------------------------------------

    fn run_device(&mut self) {
        if !self.server.is_running() {
            return;
        }
        let mut events = std::mem::take(&mut self.events);
        self.server.run(&mut events);
        for event in events.drain(..) {
            self.handle_transport_event(event);
        }
        self.events = events;
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected {
                slot,
                endpoint,
                connected,
            } => {
                info!("{endpoint} - connected. Assigned ID: {slot}");
                if self.manager.update_connected(connected) == Some(true) {
                    self.send_system_state();
                }
            }

            TransportEvent::Disconnected {
                slot,
                endpoint,
                connected,
            } => {
                match endpoint {
                    Some(endpoint) => info!("{endpoint}:{slot} - disconnected"),
                    None => info!("{slot} - disconnected"),
                }
                if self.manager.update_connected(connected) == Some(false) {
                    self.send_system_state();
                }
            }

            TransportEvent::Data { payload, .. } => {
                if let Some((input_id, input_data)) = proto::parse_input(&payload) {
                    self.manager
                        .handle_input(&mut self.session.link, input_id, input_data);
                }
            }
        }
    }

    // -- simulator ---------------------------------------------------------

    fn pump_session(&mut self, now: i64) {
        loop {
            let (more, event) = self.session.step(now);
            if let Some(event) = event {
                self.handle_session_event(event, now);
            }
            if !more {
                break;
            }
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent<ReqTarget>, now: i64) {
        match event {
            SessionEvent::Connected => self.on_sim_connected(),
            SessionEvent::Disconnected => self.on_sim_disconnected(),
            SessionEvent::Link(event) => self.route_link_event(event, now),
        }
    }

    fn on_sim_connected(&mut self) {
        self.radar.initialize(&mut self.session.link, &mut self.bridge);
        self.user.initialize(&mut self.session.link, &mut self.bridge);
        self.manager.radio.initialize(&mut self.session.link);
        self.session.link.subscribe_to_sim_start();
        self.session.link.subscribe_to_sim_stop();
        self.session.link.subscribe_to_pause();
        self.send_system_state();
    }

    fn on_sim_disconnected(&mut self) {
        self.send_system_state();
        self.radar.shutdown(&mut self.bridge);
        self.user.remove(&mut self.session.link, &mut self.bridge);
        self.bridge.clear_pending_resync();
    }

    fn route_link_event(&mut self, event: LinkEvent<ReqTarget>, now: i64) {
        match event {
            LinkEvent::Data {
                target,
                object_id,
                data,
            } => match target {
                ReqTarget::RadarScan => {
                    if let Some(user_id) =
                        self.radar
                            .handle_scan(&mut self.session.link, object_id, &data, now)
                    {
                        self.user.set(&mut self.session.link, user_id, &mut self.bridge);
                    }
                }
                ReqTarget::RadarIdent => {
                    if let Some(user_id) =
                        self.radar.handle_ident(&mut self.session.link, object_id, &data)
                    {
                        self.user.set(&mut self.session.link, user_id, &mut self.bridge);
                    }
                }
                ReqTarget::RadarTrack => self.radar.handle_track(object_id, &data, &mut self.bridge),
                ReqTarget::UserIdent => {
                    self.user.handle_ident(&mut self.session.link, object_id, &data);
                }
                ReqTarget::UserTrack => self.user.handle_track(&data, &mut self.bridge),
                ReqTarget::RadioFreq => self.manager.radio.handle_freq(&data),
                ReqTarget::RadioStby => {}
            },

            LinkEvent::Event { target, data } => {
                if target == ReqTarget::RadioStby {
                    self.manager.radio.handle_event(data);
                }
            }

            LinkEvent::ObjectAdded { kind, object_id } => {
                if matches!(kind, ObjectType::Aircraft | ObjectType::Helicopter) {
                    self.radar.add(object_id, now);
                }
            }

            LinkEvent::ObjectRemoved { kind, object_id } => {
                if matches!(kind, ObjectType::Aircraft | ObjectType::Helicopter)
                    && self.radar.remove(object_id, &mut self.bridge)
                {
                    self.user.remove(&mut self.session.link, &mut self.bridge);
                }
            }

            LinkEvent::SimStart => debug!("SimStart"),
            LinkEvent::SimStop => debug!("SimStop"),
            LinkEvent::Pause(paused) => debug!("Paused: {paused}"),

            // Absorbed by the session.
            LinkEvent::Open(_) | LinkEvent::Quit | LinkEvent::Exception { .. } => {}
        }
    }

    // -- commands ----------------------------------------------------------

    fn drain_commands(&mut self, now: i64) {
        while let Some((cmd, value)) = self.rx.pop() {
            self.exec_command(cmd, value, now);
        }
    }

    pub fn exec_command(&mut self, cmd: RxCmd, value: u64, now: i64) {
        match cmd {
            RxCmd::Resync => {
                self.radar.resync(&mut self.bridge);
                self.user.resync(&mut self.bridge);
            }

            RxCmd::ChangeSimLinkStatus => {
                if value != 0 {
                    if self.session.is_connected() {
                        self.send_system_state();
                    } else {
                        self.session.initialize(now);
                    }
                } else if self.session.is_connected() {
                    self.session.shutdown(now);
                    self.on_sim_disconnected();
                } else {
                    self.send_system_state();
                }
            }

            RxCmd::ChangeServerStatus => {
                if value != 0 {
                    if !self.server.is_running() {
                        self.server.start();
                    }
                    self.send_system_state();
                } else if self.server.is_running() {
                    self.stop_server();
                } else {
                    self.send_system_state();
                }
            }

            RxCmd::ReconnectToSim => {
                self.session.allow_reconnect(value != 0, now);
                self.bridge
                    .send_system_props(self.session.is_reconnect_allowed());
            }
        }
    }

    // -- admin (CLI, under cmd mode) ---------------------------------------

    pub fn admin_kick(&mut self, id: crate::device::transport::SlotId) {
        let mut events = std::mem::take(&mut self.events);
        self.server.kick(id, &mut events);
        for event in events.drain(..) {
            self.handle_transport_event(event);
        }
        self.events = events;
    }

    pub fn admin_kick_all(&mut self) {
        let mut events = std::mem::take(&mut self.events);
        self.server.kick_all(&mut events);
        for event in events.drain(..) {
            self.handle_transport_event(event);
        }
        self.events = events;
    }

    pub fn admin_reboot_devices(&mut self) {
        self.manager.reboot_into_dev_mode(&mut self.server);
    }

    fn stop_server(&mut self) {
        let mut events = std::mem::take(&mut self.events);
        self.server.stop(&mut events);
        for event in events.drain(..) {
            self.handle_transport_event(event);
        }
        self.events = events;
        self.send_system_state();
    }

    // -- state -------------------------------------------------------------

    pub fn send_system_state(&self) {
        self.bridge.send_system_state(&self.system_state());
    }

    fn system_state(&self) -> SystemState {
        let sim = if self.session.is_connected() {
            SimStatus::Connected {
                name: self.session.sim_name().to_owned(),
            }
        } else {
            SimStatus::Disconnected
        };
        let srv = if !self.server.is_running() {
            SrvStatus::Stopped
        } else if self.manager.is_connected() {
            SrvStatus::DeviceConnected
        } else {
            SrvStatus::Running
        };
        SystemState { sim, srv }
    }

    /// Final pass on thread exit: close the link and the server, discard
    /// whatever the UIs still had queued.
    pub fn shutdown(&mut self) {
        let now = clock::steady_now_ms();
        if self.session.shutdown(now) {
            self.on_sim_disconnected();
        }
        let mut events = std::mem::take(&mut self.events);
        self.server.stop(&mut events);
        events.clear();
        self.events = events;
        self.rx.clear();
    }
}

// ---------------------------------------------------------------------------
// Thread handle
// ---------------------------------------------------------------------------

/// State shared between the real-time thread and UI-side threads.
pub struct RtShared {
    core: Mutex<RtCore>,
    stop: AtomicBool,
}

impl RtShared {
    pub fn new(core: RtCore) -> Self {
        Self {
            core: Mutex::new(core),
            stop: AtomicBool::new(false),
        }
    }

    /// Take the cmd-mode lock. Hold it for the minimum necessary window; the
    /// real-time thread competes for it every 20 ms.
    pub fn enter_cmd_mode(&self) -> MutexGuard<'_, RtCore> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

pub struct RtThread {
    handle: Option<JoinHandle<()>>,
}

impl RtThread {
    pub fn start(shared: Arc<RtShared>) -> Self {
        let handle = std::thread::Builder::new()
            .name("airlink-rt".into())
            .spawn(move || run(shared))
            .expect("failed to spawn real-time thread");
        Self {
            handle: Some(handle),
        }
    }

    /// Signal the loop to stop and wait for its final iteration.
    pub fn stop(&mut self, shared: &RtShared) {
        shared.request_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(shared: Arc<RtShared>) {
    loop {
        {
            let mut core = shared.enter_cmd_mode();
            if shared.stop.load(Ordering::Relaxed) {
                core.shutdown();
                break;
            }
            core.tick(clock::steady_now_ms());
        }
        clock::sleep_ms(TICK_MS);
    }
}
