//! Connection lifecycle towards the companion UDP server.
//!
//! A [`Session`] resolves the server's next hop over ARP, sends text requests once the address
//! is known and applies the server's replies (wall-clock time, liveness). All waiting goes
//! through the chip's [`Delay`], in fixed steps, so the caller stays in control of time.

use core::fmt;
use core::net::Ipv4Addr;
use std::time::Duration;

use enclink_chip::{Delay, Enc28j60, InitError, SpiBus};
use time::PrimitiveDateTime;

use crate::config::{NodeConfig, SessionConfig, MAX_KEEPALIVE_WAIT};
use crate::event::{EventSink, Priority};
use crate::message::{format_time, MessageError, Reply, Request};
use crate::stack::{NetworkStack, StackError};

/// Keepalive wait used by [`Session::reconnect`] when asked to probe.
pub const RECONNECT_PROBE_WAIT: Duration = Duration::from_secs(3);

const EVENT_SOURCE: &str = "transport";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    Idle,
    Connecting,
    Connected,
    /// No IPv4 configuration. Only [`Session::reconnect`] leaves this state.
    Error,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkState::Idle => "IDLE",
            LinkState::Connecting => "CONNECTING",
            LinkState::Connected => "CONNECTED",
            LinkState::Error => "ERROR",
        })
    }
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("not connected to the server (state {0})")]
    NotConnected(LinkState),
    #[error(transparent)]
    Stack(#[from] StackError),
    #[error(transparent)]
    Init(#[from] InitError),
}

pub struct Session<B, D> {
    stack: NetworkStack<B, D>,
    cfg: SessionConfig,
    state: LinkState,
    /// Signed because a failed resolution round costs more than one unit.
    budget: i64,
    kill_switch: bool,
    server_alive: bool,
    clock: Option<PrimitiveDateTime>,
}

impl<B: SpiBus, D: Delay> Session<B, D> {
    /// Brings up the chip and wraps it in a stack and a session.
    pub fn open(bus: B, delay: D, node: NodeConfig) -> Result<Self, SessionError> {
        Self::open_with_sink(bus, delay, node, None)
    }

    pub fn open_with_sink(
        bus: B,
        delay: D,
        node: NodeConfig,
        sink: Option<Box<dyn EventSink>>,
    ) -> Result<Self, SessionError> {
        let nic = Enc28j60::new(bus, delay, node.chip)?;
        let stack = NetworkStack::with_sink(nic, node.stack, sink);
        Ok(Self::new(stack, node.session))
    }

    pub fn new(stack: NetworkStack<B, D>, cfg: SessionConfig) -> Self {
        Self {
            stack,
            budget: i64::from(cfg.retry_budget),
            cfg,
            state: LinkState::Idle,
            kill_switch: false,
            server_alive: false,
            clock: None,
        }
    }

    fn emit(&mut self, priority: Priority, message: &str) {
        self.stack.emit(EVENT_SOURCE, priority, message);
    }

    fn pause(&mut self, duration: Duration) {
        let ms = u32::try_from(duration.as_millis()).unwrap_or(u32::MAX);
        self.stack.delay_ms(ms);
    }

    fn resolve_server(&mut self) {
        if let Err(err) = self.stack.connect(self.cfg.server_ip) {
            tracing::warn!(%err, server = %self.cfg.server_ip, "address resolution request failed");
        }
    }

    /// Runs one iteration of the connection loop and reports whether the loop is finished:
    /// connected, failed for lack of IPv4, or out of budget (back to [`LinkState::Idle`]).
    ///
    /// Every iteration costs one unit of the retry budget and drains the chip first, including
    /// the one that ends in [`LinkState::Error`]. An unanswered resolution round costs two more.
    pub fn step(&mut self) -> bool {
        if matches!(self.state, LinkState::Connected | LinkState::Error) {
            return true;
        }

        self.budget -= 1;
        self.stack.poll();

        if self.budget <= 0 {
            self.state = LinkState::Idle;
            self.emit(Priority::Error, "Connection failed");
            self.pause(self.cfg.attempt_delay);
            self.budget = i64::from(self.cfg.retry_budget);
            return true;
        }

        match self.state {
            LinkState::Idle => {
                if !self.stack.is_ipv4_configured() {
                    self.emit(Priority::Error, "IPv4 is not configured");
                    self.pause(self.cfg.attempt_delay);
                    self.state = LinkState::Error;
                    return true;
                }
                self.emit(Priority::Info, "Trying to connect");
                self.pause(self.cfg.attempt_delay);
                self.resolve_server();
                self.state = LinkState::Connecting;
                self.budget += 1;
                false
            }
            LinkState::Connecting => {
                if self.stack.is_resolved(self.cfg.server_ip) {
                    self.emit(Priority::Info, "Server address resolved");
                    self.pause(self.cfg.attempt_delay);
                    self.state = LinkState::Connected;
                    self.budget += 1;
                    return true;
                }
                self.emit(Priority::Debug, "Server address not resolved yet");
                self.pause(self.cfg.attempt_delay);
                self.resolve_server();
                self.budget -= 2;
                false
            }
            LinkState::Connected | LinkState::Error => true,
        }
    }

    /// Steps the connection loop until it settles and returns the resulting state.
    pub fn try_connect(&mut self) -> LinkState {
        while !self.step() {}
        self.state
    }

    /// Sends `payload` to the server, connecting first if needed. A failed send drops the
    /// session back to [`LinkState::Idle`].
    pub fn send(&mut self, payload: &str) -> Result<usize, SessionError> {
        if self.state != LinkState::Connected && self.try_connect() != LinkState::Connected {
            return Err(SessionError::NotConnected(self.state));
        }
        match self.stack.send_udp(
            self.cfg.server_ip,
            self.cfg.server_port,
            self.cfg.local_port,
            payload.as_bytes(),
        ) {
            Ok(len) => {
                tracing::debug!(len, "data sent");
                Ok(len)
            }
            Err(err) => {
                self.emit(Priority::Warning, &format!("Failed to send data: {err}"));
                self.state = LinkState::Idle;
                Err(err.into())
            }
        }
    }

    pub fn send_request(&mut self, request: &Request) -> Result<usize, SessionError> {
        self.send(&request.to_string())
    }

    /// Asks the server for wall-clock time. The answer is applied by a later
    /// [`Session::tick`] or [`Session::next_reply`].
    pub fn request_time(&mut self) -> Result<usize, SessionError> {
        self.send_request(&Request::Time)
    }

    pub fn announce(&mut self, device_id: &str) -> Result<usize, SessionError> {
        self.send_request(&Request::Id(device_id.to_owned()))
    }

    pub fn send_message(&mut self, text: &str) -> Result<usize, SessionError> {
        self.send_request(&Request::Msg(text.to_owned()))
    }

    /// Sends an alive probe and waits up to `wait` (default from config, never more than
    /// [`MAX_KEEPALIVE_WAIT`]) for an `alive` reply. Other replies that arrive meanwhile are
    /// applied as usual.
    pub fn probe_alive(&mut self, wait: Option<Duration>) -> Result<bool, SessionError> {
        self.server_alive = false;
        if let Err(err) = self.send_request(&Request::Alive) {
            self.emit(Priority::Warning, "Server is Dead");
            return Err(err);
        }

        let wait = wait.unwrap_or(self.cfg.keepalive_timeout).min(MAX_KEEPALIVE_WAIT);
        let interval = self.cfg.poll_interval.max(Duration::from_millis(1));
        let mut waited = Duration::ZERO;
        loop {
            self.receive();
            self.drain_replies();
            if self.server_alive || waited >= wait {
                break;
            }
            let step = interval.min(wait - waited);
            self.pause(step);
            waited += step;
        }

        if self.server_alive {
            self.emit(Priority::Info, "Server is Alive");
        } else {
            self.emit(Priority::Warning, "Server is Dead");
        }
        Ok(self.server_alive)
    }

    /// Drains the chip. When the flood guard has closed, queued payloads are discarded and the
    /// kill switch engages until [`Session::cool_down`].
    pub fn receive(&mut self) -> usize {
        let frames = self.stack.poll();
        if !self.stack.dos().overall_accepting() {
            self.stack.clear_udp_queue();
            if !self.kill_switch {
                self.kill_switch = true;
                self.emit(Priority::Critical, "Kill switch engaged");
            }
        }
        frames
    }

    /// Decodes the oldest queued payload and applies it.
    pub fn next_reply(&mut self) -> Option<Result<Reply, MessageError>> {
        let payload = self.stack.pop_udp_payload()?;
        let reply = Reply::parse(&payload);
        match &reply {
            Ok(reply) => self.apply(reply),
            Err(err) => tracing::debug!(%err, %payload, "undecodable reply"),
        }
        Some(reply)
    }

    fn apply(&mut self, reply: &Reply) {
        match reply {
            Reply::Time(at) => {
                self.clock = Some(*at);
                tracing::info!(time = %format_time(*at), "clock updated");
            }
            Reply::Alive(_) => self.server_alive = true,
            Reply::Ack(_) | Reply::Other { .. } => {}
        }
    }

    fn drain_replies(&mut self) -> usize {
        let mut applied = 0;
        while let Some(reply) = self.next_reply() {
            if reply.is_ok() {
                applied += 1;
            }
        }
        applied
    }

    /// Waits out a flood, then reopens the limiter and releases the kill switch.
    pub fn cool_down(&mut self, duration: Duration) {
        self.emit(
            Priority::Warning,
            &format!("Cooling down for {}s", duration.as_secs()),
        );
        let mut remaining = duration;
        while !remaining.is_zero() {
            let step = remaining.min(Duration::from_secs(1));
            self.pause(step);
            remaining -= step;
        }
        self.stack.reset_dos();
        self.kill_switch = false;
        self.emit(Priority::Info, "DoS protection reset");
    }

    /// Forgets every ARP entry and runs the connection loop again from [`LinkState::Idle`],
    /// optionally confirming the server with a short alive probe.
    pub fn reconnect(&mut self, probe: bool) -> LinkState {
        self.stack.arp_table_mut().clear();
        self.state = LinkState::Idle;
        self.budget = i64::from(self.cfg.retry_budget);
        let state = self.try_connect();
        if probe && state == LinkState::Connected {
            if let Err(err) = self.probe_alive(Some(RECONNECT_PROBE_WAIT)) {
                tracing::warn!(%err, "alive probe after reconnect failed");
            }
        }
        self.state
    }

    /// Re-runs the chip initialisation sequence.
    pub fn refresh(&mut self) -> Result<(), SessionError> {
        Ok(self.stack.refresh()?)
    }

    /// Last time reported by the server, if any.
    pub fn date_and_time(&self) -> Option<PrimitiveDateTime> {
        self.clock
    }

    /// Single cooperative entry point: notes link changes, drains the chip and applies every
    /// queued reply. Returns the number of replies applied.
    pub fn tick(&mut self) -> usize {
        if let Err(err) = self.stack.check_link() {
            tracing::warn!(%err, "link status unavailable");
        }
        self.receive();
        self.drain_replies()
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    pub fn kill_switch(&self) -> bool {
        self.kill_switch
    }

    pub fn is_server_alive(&self) -> bool {
        self.server_alive
    }

    pub fn retry_budget(&self) -> i64 {
        self.budget
    }

    pub fn server(&self) -> (Ipv4Addr, u16) {
        (self.cfg.server_ip, self.cfg.server_port)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.cfg
    }

    pub fn stack(&self) -> &NetworkStack<B, D> {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut NetworkStack<B, D> {
        &mut self.stack
    }
}
