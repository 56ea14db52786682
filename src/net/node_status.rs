//! Per-peer status: handshake progression, violations, disconnection
//!
//! A `NodeStatus` is owned by its peer's connection actor; every mutation
//! flows through the owner and emits a change event on a broadcast
//! channel, so the peer manager and tests observe snapshots without
//! locking into the actor's state. Reaching the violation threshold fires
//! a single disconnect event, no matter how the threshold was crossed.

use crate::error::CoreError;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Violation accumulation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    Small,
    Medium,
    Big,
}

impl Violation {
    pub fn score(self) -> u32 {
        match self {
            Violation::Small => 10,
            Violation::Medium => 20,
            Violation::Big => 50,
        }
    }
}

/// Accumulated violation score forcing a disconnect (inclusive).
pub const DISCONNECT_THRESHOLD: u32 = 100;

/// Handshake progression. The only accepting path runs
/// `None -> (SentVersion | ReceivedVersion) -> VersionReceived -> Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing exchanged yet
    None,
    /// Our version is out, theirs has not arrived
    SentVersion,
    /// Their version arrived before we sent ours
    ReceivedVersion,
    /// Both versions exchanged, awaiting verack
    VersionReceived,
    /// Verack received, the peer is live
    Finished,
}

/// Why a peer was disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Violation score reached the threshold
    ViolationThreshold,
    /// Local decision (shutdown, eviction)
    Requested,
    /// Handshake deadline expired
    HandshakeTimeout,
}

/// Field identifiers for change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusField {
    ProtocolVersion,
    Services,
    Nonce,
    UserAgent,
    StartHeight,
    Relay,
    FeeFilter,
    SendCompact,
    SendCompactVer,
    LastSeen,
    Handshake,
    Violation,
    Disconnected,
}

/// Snapshot of a field's new value, carried inside change events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    I32(i32),
    U32(u32),
    U64(u64),
    I64(i64),
    Bool(bool),
    Text(String),
    State(HandshakeState),
}

/// Observable per-peer events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Changed {
        field: StatusField,
        value: FieldValue,
    },
    Disconnect {
        reason: DisconnectReason,
    },
}

/// Handshake timing configuration.
#[derive(Debug, Clone, Copy)]
pub struct HandshakeConfig {
    pub deadline: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        HandshakeConfig {
            deadline: Duration::from_secs(60),
        }
    }
}

/// Per-peer connection record.
#[derive(Debug)]
pub struct NodeStatus {
    address: SocketAddr,
    protocol_version: i32,
    services: u64,
    nonce: u64,
    user_agent: String,
    start_height: i32,
    relay: bool,
    fee_filter: i64,
    send_compact: bool,
    send_compact_ver: u64,
    last_seen: Instant,
    handshake: HandshakeState,
    violation: u32,
    disconnected: bool,
    disconnect_fired: bool,
    started_at: Instant,
    config: HandshakeConfig,
    events: broadcast::Sender<StatusEvent>,
}

impl NodeStatus {
    pub fn new(address: SocketAddr) -> Self {
        Self::with_config(address, HandshakeConfig::default())
    }

    pub fn with_config(address: SocketAddr, config: HandshakeConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        let now = Instant::now();
        NodeStatus {
            address,
            protocol_version: 0,
            services: 0,
            nonce: 0,
            user_agent: String::new(),
            start_height: 0,
            relay: false,
            fee_filter: 0,
            send_compact: false,
            send_compact_ver: 0,
            last_seen: now,
            handshake: HandshakeState::None,
            violation: 0,
            disconnected: false,
            disconnect_fired: false,
            started_at: now,
            config,
            events,
        }
    }

    /// Subscribe to change and disconnect events.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    fn emit(&self, field: StatusField, value: FieldValue) {
        // Nobody listening is fine; events are best-effort observability
        let _ = self.events.send(StatusEvent::Changed { field, value });
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn protocol_version(&self) -> i32 {
        self.protocol_version
    }

    pub fn set_protocol_version(&mut self, version: i32) {
        self.protocol_version = version;
        self.emit(StatusField::ProtocolVersion, FieldValue::I32(version));
    }

    pub fn services(&self) -> u64 {
        self.services
    }

    pub fn set_services(&mut self, services: u64) {
        self.services = services;
        self.emit(StatusField::Services, FieldValue::U64(services));
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn set_nonce(&mut self, nonce: u64) {
        self.nonce = nonce;
        self.emit(StatusField::Nonce, FieldValue::U64(nonce));
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn set_user_agent(&mut self, user_agent: String) {
        self.emit(StatusField::UserAgent, FieldValue::Text(user_agent.clone()));
        self.user_agent = user_agent;
    }

    pub fn start_height(&self) -> i32 {
        self.start_height
    }

    pub fn set_start_height(&mut self, height: i32) {
        self.start_height = height;
        self.emit(StatusField::StartHeight, FieldValue::I32(height));
    }

    pub fn relay(&self) -> bool {
        self.relay
    }

    pub fn set_relay(&mut self, relay: bool) {
        self.relay = relay;
        self.emit(StatusField::Relay, FieldValue::Bool(relay));
    }

    pub fn fee_filter(&self) -> i64 {
        self.fee_filter
    }

    pub fn set_fee_filter(&mut self, fee_rate: i64) {
        self.fee_filter = fee_rate;
        self.emit(StatusField::FeeFilter, FieldValue::I64(fee_rate));
    }

    pub fn send_compact(&self) -> bool {
        self.send_compact
    }

    pub fn set_send_compact(&mut self, announce: bool) {
        self.send_compact = announce;
        self.emit(StatusField::SendCompact, FieldValue::Bool(announce));
    }

    pub fn send_compact_ver(&self) -> u64 {
        self.send_compact_ver
    }

    /// Monotonic: assignments below the current version are ignored.
    pub fn set_send_compact_ver(&mut self, version: u64) {
        if version < self.send_compact_ver {
            return;
        }
        self.send_compact_ver = version;
        self.emit(StatusField::SendCompactVer, FieldValue::U64(version));
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    /// Stamp message receipt time.
    pub fn stamp_last_seen(&mut self) {
        self.last_seen = Instant::now();
        self.emit(
            StatusField::LastSeen,
            FieldValue::U64(self.last_seen.duration_since(self.started_at).as_millis() as u64),
        );
    }

    pub fn handshake(&self) -> HandshakeState {
        self.handshake
    }

    pub fn violation(&self) -> u32 {
        self.violation
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    fn set_handshake(&mut self, state: HandshakeState) {
        self.handshake = state;
        self.emit(StatusField::Handshake, FieldValue::State(state));
    }

    /// Add to the violation score. Crossing the threshold (inclusive)
    /// disconnects the peer; the event fires exactly once.
    pub fn add_violation(&mut self, violation: Violation) {
        self.violation = self.violation.saturating_add(violation.score());
        log::debug!(
            "peer {}: violation {:?} (+{}), score {}",
            self.address,
            violation,
            violation.score(),
            self.violation
        );
        self.emit(StatusField::Violation, FieldValue::U32(self.violation));
        if self.violation >= DISCONNECT_THRESHOLD {
            self.disconnect(DisconnectReason::ViolationThreshold);
        }
    }

    /// Translate a decoding failure into its penalty. Hostile framing
    /// (bad magic, oversized, bad checksum) costs Big.
    pub fn penalize_error(&mut self, error: &CoreError) {
        match error {
            CoreError::Protocol(_) => self.add_violation(Violation::Big),
            CoreError::Malformed(_) | CoreError::EndOfStream => {
                self.add_violation(Violation::Medium)
            }
            _ => self.add_violation(Violation::Small),
        }
    }

    /// Mark the peer disconnected. Idempotent for the event: setting the
    /// flag again never re-fires, later field mutations stay permitted.
    pub fn disconnect(&mut self, reason: DisconnectReason) {
        if !self.disconnected {
            self.disconnected = true;
            self.emit(StatusField::Disconnected, FieldValue::Bool(true));
        }
        if !self.disconnect_fired {
            self.disconnect_fired = true;
            log::info!("peer {}: disconnect ({reason:?})", self.address);
            let _ = self.events.send(StatusEvent::Disconnect { reason });
        }
    }

    /// Record that our version message went out.
    pub fn version_sent(&mut self) {
        match self.handshake {
            HandshakeState::None => self.set_handshake(HandshakeState::SentVersion),
            HandshakeState::ReceivedVersion => self.set_handshake(HandshakeState::VersionReceived),
            // Re-sending version is our bug, not the peer's; ignore
            _ => {}
        }
    }

    /// Apply a received `version` payload. Out-of-order receipt is a
    /// Medium violation.
    pub fn version_received(&mut self, message: &crate::net::message::VersionMessage) {
        self.stamp_last_seen();
        match self.handshake {
            HandshakeState::None => self.set_handshake(HandshakeState::ReceivedVersion),
            HandshakeState::SentVersion => self.set_handshake(HandshakeState::VersionReceived),
            _ => {
                log::warn!("peer {}: duplicate version message", self.address);
                self.add_violation(Violation::Medium);
                return;
            }
        }
        self.set_protocol_version(message.version);
        self.set_services(message.services);
        self.set_nonce(message.nonce);
        self.set_user_agent(message.user_agent.clone());
        self.set_start_height(message.start_height);
        self.set_relay(message.relay);
    }

    /// Apply a received `verack`. Only valid once both versions are
    /// exchanged.
    pub fn verack_received(&mut self) {
        self.stamp_last_seen();
        match self.handshake {
            HandshakeState::VersionReceived => self.set_handshake(HandshakeState::Finished),
            _ => {
                log::warn!("peer {}: verack out of order", self.address);
                self.add_violation(Violation::Medium);
            }
        }
    }

    /// Whether a non-handshake message is acceptable yet.
    pub fn handshake_finished(&self) -> bool {
        self.handshake == HandshakeState::Finished
    }

    /// A non-handshake message before the handshake completes is a
    /// Medium violation.
    pub fn unexpected_message(&mut self, command: &str) {
        log::warn!(
            "peer {}: '{command}' before handshake completion",
            self.address
        );
        self.add_violation(Violation::Medium);
    }

    /// Whether the handshake deadline has passed without completion.
    pub fn handshake_overdue(&self, now: Instant) -> bool {
        !self.handshake_finished()
            && now.duration_since(self.started_at) >= self.config.deadline
    }

    /// Expire the handshake: Big violation and forced disconnect.
    pub fn expire_handshake(&mut self) {
        log::warn!("peer {}: handshake deadline expired", self.address);
        self.add_violation(Violation::Big);
        self.disconnect(DisconnectReason::HandshakeTimeout);
    }

    /// Deadline check for the owning actor's timer tick. Expires the
    /// handshake and reports `Timeout` when it is overdue.
    pub fn check_handshake_deadline(&mut self, now: Instant) -> crate::error::Result<()> {
        if self.handshake_overdue(now) {
            self.expire_handshake();
            return Err(CoreError::Timeout);
        }
        Ok(())
    }
}
