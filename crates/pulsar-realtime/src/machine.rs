//! Connection lifecycle state machine.
//!
//! [`ConnectionMachine`] holds the state, the reconnect counter, and a
//! generation token. Each transition returns the [`Effect`]s the driver must
//! carry out; the machine itself performs no I/O, which keeps every lifecycle
//! rule testable without a runtime.
//!
//! The generation is bumped by every `connect` and `disconnect`. Completions
//! (open success, open failure, close) carry the generation of the attempt
//! that produced them, and a mismatch marks them stale.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::events::{ClientEvent, ConnectionState};
use crate::policy::ReconnectPolicy;

/// Side effect requested by a transition, applied in order by the driver.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Drop the pending reconnect timer, if any.
    CancelReconnect,
    /// Resolve the credential, build the URL and start opening a transport.
    Open {
        /// Generation the open completes with.
        generation: u64,
    },
    /// Drop any in-flight open.
    AbortOpen,
    /// Start the liveness interval.
    StartHeartbeat,
    /// Stop the liveness interval.
    StopHeartbeat,
    /// Close and drop the current link.
    CloseTransport,
    /// Close a link that completed for a superseded attempt.
    CloseStale,
    /// Arm the reconnect timer.
    ScheduleReconnect {
        /// Wait before the retry.
        delay: Duration,
    },
    /// Publish a lifecycle event.
    Emit(ClientEvent),
}

/// Lifecycle state machine for one client.
#[derive(Debug)]
pub struct ConnectionMachine {
    state: ConnectionState,
    attempts: u32,
    generation: u64,
    policy: ReconnectPolicy,
}

impl ConnectionMachine {
    /// Create an idle machine.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Idle,
            attempts: 0,
            generation: 0,
            policy,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Retries made since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a completion tagged `generation` belongs to the live attempt.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    fn transition(&mut self, to: ConnectionState) {
        if self.state != to {
            debug!(from = %self.state, %to, generation = self.generation, "state transition");
            self.state = to;
        }
    }

    fn begin_attempt(&mut self) -> Vec<Effect> {
        self.generation += 1;
        self.transition(ConnectionState::Connecting);
        vec![
            Effect::CancelReconnect,
            Effect::Open {
                generation: self.generation,
            },
        ]
    }

    /// Caller-initiated connect. No-op while `Open` or `Connecting`.
    ///
    /// The counter is reset only when starting from `Idle`, so a connect
    /// issued while a retry is pending keeps counting toward the limit.
    pub fn connect(&mut self) -> Vec<Effect> {
        match self.state {
            ConnectionState::Open | ConnectionState::Connecting => {
                debug!(state = %self.state, "connect ignored, already active");
                Vec::new()
            }
            ConnectionState::Idle => {
                self.attempts = 0;
                self.begin_attempt()
            }
            ConnectionState::Closing | ConnectionState::ReconnectScheduled => self.begin_attempt(),
        }
    }

    /// The reconnect timer fired.
    pub fn reconnect_due(&mut self) -> Vec<Effect> {
        if self.state != ConnectionState::ReconnectScheduled {
            debug!(state = %self.state, "stale reconnect timer ignored");
            return Vec::new();
        }
        info!(attempt = self.attempts, "reconnecting");
        self.begin_attempt()
    }

    /// The transport for `generation` opened.
    pub fn opened(&mut self, generation: u64) -> Vec<Effect> {
        if !self.is_current(generation) || self.state != ConnectionState::Connecting {
            debug!(generation, current = self.generation, "stale open, closing it");
            return vec![Effect::CloseStale];
        }
        self.attempts = 0;
        self.transition(ConnectionState::Open);
        info!(generation, "connected");
        vec![
            Effect::StartHeartbeat,
            Effect::Emit(ClientEvent::Connected { generation }),
        ]
    }

    /// The open for `generation` failed, or its connection closed abnormally.
    pub fn failed(&mut self, generation: u64, reason: &str) -> Vec<Effect> {
        if !self.is_current(generation)
            || !matches!(
                self.state,
                ConnectionState::Open | ConnectionState::Connecting
            )
        {
            debug!(generation, state = %self.state, reason, "stale failure ignored");
            return Vec::new();
        }

        self.transition(ConnectionState::Closing);
        let mut effects = vec![
            Effect::StopHeartbeat,
            Effect::CloseTransport,
            Effect::Emit(ClientEvent::ConnectionLost {
                reason: reason.to_string(),
            }),
        ];

        if self.policy.allows(self.attempts) {
            self.attempts += 1;
            let delay = self.policy.delay_for(self.attempts);
            self.transition(ConnectionState::ReconnectScheduled);
            warn!(
                reason,
                attempt = self.attempts,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "connection lost, reconnect scheduled"
            );
            effects.push(Effect::ScheduleReconnect { delay });
            effects.push(Effect::Emit(ClientEvent::ReconnectScheduled {
                attempt: self.attempts,
                delay,
            }));
        } else {
            self.transition(ConnectionState::Idle);
            error!(
                reason,
                attempts = self.attempts,
                "max reconnection attempts reached"
            );
            effects.push(Effect::Emit(ClientEvent::RetriesExhausted {
                attempts: self.attempts,
            }));
        }
        effects
    }

    /// Caller-initiated disconnect. Never schedules a reconnect.
    pub fn disconnect(&mut self) -> Vec<Effect> {
        let was = self.state;
        self.generation += 1;
        self.transition(ConnectionState::Idle);

        let mut effects = vec![
            Effect::CancelReconnect,
            Effect::AbortOpen,
            Effect::StopHeartbeat,
            Effect::CloseTransport,
        ];
        if was != ConnectionState::Idle {
            info!(from = %was, "disconnected by caller");
            effects.push(Effect::Emit(ClientEvent::Disconnected));
        }
        effects
    }
}
