//! Backoff policies and the connection link state machine.
//!
//! Two independent policies live here:
//!
//! - [`ReconnectPolicy`]: connection level, exponential, applied after an
//!   unexpected close.
//! - [`RetryPolicy`]: request level, linear, applied by the retry wrapper.
//!
//! # Link State Machine
//!
//! ```text
//!            acquire()                 opened
//!   ┌──────┐ ────────► ┌────────────┐ ───────► ┌──────┐
//!   │ Idle │           │ Connecting │          │ Open │
//!   └──────┘ ◄──────── └────────────┘          └──────┘
//!      ▲   on-demand     ▲        │ reconnect      │ abnormal
//!      │   failure       │        │ failure        │ close
//!      │                 │ timer  ▼                ▼
//!      │  attempts    ┌─────────────────────────────────┐
//!      └───────────── │ Backoff { attempt, delay }      │
//!         exhausted   └─────────────────────────────────┘
//! ```
//!
//! `ShutDown` is reachable from every state and only left through `restart`.
//! The machine performs no I/O; the connection manager applies its decisions.

use crate::domain::error::ChannelError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// WebSocket close code for a normal, intentional closure.
pub const NORMAL_CLOSE_CODE: u16 = 1000;

/// Exponential reconnect policy: `min(base * 2^attempts, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Consecutive failures tolerated before giving up
    pub max_attempts: u32,
    /// Delay before the first reconnect
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Upper bound for any single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl ReconnectPolicy {
    /// Delay to wait when `attempts` reconnects have already been scheduled.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let factor = 1u32.checked_shl(attempts).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Linear request retry policy: wait `step * (attempt + 1)` after failure
/// number `attempt`, at most `max_retries` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Linear backoff step
    #[serde(with = "humantime_serde")]
    pub step: Duration,
    /// Whether an explicit server rejection is retried like a transport error
    pub retry_remote_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            step: Duration::from_millis(1000),
            retry_remote_errors: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// How long to wait before retrying after `attempt` (0-based) failed with
    /// `error`, or `None` when the error should be returned as is.
    pub fn delay_after(&self, attempt: u32, error: &ChannelError) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        if error.is_remote_rejection() && !self.retry_remote_errors {
            return None;
        }
        self.step.checked_mul(attempt + 1)
    }
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Normal close code, or a close we initiated
    Normal,
    /// Anything else, including the transport vanishing without a close frame
    Abnormal,
}

impl CloseKind {
    /// Classify a received close code; `None` means no close frame at all.
    pub fn from_code(code: Option<u16>) -> Self {
        match code {
            Some(NORMAL_CLOSE_CODE) => CloseKind::Normal,
            _ => CloseKind::Abnormal,
        }
    }
}

/// Observable lifecycle of the shared connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No connection and nothing scheduled
    Idle,
    /// A connect attempt is in flight
    Connecting {
        /// Whether the attempt belongs to a reconnect sequence
        reconnect: bool,
    },
    /// Connection is open
    Open,
    /// Waiting out a reconnect delay
    Backoff {
        /// 1-based number of this reconnect attempt
        attempt: u32,
        delay: Duration,
    },
    /// Shut down by the owner
    ShutDown,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Idle => write!(f, "idle"),
            LinkState::Connecting { reconnect: false } => write!(f, "connecting"),
            LinkState::Connecting { reconnect: true } => write!(f, "reconnecting"),
            LinkState::Open => write!(f, "open"),
            LinkState::Backoff { attempt, delay } => {
                write!(f, "backoff(attempt={}, delay={}ms)", attempt, delay.as_millis())
            }
            LinkState::ShutDown => write!(f, "shut-down"),
        }
    }
}

/// Pure reconnect state machine.
#[derive(Debug, Clone)]
pub struct LinkMachine {
    state: LinkState,
    reconnect_attempts: u32,
    policy: ReconnectPolicy,
}

impl LinkMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: LinkState::Idle,
            reconnect_attempts: 0,
            policy,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Reconnects scheduled since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn is_shut_down(&self) -> bool {
        self.state == LinkState::ShutDown
    }

    /// A connect attempt starts. Returns false if shut down.
    ///
    /// An on-demand attempt made while reconnects are pending continues the
    /// reconnect sequence, so its failure advances the backoff.
    pub fn begin_connect(&mut self, reconnect: bool) -> bool {
        if self.is_shut_down() {
            return false;
        }
        self.state = LinkState::Connecting {
            reconnect: reconnect || self.reconnect_attempts > 0,
        };
        true
    }

    /// Connect attempt succeeded.
    pub fn connected(&mut self) {
        if self.is_shut_down() {
            return;
        }
        self.state = LinkState::Open;
        self.reconnect_attempts = 0;
    }

    /// Connect attempt failed. A failed reconnect advances the backoff; a
    /// failed on-demand attempt just returns to idle.
    pub fn connect_failed(&mut self) -> Option<Duration> {
        match self.state {
            LinkState::Connecting { reconnect: true } => self.backoff(),
            LinkState::ShutDown => None,
            _ => {
                self.state = LinkState::Idle;
                None
            }
        }
    }

    /// The open connection went away.
    pub fn closed(&mut self, kind: CloseKind) -> Option<Duration> {
        if self.is_shut_down() {
            return None;
        }
        match kind {
            CloseKind::Normal => {
                self.state = LinkState::Idle;
                None
            }
            CloseKind::Abnormal => self.backoff(),
        }
    }

    pub fn shutdown(&mut self) {
        self.state = LinkState::ShutDown;
        self.reconnect_attempts = 0;
    }

    /// Leave `ShutDown`. No-op in any other state.
    pub fn restart(&mut self) {
        if self.is_shut_down() {
            self.state = LinkState::Idle;
        }
    }

    fn backoff(&mut self) -> Option<Duration> {
        if self.reconnect_attempts < self.policy.max_attempts {
            let delay = self.policy.delay_for(self.reconnect_attempts);
            self.reconnect_attempts += 1;
            self.state = LinkState::Backoff {
                attempt: self.reconnect_attempts,
                delay,
            };
            Some(delay)
        } else {
            self.reconnect_attempts = 0;
            self.state = LinkState::Idle;
            None
        }
    }
}
