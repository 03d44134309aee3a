//! Queue entry state machine and retry policy.
//!
//! ```text
//! PENDING --claim--> PROCESSING --ok--------------------> SENT
//!    ^                   |
//!    +----transient------+--permanent / ceiling reached--> FAILED
//! ```
//!
//! SENT and FAILED are terminal. The worker moves rows only along these
//! edges, each as a conditional update on the expected current status.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// QueueStatus
// ---------------------------------------------------------------------------

/// Status id type matching SMALLINT in `notification_queue.status_id`.
pub type StatusId = i16;

/// Queue entry status. Discriminants match `notification_queue_statuses`.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Pending = 1,
    Processing = 2,
    Sent = 3,
    Failed = 4,
}

impl QueueStatus {
    /// Return the database status id.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(Self::Pending),
            2 => Some(Self::Processing),
            3 => Some(Self::Sent),
            4 => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }

    /// Active entries count against the per-recipient dedup rule.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Failed)
    }

    /// Parse the upper-case name used in query strings.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "PROCESSING" => Some(Self::Processing),
            "SENT" => Some(Self::Sent),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl From<QueueStatus> for StatusId {
    fn from(value: QueueStatus) -> Self {
        value as StatusId
    }
}

/// Statuses that block a new entry for the same (attendance, status, contact).
pub const ACTIVE_STATUSES: [QueueStatus; 3] =
    [QueueStatus::Pending, QueueStatus::Processing, QueueStatus::Sent];

pub mod state_machine {
    use super::QueueStatus;

    /// Statuses reachable from `from`. Terminal statuses return an empty slice.
    pub fn valid_transitions(from: QueueStatus) -> &'static [QueueStatus] {
        match from {
            QueueStatus::Pending => &[QueueStatus::Processing],
            QueueStatus::Processing => {
                &[QueueStatus::Sent, QueueStatus::Pending, QueueStatus::Failed]
            }
            QueueStatus::Sent | QueueStatus::Failed => &[],
        }
    }

    pub fn can_transition(from: QueueStatus, to: QueueStatus) -> bool {
        valid_transitions(from).contains(&to)
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Where a processing entry goes after a gateway call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Sent,
    Retry { next_retry_at: Timestamp },
    Failed,
}

/// Exponential backoff with an attempt ceiling.
///
/// The delay before attempt `n + 1` is `base_delay * 2^(n - 1)`, capped at
/// `max_delay`, where `n` is the number of attempts already made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total gateway attempts allowed per entry, the first one included.
    pub max_attempts: i32,
    pub base_delay: TimeDelta,
    pub max_delay: TimeDelta,
}

pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;
pub const DEFAULT_RETRY_BASE_SECS: i64 = 60;
pub const DEFAULT_RETRY_MAX_SECS: i64 = 3600;

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: TimeDelta::seconds(DEFAULT_RETRY_BASE_SECS),
            max_delay: TimeDelta::seconds(DEFAULT_RETRY_MAX_SECS),
        }
    }
}

impl RetryPolicy {
    /// Backoff after `attempts` failed attempts (`attempts >= 1`).
    pub fn delay_after(&self, attempts: i32) -> TimeDelta {
        let exponent = attempts.saturating_sub(1).clamp(0, 30) as u32;
        let factor = 1i32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Decide the next state after a failed attempt.
    ///
    /// `attempts` already counts the attempt that just failed.
    pub fn after_failure(&self, attempts: i32, retryable: bool, now: Timestamp) -> Transition {
        if !retryable || attempts >= self.max_attempts {
            Transition::Failed
        } else {
            Transition::Retry {
                next_retry_at: now
                    .checked_add_signed(self.delay_after(attempts))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            }
        }
    }
}
