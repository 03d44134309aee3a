//! Well-known delivery channel and event type constants.
//!
//! These must match the values stored in `notification_queue.channel` and
//! `notification_queue.event_type`.

/// Kakao AlimTalk template message. The only channel the queue carries.
pub const CHANNEL_ALIMTALK: &str = "alimtalk";

/// Queue entries created from an attendance mark.
pub const EVENT_TYPE_ATTENDANCE: &str = "ATTENDANCE";
