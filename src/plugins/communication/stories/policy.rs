//! Expiry rules for stories. Pure functions over a story and an instant; no
//! component should branch on `is_expired` without going through here.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::models::Story;

pub const STORY_LIFETIME_HOURS: i64 = 24;

const MS_PER_HOUR: i64 = 3_600_000;
const MS_PER_MINUTE: i64 = 60_000;

pub fn story_lifetime() -> Duration {
    Duration::hours(STORY_LIFETIME_HOURS)
}

/// Deadline for a story created at `created_at`.
pub fn compute_deadline(created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + story_lifetime()
}

/// The flag only ever lags the clock, so both conditions are honoured.
pub fn is_effectively_expired(story: &Story, now: DateTime<Utc>) -> bool {
    story.is_expired || now > story.expires_at
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Remaining {
    pub hours: i64,
    pub minutes: i64,
    pub total_ms: i64,
}

pub fn remaining(story: &Story, now: DateTime<Utc>) -> Remaining {
    if is_effectively_expired(story, now) {
        return Remaining::default();
    }
    let total_ms = (story.expires_at - now).num_milliseconds().max(0);
    Remaining {
        hours: total_ms / MS_PER_HOUR,
        minutes: (total_ms % MS_PER_HOUR) / MS_PER_MINUTE,
        total_ms,
    }
}
