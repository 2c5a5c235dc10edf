use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use guardbot_common::teloxide::prelude::{ChatId, UserId};

/// Messages allowed inside the flood window before a mute fires.
pub const FLOOD_MESSAGE_LIMIT: usize = 4;
const FLOOD_WINDOW_SECS: i64 = 10;
const MUTE_DEDUP_SECS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatUser {
    pub chat_id: ChatId,
    pub user_id: UserId,
}

/// Process-local abuse-tracking state: per-user flood windows, long-token
/// warning counts, and the duplicate-mute guard. Lost on restart by design,
/// it only needs to suppress short-term bursts.
///
/// Entries of a given user are mutated under their map shard lock, so
/// concurrent messages from the same user serialize while distinct users
/// proceed in parallel.
pub struct AbuseTracker {
    message_times: DashMap<ChatUser, VecDeque<DateTime<Utc>>>,
    long_token_warnings: DashMap<ChatUser, u32>,
    recently_muted: DashMap<UserId, DateTime<Utc>>,
}

impl Default for AbuseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AbuseTracker {
    pub fn new() -> Self {
        Self {
            message_times: DashMap::new(),
            long_token_warnings: DashMap::new(),
            recently_muted: DashMap::new(),
        }
    }

    /// Records a message arrival and reports whether the user is flooding.
    /// The window is strictly time-based: prune everything older than the
    /// window, then check the remaining count.
    pub fn record_message(&self, chat_user: ChatUser, now: DateTime<Utc>) -> bool {
        let mut times = self.message_times.entry(chat_user).or_default();
        times.push_back(now);
        while times
            .front()
            .is_some_and(|t| now - *t > Duration::seconds(FLOOD_WINDOW_SECS))
        {
            times.pop_front();
        }
        times.len() > FLOOD_MESSAGE_LIMIT
    }

    /// Increments the user's long-token warning counter and returns the new
    /// count.
    pub fn add_long_token_warning(&self, chat_user: ChatUser) -> u32 {
        let mut warnings = self.long_token_warnings.entry(chat_user).or_insert(0);
        *warnings += 1;
        *warnings
    }

    /// The duplicate-mute guard: returns false when the user was already
    /// actioned within the last 30 seconds. Otherwise marks the user as
    /// actioned now, before the restrict call is attempted, so a failed
    /// restrict still counts as handled.
    pub fn try_begin_mute(&self, user_id: UserId, now: DateTime<Utc>) -> bool {
        let mut last = self
            .recently_muted
            .entry(user_id)
            .or_insert(DateTime::<Utc>::MIN_UTC);
        if now - *last < Duration::seconds(MUTE_DEDUP_SECS) {
            return false;
        }
        *last = now;
        true
    }
}

/// Warnings 1 and 2 get a short mute, the third and beyond a long one.
pub fn long_token_mute_duration(warnings: u32) -> Duration {
    if warnings >= 3 {
        Duration::minutes(60)
    } else {
        Duration::minutes(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_user(user_id: u64) -> ChatUser {
        ChatUser {
            chat_id: ChatId(-100),
            user_id: UserId(user_id),
        }
    }

    #[test]
    fn five_messages_within_the_window_flood() {
        let tracker = AbuseTracker::new();
        let start = Utc::now();
        for i in 0..4 {
            assert!(!tracker.record_message(chat_user(1), start + Duration::seconds(i)));
        }
        assert!(tracker.record_message(chat_user(1), start + Duration::seconds(4)));
    }

    #[test]
    fn five_messages_spread_out_do_not_flood() {
        let tracker = AbuseTracker::new();
        let start = Utc::now();
        for i in 0..5 {
            assert!(!tracker.record_message(chat_user(1), start + Duration::seconds(i * 10)));
        }
    }

    #[test]
    fn windows_are_tracked_per_user() {
        let tracker = AbuseTracker::new();
        let start = Utc::now();
        for i in 0..4 {
            let at = start + Duration::seconds(i);
            assert!(!tracker.record_message(chat_user(1), at));
            assert!(!tracker.record_message(chat_user(2), at));
        }
        assert!(tracker.record_message(chat_user(1), start + Duration::seconds(4)));
        assert!(tracker.record_message(chat_user(2), start + Duration::seconds(4)));
    }

    #[test]
    fn long_token_warnings_escalate_on_the_third() {
        let tracker = AbuseTracker::new();
        let first = tracker.add_long_token_warning(chat_user(1));
        let second = tracker.add_long_token_warning(chat_user(1));
        let third = tracker.add_long_token_warning(chat_user(1));

        assert_eq!(long_token_mute_duration(first), Duration::minutes(5));
        assert_eq!(long_token_mute_duration(second), Duration::minutes(5));
        assert_eq!(long_token_mute_duration(third), Duration::minutes(60));
        assert_eq!(
            long_token_mute_duration(tracker.add_long_token_warning(chat_user(1))),
            Duration::minutes(60)
        );
    }

    #[test]
    fn mutes_are_deduplicated_within_thirty_seconds() {
        let tracker = AbuseTracker::new();
        let start = Utc::now();

        assert!(tracker.try_begin_mute(UserId(1), start));
        assert!(!tracker.try_begin_mute(UserId(1), start + Duration::seconds(5)));
        assert!(!tracker.try_begin_mute(UserId(1), start + Duration::seconds(29)));
        assert!(tracker.try_begin_mute(UserId(1), start + Duration::seconds(31)));
    }

    #[test]
    fn a_failed_attempt_still_counts_as_handled() {
        // The guard is updated optimistically, so a second rule firing right
        // after a failed restrict is still skipped.
        let tracker = AbuseTracker::new();
        let start = Utc::now();
        assert!(tracker.try_begin_mute(UserId(1), start));
        assert!(!tracker.try_begin_mute(UserId(1), start + Duration::seconds(1)));
    }
}
