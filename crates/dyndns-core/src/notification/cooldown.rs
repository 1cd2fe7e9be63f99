//! Per-channel notification cooldowns

use crate::clock::Clock;
use crate::traits::CooldownMap;
use std::sync::Arc;

/// Remembers when each channel last sent, to enforce a minimum interval
///
/// Keys are opaque channel keys; the dispatcher namespaces per-provider
/// channels as `<provider>/<channel>` so they never collide with global
/// ones.
#[derive(Clone)]
pub struct CooldownTracker {
    clock: Arc<dyn Clock>,
    last_sent: CooldownMap,
    dirty: bool,
}

impl std::fmt::Debug for CooldownTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownTracker")
            .field("last_sent", &self.last_sent)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl CooldownTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last_sent: CooldownMap::new(),
            dirty: false,
        }
    }

    /// Whether `key` may send now given a cooldown in minutes
    ///
    /// True when the key never sent, when the cooldown is zero, or when at
    /// least `cooldown_minutes` have elapsed since the last send.
    pub fn can_send(&self, key: &str, cooldown_minutes: u64) -> bool {
        if cooldown_minutes == 0 {
            return true;
        }
        let Some(last) = self.last_sent.get(key) else {
            return true;
        };
        let cooldown = i64::try_from(cooldown_minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .unwrap_or(chrono::Duration::MAX);
        self.clock.now().signed_duration_since(*last) >= cooldown
    }

    /// Stamp `key` with the current time
    pub fn record_sent(&mut self, key: &str) {
        self.last_sent.insert(key.to_string(), self.clock.now());
        self.dirty = true;
    }

    /// Forget every timestamp
    pub fn clear(&mut self) {
        if !self.last_sent.is_empty() {
            self.dirty = true;
        }
        self.last_sent.clear();
    }

    /// Replace the timestamps with persisted ones
    pub fn restore(&mut self, persisted: CooldownMap) {
        self.last_sent = persisted;
        self.dirty = false;
    }

    pub fn snapshot(&self) -> CooldownMap {
        self.last_sent.clone()
    }

    /// True when timestamps changed since the last [`mark_saved`](Self::mark_saved)
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn tracker() -> (ManualClock, CooldownTracker) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 9, 12, 0, 0).unwrap());
        let tracker = CooldownTracker::new(Arc::new(clock.clone()));
        (clock, tracker)
    }

    #[test]
    fn test_first_send_always_allowed() {
        let (_, tracker) = tracker();
        assert!(tracker.can_send("discord", 60));
    }

    #[test]
    fn test_cooldown_window() {
        let (clock, mut tracker) = tracker();
        tracker.record_sent("discord");

        clock.advance(chrono::Duration::minutes(5));
        assert!(!tracker.can_send("discord", 10));

        clock.advance(chrono::Duration::minutes(4) + chrono::Duration::seconds(59));
        assert!(!tracker.can_send("discord", 10));

        clock.advance(chrono::Duration::seconds(1));
        assert!(tracker.can_send("discord", 10));
    }

    #[test]
    fn test_zero_cooldown_never_blocks() {
        let (_, mut tracker) = tracker();
        tracker.record_sent("ntfy");
        assert!(tracker.can_send("ntfy", 0));
    }

    #[test]
    fn test_keys_are_independent() {
        let (_, mut tracker) = tracker();
        tracker.record_sent("discord");
        assert!(!tracker.can_send("discord", 10));
        assert!(tracker.can_send("home-cf/discord", 10));
    }

    #[test]
    fn test_clear_and_restore() {
        let (_, mut tracker) = tracker();
        tracker.record_sent("slack");
        assert!(tracker.is_dirty());

        let saved = tracker.snapshot();
        tracker.mark_saved();
        tracker.clear();
        assert!(tracker.can_send("slack", 10));
        assert!(tracker.is_dirty());

        tracker.restore(saved);
        assert!(!tracker.can_send("slack", 10));
        assert!(!tracker.is_dirty());
    }
}
