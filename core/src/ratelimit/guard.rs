//! In-process sliding-window abuse gate.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use collabo_common::PrincipalId;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::config::RateGuardConfig;
use super::types::{ActionClass, DenyReason, RateKey, Verdict};
use crate::clock::Clock;

#[derive(Debug)]
struct RecentContent {
    content: String,
    at: Instant,
}

/// History of one (principal, action class) pair.
///
/// `window` never holds more than the window limit and `recent` never more
/// than the duplicate buffer.
#[derive(Debug, Default)]
struct RateState {
    last_action_at: Option<Instant>,
    window: VecDeque<Instant>,
    recent: VecDeque<RecentContent>,
}

impl RateState {
    fn evaluate(&self, config: &RateGuardConfig, now: Instant, content: &str) -> Verdict {
        if let Some(last) = self.last_action_at {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < config.min_interval {
                return Verdict::deny(DenyReason::TooFast, config.min_interval - elapsed);
            }
        }

        let length = config.window.length;
        let mut live = self
            .window
            .iter()
            .filter(|at| now.saturating_duration_since(**at) < length);
        if let Some(oldest) = live.next() {
            if live.count() + 1 >= config.window.limit as usize {
                let waited = now.saturating_duration_since(*oldest);
                return Verdict::deny(DenyReason::RateLimited, length - waited);
            }
        }

        if !content.is_empty() {
            let duplicate = self
                .recent
                .iter()
                .rev()
                .find(|recent| recent.content == content)
                .map(|recent| now.saturating_duration_since(recent.at))
                .filter(|elapsed| *elapsed < config.duplicates.window);
            if let Some(elapsed) = duplicate {
                return Verdict::deny(DenyReason::Duplicate, config.duplicates.window - elapsed);
            }
        }

        Verdict::Allow
    }

    fn record(&mut self, config: &RateGuardConfig, now: Instant, content: String) {
        self.last_action_at = Some(now);

        let length = config.window.length;
        while self
            .window
            .front()
            .is_some_and(|at| now.saturating_duration_since(*at) >= length)
        {
            self.window.pop_front();
        }
        self.window.push_back(now);
        while self.window.len() > config.window.limit as usize {
            self.window.pop_front();
        }

        if !content.is_empty() && config.duplicates.buffer > 0 {
            self.recent.push_back(RecentContent { content, at: now });
            while self.recent.len() > config.duplicates.buffer {
                self.recent.pop_front();
            }
        }
    }

    fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        self.last_action_at
            .is_none_or(|at| now.saturating_duration_since(at) >= ttl)
    }
}

/// Comparison form of action content: trimmed and lowercased.
pub fn normalize(content: &str) -> String {
    content.trim().to_lowercase()
}

/// Per-process abuse gate for high-frequency content actions.
///
/// State is kept per (principal, action class) behind its own mutex, so
/// principals never contend with each other. Anything that goes wrong with
/// the state fails open.
#[derive(Debug)]
pub struct RateGuard {
    config: Arc<RateGuardConfig>,
    clock: Arc<dyn Clock>,
    entries: DashMap<RateKey, Arc<Mutex<RateState>>>,
}

impl RateGuard {
    pub fn new(config: RateGuardConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: Arc::new(config),
            clock,
            entries: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RateGuardConfig {
        &self.config
    }

    /// Evaluate an action without recording it.
    pub fn check(&self, principal_id: PrincipalId, action: ActionClass, content: &str) -> Verdict {
        if !self.config.enabled {
            return Verdict::Allow;
        }

        let key = RateKey::new(principal_id, action);
        let Some(entry) = self.entries.get(&key).map(|e| Arc::clone(e.value())) else {
            return Verdict::Allow;
        };
        let Some(state) = self.lock(&key, &entry) else {
            return Verdict::Allow;
        };

        let verdict = state.evaluate(&self.config, self.clock.now(), &normalize(content));
        drop(state);
        log_denial(&key, verdict);
        verdict
    }

    /// Record an action that was allowed and performed.
    pub fn record(&self, principal_id: PrincipalId, action: ActionClass, content: &str) {
        if !self.config.enabled {
            return;
        }

        let key = RateKey::new(principal_id, action);
        let entry = self.entry(key);
        let Some(mut state) = self.lock(&key, &entry) else {
            return;
        };
        state.record(&self.config, self.clock.now(), normalize(content));
    }

    /// Check and, when allowed, record under one lock.
    ///
    /// Two concurrent calls for the same key cannot both pass a gate that
    /// only one of them should.
    pub fn gate(&self, principal_id: PrincipalId, action: ActionClass, content: &str) -> Verdict {
        if !self.config.enabled {
            return Verdict::Allow;
        }

        let key = RateKey::new(principal_id, action);
        let entry = self.entry(key);
        let Some(mut state) = self.lock(&key, &entry) else {
            return Verdict::Allow;
        };

        let now = self.clock.now();
        let content = normalize(content);
        let verdict = state.evaluate(&self.config, now, &content);
        if verdict.is_allowed() {
            state.record(&self.config, now, content);
        }
        drop(state);

        log_denial(&key, verdict);
        verdict
    }

    /// Forget every entry of `principal_id`. Returns how many were dropped.
    pub fn clear(&self, principal_id: PrincipalId) -> usize {
        ActionClass::all()
            .iter()
            .filter(|action| {
                self.entries
                    .remove(&RateKey::new(principal_id, **action))
                    .is_some()
            })
            .count()
    }

    /// Drop entries idle for longer than every configured window.
    ///
    /// Entries currently locked are skipped. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.config.idle_ttl();
        let before = self.entries.len();

        self.entries.retain(|_, entry| match entry.try_lock() {
            Ok(state) => !state.is_idle(now, ttl),
            Err(TryLockError::WouldBlock) => true,
            Err(TryLockError::Poisoned(_)) => false,
        });

        before.saturating_sub(self.entries.len())
    }

    /// Sweep every `period` until the guard is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let guard = Arc::downgrade(self);
        let period = period.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(guard) = guard.upgrade() else {
                    debug!("Rate guard dropped, stopping sweeper");
                    break;
                };
                let removed = guard.sweep();
                if removed > 0 {
                    debug!(removed, remaining = guard.tracked_keys(), "Swept idle rate state");
                }
            }
        })
    }

    /// Number of (principal, action class) pairs with state.
    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    fn entry(&self, key: RateKey) -> Arc<Mutex<RateState>> {
        Arc::clone(self.entries.entry(key).or_default().value())
    }

    /// Lock an entry, resetting it when poisoned.
    fn lock<'a>(
        &self,
        key: &RateKey,
        entry: &'a Mutex<RateState>,
    ) -> Option<MutexGuard<'a, RateState>> {
        match entry.lock() {
            Ok(state) => Some(state),
            Err(_) => {
                warn!(
                    principal_id = %key.principal_id,
                    action = %key.action,
                    "Rate state poisoned, resetting and allowing"
                );
                self.entries.remove(key);
                None
            }
        }
    }
}

fn log_denial(key: &RateKey, verdict: Verdict) {
    if let Verdict::Deny {
        reason,
        retry_after,
    } = verdict
    {
        debug!(
            principal_id = %key.principal_id,
            action = %key.action,
            ?reason,
            retry_after_ms = retry_after.as_millis() as u64,
            "Action denied by rate guard"
        );
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::config::WindowConfig;

    fn guard(config: RateGuardConfig) -> (RateGuard, ManualClock) {
        let clock = ManualClock::starting_now();
        (RateGuard::new(config, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_unknown_key_is_allowed() {
        let (guard, _) = guard(RateGuardConfig::default());
        assert_eq!(
            guard.check(Uuid::new_v4(), ActionClass::Comment, "hi"),
            Verdict::Allow
        );
        assert_eq!(guard.tracked_keys(), 0);
    }

    #[test]
    fn test_too_fast_reports_remaining_spacing() {
        let (guard, clock) = guard(RateGuardConfig::default());
        let user = Uuid::new_v4();

        assert!(guard.gate(user, ActionClass::ChatMessage, "one").is_allowed());
        clock.advance(Duration::from_millis(100));

        assert_eq!(
            guard.gate(user, ActionClass::ChatMessage, "two"),
            Verdict::deny(DenyReason::TooFast, Duration::from_millis(400))
        );
    }

    #[test]
    fn test_action_classes_are_independent() {
        let (guard, _) = guard(RateGuardConfig::default());
        let user = Uuid::new_v4();

        assert!(guard.gate(user, ActionClass::ChatMessage, "hello").is_allowed());
        assert!(guard.gate(user, ActionClass::Comment, "hello").is_allowed());
        assert!(guard
            .gate(Uuid::new_v4(), ActionClass::ChatMessage, "hello")
            .is_allowed());
    }

    #[test]
    fn test_denied_action_is_not_recorded() {
        let (guard, clock) = guard(RateGuardConfig::default());
        let user = Uuid::new_v4();

        guard.gate(user, ActionClass::Note, "a");
        clock.advance(Duration::from_millis(100));
        assert!(!guard.gate(user, ActionClass::Note, "b").is_allowed());
        clock.advance(Duration::from_millis(400));

        // Spacing is measured from the last allowed action.
        assert!(guard.gate(user, ActionClass::Note, "b").is_allowed());
    }

    #[test]
    fn test_duplicate_normalizes_content() {
        let (guard, clock) = guard(RateGuardConfig::default());
        let user = Uuid::new_v4();

        guard.gate(user, ActionClass::Comment, "Hello World");
        clock.advance(Duration::from_secs(10));

        assert_eq!(
            guard.gate(user, ActionClass::Comment, "  hello world "),
            Verdict::deny(DenyReason::Duplicate, Duration::from_secs(20))
        );

        clock.advance(Duration::from_secs(20));
        assert!(guard.gate(user, ActionClass::Comment, "hello world").is_allowed());
    }

    #[test]
    fn test_duplicate_buffer_evicts_oldest() {
        let (guard, clock) = guard(RateGuardConfig {
            window: WindowConfig {
                limit: 100,
                length: Duration::from_secs(60),
            },
            ..RateGuardConfig::default()
        });
        let user = Uuid::new_v4();

        for i in 0..11 {
            assert!(guard
                .gate(user, ActionClass::ChatMessage, &format!("msg {i}"))
                .is_allowed());
            clock.advance(Duration::from_secs(1));
        }

        // "msg 0" fell out of the ten-entry buffer, "msg 1" did not.
        assert!(!guard.check(user, ActionClass::ChatMessage, "msg 1").is_allowed());
        assert!(guard.gate(user, ActionClass::ChatMessage, "msg 0").is_allowed());
        clock.advance(Duration::from_secs(1));

        // Recording "msg 0" again pushed out "msg 1", the next oldest.
        assert!(guard.check(user, ActionClass::ChatMessage, "msg 1").is_allowed());
        assert!(!guard.check(user, ActionClass::ChatMessage, "msg 2").is_allowed());
    }

    #[test]
    fn test_empty_content_skips_duplicate_check() {
        let (guard, clock) = guard(RateGuardConfig::default());
        let user = Uuid::new_v4();

        guard.gate(user, ActionClass::Note, "   ");
        clock.advance(Duration::from_secs(1));
        assert!(guard.gate(user, ActionClass::Note, "").is_allowed());
    }

    #[test]
    fn test_disabled_guard_allows_everything() {
        let (guard, _) = guard(RateGuardConfig::disabled());
        let user = Uuid::new_v4();

        for _ in 0..50 {
            assert!(guard.gate(user, ActionClass::ChatMessage, "same").is_allowed());
        }
        assert_eq!(guard.tracked_keys(), 0);
    }

    #[test]
    fn test_clear_forgets_principal() {
        let (guard, _) = guard(RateGuardConfig::default());
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();

        guard.gate(user, ActionClass::ChatMessage, "x");
        guard.gate(user, ActionClass::Comment, "x");
        guard.gate(other, ActionClass::Comment, "x");

        assert_eq!(guard.clear(user), 2);
        assert_eq!(guard.tracked_keys(), 1);
        assert!(guard.gate(user, ActionClass::ChatMessage, "x").is_allowed());
    }

    #[test]
    fn test_sweep_drops_idle_entries() {
        let (guard, clock) = guard(RateGuardConfig::default());
        let idle = Uuid::new_v4();
        let active = Uuid::new_v4();

        guard.gate(idle, ActionClass::Comment, "x");
        clock.advance(Duration::from_secs(45));
        guard.gate(active, ActionClass::Comment, "x");
        clock.advance(Duration::from_secs(20));

        assert_eq!(guard.sweep(), 1);
        assert_eq!(guard.tracked_keys(), 1);
        assert!(!guard.check(active, ActionClass::Comment, "x").is_allowed());
    }

    #[test]
    fn test_poisoned_state_fails_open() {
        let (guard, _) = guard(RateGuardConfig::default());
        let user = Uuid::new_v4();
        guard.gate(user, ActionClass::ChatMessage, "x");

        let entry = guard.entry(RateKey::new(user, ActionClass::ChatMessage));
        let poison = Arc::clone(&entry);
        let _ = std::thread::spawn(move || {
            let _held = poison.lock().unwrap();
            panic!("poison the rate state");
        })
        .join();

        assert!(guard.gate(user, ActionClass::ChatMessage, "x").is_allowed());
        assert_eq!(guard.tracked_keys(), 0);
    }
}
