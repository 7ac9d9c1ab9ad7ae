// Per (command, user) cooldown ledger.
//
// An entry is created on the first successful use of a command that has a
// cooldown, refreshed on every later use, and dropped once it expires. Expiry
// is observed two ways: passively (any read that finds an expired entry
// removes it) and actively (a one-shot tokio timer armed by `mark_used`).

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Source of "now" in epoch milliseconds.
///
/// The tracker never calls the system clock directly so tests can move time
/// forward without sleeping.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        Utc::now().timestamp_millis().max(0) as u64
    }
}

#[derive(Hash, Eq, PartialEq, Clone, Debug)]
struct CooldownKey {
    command: String,
    user_id: u64,
}

#[derive(Clone, Copy, Debug)]
struct CooldownEntry {
    last_used_ms: u64,
    cooldown_ms: u64,
}

impl CooldownEntry {
    fn is_active(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_used_ms) < self.cooldown_ms
    }
}

/// One live cooldown, as reported by [`CooldownTracker::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownInfo {
    pub command: String,
    pub user_id: u64,
    pub last_used_ms: u64,
    pub expires_at_ms: u64,
}

pub struct CooldownTracker {
    entries: Arc<DashMap<CooldownKey, CooldownEntry>>,
    clock: Arc<dyn Clock>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
        }
    }

    fn key(command: &str, user_id: u64) -> CooldownKey {
        CooldownKey {
            command: command.to_string(),
            user_id,
        }
    }

    /// Live entry for the key, removing it first if it has already expired.
    fn live_entry(&self, command: &str, user_id: u64) -> Option<CooldownEntry> {
        let key = Self::key(command, user_id);
        let now = self.clock.now_ms();

        // remove_if takes the shard lock itself, so no guard may be held here.
        self.entries.remove_if(&key, |_, entry| !entry.is_active(now));
        self.entries.get(&key).map(|entry| *entry)
    }

    #[allow(dead_code)]
    pub fn is_on_cooldown(&self, command: &str, user_id: u64) -> bool {
        self.live_entry(command, user_id).is_some()
    }

    /// Whole seconds left, rounded up. `None` when the user is not on cooldown.
    pub fn remaining_seconds(&self, command: &str, user_id: u64) -> Option<u64> {
        let entry = self.live_entry(command, user_id)?;
        let elapsed = self.clock.now_ms().saturating_sub(entry.last_used_ms);
        let remaining_ms = entry.cooldown_ms.saturating_sub(elapsed);
        Some(remaining_ms.div_ceil(1000))
    }

    /// Record a successful use and arm the automatic removal timer.
    pub fn mark_used(&self, command: &str, user_id: u64, cooldown: Duration) {
        let cooldown_ms = cooldown.as_millis() as u64;
        if cooldown_ms == 0 {
            return;
        }

        let stamp = self.clock.now_ms();
        let key = Self::key(command, user_id);
        self.entries.insert(
            key.clone(),
            CooldownEntry {
                last_used_ms: stamp,
                cooldown_ms,
            },
        );

        // Outside a runtime (plain unit tests) passive expiry is enough.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let entries = Arc::clone(&self.entries);
        let clock = Arc::clone(&self.clock);
        handle.spawn(async move {
            tokio::time::sleep(cooldown).await;
            // A refresh in the meantime re-armed its own timer; leave that entry alone.
            let now = clock.now_ms();
            entries.remove_if(&key, |_, entry| {
                entry.last_used_ms == stamp && !entry.is_active(now)
            });
        });
    }

    /// Drop every cooldown held by `user_id`. Returns how many were removed.
    pub fn clear_for_user(&self, user_id: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.user_id != user_id);
        before.saturating_sub(self.entries.len())
    }

    /// Drop every cooldown of `command`. Returns how many were removed.
    pub fn clear_for_command(&self, command: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.command != command);
        before.saturating_sub(self.entries.len())
    }

    pub fn snapshot(&self) -> Vec<CooldownInfo> {
        let now = self.clock.now_ms();
        let mut out: Vec<CooldownInfo> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_active(now))
            .map(|entry| CooldownInfo {
                command: entry.key().command.clone(),
                user_id: entry.key().user_id,
                last_used_ms: entry.value().last_used_ms,
                expires_at_ms: entry.value().last_used_ms + entry.value().cooldown_ms,
            })
            .collect();
        out.sort_by(|a, b| (&a.command, a.user_id).cmp(&(&b.command, b.user_id)));
        out
    }

    /// Raw number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Hand-driven clock for tests.
#[cfg(test)]
pub struct ManualClock {
    now: std::sync::atomic::AtomicU64,
}

#[cfg(test)]
impl ManualClock {
    pub fn starting_at(now_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            now: std::sync::atomic::AtomicU64::new(now_ms),
        })
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn advance(&self, by_ms: u64) {
        self.now.fetch_add(by_ms, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(std::sync::atomic::Ordering::SeqCst)
    }
}
