//! Process-environment isolation for config tests.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Every variable `Config::apply_env_overrides` reads.
const OVERRIDE_VARS: &[&str] = &[
    "CONTINUITY_WORKSPACE",
    "CONTINUITY_API_KEY",
    "OPENAI_API_KEY",
    "CONTINUITY_EXTRACTOR_PROVIDER",
    "CONTINUITY_EXTRACTOR_MODEL",
    "CONTINUITY_SAFE_THRESHOLD",
    "CONTINUITY_L4_SIMILARITY_GATE",
    "CONTINUITY_CONFIRM_TOKEN_TTL_MINUTES",
    "CONTINUITY_REALITY_FIRST_MODE",
];

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Holds the env lock with all override variables cleared. The previous
/// values come back on drop, before the lock is released.
pub(super) struct OverrideEnv {
    saved: Vec<(&'static str, Option<String>)>,
    _lock: MutexGuard<'static, ()>,
}

impl OverrideEnv {
    pub(super) fn clean() -> Self {
        let lock = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let saved = OVERRIDE_VARS
            .iter()
            .map(|key| (*key, std::env::var(key).ok()))
            .collect();
        for key in OVERRIDE_VARS {
            // SAFETY: ENV_LOCK serializes every test that touches these vars.
            unsafe {
                std::env::remove_var(key);
            }
        }
        Self { saved, _lock: lock }
    }

    pub(super) fn with(self, key: &'static str, value: &str) -> Self {
        assert!(OVERRIDE_VARS.contains(&key), "{key} is not a config override");
        // SAFETY: ENV_LOCK is held by `self`.
        unsafe {
            std::env::set_var(key, value);
        }
        self
    }
}

impl Drop for OverrideEnv {
    fn drop(&mut self) {
        for (key, previous) in &self.saved {
            // SAFETY: ENV_LOCK is held until the `_lock` field drops after this.
            unsafe {
                match previous {
                    Some(value) => std::env::set_var(key, value),
                    None => std::env::remove_var(key),
                }
            }
        }
    }
}
