use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::LimitsConfig;
use crate::{Result, Yt2SampError};

/// Requests counted for one user in the current window
#[derive(Debug, Clone, Copy)]
struct UserQuota {
    count: u32,
    window_start: Instant,
}

#[derive(Debug, Default)]
struct GuardState {
    quotas: HashMap<String, UserQuota>,
    active: HashSet<String>,
}

/// Per-user rate limit plus single-flight admission.
///
/// Both maps sit behind one lock so a user cannot race two admissions past the
/// busy check. The lock is never held across an await point.
#[derive(Debug, Clone)]
pub struct ConcurrencyGuard {
    state: Arc<Mutex<GuardState>>,
    max_requests: u32,
    window: Duration,
}

impl ConcurrencyGuard {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(GuardState::default())),
            max_requests,
            window,
        }
    }

    pub fn from_config(limits: &LimitsConfig) -> Self {
        Self::new(limits.max_requests, limits.window())
    }

    /// Admit `user_id` into the pipeline, or say why not.
    ///
    /// The returned permit clears the busy marker when dropped.
    pub fn admit(&self, user_id: &str) -> Result<AdmissionPermit> {
        self.admit_at(user_id, Instant::now())
    }

    fn admit_at(&self, user_id: &str, now: Instant) -> Result<AdmissionPermit> {
        let mut state = lock(&self.state);

        let quota = match state.quotas.get(user_id) {
            Some(quota) if now.duration_since(quota.window_start) < self.window => *quota,
            _ => UserQuota {
                count: 0,
                window_start: now,
            },
        };

        if quota.count >= self.max_requests {
            let remaining = self.window.saturating_sub(now.duration_since(quota.window_start));
            tracing::debug!(user = user_id, remaining_ms = remaining.as_millis() as u64, "Rate limited");
            return Err(Yt2SampError::RateLimited { remaining });
        }

        if state.active.contains(user_id) {
            tracing::debug!(user = user_id, "Rejected, request already in flight");
            return Err(Yt2SampError::Busy);
        }

        state.quotas.insert(
            user_id.to_string(),
            UserQuota {
                count: quota.count + 1,
                ..quota
            },
        );
        state.active.insert(user_id.to_string());

        tracing::debug!(user = user_id, used = quota.count + 1, max = self.max_requests, "Admitted");

        Ok(AdmissionPermit {
            state: Arc::clone(&self.state),
            user_id: user_id.to_string(),
        })
    }

    pub fn is_busy(&self, user_id: &str) -> bool {
        lock(&self.state).active.contains(user_id)
    }

    pub fn active_count(&self) -> usize {
        lock(&self.state).active.len()
    }
}

impl Default for ConcurrencyGuard {
    fn default() -> Self {
        Self::from_config(&LimitsConfig::default())
    }
}

/// Busy marker for one admitted request
#[derive(Debug)]
pub struct AdmissionPermit {
    state: Arc<Mutex<GuardState>>,
    user_id: String,
}

impl AdmissionPermit {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        lock(&self.state).active.remove(&self.user_id);
        tracing::debug!(user = %self.user_id, "Released");
    }
}

// Guard state stays consistent even if a holder panicked
fn lock(state: &Mutex<GuardState>) -> MutexGuard<'_, GuardState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
