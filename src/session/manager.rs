//! Session manager implementation
//!
//! Tracks every live browser session, its lifecycle state and its
//! consecutive-failure counter. Sessions are created through an injected
//! `DriverFactory` with anti-detection defaults applied before first use,
//! handed out under exclusive ownership, and torn down on release — except
//! for a bounded same-domain reuse window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::session::traits::{DriverFactory, PageDriver};
use crate::stealth;
use crate::{Error, Result};

/// Lifecycle state of a browser session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, camouflage applied, not yet handed out
    Fresh,
    /// Healthy and owned by (or parked for) a run
    Active,
    /// Failed recently but still under the recreation threshold
    Degraded,
    /// Crossed the threshold; never handed out again
    Dead,
}

/// Handle to one browser session.
#[derive(Debug, Clone)]
pub struct BrowserSession {
    id: String,
    domain: String,
    driver: Arc<dyn PageDriver>,
    created_at: Instant,
}

impl BrowserSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn driver(&self) -> &Arc<dyn PageDriver> {
        &self.driver
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

struct Slot {
    session: Arc<BrowserSession>,
    state: SessionState,
    consecutive_failures: u32,
    in_use: bool,
    released_at: Option<Instant>,
}

/// Session manager
pub struct SessionManager {
    factory: Arc<dyn DriverFactory>,
    failure_threshold: u32,
    reuse_window: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

impl SessionManager {
    /// Create a new session manager.
    pub fn new(
        factory: Arc<dyn DriverFactory>,
        failure_threshold: u32,
        reuse_window: Duration,
    ) -> Self {
        Self {
            factory,
            failure_threshold,
            reuse_window,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(factory: Arc<dyn DriverFactory>, config: &EngineConfig) -> Self {
        Self::new(
            factory,
            config.session_failure_threshold,
            Duration::from_secs(config.session_reuse_secs),
        )
    }

    /// Acquire a session for a domain.
    ///
    /// A session parked by `release` for the same domain is reused when still
    /// inside the reuse window; otherwise a fresh one is created with
    /// camouflage defaults applied. The returned session is exclusively owned
    /// by the caller until released.
    pub async fn acquire(&self, domain: &str) -> Result<Arc<BrowserSession>> {
        let mut expired: Vec<Arc<dyn PageDriver>> = Vec::new();

        let reused = {
            let mut slots = self.lock()?;

            // Sweep parked sessions that fell out of the reuse window or died.
            let window = self.reuse_window;
            let mut stale = Vec::new();
            for (id, slot) in slots.iter() {
                if slot.in_use {
                    continue;
                }
                let timed_out = slot
                    .released_at
                    .map(|at| at.elapsed() > window)
                    .unwrap_or(false);
                if timed_out || slot.state == SessionState::Dead || !slot.session.driver.is_alive()
                {
                    stale.push(id.clone());
                }
            }
            for id in stale {
                if let Some(slot) = slots.remove(&id) {
                    expired.push(slot.session.driver.clone());
                }
            }

            slots
                .values_mut()
                .find(|slot| {
                    !slot.in_use
                        && slot.state == SessionState::Active
                        && slot.session.domain == domain
                })
                .map(|slot| {
                    slot.in_use = true;
                    slot.released_at = None;
                    slot.session.clone()
                })
        };

        for driver in expired {
            if let Err(e) = driver.close().await {
                warn!("Failed to close expired session: {}", e);
            }
        }

        if let Some(session) = reused {
            debug!(
                session = session.id(),
                domain, "Reusing parked session for domain"
            );
            return Ok(session);
        }

        self.create(domain).await
    }

    async fn create(&self, domain: &str) -> Result<Arc<BrowserSession>> {
        let driver = self.factory.open(domain).await?;

        // Camouflage before anything touches the page.
        driver
            .set_user_agent(stealth::random_user_agent())
            .await?;
        for script in stealth::bootstrap_scripts() {
            driver.inject_init_script(script).await?;
        }

        let session = Arc::new(BrowserSession {
            id: Uuid::new_v4().to_string(),
            domain: domain.to_string(),
            driver,
            created_at: Instant::now(),
        });

        {
            let mut slots = self.lock()?;
            let mut slot = Slot {
                session: session.clone(),
                state: SessionState::Fresh,
                consecutive_failures: 0,
                in_use: true,
                released_at: None,
            };
            slot.state = SessionState::Active;
            slots.insert(session.id.clone(), slot);
        }

        info!(session = session.id(), domain, "Created browser session");
        Ok(session)
    }

    /// Record a successful interaction: the failure streak resets.
    pub fn report_success(&self, session: &BrowserSession) {
        if let Ok(mut slots) = self.lock() {
            if let Some(slot) = slots.get_mut(session.id()) {
                slot.consecutive_failures = 0;
                if slot.state == SessionState::Degraded {
                    slot.state = SessionState::Active;
                }
            }
        }
    }

    /// Record a session-level failure. At the configured threshold the
    /// session transitions to `Dead` and is torn down; the caller must
    /// acquire a fresh one before retrying. Returns the resulting state.
    pub async fn report_failure(&self, session: &BrowserSession) -> Result<SessionState> {
        let (state, doomed) = {
            let mut slots = self.lock()?;
            let slot = slots
                .get_mut(session.id())
                .ok_or_else(|| Error::session_not_found(session.id()))?;

            slot.consecutive_failures += 1;
            if slot.consecutive_failures >= self.failure_threshold {
                slot.state = SessionState::Dead;
            } else {
                slot.state = SessionState::Degraded;
            }

            let doomed = if slot.state == SessionState::Dead {
                slots.remove(session.id()).map(|s| s.session.driver.clone())
            } else {
                None
            };
            (
                doomed
                    .as_ref()
                    .map(|_| SessionState::Dead)
                    .unwrap_or(SessionState::Degraded),
                doomed,
            )
        };

        if let Some(driver) = doomed {
            warn!(
                session = session.id(),
                "Session crossed failure threshold, tearing down"
            );
            if let Err(e) = driver.close().await {
                warn!("Failed to close dead session: {}", e);
            }
        }

        Ok(state)
    }

    /// Release a session at run completion. Inside the reuse window a healthy
    /// session is parked for the same domain; anything else is torn down.
    pub async fn release(&self, session: &BrowserSession) -> Result<()> {
        let to_close = {
            let mut slots = self.lock()?;
            match slots.get_mut(session.id()) {
                Some(slot)
                    if !self.reuse_window.is_zero()
                        && slot.state == SessionState::Active
                        && slot.session.driver.is_alive() =>
                {
                    slot.in_use = false;
                    slot.released_at = Some(Instant::now());
                    None
                }
                Some(_) => slots.remove(session.id()).map(|s| s.session.driver.clone()),
                None => None,
            }
        };

        if let Some(driver) = to_close {
            debug!(session = session.id(), "Tearing down session on release");
            if let Err(e) = driver.close().await {
                warn!("Failed to close session: {}", e);
            }
        }
        Ok(())
    }

    /// Forcibly tear down every session bound to a domain, parked or owned.
    /// Used by the coordinator when a run overruns its deadline.
    pub async fn teardown_domain(&self, domain: &str) -> Result<()> {
        let doomed: Vec<Arc<dyn PageDriver>> = {
            let mut slots = self.lock()?;
            let ids: Vec<String> = slots
                .iter()
                .filter(|(_, slot)| slot.session.domain == domain)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| slots.remove(&id))
                .map(|slot| slot.session.driver.clone())
                .collect()
        };

        for driver in doomed {
            if let Err(e) = driver.close().await {
                warn!("Failed to force-close session: {}", e);
            }
        }
        Ok(())
    }

    /// Current lifecycle state, if the session is still tracked.
    pub fn state_of(&self, session: &BrowserSession) -> Option<SessionState> {
        self.lock()
            .ok()
            .and_then(|slots| slots.get(session.id()).map(|slot| slot.state))
    }

    /// Consecutive failures recorded for the session.
    pub fn failure_count(&self, session: &BrowserSession) -> u32 {
        self.lock()
            .ok()
            .and_then(|slots| {
                slots
                    .get(session.id())
                    .map(|slot| slot.consecutive_failures)
            })
            .unwrap_or(0)
    }

    /// Number of tracked sessions (owned and parked).
    pub fn session_count(&self) -> usize {
        self.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Slot>>> {
        self.slots
            .lock()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::mock::MockDriverFactory;

    fn manager(threshold: u32, reuse_secs: u64) -> SessionManager {
        SessionManager::new(
            Arc::new(MockDriverFactory::blank()),
            threshold,
            Duration::from_secs(reuse_secs),
        )
    }

    #[tokio::test]
    async fn test_acquire_returns_active_session() {
        let manager = manager(2, 0);
        let session = manager.acquire("example.com").await.unwrap();

        assert_eq!(session.domain(), "example.com");
        assert_eq!(manager.state_of(&session), Some(SessionState::Active));
        assert_eq!(manager.session_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_threshold_kills_session() {
        let manager = manager(2, 0);
        let session = manager.acquire("example.com").await.unwrap();

        let state = manager.report_failure(&session).await.unwrap();
        assert_eq!(state, SessionState::Degraded);
        assert_eq!(manager.failure_count(&session), 1);

        let state = manager.report_failure(&session).await.unwrap();
        assert_eq!(state, SessionState::Dead);
        // Dead sessions are dropped from tracking and never reused.
        assert_eq!(manager.session_count(), 0);
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let manager = manager(3, 0);
        let session = manager.acquire("example.com").await.unwrap();

        manager.report_failure(&session).await.unwrap();
        assert_eq!(manager.state_of(&session), Some(SessionState::Degraded));

        manager.report_success(&session);
        assert_eq!(manager.failure_count(&session), 0);
        assert_eq!(manager.state_of(&session), Some(SessionState::Active));
    }

    #[tokio::test]
    async fn test_release_without_window_tears_down() {
        let manager = manager(2, 0);
        let session = manager.acquire("example.com").await.unwrap();

        manager.release(&session).await.unwrap();
        assert_eq!(manager.session_count(), 0);
        assert!(!session.driver().is_alive());
    }

    #[tokio::test]
    async fn test_same_domain_reuse_within_window() {
        let manager = manager(2, 60);
        let first = manager.acquire("example.com").await.unwrap();
        let first_id = first.id().to_string();
        manager.release(&first).await.unwrap();

        let second = manager.acquire("example.com").await.unwrap();
        assert_eq!(second.id(), first_id);
    }

    #[tokio::test]
    async fn test_no_reuse_across_domains() {
        let manager = manager(2, 60);
        let first = manager.acquire("example.com").await.unwrap();
        let first_id = first.id().to_string();
        manager.release(&first).await.unwrap();

        let second = manager.acquire("other.org").await.unwrap();
        assert_ne!(second.id(), first_id);
    }

    #[tokio::test]
    async fn test_exclusivity_while_owned() {
        let manager = manager(2, 60);
        let first = manager.acquire("example.com").await.unwrap();
        // Not released: a concurrent acquire must get a different session.
        let second = manager.acquire("example.com").await.unwrap();
        assert_ne!(first.id(), second.id());
    }

    #[tokio::test]
    async fn test_teardown_domain_closes_everything() {
        let manager = manager(2, 60);
        let owned = manager.acquire("example.com").await.unwrap();
        let parked = manager.acquire("example.com").await.unwrap();
        manager.release(&parked).await.unwrap();

        manager.teardown_domain("example.com").await.unwrap();
        assert_eq!(manager.session_count(), 0);
        assert!(!owned.driver().is_alive());
    }
}
