//! Process-wide session registry
//!
//! Sessions are transient: they live only in memory and disappear on logout,
//! on timeout sweep, or on restart.

use crate::clock::Clock;
use crate::vault::Role;
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// A logged-in identity
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub identity: String,
    pub username: String,
    /// Snapshot at login; patched only by explicit role changes.
    pub role: Role,
    pub login_time: DateTime<Utc>,
    pub current_directory: String,
}

#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Install a session starting in `home`. Replaces any existing one.
    pub async fn login(&self, identity: &str, username: &str, role: Role, home: &str) -> Session {
        let session = Session {
            identity: identity.to_string(),
            username: username.to_string(),
            role,
            login_time: self.clock.now(),
            current_directory: home.to_string(),
        };
        self.sessions
            .write()
            .await
            .insert(identity.to_string(), session.clone());
        session
    }

    pub async fn logout(&self, identity: &str) -> Result<Session> {
        self.sessions
            .write()
            .await
            .remove(identity)
            .ok_or(Error::NotLoggedIn)
    }

    pub async fn get(&self, identity: &str) -> Option<Session> {
        self.sessions.read().await.get(identity).cloned()
    }

    /// Like [`get`](Self::get), failing with `NotLoggedIn`.
    pub async fn require(&self, identity: &str) -> Result<Session> {
        self.get(identity).await.ok_or(Error::NotLoggedIn)
    }

    pub async fn is_logged_in(&self, identity: &str) -> bool {
        self.sessions.read().await.contains_key(identity)
    }

    pub async fn update_directory(&self, identity: &str, directory: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(identity).ok_or(Error::NotLoggedIn)?;
        session.current_directory = directory.to_string();
        Ok(())
    }

    /// Patch the role of a live session. Returns `false` when not logged in.
    pub async fn set_role(&self, identity: &str, role: Role) -> bool {
        match self.sessions.write().await.get_mut(identity) {
            Some(session) => {
                session.role = role;
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop every session whose login is older than `timeout`.
    pub async fn sweep_expired(&self, timeout: Duration) -> Vec<Session> {
        let cutoff = self.clock.now() - timeout;
        let mut sessions = self.sessions.write().await;

        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.login_time < cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        let removed: Vec<Session> = expired
            .iter()
            .filter_map(|id| sessions.remove(id))
            .collect();

        for session in &removed {
            tracing::info!(identity = %session.identity, username = %session.username, "Session expired");
        }
        removed
    }

    /// Sweep on a fixed interval until the handle is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, interval: std::time::Duration, timeout: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.sweep_expired(timeout).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn test_login_logout() {
        let registry = SessionRegistry::new(Arc::new(ManualClock::default()));

        assert!(matches!(registry.require("u1").await, Err(Error::NotLoggedIn)));
        let session = registry.login("u1", "alice", Role::User, "/home/alice").await;
        assert_eq!(session.current_directory, "/home/alice");
        assert!(registry.is_logged_in("u1").await);

        registry.update_directory("u1", "/tmp").await.unwrap();
        assert_eq!(registry.require("u1").await.unwrap().current_directory, "/tmp");

        assert!(registry.set_role("u1", Role::Admin).await);
        assert_eq!(registry.get("u1").await.unwrap().role, Role::Admin);
        assert!(!registry.set_role("u2", Role::Admin).await);

        registry.logout("u1").await.unwrap();
        assert!(matches!(registry.logout("u1").await, Err(Error::NotLoggedIn)));
        assert!(matches!(
            registry.update_directory("u1", "/").await,
            Err(Error::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let clock = Arc::new(ManualClock::default());
        let registry = SessionRegistry::new(clock.clone());

        registry.login("old", "olduser", Role::User, "/home/olduser").await;
        clock.advance(Duration::minutes(45));
        registry.login("new", "newuser", Role::User, "/home/newuser").await;
        clock.advance(Duration::minutes(20));

        let removed = registry.sweep_expired(Duration::minutes(60)).await;
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].identity, "old");
        assert!(registry.is_logged_in("new").await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_background_sweeper() {
        let clock = Arc::new(ManualClock::default());
        let registry = Arc::new(SessionRegistry::new(clock.clone()));
        registry.login("u1", "alice", Role::User, "/home/alice").await;
        clock.advance(Duration::hours(2));

        let handle = registry
            .clone()
            .spawn_sweeper(std::time::Duration::from_millis(5), Duration::minutes(60));
        for _ in 0..100 {
            if registry.is_empty().await {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        handle.abort();
        assert!(registry.is_empty().await);
    }
}
