//! Two-step sudo/root elevation
//!
//! A request records the intended command; nothing runs until the identity
//! re-enters its password in a confirmation. Each identity holds at most one
//! pending request, and a pending request lapses after the configured window.

use crate::clock::Clock;
use crate::router::{self, Tier};
use crate::session::SessionRegistry;
use crate::vault::{CredentialVault, Role};
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const ROOT_REQUIRED: &str = "You do not have root privileges (terminal admin required)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElevationLevel {
    Sudo,
    Root,
}

impl ElevationLevel {
    pub fn tier(&self) -> Tier {
        match self {
            ElevationLevel::Sudo => Tier::Sudo,
            ElevationLevel::Root => Tier::Root,
        }
    }
}

impl fmt::Display for ElevationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElevationLevel::Sudo => f.write_str("sudo"),
            ElevationLevel::Root => f.write_str("root"),
        }
    }
}

/// A declared, not yet confirmed, elevated command
#[derive(Debug, Clone, PartialEq)]
pub struct PendingElevation {
    pub id: Uuid,
    pub level: ElevationLevel,
    pub command: String,
    pub args: Vec<String>,
    pub requested_at: DateTime<Utc>,
}

pub struct PrivilegeEscalator {
    vault: Arc<CredentialVault>,
    sessions: Arc<SessionRegistry>,
    clock: Arc<dyn Clock>,
    window: Duration,
    pending: Mutex<HashMap<String, PendingElevation>>,
}

impl PrivilegeEscalator {
    pub fn new(
        vault: Arc<CredentialVault>,
        sessions: Arc<SessionRegistry>,
        clock: Arc<dyn Clock>,
        window: Duration,
    ) -> Self {
        Self {
            vault,
            sessions,
            clock,
            window,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Declare a sudo command. Any logged-in identity may do this.
    pub async fn request_sudo(&self, identity: &str, command: &str, args: Vec<String>) -> Result<PendingElevation> {
        self.sessions.require(identity).await?;

        let command = command.to_lowercase();
        if !router::has_tier(&command, Tier::Sudo) {
            return Err(Error::NotElevatable {
                command,
                level: ElevationLevel::Sudo.to_string(),
            });
        }
        Ok(self.record(identity, ElevationLevel::Sudo, command, args).await)
    }

    /// Declare a root command. Non-admin accounts are turned away before any
    /// password prompt.
    pub async fn request_root(&self, identity: &str, command: &str, args: Vec<String>) -> Result<PendingElevation> {
        self.sessions.require(identity).await?;

        if self.vault.role(identity).await? != Some(Role::Admin) {
            tracing::warn!(identity, command, "Root request without admin role");
            return Err(Error::InsufficientPrivilege(ROOT_REQUIRED.to_string()));
        }

        let command = command.to_lowercase();
        if !router::has_tier(&command, Tier::Root) {
            return Err(Error::UnknownCommand(format!("root {command}")));
        }
        Ok(self.record(identity, ElevationLevel::Root, command, args).await)
    }

    /// Current pending request, if it has not lapsed.
    pub async fn pending(&self, identity: &str) -> Option<PendingElevation> {
        let now = self.clock.now();
        self.pending
            .lock()
            .await
            .get(identity)
            .filter(|p| now - p.requested_at <= self.window)
            .cloned()
    }

    pub async fn confirm_sudo(&self, identity: &str, request_id: Uuid, password: &str) -> Result<PendingElevation> {
        self.confirm(identity, request_id, ElevationLevel::Sudo, password)
            .await
    }

    pub async fn confirm_root(&self, identity: &str, request_id: Uuid, password: &str) -> Result<PendingElevation> {
        self.confirm(identity, request_id, ElevationLevel::Root, password)
            .await
    }

    /// Re-verify the password and consume the pending request.
    ///
    /// A wrong password keeps the request for another try within the window.
    async fn confirm(
        &self,
        identity: &str,
        request_id: Uuid,
        level: ElevationLevel,
        password: &str,
    ) -> Result<PendingElevation> {
        if let Err(e) = self.sessions.require(identity).await {
            self.pending.lock().await.remove(identity);
            return Err(e);
        }

        let pending = {
            let mut map = self.pending.lock().await;
            let Some(pending) = map.get(identity).cloned() else {
                return Err(Error::NoPendingElevation);
            };
            if pending.id != request_id || pending.level != level {
                return Err(Error::NoPendingElevation);
            }
            if self.clock.now() - pending.requested_at > self.window {
                map.remove(identity);
                return Err(Error::ElevationExpired);
            }
            pending
        };

        if !self.vault.check_password(identity, password).await? {
            tracing::warn!(identity, level = %level, command = %pending.command, "Elevation denied: wrong password");
            return Err(Error::WrongPassword { remaining: None });
        }

        if level == ElevationLevel::Root && self.vault.role(identity).await? != Some(Role::Admin) {
            self.take(identity, request_id).await;
            tracing::warn!(identity, command = %pending.command, "Root denied: not an admin");
            return Err(Error::InsufficientPrivilege(ROOT_REQUIRED.to_string()));
        }

        // A concurrent confirmation may have consumed it meanwhile
        let confirmed = self
            .take(identity, request_id)
            .await
            .ok_or(Error::NoPendingElevation)?;

        tracing::info!(identity, level = %level, command = %confirmed.command, "Elevation confirmed");
        Ok(confirmed)
    }

    /// Drop any pending request, e.g. on logout.
    pub async fn cancel(&self, identity: &str) -> Option<PendingElevation> {
        self.pending.lock().await.remove(identity)
    }

    async fn record(&self, identity: &str, level: ElevationLevel, command: String, args: Vec<String>) -> PendingElevation {
        let pending = PendingElevation {
            id: Uuid::new_v4(),
            level,
            command,
            args,
            requested_at: self.clock.now(),
        };
        self.pending
            .lock()
            .await
            .insert(identity.to_string(), pending.clone());

        tracing::info!(identity, level = %level, command = %pending.command, "Elevation requested");
        pending
    }

    async fn take(&self, identity: &str, request_id: Uuid) -> Option<PendingElevation> {
        let mut map = self.pending.lock().await;
        match map.get(identity) {
            Some(p) if p.id == request_id => map.remove(identity),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SqlBackend;
    use crate::clock::ManualClock;
    use crate::config::{HashCost, Settings};

    struct Fixture {
        escalator: PrivilegeEscalator,
        vault: Arc<CredentialVault>,
        sessions: Arc<SessionRegistry>,
        clock: Arc<ManualClock>,
    }

    async fn fixture() -> Fixture {
        let backend = Arc::new(SqlBackend::in_memory().await.unwrap());
        let clock = Arc::new(ManualClock::default());
        let settings = Settings {
            hash_cost: HashCost {
                m_cost: 8,
                t_cost: 1,
                p_cost: 1,
            },
            ..Settings::default()
        };
        let vault = Arc::new(CredentialVault::new(
            backend,
            clock.clone(),
            settings,
            vec!["admin1".to_string()],
        ));
        let sessions = Arc::new(SessionRegistry::new(clock.clone()));

        vault.register("u1", "alice", "secret1").await.unwrap();
        vault.register("admin1", "boss", "secret1").await.unwrap();
        sessions.login("u1", "alice", Role::User, "/home/alice").await;
        sessions.login("admin1", "boss", Role::Admin, "/home/boss").await;

        let escalator = PrivilegeEscalator::new(
            vault.clone(),
            sessions.clone(),
            clock.clone(),
            Duration::seconds(120),
        );
        Fixture {
            escalator,
            vault,
            sessions,
            clock,
        }
    }

    #[tokio::test]
    async fn test_sudo_flow() {
        let f = fixture().await;

        assert!(matches!(
            f.escalator.request_sudo("u1", "useradd", vec![]).await,
            Err(Error::NotElevatable { .. })
        ));

        let pending = f.escalator.request_sudo("u1", "CLEAR", vec!["5".into()]).await.unwrap();
        assert_eq!(pending.command, "clear");

        // Wrong password keeps the request
        assert!(matches!(
            f.escalator.confirm_sudo("u1", pending.id, "wrong").await,
            Err(Error::WrongPassword { remaining: None })
        ));
        let confirmed = f.escalator.confirm_sudo("u1", pending.id, "secret1").await.unwrap();
        assert_eq!(confirmed.args, vec!["5".to_string()]);

        // Consumed exactly once
        assert!(matches!(
            f.escalator.confirm_sudo("u1", pending.id, "secret1").await,
            Err(Error::NoPendingElevation)
        ));
    }

    #[tokio::test]
    async fn test_sudo_does_not_touch_lockout() {
        let f = fixture().await;
        let pending = f.escalator.request_sudo("u1", "apt", vec![]).await.unwrap();
        for _ in 0..6 {
            f.escalator.confirm_sudo("u1", pending.id, "wrong").await.unwrap_err();
        }
        assert_eq!(f.vault.get_account("u1").await.unwrap().unwrap().failed_attempts, 0);
    }

    #[tokio::test]
    async fn test_sudo_requires_session() {
        let f = fixture().await;
        f.sessions.logout("u1").await.unwrap();
        assert!(matches!(
            f.escalator.request_sudo("u1", "clear", vec![]).await,
            Err(Error::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn test_confirm_requires_live_session() {
        let f = fixture().await;
        let pending = f.escalator.request_root("admin1", "users", vec![]).await.unwrap();
        f.sessions.logout("admin1").await.unwrap();

        assert!(matches!(
            f.escalator.confirm_root("admin1", pending.id, "secret1").await,
            Err(Error::NotLoggedIn)
        ));
        assert!(f.escalator.pending("admin1").await.is_none());

        // Logging back in does not revive the old request
        f.sessions.login("admin1", "boss", Role::Admin, "/home/boss").await;
        assert!(matches!(
            f.escalator.confirm_root("admin1", pending.id, "secret1").await,
            Err(Error::NoPendingElevation)
        ));
    }

    #[tokio::test]
    async fn test_cancel() {
        let f = fixture().await;
        let pending = f.escalator.request_sudo("u1", "clear", vec![]).await.unwrap();
        assert_eq!(f.escalator.cancel("u1").await.map(|p| p.id), Some(pending.id));
        assert!(f.escalator.cancel("u1").await.is_none());
    }

    #[tokio::test]
    async fn test_request_replaces_previous() {
        let f = fixture().await;
        let first = f.escalator.request_sudo("u1", "clear", vec![]).await.unwrap();
        let second = f.escalator.request_sudo("u1", "apt", vec![]).await.unwrap();

        assert!(matches!(
            f.escalator.confirm_sudo("u1", first.id, "secret1").await,
            Err(Error::NoPendingElevation)
        ));
        assert_eq!(
            f.escalator.confirm_sudo("u1", second.id, "secret1").await.unwrap().command,
            "apt"
        );
    }

    #[tokio::test]
    async fn test_pending_expires() {
        let f = fixture().await;
        let pending = f.escalator.request_sudo("u1", "clear", vec![]).await.unwrap();
        assert!(f.escalator.pending("u1").await.is_some());

        f.clock.advance(Duration::seconds(121));
        assert!(f.escalator.pending("u1").await.is_none());
        assert!(matches!(
            f.escalator.confirm_sudo("u1", pending.id, "secret1").await,
            Err(Error::ElevationExpired)
        ));
        assert!(matches!(
            f.escalator.confirm_sudo("u1", pending.id, "secret1").await,
            Err(Error::NoPendingElevation)
        ));
    }

    #[tokio::test]
    async fn test_root_flow() {
        let f = fixture().await;

        assert!(matches!(
            f.escalator.request_root("u1", "users", vec![]).await,
            Err(Error::InsufficientPrivilege(_))
        ));
        assert!(matches!(
            f.escalator.request_root("admin1", "frobnicate", vec![]).await,
            Err(Error::UnknownCommand(_))
        ));

        let pending = f.escalator.request_root("admin1", "users", vec![]).await.unwrap();
        assert!(matches!(
            f.escalator.confirm_sudo("admin1", pending.id, "secret1").await,
            Err(Error::NoPendingElevation)
        ));
        let confirmed = f.escalator.confirm_root("admin1", pending.id, "secret1").await.unwrap();
        assert_eq!(confirmed.level, ElevationLevel::Root);
    }

    #[tokio::test]
    async fn test_root_rechecks_role_at_confirmation() {
        let f = fixture().await;
        let pending = f.escalator.request_root("admin1", "users", vec![]).await.unwrap();
        f.vault.set_role("admin1", Role::User).await.unwrap();

        assert!(matches!(
            f.escalator.confirm_root("admin1", pending.id, "secret1").await,
            Err(Error::InsufficientPrivilege(_))
        ));
        assert!(f.escalator.pending("admin1").await.is_none());
    }
}
