//! Accounts, credentials, lockout and password reset
//!
//! Passwords are hashed with Argon2id using the configured cost. Hashing runs
//! on the blocking pool so a login never stalls the runtime.

use crate::backend::SqlBackend;
use crate::clock::{from_millis, Clock};
use crate::config::{HashCost, Settings};
use crate::schema::{action, role};
use crate::{Error, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core};
use argon2::{Algorithm, Argon2, Params, Version};
use chrono::{DateTime, Utc};
use rand::Rng;
use sqlx::AnyConnection;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => role::USER,
            Role::Admin => role::ADMIN,
        }
    }

    /// Parse a role name, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            role::USER => Some(Role::User),
            role::ADMIN => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        *self == Role::Admin
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored account, without the password hash
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub identity: String,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

/// One row of the login history
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub identity: String,
    pub username: String,
    pub action: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// Nullable timestamps are read as `COALESCE(col, 0)`; 0 means unset.
type AccountRow = (String, String, String, String, i64, i64, i64, i64);

macro_rules! select_accounts {
    ($tail:literal) => {
        concat!(
            "SELECT identity, username, password_hash, role, created_at, COALESCE(last_login, 0), ",
            "failed_attempts, COALESCE(locked_until, 0) ",
            "FROM accounts ",
            $tail
        )
    };
}

struct StoredAccount {
    account: Account,
    password_hash: String,
}

impl StoredAccount {
    fn from_row(row: AccountRow) -> Result<Self> {
        let (identity, username, password_hash, role_name, created_at, last_login, failed, locked) = row;
        let role = Role::parse(&role_name)
            .ok_or_else(|| Error::Corrupt(format!("unknown role '{role_name}'")))?;
        Ok(Self {
            account: Account {
                identity,
                username,
                role,
                created_at: from_millis(created_at),
                last_login: optional_millis(last_login),
                failed_attempts: failed.max(0) as u32,
                locked_until: optional_millis(locked),
            },
            password_hash,
        })
    }
}

fn optional_millis(millis: i64) -> Option<DateTime<Utc>> {
    (millis > 0).then(|| from_millis(millis))
}

/// Credential store: registration, verification, lockout and reset codes
pub struct CredentialVault {
    backend: Arc<SqlBackend>,
    clock: Arc<dyn Clock>,
    settings: Settings,
    admins: Vec<String>,
    locks: IdentityLocks,
}

/// One mutex per identity so lockout counters update in order.
#[derive(Default)]
struct IdentityLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IdentityLocks {
    async fn lock(&self, identity: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().await;
            locks
                .entry(identity.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

impl CredentialVault {
    pub fn new(
        backend: Arc<SqlBackend>,
        clock: Arc<dyn Clock>,
        settings: Settings,
        admins: Vec<String>,
    ) -> Self {
        Self {
            backend,
            clock,
            settings,
            admins,
            locks: IdentityLocks::default(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Create an account. Admin-listed identities start as `admin`.
    pub async fn register(&self, identity: &str, username: &str, password: &str) -> Result<Account> {
        validate_username(username)?;
        self.check_password_length(password)?;

        if self.fetch(identity).await?.is_some() {
            return Err(Error::AccountExists);
        }
        if self.find_by_username(username).await?.is_some() {
            return Err(Error::UsernameTaken(username.to_string()));
        }

        let role = if self.admins.iter().any(|a| a == identity) {
            Role::Admin
        } else {
            Role::User
        };
        let hash = hash_password(password, self.settings.hash_cost).await?;
        let now = self.clock.now_millis();

        let inserted = sqlx::query(
            "INSERT INTO accounts (identity, username, password_hash, role, created_at, failed_attempts)
             VALUES ($1, $2, $3, $4, $5, 0)",
        )
        .bind(identity)
        .bind(username)
        .bind(&hash)
        .bind(role.as_str())
        .bind(now)
        .execute(self.backend.pool())
        .await;

        // Lost a race against a concurrent registration
        if let Err(sqlx::Error::Database(db)) = &inserted {
            if db.is_unique_violation() {
                return match self.fetch(identity).await? {
                    Some(_) => Err(Error::AccountExists),
                    None => Err(Error::UsernameTaken(username.to_string())),
                };
            }
        }
        inserted?;

        self.record_history(identity, username, action::REGISTER, true).await?;
        tracing::info!(identity, username, role = %role, "Account registered");

        self.get_account(identity)
            .await?
            .ok_or(Error::NoAccount)
    }

    /// Check a login attempt, applying lockout bookkeeping.
    pub async fn verify(&self, identity: &str, username: &str, password: &str) -> Result<Account> {
        let _guard = self.locks.lock(identity).await;
        let stored = self.fetch(identity).await?.ok_or(Error::NoAccount)?;
        let account = &stored.account;

        if account.username != username {
            return Err(Error::WrongUsername {
                registered: account.username.clone(),
            });
        }

        let now = self.clock.now();
        if let Some(locked_until) = account.locked_until {
            if now < locked_until {
                let millis = (locked_until - now).num_milliseconds();
                let minutes = (millis + 59_999) / 60_000;
                return Err(Error::Locked { minutes });
            }
            sqlx::query("UPDATE accounts SET locked_until = NULL, failed_attempts = 0 WHERE identity = $1")
                .bind(identity)
                .execute(self.backend.pool())
                .await?;
        }
        let failed_before = if account.locked_until.is_some() {
            0
        } else {
            account.failed_attempts
        };

        if !verify_password(password, &stored.password_hash).await? {
            let failed = failed_before + 1;
            let max = self.settings.max_failed_login_attempts;

            if failed >= max {
                let until = (now + self.settings.lockout()).timestamp_millis();
                sqlx::query("UPDATE accounts SET failed_attempts = $1, locked_until = $2 WHERE identity = $3")
                    .bind(failed as i64)
                    .bind(until)
                    .bind(identity)
                    .execute(self.backend.pool())
                    .await?;
                self.record_history(identity, username, action::LOGIN, false).await?;
                tracing::warn!(identity, username, failed, "Account locked after failed logins");
                return Err(Error::Locked {
                    minutes: self.settings.lockout_minutes,
                });
            }

            sqlx::query("UPDATE accounts SET failed_attempts = $1 WHERE identity = $2")
                .bind(failed as i64)
                .bind(identity)
                .execute(self.backend.pool())
                .await?;
            self.record_history(identity, username, action::LOGIN, false).await?;
            tracing::warn!(identity, username, failed, "Failed login");
            return Err(Error::WrongPassword {
                remaining: Some(max - failed),
            });
        }

        sqlx::query("UPDATE accounts SET failed_attempts = 0, last_login = $1 WHERE identity = $2")
            .bind(now.timestamp_millis())
            .bind(identity)
            .execute(self.backend.pool())
            .await?;
        self.record_history(identity, username, action::LOGIN, true).await?;
        tracing::info!(identity, username, "Login verified");

        Ok(Account {
            failed_attempts: 0,
            locked_until: None,
            last_login: Some(now),
            ..stored.account
        })
    }

    /// Re-check a password without touching lockout counters.
    pub async fn check_password(&self, identity: &str, password: &str) -> Result<bool> {
        let stored = self.fetch(identity).await?.ok_or(Error::NoAccount)?;
        verify_password(password, &stored.password_hash).await
    }

    pub async fn change_password(&self, identity: &str, old_password: &str, new_password: &str) -> Result<()> {
        self.check_password_length(new_password)?;
        let stored = self.fetch(identity).await?.ok_or(Error::NoAccount)?;

        if !verify_password(old_password, &stored.password_hash).await? {
            return Err(Error::WrongPassword { remaining: None });
        }

        let hash = hash_password(new_password, self.settings.hash_cost).await?;
        sqlx::query("UPDATE accounts SET password_hash = $1 WHERE identity = $2")
            .bind(&hash)
            .bind(identity)
            .execute(self.backend.pool())
            .await?;
        self.record_history(identity, &stored.account.username, action::PASSWORD_CHANGE, true)
            .await?;
        tracing::info!(identity, "Password changed");
        Ok(())
    }

    /// Administrative password set. Also clears any lockout.
    pub async fn set_password_by_username(&self, username: &str, new_password: &str) -> Result<Account> {
        self.check_password_length(new_password)?;
        let account = self
            .find_by_username(username)
            .await?
            .ok_or_else(|| Error::UnknownUser(username.to_string()))?;
        let _guard = self.locks.lock(&account.identity).await;

        let hash = hash_password(new_password, self.settings.hash_cost).await?;
        sqlx::query(
            "UPDATE accounts SET password_hash = $1, failed_attempts = 0, locked_until = NULL WHERE identity = $2",
        )
        .bind(&hash)
        .bind(&account.identity)
        .execute(self.backend.pool())
        .await?;
        self.record_history(&account.identity, username, action::PASSWORD_CHANGE, true)
            .await?;
        tracing::info!(identity = %account.identity, username, "Password set by admin");
        Ok(account)
    }

    /// New 6-digit reset code, replacing any live one.
    pub async fn issue_reset_code(&self, identity: &str) -> Result<String> {
        if self.fetch(identity).await?.is_none() {
            return Err(Error::NoAccount);
        }

        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        let expires_at = (self.clock.now() + self.settings.reset_code_ttl()).timestamp_millis();

        let mut tx = self.backend.begin().await?;
        sqlx::query("DELETE FROM reset_tokens WHERE identity = $1")
            .bind(identity)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO reset_tokens (identity, code, expires_at, attempts) VALUES ($1, $2, $3, 0)")
            .bind(identity)
            .bind(&code)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(identity, "Reset code issued");
        Ok(code)
    }

    pub async fn redeem_reset_code(&self, identity: &str, code: &str, new_password: &str) -> Result<()> {
        self.check_password_length(new_password)?;
        let max = self.settings.reset_code_max_attempts;
        let _guard = self.locks.lock(identity).await;

        let mut tx = self.backend.begin().await?;

        let token: Option<(String, i64, i64)> =
            sqlx::query_as("SELECT code, expires_at, attempts FROM reset_tokens WHERE identity = $1")
                .bind(identity)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((stored_code, expires_at, attempts)) = token else {
            return Err(Error::NoResetToken);
        };
        let attempts = attempts.max(0) as u32;

        if self.clock.now_millis() > expires_at {
            delete_token(&mut tx, identity).await?;
            tx.commit().await?;
            return Err(Error::TokenExpired);
        }
        if attempts >= max {
            delete_token(&mut tx, identity).await?;
            tx.commit().await?;
            return Err(Error::TokenAttemptsExceeded);
        }

        if stored_code != code {
            let attempts = attempts + 1;
            if attempts >= max {
                delete_token(&mut tx, identity).await?;
                tx.commit().await?;
                tracing::warn!(identity, "Reset code exhausted");
                return Err(Error::TokenAttemptsExceeded);
            }
            sqlx::query("UPDATE reset_tokens SET attempts = $1 WHERE identity = $2")
                .bind(attempts as i64)
                .bind(identity)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            return Err(Error::WrongResetCode {
                remaining: max - attempts,
            });
        }

        let hash = hash_password(new_password, self.settings.hash_cost).await?;
        sqlx::query(
            "UPDATE accounts SET password_hash = $1, failed_attempts = 0, locked_until = NULL WHERE identity = $2",
        )
        .bind(&hash)
        .bind(identity)
        .execute(&mut *tx)
        .await?;
        delete_token(&mut tx, identity).await?;
        tx.commit().await?;

        if let Some(account) = self.get_account(identity).await? {
            self.record_history(identity, &account.username, action::PASSWORD_RESET, true)
                .await?;
        }
        tracing::info!(identity, "Password reset");
        Ok(())
    }

    pub async fn get_account(&self, identity: &str) -> Result<Option<Account>> {
        Ok(self.fetch(identity).await?.map(|s| s.account))
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as(select_accounts!("WHERE username = $1"))
            .bind(username)
            .fetch_optional(self.backend.pool())
            .await?;
        Ok(row.map(StoredAccount::from_row).transpose()?.map(|s| s.account))
    }

    /// Stored role, if the identity has an account.
    pub async fn role(&self, identity: &str) -> Result<Option<Role>> {
        Ok(self.get_account(identity).await?.map(|a| a.role))
    }

    /// Change an account's role, returning the previous one.
    pub async fn set_role(&self, identity: &str, role: Role) -> Result<Role> {
        let account = self.get_account(identity).await?.ok_or(Error::NoAccount)?;
        sqlx::query("UPDATE accounts SET role = $1 WHERE identity = $2")
            .bind(role.as_str())
            .bind(identity)
            .execute(self.backend.pool())
            .await?;
        tracing::info!(identity, from = %account.role, to = %role, "Role changed");
        Ok(account.role)
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows: Vec<AccountRow> = sqlx::query_as(select_accounts!("ORDER BY username"))
            .fetch_all(self.backend.pool())
            .await?;
        rows.into_iter()
            .map(|row| StoredAccount::from_row(row).map(|s| s.account))
            .collect()
    }

    pub async fn record_history(&self, identity: &str, username: &str, action: &str, success: bool) -> Result<()> {
        sqlx::query(
            "INSERT INTO login_history (identity, username, action, success, timestamp) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(identity)
        .bind(username)
        .bind(action)
        .bind(success as i64)
        .bind(self.clock.now_millis())
        .execute(self.backend.pool())
        .await?;
        Ok(())
    }

    /// Most recent history rows, newest first.
    pub async fn recent_history(&self, limit: u32) -> Result<Vec<HistoryEntry>> {
        let rows: Vec<(String, String, String, i64, i64)> = sqlx::query_as(
            "SELECT identity, username, action, success, timestamp FROM login_history
             ORDER BY timestamp DESC, id DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(self.backend.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(identity, username, action, success, timestamp)| HistoryEntry {
                identity,
                username,
                action,
                success: success != 0,
                timestamp: from_millis(timestamp),
            })
            .collect())
    }

    async fn fetch(&self, identity: &str) -> Result<Option<StoredAccount>> {
        let row: Option<AccountRow> = sqlx::query_as(select_accounts!("WHERE identity = $1"))
            .bind(identity)
            .fetch_optional(self.backend.pool())
            .await?;
        row.map(StoredAccount::from_row).transpose()
    }

    fn check_password_length(&self, password: &str) -> Result<()> {
        let min = self.settings.password_min_length;
        if password.chars().count() < min {
            return Err(Error::PasswordTooShort { min });
        }
        Ok(())
    }
}

fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !(3..=20).contains(&len) {
        return Err(Error::InvalidUsername(
            "Username must be 3-20 characters long".to_string(),
        ));
    }
    if !username.chars().all(char::is_alphanumeric) {
        return Err(Error::InvalidUsername(
            "Username must be alphanumeric".to_string(),
        ));
    }
    Ok(())
}

async fn delete_token(conn: &mut AnyConnection, identity: &str) -> Result<()> {
    sqlx::query("DELETE FROM reset_tokens WHERE identity = $1")
        .bind(identity)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn hasher(cost: HashCost) -> Result<Argon2<'static>> {
    let params = Params::new(cost.m_cost, cost.t_cost, cost.p_cost, None)
        .map_err(|e| Error::PasswordHash(format!("Invalid hash parameters: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

async fn hash_password(password: &str, cost: HashCost) -> Result<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut rand_core::OsRng);
        hasher(cost)?
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::PasswordHash(format!("Password hashing failed: {e}")))
    })
    .await
    .map_err(|e| Error::PasswordHash(e.to_string()))?
}

/// Parameters come from the stored PHC string, so cost changes do not
/// invalidate existing hashes.
async fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let password = password.to_string();
    let password_hash = password_hash.to_string();
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&password_hash)
            .map_err(|e| Error::Corrupt(format!("Unreadable password hash: {e}")))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| Error::PasswordHash(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    fn fast_settings() -> Settings {
        Settings {
            hash_cost: HashCost {
                m_cost: 8,
                t_cost: 1,
                p_cost: 1,
            },
            ..Settings::default()
        }
    }

    async fn vault() -> (CredentialVault, Arc<ManualClock>) {
        let backend = Arc::new(SqlBackend::in_memory().await.unwrap());
        let clock = Arc::new(ManualClock::default());
        let vault = CredentialVault::new(backend, clock.clone(), fast_settings(), vec!["root1".to_string()]);
        (vault, clock)
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (vault, _) = vault().await;

        assert!(matches!(vault.register("u1", "al", "secret1").await, Err(Error::InvalidUsername(_))));
        assert!(matches!(vault.register("u1", "al_ice", "secret1").await, Err(Error::InvalidUsername(_))));
        assert!(matches!(
            vault.register("u1", "alice", "short").await,
            Err(Error::PasswordTooShort { min: 6 })
        ));

        let account = vault.register("u1", "alice", "secret1").await.unwrap();
        assert_eq!(account.role, Role::User);
        assert_eq!(account.failed_attempts, 0);

        assert!(matches!(vault.register("u1", "alice2", "secret1").await, Err(Error::AccountExists)));
        assert!(matches!(vault.register("u2", "alice", "secret1").await, Err(Error::UsernameTaken(_))));

        let admin = vault.register("root1", "boss", "secret1").await.unwrap();
        assert_eq!(admin.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_fresh_account_reads_back() {
        let (vault, _) = vault().await;
        vault.register("u1", "alice", "secret1").await.unwrap();

        let account = vault.get_account("u1").await.unwrap().unwrap();
        assert_eq!(account.username, "alice");
        assert!(account.last_login.is_none());
        assert!(account.locked_until.is_none());

        let by_name = vault.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(by_name, account);
        let all = vault.list_accounts().await.unwrap();
        assert_eq!(all, vec![account]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_all_count() {
        let (vault, _) = vault().await;
        vault.register("u1", "alice", "secret1").await.unwrap();
        let vault = Arc::new(vault);

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..5 {
            let vault = vault.clone();
            set.spawn(async move { vault.verify("u1", "alice", "wrong").await });
        }

        let mut remaining = Vec::new();
        let mut locked = 0;
        while let Some(result) = set.join_next().await {
            match result.unwrap() {
                Err(Error::WrongPassword { remaining: Some(r) }) => remaining.push(r),
                Err(Error::Locked { minutes: 15 }) => locked += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        remaining.sort();
        assert_eq!(remaining, vec![1, 2, 3, 4]);
        assert_eq!(locked, 1);

        let account = vault.get_account("u1").await.unwrap().unwrap();
        assert_eq!(account.failed_attempts, 5);
        assert!(account.locked_until.is_some());
    }

    #[tokio::test]
    async fn test_verify_outcomes() {
        let (vault, _) = vault().await;
        assert!(matches!(vault.verify("u1", "alice", "secret1").await, Err(Error::NoAccount)));

        vault.register("u1", "alice", "secret1").await.unwrap();
        assert!(matches!(
            vault.verify("u1", "Alice", "secret1").await,
            Err(Error::WrongUsername { registered }) if registered == "alice"
        ));

        let account = vault.verify("u1", "alice", "secret1").await.unwrap();
        assert!(account.last_login.is_some());
    }

    #[tokio::test]
    async fn test_lockout_cycle() {
        let (vault, clock) = vault().await;
        vault.register("u1", "alice", "secret1").await.unwrap();

        for remaining in [4, 3, 2, 1] {
            assert!(matches!(
                vault.verify("u1", "alice", "wrong").await,
                Err(Error::WrongPassword { remaining: Some(r) }) if r == remaining
            ));
        }
        assert!(matches!(
            vault.verify("u1", "alice", "wrong").await,
            Err(Error::Locked { minutes: 15 })
        ));
        // Correct password does not help while locked
        assert!(matches!(
            vault.verify("u1", "alice", "secret1").await,
            Err(Error::Locked { .. })
        ));

        clock.advance(Duration::minutes(16));
        vault.verify("u1", "alice", "secret1").await.unwrap();
        let account = vault.get_account("u1").await.unwrap().unwrap();
        assert_eq!(account.failed_attempts, 0);
        assert!(account.locked_until.is_none());
    }

    #[tokio::test]
    async fn test_success_resets_failures() {
        let (vault, _) = vault().await;
        vault.register("u1", "alice", "secret1").await.unwrap();

        vault.verify("u1", "alice", "nope").await.unwrap_err();
        vault.verify("u1", "alice", "nope").await.unwrap_err();
        vault.verify("u1", "alice", "secret1").await.unwrap();

        assert!(matches!(
            vault.verify("u1", "alice", "nope").await,
            Err(Error::WrongPassword { remaining: Some(4) })
        ));
    }

    #[tokio::test]
    async fn test_change_password() {
        let (vault, _) = vault().await;
        vault.register("u1", "alice", "secret1").await.unwrap();

        assert!(matches!(
            vault.change_password("u1", "secret1", "abc").await,
            Err(Error::PasswordTooShort { .. })
        ));
        assert!(matches!(
            vault.change_password("u1", "bad-old", "secret2").await,
            Err(Error::WrongPassword { remaining: None })
        ));
        vault.change_password("u1", "secret1", "secret2").await.unwrap();
        assert!(vault.check_password("u1", "secret2").await.unwrap());
        assert!(!vault.check_password("u1", "secret1").await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_code_exhaustion() {
        let (vault, _) = vault().await;
        vault.register("u1", "alice", "secret1").await.unwrap();
        let code = vault.issue_reset_code("u1").await.unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));

        let wrong = if code == "000000" { "111111" } else { "000000" };
        assert!(matches!(
            vault.redeem_reset_code("u1", wrong, "newpass1").await,
            Err(Error::WrongResetCode { remaining: 2 })
        ));
        assert!(matches!(
            vault.redeem_reset_code("u1", wrong, "newpass1").await,
            Err(Error::WrongResetCode { remaining: 1 })
        ));
        assert!(matches!(
            vault.redeem_reset_code("u1", wrong, "newpass1").await,
            Err(Error::TokenAttemptsExceeded)
        ));
        assert!(matches!(
            vault.redeem_reset_code("u1", &code, "newpass1").await,
            Err(Error::NoResetToken)
        ));
    }

    #[tokio::test]
    async fn test_reset_code_success_and_expiry() {
        let (vault, clock) = vault().await;
        vault.register("u1", "alice", "secret1").await.unwrap();
        assert!(matches!(vault.issue_reset_code("u9").await, Err(Error::NoAccount)));

        // Lock the account first; a reset clears it
        for _ in 0..5 {
            vault.verify("u1", "alice", "wrong").await.unwrap_err();
        }
        let code = vault.issue_reset_code("u1").await.unwrap();
        vault.redeem_reset_code("u1", &code, "fresh-pass").await.unwrap();
        vault.verify("u1", "alice", "fresh-pass").await.unwrap();

        let code = vault.issue_reset_code("u1").await.unwrap();
        clock.advance(Duration::minutes(11));
        assert!(matches!(
            vault.redeem_reset_code("u1", &code, "another1").await,
            Err(Error::TokenExpired)
        ));
        assert!(matches!(
            vault.redeem_reset_code("u1", &code, "another1").await,
            Err(Error::NoResetToken)
        ));
    }

    #[tokio::test]
    async fn test_roles_and_history() {
        let (vault, _) = vault().await;
        vault.register("u1", "alice", "secret1").await.unwrap();
        vault.register("u2", "bob", "secret1").await.unwrap();

        assert_eq!(vault.set_role("u1", Role::Admin).await.unwrap(), Role::User);
        assert_eq!(vault.role("u1").await.unwrap(), Some(Role::Admin));
        assert_eq!(vault.role("nobody").await.unwrap(), None);

        let names: Vec<String> = vault
            .list_accounts()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.username)
            .collect();
        assert_eq!(names, vec!["alice", "bob"]);

        vault.set_password_by_username("bob", "changed1").await.unwrap();
        assert!(vault.check_password("u2", "changed1").await.unwrap());
        assert!(matches!(
            vault.set_password_by_username("carol", "changed1").await,
            Err(Error::UnknownUser(_))
        ));

        let history = vault.recent_history(10).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].action, action::PASSWORD_CHANGE);
        assert_eq!(vault.recent_history(1).await.unwrap().len(), 1);
    }
}
