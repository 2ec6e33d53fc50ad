//! Terminal configuration
//!
//! Loaded from JSON (every field optional) or built in code from `Default`.

use crate::Result;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub settings: Settings,

    /// Identities that register as `admin` and may manage trusted channels.
    pub admins: Vec<String>,

    /// Prefix rewrites applied to raw messages before parsing.
    pub command_aliases: BTreeMap<String, String>,

    /// Layout created for every newly registered identity.
    pub default_filesystem: FilesystemTemplate,

    /// Paths `rm` refuses to delete.
    pub protected_paths: Vec<String>,

    /// Replies longer than this are split into chunks.
    pub message_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub password_min_length: usize,
    pub max_failed_login_attempts: u32,
    pub lockout_minutes: i64,
    pub session_timeout_minutes: i64,
    pub session_sweep_interval_secs: u64,
    pub elevation_window_secs: i64,
    pub reset_code_ttl_minutes: i64,
    pub reset_code_max_attempts: u32,
    pub hash_cost: HashCost,
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct HashCost {
    /// Memory in KiB
    pub m_cost: u32,
    /// Iterations
    pub t_cost: u32,
    /// Parallelism
    pub p_cost: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesystemTemplate {
    pub directories: Vec<String>,
    pub files: BTreeMap<String, TemplateFile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateFile {
    /// `{username}` is replaced with the new account's username.
    pub content: String,
    pub executable: bool,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            admins: Vec::new(),
            command_aliases: BTreeMap::new(),
            default_filesystem: FilesystemTemplate::standard(),
            protected_paths: ["/", "/home", "/var", "/apps"]
                .into_iter()
                .map(String::from)
                .collect(),
            message_limit: 2000,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            password_min_length: 6,
            max_failed_login_attempts: 5,
            lockout_minutes: 15,
            session_timeout_minutes: 60,
            session_sweep_interval_secs: 60,
            elevation_window_secs: 120,
            reset_code_ttl_minutes: 10,
            reset_code_max_attempts: 3,
            hash_cost: HashCost::default(),
        }
    }
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            m_cost: argon2::Params::DEFAULT_M_COST,
            t_cost: argon2::Params::DEFAULT_T_COST,
            p_cost: argon2::Params::DEFAULT_P_COST,
        }
    }
}

impl FilesystemTemplate {
    /// Stock layout: a small Unix-like tree plus a greeting.
    pub fn standard() -> Self {
        let directories = ["/bin", "/etc", "/tmp", "/var", "/var/log", "/apps"]
            .into_iter()
            .map(String::from)
            .collect();

        let mut files = BTreeMap::new();
        files.insert(
            "/etc/motd".to_string(),
            TemplateFile {
                content: "Welcome to the virtual terminal, {username}!\nType 'help' to get started."
                    .to_string(),
                executable: false,
            },
        );
        files.insert(
            "/bin/hello".to_string(),
            TemplateFile {
                content: "#!/bin/sh\necho \"Hello, {username}\"".to_string(),
                executable: true,
            },
        );

        Self { directories, files }
    }
}

impl TerminalConfig {
    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn is_admin(&self, identity: &str) -> bool {
        self.admins.iter().any(|a| a == identity)
    }

    /// Apply every alias whose key prefixes the message, in key order.
    pub fn expand_aliases(&self, content: &str) -> String {
        let mut content = content.to_string();
        for (alias, actual) in &self.command_aliases {
            if content.starts_with(alias.as_str()) {
                content = content.replacen(alias.as_str(), actual, 1);
            }
        }
        content
    }
}

impl Settings {
    pub fn lockout(&self) -> Duration {
        Duration::minutes(self.lockout_minutes)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::minutes(self.session_timeout_minutes)
    }

    pub fn elevation_window(&self) -> Duration {
        Duration::seconds(self.elevation_window_secs)
    }

    pub fn reset_code_ttl(&self) -> Duration {
        Duration::minutes(self.reset_code_ttl_minutes)
    }
}
