//! External services the terminal forwards to
//!
//! Moderation, role management, package installs, channel purges and direct
//! messages live outside this crate. The terminal only hands them the actor,
//! the arguments and the chat context, then relays the text they return.

use crate::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Everything a collaborator gets about one forwarded command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub actor: String,
    pub args: Vec<String>,
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
}

/// Root-tier moderation commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModerationAction {
    Warn,
    Kick,
    Ban,
    Unban,
    Timeout,
    Untimeout,
    DelWarn,
    ModLog,
}

impl ModerationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::Kick => "kick",
            Self::Ban => "ban",
            Self::Unban => "unban",
            Self::Timeout => "timeout",
            Self::Untimeout => "untimeout",
            Self::DelWarn => "delwarn",
            Self::ModLog => "modlog",
        }
    }
}

impl fmt::Display for ModerationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait ModerationService: Send + Sync {
    async fn execute(&self, action: ModerationAction, invocation: &Invocation) -> Result<String>;
}

#[async_trait]
pub trait RoleService: Send + Sync {
    async fn execute(&self, invocation: &Invocation) -> Result<String>;
}

/// `apt` package installs
#[async_trait]
pub trait PackageService: Send + Sync {
    async fn execute(&self, invocation: &Invocation) -> Result<String>;
}

/// Message purge in the current channel
#[async_trait]
pub trait ChannelConsole: Send + Sync {
    /// Delete up to `limit` recent messages; returns how many went away.
    async fn purge(&self, channel_id: &str, limit: u32) -> Result<u32>;
}

/// Private delivery to one identity
#[async_trait]
pub trait DirectMessenger: Send + Sync {
    async fn send(&self, identity: &str, message: &str) -> Result<()>;
}

/// Optional collaborator set. Missing ones report "not loaded".
#[derive(Clone, Default)]
pub struct Collaborators {
    pub moderation: Option<Arc<dyn ModerationService>>,
    pub roles: Option<Arc<dyn RoleService>>,
    pub packages: Option<Arc<dyn PackageService>>,
    pub console: Option<Arc<dyn ChannelConsole>>,
    pub messenger: Option<Arc<dyn DirectMessenger>>,
}

impl Collaborators {
    pub fn with_moderation(mut self, service: Arc<dyn ModerationService>) -> Self {
        self.moderation = Some(service);
        self
    }

    pub fn with_roles(mut self, service: Arc<dyn RoleService>) -> Self {
        self.roles = Some(service);
        self
    }

    pub fn with_packages(mut self, service: Arc<dyn PackageService>) -> Self {
        self.packages = Some(service);
        self
    }

    pub fn with_console(mut self, console: Arc<dyn ChannelConsole>) -> Self {
        self.console = Some(console);
        self
    }

    pub fn with_messenger(mut self, messenger: Arc<dyn DirectMessenger>) -> Self {
        self.messenger = Some(messenger);
        self
    }

    pub fn moderation(&self) -> Result<&Arc<dyn ModerationService>> {
        self.moderation.as_ref().ok_or_else(|| not_loaded("Moderation"))
    }

    pub fn roles(&self) -> Result<&Arc<dyn RoleService>> {
        self.roles.as_ref().ok_or_else(|| not_loaded("Role management"))
    }

    pub fn packages(&self) -> Result<&Arc<dyn PackageService>> {
        self.packages.as_ref().ok_or_else(|| not_loaded("APT"))
    }

    pub fn console(&self) -> Result<&Arc<dyn ChannelConsole>> {
        self.console.as_ref().ok_or_else(|| not_loaded("Channel console"))
    }

    pub fn messenger(&self) -> Result<&Arc<dyn DirectMessenger>> {
        self.messenger.as_ref().ok_or_else(|| not_loaded("Direct message"))
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("moderation", &self.moderation.is_some())
            .field("roles", &self.roles.is_some())
            .field("packages", &self.packages.is_some())
            .field("console", &self.console.is_some())
            .field("messenger", &self.messenger.is_some())
            .finish()
    }
}

fn not_loaded(system: &str) -> Error {
    Error::Collaborator(format!("{system} system not loaded"))
}
