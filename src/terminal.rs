//! Chat-facing entry point
//!
//! [`Terminal::handle_message`] takes one inbound message and returns the
//! rendered reply, or `None` when the message is ordinary chat. Secrets are
//! never part of a message: prompts go back to the chat layer, which calls
//! the matching `submit_*` method.

use crate::backend::SqlBackend;
use crate::channels::ChannelRegistry;
use crate::clock::{Clock, SystemClock};
use crate::collaborators::Collaborators;
use crate::config::TerminalConfig;
use crate::escalation::{PendingElevation, PrivilegeEscalator};
use crate::filesystem::FilesystemStore;
use crate::format;
use crate::reply::{Reply, Response};
use crate::router::{self, CommandContext, CommandRouter, Tier};
use crate::schema;
use crate::session::SessionRegistry;
use crate::vault::{Account, CredentialVault};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Backends for the three durable stores. They may all be the same.
#[derive(Clone)]
pub struct Stores {
    pub filesystem: Arc<SqlBackend>,
    pub accounts: Arc<SqlBackend>,
    pub channels: Arc<SqlBackend>,
}

impl Stores {
    /// One backend for everything.
    pub fn shared(backend: Arc<SqlBackend>) -> Self {
        Self {
            filesystem: backend.clone(),
            accounts: backend.clone(),
            channels: backend,
        }
    }
}

pub struct Terminal {
    router: CommandRouter,
}

impl Terminal {
    pub fn new(stores: Stores, config: TerminalConfig, collaborators: Collaborators) -> Self {
        Self::with_clock(stores, config, collaborators, Arc::new(SystemClock))
    }

    pub fn with_clock(
        stores: Stores,
        config: TerminalConfig,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = Arc::new(config);
        let filesystem = Arc::new(FilesystemStore::new(stores.filesystem, clock.clone()));
        let vault = Arc::new(CredentialVault::new(
            stores.accounts,
            clock.clone(),
            config.settings.clone(),
            config.admins.clone(),
        ));
        let sessions = Arc::new(SessionRegistry::new(clock.clone()));
        let escalator = Arc::new(PrivilegeEscalator::new(
            vault.clone(),
            sessions.clone(),
            clock.clone(),
            config.settings.elevation_window(),
        ));
        let channels = Arc::new(ChannelRegistry::new(stores.channels, clock.clone()));

        Self {
            router: CommandRouter {
                filesystem,
                vault,
                sessions,
                escalator,
                channels,
                config,
                collaborators,
                clock,
            },
        }
    }

    /// Terminal over a fresh in-memory SQLite database.
    pub async fn in_memory(config: TerminalConfig) -> Result<Self> {
        let backend = Arc::new(SqlBackend::in_memory().await?);
        Ok(Self::new(Stores::shared(backend), config, Collaborators::default()))
    }

    pub fn filesystem(&self) -> &Arc<FilesystemStore> {
        &self.router.filesystem
    }

    pub fn vault(&self) -> &Arc<CredentialVault> {
        &self.router.vault
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.router.sessions
    }

    pub fn escalator(&self) -> &Arc<PrivilegeEscalator> {
        &self.router.escalator
    }

    pub fn channels(&self) -> &Arc<ChannelRegistry> {
        &self.router.channels
    }

    pub fn config(&self) -> &TerminalConfig {
        &self.router.config
    }

    /// Periodic session expiry on the current runtime.
    pub fn spawn_session_sweeper(&self) -> JoinHandle<()> {
        let settings = &self.router.config.settings;
        self.router.sessions.clone().spawn_sweeper(
            std::time::Duration::from_secs(settings.session_sweep_interval_secs.max(1)),
            settings.session_timeout(),
        )
    }

    /// Route one chat message. `None` means it was not a terminal command.
    pub async fn handle_message(&self, ctx: &CommandContext, content: &str) -> Option<Response> {
        let content = content.trim();
        if content.is_empty() || content.starts_with('!') || content.starts_with('/') {
            return None;
        }

        let content = self.router.config.expand_aliases(content);
        let (command, args) = router::parse(&content)?;
        if !router::is_command(&command) {
            return None;
        }

        let logged = redact(&command, &args);
        if let Err(e) = self.check_channel(ctx, &command, &args).await {
            tracing::info!(
                identity = %ctx.identity,
                channel_id = ctx.channel_id.as_deref().unwrap_or("-"),
                input = %logged,
                "Channel check rejected command"
            );
            return Some(self.finish(ctx, &command, Err(e)));
        }

        self.router
            .sessions
            .sweep_expired(self.router.config.settings.session_timeout())
            .await;

        tracing::info!(
            identity = %ctx.identity,
            user = %ctx.display_name,
            guild_id = ctx.guild_id.as_deref().unwrap_or("-"),
            channel_id = ctx.channel_id.as_deref().unwrap_or("-"),
            input = %logged,
            "Terminal input"
        );

        let tier = self.router.caller_tier(&ctx.identity).await;
        let result = self.router.execute(ctx, &command, &args, tier).await;
        Some(self.finish(ctx, &command, result))
    }

    /// Gate commands from untrusted channels. The channel command itself is
    /// exempt, and messages without a channel are not gated.
    async fn check_channel(&self, ctx: &CommandContext, command: &str, args: &[String]) -> Result<()> {
        let Some(channel_id) = ctx.channel_id.as_deref() else {
            return Ok(());
        };
        let channel_command = command == "channel"
            || (command == "root" && args.first().is_some_and(|a| a.eq_ignore_ascii_case("channel")));
        if channel_command || self.router.channels.is_trusted(channel_id).await? {
            return Ok(());
        }
        Err(Error::UntrustedChannel)
    }

    /// Second step of `register`: create the account and its filesystem.
    pub async fn submit_registration(&self, ctx: &CommandContext, username: &str, password: &str) -> Response {
        let result = self.register_account(ctx, username, password).await;
        self.finish(ctx, "register", result)
    }

    /// Second step of `login`: verify and open a session in the home directory.
    pub async fn submit_login(&self, ctx: &CommandContext, username: &str, password: &str) -> Response {
        let result = self.open_session(ctx, username, password).await;
        self.finish(ctx, "login", result)
    }

    /// Second step of `passwd`.
    pub async fn submit_password_change(&self, ctx: &CommandContext, current: &str, new_password: &str) -> Response {
        let result = self.replace_password(ctx, current, new_password).await;
        self.finish(ctx, "passwd", result)
    }

    /// Second step of `resetpw`.
    pub async fn submit_password_reset(&self, ctx: &CommandContext, code: &str, new_password: &str) -> Response {
        let result = self
            .router
            .vault
            .redeem_reset_code(&ctx.identity, code.trim(), new_password)
            .await
            .map(|()| {
                Reply::Output("Password reset successfully! You can now login with your new password.".to_string())
            });
        self.finish(ctx, "resetpw", result)
    }

    async fn register_account(&self, ctx: &CommandContext, username: &str, password: &str) -> Result<Reply> {
        let account = self
            .router
            .vault
            .register(&ctx.identity, username, password)
            .await?;
        self.router
            .filesystem
            .initialize_home(&ctx.identity, &account.username, &self.router.config.default_filesystem)
            .await?;
        Ok(Reply::Output(format!(
            "Account created successfully! Username: {}\nUse 'login' to access the terminal.",
            account.username
        )))
    }

    async fn open_session(&self, ctx: &CommandContext, username: &str, password: &str) -> Result<Reply> {
        if let Some(session) = self.router.sessions.get(&ctx.identity).await {
            return Err(Error::AlreadyLoggedIn(session.username));
        }
        let account = self.authenticate(ctx, username, password).await?;
        let home = schema::home_dir(&account.username);
        self.router
            .sessions
            .login(&ctx.identity, &account.username, account.role, &home)
            .await;
        Ok(Reply::Output(format!(
            "Welcome back, {}! You are now logged in.\nCurrent directory: {home}",
            account.username
        )))
    }

    async fn replace_password(&self, ctx: &CommandContext, current: &str, new_password: &str) -> Result<Reply> {
        self.router.sessions.require(&ctx.identity).await?;
        self.router
            .vault
            .change_password(&ctx.identity, current, new_password)
            .await?;
        Ok(Reply::Output("Password changed successfully".to_string()))
    }

    /// Confirm a pending `sudo` request and run it.
    pub async fn submit_sudo(&self, ctx: &CommandContext, request_id: Uuid, password: &str) -> Response {
        let confirmed = self
            .router
            .escalator
            .confirm_sudo(&ctx.identity, request_id, password)
            .await;
        self.run_elevated(ctx, "sudo", confirmed, Tier::Sudo).await
    }

    /// Confirm a pending `root` request and run it.
    pub async fn submit_root(&self, ctx: &CommandContext, request_id: Uuid, password: &str) -> Response {
        let confirmed = self
            .router
            .escalator
            .confirm_root(&ctx.identity, request_id, password)
            .await;
        self.run_elevated(ctx, "root", confirmed, Tier::Root).await
    }

    async fn run_elevated(
        &self,
        ctx: &CommandContext,
        label: &str,
        confirmed: Result<PendingElevation>,
        tier: Tier,
    ) -> Response {
        let pending = match confirmed {
            Ok(pending) => pending,
            Err(e) => return self.finish(ctx, label, Err(e)),
        };

        tracing::info!(
            identity = %ctx.identity,
            command = %pending.command,
            tier = ?tier,
            "Running elevated command"
        );
        let result = self
            .router
            .execute(ctx, &pending.command, &pending.args, tier)
            .await;

        let mut response = self.finish(ctx, &pending.command, result);
        if response.success {
            let kind = if tier == Tier::Root { "Root" } else { "Sudo" };
            response.messages.insert(
                0,
                format::output(
                    &format!("{kind} command executed: {}", pending.command),
                    self.router.clock.now(),
                ),
            );
        }
        response
    }

    /// Verify credentials without opening a session.
    pub async fn authenticate(&self, ctx: &CommandContext, username: &str, password: &str) -> Result<Account> {
        self.router
            .vault
            .verify(&ctx.identity, username, password)
            .await
    }

    /// Minimum tier of the entry `identity` would run for `command`, or the
    /// reason it may not.
    pub async fn authorize(&self, command: &str, identity: &str) -> Result<Tier> {
        let spec = self.router.authorize(&command.to_lowercase(), identity).await?;
        Ok(spec.tier)
    }

    fn finish(&self, ctx: &CommandContext, command: &str, result: Result<Reply>) -> Response {
        let now = self.router.clock.now();
        let limit = self.router.config.message_limit;

        match result {
            Ok(reply) => {
                let (text, prompt) = match reply {
                    Reply::Output(text) => (format::output(&text, now), None),
                    Reply::Block(text) => (format::code_block(&text, ""), None),
                    Reply::Prompt(prompt) => (prompt.message(), Some(prompt)),
                };
                tracing::info!(
                    identity = %ctx.identity,
                    command,
                    bytes = text.len(),
                    prompt = prompt.is_some(),
                    "Terminal output"
                );
                Response {
                    success: true,
                    messages: format::chunk(&text, limit),
                    prompt,
                }
            }
            Err(e) => {
                if e.is_internal() {
                    tracing::error!(identity = %ctx.identity, command, error = %e, "Command failed");
                } else {
                    tracing::info!(identity = %ctx.identity, command, error = %e, "Command rejected");
                }
                Response {
                    success: false,
                    messages: format::chunk(&format::error(&e.user_message(), now), limit),
                    prompt: None,
                }
            }
        }
    }
}

/// Input text safe for logs: password arguments are masked.
fn redact(command: &str, args: &[String]) -> String {
    let secret_from = match (command, args.first().map(String::as_str)) {
        ("passwd", _) => Some(0),
        ("root", Some(sub)) if sub.eq_ignore_ascii_case("passwd") => Some(2),
        _ => None,
    };

    let mut parts = vec![command.to_string()];
    for (i, arg) in args.iter().enumerate() {
        if secret_from.is_some_and(|from| i >= from) {
            parts.push("********".to_string());
        } else {
            parts.push(arg.clone());
        }
    }
    parts.join(" ")
}
