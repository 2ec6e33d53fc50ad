//! Account and elevation commands
//!
//! Commands that need a secret only return a prompt here; the secret comes
//! back through the terminal's `submit_*` calls.

use super::usage;
use crate::reply::{Prompt, Reply};
use crate::router::{CommandContext, CommandRouter};
use crate::schema::action;
use crate::{Error, Result};

impl CommandRouter {
    pub(crate) async fn register(&self, ctx: &CommandContext) -> Result<Reply> {
        if self.vault.get_account(&ctx.identity).await?.is_some() {
            return Err(Error::AccountExists);
        }
        Ok(Reply::Prompt(Prompt::Register))
    }

    pub(crate) async fn login(&self, ctx: &CommandContext) -> Result<Reply> {
        if let Some(session) = self.sessions.get(&ctx.identity).await {
            return Err(Error::AlreadyLoggedIn(session.username));
        }
        Ok(Reply::Prompt(Prompt::Login))
    }

    /// Issue a code and deliver it privately.
    pub(crate) async fn reset_password(&self, ctx: &CommandContext) -> Result<Reply> {
        let messenger = self.collaborators.messenger()?;
        let code = self.vault.issue_reset_code(&ctx.identity).await?;
        let settings = self.vault.settings();

        let message = format!(
            "🔐 **Password Reset Code**\n\nYour reset code is: `{code}`\n\n\
             This code expires in {} minutes and can be tried up to {} times.",
            settings.reset_code_ttl_minutes, settings.reset_code_max_attempts
        );
        if let Err(e) = messenger.send(&ctx.identity, &message).await {
            tracing::warn!(identity = %ctx.identity, error = %e, "Reset code delivery failed");
            return Err(Error::Collaborator(
                "Cannot send DM. Please enable DMs from server members.".to_string(),
            ));
        }

        Ok(Reply::Prompt(Prompt::ResetPassword))
    }

    pub(crate) async fn logout(&self, ctx: &CommandContext) -> Result<Reply> {
        let session = self.sessions.logout(&ctx.identity).await?;
        self.escalator.cancel(&ctx.identity).await;
        self.vault
            .record_history(&ctx.identity, &session.username, action::LOGOUT, true)
            .await?;
        tracing::info!(identity = %ctx.identity, username = %session.username, "Logged out");

        Ok(Reply::Output(format!(
            "Goodbye, {}! You have been logged out.",
            session.username
        )))
    }

    pub(crate) async fn change_password(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        self.session(ctx).await?;
        Ok(Reply::Prompt(Prompt::ChangePassword {
            new_password: args.first().cloned(),
        }))
    }

    pub(crate) async fn whoami(&self, ctx: &CommandContext) -> Result<Reply> {
        let session = self.session(ctx).await?;
        Ok(Reply::Block(format!(
            "Username: {}\nRole: {}\nLogin Time: {}\nCurrent Directory: {}\nIdentity: {}",
            session.username,
            session.role,
            session.login_time.format("%Y-%m-%d %H:%M:%S"),
            session.current_directory,
            session.identity
        )))
    }

    pub(crate) async fn sudo(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        let Some((command, rest)) = args.split_first() else {
            return Err(usage("sudo <command> [args...]\nAvailable: clear, cls, apt"));
        };
        let pending = self
            .escalator
            .request_sudo(&ctx.identity, command, rest.to_vec())
            .await?;
        Ok(Reply::Prompt(Prompt::Elevation(pending)))
    }

    pub(crate) async fn root(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        let Some((command, rest)) = args.split_first() else {
            return Err(usage(
                "root <command> [args...]\nAvailable: useradd, userdel, usermod, users, logs, passwd, channel, warn, kick, ban, role, ...",
            ));
        };
        let pending = self
            .escalator
            .request_root(&ctx.identity, command, rest.to_vec())
            .await?;
        Ok(Reply::Prompt(Prompt::Elevation(pending)))
    }
}
