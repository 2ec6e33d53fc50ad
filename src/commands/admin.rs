//! Sudo and root commands
//!
//! Account administration runs here; moderation, roles, packages and
//! channel purges are forwarded to collaborators.

use super::{timestamp, usage};
use crate::collaborators::ModerationAction;
use crate::reply::Reply;
use crate::router::{CommandContext, CommandRouter};
use crate::vault::Role;
use crate::{Error, Result};

const DEFAULT_PURGE: u32 = 100;
const MAX_PURGE: u32 = 1000;
const DEFAULT_LOG_LINES: u32 = 20;

impl CommandRouter {
    /// `sudo clear [count]`
    pub(crate) async fn clear(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        let console = self.collaborators.console()?;
        let channel_id = ctx
            .channel_id
            .as_deref()
            .ok_or_else(|| Error::Collaborator("Clear command requires channel context".to_string()))?;

        let limit = args
            .first()
            .and_then(|a| a.parse::<u32>().ok())
            .unwrap_or(DEFAULT_PURGE)
            .min(MAX_PURGE);

        let deleted = console.purge(channel_id, limit).await?;
        tracing::warn!(identity = %ctx.identity, channel_id, deleted, "Channel purged");
        Ok(Reply::Output(format!("Cleared {deleted} message(s) from this channel")))
    }

    /// `sudo apt ...`
    pub(crate) async fn apt(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        let packages = self.collaborators.packages()?;
        require_guild(ctx, "APT")?;
        let reply = packages.execute(&self.invocation(ctx, args)).await?;
        Ok(Reply::Block(reply))
    }

    /// `root useradd <identity> [role]`: set the role of a registered account.
    pub(crate) async fn useradd(&self, _ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        let target = args
            .first()
            .ok_or_else(|| usage("root useradd <identity> [user|admin]"))?;
        let role = match args.get(1) {
            Some(value) => Role::parse(value).ok_or_else(|| usage("Role must be 'user' or 'admin'"))?,
            None => Role::Admin,
        };

        let (username, old) = self.change_role(target, role).await?;
        Ok(Reply::Output(format!(
            "User role updated successfully\nIdentity: {target}\nUsername: {username}\nOld Role: {old}\nNew Role: {role}"
        )))
    }

    /// `root userdel <identity>`: strip admin rights; never one's own.
    pub(crate) async fn userdel(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        let target = args.first().ok_or_else(|| usage("root userdel <identity>"))?;
        if *target == ctx.identity {
            return Err(Error::InsufficientPrivilege(
                "Cannot remove your own admin rights".to_string(),
            ));
        }

        let (username, old) = self.change_role(target, Role::User).await?;
        Ok(Reply::Output(format!(
            "Admin rights removed successfully\nIdentity: {target}\nUsername: {username}\nOld Role: {old}\nNew Role: user"
        )))
    }

    /// `root usermod <username> role <value>`
    pub(crate) async fn usermod(&self, args: &[String]) -> Result<Reply> {
        let [username, field, value, ..] = args else {
            return Err(usage("root usermod <username> role <user|admin>"));
        };
        if field != "role" {
            return Err(usage(&format!("unknown field '{field}'. Fields: role")));
        }
        let role = Role::parse(value).ok_or_else(|| usage("Role must be 'user' or 'admin'"))?;
        let account = self
            .vault
            .find_by_username(username)
            .await?
            .ok_or_else(|| Error::UnknownUser(username.clone()))?;

        self.vault.set_role(&account.identity, role).await?;
        self.sessions.set_role(&account.identity, role).await;
        Ok(Reply::Output(format!("User '{username}' role changed to '{role}'")))
    }

    pub(crate) async fn users(&self) -> Result<Reply> {
        let accounts = self.vault.list_accounts().await?;
        if accounts.is_empty() {
            return Ok(Reply::Block("No users found".to_string()));
        }

        let mut out = vec![
            format!("{:<20} {:<10} {:<20} {:<20}", "USERNAME", "ROLE", "CREATED", "LAST LOGIN"),
            "─".repeat(75),
        ];
        for account in accounts {
            let last_login = account
                .last_login
                .map(timestamp)
                .unwrap_or_else(|| "Never".to_string());
            out.push(format!(
                "{:<20} {:<10} {:<20} {:<20}",
                account.username,
                account.role.as_str(),
                timestamp(account.created_at),
                last_login
            ));
        }
        Ok(Reply::Block(out.join("\n")))
    }

    /// `root logs [count]`
    pub(crate) async fn logs(&self, args: &[String]) -> Result<Reply> {
        let limit = args
            .first()
            .and_then(|a| a.parse::<u32>().ok())
            .unwrap_or(DEFAULT_LOG_LINES);

        let history = self.vault.recent_history(limit).await?;
        if history.is_empty() {
            return Ok(Reply::Block("No logs found".to_string()));
        }

        let mut out = vec![
            format!("{:<20} {:<16} {:<20} {:<10}", "USERNAME", "ACTION", "TIMESTAMP", "STATUS"),
            "─".repeat(70),
        ];
        for entry in history {
            out.push(format!(
                "{:<20} {:<16} {:<20} {:<10}",
                entry.username,
                entry.action,
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                if entry.success { "✓" } else { "✗" }
            ));
        }
        Ok(Reply::Block(out.join("\n")))
    }

    /// `root passwd <username> <new_password>`
    pub(crate) async fn admin_passwd(&self, args: &[String]) -> Result<Reply> {
        let [username, new_password, ..] = args else {
            return Err(usage("root passwd <username> <new_password>"));
        };
        self.vault
            .set_password_by_username(username, new_password)
            .await?;
        Ok(Reply::Output(format!("Password for '{username}' changed successfully")))
    }

    /// `root channel trust|untrust|list` for the channel the command came from.
    pub(crate) async fn channel(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        if !self.config.is_admin(&ctx.identity) {
            return Err(Error::InsufficientPrivilege(
                "Permission denied. Only admins can manage channels.".to_string(),
            ));
        }
        let action = args
            .first()
            .map(|a| a.to_lowercase())
            .ok_or_else(|| usage("root channel <trust|untrust|list>"))?;
        let channel_id = ctx
            .channel_id
            .as_deref()
            .ok_or_else(|| Error::Collaborator("Channel context not available".to_string()))?;
        let channel_name = ctx.channel_name.as_deref();
        let label = channel_name.map_or_else(|| channel_id.to_string(), |n| format!("#{n}"));

        match action.as_str() {
            "trust" => {
                self.channels
                    .trust(channel_id, ctx.guild_id.as_deref(), channel_name, &ctx.identity)
                    .await?;
                Ok(Reply::Output(format!(
                    "Channel {label} is now trusted for terminal commands"
                )))
            }
            "untrust" => {
                self.channels.untrust(channel_id, channel_name).await?;
                Ok(Reply::Output(format!("Channel {label} removed from trusted list")))
            }
            "list" => {
                let channels = self.channels.list(ctx.guild_id.as_deref()).await?;
                if channels.is_empty() {
                    return Ok(Reply::Block("No trusted channels configured.".to_string()));
                }
                let mut out = vec!["TRUSTED CHANNELS:".to_string(), "─".repeat(50)];
                for channel in channels {
                    out.push(format!(
                        "<#{}> ({}) - Added: {}",
                        channel.channel_id,
                        channel.channel_name.as_deref().unwrap_or("unknown"),
                        channel.added_at.format("%Y-%m-%d")
                    ));
                }
                Ok(Reply::Block(out.join("\n")))
            }
            other => Err(usage(&format!(
                "root channel <trust|untrust|list> (unknown action '{other}')"
            ))),
        }
    }

    pub(crate) async fn moderate(&self, ctx: &CommandContext, action: ModerationAction, args: &[String]) -> Result<Reply> {
        let moderation = self.collaborators.moderation()?;
        require_guild(ctx, "Moderation")?;
        let reply = moderation
            .execute(action, &self.invocation(ctx, args))
            .await?;
        Ok(Reply::Block(reply))
    }

    pub(crate) async fn manage_roles(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        let roles = self.collaborators.roles()?;
        require_guild(ctx, "Role")?;
        let reply = roles.execute(&self.invocation(ctx, args)).await?;
        Ok(Reply::Block(reply))
    }

    /// Persist a role change and patch any live session. Returns the
    /// username and the previous role.
    async fn change_role(&self, identity: &str, role: Role) -> Result<(String, Role)> {
        let account = self
            .vault
            .get_account(identity)
            .await?
            .ok_or_else(|| Error::UnknownUser(identity.to_string()))?;
        if account.role == role {
            return Err(Error::RoleUnchanged {
                username: account.username,
                role: role.to_string(),
            });
        }

        let old = self.vault.set_role(identity, role).await?;
        self.sessions.set_role(identity, role).await;
        Ok((account.username, old))
    }
}

fn require_guild(ctx: &CommandContext, system: &str) -> Result<()> {
    if ctx.guild_id.is_none() {
        return Err(Error::Collaborator(format!(
            "{system} commands can only be used in a server"
        )));
    }
    Ok(())
}
