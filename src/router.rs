//! Tiered command table and dispatch
//!
//! Each command name maps to a minimum [`Tier`]. A caller's tier comes from
//! the session registry (anonymous or authenticated) or from a confirmed
//! sudo/root elevation. `passwd` appears twice: the authenticated form
//! changes one's own password, the root form sets another user's.

use crate::channels::ChannelRegistry;
use crate::clock::Clock;
use crate::collaborators::{Collaborators, ModerationAction};
use crate::config::TerminalConfig;
use crate::escalation::PrivilegeEscalator;
use crate::filesystem::FilesystemStore;
use crate::reply::Reply;
use crate::session::{Session, SessionRegistry};
use crate::vault::CredentialVault;
use crate::{Error, Result};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Public,
    Authenticated,
    Sudo,
    Root,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Handler {
    Help,
    Register,
    Login,
    ResetPw,
    Logout,
    Passwd,
    Whoami,
    Sudo,
    Root,
    Ls,
    Cd,
    Pwd,
    Mkdir,
    Touch,
    Cat,
    Rm,
    Echo,
    Tree,
    Mv,
    Cp,
    Chmod,
    Find,
    Grep,
    Du,
    Clear,
    Apt,
    UserAdd,
    UserDel,
    UserMod,
    Users,
    Logs,
    AdminPasswd,
    Channel,
    Moderation(ModerationAction),
    Role,
}

/// One row of the command table
#[derive(Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    pub tier: Tier,
    pub group: &'static str,
    pub usage: &'static str,
    pub summary: &'static str,
    pub(crate) handler: Handler,
}

macro_rules! command {
    ($name:literal, $tier:ident, $group:literal, $handler:expr, $usage:literal, $summary:literal) => {
        CommandSpec {
            name: $name,
            tier: Tier::$tier,
            group: $group,
            usage: $usage,
            summary: $summary,
            handler: $handler,
        }
    };
}

static COMMANDS: &[CommandSpec] = &[
    command!("help", Public, "general", Handler::Help, "help [category|command]", "Show available commands"),
    command!("register", Public, "account", Handler::Register, "register", "Create a terminal account"),
    command!("login", Public, "account", Handler::Login, "login", "Log in to the terminal"),
    command!("resetpw", Public, "account", Handler::ResetPw, "resetpw", "Reset a forgotten password by DM code"),
    command!("logout", Authenticated, "account", Handler::Logout, "logout", "End the current session"),
    command!("passwd", Authenticated, "account", Handler::Passwd, "passwd [new_password]", "Change your password"),
    command!("whoami", Authenticated, "account", Handler::Whoami, "whoami", "Show session details"),
    command!("sudo", Authenticated, "account", Handler::Sudo, "sudo <command> [args...]", "Run a sudo command after password confirmation"),
    command!("root", Authenticated, "account", Handler::Root, "root <command> [args...]", "Run an admin command after password confirmation"),
    command!("ls", Authenticated, "filesystem", Handler::Ls, "ls [-a] [-l] [path]", "List directory contents"),
    command!("cd", Authenticated, "filesystem", Handler::Cd, "cd [path]", "Change directory (home when omitted)"),
    command!("pwd", Authenticated, "filesystem", Handler::Pwd, "pwd", "Print working directory"),
    command!("mkdir", Authenticated, "filesystem", Handler::Mkdir, "mkdir <directory>", "Create a directory"),
    command!("touch", Authenticated, "filesystem", Handler::Touch, "touch <file>", "Create an empty file"),
    command!("cat", Authenticated, "filesystem", Handler::Cat, "cat <file>", "Show file contents"),
    command!("rm", Authenticated, "filesystem", Handler::Rm, "rm [-r] <path>", "Remove a file or directory"),
    command!("echo", Authenticated, "filesystem", Handler::Echo, "echo <text> [> file]", "Print text or write it to a file"),
    command!("tree", Authenticated, "filesystem", Handler::Tree, "tree [path]", "Show a directory tree"),
    command!("mv", Authenticated, "filesystem", Handler::Mv, "mv <source> <destination>", "Move or rename"),
    command!("cp", Authenticated, "filesystem", Handler::Cp, "cp [-r] <source> <destination>", "Copy a file or directory"),
    command!("chmod", Authenticated, "filesystem", Handler::Chmod, "chmod <mode> <path>", "Change permissions (755 or rwxr-xr-x)"),
    command!("find", Authenticated, "filesystem", Handler::Find, "find [path] [-name pattern] [-type d|f]", "Find entries by name"),
    command!("grep", Authenticated, "filesystem", Handler::Grep, "grep <pattern> [path]", "Search file contents"),
    command!("du", Authenticated, "filesystem", Handler::Du, "du", "Show disk usage"),
    command!("clear", Sudo, "system", Handler::Clear, "sudo clear [count]", "Purge recent channel messages"),
    command!("cls", Sudo, "system", Handler::Clear, "sudo cls [count]", "Purge recent channel messages"),
    command!("apt", Sudo, "system", Handler::Apt, "sudo apt <action> [package]", "Package manager"),
    command!("useradd", Root, "admin", Handler::UserAdd, "root useradd <identity> [user|admin]", "Set an account's role (default admin)"),
    command!("userdel", Root, "admin", Handler::UserDel, "root userdel <identity>", "Remove admin rights"),
    command!("usermod", Root, "admin", Handler::UserMod, "root usermod <username> role <user|admin>", "Modify an account"),
    command!("users", Root, "admin", Handler::Users, "root users", "List accounts"),
    command!("logs", Root, "admin", Handler::Logs, "root logs [count]", "Show login history"),
    command!("passwd", Root, "admin", Handler::AdminPasswd, "root passwd <username> <new_password>", "Set another user's password"),
    command!("channel", Root, "admin", Handler::Channel, "root channel <trust|untrust|list>", "Manage trusted channels"),
    command!("warn", Root, "moderation", Handler::Moderation(ModerationAction::Warn), "root warn <member> [reason]", "Warn a member"),
    command!("kick", Root, "moderation", Handler::Moderation(ModerationAction::Kick), "root kick <member> [reason]", "Kick a member"),
    command!("ban", Root, "moderation", Handler::Moderation(ModerationAction::Ban), "root ban <member> [duration] [reason]", "Ban a member"),
    command!("unban", Root, "moderation", Handler::Moderation(ModerationAction::Unban), "root unban <member>", "Lift a ban"),
    command!("timeout", Root, "moderation", Handler::Moderation(ModerationAction::Timeout), "root timeout <member> <duration> [reason]", "Time out a member"),
    command!("untimeout", Root, "moderation", Handler::Moderation(ModerationAction::Untimeout), "root untimeout <member>", "Lift a timeout"),
    command!("delwarn", Root, "moderation", Handler::Moderation(ModerationAction::DelWarn), "root delwarn <warning_id>", "Delete a warning"),
    command!("modlog", Root, "moderation", Handler::Moderation(ModerationAction::ModLog), "root modlog [member]", "Show moderation history"),
    command!("role", Root, "roles", Handler::Role, "root role <action> [args...]", "Manage platform roles"),
];

/// The full command table.
pub fn commands() -> &'static [CommandSpec] {
    COMMANDS
}

/// Whether `name` is a terminal command at any tier.
pub fn is_command(name: &str) -> bool {
    COMMANDS.iter().any(|c| c.name == name)
}

/// Whether `name` exists at exactly `tier`.
pub fn has_tier(name: &str, tier: Tier) -> bool {
    COMMANDS.iter().any(|c| c.name == name && c.tier == tier)
}

/// Pick the entry a caller at `caller` may run: the highest tier not above
/// the caller. Otherwise explain which escalation is needed.
pub fn resolve(name: &str, caller: Tier) -> Result<&'static CommandSpec> {
    let mut candidates = COMMANDS.iter().filter(|c| c.name == name).peekable();
    if candidates.peek().is_none() {
        return Err(Error::UnknownCommand(name.to_string()));
    }

    let mut allowed: Option<&'static CommandSpec> = None;
    let mut needed = Tier::Root;
    for spec in candidates {
        if spec.tier <= caller {
            if allowed.is_none_or(|a| spec.tier > a.tier) {
                allowed = Some(spec);
            }
        } else {
            needed = needed.min(spec.tier);
        }
    }

    allowed.ok_or_else(|| denied(name, needed))
}

fn denied(name: &str, needed: Tier) -> Error {
    match needed {
        Tier::Public | Tier::Authenticated => Error::NotLoggedIn,
        Tier::Sudo => Error::InsufficientPrivilege(format!(
            "Permission denied. Use 'sudo {name}' to execute this command."
        )),
        Tier::Root => Error::InsufficientPrivilege(format!(
            "Permission denied. Use 'root {name}' if you have terminal admin rights."
        )),
    }
}

/// Split a message into a lowercased command name and its arguments.
pub fn parse(content: &str) -> Option<(String, Vec<String>)> {
    let mut parts = content.split_whitespace();
    let command = parts.next()?.to_lowercase();
    Some((command, parts.map(String::from).collect()))
}

/// Who sent a message, and from where
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandContext {
    pub identity: String,
    pub display_name: String,
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
    pub channel_name: Option<String>,
}

impl CommandContext {
    pub fn new(identity: impl Into<String>) -> Self {
        let identity = identity.into();
        Self {
            display_name: identity.clone(),
            identity,
            ..Self::default()
        }
    }

    pub fn in_channel(mut self, guild_id: impl Into<String>, channel_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.guild_id = Some(guild_id.into());
        self.channel_id = Some(channel_id.into());
        self.channel_name = Some(name.into());
        self
    }
}

/// Dispatches parsed commands to their handlers
pub struct CommandRouter {
    pub(crate) filesystem: Arc<FilesystemStore>,
    pub(crate) vault: Arc<CredentialVault>,
    pub(crate) sessions: Arc<SessionRegistry>,
    pub(crate) escalator: Arc<PrivilegeEscalator>,
    pub(crate) channels: Arc<ChannelRegistry>,
    pub(crate) config: Arc<TerminalConfig>,
    pub(crate) collaborators: Collaborators,
    pub(crate) clock: Arc<dyn Clock>,
}

impl CommandRouter {
    /// Tier of an identity outside any elevation flow.
    pub async fn caller_tier(&self, identity: &str) -> Tier {
        if self.sessions.is_logged_in(identity).await {
            Tier::Authenticated
        } else {
            Tier::Public
        }
    }

    /// Check that `identity` may run `name` right now.
    pub async fn authorize(&self, name: &str, identity: &str) -> Result<&'static CommandSpec> {
        resolve(name, self.caller_tier(identity).await)
    }

    /// Resolve `name` at `tier` and run it.
    pub async fn execute(&self, ctx: &CommandContext, name: &str, args: &[String], tier: Tier) -> Result<Reply> {
        let spec = resolve(name, tier)?;
        self.dispatch(ctx, spec, args).await
    }

    pub(crate) async fn session(&self, ctx: &CommandContext) -> Result<Session> {
        self.sessions.require(&ctx.identity).await
    }

    async fn dispatch(&self, ctx: &CommandContext, spec: &'static CommandSpec, args: &[String]) -> Result<Reply> {
        match spec.handler {
            Handler::Help => self.help(args),
            Handler::Register => self.register(ctx).await,
            Handler::Login => self.login(ctx).await,
            Handler::ResetPw => self.reset_password(ctx).await,
            Handler::Logout => self.logout(ctx).await,
            Handler::Passwd => self.change_password(ctx, args).await,
            Handler::Whoami => self.whoami(ctx).await,
            Handler::Sudo => self.sudo(ctx, args).await,
            Handler::Root => self.root(ctx, args).await,
            Handler::Ls => self.ls(ctx, args).await,
            Handler::Cd => self.cd(ctx, args).await,
            Handler::Pwd => self.pwd(ctx).await,
            Handler::Mkdir => self.mkdir(ctx, args).await,
            Handler::Touch => self.touch(ctx, args).await,
            Handler::Cat => self.cat(ctx, args).await,
            Handler::Rm => self.rm(ctx, args).await,
            Handler::Echo => self.echo(ctx, args).await,
            Handler::Tree => self.tree(ctx, args).await,
            Handler::Mv => self.mv(ctx, args).await,
            Handler::Cp => self.cp(ctx, args).await,
            Handler::Chmod => self.chmod(ctx, args).await,
            Handler::Find => self.find(ctx, args).await,
            Handler::Grep => self.grep(ctx, args).await,
            Handler::Du => self.du(ctx).await,
            Handler::Clear => self.clear(ctx, args).await,
            Handler::Apt => self.apt(ctx, args).await,
            Handler::UserAdd => self.useradd(ctx, args).await,
            Handler::UserDel => self.userdel(ctx, args).await,
            Handler::UserMod => self.usermod(args).await,
            Handler::Users => self.users().await,
            Handler::Logs => self.logs(args).await,
            Handler::AdminPasswd => self.admin_passwd(args).await,
            Handler::Channel => self.channel(ctx, args).await,
            Handler::Moderation(action) => self.moderate(ctx, action, args).await,
            Handler::Role => self.manage_roles(ctx, args).await,
        }
    }
}
