//! Error types for vterm
//!
//! Every variant except the storage class is a recoverable, user-facing
//! condition: the terminal turns it into a reply and keeps running.

use thiserror::Error;

/// Result type for vterm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by every component
#[derive(Error, Debug)]
pub enum Error {
    // Filesystem
    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("{0} is a directory")]
    IsADirectory(String),

    #[error("Directory not empty: {0}. Use 'rm -r' to remove recursively")]
    DirectoryNotEmpty(String),

    #[error("Cannot copy directory {0} without -r flag")]
    MissingRecursiveFlag(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid permissions mode: {0}")]
    InvalidPermissionMode(String),

    #[error("Cannot remove protected directory: {0}")]
    ProtectedPath(String),

    // Accounts
    #[error("No account found. Use 'register' to create one.")]
    NoAccount,

    #[error("You already have an account. Use 'login' instead.")]
    AccountExists,

    #[error("Username '{0}' is already taken")]
    UsernameTaken(String),

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Password must be at least {min} characters long")]
    PasswordTooShort { min: usize },

    #[error("Incorrect username. Your account is registered as '{registered}'")]
    WrongUsername { registered: String },

    #[error("Incorrect password.{}", remaining_suffix(.remaining))]
    WrongPassword { remaining: Option<u32> },

    #[error("Account locked. Try again in {minutes} minutes.")]
    Locked { minutes: i64 },

    #[error("User '{0}' not found")]
    UnknownUser(String),

    #[error("User '{username}' already has role '{role}'")]
    RoleUnchanged { username: String, role: String },

    // Password reset
    #[error("No reset request found. Use 'resetpw' to request a reset.")]
    NoResetToken,

    #[error("Reset code expired. Use 'resetpw' to request a new one.")]
    TokenExpired,

    #[error("Incorrect reset code. {remaining} attempts remaining.")]
    WrongResetCode { remaining: u32 },

    #[error("Too many failed attempts. Use 'resetpw' to request a new code.")]
    TokenAttemptsExceeded,

    // Sessions and privilege
    #[error("You must be logged in. Use 'register' or 'login'")]
    NotLoggedIn,

    #[error("Already logged in as {0}")]
    AlreadyLoggedIn(String),

    #[error("{0}")]
    InsufficientPrivilege(String),

    #[error("No pending elevated command. Issue the sudo/root command again.")]
    NoPendingElevation,

    #[error("Elevation request expired. Issue the sudo/root command again.")]
    ElevationExpired,

    #[error("'{command}' is not a {level} command")]
    NotElevatable { command: String, level: String },

    // Routing
    #[error("Unknown command: {0}\nType 'help' for available commands")]
    UnknownCommand(String),

    #[error("Usage: {0}")]
    Usage(String),

    #[error(
        "This channel is not trusted for terminal commands.\nAsk an admin to run: `root channel trust` in this channel first."
    )]
    UntrustedChannel,

    #[error("Channel {0} is already trusted")]
    ChannelAlreadyTrusted(String),

    #[error("Channel {0} is not in trusted list")]
    ChannelNotTrusted(String),

    #[error("{0}")]
    Collaborator(String),

    // Storage
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn remaining_suffix(remaining: &Option<u32>) -> String {
    match remaining {
        Some(n) => format!(" {n} attempts remaining."),
        None => String::new(),
    }
}

impl Error {
    /// Storage-layer failures that must not be shown to the caller verbatim.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Error::Sqlx(_)
                | Error::Migration(_)
                | Error::Connection(_)
                | Error::Corrupt(_)
                | Error::PasswordHash(_)
                | Error::Serialization(_)
                | Error::Io(_)
        )
    }

    /// Message suitable for the person who issued the command.
    pub fn user_message(&self) -> String {
        if self.is_internal() {
            "Command failed due to an internal error".to_string()
        } else {
            self.to_string()
        }
    }
}
