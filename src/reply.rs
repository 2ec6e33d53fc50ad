//! Command outcomes and what the chat layer receives

use crate::escalation::{ElevationLevel, PendingElevation};

/// What a command handler produced
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Status line, rendered with a timestamp.
    Output(String),
    /// Preformatted text, rendered as a code block.
    Block(String),
    /// A secret is needed before anything happens.
    Prompt(Prompt),
}

/// Secret input the chat layer must collect, then hand to the matching
/// `Terminal::submit_*` call.
#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    /// Username and password: `submit_registration`.
    Register,
    /// Username and password: `submit_login`.
    Login,
    /// Current (and, if absent here, new) password: `submit_password_change`.
    ChangePassword { new_password: Option<String> },
    /// Code from the direct message plus a new password: `submit_password_reset`.
    ResetPassword,
    /// Own password: `submit_sudo` or `submit_root`.
    Elevation(PendingElevation),
}

impl Prompt {
    /// Text shown next to the input widget.
    pub fn message(&self) -> String {
        match self {
            Prompt::Register => {
                "📝 **Register New Account**\nChoose a username and password to create your account.".to_string()
            }
            Prompt::Login => "🔐 **Terminal Login**\nEnter your username and password.".to_string(),
            Prompt::ChangePassword { .. } => {
                "🔐 **Change Password**\nConfirm with your current password.".to_string()
            }
            Prompt::ResetPassword => {
                "🔐 **Password Reset**\nA reset code has been sent to your DMs.\nEnter it with your new password.".to_string()
            }
            Prompt::Elevation(pending) => {
                let display = if pending.args.is_empty() {
                    pending.command.clone()
                } else {
                    format!("{} {}", pending.command, pending.args.join(" "))
                };
                match pending.level {
                    ElevationLevel::Sudo => format!(
                        "🔐 **Sudo Authentication Required**\nCommand: `{display}`\nConfirm with your password."
                    ),
                    ElevationLevel::Root => format!(
                        "⚠️ **ROOT Authentication Required**\nCommand: `{display}`\nConfirm with your admin password."
                    ),
                }
            }
        }
    }
}

/// Rendered result of one inbound message
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub success: bool,
    /// Ready-to-send messages, already split to the size limit.
    pub messages: Vec<String>,
    pub prompt: Option<Prompt>,
}

impl Response {
    pub fn text(&self) -> String {
        self.messages.concat()
    }
}
