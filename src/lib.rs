//! # vterm - Chat-Driven Virtual Terminal
//!
//! vterm turns chat messages into commands against a per-user virtual
//! filesystem, with accounts, sessions and two-step sudo/root elevation.
//! Everything durable lives in SQL via SQLx.
//!
//! ## Backends
//!
//! - **SQLite**: Embedded, single-file or in-memory database (async via sqlx)
//! - **PostgreSQL**: Remote database (async via sqlx)
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vterm::{CommandContext, Prompt, SqlBackend, Stores, Terminal, TerminalConfig};
//! use vterm::collaborators::Collaborators;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Arc::new(SqlBackend::sqlite("terminal.db").await?);
//!     let terminal = Terminal::new(
//!         Stores::shared(backend),
//!         TerminalConfig::from_file("terminal.json")?,
//!         Collaborators::default(),
//!     );
//!     let _sweeper = terminal.spawn_session_sweeper();
//!
//!     let ctx = CommandContext::new("1234").in_channel("guild", "chan", "terminal");
//!     if let Some(response) = terminal.handle_message(&ctx, "login").await {
//!         if response.prompt == Some(Prompt::Login) {
//!             let response = terminal.submit_login(&ctx, "alice", "secret1").await;
//!             println!("{}", response.text());
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod channels;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod escalation;
pub mod filesystem;
pub mod format;
pub mod mode;
pub mod path;
pub mod reply;
pub mod router;
pub mod schema;
pub mod session;
pub mod terminal;
pub mod vault;

mod commands;

pub use backend::{SqlBackend, SqlBackendConfig};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TerminalConfig;
pub use error::{Error, Result};
pub use reply::{Prompt, Reply, Response};
pub use router::{CommandContext, Tier};
pub use terminal::{Stores, Terminal};
