//! Command handlers, grouped by area
//!
//! Every handler is an `impl CommandRouter` method returning a [`Reply`].
//! Failures are plain [`Error`]s; the terminal renders them.

mod account;
mod admin;
mod fs;

use crate::collaborators::Invocation;
use crate::reply::Reply;
use crate::router::{self, CommandContext, CommandRouter, CommandSpec, Tier};
use crate::{Error, Result};
use chrono::{DateTime, Utc};

const GROUPS: &[(&str, &str)] = &[
    ("general", "GENERAL"),
    ("account", "ACCOUNT"),
    ("filesystem", "FILE SYSTEM"),
    ("system", "SYSTEM (sudo)"),
    ("admin", "ADMINISTRATION (root)"),
    ("moderation", "MODERATION (root)"),
    ("roles", "ROLES (root)"),
];

impl CommandRouter {
    /// `help`, `help <category>` or `help <command>`.
    pub(crate) fn help(&self, args: &[String]) -> Result<Reply> {
        let Some(topic) = args.first().map(|t| t.to_lowercase()) else {
            return Ok(Reply::Block(overview()));
        };

        if let Some((group, title)) = GROUPS.iter().find(|(g, _)| *g == topic) {
            let mut out = vec![title.to_string(), "─".repeat(60)];
            out.extend(
                router::commands()
                    .iter()
                    .filter(|c| c.group == *group)
                    .map(describe),
            );
            return Ok(Reply::Block(out.join("\n")));
        }

        let matches: Vec<String> = router::commands()
            .iter()
            .filter(|c| c.name == topic)
            .map(|c| format!("{}\n  access: {}", describe(c), tier_label(c.tier)))
            .collect();
        if matches.is_empty() {
            return Err(Error::UnknownCommand(topic));
        }
        Ok(Reply::Block(matches.join("\n\n")))
    }

    pub(crate) fn invocation(&self, ctx: &CommandContext, args: &[String]) -> Invocation {
        Invocation {
            actor: ctx.identity.clone(),
            args: args.to_vec(),
            guild_id: ctx.guild_id.clone(),
            channel_id: ctx.channel_id.clone(),
        }
    }
}

fn overview() -> String {
    let mut out = vec![
        "VIRTUAL TERMINAL - HELP".to_string(),
        "=".repeat(48),
        String::new(),
    ];
    for (group, title) in GROUPS {
        let names: Vec<&str> = router::commands()
            .iter()
            .filter(|c| c.group == *group)
            .map(|c| c.name)
            .collect();
        out.push(format!("{title}: {}", names.join(", ")));
        out.push(format!("   → help {group}"));
    }
    out.push(String::new());
    out.push("help <category>   Show commands in a category".to_string());
    out.push("help <command>    Show usage for one command".to_string());
    out.join("\n")
}

fn describe(spec: &CommandSpec) -> String {
    format!("  {:<44} {}", spec.usage, spec.summary)
}

fn tier_label(tier: Tier) -> &'static str {
    match tier {
        Tier::Public => "anyone",
        Tier::Authenticated => "logged-in users",
        Tier::Sudo => "sudo",
        Tier::Root => "root (terminal admins)",
    }
}

/// `Usage:` error for a command.
fn usage(text: &str) -> Error {
    Error::Usage(text.to_string())
}

/// Split arguments into `-flags` and operands.
fn split_flags(args: &[String]) -> (Vec<&str>, Vec<&str>) {
    args.iter()
        .map(String::as_str)
        .partition(|a| a.starts_with('-') && a.len() > 1)
}

/// Whether any short flag cluster (`-la`) or long flag matches.
fn has_flag(flags: &[&str], short: char, long: Option<&str>) -> bool {
    flags.iter().any(|f| match f.strip_prefix("--") {
        Some(name) => Some(name) == long,
        None => f[1..].contains(short),
    })
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_flag_parsing() {
        let args = strings(&["-la", "docs", "--all", "-"]);
        let (flags, operands) = split_flags(&args);
        assert_eq!(flags, vec!["-la", "--all"]);
        assert_eq!(operands, vec!["docs", "-"]);

        assert!(has_flag(&flags, 'l', None));
        assert!(has_flag(&flags, 'a', Some("all")));
        assert!(!has_flag(&flags, 'r', Some("recursive")));
    }

    #[test]
    fn test_every_group_has_commands() {
        for (group, _) in GROUPS {
            assert!(router::commands().iter().any(|c| c.group == *group), "{group}");
        }
        assert!(router::commands()
            .iter()
            .all(|c| GROUPS.iter().any(|(g, _)| *g == c.group)));
    }
}
