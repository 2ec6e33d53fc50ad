//! Filesystem commands
//!
//! Paths are resolved against the session's current directory; every
//! operation is scoped to the caller's own namespace.

use super::{has_flag, split_flags, timestamp, usage};
use crate::filesystem::{EntryKind, FsEntry};
use crate::path;
use crate::reply::Reply;
use crate::router::{CommandContext, CommandRouter};
use crate::schema;
use crate::{Error, Result};
use std::collections::HashMap;

impl CommandRouter {
    pub(crate) async fn ls(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        let session = self.session(ctx).await?;
        let (flags, operands) = split_flags(args);
        let show_all = has_flag(&flags, 'a', Some("all"));
        let long = has_flag(&flags, 'l', None);

        let dir = match operands.first() {
            Some(target) => path::resolve(&session.current_directory, target),
            None => session.current_directory,
        };
        let entries = self.filesystem.list(&ctx.identity, &dir, show_all).await?;

        if entries.is_empty() {
            return Ok(Reply::Block("(empty directory)".to_string()));
        }

        if long {
            let lines: Vec<String> = entries
                .iter()
                .map(|e| {
                    let type_char = if e.is_dir() { 'd' } else { '-' };
                    let size = if e.is_dir() {
                        "    <DIR>".to_string()
                    } else {
                        format!("{:>8}", e.size)
                    };
                    format!("{type_char}{}  {size}  {}  {}", e.permissions, timestamp(e.modified_at), e.name)
                })
                .collect();
            return Ok(Reply::Block(lines.join("\n")));
        }

        let names: Vec<String> = entries.iter().map(decorated_name).collect();
        Ok(Reply::Block(names.join("  ")))
    }

    pub(crate) async fn cd(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        let session = self.session(ctx).await?;
        let target = match args.first() {
            Some(target) => path::resolve(&session.current_directory, target),
            None => schema::home_dir(&session.username),
        };

        match self.filesystem.stat(&ctx.identity, &target).await? {
            None => return Err(Error::NotFound(target)),
            Some(entry) if !entry.is_dir() => return Err(Error::NotADirectory(target)),
            Some(_) => {}
        }

        self.sessions.update_directory(&ctx.identity, &target).await?;
        Ok(Reply::Output(format!("Changed directory to: {target}")))
    }

    pub(crate) async fn pwd(&self, ctx: &CommandContext) -> Result<Reply> {
        let session = self.session(ctx).await?;
        Ok(Reply::Block(session.current_directory))
    }

    pub(crate) async fn mkdir(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        let session = self.session(ctx).await?;
        let target = args.first().ok_or_else(|| usage("mkdir <directory>"))?;
        let dir = path::resolve(&session.current_directory, target);

        self.filesystem.create_directory(&ctx.identity, &dir).await?;
        Ok(Reply::Output(format!("Directory created: {dir}")))
    }

    pub(crate) async fn touch(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        let session = self.session(ctx).await?;
        let target = args.first().ok_or_else(|| usage("touch <file>"))?;
        let file = path::resolve(&session.current_directory, target);

        self.filesystem.create_file(&ctx.identity, &file, "", false).await?;
        Ok(Reply::Output(format!("File created: {file}")))
    }

    pub(crate) async fn cat(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        let session = self.session(ctx).await?;
        let target = args.first().ok_or_else(|| usage("cat <file>"))?;
        let file = path::resolve(&session.current_directory, target);

        let content = self.filesystem.read(&ctx.identity, &file).await?;
        if content.is_empty() {
            return Ok(Reply::Block("(empty file)".to_string()));
        }
        Ok(Reply::Block(content))
    }

    pub(crate) async fn rm(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        let session = self.session(ctx).await?;
        let (flags, operands) = split_flags(args);
        let recursive = has_flag(&flags, 'r', Some("recursive")) || has_flag(&flags, 'R', None);
        let target = operands.first().ok_or_else(|| usage("rm [-r] <path>"))?;
        let target = path::resolve(&session.current_directory, target);

        if self
            .config
            .protected_paths
            .iter()
            .any(|p| path::normalize(p) == target)
        {
            return Err(Error::ProtectedPath(target));
        }

        self.filesystem.remove(&ctx.identity, &target, recursive).await?;

        if path::is_within(&session.current_directory, &target) {
            let home = schema::home_dir(&session.username);
            let fallback = if self.filesystem.is_directory(&ctx.identity, &home).await? {
                home
            } else {
                schema::ROOT_PATH.to_string()
            };
            self.sessions.update_directory(&ctx.identity, &fallback).await?;
        }
        Ok(Reply::Output(format!("Removed: {target}")))
    }

    /// `echo text` prints; `echo text > file` writes, creating the file.
    pub(crate) async fn echo(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        let session = self.session(ctx).await?;

        let Some(redirect) = args.iter().position(|a| a == ">") else {
            return Ok(Reply::Block(args.join(" ")));
        };
        let text = args[..redirect].join(" ");
        let filename = args
            .get(redirect + 1)
            .ok_or_else(|| usage("echo <text> > <file>"))?;
        let file = path::resolve(&session.current_directory, filename);

        self.filesystem
            .write_or_create(&ctx.identity, &file, &text)
            .await?;
        Ok(Reply::Output(format!("Content written to {filename}")))
    }

    /// Rendered from one subtree query rather than a listing per level.
    pub(crate) async fn tree(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        let session = self.session(ctx).await?;
        let root = match args.first() {
            Some(target) => path::resolve(&session.current_directory, target),
            None => session.current_directory,
        };

        let entries = self.filesystem.find(&ctx.identity, &root, None, None).await?;
        match entries.iter().find(|e| e.path == root) {
            None => return Err(Error::NotFound(root)),
            Some(entry) if !entry.is_dir() => return Err(Error::NotADirectory(root)),
            Some(_) => {}
        }

        let mut children: HashMap<&str, Vec<&FsEntry>> = HashMap::new();
        for entry in entries.iter().filter(|e| e.path != root && !e.is_hidden()) {
            if let Some(parent) = path::parent(&entry.path) {
                children.entry(parent).or_default().push(entry);
            }
        }
        for siblings in children.values_mut() {
            siblings.sort_by(|a, b| b.is_dir().cmp(&a.is_dir()).then_with(|| a.name.cmp(&b.name)));
        }

        let mut out = vec![path::child_prefix(&root)];
        render_tree(&children, &root, "", &mut out);
        Ok(Reply::Block(out.join("\n")))
    }

    pub(crate) async fn mv(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        let session = self.session(ctx).await?;
        let [source, destination, ..] = args else {
            return Err(usage("mv <source> <destination>"));
        };
        let source = path::resolve(&session.current_directory, source);
        let destination = path::resolve(&session.current_directory, destination);

        self.filesystem
            .move_entry(&ctx.identity, &source, &destination)
            .await?;

        if path::is_within(&session.current_directory, &source) {
            let cwd = path::rebase(&session.current_directory, &source, &destination);
            self.sessions.update_directory(&ctx.identity, &cwd).await?;
        }
        Ok(Reply::Output(format!("Moved: {source} → {destination}")))
    }

    pub(crate) async fn cp(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        let session = self.session(ctx).await?;
        let (flags, operands) = split_flags(args);
        let recursive = has_flag(&flags, 'r', Some("recursive")) || has_flag(&flags, 'R', None);
        let [source, destination, ..] = operands.as_slice() else {
            return Err(usage("cp [-r] <source> <destination>"));
        };
        let source = path::resolve(&session.current_directory, source);
        let destination = path::resolve(&session.current_directory, destination);

        self.filesystem
            .copy(&ctx.identity, &source, &destination, recursive)
            .await?;
        Ok(Reply::Output(format!("Copied: {source} → {destination}")))
    }

    pub(crate) async fn chmod(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        let session = self.session(ctx).await?;
        let [mode, target, ..] = args else {
            return Err(usage(
                "chmod <mode> <path>\nExamples: chmod 755 file.txt OR chmod rwxr-xr-x file.txt",
            ));
        };
        let target = path::resolve(&session.current_directory, target);

        let perms = self
            .filesystem
            .change_permissions(&ctx.identity, &target, mode)
            .await?;
        Ok(Reply::Output(format!("Changed permissions of '{target}' to {perms}")))
    }

    /// `find [path] [-name pattern] [-type d|f]`
    pub(crate) async fn find(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        let session = self.session(ctx).await?;
        let mut root = session.current_directory.clone();
        let mut pattern = None;
        let mut kind = None;

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-name" => pattern = iter.next().map(String::as_str),
                "-type" => {
                    kind = match iter.next().map(String::as_str) {
                        Some("d") => Some(EntryKind::Directory),
                        Some("f") => Some(EntryKind::File),
                        _ => return Err(usage("find [path] [-name pattern] [-type d|f]")),
                    }
                }
                other if !other.starts_with('-') => {
                    root = path::resolve(&session.current_directory, other);
                }
                _ => {}
            }
        }

        let results = self
            .filesystem
            .find(&ctx.identity, &root, pattern, kind)
            .await?;
        if results.is_empty() {
            return Ok(Reply::Block("No files found".to_string()));
        }

        let lines: Vec<String> = results
            .iter()
            .map(|e| {
                if e.is_dir() && e.path != schema::ROOT_PATH {
                    format!("{}/", e.path)
                } else {
                    e.path.clone()
                }
            })
            .collect();
        Ok(Reply::Block(lines.join("\n")))
    }

    pub(crate) async fn grep(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        let session = self.session(ctx).await?;
        let pattern = args.first().ok_or_else(|| usage("grep <pattern> [path]"))?;
        let root = args
            .get(1)
            .map(|target| path::resolve(&session.current_directory, target));

        let results = self
            .filesystem
            .grep(&ctx.identity, pattern, root.as_deref())
            .await?;
        if results.is_empty() {
            return Ok(Reply::Block(format!("No matches found for '{pattern}'")));
        }

        let mut out = Vec::new();
        for file in results {
            out.push(format!("{}:", file.path));
            for (number, line) in file.lines {
                out.push(format!("  {number}: {}", line.trim()));
            }
        }
        Ok(Reply::Block(out.join("\n")))
    }

    pub(crate) async fn du(&self, ctx: &CommandContext) -> Result<Reply> {
        self.session(ctx).await?;
        let usage = self.filesystem.disk_usage(&ctx.identity).await?;

        let lines = [
            "DISK USAGE STATISTICS".to_string(),
            "=".repeat(40),
            format!("Files:        {}", usage.total_files),
            format!("Directories:  {}", usage.total_directories),
            format!(
                "Total Size:   {} bytes ({:.2} KB)",
                thousands(usage.total_size),
                usage.total_size as f64 / 1024.0
            ),
            format!("Files Size:   {} bytes", thousands(usage.files_size)),
            "=".repeat(40),
        ];
        Ok(Reply::Block(lines.join("\n")))
    }
}

/// `dir/`, `script*` or `plain`.
fn decorated_name(entry: &FsEntry) -> String {
    if entry.is_dir() {
        format!("{}/", entry.name)
    } else if entry.executable {
        format!("{}*", entry.name)
    } else {
        entry.name.clone()
    }
}

fn render_tree(children: &HashMap<&str, Vec<&FsEntry>>, dir: &str, prefix: &str, out: &mut Vec<String>) {
    let Some(entries) = children.get(dir) else {
        return;
    };
    for (i, entry) in entries.iter().enumerate() {
        let last = i + 1 == entries.len();
        let connector = if last { "└── " } else { "├── " };
        if entry.is_dir() {
            out.push(format!("{prefix}{connector}{}/", entry.name));
            let extension = if last { "    " } else { "│   " };
            render_tree(children, &entry.path, &format!("{prefix}{extension}"), out);
        } else {
            out.push(format!("{prefix}{connector}{}", entry.name));
        }
    }
}

fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1000), "1,000");
        assert_eq!(thousands(1234567), "1,234,567");
    }
}
