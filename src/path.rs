//! Canonical path handling for the virtual filesystem
//!
//! Every path that reaches storage goes through [`normalize`]. A canonical
//! path is absolute, has no empty, `.` or `..` segments and no trailing slash
//! (the root is exactly `/`). `..` above the root is absorbed.

use crate::schema::ROOT_PATH;

/// Turn any string into a canonical absolute path. Total and idempotent.
pub fn normalize(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }

    if stack.is_empty() {
        ROOT_PATH.to_string()
    } else {
        format!("/{}", stack.join("/"))
    }
}

/// Resolve `target` against `current_dir` (absolute targets ignore it).
pub fn resolve(current_dir: &str, target: &str) -> String {
    if target.starts_with('/') {
        normalize(target)
    } else {
        normalize(&format!("{}/{}", current_dir, target))
    }
}

/// Final segment of a canonical path; `/` for the root.
pub fn file_name(path: &str) -> &str {
    if path == ROOT_PATH {
        return ROOT_PATH;
    }
    path.rsplit('/').next().unwrap_or(path)
}

/// Parent of a canonical path, `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT_PATH {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT_PATH),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Prefix shared by every descendant of `path`.
pub fn child_prefix(path: &str) -> String {
    if path == ROOT_PATH {
        ROOT_PATH.to_string()
    } else {
        format!("{}/", path)
    }
}

/// Whether `path` lies strictly below `ancestor`.
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    path != ancestor && path.starts_with(&child_prefix(ancestor))
}

/// Whether `path` is `ancestor` itself or lies below it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    path == ancestor || is_descendant(path, ancestor)
}

/// Replace the `from` prefix of `path` with `to`.
///
/// `path` must be within `from`.
pub fn rebase(path: &str, from: &str, to: &str) -> String {
    if path == from {
        return to.to_string();
    }
    let rest = &path[child_prefix(from).len()..];
    format!("{}{}", child_prefix(to), rest)
}

/// `true` when `path` is a direct child of `dir`.
pub fn is_direct_child(path: &str, dir: &str) -> bool {
    if !is_descendant(path, dir) {
        return false;
    }
    !path[child_prefix(dir).len()..].contains('/')
}

/// Number of segments below the root.
pub fn depth(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}
