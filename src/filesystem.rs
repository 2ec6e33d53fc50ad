//! Virtual filesystem over SQL
//!
//! Every identity owns a private namespace stored as flat rows keyed by
//! `(owner, path)` with materialized canonical paths. Listing, moving and
//! copying are prefix operations on the `path` column.
//!
//! Multi-row mutations (recursive remove, move, copy, home bootstrap) run in
//! one transaction. On top of that, every operation takes a per-owner lock:
//! shared for reads, exclusive for writes, so a reader never observes a
//! subtree halfway through a move.

use crate::backend::SqlBackend;
use crate::clock::{from_millis, Clock};
use crate::config::FilesystemTemplate;
use crate::mode::Permissions;
use crate::path;
use crate::schema::{self, kind, permissions};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::AnyConnection;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

type EntryRow = (String, String, String, String, String, i64, i64, i64, i64);

macro_rules! select_entries {
    ($tail:literal) => {
        concat!(
            "SELECT path, name, kind, content, permissions, executable, size, created_at, modified_at ",
            "FROM fs_entries ",
            $tail
        )
    };
}

/// Node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::File => kind::FILE,
            EntryKind::Directory => kind::DIRECTORY,
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            kind::FILE => Ok(EntryKind::File),
            kind::DIRECTORY => Ok(EntryKind::Directory),
            other => Err(Error::Corrupt(format!("unknown entry kind '{other}'"))),
        }
    }
}

/// One namespace node
#[derive(Debug, Clone, PartialEq)]
pub struct FsEntry {
    pub owner: String,
    pub path: String,
    pub name: String,
    pub kind: EntryKind,
    pub content: String,
    pub permissions: Permissions,
    pub executable: bool,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl FsEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }

    fn from_row(owner: &str, row: EntryRow) -> Result<Self> {
        let (path, name, kind, content, perms, executable, size, created_at, modified_at) = row;
        Ok(Self {
            owner: owner.to_string(),
            path,
            name,
            kind: EntryKind::parse(&kind)?,
            content,
            permissions: Permissions::parse(&perms)
                .map_err(|_| Error::Corrupt(format!("bad permissions '{perms}'")))?,
            executable: executable != 0,
            size: size.max(0) as u64,
            created_at: from_millis(created_at),
            modified_at: from_millis(modified_at),
        })
    }
}

/// Aggregate usage for one owner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
    pub total_files: u64,
    pub total_directories: u64,
    pub total_size: u64,
    pub files_size: u64,
}

/// Matching lines of one file, 1-based line numbers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrepMatch {
    pub path: String,
    pub lines: Vec<(usize, String)>,
}

struct NewEntry<'a> {
    path: &'a str,
    kind: EntryKind,
    content: &'a str,
    permissions: &'a str,
}

impl<'a> NewEntry<'a> {
    fn directory(path: &'a str) -> Self {
        Self {
            path,
            kind: EntryKind::Directory,
            content: "",
            permissions: permissions::DEFAULT_DIR,
        }
    }

    fn file(path: &'a str, content: &'a str, executable: bool) -> Self {
        Self {
            path,
            kind: EntryKind::File,
            content,
            permissions: if executable {
                permissions::EXECUTABLE_FILE
            } else {
                permissions::DEFAULT_FILE
            },
        }
    }
}

/// Per-owner reader/writer locks
#[derive(Default)]
struct OwnerLocks {
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl OwnerLocks {
    async fn lock_for(&self, owner: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(owner.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    async fn read(&self, owner: &str) -> OwnedRwLockReadGuard<()> {
        self.lock_for(owner).await.read_owned().await
    }

    async fn write(&self, owner: &str) -> OwnedRwLockWriteGuard<()> {
        self.lock_for(owner).await.write_owned().await
    }
}

/// Persistent per-owner hierarchical store
pub struct FilesystemStore {
    backend: Arc<SqlBackend>,
    clock: Arc<dyn Clock>,
    locks: OwnerLocks,
}

impl FilesystemStore {
    pub fn new(backend: Arc<SqlBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            locks: OwnerLocks::default(),
        }
    }

    /// Create the stock tree and `/home/<username>` for a new identity.
    ///
    /// Existing entries are left alone. Returns the home directory.
    pub async fn initialize_home(
        &self,
        owner: &str,
        username: &str,
        template: &FilesystemTemplate,
    ) -> Result<String> {
        let home = schema::home_dir(username);
        let now = self.clock.now_millis();

        let _guard = self.locks.write(owner).await;
        let mut tx = self.backend.begin().await?;

        ensure_directory_chain(&mut tx, owner, schema::HOME_ROOT, now).await?;

        let mut directories: Vec<String> = template
            .directories
            .iter()
            .map(|d| path::normalize(&d.replace("{username}", username)))
            .collect();
        directories.sort_by_key(|d| path::depth(d));
        directories.dedup();
        for dir in &directories {
            ensure_directory_chain(&mut tx, owner, dir, now).await?;
        }

        ensure_directory_chain(&mut tx, owner, &home, now).await?;
        for sub in schema::HOME_SUBDIRS {
            ensure_directory_chain(&mut tx, owner, &format!("{home}/{sub}"), now).await?;
        }

        for (file_path, file) in &template.files {
            let file_path = path::normalize(&file_path.replace("{username}", username));
            if fetch_entry(&mut tx, owner, &file_path).await?.is_some() {
                continue;
            }
            if let Some(parent) = path::parent(&file_path) {
                ensure_directory_chain(&mut tx, owner, parent, now).await?;
            }
            let content = file.content.replace("{username}", username);
            insert_row(
                &mut tx,
                owner,
                &NewEntry::file(&file_path, &content, file.executable),
                now,
            )
            .await?;
        }

        tx.commit().await?;

        tracing::info!(owner, home = %home, "Initialized filesystem");
        Ok(home)
    }

    /// Create a directory. The parent must already exist.
    pub async fn create_directory(&self, owner: &str, dir: &str) -> Result<FsEntry> {
        let dir = path::normalize(dir);
        self.create(owner, NewEntry::directory(&dir)).await
    }

    /// Create a file. The parent must already exist.
    pub async fn create_file(
        &self,
        owner: &str,
        file: &str,
        content: &str,
        executable: bool,
    ) -> Result<FsEntry> {
        let file = path::normalize(file);
        self.create(owner, NewEntry::file(&file, content, executable))
            .await
    }

    async fn create(&self, owner: &str, entry: NewEntry<'_>) -> Result<FsEntry> {
        let now = self.clock.now_millis();

        let _guard = self.locks.write(owner).await;
        let mut tx = self.backend.begin().await?;
        insert_checked(&mut tx, owner, &entry, now).await?;
        let created = fetch_entry(&mut tx, owner, entry.path)
            .await?
            .ok_or_else(|| Error::NotFound(entry.path.to_string()))?;
        tx.commit().await?;

        tracing::debug!(owner, path = entry.path, kind = entry.kind.as_str(), "Created entry");
        Ok(created)
    }

    /// Entry metadata and content, if present.
    pub async fn stat(&self, owner: &str, target: &str) -> Result<Option<FsEntry>> {
        let target = path::normalize(target);

        let _guard = self.locks.read(owner).await;
        let mut conn = self.backend.pool().acquire().await?;
        fetch_entry(&mut conn, owner, &target).await
    }

    pub async fn exists(&self, owner: &str, target: &str) -> Result<bool> {
        Ok(self.stat(owner, target).await?.is_some())
    }

    pub async fn is_directory(&self, owner: &str, target: &str) -> Result<bool> {
        Ok(self
            .stat(owner, target)
            .await?
            .map(|e| e.is_dir())
            .unwrap_or(false))
    }

    /// File content.
    pub async fn read(&self, owner: &str, file: &str) -> Result<String> {
        let file = path::normalize(file);

        let _guard = self.locks.read(owner).await;
        let mut conn = self.backend.pool().acquire().await?;
        match fetch_entry(&mut conn, owner, &file).await? {
            None => Err(Error::NotFound(file)),
            Some(entry) if entry.is_dir() => Err(Error::IsADirectory(file)),
            Some(entry) => Ok(entry.content),
        }
    }

    /// Replace file content.
    pub async fn write(&self, owner: &str, file: &str, content: &str) -> Result<()> {
        let file = path::normalize(file);
        let now = self.clock.now_millis();

        let _guard = self.locks.write(owner).await;
        let mut tx = self.backend.begin().await?;
        overwrite(&mut tx, owner, &file, content, now).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Replace file content, creating the file when absent. Returns `true`
    /// if the file was created.
    pub async fn write_or_create(&self, owner: &str, file: &str, content: &str) -> Result<bool> {
        let file = path::normalize(file);
        let now = self.clock.now_millis();

        let _guard = self.locks.write(owner).await;
        let mut tx = self.backend.begin().await?;
        let created = if fetch_entry(&mut tx, owner, &file).await?.is_some() {
            overwrite(&mut tx, owner, &file, content, now).await?;
            false
        } else {
            insert_checked(&mut tx, owner, &NewEntry::file(&file, content, false), now).await?;
            true
        };
        tx.commit().await?;
        Ok(created)
    }

    /// Direct children of a directory: directories first, then by name.
    pub async fn list(&self, owner: &str, dir: &str, include_hidden: bool) -> Result<Vec<FsEntry>> {
        let dir = path::normalize(dir);

        let _guard = self.locks.read(owner).await;
        let mut conn = self.backend.pool().acquire().await?;

        match fetch_entry(&mut conn, owner, &dir).await? {
            None => return Err(Error::NotFound(dir)),
            Some(entry) if !entry.is_dir() => return Err(Error::NotADirectory(dir)),
            Some(_) => {}
        }

        let prefix = path::child_prefix(&dir);
        let rows: Vec<EntryRow> = sqlx::query_as(select_entries!(
            "WHERE owner = $1 AND path <> $2 AND substr(path, 1, CAST($3 AS INTEGER)) = $4"
        ))
        .bind(owner)
        .bind(&dir)
        .bind(prefix_len(&prefix))
        .bind(&prefix)
        .fetch_all(&mut *conn)
        .await?;

        let mut entries = rows
            .into_iter()
            .map(|row| FsEntry::from_row(owner, row))
            .collect::<Result<Vec<_>>>()?;

        entries.retain(|e| path::is_direct_child(&e.path, &dir));
        if !include_hidden {
            entries.retain(|e| !e.is_hidden());
        }
        entries.sort_by(|a, b| b.is_dir().cmp(&a.is_dir()).then_with(|| a.name.cmp(&b.name)));

        Ok(entries)
    }

    /// Remove an entry; directories with children need `recursive`.
    /// Returns the number of rows deleted.
    pub async fn remove(&self, owner: &str, target: &str, recursive: bool) -> Result<u64> {
        let target = path::normalize(target);
        if target == schema::ROOT_PATH {
            return Err(Error::InvalidPath(target));
        }

        let _guard = self.locks.write(owner).await;
        let mut tx = self.backend.begin().await?;

        let entry = fetch_entry(&mut tx, owner, &target)
            .await?
            .ok_or_else(|| Error::NotFound(target.clone()))?;

        if entry.is_dir() && !recursive && count_descendants(&mut tx, owner, &target).await? > 0 {
            return Err(Error::DirectoryNotEmpty(target));
        }

        let prefix = path::child_prefix(&target);
        let removed = sqlx::query(
            "DELETE FROM fs_entries
             WHERE owner = $1 AND (path = $2 OR substr(path, 1, CAST($3 AS INTEGER)) = $4)",
        )
        .bind(owner)
        .bind(&target)
        .bind(prefix_len(&prefix))
        .bind(&prefix)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        tracing::debug!(owner, path = %target, removed, "Removed entry");
        Ok(removed)
    }

    /// Move or rename an entry together with its whole subtree.
    /// Returns the number of rows rewritten.
    pub async fn move_entry(&self, owner: &str, source: &str, destination: &str) -> Result<u64> {
        let source = path::normalize(source);
        let destination = path::normalize(destination);
        let now = self.clock.now_millis();

        let _guard = self.locks.write(owner).await;
        let mut tx = self.backend.begin().await?;

        let entry = fetch_entry(&mut tx, owner, &source)
            .await?
            .ok_or_else(|| Error::NotFound(source.clone()))?;
        if fetch_entry(&mut tx, owner, &destination).await?.is_some() {
            return Err(Error::AlreadyExists(destination));
        }
        if source == schema::ROOT_PATH || path::is_descendant(&destination, &source) {
            return Err(Error::InvalidPath(format!(
                "cannot move {source} into itself ({destination})"
            )));
        }
        check_parent(&mut tx, owner, &destination).await?;

        let descendants: Vec<(String,)> = if entry.is_dir() {
            let prefix = path::child_prefix(&source);
            sqlx::query_as(
                "SELECT path FROM fs_entries WHERE owner = $1 AND substr(path, 1, CAST($2 AS INTEGER)) = $3",
            )
            .bind(owner)
            .bind(prefix_len(&prefix))
            .bind(&prefix)
            .fetch_all(&mut *tx)
            .await?
        } else {
            Vec::new()
        };

        sqlx::query(
            "UPDATE fs_entries SET path = $1, name = $2, modified_at = $3 WHERE owner = $4 AND path = $5",
        )
        .bind(&destination)
        .bind(path::file_name(&destination))
        .bind(now)
        .bind(owner)
        .bind(&source)
        .execute(&mut *tx)
        .await?;

        for (old_path,) in &descendants {
            sqlx::query("UPDATE fs_entries SET path = $1 WHERE owner = $2 AND path = $3")
                .bind(path::rebase(old_path, &source, &destination))
                .bind(owner)
                .bind(old_path)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        let moved = descendants.len() as u64 + 1;
        tracing::debug!(owner, from = %source, to = %destination, moved, "Moved entry");
        Ok(moved)
    }

    /// Copy an entry; directories need `recursive`. Returns rows created.
    pub async fn copy(
        &self,
        owner: &str,
        source: &str,
        destination: &str,
        recursive: bool,
    ) -> Result<u64> {
        let source = path::normalize(source);
        let destination = path::normalize(destination);
        let now = self.clock.now_millis();

        let _guard = self.locks.write(owner).await;
        let mut tx = self.backend.begin().await?;

        let entry = fetch_entry(&mut tx, owner, &source)
            .await?
            .ok_or_else(|| Error::NotFound(source.clone()))?;
        if fetch_entry(&mut tx, owner, &destination).await?.is_some() {
            return Err(Error::AlreadyExists(destination));
        }
        if entry.is_dir() && !recursive {
            return Err(Error::MissingRecursiveFlag(source));
        }
        if entry.is_dir() && path::is_descendant(&destination, &source) {
            return Err(Error::InvalidPath(format!(
                "cannot copy {source} into itself ({destination})"
            )));
        }
        check_parent(&mut tx, owner, &destination).await?;

        let subtree = if entry.is_dir() {
            fetch_subtree(&mut tx, owner, &source).await?
        } else {
            vec![entry]
        };

        for node in &subtree {
            let new_path = path::rebase(&node.path, &source, &destination);
            insert_row(
                &mut tx,
                owner,
                &NewEntry {
                    path: &new_path,
                    kind: node.kind,
                    content: &node.content,
                    permissions: node.permissions.as_str(),
                },
                now,
            )
            .await?;
        }

        tx.commit().await?;

        let copied = subtree.len() as u64;
        tracing::debug!(owner, from = %source, to = %destination, copied, "Copied entry");
        Ok(copied)
    }

    /// chmod: octal (`755`) or symbolic (`rwxr-xr-x`) mode.
    pub async fn change_permissions(&self, owner: &str, target: &str, mode: &str) -> Result<Permissions> {
        let perms = Permissions::parse(mode)?;
        let target = path::normalize(target);
        let now = self.clock.now_millis();

        let _guard = self.locks.write(owner).await;
        let updated = sqlx::query(
            "UPDATE fs_entries SET permissions = $1, executable = $2, modified_at = $3 WHERE owner = $4 AND path = $5",
        )
        .bind(perms.as_str())
        .bind(perms.is_executable() as i64)
        .bind(now)
        .bind(owner)
        .bind(&target)
        .execute(self.backend.pool())
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(Error::NotFound(target));
        }
        Ok(perms)
    }

    /// Entries in the subtree rooted at `root` (root included) whose name
    /// contains `pattern`, case-insensitively.
    pub async fn find(
        &self,
        owner: &str,
        root: &str,
        pattern: Option<&str>,
        kind: Option<EntryKind>,
    ) -> Result<Vec<FsEntry>> {
        let root = path::normalize(root);
        let pattern = pattern.map(str::to_lowercase);

        let _guard = self.locks.read(owner).await;
        let mut conn = self.backend.pool().acquire().await?;
        let mut entries = fetch_subtree(&mut conn, owner, &root).await?;

        entries.retain(|e| {
            kind.is_none_or(|k| e.kind == k)
                && pattern
                    .as_deref()
                    .is_none_or(|p| e.name.to_lowercase().contains(p))
        });
        Ok(entries)
    }

    /// Case-insensitive substring search over file contents.
    pub async fn grep(&self, owner: &str, pattern: &str, root: Option<&str>) -> Result<Vec<GrepMatch>> {
        let needle = pattern.to_lowercase();

        let _guard = self.locks.read(owner).await;
        let mut conn = self.backend.pool().acquire().await?;

        let files = match root {
            Some(root) => fetch_subtree(&mut conn, owner, &path::normalize(root)).await?,
            None => {
                let rows: Vec<EntryRow> =
                    sqlx::query_as(select_entries!("WHERE owner = $1 AND kind = $2 ORDER BY path"))
                        .bind(owner)
                        .bind(kind::FILE)
                        .fetch_all(&mut *conn)
                        .await?;
                rows.into_iter()
                    .map(|row| FsEntry::from_row(owner, row))
                    .collect::<Result<Vec<_>>>()?
            }
        };

        Ok(files
            .into_iter()
            .filter(FsEntry::is_file)
            .filter_map(|file| {
                let lines: Vec<(usize, String)> = file
                    .content
                    .split('\n')
                    .enumerate()
                    .filter(|(_, line)| line.to_lowercase().contains(&needle))
                    .map(|(i, line)| (i + 1, line.to_string()))
                    .collect();
                (!lines.is_empty()).then_some(GrepMatch {
                    path: file.path,
                    lines,
                })
            })
            .collect())
    }

    /// File/directory counts and byte totals for one owner.
    pub async fn disk_usage(&self, owner: &str) -> Result<DiskUsage> {
        let _guard = self.locks.read(owner).await;
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            "SELECT kind, COUNT(*), CAST(COALESCE(SUM(size), 0) AS BIGINT) FROM fs_entries WHERE owner = $1 GROUP BY kind",
        )
        .bind(owner)
        .fetch_all(self.backend.pool())
        .await?;

        let mut usage = DiskUsage::default();
        for (kind_name, count, size) in rows {
            let size = size.max(0) as u64;
            match EntryKind::parse(&kind_name)? {
                EntryKind::File => {
                    usage.total_files = count as u64;
                    usage.files_size = size;
                }
                EntryKind::Directory => usage.total_directories = count as u64,
            }
            usage.total_size += size;
        }
        Ok(usage)
    }
}

/// Character length of a path prefix, for `substr` comparisons.
///
/// `LIKE` folds ASCII case on SQLite, so prefix matches compare the leading
/// characters exactly instead.
fn prefix_len(prefix: &str) -> i64 {
    prefix.chars().count() as i64
}

async fn fetch_entry(conn: &mut AnyConnection, owner: &str, target: &str) -> Result<Option<FsEntry>> {
    let row: Option<EntryRow> = sqlx::query_as(select_entries!("WHERE owner = $1 AND path = $2"))
        .bind(owner)
        .bind(target)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|row| FsEntry::from_row(owner, row)).transpose()
}

/// `root` and everything below it, ordered by path.
async fn fetch_subtree(conn: &mut AnyConnection, owner: &str, root: &str) -> Result<Vec<FsEntry>> {
    let prefix = path::child_prefix(root);
    let rows: Vec<EntryRow> = sqlx::query_as(select_entries!(
        "WHERE owner = $1 AND (path = $2 OR substr(path, 1, CAST($3 AS INTEGER)) = $4) ORDER BY path"
    ))
    .bind(owner)
    .bind(root)
    .bind(prefix_len(&prefix))
    .bind(&prefix)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|row| FsEntry::from_row(owner, row))
        .collect()
}

async fn count_descendants(conn: &mut AnyConnection, owner: &str, dir: &str) -> Result<i64> {
    let prefix = path::child_prefix(dir);
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM fs_entries
         WHERE owner = $1 AND path <> $2 AND substr(path, 1, CAST($3 AS INTEGER)) = $4",
    )
    .bind(owner)
    .bind(dir)
    .bind(prefix_len(&prefix))
    .bind(&prefix)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

/// The parent of `target` must exist and be a directory.
async fn check_parent(conn: &mut AnyConnection, owner: &str, target: &str) -> Result<()> {
    let Some(parent) = path::parent(target) else {
        return Err(Error::InvalidPath(target.to_string()));
    };
    match fetch_entry(conn, owner, parent).await? {
        None => Err(Error::NotFound(parent.to_string())),
        Some(entry) if !entry.is_dir() => Err(Error::NotADirectory(parent.to_string())),
        Some(_) => Ok(()),
    }
}

async fn insert_checked(conn: &mut AnyConnection, owner: &str, entry: &NewEntry<'_>, now: i64) -> Result<()> {
    if fetch_entry(conn, owner, entry.path).await?.is_some() {
        return Err(Error::AlreadyExists(entry.path.to_string()));
    }
    if entry.path != schema::ROOT_PATH {
        check_parent(conn, owner, entry.path).await?;
    }
    insert_row(conn, owner, entry, now).await
}

async fn insert_row(conn: &mut AnyConnection, owner: &str, entry: &NewEntry<'_>, now: i64) -> Result<()> {
    let executable = entry.permissions[..3].contains('x');
    sqlx::query(
        "INSERT INTO fs_entries (owner, path, name, kind, content, permissions, executable, size, created_at, modified_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(owner)
    .bind(entry.path)
    .bind(path::file_name(entry.path))
    .bind(entry.kind.as_str())
    .bind(entry.content)
    .bind(entry.permissions)
    .bind(executable as i64)
    .bind(entry.content.len() as i64)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Create `dir` and any missing ancestors.
async fn ensure_directory_chain(conn: &mut AnyConnection, owner: &str, dir: &str, now: i64) -> Result<()> {
    let mut chain = vec![dir.to_string()];
    let mut cursor = dir;
    while let Some(parent) = path::parent(cursor) {
        chain.push(parent.to_string());
        cursor = parent;
    }

    for node in chain.iter().rev() {
        match fetch_entry(conn, owner, node).await? {
            Some(entry) if entry.is_dir() => continue,
            Some(_) => return Err(Error::NotADirectory(node.clone())),
            None => insert_row(conn, owner, &NewEntry::directory(node), now).await?,
        }
    }
    Ok(())
}

async fn overwrite(conn: &mut AnyConnection, owner: &str, file: &str, content: &str, now: i64) -> Result<()> {
    match fetch_entry(conn, owner, file).await? {
        None => return Err(Error::NotFound(file.to_string())),
        Some(entry) if entry.is_dir() => return Err(Error::IsADirectory(file.to_string())),
        Some(_) => {}
    }
    sqlx::query(
        "UPDATE fs_entries SET content = $1, size = $2, modified_at = $3 WHERE owner = $4 AND path = $5",
    )
    .bind(content)
    .bind(content.len() as i64)
    .bind(now)
    .bind(owner)
    .bind(file)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
