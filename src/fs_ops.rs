//! Filesystem mutations as serializable values.
//!
//! Every change the marble makes to the filesystem is described by a
//! [`Mutation`]. Describing the change as data lets the transaction layer
//! retry the identical step in an elevated child process (the value is sent
//! over the command line as JSON) and lets tests inject failures through the
//! [`FileSystemOps`] seam.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One elemental filesystem change.
///
/// Serialized as `{"func": "<id>", "args": {...}}`; the `func` tag is the
/// function identifier used by the elevated entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "func", content = "args", rename_all = "snake_case")]
pub enum Mutation {
    /// Copy a regular file, creating the destination's parent directories.
    /// A failed copy removes the directories it created.
    CopyFile {
        /// File to read.
        src: PathBuf,
        /// File to create or overwrite.
        dest: PathBuf,
    },
    /// Create a new empty file, creating parent directories. Fails if the
    /// file already exists.
    CreateEmpty {
        /// File to create.
        path: PathBuf,
    },
    /// Replace whatever is at `external` with a symlink to `internal`.
    Project {
        /// Link target inside the store.
        internal: PathBuf,
        /// Where the link is placed.
        external: PathBuf,
    },
    /// Replace whatever is at `external` with a copy of `internal`.
    Materialize {
        /// File inside the store.
        internal: PathBuf,
        /// Where the copy is placed.
        external: PathBuf,
    },
    /// Remove a file or symlink.
    Unlink {
        /// Path to remove.
        path: PathBuf,
        /// Treat a missing path as success.
        force: bool,
    },
    /// Remove empty directories from `start` upwards, stopping before
    /// `stop_at`. Non-empty directories end the walk silently.
    PruneEmptyDirs {
        /// First directory to try.
        start: PathBuf,
        /// Directory that is never removed.
        stop_at: PathBuf,
    },
}

impl Mutation {
    /// Function identifier used on the elevated command line.
    #[must_use]
    pub const fn function_id(&self) -> &'static str {
        match self {
            Self::CopyFile { .. } => "copy_file",
            Self::CreateEmpty { .. } => "create_empty",
            Self::Project { .. } => "project",
            Self::Materialize { .. } => "materialize",
            Self::Unlink { .. } => "unlink",
            Self::PruneEmptyDirs { .. } => "prune_empty_dirs",
        }
    }

    /// The path this mutation changes, for error messages.
    #[must_use]
    pub fn target(&self) -> &Path {
        match self {
            Self::CopyFile { dest, .. } => dest,
            Self::CreateEmpty { path } | Self::Unlink { path, .. } => path,
            Self::Project { external, .. } | Self::Materialize { external, .. } => external,
            Self::PruneEmptyDirs { start, .. } => start,
        }
    }

    /// Serialize the arguments (without the function identifier).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn args_json(&self) -> serde_json::Result<String> {
        let value = serde_json::to_value(self)?;
        serde_json::to_string(&value.get("args").cloned().unwrap_or_default())
    }

    /// Rebuild a mutation from a function identifier and its JSON arguments.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown identifier or malformed arguments.
    pub fn from_call(function: &str, args_json: &str) -> serde_json::Result<Self> {
        let args: serde_json::Value = serde_json::from_str(args_json)?;
        serde_json::from_value(serde_json::json!({ "func": function, "args": args }))
    }

    /// Carry out the mutation with the current process's privileges.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error of the failing system call.
    pub fn perform(&self) -> io::Result<()> {
        match self {
            Self::CopyFile { src, dest } => {
                with_new_parents(dest, || fs::copy(src, dest).map(|_| ()))
            }
            Self::CreateEmpty { path } => with_new_parents(path, || {
                fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(path)
                    .map(|_| ())
            }),
            Self::Project { internal, external } => replace_with_symlink(internal, external),
            Self::Materialize { internal, external } => replace_with_copy(internal, external),
            Self::Unlink { path, force } => match fs::remove_file(path) {
                Err(e) if *force && e.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
            Self::PruneEmptyDirs { start, stop_at } => prune_empty_dirs(start, stop_at),
        }
    }
}

/// Abstraction over applying [`Mutation`]s.
///
/// Production code uses [`SystemFileSystemOps`]; tests substitute an
/// implementation that fails on chosen steps.
pub trait FileSystemOps: std::fmt::Debug {
    /// Apply one mutation.
    ///
    /// # Errors
    ///
    /// Returns the I/O error of the failing system call.
    fn perform(&self, mutation: &Mutation) -> io::Result<()>;
}

/// [`FileSystemOps`] that delegates to [`Mutation::perform`].
#[derive(Debug, Default)]
pub struct SystemFileSystemOps;

impl FileSystemOps for SystemFileSystemOps {
    fn perform(&self, mutation: &Mutation) -> io::Result<()> {
        mutation.perform()
    }
}

/// Create the missing parent directories of `path`, then run `create`.
///
/// If `create` fails, the file it may have left and every directory made
/// here are removed again, so a failed step leaves the tree as it found it.
fn with_new_parents(path: &Path, create: impl FnOnce() -> io::Result<()>) -> io::Result<()> {
    let created = create_parent_dirs(path)?;
    let existed = fs::symlink_metadata(path).is_ok();
    create().inspect_err(|_| {
        if !existed {
            let _ = fs::remove_file(path);
        }
        remove_dirs(&created);
    })
}

/// Create each missing ancestor of `path`, outermost first, and return the
/// ones this call created.
fn create_parent_dirs(path: &Path) -> io::Result<Vec<PathBuf>> {
    let Some(parent) = path.parent() else {
        return Ok(Vec::new());
    };
    let missing: Vec<&Path> = parent
        .ancestors()
        .take_while(|dir| !dir.as_os_str().is_empty() && fs::symlink_metadata(dir).is_err())
        .collect();

    let mut created = Vec::with_capacity(missing.len());
    for dir in missing.into_iter().rev() {
        match fs::create_dir(dir) {
            Ok(()) => created.push(dir.to_path_buf()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                remove_dirs(&created);
                return Err(e);
            }
        }
    }
    Ok(created)
}

/// Best-effort removal of directories created by [`create_parent_dirs`],
/// innermost first.
fn remove_dirs(created: &[PathBuf]) {
    for dir in created.iter().rev() {
        if let Err(e) = fs::remove_dir(dir) {
            tracing::debug!("could not remove {}: {e}", dir.display());
        }
    }
}

/// Sibling path used to stage a replacement before renaming it into place,
/// keeping the rename on one filesystem.
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "realitymarble".into(), |n| n.to_string_lossy().into_owned());
    path.with_file_name(format!(".{name}.realitymarble_tmp"))
}

/// Remove a stale staging entry, if any.
fn remove_stale(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Link `link -> target` by creating the symlink beside `link` and renaming
/// it over whatever is there. `link` is never left missing.
fn replace_with_symlink(target: &Path, link: &Path) -> io::Result<()> {
    let tmp = staging_path(link);
    remove_stale(&tmp)?;
    create_symlink(target, &tmp)?;
    if let Err(e) = fs::rename(&tmp, link) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// Copy `source` beside `target` and rename it over `target`.
fn replace_with_copy(source: &Path, target: &Path) -> io::Result<()> {
    let tmp = staging_path(target);
    remove_stale(&tmp)?;
    if let Err(e) = fs::copy(source, &tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    if let Err(e) = fs::rename(&tmp, target) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

fn prune_empty_dirs(start: &Path, stop_at: &Path) -> io::Result<()> {
    let mut dir = start.to_path_buf();
    while dir.starts_with(stop_at) && dir != stop_at {
        match fs::remove_dir(&dir) {
            Ok(()) => tracing::debug!("removed empty directory {}", dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => break,
            Err(e) => return Err(e),
        }
        if !dir.pop() {
            break;
        }
    }
    Ok(())
}

/// Create a symlink at `link` pointing to `target`.
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(windows)]
    {
        if target.is_dir() {
            std::os::windows::fs::symlink_dir(target, link)
        } else {
            std::os::windows::fs::symlink_file(target, link)
        }
    }
}
