//! Path canonicalization and containment tests.
//!
//! Every path that enters the matcher goes through [`canonicalize`] first, so
//! comparisons elsewhere can be plain byte-prefix checks. Directories always
//! carry a trailing separator in canonical form, which keeps `/etc-backup`
//! from being mistaken for a child of `/etc/`.

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Component, MAIN_SEPARATOR, Path, PathBuf};

/// An absolute, normalized path. Directories end with a separator.
///
/// Equality is byte equality of the canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalPath(PathBuf);

impl CanonicalPath {
    /// Wrap a path that is already known to be canonical (for example one
    /// derived by joining onto another canonical path).
    #[must_use]
    pub(crate) const fn from_trusted(path: PathBuf) -> Self {
        Self(path)
    }

    /// Borrow the underlying path.
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Raw bytes of the canonical form, used for prefix comparisons.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_os_str().as_encoded_bytes()
    }

    /// Length of the canonical form in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// `true` for the empty path, which canonicalization never produces.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Whether the canonical form ends with a separator.
    #[must_use]
    pub fn is_dir_form(&self) -> bool {
        self.as_bytes().last().is_some_and(|b| is_separator_byte(*b))
    }

    /// Directory form of this path: a trailing separator is appended if it
    /// is not already present, whether or not the directory exists.
    #[must_use]
    pub fn as_dir(&self) -> Self {
        if self.is_dir_form() {
            return self.clone();
        }
        let mut s: OsString = self.0.clone().into_os_string();
        s.push(MAIN_SEPARATOR.to_string());
        Self(PathBuf::from(s))
    }

    /// The path without any trailing separator, suitable for filesystem calls
    /// that treat `link/` as "follow the link".
    #[must_use]
    pub fn trimmed(&self) -> PathBuf {
        self.0.components().collect()
    }

    /// `true` iff `other` has `self` as a literal prefix.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        other.as_bytes().starts_with(self.as_bytes())
    }

    /// The part of `other` after this prefix, if `other` lies under `self`.
    #[must_use]
    pub fn strip_from<'a>(&self, other: &'a Self) -> Option<&'a Path> {
        if !self.contains(other) {
            return None;
        }
        other.as_path().strip_prefix(self.as_path()).ok()
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for CanonicalPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

const fn is_separator_byte(b: u8) -> bool {
    b == b'/' || (cfg!(windows) && b == b'\\')
}

/// Return the current user's home directory from `$HOME`.
///
/// # Errors
///
/// Returns [`io::ErrorKind::NotFound`] when neither `HOME` nor
/// `USERPROFILE` is set.
pub fn home_dir() -> io::Result<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "HOME is not set"))
}

/// Expand a leading `~` or `~/` to the home directory.
fn expand_home(path: &Path) -> io::Result<PathBuf> {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => {
            Ok(home_dir()?.join(components.as_path()))
        }
        _ => Ok(path.to_path_buf()),
    }
}

/// Make `path` absolute and remove `.` and `..` lexically.
fn absolutize(path: &Path) -> io::Result<PathBuf> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}

/// Canonicalize `path`.
///
/// `~` is expanded, the path is made absolute, and `.`/`..` are removed.
/// With `resolve_symlinks` every symlink is resolved; without it only the
/// parent directory is resolved and the final component is kept as written,
/// so a symlink under inspection stays a symlink. An existing directory gets
/// a trailing separator.
///
/// # Errors
///
/// Returns a `NotFound` error only when a non-final component is missing.
/// A missing leaf is never an error.
pub fn canonicalize(path: impl AsRef<Path>, resolve_symlinks: bool) -> io::Result<CanonicalPath> {
    let path = absolutize(&expand_home(path.as_ref())?)?;

    let resolved = if resolve_symlinks {
        match dunce::canonicalize(&path) {
            Ok(real) => real,
            Err(e) if e.kind() == io::ErrorKind::NotFound => resolve_parent(&path)?,
            Err(e) => return Err(e),
        }
    } else {
        resolve_parent(&path)?
    };

    let canonical = CanonicalPath(resolved);
    if canonical.as_path().is_dir() {
        Ok(canonical.as_dir())
    } else {
        Ok(canonical)
    }
}

/// Resolve every component except the last one.
fn resolve_parent(path: &Path) -> io::Result<PathBuf> {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(leaf)) => Ok(dunce::canonicalize(parent)?.join(leaf)),
        // The filesystem root has neither parent nor name.
        _ => Ok(path.to_path_buf()),
    }
}

/// Canonicalize a rule root in directory form.
///
/// Unlike [`canonicalize`], any number of trailing components may be
/// missing: the deepest existing ancestor is resolved and the rest is
/// appended as written. Rules may name directories that only appear later.
///
/// # Errors
///
/// Fails when the home directory or current directory cannot be
/// determined, or an existing ancestor cannot be resolved.
pub fn canonicalize_root(path: impl AsRef<Path>) -> io::Result<CanonicalPath> {
    let path = absolutize(&expand_home(path.as_ref())?)?;
    let mut existing = path.as_path();
    let mut missing = Vec::new();
    while !existing.try_exists()? {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(leaf)) => {
                missing.push(leaf.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }
    let mut resolved = dunce::canonicalize(existing)?;
    for leaf in missing.iter().rev() {
        resolved.push(leaf);
    }
    Ok(CanonicalPath(resolved).as_dir())
}

/// `true` iff `path` lies inside `parent` once both are canonicalized
/// without following a final symlink.
///
/// # Errors
///
/// Propagates errors from [`canonicalize`].
pub fn is_contained_in(parent: impl AsRef<Path>, path: impl AsRef<Path>) -> io::Result<bool> {
    let parent = canonicalize(parent, false)?;
    let path = canonicalize(path, false)?;
    Ok(parent.contains(&path))
}
