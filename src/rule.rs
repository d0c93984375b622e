//! A single mapping rule ("phantasm") from an external subtree to a store
//! subtree.
use std::ffi::OsString;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use crate::paths::CanonicalPath;

/// Naming transform applied to the store-relative path of a matched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    /// Store the file under the same relative name.
    Identity,
    /// Strip one leading `.` from the first component below the store root,
    /// so `~/.bashrc` is stored as `bashrc`.
    RevealHidden,
}

impl TransformKind {
    /// Apply the transform to a path relative to the store root.
    #[must_use]
    pub fn apply(self, relative: &Path) -> PathBuf {
        match self {
            Self::Identity => relative.to_path_buf(),
            Self::RevealHidden => reveal_first_component(relative),
        }
    }

    /// Identifier written to the configuration file.
    #[must_use]
    pub const fn identifier(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::RevealHidden => "reveal-hidden",
        }
    }
}

impl FromStr for TransformKind {
    type Err = String;

    /// Parse a configuration `type` value. The legacy class names
    /// (`realitymarble.Phantasm` and friends) are accepted too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix("realitymarble.").unwrap_or(s);
        match name {
            "identity" | "Phantasm" | "scripts" | "ScriptsPhantasm" => Ok(Self::Identity),
            "reveal-hidden" | "NoHiddenPhantasm" => Ok(Self::RevealHidden),
            _ => Err(s.to_string()),
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

fn reveal_first_component(relative: &Path) -> PathBuf {
    let mut components = relative.components();
    let Some(Component::Normal(first)) = components.next() else {
        return relative.to_path_buf();
    };
    let revealed = first
        .to_str()
        .and_then(|s| s.strip_prefix('.'))
        .filter(|rest| !rest.is_empty() && *rest != ".")
        .map_or_else(|| first.to_os_string(), OsString::from);
    let mut out = PathBuf::from(revealed);
    out.push(components.as_path());
    out
}

/// Result of a successful [`Rule::matches`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    /// Length of the matched external root; longer is more specific.
    pub specificity: usize,
    /// Derived location inside the store.
    pub internal: CanonicalPath,
}

/// One mapping rule. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Name of the rule, also its subdirectory under the marble root.
    pub name: String,
    /// Where this rule's files live inside the marble.
    pub store_root: CanonicalPath,
    /// External subtree claimed by this rule.
    pub external_root: CanonicalPath,
    /// Naming transform for stored files.
    pub transform: TransformKind,
}

impl Rule {
    /// Create a rule. Both roots are kept in directory form.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        store_root: &CanonicalPath,
        external_root: &CanonicalPath,
        transform: TransformKind,
    ) -> Self {
        Self {
            name: name.into(),
            store_root: store_root.as_dir(),
            external_root: external_root.as_dir(),
            transform,
        }
    }

    /// Map `external` into the store, or `None` if it is outside this rule.
    #[must_use]
    pub fn matches(&self, external: &CanonicalPath) -> Option<RuleMatch> {
        let relative = self.external_root.strip_from(external)?;
        let transformed = self.transform.apply(relative);
        let mut internal: OsString = self.store_root.as_path().as_os_str().to_os_string();
        internal.push(transformed.as_os_str());
        let internal = CanonicalPath::from_trusted(PathBuf::from(internal));
        let internal = if external.is_dir_form() {
            internal.as_dir()
        } else {
            internal
        };
        tracing::debug!("rule {} maps {external} -> {internal}", self.name);
        Some(RuleMatch {
            specificity: self.external_root.len(),
            internal,
        })
    }
}
