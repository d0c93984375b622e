//! The `.realitymarble` configuration file.
//!
//! The file sits at the marble root and lists the rules ("phantasms"):
//!
//! ```json
//! { "phantasms": [ { "name": "etc", "type": "identity", "joint_path": "/etc/" } ] }
//! ```
//!
//! `name` is the rule's subdirectory inside the marble, `type` selects the
//! naming transform and `joint_path` is the external subtree it claims.
pub mod validation;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::paths::{CanonicalPath, canonicalize_root};
use crate::rule::{Rule, TransformKind};
use crate::ruleset::RuleSet;

/// Name of the configuration file inside the marble root.
pub const CONFIG_FILE_NAME: &str = ".realitymarble";

/// Configuration written when a marble has none.
pub const DEFAULT_CONFIG: &str = r#"{
    "phantasms": [
        {
            "name": "etc",
            "type": "identity",
            "joint_path": "/etc/"
        },
        {
            "name": "home",
            "type": "reveal-hidden",
            "joint_path": "~/"
        },
        {
            "name": "scripts",
            "type": "scripts",
            "joint_path": "~/.local/bin/"
        }
    ]
}
"#;

/// One rule as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhantasmSpec {
    /// Subdirectory of the marble root holding this rule's files.
    pub name: String,
    /// Transform identifier, see [`TransformKind`].
    #[serde(rename = "type")]
    pub kind: String,
    /// External subtree claimed by the rule. `~` is expanded.
    pub joint_path: String,
}

/// Parsed `.realitymarble` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarbleConfig {
    /// Rules in configuration order.
    #[serde(default)]
    pub phantasms: Vec<PhantasmSpec>,
}

/// Path of the configuration file for a marble rooted at `root`.
#[must_use]
pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}

impl MarbleConfig {
    /// Parse configuration text. `origin` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not valid JSON for the
    /// expected schema.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.display().to_string(),
            source,
        })
    }

    /// Read the configuration of the marble at `root`, writing
    /// [`DEFAULT_CONFIG`] first if the file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written, read or parsed.
    pub fn load_or_init(root: &Path) -> Result<Self, ConfigError> {
        let path = config_path(root);
        let io_err = |source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        };

        if !path.exists() {
            tracing::warn!("writing default configuration file: {}", path.display());
            fs::write(&path, DEFAULT_CONFIG).map_err(io_err)?;
        }
        let content = fs::read_to_string(&path).map_err(io_err)?;
        Self::parse(&content, &path)
    }

    /// Build the rule set for a marble rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown transform identifier or a rule path
    /// that cannot be resolved.
    pub fn build_rules(&self, root: &CanonicalPath) -> Result<RuleSet, ConfigError> {
        let mut rules = Vec::with_capacity(self.phantasms.len());
        for spec in &self.phantasms {
            let transform = spec
                .kind
                .parse::<TransformKind>()
                .map_err(|kind| ConfigError::UnknownTransform {
                    name: spec.name.clone(),
                    kind,
                })?;
            let path_err = |path: &Path| {
                let path = path.display().to_string();
                let name = spec.name.clone();
                move |source| ConfigError::Path { name, path, source }
            };
            let external = canonicalize_root(&spec.joint_path)
                .map_err(path_err(Path::new(&spec.joint_path)))?;
            let store_path = root.as_path().join(&spec.name);
            let store = canonicalize_root(&store_path).map_err(path_err(&store_path))?;
            rules.push(Rule::new(&spec.name, &store, &external, transform));
        }
        Ok(RuleSet::new(rules))
    }
}
