//! Consistency checks on a loaded rule set.
//!
//! Problems found here are reported as warnings. The marble still opens;
//! the checks point out rules that will behave surprisingly.
use std::collections::HashSet;
use std::path::{Component, Path};

use crate::paths::CanonicalPath;
use crate::ruleset::RuleSet;

use super::{CONFIG_FILE_NAME, MarbleConfig};

/// A validation warning detected during configuration loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// The configuration source.
    pub source: String,
    /// The rule that triggered the warning.
    pub item: String,
    /// Human-readable warning message.
    pub message: String,
}

impl ValidationWarning {
    /// Create a warning.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        item: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            item: item.into(),
            message: message.into(),
        }
    }

    fn rule(item: &str, message: impl Into<String>) -> Self {
        Self::new(CONFIG_FILE_NAME, item, message)
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}: {}", self.source, self.item, self.message)
    }
}

/// Check the raw rule names.
fn check_names(config: &MarbleConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut seen = HashSet::new();

    for spec in &config.phantasms {
        if !seen.insert(spec.name.as_str()) {
            warnings.push(ValidationWarning::rule(
                &spec.name,
                "duplicate phantasm name, the first one wins on ties",
            ));
        }

        let mut components = Path::new(&spec.name).components();
        let single = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single {
            warnings.push(ValidationWarning::rule(
                &spec.name,
                "phantasm name should be a single directory name",
            ));
        }
    }

    warnings
}

/// Check the resolved rule roots against the marble root and each other.
fn check_roots(rules: &RuleSet, marble_root: &CanonicalPath) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    for rule in rules {
        if marble_root.contains(&rule.external_root) {
            warnings.push(ValidationWarning::rule(
                &rule.name,
                format!(
                    "joint path {} lies inside the reality marble and will never match",
                    rule.external_root
                ),
            ));
        }

        for other in rules {
            if other.name != rule.name
                && other.store_root != rule.store_root
                && rule.store_root.contains(&other.store_root)
            {
                warnings.push(ValidationWarning::rule(
                    &other.name,
                    format!("store directory is nested inside phantasm '{}'", rule.name),
                ));
            }
        }
    }

    warnings
}

/// Validate a configuration and the rule set built from it.
#[must_use]
pub fn validate_all(
    config: &MarbleConfig,
    rules: &RuleSet,
    marble_root: &CanonicalPath,
) -> Vec<ValidationWarning> {
    let mut all_warnings = check_names(config);
    all_warnings.extend(check_roots(rules, marble_root));
    all_warnings
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::PhantasmSpec;
    use crate::rule::{Rule, TransformKind};
    use std::path::PathBuf;

    fn spec(name: &str) -> PhantasmSpec {
        PhantasmSpec {
            name: name.to_string(),
            kind: "identity".to_string(),
            joint_path: "/etc/".to_string(),
        }
    }

    fn cp(s: &str) -> CanonicalPath {
        CanonicalPath::from_trusted(PathBuf::from(s))
    }

    #[test]
    fn duplicate_names_warn_once() {
        let config = MarbleConfig {
            phantasms: vec![spec("etc"), spec("home"), spec("etc")],
        };
        let warnings = check_names(&config);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("duplicate"));
    }

    #[test]
    fn nested_or_odd_names_warn() {
        let config = MarbleConfig {
            phantasms: vec![spec("a/b"), spec(".."), spec("ok")],
        };
        let warnings = check_names(&config);
        let items: Vec<_> = warnings.iter().map(|w| w.item.as_str()).collect();
        assert_eq!(items, ["a/b", ".."]);
    }

    #[test]
    fn joint_path_inside_marble_warns() {
        let root = cp("/m/");
        let rules = RuleSet::new(vec![Rule::new(
            "self",
            &cp("/m/self/"),
            &cp("/m/sub/"),
            TransformKind::Identity,
        )]);
        let warnings = check_roots(&rules, &root);
        assert_eq!(warnings.len(), 1);
        insta::assert_snapshot!(
            warnings[0].to_string(),
            @".realitymarble: self: joint path /m/sub/ lies inside the reality marble and will never match"
        );
    }

    #[test]
    fn nested_store_roots_warn() {
        let root = cp("/m/");
        let rules = RuleSet::new(vec![
            Rule::new("a", &cp("/m/a/"), &cp("/etc/"), TransformKind::Identity),
            Rule::new("a/b", &cp("/m/a/b/"), &cp("/opt/"), TransformKind::Identity),
        ]);
        let warnings = check_roots(&rules, &root);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].item, "a/b");
    }

    #[test]
    fn default_layout_is_clean() {
        let root = cp("/home/u/customizations/");
        let config = MarbleConfig {
            phantasms: vec![spec("etc"), spec("home")],
        };
        let rules = RuleSet::new(vec![
            Rule::new(
                "etc",
                &cp("/home/u/customizations/etc/"),
                &cp("/etc/"),
                TransformKind::Identity,
            ),
            Rule::new(
                "home",
                &cp("/home/u/customizations/home/"),
                &cp("/home/u/"),
                TransformKind::RevealHidden,
            ),
        ]);
        assert!(validate_all(&config, &rules, &root).is_empty());
    }
}
