//! Ordered rule collection and best-match resolution.
use crate::operation::Operation;
use crate::paths::CanonicalPath;
use crate::rule::{Rule, RuleMatch};

/// Outcome of [`RuleSet::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Length of the winning external root, `0` when nothing matched.
    pub specificity: usize,
    /// Operation for the winning rule.
    pub operation: Option<Operation>,
}

impl MatchResult {
    /// The "unmanaged path" result.
    #[must_use]
    pub const fn unmatched() -> Self {
        Self {
            specificity: 0,
            operation: None,
        }
    }
}

/// All configured rules, in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Build a rule set; order is preserved for tie-breaking.
    #[must_use]
    pub const fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Whether any rule is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Iterate rules in configuration order.
    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    /// Pick the most specific rule for `external`. Ties go to the rule
    /// listed first.
    #[must_use]
    pub fn resolve(&self, external: &CanonicalPath) -> MatchResult {
        let mut best: Option<(&Rule, RuleMatch)> = None;
        for rule in &self.rules {
            let Some(hit) = rule.matches(external) else {
                continue;
            };
            if best
                .as_ref()
                .is_none_or(|(_, current)| hit.specificity > current.specificity)
            {
                best = Some((rule, hit));
            }
        }

        best.map_or_else(MatchResult::unmatched, |(rule, hit)| MatchResult {
            specificity: hit.specificity,
            operation: Some(Operation::new(
                rule.store_root.clone(),
                hit.internal,
                external.clone(),
            )),
        })
    }

    /// One human-readable line per rule.
    #[must_use]
    pub fn describe(&self) -> Vec<String> {
        self.rules
            .iter()
            .map(|r| {
                format!(
                    "{} ({}), type: {}",
                    r.store_root, r.external_root, r.transform
                )
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
