//! Tag chains and the prefix-conflict rules between them.
//!
//! A chain is an ordered list of `(dimension, tag value)` selectors. Two
//! selectors are equal when their dimension id and tag value match; names and
//! levels are display data.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ChainError;
use crate::types::{Conflict, ViewDefinition};

/// One `(dimension, tag value)` element of a chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagSelector {
    pub dimension_id: i64,
    pub dimension_name: String,
    pub tag_value: String,
    /// 1-based position in the owning chain.
    #[serde(default)]
    pub level: usize,
}

impl TagSelector {
    pub fn new(dimension_id: i64, dimension_name: impl Into<String>, tag_value: impl Into<String>) -> Self {
        TagSelector {
            dimension_id,
            dimension_name: dimension_name.into(),
            tag_value: tag_value.into(),
            level: 0,
        }
    }

    /// Positional equality used by every chain comparison.
    pub fn matches(&self, other: &TagSelector) -> bool {
        self.dimension_id == other.dimension_id && self.tag_value == other.tag_value
    }
}

impl PartialEq for TagSelector {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other)
    }
}

impl Eq for TagSelector {}

impl fmt::Display for TagSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.dimension_name, self.tag_value)
    }
}

/// An ordered, shallow-to-deep list of tag selectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagChain(Vec<TagSelector>);

impl TagChain {
    /// Build a chain, numbering levels from 1 in the given order.
    pub fn new(selectors: Vec<TagSelector>) -> Self {
        let selectors = selectors
            .into_iter()
            .enumerate()
            .map(|(i, mut s)| {
                s.level = i + 1;
                s
            })
            .collect();
        TagChain(selectors)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn selectors(&self) -> &[TagSelector] {
        &self.0
    }

    /// The first `level` selectors. `level` is clamped to the chain length.
    pub fn prefix(&self, level: usize) -> &[TagSelector] {
        &self.0[..level.min(self.0.len())]
    }

    /// Ordered-prefix test: every selector of `self` matches the selector
    /// at the same position of `other`.
    pub fn is_prefix_of(&self, other: &TagChain) -> bool {
        self.len() <= other.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a.matches(b))
    }

    /// Like [`TagChain::is_prefix_of`] but `other` must be strictly longer.
    pub fn is_strict_prefix_of(&self, other: &TagChain) -> bool {
        self.len() < other.len() && self.is_prefix_of(other)
    }

    pub fn same_as(&self, other: &TagChain) -> bool {
        self.len() == other.len() && self.is_prefix_of(other)
    }

    /// Check the chain can be materialized as a directory path.
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.0.is_empty() {
            return Err(ChainError::Empty);
        }

        let mut dimensions = HashSet::new();
        for selector in &self.0 {
            if !dimensions.insert(selector.dimension_id) {
                return Err(ChainError::DuplicateDimension(selector.dimension_name.clone()));
            }
            crate::path::check_path_component(&selector.tag_value)
                .map_err(|reason| ChainError::InvalidTagValue(selector.tag_value.clone(), reason))?;
        }

        Ok(())
    }
}

impl fmt::Display for TagChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, selector) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " > ")?;
            }
            write!(f, "{}", selector)?;
        }
        write!(f, "]")
    }
}

impl From<Vec<TagSelector>> for TagChain {
    fn from(selectors: Vec<TagSelector>) -> Self {
        TagChain::new(selectors)
    }
}

/// How a candidate chain relates to an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainRelation {
    /// Both chains select exactly the same directories.
    Identical,
    /// The candidate is a strict prefix of the existing chain.
    Broader,
    /// The existing chain is a strict prefix of the candidate.
    Narrower,
    /// Neither is a prefix of the other.
    Unrelated,
}

pub fn relation(candidate: &TagChain, existing: &TagChain) -> ChainRelation {
    if candidate.same_as(existing) {
        ChainRelation::Identical
    } else if candidate.is_strict_prefix_of(existing) {
        ChainRelation::Broader
    } else if existing.is_strict_prefix_of(candidate) {
        ChainRelation::Narrower
    } else {
        ChainRelation::Unrelated
    }
}

/// Outcome of checking a candidate chain against a workspace's views.
#[derive(Debug, Clone, Default)]
pub struct ConflictCheck {
    /// Set when an existing, longer view would be shadowed. The save must be rejected.
    pub blocking: Option<Conflict>,
    /// Existing, shorter views made redundant by the candidate.
    pub superseded: Vec<ViewDefinition>,
}

impl ConflictCheck {
    pub fn is_blocked(&self) -> bool {
        self.blocking.is_some()
    }
}

/// Check `candidate` against every view in `others`, ignoring `exclude_view_id`.
///
/// When several longer views block the candidate the first one in `others`
/// order is reported.
pub fn check_conflict(
    candidate: &TagChain,
    others: &[ViewDefinition],
    exclude_view_id: Option<&str>,
) -> ConflictCheck {
    let mut check = ConflictCheck::default();

    for view in others {
        if Some(view.id.as_str()) == exclude_view_id {
            continue;
        }
        match relation(candidate, &view.chain) {
            ChainRelation::Broader => {
                if check.blocking.is_none() {
                    check.blocking = Some(Conflict {
                        blocking_view_id: view.id.clone(),
                        blocking_view_name: view.name.clone(),
                        blocking_chain: view.chain.clone(),
                    });
                }
            }
            ChainRelation::Narrower => check.superseded.push(view.clone()),
            ChainRelation::Identical | ChainRelation::Unrelated => {}
        }
    }

    check
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sel(dim: i64, value: &str) -> TagSelector {
        TagSelector::new(dim, format!("dim{}", dim), value)
    }

    fn chain(pairs: &[(i64, &str)]) -> TagChain {
        TagChain::new(pairs.iter().map(|(d, v)| sel(*d, v)).collect())
    }

    fn view(id: &str, pairs: &[(i64, &str)]) -> ViewDefinition {
        ViewDefinition::new(id, "ws", id.to_uppercase(), chain(pairs))
    }

    #[test]
    fn test_levels_are_numbered() {
        let c = chain(&[(1, "Doc"), (2, "PDF")]);
        let levels: Vec<_> = c.selectors().iter().map(|s| s.level).collect();
        assert_eq!(levels, vec![1, 2]);
    }

    #[test]
    fn test_equality_ignores_names() {
        let a = TagSelector::new(1, "Genre", "Doc");
        let b = TagSelector::new(1, "genre (renamed)", "Doc");
        assert_eq!(a, b);
        assert_ne!(a, TagSelector::new(2, "Genre", "Doc"));
        assert_ne!(a, TagSelector::new(1, "Genre", "doc"));
    }

    #[test]
    fn test_prefix_is_positional() {
        let short = chain(&[(1, "Doc")]);
        let long = chain(&[(1, "Doc"), (2, "PDF")]);
        let reordered = chain(&[(2, "PDF"), (1, "Doc")]);

        assert!(short.is_strict_prefix_of(&long));
        assert!(!short.is_strict_prefix_of(&reordered));
        assert!(!long.is_strict_prefix_of(&short));
        assert!(!long.is_strict_prefix_of(&long));
        assert!(long.same_as(&long.clone()));
    }

    #[test]
    fn test_relation() {
        let a = chain(&[(1, "Doc"), (2, "PDF")]);
        assert_eq!(relation(&a, &chain(&[(1, "Doc"), (2, "PDF")])), ChainRelation::Identical);
        assert_eq!(relation(&a, &chain(&[(1, "Doc"), (2, "PDF"), (3, "2024")])), ChainRelation::Broader);
        assert_eq!(relation(&a, &chain(&[(1, "Doc")])), ChainRelation::Narrower);
        assert_eq!(relation(&a, &chain(&[(1, "Doc"), (2, "TXT")])), ChainRelation::Unrelated);
    }

    #[test]
    fn test_rule_a_rejects_broader_candidate() {
        let existing = vec![view("b", &[(1, "Doc"), (2, "PDF"), (3, "2024"), (4, "Q1")])];
        let check = check_conflict(&chain(&[(1, "Doc"), (2, "PDF")]), &existing, None);

        let conflict = check.blocking.expect("expected a conflict");
        assert_eq!(conflict.blocking_view_id, "b");
        assert!(check.superseded.is_empty());
    }

    #[test]
    fn test_rule_b_supersedes_shorter_views() {
        let existing = vec![
            view("a", &[(1, "Doc"), (2, "PDF")]),
            view("c", &[(1, "Doc"), (2, "TXT")]),
        ];
        let check = check_conflict(
            &chain(&[(1, "Doc"), (2, "PDF"), (3, "2024"), (4, "Q1")]),
            &existing,
            None,
        );

        assert!(!check.is_blocked());
        let ids: Vec<_> = check.superseded.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn test_excluded_view_is_ignored() {
        let existing = vec![view("self", &[(1, "Doc"), (2, "PDF")])];
        let check = check_conflict(&chain(&[(1, "Doc")]), &existing, Some("self"));
        assert!(!check.is_blocked());
    }

    #[test]
    fn test_identical_chains_coexist() {
        let existing = vec![view("twin", &[(1, "Doc")])];
        let check = check_conflict(&chain(&[(1, "Doc")]), &existing, None);
        assert!(!check.is_blocked());
        assert!(check.superseded.is_empty());
    }

    #[test]
    fn test_validate() {
        assert!(matches!(TagChain::default().validate(), Err(ChainError::Empty)));
        assert!(matches!(
            chain(&[(1, "Doc"), (1, "PDF")]).validate(),
            Err(ChainError::DuplicateDimension(_))
        ));
        assert!(matches!(
            chain(&[(1, "a/b")]).validate(),
            Err(ChainError::InvalidTagValue(_, _))
        ));
        assert!(matches!(
            chain(&[(1, "..")]).validate(),
            Err(ChainError::InvalidTagValue(_, _))
        ));
        assert!(chain(&[(1, "Doc"), (2, "PDF")]).validate().is_ok());
    }

    #[test]
    fn test_display() {
        let c = TagChain::new(vec![
            TagSelector::new(1, "Genre", "Doc"),
            TagSelector::new(2, "Format", "PDF"),
        ]);
        assert_eq!(c.to_string(), "[Genre=Doc > Format=PDF]");
    }

    fn arb_chain() -> impl Strategy<Value = TagChain> {
        prop::collection::vec((0i64..4, "[a-c]"), 0..5)
            .prop_map(|pairs| TagChain::new(pairs.into_iter().map(|(d, v)| sel(d, &v)).collect()))
    }

    proptest! {
        #[test]
        fn prop_relation_is_antisymmetric(a in arb_chain(), b in arb_chain()) {
            let forward = relation(&a, &b);
            let backward = relation(&b, &a);
            let expected = match forward {
                ChainRelation::Identical => ChainRelation::Identical,
                ChainRelation::Broader => ChainRelation::Narrower,
                ChainRelation::Narrower => ChainRelation::Broader,
                ChainRelation::Unrelated => ChainRelation::Unrelated,
            };
            prop_assert_eq!(backward, expected);
        }

        #[test]
        fn prop_every_prefix_is_a_prefix(c in arb_chain()) {
            for level in 0..=c.len() {
                let p = TagChain::new(c.prefix(level).to_vec());
                prop_assert!(p.is_prefix_of(&c));
                prop_assert_eq!(p.is_strict_prefix_of(&c), level < c.len());
            }
        }
    }
}
