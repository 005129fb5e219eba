//! Prefix trie of resolve targets (spec §4.2, glossary).
//!
//! Only needs to answer "is this subtree of interest?" in roughly
//! O(|prefix|); a `HashSet` of ancestor-prefix strings is sufficient and
//! avoids pulling in an external trie crate for a single predicate.

use std::collections::HashSet;

use crate::uri::Resource;

/// Answers `has_at_or_beneath(prefix)` for the set of targets it was seeded with.
pub struct ResolveTargets {
    keys: HashSet<String>,
}

impl ResolveTargets {
    /// Seed with `root` and every `resolve_to` URI (spec §4.2: "initialized
    /// lazily with `resource` and all `resolveTo` URIs").
    pub fn new(root: &Resource, resolve_to: &[Resource]) -> Self {
        let mut keys = HashSet::new();
        keys.insert(root.to_string());
        for target in resolve_to {
            keys.insert(target.to_string());
        }
        Self { keys }
    }

    /// True iff any seeded target is `directory` itself or a descendant of it.
    pub fn has_entry_at_or_beneath(&self, directory: &Resource) -> bool {
        self.keys.iter().any(|key| {
            key == &directory.to_string() || key.starts_with(&format!("{}/", directory))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_always_of_interest() {
        let root: Resource = "mem:///a".parse().unwrap();
        let targets = ResolveTargets::new(&root, &[]);
        assert!(targets.has_entry_at_or_beneath(&root));
    }

    #[test]
    fn descendant_of_resolve_to_is_of_interest() {
        let root: Resource = "mem:///a".parse().unwrap();
        let extra: Resource = "mem:///a/b/c".parse().unwrap();
        let targets = ResolveTargets::new(&root, &[extra]);
        let dir: Resource = "mem:///a/b".parse().unwrap();
        assert!(targets.has_entry_at_or_beneath(&dir));
        let unrelated: Resource = "mem:///a/z".parse().unwrap();
        assert!(!targets.has_entry_at_or_beneath(&unrelated));
    }
}
