//! Forward-declaration resolution step.
//!
//! A forward declaration travels as a package-agnostic symbol *suffix*
//! because the declaring TU cannot know which package defines the entity.
//! [`ForwardDeclResolver`] is the suffix lookup built after all shard
//! content is ingested:
//!
//! - `in_documents`: suffix → the symbol's position in the merged index
//!   (a singly-indexed document slot or a multiply-indexed builder).
//! - `externals`: suffix → the set of full external symbol names sharing
//!   that suffix. Several external packages can export the same suffix;
//!   references are then emitted against every match.
//!
//! Resolution is idempotent: once a suffix has been matched to its
//! definition and the false externals for it are gone, running the same
//! resolution again changes nothing.

use std::collections::{BTreeSet, HashMap};

use crate::symbol::package_agnostic_suffix;

/// Where a suffixed symbol lives in the merged index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocTarget {
    /// `documents[document].symbols[symbol]` in the singly-indexed list.
    SinglyIndexed { document: usize, symbol: usize },
    /// A symbol inside the multiply-indexed builder for `path`.
    Builder { path: String, symbol: String },
}

/// Suffix lookup over documents and external symbols.
#[derive(Debug, Default)]
pub struct ForwardDeclResolver {
    in_documents: HashMap<String, DocTarget>,
    externals: HashMap<String, BTreeSet<String>>,
}

impl ForwardDeclResolver {
    /// Register a suffixed symbol found in a document. First registration
    /// wins; a definition is expected to exist only once.
    pub fn insert_document_symbol(&mut self, suffix: String, target: DocTarget) {
        self.in_documents.entry(suffix).or_insert(target);
    }

    /// Register an external symbol under its package-agnostic suffix.
    /// Symbols without a suffix (macros, locals) are ignored.
    pub fn insert_external(&mut self, symbol: &str) {
        if let Some(suffix) = package_agnostic_suffix(symbol) {
            self.externals.entry(suffix.to_owned()).or_default().insert(symbol.to_owned());
        }
    }

    /// The in-document home of a suffix, if any.
    #[must_use]
    pub fn lookup_in_documents(&self, suffix: &str) -> Option<&DocTarget> {
        self.in_documents.get(suffix)
    }

    /// All external symbol names sharing a suffix. `None` when there are
    /// none; the returned set is never empty.
    #[must_use]
    pub fn lookup_externals(&self, suffix: &str) -> Option<&BTreeSet<String>> {
        let found = self.externals.get(suffix)?;
        debug_assert!(!found.is_empty(), "stored an empty externals set for '{suffix}'");
        Some(found)
    }

    /// Forget the externals for a suffix (they were demoted as false
    /// externals after an in-project definition was found).
    pub fn delete_externals(&mut self, suffix: &str) {
        self.externals.remove(suffix);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn externals_group_by_suffix() {
        let mut resolver = ForwardDeclResolver::default();
        resolver.insert_external("cxx . liba 1.0$ Thing#");
        resolver.insert_external("cxx . libb 2.0$ Thing#");
        resolver.insert_external("local 3");

        let found = resolver.lookup_externals("Thing#").unwrap();
        assert_eq!(found.len(), 2);
        assert!(resolver.lookup_externals("Other#").is_none());

        resolver.delete_externals("Thing#");
        assert!(resolver.lookup_externals("Thing#").is_none());
    }

    #[test]
    fn first_document_registration_wins() {
        let mut resolver = ForwardDeclResolver::default();
        let first = DocTarget::SinglyIndexed { document: 0, symbol: 1 };
        resolver.insert_document_symbol("F#".to_owned(), first.clone());
        resolver.insert_document_symbol(
            "F#".to_owned(),
            DocTarget::Builder { path: "x.h".to_owned(), symbol: "s".to_owned() },
        );
        assert_eq!(resolver.lookup_in_documents("F#"), Some(&first));
    }
}
