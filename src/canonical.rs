//! # Canonicalization
//!
//! Produces a deterministic ordering of a `Document`'s collections so two
//! documents describing the same desired state serialize identically
//! regardless of source ordering (§8 invariant 4, the canonicalize
//! round-trip property). Mirrors `validation::normalize`'s "sort, then
//! proceed" style but operates on a whole document rather than in place on
//! a single field.

use crate::model::Document;

/// Returns a copy of `document` with hosts sorted by name, resources and
/// handlers sorted by id, and each resource's relation lists sorted
/// lexicographically. Applying this twice produces the same result as
/// applying it once.
pub fn canonicalize(document: &Document) -> Document {
    let mut doc = document.clone();

    doc.inventory.hosts.sort_by(|a, b| a.name.cmp(&b.name));
    doc.resources.sort_by(|a, b| a.id.cmp(&b.id));
    doc.handlers.sort_by(|a, b| a.id.cmp(&b.id));

    for resource in doc.resources.iter_mut().chain(doc.handlers.iter_mut()) {
        resource.depends_on.sort();
        resource.require.sort();
        resource.before.sort();
        resource.notify.sort();
        resource.subscribe.sort();
        resource.notify_handlers.sort();
        resource.tags.sort();
        resource.tags.dedup();
    }

    doc
}
