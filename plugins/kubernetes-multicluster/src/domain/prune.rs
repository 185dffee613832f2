//! Selection of live resources that are no longer declared in Git.

use std::collections::BTreeSet;

use super::manifest::Manifest;
use super::resource_key::ResourceKey;

/// Keys of live resources absent from `applied`.
///
/// Namespaced resources are compared with empty namespaces read as
/// `default`, so an object whose namespace changed is removed from its old
/// namespace. Cluster-scoped resources are compared without namespace.
#[must_use]
pub fn find_remove_resources(
    applied: &[Manifest],
    namespaced_live: &[Manifest],
    cluster_scoped_live: &[Manifest],
) -> Vec<ResourceKey> {
    let applied_keys: BTreeSet<ResourceKey> =
        applied.iter().map(|m| m.key().normalize()).collect();
    let applied_unscoped: BTreeSet<ResourceKey> =
        applied.iter().map(|m| m.key().without_namespace()).collect();

    let mut remove: Vec<ResourceKey> = namespaced_live
        .iter()
        .map(Manifest::key)
        .filter(|k| !k.namespace.is_empty() && !applied_keys.contains(&k.normalize()))
        .cloned()
        .collect();
    remove.extend(
        cluster_scoped_live
            .iter()
            .map(|m| m.key().without_namespace())
            .filter(|k| !applied_unscoped.contains(k)),
    );
    remove.sort();
    remove.dedup();
    remove
}
