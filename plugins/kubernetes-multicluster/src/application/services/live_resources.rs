//! Listing the objects of one application in one cluster.

use anyhow::{Context, Result};

use crate::application::ports::{Cluster, Kubectl, Scope};
use crate::domain::labels::application_selector;
use crate::domain::manifest::Manifest;

/// Live objects carrying the application label, split by scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveResources {
    pub namespaced: Vec<Manifest>,
    pub cluster_scoped: Vec<Manifest>,
}

impl LiveResources {
    #[must_use]
    pub fn len(&self) -> usize {
        self.namespaced.len() + self.cluster_scoped.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Namespaced objects first, then cluster-scoped ones.
    pub fn iter(&self) -> impl Iterator<Item = &Manifest> {
        self.namespaced.iter().chain(&self.cluster_scoped)
    }
}

/// Every listable object managed by piped for `app_id`, across all
/// namespaces and the cluster scope.
pub async fn get_live_resources(
    kubectl: &impl Kubectl,
    cluster: &Cluster,
    app_id: &str,
) -> Result<LiveResources> {
    let selector = application_selector(app_id);

    let namespaced_kinds = kubectl
        .api_resources(cluster, true)
        .await
        .context("listing namespaced api resources")?;
    let namespaced = kubectl
        .get_all(cluster, Scope::AllNamespaces, &namespaced_kinds, &selector)
        .await
        .context("listing namespaced live resources")?;

    let cluster_kinds = kubectl
        .api_resources(cluster, false)
        .await
        .context("listing cluster-scoped api resources")?;
    let cluster_scoped = kubectl
        .get_all(cluster, Scope::ClusterScoped, &cluster_kinds, &selector)
        .await
        .context("listing cluster-scoped live resources")?;

    Ok(LiveResources {
        namespaced,
        cluster_scoped,
    })
}
