//! # Locator
//!
//! Resolves a binding to the physical targets that can serve it.
//!
//! ## Resolution order
//!
//! 1. In-process (micro) implementations resolve to the local target only.
//! 2. Registry-exempt services from configuration come from the membership
//!    provider, decorated with the configured formats.
//! 3. The cluster registry, if it knows any target.
//! 4. Plugin-hosted implementations resolve to the local target; otherwise
//!    nothing.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;
use tracing::warn;

use crate::config::StaticService;
use crate::error::Result;
use crate::id::BindingId;
use crate::target::Endpoint;
use crate::target::Target;
use crate::target::WorkerIdentity;

/// How an implementation is hosted in this process.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Hosting {
    /// Registered as an in-process service; never goes over the network
    /// when called from here.
    InProcess,
    /// Bound eagerly by a plugin; used locally only when no remote target exists.
    #[default]
    Plugin,
    /// Declared here, implemented elsewhere.
    Remote,
}

/// Which bindings this process hosts, and from which registry.
#[derive(Default)]
pub struct LocalCatalog {
    entries: DashMap<BindingId, BTreeMap<String, Hosting>>,
}

impl LocalCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(&self, binding: BindingId, source: &str, hosting: Hosting) {
        if hosting == Hosting::Remote {
            return;
        }
        self.entries
            .entry(binding)
            .or_default()
            .insert(source.to_string(), hosting);
    }

    /// Forgets everything a registry contributed.
    pub fn release(&self, source: &str) {
        self.entries.retain(|_, sources| {
            sources.remove(source);
            !sources.is_empty()
        });
    }

    /// The strongest hosting mode recorded for `binding`.
    pub fn hosting(&self, binding: &BindingId) -> Option<Hosting> {
        let sources = self.entries.get(binding)?;
        if sources.values().any(|h| *h == Hosting::InProcess) {
            Some(Hosting::InProcess)
        } else {
            sources.values().next().copied()
        }
    }
}

/// Cluster-wide service registry client.
#[async_trait::async_trait]
pub trait ClusterRegistry: Send + Sync + 'static {
    async fn lookup(&self, binding: &BindingId) -> Result<Vec<Target>>;

    /// Endpoints the cluster has on record for a worker.
    async fn local_endpoints(&self, worker_id: &str) -> Result<Vec<Endpoint>>;
}

/// Cluster membership, used for registry-exempt services.
#[async_trait::async_trait]
pub trait MembershipProvider: Send + Sync + 'static {
    async fn members(&self, service: &str) -> Result<Vec<Target>>;
}

pub struct Locator {
    worker: WorkerIdentity,
    formats: Vec<String>,
    catalog: Arc<LocalCatalog>,
    static_services: Vec<StaticService>,
    membership: Option<Arc<dyn MembershipProvider>>,
    cluster: Option<Arc<dyn ClusterRegistry>>,
}

impl Locator {
    pub fn new(worker: WorkerIdentity, formats: Vec<String>, catalog: Arc<LocalCatalog>) -> Self {
        Self {
            worker,
            formats,
            catalog,
            static_services: Vec::new(),
            membership: None,
            cluster: None,
        }
    }

    pub fn with_static_services(mut self, services: Vec<StaticService>) -> Self {
        self.static_services = services;
        self
    }

    pub fn with_membership(mut self, membership: Arc<dyn MembershipProvider>) -> Self {
        self.membership = Some(membership);
        self
    }

    pub fn with_cluster(mut self, cluster: Arc<dyn ClusterRegistry>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn worker(&self) -> &WorkerIdentity {
        &self.worker
    }

    pub fn catalog(&self) -> &Arc<LocalCatalog> {
        &self.catalog
    }

    pub async fn lookup(&self, binding: &BindingId) -> Result<Vec<Target>> {
        let hosting = self.catalog.hosting(binding);
        if hosting == Some(Hosting::InProcess) {
            debug!(binding = %binding, "resolved in-process");
            return Ok(vec![self.local().await]);
        }

        if let Some(entry) = self.static_services.iter().find(|s| s.matches(binding)) {
            let Some(membership) = &self.membership else {
                warn!(binding = %binding, service = %entry.service, "static service configured without a membership provider");
                return Ok(Vec::new());
            };
            let mut targets = membership.members(&entry.service).await?;
            for target in &mut targets {
                target.formats = entry.formats.clone();
            }
            debug!(binding = %binding, service = %entry.service, targets = targets.len(), "resolved from static configuration");
            return Ok(targets);
        }

        if let Some(cluster) = &self.cluster {
            match cluster.lookup(binding).await {
                Ok(targets) if !targets.is_empty() => {
                    debug!(binding = %binding, targets = targets.len(), "resolved from cluster registry");
                    return Ok(targets);
                }
                Ok(_) => {}
                Err(e) => warn!(binding = %binding, error = %e, "cluster registry lookup failed"),
            }
        }

        if hosting == Some(Hosting::Plugin) {
            debug!(binding = %binding, "falling back to plugin-hosted implementation");
            return Ok(vec![self.local().await]);
        }

        Ok(Vec::new())
    }

    /// Describes the current process as a target.
    pub async fn local(&self) -> Target {
        let mut endpoints = self.worker.endpoints.clone();
        if let Some(cluster) = &self.cluster {
            match cluster.local_endpoints(&self.worker.id).await {
                Ok(found) => {
                    for endpoint in found {
                        if !endpoints.contains(&endpoint) {
                            endpoints.push(endpoint);
                        }
                    }
                }
                Err(e) => warn!(worker = %self.worker.id, error = %e, "could not fetch local endpoints"),
            }
        }

        Target {
            worker_id: self.worker.id.clone(),
            host: self.worker.host.clone(),
            environment: self.worker.environment.clone(),
            endpoints,
            formats: self.formats.clone(),
            extensions: self.worker.extensions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::error::Error;
    use crate::id::ContractId;

    fn binding(name: &str) -> BindingId {
        BindingId::new(ContractId::new("svc", "1"), name, "1")
    }

    fn worker() -> WorkerIdentity {
        WorkerIdentity::new("me").with_endpoint(Endpoint::new("grpc", "localhost", 7000))
    }

    #[derive(Default)]
    struct FakeCluster {
        targets: Mutex<Vec<Target>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl ClusterRegistry for FakeCluster {
        async fn lookup(&self, _binding: &BindingId) -> Result<Vec<Target>> {
            if self.fail {
                return Err(Error::fatal("registry down"));
            }
            Ok(self.targets.lock().clone())
        }

        async fn local_endpoints(&self, _worker_id: &str) -> Result<Vec<Endpoint>> {
            Ok(vec![Endpoint::new("http", "localhost", 8080)])
        }
    }

    struct FakeMembership;

    #[async_trait::async_trait]
    impl MembershipProvider for FakeMembership {
        async fn members(&self, service: &str) -> Result<Vec<Target>> {
            Ok(vec![Target::new(format!("{service}-1"), "10.0.0.9", "prod").with_format("ignored")])
        }
    }

    fn locator(catalog: Arc<LocalCatalog>) -> Locator {
        Locator::new(worker(), vec!["json".into()], catalog)
    }

    #[tokio::test]
    async fn test_in_process_short_circuits_cluster() {
        let catalog = Arc::new(LocalCatalog::new());
        catalog.host(binding("a"), "", Hosting::InProcess);
        let cluster = Arc::new(FakeCluster::default());
        cluster.targets.lock().push(Target::new("remote", "h", "prod"));

        let locator = locator(catalog).with_cluster(cluster);
        let targets = locator.lookup(&binding("a")).await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].worker_id, "me");
        assert_eq!(targets[0].endpoints.len(), 2);
    }

    #[tokio::test]
    async fn test_static_services_use_configured_formats() {
        let entry = StaticService {
            contract_id: "svc".into(),
            contract_version: "1".into(),
            implementation_id: None,
            implementation_version: None,
            service: "legacy".into(),
            formats: vec!["json".into(), "xml".into()],
        };
        let locator = locator(Arc::new(LocalCatalog::new()))
            .with_static_services(vec![entry])
            .with_membership(Arc::new(FakeMembership));

        let targets = locator.lookup(&binding("a")).await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].worker_id, "legacy-1");
        assert_eq!(targets[0].formats, ["json", "xml"]);
    }

    #[tokio::test]
    async fn test_cluster_then_plugin_fallback() {
        let catalog = Arc::new(LocalCatalog::new());
        catalog.host(binding("a"), "plugin-x", Hosting::Plugin);
        let cluster = Arc::new(FakeCluster::default());
        let locator = locator(catalog.clone()).with_cluster(cluster.clone());

        // cluster knows nothing: plugin-hosted binding resolves locally
        let targets = locator.lookup(&binding("a")).await.unwrap();
        assert_eq!(targets[0].worker_id, "me");

        // cluster knows a target: it wins over the plugin fallback
        cluster.targets.lock().push(Target::new("w2", "h2", "prod"));
        let targets = locator.lookup(&binding("a")).await.unwrap();
        assert_eq!(targets[0].worker_id, "w2");

        // unknown everywhere
        cluster.targets.lock().clear();
        assert!(locator.lookup(&binding("b")).await.unwrap().is_empty());

        catalog.release("plugin-x");
        assert!(locator.lookup(&binding("a")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cluster_failure_falls_through() {
        let catalog = Arc::new(LocalCatalog::new());
        catalog.host(binding("a"), "p", Hosting::Plugin);
        let cluster = Arc::new(FakeCluster {
            fail: true,
            ..Default::default()
        });
        let locator = locator(catalog).with_cluster(cluster);
        let targets = locator.lookup(&binding("a")).await.unwrap();
        assert_eq!(targets[0].worker_id, "me");
    }

    #[test]
    fn test_catalog_prefers_in_process() {
        let catalog = LocalCatalog::new();
        catalog.host(binding("a"), "p", Hosting::Plugin);
        catalog.host(binding("a"), "", Hosting::InProcess);
        catalog.host(binding("b"), "", Hosting::Remote);
        assert_eq!(catalog.hosting(&binding("a")), Some(Hosting::InProcess));
        assert_eq!(catalog.hosting(&binding("b")), None);

        catalog.release("");
        assert_eq!(catalog.hosting(&binding("a")), Some(Hosting::Plugin));
    }
}
