//! # Broker Runtime
//!
//! Central handle for the application lifecycle. Owns the shared services
//! every binding needs (transports, serializers, error table, locator and
//! balancer), the composite registry, and the lifecycle event bus.
//!
//! The same runtime answers both directions: `execute` through contracts for
//! outgoing calls, and [`Runtime::serve`] for requests arriving from a
//! transport.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use tracing::warn;

use crate::balancer::Balancer;
use crate::binding::Binding;
use crate::config::BrokerConfig;
use crate::context::InvocationContext;
use crate::context::InvocationContextBuilder;
use crate::contract::Contract;
use crate::error::Error;
use crate::error::Result;
use crate::error_table::ErrorTable;
use crate::error_table::code_for;
use crate::executor::LocalExecutor;
use crate::id::BindingId;
use crate::id::ContractId;
use crate::lifecycle::Lifecycle;
use crate::lifecycle::LifecycleEvent;
use crate::lifecycle::LifecycleListener;
use crate::locator::ClusterRegistry;
use crate::locator::LocalCatalog;
use crate::locator::Locator;
use crate::locator::MembershipProvider;
use crate::registry::CompositeRegistry;
use crate::registry::ROOT;
use crate::registry::Registration;
use crate::registry::Registry;
use crate::serializer::FirstSupported;
use crate::serializer::FormatSelector;
use crate::serializer::Serializer;
use crate::serializer::SerializerSet;
use crate::target::WorkerIdentity;
use crate::transport::Request;
use crate::transport::Response;
use crate::transport::TransportClient;

/// Process-wide collaborators shared by every binding.
pub struct Services {
    worker: WorkerIdentity,
    transports: Vec<Arc<dyn TransportClient>>,
    serializers: SerializerSet,
    format_selector: Arc<dyn FormatSelector>,
    error_table: Arc<ErrorTable>,
    balancer: Balancer,
}

impl Services {
    pub fn worker(&self) -> &WorkerIdentity {
        &self.worker
    }

    /// First registered client that speaks `protocol`.
    pub fn transport_for(&self, protocol: &str) -> Option<Arc<dyn TransportClient>> {
        self.transports
            .iter()
            .find(|t| t.protocols().iter().any(|p| p == protocol))
            .cloned()
    }

    pub fn serializers(&self) -> &SerializerSet {
        &self.serializers
    }

    pub fn format_selector(&self) -> &dyn FormatSelector {
        self.format_selector.as_ref()
    }

    pub fn error_table(&self) -> &Arc<ErrorTable> {
        &self.error_table
    }

    pub fn balancer(&self) -> &Balancer {
        &self.balancer
    }

    pub fn locator(&self) -> &Arc<Locator> {
        self.balancer.locator()
    }

    pub fn catalog(&self) -> &Arc<LocalCatalog> {
        self.locator().catalog()
    }
}

/// Fluent builder for a `Runtime`.
pub struct RuntimeBuilder {
    config: BrokerConfig,
    transports: Vec<Arc<dyn TransportClient>>,
    serializers: SerializerSet,
    format_selector: Arc<dyn FormatSelector>,
    cluster: Option<Arc<dyn ClusterRegistry>>,
    membership: Option<Arc<dyn MembershipProvider>>,
    listeners: Vec<Arc<dyn LifecycleListener>>,
}

impl RuntimeBuilder {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            transports: Vec::new(),
            serializers: SerializerSet::new(),
            format_selector: Arc::new(FirstSupported),
            cluster: None,
            membership: None,
            listeners: Vec::new(),
        }
    }

    pub fn transport(mut self, transport: Arc<dyn TransportClient>) -> Self {
        self.transports.push(transport);
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializers.insert(serializer);
        self
    }

    pub fn format_selector(mut self, selector: Arc<dyn FormatSelector>) -> Self {
        self.format_selector = selector;
        self
    }

    pub fn cluster(mut self, cluster: Arc<dyn ClusterRegistry>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn membership(mut self, membership: Arc<dyn MembershipProvider>) -> Self {
        self.membership = Some(membership);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn LifecycleListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn build(self) -> Result<Arc<Runtime>> {
        self.config.validate()?;

        let catalog = Arc::new(LocalCatalog::new());
        let mut locator = Locator::new(self.config.worker.clone(), self.serializers.formats(), catalog)
            .with_static_services(self.config.static_services.clone());
        if let Some(cluster) = self.cluster {
            locator = locator.with_cluster(cluster);
        }
        if let Some(membership) = self.membership {
            locator = locator.with_membership(membership);
        }

        let protocols: BTreeSet<String> = self.transports.iter().flat_map(|t| t.protocols()).collect();
        let balancer = Balancer::new(Arc::new(locator), protocols, self.serializers.clone());

        let error_table = Arc::new(ErrorTable::new());
        let lifecycle = Lifecycle::new();
        lifecycle.subscribe(error_table.clone());
        for listener in self.listeners {
            lifecycle.subscribe(listener);
        }

        let services = Arc::new(Services {
            worker: self.config.worker.clone(),
            transports: self.transports,
            serializers: self.serializers,
            format_selector: self.format_selector,
            error_table,
            balancer,
        });
        let root = Arc::new(Registry::new(ROOT, services.clone()));

        Ok(Arc::new(Runtime {
            config: self.config,
            services,
            registry: CompositeRegistry::new(root),
            lifecycle,
        }))
    }
}

pub struct Runtime {
    config: BrokerConfig,
    services: Arc<Services>,
    registry: CompositeRegistry,
    lifecycle: Lifecycle,
}

impl Runtime {
    pub fn builder(config: BrokerConfig) -> RuntimeBuilder {
        RuntimeBuilder::new(config)
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn worker(&self) -> &WorkerIdentity {
        self.services.worker()
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn registry(&self) -> &CompositeRegistry {
        &self.registry
    }

    pub fn error_table(&self) -> &Arc<ErrorTable> {
        self.services.error_table()
    }

    pub fn subscribe(&self, listener: Arc<dyn LifecycleListener>) {
        self.lifecycle.subscribe(listener);
    }

    /// Publishes the host's own error codes and announces the runtime.
    pub fn start(&self) {
        self.error_table()
            .contribute(ROOT, self.registry.root().error_codes());
        self.lifecycle.emit(LifecycleEvent::RuntimeStarted);
        info!(worker = %self.worker().id, environment = %self.worker().environment, "runtime started");
    }

    /// Context builder prefilled with this worker and the configured defaults.
    pub fn context(&self) -> InvocationContextBuilder {
        InvocationContext::builder()
            .caller(self.worker().id.clone())
            .timeout(self.config.defaults.timeout())
            .retries(self.config.defaults.retries)
            .environment_priority(self.config.environment_priority.clone())
    }

    /// Registers a binding with the host's root registry.
    pub fn register(&self, registration: Registration) -> Result<Arc<Binding>> {
        self.registry.root().register(registration)
    }

    /// A fresh, uninstalled plugin registry.
    pub fn create_registry(&self, name: impl Into<String>) -> Arc<Registry> {
        Arc::new(Registry::new(name, self.services.clone()))
    }

    pub fn install(&self, registry: Arc<Registry>) -> Result<()> {
        let name = registry.name().to_string();
        let replaced = self.registry.install(registry.clone())?;
        if replaced.is_some() {
            self.lifecycle.emit(LifecycleEvent::PluginStopped(name.clone()));
        }
        self.error_table().contribute(name.clone(), registry.error_codes());
        self.lifecycle.emit(LifecycleEvent::PluginStarted(name));
        Ok(())
    }

    pub fn uninstall(&self, name: &str) -> bool {
        if self.registry.uninstall(name).is_none() {
            return false;
        }
        self.lifecycle.emit(LifecycleEvent::PluginStopped(name.to_string()));
        true
    }

    pub fn contract(&self, id: &ContractId) -> Result<Arc<Contract>> {
        self.registry
            .contract(id)?
            .ok_or_else(|| Error::ContractNotFound(id.clone()))
    }

    pub fn binding(&self, id: &BindingId) -> Result<Arc<Binding>> {
        self.registry
            .binding(id)?
            .ok_or_else(|| Error::BindingNotFound(id.clone()))
    }

    pub fn contracts(&self) -> BTreeSet<ContractId> {
        self.registry.contract_ids()
    }

    /// Looks up a contract and executes it.
    pub async fn execute(&self, contract: &ContractId, ctx: &InvocationContext, args: &[Value]) -> Result<Value> {
        self.contract(contract)?.execute(ctx, args).await
    }

    /// Answers a request that arrived over a transport by running the named
    /// implementation in-process. Failures become non-OK responses.
    pub async fn serve(&self, request: Request) -> Response {
        let binding = BindingId::new(
            request.metadata.contract.clone(),
            request.metadata.implementation.clone(),
            request.metadata.implementation_version.clone(),
        );
        match self.serve_binding(&binding, request).await {
            Ok(response) => response,
            Err(e) => {
                let code = code_for(&e);
                warn!(binding = %binding, code, error = %e, "serving request failed");
                Response::failure(code, e.to_string())
            }
        }
    }

    async fn serve_binding(&self, id: &BindingId, request: Request) -> Result<Response> {
        let binding = self.binding(id)?;
        let serializer = self.services.serializers().get(&request.metadata.format)?;
        let args = match serializer.decode(&request.payload)? {
            Value::Array(args) => args,
            other => {
                return Err(Error::Codec(format!("expected an argument array, got {other}")));
            }
        };

        let value = LocalExecutor::new(&binding).invoke(args).await?;
        Ok(Response::ok(serializer.encode(&value)?))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::callable::from_fn;
    use crate::error::FailureKind;
    use crate::error_table::codes;
    use crate::serializer::JSON;
    use crate::signature::MethodSignature;
    use crate::signature::TypeDescriptor;
    use crate::testing;
    use crate::transport::Address;
    use crate::transport::CommunicationMode;
    use crate::transport::RequestContext;
    use crate::transport::RequestMetadata;

    fn request(implementation: &str, args: Value) -> Request {
        Request {
            protocol: "test".into(),
            address: Address {
                host: "localhost".into(),
                port: 1,
            },
            metadata: RequestMetadata {
                contract: testing::contract_id(),
                implementation: implementation.into(),
                implementation_version: "1".into(),
                format: JSON.into(),
                tags: BTreeMap::new(),
            },
            arg_types: vec![],
            return_type: TypeDescriptor::Any,
            payload: serde_json::to_vec(&args).unwrap(),
            context: RequestContext {
                timeout: std::time::Duration::from_secs(1),
                mode: CommunicationMode::Unicast,
                extensions: BTreeMap::new(),
            },
        }
    }

    fn register_greeter(rt: &Runtime) {
        let registration = Registration::builder(testing::contract_id(), "greet", "1")
            .signature(MethodSignature::new(
                "greet",
                vec![TypeDescriptor::String],
                TypeDescriptor::String,
            ))
            .callable(from_fn(|_ctx, args| match args[0].as_str() {
                Some("") => Err(Error::raised(FailureKind::Degradable, Some(codes::UNAVAILABLE), "empty name")),
                Some(name) => Ok(json!(format!("hello {name}"))),
                None => Err(Error::fatal("not a string")),
            }))
            .in_process()
            .build();
        rt.register(registration).unwrap();
    }

    #[tokio::test]
    async fn test_serve_runs_local_implementation() {
        let rt = testing::runtime();
        register_greeter(&rt);

        let response = rt.serve(request("greet", json!(["ada"]))).await;
        assert!(response.is_ok());
        let value: Value = serde_json::from_slice(&response.payload).unwrap();
        assert_eq!(value, json!("hello ada"));
    }

    #[tokio::test]
    async fn test_serve_maps_failures_to_codes() {
        let rt = testing::runtime();
        register_greeter(&rt);

        let response = rt.serve(request("missing", json!([]))).await;
        assert_eq!(response.metadata.code, codes::NOT_FOUND);

        let response = rt.serve(request("greet", json!([1]))).await;
        assert_eq!(response.metadata.code, codes::BAD_REQUEST);

        let response = rt.serve(request("greet", json!([""]))).await;
        assert_eq!(response.metadata.code, codes::UNAVAILABLE);
        assert!(response.metadata.message.contains("empty name"));

        let response = rt.serve(request("greet", json!({"not": "an array"}))).await;
        assert_eq!(response.metadata.code, codes::BAD_REQUEST);
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<LifecycleEvent>>);

    impl LifecycleListener for Recorder {
        fn on_event(&self, event: &LifecycleEvent) {
            self.0.lock().push(event.clone());
        }
    }

    #[test]
    fn test_lifecycle_events_follow_installs() {
        let rt = testing::runtime();
        let recorder = Arc::new(Recorder::default());
        rt.subscribe(recorder.clone());

        rt.start();
        rt.install(rt.create_registry("p")).unwrap();
        rt.install(rt.create_registry("p")).unwrap();
        rt.uninstall("p");

        assert_eq!(
            *recorder.0.lock(),
            [
                LifecycleEvent::RuntimeStarted,
                LifecycleEvent::PluginStarted("p".into()),
                LifecycleEvent::PluginStopped("p".into()),
                LifecycleEvent::PluginStarted("p".into()),
                LifecycleEvent::PluginStopped("p".into()),
            ]
        );
    }

    #[test]
    fn test_plugin_error_codes_follow_the_plugin() {
        let rt = testing::runtime();
        let plugin = rt.create_registry("billing");
        plugin
            .load_error_codes(r#"{"460": {"name": "QuotaExceeded", "kind": "retryable"}}"#)
            .unwrap();

        rt.install(plugin).unwrap();
        assert_eq!(rt.error_table().class_of(460).unwrap().kind, FailureKind::Retryable);

        rt.uninstall("billing");
        assert!(rt.error_table().class_of(460).is_none());
    }

    #[test]
    fn test_context_is_prefilled_from_config() {
        let mut config = BrokerConfig::for_worker(WorkerIdentity::new("w7"));
        config.defaults.retries = 2;
        config.environment_priority = vec!["prod".into()];
        let rt = Runtime::builder(config).build().unwrap();

        let ctx = rt.context().build();
        assert_eq!(ctx.caller(), "w7");
        assert_eq!(ctx.retries(), 2);
        assert_eq!(ctx.environment_priority(), ["prod"]);
    }

    #[test]
    fn test_unknown_contract() {
        let rt = testing::runtime();
        let err = rt.contract(&testing::contract_id()).unwrap_err();
        assert!(matches!(err, Error::ContractNotFound(_)));
    }
}
