//! # Bindings
//!
//! A binding is one implementation of a contract. It owns the local
//! implementation (when this process has one), its routing labels, and the
//! round-robin state used to pick among equivalent remote targets.
//!
//! ## Execution
//!
//! 1. The balancer produces the eligible targets.
//! 2. Multicast calls go to all of them.
//! 3. Otherwise the caller's own worker is preferred when this process hosts
//!    the implementation, and the remaining targets are rotated round-robin.
//! 4. Each target is served locally (own worker) or over a transport.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::balancer::RoundRobin;
use crate::callable::Callable;
use crate::callable::ExecutionContext;
use crate::context::InvocationContext;
use crate::contract::ContractKind;
use crate::error::Error;
use crate::error::Result;
use crate::executor::Executor;
use crate::executor::GenericRemoteExecutor;
use crate::executor::LocalExecutor;
use crate::executor::Multicast;
use crate::executor::RemoteExecutor;
use crate::executor::single;
use crate::id::BindingId;
use crate::id::ContractId;
use crate::locator::Hosting;
use crate::router::BindingMeta;
use crate::runtime::Services;
use crate::serializer::JSON;
use crate::signature::MethodSignature;
use crate::target::Target;

/// An implementation this process can run.
#[derive(Clone)]
pub struct LocalImplementation {
    pub callable: Arc<dyn Callable>,
    pub context: Arc<ExecutionContext>,
    pub hosting: Hosting,
}

#[derive(Default)]
struct Labels {
    aliases: BTreeSet<String>,
    tags: BTreeSet<String>,
    degrades_to: Option<String>,
}

pub struct Binding {
    id: BindingId,
    kind: ContractKind,
    signature: MethodSignature,
    implementation: Option<LocalImplementation>,
    labels: RwLock<Labels>,
    round_robin: RoundRobin,
    services: Arc<Services>,
}

impl Binding {
    pub(crate) fn new(
        id: BindingId,
        kind: ContractKind,
        signature: MethodSignature,
        implementation: Option<LocalImplementation>,
        services: Arc<Services>,
    ) -> Self {
        Self {
            id,
            kind,
            signature,
            implementation,
            labels: RwLock::new(Labels::default()),
            round_robin: RoundRobin::new(),
            services,
        }
    }

    pub fn id(&self) -> &BindingId {
        &self.id
    }

    /// The contract this binding belongs to.
    pub fn contract(&self) -> &ContractId {
        self.id.contract()
    }

    pub fn kind(&self) -> ContractKind {
        self.kind
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    pub fn implementation(&self) -> Option<&LocalImplementation> {
        self.implementation.as_ref()
    }

    pub fn hosting(&self) -> Hosting {
        self.implementation
            .as_ref()
            .map(|i| i.hosting)
            .unwrap_or(Hosting::Remote)
    }

    pub fn aliases(&self) -> BTreeSet<String> {
        self.labels.read().aliases.clone()
    }

    pub fn tags(&self) -> BTreeSet<String> {
        self.labels.read().tags.clone()
    }

    /// Implementation id of the fallback binding, if any.
    pub fn degrades_to(&self) -> Option<String> {
        self.labels.read().degrades_to.clone()
    }

    pub fn add_alias(&self, alias: &str) {
        self.labels.write().aliases.insert(alias.to_string());
    }

    pub fn add_tag(&self, tag: &str) {
        self.labels.write().tags.insert(tag.to_string());
    }

    pub fn set_degrades_to(&self, implementation: Option<String>) {
        self.labels.write().degrades_to = implementation;
    }

    pub fn meta(&self) -> BindingMeta {
        let labels = self.labels.read();
        BindingMeta {
            id: self.id.clone(),
            aliases: labels.aliases.clone(),
            tags: labels.tags.clone(),
            degrades_to: labels.degrades_to.clone(),
        }
    }

    fn is_generic(&self, ctx: &InvocationContext) -> bool {
        ctx.is_generic() || self.kind == ContractKind::Generic
    }

    pub async fn execute(&self, ctx: &InvocationContext, args: &[Value]) -> Result<Value> {
        let targets = self.services.balancer().balance(&self.id, ctx, args).await?;
        let dispatch = TargetDispatch { binding: self };

        if ctx.is_multicast() {
            return Multicast::new(dispatch).execute(&targets, ctx, args).await;
        }

        let (own, others): (Vec<Target>, Vec<Target>) = targets
            .into_iter()
            .partition(|t| !ctx.caller().is_empty() && t.worker_id == ctx.caller());
        if self.implementation.is_some() && !own.is_empty() {
            return dispatch.execute(&own[..1], ctx, args).await;
        }

        let Some(target) = self.round_robin.pick(&others) else {
            return Err(Error::TargetNotFound {
                binding: self.id.clone(),
            });
        };
        dispatch.execute(std::slice::from_ref(&target), ctx, args).await
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("hosting", &self.hosting())
            .finish_non_exhaustive()
    }
}

/// Serves one target: in-process for the caller's own worker, otherwise
/// over a transport.
struct TargetDispatch<'a> {
    binding: &'a Binding,
}

#[async_trait::async_trait]
impl<'a> Executor<Target> for TargetDispatch<'a> {
    async fn execute(&self, candidates: &[Target], ctx: &InvocationContext, args: &[Value]) -> Result<Value> {
        let binding = self.binding;
        let target = single(candidates, "target")?;
        let generic = binding.is_generic(ctx);
        let services = binding.services.as_ref();

        let local = binding.implementation.is_some() && !ctx.caller().is_empty() && target.worker_id == ctx.caller();
        if local {
            let args = if generic {
                args.to_vec()
            } else {
                services.serializers().round_trip(JSON, args.to_vec())?
            };
            debug!(binding = %binding.id, generic, "dispatching in-process");
            return LocalExecutor::new(binding).execute(candidates, ctx, &args).await;
        }

        if generic {
            GenericRemoteExecutor::new(binding, services).execute(candidates, ctx, args).await
        } else {
            RemoteExecutor::new(binding, services).execute(candidates, ctx, args).await
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::callable::from_fn;
    use crate::config::BrokerConfig;
    use crate::registry::Registration;
    use crate::runtime::Runtime;
    use crate::serializer::Serializer;
    use crate::target::WorkerIdentity;
    use crate::testing;

    /// JSON that upper-cases every string it decodes.
    struct Shouting;

    impl Serializer for Shouting {
        fn format(&self) -> &str {
            JSON
        }

        fn encode(&self, value: &Value) -> Result<Vec<u8>> {
            Ok(serde_json::to_vec(value)?)
        }

        fn decode(&self, bytes: &[u8]) -> Result<Value> {
            fn shout(value: Value) -> Value {
                match value {
                    Value::String(s) => Value::String(s.to_uppercase()),
                    Value::Array(items) => Value::Array(items.into_iter().map(shout).collect()),
                    other => other,
                }
            }
            Ok(shout(serde_json::from_slice(bytes)?))
        }
    }

    fn echo_binding() -> (Arc<Runtime>, Arc<Binding>) {
        let rt = Runtime::builder(BrokerConfig::for_worker(WorkerIdentity::new(testing::WORKER)))
            .serializer(Arc::new(Shouting))
            .build()
            .unwrap();
        let binding = rt
            .register(
                Registration::builder(testing::contract_id(), "echo", "1")
                    .signature(MethodSignature::untyped("echo", 1))
                    .callable(from_fn(|_ctx, args| Ok(args[0].clone())))
                    .in_process()
                    .build(),
            )
            .unwrap();
        (rt, binding)
    }

    #[tokio::test]
    async fn test_typed_local_call_round_trips_arguments() {
        let (rt, binding) = echo_binding();
        let out = binding.execute(&rt.context().build(), &[json!("ada")]).await.unwrap();
        assert_eq!(out, json!("ADA"));
    }

    #[tokio::test]
    async fn test_generic_local_call_passes_arguments_through() {
        let (rt, binding) = echo_binding();
        let ctx = rt.context().generic(true).build();
        let out = binding.execute(&ctx, &[json!("ada")]).await.unwrap();
        assert_eq!(out, json!("ada"));
    }
}
