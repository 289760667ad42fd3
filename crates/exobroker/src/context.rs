//! Per-call configuration.
//!
//! An `InvocationContext` is built fresh by the caller for each call and is
//! not modified while the call runs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::balancer::LoadBalanceFilter;
use crate::id::BindingId;
use crate::router::RouteFilter;

/// Default timeout for the remote leg of a call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Associative combine function for multicast results.
///
/// Receives the running value (initially `Null`) and the next contribution,
/// which is `Null` for a failed target.
pub type Accumulator = Arc<dyn Fn(Value, Value) -> Value + Send + Sync>;

/// Keeps the last non-null contribution.
pub fn last_present() -> Accumulator {
    Arc::new(|acc, next| if next.is_null() { acc } else { next })
}

/// Concatenates non-null contributions into an array, flattening arrays.
pub fn concat() -> Accumulator {
    Arc::new(|acc, next| {
        let mut items = match acc {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        match next {
            Value::Null => {}
            Value::Array(more) => items.extend(more),
            other => items.push(other),
        }
        Value::Array(items)
    })
}

#[derive(Clone)]
pub struct InvocationContext {
    pub(crate) timeout: Duration,
    pub(crate) retries: u32,
    pub(crate) multicast: bool,
    pub(crate) degradation: bool,
    pub(crate) generic: bool,
    pub(crate) route_filter: Option<Arc<dyn RouteFilter>>,
    pub(crate) balance_filter: Option<Arc<dyn LoadBalanceFilter>>,
    pub(crate) accumulator: Option<Accumulator>,
    pub(crate) caller: String,
    pub(crate) colocate_with: Vec<BindingId>,
    pub(crate) protocols: Vec<String>,
    pub(crate) formats: Vec<String>,
    pub(crate) environment: Option<String>,
    pub(crate) environment_priority: Vec<String>,
    pub(crate) extensions: BTreeMap<String, String>,
}

impl InvocationContext {
    pub fn builder() -> InvocationContextBuilder {
        InvocationContextBuilder::default()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn is_multicast(&self) -> bool {
        self.multicast
    }

    pub fn is_degradation_enabled(&self) -> bool {
        self.degradation
    }

    /// Generic calls pass arguments in canonical form and skip the
    /// normalizing round-trip on the local path.
    pub fn is_generic(&self) -> bool {
        self.generic
    }

    /// Worker id of the process issuing the call.
    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn colocate_with(&self) -> &[BindingId] {
        &self.colocate_with
    }

    pub fn protocols(&self) -> &[String] {
        &self.protocols
    }

    pub fn formats(&self) -> &[String] {
        &self.formats
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    pub fn environment_priority(&self) -> &[String] {
        &self.environment_priority
    }

    /// Free-form tag values; handed to route filters and sent in request metadata.
    pub fn extensions(&self) -> &BTreeMap<String, String> {
        &self.extensions
    }

    pub fn accumulator(&self) -> Accumulator {
        self.accumulator.clone().unwrap_or_else(last_present)
    }
}

impl Default for InvocationContext {
    fn default() -> Self {
        InvocationContextBuilder::default().build()
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("multicast", &self.multicast)
            .field("degradation", &self.degradation)
            .field("generic", &self.generic)
            .field("caller", &self.caller)
            .field("colocate_with", &self.colocate_with)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

/// Fluent builder for `InvocationContext`.
pub struct InvocationContextBuilder {
    ctx: InvocationContext,
}

impl Default for InvocationContextBuilder {
    fn default() -> Self {
        Self {
            ctx: InvocationContext {
                timeout: DEFAULT_TIMEOUT,
                retries: 0,
                multicast: false,
                degradation: false,
                generic: false,
                route_filter: None,
                balance_filter: None,
                accumulator: None,
                caller: String::new(),
                colocate_with: Vec::new(),
                protocols: Vec::new(),
                formats: Vec::new(),
                environment: None,
                environment_priority: Vec::new(),
                extensions: BTreeMap::new(),
            },
        }
    }
}

impl InvocationContextBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.ctx.timeout = timeout;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.ctx.retries = retries;
        self
    }

    pub fn multicast(mut self, multicast: bool) -> Self {
        self.ctx.multicast = multicast;
        self
    }

    pub fn degradation(mut self, enabled: bool) -> Self {
        self.ctx.degradation = enabled;
        self
    }

    pub fn generic(mut self, generic: bool) -> Self {
        self.ctx.generic = generic;
        self
    }

    pub fn route_filter(mut self, filter: Arc<dyn RouteFilter>) -> Self {
        self.ctx.route_filter = Some(filter);
        self
    }

    pub fn balance_filter(mut self, filter: Arc<dyn LoadBalanceFilter>) -> Self {
        self.ctx.balance_filter = Some(filter);
        self
    }

    pub fn accumulator(mut self, accumulator: Accumulator) -> Self {
        self.ctx.accumulator = Some(accumulator);
        self
    }

    pub fn caller(mut self, worker_id: impl Into<String>) -> Self {
        self.ctx.caller = worker_id.into();
        self
    }

    pub fn colocate_with(mut self, binding: BindingId) -> Self {
        self.ctx.colocate_with.push(binding);
        self
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.ctx.protocols.push(protocol.into());
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.ctx.formats.push(format.into());
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.ctx.environment = Some(environment.into());
        self
    }

    pub fn environment_priority<I, S>(mut self, priority: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ctx.environment_priority = priority.into_iter().map(Into::into).collect();
        self
    }

    pub fn extension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.extensions.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> InvocationContext {
        self.ctx
    }
}
