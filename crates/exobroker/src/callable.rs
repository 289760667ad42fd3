//! # Callables and execution contexts
//!
//! The broker never invokes anything reflectively. A plugin loader hands it an
//! opaque `Callable` together with an `ExecutionContext` describing whatever
//! isolation boundary the implementation needs (its plugin name plus typed
//! host resources). The local executor passes that context explicitly on
//! every call instead of mutating ambient thread state.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;

/// Resources scoped to the plugin that hosts an implementation.
///
/// Values are keyed by type, so a host can stash e.g. a module handle or a
/// sandbox descriptor and the implementation retrieves it with `get::<T>()`.
pub struct ExecutionContext {
    plugin: Option<String>,
    resources: anymap::Map<dyn anymap::any::Any + Send + Sync>,
}

impl ExecutionContext {
    /// Context for implementations built into the host itself.
    pub fn root() -> Self {
        Self {
            plugin: None,
            resources: anymap::Map::new(),
        }
    }

    pub fn for_plugin(plugin: impl Into<String>) -> Self {
        Self {
            plugin: Some(plugin.into()),
            resources: anymap::Map::new(),
        }
    }

    pub fn plugin(&self) -> Option<&str> {
        self.plugin.as_deref()
    }

    pub fn insert<T: Send + Sync + 'static>(&mut self, val: T) {
        self.resources.insert(val);
    }

    pub fn with<T: Send + Sync + 'static>(mut self, val: T) -> Self {
        self.insert(val);
        self
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.resources.get::<T>()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("plugin", &self.plugin)
            .field("resources", &self.resources.len())
            .finish()
    }
}

/// An in-process implementation entry point.
#[async_trait::async_trait]
pub trait Callable: Send + Sync + 'static {
    async fn call(&self, ctx: &ExecutionContext, args: Vec<Value>) -> Result<Value>;
}

/// Adapts a synchronous closure into a `Callable`.
pub struct FnCallable<F> {
    f: F,
}

#[async_trait::async_trait]
impl<F> Callable for FnCallable<F>
where
    F: Fn(&ExecutionContext, Vec<Value>) -> Result<Value> + Send + Sync + 'static,
{
    async fn call(&self, ctx: &ExecutionContext, args: Vec<Value>) -> Result<Value> {
        (self.f)(ctx, args)
    }
}

pub fn from_fn<F>(f: F) -> Arc<dyn Callable>
where
    F: Fn(&ExecutionContext, Vec<Value>) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(FnCallable { f })
}
