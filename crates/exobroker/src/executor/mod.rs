//! # Executors
//!
//! A call is carried out by a stack of executors, each taking the candidates
//! left at its level (bindings for a contract, targets for a binding) and
//! producing one value.
//!
//! Leaves do the work: [`Unicast`] hands a single binding to its own chain,
//! [`LocalExecutor`] runs an in-process implementation, and
//! [`RemoteExecutor`] / [`GenericRemoteExecutor`] go over a transport.
//! Decorators wrap another executor: [`Retry`], [`Degradation`] and
//! [`Multicast`].
//!
//! Contract-level composition, innermost first:
//!
//! ```text
//! Multicast?( Degradation?( Retry( Unicast ) ) )
//! ```

mod degradation;
mod local;
mod multicast;
mod remote;
mod retry;
mod unicast;

use std::sync::Arc;

use serde_json::Value;

use crate::binding::Binding;
use crate::context::InvocationContext;
use crate::error::Result;
use crate::target::Target;

pub use degradation::Degradation;
pub use local::LocalExecutor;
pub use multicast::Multicast;
pub use remote::GenericRemoteExecutor;
pub use remote::RemoteExecutor;
pub use retry::Retry;
pub use unicast::Unicast;
pub use unicast::single;

/// Something an executor can be handed: a binding or a target.
pub trait Candidate: Clone + Send + Sync + 'static {
    /// Short name for log lines.
    fn label(&self) -> String;
}

impl Candidate for Arc<Binding> {
    fn label(&self) -> String {
        self.id().to_string()
    }
}

impl Candidate for Target {
    fn label(&self) -> String {
        self.worker_id.clone()
    }
}

#[async_trait::async_trait]
pub trait Executor<C: Candidate>: Send + Sync {
    async fn execute(&self, candidates: &[C], ctx: &InvocationContext, args: &[Value]) -> Result<Value>;
}

#[async_trait::async_trait]
impl<C: Candidate, E: Executor<C> + ?Sized> Executor<C> for Arc<E> {
    async fn execute(&self, candidates: &[C], ctx: &InvocationContext, args: &[Value]) -> Result<Value> {
        (**self).execute(candidates, ctx, args).await
    }
}
