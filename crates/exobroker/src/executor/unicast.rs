use std::sync::Arc;

use serde_json::Value;

use super::Candidate;
use super::Executor;
use crate::binding::Binding;
use crate::context::InvocationContext;
use crate::error::Error;
use crate::error::Result;

/// The one candidate of a unicast step, or an arity error.
pub fn single<'a, C>(candidates: &'a [C], candidate: &'static str) -> Result<&'a C> {
    match candidates {
        [only] => Ok(only),
        _ => Err(Error::Arity {
            candidate,
            found: candidates.len(),
        }),
    }
}

/// Runs the single routed binding through its own executor chain.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unicast;

#[async_trait::async_trait]
impl Executor<Arc<Binding>> for Unicast {
    async fn execute(&self, candidates: &[Arc<Binding>], ctx: &InvocationContext, args: &[Value]) -> Result<Value> {
        let binding = single(candidates, "binding")?;
        tracing::trace!(binding = %binding.label(), "unicast");
        binding.execute(ctx, args).await
    }
}
