use futures::future::join_all;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use super::Candidate;
use super::Executor;
use crate::context::InvocationContext;
use crate::error::Error;
use crate::error::Result;

/// Fans a call out to every candidate and folds the results.
///
/// Legs run concurrently. Results are folded in candidate order with the
/// context's accumulator, starting from `Null`; a failed leg is logged and
/// contributes `Null`. The call itself never fails because of a leg.
pub struct Multicast<E> {
    inner: E,
}

impl<E> Multicast<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }
}

#[async_trait::async_trait]
impl<C, E> Executor<C> for Multicast<E>
where
    C: Candidate,
    E: Executor<C>,
{
    async fn execute(&self, candidates: &[C], ctx: &InvocationContext, args: &[Value]) -> Result<Value> {
        if !ctx.is_multicast() {
            return Err(Error::IllegalState(
                "multicast executor invoked without the multicast flag".into(),
            ));
        }

        let legs = candidates
            .iter()
            .map(|candidate| self.inner.execute(std::slice::from_ref(candidate), ctx, args));
        let results = join_all(legs).await;

        let accumulate = ctx.accumulator();
        let mut acc = Value::Null;
        let mut failed = 0usize;
        for (candidate, result) in candidates.iter().zip(results) {
            let contribution = match result {
                Ok(value) => value,
                Err(e) => {
                    failed += 1;
                    warn!(candidate = %candidate.label(), error = %e, "multicast leg failed");
                    Value::Null
                }
            };
            acc = accumulate(acc, contribution);
        }

        debug!(legs = candidates.len(), failed, "multicast complete");
        Ok(acc)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::context;
    use crate::target::Target;

    /// Answers with the worker id, failing for workers named "bad*".
    struct Echo;

    #[async_trait::async_trait]
    impl Executor<Target> for Echo {
        async fn execute(&self, candidates: &[Target], _ctx: &InvocationContext, _args: &[Value]) -> Result<Value> {
            let target = crate::executor::single(candidates, "target")?;
            if target.worker_id.starts_with("bad") {
                return Err(Error::fatal("boom"));
            }
            Ok(json!(target.worker_id))
        }
    }

    fn targets(names: &[&str]) -> Vec<Target> {
        names.iter().map(|n| Target::new(*n, "h", "prod")).collect()
    }

    #[tokio::test]
    async fn test_failed_leg_contributes_null() {
        let ctx = InvocationContext::builder()
            .multicast(true)
            .accumulator(context::concat())
            .build();
        let out = Multicast::new(Echo)
            .execute(&targets(&["a", "bad", "c"]), &ctx, &[])
            .await
            .unwrap();
        assert_eq!(out, json!(["a", "c"]));
    }

    #[tokio::test]
    async fn test_all_legs_failing_yields_initial_value() {
        let ctx = InvocationContext::builder().multicast(true).build();
        let out = Multicast::new(Echo)
            .execute(&targets(&["bad1", "bad2"]), &ctx, &[])
            .await
            .unwrap();
        assert_eq!(out, Value::Null);
    }

    #[tokio::test]
    async fn test_requires_multicast_flag() {
        let err = Multicast::new(Echo)
            .execute(&targets(&["a"]), &InvocationContext::default(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IllegalState(_)));
    }
}
