//! # Balancer
//!
//! Produces the targets eligible to serve one binding for one call. The
//! locator's candidates pass through a fixed chain:
//!
//! 1. environment (exact match, or the most preferred environment present)
//! 2. protocol and format support
//! 3. the caller's load-balance filter
//! 4. intersection with the targets of every co-located binding
//!
//! An empty result is terminal for the call.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use rand::Rng;
use serde_json::Value;
use tracing::debug;

use crate::context::InvocationContext;
use crate::error::Error;
use crate::error::Result;
use crate::id::BindingId;
use crate::locator::Locator;
use crate::serializer::SerializerSet;
use crate::target::Target;

/// Caller-supplied narrowing, applied after the built-in filters.
pub trait LoadBalanceFilter: Send + Sync + 'static {
    fn filter(&self, binding: &BindingId, targets: Vec<Target>, args: &[Value]) -> Vec<Target>;
}

pub struct Balancer {
    locator: Arc<Locator>,
    protocols: BTreeSet<String>,
    serializers: SerializerSet,
}

impl Balancer {
    /// `protocols` are those some transport client speaks.
    pub fn new(locator: Arc<Locator>, protocols: BTreeSet<String>, serializers: SerializerSet) -> Self {
        Self {
            locator,
            protocols,
            serializers,
        }
    }

    pub fn locator(&self) -> &Arc<Locator> {
        &self.locator
    }

    pub async fn balance(&self, binding: &BindingId, ctx: &InvocationContext, args: &[Value]) -> Result<Vec<Target>> {
        let candidates = self.locator.lookup(binding).await?;
        let located = candidates.len();

        let targets = filter_environment(candidates, ctx);
        let targets = self.filter_transport(targets, ctx);
        let targets = match &ctx.balance_filter {
            Some(filter) => filter.filter(binding, targets, args),
            None => targets,
        };
        let targets = self.colocate(targets, ctx).await?;

        debug!(binding = %binding, located, eligible = targets.len(), "balanced");
        if targets.is_empty() {
            return Err(Error::TargetNotFound {
                binding: binding.clone(),
            });
        }
        Ok(targets)
    }

    /// Keeps targets reachable through some transport client with some
    /// serializer. The caller's own worker is exempt: it is called in-process.
    fn filter_transport(&self, targets: Vec<Target>, ctx: &InvocationContext) -> Vec<Target> {
        targets
            .into_iter()
            .filter(|t| {
                if !ctx.caller().is_empty() && t.worker_id == ctx.caller() {
                    return true;
                }
                let protocol_ok = t.endpoints.iter().any(|e| {
                    self.protocols.contains(&e.protocol)
                        && (ctx.protocols().is_empty() || ctx.protocols().contains(&e.protocol))
                });
                let format_ok = t.formats.iter().any(|f| {
                    self.serializers.contains(f) && (ctx.formats().is_empty() || ctx.formats().contains(f))
                });
                protocol_ok && format_ok
            })
            .collect()
    }

    async fn colocate(&self, mut targets: Vec<Target>, ctx: &InvocationContext) -> Result<Vec<Target>> {
        for other in ctx.colocate_with() {
            if targets.is_empty() {
                break;
            }
            let others = self.locator.lookup(other).await?;
            targets.retain(|t| others.iter().any(|o| o.worker_id == t.worker_id));
        }
        Ok(targets)
    }
}

/// Exact environment if the context names one; otherwise every target of the
/// most preferred environment that has any target at all.
pub fn filter_environment(targets: Vec<Target>, ctx: &InvocationContext) -> Vec<Target> {
    if let Some(env) = ctx.environment() {
        return targets.into_iter().filter(|t| t.environment == env).collect();
    }

    let priority = ctx.environment_priority();
    if priority.is_empty() {
        return targets;
    }

    let Some(chosen) = priority
        .iter()
        .find(|env| targets.iter().any(|t| &t.environment == *env))
    else {
        return Vec::new();
    };
    let chosen = chosen.clone();
    targets.into_iter().filter(|t| t.environment == chosen).collect()
}

/// Rotating tie-break between equivalent targets.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pick(&self, targets: &[Target]) -> Option<Target> {
        if targets.is_empty() {
            return None;
        }
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        Some(targets[n % targets.len()].clone())
    }
}

impl LoadBalanceFilter for RoundRobin {
    fn filter(&self, _binding: &BindingId, targets: Vec<Target>, _args: &[Value]) -> Vec<Target> {
        self.pick(&targets).into_iter().collect()
    }
}

/// Extension key holding a target's relative weight.
pub const WEIGHT_EXTENSION: &str = "weight";

/// Picks one target at random, proportionally to its `weight` extension
/// (missing or unparsable weights count as 1).
#[derive(Clone, Copy, Debug, Default)]
pub struct WeightedRandom;

impl WeightedRandom {
    fn weight(target: &Target) -> f64 {
        target
            .extensions
            .get(WEIGHT_EXTENSION)
            .and_then(|w| w.parse::<f64>().ok())
            .filter(|w| w.is_finite() && *w >= 0.0)
            .unwrap_or(1.0)
    }
}

impl LoadBalanceFilter for WeightedRandom {
    fn filter(&self, _binding: &BindingId, targets: Vec<Target>, _args: &[Value]) -> Vec<Target> {
        if targets.len() <= 1 {
            return targets;
        }

        // capped so the sum stays finite
        let cap = f64::MAX / (targets.len() + 1) as f64;
        let weights: Vec<f64> = targets.iter().map(|t| Self::weight(t).min(cap)).collect();
        let total: f64 = weights.iter().sum();
        if !total.is_finite() || total <= 0.0 {
            return targets;
        }

        let mut roll = rand::thread_rng().gen_range(0.0..total);
        for (target, weight) in targets.iter().zip(&weights) {
            if roll < *weight {
                return vec![target.clone()];
            }
            roll -= weight;
        }
        targets.into_iter().last().into_iter().collect()
    }
}
