//! In-memory transport.
//!
//! Connects runtimes living in the same process, addressed by `host:port`
//! like any other endpoint. Useful for tests and for splitting one process
//! into several workers.

use std::sync::Arc;
use std::sync::Weak;

use dashmap::DashMap;
use tracing::trace;

use crate::runtime::Runtime;
use crate::target::Endpoint;
use crate::transport;
use crate::transport::Address;
use crate::transport::Request;
use crate::transport::Response;
use crate::transport::TransportClient;
use crate::transport::TransportError;

/// Protocol name the loopback transport answers to.
pub const LOOPBACK: &str = "loopback";

#[derive(Default)]
pub struct LoopbackTransport {
    nodes: DashMap<Address, Weak<Runtime>>,
}

impl LoopbackTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes `runtime` reachable at `endpoint`.
    pub fn attach(&self, endpoint: &Endpoint, runtime: &Arc<Runtime>) {
        self.nodes.insert(endpoint.address(), Arc::downgrade(runtime));
    }

    pub fn detach(&self, endpoint: &Endpoint) {
        self.nodes.remove(&endpoint.address());
    }

    fn resolve(&self, address: &Address) -> transport::Result<Arc<Runtime>> {
        self.nodes
            .get(address)
            .and_then(|entry| entry.value().upgrade())
            .ok_or_else(|| TransportError::ConnectionLost(format!("nothing listening on {address}")))
    }
}

#[async_trait::async_trait]
impl TransportClient for LoopbackTransport {
    fn protocols(&self) -> Vec<String> {
        vec![LOOPBACK.to_string()]
    }

    async fn request_response(&self, request: Request) -> transport::Result<Response> {
        if request.protocol != LOOPBACK {
            return Err(TransportError::Io(format!("unsupported protocol '{}'", request.protocol)));
        }
        let runtime = self.resolve(&request.address)?;
        trace!(address = %request.address, contract = %request.metadata.contract, "loopback request");
        Ok(runtime.serve(request).await)
    }
}
