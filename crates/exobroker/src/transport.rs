//! # Transport Abstraction
//!
//! The boundary between the broker and whatever actually moves bytes.
//!
//! ## Philosophy
//!
//! - **Envelope-Oriented**: The broker hands a client a fully built `Request`
//!   (metadata envelope plus already-encoded arguments). The client knows
//!   nothing about routing, balancing or retries.
//! - **Request-Response**: The only interaction model is "send a request,
//!   await a response". Fan-out is built on top of this, not defined here.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::error::FailureKind;
use crate::id::ContractId;
use crate::signature::TypeDescriptor;

/// Status code of a successful response.
pub const STATUS_OK: i32 = 200;

/// Errors that occur at the network/transport layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The peer is unreachable or the connection was dropped.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    /// The operation timed out before a response was received.
    #[error("Request timed out")]
    Timeout,
    /// The remote peer rejected the payload size.
    #[error("Payload too large for transport")]
    PayloadTooLarge,
    /// Generic I/O error or internal transport failure.
    #[error("I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Lost connections and timeouts are worth another attempt.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ConnectionLost(_) | Self::Timeout => FailureKind::Retryable,
            Self::PayloadTooLarge | Self::Io(_) => FailureKind::Fatal,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Host and port of an endpoint.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Whether the request is one leg of a fan-out.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CommunicationMode {
    #[default]
    Unicast,
    Multicast,
}

/// Identifies what is being called and how the payload is encoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestMetadata {
    pub contract: ContractId,
    pub implementation: String,
    pub implementation_version: String,
    /// Format code of the serializer that produced `Request::payload`.
    pub format: String,
    pub tags: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub timeout: Duration,
    pub mode: CommunicationMode,
    /// Extension metadata advertised by the chosen target.
    pub extensions: BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct Request {
    pub protocol: String,
    pub address: Address,
    pub metadata: RequestMetadata,
    pub arg_types: Vec<TypeDescriptor>,
    pub return_type: TypeDescriptor,
    /// Arguments encoded with `metadata.format`.
    pub payload: Vec<u8>,
    pub context: RequestContext,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseMetadata {
    pub code: i32,
    pub message: String,
    pub tags: BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct Response {
    pub metadata: ResponseMetadata,
    /// Return value encoded with the request's format. Empty on failure.
    pub payload: Vec<u8>,
}

impl Response {
    pub fn ok(payload: Vec<u8>) -> Self {
        Self {
            metadata: ResponseMetadata {
                code: STATUS_OK,
                message: String::new(),
                tags: BTreeMap::new(),
            },
            payload,
        }
    }

    pub fn failure(code: i32, message: impl Into<String>) -> Self {
        Self {
            metadata: ResponseMetadata {
                code,
                message: message.into(),
                tags: BTreeMap::new(),
            },
            payload: Vec::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.tags.insert(key.into(), value.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.metadata.code == STATUS_OK
    }
}

/// A pluggable client for one or more wire protocols.
///
/// This trait is designed to be object-safe (`Arc<dyn TransportClient>`).
#[async_trait::async_trait]
pub trait TransportClient: Send + Sync + 'static {
    /// Protocols this client can speak, e.g. `["grpc", "http"]`.
    fn protocols(&self) -> Vec<String>;

    /// Sends a request and waits for the response.
    ///
    /// # invariants
    /// - Must return `Ok(response)` whenever the remote answered, even with a
    ///   failure status code.
    /// - Must return `Err` only if the exchange itself failed.
    async fn request_response(&self, request: Request) -> Result<Response>;
}
