//! # Error translation
//!
//! Maps a numeric response code to a typed `RemoteError`.
//!
//! ## Sources
//!
//! - **Built-in codes** are fixed and always win.
//! - **Contributed codes** come from plugins as a JSON resource of the form
//!   `{ "<code>": { "name": "...", "kind": "fatal|retryable|degradable" } }`.
//!
//! The merged contributed table is rebuilt whenever the runtime starts or a
//! plugin starts or stops, then swapped in whole; lookups never see a
//! half-built table.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::error::Error;
use crate::error::FailureKind;
use crate::error::RemoteError;
use crate::error::Result;
use crate::id::BindingId;
use crate::lifecycle::LifecycleEvent;
use crate::lifecycle::LifecycleListener;

pub mod codes {
    pub const OK: i32 = crate::transport::STATUS_OK;
    pub const BAD_REQUEST: i32 = 400;
    pub const NOT_FOUND: i32 = 404;
    pub const TIMEOUT: i32 = 408;
    pub const BUSY: i32 = 429;
    pub const INTERNAL: i32 = 500;
    pub const UNAVAILABLE: i32 = 503;
}

/// Class name used when a code resolves to nothing.
pub const GENERIC_CLASS: &str = "RemoteError";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClass {
    pub name: String,
    #[serde(default)]
    pub kind: FailureKind,
}

impl ErrorClass {
    pub fn new(name: impl Into<String>, kind: FailureKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

pub type ErrorCodes = BTreeMap<i32, ErrorClass>;

/// Parses a contributed error-code resource.
pub fn parse_codes(json: &str) -> Result<ErrorCodes> {
    Ok(serde_json::from_str(json)?)
}

fn builtin() -> HashMap<i32, ErrorClass> {
    HashMap::from([
        (codes::BAD_REQUEST, ErrorClass::new("BadRequest", FailureKind::Fatal)),
        (codes::NOT_FOUND, ErrorClass::new("ImplementationNotFound", FailureKind::Fatal)),
        (codes::TIMEOUT, ErrorClass::new("Timeout", FailureKind::Retryable)),
        (codes::BUSY, ErrorClass::new("Busy", FailureKind::Retryable)),
        (codes::INTERNAL, ErrorClass::new("Internal", FailureKind::Fatal)),
        (codes::UNAVAILABLE, ErrorClass::new("Unavailable", FailureKind::Degradable)),
    ])
}

pub struct ErrorTable {
    builtin: HashMap<i32, ErrorClass>,
    contributions: RwLock<BTreeMap<String, ErrorCodes>>,
    active: RwLock<Arc<HashMap<i32, ErrorClass>>>,
}

impl ErrorTable {
    pub fn new() -> Self {
        Self {
            builtin: builtin(),
            contributions: RwLock::new(BTreeMap::new()),
            active: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Registers the codes a source (a plugin name, or `""` for the host)
    /// contributes. They take effect at the next lifecycle event.
    pub fn contribute(&self, source: impl Into<String>, codes: ErrorCodes) {
        self.contributions.write().insert(source.into(), codes);
    }

    pub fn withdraw(&self, source: &str) {
        self.contributions.write().remove(source);
    }

    /// Rebuilds the contributed table and swaps it in.
    pub fn recompute(&self) {
        let mut merged = HashMap::new();
        {
            let contributions = self.contributions.read();
            for (source, codes) in contributions.iter() {
                for (code, class) in codes {
                    if self.builtin.contains_key(code) {
                        warn!(source = %source, code, "contributed error code shadows a built-in code, ignoring");
                        continue;
                    }
                    if let Some(previous) = merged.insert(*code, class.clone()) {
                        warn!(source = %source, code, previous = %previous.name, "error code contributed twice, last source wins");
                    }
                }
            }
        }
        let size = merged.len();
        *self.active.write() = Arc::new(merged);
        info!(codes = size, "error table recomputed");
    }

    /// Snapshot of the contributed table currently in effect.
    pub fn snapshot(&self) -> Arc<HashMap<i32, ErrorClass>> {
        self.active.read().clone()
    }

    pub fn class_of(&self, code: i32) -> Option<ErrorClass> {
        if let Some(class) = self.builtin.get(&code) {
            return Some(class.clone());
        }
        self.snapshot().get(&code).cloned()
    }

    /// Builds the typed error for a failed response.
    pub fn resolve(
        &self,
        code: i32,
        message: impl Into<String>,
        binding: &BindingId,
        properties: BTreeMap<String, String>,
    ) -> Error {
        let class = self
            .class_of(code)
            .unwrap_or_else(|| ErrorClass::new(GENERIC_CLASS, FailureKind::Fatal));

        Error::Remote(RemoteError {
            class: class.name,
            code,
            message: message.into(),
            kind: class.kind,
            contract: binding.contract.clone(),
            implementation: binding.implementation.clone(),
            implementation_version: binding.implementation_version.clone(),
            properties,
        })
    }
}

impl Default for ErrorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleListener for ErrorTable {
    fn on_event(&self, event: &LifecycleEvent) {
        if let LifecycleEvent::PluginStopped(name) = event {
            self.withdraw(name);
        }
        self.recompute();
    }
}

/// The response code a served call reports for `err`.
pub fn code_for(err: &Error) -> i32 {
    let root = err.root();
    match root {
        Error::Remote(remote) => return remote.code,
        Error::Raised { code: Some(code), .. } => return *code,
        _ => {}
    }

    match root.kind() {
        FailureKind::Retryable => codes::BUSY,
        FailureKind::Degradable => codes::UNAVAILABLE,
        FailureKind::Fatal => match root {
            Error::BindingNotFound(_)
            | Error::ContractNotFound(_)
            | Error::NotHostedLocally { .. }
            | Error::NoImplementation { .. } => codes::NOT_FOUND,
            Error::ArgumentMismatch { .. } | Error::Codec(_) | Error::NoSerializer { .. } => codes::BAD_REQUEST,
            Error::Transport(crate::transport::TransportError::Timeout) => codes::TIMEOUT,
            _ => codes::INTERNAL,
        },
    }
}
