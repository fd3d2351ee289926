//! Remote call protocol between the main unit and its siblings.
//!
//! The wire contract is a single operation, `invoke(path, args) -> value`.
//! The client half ([`client`]) builds call paths lazily on [`Handle`]s and
//! only talks to the sibling when a handle is called. The server half
//! ([`server`]) walks the path through the hosted package's namespace, calls
//! the final member and classifies the result: plain data goes back by value,
//! anything else stays in the sibling's [`ReferenceStore`] and goes back as a
//! reference the client can keep calling into.

pub mod client;
pub mod host;
pub mod server;
pub mod store;
pub mod value;

pub use client::{Arg, Channel, ClientModule, Env, Handle, InvokeRequest, Remote};
pub use host::{async_method, function, method, HostFunction, HostObject, HostValue, Namespace, ValueClass};
pub use server::{spawn_sibling, SiblingChannel, SiblingEntrypoint, SiblingServer};
pub use store::ReferenceStore;
pub use value::{InstanceId, RemoteRef, Value};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Segments that would reach into inherited object internals.
pub const BLOCKED_SEGMENTS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// Member name generic await machinery looks up. Handles never expose it.
pub const THEN_MARKER: &str = "then";

/// Per-call protocol failures. They reach only the immediate caller.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ProtocolError {
    #[error("Blocked path segment: \"{segment}\"")]
    PathViolationError { segment: String },

    #[error("Cannot resolve {message}")]
    ResolutionError { message: String },

    #[error("{message}")]
    ProtocolMisuseError { message: String },

    #[error("Service binding \"{name}\" not found in env")]
    MissingBindingError { name: String },

    #[error("Remote call failed: {message}")]
    HostError { message: String },

    #[error("Transport failure: {message}")]
    TransportError { message: String },
}

impl ProtocolError {
    pub fn host(message: impl Into<String>) -> Self {
        ProtocolError::HostError {
            message: message.into(),
        }
    }
}

/// Ordered member names accumulated before an invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallPath(Vec<String>);

impl CallPath {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    /// Returns a new path one segment longer. `self` is left untouched.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Dotted form of the first `len` segments.
    pub fn prefix(&self, len: usize) -> String {
        self.0[..len.min(self.0.len())].join(".")
    }
}

impl fmt::Display for CallPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl<S: Into<String>> FromIterator<S> for CallPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a CallPath {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Rejects a path touching any of [`BLOCKED_SEGMENTS`], before anything is resolved.
pub fn validate_path(path: &CallPath) -> Result<(), ProtocolError> {
    match path.iter().find(|seg| BLOCKED_SEGMENTS.contains(&seg.as_str())) {
        Some(segment) => Err(ProtocolError::PathViolationError {
            segment: segment.clone(),
        }),
        None => Ok(()),
    }
}
