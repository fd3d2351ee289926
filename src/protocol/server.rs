use super::client::{Channel, InvokeRequest};
use super::host::{HostValue, Namespace, ValueClass};
use super::store::ReferenceStore;
use super::value::{InstanceId, Value};
use super::{validate_path, CallPath, ProtocolError};
use crate::domain::model::SplitPlan;
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Call resolver for one sibling instance. Owns that instance's reference store.
pub struct SiblingServer {
    namespace: Arc<Namespace>,
    store: ReferenceStore,
}

impl SiblingServer {
    pub fn new(namespace: Namespace) -> Self {
        Self::with_store_capacity(namespace, ReferenceStore::DEFAULT_CAPACITY)
    }

    pub fn with_store_capacity(namespace: Namespace, capacity: usize) -> Self {
        Self {
            namespace: Arc::new(namespace),
            store: ReferenceStore::with_capacity(InstanceId::new(), capacity),
        }
    }

    pub fn instance(&self) -> InstanceId {
        self.store.instance()
    }

    pub fn store(&self) -> &ReferenceStore {
        &self.store
    }

    pub async fn invoke(&mut self, request: InvokeRequest) -> Result<Value, ProtocolError> {
        let InvokeRequest { target, path, args } = request;
        validate_path(&path)?;

        let (root, from_namespace) = match &target {
            Some(reference) => (self.store.get(reference)?, false),
            None => (self.root(), true),
        };
        let (receiver, resolved) = self.walk(root, &path, from_namespace)?;

        let callee = match resolved {
            HostValue::Function(callee) => callee,
            value => {
                tracing::debug!(%path, kind = value.kind(), "resolved to a value");
                return Ok(self.to_wire(value));
            }
        };

        let args = args
            .into_iter()
            .map(|arg| self.resolve_arg(arg))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(%path, args = args.len(), "calling");
        let result = callee.call(receiver, args).await?;
        Ok(self.to_wire(result))
    }

    /// The default export if there is one, otherwise the namespace itself.
    fn root(&self) -> HostValue {
        match self.namespace.default_export() {
            Some(default) => default.clone(),
            None => self.namespace_value(),
        }
    }

    fn namespace_value(&self) -> HostValue {
        HostValue::Object(self.namespace.clone())
    }

    /// Walks `path` from `root` and returns `(receiver, value)`. With
    /// `namespace_fallback`, a first segment missing on `root` is looked up on
    /// the namespace instead.
    fn walk(
        &self,
        root: HostValue,
        path: &CallPath,
        namespace_fallback: bool,
    ) -> Result<(HostValue, HostValue), ProtocolError> {
        let mut parent = root.clone();
        let mut current = root;

        for (i, segment) in path.iter().enumerate() {
            match current.member(segment) {
                Some(next) => parent = std::mem::replace(&mut current, next),
                None if i == 0 && namespace_fallback => {
                    let namespace = self.namespace_value();
                    match namespace.member(segment) {
                        Some(next) => {
                            parent = namespace;
                            current = next;
                        }
                        None => return Err(unresolved(path, i)),
                    }
                }
                None => return Err(unresolved(path, i)),
            }
        }

        Ok((parent, current))
    }

    fn resolve_arg(&mut self, arg: Value) -> Result<HostValue, ProtocolError> {
        Ok(match arg {
            Value::Ref(reference) => self.store.get(&reference)?,
            Value::PathRef(path) => {
                validate_path(&path)?;
                let root = self.root();
                self.walk(root, &path, true)?.1
            }
            Value::Null => HostValue::Null,
            Value::Bool(b) => HostValue::Bool(b),
            Value::Number(n) => HostValue::Number(n),
            Value::String(s) => HostValue::String(s),
            Value::Bytes(b) => HostValue::Bytes(b),
            Value::Stream(chunks) => HostValue::Stream(chunks),
            Value::Date(d) => HostValue::Date(d),
            Value::Regex { source, flags } => HostValue::Regex { source, flags },
            Value::Array(items) => HostValue::Array(self.resolve_all(items)?),
            Value::Set(items) => HostValue::Set(self.resolve_all(items)?),
            Value::Map(entries) => HostValue::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| Ok((self.resolve_arg(k)?, self.resolve_arg(v)?)))
                    .collect::<Result<_, ProtocolError>>()?,
            ),
            Value::Record(fields) => HostValue::Record(
                fields
                    .into_iter()
                    .map(|(k, v)| Ok((k, self.resolve_arg(v)?)))
                    .collect::<Result<_, ProtocolError>>()?,
            ),
        })
    }

    fn resolve_all(&mut self, items: Vec<Value>) -> Result<Vec<HostValue>, ProtocolError> {
        items.into_iter().map(|item| self.resolve_arg(item)).collect()
    }

    /// Converts a result for the wire. Opaque values, including ones nested in
    /// containers, are stored and replaced by a reference.
    fn to_wire(&mut self, value: HostValue) -> Value {
        match ValueClass::of(&value) {
            ValueClass::Opaque => {
                let reference = self.store.insert(value);
                tracing::debug!(%reference, "returning by reference");
                Value::Ref(reference)
            }
            _ => match value {
                HostValue::Null => Value::Null,
                HostValue::Bool(b) => Value::Bool(b),
                HostValue::Number(n) => Value::Number(n),
                HostValue::String(s) => Value::String(s),
                HostValue::Bytes(b) => Value::Bytes(b),
                HostValue::Stream(chunks) => Value::Stream(chunks),
                HostValue::Date(d) => Value::Date(d),
                HostValue::Regex { source, flags } => Value::Regex { source, flags },
                HostValue::Array(items) => {
                    Value::Array(items.into_iter().map(|v| self.to_wire(v)).collect())
                }
                HostValue::Set(items) => {
                    Value::Set(items.into_iter().map(|v| self.to_wire(v)).collect())
                }
                HostValue::Map(entries) => Value::Map(
                    entries
                        .into_iter()
                        .map(|(k, v)| (self.to_wire(k), self.to_wire(v)))
                        .collect(),
                ),
                HostValue::Record(fields) => Value::Record(
                    fields
                        .into_iter()
                        .map(|(k, v)| (k, self.to_wire(v)))
                        .collect(),
                ),
                HostValue::Function(_) | HostValue::Object(_) => {
                    unreachable!("opaque values are classified above")
                }
            },
        }
    }
}

fn unresolved(path: &CallPath, index: usize) -> ProtocolError {
    ProtocolError::ResolutionError {
        message: format!("\"{}\"", path.prefix(index + 1)),
    }
}

/// Named server module for one relocated package.
pub struct SiblingEntrypoint {
    identifier: String,
    service: String,
    server: SiblingServer,
}

impl SiblingEntrypoint {
    pub fn new(plan: &SplitPlan, namespace: Namespace, store_capacity: usize) -> Self {
        Self {
            identifier: plan.entrypoint_identifier.clone(),
            service: plan.service_name.clone(),
            server: SiblingServer::with_store_capacity(namespace, store_capacity),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn spawn(self, queue_depth: usize) -> SiblingChannel {
        tracing::info!(
            entrypoint = %self.identifier,
            service = %self.service,
            "starting sibling instance"
        );
        spawn_sibling(self.server, queue_depth)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

type Envelope = (InvokeRequest, oneshot::Sender<Result<Value, ProtocolError>>);

/// Client end of a running sibling instance. Cheap to clone; many calls may be
/// outstanding, and the instance answers them one at a time.
#[derive(Clone)]
pub struct SiblingChannel {
    instance: InstanceId,
    sender: mpsc::Sender<Envelope>,
}

impl SiblingChannel {
    pub fn instance(&self) -> InstanceId {
        self.instance
    }
}

/// Runs `server` on its own task. The task stops when every channel is dropped.
pub fn spawn_sibling(mut server: SiblingServer, queue_depth: usize) -> SiblingChannel {
    let instance = server.instance();
    let (sender, mut receiver) = mpsc::channel::<Envelope>(queue_depth.max(1));

    tokio::spawn(async move {
        while let Some((request, reply)) = receiver.recv().await {
            let path = request.path.to_string();
            let outcome = AssertUnwindSafe(server.invoke(request))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    tracing::warn!(%instance, %path, "hosted function panicked");
                    Err(ProtocolError::host(format!(
                        "\"{}\" panicked: {}",
                        path,
                        panic_message(panic.as_ref())
                    )))
                });
            if let Err(err) = &outcome {
                tracing::debug!(%instance, error = %err, "call rejected");
            }
            if reply.send(outcome).is_err() {
                tracing::debug!(%instance, "caller dropped before the response arrived");
            }
        }
        tracing::debug!(%instance, "sibling instance stopped");
    });

    SiblingChannel { instance, sender }
}

#[async_trait]
impl Channel for SiblingChannel {
    async fn invoke(&self, request: InvokeRequest) -> Result<Value, ProtocolError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send((request, reply))
            .await
            .map_err(|_| ProtocolError::TransportError {
                message: format!("sibling {} is not running", self.instance),
            })?;
        response.await.map_err(|_| ProtocolError::TransportError {
            message: format!("sibling {} dropped the call", self.instance),
        })?
    }
}
