use super::value::{RemoteRef, Value};
use super::{CallPath, ProtocolError, THEN_MARKER};
use crate::domain::model::SplitPlan;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// One `invoke(path, args)` call. `target` is set when calling into a value
/// the sibling holds by reference, and absent for the sibling's package root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<RemoteRef>,
    pub path: CallPath,
    pub args: Vec<Value>,
}

/// Transport to a sibling. Anything exposing `invoke` qualifies.
#[async_trait]
pub trait Channel: Send + Sync {
    async fn invoke(&self, request: InvokeRequest) -> Result<Value, ProtocolError>;
}

/// Per-request context: the channels bound to the main unit, keyed by binding name.
#[derive(Clone, Default)]
pub struct Env {
    bindings: HashMap<String, Arc<dyn Channel>>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binding(mut self, name: impl Into<String>, channel: Arc<dyn Channel>) -> Self {
        self.insert(name, channel);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, channel: Arc<dyn Channel>) {
        self.bindings.insert(name.into(), channel);
    }

    pub fn binding(&self, name: &str) -> Result<Arc<dyn Channel>, ProtocolError> {
        self.bindings
            .get(name)
            .cloned()
            .ok_or_else(|| ProtocolError::MissingBindingError {
                name: name.to_string(),
            })
    }
}

/// Lazy capability handle on a sibling.
///
/// This is the dynamic boundary of the system: member names are plain
/// strings and nothing checks them until the sibling resolves the path.
/// Reading members never talks to the sibling; only [`Handle::call`] does.
#[derive(Clone)]
pub struct Handle {
    channel: Arc<dyn Channel>,
    target: Option<RemoteRef>,
    path: CallPath,
}

impl Handle {
    /// Handle on the package root behind `channel`.
    pub fn root(channel: Arc<dyn Channel>) -> Self {
        Self {
            channel,
            target: None,
            path: CallPath::new(),
        }
    }

    /// Handle on a value the sibling returned by reference.
    pub fn bound(channel: Arc<dyn Channel>, reference: RemoteRef) -> Self {
        Self {
            channel,
            target: Some(reference),
            path: CallPath::new(),
        }
    }

    pub fn path(&self) -> &CallPath {
        &self.path
    }

    pub fn reference(&self) -> Option<&RemoteRef> {
        self.target.as_ref()
    }

    /// Extends the path by one member. The thenable marker is always absent.
    pub fn member(&self, name: &str) -> Option<Handle> {
        if name == THEN_MARKER {
            return None;
        }
        Some(Self {
            channel: self.channel.clone(),
            target: self.target.clone(),
            path: self.path.child(name),
        })
    }

    /// `member` applied for each segment of a dotted path.
    pub fn at(&self, dotted: &str) -> Option<Handle> {
        dotted
            .split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(self.clone(), |handle, segment| handle.member(segment))
    }

    /// Invokes the member this handle addresses. A handle bound to a
    /// reference with no path calls the referenced value itself.
    ///
    /// Arguments are rewritten and fixed before the request is sent. A
    /// reference in the result comes back as a new bound [`Handle`].
    pub async fn call(&self, args: Vec<Arg>) -> Result<Remote, ProtocolError> {
        if self.target.is_none() && self.path.is_empty() {
            return Err(ProtocolError::ProtocolMisuseError {
                message: "Cannot call module root as a function".to_string(),
            });
        }

        let args = args
            .into_iter()
            .map(Arg::prepare)
            .collect::<Result<Vec<_>, _>>()?;

        let request = InvokeRequest {
            target: self.target.clone(),
            path: self.path.clone(),
            args,
        };
        tracing::trace!(path = %self.path, "invoking");

        Ok(match self.channel.invoke(request).await? {
            Value::Ref(reference) => Remote::Handle(Handle::bound(self.channel.clone(), reference)),
            value => Remote::Value(value),
        })
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("target", &self.target)
            .field("path", &self.path.to_string())
            .finish()
    }
}

/// Call argument. Handles are rewritten into markers before sending.
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    Handle(Handle),
    Array(Vec<Arg>),
    Record(BTreeMap<String, Arg>),
}

impl Arg {
    pub fn record<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Arg)>,
    {
        Arg::Record(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    fn prepare(self) -> Result<Value, ProtocolError> {
        match self {
            Arg::Value(value) => Ok(value),
            Arg::Handle(handle) => match (handle.target, handle.path) {
                (Some(reference), path) if path.is_empty() => Ok(Value::Ref(reference)),
                (Some(reference), path) => Err(ProtocolError::ProtocolMisuseError {
                    message: format!(
                        "Cannot pass member \"{}\" of reference {} as an argument; call it first",
                        path, reference
                    ),
                }),
                (None, path) => Ok(Value::PathRef(path)),
            },
            Arg::Array(items) => Ok(Value::Array(
                items
                    .into_iter()
                    .map(Arg::prepare)
                    .collect::<Result<_, _>>()?,
            )),
            Arg::Record(fields) => Ok(Value::Record(
                fields
                    .into_iter()
                    .map(|(k, v)| Ok((k, v.prepare()?)))
                    .collect::<Result<_, ProtocolError>>()?,
            )),
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl From<Handle> for Arg {
    fn from(handle: Handle) -> Self {
        Arg::Handle(handle)
    }
}

impl From<&Handle> for Arg {
    fn from(handle: &Handle) -> Self {
        Arg::Handle(handle.clone())
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Value(Value::from(value))
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Value(Value::from(value))
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Value(Value::from(value))
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Value(Value::from(value))
    }
}

/// Result of a remote call.
#[derive(Debug, Clone)]
pub enum Remote {
    Value(Value),
    Handle(Handle),
}

impl Remote {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Remote::Value(value) => Some(value),
            Remote::Handle(_) => None,
        }
    }

    pub fn into_handle(self) -> Option<Handle> {
        match self {
            Remote::Handle(handle) => Some(handle),
            Remote::Value(_) => None,
        }
    }
}

/// Stand-in for a relocated package inside the main unit: one handle per
/// statically known export plus the default handle on the package root.
#[derive(Debug, Clone)]
pub struct ClientModule {
    package: String,
    default: Handle,
    exports: BTreeMap<String, Handle>,
}

impl ClientModule {
    pub fn new(plan: &SplitPlan, env: &Env) -> Result<Self, ProtocolError> {
        let root = Handle::root(env.binding(&plan.binding_name)?);
        let exports = plan
            .export_names
            .iter()
            .filter(|name| name.as_str() != "default")
            .filter_map(|name| root.member(name).map(|handle| (name.clone(), handle)))
            .collect();

        Ok(Self {
            package: plan.package_name.clone(),
            default: root,
            exports,
        })
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn default_handle(&self) -> &Handle {
        &self.default
    }

    pub fn export(&self, name: &str) -> Option<&Handle> {
        self.exports.get(name)
    }

    pub fn export_names(&self) -> impl Iterator<Item = &str> {
        self.exports.keys().map(String::as_str)
    }

    /// Named export if discovered, otherwise a dynamic member of the root.
    pub fn handle(&self, name: &str) -> Option<Handle> {
        match self.exports.get(name) {
            Some(handle) => Some(handle.clone()),
            None => self.default.member(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::value::InstanceId;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingChannel {
        requests: Mutex<Vec<InvokeRequest>>,
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        async fn invoke(&self, request: InvokeRequest) -> Result<Value, ProtocolError> {
            self.requests.lock().unwrap().push(request);
            Ok(Value::Null)
        }
    }

    fn plan(exports: &[&str]) -> SplitPlan {
        SplitPlan {
            package_name: "sql-formatter".to_string(),
            service_name: "sql-formatter-service".to_string(),
            binding_name: "SQL_FORMATTER".to_string(),
            entrypoint_identifier: "SqlFormatterEntrypoint".to_string(),
            export_names: exports.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_member_chains_send_nothing_until_called() {
        let channel = Arc::new(RecordingChannel::default());
        let root = Handle::root(channel.clone());

        let deep = (0..64).fold(root, |h, i| h.member(&format!("m{i}")).unwrap());
        assert_eq!(deep.path().len(), 64);
        assert!(channel.requests.lock().unwrap().is_empty());

        deep.call(vec![]).await.unwrap();
        let requests = channel.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path.len(), 64);
    }

    #[tokio::test]
    async fn test_root_is_not_callable() {
        let channel = Arc::new(RecordingChannel::default());
        let err = Handle::root(channel.clone()).call(vec![]).await.unwrap_err();
        assert!(matches!(err, ProtocolError::ProtocolMisuseError { .. }));
        assert!(channel.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bound_handle_calls_the_referenced_value() {
        let channel = Arc::new(RecordingChannel::default());
        let reference = RemoteRef {
            instance: InstanceId::new(),
            id: 7,
        };
        Handle::bound(channel.clone(), reference.clone())
            .call(vec![Arg::from("abc")])
            .await
            .unwrap();

        let requests = channel.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].target, Some(reference));
        assert!(requests[0].path.is_empty());
    }

    #[test]
    fn test_then_member_is_absent() {
        let root = Handle::root(Arc::new(RecordingChannel::default()));
        assert!(root.member("then").is_none());
        assert!(root.at("client.then").is_none());
        assert_eq!(root.at("client.flush").unwrap().path().to_string(), "client.flush");
    }

    #[tokio::test]
    async fn test_arguments_are_rewritten_into_markers() {
        let channel = Arc::new(RecordingChannel::default());
        let root = Handle::root(channel.clone());
        let reference = RemoteRef {
            instance: InstanceId::new(),
            id: 3,
        };
        let bound = Handle::bound(channel.clone(), reference.clone());
        let helper = root.at("helpers.upper").unwrap();

        root.member("run")
            .unwrap()
            .call(vec![
                Arg::from(&bound),
                Arg::Array(vec![Arg::from(&helper), Arg::from(1.0)]),
                Arg::record([("client", Arg::from(&bound)), ("name", Arg::from("x"))]),
            ])
            .await
            .unwrap();

        let requests = channel.requests.lock().unwrap();
        let args = &requests[0].args;
        assert_eq!(args[0], Value::Ref(reference.clone()));
        assert_eq!(
            args[1],
            Value::Array(vec![
                Value::PathRef(["helpers", "upper"].into_iter().collect()),
                Value::Number(1.0),
            ])
        );
        assert_eq!(args[2].get("client"), Some(&Value::Ref(reference)));
        assert_eq!(args[2].get("name"), Some(&Value::from("x")));
    }

    #[tokio::test]
    async fn test_member_of_reference_cannot_be_an_argument() {
        let channel = Arc::new(RecordingChannel::default());
        let bound = Handle::bound(
            channel.clone(),
            RemoteRef {
                instance: InstanceId::new(),
                id: 0,
            },
        );
        let err = Handle::root(channel.clone())
            .member("run")
            .unwrap()
            .call(vec![Arg::from(bound.member("inner").unwrap())])
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ProtocolMisuseError { .. }));
        assert!(channel.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_client_module_requires_binding() {
        let err = ClientModule::new(&plan(&["format"]), &Env::new()).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::MissingBindingError {
                name: "SQL_FORMATTER".to_string()
            }
        );
    }

    #[test]
    fn test_client_module_exports() {
        let env = Env::new().with_binding("SQL_FORMATTER", Arc::new(RecordingChannel::default()));
        let module = ClientModule::new(&plan(&["default", "format", "formatDialect"]), &env).unwrap();

        assert_eq!(module.package(), "sql-formatter");
        assert_eq!(module.export_names().collect::<Vec<_>>(), vec!["format", "formatDialect"]);
        assert_eq!(module.export("format").unwrap().path().to_string(), "format");
        assert!(module.default_handle().path().is_empty());
        // dynamic fallback for names discovery did not see
        assert_eq!(module.handle("expandPhrases").unwrap().path().to_string(), "expandPhrases");
    }
}
