//! Slices and service handlers
//!
//! A slice is the vertical stack of services one member hosts. Members run
//! the same slice side by side; capacity grows by adding members.

use async_trait::async_trait;
use meridian_types::{PartitionId, RemoteError, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Executes the methods of one service
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    async fn invoke(
        &self,
        method: &str,
        arg_types: &[String],
        args: Vec<Value>,
    ) -> Result<Value, RemoteError>;
}

/// Services of one member plus lifecycle hooks.
///
/// The hooks of one slice are never called concurrently. `on_start` and
/// `on_stop` are called at most once.
pub trait Slice: Send + Sync {
    fn service(&self, name: &str) -> Option<Arc<dyn ServiceHandler>>;

    fn on_start(&self) {}

    fn on_stop(&self) {}

    fn on_partition_added(&self, _partition: PartitionId) {}

    fn on_partition_removed(&self, _partition: PartitionId) {}
}

/// Slice made of a fixed set of services and no lifecycle behavior
#[derive(Default, Clone)]
pub struct ServiceSlice {
    services: HashMap<String, Arc<dyn ServiceHandler>>,
}

impl ServiceSlice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, name: impl Into<String>, handler: Arc<dyn ServiceHandler>) -> Self {
        self.services.insert(name.into(), handler);
        self
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Slice for ServiceSlice {
    fn service(&self, name: &str) -> Option<Arc<dyn ServiceHandler>> {
        self.services.get(name).cloned()
    }
}

/// Service backed by a synchronous function of `(method, args)`
pub struct FnService<F> {
    handler: F,
}

impl<F> FnService<F>
where
    F: Fn(&str, &[Value]) -> Result<Value, RemoteError> + Send + Sync + 'static,
{
    pub fn new(handler: F) -> Arc<Self> {
        Arc::new(Self { handler })
    }
}

#[async_trait]
impl<F> ServiceHandler for FnService<F>
where
    F: Fn(&str, &[Value]) -> Result<Value, RemoteError> + Send + Sync + 'static,
{
    async fn invoke(
        &self,
        method: &str,
        _arg_types: &[String],
        args: Vec<Value>,
    ) -> Result<Value, RemoteError> {
        (self.handler)(method, &args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_service() {
        let echo = FnService::new(|method: &str, args: &[Value]| match method {
            "echo" => Ok(args.first().cloned().unwrap_or(Value::Null)),
            other => Err(RemoteError::new("NoSuchMethod", other)),
        });
        let slice = ServiceSlice::new().with_service("EchoService", echo);

        let service = slice.service("EchoService").unwrap();
        let value = service.invoke("echo", &[], vec![json!("hi")]).await.unwrap();
        assert_eq!(value, json!("hi"));

        let err = service.invoke("shout", &[], vec![]).await.unwrap_err();
        assert!(err.is_kind("NoSuchMethod"));

        assert!(slice.service("Missing").is_none());
        assert_eq!(slice.service_names(), vec!["EchoService".to_string()]);
    }
}
