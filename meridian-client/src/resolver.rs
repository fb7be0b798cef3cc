//! Partition key resolution
//!
//! Runs once per attempt of a partitioned call. Failures here are the
//! caller's fault and are never retried.

use meridian_types::PartitionKey;
use serde_json::Value;

use crate::error::CallerError;
use crate::route::{KeyAccessor, PartitionKeySpec};

/// Produce the non-null partition key of a call.
///
/// `method` is only used to name the method in errors.
pub fn resolve_partition_key(
    method: &str,
    spec: &PartitionKeySpec,
    args: &[Value],
) -> Result<PartitionKey, CallerError> {
    let argument = args
        .get(spec.index)
        .filter(|arg| !arg.is_null())
        .ok_or_else(|| CallerError::NullPartitionKeyArgument {
            method: method.to_string(),
            index: spec.index,
        })?;

    let key = match &spec.accessor {
        None => match &spec.self_key {
            Some(self_key) => {
                let reported = self_key(argument).map_err(|reason| CallerError::AccessorFailed {
                    method: method.to_string(),
                    accessor: format!("{}::partition_key", spec.type_name),
                    reason,
                })?;
                return PartitionKey::new(reported).ok_or_else(|| {
                    CallerError::NullSelfDescribingKey {
                        method: method.to_string(),
                        type_name: spec.type_name.clone(),
                    }
                });
            }
            None => argument.clone(),
        },
        Some(KeyAccessor::Method { name, call }) => {
            call(argument).map_err(|reason| CallerError::AccessorFailed {
                method: method.to_string(),
                accessor: name.clone(),
                reason,
            })?
        }
        Some(KeyAccessor::Field { name }) => match argument {
            Value::Object(fields) => fields.get(name).cloned().unwrap_or(Value::Null),
            other => {
                return Err(CallerError::AccessorFailed {
                    method: method.to_string(),
                    accessor: name.clone(),
                    reason: format!("argument is not an object: {}", other),
                });
            }
        },
    };

    let accessor = spec.accessor.as_ref().map(|a| a.name().to_string());
    PartitionKey::new(key).ok_or_else(|| match accessor {
        Some(accessor) => CallerError::NullAccessorResult {
            method: method.to_string(),
            accessor,
        },
        None => CallerError::NullPartitionKeyArgument {
            method: method.to_string(),
            index: spec.index,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn spec(accessor: Option<KeyAccessor>) -> PartitionKeySpec {
        PartitionKeySpec {
            index: 0,
            accessor,
            type_name: "Account".to_string(),
            self_key: None,
        }
    }

    #[test]
    fn test_argument_itself_is_the_key() {
        let key = resolve_partition_key("S.m", &spec(None), &[json!("acc-1"), json!(5)]).unwrap();
        assert_eq!(key.value(), &json!("acc-1"));
    }

    #[test]
    fn test_null_or_missing_argument() {
        let err = resolve_partition_key("S.m", &spec(None), &[Value::Null]).unwrap_err();
        assert_eq!(
            err,
            CallerError::NullPartitionKeyArgument {
                method: "S.m".to_string(),
                index: 0
            }
        );

        let err = resolve_partition_key("S.m", &spec(None), &[]).unwrap_err();
        assert!(matches!(err, CallerError::NullPartitionKeyArgument { .. }));
    }

    #[test]
    fn test_accessor_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let accessor = KeyAccessor::Method {
            name: "getId".to_string(),
            call: Arc::new(move |v: &Value| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(v["id"].clone())
            }),
        };

        let key =
            resolve_partition_key("S.m", &spec(Some(accessor)), &[json!({"id": 42})]).unwrap();
        assert_eq!(key.value(), &json!(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_accessor_returning_null() {
        let accessor = KeyAccessor::Method {
            name: "getId".to_string(),
            call: Arc::new(|_: &Value| Ok(Value::Null)),
        };
        let err = resolve_partition_key("S.m", &spec(Some(accessor)), &[json!({})]).unwrap_err();
        assert_eq!(
            err,
            CallerError::NullAccessorResult {
                method: "S.m".to_string(),
                accessor: "getId".to_string()
            }
        );
    }

    #[test]
    fn test_accessor_failure_is_wrapped() {
        let accessor = KeyAccessor::Method {
            name: "getId".to_string(),
            call: Arc::new(|_: &Value| Err("lazy field not loaded".to_string())),
        };
        let err = resolve_partition_key("S.m", &spec(Some(accessor)), &[json!({})]).unwrap_err();
        assert!(err.to_string().contains("lazy field not loaded"));
    }

    #[test]
    fn test_field_accessor() {
        let accessor = KeyAccessor::Field {
            name: "region".to_string(),
        };
        let key = resolve_partition_key(
            "S.m",
            &spec(Some(accessor.clone())),
            &[json!({"region": "eu"})],
        )
        .unwrap();
        assert_eq!(key.value(), &json!("eu"));

        let err = resolve_partition_key("S.m", &spec(Some(accessor)), &[json!({"other": 1})])
            .unwrap_err();
        assert!(matches!(err, CallerError::NullAccessorResult { .. }));
    }

    #[test]
    fn test_self_describing_key() {
        let mut spec = spec(None);
        spec.self_key = Some(Arc::new(|v: &Value| Ok(v["shard"].clone())));

        let key = resolve_partition_key("S.m", &spec, &[json!({"shard": 7})]).unwrap();
        assert_eq!(key.value(), &json!(7));

        let err = resolve_partition_key("S.m", &spec, &[json!({})]).unwrap_err();
        assert_eq!(
            err,
            CallerError::NullSelfDescribingKey {
                method: "S.m".to_string(),
                type_name: "Account".to_string()
            }
        );
    }
}
