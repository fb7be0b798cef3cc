//! Invocation dispatcher
//!
//! Drives one proxied call to completion:
//!
//! ```text
//!            ┌──────────────── RoutingStale (sleep backoff) ───────────────┐
//!            ▼                                                             │
//!       Preparing ──► Submitted ──┬──► Success                             │
//!   (key / member)   (await up to ├──► RemoteFailure (frames stitched)     │
//!                     timeout)    ├──► Timeout (optional cancel)           │
//!                                 └────────────────────────────────────────┘
//! ```
//!
//! Only stale routes are retried. Remote failures and timeouts go straight
//! back to the caller, as do caller errors raised while preparing.

use meridian_types::{CallDescriptor, ExecutionSubstrate, Frame, Member, SubstrateError, Value};
use std::panic::Location;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::RetryPolicy;
use crate::error::{CallerError, DispatchError, Result};
use crate::resolver::resolve_partition_key;
use crate::route::{DispatchMode, MethodRoute};

/// Where the caller invoked the proxy; becomes the local half of remote traces
#[derive(Debug, Clone, Copy)]
pub struct CallSite {
    location: &'static Location<'static>,
}

impl CallSite {
    #[track_caller]
    pub fn capture() -> Self {
        Self {
            location: Location::caller(),
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Local frames appended after the separator of a remote error
    pub fn frames(&self, qualified_method: &str) -> Vec<Frame> {
        vec![
            Frame::new(format!("{} [proxy]", qualified_method)),
            Frame::from_location("caller", self.location),
        ]
    }
}

pub struct Dispatcher {
    substrate: Arc<dyn ExecutionSubstrate>,
    slice_name: String,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(
        substrate: Arc<dyn ExecutionSubstrate>,
        slice_name: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            substrate,
            slice_name: slice_name.into(),
            retry,
        }
    }

    pub fn slice_name(&self) -> &str {
        &self.slice_name
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Run `route` of `service_name` with `args` until it settles.
    pub async fn invoke(
        &self,
        service_name: &str,
        route: &MethodRoute,
        args: Vec<Value>,
        site: CallSite,
    ) -> Result<Value> {
        let qualified = format!("{}.{}", service_name, route.method_name());

        if args.len() != route.signature.arity() {
            return Err(CallerError::ArgumentCount {
                method: qualified,
                expected: route.signature.arity(),
                actual: args.len(),
            }
            .into());
        }

        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let (call, target) = self.prepare(service_name, &qualified, route, args.clone())?;
            debug!(
                service = %service_name,
                method = %route.signature,
                attempt,
                member = ?target.as_ref().map(|m| m.id.to_string()),
                key = ?call.partition_key.as_ref().map(|k| k.fingerprint()),
                "Submitting remote call"
            );

            let mut pending = self.substrate.submit(call, target);

            match tokio::time::timeout(route.timeout, &mut pending).await {
                Ok(Ok(value)) => {
                    debug!(
                        service = %service_name,
                        method = %route.signature,
                        attempt,
                        elapsed_us = started.elapsed().as_micros() as u64,
                        "Remote call completed"
                    );
                    return Ok(value);
                }
                Ok(Err(SubstrateError::Remote(remote))) => {
                    debug!(
                        service = %service_name,
                        method = %route.signature,
                        kind = %remote.kind,
                        elapsed_us = started.elapsed().as_micros() as u64,
                        "Remote call failed"
                    );
                    return Err(DispatchError::Remote(
                        remote.stitch_local(site.frames(&qualified)),
                    ));
                }
                Ok(Err(stale)) => {
                    if !self.retry.allows_another(attempt) {
                        warn!(
                            service = %service_name,
                            method = %route.signature,
                            attempts = attempt,
                            reason = %stale,
                            "Giving up on stale route"
                        );
                        return Err(DispatchError::RetriesExhausted {
                            method: qualified,
                            attempts: attempt,
                        });
                    }
                    info!(
                        service = %service_name,
                        method = %route.signature,
                        attempt,
                        reason = %stale,
                        backoff_ms = self.retry.backoff.as_millis() as u64,
                        "Stale route, re-routing call"
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                }
                Err(_elapsed) => {
                    let cancelled = route.interrupt_on_timeout && pending.cancel();
                    warn!(
                        service = %service_name,
                        method = %route.signature,
                        attempt,
                        timeout_ms = route.timeout.as_millis() as u64,
                        cancelled,
                        "Remote call timed out"
                    );
                    return Err(DispatchError::Timeout {
                        method: qualified,
                        timeout: route.timeout,
                    });
                }
            }
        }
    }

    /// Build the descriptor of one attempt and pick its target
    fn prepare(
        &self,
        service_name: &str,
        qualified: &str,
        route: &MethodRoute,
        args: Vec<Value>,
    ) -> Result<(CallDescriptor, Option<Member>)> {
        let call = CallDescriptor::new(
            self.slice_name.as_str(),
            service_name,
            route.method_name(),
            route.arg_types().to_vec(),
            args,
        );

        match &route.mode {
            DispatchMode::Partitioned(spec) => {
                let key = resolve_partition_key(qualified, spec, &call.args)?;
                Ok((call.with_partition_key(key), None))
            }
            DispatchMode::LoadBalanced(policy) => {
                let member = policy
                    .next_member(&call)
                    .map_err(|source| DispatchError::NoTarget {
                        method: qualified.to_string(),
                        source,
                    })?;
                Ok((call, Some(member)))
            }
        }
    }
}
