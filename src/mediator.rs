//! Routing and lifecycle supervision for one mediated conversation.
//!
//! The mediator owns the endpoint list, initializes every endpoint in order,
//! runs two flows per endpoint plus the routing loop, and guarantees that
//! every endpoint is closed exactly once however the session ends.

use crate::config::SessionConfig;
use crate::defaults;
use crate::endpoint::StreamEndpoint;
use crate::error::{FlowKind, Result, VoxbridgeError};
use crate::event::StreamEvent;
use crate::signal::StopSignal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{Id, JoinSet};
use tracing::{debug, info, warn};

/// Endpoint name and flow kind behind a supervised task id, for attributing
/// failures and panics.
struct FlowTag {
    endpoint: String,
    kind: FlowKind,
}

/// Routes events between a fixed set of endpoints for one conversation.
///
/// `run` consumes the mediator: one instance mediates exactly one session.
pub struct StreamMediator {
    endpoints: Vec<Arc<dyn StreamEndpoint>>,
    stop: StopSignal,
    grace_period: Duration,
}

impl StreamMediator {
    /// Creates a mediator over the given endpoints. Routing fan-out,
    /// initialization, and teardown all follow list order.
    pub fn new(endpoints: Vec<Arc<dyn StreamEndpoint>>) -> Self {
        Self {
            endpoints,
            stop: StopSignal::new(),
            grace_period: defaults::teardown_grace(),
        }
    }

    /// Overrides the drain window between stop and forced teardown.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Applies session settings from configuration.
    pub fn with_session_config(self, config: &SessionConfig) -> Self {
        self.with_grace_period(config.grace_period())
    }

    /// A handle the host process can set to cancel the session externally.
    /// Cancellation tears down exactly like a normal end-of-session.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Runs the session to completion.
    ///
    /// Returns `Ok(())` when an `end_session` event was observed or the
    /// session was cancelled externally, or the first `FlowFailure`/
    /// `Initialization` error otherwise. Either way every endpoint has been
    /// closed by the time this returns; the caller never calls `close`.
    pub async fn run(self) -> Result<()> {
        let outcome = self.run_session().await;
        // Teardown is unconditional: no path leaves an endpoint unclosed.
        self.teardown().await;
        outcome
    }

    async fn run_session(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            debug!("no endpoints supplied, nothing to mediate");
            return Ok(());
        }

        // Initialization phase: sequential, in list order. The first failure
        // aborts before any flow starts.
        for endpoint in &self.endpoints {
            info!(endpoint = endpoint.name(), "initializing endpoint");
            if let Err(error) = endpoint.initialize().await {
                return Err(VoxbridgeError::Initialization {
                    endpoint: endpoint.name().to_string(),
                    message: error.to_string(),
                });
            }
        }

        // Flow phase: two supervised tasks per endpoint.
        let mut flows: JoinSet<Result<()>> = JoinSet::new();
        let mut tags: HashMap<Id, FlowTag> = HashMap::new();
        for endpoint in &self.endpoints {
            let handle = flows.spawn(delivery_flow(endpoint.clone()));
            tags.insert(
                handle.id(),
                FlowTag {
                    endpoint: endpoint.name().to_string(),
                    kind: FlowKind::Delivery,
                },
            );
            let handle = flows.spawn(production_flow(endpoint.clone()));
            tags.insert(
                handle.id(),
                FlowTag {
                    endpoint: endpoint.name().to_string(),
                    kind: FlowKind::Production,
                },
            );
        }

        let outcome = self.route(&mut flows, &tags).await;

        // Stop phase: cooperative first, forced once the grace period runs
        // out. Teardown proceeds unconditionally afterwards.
        self.signal_stop_all();
        if tokio::time::timeout(self.grace_period, drain_flows(&mut flows, &tags))
            .await
            .is_err()
        {
            warn!("grace period elapsed with flows still running, aborting them");
            flows.abort_all();
            drain_flows(&mut flows, &tags).await;
        }
        outcome
    }

    /// The routing loop: merge every inbound queue first-ready-wins, fan
    /// each event out, and watch the supervised flows and the external stop
    /// signal.
    async fn route(
        &self,
        flows: &mut JoinSet<Result<()>>,
        tags: &HashMap<Id, FlowTag>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                event = next_ready(&self.endpoints) => {
                    if event.end_session {
                        info!(
                            originator = %event.originator,
                            "end-of-session signal observed"
                        );
                        return Ok(());
                    }
                    // Fan out in list order; self-echo suppression happens
                    // inside accept.
                    for endpoint in &self.endpoints {
                        endpoint.channels().accept(&event).await;
                    }
                }
                Some(joined) = flows.join_next_with_id() => {
                    match joined {
                        Ok((id, Ok(()))) => {
                            // A flow that drained its source and returned is
                            // not a failure.
                            if let Some(tag) = tags.get(&id) {
                                debug!(
                                    endpoint = %tag.endpoint,
                                    flow = %tag.kind,
                                    "flow completed"
                                );
                            }
                        }
                        Ok((_id, Err(error))) => return Err(error),
                        Err(join_error) => {
                            return Err(join_failure(tags.get(&join_error.id()), &join_error));
                        }
                    }
                }
                _ = self.stop.wait() => {
                    info!("external cancellation requested");
                    return Ok(());
                }
            }
        }
    }

    fn signal_stop_all(&self) {
        for endpoint in &self.endpoints {
            debug!(endpoint = endpoint.name(), "signaling stop");
            endpoint.channels().request_stop();
        }
        self.stop.set();
    }

    /// Closes every endpoint exactly once, in list order, swallowing
    /// individual failures so one endpoint cannot block another's teardown.
    async fn teardown(&self) {
        for endpoint in &self.endpoints {
            debug!(endpoint = endpoint.name(), "closing endpoint");
            if let Err(error) = endpoint.close().await {
                warn!(
                    endpoint = endpoint.name(),
                    %error,
                    "failed to close endpoint"
                );
            }
        }
    }
}

/// First-ready-wins merge across every endpoint's inbound queue. No fixed
/// priority: whichever queue has an event ready first supplies it. Dropped
/// dequeue futures leave their queues untouched.
async fn next_ready(endpoints: &[Arc<dyn StreamEndpoint>]) -> Arc<StreamEvent> {
    let dequeues: Vec<_> = endpoints
        .iter()
        .map(|endpoint| Box::pin(endpoint.channels().dequeue_inbound()))
        .collect();
    let (event, _index, _rest) = futures_util::future::select_all(dequeues).await;
    event
}

/// Repeatedly dequeues routed events and hands them to the endpoint until
/// the stop signal fires.
async fn delivery_flow(endpoint: Arc<dyn StreamEndpoint>) -> Result<()> {
    while let Some(event) = endpoint.channels().dequeue_outbound().await {
        if let Err(error) = endpoint.deliver(event).await {
            return Err(flow_failure(endpoint.name(), FlowKind::Delivery, &error));
        }
    }
    Ok(())
}

/// Runs the endpoint's production flow, attributing any failure.
async fn production_flow(endpoint: Arc<dyn StreamEndpoint>) -> Result<()> {
    endpoint
        .produce()
        .await
        .map_err(|error| flow_failure(endpoint.name(), FlowKind::Production, &error))
}

fn flow_failure(endpoint: &str, kind: FlowKind, error: &VoxbridgeError) -> VoxbridgeError {
    VoxbridgeError::FlowFailure {
        endpoint: endpoint.to_string(),
        flow: kind,
        message: error.to_string(),
    }
}

fn join_failure(tag: Option<&FlowTag>, join_error: &tokio::task::JoinError) -> VoxbridgeError {
    let (endpoint, kind) = match tag {
        Some(tag) => (tag.endpoint.clone(), tag.kind),
        None => ("unknown".to_string(), FlowKind::Production),
    };
    VoxbridgeError::FlowFailure {
        endpoint,
        flow: kind,
        message: if join_error.is_panic() {
            "flow panicked".to_string()
        } else {
            join_error.to_string()
        },
    }
}

/// Joins remaining flows, logging late failures instead of propagating them.
async fn drain_flows(flows: &mut JoinSet<Result<()>>, tags: &HashMap<Id, FlowTag>) {
    while let Some(joined) = flows.join_next_with_id().await {
        match joined {
            Ok((_id, Ok(()))) => {}
            Ok((id, Err(error))) => {
                let endpoint = tags.get(&id).map(|t| t.endpoint.as_str()).unwrap_or("?");
                warn!(endpoint, %error, "flow failed during shutdown");
            }
            Err(join_error) if join_error.is_cancelled() => {}
            Err(join_error) => {
                let endpoint = tags
                    .get(&join_error.id())
                    .map(|t| t.endpoint.as_str())
                    .unwrap_or("?");
                warn!(endpoint, "flow panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::ScriptedEndpoint;
    use tokio::time::timeout;

    fn fast(mediator: StreamMediator) -> StreamMediator {
        mediator.with_grace_period(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_run_with_no_endpoints_completes() {
        let mediator = StreamMediator::new(Vec::new());
        timeout(Duration::from_secs(1), mediator.run())
            .await
            .expect("empty mediator should return promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn test_single_endpoint_end_of_source_completes_session() {
        let endpoint = Arc::new(ScriptedEndpoint::new("solo").with_end_of_source());
        let mediator = fast(StreamMediator::new(vec![endpoint.clone()]));

        timeout(Duration::from_secs(2), mediator.run())
            .await
            .expect("session should complete")
            .unwrap();
        assert_eq!(endpoint.close_count(), 1);
        assert!(endpoint.channels().is_stopping());
    }

    #[tokio::test]
    async fn test_external_stop_cancels_session() {
        let endpoint = Arc::new(ScriptedEndpoint::new("idle"));
        let mediator = fast(StreamMediator::new(vec![endpoint.clone()]));
        let stop = mediator.stop_signal();

        let session = tokio::spawn(mediator.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        stop.set();

        timeout(Duration::from_secs(2), session)
            .await
            .expect("cancelled session should return")
            .unwrap()
            .unwrap();
        assert_eq!(endpoint.close_count(), 1);
    }

    #[tokio::test]
    async fn test_initialization_failure_aborts_before_flows() {
        let healthy = Arc::new(ScriptedEndpoint::new("healthy"));
        let broken =
            Arc::new(ScriptedEndpoint::new("broken").with_initialize_failure("no transport"));
        let mediator = fast(StreamMediator::new(vec![healthy.clone(), broken.clone()]));

        let error = timeout(Duration::from_secs(2), mediator.run())
            .await
            .expect("failed init should return promptly")
            .unwrap_err();
        match error {
            VoxbridgeError::Initialization { endpoint, message } => {
                assert_eq!(endpoint, "broken");
                assert!(message.contains("no transport"));
            }
            other => panic!("expected Initialization error, got: {other}"),
        }
        // Both endpoints still get closed exactly once.
        assert_eq!(healthy.close_count(), 1);
        assert_eq!(broken.close_count(), 1);
        // Nothing was delivered anywhere.
        assert!(healthy.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_initialization_stops_at_first_failure() {
        let first = Arc::new(ScriptedEndpoint::new("first").with_initialize_failure("down"));
        let second = Arc::new(ScriptedEndpoint::new("second"));
        let mediator = fast(StreamMediator::new(vec![first.clone(), second.clone()]));

        let _ = mediator.run().await;
        assert_eq!(first.initialize_count(), 1);
        assert_eq!(second.initialize_count(), 0, "init is sequential and aborts");
    }
}
