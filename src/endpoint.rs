//! The capability contract every conversation participant implements.
//!
//! An endpoint is one party in the mediated conversation: a voice-AI
//! session, a telephony call leg, a local speaker/microphone pair, a
//! persistence sink. Each endpoint owns a pair of queues wired to the
//! mediator through [`EndpointChannels`] and exposes two flows: delivery
//! (routed events in, external effects out) and production (external source
//! in, events out).

use crate::config::QueueConfig;
use crate::error::{Result, VoxbridgeError};
use crate::event::StreamEvent;
use crate::queue::EventQueue;
use crate::signal::StopSignal;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of [`EndpointChannels::enqueue_inbound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Enqueue {
    /// The event was queued for the router.
    Accepted,
    /// The stop signal fired before space was available; the event was
    /// dropped and the production flow should return.
    Stopped,
}

impl Enqueue {
    pub fn is_stopped(self) -> bool {
        self == Enqueue::Stopped
    }
}

/// Queue pair and stop signal connecting one endpoint to the mediator.
///
/// The inbound queue holds events this endpoint produced, bounded so a
/// producer that outpaces the router blocks instead of growing memory. The
/// outbound queue holds events routed to this endpoint for delivery; when
/// bounded it evicts its oldest entry rather than ever blocking the router.
pub struct EndpointChannels {
    name: String,
    inbound: EventQueue,
    outbound: EventQueue,
    stop: StopSignal,
}

impl EndpointChannels {
    /// Creates channels with the default queue configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, &QueueConfig::default())
    }

    /// Creates channels with explicit queue bounds.
    pub fn with_config(name: impl Into<String>, config: &QueueConfig) -> Self {
        Self {
            name: name.into(),
            inbound: EventQueue::bounded(config.inbound_capacity),
            outbound: EventQueue::with_capacity(config.outbound_capacity),
            stop: StopSignal::new(),
        }
    }

    /// The owning endpoint's identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The endpoint's stop signal.
    pub fn stop(&self) -> &StopSignal {
        &self.stop
    }

    /// Transitions the endpoint into its stopping state.
    pub fn request_stop(&self) {
        self.stop.set();
    }

    /// True once stop has been requested.
    pub fn is_stopping(&self) -> bool {
        self.stop.is_set()
    }

    /// Queues an event this endpoint produced, waiting for space when the
    /// inbound queue is full. The wait races the stop signal.
    pub async fn enqueue_inbound(&self, event: StreamEvent) -> Enqueue {
        debug_assert_eq!(
            event.originator, self.name,
            "production flows must stamp their own endpoint id"
        );
        match self.stop.race(self.inbound.push_wait(Arc::new(event))).await {
            Some(_seq) => Enqueue::Accepted,
            None => Enqueue::Stopped,
        }
    }

    /// Next event this endpoint produced, in production order. Normally
    /// driven by the mediator's routing loop; cancel-safe.
    pub async fn dequeue_inbound(&self) -> Arc<StreamEvent> {
        self.inbound.pop().await.1
    }

    /// Queues a routed event for delivery unless this endpoint originated
    /// it. Returns false when the event was suppressed as a self-echo.
    pub async fn accept(&self, event: &Arc<StreamEvent>) -> bool {
        if event.originator == self.name {
            return false;
        }
        if self.outbound.push_evict(event.clone()).await.is_some() {
            warn!(
                endpoint = %self.name,
                "outbound queue full, evicted oldest undelivered event"
            );
        }
        true
    }

    /// Next event routed to this endpoint, or `None` once stop is set.
    pub async fn dequeue_outbound(&self) -> Option<Arc<StreamEvent>> {
        self.stop
            .race(self.outbound.pop())
            .await
            .map(|(_seq, event)| event)
    }

    /// Converts a normal end-of-source into the uniform shutdown path by
    /// synthesizing an `end_session` event on the inbound queue.
    pub async fn signal_end_of_source(&self) {
        if self.stop.is_set() {
            return;
        }
        debug!(endpoint = %self.name, "source ended, synthesizing end-of-session event");
        let _ = self
            .stop
            .race(
                self.inbound
                    .push_wait(Arc::new(StreamEvent::end_session(&self.name))),
            )
            .await;
    }

    /// Sequence of the most recently produced event; a barge-in handler
    /// records this as its interruption marker.
    pub async fn last_produced_seq(&self) -> u64 {
        self.inbound.latest_seq().await
    }

    /// Discards produced-but-not-yet-routed events at or below `marker`.
    /// Returns the number discarded.
    pub async fn discard_inbound_through(&self, marker: u64) -> usize {
        let discarded = self.inbound.discard_through(marker).await;
        if discarded > 0 {
            debug!(
                endpoint = %self.name,
                discarded, marker, "discarded stale buffered events after interruption"
            );
        }
        discarded
    }

    /// Flush-all interruption handling for sources without a usable
    /// sequence. Returns the number discarded.
    pub async fn flush_inbound(&self) -> usize {
        let discarded = self.inbound.clear().await;
        if discarded > 0 {
            debug!(
                endpoint = %self.name,
                discarded, "flushed buffered events after interruption"
            );
        }
        discarded
    }

    /// Number of produced events awaiting the router.
    pub async fn inbound_len(&self) -> usize {
        self.inbound.len().await
    }

    /// Number of routed events awaiting delivery.
    pub async fn outbound_len(&self) -> usize {
        self.outbound.len().await
    }
}

/// One participant in the mediated conversation.
///
/// The mediator drives the lifecycle: `initialize` once before any flow,
/// then `deliver` per routed event and `produce` as a long-running flow,
/// then `close` exactly once however the session ended.
#[async_trait]
pub trait StreamEndpoint: Send + Sync {
    /// Identifier stamped on every event this endpoint produces.
    fn name(&self) -> &str;

    /// The queue pair and stop signal wiring this endpoint to the mediator.
    fn channels(&self) -> &EndpointChannels;

    /// One-time setup, possibly network-bound. A failure aborts the whole
    /// session before any flow starts.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Converts one routed event into an externally visible effect. Called
    /// by the mediator's delivery loop for each event dequeued from the
    /// outbound queue.
    async fn deliver(&self, event: Arc<StreamEvent>) -> Result<()>;

    /// The production flow: reads the endpoint's external source and calls
    /// [`EndpointChannels::enqueue_inbound`] until stop or end-of-source.
    ///
    /// A source that closes normally is not a failure: implementations call
    /// [`EndpointChannels::signal_end_of_source`] and return `Ok(())` so the
    /// routing loop shuts the session down through the normal signaling
    /// path.
    async fn produce(&self) -> Result<()>;

    /// Idempotent teardown. Invoked exactly once per session; errors are
    /// logged by the mediator, never propagated past teardown.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Scripted endpoint for exercising mediator behavior in tests.
///
/// Produces a fixed list of events, records everything delivered to it, and
/// can be configured to fail at any lifecycle stage.
pub struct ScriptedEndpoint {
    channels: EndpointChannels,
    script: Vec<StreamEvent>,
    pacing: Option<Duration>,
    end_of_source: bool,
    initialize_failure: Option<String>,
    production_failure: Option<String>,
    delivery_failure: Option<String>,
    close_failure: Option<String>,
    delivered: std::sync::Mutex<Vec<Arc<StreamEvent>>>,
    initialize_count: AtomicUsize,
    close_count: AtomicUsize,
}

impl ScriptedEndpoint {
    /// Creates a scripted endpoint with an empty script.
    pub fn new(name: &str) -> Self {
        Self {
            channels: EndpointChannels::new(name),
            script: Vec::new(),
            pacing: None,
            end_of_source: false,
            initialize_failure: None,
            production_failure: None,
            delivery_failure: None,
            close_failure: None,
            delivered: std::sync::Mutex::new(Vec::new()),
            initialize_count: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
        }
    }

    /// Creates a scripted endpoint with explicit queue bounds.
    pub fn with_queue_config(name: &str, config: &QueueConfig) -> Self {
        Self {
            channels: EndpointChannels::with_config(name, config),
            ..Self::new(name)
        }
    }

    /// Events the production flow will emit, in order. Originators are
    /// restamped with this endpoint's name.
    pub fn with_script(mut self, events: Vec<StreamEvent>) -> Self {
        let name = self.channels.name().to_string();
        self.script = events
            .into_iter()
            .map(|mut event| {
                event.originator = name.clone();
                event
            })
            .collect();
        self
    }

    /// Delay inserted before each scripted event.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = Some(pacing);
        self
    }

    /// After the script, behave like a source that closed normally.
    pub fn with_end_of_source(mut self) -> Self {
        self.end_of_source = true;
        self
    }

    /// Fail `initialize` with the given message.
    pub fn with_initialize_failure(mut self, message: &str) -> Self {
        self.initialize_failure = Some(message.to_string());
        self
    }

    /// Fail the production flow with the given message after the script.
    pub fn with_production_failure(mut self, message: &str) -> Self {
        self.production_failure = Some(message.to_string());
        self
    }

    /// Fail every `deliver` call with the given message.
    pub fn with_delivery_failure(mut self, message: &str) -> Self {
        self.delivery_failure = Some(message.to_string());
        self
    }

    /// Fail `close` with the given message (it is still counted).
    pub fn with_close_failure(mut self, message: &str) -> Self {
        self.close_failure = Some(message.to_string());
        self
    }

    /// Events delivered to this endpoint so far, in delivery order.
    pub fn delivered(&self) -> Vec<Arc<StreamEvent>> {
        self.delivered
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Number of times `initialize` was invoked.
    pub fn initialize_count(&self) -> usize {
        self.initialize_count.load(Ordering::SeqCst)
    }

    /// Number of times `close` was invoked.
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamEndpoint for ScriptedEndpoint {
    fn name(&self) -> &str {
        self.channels.name()
    }

    fn channels(&self) -> &EndpointChannels {
        &self.channels
    }

    async fn initialize(&self) -> Result<()> {
        self.initialize_count.fetch_add(1, Ordering::SeqCst);
        match &self.initialize_failure {
            Some(message) => Err(VoxbridgeError::Other(message.clone())),
            None => Ok(()),
        }
    }

    async fn deliver(&self, event: Arc<StreamEvent>) -> Result<()> {
        if let Some(message) = &self.delivery_failure {
            return Err(VoxbridgeError::Other(message.clone()));
        }
        self.delivered
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event);
        Ok(())
    }

    async fn produce(&self) -> Result<()> {
        for event in self.script.clone() {
            if let Some(pacing) = self.pacing
                && self
                    .channels
                    .stop()
                    .race(tokio::time::sleep(pacing))
                    .await
                    .is_none()
            {
                return Ok(());
            }
            if self.channels.enqueue_inbound(event).await.is_stopped() {
                return Ok(());
            }
        }
        if let Some(message) = &self.production_failure {
            return Err(VoxbridgeError::Other(message.clone()));
        }
        if self.end_of_source {
            self.channels.signal_end_of_source().await;
            return Ok(());
        }
        // Idle source: stay alive until the session stops.
        self.channels.stop().wait().await;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        match &self.close_failure {
            Some(message) => Err(VoxbridgeError::Other(message.clone())),
            None => Ok(()),
        }
    }
}
