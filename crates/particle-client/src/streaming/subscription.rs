//! Subscription implementation

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use super::parser::LineParser;
use super::types::{DeliveryCounters, DeliveryError, DeliveryStats, SubscriptionEnd};

/// Errors buffered for the handle before new ones are dropped
const ERROR_CHANNEL_CAPACITY: usize = 64;

/// Parsed events buffered between the reader and the handler thread
const EVENT_QUEUE_CAPACITY: usize = 256;

type ParsedEvent = std::result::Result<Value, DeliveryError>;

/// An active event subscription
///
/// The connection is read on a background tokio task. The handler runs on a
/// dedicated blocking thread, once per event, in arrival order, so a slow or
/// blocking handler never holds up the caller's runtime.
///
/// # Lifecycle
///
/// - Created via `ParticleSdk::subscribe()`
/// - Dropping the handle detaches the task; delivery continues until the
///   server closes the stream or the runtime shuts down
/// - `cancel()` stops delivery; `closed()` waits for the task to finish
///
/// # Example
///
/// ```ignore
/// let sub = sdk.subscribe("temperature", |event| println!("{event}")).await?;
/// // ...
/// sub.cancel();
/// let end = sub.closed().await;
/// ```
pub struct SubscriptionHandle {
    id: Uuid,
    event_name: String,
    cancel: Arc<CancelSignal>,
    counters: Arc<DeliveryCounters>,
    errors: Option<mpsc::Receiver<DeliveryError>>,
    /// `None` for inert handles
    task: Option<JoinHandle<SubscriptionEnd>>,
}

impl SubscriptionHandle {
    /// Start delivering events from an already-open byte stream
    pub(crate) fn spawn<S, F>(event_name: &str, byte_stream: S, handler: F) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
        F: FnMut(Value) + Send + 'static,
    {
        let id = Uuid::new_v4();
        let cancel = Arc::new(CancelSignal::default());
        let counters = Arc::new(DeliveryCounters::default());
        let (errors_tx, errors_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);

        let ctx = DeliveryContext {
            cancel: cancel.clone(),
            counters: counters.clone(),
            errors: errors_tx,
        };

        let span = info_span!("subscription", subscription_id = %id, event = %event_name);
        let task = tokio::spawn(deliver(byte_stream, handler, ctx).instrument(span));

        info!(subscription_id = %id, event = %event_name, "Event subscription started");

        Self {
            id,
            event_name: event_name.to_string(),
            cancel,
            counters,
            errors: Some(errors_rx),
            task: Some(task),
        }
    }

    /// A handle with no connection behind it
    pub(crate) fn inert(event_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_name: event_name.to_string(),
            cancel: Arc::new(CancelSignal::default()),
            counters: Arc::new(DeliveryCounters::default()),
            errors: None,
            task: None,
        }
    }

    /// Get the subscription ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name of the subscribed event
    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    /// Whether a connection and delivery task back this handle
    pub fn is_live(&self) -> bool {
        self.task.is_some()
    }

    /// Whether delivery has ended, including the last handler call
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Counters for this subscription so far
    pub fn stats(&self) -> DeliveryStats {
        self.counters.snapshot()
    }

    /// Take the receiving side of the error channel
    ///
    /// Malformed lines and handler panics are reported here. Returns `None`
    /// on inert handles and after the first call. If nobody drains the
    /// channel, errors beyond its capacity are only logged.
    pub fn take_errors(&mut self) -> Option<mpsc::Receiver<DeliveryError>> {
        self.errors.take()
    }

    /// Ask the delivery task to stop
    ///
    /// Takes effect before the next read and before the next handler call;
    /// an event already being handled finishes first.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A cloneable way to cancel this subscription from elsewhere
    ///
    /// Useful once the handle itself has been moved into `closed()`.
    pub fn canceller(&self) -> SubscriptionCanceller {
        SubscriptionCanceller(self.cancel.clone())
    }

    /// Wait for delivery to finish
    pub async fn closed(mut self) -> SubscriptionEnd {
        match self.task.take() {
            None => SubscriptionEnd::Inert,
            Some(task) => match task.await {
                Ok(end) => end,
                Err(e) => SubscriptionEnd::Aborted(e.to_string()),
            },
        }
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("event_name", &self.event_name)
            .field("live", &self.is_live())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Cancels the subscription it was obtained from
#[derive(Debug, Clone)]
pub struct SubscriptionCanceller(Arc<CancelSignal>);

impl SubscriptionCanceller {
    pub fn cancel(&self) {
        self.0.cancel();
    }
}

/// Wakes the reader and is polled by the handler thread between events
#[derive(Debug, Default)]
struct CancelSignal {
    requested: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    fn cancel(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// State shared between a handle and its handler thread
struct DeliveryContext {
    cancel: Arc<CancelSignal>,
    counters: Arc<DeliveryCounters>,
    errors: mpsc::Sender<DeliveryError>,
}

impl DeliveryContext {
    fn dispatch<F>(&self, event: ParsedEvent, handler: &mut F)
    where
        F: FnMut(Value),
    {
        match event {
            Ok(value) => {
                self.counters.record_delivered();
                if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| handler(value))) {
                    self.counters.record_handler_failure();
                    let message = panic_message(panic.as_ref());
                    error!(%message, "Event handler panicked; continuing with next event");
                    self.report(DeliveryError::HandlerPanicked { message });
                }
            }
            Err(e) => {
                self.counters.record_malformed();
                warn!(error = %e, "Skipping malformed event");
                self.report(e);
            }
        }
    }

    fn report(&self, error: DeliveryError) {
        if let Err(mpsc::error::TrySendError::Full(dropped)) = self.errors.try_send(error) {
            debug!(error = %dropped, "Error channel full, dropping report");
        }
    }
}

/// Run the reader here and the handler on a blocking thread until both stop
async fn deliver<S, F>(byte_stream: S, handler: F, ctx: DeliveryContext) -> SubscriptionEnd
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>>,
    F: FnMut(Value) + Send + 'static,
{
    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let cancel = ctx.cancel.clone();
    let counters = ctx.counters.clone();

    let span = Span::current();
    let dispatcher = tokio::task::spawn_blocking(move || {
        span.in_scope(|| run_handler(events_rx, handler, &ctx))
    });

    let end = read_events(byte_stream, events_tx, &cancel).await;

    if let Err(e) = dispatcher.await {
        error!(error = %e, "Event handler thread failed");
        return SubscriptionEnd::Aborted(e.to_string());
    }

    info!(stats = ?counters.snapshot(), "Event subscription finished");
    end
}

/// Hand queued events to the handler one at a time
fn run_handler<F>(mut events: mpsc::Receiver<ParsedEvent>, mut handler: F, ctx: &DeliveryContext)
where
    F: FnMut(Value),
{
    while let Some(event) = events.blocking_recv() {
        if ctx.cancel.is_cancelled() {
            break;
        }
        ctx.dispatch(event, &mut handler);
    }
}

/// Read the stream until it ends, fails or is cancelled
///
/// Dropping `events` on return lets the handler thread drain and exit.
async fn read_events<S>(
    byte_stream: S,
    events: mpsc::Sender<ParsedEvent>,
    cancel: &CancelSignal,
) -> SubscriptionEnd
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>>,
{
    let mut byte_stream = std::pin::pin!(byte_stream);
    let mut parser = LineParser::new();

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.notify.notified() => {
                info!("Subscription cancelled");
                return SubscriptionEnd::Cancelled;
            }
            chunk = byte_stream.next() => chunk,
        };

        let batch = match chunk {
            Some(Ok(bytes)) => parser.feed(&bytes),
            Some(Err(e)) => {
                warn!(error = %e, "Event stream failed");
                return SubscriptionEnd::Failed(DeliveryError::Connection(e));
            }
            None => {
                if let Some(event) = parser.finish() {
                    // Handler thread only goes away once `events` is dropped
                    let _ = events.send(event).await;
                }
                info!("Event stream closed by server");
                return SubscriptionEnd::StreamEnded;
            }
        };

        for event in batch {
            tokio::select! {
                biased;
                _ = cancel.notify.notified() => {
                    info!("Subscription cancelled");
                    return SubscriptionEnd::Cancelled;
                }
                sent = events.send(event) => {
                    if sent.is_err() {
                        return SubscriptionEnd::Aborted("event handler thread stopped".to_string());
                    }
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
