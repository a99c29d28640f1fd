//! Types for event subscriptions

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

/// Errors raised on a subscription's background delivery task
///
/// These never reach the caller of `subscribe`; they are logged and pushed to
/// the handle's error channel.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// A stream line was not valid JSON
    #[error("Malformed event: {source} (line: {line})")]
    MalformedEvent {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    /// The handler panicked while processing an event
    #[error("Event handler panicked: {message}")]
    HandlerPanicked { message: String },

    /// Reading the stream failed
    #[error("Connection error: {0}")]
    Connection(#[from] reqwest::Error),
}

impl DeliveryError {
    pub(crate) fn malformed(line: impl Into<String>, source: serde_json::Error) -> Self {
        let mut line = line.into();
        // Keep log lines bounded
        if line.len() > 100 {
            let mut end = 100;
            while !line.is_char_boundary(end) {
                end -= 1;
            }
            line.truncate(end);
            line.push_str("...");
        }
        Self::MalformedEvent { line, source }
    }
}

/// How a subscription's delivery task ended
#[derive(Debug)]
pub enum SubscriptionEnd {
    /// The server closed the stream
    StreamEnded,
    /// `cancel()` was called on the handle
    Cancelled,
    /// Reading the stream failed
    Failed(DeliveryError),
    /// The delivery task itself was aborted or panicked
    Aborted(String),
    /// No connection was ever made (emulation mode)
    Inert,
}

impl SubscriptionEnd {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Counters for one subscription
#[derive(Debug, Default)]
pub(crate) struct DeliveryCounters {
    delivered: AtomicU64,
    malformed: AtomicU64,
    handler_failures: AtomicU64,
}

impl DeliveryCounters {
    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of a subscription's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Events handed to the handler (including ones where it panicked)
    pub delivered: u64,
    /// Lines that failed to decode
    pub malformed: u64,
    /// Handler invocations that panicked
    pub handler_failures: u64,
}
