//! Radio command channel
//!
//! State machines never talk to the radio directly: they receive an
//! `Arc<dyn RadioCommandChannel>` at construction and send fire-and-forget
//! requests through it. Responses come back asynchronously as
//! [`RilMessage::Response`] carrying the request's token.

use std::sync::{Arc, Mutex};

use telsim_common::{log_ril_message, Direction, RadioState};
use tokio::sync::{mpsc, watch};
use tracing::warn;

use crate::protocol::{RequestToken, RilMessage, RilRequest};

/// Static capabilities of the radio behind a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioCapabilities {
    /// Failed setup responses embed the failure cause; when false the phone
    /// has to ask for the last failure cause in a separate request.
    pub inline_fail_cause: bool,
}

impl Default for RadioCapabilities {
    fn default() -> Self {
        Self {
            inline_fail_cause: true,
        }
    }
}

/// Outbound half of the radio interface layer.
pub trait RadioCommandChannel: Send + Sync {
    /// Queues a request. Never blocks; the response arrives later.
    fn send(&self, token: RequestToken, request: RilRequest);

    fn capabilities(&self) -> RadioCapabilities;

    /// Last radio power state reported by the radio.
    fn radio_state(&self) -> RadioState;

    fn is_radio_on(&self) -> bool {
        self.radio_state().is_on()
    }
}

/// A request together with its completion token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RilCommand {
    pub token: RequestToken,
    pub request: RilRequest,
}

/// Channel-backed client used by the phone tasks.
#[derive(Debug, Clone)]
pub struct RilClient {
    tx: mpsc::UnboundedSender<RilCommand>,
    radio_state: watch::Receiver<RadioState>,
    capabilities: RadioCapabilities,
}

impl RilClient {
    pub fn new(
        tx: mpsc::UnboundedSender<RilCommand>,
        radio_state: watch::Receiver<RadioState>,
        capabilities: RadioCapabilities,
    ) -> Self {
        Self {
            tx,
            radio_state,
            capabilities,
        }
    }
}

impl RadioCommandChannel for RilClient {
    fn send(&self, token: RequestToken, request: RilRequest) {
        log_ril_message(Direction::Tx, request.name(), &token.to_string());
        if self.tx.send(RilCommand { token, request }).is_err() {
            warn!("Radio channel closed, dropping request for {}", token);
        }
    }

    fn capabilities(&self) -> RadioCapabilities {
        self.capabilities
    }

    fn radio_state(&self) -> RadioState {
        *self.radio_state.borrow()
    }
}

/// In-memory channel that records every request instead of sending it.
///
/// Used to drive state machines step by step: the caller inspects what was
/// sent and feeds responses back by hand.
#[derive(Debug)]
pub struct RecordingRadio {
    sent: Mutex<Vec<RilCommand>>,
    state: Mutex<RadioState>,
    capabilities: RadioCapabilities,
}

impl RecordingRadio {
    pub fn new(capabilities: RadioCapabilities) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            state: Mutex::new(RadioState::On),
            capabilities,
        })
    }

    pub fn set_radio_state(&self, state: RadioState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }

    /// Returns a copy of all requests sent so far.
    pub fn sent(&self) -> Vec<RilCommand> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Removes and returns all requests sent so far.
    pub fn take(&self) -> Vec<RilCommand> {
        self.sent
            .lock()
            .map(|mut s| std::mem::take(&mut *s))
            .unwrap_or_default()
    }

    /// Number of sent requests matching the predicate.
    pub fn count(&self, pred: impl Fn(&RilRequest) -> bool) -> usize {
        self.sent().iter().filter(|c| pred(&c.request)).count()
    }

    /// Token of the most recent request matching the predicate.
    pub fn last_token(&self, pred: impl Fn(&RilRequest) -> bool) -> Option<RequestToken> {
        self.sent()
            .iter()
            .rev()
            .find(|c| pred(&c.request))
            .map(|c| c.token)
    }
}

impl RadioCommandChannel for RecordingRadio {
    fn send(&self, token: RequestToken, request: RilRequest) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(RilCommand { token, request });
        }
    }

    fn capabilities(&self) -> RadioCapabilities {
        self.capabilities
    }

    fn radio_state(&self) -> RadioState {
        self.state.lock().map(|s| *s).unwrap_or_default()
    }
}

/// Sender half used by a radio implementation to reach the phone.
pub type RilMessageSender = mpsc::UnboundedSender<RilMessage>;
