//! Pending operation envelopes
//!
//! Every connect or disconnect request handed to a bearer is wrapped in a
//! [`PendingOperationEnvelope`]. The bearer stamps it with its generation tag
//! when it accepts the request and eventually completes it exactly once
//! through the caller's [`CompletionHandle`].

use std::fmt;
use std::time::Duration;

use telsim_common::ApnType;
use telsim_ril::BearerId;
use tokio::sync::mpsc;
use tracing::trace;

use super::fail_cause::FailCause;

/// Kind of operation carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Connect,
    Disconnect,
    DisconnectAll,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Connect => write!(f, "CONNECT"),
            OperationKind::Disconnect => write!(f, "DISCONNECT"),
            OperationKind::DisconnectAll => write!(f, "DISCONNECT_ALL"),
        }
    }
}

/// Result of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Connected,
    ConnectFailed {
        cause: FailCause,
        /// Radio's retry hint, if it gave one
        suggested_retry: Option<Duration>,
    },
    Disconnected,
}

impl CompletionOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, CompletionOutcome::ConnectFailed { .. })
    }
}

/// Completion delivered to the caller of a bearer operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerCompletion {
    pub bearer: BearerId,
    pub apn_type: ApnType,
    pub kind: OperationKind,
    /// Bearer generation the operation ran under
    pub tag: u32,
    pub reason: String,
    pub outcome: CompletionOutcome,
}

/// Where completions are sent.
#[derive(Debug, Clone)]
pub struct CompletionHandle {
    tx: mpsc::UnboundedSender<BearerCompletion>,
}

impl CompletionHandle {
    pub fn new(tx: mpsc::UnboundedSender<BearerCompletion>) -> Self {
        Self { tx }
    }

    /// Creates a handle together with the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BearerCompletion>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn complete(&self, completion: BearerCompletion) {
        if self.tx.send(completion).is_err() {
            trace!("Completion receiver dropped");
        }
    }
}

/// A caller request with its bookkeeping.
#[derive(Debug, Clone)]
pub struct PendingOperationEnvelope {
    /// Bearer tag when the request was accepted
    pub tag: u32,
    pub kind: OperationKind,
    pub apn_type: ApnType,
    pub reason: String,
    reply: CompletionHandle,
}

impl PendingOperationEnvelope {
    pub fn new(
        kind: OperationKind,
        apn_type: ApnType,
        reason: impl Into<String>,
        reply: CompletionHandle,
    ) -> Self {
        Self {
            tag: 0,
            kind,
            apn_type,
            reason: reason.into(),
            reply,
        }
    }

    pub fn connect(apn_type: ApnType, reason: impl Into<String>, reply: CompletionHandle) -> Self {
        Self::new(OperationKind::Connect, apn_type, reason, reply)
    }

    pub fn disconnect(
        apn_type: ApnType,
        reason: impl Into<String>,
        reply: CompletionHandle,
    ) -> Self {
        Self::new(OperationKind::Disconnect, apn_type, reason, reply)
    }

    pub fn disconnect_all(
        apn_type: ApnType,
        reason: impl Into<String>,
        reply: CompletionHandle,
    ) -> Self {
        Self::new(OperationKind::DisconnectAll, apn_type, reason, reply)
    }

    /// Consumes the envelope, delivering the outcome to the caller.
    pub fn complete(self, bearer: BearerId, outcome: CompletionOutcome) {
        let completion = BearerCompletion {
            bearer,
            apn_type: self.apn_type,
            kind: self.kind,
            tag: self.tag,
            reason: self.reason,
            outcome,
        };
        self.reply.complete(completion);
    }
}
