//! Bearer connection state machine
//!
//! One [`BearerConnection`] per physical bearer (PDP context / data call).
//! It accepts connect and disconnect requests from APN contexts, drives
//! setup and teardown through the radio command channel, and reports every
//! outcome through the request's completion handle.
//!
//! # States
//!
//! ```text
//!            Connect                 setup ok
//! INACTIVE ───────────▶ ACTIVATING ───────────▶ ACTIVE
//!    ▲                     │   │                  │ last Disconnect
//!    │      setup failed   │   │ bad parameters   │ or DisconnectAll
//!    ├─────────────────────┘   ▼                  ▼
//!    │        DISCONNECTING_AFTER_CREATE_ERROR  DISCONNECTING
//!    │                     │                      │
//!    └─────────────────────┴──── teardown done ───┘
//! ```
//!
//! Every entry into INACTIVE bumps the generation tag. Requests carry the
//! tag they were issued under, so a response from an earlier generation is
//! recognised and dropped. Connect and disconnect requests that arrive while
//! a radio operation is in flight are deferred and replayed, in arrival
//! order, right after the next transition.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use telsim_common::{ApnType, RadioTechnology};
use telsim_ril::{
    BearerId, DataCallResponse, DeactivateReason, RadioCommandChannel, RequestOwner,
    RequestToken, RilError, RilPayload, RilRequest, RilResponse,
};
use tracing::{debug, info, warn};

use super::apn::ApnSetting;
use super::envelope::{CompletionOutcome, PendingOperationEnvelope};
use super::fail_cause::FailCause;
use super::family::NetworkFamily;
use super::link::{LinkCapabilities, LinkProperties};
use super::reason;
use super::retry::RetryPolicy;

// ============================================================================
// States and events
// ============================================================================

/// Bearer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BearerState {
    #[default]
    Inactive,
    Activating,
    Active,
    Disconnecting,
    DisconnectingAfterCreateError,
}

impl fmt::Display for BearerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BearerState::Inactive => write!(f, "INACTIVE"),
            BearerState::Activating => write!(f, "ACTIVATING"),
            BearerState::Active => write!(f, "ACTIVE"),
            BearerState::Disconnecting => write!(f, "DISCONNECTING"),
            BearerState::DisconnectingAfterCreateError => {
                write!(f, "DISCONNECTING_AFTER_CREATE_ERROR")
            }
        }
    }
}

/// Input to the bearer state machine.
#[derive(Debug, Clone)]
pub enum BearerEvent {
    /// Attach an APN context, bringing the bearer up if needed
    Connect {
        envelope: PendingOperationEnvelope,
        apn: ApnSetting,
        rat: RadioTechnology,
        roaming: bool,
    },
    /// Detach one APN context
    Disconnect(PendingOperationEnvelope),
    /// Tear down regardless of how many contexts are attached
    DisconnectAll(PendingOperationEnvelope),
    RadioResponse(RilResponse),
    /// Data call list update for this bearer's call
    UpdateLinkProperties(DataCallResponse),
    /// Drop to INACTIVE without talking to the radio
    Reset { cause: FailCause },
}

impl BearerEvent {
    fn name(&self) -> &'static str {
        match self {
            BearerEvent::Connect { .. } => "CONNECT",
            BearerEvent::Disconnect(_) => "DISCONNECT",
            BearerEvent::DisconnectAll(_) => "DISCONNECT_ALL",
            BearerEvent::RadioResponse(_) => "RADIO_RESPONSE",
            BearerEvent::UpdateLinkProperties(_) => "UPDATE_LINK_PROPERTIES",
            BearerEvent::Reset { .. } => "RESET",
        }
    }
}

/// Something the owner of the bearer may want to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BearerNotice {
    StateChanged {
        from: BearerState,
        to: BearerState,
    },
    LinkPropertiesChanged(LinkProperties),
}

/// A radio request this bearer is waiting on.
#[derive(Debug)]
enum Outstanding {
    Setup(PendingOperationEnvelope),
    LastFailCause(PendingOperationEnvelope),
    /// `envelope` is the caller to complete; `after_error` marks cleanup of a
    /// call whose parameters were rejected, in which case the envelope is the
    /// original connect.
    Teardown {
        envelope: PendingOperationEnvelope,
        after_error: bool,
    },
}

// ============================================================================
// Bearer connection
// ============================================================================

/// State machine for one bearer.
pub struct BearerConnection {
    id: BearerId,
    state: BearerState,
    /// Generation, bumped on every entry into INACTIVE
    tag: u32,
    radio: Arc<dyn RadioCommandChannel>,
    family: Arc<dyn NetworkFamily>,
    apn: Option<ApnSetting>,
    link_properties: LinkProperties,
    link_capabilities: LinkCapabilities,
    requested_capabilities: LinkCapabilities,
    ref_count: u32,
    attached: BTreeSet<ApnType>,
    cid: Option<i32>,
    retry: RetryPolicy,
    last_fail_cause: Option<FailCause>,
    last_fail_time: Option<Instant>,
    outstanding: HashMap<u64, Outstanding>,
    next_serial: u64,
    inbox: VecDeque<BearerEvent>,
    deferred: VecDeque<BearerEvent>,
    notices: Vec<BearerNotice>,
}

impl BearerConnection {
    /// Creates a bearer in INACTIVE (tag 1).
    pub fn new(
        id: BearerId,
        radio: Arc<dyn RadioCommandChannel>,
        family: Arc<dyn NetworkFamily>,
        retry: RetryPolicy,
    ) -> Self {
        let mut bearer = Self {
            id,
            state: BearerState::Inactive,
            tag: 0,
            radio,
            family,
            apn: None,
            link_properties: LinkProperties::default(),
            link_capabilities: LinkCapabilities::default(),
            requested_capabilities: LinkCapabilities::default(),
            ref_count: 0,
            attached: BTreeSet::new(),
            cid: None,
            retry,
            last_fail_cause: None,
            last_fail_time: None,
            outstanding: HashMap::new(),
            next_serial: 0,
            inbox: VecDeque::new(),
            deferred: VecDeque::new(),
            notices: Vec::new(),
        };
        bearer.enter_inactive(Vec::new());
        bearer
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn id(&self) -> BearerId {
        self.id
    }

    pub fn state(&self) -> BearerState {
        self.state
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    pub fn attached_contexts(&self) -> &BTreeSet<ApnType> {
        &self.attached
    }

    pub fn apn_setting(&self) -> Option<&ApnSetting> {
        self.apn.as_ref()
    }

    pub fn link_properties(&self) -> &LinkProperties {
        &self.link_properties
    }

    pub fn link_capabilities(&self) -> &LinkCapabilities {
        &self.link_capabilities
    }

    pub fn cid(&self) -> Option<i32> {
        self.cid
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn retry_mut(&mut self) -> &mut RetryPolicy {
        &mut self.retry
    }

    pub fn last_fail_cause(&self) -> Option<FailCause> {
        self.last_fail_cause
    }

    pub fn last_fail_time(&self) -> Option<Instant> {
        self.last_fail_time
    }

    pub fn is_inactive(&self) -> bool {
        self.state == BearerState::Inactive
    }

    pub fn is_active(&self) -> bool {
        self.state == BearerState::Active
    }

    /// Number of radio requests this generation is waiting on.
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    /// Drains the notices produced since the last call.
    pub fn take_notices(&mut self) -> Vec<BearerNotice> {
        std::mem::take(&mut self.notices)
    }

    // ------------------------------------------------------------------------
    // Event processing
    // ------------------------------------------------------------------------

    /// Processes an event, then anything it caused to be posted or replayed.
    pub fn process(&mut self, event: BearerEvent) {
        self.inbox.push_back(event);
        while let Some(event) = self.inbox.pop_front() {
            self.dispatch(event);
        }
    }

    fn dispatch(&mut self, event: BearerEvent) {
        debug!("Bearer {} [{}] event {}", self.id, self.state, event.name());
        match self.state {
            BearerState::Inactive => self.on_inactive(event),
            BearerState::Activating => self.on_activating(event),
            BearerState::Active => self.on_active(event),
            BearerState::Disconnecting | BearerState::DisconnectingAfterCreateError => {
                self.on_disconnecting(event)
            }
        }
    }

    fn on_inactive(&mut self, event: BearerEvent) {
        match event {
            BearerEvent::Connect {
                mut envelope,
                apn,
                rat,
                roaming,
            } => {
                envelope.tag = self.tag;
                self.ref_count = 1;
                self.attached.insert(envelope.apn_type);
                self.requested_capabilities = LinkCapabilities {
                    radio_tech: rat,
                    roaming,
                    metered: true,
                };
                let params = self.family.setup_params(&apn, rat, roaming);
                info!(
                    "Bearer {} connecting {} on APN {} (tag {})",
                    self.id, envelope.apn_type, apn.apn, self.tag
                );
                self.apn = Some(apn);
                self.issue(RilRequest::SetupDataCall(params), Outstanding::Setup(envelope));
                self.transition_to(BearerState::Activating);
            }
            BearerEvent::Disconnect(envelope) | BearerEvent::DisconnectAll(envelope) => {
                debug!("Bearer {} already inactive, completing {}", self.id, envelope.kind);
                self.complete(envelope, CompletionOutcome::Disconnected);
            }
            BearerEvent::RadioResponse(response) => self.drop_stale(&response),
            BearerEvent::Reset { .. } => {}
            BearerEvent::UpdateLinkProperties(_) => {
                warn!("Bearer {} ignoring link update while inactive", self.id);
            }
        }
    }

    fn on_activating(&mut self, event: BearerEvent) {
        match event {
            BearerEvent::Connect { .. } | BearerEvent::Disconnect(_) | BearerEvent::DisconnectAll(_) => {
                self.defer(event)
            }
            BearerEvent::RadioResponse(response) => {
                let Some(pending) = self.claim(&response) else {
                    return;
                };
                match pending {
                    Outstanding::Setup(envelope) => self.on_setup_done(envelope, response),
                    Outstanding::LastFailCause(envelope) => {
                        let cause = match response.result {
                            Ok(RilPayload::LastFailCause(code)) => self.family.classify_failure(code),
                            _ => FailCause::Unknown,
                        };
                        self.fail_activation(envelope, cause, None);
                    }
                    Outstanding::Teardown { envelope, .. } => {
                        warn!("Bearer {} teardown response while activating", self.id);
                        self.complete(envelope, CompletionOutcome::Disconnected);
                    }
                }
            }
            BearerEvent::Reset { cause } => self.reset(cause),
            BearerEvent::UpdateLinkProperties(_) => {
                debug!("Bearer {} ignoring link update while activating", self.id);
            }
        }
    }

    fn on_active(&mut self, event: BearerEvent) {
        match event {
            BearerEvent::Connect {
                mut envelope, apn, ..
            } => {
                envelope.tag = self.tag;
                if self.apn.as_ref().is_some_and(|a| a.id != apn.id) {
                    warn!(
                        "Bearer {} is bound to another APN, refusing {}",
                        self.id, envelope.apn_type
                    );
                    self.complete(
                        envelope,
                        CompletionOutcome::ConnectFailed {
                            cause: FailCause::Unknown,
                            suggested_retry: None,
                        },
                    );
                    return;
                }
                if self.attached.insert(envelope.apn_type) {
                    self.ref_count += 1;
                }
                debug!("Bearer {} shared by {} (refs {})", self.id, envelope.apn_type, self.ref_count);
                self.complete(envelope, CompletionOutcome::Connected);
            }
            BearerEvent::Disconnect(mut envelope) => {
                envelope.tag = self.tag;
                if !self.attached.remove(&envelope.apn_type) {
                    debug!("Bearer {} stray disconnect from {}", self.id, envelope.apn_type);
                    self.complete(envelope, CompletionOutcome::Disconnected);
                    return;
                }
                self.ref_count = self.ref_count.saturating_sub(1);
                if self.ref_count == 0 {
                    self.tear_down(envelope, false);
                    self.transition_to(BearerState::Disconnecting);
                } else {
                    self.complete(envelope, CompletionOutcome::Disconnected);
                }
            }
            BearerEvent::DisconnectAll(mut envelope) => {
                envelope.tag = self.tag;
                self.ref_count = 0;
                self.attached.clear();
                self.tear_down(envelope, false);
                self.transition_to(BearerState::Disconnecting);
            }
            BearerEvent::RadioResponse(response) => {
                if let Some(pending) = self.claim(&response) {
                    warn!("Bearer {} unexpected response while active: {:?}", self.id, pending);
                }
            }
            BearerEvent::UpdateLinkProperties(call) => match LinkProperties::from_response(&call) {
                Ok(lp) if lp != self.link_properties => {
                    info!("Bearer {} link properties changed: {}", self.id, lp);
                    self.link_properties = lp.clone();
                    self.notices.push(BearerNotice::LinkPropertiesChanged(lp));
                }
                Ok(_) => {}
                Err(e) => warn!("Bearer {} ignoring malformed link update: {}", self.id, e),
            },
            BearerEvent::Reset { cause } => self.reset(cause),
        }
    }

    fn on_disconnecting(&mut self, event: BearerEvent) {
        match event {
            BearerEvent::Connect { .. } | BearerEvent::Disconnect(_) | BearerEvent::DisconnectAll(_) => {
                self.defer(event)
            }
            BearerEvent::RadioResponse(response) => {
                let Some(pending) = self.claim(&response) else {
                    return;
                };
                match pending {
                    Outstanding::Teardown {
                        envelope,
                        after_error: true,
                    } => {
                        let cause = FailCause::UnacceptableNetworkParameter;
                        self.enter_inactive(vec![(
                            envelope,
                            CompletionOutcome::ConnectFailed {
                                cause,
                                suggested_retry: None,
                            },
                        )]);
                    }
                    Outstanding::Teardown { envelope, .. } => {
                        if let Err(e) = response.result {
                            debug!("Bearer {} teardown error {}, treating as done", self.id, e);
                        }
                        self.enter_inactive(vec![(envelope, CompletionOutcome::Disconnected)]);
                    }
                    other => warn!("Bearer {} unexpected response while disconnecting: {:?}", self.id, other),
                }
            }
            BearerEvent::Reset { cause } => self.reset(cause),
            BearerEvent::UpdateLinkProperties(_) => {
                debug!("Bearer {} ignoring link update while disconnecting", self.id);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Setup result handling
    // ------------------------------------------------------------------------

    fn on_setup_done(&mut self, envelope: PendingOperationEnvelope, response: RilResponse) {
        let call = match response.result {
            Err(RilError::RadioNotAvailable) => {
                self.fail_activation(envelope, FailCause::RadioNotAvailable, None);
                return;
            }
            Err(e) => {
                if self.radio.capabilities().inline_fail_cause {
                    debug!("Bearer {} setup error {}", self.id, e);
                    self.fail_activation(envelope, FailCause::Unknown, None);
                } else {
                    debug!("Bearer {} setup error {}, fetching last fail cause", self.id, e);
                    self.issue(
                        RilRequest::LastDataCallFailCause,
                        Outstanding::LastFailCause(envelope),
                    );
                }
                return;
            }
            Ok(RilPayload::SetupDataCall(call)) => call,
            Ok(other) => {
                warn!("Bearer {} malformed setup response {:?}", self.id, other);
                self.fail_activation(envelope, FailCause::Unknown, None);
                return;
            }
        };

        if call.status != 0 {
            let cause = self.family.classify_failure(call.status);
            let suggested_retry =
                (call.suggested_retry_ms >= 0).then(|| Duration::from_millis(call.suggested_retry_ms as u64));
            self.fail_activation(envelope, cause, suggested_retry);
            return;
        }

        self.cid = Some(call.cid);
        let accepted = match LinkProperties::from_response(&call) {
            Ok(lp) => {
                let dns_ok = self
                    .apn
                    .as_ref()
                    .is_some_and(|apn| self.family.is_dns_acceptable(apn, &lp.dnses));
                if dns_ok {
                    Some(lp)
                } else {
                    warn!("Bearer {} DNS servers rejected: {:?}", self.id, lp.dnses);
                    None
                }
            }
            Err(e) => {
                warn!("Bearer {} unacceptable parameters: {}", self.id, e);
                None
            }
        };

        match accepted {
            Some(lp) => {
                info!("Bearer {} active, cid {} {}", self.id, call.cid, lp);
                self.link_properties = lp;
                self.link_capabilities = self.requested_capabilities.clone();
                self.retry.reset();
                self.last_fail_cause = None;
                self.complete(envelope, CompletionOutcome::Connected);
                self.transition_to(BearerState::Active);
            }
            None => {
                self.record_failure(FailCause::UnacceptableNetworkParameter);
                self.tear_down(envelope, true);
                self.transition_to(BearerState::DisconnectingAfterCreateError);
            }
        }
    }

    fn fail_activation(
        &mut self,
        envelope: PendingOperationEnvelope,
        cause: FailCause,
        suggested_retry: Option<Duration>,
    ) {
        if cause.is_loggable() {
            info!("Bearer {} setup failed: {}", self.id, cause);
        } else {
            debug!("Bearer {} setup failed: {}", self.id, cause);
        }
        self.record_failure(cause);
        self.enter_inactive(vec![(
            envelope,
            CompletionOutcome::ConnectFailed {
                cause,
                suggested_retry,
            },
        )]);
    }

    fn record_failure(&mut self, cause: FailCause) {
        self.retry.increment();
        self.last_fail_cause = Some(cause);
        self.last_fail_time = Some(Instant::now());
    }

    fn reset(&mut self, cause: FailCause) {
        info!("Bearer {} reset: {}", self.id, cause);
        let mut pending: Vec<_> = self.outstanding.drain().collect();
        pending.sort_by_key(|(serial, _)| *serial);
        let mut notifications = pending
            .into_iter()
            .map(|(_, op)| match op {
                Outstanding::Setup(envelope)
                | Outstanding::LastFailCause(envelope)
                | Outstanding::Teardown {
                    envelope,
                    after_error: true,
                } => (
                    envelope,
                    CompletionOutcome::ConnectFailed {
                        cause,
                        suggested_retry: None,
                    },
                ),
                Outstanding::Teardown { envelope, .. } => (envelope, CompletionOutcome::Disconnected),
            })
            .collect::<Vec<_>>();
        // Deferred requests are answered here and never replayed into the new generation
        let deferred = std::mem::take(&mut self.deferred);
        for event in deferred {
            match event {
                BearerEvent::Connect { envelope, .. } => notifications.push((
                    envelope,
                    CompletionOutcome::ConnectFailed {
                        cause,
                        suggested_retry: None,
                    },
                )),
                BearerEvent::Disconnect(envelope) | BearerEvent::DisconnectAll(envelope) => {
                    notifications.push((envelope, CompletionOutcome::Disconnected))
                }
                other => debug!("Bearer {} dropping deferred {}", self.id, other.name()),
            }
        }
        self.enter_inactive(notifications);
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Sends a teardown for the current call.
    ///
    /// With the radio off nothing would answer, so a successful completion is
    /// posted to this bearer's own queue instead.
    fn tear_down(&mut self, envelope: PendingOperationEnvelope, after_error: bool) {
        let cid = self.cid.unwrap_or(-1);
        let pending = Outstanding::Teardown {
            envelope,
            after_error,
        };
        if !self.radio.is_radio_on() {
            let token = self.track(pending);
            debug!("Bearer {} radio off, completing teardown locally", self.id);
            self.inbox
                .push_back(BearerEvent::RadioResponse(RilResponse::ok(token, RilPayload::Ack)));
            return;
        }
        let reason = match &pending {
            Outstanding::Teardown { envelope, .. } if envelope.reason == reason::RADIO_TURNED_OFF => {
                DeactivateReason::RadioShutdown
            }
            _ => DeactivateReason::NoReason,
        };
        self.issue(RilRequest::DeactivateDataCall { cid, reason }, pending);
    }

    fn track(&mut self, pending: Outstanding) -> RequestToken {
        self.next_serial += 1;
        let token = RequestToken::new(RequestOwner::Bearer(self.id), self.tag, self.next_serial);
        self.outstanding.insert(self.next_serial, pending);
        token
    }

    fn issue(&mut self, request: RilRequest, pending: Outstanding) {
        let token = self.track(pending);
        self.radio.send(token, request);
    }

    /// Removes the outstanding entry a response belongs to.
    fn claim(&mut self, response: &RilResponse) -> Option<Outstanding> {
        let token = response.token;
        if token.owner != RequestOwner::Bearer(self.id) || token.generation != self.tag {
            self.drop_stale(response);
            return None;
        }
        let pending = self.outstanding.remove(&token.serial);
        if pending.is_none() {
            debug!("Bearer {} no outstanding request for {}", self.id, token);
        }
        pending
    }

    fn drop_stale(&self, response: &RilResponse) {
        debug!(
            "Bearer {} dropping stale response {} (current tag {})",
            self.id, response.token, self.tag
        );
    }

    fn defer(&mut self, event: BearerEvent) {
        debug!("Bearer {} [{}] deferring {}", self.id, self.state, event.name());
        self.deferred.push_back(event);
    }

    fn complete(&self, envelope: PendingOperationEnvelope, outcome: CompletionOutcome) {
        envelope.complete(self.id, outcome);
    }

    fn transition_to(&mut self, next: BearerState) {
        let prev = self.state;
        self.state = next;
        debug!("Bearer {} {} -> {}", self.id, prev, next);
        if prev != next {
            self.notices.push(BearerNotice::StateChanged { from: prev, to: next });
        }
        // Deferred events run before anything queued after them.
        while let Some(event) = self.deferred.pop_back() {
            self.inbox.push_front(event);
        }
    }

    fn enter_inactive(&mut self, notifications: Vec<(PendingOperationEnvelope, CompletionOutcome)>) {
        self.tag = self.tag.wrapping_add(1);
        self.outstanding.clear();
        for (envelope, outcome) in notifications {
            self.complete(envelope, outcome);
        }
        self.clear_settings();
        self.transition_to(BearerState::Inactive);
    }

    /// Clears per-generation state. Retry state and the last failure survive.
    fn clear_settings(&mut self) {
        self.apn = None;
        self.link_properties = LinkProperties::default();
        self.link_capabilities = LinkCapabilities::default();
        self.ref_count = 0;
        self.attached.clear();
        self.cid = None;
    }
}

impl fmt::Debug for BearerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerConnection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("tag", &self.tag)
            .field("ref_count", &self.ref_count)
            .field("attached", &self.attached)
            .field("cid", &self.cid)
            .field("last_fail_cause", &self.last_fail_cause)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
