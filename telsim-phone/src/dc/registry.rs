//! Connection registry
//!
//! Owns the bearers and the APN contexts, decides which bearer serves which
//! context, and turns registration edges into bring-up and teardown requests.
//!
//! A context is served by at most one bearer at a time. Contexts whose
//! access points match share a bearer; a context asking for an access point
//! whose bearer is still tearing down is queued on that bearer and set up
//! again once it reaches INACTIVE.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use telsim_common::config::DEFAULT_DATA_RETRY_CONFIG;
use telsim_common::{ApnType, PhoneConfig, RadioState, RadioTechnology};
use telsim_ril::{
    BearerId, CallActivity, DataCallResponse, RadioCommandChannel, RequestOwner, RilResponse,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::apn::{ApnContext, ApnContextState, ApnSetting};
use super::bearer::{BearerConnection, BearerEvent, BearerNotice, BearerState};
use super::envelope::{
    BearerCompletion, CompletionHandle, CompletionOutcome, OperationKind, PendingOperationEnvelope,
};
use super::fail_cause::{FailCause, RetryDisposition};
use super::family::{family_for, NetworkFamily};
use super::link::LinkProperties;
use super::reason;
use super::retry::RetryPolicy;
use crate::registrants::Registrants;
use crate::sst::RegistrationEvent;

/// Published data connection changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataEvent {
    Connected {
        apn_type: ApnType,
        bearer: BearerId,
        link: LinkProperties,
    },
    SetupFailed {
        apn_type: ApnType,
        cause: FailCause,
        /// Delay until the scheduled reconnect, if one was armed
        retry_after: Option<Duration>,
    },
    Disconnected {
        apn_type: ApnType,
        reason: String,
    },
    LinkPropertiesChanged {
        bearer: BearerId,
        link: LinkProperties,
    },
    StateChanged {
        bearer: BearerId,
        from: BearerState,
        to: BearerState,
    },
    /// Every bearer reached INACTIVE after a clean-up request
    AllDisconnected,
}

/// A scheduled reconnect for one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectAlarm {
    pub at: Instant,
    pub apn_type: ApnType,
    /// Context generation when the alarm was armed
    pub generation: u32,
}

/// APN context to bearer mapping.
pub struct ConnectionRegistry {
    radio: Arc<dyn RadioCommandChannel>,
    family: Arc<dyn NetworkFamily>,
    settings: Vec<ApnSetting>,
    contexts: BTreeMap<ApnType, ApnContext>,
    bearers: BTreeMap<BearerId, BearerConnection>,
    next_bearer_id: BearerId,
    max_bearers: usize,
    retry_template: RetryPolicy,
    reply: CompletionHandle,
    completions: mpsc::UnboundedReceiver<BearerCompletion>,
    draining: bool,
    alarms: Vec<ReconnectAlarm>,
    registrants: Registrants<DataEvent>,

    radio_state: RadioState,
    data_attached: bool,
    roaming: bool,
    rat: RadioTechnology,
    ps_restricted: bool,
    data_enabled: bool,
    roaming_allowed: bool,
    /// Set by a clean-up request until every bearer is inactive
    cleanup_pending: bool,
}

impl ConnectionRegistry {
    pub fn new(config: &PhoneConfig, radio: Arc<dyn RadioCommandChannel>) -> Self {
        let settings = config
            .apns
            .iter()
            .enumerate()
            .map(|(i, apn)| ApnSetting::from_config(i as u32, apn))
            .collect();

        let mut retry_template = RetryPolicy::new();
        if let Err(e) = retry_template.configure_str(&config.retry_config) {
            warn!("Invalid retry config '{}': {}, using default", config.retry_config, e);
            if let Err(e) = retry_template.configure_str(DEFAULT_DATA_RETRY_CONFIG) {
                warn!("Default retry config rejected: {}", e);
            }
        }

        let contexts = ApnType::ALL
            .iter()
            .map(|t| (*t, ApnContext::new(*t)))
            .collect();
        let (reply, completions) = CompletionHandle::channel();

        Self {
            radio,
            family: family_for(config.network_family),
            settings,
            contexts,
            bearers: BTreeMap::new(),
            next_bearer_id: 1,
            max_bearers: config.max_bearers,
            retry_template,
            reply,
            completions,
            draining: false,
            alarms: Vec::new(),
            registrants: Registrants::new(),
            radio_state: RadioState::Unavailable,
            data_attached: false,
            roaming: false,
            rat: RadioTechnology::Unknown,
            ps_restricted: false,
            data_enabled: config.data_enabled,
            roaming_allowed: config.data_roaming_enabled,
            cleanup_pending: false,
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Subscribes to data events.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<DataEvent> {
        self.registrants.add()
    }

    pub fn context(&self, apn_type: ApnType) -> Option<&ApnContext> {
        self.contexts.get(&apn_type)
    }

    pub fn bearer(&self, id: BearerId) -> Option<&BearerConnection> {
        self.bearers.get(&id)
    }

    pub fn bearers(&self) -> impl Iterator<Item = &BearerConnection> {
        self.bearers.values()
    }

    pub fn settings(&self) -> &[ApnSetting] {
        &self.settings
    }

    /// True when no bearer is in use.
    pub fn is_all_disconnected(&self) -> bool {
        self.bearers.values().all(|b| b.is_inactive())
    }

    /// True when the network state permits bringing up data.
    pub fn is_data_allowed(&self) -> bool {
        self.data_attached
            && self.radio_state.is_on()
            && self.data_enabled
            && !self.ps_restricted
            && (!self.roaming || self.roaming_allowed)
    }

    pub fn pending_alarms(&self) -> &[ReconnectAlarm] {
        &self.alarms
    }

    /// Earliest reconnect deadline.
    pub fn next_alarm(&self) -> Option<Instant> {
        self.alarms.iter().map(|a| a.at).min()
    }

    // ========================================================================
    // Requests
    // ========================================================================

    pub fn enable_apn_type(&mut self, apn_type: ApnType) {
        let Some(ctx) = self.contexts.get_mut(&apn_type) else {
            return;
        };
        if ctx.enabled {
            debug!("APN type {} already enabled", apn_type);
            return;
        }
        info!("Enabling APN type {}", apn_type);
        ctx.enabled = true;
        self.try_setup_data(apn_type, reason::APN_ENABLED);
    }

    pub fn disable_apn_type(&mut self, apn_type: ApnType) {
        let Some(ctx) = self.contexts.get_mut(&apn_type) else {
            return;
        };
        if !ctx.enabled {
            return;
        }
        info!("Disabling APN type {}", apn_type);
        ctx.enabled = false;
        ctx.bump_generation();
        self.clean_up_connection(apn_type, reason::APN_DISABLED);
    }

    pub fn set_data_enabled(&mut self, enabled: bool) {
        if self.data_enabled == enabled {
            return;
        }
        info!("Mobile data {}", if enabled { "enabled" } else { "disabled" });
        self.data_enabled = enabled;
        if enabled {
            self.setup_all(reason::DATA_ENABLED);
        } else {
            self.clean_up_all(reason::DATA_DISABLED);
        }
    }

    pub fn set_roaming_allowed(&mut self, allowed: bool) {
        if self.roaming_allowed == allowed {
            return;
        }
        self.roaming_allowed = allowed;
        if !self.roaming {
            return;
        }
        if allowed {
            self.setup_all(reason::ROAMING_ON);
        } else {
            self.clean_up_all(reason::ROAMING_ON);
        }
    }

    /// Tries to bring up data for a context. Returns true if a connect was sent.
    pub fn try_setup_data(&mut self, apn_type: ApnType, reason: &str) -> bool {
        if !self.is_data_allowed() {
            debug!(
                "Data not allowed for {} (attached={} radio={} enabled={} restricted={} roaming={})",
                apn_type,
                self.data_attached,
                self.radio_state,
                self.data_enabled,
                self.ps_restricted,
                self.roaming
            );
            return false;
        }
        let rat = self.rat;
        let roaming = self.roaming;

        let Some(ctx) = self.contexts.get_mut(&apn_type) else {
            return false;
        };
        if !ctx.is_ready_for_setup() {
            return false;
        }
        if ctx.state != ApnContextState::Scanning || ctx.waiting_apns.is_empty() {
            ctx.waiting_apns = self
                .settings
                .iter()
                .filter(|a| a.can_handle_type(apn_type) && a.matches_rat(rat))
                .cloned()
                .collect();
        }
        let Some(apn) = ctx.waiting_apns.first().cloned() else {
            warn!("No access point can serve {} on {}", apn_type, rat);
            ctx.set_state(ApnContextState::Failed);
            ctx.bearer = None;
            self.registrants.notify(DataEvent::SetupFailed {
                apn_type,
                cause: FailCause::MissingUnknownApn,
                retry_after: None,
            });
            return false;
        };
        let preferred = ctx.bearer;

        let Some(id) = self.find_bearer(&apn, preferred) else {
            warn!("No bearer available for {}", apn_type);
            if let Some(ctx) = self.contexts.get_mut(&apn_type) {
                ctx.bearer = None;
                ctx.set_state(ApnContextState::Idle);
            }
            self.registrants.notify(DataEvent::SetupFailed {
                apn_type,
                cause: FailCause::InsufficientResources,
                retry_after: None,
            });
            return false;
        };

        let Some(ctx) = self.contexts.get_mut(&apn_type) else {
            return false;
        };
        ctx.bearer = Some(id);
        ctx.active_apn = Some(apn.clone());
        ctx.reason = reason.to_string();
        ctx.bump_generation();
        ctx.set_state(ApnContextState::Connecting);
        info!("Setting up {} on bearer {} ({}, reason {})", apn_type, id, apn, reason);

        let envelope = PendingOperationEnvelope::connect(apn_type, reason, self.reply.clone());
        self.dispatch(
            id,
            BearerEvent::Connect {
                envelope,
                apn,
                rat,
                roaming,
            },
        );
        true
    }

    /// Detaches one context from its bearer.
    pub fn clean_up_connection(&mut self, apn_type: ApnType, reason: &str) {
        let Some(ctx) = self.contexts.get_mut(&apn_type) else {
            return;
        };
        match ctx.state {
            ApnContextState::Connecting | ApnContextState::Connected => {
                let Some(id) = ctx.bearer else {
                    ctx.set_state(ApnContextState::Idle);
                    return;
                };
                ctx.reason = reason.to_string();
                ctx.set_state(ApnContextState::Disconnecting);
                let envelope =
                    PendingOperationEnvelope::disconnect(apn_type, reason, self.reply.clone());
                self.dispatch(id, BearerEvent::Disconnect(envelope));
            }
            ApnContextState::Scanning | ApnContextState::Failed => {
                ctx.bearer = None;
                ctx.bump_generation();
                ctx.set_state(ApnContextState::Idle);
            }
            ApnContextState::Idle | ApnContextState::Disconnecting => {}
        }
    }

    /// Tears down every bearer. [`DataEvent::AllDisconnected`] follows once
    /// all of them are inactive.
    pub fn clean_up_all(&mut self, reason: &str) {
        info!("Cleaning up all data connections ({})", reason);
        self.cleanup_pending = true;

        for ctx in self.contexts.values_mut() {
            ctx.bump_generation();
            match ctx.state {
                ApnContextState::Scanning | ApnContextState::Failed => {
                    ctx.bearer = None;
                    ctx.set_state(ApnContextState::Idle);
                }
                ApnContextState::Connecting | ApnContextState::Connected => {
                    ctx.reason = reason.to_string();
                    ctx.set_state(ApnContextState::Disconnecting);
                }
                ApnContextState::Idle | ApnContextState::Disconnecting => {}
            }
        }

        let in_use: Vec<BearerId> = self
            .bearers
            .values()
            .filter(|b| !b.is_inactive())
            .map(|b| b.id())
            .collect();
        for id in in_use {
            let apn_type = self
                .contexts
                .values()
                .find(|c| c.bearer == Some(id))
                .map_or(ApnType::Default, |c| c.apn_type);
            let envelope =
                PendingOperationEnvelope::disconnect_all(apn_type, reason, self.reply.clone());
            self.dispatch(id, BearerEvent::DisconnectAll(envelope));
        }
        self.check_all_disconnected();
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    pub fn on_registration_event(&mut self, event: RegistrationEvent) {
        debug!("Registration event {}", event);
        match event {
            RegistrationEvent::DataAttached => {
                self.data_attached = true;
                self.setup_all(reason::DATA_ATTACHED);
            }
            RegistrationEvent::DataDetached => {
                self.data_attached = false;
            }
            RegistrationEvent::RoamingOn => {
                self.roaming = true;
                if !self.roaming_allowed {
                    self.clean_up_all(reason::ROAMING_ON);
                }
            }
            RegistrationEvent::RoamingOff => {
                self.roaming = false;
                self.setup_all(reason::ROAMING_OFF);
            }
            RegistrationEvent::PsRestrictedEnabled => {
                self.ps_restricted = true;
                self.clean_up_all(reason::PS_RESTRICT_ENABLED);
            }
            RegistrationEvent::PsRestrictedDisabled => {
                self.ps_restricted = false;
                self.setup_all(reason::PS_RESTRICT_DISABLED);
            }
            RegistrationEvent::RadioTechChanged(rat) => {
                self.rat = rat;
                self.setup_all(reason::NW_TYPE_CHANGED);
            }
            RegistrationEvent::NetworkAttached | RegistrationEvent::OperatorChanged(_) => {}
        }
    }

    /// Radio off or unavailable drops every bearer without radio commands.
    pub fn on_radio_state_changed(&mut self, state: RadioState) {
        self.radio_state = state;
        if state.is_on() {
            return;
        }
        let cause = match state {
            RadioState::Off => FailCause::RadioPowerOff,
            _ => FailCause::RadioNotAvailable,
        };
        self.reset_all(cause, reason::RADIO_TURNED_OFF);
    }

    /// Routes a radio response to the bearer that issued the request.
    pub fn on_radio_response(&mut self, response: RilResponse) {
        match response.token.owner {
            RequestOwner::Bearer(id) => self.dispatch(id, BearerEvent::RadioResponse(response)),
            RequestOwner::Registration => {
                warn!("Registration response {} routed to data", response.token)
            }
        }
    }

    /// Reconciles active bearers against the radio's call list.
    pub fn on_data_call_list_changed(&mut self, calls: Vec<DataCallResponse>) {
        let mut updates = Vec::new();
        let mut lost = Vec::new();
        for bearer in self.bearers.values().filter(|b| b.is_active()) {
            let Some(cid) = bearer.cid() else {
                continue;
            };
            match calls
                .iter()
                .find(|c| c.cid == cid && c.active != CallActivity::Inactive)
            {
                Some(call) => updates.push((bearer.id(), call.clone())),
                None => lost.push(bearer.id()),
            }
        }

        for (id, call) in updates {
            self.dispatch(id, BearerEvent::UpdateLinkProperties(call));
        }
        for id in lost {
            warn!("Bearer {} lost its data call", id);
            let affected = self.detach_contexts(id, reason::LOST_DATA_CONNECTION);
            self.dispatch(
                id,
                BearerEvent::Reset {
                    cause: FailCause::LostConnection,
                },
            );
            for apn_type in affected {
                self.try_setup_data(apn_type, reason::LOST_DATA_CONNECTION);
            }
        }
    }

    /// Fires reconnect alarms that are due.
    pub fn fire_alarms(&mut self, now: Instant) {
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.alarms)
            .into_iter()
            .partition(|a| a.at <= now);
        self.alarms = pending;
        for alarm in due {
            let current = self.contexts.get(&alarm.apn_type).is_some_and(|c| {
                c.generation == alarm.generation && c.state == ApnContextState::Scanning
            });
            if !current {
                debug!("Dropping stale reconnect for {}", alarm.apn_type);
                continue;
            }
            self.try_setup_data(alarm.apn_type, reason::RETRY);
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn setup_all(&mut self, reason: &str) {
        let ready: Vec<ApnType> = self
            .contexts
            .values()
            .filter(|c| c.is_ready_for_setup())
            .map(|c| c.apn_type)
            .collect();
        for apn_type in ready {
            self.try_setup_data(apn_type, reason);
        }
    }

    fn find_bearer(&mut self, apn: &ApnSetting, preferred: Option<BearerId>) -> Option<BearerId> {
        if let Some(bearer) = self
            .bearers
            .values()
            .find(|b| !b.is_inactive() && b.apn_setting().is_some_and(|s| s.id == apn.id))
        {
            return Some(bearer.id());
        }
        if let Some(id) = preferred.filter(|id| self.bearers.get(id).is_some_and(|b| b.is_inactive())) {
            return Some(id);
        }
        if let Some(bearer) = self.bearers.values().find(|b| b.is_inactive()) {
            return Some(bearer.id());
        }
        if self.bearers.len() < self.max_bearers {
            let id = self.next_bearer_id;
            self.next_bearer_id += 1;
            debug!("Creating bearer {}", id);
            let bearer = BearerConnection::new(
                id,
                self.radio.clone(),
                self.family.clone(),
                self.retry_template.clone(),
            );
            self.bearers.insert(id, bearer);
            return Some(id);
        }
        None
    }

    fn dispatch(&mut self, id: BearerId, event: BearerEvent) {
        let Some(bearer) = self.bearers.get_mut(&id) else {
            warn!("No bearer {} for event", id);
            return;
        };
        bearer.process(event);
        for notice in bearer.take_notices() {
            let event = match notice {
                BearerNotice::StateChanged { from, to } => DataEvent::StateChanged { bearer: id, from, to },
                BearerNotice::LinkPropertiesChanged(link) => {
                    DataEvent::LinkPropertiesChanged { bearer: id, link }
                }
            };
            self.registrants.notify(event);
        }
        self.drain_completions();
    }

    fn drain_completions(&mut self) {
        if self.draining {
            return;
        }
        self.draining = true;
        while let Ok(completion) = self.completions.try_recv() {
            self.on_completion(completion);
        }
        self.draining = false;
        self.check_all_disconnected();
    }

    fn on_completion(&mut self, completion: BearerCompletion) {
        debug!(
            "Bearer {} completed {} for {} (tag {}): {:?}",
            completion.bearer, completion.kind, completion.apn_type, completion.tag, completion.outcome
        );
        match (completion.kind, completion.outcome) {
            (OperationKind::Connect, CompletionOutcome::Connected) => {
                self.on_connected(completion.apn_type, completion.bearer)
            }
            (
                OperationKind::Connect,
                CompletionOutcome::ConnectFailed {
                    cause,
                    suggested_retry,
                },
            ) => self.on_setup_failed(completion.apn_type, completion.bearer, cause, suggested_retry),
            (kind @ (OperationKind::Disconnect | OperationKind::DisconnectAll), _) => self
                .on_disconnected(completion.bearer, completion.apn_type, kind, &completion.reason),
            (OperationKind::Connect, CompletionOutcome::Disconnected) => {
                warn!("Connect for {} completed as a disconnect", completion.apn_type)
            }
        }
    }

    fn on_connected(&mut self, apn_type: ApnType, id: BearerId) {
        let link = self
            .bearers
            .get(&id)
            .map(|b| b.link_properties().clone())
            .unwrap_or_default();
        let Some(ctx) = self.contexts.get_mut(&apn_type) else {
            return;
        };
        if ctx.state != ApnContextState::Connecting || ctx.bearer != Some(id) {
            debug!("Ignoring connect completion for {} in {}", apn_type, ctx.state);
            return;
        }
        ctx.set_state(ApnContextState::Connected);
        info!("{} connected on bearer {}", apn_type, id);
        self.registrants.notify(DataEvent::Connected {
            apn_type,
            bearer: id,
            link,
        });
    }

    fn on_setup_failed(
        &mut self,
        apn_type: ApnType,
        id: BearerId,
        cause: FailCause,
        suggested_retry: Option<Duration>,
    ) {
        let Some(ctx) = self.contexts.get_mut(&apn_type) else {
            return;
        };
        if ctx.state != ApnContextState::Connecting || ctx.bearer != Some(id) {
            debug!("Ignoring setup failure for {} in {}", apn_type, ctx.state);
            return;
        }

        let disposition = cause.retry_disposition();
        let give_up = match disposition {
            RetryDisposition::RadioUnavailable => {
                ctx.bearer = None;
                ctx.set_state(ApnContextState::Idle);
                true
            }
            RetryDisposition::NoRetry => {
                let more = match ctx.active_apn.as_ref().map(|a| a.id) {
                    Some(apn_id) => ctx.remove_waiting_apn(apn_id),
                    None => false,
                };
                if !more {
                    ctx.bearer = None;
                    ctx.set_state(ApnContextState::Failed);
                }
                !more
            }
            RetryDisposition::Retry => false,
        };
        if give_up {
            info!("Setup of {} failed: {}, not retrying", apn_type, cause);
            self.registrants.notify(DataEvent::SetupFailed {
                apn_type,
                cause,
                retry_after: None,
            });
            return;
        }

        let Some(bearer) = self.bearers.get_mut(&id) else {
            return;
        };
        if !bearer.retry().allows_retry_after_failure() {
            if apn_type != ApnType::Default {
                info!("Setup of {} failed: {}, retries exhausted", apn_type, cause);
                ctx.bearer = None;
                ctx.set_state(ApnContextState::Failed);
                self.registrants.notify(DataEvent::SetupFailed {
                    apn_type,
                    cause,
                    retry_after: None,
                });
                return;
            }
            bearer.retry_mut().retry_forever_using_last_interval();
        }
        let delay = suggested_retry.unwrap_or_else(|| bearer.retry().delay_after_failure());
        let Some(at) = Instant::now().checked_add(delay) else {
            warn!("Retry delay {:?} for {} out of range, not retrying", delay, apn_type);
            ctx.bearer = None;
            ctx.set_state(ApnContextState::Failed);
            self.registrants.notify(DataEvent::SetupFailed {
                apn_type,
                cause,
                retry_after: None,
            });
            return;
        };

        ctx.set_state(ApnContextState::Scanning);
        let generation = ctx.bump_generation();
        self.alarms.push(ReconnectAlarm {
            at,
            apn_type,
            generation,
        });
        info!("Setup of {} failed: {}, retrying in {:?}", apn_type, cause, delay);
        self.registrants.notify(DataEvent::SetupFailed {
            apn_type,
            cause,
            retry_after: Some(delay),
        });
    }

    fn on_disconnected(&mut self, id: BearerId, apn_type: ApnType, kind: OperationKind, reason: &str) {
        let finished: Vec<ApnType> = self
            .contexts
            .values()
            .filter(|c| {
                c.bearer == Some(id)
                    && c.state == ApnContextState::Disconnecting
                    && (kind == OperationKind::DisconnectAll || c.apn_type == apn_type)
            })
            .map(|c| c.apn_type)
            .collect();

        for t in &finished {
            if let Some(ctx) = self.contexts.get_mut(t) {
                ctx.bearer = None;
                ctx.set_state(ApnContextState::Idle);
            }
            info!("{} disconnected ({})", t, reason);
            self.registrants.notify(DataEvent::Disconnected {
                apn_type: *t,
                reason: reason.to_string(),
            });
        }

        if reason == reason::RADIO_TURNED_OFF {
            return;
        }
        for t in finished {
            self.try_setup_data(t, reason);
        }
    }

    /// Unbinds the contexts served by a bearer that is about to be reset.
    fn detach_contexts(&mut self, id: BearerId, reason: &str) -> Vec<ApnType> {
        let mut detached = Vec::new();
        for ctx in self.contexts.values_mut().filter(|c| c.bearer == Some(id)) {
            ctx.bump_generation();
            ctx.bearer = None;
            let was_up = matches!(
                ctx.state,
                ApnContextState::Connecting | ApnContextState::Connected | ApnContextState::Disconnecting
            );
            ctx.set_state(ApnContextState::Idle);
            if was_up {
                detached.push(ctx.apn_type);
            }
        }
        for apn_type in &detached {
            self.registrants.notify(DataEvent::Disconnected {
                apn_type: *apn_type,
                reason: reason.to_string(),
            });
        }
        detached
    }

    fn reset_all(&mut self, cause: FailCause, reason: &str) {
        let in_use: Vec<BearerId> = self
            .bearers
            .values()
            .filter(|b| !b.is_inactive())
            .map(|b| b.id())
            .collect();
        for ctx in self.contexts.values_mut() {
            if ctx.state == ApnContextState::Scanning {
                ctx.bump_generation();
                ctx.bearer = None;
                ctx.set_state(ApnContextState::Idle);
            }
        }
        for id in in_use {
            self.detach_contexts(id, reason);
            self.dispatch(id, BearerEvent::Reset { cause });
        }
        self.check_all_disconnected();
    }

    fn check_all_disconnected(&mut self) {
        if self.cleanup_pending && self.is_all_disconnected() {
            self.cleanup_pending = false;
            info!("All data connections disconnected");
            self.registrants.notify(DataEvent::AllDisconnected);
        }
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("bearers", &self.bearers)
            .field("radio_state", &self.radio_state)
            .field("data_attached", &self.data_attached)
            .field("roaming", &self.roaming)
            .field("alarms", &self.alarms.len())
            .finish()
    }
}
