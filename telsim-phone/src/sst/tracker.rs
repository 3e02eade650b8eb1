//! Registration tracker
//!
//! Polls the radio for registration, operator and network selection state,
//! tracks signal strength, and publishes edge notifications when the merged
//! snapshot changes. Also drives radio power, including the two-phase
//! power-off that waits for data to disconnect.
//!
//! # Poll cycles
//!
//! A cycle issues four queries that share one [`PollContext`]. The snapshot
//! is only swapped once all four have answered. While a context is
//! outstanding no new cycle starts; a poll requested in the meantime is run
//! once the current cycle completes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use telsim_common::{PhoneConfig, Plmn, RadioState};
use telsim_ril::{
    RadioCommandChannel, RequestOwner, RequestToken, RestrictedState, RilError, RilPayload,
    RilRequest, RilResponse, SignalStrength,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::events::RegistrationEvent;
use super::snapshot::RegistrationSnapshot;
use crate::dc::reason;
use crate::registrants::Registrants;

/// Number of queries in one poll cycle.
const POLL_QUERY_COUNT: u32 = 4;

/// Data side of the power-off sequence.
pub trait DataControl: Send {
    /// True when no data connection is up or being torn down.
    fn is_disconnected(&self) -> bool;

    /// Requests teardown of every data connection. Completion is reported
    /// back through [`RegistrationTracker::on_all_data_disconnected`].
    fn clean_up_all(&mut self, reason: &str);
}

/// What an outstanding request was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Query {
    Operator,
    DataRegistration,
    VoiceRegistration,
    NetworkSelectionMode,
    SignalStrength,
    RadioPower(bool),
}

impl Query {
    fn is_poll(&self) -> bool {
        matches!(
            self,
            Query::Operator
                | Query::DataRegistration
                | Query::VoiceRegistration
                | Query::NetworkSelectionMode
        )
    }
}

/// Shared countdown of one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollContext {
    pub generation: u32,
    pub remaining: u32,
}

/// A power-off waiting for data to disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPowerOff {
    pub generation: u32,
    pub deadline: Instant,
}

/// Registration state tracker.
pub struct RegistrationTracker {
    radio: Arc<dyn RadioCommandChannel>,
    data: Box<dyn DataControl>,
    home_plmn: Plmn,
    power_off_timeout: Duration,

    current: RegistrationSnapshot,
    pending: RegistrationSnapshot,
    poll: Option<PollContext>,
    poll_generation: u32,
    repoll: bool,
    outstanding: HashMap<u64, Query>,
    next_serial: u64,

    radio_state: RadioState,
    desired_power: bool,
    power_off: Option<PendingPowerOff>,
    power_off_generation: u32,

    signal: SignalStrength,
    unsolicited_signal: bool,

    registrants: Registrants<RegistrationEvent>,
    signal_registrants: Registrants<SignalStrength>,
}

impl RegistrationTracker {
    pub fn new(
        config: &PhoneConfig,
        radio: Arc<dyn RadioCommandChannel>,
        data: Box<dyn DataControl>,
    ) -> Self {
        Self {
            radio,
            data,
            home_plmn: config.home_plmn,
            power_off_timeout: Duration::from_millis(config.power_off_timeout_ms),
            current: RegistrationSnapshot::out_of_service(),
            pending: RegistrationSnapshot::out_of_service(),
            poll: None,
            poll_generation: 0,
            repoll: false,
            outstanding: HashMap::new(),
            next_serial: 0,
            radio_state: RadioState::Unavailable,
            desired_power: config.desired_radio_power,
            power_off: None,
            power_off_generation: 0,
            signal: SignalStrength::default(),
            unsolicited_signal: false,
            registrants: Registrants::new(),
            signal_registrants: Registrants::new(),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<RegistrationEvent> {
        self.registrants.add()
    }

    /// Adds an existing sender as a registration listener.
    pub fn subscribe_sender(&mut self, tx: mpsc::UnboundedSender<RegistrationEvent>) {
        self.registrants.add_sender(tx);
    }

    pub fn subscribe_signal(&mut self) -> mpsc::UnboundedReceiver<SignalStrength> {
        self.signal_registrants.add()
    }

    pub fn snapshot(&self) -> &RegistrationSnapshot {
        &self.current
    }

    pub fn signal_strength(&self) -> SignalStrength {
        self.signal
    }

    pub fn radio_state(&self) -> RadioState {
        self.radio_state
    }

    pub fn poll_context(&self) -> Option<PollContext> {
        self.poll
    }

    pub fn pending_power_off(&self) -> Option<PendingPowerOff> {
        self.power_off
    }

    /// Deadline of the pending power-off, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.power_off.map(|p| p.deadline)
    }

    /// True once the radio pushed a signal report; polling then stops.
    pub fn has_unsolicited_signal(&self) -> bool {
        self.unsolicited_signal
    }

    // ========================================================================
    // Polling
    // ========================================================================

    /// Starts a poll cycle, or records that one is wanted if a cycle is
    /// already outstanding.
    pub fn poll_state(&mut self) {
        if self.poll.is_some() {
            debug!("Poll already outstanding, deferring");
            self.repoll = true;
            return;
        }

        match self.radio_state {
            RadioState::Unavailable => {
                self.pending = RegistrationSnapshot::out_of_service();
                self.swap_snapshot();
            }
            RadioState::Off => {
                self.pending = RegistrationSnapshot::power_off();
                self.swap_snapshot();
            }
            RadioState::On => {
                self.poll_generation = self.poll_generation.wrapping_add(1);
                let generation = self.poll_generation;
                self.poll = Some(PollContext {
                    generation,
                    remaining: POLL_QUERY_COUNT,
                });
                self.pending = self.current.clone();
                debug!("Starting poll cycle {}", generation);
                self.issue(Query::Operator, RilRequest::Operator, generation);
                self.issue(Query::DataRegistration, RilRequest::DataRegistrationState, generation);
                self.issue(Query::VoiceRegistration, RilRequest::VoiceRegistrationState, generation);
                self.issue(Query::NetworkSelectionMode, RilRequest::NetworkSelectionMode, generation);
            }
        }
    }

    /// Requests a signal strength reading unless the radio pushes them.
    pub fn poll_signal_strength(&mut self) {
        if self.unsolicited_signal || !self.radio_state.is_on() {
            return;
        }
        self.issue(Query::SignalStrength, RilRequest::SignalStrength, 0);
    }

    // ========================================================================
    // Radio inputs
    // ========================================================================

    pub fn on_radio_response(&mut self, response: RilResponse) {
        let token = response.token;
        if token.owner != RequestOwner::Registration {
            warn!("Response {} is not for the registration tracker", token);
            return;
        }
        let Some(query) = self.outstanding.remove(&token.serial) else {
            debug!("Dropping response {} with no outstanding query", token);
            return;
        };

        if query.is_poll() {
            self.on_poll_response(query, token, response.result);
            return;
        }

        match (query, response.result) {
            (Query::SignalStrength, Ok(RilPayload::SignalStrength(signal))) => {
                self.on_signal_strength(signal, false)
            }
            (Query::RadioPower(on), Ok(_)) => debug!("Radio power {} acknowledged", on),
            (Query::RadioPower(on), Err(e)) => warn!("Radio power {} failed: {}", on, e),
            (query, result) => debug!("Ignoring {:?} result {:?}", query, result),
        }
    }

    fn on_poll_response(
        &mut self,
        query: Query,
        token: RequestToken,
        result: Result<RilPayload, RilError>,
    ) {
        let Some(mut ctx) = self.poll.filter(|c| c.generation == token.generation) else {
            debug!("Dropping stale poll response {}", token);
            return;
        };

        match result {
            Err(RilError::RadioNotAvailable) => {
                info!("Radio not available, cancelling poll cycle {}", ctx.generation);
                self.cancel_poll();
                return;
            }
            Err(e) => warn!("Poll query {:?} failed: {}", query, e),
            Ok(payload) => self.apply_poll_result(query, payload),
        }

        ctx.remaining -= 1;
        if ctx.remaining > 0 {
            self.poll = Some(ctx);
            return;
        }

        self.poll = None;
        self.pending.finalize(&self.home_plmn);
        self.swap_snapshot();

        if self.repoll {
            self.repoll = false;
            self.poll_state();
        }
    }

    fn apply_poll_result(&mut self, query: Query, payload: RilPayload) {
        match (query, payload) {
            (Query::Operator, RilPayload::Operator(op)) => self.pending.operator = op,
            (Query::DataRegistration, RilPayload::Registration(reg)) => {
                self.pending.set_data_registration(reg)
            }
            (Query::VoiceRegistration, RilPayload::Registration(reg)) => {
                self.pending.set_voice_registration(reg)
            }
            (Query::NetworkSelectionMode, RilPayload::NetworkSelectionMode { manual }) => {
                self.pending.manual_selection = manual
            }
            (query, payload) => warn!("Malformed {:?} response {:?}", query, payload),
        }
    }

    fn cancel_poll(&mut self) {
        self.poll = None;
        self.repoll = false;
        self.outstanding.retain(|_, q| !q.is_poll());
    }

    /// Radio pushed a registration change.
    pub fn on_network_state_changed(&mut self) {
        self.poll_state();
    }

    pub fn on_radio_state_changed(&mut self, state: RadioState) {
        let previous = self.radio_state;
        self.radio_state = state;
        info!("Radio state {} -> {}", previous, state);

        if !state.is_on() {
            self.cancel_poll();
            if let Some(p) = self.power_off.take() {
                debug!("Radio already off, dropping power-off {}", p.generation);
            }
        }

        self.apply_desired_power();
        self.poll_state();
    }

    pub fn on_restricted_state_changed(&mut self, restricted: RestrictedState) {
        if restricted.ps_restricted == self.current.ps_restricted {
            return;
        }
        self.current.ps_restricted = restricted.ps_restricted;
        self.pending.ps_restricted = restricted.ps_restricted;
        let event = if restricted.ps_restricted {
            RegistrationEvent::PsRestrictedEnabled
        } else {
            RegistrationEvent::PsRestrictedDisabled
        };
        info!("Packet domain restriction changed: {}", event);
        self.registrants.notify(event);
    }

    /// Signal report, polled or pushed by the radio.
    ///
    /// An unknown GSM reading while in service is ignored.
    pub fn on_signal_strength(&mut self, signal: SignalStrength, unsolicited: bool) {
        if unsolicited && !self.unsolicited_signal {
            debug!("Radio pushes signal strength, stopping signal polls");
            self.unsolicited_signal = true;
        }
        if signal.is_gsm_unknown() && self.current.is_in_service() {
            debug!("Suppressing unknown signal reading while in service");
            return;
        }
        if signal == self.signal {
            return;
        }
        self.signal = signal;
        self.signal_registrants.notify(signal);
    }

    // ========================================================================
    // Radio power
    // ========================================================================

    pub fn set_radio_power(&mut self, on: bool) {
        info!("Radio power requested {}", if on { "on" } else { "off" });
        self.desired_power = on;
        if on {
            if let Some(pending) = self.power_off.take() {
                info!("Power-off {} cancelled", pending.generation);
            }
        }
        self.apply_desired_power();
    }

    fn apply_desired_power(&mut self) {
        match (self.desired_power, self.radio_state) {
            (true, RadioState::Off) => self.send_radio_power(true),
            (false, RadioState::On) => self.power_off_radio(),
            _ => {}
        }
    }

    /// First phase of power-off: tear data down, then power off when it is
    /// gone or the timeout expires.
    fn power_off_radio(&mut self) {
        if self.power_off.is_some() {
            debug!("Power-off already pending");
            return;
        }
        if self.data.is_disconnected() {
            self.data.clean_up_all(reason::RADIO_TURNED_OFF);
            self.send_radio_power(false);
            return;
        }

        self.data.clean_up_all(reason::RADIO_TURNED_OFF);
        self.power_off_generation = self.power_off_generation.wrapping_add(1);
        let pending = PendingPowerOff {
            generation: self.power_off_generation,
            deadline: Instant::now() + self.power_off_timeout,
        };
        info!(
            "Waiting up to {:?} for data to disconnect (power-off {})",
            self.power_off_timeout, pending.generation
        );
        self.power_off = Some(pending);
    }

    /// Data finished disconnecting.
    pub fn on_all_data_disconnected(&mut self) {
        if let Some(pending) = self.power_off.take() {
            info!("Data disconnected, completing power-off {}", pending.generation);
            self.send_radio_power(false);
        }
    }

    /// Power-off timeout for the given generation fired.
    pub fn on_power_off_timeout(&mut self, generation: u32) {
        match self.power_off {
            Some(pending) if pending.generation == generation => {
                warn!("Data did not disconnect in time, forcing power-off {}", generation);
                self.power_off = None;
                self.send_radio_power(false);
            }
            _ => debug!("Ignoring stale power-off timeout {}", generation),
        }
    }

    /// Fires the power-off timeout if its deadline has passed.
    pub fn fire_timers(&mut self, now: Instant) {
        if let Some(pending) = self.power_off.filter(|p| p.deadline <= now) {
            self.on_power_off_timeout(pending.generation);
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn send_radio_power(&mut self, on: bool) {
        self.issue(Query::RadioPower(on), RilRequest::SetRadioPower(on), 0);
    }

    fn issue(&mut self, query: Query, request: RilRequest, generation: u32) {
        self.next_serial += 1;
        let token = RequestToken::new(RequestOwner::Registration, generation, self.next_serial);
        self.outstanding.insert(self.next_serial, query);
        self.radio.send(token, request);
    }

    /// Makes the pending snapshot current and publishes the edges.
    fn swap_snapshot(&mut self) {
        let old = std::mem::replace(&mut self.current, self.pending.clone());
        self.current.ps_restricted = old.ps_restricted;
        if old != self.current {
            debug!("Registration {} -> {}", old, self.current);
        }

        let mut edges = Vec::new();
        if old.rat != self.current.rat {
            edges.push(RegistrationEvent::RadioTechChanged(self.current.rat));
        }
        if !old.voice.is_in_service() && self.current.voice.is_in_service() {
            edges.push(RegistrationEvent::NetworkAttached);
        }
        if old.operator != self.current.operator && self.current.operator.numeric.is_some() {
            edges.push(RegistrationEvent::OperatorChanged(self.current.operator.clone()));
        }
        match (old.roaming, self.current.roaming) {
            (false, true) => edges.push(RegistrationEvent::RoamingOn),
            (true, false) => edges.push(RegistrationEvent::RoamingOff),
            _ => {}
        }
        match (old.data.is_in_service(), self.current.data.is_in_service()) {
            (false, true) => edges.push(RegistrationEvent::DataAttached),
            (true, false) => edges.push(RegistrationEvent::DataDetached),
            _ => {}
        }

        for edge in edges {
            info!("Registration edge {}", edge);
            self.registrants.notify(edge);
        }
    }
}

impl std::fmt::Debug for RegistrationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationTracker")
            .field("current", &self.current)
            .field("poll", &self.poll)
            .field("radio_state", &self.radio_state)
            .field("desired_power", &self.desired_power)
            .field("power_off", &self.power_off)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use telsim_common::{RadioTechnology, ServiceState};
    use telsim_ril::{OperatorInfo, RadioCapabilities, RecordingRadio, RegistrationState};

    #[derive(Default)]
    struct DataState {
        disconnected: AtomicBool,
        cleanups: AtomicUsize,
    }

    struct FakeData(Arc<DataState>);

    impl DataControl for FakeData {
        fn is_disconnected(&self) -> bool {
            self.0.disconnected.load(Ordering::SeqCst)
        }

        fn clean_up_all(&mut self, _reason: &str) {
            self.0.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        radio: Arc<RecordingRadio>,
        data: Arc<DataState>,
        tracker: RegistrationTracker,
        events: mpsc::UnboundedReceiver<RegistrationEvent>,
    }

    impl Harness {
        fn new() -> Self {
            let config = PhoneConfig {
                home_plmn: Plmn::new(310, 410, true),
                power_off_timeout_ms: 5_000,
                ..Default::default()
            };
            let radio = RecordingRadio::new(RadioCapabilities::default());
            let data = Arc::new(DataState::default());
            data.disconnected.store(true, Ordering::SeqCst);
            let mut tracker =
                RegistrationTracker::new(&config, radio.clone(), Box::new(FakeData(data.clone())));
            let events = tracker.subscribe();
            Self {
                radio,
                data,
                tracker,
                events,
            }
        }

        /// Radio on with the power-on request already answered.
        fn powered() -> Self {
            let mut h = Self::new();
            h.tracker.on_radio_state_changed(RadioState::On);
            h
        }

        fn token_for(&self, pred: impl Fn(&RilRequest) -> bool) -> RequestToken {
            self.radio.last_token(pred).unwrap()
        }

        fn respond(&mut self, pred: impl Fn(&RilRequest) -> bool, payload: RilPayload) {
            let token = self.token_for(pred);
            self.tracker.on_radio_response(RilResponse::ok(token, payload));
        }

        fn answer_poll(&mut self, status: u8, numeric: &str) {
            let reg = RegistrationState {
                status,
                rat: RadioTechnology::Lte,
                ..Default::default()
            };
            let op = OperatorInfo {
                long_name: Some("Op".to_string()),
                short_name: Some("Op".to_string()),
                numeric: Some(numeric.to_string()),
            };
            self.respond(|r| matches!(r, RilRequest::Operator), RilPayload::Operator(op));
            self.respond(
                |r| matches!(r, RilRequest::DataRegistrationState),
                RilPayload::Registration(reg.clone()),
            );
            self.respond(
                |r| matches!(r, RilRequest::VoiceRegistrationState),
                RilPayload::Registration(reg),
            );
            self.respond(
                |r| matches!(r, RilRequest::NetworkSelectionMode),
                RilPayload::NetworkSelectionMode { manual: false },
            );
        }

        fn events(&mut self) -> Vec<RegistrationEvent> {
            let mut out = Vec::new();
            while let Ok(e) = self.events.try_recv() {
                out.push(e);
            }
            out
        }

        fn power_requests(&self, on: bool) -> usize {
            self.radio
                .count(|r| matches!(r, RilRequest::SetRadioPower(p) if *p == on))
        }
    }

    #[test]
    fn test_attach_fires_once_after_full_cycle() {
        let mut h = Harness::powered();
        let ctx = h.tracker.poll_context().unwrap();
        assert_eq!(ctx.remaining, 4);

        h.respond(
            |r| matches!(r, RilRequest::DataRegistrationState),
            RilPayload::Registration(RegistrationState {
                status: RegistrationState::HOME,
                rat: RadioTechnology::Lte,
                ..Default::default()
            }),
        );
        // Partial cycle: nothing swapped yet
        assert!(h.events().is_empty());
        assert_eq!(h.tracker.snapshot().data, ServiceState::OutOfService);

        h.answer_poll(RegistrationState::HOME, "310410");
        let events = h.events();
        assert_eq!(
            events.iter().filter(|e| **e == RegistrationEvent::DataAttached).count(),
            1
        );
        assert!(events.contains(&RegistrationEvent::NetworkAttached));
        assert!(events.contains(&RegistrationEvent::RadioTechChanged(RadioTechnology::Lte)));
        assert!(h.tracker.poll_context().is_none());

        // Same state again: no edges
        h.tracker.poll_state();
        h.answer_poll(RegistrationState::HOME, "310410");
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_rat_change_precedes_attach() {
        let mut h = Harness::powered();
        h.answer_poll(RegistrationState::HOME, "310410");
        let events = h.events();
        let rat = events
            .iter()
            .position(|e| matches!(e, RegistrationEvent::RadioTechChanged(_)))
            .unwrap();
        let attach = events
            .iter()
            .position(|e| *e == RegistrationEvent::DataAttached)
            .unwrap();
        assert!(rat < attach);
    }

    #[test]
    fn test_poll_mutual_exclusion() {
        let mut h = Harness::powered();
        let first = h.tracker.poll_context().unwrap();
        h.tracker.poll_state();
        assert_eq!(h.tracker.poll_context(), Some(first));
        assert_eq!(h.radio.count(|r| matches!(r, RilRequest::Operator)), 1);

        h.answer_poll(RegistrationState::HOME, "310410");
        // Deferred poll started after completion
        let second = h.tracker.poll_context().unwrap();
        assert_ne!(second.generation, first.generation);
        assert_eq!(h.radio.count(|r| matches!(r, RilRequest::Operator)), 2);
    }

    #[test]
    fn test_stale_poll_response_dropped() {
        let mut h = Harness::powered();
        let stale = h.token_for(|r| matches!(r, RilRequest::Operator));
        h.tracker.on_radio_state_changed(RadioState::Off);
        h.tracker.on_radio_state_changed(RadioState::On);

        h.tracker.on_radio_response(RilResponse::ok(
            stale,
            RilPayload::Operator(OperatorInfo::default()),
        ));
        assert_eq!(h.tracker.poll_context().unwrap().remaining, 4);
    }

    #[test]
    fn test_radio_not_available_cancels_cycle() {
        let mut h = Harness::powered();
        let token = h.token_for(|r| matches!(r, RilRequest::Operator));
        h.tracker
            .on_radio_response(RilResponse::err(token, RilError::RadioNotAvailable));
        assert!(h.tracker.poll_context().is_none());

        // Remaining answers of the cancelled cycle are ignored
        h.answer_poll(RegistrationState::HOME, "310410");
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_roaming_edges() {
        let mut h = Harness::powered();
        h.answer_poll(RegistrationState::ROAMING, "23415");
        assert!(h.events().contains(&RegistrationEvent::RoamingOn));
        assert!(h.tracker.snapshot().roaming);

        h.tracker.poll_state();
        h.answer_poll(RegistrationState::HOME, "310410");
        let events = h.events();
        assert!(events.contains(&RegistrationEvent::RoamingOff));
        assert!(events.iter().any(|e| matches!(e, RegistrationEvent::OperatorChanged(_))));
    }

    #[test]
    fn test_radio_unavailable_detaches() {
        let mut h = Harness::powered();
        h.answer_poll(RegistrationState::HOME, "310410");
        h.events();

        h.tracker.on_radio_state_changed(RadioState::Unavailable);
        assert!(h.events().contains(&RegistrationEvent::DataDetached));
        assert_eq!(h.tracker.snapshot().voice, ServiceState::OutOfService);
    }

    #[test]
    fn test_radio_off_snapshot() {
        let mut h = Harness::powered();
        h.tracker.set_radio_power(false);
        h.tracker.on_radio_state_changed(RadioState::Off);
        assert_eq!(h.tracker.snapshot().voice, ServiceState::PowerOff);
        assert!(h.tracker.poll_context().is_none());
    }

    #[test]
    fn test_radio_on_applies_desired_power() {
        let mut h = Harness::new();
        h.tracker.on_radio_state_changed(RadioState::Off);
        assert_eq!(h.power_requests(true), 1);
    }

    #[test]
    fn test_ps_restricted_edges() {
        let mut h = Harness::powered();
        let restricted = RestrictedState {
            ps_restricted: true,
            ..Default::default()
        };
        h.tracker.on_restricted_state_changed(restricted);
        h.tracker.on_restricted_state_changed(restricted);
        assert_eq!(h.events(), vec![RegistrationEvent::PsRestrictedEnabled]);

        h.answer_poll(RegistrationState::HOME, "310410");
        assert!(h.tracker.snapshot().ps_restricted);
        h.events();

        h.tracker.on_restricted_state_changed(RestrictedState::default());
        assert_eq!(h.events(), vec![RegistrationEvent::PsRestrictedDisabled]);
    }

    #[test]
    fn test_signal_unknown_suppressed_in_service() {
        let mut h = Harness::powered();
        let mut signals = h.tracker.subscribe_signal();
        h.answer_poll(RegistrationState::HOME, "310410");

        h.tracker.on_signal_strength(SignalStrength::gsm(20), false);
        assert_eq!(signals.try_recv().unwrap().gsm_rssi, 20);

        h.tracker.on_signal_strength(SignalStrength::gsm(99), false);
        assert!(signals.try_recv().is_err());
        assert_eq!(h.tracker.signal_strength().gsm_rssi, 20);

        // Unchanged readings are not republished
        h.tracker.on_signal_strength(SignalStrength::gsm(20), false);
        assert!(signals.try_recv().is_err());
    }

    #[test]
    fn test_signal_unknown_accepted_out_of_service() {
        let mut h = Harness::powered();
        h.tracker.on_signal_strength(SignalStrength::gsm(20), false);
        h.tracker.on_signal_strength(SignalStrength::gsm(99), false);
        assert!(h.tracker.signal_strength().is_gsm_unknown());
    }

    #[test]
    fn test_unsolicited_signal_stops_polling() {
        let mut h = Harness::powered();
        h.tracker.poll_signal_strength();
        assert_eq!(h.radio.count(|r| matches!(r, RilRequest::SignalStrength)), 1);
        h.respond(
            |r| matches!(r, RilRequest::SignalStrength),
            RilPayload::SignalStrength(SignalStrength::gsm(12)),
        );
        assert_eq!(h.tracker.signal_strength().gsm_rssi, 12);

        h.tracker.on_signal_strength(SignalStrength::gsm(15), true);
        h.tracker.poll_signal_strength();
        assert_eq!(h.radio.count(|r| matches!(r, RilRequest::SignalStrength)), 1);
    }

    #[test]
    fn test_power_off_when_data_disconnected() {
        let mut h = Harness::powered();
        h.tracker.set_radio_power(false);
        assert_eq!(h.power_requests(false), 1);
        assert_eq!(h.data.cleanups.load(Ordering::SeqCst), 1);
        assert!(h.tracker.pending_power_off().is_none());
    }

    #[test]
    fn test_power_off_waits_for_data() {
        let mut h = Harness::powered();
        h.data.disconnected.store(false, Ordering::SeqCst);
        h.tracker.set_radio_power(false);
        assert_eq!(h.power_requests(false), 0);
        assert!(h.tracker.pending_power_off().is_some());

        h.tracker.on_all_data_disconnected();
        assert_eq!(h.power_requests(false), 1);

        // The timeout of the finished cycle is stale
        let generation = h.tracker.power_off_generation;
        h.tracker.on_power_off_timeout(generation);
        assert_eq!(h.power_requests(false), 1);
    }

    #[test]
    fn test_power_off_timeout_wins() {
        let mut h = Harness::powered();
        h.data.disconnected.store(false, Ordering::SeqCst);
        h.tracker.set_radio_power(false);
        let pending = h.tracker.pending_power_off().unwrap();

        h.tracker.fire_timers(pending.deadline - Duration::from_millis(1));
        assert_eq!(h.power_requests(false), 0);

        h.tracker.fire_timers(pending.deadline);
        assert_eq!(h.power_requests(false), 1);

        // Late disconnect does not power off twice
        h.tracker.on_all_data_disconnected();
        assert_eq!(h.power_requests(false), 1);
    }

    #[test]
    fn test_stale_timeout_from_earlier_cycle() {
        let mut h = Harness::powered();
        h.data.disconnected.store(false, Ordering::SeqCst);
        h.tracker.set_radio_power(false);
        let first = h.tracker.pending_power_off().unwrap().generation;
        h.tracker.on_all_data_disconnected();

        h.tracker.set_radio_power(true);
        h.tracker.set_radio_power(false);
        let second = h.tracker.pending_power_off().unwrap().generation;
        assert_ne!(first, second);

        h.tracker.on_power_off_timeout(first);
        assert!(h.tracker.pending_power_off().is_some());
        assert_eq!(h.power_requests(false), 1);
    }

    #[test]
    fn test_power_on_cancels_pending_power_off() {
        let mut h = Harness::powered();
        h.data.disconnected.store(false, Ordering::SeqCst);
        h.tracker.set_radio_power(false);
        let pending = h.tracker.pending_power_off().unwrap();

        h.tracker.set_radio_power(true);
        assert!(h.tracker.pending_power_off().is_none());
        assert_eq!(h.tracker.next_deadline(), None);

        h.tracker.fire_timers(pending.deadline);
        h.tracker.on_power_off_timeout(pending.generation);
        h.tracker.on_all_data_disconnected();
        assert_eq!(h.power_requests(false), 0);
    }
}
