//! Simulated radio
//!
//! A scripted radio interface layer that answers requests from its
//! [`RadioConfig`]. It keeps a table of active data calls, tracks radio power
//! and pushes unsolicited indications, so the phone tasks can run end to end
//! without a modem. Tests steer it at runtime through [`SimControl`].

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use telsim_common::{log_ril_message, Direction, RadioConfig, RadioState};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::channel::{RadioCapabilities, RilClient, RilCommand, RilMessageSender};
use crate::protocol::{
    CallActivity, DataCallResponse, OperatorInfo, RegistrationState, RestrictedState,
    RilError, RilIndication, RilMessage, RilPayload, RilRequest, RilResponse, SignalStrength,
    NO_SUGGESTED_RETRY,
};

/// Cause reported when a setup is attempted with the radio off.
const RADIO_POWER_OFF_CAUSE: i32 = -5;

/// Runtime control of the simulated radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimControl {
    /// Changes the registration status of both domains and notifies the phone
    SetRegistration { voice: u8, data: u8 },
    /// Network drops a data call
    DropDataCall { cid: i32 },
    SetRestricted(RestrictedState),
    /// Changes rssi; pushed to the phone when unsolicited signal is enabled
    SetRssi(i32),
    /// Queues failure causes for the next setups
    FailNextSetups(Vec<i32>),
    /// Modem goes away or comes back
    SetAvailable(bool),
    /// Stops answering teardown requests
    IgnoreDeactivate(bool),
}

/// Scripted radio interface layer.
pub struct SimulatedRadio {
    config: RadioConfig,
    state: RadioState,
    state_tx: watch::Sender<RadioState>,
    events: RilMessageSender,
    calls: BTreeMap<i32, DataCallResponse>,
    next_cid: i32,
    setup_failures: VecDeque<i32>,
    last_fail_cause: i32,
    ignore_deactivate: bool,
}

/// Handles to a spawned simulated radio.
pub struct SimHandles {
    /// Command side, handed to the phone's state machines
    pub client: RilClient,
    /// Responses and indications for the phone
    pub events: mpsc::UnboundedReceiver<RilMessage>,
    pub control: mpsc::UnboundedSender<SimControl>,
    pub join: JoinHandle<()>,
}

impl SimulatedRadio {
    pub fn new(
        config: RadioConfig,
        events: RilMessageSender,
    ) -> (Self, watch::Receiver<RadioState>) {
        let (state_tx, state_rx) = watch::channel(RadioState::Off);
        let setup_failures = config.setup_failures.iter().copied().collect();
        let radio = Self {
            config,
            state: RadioState::Off,
            state_tx,
            events,
            calls: BTreeMap::new(),
            next_cid: 1,
            setup_failures,
            last_fail_cause: 0,
            ignore_deactivate: false,
        };
        (radio, state_rx)
    }

    /// Spawns the radio on the current runtime.
    pub fn spawn(config: RadioConfig) -> SimHandles {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let capabilities = RadioCapabilities {
            inline_fail_cause: config.inline_fail_cause,
        };
        let (radio, state_rx) = Self::new(config, event_tx);
        let client = RilClient::new(cmd_tx, state_rx, capabilities);
        let join = tokio::spawn(radio.run(cmd_rx, control_rx));

        SimHandles {
            client,
            events: event_rx,
            control: control_tx,
            join,
        }
    }

    /// Serves requests until the command channel closes.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<RilCommand>,
        mut control: mpsc::UnboundedReceiver<SimControl>,
    ) {
        info!("Simulated radio started");
        self.indicate(RilIndication::RadioStateChanged(self.state));

        let delay = Duration::from_millis(self.config.response_delay_ms);
        let mut control_open = true;

        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    self.handle_command(cmd);
                }
                ctl = control.recv(), if control_open => {
                    match ctl {
                        Some(ctl) => self.handle_control(ctl),
                        None => control_open = false,
                    }
                }
            }
        }

        info!("Simulated radio stopped");
    }

    pub fn handle_command(&mut self, cmd: RilCommand) {
        let RilCommand { token, request } = cmd;
        debug!("Sim radio request {} for {}", request.name(), token);

        let result = match request {
            RilRequest::SetupDataCall(params) => self.setup_data_call(&params.apn),
            RilRequest::DeactivateDataCall { cid, .. } => {
                if self.ignore_deactivate {
                    debug!("Sim radio ignoring teardown of cid {}", cid);
                    return;
                }
                self.calls.remove(&cid);
                Ok(RilPayload::Ack)
            }
            RilRequest::LastDataCallFailCause => Ok(RilPayload::LastFailCause(self.last_fail_cause)),
            RilRequest::VoiceRegistrationState => self.registration(false),
            RilRequest::DataRegistrationState => self.registration(true),
            RilRequest::Operator => self.operator(),
            RilRequest::NetworkSelectionMode => self
                .require_available()
                .map(|_| RilPayload::NetworkSelectionMode { manual: false }),
            RilRequest::SignalStrength => self
                .require_available()
                .map(|_| RilPayload::SignalStrength(SignalStrength::gsm(self.config.rssi))),
            RilRequest::SetRadioPower(on) => self.require_available().map(|_| {
                self.set_state(if on { RadioState::On } else { RadioState::Off });
                RilPayload::Ack
            }),
        };

        log_ril_message(Direction::Rx, response_name(&result), &token.to_string());
        let _ = self.events.send(RilMessage::Response(RilResponse { token, result }));
    }

    pub fn handle_control(&mut self, ctl: SimControl) {
        debug!("Sim radio control {:?}", ctl);
        match ctl {
            SimControl::SetRegistration { voice, data } => {
                self.config.voice_registration.status = voice;
                self.config.data_registration.status = data;
                self.indicate(RilIndication::NetworkStateChanged);
            }
            SimControl::DropDataCall { cid } => {
                if self.calls.remove(&cid).is_some() {
                    self.indicate(RilIndication::DataCallListChanged(
                        self.calls.values().cloned().collect(),
                    ));
                }
            }
            SimControl::SetRestricted(restricted) => {
                self.indicate(RilIndication::RestrictedStateChanged(restricted));
            }
            SimControl::SetRssi(rssi) => {
                self.config.rssi = rssi;
                if self.config.unsolicited_signal && self.state.is_on() {
                    self.indicate(RilIndication::SignalStrength(SignalStrength::gsm(rssi)));
                }
            }
            SimControl::FailNextSetups(causes) => self.setup_failures.extend(causes),
            SimControl::SetAvailable(available) => {
                let state = if available {
                    RadioState::Off
                } else {
                    RadioState::Unavailable
                };
                self.set_state(state);
            }
            SimControl::IgnoreDeactivate(ignore) => self.ignore_deactivate = ignore,
        }
    }

    /// Currently active call ids.
    pub fn active_cids(&self) -> Vec<i32> {
        self.calls.keys().copied().collect()
    }

    fn setup_data_call(&mut self, apn: &str) -> Result<RilPayload, RilError> {
        self.require_available()?;

        let cause = if !self.state.is_on() {
            Some(RADIO_POWER_OFF_CAUSE)
        } else {
            self.setup_failures.pop_front()
        };

        if let Some(cause) = cause {
            self.last_fail_cause = cause;
            return if self.config.inline_fail_cause {
                Ok(RilPayload::SetupDataCall(DataCallResponse::failure(
                    cause,
                    NO_SUGGESTED_RETRY,
                )))
            } else {
                Err(RilError::GenericFailure)
            };
        }

        let cid = self.next_cid;
        self.next_cid += 1;
        let call = DataCallResponse {
            status: 0,
            suggested_retry_ms: NO_SUGGESTED_RETRY,
            cid,
            active: CallActivity::Up,
            pdp_type: "IP".to_string(),
            ifname: format!("rmnet{}", cid - 1),
            addresses: vec![format!("10.0.{}.2/24", cid)],
            dnses: vec!["8.8.8.8".to_string(), "8.8.4.4".to_string()],
            gateways: vec![format!("10.0.{}.1", cid)],
            mtu: 1500,
        };
        info!("Sim radio activated cid {} on APN {}", cid, apn);
        self.calls.insert(cid, call.clone());
        Ok(RilPayload::SetupDataCall(call))
    }

    fn registration(&self, data: bool) -> Result<RilPayload, RilError> {
        self.require_available()?;
        let configured = if data {
            &self.config.data_registration
        } else {
            &self.config.voice_registration
        };
        let state = if self.state.is_on() {
            RegistrationState {
                status: configured.status,
                lac: Some(1),
                cell_id: Some(1),
                rat: configured.rat,
                css_indicator: false,
                reason_denied: None,
            }
        } else {
            RegistrationState::default()
        };
        Ok(RilPayload::Registration(state))
    }

    fn operator(&self) -> Result<RilPayload, RilError> {
        self.require_available()?;
        let registered = self.state.is_on()
            && (is_registered(self.config.voice_registration.status)
                || is_registered(self.config.data_registration.status));
        if !registered {
            return Ok(RilPayload::Operator(OperatorInfo::default()));
        }
        let (long, short, numeric) = self.config.operator.clone();
        Ok(RilPayload::Operator(OperatorInfo {
            long_name: Some(long),
            short_name: Some(short),
            numeric: Some(numeric),
        }))
    }

    fn require_available(&self) -> Result<(), RilError> {
        if self.state.is_available() {
            Ok(())
        } else {
            Err(RilError::RadioNotAvailable)
        }
    }

    fn set_state(&mut self, state: RadioState) {
        if self.state == state {
            return;
        }
        info!("Sim radio state {} -> {}", self.state, state);
        self.state = state;
        if !state.is_on() {
            self.calls.clear();
        }
        let _ = self.state_tx.send(state);
        self.indicate(RilIndication::RadioStateChanged(state));
    }

    fn indicate(&self, indication: RilIndication) {
        log_ril_message(Direction::Rx, indication.name(), "-");
        let _ = self.events.send(RilMessage::Indication(indication));
    }
}

fn is_registered(status: u8) -> bool {
    status == RegistrationState::HOME || status == RegistrationState::ROAMING
}

fn response_name(result: &Result<RilPayload, RilError>) -> &'static str {
    match result {
        Ok(_) => "RESPONSE",
        Err(_) => "RESPONSE_ERROR",
    }
}
