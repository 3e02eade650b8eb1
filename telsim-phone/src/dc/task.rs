//! Data Task
//!
//! Drives the [`ConnectionRegistry`]: feeds it radio responses and
//! indications, registration edges from the service state task, and user
//! requests, and fires its reconnect alarms.

use std::sync::Arc;

use telsim_ril::RadioCommandChannel;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use super::registry::{ConnectionRegistry, DataEvent};
use crate::sst::{DataControl, RegistrationEvent};
use crate::tasks::{DataMessage, PhoneTaskBase, SstMessage, Task, TaskHandle, TaskMessage};

/// Data task.
pub struct DataTask {
    task_base: PhoneTaskBase,
    registry: ConnectionRegistry,
    registration_rx: mpsc::UnboundedReceiver<RegistrationEvent>,
    data_events: mpsc::UnboundedReceiver<DataEvent>,
    disconnected_tx: watch::Sender<bool>,
}

impl DataTask {
    /// Creates the task and the control handle the service state task uses
    /// to tear data down before powering the radio off.
    pub fn new(
        task_base: PhoneTaskBase,
        radio: Arc<dyn RadioCommandChannel>,
        registration_rx: mpsc::UnboundedReceiver<RegistrationEvent>,
    ) -> (Self, DataTaskControl) {
        let mut registry = ConnectionRegistry::new(&task_base.config, radio);
        let data_events = registry.subscribe();
        let (disconnected_tx, disconnected_rx) = watch::channel(registry.is_all_disconnected());

        let control = DataTaskControl {
            data_tx: task_base.data_tx.clone(),
            disconnected: disconnected_rx,
        };
        let task = Self {
            task_base,
            registry,
            registration_rx,
            data_events,
            disconnected_tx,
        };
        (task, control)
    }

    /// Subscribes to data events. Must be called before the task runs.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<DataEvent> {
        self.registry.subscribe()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    fn handle_message(&mut self, msg: DataMessage) {
        match msg {
            DataMessage::RadioResponse(response) => self.registry.on_radio_response(response),
            DataMessage::RadioStateChanged(state) => self.registry.on_radio_state_changed(state),
            DataMessage::DataCallListChanged(calls) => {
                self.registry.on_data_call_list_changed(calls)
            }
            DataMessage::EnableApnType(apn_type) => self.registry.enable_apn_type(apn_type),
            DataMessage::DisableApnType(apn_type) => self.registry.disable_apn_type(apn_type),
            DataMessage::SetDataEnabled(enabled) => self.registry.set_data_enabled(enabled),
            DataMessage::SetRoamingAllowed(allowed) => self.registry.set_roaming_allowed(allowed),
            DataMessage::CleanUpAll { reason } => self.registry.clean_up_all(&reason),
        }
    }

    /// Forwards registry events that other tasks need and refreshes the
    /// disconnected flag.
    async fn after_step(&mut self) {
        while let Ok(event) = self.data_events.try_recv() {
            match event {
                DataEvent::AllDisconnected => {
                    if let Err(e) = self
                        .task_base
                        .sst_tx
                        .send(SstMessage::AllDataDisconnected)
                        .await
                    {
                        error!("Failed to notify service state task: {}", e);
                    }
                }
                DataEvent::Connected { apn_type, bearer, link } => {
                    info!("{} connected on bearer {} ({})", apn_type, bearer, link);
                }
                DataEvent::SetupFailed {
                    apn_type,
                    cause,
                    retry_after,
                } => match retry_after {
                    Some(delay) => {
                        info!("{} setup failed ({}), retry in {:?}", apn_type, cause, delay)
                    }
                    None => info!("{} setup failed ({}), not retrying", apn_type, cause),
                },
                other => debug!("Data event {:?}", other),
            }
        }
        self.disconnected_tx
            .send_replace(self.registry.is_all_disconnected());
    }
}

#[async_trait::async_trait]
impl Task for DataTask {
    type Message = DataMessage;

    async fn run(&mut self, mut rx: mpsc::Receiver<TaskMessage<Self::Message>>) {
        info!(
            "Data task started with {} APN settings",
            self.registry.settings().len()
        );

        let enabled = self.task_base.config.enabled_apn_types.clone();
        for apn_type in enabled {
            self.registry.enable_apn_type(apn_type);
        }
        self.after_step().await;

        let mut registration_open = true;
        loop {
            let alarm = self.registry.next_alarm();
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(TaskMessage::Message(msg)) => self.handle_message(msg),
                    Some(TaskMessage::Shutdown) | None => {
                        info!("Data task received shutdown signal");
                        break;
                    }
                },
                event = self.registration_rx.recv(), if registration_open => match event {
                    Some(event) => self.registry.on_registration_event(event),
                    None => registration_open = false,
                },
                _ = sleep_until(alarm.unwrap_or_else(Instant::now)), if alarm.is_some() => {
                    self.registry.fire_alarms(Instant::now());
                }
            }
            self.after_step().await;
        }

        info!("Data task stopped");
    }
}

/// [`DataControl`] backed by the data task's message channel.
#[derive(Debug, Clone)]
pub struct DataTaskControl {
    data_tx: TaskHandle<DataMessage>,
    disconnected: watch::Receiver<bool>,
}

impl DataControl for DataTaskControl {
    fn is_disconnected(&self) -> bool {
        *self.disconnected.borrow()
    }

    fn clean_up_all(&mut self, reason: &str) {
        let msg = DataMessage::CleanUpAll {
            reason: reason.to_string(),
        };
        if let Err(e) = self.data_tx.try_send(msg) {
            warn!("Failed to request data clean-up: {}", e);
        }
    }
}
