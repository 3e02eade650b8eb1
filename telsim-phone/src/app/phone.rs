//! Phone assembly
//!
//! Wires the simulated radio, the radio router, the service state task and
//! the data task together and hands their lifecycles to a [`TaskManager`].

use std::sync::Arc;
use std::time::Duration;

use telsim_common::PhoneConfig;
use telsim_ril::{RadioCommandChannel, SignalStrength, SimControl, SimulatedRadio};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::dc::{DataEvent, DataTask};
use crate::radio::RadioTask;
use crate::sst::{RegistrationEvent, ServiceStateTask};
use crate::tasks::{
    PhoneTaskBase, RadioMessage, Task, TaskError, TaskId, TaskManager, DEFAULT_CHANNEL_CAPACITY,
    DEFAULT_SHUTDOWN_TIMEOUT_MS,
};

/// Event streams subscribed before the tasks start.
#[derive(Debug)]
pub struct PhoneEvents {
    pub data: mpsc::UnboundedReceiver<DataEvent>,
    pub registration: mpsc::UnboundedReceiver<RegistrationEvent>,
    pub signal: mpsc::UnboundedReceiver<SignalStrength>,
}

/// A running phone on top of a simulated radio.
pub struct Phone {
    task_manager: TaskManager,
    radio_join: JoinHandle<()>,
}

impl Phone {
    /// Spawns the simulated radio and every phone task on the current
    /// runtime.
    pub fn start(config: PhoneConfig) -> (Self, PhoneEvents) {
        info!(
            "Starting phone: home PLMN {}, {} APN(s), enabled types {:?}",
            config.home_plmn,
            config.apns.len(),
            config.enabled_apn_types
        );

        let sim = SimulatedRadio::spawn(config.radio.clone());
        let radio: Arc<dyn RadioCommandChannel> = Arc::new(sim.client);

        let (mut task_manager, radio_rx, sst_rx, data_rx) =
            TaskManager::new(config, DEFAULT_CHANNEL_CAPACITY);
        let task_base = task_manager.task_base();

        let (registration_tx, registration_rx) = mpsc::unbounded_channel();
        let (mut data_task, data_control) =
            DataTask::new(task_base.clone(), radio.clone(), registration_rx);
        let mut sst_task = ServiceStateTask::new(
            task_base.clone(),
            radio,
            Box::new(data_control),
            registration_tx,
        );
        let mut radio_task = RadioTask::new(task_base, sim.events, Some(sim.control));

        let events = PhoneEvents {
            data: data_task.subscribe(),
            registration: sst_task.subscribe(),
            signal: sst_task.subscribe_signal(),
        };

        task_manager.register_task_handle(
            TaskId::Data,
            tokio::spawn(async move {
                data_task.run(data_rx).await;
                Ok::<(), TaskError>(())
            }),
        );
        task_manager.register_task_handle(
            TaskId::ServiceState,
            tokio::spawn(async move {
                sst_task.run(sst_rx).await;
                Ok::<(), TaskError>(())
            }),
        );
        task_manager.register_task_handle(
            TaskId::Radio,
            tokio::spawn(async move {
                radio_task.run(radio_rx).await;
                Ok::<(), TaskError>(())
            }),
        );
        info!("Phone tasks spawned");

        let phone = Self {
            task_manager,
            radio_join: sim.join,
        };
        (phone, events)
    }

    /// Handles for sending requests to the tasks.
    pub fn task_base(&self) -> PhoneTaskBase {
        self.task_manager.task_base()
    }

    pub fn task_manager(&self) -> &TaskManager {
        &self.task_manager
    }

    /// Steers the simulated radio.
    pub async fn control(&self, ctl: SimControl) -> Result<(), TaskError> {
        self.task_base()
            .radio_tx
            .send(RadioMessage::Control(ctl))
            .await
    }

    /// Stops every task, then waits for the simulated radio to wind down.
    pub async fn shutdown(mut self) -> Result<(), TaskError> {
        let result = self.task_manager.shutdown().await;
        // The radio exits once every command sender is dropped
        drop(self.task_manager);
        let timeout = Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS);
        match tokio::time::timeout(timeout, self.radio_join).await {
            Ok(Ok(())) => info!("Simulated radio stopped"),
            Ok(Err(e)) => warn!("Simulated radio ended abnormally: {}", e),
            Err(_) => warn!("Simulated radio did not stop within {:?}", timeout),
        }
        result
    }
}

impl std::fmt::Debug for Phone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Phone")
            .field("tasks", &self.task_manager.status_summary())
            .finish()
    }
}
