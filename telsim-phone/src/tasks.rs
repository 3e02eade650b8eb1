//! Phone task framework
//!
//! The phone runs as three actor tasks that talk only through bounded
//! channels carrying [`TaskMessage`]s:
//!
//! - **RADIO** routes responses to the state machine that issued the
//!   request and fans unsolicited indications out to the others
//! - **SST** tracks registration, signal strength and radio power
//! - **DC** owns the connection registry and its bearers
//!
//! [`TaskManager`] records each task's lifecycle and stops them all within
//! a deadline on shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use telsim_common::{ApnType, PhoneConfig, RadioState};
use telsim_ril::{DataCallResponse, RestrictedState, RilResponse, SignalStrength, SimControl};

/// Queue depth of every task channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// How long shutdown waits for all tasks together.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5000;

// ============================================================================
// Envelope and identity
// ============================================================================

/// What travels on a task channel.
#[derive(Debug)]
pub enum TaskMessage<T> {
    Message(T),
    /// Stop after the current message
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskId {
    Radio,
    ServiceState,
    Data,
}

impl TaskId {
    /// Every task, in start order.
    pub const ALL: [TaskId; 3] = [TaskId::Radio, TaskId::ServiceState, TaskId::Data];

    fn index(self) -> usize {
        match self {
            TaskId::Radio => 0,
            TaskId::ServiceState => 1,
            TaskId::Data => 2,
        }
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskId::Radio => write!(f, "RADIO"),
            TaskId::ServiceState => write!(f, "SST"),
            TaskId::Data => write!(f, "DC"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    #[default]
    Created,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Created => write!(f, "CREATED"),
            TaskState::Running => write!(f, "RUNNING"),
            TaskState::Stopping => write!(f, "STOPPING"),
            TaskState::Stopped => write!(f, "STOPPED"),
            TaskState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Lifecycle record of one task.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: TaskId,
    pub state: TaskState,
    /// When the task entered its current state
    pub since: Instant,
    pub error: Option<String>,
}

impl TaskInfo {
    fn new(id: TaskId) -> Self {
        Self {
            id,
            state: TaskState::Created,
            since: Instant::now(),
            error: None,
        }
    }

    fn set_state(&mut self, state: TaskState) {
        debug!("Task {}: {} -> {}", self.id, self.state, state);
        self.state = state;
        self.since = Instant::now();
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("{0} task channel closed")]
    ChannelClosed(TaskId),

    #[error("{0} task channel full")]
    ChannelFull(TaskId),

    #[error("{0} task panicked")]
    Panicked(TaskId),

    #[error("{0} task did not stop in time")]
    ShutdownTimeout(TaskId),

    #[error("{task} task failed: {reason}")]
    Failed { task: TaskId, reason: String },

    /// More than one task failed to stop cleanly
    #[error("{} tasks failed during shutdown", .0.len())]
    Multiple(Vec<TaskError>),
}

impl TaskError {
    /// Task the error is about; the first one for [`TaskError::Multiple`].
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            TaskError::ChannelClosed(id)
            | TaskError::ChannelFull(id)
            | TaskError::Panicked(id)
            | TaskError::ShutdownTimeout(id) => Some(*id),
            TaskError::Failed { task, .. } => Some(*task),
            TaskError::Multiple(errors) => errors.first().and_then(TaskError::task_id),
        }
    }
}

// ============================================================================
// Task trait
// ============================================================================

/// An actor driven by its own channel until [`TaskMessage::Shutdown`] or
/// until every sender is gone.
#[async_trait::async_trait]
pub trait Task: Send + 'static {
    type Message: Send;

    async fn run(&mut self, rx: mpsc::Receiver<TaskMessage<Self::Message>>);
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug)]
pub enum RadioMessage {
    /// Steers the simulated radio
    Control(SimControl),
}

#[derive(Debug)]
pub enum SstMessage {
    /// Response to a registration, operator, signal or power request
    RadioResponse(RilResponse),
    RadioStateChanged(RadioState),
    NetworkStateChanged,
    /// Unsolicited signal report
    SignalStrength(SignalStrength),
    RestrictedStateChanged(RestrictedState),
    /// Every data connection is down after a clean-up request
    AllDataDisconnected,
    SetRadioPower(bool),
    PollState,
}

#[derive(Debug)]
pub enum DataMessage {
    /// Response to a bearer request
    RadioResponse(RilResponse),
    RadioStateChanged(RadioState),
    DataCallListChanged(Vec<DataCallResponse>),
    EnableApnType(ApnType),
    DisableApnType(ApnType),
    SetDataEnabled(bool),
    SetRoamingAllowed(bool),
    /// Tear down every connection
    CleanUpAll { reason: String },
}

// ============================================================================
// Handles
// ============================================================================

/// Sending side of one task's channel.
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: TaskId,
    tx: mpsc::Sender<TaskMessage<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            tx: self.tx.clone(),
        }
    }
}

impl<T> TaskHandle<T> {
    pub fn new(id: TaskId, tx: mpsc::Sender<TaskMessage<T>>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Waits for queue space.
    pub async fn send(&self, msg: T) -> Result<(), TaskError> {
        self.tx
            .send(TaskMessage::Message(msg))
            .await
            .map_err(|_| TaskError::ChannelClosed(self.id))
    }

    /// Never waits; fails when the queue is full.
    pub fn try_send(&self, msg: T) -> Result<(), TaskError> {
        self.tx
            .try_send(TaskMessage::Message(msg))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => TaskError::ChannelFull(self.id),
                mpsc::error::TrySendError::Closed(_) => TaskError::ChannelClosed(self.id),
            })
    }

    pub async fn shutdown(&self) -> Result<(), TaskError> {
        self.tx
            .send(TaskMessage::Shutdown)
            .await
            .map_err(|_| TaskError::ChannelClosed(self.id))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Configuration plus a handle to every task, cloned into each of them.
#[derive(Clone)]
pub struct PhoneTaskBase {
    pub config: Arc<PhoneConfig>,
    pub radio_tx: TaskHandle<RadioMessage>,
    pub sst_tx: TaskHandle<SstMessage>,
    pub data_tx: TaskHandle<DataMessage>,
}

impl PhoneTaskBase {
    /// Creates the channels; the receivers go to the tasks' `run`.
    pub fn new(
        config: PhoneConfig,
        channel_capacity: usize,
    ) -> (
        Self,
        mpsc::Receiver<TaskMessage<RadioMessage>>,
        mpsc::Receiver<TaskMessage<SstMessage>>,
        mpsc::Receiver<TaskMessage<DataMessage>>,
    ) {
        let (radio_tx, radio_rx) = mpsc::channel(channel_capacity);
        let (sst_tx, sst_rx) = mpsc::channel(channel_capacity);
        let (data_tx, data_rx) = mpsc::channel(channel_capacity);

        let base = Self {
            config: Arc::new(config),
            radio_tx: TaskHandle::new(TaskId::Radio, radio_tx),
            sst_tx: TaskHandle::new(TaskId::ServiceState, sst_tx),
            data_tx: TaskHandle::new(TaskId::Data, data_tx),
        };
        (base, radio_rx, sst_rx, data_rx)
    }

    /// Asks every task to stop. Tasks that are already gone are skipped.
    pub async fn shutdown_all(&self) {
        for result in [
            self.data_tx.shutdown().await,
            self.sst_tx.shutdown().await,
            self.radio_tx.shutdown().await,
        ] {
            if let Err(e) = result {
                debug!("Shutdown not delivered: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for PhoneTaskBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhoneTaskBase")
            .field("home_plmn", &self.config.home_plmn)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Task manager
// ============================================================================

pub struct TaskManager {
    task_base: PhoneTaskBase,
    tasks: [TaskInfo; 3],
    join_handles: Vec<(TaskId, JoinHandle<Result<(), TaskError>>)>,
}

impl TaskManager {
    pub fn new(
        config: PhoneConfig,
        channel_capacity: usize,
    ) -> (
        Self,
        mpsc::Receiver<TaskMessage<RadioMessage>>,
        mpsc::Receiver<TaskMessage<SstMessage>>,
        mpsc::Receiver<TaskMessage<DataMessage>>,
    ) {
        let (task_base, radio_rx, sst_rx, data_rx) = PhoneTaskBase::new(config, channel_capacity);
        let manager = Self {
            task_base,
            tasks: TaskId::ALL.map(TaskInfo::new),
            join_handles: Vec::new(),
        };
        (manager, radio_rx, sst_rx, data_rx)
    }

    pub fn task_base(&self) -> PhoneTaskBase {
        self.task_base.clone()
    }

    pub fn task_info(&self, id: TaskId) -> &TaskInfo {
        &self.tasks[id.index()]
    }

    pub fn task_state(&self, id: TaskId) -> TaskState {
        self.task_info(id).state
    }

    pub fn all_tasks_running(&self) -> bool {
        self.tasks.iter().all(|t| t.state == TaskState::Running)
    }

    /// Takes ownership of a spawned task and marks it running.
    pub fn register_task_handle(&mut self, id: TaskId, handle: JoinHandle<Result<(), TaskError>>) {
        self.join_handles.push((id, handle));
        self.tasks[id.index()].set_state(TaskState::Running);
    }

    /// Stops every task and waits for them, sharing one deadline.
    ///
    /// A task that returns an error, panics or outlives the deadline is
    /// marked failed and reported; the others are marked stopped.
    pub async fn shutdown(&mut self) -> Result<(), TaskError> {
        info!("Stopping {} task(s)", self.join_handles.len());
        for info in self.tasks.iter_mut().filter(|t| t.state == TaskState::Running) {
            info.set_state(TaskState::Stopping);
        }
        self.task_base.shutdown_all().await;

        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS);
        let mut errors = Vec::new();
        for (id, handle) in std::mem::take(&mut self.join_handles) {
            let outcome = match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(TaskError::Panicked(id)),
                Err(_) => Err(TaskError::ShutdownTimeout(id)),
            };
            let info = &mut self.tasks[id.index()];
            match outcome {
                Ok(()) => info.set_state(TaskState::Stopped),
                Err(e) => {
                    info.error = Some(e.to_string());
                    info.set_state(TaskState::Failed);
                    errors.push(e);
                }
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(TaskError::Multiple(errors)),
        }
    }

    /// State of every task, in [`TaskId::ALL`] order.
    pub fn status_summary(&self) -> Vec<(TaskId, TaskState)> {
        self.tasks.iter().map(|t| (t.id, t.state)).collect()
    }
}
