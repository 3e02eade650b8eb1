//! Service State Task
//!
//! Owns the [`RegistrationTracker`]. Besides routing messages it runs the
//! periodic signal strength poll and the power-off timeout.

use std::sync::Arc;
use std::time::Duration;

use telsim_ril::{RadioCommandChannel, SignalStrength};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::info;

use super::events::RegistrationEvent;
use super::tracker::{DataControl, RegistrationTracker};
use crate::tasks::{PhoneTaskBase, SstMessage, Task, TaskMessage};

pub struct ServiceStateTask {
    task_base: PhoneTaskBase,
    tracker: RegistrationTracker,
}

impl ServiceStateTask {
    /// Creates the task. Registration edges are also delivered to
    /// `registration_tx`, which feeds the data task.
    pub fn new(
        task_base: PhoneTaskBase,
        radio: Arc<dyn RadioCommandChannel>,
        data: Box<dyn DataControl>,
        registration_tx: mpsc::UnboundedSender<RegistrationEvent>,
    ) -> Self {
        let mut tracker = RegistrationTracker::new(&task_base.config, radio, data);
        tracker.subscribe_sender(registration_tx);
        Self { task_base, tracker }
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<RegistrationEvent> {
        self.tracker.subscribe()
    }

    pub fn subscribe_signal(&mut self) -> mpsc::UnboundedReceiver<SignalStrength> {
        self.tracker.subscribe_signal()
    }

    pub fn tracker(&self) -> &RegistrationTracker {
        &self.tracker
    }

    fn handle_message(&mut self, msg: SstMessage) {
        match msg {
            SstMessage::RadioResponse(response) => self.tracker.on_radio_response(response),
            SstMessage::RadioStateChanged(state) => self.tracker.on_radio_state_changed(state),
            SstMessage::NetworkStateChanged => self.tracker.on_network_state_changed(),
            SstMessage::SignalStrength(signal) => self.tracker.on_signal_strength(signal, true),
            SstMessage::RestrictedStateChanged(restricted) => {
                self.tracker.on_restricted_state_changed(restricted)
            }
            SstMessage::AllDataDisconnected => self.tracker.on_all_data_disconnected(),
            SstMessage::SetRadioPower(on) => self.tracker.set_radio_power(on),
            SstMessage::PollState => self.tracker.poll_state(),
        }
    }
}

#[async_trait::async_trait]
impl Task for ServiceStateTask {
    type Message = SstMessage;

    async fn run(&mut self, mut rx: mpsc::Receiver<TaskMessage<Self::Message>>) {
        let period = Duration::from_millis(self.task_base.config.signal_poll_interval_ms.max(1));
        info!("Service state task started (signal poll every {:?})", period);

        let mut signal_timer = interval(period);
        signal_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.tracker.next_deadline();
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(TaskMessage::Message(msg)) => self.handle_message(msg),
                    Some(TaskMessage::Shutdown) | None => {
                        info!("Service state task received shutdown signal");
                        break;
                    }
                },
                _ = signal_timer.tick(), if !self.tracker.has_unsolicited_signal() => {
                    self.tracker.poll_signal_strength();
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.tracker.fire_timers(Instant::now());
                }
            }
        }

        info!("Service state task stopped");
    }
}
