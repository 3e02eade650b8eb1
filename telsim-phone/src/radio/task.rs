//! Radio Task Implementation
//!
//! Reads the radio's response and indication stream and routes each message
//! to the task that owns it. Responses go by the owner recorded in their
//! token; indications fan out to every task that consumes them.

use telsim_common::{log_ril_message, Direction};
use telsim_ril::{RequestOwner, RilIndication, RilMessage, RilResponse, SimControl};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::tasks::{DataMessage, PhoneTaskBase, RadioMessage, SstMessage, Task, TaskMessage};

/// Radio message router.
pub struct RadioTask {
    task_base: PhoneTaskBase,
    events: mpsc::UnboundedReceiver<RilMessage>,
    control: Option<mpsc::UnboundedSender<SimControl>>,
}

impl RadioTask {
    /// `control` steers a simulated radio; pass `None` for a radio that
    /// cannot be scripted.
    pub fn new(
        task_base: PhoneTaskBase,
        events: mpsc::UnboundedReceiver<RilMessage>,
        control: Option<mpsc::UnboundedSender<SimControl>>,
    ) -> Self {
        Self {
            task_base,
            events,
            control,
        }
    }

    async fn route(&self, msg: RilMessage) {
        match msg {
            RilMessage::Response(response) => self.route_response(response).await,
            RilMessage::Indication(indication) => self.route_indication(indication).await,
        }
    }

    async fn route_response(&self, response: RilResponse) {
        let name = match &response.result {
            Ok(_) => "RESPONSE",
            Err(_) => "ERROR_RESPONSE",
        };
        log_ril_message(Direction::Rx, name, &response.token.to_string());

        let result = match response.token.owner {
            RequestOwner::Bearer(_) => self
                .task_base
                .data_tx
                .send(DataMessage::RadioResponse(response))
                .await,
            RequestOwner::Registration => self
                .task_base
                .sst_tx
                .send(SstMessage::RadioResponse(response))
                .await,
        };
        if let Err(e) = result {
            error!("Failed to route radio response: {}", e);
        }
    }

    async fn route_indication(&self, indication: RilIndication) {
        debug!("Radio indication {:?}", indication);
        let base = &self.task_base;
        let mut failed = false;

        match indication {
            RilIndication::RadioStateChanged(state) => {
                failed |= base
                    .sst_tx
                    .send(SstMessage::RadioStateChanged(state))
                    .await
                    .is_err();
                failed |= base
                    .data_tx
                    .send(DataMessage::RadioStateChanged(state))
                    .await
                    .is_err();
            }
            RilIndication::NetworkStateChanged => {
                failed |= base.sst_tx.send(SstMessage::NetworkStateChanged).await.is_err();
            }
            RilIndication::SignalStrength(signal) => {
                failed |= base
                    .sst_tx
                    .send(SstMessage::SignalStrength(signal))
                    .await
                    .is_err();
            }
            RilIndication::RestrictedStateChanged(restricted) => {
                failed |= base
                    .sst_tx
                    .send(SstMessage::RestrictedStateChanged(restricted))
                    .await
                    .is_err();
            }
            RilIndication::DataCallListChanged(calls) => {
                failed |= base
                    .data_tx
                    .send(DataMessage::DataCallListChanged(calls))
                    .await
                    .is_err();
            }
        }

        if failed {
            error!("Failed to route radio indication, task channel closed");
        }
    }

    fn handle_message(&self, msg: RadioMessage) {
        match msg {
            RadioMessage::Control(ctl) => match &self.control {
                Some(control) => {
                    debug!("Radio control {:?}", ctl);
                    if control.send(ctl).is_err() {
                        warn!("Simulated radio is gone, dropping control message");
                    }
                }
                None => warn!("Radio cannot be scripted, dropping {:?}", ctl),
            },
        }
    }
}

#[async_trait::async_trait]
impl Task for RadioTask {
    type Message = RadioMessage;

    async fn run(&mut self, mut rx: mpsc::Receiver<TaskMessage<Self::Message>>) {
        info!("Radio task started");

        let mut events_open = true;
        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(TaskMessage::Message(msg)) => self.handle_message(msg),
                    Some(TaskMessage::Shutdown) | None => {
                        info!("Radio task received shutdown signal");
                        break;
                    }
                },
                event = self.events.recv(), if events_open => match event {
                    Some(event) => self.route(event).await,
                    None => {
                        warn!("Radio event stream closed");
                        events_open = false;
                    }
                },
            }
        }

        info!("Radio task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::DEFAULT_CHANNEL_CAPACITY;
    use telsim_common::{PhoneConfig, RadioState};
    use telsim_ril::{RequestToken, RilPayload};

    #[tokio::test]
    async fn test_responses_routed_by_owner() {
        let (base, radio_rx, mut sst_rx, mut data_rx) =
            PhoneTaskBase::new(PhoneConfig::default(), DEFAULT_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut task = RadioTask::new(base.clone(), event_rx, None);
        let join = tokio::spawn(async move { task.run(radio_rx).await });

        let bearer_token = RequestToken::new(RequestOwner::Bearer(3), 1, 7);
        let reg_token = RequestToken::new(RequestOwner::Registration, 2, 8);
        event_tx
            .send(RilMessage::Response(RilResponse::ok(bearer_token, RilPayload::Ack)))
            .unwrap();
        event_tx
            .send(RilMessage::Response(RilResponse::ok(reg_token, RilPayload::Ack)))
            .unwrap();

        match data_rx.recv().await {
            Some(TaskMessage::Message(DataMessage::RadioResponse(r))) => {
                assert_eq!(r.token, bearer_token)
            }
            other => panic!("unexpected {:?}", other),
        }
        match sst_rx.recv().await {
            Some(TaskMessage::Message(SstMessage::RadioResponse(r))) => {
                assert_eq!(r.token, reg_token)
            }
            other => panic!("unexpected {:?}", other),
        }

        base.radio_tx.shutdown().await.unwrap();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn test_radio_state_fans_out() {
        let (base, radio_rx, mut sst_rx, mut data_rx) =
            PhoneTaskBase::new(PhoneConfig::default(), DEFAULT_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut task = RadioTask::new(base.clone(), event_rx, None);
        let join = tokio::spawn(async move { task.run(radio_rx).await });

        event_tx
            .send(RilMessage::Indication(RilIndication::RadioStateChanged(
                RadioState::On,
            )))
            .unwrap();
        event_tx
            .send(RilMessage::Indication(RilIndication::DataCallListChanged(
                Vec::new(),
            )))
            .unwrap();

        assert!(matches!(
            sst_rx.recv().await,
            Some(TaskMessage::Message(SstMessage::RadioStateChanged(RadioState::On)))
        ));
        assert!(matches!(
            data_rx.recv().await,
            Some(TaskMessage::Message(DataMessage::RadioStateChanged(RadioState::On)))
        ));
        assert!(matches!(
            data_rx.recv().await,
            Some(TaskMessage::Message(DataMessage::DataCallListChanged(calls))) if calls.is_empty()
        ));

        base.radio_tx.shutdown().await.unwrap();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn test_control_forwarded_to_radio() {
        let (base, radio_rx, _sst_rx, _data_rx) =
            PhoneTaskBase::new(PhoneConfig::default(), DEFAULT_CHANNEL_CAPACITY);
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();
        let mut task = RadioTask::new(base.clone(), event_rx, Some(control_tx));
        let join = tokio::spawn(async move { task.run(radio_rx).await });

        base.radio_tx
            .send(RadioMessage::Control(SimControl::SetRssi(12)))
            .await
            .unwrap();
        assert_eq!(control_rx.recv().await, Some(SimControl::SetRssi(12)));

        base.radio_tx.shutdown().await.unwrap();
        join.await.unwrap();
    }
}
