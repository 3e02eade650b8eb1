//! Registration scenario tests
//!
//! Attach edges, roaming, packet-domain restriction, signal strength and
//! the two-phase radio power-off, observed end to end.

use std::time::Duration;

use integration_tests::{
    collect_for, drain, expect_data_event, expect_registration_event, init_test_logging,
    TestPhoneConfig,
};
use telsim_common::{ApnType, RadioTechnology};
use telsim_phone::{DataEvent, Phone, RegistrationEvent, SstMessage};
use telsim_ril::{RegistrationState, RestrictedState, SimControl};

fn is_connected(e: &DataEvent) -> bool {
    matches!(e, DataEvent::Connected { apn_type: ApnType::Default, .. })
}

#[tokio::test]
async fn test_attach_edges_in_order() {
    init_test_logging();

    let (phone, mut events) = Phone::start(TestPhoneConfig::new().build());

    let (_, before) = expect_registration_event(&mut events.registration, "data attach", |e| {
        *e == RegistrationEvent::DataAttached
    })
    .await
    .unwrap();

    let rat_pos = before
        .iter()
        .position(|e| *e == RegistrationEvent::RadioTechChanged(RadioTechnology::Lte));
    let attach_pos = before
        .iter()
        .position(|e| *e == RegistrationEvent::NetworkAttached);
    assert!(rat_pos.is_some());
    assert!(attach_pos.is_some());
    assert!(rat_pos < attach_pos);
    assert!(before
        .iter()
        .any(|e| matches!(e, RegistrationEvent::OperatorChanged(op) if op.numeric.as_deref() == Some("00101"))));

    // Further polls of an unchanged network publish nothing new
    phone.task_base().sst_tx.send(SstMessage::PollState).await.unwrap();
    assert!(collect_for(&mut events.registration, Duration::from_millis(200))
        .await
        .is_empty());

    phone.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_data_waits_for_registration() {
    init_test_logging();

    let config = TestPhoneConfig::new()
        .with_registration(RegistrationState::SEARCHING)
        .build();
    let (phone, mut events) = Phone::start(config);

    assert!(!collect_for(&mut events.data, Duration::from_millis(300))
        .await
        .iter()
        .any(is_connected));
    assert!(!drain(&mut events.registration).contains(&RegistrationEvent::DataAttached));

    phone
        .control(SimControl::SetRegistration {
            voice: RegistrationState::HOME,
            data: RegistrationState::HOME,
        })
        .await
        .unwrap();

    expect_registration_event(&mut events.registration, "data attach", |e| {
        *e == RegistrationEvent::DataAttached
    })
    .await
    .unwrap();
    expect_data_event(&mut events.data, "default connected", is_connected)
        .await
        .unwrap();

    phone.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_roaming_disallowed_tears_down() {
    init_test_logging();

    let (phone, mut events) = Phone::start(TestPhoneConfig::new().build());
    expect_data_event(&mut events.data, "default connected", is_connected)
        .await
        .unwrap();

    phone
        .control(SimControl::SetRegistration {
            voice: RegistrationState::ROAMING,
            data: RegistrationState::ROAMING,
        })
        .await
        .unwrap();

    expect_registration_event(&mut events.registration, "roaming on", |e| {
        *e == RegistrationEvent::RoamingOn
    })
    .await
    .unwrap();
    let (event, _) = expect_data_event(&mut events.data, "roaming teardown", |e| {
        matches!(e, DataEvent::Disconnected { .. })
    })
    .await
    .unwrap();
    assert_eq!(
        event,
        DataEvent::Disconnected {
            apn_type: ApnType::Default,
            reason: "roamingOn".to_string(),
        }
    );

    phone
        .control(SimControl::SetRegistration {
            voice: RegistrationState::HOME,
            data: RegistrationState::HOME,
        })
        .await
        .unwrap();
    expect_registration_event(&mut events.registration, "roaming off", |e| {
        *e == RegistrationEvent::RoamingOff
    })
    .await
    .unwrap();
    expect_data_event(&mut events.data, "default reconnected", is_connected)
        .await
        .unwrap();

    phone.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_roaming_allowed_keeps_connection() {
    init_test_logging();

    let config = TestPhoneConfig::new().with_roaming_allowed(true).build();
    let (phone, mut events) = Phone::start(config);
    expect_data_event(&mut events.data, "default connected", is_connected)
        .await
        .unwrap();

    phone
        .control(SimControl::SetRegistration {
            voice: RegistrationState::ROAMING,
            data: RegistrationState::ROAMING,
        })
        .await
        .unwrap();
    expect_registration_event(&mut events.registration, "roaming on", |e| {
        *e == RegistrationEvent::RoamingOn
    })
    .await
    .unwrap();

    assert!(!collect_for(&mut events.data, Duration::from_millis(200))
        .await
        .iter()
        .any(|e| matches!(e, DataEvent::Disconnected { .. })));

    phone.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_ps_restriction_tears_down_and_restores() {
    init_test_logging();

    let (phone, mut events) = Phone::start(TestPhoneConfig::new().build());
    expect_data_event(&mut events.data, "default connected", is_connected)
        .await
        .unwrap();

    phone
        .control(SimControl::SetRestricted(RestrictedState {
            cs_restricted: false,
            ps_restricted: true,
        }))
        .await
        .unwrap();
    expect_registration_event(&mut events.registration, "ps restricted", |e| {
        *e == RegistrationEvent::PsRestrictedEnabled
    })
    .await
    .unwrap();
    expect_data_event(&mut events.data, "all disconnected", |e| {
        matches!(e, DataEvent::AllDisconnected)
    })
    .await
    .unwrap();

    phone
        .control(SimControl::SetRestricted(RestrictedState::default()))
        .await
        .unwrap();
    expect_registration_event(&mut events.registration, "ps unrestricted", |e| {
        *e == RegistrationEvent::PsRestrictedDisabled
    })
    .await
    .unwrap();
    expect_data_event(&mut events.data, "default reconnected", is_connected)
        .await
        .unwrap();

    phone.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_power_off_waits_for_data_then_powers_back_on() {
    init_test_logging();

    let (phone, mut events) = Phone::start(TestPhoneConfig::new().build());
    expect_data_event(&mut events.data, "default connected", is_connected)
        .await
        .unwrap();

    let sst_tx = phone.task_base().sst_tx;
    sst_tx.send(SstMessage::SetRadioPower(false)).await.unwrap();

    let (event, _) = expect_data_event(&mut events.data, "radio-off teardown", |e| {
        matches!(e, DataEvent::Disconnected { .. })
    })
    .await
    .unwrap();
    assert_eq!(
        event,
        DataEvent::Disconnected {
            apn_type: ApnType::Default,
            reason: "radioTurnedOff".to_string(),
        }
    );
    expect_registration_event(&mut events.registration, "data detach", |e| {
        *e == RegistrationEvent::DataDetached
    })
    .await
    .unwrap();

    // No reconnect while the radio is off
    assert!(!collect_for(&mut events.data, Duration::from_millis(200))
        .await
        .iter()
        .any(is_connected));

    sst_tx.send(SstMessage::SetRadioPower(true)).await.unwrap();
    expect_registration_event(&mut events.registration, "data attach", |e| {
        *e == RegistrationEvent::DataAttached
    })
    .await
    .unwrap();
    expect_data_event(&mut events.data, "default reconnected", is_connected)
        .await
        .unwrap();

    phone.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_power_off_timeout_forces_radio_off() {
    init_test_logging();

    let config = TestPhoneConfig::new().with_power_off_timeout_ms(300).build();
    let (phone, mut events) = Phone::start(config);
    expect_data_event(&mut events.data, "default connected", is_connected)
        .await
        .unwrap();

    phone.control(SimControl::IgnoreDeactivate(true)).await.unwrap();
    phone
        .task_base()
        .sst_tx
        .send(SstMessage::SetRadioPower(false))
        .await
        .unwrap();

    expect_registration_event(&mut events.registration, "data detach", |e| {
        *e == RegistrationEvent::DataDetached
    })
    .await
    .unwrap();
    let (_, skipped) = expect_data_event(&mut events.data, "all disconnected", |e| {
        matches!(e, DataEvent::AllDisconnected)
    })
    .await
    .unwrap();
    assert!(skipped.iter().any(|e| matches!(
        e,
        DataEvent::Disconnected { apn_type: ApnType::Default, .. }
    )));

    phone.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_radio_unavailable_drops_everything() {
    init_test_logging();

    let (phone, mut events) = Phone::start(TestPhoneConfig::new().build());
    expect_data_event(&mut events.data, "default connected", is_connected)
        .await
        .unwrap();

    phone.control(SimControl::SetAvailable(false)).await.unwrap();

    expect_data_event(&mut events.data, "default dropped", |e| {
        matches!(e, DataEvent::Disconnected { apn_type: ApnType::Default, .. })
    })
    .await
    .unwrap();
    expect_registration_event(&mut events.registration, "data detach", |e| {
        *e == RegistrationEvent::DataDetached
    })
    .await
    .unwrap();

    phone.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unsolicited_signal_reported() {
    init_test_logging();

    let config = TestPhoneConfig::new().with_unsolicited_signal().build();
    let (phone, mut events) = Phone::start(config);
    expect_registration_event(&mut events.registration, "network attach", |e| {
        *e == RegistrationEvent::NetworkAttached
    })
    .await
    .unwrap();

    phone.control(SimControl::SetRssi(25)).await.unwrap();

    let signal = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.signal.recv().await {
                Some(s) if s.gsm_rssi == 25 => return Some(s),
                Some(_) => continue,
                None => return None,
            }
        }
    })
    .await
    .unwrap();
    assert!(signal.is_some());

    phone.shutdown().await.unwrap();
}
