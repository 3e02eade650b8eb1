//! Data connection scenario tests
//!
//! Runs the phone against the simulated radio and checks bring-up, retry
//! after transient failures, permanent failures, teardown, and recovery
//! when the network drops a call.

use std::time::Duration;

use integration_tests::{collect_for, expect_data_event, init_test_logging, TestPhoneConfig};
use telsim_common::ApnType;
use telsim_phone::{DataEvent, DataMessage, FailCause, Phone};
use telsim_ril::SimControl;

/// 0x1A, retried
const INSUFFICIENT_RESOURCES: i32 = 0x1A;
/// 0x1B, never retried
const MISSING_UNKNOWN_APN: i32 = 0x1B;

fn is_connected(apn_type: ApnType) -> impl Fn(&DataEvent) -> bool {
    move |e| matches!(e, DataEvent::Connected { apn_type: t, .. } if *t == apn_type)
}

fn is_disconnected(apn_type: ApnType) -> impl Fn(&DataEvent) -> bool {
    move |e| matches!(e, DataEvent::Disconnected { apn_type: t, .. } if *t == apn_type)
}

#[tokio::test]
async fn test_default_connects_after_attach() {
    init_test_logging();

    let (phone, mut events) = Phone::start(TestPhoneConfig::new().build());

    let (event, _) = expect_data_event(&mut events.data, "default connected", is_connected(ApnType::Default))
        .await
        .unwrap();
    match event {
        DataEvent::Connected { link, .. } => {
            assert_eq!(link.interface_name, "rmnet0");
            assert_eq!(link.mtu, 1500);
            assert!(!link.addresses.is_empty());
        }
        other => panic!("unexpected {:?}", other),
    }

    phone.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_transient_failures_retry_then_connect() {
    init_test_logging();

    let config = TestPhoneConfig::new()
        .with_setup_failures(&[INSUFFICIENT_RESOURCES, INSUFFICIENT_RESOURCES])
        .build();
    let (phone, mut events) = Phone::start(config);

    let (_, skipped) = expect_data_event(&mut events.data, "default connected", is_connected(ApnType::Default))
        .await
        .unwrap();

    let failures: Vec<_> = skipped
        .iter()
        .filter_map(|e| match e {
            DataEvent::SetupFailed {
                cause, retry_after, ..
            } => Some((*cause, *retry_after)),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 2);
    assert!(failures
        .iter()
        .all(|(cause, retry)| *cause == FailCause::InsufficientResources && retry.is_some()));
    // Backoff grows along the configured schedule
    assert!(failures[0].1 < failures[1].1);

    phone.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_fail_cause_fetched_when_not_inline() {
    init_test_logging();

    let config = TestPhoneConfig::new()
        .without_inline_fail_cause()
        .with_setup_failures(&[INSUFFICIENT_RESOURCES])
        .build();
    let (phone, mut events) = Phone::start(config);

    let (event, _) = expect_data_event(&mut events.data, "setup failure", |e| {
        matches!(e, DataEvent::SetupFailed { .. })
    })
    .await
    .unwrap();
    assert!(matches!(
        event,
        DataEvent::SetupFailed {
            cause: FailCause::InsufficientResources,
            retry_after: Some(_),
            ..
        }
    ));

    expect_data_event(&mut events.data, "default connected", is_connected(ApnType::Default))
        .await
        .unwrap();

    phone.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_permanent_failure_not_retried() {
    init_test_logging();

    let config = TestPhoneConfig::new()
        .with_setup_failures(&[MISSING_UNKNOWN_APN])
        .build();
    let (phone, mut events) = Phone::start(config);

    let (event, _) = expect_data_event(&mut events.data, "setup failure", |e| {
        matches!(e, DataEvent::SetupFailed { .. })
    })
    .await
    .unwrap();
    assert!(matches!(
        event,
        DataEvent::SetupFailed {
            apn_type: ApnType::Default,
            cause: FailCause::MissingUnknownApn,
            retry_after: None,
        }
    ));

    // Longer than the whole retry schedule
    assert!(!collect_for(&mut events.data, Duration::from_millis(500))
        .await
        .iter()
        .any(is_connected(ApnType::Default)));

    phone.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_lost_call_reconnects() {
    init_test_logging();

    let (phone, mut events) = Phone::start(TestPhoneConfig::new().build());
    expect_data_event(&mut events.data, "default connected", is_connected(ApnType::Default))
        .await
        .unwrap();

    phone.control(SimControl::DropDataCall { cid: 1 }).await.unwrap();

    expect_data_event(&mut events.data, "default lost", is_disconnected(ApnType::Default))
        .await
        .unwrap();
    let (event, _) = expect_data_event(&mut events.data, "default reconnected", is_connected(ApnType::Default))
        .await
        .unwrap();
    match event {
        DataEvent::Connected { link, .. } => assert_eq!(link.interface_name, "rmnet1"),
        other => panic!("unexpected {:?}", other),
    }

    phone.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_mms_gets_its_own_bearer() {
    init_test_logging();

    let (phone, mut events) = Phone::start(TestPhoneConfig::new().with_mms().build());

    let mut bearers = Vec::new();
    for _ in 0..2 {
        let (event, _) = expect_data_event(&mut events.data, "connection", |e| {
            matches!(e, DataEvent::Connected { .. })
        })
        .await
        .unwrap();
        if let DataEvent::Connected {
            apn_type, bearer, ..
        } = event
        {
            bearers.push((apn_type, bearer));
        }
    }

    bearers.sort();
    assert_eq!(bearers[0].0, ApnType::Default);
    assert_eq!(bearers[1].0, ApnType::Mms);
    assert_ne!(bearers[0].1, bearers[1].1);

    phone.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_hipri_shares_default_bearer() {
    init_test_logging();

    let (phone, mut events) = Phone::start(TestPhoneConfig::new().build());
    let (first, _) = expect_data_event(&mut events.data, "default connected", is_connected(ApnType::Default))
        .await
        .unwrap();

    phone
        .task_base()
        .data_tx
        .send(DataMessage::EnableApnType(ApnType::Hipri))
        .await
        .unwrap();
    let (second, _) = expect_data_event(&mut events.data, "hipri connected", is_connected(ApnType::Hipri))
        .await
        .unwrap();

    match (first, second) {
        (DataEvent::Connected { bearer: a, .. }, DataEvent::Connected { bearer: b, .. }) => {
            assert_eq!(a, b)
        }
        other => panic!("unexpected {:?}", other),
    }

    phone.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_disable_apn_type_disconnects() {
    init_test_logging();

    let (phone, mut events) = Phone::start(TestPhoneConfig::new().build());
    expect_data_event(&mut events.data, "default connected", is_connected(ApnType::Default))
        .await
        .unwrap();

    phone
        .task_base()
        .data_tx
        .send(DataMessage::DisableApnType(ApnType::Default))
        .await
        .unwrap();

    let (event, _) = expect_data_event(&mut events.data, "default disconnected", is_disconnected(ApnType::Default))
        .await
        .unwrap();
    assert_eq!(
        event,
        DataEvent::Disconnected {
            apn_type: ApnType::Default,
            reason: "apnDisabled".to_string(),
        }
    );

    assert!(!collect_for(&mut events.data, Duration::from_millis(300))
        .await
        .iter()
        .any(is_connected(ApnType::Default)));

    phone.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_data_toggle_tears_down_and_restores() {
    init_test_logging();

    let (phone, mut events) = Phone::start(TestPhoneConfig::new().build());
    expect_data_event(&mut events.data, "default connected", is_connected(ApnType::Default))
        .await
        .unwrap();

    let data_tx = phone.task_base().data_tx;
    data_tx.send(DataMessage::SetDataEnabled(false)).await.unwrap();
    expect_data_event(&mut events.data, "all disconnected", |e| {
        matches!(e, DataEvent::AllDisconnected)
    })
    .await
    .unwrap();

    data_tx.send(DataMessage::SetDataEnabled(true)).await.unwrap();
    expect_data_event(&mut events.data, "default reconnected", is_connected(ApnType::Default))
        .await
        .unwrap();

    phone.shutdown().await.unwrap();
}
