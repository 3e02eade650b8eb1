//! Test utility functions for integration tests
//!
//! Logging setup and helpers for waiting on the phone's event streams.

use std::time::Duration;

use telsim_phone::{DataEvent, RegistrationEvent};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing_subscriber::{fmt, EnvFilter};

/// Result type for integration tests
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Initialize logging for tests
///
/// Uses RUST_LOG environment variable if set, otherwise defaults to "info"
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
}

/// Receives until an event matching `pred` arrives, returning it together
/// with everything skipped on the way.
async fn expect_event<E, F>(
    rx: &mut mpsc::UnboundedReceiver<E>,
    what: &str,
    mut pred: F,
) -> TestResult<(E, Vec<E>)>
where
    F: FnMut(&E) -> bool,
{
    let mut skipped = Vec::new();
    let result = timeout(DEFAULT_TEST_TIMEOUT, async {
        while let Some(event) = rx.recv().await {
            if pred(&event) {
                return Some(event);
            }
            skipped.push(event);
        }
        None
    })
    .await;

    match result {
        Ok(Some(event)) => Ok((event, skipped)),
        Ok(None) => Err(format!("Event stream closed before {what}").into()),
        Err(_) => Err(format!("Timed out waiting for {what}").into()),
    }
}

/// Waits for a data event matching `pred`.
pub async fn expect_data_event<F>(
    rx: &mut mpsc::UnboundedReceiver<DataEvent>,
    what: &str,
    pred: F,
) -> TestResult<(DataEvent, Vec<DataEvent>)>
where
    F: FnMut(&DataEvent) -> bool,
{
    expect_event(rx, what, pred).await
}

/// Waits for a registration edge matching `pred`.
pub async fn expect_registration_event<F>(
    rx: &mut mpsc::UnboundedReceiver<RegistrationEvent>,
    what: &str,
    pred: F,
) -> TestResult<(RegistrationEvent, Vec<RegistrationEvent>)>
where
    F: FnMut(&RegistrationEvent) -> bool,
{
    expect_event(rx, what, pred).await
}

/// Drains whatever is queued without waiting.
pub fn drain<E>(rx: &mut mpsc::UnboundedReceiver<E>) -> Vec<E> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

/// Everything that arrives within `window`, for asserting that something
/// does not happen.
pub async fn collect_for<E>(rx: &mut mpsc::UnboundedReceiver<E>, window: Duration) -> Vec<E> {
    sleep(window).await;
    drain(rx)
}

/// Default timeout for test operations
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(10);
