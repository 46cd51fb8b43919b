//! Circuit breaker timing laws

use binance_bridge::breaker::{BreakerError, CircuitBreaker, CircuitState};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
#[error("downstream failed")]
struct DownstreamError;

#[tokio::test]
async fn test_open_breaker_fails_fast_until_recovery_timeout() {
    let breaker = CircuitBreaker::new("test", 3, Duration::from_millis(300));
    let invocations = Arc::new(AtomicU32::new(0));

    let call = |should_fail: bool| {
        let invocations = Arc::clone(&invocations);
        let breaker = &breaker;
        async move {
            breaker
                .call(|| async move {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    if should_fail {
                        Err(DownstreamError)
                    } else {
                        Ok(())
                    }
                })
                .await
        }
    };

    for _ in 0..3 {
        assert!(matches!(call(true).await, Err(BreakerError::Inner(_))));
    }
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(invocations.load(Ordering::SeqCst), 3);

    // For most of the recovery window every call is rejected without
    // touching the protected operation.
    let start = std::time::Instant::now();
    while start.elapsed() < Duration::from_millis(250) {
        assert!(matches!(call(false).await, Err(BreakerError::Open)));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 3);

    // After the timeout a single probe runs and closes the breaker.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(call(false).await.is_ok());
    assert_eq!(invocations.load(Ordering::SeqCst), 4);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_reopened_breaker_waits_a_full_recovery_window() {
    let breaker = CircuitBreaker::new("test", 1, Duration::from_millis(200));

    let fail = || async {
        breaker
            .call(|| async { Err::<(), _>(DownstreamError) })
            .await
    };
    let succeed = || async { breaker.call(|| async { Ok::<(), DownstreamError>(()) }).await };

    assert!(fail().await.is_err());
    assert_eq!(breaker.state(), CircuitState::Open);

    // Probe fails, reopening with a fresh window.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(matches!(fail().await, Err(BreakerError::Inner(_))));
    assert_eq!(breaker.state(), CircuitState::Open);

    // Immediately after reopening, calls still fail fast.
    assert!(matches!(succeed().await, Err(BreakerError::Open)));

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(succeed().await.is_ok());
    assert_eq!(breaker.state(), CircuitState::Closed);
}
