//! Dispatch Loop Tests
//!
//! Tests for:
//! - Removal and single persist on an invalid webhook
//! - Honoring rate-limit retry hints
//! - Transient failures keeping the loop alive
//! - Cooperative cancellation

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockService, RecordingSink, WEBHOOK_BASE};
use hp_common::{DeliveryResponse, Endpoint};
use hp_engine::{
    AddressSink, DispatchContext, DispatchLoop, EndpointRegistry, LoopExit, LoopState, MessagePool,
    MessagingService, Pacing,
};
use tokio::sync::watch;

struct Fixture {
    mock: Arc<MockService>,
    sink: Arc<RecordingSink>,
    registry: Arc<EndpointRegistry>,
    address: String,
    ctx: DispatchContext,
}

fn fixture(pacing: Pacing) -> Fixture {
    let mock = Arc::new(MockService::new());
    let sink = Arc::new(RecordingSink::new());
    let registry = Arc::new(EndpointRegistry::new());

    let endpoint = Endpoint::new("w1", "s1", "c1", WEBHOOK_BASE);
    let address = endpoint.address.clone();
    registry.upsert(endpoint);
    registry.try_claim(&address);

    let service: Arc<dyn MessagingService> = mock.clone();
    let dyn_sink: Arc<dyn AddressSink> = sink.clone();
    let ctx = DispatchContext {
        service,
        registry: registry.clone(),
        sink: dyn_sink,
        messages: Arc::new(MessagePool::new(vec!["hello".to_string()])),
        pacing,
    };

    Fixture { mock, sink, registry, address, ctx }
}

fn fixed(ms: u64) -> Pacing {
    Pacing::new(Duration::from_millis(ms), Duration::from_millis(ms))
}

#[tokio::test(start_paused = true)]
async fn test_not_found_removes_entry_and_persists_once() {
    let f = fixture(fixed(100));
    f.mock.push_response(DeliveryResponse::new(404));
    let (_stop_tx, stop_rx) = watch::channel(false);

    let exit = DispatchLoop::new(f.address.clone(), f.ctx.clone(), stop_rx).run().await;

    assert_eq!(exit, LoopExit::Stopped { status: 404 });
    assert!(!f.registry.contains(&f.address));
    assert_eq!(f.sink.save_count(), 1);
    assert_eq!(f.sink.last().unwrap(), Vec::<String>::new());

    // No further sends after the loop ended
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(f.mock.delivery_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_is_permanent() {
    let f = fixture(fixed(100));
    f.mock.push_response(DeliveryResponse::new(401));
    let (_stop_tx, stop_rx) = watch::channel(false);

    let mut dispatch = DispatchLoop::new(f.address.clone(), f.ctx.clone(), stop_rx);
    let exit = dispatch.step().await;

    assert_eq!(exit, Some(LoopExit::Stopped { status: 401 }));
    assert_eq!(dispatch.state(), LoopState::Stopped);
    assert!(f.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_waits_for_retry_hint() {
    let f = fixture(fixed(100));
    f.mock.push_response(DeliveryResponse::rate_limited(Some(2.0)));
    let (_stop_tx, stop_rx) = watch::channel(false);

    let mut dispatch = DispatchLoop::new(f.address.clone(), f.ctx.clone(), stop_rx);
    assert_eq!(dispatch.step().await, None);
    assert_eq!(dispatch.step().await, None);

    let deliveries = f.mock.deliveries();
    assert_eq!(deliveries.len(), 2);
    assert!(deliveries[1].at - deliveries[0].at >= Duration::from_millis(2000));
    assert!(f.registry.contains(&f.address));
    assert_eq!(f.sink.save_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_without_hint_uses_default_wait() {
    let f = fixture(fixed(100));
    f.mock.push_response(DeliveryResponse::rate_limited(None));
    let (_stop_tx, stop_rx) = watch::channel(false);

    let mut dispatch = DispatchLoop::new(f.address.clone(), f.ctx.clone(), stop_rx);
    dispatch.step().await;
    dispatch.step().await;

    let deliveries = f.mock.deliveries();
    assert_eq!(deliveries[1].at - deliveries[0].at, Duration::from_millis(1100));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_keep_sending() {
    let f = fixture(fixed(100));
    f.mock.push_response(DeliveryResponse::new(500));
    f.mock.push_response(DeliveryResponse::new(403));
    let (_stop_tx, stop_rx) = watch::channel(false);

    let mut dispatch = DispatchLoop::new(f.address.clone(), f.ctx.clone(), stop_rx);
    for _ in 0..3 {
        assert_eq!(dispatch.step().await, None);
    }

    assert_eq!(f.mock.delivery_count(), 3);
    assert!(f.registry.contains(&f.address));
    assert_eq!(dispatch.state(), LoopState::Running);
}

#[tokio::test(start_paused = true)]
async fn test_sends_are_paced_and_use_pool_bodies() {
    let f = fixture(Pacing::new(Duration::from_millis(300), Duration::from_millis(800)));
    let (_stop_tx, stop_rx) = watch::channel(false);

    let mut dispatch = DispatchLoop::new(f.address.clone(), f.ctx.clone(), stop_rx);
    for _ in 0..5 {
        dispatch.step().await;
    }

    let deliveries = f.mock.deliveries();
    for pair in deliveries.windows(2) {
        let gap = pair[1].at - pair[0].at;
        assert!(gap >= Duration::from_millis(300));
        assert!(gap <= Duration::from_millis(800));
    }
    assert!(deliveries.iter().all(|d| d.body == "hello" && d.address == f.address));
}

#[tokio::test(start_paused = true)]
async fn test_stop_signal_cancels_during_pause() {
    let f = fixture(fixed(10_000));
    let (stop_tx, stop_rx) = watch::channel(false);

    let started = tokio::time::Instant::now();
    let handle = tokio::spawn(DispatchLoop::new(f.address.clone(), f.ctx.clone(), stop_rx).run());

    tokio::time::sleep(Duration::from_millis(50)).await;
    stop_tx.send_replace(true);

    let exit = handle.await.unwrap();
    assert_eq!(exit, LoopExit::Cancelled);
    assert!(started.elapsed() < Duration::from_millis(10_000));
    assert_eq!(f.mock.delivery_count(), 1);
    assert!(f.registry.contains(&f.address));
}

#[tokio::test]
async fn test_dropped_stop_sender_cancels_before_send() {
    let f = fixture(fixed(100));
    let (stop_tx, stop_rx) = watch::channel(false);
    drop(stop_tx);

    let exit = DispatchLoop::new(f.address.clone(), f.ctx.clone(), stop_rx).run().await;

    assert_eq!(exit, LoopExit::Cancelled);
    assert_eq!(f.mock.delivery_count(), 0);
}
