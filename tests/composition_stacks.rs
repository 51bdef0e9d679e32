//! Full-stack composition tests.
//!
//! These drive a complete dispatch stack (per-instance breaker and
//! limiter, round-robin pool, retrying dispatcher, proxy adapter) the way
//! a client would, and verify the cross-crate behavior the individual
//! crates cannot see on their own.

use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::{service_fn, Service, ServiceExt};
use tower_dispatch::{DispatchBuilder, DispatchError, DispatchProxy, Endpoint, ProxyError};

type Transport = String;

fn instance(
    healthy: bool,
    calls: Arc<AtomicUsize>,
) -> impl Service<String, Response = String, Error = Transport, Future = BoxFuture<'static, Result<String, Transport>>>
       + Clone
       + Send {
    service_fn(move |req: String| {
        let calls = Arc::clone(&calls);
        let fut: BoxFuture<'static, Result<String, Transport>> = Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if healthy {
                Ok(req.to_uppercase())
            } else {
                Err("connection refused".to_string())
            }
        });
        fut
    })
}

#[tokio::test]
async fn failing_instance_covered_within_two_attempts() {
    let a_calls = Arc::new(AtomicUsize::new(0));
    let b_calls = Arc::new(AtomicUsize::new(0));

    let mut dispatcher = DispatchBuilder::new().name("two-instances").dispatcher(vec![
        instance(false, Arc::clone(&a_calls)),
        instance(true, Arc::clone(&b_calls)),
    ]);

    let response = dispatcher
        .ready()
        .await
        .unwrap()
        .call("hello".to_string())
        .await
        .unwrap();

    assert_eq!(response, "HELLO");
    let total = a_calls.load(Ordering::SeqCst) + b_calls.load(Ordering::SeqCst);
    assert_eq!(total, 2, "one failed attempt plus one successful retry");
}

#[tokio::test]
async fn open_circuit_skips_transport_on_later_operations() {
    let calls = Arc::new(AtomicUsize::new(0));

    let mut dispatcher = DispatchBuilder::new()
        .failure_threshold(2)
        .max_attempts(2)
        .cooldown(Duration::from_secs(60))
        .dispatcher(vec![instance(false, Arc::clone(&calls))]);

    // First operation trips the breaker: two transport failures.
    let first = dispatcher
        .ready()
        .await
        .unwrap()
        .call("x".to_string())
        .await;
    assert!(matches!(first, Err(DispatchError::RetriesExhausted { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Later operations fail fast on the open circuit without reaching
    // the transport at all.
    let second = dispatcher
        .ready()
        .await
        .unwrap()
        .call("y".to_string())
        .await;
    match second {
        Err(DispatchError::RetriesExhausted { last, .. }) => {
            assert!(last.is_circuit_open());
        }
        other => panic!("expected circuit-open exhaustion, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rate_limited_instance_covered_by_peer() {
    let a_calls = Arc::new(AtomicUsize::new(0));
    let b_calls = Arc::new(AtomicUsize::new(0));

    // Tiny buckets with no refill: each instance can serve exactly one
    // call, so the second operation must ride the retry to the peer.
    let mut dispatcher = DispatchBuilder::new()
        .rate_capacity(1)
        .refill_per_second(0.0)
        .dispatcher(vec![
            instance(true, Arc::clone(&a_calls)),
            instance(true, Arc::clone(&b_calls)),
        ]);

    for _ in 0..2 {
        let response = dispatcher
            .ready()
            .await
            .unwrap()
            .call("hi".to_string())
            .await
            .unwrap();
        assert_eq!(response, "HI");
    }

    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn deadline_abandons_slow_instance() {
    let slow = service_fn(|_req: String| async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok::<_, Transport>("late".to_string())
    });

    let mut dispatcher = DispatchBuilder::new()
        .deadline(Duration::from_millis(50))
        .dispatcher(vec![slow]);

    let started = Instant::now();
    let result = dispatcher
        .ready()
        .await
        .unwrap()
        .call("x".to_string())
        .await;

    assert!(matches!(result, Err(DispatchError::DeadlineExceeded)));
    assert!(started.elapsed() < Duration::from_millis(300));
}

#[tokio::test]
async fn abandoned_trial_leaves_instance_usable() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cc = Arc::clone(&calls);

    // Fails once, then answers too slowly, then recovers.
    let backend = service_fn(move |req: String| {
        let cc = Arc::clone(&cc);
        let fut: BoxFuture<'static, Result<String, Transport>> = Box::pin(async move {
            match cc.fetch_add(1, Ordering::SeqCst) {
                0 => Err("connection refused".to_string()),
                1 => {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(req.to_uppercase())
                }
                _ => Ok(req.to_uppercase()),
            }
        });
        fut
    });

    let mut dispatcher = DispatchBuilder::new()
        .failure_threshold(1)
        .cooldown(Duration::from_millis(10))
        .max_attempts(1)
        .deadline(Duration::from_millis(50))
        .dispatcher(vec![backend]);

    // First operation trips the breaker.
    let first = dispatcher
        .ready()
        .await
        .unwrap()
        .call("hi".to_string())
        .await;
    assert!(matches!(first, Err(DispatchError::RetriesExhausted { .. })));

    tokio::time::sleep(Duration::from_millis(20)).await;

    // The half-open trial is abandoned at the deadline, dropping the
    // in-flight call.
    let second = dispatcher
        .ready()
        .await
        .unwrap()
        .call("hi".to_string())
        .await;
    assert!(matches!(second, Err(DispatchError::DeadlineExceeded)));

    // The instance gets probed again instead of being rejected forever.
    let third = dispatcher
        .ready()
        .await
        .unwrap()
        .call("hi".to_string())
        .await
        .unwrap();
    assert_eq!(third, "HI");
}

#[tokio::test]
async fn empty_pool_surfaces_no_instances() {
    let mut dispatcher =
        DispatchBuilder::new().dispatcher(Vec::<Endpoint<String, String, Transport>>::new());

    let result = dispatcher
        .ready()
        .await
        .unwrap()
        .call("x".to_string())
        .await;
    assert!(matches!(result, Err(DispatchError::NoInstances)));
}

#[derive(Debug, Clone)]
struct WirePayload {
    v: String,
    err: Option<String>,
}

fn decode(res: WirePayload) -> Result<String, String> {
    match res.err {
        Some(err) => Err(err),
        None => Ok(res.v),
    }
}

#[tokio::test]
async fn embedded_error_does_not_consume_retries() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cc = Arc::clone(&calls);

    // The transport succeeds; the payload itself carries a logical error.
    let backend = service_fn(move |_req: String| {
        let cc = Arc::clone(&cc);
        let fut: BoxFuture<'static, Result<WirePayload, std::io::Error>> = Box::pin(async move {
            cc.fetch_add(1, Ordering::SeqCst);
            Ok(WirePayload {
                v: String::new(),
                err: Some("empty string".to_string()),
            })
        });
        fut
    });

    let mut proxy = DispatchBuilder::new().max_attempts(3).proxy(
        vec![backend],
        |req: String| req,
        decode,
        service_fn(|_req: String| async move { Err::<String, _>("unreachable".to_string()) }),
    );

    let result = proxy.ready().await.unwrap().call(String::new()).await;
    match result {
        Err(ProxyError::Application(msg)) => assert_eq!(msg, "empty string"),
        other => panic!("expected application error, got {other:?}"),
    }
    assert_eq!(
        calls.load(Ordering::SeqCst),
        1,
        "a logical error in the payload must not trigger retries"
    );
}

#[tokio::test]
async fn zero_instances_run_local_implementation() {
    let local_calls = Arc::new(AtomicUsize::new(0));
    let lc = Arc::clone(&local_calls);

    let local = service_fn(move |req: String| {
        let lc = Arc::clone(&lc);
        async move {
            lc.fetch_add(1, Ordering::SeqCst);
            if req.is_empty() {
                Err("empty string".to_string())
            } else {
                Ok(req.to_uppercase())
            }
        }
    });

    let mut proxy = DispatchBuilder::new().proxy(
        Vec::<Endpoint<String, WirePayload, std::io::Error>>::new(),
        |req: String| req,
        decode,
        local,
    );
    assert!(matches!(proxy, DispatchProxy::Local(_)));

    let response = proxy
        .ready()
        .await
        .unwrap()
        .call("hi".to_string())
        .await
        .unwrap();
    assert_eq!(response, "HI");

    let result = proxy.ready().await.unwrap().call(String::new()).await;
    assert!(matches!(result, Err(ProxyError::Application(_))));
    assert_eq!(local_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn retry_attempts_spread_round_robin() {
    let counts: Vec<Arc<AtomicUsize>> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();

    let mut dispatcher = DispatchBuilder::new().max_attempts(3).dispatcher(
        counts
            .iter()
            .map(|count| instance(false, Arc::clone(count)))
            .collect(),
    );

    let result = dispatcher
        .ready()
        .await
        .unwrap()
        .call("x".to_string())
        .await;
    assert!(matches!(result, Err(DispatchError::RetriesExhausted { .. })));

    // Three attempts over three instances: one each.
    for count in &counts {
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
