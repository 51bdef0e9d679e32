//! A small string service fronted by the full dispatch stack.
//!
//! Three simulated backend instances answer uppercase requests over a
//! JSON-ish wire shape with the embedded-error convention (`err` field in
//! the response payload). One instance is flaky, which the per-instance
//! breaker and the retrying dispatcher absorb. Run with no instances
//! configured and every call falls back to the local implementation.
//!
//! ```sh
//! cargo run --example stringsvc_proxy
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::{service_fn, Service, ServiceExt};
use tower_dispatch::{DispatchBuilder, DispatchError, ProxyError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UppercaseRequest {
    s: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UppercaseResponse {
    v: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    err: Option<String>,
}

/// The local implementation: uppercase with the empty-string error, and
/// count.
#[derive(Clone)]
struct StringService;

impl StringService {
    fn uppercase(&self, s: &str) -> Result<String, String> {
        if s.is_empty() {
            return Err("empty string".to_string());
        }
        Ok(s.to_uppercase())
    }

    fn count(&self, s: &str) -> usize {
        s.len()
    }
}

/// A simulated backend instance speaking the wire shape.
///
/// Logical errors travel inside the payload; only infrastructure faults
/// use the transport error channel.
fn backend(
    name: &'static str,
    flaky: bool,
    calls: Arc<AtomicUsize>,
) -> impl Service<
    UppercaseRequest,
    Response = UppercaseResponse,
    Error = std::io::Error,
    Future = futures::future::BoxFuture<'static, Result<UppercaseResponse, std::io::Error>>,
> + Clone
       + Send {
    service_fn(move |req: UppercaseRequest| {
        let calls = Arc::clone(&calls);
        let fut: futures::future::BoxFuture<'static, Result<UppercaseResponse, std::io::Error>> =
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if flaky && n % 2 == 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        format!("{name}: connection reset"),
                    ));
                }
                let svc = StringService;
                let response = match svc.uppercase(&req.s) {
                    Ok(v) => UppercaseResponse { v, err: None },
                    Err(err) => UppercaseResponse {
                        v: String::new(),
                        err: Some(err),
                    },
                };
                tracing::debug!(instance = name, payload = %serde_json::to_string(&response).unwrap_or_default());
                Ok(response)
            });
        fut
    })
}

fn decode(res: UppercaseResponse) -> Result<String, String> {
    match res.err {
        Some(err) => Err(err),
        None => Ok(res.v),
    }
}

async fn call_logged<S>(proxy: &mut S, input: &str)
where
    S: Service<String, Response = String, Error = ProxyError<String, std::io::Error>>,
{
    let started = Instant::now();
    let result = match proxy.ready().await {
        Ok(ready) => ready.call(input.to_string()).await,
        Err(err) => Err(err),
    };
    match &result {
        Ok(output) => tracing::info!(
            method = "uppercase",
            input,
            output = %output,
            took = ?started.elapsed(),
        ),
        Err(err) => tracing::info!(
            method = "uppercase",
            input,
            err = %err,
            took = ?started.elapsed(),
        ),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let a_calls = Arc::new(AtomicUsize::new(0));
    let b_calls = Arc::new(AtomicUsize::new(0));
    let c_calls = Arc::new(AtomicUsize::new(0));

    let instances = vec![
        backend("instance-a", true, Arc::clone(&a_calls)),
        backend("instance-b", false, Arc::clone(&b_calls)),
        backend("instance-c", false, Arc::clone(&c_calls)),
    ];

    let builder = DispatchBuilder::new()
        .rate_capacity(100)
        .refill_per_second(100.0)
        .failure_threshold(5)
        .cooldown(Duration::from_secs(60))
        .max_attempts(3)
        .max_elapsed(Duration::from_millis(250))
        .name("stringsvc");

    let local = StringService;
    let mut proxy = builder.proxy(
        instances,
        |s: String| UppercaseRequest { s },
        decode,
        service_fn(move |s: String| {
            let local = local.clone();
            async move { local.uppercase(&s) }
        }),
    );

    for input in ["hello", "tower", "", "dispatch"] {
        call_logged(&mut proxy, input).await;
    }

    tracing::info!(
        instance_a = a_calls.load(Ordering::SeqCst),
        instance_b = b_calls.load(Ordering::SeqCst),
        instance_c = c_calls.load(Ordering::SeqCst),
        "per-instance call counts"
    );

    // With zero instances configured, the proxy runs the local
    // implementation directly.
    let local = StringService;
    let mut fallback = DispatchBuilder::new().name("stringsvc-local").proxy(
        Vec::<
            tower::util::BoxCloneSyncService<UppercaseRequest, UppercaseResponse, std::io::Error>,
        >::new(),
        |s: String| UppercaseRequest { s },
        decode,
        service_fn(move |s: String| {
            let local = local.clone();
            async move { local.uppercase(&s) }
        }),
    );
    call_logged(&mut fallback, "local only").await;

    let counted = StringService.count("dispatch");
    tracing::info!(method = "count", input = "dispatch", n = counted);

    // Show how a dispatch-layer failure reads next to an embedded one.
    let err: DispatchError<std::io::Error> = DispatchError::NoInstances;
    tracing::debug!(example_error = %err);

    Ok(())
}
