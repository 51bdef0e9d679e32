use futures::future::BoxFuture;
use std::task::{Context, Poll};
use thiserror::Error;
use tower::{Service, ServiceExt};
use tower_dispatch_core::DispatchError;

/// The error type produced by a proxy.
///
/// # Type Parameters
///
/// - `D`: The domain's logical error type (embedded in decoded payloads)
/// - `E`: The transport error type of the dispatch stack
#[derive(Debug, Error)]
pub enum ProxyError<D, E> {
    /// The remote call completed, but its payload embedded a logical
    /// error. Surfaced strictly after dispatch; never retried.
    #[error("application error")]
    Application(D),

    /// The dispatch layer itself failed (rate limited, open circuit,
    /// empty pool, transport fault, exhausted budget, deadline).
    #[error("dispatch failed: {0}")]
    Dispatch(DispatchError<E>),
}

impl<D, E> ProxyError<D, E> {
    /// Returns `true` if this is a logical error from the remote payload.
    pub fn is_application(&self) -> bool {
        matches!(self, ProxyError::Application(_))
    }

    /// Returns the dispatch error, if that is what this is.
    pub fn dispatch_error(&self) -> Option<&DispatchError<E>> {
        match self {
            ProxyError::Dispatch(err) => Some(err),
            ProxyError::Application(_) => None,
        }
    }
}

impl<D, E> From<DispatchError<E>> for ProxyError<D, E> {
    fn from(err: DispatchError<E>) -> Self {
        ProxyError::Dispatch(err)
    }
}

/// Adapts a domain-facing service call onto a wire-level dispatcher.
///
/// `encode` maps the domain request into the wire request shape, the
/// inner service (typically a `Dispatcher` over `Endpoint`s) carries it,
/// and `decode` maps the wire response back, surfacing any logical error
/// the payload embeds as [`ProxyError::Application`]. Decoding happens
/// after dispatch has finished, so an embedded error never consumes
/// retry attempts.
#[derive(Clone)]
pub struct ProxyAdapter<S, Enc, Dec> {
    inner: S,
    encode: Enc,
    decode: Dec,
}

impl<S, Enc, Dec> ProxyAdapter<S, Enc, Dec> {
    /// Creates an adapter from an inner dispatcher and a codec pair.
    pub fn new(inner: S, encode: Enc, decode: Dec) -> Self {
        Self {
            inner,
            encode,
            decode,
        }
    }
}

impl<S, Enc, Dec, DomainReq, WireReq, DomainRes, D, E> Service<DomainReq>
    for ProxyAdapter<S, Enc, Dec>
where
    S: Service<WireReq, Error = DispatchError<E>> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Future: Send + 'static,
    Enc: Fn(DomainReq) -> WireReq,
    Dec: Fn(S::Response) -> Result<DomainRes, D> + Clone + Send + 'static,
    WireReq: Send + 'static,
{
    type Response = DomainRes;
    type Error = ProxyError<D, E>;
    type Future = BoxFuture<'static, Result<DomainRes, ProxyError<D, E>>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(ProxyError::Dispatch)
    }

    fn call(&mut self, req: DomainReq) -> Self::Future {
        let wire_req = (self.encode)(req);
        let inner = self.inner.clone();
        let decode = self.decode.clone();

        Box::pin(async move {
            let wire_res = inner.oneshot(wire_req).await.map_err(ProxyError::Dispatch)?;
            decode(wire_res).map_err(ProxyError::Application)
        })
    }
}

/// The construction-time dispatch strategy.
///
/// `Remote` engages the full stack (balancer, per-instance breaker and
/// limiter, retry); `Local` forwards every call to the designated local
/// implementation untouched. Which one a caller gets is decided when the
/// proxy is built, from whether any instances were configured.
pub enum DispatchProxy<P, L> {
    /// Calls go through the full dispatch stack.
    Remote(P),
    /// Calls go straight to a local implementation.
    Local(L),
}

impl<Req, P, L, D, E> Service<Req> for DispatchProxy<P, L>
where
    P: Service<Req, Error = ProxyError<D, E>>,
    P::Future: Send + 'static,
    L: Service<Req, Response = P::Response, Error = D>,
    L::Future: Send + 'static,
    D: Send + 'static,
    E: Send + 'static,
    P::Response: Send + 'static,
{
    type Response = P::Response;
    type Error = ProxyError<D, E>;
    type Future = BoxFuture<'static, Result<P::Response, ProxyError<D, E>>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        match self {
            DispatchProxy::Remote(proxy) => proxy.poll_ready(cx),
            DispatchProxy::Local(local) => {
                local.poll_ready(cx).map_err(ProxyError::Application)
            }
        }
    }

    fn call(&mut self, req: Req) -> Self::Future {
        match self {
            DispatchProxy::Remote(proxy) => Box::pin(proxy.call(req)),
            DispatchProxy::Local(local) => {
                let fut = local.call(req);
                Box::pin(async move { fut.await.map_err(ProxyError::Application) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tower::service_fn;

    // Wire response in the embedded-error convention: a payload carrying
    // either a value or a logical error string.
    #[derive(Debug, Clone)]
    struct WireResponse {
        v: String,
        err: Option<String>,
    }

    fn decode(res: WireResponse) -> Result<String, String> {
        match res.err {
            Some(err) => Err(err),
            None => Ok(res.v),
        }
    }

    #[tokio::test]
    async fn adapter_encodes_and_decodes() {
        let transport = service_fn(|req: String| async move {
            Ok::<_, DispatchError<std::io::Error>>(WireResponse {
                v: req.to_uppercase(),
                err: None,
            })
        });
        let mut adapter = ProxyAdapter::new(transport, |req: String| req, decode);

        let response = adapter
            .ready()
            .await
            .unwrap()
            .call("hello".to_string())
            .await
            .unwrap();
        assert_eq!(response, "HELLO");
    }

    #[tokio::test]
    async fn embedded_error_surfaces_as_application() {
        let transport = service_fn(|_req: String| async move {
            Ok::<_, DispatchError<std::io::Error>>(WireResponse {
                v: String::new(),
                err: Some("empty string".to_string()),
            })
        });
        let mut adapter = ProxyAdapter::new(transport, |req: String| req, decode);

        let result = adapter.ready().await.unwrap().call(String::new()).await;
        match result {
            Err(ProxyError::Application(msg)) => assert_eq!(msg, "empty string"),
            other => panic!("expected application error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispatch_failure_surfaces_as_dispatch() {
        let transport = service_fn(|_req: String| async move {
            Err::<WireResponse, _>(DispatchError::<std::io::Error>::NoInstances)
        });
        let mut adapter = ProxyAdapter::new(transport, |req: String| req, decode);

        let result = adapter.ready().await.unwrap().call("x".to_string()).await;
        match result {
            Err(ProxyError::Dispatch(err)) => {
                assert!(matches!(err, DispatchError::NoInstances));
            }
            other => panic!("expected dispatch error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn local_strategy_bypasses_dispatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cc = Arc::clone(&calls);
        let local = service_fn(move |req: String| {
            let cc = Arc::clone(&cc);
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(req.to_uppercase())
            }
        });

        // The remote arm's type still has to be named even when unused.
        type Remote = ProxyAdapter<
            tower::util::BoxCloneSyncService<String, WireResponse, DispatchError<String>>,
            fn(String) -> String,
            fn(WireResponse) -> Result<String, String>,
        >;
        let mut proxy: DispatchProxy<Remote, _> = DispatchProxy::Local(local);

        let response = proxy
            .ready()
            .await
            .unwrap()
            .call("hi".to_string())
            .await
            .unwrap();
        assert_eq!(response, "HI");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn local_domain_error_is_application() {
        let local = service_fn(|_req: String| async move {
            Err::<String, _>("empty string".to_string())
        });

        type Remote = ProxyAdapter<
            tower::util::BoxCloneSyncService<String, WireResponse, DispatchError<String>>,
            fn(String) -> String,
            fn(WireResponse) -> Result<String, String>,
        >;
        let mut proxy: DispatchProxy<Remote, _> = DispatchProxy::Local(local);

        let result = proxy.ready().await.unwrap().call(String::new()).await;
        assert!(matches!(result, Err(ProxyError::Application(_))));
    }
}
