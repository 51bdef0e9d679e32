use tower::util::BoxCloneSyncService;
use tower::Service;
use tower_dispatch_core::DispatchError;

/// A type-erased, cloneable per-instance call surface.
///
/// Every instance stack (breaker over limiter over transport) collapses to
/// this one shape so heterogeneous stacks can live together in a pool.
/// The erased service stays `Sync`, which the dispatcher needs to hold a
/// pool of these across `.await` points in a `Send` future.
pub type Endpoint<Req, Res, E> = BoxCloneSyncService<Req, Res, DispatchError<E>>;

/// Boxes a service whose error is already a [`DispatchError`] into an
/// [`Endpoint`].
pub fn endpoint<S, Req, E>(service: S) -> Endpoint<Req, S::Response, E>
where
    S: Service<Req, Error = DispatchError<E>> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    Req: 'static,
{
    BoxCloneSyncService::new(service)
}
