//! HTTP host over overlay connections.
//!
//! # Responsibilities
//! - Drive the listener's accept loop
//! - Serve HTTP/1.1 and HTTP/2 on each connection with an Axum router
//! - Copy the connection's identity into every request's extensions
//! - Drain in-flight connections on shutdown
//!
//! # Design Decisions
//! - One task per connection; the accept loop itself stays sequential
//! - Shutdown unbinds first, then asks connections to finish gracefully
//! - The drain has a deadline; stragglers are abandoned, not awaited

use std::time::Duration;

use axum::Router;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use crate::error::OverlayResult;
use crate::http::tracker::{ConnectionGuard, ConnectionTracker};
use crate::identity::IdentityFeature;
use crate::transport::{ConnectionContext, ConnectionListener};

/// Serve `router` on every connection `listener` yields until `shutdown` fires
/// or the listener is unbound.
pub async fn serve<L>(
    mut listener: L,
    router: Router,
    shutdown: CancellationToken,
    drain_timeout: Duration,
) -> OverlayResult<()>
where
    L: ConnectionListener,
{
    let tracker = ConnectionTracker::new();
    let connections = shutdown.child_token();
    tracing::info!(endpoint = %listener.endpoint(), "HTTP server starting");

    let result = loop {
        match listener.accept_next(&shutdown).await {
            Ok(Some(context)) => {
                let guard = tracker.track(context.connection_id.clone());
                tokio::spawn(serve_connection(context, router.clone(), guard, connections.clone()));
            }
            Ok(None) if shutdown.is_cancelled() || !listener.is_bound() => break Ok(()),
            Ok(None) => continue,
            Err(e) => {
                tracing::error!(error = %e, "Accept loop failed");
                break Err(e);
            }
        }
    };

    listener.unbind();
    connections.cancel();
    let active = tracker.active_count();
    if active > 0 {
        tracing::info!(active, "Draining connections");
        if !tracker.wait_for_idle(drain_timeout).await {
            tracing::warn!(
                remaining = tracker.active_count(),
                timeout_secs = drain_timeout.as_secs(),
                "Drain timed out"
            );
        }
    }
    listener.dispose();

    tracing::info!("HTTP server stopped");
    result
}

async fn serve_connection(
    context: ConnectionContext,
    router: Router,
    guard: ConnectionGuard,
    shutdown: CancellationToken,
) {
    let ConnectionContext {
        connection_id,
        transport,
        features,
    } = context;
    let identity = features.get::<IdentityFeature>().cloned();

    let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
        if let Some(identity) = &identity {
            request.extensions_mut().insert(identity.clone());
        }
        router.clone().oneshot(request)
    });

    let builder = Builder::new(TokioExecutor::new());
    let connection = builder.serve_connection(TokioIo::new(transport), service);
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = shutdown.cancelled() => {
            connection.as_mut().graceful_shutdown();
            connection.await
        }
    };
    if let Err(e) = result {
        tracing::debug!(connection_id = %connection_id, error = %e, "Connection ended with error");
    }
    drop(guard);
}
