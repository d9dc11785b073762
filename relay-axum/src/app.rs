use std::sync::Arc;

use axum::http::HeaderName;
use axum::Router;
use relay_device::RelayOrchestrator;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::rest;
use crate::RelayAxumState;

/// Largest inbound body accepted, staged or not.
pub const MAX_REQUEST_BODY_BYTES: usize = 200 * 1024 * 1024;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct RelayAxumApp {
    pub relay: Arc<RelayOrchestrator>,
    pub router: Router<()>,
}

impl RelayAxumApp {
    pub fn new(relay: RelayOrchestrator) -> Self {
        let state = RelayAxumState::new(relay);
        let relay = Arc::clone(&state.relay);

        let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
        let router = rest::device_router(state).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id))
                .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES)),
        );

        Self { relay, router }
    }

    pub fn use_router(mut self, path: &str, router: Router<()>) -> Self {
        self.router = self.router.nest(path, router);
        self
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}

pub fn axum(relay: RelayOrchestrator) -> RelayAxumApp {
    RelayAxumApp::new(relay)
}
