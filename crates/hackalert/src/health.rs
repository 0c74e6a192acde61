//! Bare listener so hosting platforms see an open port. It serves no routes.

use std::net::Ipv4Addr;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

pub fn router() -> Router {
    Router::new()
}

pub async fn bind(port: u16) -> Result<TcpListener> {
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
        .await
        .with_context(|| format!("failed to bind liveness listener on port {port}"))?;
    info!("liveness listener on {}", listener.local_addr()?);
    Ok(listener)
}

pub async fn serve(listener: TcpListener) {
    if let Err(err) = axum::serve(listener, router().into_make_service()).await {
        error!(error = %err, "liveness listener stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn every_path_is_not_found() {
        for uri in ["/", "/health"] {
            let response = router()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn binds_an_ephemeral_port() {
        let listener = bind(0).await.expect("bind");
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}
