// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;

use makrx_auth::{api::router, config::AuthSettings, state::AppState, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = AuthSettings::from_env()?;
    telemetry::init_tracing(settings.log_format)?;

    let state = AppState::from_settings(&settings)?;

    // Keys are fetched on first use anyway; an early fetch only avoids the
    // latency on the first request
    match state.verifier.keys().refresh(&settings.verifier.jwks_url).await {
        Ok(count) => tracing::info!(keys = count, "JWKS loaded"),
        Err(e) => tracing::warn!(error = %e, "JWKS not reachable at startup"),
    }

    let app = router(state);

    let addr: SocketAddr = settings.bind_address().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        %addr,
        issuer = %settings.verifier.issuer,
        audience = %settings.verifier.audience,
        "MakrX auth server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
