use std::net::SocketAddr;
use std::time::Duration;

use identity_gateway::{
    BoxError, GatewayConfig, MemorySessionStore, ProfilePassthrough, SessionManager,
    VerificationCallback, VerifiedEvent, gateway_routes,
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::from_env()?;
    tracing::info!(
        provider = config.auth().provider().name(),
        callback_url = %config.auth().callback_url(),
        "Loaded configuration"
    );

    let sessions = config.session_manager(MemorySessionStore::new());
    spawn_session_sweeper(sessions.clone());

    let verification = VerificationCallback::new(config.auth().provider().name(), ProfilePassthrough)
        .with_observer(|event: &VerifiedEvent<'_>| -> Result<(), BoxError> {
            tracing::info!(
                event = event.event,
                provider = event.provider,
                principal_id = %event.principal.id,
                "Identity verified"
            );
            Ok(())
        });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port()));
    let app = gateway_routes(config, verification, sessions)?.layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Periodically delete expired sessions; reads already ignore them.
fn spawn_session_sweeper(sessions: SessionManager) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match sessions.purge_expired().await {
                Ok(count) if count > 0 => {
                    tracing::debug!(deleted_sessions = count, "Periodic session cleanup");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to cleanup expired sessions");
                }
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
