use std::sync::Arc;

use clap::Parser;
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

mod auth;
mod authz;
mod backend;
mod config;
mod cors;
mod error;
mod extract;
mod handlers;
mod metrics;
mod middleware;
mod models;
mod rate_limit;
mod routes;
mod state;

use backend::hosted::HostedBackend;
use backend::sendgrid::SendGridMailer;
use config::Args;
use rate_limit::RateLimiter;
use state::AppState;

// this is main async function with tokio
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    // parse cli arguments (flags or environment)
    let args = Args::parse();
    let policy = args.rate_limit_policy().inspect_err(|e| {
        error!(error = %e, "Invalid rate limit configuration");
    })?;
    let cors = args.cors_settings();

    let client = reqwest::Client::new();
    let hosted = Arc::new(HostedBackend::new(client.clone(), args.hosted_settings()));
    let email = args.email_settings();
    if args.sendgrid_api_key.is_none() {
        info!("SENDGRID_API_KEY not set, contact emails will fail");
    }

    // creating shared state
    let state = Arc::new(AppState {
        rate_limiter: RateLimiter::new(policy),
        identity: hosted.clone(),
        profiles: hosted.clone(),
        records: hosted.clone(),
        objects: hosted,
        mailer: Arc::new(SendGridMailer::new(client, args.sendgrid_api_key.clone())),
        email,
    });

    let app = routes::router(state, &cors);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(addr = %addr, "Gateway listening");
    info!(backend = %args.backend_url, bucket = %args.bucket, "Forwarding to hosted backend");
    info!(
        limit = policy.limit(),
        window_secs = policy.window_secs(),
        "Rate limit configured"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
