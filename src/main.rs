use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};

use storefront_api::{
    app_router,
    config::{init_tracing, load_config},
    db,
    events::start_event_processor,
    gateway::stripe::StripeGateway,
    services::email::{ConfirmationMailer, NoopMailer, SmtpMailer},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_tracing(&config.log_level, config.log_json);
    let config = Arc::new(config);

    info!(
        environment = %config.environment,
        "starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let db = Arc::new(
        db::establish_connection(&config)
            .await
            .context("failed to connect to database")?,
    );

    if config.auto_migrate {
        db::run_migrations(&db)
            .await
            .context("failed to run migrations")?;
    }

    let event_sender = start_event_processor(config.event_channel_capacity);

    let mailer: Arc<dyn ConfirmationMailer> = if config.smtp.is_enabled() {
        Arc::new(SmtpMailer::new(&config.smtp).context("failed to build SMTP transport")?)
    } else {
        warn!("SMTP is not configured; order confirmation mail is disabled");
        Arc::new(NoopMailer)
    };

    let gateway = Arc::new(StripeGateway::new(
        config.payment_gateway_api_base.clone(),
        config.payment_gateway_secret_key.clone(),
    ));

    let state = AppState::new(db, config.clone(), event_sender, gateway, mailer);
    let app = app_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid host/port configuration")?;
    info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
