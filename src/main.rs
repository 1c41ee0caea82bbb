use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use timebank::config::AppConfig;
use timebank::db;
use timebank::handlers;
use timebank::services::gateway::checkout::HttpCheckoutGateway;
use timebank::services::gateway::PaymentGateway;
use timebank::services::notify::webhook::WebhookNotifier;
use timebank::services::notify::{LogNotifier, NotificationDispatcher};
use timebank::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let notifier: Box<dyn NotificationDispatcher> = if config.notify_webhook_url.is_empty() {
        tracing::info!("NOTIFY_WEBHOOK_URL not set, using log-only notifier");
        Box::new(LogNotifier)
    } else {
        tracing::info!(url = %config.notify_webhook_url, "using webhook notifier");
        Box::new(WebhookNotifier::new(config.notify_webhook_url.clone()))
    };

    let gateway: Box<dyn PaymentGateway> = Box::new(HttpCheckoutGateway::new(
        config.gateway_base_url.clone(),
        config.gateway_api_key.clone(),
    ));

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        notifier,
        gateway,
    });

    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/bookings", post(handlers::bookings::create_booking))
        .route("/api/bookings/:id", get(handlers::bookings::get_booking))
        .route(
            "/api/bookings/:id/accept",
            post(handlers::bookings::accept_booking),
        )
        .route(
            "/api/bookings/:id/reject",
            post(handlers::bookings::reject_booking),
        )
        .route(
            "/api/bookings/:id/complete",
            post(handlers::bookings::complete_booking),
        )
        .route(
            "/api/bookings/:id/confirm",
            post(handlers::bookings::confirm_booking),
        )
        .route(
            "/api/bookings/:id/dispute",
            post(handlers::bookings::dispute_booking),
        )
        .route(
            "/api/bookings/:id/mediation",
            post(handlers::mediation::request_mediation),
        )
        .route(
            "/api/bookings/:id/mediation/resolve",
            post(handlers::mediation::resolve_mediation),
        )
        .route(
            "/api/bookings/:id/mediation/messages",
            get(handlers::mediation::list_messages).post(handlers::mediation::post_message),
        )
        .route(
            "/api/credits/purchase",
            post(handlers::credits::start_purchase),
        )
        .route(
            "/api/credits/purchase/callback",
            post(handlers::credits::purchase_callback),
        )
        .route(
            "/api/credits/cashout",
            post(handlers::credits::request_cashout),
        )
        .route(
            "/api/credits/cashout/:id/resolve",
            post(handlers::credits::resolve_cashout),
        )
        .route("/api/credits/balance", get(handlers::credits::get_balance))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
