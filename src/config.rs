use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    /// Empty = log-only notification dispatcher.
    pub notify_webhook_url: String,
    pub gateway_base_url: String,
    pub gateway_api_key: String,
    /// Empty = skip callback signature validation (dev mode).
    pub gateway_callback_secret: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "timebank.db".to_string()),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").unwrap_or_default(),
            gateway_base_url: env::var("GATEWAY_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:9010".to_string()),
            gateway_api_key: env::var("GATEWAY_API_KEY").unwrap_or_default(),
            gateway_callback_secret: env::var("GATEWAY_CALLBACK_SECRET").unwrap_or_default(),
        }
    }
}
