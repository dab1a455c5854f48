mod app;
mod config;
mod error;
mod recipe;
mod state;
mod store;
mod user;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "recipebox=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = AppState::init().await?;
    let config = app_state.config.clone();

    if let Some((email, password)) = config.admin_credentials() {
        user::services::bootstrap_superuser(app_state.store.as_ref(), email, password).await?;
    }

    let app = app::build_app(app_state);
    app::serve(app, &config).await
}
