use axum::Router;
use axum::http::{HeaderValue, Method, header};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};
use tracing_subscriber::EnvFilter;

use uniportal::{
    AppState, Presence, announcements, appointments, auth, config::Config, db, messaging,
    notifications, realtime, todos, users,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "uniportal=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db_pool = db::connect(&config.database_url).await?;
    tracing::info!(url = %config.database_url, "database ready");

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(8)));

    let cors = match &config.cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true),
        None => CorsLayer::new(),
    };

    let app_state = AppState {
        db_pool,
        presence: Presence::new(),
    };

    let app = Router::new()
        .nest("/auth", auth::router())
        .nest("/messages", messaging::router())
        .nest("/users", users::router())
        .nest("/todos", todos::router())
        .nest("/announcements", announcements::router())
        .nest("/appointments", appointments::router())
        .nest("/notifications", notifications::router())
        .merge(realtime::router())
        .with_state(app_state)
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
