use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use huddle_api::{AppState, AppStateInner, groups, users};
use huddle_broker::{Broker, Presence, Registry, connection, presence};

#[derive(Clone)]
struct ServerState {
    broker: Broker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("HUDDLE_DB_PATH").unwrap_or_else(|_| "huddle.db".into());
    let host = std::env::var("HUDDLE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("HUDDLE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(huddle_db::Database::open(&PathBuf::from(&db_path))?);

    // Broker state: registry + presence injected, torn down with the process
    let registry = Registry::new();
    let typing = Presence::new();
    let broker = Broker::new(registry, typing.clone(), db.clone());

    // Expire stale typing state in the background
    tokio::spawn(presence::run_expiry_sweep(typing, broker.fanout().clone()));

    let app_state: AppState = Arc::new(AppStateInner { db });

    // Routes
    let api_routes = Router::new()
        .route("/api/users/create", post(users::create_user))
        .route("/api/users/anonymous", post(users::create_anonymous_user))
        .route("/api/groups", get(groups::list_groups))
        .route("/api/groups/{group_id}", get(groups::get_group))
        .route("/api/groups/{group_id}/messages", get(groups::get_group_messages))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(ServerState { broker });

    let app = Router::new()
        .merge(api_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Huddle server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, state.broker))
}
