mod app;
mod chat;
mod client;
mod game;
mod logs;
mod persistence;
mod player;
mod protocol;
mod queue;
mod rating;
mod rules;
mod util;

use std::sync::Arc;

use log::info;
use tokio_util::sync::CancellationToken;

use crate::{
    app::{ArcClientService, construct_app},
    client::{ClientServiceImpl, serve_tcp_server, serve_ws_server},
    logs::init_logger,
    queue::run_pairing_loop,
};

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received. Preparing graceful exit...");
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    init_logger();

    let db_path = std::env::var("PARLOR_DB_PATH").unwrap_or_else(|_| "parlor.db".to_string());
    let pool = persistence::open_pool(&db_path).expect("Failed to open database pool");
    persistence::init_schema(&pool).expect("Failed to initialize database schema");
    persistence::seed_default_games(&pool).expect("Failed to seed default games");

    let client_service = ClientServiceImpl::new();
    let arc_client: ArcClientService = Arc::new(Box::new(client_service.clone()));
    let app = construct_app(pool, arc_client);

    match app.match_service.load_active_matches() {
        Ok(count) if count > 0 => info!("Resumed {} active matches", count),
        Ok(_) => {}
        Err(e) => log::error!("Failed to load active matches: {}", e),
    }

    info!("Starting matchmaking server");

    let cancellation = CancellationToken::new();

    let tcp_task = tokio::spawn(serve_tcp_server(
        app.clone(),
        client_service.clone(),
        cancellation.clone(),
    ));
    let ws_task = tokio::spawn(serve_ws_server(
        app.clone(),
        client_service.clone(),
        cancellation.clone(),
    ));
    let pairing_task = tokio::spawn(run_pairing_loop(app.clone(), cancellation.clone()));

    shutdown_signal().await;
    cancellation.cancel();

    let (r1, r2, r3) = tokio::join!(tcp_task, ws_task, pairing_task);

    if let Err(e) = r1 {
        log::error!("TCP server task failed: {}", e);
    }
    if let Err(e) = r2 {
        log::error!("WebSocket server task failed: {}", e);
    }
    if let Err(e) = r3 {
        log::error!("Pairing loop task failed: {}", e);
    }

    info!("Server stopped");
}
