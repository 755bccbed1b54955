use std::env;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use log::info;

use fogchess::models::AppState;
use fogchess::routes::configure_routes;
use fogchess::storage::{LogArchiver, MemoryRoomStore};

/// How often abandoned rooms are swept out of the registry.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let bind_addr = env::var("FOGCHESS_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    info!("Starting fog of war chess server at http://{}", bind_addr);

    // Create shared application state
    let app_state = web::Data::new(AppState::new(
        Arc::new(MemoryRoomStore::new()),
        Arc::new(LogArchiver),
    ));

    // Sweep rooms whose players all disconnected without leaving
    let sweeper_state = app_state.clone();
    actix_rt::spawn(async move {
        let mut ticker = actix_rt::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let removed = sweeper_state.registry.sweep_empty();
            if removed > 0 {
                info!("Swept {} abandoned room(s)", removed);
            }
        }
    });

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(configure_routes)
    })
    .bind(bind_addr)?
    .run()
    .await
}
