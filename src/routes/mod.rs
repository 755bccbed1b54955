use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

use crate::models::{now_millis, AppState};

/// HTTP handler for the health check
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "timestamp": now_millis(),
    }))
}

/// HTTP handler listing the live rooms
pub async fn rooms(app_state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(app_state.registry.room_views())
}

/// Configure the HTTP routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/ws").route(web::get().to(crate::websocket::ws_index)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/rooms").route(web::get().to(rooms)));
}
