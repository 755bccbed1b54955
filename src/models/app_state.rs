use actix::Addr;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::models::registry::RoomRegistry;
use crate::storage::{GameArchiver, RoomStore};
use crate::websocket::FogChessWebSocket;

/// Application state shared between connections
pub struct AppState {
    pub registry: RoomRegistry,
    pub sessions: Mutex<HashMap<String, Addr<FogChessWebSocket>>>,
}

impl AppState {
    pub fn new(store: Arc<dyn RoomStore>, archiver: Arc<dyn GameArchiver>) -> Self {
        AppState {
            registry: RoomRegistry::new(store, archiver),
            sessions: Mutex::new(HashMap::new()),
        }
    }
}
