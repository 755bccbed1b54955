pub mod game;
pub mod models;
pub mod routes;
pub mod storage;
pub mod websocket;
