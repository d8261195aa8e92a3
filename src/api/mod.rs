pub mod middleware;
pub mod models;
pub mod models_ws;
pub mod routes;
pub mod websocket;
