pub mod cache;
pub mod hub;
pub mod websocket;
