pub mod capture;
pub mod config;
pub mod encode;
pub mod input;
pub mod protocol;
pub mod server;
pub mod transport;
