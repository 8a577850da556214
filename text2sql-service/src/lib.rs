pub mod components;
pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod types;


pub use config::Text2SqlServiceConfig;
