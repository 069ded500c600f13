pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod sessions;
pub mod state;
pub mod sweeper;
pub mod tokens;
pub mod web;
