pub mod config;
pub mod error;
pub mod frame;
pub mod peer;
pub mod registry;
pub mod router;
pub mod server;
pub mod slot;
pub mod web;
