pub mod config;
mod http_server;

pub use http_server::{router, serve};
