mod client;
mod config;
mod message_repository;

pub use client::*;
pub use config::*;
pub use message_repository::*;
