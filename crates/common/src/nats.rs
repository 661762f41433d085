mod client;
mod consumer;
mod json;
pub mod middleware;
mod trace_context;
mod traits;

pub use client::*;
pub use consumer::*;
pub use json::*;
pub use trace_context::*;
pub use traits::*;
