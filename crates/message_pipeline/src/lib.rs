pub mod domain;
pub mod message_pipeline_worker;
pub mod nats;

pub use domain::*;
pub use message_pipeline_worker::*;
pub use nats::*;
