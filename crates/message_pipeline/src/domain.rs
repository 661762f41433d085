mod in_process_event_bus;
mod message_event_listener;
mod message_service;
mod status_update;
mod traced_pipeline;

pub use in_process_event_bus::*;
pub use message_event_listener::*;
pub use message_service::*;
pub use status_update::*;
pub use traced_pipeline::*;
