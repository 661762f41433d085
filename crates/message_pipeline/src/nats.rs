mod event_dispatcher;
mod message_event_processor;

pub use event_dispatcher::*;
pub use message_event_processor::*;
