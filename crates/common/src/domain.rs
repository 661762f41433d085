mod clock;
mod event;
mod in_memory_message_repository;
mod message;
mod result;

pub use clock::*;
pub use event::*;
pub use in_memory_message_repository::*;
pub use message::*;
pub use result::*;
