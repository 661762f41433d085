pub mod config;
pub mod sms_relay;

pub use self::config::{ServiceConfig, StoreBackend};
pub use sms_relay::*;
