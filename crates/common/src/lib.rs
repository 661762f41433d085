pub mod domain;
pub mod nats;
pub mod postgres;
pub mod telemetry;
