use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Source of the current time for timestamps
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Source of fresh identities for messages and events
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> Uuid;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Random (v4) UUIDs
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV4Generator;

impl IdGenerator for UuidV4Generator {
    fn generate(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Clock frozen at a single instant
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(any(test, feature = "testing"))]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Hands out UUIDs 1, 2, 3, ... so generated identities are predictable
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    next: std::sync::atomic::AtomicU64,
}

#[cfg(any(test, feature = "testing"))]
impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The identity returned by the `n`th call to `generate` (1-based)
    pub fn nth(n: u64) -> Uuid {
        Uuid::from_u128(n as u128)
    }
}

#[cfg(any(test, feature = "testing"))]
impl IdGenerator for SequentialIdGenerator {
    fn generate(&self) -> Uuid {
        let n = self
            .next
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;
        Self::nth(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ids_are_predictable() {
        let ids = SequentialIdGenerator::new();

        assert_eq!(ids.generate(), SequentialIdGenerator::nth(1));
        assert_eq!(ids.generate(), SequentialIdGenerator::nth(2));
    }

    #[test]
    fn test_uuid_v4_generator_is_random() {
        let ids = UuidV4Generator;
        assert_ne!(ids.generate(), ids.generate());
    }
}
