// Annotation id generation

use chrono::Local;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Source of fresh annotation ids. Ids are opaque to the rest of the core.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// `20250101120000123456-1a2b3c4d`: local time down to microseconds plus a
/// random suffix, so two ids from the same microsecond still differ.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampIdGenerator;

impl IdGenerator for TimestampIdGenerator {
    fn next_id(&self) -> String {
        let stamp = Local::now().format("%Y%m%d%H%M%S%6f");
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}-{}", stamp, &suffix[..8])
    }
}

/// Deterministic `prefix-1`, `prefix-2`, ...
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", self.prefix, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_timestamp_ids_are_unique() {
        let generator = TimestampIdGenerator;
        let ids: HashSet<String> = (0..500).map(|_| generator.next_id()).collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn test_timestamp_id_shape() {
        let id = TimestampIdGenerator.next_id();
        let (stamp, suffix) = id.split_once('-').unwrap();
        assert_eq!(stamp.len(), 20);
        assert!(stamp.bytes().all(|b| b.is_ascii_digit()));
        assert_eq!(suffix.len(), 8);
    }

    #[test]
    fn test_sequential_ids() {
        let generator = SequentialIdGenerator::new("box");
        assert_eq!(generator.next_id(), "box-1");
        assert_eq!(generator.next_id(), "box-2");
    }
}
