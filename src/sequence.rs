use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic identifier source owned by one interpreter session.
///
/// Handed to whoever needs ids instead of living in a static, so two
/// sessions (or two tests) never observe each other's numbering.
#[derive(Debug, Default)]
pub struct Sequence {
    next: AtomicU64,
}

impl Sequence {
    /// Sequence whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_sessions_are_independent() {
        let a = Sequence::default();
        let b = Sequence::starting_at(10);
        assert_eq!(a.next_id(), 0);
        assert_eq!(a.next_id(), 1);
        assert_eq!(b.next_id(), 10);
        assert_eq!(a.next_id(), 2);
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let seq = Sequence::default();
        let seq = &seq;
        let ids: HashSet<u64> = thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(move || (0..100).map(|_| seq.next_id()).collect::<Vec<_>>()))
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(ids.len(), 400);
    }
}
