use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Global cap on the number of leaves dispatched during a run
///
/// Clones share the same counter, so one budget can span every source and
/// every nested manifest of a run.
#[derive(Debug, Clone, Default)]
pub struct Budget {
    remaining: Option<Arc<AtomicUsize>>,
}

impl Budget {
    /// A budget that never runs out
    pub fn unlimited() -> Self {
        Self { remaining: None }
    }

    /// A budget of `limit` leaves
    pub fn limited(limit: usize) -> Self {
        Self {
            remaining: Some(Arc::new(AtomicUsize::new(limit))),
        }
    }

    /// Builds a budget from an optional limit
    pub fn from_limit(limit: Option<usize>) -> Self {
        limit.map_or_else(Self::unlimited, Self::limited)
    }

    /// Reserves up to `wanted` leaves and returns how many were granted
    ///
    /// ```
    /// use sumi_harvest::discovery::Budget;
    ///
    /// let budget = Budget::limited(10);
    /// assert_eq!(budget.take(8), 8);
    /// assert_eq!(budget.take(5), 2);
    /// assert_eq!(budget.take(1), 0);
    /// assert!(budget.is_exhausted());
    /// ```
    pub fn take(&self, wanted: usize) -> usize {
        let Some(remaining) = &self.remaining else {
            return wanted;
        };

        let mut current = remaining.load(Ordering::SeqCst);
        loop {
            let granted = current.min(wanted);
            match remaining.compare_exchange(
                current,
                current - granted,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return granted,
                Err(actual) => current = actual,
            }
        }
    }

    /// Leaves still available, or `None` when unlimited
    pub fn remaining(&self) -> Option<usize> {
        self.remaining.as_ref().map(|r| r.load(Ordering::SeqCst))
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_grants_everything() {
        let budget = Budget::unlimited();
        assert_eq!(budget.take(1_000_000), 1_000_000);
        assert!(!budget.is_exhausted());
        assert_eq!(budget.remaining(), None);
    }

    #[test]
    fn test_clones_share_the_counter() {
        let budget = Budget::limited(5);
        let other = budget.clone();
        assert_eq!(other.take(3), 3);
        assert_eq!(budget.remaining(), Some(2));
    }

    #[test]
    fn test_zero_limit_is_exhausted() {
        let budget = Budget::from_limit(Some(0));
        assert!(budget.is_exhausted());
        assert_eq!(budget.take(4), 0);
    }

    #[tokio::test]
    async fn test_concurrent_takes_never_overdraw() {
        let budget = Budget::limited(100);
        let mut handles = Vec::new();
        for _ in 0..16 {
            let budget = budget.clone();
            handles.push(tokio::spawn(async move {
                let mut granted = 0;
                for _ in 0..10 {
                    granted += budget.take(1);
                }
                granted
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }
        assert_eq!(total, 100);
        assert!(budget.is_exhausted());
    }
}
