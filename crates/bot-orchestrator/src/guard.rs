//! Per-symbol in-flight guard.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Set of symbols with a cycle in flight. A symbol can be held by at
/// most one [`SymbolPermit`] at a time.
#[derive(Debug, Clone, Default)]
pub struct SymbolGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl SymbolGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `symbol`, or returns `None` if it is already claimed.
    #[must_use]
    pub fn try_acquire(&self, symbol: &str) -> Option<SymbolPermit> {
        let mut set = self.in_flight.lock();
        if !set.insert(symbol.to_string()) {
            return None;
        }
        Some(SymbolPermit {
            in_flight: Arc::clone(&self.in_flight),
            symbol: symbol.to_string(),
        })
    }

    #[must_use]
    pub fn is_held(&self, symbol: &str) -> bool {
        self.in_flight.lock().contains(symbol)
    }
}

/// Releases its symbol on drop, including during unwinding.
#[derive(Debug)]
pub struct SymbolPermit {
    in_flight: Arc<Mutex<HashSet<String>>>,
    symbol: String,
}

impl SymbolPermit {
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl Drop for SymbolPermit {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_refused_until_release() {
        let guard = SymbolGuard::new();
        let permit = guard.try_acquire("BTCUSDT").unwrap();
        assert_eq!(permit.symbol(), "BTCUSDT");
        assert!(guard.try_acquire("BTCUSDT").is_none());
        assert!(guard.try_acquire("ETHUSDT").is_some());

        drop(permit);
        assert!(!guard.is_held("BTCUSDT"));
        assert!(guard.try_acquire("BTCUSDT").is_some());
    }

    #[test]
    fn test_released_on_panic() {
        let guard = SymbolGuard::new();
        let cloned = guard.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _permit = cloned.try_acquire("SOLUSDT").unwrap();
            panic!("cycle failed");
        }));
        assert!(result.is_err());
        assert!(!guard.is_held("SOLUSDT"));
    }
}
