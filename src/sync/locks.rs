//! Striped per-order locks.

use crate::types::OrderId;
use parking_lot::{Mutex, MutexGuard};

/// A fixed table of mutexes; an order id always maps to the same stripe.
///
/// Two different orders may share a stripe and then serialize, which is
/// harmless. The same order never runs two writes concurrently.
pub struct OrderLocks {
    stripes: Vec<Mutex<()>>,
}

impl OrderLocks {
    pub const DEFAULT_STRIPES: usize = 64;

    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Block until the stripe for `order_id` is free.
    pub fn lock(&self, order_id: OrderId) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_of(order_id)].lock()
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    fn stripe_of(&self, order_id: OrderId) -> usize {
        (order_id.0 % self.stripes.len() as u64) as usize
    }
}

impl Default for OrderLocks {
    fn default() -> Self {
        Self::new(Self::DEFAULT_STRIPES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_order_same_stripe() {
        let locks = OrderLocks::new(8);
        assert_eq!(locks.stripe_of(OrderId(3)), locks.stripe_of(OrderId(11)));
        assert_ne!(locks.stripe_of(OrderId(3)), locks.stripe_of(OrderId(4)));
    }

    #[test]
    fn test_lock_is_exclusive() {
        let locks = OrderLocks::new(4);
        let _guard = locks.lock(OrderId(1));
        assert!(locks.stripes[1].try_lock().is_none());
        assert!(locks.stripes[2].try_lock().is_some());
    }

    #[test]
    fn test_zero_stripes_clamped() {
        assert_eq!(OrderLocks::new(0).stripe_count(), 1);
    }
}
