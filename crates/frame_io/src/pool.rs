use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, Weak};

/// Fixed-capacity pool of output resources.
///
/// Acquire and release are safe from any thread; a backend completion thread
/// returning a [`Lease`] while the dispatcher thread acquires the next one is
/// the expected traffic pattern. `acquire` never blocks: exhaustion is a
/// `None`, which callers surface as a buffer-allocation error or truncate on.
pub struct ResourcePool<T: Send + 'static> {
    shared: Arc<PoolShared<T>>,
}

struct PoolShared<T> {
    slots: Mutex<Vec<T>>,
    capacity: usize,
}

impl<T: Send + 'static> ResourcePool<T> {
    /// Build a pool over a fixed set of resources. Capacity is set at
    /// construction and never grows.
    pub fn new(items: Vec<T>) -> Self {
        let capacity = items.len();
        Self {
            shared: Arc::new(PoolShared {
                slots: Mutex::new(items),
                capacity,
            }),
        }
    }

    pub fn acquire(&self) -> Option<Lease<T>> {
        let item = self.shared.slots.lock().unwrap().pop()?;
        Some(Lease {
            item: Some(item),
            home: Arc::downgrade(&self.shared),
        })
    }

    pub fn available(&self) -> usize {
        self.shared.slots.lock().unwrap().len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl<T: Send + 'static> Clone for ResourcePool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Exclusive hold on one pooled resource; dropping returns it to the pool.
pub struct Lease<T: Send + 'static> {
    item: Option<T>,
    home: Weak<PoolShared<T>>,
}

impl<T: Send + 'static> Deref for Lease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.item.as_ref().expect("lease already returned")
    }
}

impl<T: Send + 'static> DerefMut for Lease<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("lease already returned")
    }
}

impl<T: Send + 'static> Drop for Lease<T> {
    fn drop(&mut self) {
        if let (Some(item), Some(home)) = (self.item.take(), self.home.upgrade()) {
            home.slots.lock().unwrap().push(item);
        }
    }
}

impl<T: Send + std::fmt::Debug + 'static> std::fmt::Debug for Lease<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Lease").field(&self.item).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_drains_and_drop_refills() {
        let pool = ResourcePool::new(vec![1u32, 2, 3]);
        assert_eq!(pool.capacity(), 3);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(pool.available(), 1);
        drop(a);
        drop(b);
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn exhaustion_is_none_not_panic() {
        let pool = ResourcePool::new(vec![0u8]);
        let held = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        drop(held);
        assert!(pool.acquire().is_some());
    }

    #[test]
    fn release_from_another_thread() {
        let pool = ResourcePool::new(vec![7u32]);
        let lease = pool.acquire().unwrap();
        let handle = std::thread::spawn(move || drop(lease));
        handle.join().unwrap();
        assert_eq!(pool.available(), 1);
    }
}
