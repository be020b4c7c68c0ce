use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// The hardware allocator ran out of payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("hardware buffer allocator exhausted")]
pub struct AllocError;

/// Reference-counted hardware buffer allocator.
///
/// The engine never allocates raw hardware memory itself; it only holds
/// counted references. `allocate` hands out a payload id with one reference,
/// `retain`/`release` adjust the count, and the payload is reclaimed by the
/// allocator when the count reaches zero.
pub trait HwAllocator: Send + Sync {
    fn allocate(&self) -> Result<u64, AllocError>;
    fn retain(&self, id: u64);
    fn release(&self, id: u64);
}

/// Strong handle to one hardware payload.
///
/// Cloning retains the payload, dropping releases it, so the last handle to
/// go away returns the buffer to the allocator. This is the only resource
/// shared across stage threads.
pub struct HwSurface {
    id: u64,
    alloc: Arc<dyn HwAllocator>,
}

impl HwSurface {
    /// Acquire a fresh payload from the allocator.
    pub fn acquire(alloc: &Arc<dyn HwAllocator>) -> Result<Self, AllocError> {
        let id = alloc.allocate()?;
        Ok(Self {
            id,
            alloc: Arc::clone(alloc),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Clone for HwSurface {
    fn clone(&self) -> Self {
        self.alloc.retain(self.id);
        Self {
            id: self.id,
            alloc: Arc::clone(&self.alloc),
        }
    }
}

impl Drop for HwSurface {
    fn drop(&mut self) {
        self.alloc.release(self.id);
    }
}

impl fmt::Debug for HwSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HwSurface").field("id", &self.id).finish()
    }
}
