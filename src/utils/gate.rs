use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Number of transfers allowed to hold a gate unit at the same time.
///
/// Never zero: a gate with no units would park every task forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity(NonZeroUsize);

impl Capacity {
    /// Floors `n` to 1 and caps it to what the semaphore can represent.
    pub fn new(n: usize) -> Self {
        let n = n.clamp(1, Semaphore::MAX_PERMITS);
        Self(NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN))
    }

    /// One unit per available processing unit. Detection failure counts as
    /// zero and is floored like any other zero.
    pub fn detect() -> Self {
        Self::new(
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(0),
        )
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl Default for Capacity {
    fn default() -> Self {
        Self::detect()
    }
}

/// Counting admission gate shared by every transfer of a run.
#[derive(Debug, Clone)]
pub struct Gate {
    semaphore: Arc<Semaphore>,
    capacity: Capacity,
}

/// One acquired gate unit. Dropping it releases the unit.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl GatePermit {
    pub fn release(self) {}
}

impl Gate {
    pub fn new(capacity: Capacity) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity.get())),
            capacity,
        }
    }

    /// Waits until a unit is free and takes it.
    pub async fn acquire(&self) -> Result<GatePermit, AcquireError> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await?;
        tracing::trace!(held = self.held(), capacity = self.capacity.get(), "gate acquired");
        Ok(GatePermit { _permit: permit })
    }

    /// Makes every pending and later `acquire` fail. Units already held stay
    /// valid until released.
    #[cfg(test)]
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn held(&self) -> usize {
        self.capacity.get() - self.available()
    }
}
