//! The global concurrency gate.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// A counted semaphore bounding all CPU-bound work in the runner.
///
/// A permit is a unit value parked in a bounded channel: acquiring sends,
/// releasing receives, and the channel's length is the number of permits in
/// use. Permits are fungible: one permit covers one unit of work, whether
/// that is "analyze a package" or "run one analyzer inside a package".
pub(crate) struct Semaphore {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Semaphore {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Blocks until a permit is available.
    pub fn acquire(&self) -> Permit<'_> {
        self.tx
            .send(())
            .expect("semaphore channel disconnected while acquiring");
        Permit { semaphore: self }
    }

    /// Returns a permit immediately, or `None` if all are in use.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        match self.tx.try_send(()) {
            Ok(()) => Some(Permit { semaphore: self }),
            Err(TrySendError::Full(())) => None,
            Err(TrySendError::Disconnected(())) => {
                unreachable!("semaphore channel disconnected while acquiring")
            }
        }
    }

    /// Number of permits currently held.
    pub fn in_use(&self) -> usize {
        self.tx.len()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(0)
    }

    fn release(&self) {
        self.rx
            .try_recv()
            .expect("permit released without a matching acquire");
    }
}

/// A held permit; dropping it returns the permit to the gate.
pub(crate) struct Permit<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn permits_are_counted_and_bounded() {
        let semaphore = Semaphore::new(2);
        assert_eq!(semaphore.capacity(), 2);
        assert_eq!(semaphore.in_use(), 0);

        let first = semaphore.acquire();
        let second = semaphore.acquire();
        assert_eq!(semaphore.in_use(), 2);
        assert!(semaphore.try_acquire().is_none());

        drop(first);
        assert_eq!(semaphore.in_use(), 1);
        let third = semaphore.try_acquire();
        assert!(third.is_some());
        drop(third);
        drop(second);
        assert_eq!(semaphore.in_use(), 0);
    }

    #[test]
    fn capacity_is_at_least_one() {
        let semaphore = Semaphore::new(0);
        assert_eq!(semaphore.capacity(), 1);
        let permit = semaphore.acquire();
        assert!(semaphore.try_acquire().is_none());
        drop(permit);
    }

    #[test]
    fn blocking_acquire_waits_for_release() {
        let semaphore = Semaphore::new(1);
        let held = semaphore.acquire();
        let acquired = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                let _permit = semaphore.acquire();
                acquired.store(1, Ordering::SeqCst);
            });
            std::thread::sleep(std::time::Duration::from_millis(20));
            assert_eq!(acquired.load(Ordering::SeqCst), 0);
            drop(held);
        });
        assert_eq!(acquired.load(Ordering::SeqCst), 1);
    }
}
