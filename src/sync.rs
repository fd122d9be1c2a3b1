//! The engine's serialisation primitive, chosen at build time.
//!
//! With the `thread-safe` feature the lock is a real mutex held for every
//! public operation end-to-end, and engine handles may cross threads.
//! Without it there is no synchronisation at all: the "lock" is a
//! `RefCell` and handles are `!Send`, so external serialisation is
//! enforced by the compiler rather than left to the caller's discipline.

#[cfg(feature = "thread-safe")]
mod imp {
    use std::sync::{Mutex, MutexGuard};

    pub struct EngineLock<T> {
        inner: Mutex<T>,
    }

    impl<T> EngineLock<T> {
        pub fn new(value: T) -> EngineLock<T> {
            EngineLock {
                inner: Mutex::new(value),
            }
        }

        pub fn lock(&self) -> MutexGuard<'_, T> {
            self.inner.lock().unwrap()
        }
    }
}

#[cfg(not(feature = "thread-safe"))]
mod imp {
    use std::cell::{RefCell, RefMut};

    pub struct EngineLock<T> {
        inner: RefCell<T>,
    }

    impl<T> EngineLock<T> {
        pub fn new(value: T) -> EngineLock<T> {
            EngineLock {
                inner: RefCell::new(value),
            }
        }

        pub fn lock(&self) -> RefMut<'_, T> {
            self.inner.borrow_mut()
        }
    }
}

pub use imp::EngineLock;
