//! Blocking synchronization primitives shared across the session core.

mod semaphore;

pub use semaphore::Semaphore;
