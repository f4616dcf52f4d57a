//! # Kernel synchronization primitives
//!
//! - [`RawSpin`]: a bare test-and-test-and-set spinlock exposing the
//!   `acquire`/`release` contract.
//! - [`SpinLock`]: owns a value behind a [`RawSpin`] and hands out RAII
//!   guards, so the lock is released on every exit path.
//!
//! Both busy-wait without yielding, timeouts or cancellation. Keep critical
//! sections short.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod raw_spin;
mod spin_lock;

pub use raw_spin::RawSpin;
pub use spin_lock::{SpinLock, SpinLockGuard};
