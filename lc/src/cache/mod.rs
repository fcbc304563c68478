//! Lazy concurrent caching
//!
//! [`LazyCache`] stores one [`LazyCell`] per key. The map decides which cell
//! a key resolves to; the cell guarantees its factory runs once.

mod cell;
mod lazy;

pub use cell::LazyCell;
pub use lazy::{LazyCache, Removed};
