//! langcache - load-once language tables with keyed change fan-in
//!
//! Manages named translation tables that are expensive or asynchronous to
//! produce. Each table is computed at most once per language, even under
//! concurrent access, and can be invalidated and loaded again.
//!
//! # Core Concepts
//!
//! - **Single execution**: [`LazyCache`] runs a key's factory once per cell,
//!   no matter how many threads race on it
//! - **Fan-in**: [`Registry`] republishes every entry's change events on one
//!   key-tagged broadcast stream
//! - **Load coalescing**: [`LoadCoordinator`] shares one in-flight load per
//!   language and supports resetting it
//!
//! # Modules
//!
//! - [`cache`] - LazyCache and its per-key cell
//! - [`observe`] - Observable values, observers and subscriptions
//! - [`registry`] - Keyed registry and aggregated event notifier
//! - [`coordinator`] - Asynchronous load deduplication
//! - [`config`] - Configuration types and loading
//!
//! # Example
//!
//! ```ignore
//! use langcache::{LoadCoordinator, Translations};
//!
//! let coordinator = LoadCoordinator::new(my_loader);
//! let mut changes = coordinator.subscribe();
//!
//! let en: Translations = coordinator.request_load("en").await?;
//! en.set("greeting", "Hello");
//!
//! let change = changes.recv().await?;
//! assert_eq!(change.key, "en");
//! ```

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod key;
pub mod loader;
pub mod observe;
pub mod registry;
pub mod translations;

// Re-export commonly used types
pub use cache::{LazyCache, LazyCell, Removed};
pub use config::{Config, EventsConfig, LoaderConfig};
pub use coordinator::{LoadCoordinator, LoadHandle, LoadResult};
pub use key::LangKey;
pub use loader::{LoadError, Loader};
pub use observe::{Observable, Observer, ObserverSet, Subscription};
pub use registry::{DEFAULT_EVENT_CAPACITY, KeyedEvent, Notifier, Registry};
pub use translations::{LanguageChange, Languages, TranslationChange, Translations};
