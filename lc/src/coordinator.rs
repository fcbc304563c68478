//! LoadCoordinator - deduplicated asynchronous language loading
//!
//! Maps a language to one hot, shareable load. The first request for a
//! language invokes the [`Loader`] and spawns a task that drives the shared
//! load future to completion; every later request gets a clone of the same
//! [`LoadHandle`] until the language is reset.
//!
//! ```text
//! request_load("en") --> LazyCache<LangKey, LoadHandle> --first--> Loader::get_translation
//!                                   |                                   |
//!                                   +-- clones of one Shared future <-- spawned task
//!                                                                       |
//!                                             success: Languages::set   |
//!                                             failure: evict handle  <--+
//! ```
//!
//! Reset evicts the handle without cancelling the spawned task. Its eventual
//! result still reaches holders of the old handle but is not stored: each
//! handle carries a generation number that no longer matches the cache.
//! Storing a result and resetting a language hold the same commit lock, so
//! the load cache and the registry never disagree about a language.

use std::fmt;
use std::future::IntoFuture;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cache::LazyCache;
use crate::config::Config;
use crate::key::LangKey;
use crate::loader::{LoadError, Loader};
use crate::translations::{LanguageChange, Languages, Translations};

/// Result every waiter of a load receives
pub type LoadResult = Result<Translations, LoadError>;

/// Shareable handle to one in-flight or completed load
///
/// Await it (it implements [`IntoFuture`]) to get the loaded table. Clones
/// observe the same load.
#[derive(Clone)]
pub struct LoadHandle {
    lang: LangKey,
    generation: u64,
    result: Shared<BoxFuture<'static, LoadResult>>,
}

impl LoadHandle {
    pub fn lang(&self) -> &LangKey {
        &self.lang
    }

    /// Identifies the load this handle belongs to; a fresh load after reset gets a new one
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_settled(&self) -> bool {
        self.result.peek().is_some()
    }

    /// The result if the load has already settled
    pub fn peek(&self) -> Option<LoadResult> {
        self.result.peek().cloned()
    }
}

impl IntoFuture for LoadHandle {
    type Output = LoadResult;
    type IntoFuture = Shared<BoxFuture<'static, LoadResult>>;

    fn into_future(self) -> Self::IntoFuture {
        self.result
    }
}

impl fmt::Debug for LoadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadHandle")
            .field("lang", &self.lang)
            .field("generation", &self.generation)
            .field("settled", &self.is_settled())
            .finish()
    }
}

struct Inner {
    loader: Arc<dyn Loader>,
    loads: LazyCache<LangKey, LoadHandle>,
    languages: Languages,
    current: RwLock<Option<LangKey>>,
    default_lang: Option<LangKey>,
    timeout: Option<Duration>,
    next_generation: AtomicU64,
    /// Serializes generation check + registry write against reset
    commit: Mutex<()>,
}

impl Inner {
    /// Record the outcome of a load, unless the handle was reset or replaced meanwhile
    fn settle(&self, lang: &LangKey, generation: u64, result: &LoadResult) {
        let _commit = self.commit.lock();
        let is_current = self
            .loads
            .try_get_value(lang)
            .is_some_and(|handle| handle.generation == generation);
        if !is_current {
            debug!(%lang, generation, "settle: load was reset, discarding result");
            return;
        }

        match result {
            Ok(translations) => {
                info!(%lang, generation, entries = translations.len(), "Translations loaded");
                self.languages.set(lang.clone(), translations.clone());
            }
            Err(e) => {
                warn!(%lang, generation, error = %e, "Translation load failed");
                self.loads.remove_if(lang, |handle| handle.generation == generation);
            }
        }
    }
}

/// Deduplicates and caches asynchronous language loads
///
/// Cheap to clone; clones share the same cache and registry.
#[derive(Clone)]
pub struct LoadCoordinator {
    inner: Arc<Inner>,
}

impl LoadCoordinator {
    pub fn new(loader: impl Loader + 'static) -> Self {
        Self::with_config(loader, &Config::default())
    }

    /// Build a coordinator configured from `path`, or from the first config file found
    pub fn from_config_file(loader: impl Loader + 'static, path: Option<&PathBuf>) -> eyre::Result<Self> {
        let config = Config::load(path)?;
        Ok(Self::with_config(loader, &config))
    }

    pub fn with_config(loader: impl Loader + 'static, config: &Config) -> Self {
        debug!(?config, "LoadCoordinator::with_config: called");
        Self {
            inner: Arc::new(Inner {
                loader: Arc::new(loader),
                loads: LazyCache::new(),
                languages: Languages::with_capacity(config.events.capacity),
                current: RwLock::new(None),
                default_lang: config.loader.default_lang.as_deref().map(LangKey::from),
                timeout: config.loader.timeout(),
                next_generation: AtomicU64::new(1),
                commit: Mutex::new(()),
            }),
        }
    }

    /// Get the load for `lang`, starting it if none is cached.
    ///
    /// Concurrent and later callers share one loader invocation until
    /// [`LoadCoordinator::reset`] is called for the language.
    ///
    /// # Panics
    ///
    /// Starting a load spawns a task, so this must be called within a Tokio runtime.
    pub fn request_load(&self, lang: impl Into<LangKey>) -> LoadHandle {
        let lang = lang.into();
        debug!(%lang, "request_load: called");
        self.inner.loads.get_or_add(lang, |lang| self.start_load(lang))
    }

    fn start_load(&self, lang: &LangKey) -> LoadHandle {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        info!(%lang, generation, "Starting translation load");

        let pending = self.inner.loader.get_translation(lang.as_str());
        let pending = match self.inner.timeout {
            Some(limit) => with_timeout(lang.clone(), limit, pending),
            None => pending,
        };

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let task_lang = lang.clone();
        let result = async move {
            let result = match AssertUnwindSafe(pending).catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    warn!(lang = %task_lang, "Loader panicked");
                    Err(LoadError::Aborted {
                        lang: task_lang.to_string(),
                    })
                }
            };
            if let Some(inner) = inner.upgrade() {
                inner.settle(&task_lang, generation, &result);
            }
            result
        }
        .boxed()
        .shared();

        // Drive the load even if nobody awaits the handle
        tokio::spawn(result.clone());

        LoadHandle {
            lang: lang.clone(),
            generation,
            result,
        }
    }

    /// Make `lang` the current language and request its load
    pub fn use_lang(&self, lang: impl Into<LangKey>) -> LoadHandle {
        let lang = lang.into();
        debug!(%lang, "use_lang: called");
        *self.inner.current.write() = Some(lang.clone());
        self.request_load(lang)
    }

    /// The language chosen with [`LoadCoordinator::use_lang`], else the configured default
    pub fn current_lang(&self) -> Option<LangKey> {
        self.inner
            .current
            .read()
            .clone()
            .or_else(|| self.inner.default_lang.clone())
    }

    /// Discard the cached load and loaded table for `lang`.
    ///
    /// An in-flight load keeps running but its result is ignored; the next
    /// request invokes the loader again. Returns false if nothing was cached.
    pub fn reset(&self, lang: impl Into<LangKey>) -> bool {
        let lang = lang.into();
        let removed = {
            let _commit = self.inner.commit.lock();
            let removed = self.inner.loads.try_remove(&lang);
            self.inner.languages.remove(lang.clone());
            removed
        };
        debug!(%lang, was_cached = removed.is_some(), "reset: called");
        removed.is_some()
    }

    /// Languages with a cached (in-flight or completed) load
    pub fn active_keys(&self) -> Vec<LangKey> {
        self.inner.loads.keys()
    }

    pub fn len(&self) -> usize {
        self.inner.loads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.loads.is_empty()
    }

    /// Loaded table for `lang`, without starting a load
    pub fn translations(&self, lang: impl Into<LangKey>) -> Option<Translations> {
        self.inner.languages.try_get(lang)
    }

    pub fn languages(&self) -> &Languages {
        &self.inner.languages
    }

    /// Subscribe to changes of every loaded language
    pub fn subscribe(&self) -> broadcast::Receiver<LanguageChange> {
        self.inner.languages.subscribe()
    }
}

impl fmt::Debug for LoadCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadCoordinator")
            .field("loads", &self.inner.loads)
            .field("languages", &self.inner.languages)
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

fn with_timeout(
    lang: LangKey,
    limit: Duration,
    pending: BoxFuture<'static, LoadResult>,
) -> BoxFuture<'static, LoadResult> {
    async move {
        match tokio::time::timeout(limit, pending).await {
            Ok(result) => result,
            Err(_) => Err(LoadError::Timeout {
                lang: lang.to_string(),
                timeout_ms: limit.as_millis() as u64,
            }),
        }
    }
    .boxed()
}
