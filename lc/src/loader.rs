//! Loader contract for fetching translation tables

use futures::future::BoxFuture;
use thiserror::Error;

use crate::translations::Translations;

/// Errors from loading a language
///
/// Cloneable so one failed load can be handed to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("Failed to load translations for '{lang}': {message}")]
    Failed { lang: String, message: String },

    #[error("Loading translations for '{lang}' timed out after {timeout_ms}ms")]
    Timeout { lang: String, timeout_ms: u64 },

    #[error("Load task for '{lang}' was aborted")]
    Aborted { lang: String },
}

impl LoadError {
    pub fn failed(lang: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            lang: lang.into(),
            message: message.into(),
        }
    }

    /// Language the failed load was for
    pub fn lang(&self) -> &str {
        match self {
            Self::Failed { lang, .. } | Self::Timeout { lang, .. } | Self::Aborted { lang } => lang,
        }
    }
}

/// Source of translation tables
///
/// `get_translation` is called synchronously when a load starts and must
/// return a future that resolves to exactly one table or an error. The
/// coordinator deduplicates requests, so implementations need no caching of
/// their own, but must tolerate concurrent calls for different languages.
///
/// The call itself must not block: concurrent requesters of the same
/// language wait for it on their own threads (Tokio workers included).
/// Put all I/O and slow work inside the returned future.
pub trait Loader: Send + Sync {
    fn get_translation(&self, lang: &str) -> BoxFuture<'static, Result<Translations, LoadError>>;
}

impl<F> Loader for F
where
    F: Fn(&str) -> BoxFuture<'static, Result<Translations, LoadError>> + Send + Sync,
{
    fn get_translation(&self, lang: &str) -> BoxFuture<'static, Result<Translations, LoadError>> {
        self(lang)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn test_error_lang_and_display() {
        let err = LoadError::failed("en", "404");
        assert_eq!(err.lang(), "en");
        assert_eq!(err.to_string(), "Failed to load translations for 'en': 404");

        let err = LoadError::Timeout {
            lang: "de".to_string(),
            timeout_ms: 50,
        };
        assert_eq!(err.lang(), "de");
        assert_eq!(err.to_string(), "Loading translations for 'de' timed out after 50ms");
    }

    #[tokio::test]
    async fn test_closure_loader() {
        let loader = |lang: &str| {
            let lang = lang.to_string();
            async move { Ok::<_, LoadError>([("lang", lang)].into_iter().collect::<Translations>()) }.boxed()
        };

        let translations = loader.get_translation("fr").await.unwrap();
        assert_eq!(translations.get("lang").as_deref(), Some("fr"));
    }
}
