//! Case-insensitive language keys

use std::fmt;
use std::hash::{Hash, Hasher};

/// Language tag compared and hashed without regard to case
///
/// `"EN"`, `"en"` and `"En"` name the same language. The spelling first
/// given is kept for display.
#[derive(Clone)]
pub struct LangKey(String);

impl LangKey {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn folded(&self) -> impl Iterator<Item = char> + '_ {
        self.0.chars().flat_map(char::to_lowercase)
    }
}

impl PartialEq for LangKey {
    fn eq(&self, other: &Self) -> bool {
        self.folded().eq(other.folded())
    }
}

impl Eq for LangKey {}

impl PartialEq<str> for LangKey {
    fn eq(&self, other: &str) -> bool {
        self.folded().eq(other.chars().flat_map(char::to_lowercase))
    }
}

impl PartialEq<&str> for LangKey {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

impl Hash for LangKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for c in self.folded() {
            c.hash(state);
        }
        state.write_u8(0xff);
    }
}

impl fmt::Display for LangKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for LangKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LangKey({:?})", self.0)
    }
}

impl From<&str> for LangKey {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for LangKey {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

impl From<&String> for LangKey {
    fn from(tag: &String) -> Self {
        Self::new(tag.as_str())
    }
}

impl From<&LangKey> for LangKey {
    fn from(key: &LangKey) -> Self {
        key.clone()
    }
}
