//! Cache key definitions.
//!
//! Entity keys and their aggregate ("list all") key live together in a
//! [`KeySpace`], so every caller derives them the same way.

use std::fmt::Display;

use sha2::{Digest, Sha256};

const PAGE_KEY_PREFIX: &str = "page-";

/// Naming scheme for one cached collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    /// Source table the collection mirrors; used to route change notifications.
    pub table: String,
    /// Prefix for per-entity keys (`<prefix>-<id>`).
    pub entity_prefix: String,
    /// Key holding the derived "all entities" view.
    pub aggregate_key: String,
}

impl KeySpace {
    pub fn new(
        table: impl Into<String>,
        entity_prefix: impl Into<String>,
        aggregate_key: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            entity_prefix: entity_prefix.into(),
            aggregate_key: aggregate_key.into(),
        }
    }

    /// Key space for the articles collection stored in `table`.
    pub fn articles(table: impl Into<String>) -> Self {
        Self::new(table, "article", "all-articles")
    }

    pub fn entity_key(&self, id: impl Display) -> String {
        format!("{}-{}", self.entity_prefix, id)
    }

    pub fn aggregate_key(&self) -> &str {
        &self.aggregate_key
    }

    pub fn matches_table(&self, table: &str) -> bool {
        self.table.eq_ignore_ascii_case(table)
    }
}

/// Key for a proxied upstream document.
///
/// The URL is hashed so keys stay short and free of characters a backing
/// store might reject.
pub fn page_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{PAGE_KEY_PREFIX}{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_keys() {
        let keys = KeySpace::articles("articles");
        assert_eq!(keys.entity_key(5), "article-5");
        assert_eq!(keys.entity_key("abc"), "article-abc");
        assert_eq!(keys.aggregate_key(), "all-articles");
        assert!(keys.matches_table("Articles"));
        assert!(!keys.matches_table("comments"));
    }

    #[test]
    fn page_keys_are_stable_and_distinct() {
        let a = page_key("https://example.com/index.html");
        let b = page_key("https://example.com/index.html");
        let c = page_key("https://example.com/about.html");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with(PAGE_KEY_PREFIX));
        assert_eq!(a.len(), PAGE_KEY_PREFIX.len() + 64);
    }
}
