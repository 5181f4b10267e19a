//! Short tokens standing in for type-path prefixes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::core::errors::{DacError, Result};

/// Token → type-path prefix. Read-only once plugin loading is done.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasMap {
    entries: IndexMap<String, String>,
}

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or redefine a token; returns the previous expansion
    pub fn insert(&mut self, token: impl Into<String>, prefix: impl Into<String>) -> Option<String> {
        self.entries.insert(token.into(), prefix.into())
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.entries.get(token).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Substitute the leading token of `path`.
    ///
    /// The leading token is the first dot-separated segment. It is expanded
    /// when it is a registered alias and kept when `is_root` recognises it as
    /// a package root of some registered type. Anything else is an
    /// unresolved alias. Single-segment paths are returned unchanged.
    pub fn expand<'p>(&self, path: &'p str, is_root: impl Fn(&str) -> bool) -> Result<Cow<'p, str>> {
        let Some((token, rest)) = path.split_once('.') else {
            return Ok(Cow::Borrowed(path));
        };
        if let Some(prefix) = self.get(token) {
            return Ok(Cow::Owned(format!("{}.{}", prefix, rest)));
        }
        if is_root(token) {
            return Ok(Cow::Borrowed(path));
        }
        Err(DacError::unresolved_alias(token, path))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AliasMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots(token: &str) -> bool {
        token == "pkg"
    }

    #[test]
    fn test_expand_alias() {
        let aliases: AliasMap = [("mt", "pkg.timedata")].into_iter().collect();
        assert_eq!(
            aliases.expand("mt.actions.LoadAction", roots).unwrap(),
            "pkg.timedata.actions.LoadAction"
        );
    }

    #[test]
    fn test_known_root_passes_through() {
        let aliases = AliasMap::new();
        let expanded = aliases.expand("pkg.timedata.TimeData", roots).unwrap();
        assert!(matches!(expanded, Cow::Borrowed(_)));
    }

    #[test]
    fn test_unknown_token() {
        let aliases = AliasMap::new();
        match aliases.expand("zz.Thing", roots) {
            Err(DacError::UnresolvedAlias { token, path }) => {
                assert_eq!(token, "zz");
                assert_eq!(path, "zz.Thing");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_redefinition_overwrites() {
        let mut aliases = AliasMap::new();
        aliases.insert("mt", "old.pkg");
        assert_eq!(aliases.insert("mt", "pkg.timedata"), Some("old.pkg".to_string()));
        assert_eq!(aliases.get("mt"), Some("pkg.timedata"));
        assert_eq!(aliases.len(), 1);
    }
}
