//! Ordered menus with section markers.
//!
//! A registry list mixes type paths with markers:
//!
//! * `"[Label]"` separator
//! * `"[Label>]"` opens a submenu
//! * `"[<]"` or `"[<Label]"` closes the innermost submenu

use serde::Serialize;

use crate::core::errors::DacError;

/// A parsed registry list entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker<'a> {
    Path(&'a str),
    Separator(&'a str),
    Open(&'a str),
    Close,
}

impl<'a> Marker<'a> {
    pub fn parse(entry: &'a str) -> Self {
        let trimmed = entry.trim();
        let Some(inner) = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        else {
            return Self::Path(trimmed);
        };
        if inner.starts_with('<') {
            Self::Close
        } else if let Some(label) = inner.strip_suffix('>') {
            Self::Open(label.trim())
        } else {
            Self::Separator(inner.trim())
        }
    }
}

/// A flat, balanced menu entry as stored in the registry state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MenuEntry<T> {
    Item(T),
    Separator(String),
    Open(String),
    Close,
}

/// Tree form of a menu, consumed by presentation layers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MenuItem<T> {
    Item(T),
    Separator(String),
    Submenu { label: String, items: Vec<MenuItem<T>> },
}

/// Tracks submenu depth while entries of one list are appended.
///
/// Unmatched closes are reported and dropped; submenus still open when the
/// list ends are reported and closed so the stored list stays balanced.
#[derive(Debug, Default)]
pub struct SectionBalancer {
    depth: usize,
}

impl SectionBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a marker entry, returning the error if it had to be dropped
    pub fn push<T>(
        &mut self,
        entries: &mut Vec<MenuEntry<T>>,
        marker: &Marker<'_>,
        raw: &str,
    ) -> Result<(), DacError> {
        match marker {
            Marker::Separator(label) => entries.push(MenuEntry::Separator(label.to_string())),
            Marker::Open(label) => {
                self.depth += 1;
                entries.push(MenuEntry::Open(label.to_string()));
            }
            Marker::Close => {
                if self.depth == 0 {
                    return Err(DacError::malformed_section(raw, "no open submenu to close"));
                }
                self.depth -= 1;
                entries.push(MenuEntry::Close);
            }
            Marker::Path(_) => {}
        }
        Ok(())
    }

    /// Close whatever is still open, reporting it as malformed
    pub fn finish<T>(self, entries: &mut Vec<MenuEntry<T>>) -> Result<(), DacError> {
        if self.depth == 0 {
            return Ok(());
        }
        for _ in 0..self.depth {
            entries.push(MenuEntry::Close);
        }
        Err(DacError::malformed_section(
            "[..>]",
            format!("{} submenu(s) left open at end of list", self.depth),
        ))
    }
}

/// Build the menu tree of a balanced flat list
pub fn build_tree<T: Clone>(entries: &[MenuEntry<T>]) -> Vec<MenuItem<T>> {
    let mut stack: Vec<(String, Vec<MenuItem<T>>)> = Vec::new();
    let mut current: Vec<MenuItem<T>> = Vec::new();

    for entry in entries {
        match entry {
            MenuEntry::Item(item) => current.push(MenuItem::Item(item.clone())),
            MenuEntry::Separator(label) => current.push(MenuItem::Separator(label.clone())),
            MenuEntry::Open(label) => {
                stack.push((label.clone(), std::mem::take(&mut current)));
            }
            MenuEntry::Close => {
                if let Some((label, parent)) = stack.pop() {
                    let items = std::mem::replace(&mut current, parent);
                    current.push(MenuItem::Submenu { label, items });
                }
            }
        }
    }
    // Only reached for unbalanced input.
    while let Some((label, parent)) = stack.pop() {
        let items = std::mem::replace(&mut current, parent);
        current.push(MenuItem::Submenu { label, items });
    }
    current
}

/// Deepest submenu nesting of a tree
pub fn depth<T>(items: &[MenuItem<T>]) -> usize {
    items
        .iter()
        .map(|item| match item {
            MenuItem::Submenu { items, .. } => 1 + depth(items),
            _ => 0,
        })
        .max()
        .unwrap_or(0)
}

/// Items of a tree in menu order, ignoring structure
pub fn flatten<T>(items: &[MenuItem<T>]) -> Vec<&T> {
    let mut out = Vec::new();
    for item in items {
        match item {
            MenuItem::Item(item) => out.push(item),
            MenuItem::Submenu { items, .. } => out.extend(flatten(items)),
            MenuItem::Separator(_) => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn balanced(raw: &[&str]) -> (Vec<MenuEntry<String>>, Vec<DacError>) {
        let mut entries = Vec::new();
        let mut errors = Vec::new();
        let mut balancer = SectionBalancer::new();
        for entry in raw {
            match Marker::parse(entry) {
                Marker::Path(path) => entries.push(MenuEntry::Item(path.to_string())),
                marker => {
                    if let Err(e) = balancer.push(&mut entries, &marker, entry) {
                        errors.push(e);
                    }
                }
            }
        }
        if let Err(e) = balancer.finish(&mut entries) {
            errors.push(e);
        }
        (entries, errors)
    }

    #[test]
    fn test_marker_parsing() {
        assert_eq!(Marker::parse("[Filters]"), Marker::Separator("Filters"));
        assert_eq!(Marker::parse("[Filters>]"), Marker::Open("Filters"));
        assert_eq!(Marker::parse("[<]"), Marker::Close);
        assert_eq!(Marker::parse("[<Filters]"), Marker::Close);
        assert_eq!(Marker::parse("mt.TimeData"), Marker::Path("mt.TimeData"));
    }

    #[test]
    fn test_tree_depth_matches_markers() {
        let (entries, errors) = balanced(&[
            "a", "[S1>]", "b", "[S2>]", "c", "[<]", "[Sep]", "d", "[<S1]", "e",
        ]);
        assert!(errors.is_empty());
        let tree = build_tree(&entries);
        assert_eq!(depth(&tree), 2);
        let names: Vec<&str> = flatten(&tree).into_iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_unmatched_close_is_dropped() {
        let (entries, errors) = balanced(&["a", "[<]", "b"]);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], DacError::MalformedSection { .. }));
        let tree = build_tree(&entries);
        assert_eq!(depth(&tree), 0);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_unclosed_submenu_is_closed_and_reported() {
        let (entries, errors) = balanced(&["[Open>]", "a"]);
        assert_eq!(errors.len(), 1);
        let tree = build_tree(&entries);
        assert_eq!(
            tree,
            vec![MenuItem::Submenu {
                label: "Open".to_string(),
                items: vec![MenuItem::Item("a".to_string())],
            }]
        );
    }
}
