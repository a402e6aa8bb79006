//! Routine picker state.
//!
//! Routine names are matched with nucleo against the query; the list keeps
//! the routine map's order while the query is empty.

use nucleo::pattern::{CaseMatching, Normalization, Pattern};
use nucleo::{Config, Matcher};

use crate::meta::RoutineMap;

/// Fuzzy-filtered list of routines with a selection.
pub struct RoutinePicker {
    /// (name, command) pairs
    entries: Vec<(String, String)>,

    /// Current search text
    query: String,

    /// Indices into `entries` matching `query`, best first
    filtered: Vec<usize>,

    /// Position in `filtered`
    selected: usize,

    matcher: Matcher,
}

impl std::fmt::Debug for RoutinePicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutinePicker")
            .field("entries", &self.entries.len())
            .field("query", &self.query)
            .field("selected", &self.selected)
            .finish()
    }
}

impl RoutinePicker {
    /// Create a picker over `routines`.
    pub fn new(routines: &RoutineMap) -> Self {
        let entries: Vec<(String, String)> =
            routines.iter().map(|(name, command)| (name.clone(), command.clone())).collect();
        let filtered = (0..entries.len()).collect();

        Self { entries, query: String::new(), filtered, selected: 0, matcher: Matcher::new(Config::DEFAULT) }
    }

    /// The search text.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Total number of routines.
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    /// Matching routines as (name, command), best first.
    pub fn visible(&self) -> impl Iterator<Item = (&str, &str)> {
        self.filtered.iter().map(|&i| (self.entries[i].0.as_str(), self.entries[i].1.as_str()))
    }

    /// Position of the selection in [`RoutinePicker::visible`].
    pub fn selected_index(&self) -> usize {
        self.selected
    }

    /// Name of the selected routine.
    pub fn selected(&self) -> Option<&str> {
        self.filtered.get(self.selected).map(|&i| self.entries[i].0.as_str())
    }

    pub fn push_char(&mut self, c: char) {
        self.query.push(c);
        self.refilter();
    }

    pub fn pop_char(&mut self) {
        if self.query.pop().is_some() {
            self.refilter();
        }
    }

    pub fn clear_query(&mut self) {
        self.query.clear();
        self.refilter();
    }

    pub fn select_next(&mut self) {
        if !self.filtered.is_empty() {
            self.selected = (self.selected + 1) % self.filtered.len();
        }
    }

    pub fn select_previous(&mut self) {
        if !self.filtered.is_empty() {
            self.selected = self.selected.checked_sub(1).unwrap_or(self.filtered.len() - 1);
        }
    }

    fn refilter(&mut self) {
        self.selected = 0;

        if self.query.trim().is_empty() {
            self.filtered = (0..self.entries.len()).collect();
            return;
        }

        let pattern = Pattern::parse(&self.query, CaseMatching::Smart, Normalization::Smart);
        let names: Vec<(usize, &str)> =
            self.entries.iter().enumerate().map(|(i, (name, _))| (i, name.as_str())).collect();

        self.filtered = pattern
            .match_list(names.iter().map(|(i, name)| IndexedName(*i, name)), &mut self.matcher)
            .into_iter()
            .map(|(item, _)| item.0)
            .collect();
    }
}

/// A routine name that remembers its entry index.
struct IndexedName<'a>(usize, &'a str);

impl AsRef<str> for IndexedName<'_> {
    fn as_ref(&self) -> &str {
        self.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routines() -> RoutineMap {
        [("build", "cargo build"), ("deploy", "sequence build push"), ("dev", "api & web"), ("test", "cargo test")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn names(picker: &RoutinePicker) -> Vec<&str> {
        picker.visible().map(|(name, _)| name).collect()
    }

    #[test]
    fn test_empty_query_lists_everything_in_order() {
        let picker = RoutinePicker::new(&routines());
        assert_eq!(names(&picker), vec!["build", "deploy", "dev", "test"]);
        assert_eq!(picker.selected(), Some("build"));
        assert_eq!(picker.total(), 4);
    }

    #[test]
    fn test_query_filters_names() {
        let mut picker = RoutinePicker::new(&routines());
        for c in "dep".chars() {
            picker.push_char(c);
        }
        assert_eq!(names(&picker), vec!["deploy"]);
        assert_eq!(picker.selected(), Some("deploy"));

        picker.pop_char();
        assert_eq!(picker.query(), "de");
        let mut visible = names(&picker);
        visible.sort_unstable();
        assert_eq!(visible, vec!["deploy", "dev"]);
    }

    #[test]
    fn test_single_char_query_is_fuzzy() {
        let mut picker = RoutinePicker::new(&routines());
        picker.push_char('d');
        let visible = names(&picker);
        assert!(visible.contains(&"build"));
        assert!(visible.contains(&"deploy"));
        assert!(visible.contains(&"dev"));
        assert!(!visible.contains(&"test"));
    }

    #[test]
    fn test_no_match() {
        let mut picker = RoutinePicker::new(&routines());
        picker.push_char('z');
        assert!(picker.selected().is_none());
        picker.select_next();
        assert!(picker.selected().is_none());

        picker.clear_query();
        assert_eq!(picker.selected(), Some("build"));
    }

    #[test]
    fn test_selection_wraps() {
        let mut picker = RoutinePicker::new(&routines());
        picker.select_previous();
        assert_eq!(picker.selected(), Some("test"));
        picker.select_next();
        assert_eq!(picker.selected(), Some("build"));
        picker.select_next();
        assert_eq!(picker.selected_index(), 1);
    }
}
