use std::collections::HashSet;

use crate::search::SearchResult;

/// Ordered, deduplicated collection of search results.
#[derive(Debug, Default, Clone)]
pub struct ResultSet {
    results: Vec<SearchResult>,
    seen: HashSet<String>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append results whose identity is new. Results with neither url nor
    /// title are dropped. Returns how many were added.
    pub fn extend<I: IntoIterator<Item = SearchResult>>(&mut self, results: I) -> usize {
        let before = self.results.len();
        for result in results {
            let Some(key) = result.dedup_key() else {
                continue;
            };
            if self.seen.insert(key) {
                self.results.push(result);
            }
        }
        self.results.len() - before
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn as_slice(&self) -> &[SearchResult] {
        &self.results
    }

    pub fn into_vec(self) -> Vec<SearchResult> {
        self.results
    }
}

impl FromIterator<SearchResult> for ResultSet {
    fn from_iter<T: IntoIterator<Item = SearchResult>>(iter: T) -> Self {
        let mut set = ResultSet::new();
        set.extend(iter);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits() -> Vec<SearchResult> {
        vec![
            SearchResult::new("Paper A", "https://x.org/a", "one"),
            SearchResult::new("Paper A mirror", "HTTPS://X.ORG/A", "dup by url case"),
            SearchResult::new("Paper B", "", "title only"),
            SearchResult::new("paper b", "", "dup by title case"),
            SearchResult::new("", "", "no identity"),
            SearchResult::new("Paper C", "https://x.org/c", "three"),
        ]
    }

    #[test]
    fn test_dedup_by_identity() {
        let mut set = ResultSet::new();
        assert_eq!(set.extend(hits()), 3);
        let titles: Vec<&str> = set.as_slice().iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Paper A", "Paper B", "Paper C"]);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let mut set: ResultSet = hits().into_iter().collect();
        let once = set.as_slice().to_vec();
        assert_eq!(set.extend(once.clone()), 0);
        assert_eq!(set.extend(hits()), 0);
        assert_eq!(set.as_slice(), once.as_slice());
    }
}
