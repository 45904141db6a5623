//! Tag Index – superset matching over tagged records.
//!
//! A record matches a [`TagQuery`] iff its tag set contains every query tag.
//! Matching is set containment only: no ranking, no pagination.  An empty
//! query matches nothing; it is never treated as "match all".

use std::collections::HashSet;

use crate::record::Record;

/// A normalised tag query: duplicates removed, first-seen order kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagQuery {
    tags: Vec<String>,
}

impl TagQuery {
    pub fn new<S: AsRef<str>>(tags: &[S]) -> Self {
        let mut seen = HashSet::new();
        let tags = tags
            .iter()
            .map(|t| t.as_ref())
            .filter(|t| seen.insert(*t))
            .map(str::to_string)
            .collect();
        Self { tags }
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Whether `record_tags` is a superset of this query.
    pub fn matches(&self, record_tags: &[String]) -> bool {
        if self.is_empty() {
            return false;
        }
        let have: HashSet<&str> = record_tags.iter().map(String::as_str).collect();
        self.tags.iter().all(|t| have.contains(t.as_str()))
    }

    /// Keep the `(id, record)` pairs whose tags match, preserving order.
    pub fn filter<I>(&self, records: I) -> Vec<(u64, Record)>
    where
        I: IntoIterator<Item = (u64, Record)>,
    {
        if self.is_empty() {
            return Vec::new();
        }
        records
            .into_iter()
            .filter(|(_, r)| self.matches(r.tags()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Field, Value};

    fn tagged(tags: &[&str]) -> Record {
        let mut r = Record::new();
        r.insert_sparse(
            Field::Tags,
            Value::TextList(tags.iter().map(|t| t.to_string()).collect()),
        );
        r
    }

    fn strings(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn superset_matches() {
        let q = TagQuery::new(&["robot"]);
        assert!(q.matches(&strings(&["robot", "lab1"])));
        assert!(!q.matches(&strings(&["lab1"])));
    }

    #[test]
    fn every_query_tag_is_required() {
        let q = TagQuery::new(&["robot", "lab2"]);
        assert!(!q.matches(&strings(&["robot", "lab1"])));
        assert!(q.matches(&strings(&["lab2", "x", "robot"])));
    }

    #[test]
    fn empty_query_matches_nothing() {
        let q = TagQuery::new::<&str>(&[]);
        assert!(q.is_empty());
        assert!(!q.matches(&strings(&["robot"])));
        assert!(!q.matches(&[]));
    }

    #[test]
    fn duplicate_query_tags_are_collapsed() {
        let q = TagQuery::new(&["map", "map", "lab"]);
        assert_eq!(q.tags(), &strings(&["map", "lab"])[..]);
    }

    #[test]
    fn untagged_records_never_match() {
        let q = TagQuery::new(&["map"]);
        assert!(q.filter(vec![(1, Record::new())]).is_empty());
    }

    #[test]
    fn filter_keeps_input_order() {
        let q = TagQuery::new(&["map"]);
        let records = vec![
            (1, tagged(&["map", "a"])),
            (2, tagged(&["b"])),
            (3, tagged(&["map"])),
        ];
        let ids: Vec<u64> = q.filter(records).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
