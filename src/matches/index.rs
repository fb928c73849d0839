//! Deduplicating, bidirectionally queryable index over match records.

use std::collections::BTreeMap;

use indexmap::IndexSet;

use crate::matches::MatchRecord;

/// Handle of a record in the index arena.
type Handle = usize;

/// An in-memory index over one matching run's records, keyed by local
/// patient id.
///
/// A record is stored under the reference patient's id if that side is
/// local, and under the matched patient's id if that side is local; a
/// fully-local record thus lives under two keys but counts once.  Built by
/// sequential `add` calls and then queried; not meant for concurrent
/// mutation.
#[derive(Debug, Default)]
pub struct MatchIndex {
    /// Arena of records; removed records leave a tombstone so handles stay
    /// stable.
    records: Vec<Option<MatchRecord>>,
    /// local patient id -> other patient id -> record handles.
    buckets: BTreeMap<String, BTreeMap<String, IndexSet<Handle>>>,
}

impl MatchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, indexing it under each local side.
    ///
    /// Returns `false` without inserting when neither side is local or when
    /// an equal record (same four identifying fields) is already present.
    pub fn add(&mut self, record: MatchRecord) -> bool {
        if !record.reference.is_local() && !record.matched.is_local() {
            return false;
        }
        if self.find_handle(&record).is_some() {
            return false;
        }

        let handle = self.records.len();
        if record.reference.is_local() {
            self.buckets
                .entry(record.reference.patient_id.clone())
                .or_default()
                .entry(record.matched.patient_id.clone())
                .or_default()
                .insert(handle);
        }
        if record.matched.is_local() {
            self.buckets
                .entry(record.matched.patient_id.clone())
                .or_default()
                .entry(record.reference.patient_id.clone())
                .or_default()
                .insert(handle);
        }
        self.records.push(Some(record));
        true
    }

    /// Remove the record equal to the given one, if present.
    pub fn remove(&mut self, record: &MatchRecord) -> bool {
        let Some(handle) = self.find_handle(record) else {
            return false;
        };
        for by_other in self.buckets.values_mut() {
            for handles in by_other.values_mut() {
                handles.shift_remove(&handle);
            }
        }
        self.buckets.retain(|_, by_other| {
            by_other.retain(|_, handles| !handles.is_empty());
            !by_other.is_empty()
        });
        self.records[handle] = None;
        true
    }

    /// Return whether a record equal to the given one is present.
    pub fn contains(&self, record: &MatchRecord) -> bool {
        self.find_handle(record).is_some()
    }

    /// Number of distinct records, by identity.
    ///
    /// A doubly-indexed fully-local record counts once; two distinct but
    /// equivalent records count separately.
    pub fn size(&self) -> usize {
        self.records.iter().flatten().count()
    }

    /// The local patient ids with at least one match, in sorted order.
    pub fn local_patient_ids(&self) -> Vec<&str> {
        self.buckets.keys().map(String::as_str).collect()
    }

    /// All matches indexed under a local patient id.
    ///
    /// With `filter_equivalents`, only one representative per equivalence
    /// class is kept, preferring the record where the given patient is the
    /// matched side.  Unknown ids yield an empty result.
    pub fn matches_for_local_patient(
        &self,
        patient_id: &str,
        filter_equivalents: bool,
    ) -> Vec<&MatchRecord> {
        let Some(by_other) = self.buckets.get(patient_id) else {
            return Vec::new();
        };
        let mut result: Vec<&MatchRecord> = Vec::new();
        for handles in by_other.values() {
            for handle in handles {
                let Some(record) = self.records[*handle].as_ref() else {
                    continue;
                };
                if !filter_equivalents {
                    result.push(record);
                    continue;
                }
                match result.iter().position(|kept| kept.is_equivalent(record)) {
                    Some(pos) => {
                        // Prefer the record found from the other end.
                        if record.is_matched(patient_id, None)
                            && !result[pos].is_matched(patient_id, None)
                        {
                            result[pos] = record;
                        }
                    }
                    None => result.push(record),
                }
            }
        }
        result
    }

    /// Find the record equivalent to the given one, if any.
    pub fn equivalent_match(&self, record: &MatchRecord) -> Option<&MatchRecord> {
        self.records
            .iter()
            .flatten()
            .find(|candidate| candidate.is_equivalent(record))
    }

    /// Handle of the record equal (by identifying fields) to the given one.
    fn find_handle(&self, record: &MatchRecord) -> Option<Handle> {
        let key = if record.reference.is_local() {
            Some((&record.reference.patient_id, &record.matched.patient_id))
        } else if record.matched.is_local() {
            Some((&record.matched.patient_id, &record.reference.patient_id))
        } else {
            None
        };
        let (local_id, other_id) = key?;
        self.buckets
            .get(local_id)
            .and_then(|by_other| by_other.get(other_id))
            .into_iter()
            .flatten()
            .find(|handle| {
                self.records[**handle]
                    .as_ref()
                    .is_some_and(|candidate| candidate.has_same_patients(record))
            })
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::matches::tests::record;

    /// The fixture batch: 16 matches over local patients P1..P5 and remote
    /// servers server1..server5.
    fn fixture_index() -> MatchIndex {
        let mut index = MatchIndex::new();
        for (ref_id, ref_server, match_id, match_server) in [
            ("P1", None, "P3", None),
            ("P1", None, "P4", None),
            ("P1", None, "P5", Some("server1")),
            ("P1", Some("server3"), "P4", None),
            ("P1", Some("server4"), "P4", None),
            ("P1", Some("server5"), "P4", None),
            ("P2", None, "P1", None),
            ("P2", None, "P3", None),
            ("P2", None, "P3", Some("server1")),
            ("P3", None, "P1", None),
            ("P3", Some("server1"), "P2", None),
            ("P4", None, "P1", None),
            ("P4", None, "P1", Some("server3")),
            ("P4", None, "P2", None),
            ("P5", Some("server1"), "P1", None),
            ("P5", Some("server1"), "P2", None),
        ] {
            assert!(index.add(record(ref_id, ref_server, match_id, match_server)));
        }
        index
    }

    #[test]
    fn size_counts_records_by_identity() {
        assert_eq!(fixture_index().size(), 16);
    }

    #[test]
    fn local_patient_ids_are_the_local_sides() {
        assert_eq!(
            fixture_index().local_patient_ids(),
            vec!["P1", "P2", "P3", "P4"]
        );
    }

    #[test]
    fn bucket_sizes_match_the_insertion_rules() {
        let index = fixture_index();
        assert_eq!(index.matches_for_local_patient("P1", false).len(), 7);
        assert_eq!(index.matches_for_local_patient("P4", false).len(), 7);
        assert_eq!(index.matches_for_local_patient("P5", false).len(), 0);
    }

    #[test]
    fn filtering_collapses_equivalence_classes() {
        let index = fixture_index();
        // P1's bucket holds three equivalent pairs plus one lone record.
        let filtered = index.matches_for_local_patient("P1", true);
        assert_eq!(filtered.len(), 4);
        // Each representative with an equivalent twin has P1 as matched side.
        for kept in &filtered {
            if index.equivalent_match(kept).is_some() {
                assert!(kept.is_matched("P1", None));
            }
        }
    }

    #[test]
    fn duplicate_and_remote_only_adds_are_rejected() {
        let mut index = fixture_index();
        assert!(!index.add(record("P1", None, "P3", None)));
        assert!(!index.add(record("P1", Some("server1"), "P2", Some("server2"))));
        assert_eq!(index.size(), 16);
        // An equivalent but distinct record is not a duplicate.
        let twin = record("P2", None, "P5", Some("server1"));
        assert!(index.equivalent_match(&twin).is_some());
        assert!(index.add(twin));
        assert_eq!(index.size(), 17);
    }

    #[test]
    fn remove_drops_both_keys_of_a_fully_local_record() {
        let mut index = fixture_index();
        let m = record("P1", None, "P4", None);
        assert!(index.contains(&m));
        assert!(index.remove(&m));
        assert!(!index.contains(&m));
        assert_eq!(index.size(), 15);
        assert_eq!(index.matches_for_local_patient("P1", false).len(), 6);
        assert_eq!(index.matches_for_local_patient("P4", false).len(), 6);
        assert!(!index.remove(&m));
    }

    #[test]
    fn unknown_ids_yield_empty_results() {
        let index = fixture_index();
        assert!(index.matches_for_local_patient("P9", false).is_empty());
        let unseen = record("P9", None, "P8", None);
        assert!(index.equivalent_match(&unseen).is_none());
        assert!(!index.contains(&unseen));
    }
}
