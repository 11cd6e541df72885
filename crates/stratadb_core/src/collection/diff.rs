//! Change sets between two synchronized states of a collection.

use std::collections::HashMap;
use stratadb_engine::RowKey;

/// An element that kept its identity but changed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    /// Index in the previous sequence.
    pub from: usize,
    /// Index in the new sequence.
    pub to: usize,
}

/// Differences between two states of a live collection.
///
/// Deletions use indices into the previous sequence; insertions,
/// modifications and move targets use indices into the new one. A moved
/// element appears only in `moves`, never as a deletion plus insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Old indices of removed elements, ascending.
    pub deletions: Vec<usize>,
    /// New indices of added elements, ascending.
    pub insertions: Vec<usize>,
    /// New indices of kept elements whose row changed, ascending.
    pub modifications: Vec<usize>,
    /// Kept elements whose relative order changed.
    pub moves: Vec<Move>,
}

impl ChangeSet {
    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty()
            && self.insertions.is_empty()
            && self.modifications.is_empty()
            && self.moves.is_empty()
    }

    /// A change set that removes every element of a collection of `len`.
    pub(crate) fn cleared(len: usize) -> Self {
        Self {
            deletions: (0..len).collect(),
            ..Self::default()
        }
    }

    /// Diffs `old` against `new`.
    ///
    /// Element identity is the row key plus its occurrence number, so a
    /// link list holding the same row twice diffs each entry separately.
    /// Moves are only computed for `ordered` collections; for the others,
    /// relative order is table order and cannot change.
    pub(crate) fn compute<F>(old: &[RowKey], new: &[RowKey], ordered: bool, is_modified: F) -> Self
    where
        F: Fn(RowKey) -> bool,
    {
        let old_ids = identities(old);
        let new_ids = identities(new);
        let old_index: HashMap<(RowKey, usize), usize> =
            old_ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let new_index: HashMap<(RowKey, usize), usize> =
            new_ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let deletions = old_ids
            .iter()
            .enumerate()
            .filter(|(_, id)| !new_index.contains_key(id))
            .map(|(i, _)| i)
            .collect();

        let mut insertions = Vec::new();
        let mut modifications = Vec::new();
        // (old index, new index) of kept elements, in new order.
        let mut kept = Vec::new();
        for (j, id) in new_ids.iter().enumerate() {
            match old_index.get(id) {
                None => insertions.push(j),
                Some(&i) => {
                    kept.push((i, j));
                    if is_modified(id.0) {
                        modifications.push(j);
                    }
                }
            }
        }

        let moves = if ordered {
            let sources: Vec<usize> = kept.iter().map(|(i, _)| *i).collect();
            let stable = longest_increasing(&sources);
            kept.iter()
                .enumerate()
                .filter(|(n, _)| !stable[*n])
                .map(|(_, (i, j))| Move { from: *i, to: *j })
                .collect()
        } else {
            Vec::new()
        };

        Self {
            deletions,
            insertions,
            modifications,
            moves,
        }
    }
}

fn identities(keys: &[RowKey]) -> Vec<(RowKey, usize)> {
    let mut seen: HashMap<RowKey, usize> = HashMap::new();
    keys.iter()
        .map(|key| {
            let n = seen.entry(*key).or_insert(0);
            let id = (*key, *n);
            *n += 1;
            id
        })
        .collect()
}

/// Marks the members of one longest strictly increasing subsequence.
fn longest_increasing(values: &[usize]) -> Vec<bool> {
    // tails[k] = index into values of the smallest tail of a run of length k + 1
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; values.len()];
    for (i, value) in values.iter().enumerate() {
        let pos = tails.partition_point(|&t| values[t] < *value);
        previous[i] = pos.checked_sub(1).map(|p| tails[p]);
        if pos == tails.len() {
            tails.push(i);
        } else {
            tails[pos] = i;
        }
    }
    let mut marked = vec![false; values.len()];
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        marked[i] = true;
        cursor = previous[i];
    }
    marked
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn keys(raw: &[u64]) -> Vec<RowKey> {
        raw.iter().map(|k| RowKey::new(*k)).collect()
    }

    #[test]
    fn shifted_window_has_no_moves() {
        let cs = ChangeSet::compute(&keys(&[1, 2, 3]), &keys(&[2, 3, 4]), true, |_| false);
        assert_eq!(cs.deletions, vec![0]);
        assert_eq!(cs.insertions, vec![2]);
        assert!(cs.moves.is_empty());
        assert!(cs.modifications.is_empty());
    }

    #[test]
    fn swapped_elements_move_once() {
        let cs = ChangeSet::compute(&keys(&[1, 2, 3]), &keys(&[3, 1, 2]), true, |_| false);
        assert!(cs.deletions.is_empty());
        assert!(cs.insertions.is_empty());
        assert_eq!(cs.moves, vec![Move { from: 2, to: 0 }]);
    }

    #[test]
    fn unordered_collections_never_move() {
        let cs = ChangeSet::compute(&keys(&[1, 2, 3]), &keys(&[3, 1, 2]), false, |_| false);
        assert!(cs.is_empty());
    }

    #[test]
    fn duplicates_are_tracked_by_occurrence() {
        let cs = ChangeSet::compute(&keys(&[7, 7, 8]), &keys(&[7, 8]), true, |_| false);
        assert_eq!(cs.deletions, vec![1]);
        assert!(cs.insertions.is_empty());
        assert!(cs.moves.is_empty());
    }

    #[test]
    fn modifications_use_new_indices() {
        let cs = ChangeSet::compute(&keys(&[1, 2]), &keys(&[0, 1, 2]), false, |k| k == RowKey::new(2));
        assert_eq!(cs.insertions, vec![0]);
        assert_eq!(cs.modifications, vec![2]);
    }

    #[test]
    fn cleared_deletes_everything() {
        let cs = ChangeSet::cleared(3);
        assert_eq!(cs.deletions, vec![0, 1, 2]);
        assert!(ChangeSet::cleared(0).is_empty());
    }

    #[test]
    fn lis_marks_a_longest_run() {
        let marked = longest_increasing(&[3, 0, 1, 4, 2]);
        assert_eq!(marked.iter().filter(|m| **m).count(), 3);
        assert!(!marked[0]);
    }

    proptest! {
        #[test]
        fn counts_balance(
            old in prop::collection::vec(0_u64..6, 0..10),
            new in prop::collection::vec(0_u64..6, 0..10),
        ) {
            let cs = ChangeSet::compute(&keys(&old), &keys(&new), true, |_| false);
            prop_assert_eq!(old.len() - cs.deletions.len(), new.len() - cs.insertions.len());
            prop_assert!(cs.deletions.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(cs.insertions.windows(2).all(|w| w[0] < w[1]));
            for m in &cs.moves {
                prop_assert!(!cs.deletions.contains(&m.from));
                prop_assert!(!cs.insertions.contains(&m.to));
                prop_assert_eq!(old[m.from], new[m.to]);
            }
        }
    }
}
