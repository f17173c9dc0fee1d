//! Identity-keyed operations over ordered collections.
//!
//! One generic module serves every list in the document: the block list
//! itself and the draggable entry lists nested inside blocks. All functions
//! are pure and return a new vector; the input is never mutated.
//!
//! Absence policy: an identity that is not present is a routine transient
//! state (entry removed by a concurrent edit, block not yet created), so every
//! operation treats it as a no-op and returns the input unchanged.

use tracing::trace;

/// Anything carrying a stable identity within its list.
pub trait Identified {
    fn id(&self) -> &str;
}

pub fn position<T: Identified>(items: &[T], id: &str) -> Option<usize> {
    items.iter().position(|item| item.id() == id)
}

pub fn find<'a, T: Identified>(items: &'a [T], id: &str) -> Option<&'a T> {
    items.iter().find(|item| item.id() == id)
}

/// Move the entry identified by `from` into the slot currently held by `to`,
/// shifting the entries in between by one.
///
/// No-op when `from == to` or either identity is absent. The result is always
/// a permutation of `items`.
pub fn reorder<T: Identified + Clone>(items: &[T], from: &str, to: &str) -> Vec<T> {
    if from == to {
        return items.to_vec();
    }
    let (Some(old_index), Some(new_index)) = (position(items, from), position(items, to)) else {
        trace!(target: "model.ordered", from, to, "reorder_missing_identity");
        return items.to_vec();
    };
    let mut out = items.to_vec();
    let moved = out.remove(old_index);
    out.insert(new_index, moved);
    out
}

pub fn remove<T: Identified + Clone>(items: &[T], id: &str) -> Vec<T> {
    items.iter().filter(|item| item.id() != id).cloned().collect()
}

/// Replace the entry identified by `id` with `value`, keeping its position.
///
/// Identities never change once assigned: a `value` carrying a different id
/// leaves the list unchanged.
pub fn update_one<T: Identified + Clone>(items: &[T], id: &str, value: T) -> Vec<T> {
    if value.id() != id {
        trace!(target: "model.ordered", id, value_id = value.id(), "update_identity_mismatch");
        return items.to_vec();
    }
    let Some(index) = position(items, id) else {
        trace!(target: "model.ordered", id, "update_missing_identity");
        return items.to_vec();
    };
    let mut out = items.to_vec();
    out[index] = value;
    out
}

/// Append `value`. If its identity is already present the existing entry is
/// replaced in place, so identities stay unique.
pub fn insert<T: Identified + Clone>(items: &[T], value: T) -> Vec<T> {
    let mut out = items.to_vec();
    match position(items, value.id()) {
        Some(index) => out[index] = value,
        None => out.push(value),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq)]
    struct Item(&'static str, u32);

    impl Identified for Item {
        fn id(&self) -> &str {
            self.0
        }
    }

    fn ids(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.0).collect()
    }

    fn abc() -> Vec<Item> {
        vec![Item("a", 1), Item("b", 2), Item("c", 3)]
    }

    #[test]
    fn reorder_moves_into_target_slot() {
        assert_eq!(ids(&reorder(&abc(), "a", "c")), ["b", "c", "a"]);
        assert_eq!(ids(&reorder(&abc(), "c", "a")), ["c", "a", "b"]);
        assert_eq!(ids(&reorder(&abc(), "b", "c")), ["a", "c", "b"]);
    }

    #[test]
    fn reorder_is_noop_for_same_or_missing() {
        assert_eq!(reorder(&abc(), "b", "b"), abc());
        assert_eq!(reorder(&abc(), "x", "a"), abc());
        assert_eq!(reorder(&abc(), "a", "x"), abc());
    }

    #[test]
    fn remove_filters_match_only() {
        assert_eq!(ids(&remove(&abc(), "b")), ["a", "c"]);
        assert_eq!(remove(&abc(), "x"), abc());
    }

    #[test]
    fn update_one_keeps_position() {
        let out = update_one(&abc(), "b", Item("b", 20));
        assert_eq!(out, vec![Item("a", 1), Item("b", 20), Item("c", 3)]);
        assert_eq!(update_one(&abc(), "x", Item("x", 0)), abc());
        // identity change refused
        assert_eq!(update_one(&abc(), "b", Item("z", 0)), abc());
    }

    #[test]
    fn insert_appends_or_replaces() {
        assert_eq!(ids(&insert(&abc(), Item("d", 4))), ["a", "b", "c", "d"]);
        let replaced = insert(&abc(), Item("a", 10));
        assert_eq!(replaced[0], Item("a", 10));
        assert_eq!(replaced.len(), 3);
    }
}
