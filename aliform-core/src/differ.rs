//! Differ - Compare desired configuration with observed state
//!
//! Providers use these to decide which remote calls an update needs: which
//! attributes changed, which tags to add or remove, and which members of a
//! set-typed block appeared or disappeared.

use std::collections::{BTreeMap, HashMap};

use crate::resource::{Resource, State, Value};

/// Find attributes whose desired value differs from the observed one
///
/// Internal attributes (starting with `_`) and the listed `ignored` keys are
/// skipped. The result is sorted so callers issue calls in a stable order.
pub fn changed_attributes(from: &State, to: &Resource, ignored: &[&str]) -> Vec<String> {
    let mut changed = Vec::new();

    for (key, desired_value) in &to.attributes {
        if key.starts_with('_') || ignored.contains(&key.as_str()) {
            continue;
        }

        match from.attributes.get(key) {
            Some(current_value) if current_value == desired_value => {}
            None if desired_value.is_empty() => {}
            _ => changed.push(key.clone()),
        }
    }

    changed.sort();
    changed
}

/// Returns whether a single attribute changed between state and configuration
pub fn has_change(from: &State, to: &Resource, key: &str) -> bool {
    match (from.attributes.get(key), to.attributes.get(key)) {
        (Some(current), Some(desired)) => current != desired,
        (None, Some(desired)) => !desired.is_empty(),
        (Some(current), None) => !current.is_empty(),
        (None, None) => false,
    }
}

/// Tags to attach and tag keys to detach
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDiff {
    /// New keys plus keys whose value changed
    pub added: BTreeMap<String, String>,
    /// Keys no longer present in the desired set
    pub removed: Vec<String>,
}

impl TagDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compute the tag changes needed to move from `old` to `new`
///
/// A key whose value changed is only re-tagged: tagging overwrites the value,
/// so `added` and `removed` never share a key.
pub fn diff_tags(old: &HashMap<String, String>, new: &HashMap<String, String>) -> TagDiff {
    let added = new
        .iter()
        .filter(|(key, value)| old.get(*key) != Some(*value))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let mut removed: Vec<String> = old
        .keys()
        .filter(|key| !new.contains_key(*key))
        .cloned()
        .collect();
    removed.sort();

    TagDiff { added, removed }
}

/// Members that appeared in or disappeared from a set-typed attribute
#[derive(Debug, Clone, PartialEq)]
pub struct SetDiff<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
}

impl<T> SetDiff<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compare two set-typed attribute values by member equality
///
/// Order inside the lists is irrelevant; members present in both are dropped.
pub fn diff_sets<T: PartialEq + Clone>(old: &[T], new: &[T]) -> SetDiff<T> {
    SetDiff {
        added: new.iter().filter(|v| !old.contains(v)).cloned().collect(),
        removed: old.iter().filter(|v| !new.contains(v)).cloned().collect(),
    }
}

/// Set diff of a list attribute between state and configuration
pub fn diff_set_attribute(from: &State, to: &Resource, key: &str) -> SetDiff<Value> {
    let old = from
        .attributes
        .get(key)
        .and_then(Value::as_list)
        .unwrap_or(&[]);
    diff_sets(old, to.get_list(key))
}
