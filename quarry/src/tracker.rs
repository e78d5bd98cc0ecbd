//! Per-instance change tracking.

use crate::{field::Mutability, instance::Value, schema::ModelSchema};

/// Records which fields of an instance changed since it was last loaded or saved.
///
/// Fields are addressed by their position in the [`ModelSchema`]. Immutable fields
/// are compared against a baseline captured at load or save time, so assigning a
/// field its current value is not a change. Container fields can be mutated in
/// place, so they are always reported as pending.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeTracker {
    baseline: Vec<Option<Value>>,
    dirty: Vec<bool>,
}

impl ChangeTracker {
    /// Tracker of a freshly loaded instance: nothing is dirty.
    pub(crate) fn clean(schema: &ModelSchema, values: &[Value]) -> Self {
        Self {
            baseline: baseline(schema, values),
            dirty: vec![false; values.len()],
        }
    }

    /// Tracker of a newly constructed instance: every field is dirty.
    pub(crate) fn dirty(schema: &ModelSchema, values: &[Value]) -> Self {
        Self {
            baseline: baseline(schema, values),
            dirty: vec![true; values.len()],
        }
    }

    /// Records an assignment of `value` to the field at `index`.
    ///
    /// A value equal to the baseline leaves the state untouched: a field already
    /// marked dirty stays dirty.
    pub(crate) fn observe(&mut self, index: usize, value: &Value) {
        let changed = match self.baseline.get(index) {
            Some(Some(baseline)) => baseline != value,
            _ => true,
        };

        if changed {
            if let Some(dirty) = self.dirty.get_mut(index) {
                *dirty = true;
            }
        }
    }

    pub fn is_dirty(&self, index: usize) -> bool {
        self.dirty.get(index).copied().unwrap_or(false)
    }

    /// Whether the field at `index` is compared against a baseline.
    pub fn is_tracked(&self, index: usize) -> bool {
        matches!(self.baseline.get(index), Some(Some(_)))
    }

    /// Indexes of fields explicitly marked dirty.
    pub fn dirty_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.dirty
            .iter()
            .enumerate()
            .filter_map(|(index, dirty)| dirty.then_some(index))
    }

    /// Indexes of fields to include in the next partial update: dirty fields and
    /// every container field.
    pub fn pending_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.dirty
            .iter()
            .zip(&self.baseline)
            .enumerate()
            .filter_map(|(index, (dirty, baseline))| {
                (*dirty || baseline.is_none()).then_some(index)
            })
    }

    pub fn has_pending(&self) -> bool {
        self.pending_indices().next().is_some()
    }

    pub(crate) fn mark_all_dirty(&mut self) {
        self.dirty.fill(true);
    }

    /// Takes `values` as the new baseline and clears every dirty mark.
    pub(crate) fn reset(&mut self, schema: &ModelSchema, values: &[Value]) {
        self.baseline = baseline(schema, values);
        self.dirty = vec![false; values.len()];
    }
}

fn baseline(schema: &ModelSchema, values: &[Value]) -> Vec<Option<Value>> {
    schema
        .fields()
        .zip(values)
        .map(|(field, value)| match field.mutability() {
            Mutability::Immutable => Some(value.clone()),
            Mutability::Container => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldSpec, FieldType, SchemaBuilder};
    use mongodb::bson::Bson;
    use pretty_assertions::assert_eq;

    fn schema() -> ModelSchema {
        SchemaBuilder::new("Thing")
            .embedded()
            .field(FieldSpec::new("name", FieldType::String))
            .field(FieldSpec::new("count", FieldType::Int32))
            .field(FieldSpec::new("tags", FieldType::array(FieldType::String)))
            .build()
            .unwrap()
    }

    fn values() -> Vec<Value> {
        vec![
            Value::from("a"),
            Value::from(1),
            Value::Bson(Bson::Array(vec![])),
        ]
    }

    #[test]
    fn test_clean_tracker_reports_containers() {
        let tracker = ChangeTracker::clean(&schema(), &values());

        assert_eq!(tracker.dirty_indices().count(), 0);
        assert_eq!(tracker.pending_indices().collect::<Vec<_>>(), vec![2]);
        assert!(tracker.is_tracked(0));
        assert!(!tracker.is_tracked(2));
    }

    #[test]
    fn test_observe_compares_with_baseline() {
        let mut tracker = ChangeTracker::clean(&schema(), &values());

        tracker.observe(0, &Value::from("a"));
        assert!(!tracker.is_dirty(0));

        tracker.observe(1, &Value::from(2));
        assert!(tracker.is_dirty(1));

        // marking is idempotent, going back to the baseline keeps the mark
        tracker.observe(1, &Value::from(1));
        assert!(tracker.is_dirty(1));

        assert_eq!(tracker.pending_indices().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_reset() {
        let schema = schema();
        let mut tracker = ChangeTracker::dirty(&schema, &values());
        assert_eq!(tracker.dirty_indices().collect::<Vec<_>>(), vec![0, 1, 2]);

        let mut saved = values();
        saved[1] = Value::from(5);
        tracker.reset(&schema, &saved);
        assert_eq!(tracker.dirty_indices().count(), 0);

        tracker.observe(1, &Value::from(5));
        assert!(!tracker.is_dirty(1));
        tracker.observe(1, &Value::from(1));
        assert!(tracker.is_dirty(1));
    }
}
