//! Field values and model instances.

use crate::{
    Model,
    codec,
    error::{Error, FieldIssue, IssueCode, Result, UsageError, ValidationError},
    field::{FieldDefault, FieldMetadata},
    schema::ModelSchema,
    tracker::ChangeTracker,
    types::FieldValue,
    validate::validate_value,
};
use mongodb::bson::{self, Bson, Document, oid::ObjectId};
use std::sync::Arc;
use tracing::trace;

/// Value held by one field of an [`Instance`].
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A plain BSON value, including arrays of plain values.
    Bson(Bson),
    /// A nested model stored inline.
    Embedded(Instance),
    /// An array holding models.
    Array(Vec<Value>),
    Reference(Reference),
}

impl Value {
    pub fn as_bson(&self) -> Option<&Bson> {
        match self {
            Self::Bson(bson) => Some(bson),
            _ => None,
        }
    }

    pub fn as_embedded(&self) -> Option<&Instance> {
        match self {
            Self::Embedded(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn as_embedded_mut(&mut self) -> Option<&mut Instance> {
        match self {
            Self::Embedded(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Self::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Bson(Bson::Null))
    }

    /// Storage form of the value: embedded models become documents, references
    /// their primary key.
    pub fn to_bson(&self) -> Bson {
        match self {
            Self::Bson(bson) => bson.clone(),
            Self::Embedded(instance) => Bson::Document(codec::to_document(instance)),
            Self::Array(items) => Bson::Array(items.iter().map(Self::to_bson).collect()),
            Self::Reference(reference) => reference.key(),
        }
    }
}

macro_rules! impl_from_bson {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Self::Bson(value.into())
                }
            }
        )*
    };
}

impl_from_bson!(
    Bson,
    &str,
    String,
    i32,
    i64,
    f64,
    bool,
    ObjectId,
    bson::DateTime,
    Document,
);

impl From<Instance> for Value {
    fn from(instance: Instance) -> Self {
        Self::Embedded(instance)
    }
}

impl From<Reference> for Value {
    fn from(reference: Reference) -> Self {
        Self::Reference(reference)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Bson(Bson::Null), Into::into)
    }
}

/// Value of a reference field.
///
/// Only the primary key is persisted. A loaded reference carries the referenced
/// instance, which is saved first when the referencing instance is saved.
#[derive(Clone, Debug)]
pub enum Reference {
    Key(Bson),
    Attached(Box<Instance>),
}

impl Reference {
    /// Attaches a copy of `instance`.
    pub fn to(instance: &Instance) -> Self {
        Self::Attached(Box::new(instance.clone()))
    }

    pub fn key(&self) -> Bson {
        match self {
            Self::Key(key) => key.clone(),
            Self::Attached(instance) => instance.primary_key().cloned().unwrap_or(Bson::Null),
        }
    }

    pub fn instance(&self) -> Option<&Instance> {
        match self {
            Self::Key(_) => None,
            Self::Attached(instance) => Some(instance),
        }
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

/// A model value: field values laid out in schema order, plus a change tracker.
///
/// ```rust,ignore
/// let mut publisher = Instance::new(&schema, [
///     ("name", Value::from("Hachette Livre")),
///     ("founded", Value::from(1826_i64)),
/// ])?;
///
/// publisher.set("location", "FR")?;
/// assert!(publisher.is_dirty("location"));
/// ```
/// Supplied value of a field while an instance is assembled.
#[derive(Clone)]
enum Slot {
    Absent,
    Valid(Value),
    Invalid,
}

#[derive(Clone, Debug)]
pub struct Instance {
    schema: Arc<ModelSchema>,
    values: Vec<Value>,
    tracker: ChangeTracker,
}

impl Instance {
    /// Builds an instance from named values, filling in defaults.
    ///
    /// Every field of a new instance is dirty.
    pub fn new<I, K, V>(schema: &Arc<ModelSchema>, fields: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let validator = schema.validator();
        let mut slots = vec![Slot::Absent; schema.len()];
        let mut issues = Vec::new();

        for (name, value) in fields {
            let name = name.as_ref();

            let Some(index) = schema.field_index(name) else {
                issues.push(
                    FieldIssue::new(IssueCode::UnknownField, None, "unknown field").at(name),
                );
                continue;
            };

            slots[index] = match validate_value(validator, schema.field_type_at(index), value.into()) {
                Ok(value) => Slot::Valid(value),
                Err(err) => {
                    issues.extend(err.at(name).issues);
                    Slot::Invalid
                }
            };
        }

        let mut values = Vec::with_capacity(slots.len());

        for (field, slot) in schema.fields().zip(slots) {
            let value = match (slot, field.default()) {
                (Slot::Valid(value), _) => value,
                (Slot::Invalid, _) => continue,
                (Slot::Absent, FieldDefault::Value(value)) => value.clone(),
                (Slot::Absent, FieldDefault::Factory(factory)) => {
                    match factory()
                        .and_then(|value| validate_value(validator, field.field_type(), value))
                    {
                        Ok(value) => value,
                        Err(err) => {
                            issues.extend(err.at(field.name()).issues);
                            continue;
                        }
                    }
                }
                (Slot::Absent, FieldDefault::Required) => {
                    issues.push(
                        FieldIssue::new(IssueCode::Missing, None, "field required")
                            .at(field.name()),
                    );
                    continue;
                }
            };

            values.push(value);
        }

        if !issues.is_empty() {
            return Err(ValidationError::new(issues).for_model(schema.name()));
        }

        let tracker = ChangeTracker::dirty(schema, &values);

        Ok(Self {
            schema: schema.clone(),
            values,
            tracker,
        })
    }

    /// Instance of values read from storage: nothing is dirty.
    pub(crate) fn loaded(schema: Arc<ModelSchema>, values: Vec<Value>) -> Self {
        let tracker = ChangeTracker::clean(&schema, &values);

        Self {
            schema,
            values,
            tracker,
        }
    }

    /// Converts a typed model into an instance.
    pub fn from_model<M: Model>(model: M) -> Result<Self> {
        let schema = M::schema()?;
        let fields = model.into_fields()?;
        Ok(Self::new(&schema, fields)?)
    }

    /// Converts the instance into a typed model.
    pub fn to_model<M: Model>(&self) -> Result<M> {
        if self.schema.name() != M::NAME {
            return Err(UsageError::ModelMismatch {
                expected: M::NAME.to_owned(),
                found: self.schema.name().to_owned(),
            }
            .into());
        }

        M::from_instance(self)
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Field metadata paired with values, in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&FieldMetadata, &Value)> {
        self.schema.fields().zip(&self.values)
    }

    pub(crate) fn value_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema
            .field_index(name)
            .and_then(|index| self.values.get(index))
    }

    /// Reads a field as a typed value.
    pub fn get_as<T: FieldValue>(&self, name: &str) -> Result<T> {
        let value = self.get(name).ok_or_else(|| UsageError::UnknownField {
            model: self.schema.name().to_owned(),
            field: name.to_owned(),
        })?;

        T::from_value(value).map_err(|err| match err {
            Error::Validation(err) => Error::Validation(err.at(name).for_model(self.schema.name())),
            err => err,
        })
    }

    /// Mutable access to a container field (array, document or embedded model).
    ///
    /// Container fields are always part of the next partial update, so in-place
    /// changes are not tracked. Returns `None` for any other field.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        let index = self.schema.field_index(name)?;

        if self.tracker.is_tracked(index) {
            return None;
        }

        self.values.get_mut(index)
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.schema.field_index(name).ok_or_else(|| {
            UsageError::UnknownField {
                model: self.schema.name().to_owned(),
                field: name.to_owned(),
            }
            .into()
        })
    }

    fn validated(&self, index: usize, name: &str, value: Value) -> Result<Value> {
        let field = self.schema.field_type_at(index);

        validate_value(self.schema.validator(), field, value)
            .map_err(|err| err.at(name).for_model(self.schema.name()).into())
    }

    /// Assigns a validated value to the field called `name`.
    ///
    /// Assigning the primary key is rejected, use [`copy_with`](Self::copy_with)
    /// instead.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let index = self.index_of(name)?;

        if self.schema.primary_key_index() == Some(index) {
            return Err(Error::PrimaryKeyMutation {
                model: self.schema.name().to_owned(),
            });
        }

        let value = self.validated(index, name, value.into())?;
        self.tracker.observe(index, &value);
        self.values[index] = value;

        Ok(())
    }

    /// Applies a partial patch. Every value is validated before any is applied,
    /// names not declared by the model are ignored.
    pub fn update<I, K, V>(&mut self, patch: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut validated = Vec::new();

        for (name, value) in patch {
            let name = name.as_ref();

            let Some(index) = self.schema.field_index(name) else {
                trace!(model = self.schema.name(), field = name, "ignoring unknown field in patch");
                continue;
            };

            if self.schema.primary_key_index() == Some(index) {
                return Err(Error::PrimaryKeyMutation {
                    model: self.schema.name().to_owned(),
                });
            }

            validated.push((index, self.validated(index, name, value.into())?));
        }

        for (index, value) in validated {
            self.tracker.observe(index, &value);
            self.values[index] = value;
        }

        Ok(())
    }

    /// Deep copy of the instance with `updates` applied, the primary key included.
    ///
    /// Every field of the copy is dirty.
    pub fn copy_with<I, K, V>(&self, updates: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut copy = self.clone();

        for (name, value) in updates {
            let name = name.as_ref();
            let index = copy.index_of(name)?;
            copy.values[index] = copy.validated(index, name, value.into())?;
        }

        copy.tracker.mark_all_dirty();

        Ok(copy)
    }

    /// Primary key value, `None` for embedded models.
    pub fn primary_key(&self) -> Option<&Bson> {
        self.schema
            .primary_key_index()
            .and_then(|index| self.values.get(index))
            .and_then(Value::as_bson)
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.schema
            .field_index(name)
            .is_some_and(|index| self.tracker.is_dirty(index))
    }

    /// Names of fields explicitly marked dirty, in schema order.
    pub fn dirty_fields(&self) -> Vec<&str> {
        self.tracker
            .dirty_indices()
            .filter_map(|index| self.schema.field_at(index))
            .map(FieldMetadata::name)
            .collect()
    }

    /// Takes the current values as the baseline, after the instance was saved.
    pub fn mark_saved(&mut self) {
        self.tracker.reset(&self.schema, &self.values);
    }

    /// Referenced instances loaded alongside this one.
    pub(crate) fn attached_references_mut(&mut self) -> Vec<&mut Instance> {
        self.schema
            .fields()
            .zip(self.values.iter_mut())
            .filter(|(field, _)| field.is_reference())
            .filter_map(|(_, value)| match value {
                Value::Reference(Reference::Attached(instance)) => Some(instance.as_mut()),
                _ => None,
            })
            .collect()
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.schema.name() == other.schema.name() && self.values == other.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldSpec, FieldType, SchemaBuilder};
    use pretty_assertions::assert_eq;

    fn publisher() -> Arc<ModelSchema> {
        Arc::new(
            SchemaBuilder::new("Publisher")
                .field(FieldSpec::new("name", FieldType::String))
                .field(FieldSpec::new("founded", FieldType::Int64))
                .field(
                    FieldSpec::new("location", FieldType::optional(FieldType::String))
                        .default(Bson::Null),
                )
                .field(FieldSpec::new("tags", FieldType::array(FieldType::String)).default(Bson::Array(vec![])))
                .build()
                .unwrap(),
        )
    }

    fn hachette(schema: &Arc<ModelSchema>) -> Instance {
        Instance::new(
            schema,
            [
                ("name", Value::from("Hachette Livre")),
                ("founded", Value::from(1826)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_new_applies_defaults() {
        let schema = publisher();
        let instance = hachette(&schema);

        assert!(matches!(instance.primary_key(), Some(Bson::ObjectId(_))));
        assert_eq!(instance.get("founded"), Some(&Value::Bson(Bson::Int64(1826))));
        assert_eq!(instance.get("location"), Some(&Value::Bson(Bson::Null)));
        assert_eq!(
            instance.dirty_fields(),
            vec!["id", "name", "founded", "location", "tags"]
        );
    }

    #[test]
    fn test_new_reports_every_issue() {
        let schema = publisher();
        let err = Instance::new(
            &schema,
            [("founded", Value::from("long ago")), ("owner", Value::from("me"))],
        )
        .unwrap_err();

        assert_eq!(err.model.as_deref(), Some("Publisher"));
        let mut issues = err
            .issues
            .iter()
            .map(|issue| (issue.loc_string(), issue.code))
            .collect::<Vec<_>>();
        issues.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            issues,
            vec![
                ("founded".to_owned(), IssueCode::TypeMismatch),
                ("name".to_owned(), IssueCode::Missing),
                ("owner".to_owned(), IssueCode::UnknownField),
            ]
        );
    }

    #[test]
    fn test_invalid_value_does_not_fall_back_to_default() {
        let schema = publisher();
        let err = Instance::new(
            &schema,
            [
                ("name", Value::from("Lulu")),
                ("founded", Value::from(2002)),
                ("location", Value::from(44)),
            ],
        )
        .unwrap_err();

        assert_eq!(err.issues.len(), 1);
        assert_eq!(err.issues[0].loc_string(), "location");
        assert_eq!(err.issues[0].code, IssueCode::TypeMismatch);
    }

    #[test]
    fn test_set_tracks_changes() {
        let schema = publisher();
        let mut instance = hachette(&schema);
        instance.mark_saved();
        assert!(instance.dirty_fields().is_empty());

        instance.set("name", "Hachette Livre").unwrap();
        assert!(!instance.is_dirty("name"));

        instance.set("founded", 1827_i64).unwrap();
        assert_eq!(instance.dirty_fields(), vec!["founded"]);

        let err = instance.set("founded", "soon").unwrap_err();
        assert!(err.is_validation());
        assert_eq!(instance.get("founded"), Some(&Value::from(1827_i64)));
    }

    #[test]
    fn test_primary_key_is_not_assignable() {
        let schema = publisher();
        let mut instance = hachette(&schema);

        let err = instance.set("id", ObjectId::new()).unwrap_err();
        assert!(matches!(err, Error::PrimaryKeyMutation { .. }));

        let err = instance.update([("id", Value::from(ObjectId::new()))]).unwrap_err();
        assert!(matches!(err, Error::PrimaryKeyMutation { .. }));
    }

    #[test]
    fn test_update_ignores_unknown_fields() {
        let schema = publisher();
        let mut instance = hachette(&schema);
        instance.mark_saved();

        instance
            .update([
                ("name", Value::from("Hachette Livre")),
                ("location", Value::from("FR")),
                ("owner", Value::from("nobody")),
            ])
            .unwrap();

        assert_eq!(instance.dirty_fields(), vec!["location"]);

        let err = instance
            .update([("location", Value::from("US")), ("founded", Value::from("x"))])
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(instance.get("location"), Some(&Value::from("FR")));
    }

    #[test]
    fn test_copy_with() {
        let schema = publisher();
        let mut instance = hachette(&schema);
        instance.mark_saved();

        let id = ObjectId::new();
        let copy = instance.copy_with([("id", Value::from(id))]).unwrap();

        assert_eq!(copy.primary_key(), Some(&Bson::ObjectId(id)));
        assert_eq!(copy.get("name"), instance.get("name"));
        assert_eq!(copy.dirty_fields().len(), schema.len());
        assert!(instance.dirty_fields().is_empty());
    }

    #[test]
    fn test_container_fields() {
        let schema = publisher();
        let mut instance = hachette(&schema);
        instance.mark_saved();

        assert!(instance.get_mut("name").is_none());

        if let Some(Value::Bson(Bson::Array(tags))) = instance.get_mut("tags") {
            tags.push("french".into());
        }

        assert!(instance.dirty_fields().is_empty());
        assert_eq!(instance.tracker().pending_indices().collect::<Vec<_>>(), vec![4]);
        assert_eq!(
            instance.get("tags"),
            Some(&Value::Bson(Bson::Array(vec!["french".into()])))
        );
    }

    #[test]
    fn test_reference_equality_uses_keys() {
        let schema = publisher();
        let instance = hachette(&schema);
        let key = instance.primary_key().cloned().unwrap();

        assert_eq!(Reference::to(&instance), Reference::Key(key));
        assert_eq!(Value::from(Option::<i32>::None), Value::Bson(Bson::Null));
    }
}
