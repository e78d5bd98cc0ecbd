//! Field metadata: the static descriptor of one model field.

use crate::{error::ValidationError, instance::Value, schema::ModelSchema};
use std::{fmt, sync::Arc};

/// Declared type of a field, checked by the [`Validator`](crate::Validator) before a
/// value is accepted.
#[derive(Clone)]
pub enum FieldType {
    /// Any BSON value, accepted as-is.
    Any,
    Bool,
    Int32,
    Int64,
    Double,
    String,
    ObjectId,
    DateTime,
    Binary,
    Decimal128,
    Regex,
    Timestamp,
    /// A free-form nested document.
    Document,
    /// `null` or the inner type.
    Optional(Box<FieldType>),
    Array(Box<FieldType>),
    /// A nested model stored inline.
    Embedded(Arc<ModelSchema>),
    /// The primary key of a separately persisted model.
    Reference(Arc<ModelSchema>),
}

impl FieldType {
    pub fn optional(inner: FieldType) -> Self {
        Self::Optional(Box::new(inner))
    }

    pub fn array(inner: FieldType) -> Self {
        Self::Array(Box::new(inner))
    }

    /// The type with any `Optional` layers removed.
    pub fn unwrap_optional(&self) -> &FieldType {
        match self {
            Self::Optional(inner) => inner.unwrap_optional(),
            other => other,
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Optional(_))
    }

    /// Whether values of this type can be mutated in place, out of reach of
    /// assignment tracking.
    pub fn is_container(&self) -> bool {
        match self {
            Self::Optional(inner) => inner.is_container(),
            Self::Array(_) | Self::Document | Self::Embedded(_) => true,
            _ => false,
        }
    }

    /// Whether a model (embedded or referenced) appears anywhere in this type.
    pub fn contains_model(&self) -> bool {
        match self {
            Self::Optional(inner) | Self::Array(inner) => inner.contains_model(),
            Self::Embedded(_) | Self::Reference(_) => true,
            _ => false,
        }
    }

    /// Human readable name, following `MongoDB` `bsonType` aliases for scalars.
    pub fn type_name(&self) -> String {
        match self {
            Self::Any => "any".into(),
            Self::Bool => "bool".into(),
            Self::Int32 => "int".into(),
            Self::Int64 => "long".into(),
            Self::Double => "double".into(),
            Self::String => "string".into(),
            Self::ObjectId => "objectId".into(),
            Self::DateTime => "date".into(),
            Self::Binary => "binData".into(),
            Self::Decimal128 => "decimal".into(),
            Self::Regex => "regex".into(),
            Self::Timestamp => "timestamp".into(),
            Self::Document => "object".into(),
            Self::Optional(inner) => format!("optional<{}>", inner.type_name()),
            Self::Array(inner) => format!("array<{}>", inner.type_name()),
            Self::Embedded(schema) => schema.name().to_owned(),
            Self::Reference(schema) => format!("reference<{}>", schema.name()),
        }
    }
}

impl PartialEq for FieldType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Optional(a), Self::Optional(b)) | (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Embedded(a), Self::Embedded(b)) | (Self::Reference(a), Self::Reference(b)) => {
                a.name() == b.name()
            }
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl fmt::Debug for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_name())
    }
}

/// How a field is stored, derived from its [`FieldType`].
#[derive(Clone, Debug)]
pub enum FieldKind {
    Scalar,
    /// Nested document, serialized inline.
    Embedded(Arc<ModelSchema>),
    /// Array of nested documents.
    EmbeddedArray(Arc<ModelSchema>),
    /// Foreign primary key of a separately persisted document.
    Reference(Arc<ModelSchema>),
}

impl FieldKind {
    pub(crate) fn classify(field_type: &FieldType) -> Self {
        match field_type.unwrap_optional() {
            FieldType::Embedded(schema) => Self::Embedded(schema.clone()),
            FieldType::Reference(schema) => Self::Reference(schema.clone()),
            FieldType::Array(inner) => match inner.unwrap_optional() {
                FieldType::Embedded(schema) => Self::EmbeddedArray(schema.clone()),
                _ => Self::Scalar,
            },
            _ => Self::Scalar,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Embedded(_) => "embedded",
            Self::EmbeddedArray(_) => "embedded array",
            Self::Reference(_) => "reference",
        }
    }

    pub fn schema(&self) -> Option<&Arc<ModelSchema>> {
        match self {
            Self::Scalar => None,
            Self::Embedded(schema) | Self::EmbeddedArray(schema) | Self::Reference(schema) => {
                Some(schema)
            }
        }
    }
}

/// Whether a field participates in change tracking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutability {
    /// Changes are only possible through assignment, so they are tracked.
    Immutable,
    /// Lists, documents and embedded models: always part of partial updates.
    Container,
}

pub type DefaultFactory = Arc<dyn Fn() -> Result<Value, ValidationError> + Send + Sync>;

/// Value used when a field is not provided.
#[derive(Clone)]
pub enum FieldDefault {
    Required,
    Value(Value),
    Factory(DefaultFactory),
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => f.write_str("Required"),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Metadata of one field of a built [`ModelSchema`].
#[derive(Clone, Debug)]
pub struct FieldMetadata {
    pub(crate) name: String,
    pub(crate) storage_key: String,
    pub(crate) field_type: FieldType,
    pub(crate) kind: FieldKind,
    pub(crate) default: FieldDefault,
    pub(crate) mutability: Mutability,
    pub(crate) primary_key: bool,
}

impl FieldMetadata {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn default(&self) -> &FieldDefault {
        &self.default
    }

    pub fn mutability(&self) -> Mutability {
        self.mutability
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.kind, FieldKind::Reference(_))
    }

    /// Schema of the embedded or referenced model.
    pub fn embedded_schema(&self) -> Option<&Arc<ModelSchema>> {
        self.kind.schema()
    }

    pub fn is_required(&self) -> bool {
        matches!(self.default, FieldDefault::Required)
    }
}

/// Declaration of a field, consumed by [`SchemaBuilder`](crate::SchemaBuilder).
#[derive(Clone)]
pub struct FieldSpec {
    pub(crate) name: String,
    pub(crate) field_type: FieldType,
    pub(crate) key: Option<String>,
    pub(crate) primary_key: bool,
    pub(crate) default: Option<Value>,
    pub(crate) default_factory: Option<DefaultFactory>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            key: None,
            primary_key: false,
            default: None,
            default_factory: None,
        }
    }

    /// Stores the field under `key` instead of its name.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn default_factory(mut self, factory: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default_factory = Some(Arc::new(move || Ok(factory())));
        self
    }

    /// Default factory that can fail, its error is reported as a validation issue
    /// of the field.
    pub fn try_default_factory(
        mut self,
        factory: impl Fn() -> Result<Value, ValidationError> + Send + Sync + 'static,
    ) -> Self {
        self.default_factory = Some(Arc::new(factory));
        self
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("key", &self.key)
            .field("primary_key", &self.primary_key)
            .field("default", &self.default)
            .field("default_factory", &self.default_factory.is_some())
            .finish()
    }
}
