//! Rust types usable as model fields.

use crate::{
    Model,
    error::{Error, FieldIssue, IssueCode, Result, SchemaError, ValidationError},
    field::FieldType,
    instance::{Instance, Reference, Value},
    registry::SchemaRegistry,
};
use chrono::Utc;
use mongodb::bson::{self, Binary, Bson, Decimal128, Document, Timestamp, oid::ObjectId};
use serde::{Serialize, de::DeserializeOwned};
use std::{
    fmt::{self, Display},
    marker::PhantomData,
    ops::{Deref, DerefMut},
};

/// A Rust type that can be stored in a model field.
///
/// `#[derive(Model)]` resolves the [`FieldType`] of every field through this trait
/// and uses it to move values in and out of [`Instance`]s.
pub trait FieldValue: Sized {
    fn field_type(registry: &SchemaRegistry) -> Result<FieldType, SchemaError>;

    fn into_value(self) -> Result<Value>;

    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(expected: &FieldType, value: &Value) -> Error {
    ValidationError::single(FieldIssue::new(
        IssueCode::TypeMismatch,
        Some(value.to_bson()),
        format!("expected {}", expected.type_name()),
    ))
    .into()
}

macro_rules! impl_field_value {
    ($ty:ty, $field_type:ident, $variant:ident) => {
        impl FieldValue for $ty {
            fn field_type(_: &SchemaRegistry) -> Result<FieldType, SchemaError> {
                Ok(FieldType::$field_type)
            }

            fn into_value(self) -> Result<Value> {
                Ok(Value::Bson(Bson::$variant(self)))
            }

            #[allow(clippy::clone_on_copy)]
            fn from_value(value: &Value) -> Result<Self> {
                match value {
                    Value::Bson(Bson::$variant(inner)) => Ok(inner.clone()),
                    other => Err(mismatch(&FieldType::$field_type, other)),
                }
            }
        }
    };
}

impl_field_value!(bool, Bool, Boolean);
impl_field_value!(i32, Int32, Int32);
impl_field_value!(i64, Int64, Int64);
impl_field_value!(f64, Double, Double);
impl_field_value!(String, String, String);
impl_field_value!(ObjectId, ObjectId, ObjectId);
impl_field_value!(bson::DateTime, DateTime, DateTime);
impl_field_value!(Binary, Binary, Binary);
impl_field_value!(Decimal128, Decimal128, Decimal128);
impl_field_value!(bson::Regex, Regex, RegularExpression);
impl_field_value!(Timestamp, Timestamp, Timestamp);
impl_field_value!(Document, Document, Document);

impl FieldValue for Bson {
    fn field_type(_: &SchemaRegistry) -> Result<FieldType, SchemaError> {
        Ok(FieldType::Any)
    }

    fn into_value(self) -> Result<Value> {
        Ok(Value::Bson(self))
    }

    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.to_bson())
    }
}

/// Stored with millisecond precision, sub-millisecond digits are truncated.
impl FieldValue for chrono::DateTime<Utc> {
    fn field_type(_: &SchemaRegistry) -> Result<FieldType, SchemaError> {
        Ok(FieldType::DateTime)
    }

    fn into_value(self) -> Result<Value> {
        Ok(Value::Bson(Bson::DateTime(bson::DateTime::from_millis(
            self.timestamp_millis(),
        ))))
    }

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bson(Bson::DateTime(date)) => {
                chrono::DateTime::from_timestamp_millis(date.timestamp_millis()).ok_or_else(|| {
                    ValidationError::single(FieldIssue::new(
                        IssueCode::OutOfRange,
                        Some(Bson::DateTime(*date)),
                        "date is out of range",
                    ))
                    .into()
                })
            }
            other => Err(mismatch(&FieldType::DateTime, other)),
        }
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn field_type(registry: &SchemaRegistry) -> Result<FieldType, SchemaError> {
        Ok(FieldType::optional(T::field_type(registry)?))
    }

    fn into_value(self) -> Result<Value> {
        match self {
            Some(value) => value.into_value(),
            None => Ok(Value::Bson(Bson::Null)),
        }
    }

    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl<T: FieldValue> FieldValue for Vec<T> {
    fn field_type(registry: &SchemaRegistry) -> Result<FieldType, SchemaError> {
        Ok(FieldType::array(T::field_type(registry)?))
    }

    fn into_value(self) -> Result<Value> {
        self.into_iter()
            .map(FieldValue::into_value)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array)
    }

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => items.iter().map(T::from_value).collect(),
            Value::Bson(Bson::Array(items)) => items
                .iter()
                .map(|item| T::from_value(&Value::Bson(item.clone())))
                .collect(),
            other => Err(Error::Validation(ValidationError::single(FieldIssue::new(
                IssueCode::TypeMismatch,
                Some(other.to_bson()),
                "expected an array",
            )))),
        }
    }
}

/// Field type of an embedded model, for `FieldValue` impls of embedded models.
pub fn embedded_field_type<M: Model>(registry: &SchemaRegistry) -> Result<FieldType, SchemaError> {
    Ok(FieldType::Embedded(registry.get_or_build::<M>()?))
}

pub fn embedded_into_value<M: Model>(model: M) -> Result<Value> {
    Ok(Value::Embedded(Instance::from_model(model)?))
}

pub fn embedded_from_value<M: Model>(value: &Value) -> Result<M> {
    match value {
        Value::Embedded(instance) => instance.to_model(),
        other => Err(ValidationError::single(FieldIssue::new(
            IssueCode::TypeMismatch,
            Some(other.to_bson()),
            format!("expected {}", M::NAME),
        ))
        .into()),
    }
}

#[doc(hidden)]
pub fn default_value<T: FieldValue>(model: &str, field: &str, value: T) -> Result<Value, SchemaError> {
    value.into_value().map_err(|err| match err {
        Error::Schema(err) => err,
        err => SchemaError::InvalidDefault {
            model: model.to_owned(),
            field: field.to_owned(),
            source: conversion_error(err),
        },
    })
}

/// Converts the output of a default factory.
#[doc(hidden)]
pub fn factory_value<T: FieldValue>(value: T) -> Result<Value, ValidationError> {
    value.into_value().map_err(conversion_error)
}

fn conversion_error(err: Error) -> ValidationError {
    match err {
        Error::Validation(err) => err,
        err => ValidationError::single(FieldIssue::new(
            IssueCode::TypeMismatch,
            None,
            err.to_string(),
        )),
    }
}

/// Typed reference to a separately persisted model `M`.
///
/// Holds either the primary key alone or, once loaded, the referenced instance.
pub struct Ref<M> {
    reference: Reference,
    marker: PhantomData<fn() -> M>,
}

impl<M> Ref<M> {
    pub fn key(key: impl Into<Bson>) -> Self {
        Self::from_reference(Reference::Key(key.into()))
    }

    /// Reference attached to a copy of `instance`.
    pub fn to(instance: &Instance) -> Self {
        Self::from_reference(Reference::to(instance))
    }

    pub fn attached(instance: Instance) -> Self {
        Self::from_reference(Reference::Attached(Box::new(instance)))
    }

    pub fn from_reference(reference: Reference) -> Self {
        Self {
            reference,
            marker: PhantomData,
        }
    }

    pub fn primary_key(&self) -> Bson {
        self.reference.key()
    }

    pub fn instance(&self) -> Option<&Instance> {
        self.reference.instance()
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }
}

impl<M: Model> Ref<M> {
    /// The referenced model, if it was loaded.
    pub fn load(&self) -> Option<Result<M>> {
        self.instance().map(Instance::to_model)
    }
}

impl<M> Clone for Ref<M> {
    fn clone(&self) -> Self {
        Self::from_reference(self.reference.clone())
    }
}

impl<M> PartialEq for Ref<M> {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
    }
}

impl<M> fmt::Debug for Ref<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ref").field(&self.reference.key()).finish()
    }
}

impl<M: Model> FieldValue for Ref<M> {
    fn field_type(registry: &SchemaRegistry) -> Result<FieldType, SchemaError> {
        Ok(FieldType::Reference(registry.get_or_build::<M>()?))
    }

    fn into_value(self) -> Result<Value> {
        Ok(Value::Reference(self.reference))
    }

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Reference(reference) => Ok(Self::from_reference(reference.clone())),
            Value::Bson(key) => Ok(Self::key(key.clone())),
            other => Err(ValidationError::single(FieldIssue::new(
                IssueCode::TypeMismatch,
                Some(other.to_bson()),
                format!("expected a reference to {}", M::NAME),
            ))
            .into()),
        }
    }
}

/// Stores any serde type as its BSON serialization, without type checks.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Serde<T>(pub T);

impl<T> Deref for Serde<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for Serde<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T> AsRef<T> for Serde<T> {
    fn as_ref(&self) -> &T {
        &self.0
    }
}

impl<T> From<T> for Serde<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T: Display> Display for Serde<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<T: Serialize + DeserializeOwned> FieldValue for Serde<T> {
    fn field_type(_: &SchemaRegistry) -> Result<FieldType, SchemaError> {
        Ok(FieldType::Any)
    }

    fn into_value(self) -> Result<Value> {
        bson::to_bson(&self.0).map(Value::Bson).map_err(|err| {
            ValidationError::single(FieldIssue::new(
                IssueCode::TypeMismatch,
                None,
                err.to_string(),
            ))
            .into()
        })
    }

    fn from_value(value: &Value) -> Result<Self> {
        let bson = value.to_bson();

        bson::from_bson(bson.clone()).map(Self).map_err(|err| {
            ValidationError::single(FieldIssue::new(
                IssueCode::TypeMismatch,
                Some(bson),
                err.to_string(),
            ))
            .into()
        })
    }
}
