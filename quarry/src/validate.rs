//! Value validation against declared field types.

use crate::{
    codec,
    error::{FieldIssue, IssueCode, ValidationError},
    field::FieldType,
    instance::{Instance, Reference, Value},
    schema::ModelSchema,
};
use mongodb::bson::{Bson, Document, oid::ObjectId};
use std::{fmt, sync::Arc};

/// Checks plain BSON values against their declared [`FieldType`].
///
/// Embedded and referenced models are handled structurally before the validator
/// is consulted, so implementations only see scalar, document and array types.
/// A validator may coerce the value, the returned one is stored.
pub trait Validator: Send + Sync + fmt::Debug {
    fn validate(&self, field_type: &FieldType, value: Bson) -> Result<Bson, ValidationError>;
}

/// Default [`Validator`]: strict type checks with lossless numeric coercions.
///
/// * `int` values widen to `long` and `double`, `long` values narrow to `int` when
///   they fit.
/// * 24 character hex strings are accepted as `objectId`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TypeValidator;

impl Validator for TypeValidator {
    fn validate(&self, field_type: &FieldType, value: Bson) -> Result<Bson, ValidationError> {
        check(field_type, value).map_err(ValidationError::new)
    }
}

fn mismatch(field_type: &FieldType, value: Bson) -> Vec<FieldIssue> {
    let message = format!(
        "expected {}, found {:?}",
        field_type.type_name(),
        value.element_type()
    );
    vec![FieldIssue::new(IssueCode::TypeMismatch, Some(value), message)]
}

#[allow(clippy::cast_precision_loss)]
fn check(field_type: &FieldType, value: Bson) -> Result<Bson, Vec<FieldIssue>> {
    match (field_type, value) {
        (FieldType::Any, value)
        | (FieldType::Optional(_), value @ Bson::Null)
        | (FieldType::Bool, value @ Bson::Boolean(_))
        | (FieldType::Int32, value @ Bson::Int32(_))
        | (FieldType::Int64, value @ Bson::Int64(_))
        | (FieldType::Double, value @ Bson::Double(_))
        | (FieldType::String, value @ Bson::String(_))
        | (FieldType::ObjectId, value @ Bson::ObjectId(_))
        | (FieldType::DateTime, value @ Bson::DateTime(_))
        | (FieldType::Binary, value @ Bson::Binary(_))
        | (FieldType::Decimal128, value @ Bson::Decimal128(_))
        | (FieldType::Regex, value @ Bson::RegularExpression(_))
        | (FieldType::Timestamp, value @ Bson::Timestamp(_))
        | (FieldType::Document, value @ Bson::Document(_)) => Ok(value),

        (FieldType::Optional(inner), value) => check(inner, value),

        (FieldType::Int32, Bson::Int64(n)) => i32::try_from(n).map(Bson::Int32).map_err(|_| {
            vec![FieldIssue::new(
                IssueCode::OutOfRange,
                Some(Bson::Int64(n)),
                "value does not fit in a 32-bit integer",
            )]
        }),
        (FieldType::Int64, Bson::Int32(n)) => Ok(Bson::Int64(n.into())),
        (FieldType::Double, Bson::Int32(n)) => Ok(Bson::Double(n.into())),
        (FieldType::Double, Bson::Int64(n)) => Ok(Bson::Double(n as f64)),

        (FieldType::ObjectId, Bson::String(s)) => match ObjectId::parse_str(&s) {
            Ok(oid) => Ok(Bson::ObjectId(oid)),
            Err(_) => Err(vec![FieldIssue::new(
                IssueCode::InvalidObjectId,
                Some(Bson::String(s)),
                "not a valid ObjectId",
            )]),
        },

        (FieldType::Array(inner), Bson::Array(items)) => {
            let mut issues = Vec::new();
            let mut checked = Vec::with_capacity(items.len());

            for (i, item) in items.into_iter().enumerate() {
                match check(inner, item) {
                    Ok(item) => checked.push(item),
                    Err(errs) => issues.extend(errs.into_iter().map(|e| e.at(format!("[{i}]")))),
                }
            }

            if issues.is_empty() {
                Ok(Bson::Array(checked))
            } else {
                Err(issues)
            }
        }

        (field_type, value) => Err(mismatch(field_type, value)),
    }
}

fn value_mismatch(field_type: &FieldType, value: &Value) -> ValidationError {
    let found = match value {
        Value::Bson(bson) => format!("{:?}", bson.element_type()),
        Value::Embedded(instance) => instance.schema().name().to_owned(),
        Value::Array(_) => "array".to_owned(),
        Value::Reference(_) => "reference".to_owned(),
    };

    ValidationError::single(FieldIssue::new(
        IssueCode::TypeMismatch,
        Some(value.to_bson()),
        format!("expected {}, found {found}", field_type.type_name()),
    ))
}

fn expect_model(schema: &ModelSchema, instance: Instance) -> Result<Instance, ValidationError> {
    if instance.schema().name() == schema.name() {
        Ok(instance)
    } else {
        Err(ValidationError::single(FieldIssue::new(
            IssueCode::ModelMismatch,
            None,
            format!(
                "expected an instance of {}, found {}",
                schema.name(),
                instance.schema().name()
            ),
        )))
    }
}

fn validate_key(
    validator: &dyn Validator,
    schema: &ModelSchema,
    key: Bson,
) -> Result<Bson, ValidationError> {
    match schema.primary_key() {
        Some(primary_key) => validator.validate(primary_key.field_type(), key),
        None => Ok(key),
    }
}

fn parse_embedded(schema: &Arc<ModelSchema>, document: &Document) -> Result<Instance, ValidationError> {
    codec::from_document(schema, document).map_err(|err| ValidationError::new(err.issues))
}

/// Validates a [`Value`] against a field type, descending into embedded models,
/// references and arrays of models.
///
/// Raw documents given for embedded fields are parsed into instances and arrays
/// of plain values are normalized to [`Value::Bson`].
pub(crate) fn validate_value(
    validator: &dyn Validator,
    field_type: &FieldType,
    value: Value,
) -> Result<Value, ValidationError> {
    match field_type {
        FieldType::Optional(inner) => match value {
            Value::Bson(Bson::Null) => Ok(Value::Bson(Bson::Null)),
            value => validate_value(validator, inner, value),
        },

        FieldType::Embedded(schema) => match value {
            Value::Embedded(instance) => expect_model(schema, instance).map(Value::Embedded),
            Value::Bson(Bson::Document(document)) => {
                parse_embedded(schema, &document).map(Value::Embedded)
            }
            value => Err(value_mismatch(field_type, &value)),
        },

        FieldType::Reference(schema) => match value {
            Value::Reference(Reference::Key(key)) | Value::Bson(key) => {
                validate_key(validator, schema, key).map(|key| Value::Reference(Reference::Key(key)))
            }
            Value::Reference(Reference::Attached(instance)) => expect_model(schema, *instance)
                .map(|instance| Value::Reference(Reference::Attached(Box::new(instance)))),
            Value::Embedded(instance) => expect_model(schema, instance)
                .map(|instance| Value::Reference(Reference::Attached(Box::new(instance)))),
            value @ Value::Array(_) => Err(value_mismatch(field_type, &value)),
        },

        FieldType::Array(inner) if inner.contains_model() => {
            let items = match value {
                Value::Array(items) => items,
                Value::Bson(Bson::Array(items)) => items.into_iter().map(Value::Bson).collect(),
                value => return Err(value_mismatch(field_type, &value)),
            };

            let mut issues = Vec::new();
            let mut checked = Vec::with_capacity(items.len());

            for (i, item) in items.into_iter().enumerate() {
                match validate_value(validator, inner, item) {
                    Ok(item) => checked.push(item),
                    Err(err) => issues.extend(err.at(&format!("[{i}]")).issues),
                }
            }

            if issues.is_empty() {
                Ok(Value::Array(checked))
            } else {
                Err(ValidationError::new(issues))
            }
        }

        _ => match value {
            Value::Bson(bson) => validator.validate(field_type, bson).map(Value::Bson),
            Value::Array(items) => {
                let items = items
                    .into_iter()
                    .map(|item| match item {
                        Value::Bson(bson) => Ok(bson),
                        other => Err(value_mismatch(field_type, &other)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                validator
                    .validate(field_type, Bson::Array(items))
                    .map(Value::Bson)
            }
            value => Err(value_mismatch(field_type, &value)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldSpec, SchemaBuilder};
    use mongodb::bson::doc;
    use pretty_assertions::assert_eq;

    fn validate(field_type: FieldType, value: Bson) -> Result<Bson, ValidationError> {
        TypeValidator.validate(&field_type, value)
    }

    #[test]
    fn test_scalar_types() {
        assert_eq!(validate(FieldType::String, "a".into()), Ok(Bson::String("a".into())));
        assert_eq!(validate(FieldType::Int64, Bson::Int32(7)), Ok(Bson::Int64(7)));
        assert_eq!(validate(FieldType::Int32, Bson::Int64(7)), Ok(Bson::Int32(7)));
        assert_eq!(validate(FieldType::Double, Bson::Int32(2)), Ok(Bson::Double(2.0)));
        assert_eq!(
            validate(FieldType::optional(FieldType::String), Bson::Null),
            Ok(Bson::Null)
        );

        let err = validate(FieldType::Int32, Bson::Int64(i64::MAX)).unwrap_err();
        assert_eq!(err.issues[0].code, IssueCode::OutOfRange);

        let err = validate(FieldType::String, Bson::Int32(1)).unwrap_err();
        assert_eq!(err.issues[0].code, IssueCode::TypeMismatch);
        assert_eq!(err.issues[0].value, Some(Bson::Int32(1)));

        let err = validate(FieldType::String, Bson::Null).unwrap_err();
        assert_eq!(err.issues[0].code, IssueCode::TypeMismatch);
    }

    #[test]
    fn test_object_id_from_string() {
        let oid = ObjectId::new();
        assert_eq!(
            validate(FieldType::ObjectId, Bson::String(oid.to_hex())),
            Ok(Bson::ObjectId(oid))
        );

        let err = validate(FieldType::ObjectId, "nope".into()).unwrap_err();
        assert_eq!(err.issues[0].code, IssueCode::InvalidObjectId);
    }

    #[test]
    fn test_array_issues_are_located() {
        let err = validate(
            FieldType::array(FieldType::String),
            Bson::Array(vec!["a".into(), Bson::Int32(1), "c".into(), Bson::Null]),
        )
        .unwrap_err();

        let locs = err.issues.iter().map(FieldIssue::loc_string).collect::<Vec<_>>();
        assert_eq!(locs, vec!["[1]", "[3]"]);
    }

    #[test]
    fn test_embedded_values() {
        let address = Arc::new(
            SchemaBuilder::new("Address")
                .embedded()
                .field(FieldSpec::new("city", FieldType::String))
                .build()
                .unwrap(),
        );
        let field_type = FieldType::Embedded(address.clone());

        let value = validate_value(
            &TypeValidator,
            &field_type,
            Value::Bson(Bson::Document(doc! { "city": "Paris" })),
        )
        .unwrap();
        let instance = value.as_embedded().unwrap();
        assert_eq!(instance.get("city"), Some(&Value::from("Paris")));

        let err = validate_value(
            &TypeValidator,
            &field_type,
            Value::Bson(Bson::Document(doc! { "city": 1 })),
        )
        .unwrap_err();
        assert_eq!(err.issues[0].loc_string(), "city");

        let other = Arc::new(SchemaBuilder::new("Other").embedded().build().unwrap());
        let err = validate_value(
            &TypeValidator,
            &field_type,
            Value::Embedded(Instance::new(&other, Vec::<(&str, Value)>::new()).unwrap()),
        )
        .unwrap_err();
        assert_eq!(err.issues[0].code, IssueCode::ModelMismatch);
    }

    #[test]
    fn test_plain_arrays_are_normalized() {
        let value = validate_value(
            &TypeValidator,
            &FieldType::array(FieldType::Int64),
            Value::Array(vec![Value::from(1), Value::from(2)]),
        )
        .unwrap();

        assert_eq!(
            value,
            Value::Bson(Bson::Array(vec![Bson::Int64(1), Bson::Int64(2)]))
        );
    }
}
