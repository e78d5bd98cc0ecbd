//! Conversion between instances and BSON documents.

use crate::{
    error::{DocumentParsingError, FieldIssue, IssueCode},
    field::{FieldDefault, FieldMetadata, FieldType},
    instance::{Instance, Reference, Value},
    schema::ModelSchema,
    validate::{Validator, validate_value},
};
use mongodb::bson::{Bson, Document};
use std::sync::Arc;
use tracing::trace;

/// Full storage document of an instance, keyed by storage keys.
///
/// Embedded models are serialized inline, references as the referenced primary key.
pub fn to_document(instance: &Instance) -> Document {
    instance
        .iter()
        .map(|(field, value)| (field.storage_key().to_owned(), value.to_bson()))
        .collect()
}

/// Primary key plus every field pending in the change tracker.
pub fn to_partial_document(instance: &Instance) -> Document {
    let schema = instance.schema();
    let primary_key = schema.primary_key_index();
    let mut document = Document::new();

    if let Some(key) = instance.primary_key() {
        document.insert(crate::schema::PRIMARY_KEY, key.clone());
    }

    for index in instance.tracker().pending_indices() {
        if Some(index) == primary_key {
            continue;
        }

        if let (Some(field), Some(value)) = (schema.field_at(index), instance.value_at(index)) {
            document.insert(field.storage_key(), value.to_bson());
        }
    }

    document
}

/// Parses a storage document into an instance with a clean change tracker.
///
/// Every failing field is reported, keys the schema does not declare are ignored.
pub fn from_document(
    schema: &Arc<ModelSchema>,
    document: &Document,
) -> Result<Instance, DocumentParsingError> {
    parse_fields(schema, document)
        .map(|values| Instance::loaded(schema.clone(), values))
        .map_err(|issues| DocumentParsingError {
            model: schema.name().to_owned(),
            issues,
        })
}

fn parse_fields(
    schema: &Arc<ModelSchema>,
    document: &Document,
) -> Result<Vec<Value>, Vec<FieldIssue>> {
    let validator = schema.validator();
    let mut values = Vec::with_capacity(schema.len());
    let mut issues = Vec::new();

    for field in schema.fields() {
        let parsed = match document.get(field.storage_key()) {
            Some(raw) => parse_value(validator, field.field_type(), raw),
            None => missing_value(schema, field),
        };

        match parsed {
            Ok(value) => values.push(value),
            Err(errs) => issues.extend(errs.into_iter().map(|issue| issue.at(field.name()))),
        }
    }

    let extra = document
        .keys()
        .filter(|key| schema.field_by_key(key).is_none())
        .count();

    if extra > 0 {
        trace!(model = schema.name(), extra, "ignoring undeclared keys");
    }

    if issues.is_empty() {
        Ok(values)
    } else {
        Err(issues)
    }
}

fn missing_value(schema: &ModelSchema, field: &FieldMetadata) -> Result<Value, Vec<FieldIssue>> {
    match field.default() {
        FieldDefault::Value(value) => Ok(value.clone()),
        FieldDefault::Factory(factory) if schema.config().parse_doc_with_default_factories => {
            factory()
                .and_then(|value| validate_value(schema.validator(), field.field_type(), value))
                .map_err(|err| err.issues)
        }
        _ => {
            let message = if field.is_reference() {
                format!("referenced document not found for key `{}`", field.storage_key())
            } else {
                format!("key `{}` not found in document", field.storage_key())
            };

            Err(vec![FieldIssue::new(
                IssueCode::KeyNotFoundInDocument,
                None,
                message,
            )])
        }
    }
}

fn parse_value(
    validator: &dyn Validator,
    field_type: &FieldType,
    raw: &Bson,
) -> Result<Value, Vec<FieldIssue>> {
    match field_type {
        FieldType::Optional(_) if matches!(raw, Bson::Null) => Ok(Value::Bson(Bson::Null)),
        FieldType::Optional(inner) => parse_value(validator, inner, raw),

        FieldType::Embedded(schema) => match raw {
            Bson::Document(document) => parse_fields(schema, document)
                .map(|values| Value::Embedded(Instance::loaded(schema.clone(), values))),
            raw => Err(unexpected(field_type, raw)),
        },

        FieldType::Reference(schema) => {
            let inline_document = !matches!(
                schema.primary_key().map(FieldMetadata::field_type),
                Some(FieldType::Document | FieldType::Any)
            );

            match raw {
                Bson::Document(document) if inline_document => parse_fields(schema, document)
                    .map(|values| {
                        Value::Reference(Reference::Attached(Box::new(Instance::loaded(
                            schema.clone(),
                            values,
                        ))))
                    }),
                key => {
                    let key = match schema.primary_key() {
                        Some(primary_key) => validator
                            .validate(primary_key.field_type(), key.clone())
                            .map_err(|err| err.issues)?,
                        None => key.clone(),
                    };
                    Ok(Value::Reference(Reference::Key(key)))
                }
            }
        }

        FieldType::Array(inner) if inner.contains_model() => match raw {
            Bson::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                let mut issues = Vec::new();

                for (i, item) in items.iter().enumerate() {
                    match parse_value(validator, inner, item) {
                        Ok(value) => values.push(value),
                        Err(errs) => {
                            issues.extend(errs.into_iter().map(|issue| issue.at(format!("[{i}]"))));
                        }
                    }
                }

                if issues.is_empty() {
                    Ok(Value::Array(values))
                } else {
                    Err(issues)
                }
            }
            raw => Err(unexpected(field_type, raw)),
        },

        _ => validator
            .validate(field_type, raw.clone())
            .map(Value::Bson)
            .map_err(|err| err.issues),
    }
}

fn unexpected(field_type: &FieldType, raw: &Bson) -> Vec<FieldIssue> {
    vec![FieldIssue::new(
        IssueCode::TypeMismatch,
        Some(raw.clone()),
        format!(
            "expected {}, found {:?}",
            field_type.type_name(),
            raw.element_type()
        ),
    )]
}
