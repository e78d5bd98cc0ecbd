//! Model schemas and the builder producing them.

use crate::{
    error::SchemaError,
    field::{FieldDefault, FieldKind, FieldMetadata, FieldSpec, FieldType, Mutability},
    id::{IdentifierFactory, ObjectIdFactory},
    instance::Value,
    validate::{TypeValidator, Validator, validate_value},
};
use heck::ToSnakeCase;
use indexmap::IndexMap;
use std::{collections::HashSet, fmt, sync::Arc};

/// Storage key reserved for the primary key.
pub const PRIMARY_KEY: &str = "_id";

/// Name of the primary key field injected when a model declares none.
pub const IMPLICIT_ID_FIELD: &str = "id";

/// Model level options.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelConfig {
    /// Overrides the collection name derived from the model name.
    pub collection: Option<String>,
    /// Call default factories for keys missing from parsed documents.
    pub parse_doc_with_default_factories: bool,
}

/// Immutable description of a model: its fields, primary key and collection.
///
/// Built once per model type by [`SchemaBuilder::build`], usually through the
/// [`SchemaRegistry`](crate::SchemaRegistry), and shared behind an [`Arc`].
pub struct ModelSchema {
    name: String,
    collection: Option<String>,
    fields: IndexMap<String, FieldMetadata>,
    primary_key: Option<usize>,
    config: ModelConfig,
    validator: Arc<dyn Validator>,
}

impl ModelSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Collection of the model, `None` for embedded models.
    pub fn collection_name(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn is_embedded(&self) -> bool {
        self.collection.is_none()
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn validator(&self) -> &dyn Validator {
        self.validator.as_ref()
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl ExactSizeIterator<Item = &FieldMetadata> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.get(name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.get_index_of(name)
    }

    pub fn field_at(&self, index: usize) -> Option<&FieldMetadata> {
        self.fields.get_index(index).map(|(_, field)| field)
    }

    pub(crate) fn field_type_at(&self, index: usize) -> &FieldType {
        &self.fields[index].field_type
    }

    pub fn field_by_key(&self, storage_key: &str) -> Option<&FieldMetadata> {
        self.fields
            .values()
            .find(|field| field.storage_key == storage_key)
    }

    pub fn primary_key(&self) -> Option<&FieldMetadata> {
        self.primary_key.and_then(|index| self.field_at(index))
    }

    pub fn primary_key_index(&self) -> Option<usize> {
        self.primary_key
    }

    /// Reference fields, in declaration order.
    pub fn references(&self) -> impl Iterator<Item = &FieldMetadata> {
        self.fields.values().filter(|field| field.is_reference())
    }
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSchema")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("primary_key", &self.primary_key().map(FieldMetadata::name))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builds a [`ModelSchema`] from field declarations.
///
/// ```rust,ignore
/// let schema = SchemaBuilder::new("Publisher")
///     .field(FieldSpec::new("name", FieldType::String))
///     .field(FieldSpec::new("founded", FieldType::Int64))
///     .field(FieldSpec::new("location", FieldType::optional(FieldType::String)).default(Bson::Null))
///     .build()?;
///
/// assert_eq!(schema.collection_name(), Some("publisher"));
/// ```
pub struct SchemaBuilder {
    name: String,
    embedded: bool,
    config: ModelConfig,
    fields: Vec<FieldSpec>,
    validator: Arc<dyn Validator>,
    id_factory: Arc<dyn IdentifierFactory>,
}

impl SchemaBuilder {
    /// Starts a schema for the type called `name` (a path is accepted, only its last
    /// segment is used).
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let name = name.rsplit("::").next().unwrap_or_default().to_owned();

        Self {
            name,
            embedded: false,
            config: ModelConfig::default(),
            fields: Vec::new(),
            validator: Arc::new(TypeValidator),
            id_factory: Arc::new(ObjectIdFactory),
        }
    }

    /// Marks the model as embedded: no collection, no primary key.
    pub fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.config.collection = Some(collection.into());
        self
    }

    pub fn parse_doc_with_default_factories(mut self, enabled: bool) -> Self {
        self.config.parse_doc_with_default_factories = enabled;
        self
    }

    pub fn config(mut self, config: ModelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    /// Factory used for the implicit primary key.
    pub fn id_factory(mut self, id_factory: Arc<dyn IdentifierFactory>) -> Self {
        self.id_factory = id_factory;
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = FieldSpec>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn build(self) -> Result<ModelSchema, SchemaError> {
        let Self {
            name: model,
            embedded,
            config,
            fields: specs,
            validator,
            id_factory,
        } = self;

        let primary_keys = specs
            .iter()
            .filter(|spec| spec.primary_key)
            .map(|spec| spec.name.clone())
            .collect::<Vec<_>>();

        if embedded {
            if let Some(field) = primary_keys.into_iter().next() {
                return Err(SchemaError::PrimaryKeyInEmbedded { model, field });
            }
        } else if primary_keys.len() > 1 {
            return Err(SchemaError::MultiplePrimaryKeys {
                model,
                fields: primary_keys,
            });
        }

        let mut fields = IndexMap::with_capacity(specs.len() + 1);

        let declares_primary_key = specs.iter().any(|spec| spec.primary_key);

        if !embedded && !declares_primary_key {
            if specs.iter().any(|spec| spec.name == IMPLICIT_ID_FIELD) {
                return Err(SchemaError::ImplicitIdConflict { model });
            }

            fields.insert(IMPLICIT_ID_FIELD.to_owned(), implicit_id_field(id_factory));
        }

        for spec in specs {
            if fields.contains_key(&spec.name) {
                return Err(SchemaError::DuplicateField {
                    model,
                    field: spec.name,
                });
            }

            let field = build_field(&model, validator.as_ref(), spec)?;
            fields.insert(field.name.clone(), field);
        }

        let mut keys = HashSet::with_capacity(fields.len());
        for field in fields.values() {
            if !keys.insert(field.storage_key.as_str()) {
                return Err(SchemaError::DuplicateKey {
                    model,
                    key: field.storage_key.clone(),
                });
            }
        }

        let collection = if embedded {
            None
        } else {
            let collection = config
                .collection
                .clone()
                .unwrap_or_else(|| default_collection_name(&model));
            check_collection_name(&model, &collection)?;
            Some(collection)
        };

        let primary_key = fields.values().position(|field| field.primary_key);

        Ok(ModelSchema {
            name: model,
            collection,
            fields,
            primary_key,
            config,
            validator,
        })
    }
}

impl fmt::Debug for SchemaBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaBuilder")
            .field("name", &self.name)
            .field("embedded", &self.embedded)
            .field("config", &self.config)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

fn implicit_id_field(id_factory: Arc<dyn IdentifierFactory>) -> FieldMetadata {
    let field_type = id_factory.key_type();

    FieldMetadata {
        name: IMPLICIT_ID_FIELD.to_owned(),
        storage_key: PRIMARY_KEY.to_owned(),
        kind: FieldKind::classify(&field_type),
        mutability: Mutability::Immutable,
        field_type,
        default: FieldDefault::Factory(Arc::new(move || {
            Ok(Value::Bson(id_factory.generate_primary_key()))
        })),
        primary_key: true,
    }
}

fn build_field(
    model: &str,
    validator: &dyn Validator,
    spec: FieldSpec,
) -> Result<FieldMetadata, SchemaError> {
    let FieldSpec {
        name,
        field_type,
        key,
        primary_key,
        default,
        default_factory,
    } = spec;

    let storage_key = if primary_key {
        PRIMARY_KEY.to_owned()
    } else {
        let key = key.unwrap_or_else(|| name.clone());
        check_key_name(model, &name, &key)?;
        key
    };

    check_models(model, &name, &field_type, false)?;

    let default = match (default, default_factory) {
        (Some(_), Some(_)) => {
            return Err(SchemaError::ConflictingDefaults {
                model: model.to_owned(),
                field: name,
            });
        }
        (Some(value), None) => match validate_value(validator, &field_type, value) {
            Ok(value) => FieldDefault::Value(value),
            Err(source) => {
                return Err(SchemaError::InvalidDefault {
                    model: model.to_owned(),
                    field: name,
                    source,
                });
            }
        },
        (None, Some(factory)) => FieldDefault::Factory(factory),
        (None, None) => FieldDefault::Required,
    };

    let mutability = if field_type.is_container() {
        Mutability::Container
    } else {
        Mutability::Immutable
    };

    Ok(FieldMetadata {
        kind: FieldKind::classify(&field_type),
        name,
        storage_key,
        field_type,
        default,
        mutability,
        primary_key,
    })
}

/// Checks the models a field type refers to. References stored in arrays, directly
/// or through embedded models, are rejected.
fn check_models(
    model: &str,
    field: &str,
    field_type: &FieldType,
    in_array: bool,
) -> Result<(), SchemaError> {
    match field_type {
        FieldType::Optional(inner) => check_models(model, field, inner, in_array),
        FieldType::Array(inner) => check_models(model, field, inner, true),
        FieldType::Reference(target) if target.is_embedded() => {
            Err(SchemaError::ReferenceToEmbedded {
                model: model.to_owned(),
                field: field.to_owned(),
                target: target.name().to_owned(),
            })
        }
        FieldType::Embedded(target) if !target.is_embedded() => Err(SchemaError::NotEmbeddable {
            model: model.to_owned(),
            field: field.to_owned(),
            target: target.name().to_owned(),
        }),
        FieldType::Reference(_) if in_array => Err(SchemaError::ReferenceInContainer {
            model: model.to_owned(),
            field: field.to_owned(),
        }),
        FieldType::Embedded(target) if in_array && holds_references(target) => {
            Err(SchemaError::ReferenceInContainer {
                model: model.to_owned(),
                field: field.to_owned(),
            })
        }
        _ => Ok(()),
    }
}

fn holds_references(schema: &ModelSchema) -> bool {
    fn in_type(field_type: &FieldType) -> bool {
        match field_type {
            FieldType::Optional(inner) | FieldType::Array(inner) => in_type(inner),
            FieldType::Reference(_) => true,
            FieldType::Embedded(schema) => holds_references(schema),
            _ => false,
        }
    }

    schema.fields().any(|field| in_type(field.field_type()))
}

fn check_key_name(model: &str, field: &str, key: &str) -> Result<(), SchemaError> {
    let reason = if key.is_empty() {
        Some("cannot be empty")
    } else if key.starts_with('$') {
        Some("cannot start with the dollar sign ($) character")
    } else if key.contains('.') {
        Some("cannot contain the dot (.) character")
    } else if key.contains('\0') {
        Some("cannot contain the null character")
    } else if key == PRIMARY_KEY {
        Some("`_id` is reserved for the primary key")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(SchemaError::InvalidKey {
            model: model.to_owned(),
            field: field.to_owned(),
            key: key.to_owned(),
            reason,
        }),
        None => Ok(()),
    }
}

fn check_collection_name(model: &str, collection: &str) -> Result<(), SchemaError> {
    let reason = if collection.is_empty() {
        Some("cannot be empty")
    } else if collection.contains('$') {
        Some("cannot contain '$'")
    } else if collection.starts_with("system.") {
        Some("cannot start with 'system.'")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(SchemaError::InvalidCollectionName {
            model: model.to_owned(),
            name: collection.to_owned(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Snake case form of the model name, without a trailing `Model`.
pub fn default_collection_name(model: &str) -> String {
    let stripped = match model.strip_suffix("Model") {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => model,
    };

    stripped.to_snake_case()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::Bson;
    use pretty_assertions::assert_eq;

    fn publisher() -> SchemaBuilder {
        SchemaBuilder::new("Publisher")
            .field(FieldSpec::new("name", FieldType::String))
            .field(FieldSpec::new("founded", FieldType::Int64))
            .field(
                FieldSpec::new("location", FieldType::optional(FieldType::String))
                    .default(Bson::Null),
            )
    }

    fn address() -> Arc<ModelSchema> {
        Arc::new(
            SchemaBuilder::new("Address")
                .embedded()
                .field(FieldSpec::new("city", FieldType::String))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_implicit_primary_key_is_injected_first() {
        let schema = publisher().build().unwrap();

        let names = schema.fields().map(FieldMetadata::name).collect::<Vec<_>>();
        assert_eq!(names, vec!["id", "name", "founded", "location"]);

        let id = schema.primary_key().unwrap();
        assert_eq!(id.storage_key(), "_id");
        assert_eq!(id.field_type(), &FieldType::ObjectId);
        assert!(matches!(id.default(), FieldDefault::Factory(_)));
        assert_eq!(schema.primary_key_index(), Some(0));
    }

    #[test]
    fn test_collection_name() {
        assert_eq!(default_collection_name("Publisher"), "publisher");
        assert_eq!(default_collection_name("BookPublisherModel"), "book_publisher");
        assert_eq!(default_collection_name("Model"), "model");

        let schema = SchemaBuilder::new("crate::models::TwitterUser").build().unwrap();
        assert_eq!(schema.name(), "TwitterUser");
        assert_eq!(schema.collection_name(), Some("twitter_user"));

        let schema = publisher().collection("publishers").build().unwrap();
        assert_eq!(schema.collection_name(), Some("publishers"));
    }

    #[test]
    fn test_invalid_collection_names() {
        for name in ["", "a$b", "system.users"] {
            let err = SchemaBuilder::new("Thing").collection(name).build().unwrap_err();
            assert!(matches!(err, SchemaError::InvalidCollectionName { .. }), "{name}");
        }
    }

    #[test]
    fn test_explicit_primary_key_uses_reserved_key() {
        let schema = SchemaBuilder::new("Player")
            .field(FieldSpec::new("name", FieldType::String).primary().key("player_name"))
            .field(FieldSpec::new("level", FieldType::Int32))
            .build()
            .unwrap();

        assert_eq!(schema.len(), 2);
        let primary_key = schema.primary_key().unwrap();
        assert_eq!(primary_key.name(), "name");
        assert_eq!(primary_key.storage_key(), "_id");
        assert!(primary_key.is_required());
    }

    #[test]
    fn test_multiple_primary_keys() {
        let err = SchemaBuilder::new("Player")
            .field(FieldSpec::new("a", FieldType::String).primary())
            .field(FieldSpec::new("b", FieldType::String).primary())
            .build()
            .unwrap_err();

        assert_eq!(
            err,
            SchemaError::MultiplePrimaryKeys {
                model: "Player".into(),
                fields: vec!["a".into(), "b".into()],
            }
        );
    }

    #[test]
    fn test_implicit_id_conflict() {
        let err = SchemaBuilder::new("User")
            .field(FieldSpec::new("id", FieldType::Int64))
            .build()
            .unwrap_err();

        assert!(matches!(err, SchemaError::ImplicitIdConflict { .. }));
    }

    #[test]
    fn test_embedded_schema() {
        let schema = address();
        assert!(schema.is_embedded());
        assert_eq!(schema.collection_name(), None);
        assert!(schema.primary_key().is_none());
        assert_eq!(schema.len(), 1);

        let err = SchemaBuilder::new("Address")
            .embedded()
            .field(FieldSpec::new("code", FieldType::String).primary())
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::PrimaryKeyInEmbedded { .. }));
    }

    #[test]
    fn test_invalid_keys() {
        for key in ["$name", "a.b", "_id", "", "a\0b"] {
            let err = SchemaBuilder::new("Thing")
                .field(FieldSpec::new("name", FieldType::String).key(key))
                .build()
                .unwrap_err();
            assert!(matches!(err, SchemaError::InvalidKey { .. }), "{key}");
        }
    }

    #[test]
    fn test_duplicate_keys_and_fields() {
        let err = SchemaBuilder::new("Thing")
            .field(FieldSpec::new("a", FieldType::String).key("x"))
            .field(FieldSpec::new("b", FieldType::String).key("x"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateKey {
                model: "Thing".into(),
                key: "x".into()
            }
        );

        let err = SchemaBuilder::new("Thing")
            .field(FieldSpec::new("a", FieldType::String))
            .field(FieldSpec::new("a", FieldType::Int32))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { .. }));
    }

    #[test]
    fn test_field_kinds_and_mutability() {
        let author = Arc::new(publisher().build().unwrap());
        let schema = SchemaBuilder::new("Book")
            .field(FieldSpec::new("title", FieldType::String))
            .field(FieldSpec::new("tags", FieldType::array(FieldType::String)))
            .field(FieldSpec::new("address", FieldType::Embedded(address())))
            .field(FieldSpec::new(
                "addresses",
                FieldType::array(FieldType::Embedded(address())),
            ))
            .field(FieldSpec::new("publisher", FieldType::Reference(author)))
            .build()
            .unwrap();

        let kind = |name: &str| schema.field(name).unwrap().kind().name();
        assert_eq!(kind("title"), "scalar");
        assert_eq!(kind("tags"), "scalar");
        assert_eq!(kind("address"), "embedded");
        assert_eq!(kind("addresses"), "embedded array");
        assert_eq!(kind("publisher"), "reference");

        let mutability = |name: &str| schema.field(name).unwrap().mutability();
        assert_eq!(mutability("title"), Mutability::Immutable);
        assert_eq!(mutability("tags"), Mutability::Container);
        assert_eq!(mutability("address"), Mutability::Container);
        assert_eq!(mutability("publisher"), Mutability::Immutable);

        let publisher = schema.field("publisher").unwrap();
        assert!(publisher.is_reference());
        assert_eq!(publisher.embedded_schema().unwrap().name(), "Publisher");
        assert_eq!(schema.references().count(), 1);
    }

    #[test]
    fn test_reference_in_container() {
        let author = Arc::new(publisher().build().unwrap());
        let err = SchemaBuilder::new("Book")
            .field(FieldSpec::new(
                "publishers",
                FieldType::array(FieldType::Reference(author)),
            ))
            .build()
            .unwrap_err();

        assert_eq!(
            err,
            SchemaError::ReferenceInContainer {
                model: "Book".into(),
                field: "publishers".into()
            }
        );
    }

    #[test]
    fn test_model_kinds_of_fields() {
        let address = Arc::new(
            SchemaBuilder::new("Address")
                .embedded()
                .field(FieldSpec::new("city", FieldType::String))
                .build()
                .unwrap(),
        );
        let publisher = Arc::new(publisher().build().unwrap());

        let err = SchemaBuilder::new("Book")
            .field(FieldSpec::new("shelf", FieldType::Reference(address.clone())))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::ReferenceToEmbedded {
                model: "Book".into(),
                field: "shelf".into(),
                target: "Address".into()
            }
        );

        let err = SchemaBuilder::new("Book")
            .field(FieldSpec::new(
                "publisher",
                FieldType::optional(FieldType::Embedded(publisher.clone())),
            ))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::NotEmbeddable {
                model: "Book".into(),
                field: "publisher".into(),
                target: "Publisher".into()
            }
        );

        let branch = Arc::new(
            SchemaBuilder::new("Branch")
                .embedded()
                .field(FieldSpec::new("owner", FieldType::Reference(publisher)))
                .build()
                .unwrap(),
        );
        assert!(
            SchemaBuilder::new("Store")
                .field(FieldSpec::new("main", FieldType::Embedded(branch.clone())))
                .build()
                .is_ok()
        );

        let err = SchemaBuilder::new("Store")
            .field(FieldSpec::new(
                "branches",
                FieldType::array(FieldType::Embedded(branch)),
            ))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::ReferenceInContainer {
                model: "Store".into(),
                field: "branches".into()
            }
        );

        assert!(
            SchemaBuilder::new("Store")
                .field(FieldSpec::new("addresses", FieldType::array(FieldType::Embedded(address))))
                .build()
                .is_ok()
        );
    }

    #[test]
    fn test_defaults() {
        let err = SchemaBuilder::new("Thing")
            .field(
                FieldSpec::new("a", FieldType::Int32)
                    .default(Bson::Int32(1))
                    .default_factory(|| Value::Bson(Bson::Int32(2))),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::ConflictingDefaults { .. }));

        let err = SchemaBuilder::new("Thing")
            .field(FieldSpec::new("a", FieldType::Int32).default("zero"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDefault { .. }));

        let schema = SchemaBuilder::new("Thing")
            .field(FieldSpec::new("a", FieldType::Int64).default(Bson::Int32(0)))
            .build()
            .unwrap();
        assert!(matches!(
            schema.field("a").unwrap().default(),
            FieldDefault::Value(Value::Bson(Bson::Int64(0)))
        ));
    }
}
