use crate::field::FieldType;
use mongodb::bson::{Bson, oid::ObjectId};
use std::fmt;

/// Generates primary keys for models that do not declare one.
pub trait IdentifierFactory: Send + Sync + fmt::Debug {
    fn generate_primary_key(&self) -> Bson;

    /// Declared type of the generated keys.
    fn key_type(&self) -> FieldType {
        FieldType::ObjectId
    }
}

/// Default [`IdentifierFactory`], producing fresh [`ObjectId`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectIdFactory;

impl IdentifierFactory for ObjectIdFactory {
    fn generate_primary_key(&self) -> Bson {
        Bson::ObjectId(ObjectId::new())
    }
}
