//! Quarry is an object-document mapper for `MongoDB`.
//!
//! ## Example
//!
//! ```rust,ignore
//! // Define models
//! #[derive(Model)]
//! struct Publisher {
//!     name: String,
//!     founded: i64,
//!     #[field(default = None)]
//!     location: Option<String>,
//! }
//!
//! #[derive(Model)]
//! struct Book {
//!     title: String,
//!     pages: i32,
//!     publisher: Ref<Publisher>,
//! }
//!
//! // Build instances, every field of a new instance is dirty
//! let mut hachette = Instance::from_model(Publisher {
//!     name: "Hachette Livre".into(),
//!     founded: 1826,
//!     location: Some("FR".into()),
//! })?;
//!
//! // Persist them, only pending fields are sent
//! engine::save(mongo.rb(), &mut hachette).await?;
//!
//! // Query with typed field handles
//! let old: Vec<Publisher> = Publisher::find(
//!     mongo.rb(),
//!     publisher::filter! { founded: Lte(2000) }?,
//!     FindOptions::new().sort(publisher::founded()?.desc()?),
//! )
//! .await?;
//!
//! // Or compose expressions directly
//! let query = or_([
//!     publisher::location()?.eq(Some("FR".to_owned()))?,
//!     publisher::founded()?.gt(1900)?,
//! ])?;
//! ```
//!
//! See [`guides`] module to learn more!

#![warn(clippy::pedantic)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_errors_doc
)]

extern crate self as quarry;

pub mod codec;
pub mod engine;
mod error;
mod field;
pub mod guides;
mod id;
mod instance;
#[cfg(feature = "meta")]
pub mod meta;
mod query;
mod registry;
mod schema;
mod sort;
mod tracker;
pub mod types;
mod validate;

pub use engine::FindOptions;
pub use error::{
    DocumentParsingError, Error, FieldIssue, IssueCode, Result, SchemaError, UsageError,
    ValidationError,
};
pub use field::{
    DefaultFactory, FieldDefault, FieldKind, FieldMetadata, FieldSpec, FieldType, Mutability,
};
pub use id::{IdentifierFactory, ObjectIdFactory};
pub use instance::{Instance, Reference, Value};
pub use query::{Field, FieldRef, Operator, QueryExpression, and_, build_query, nor_, or_};
pub use registry::SchemaRegistry;
pub use schema::{
    IMPLICIT_ID_FIELD, ModelConfig, ModelSchema, PRIMARY_KEY, SchemaBuilder,
    default_collection_name,
};
pub use sort::{Direction, SortEntry, SortExpression, asc, desc};
pub use tracker::ChangeTracker;
pub use types::{FieldValue, Ref, Serde};
pub use validate::{TypeValidator, Validator};

pub use mongodb;
pub use mongodb::bson;
pub use quarry_macros::{Model, construct_filter};

#[cfg(feature = "meta")]
#[doc(hidden)]
pub use inventory;

use futures_util::{FutureExt, future::BoxFuture};
use mongodb::{ClientSession, Database};
use std::sync::Arc;

/// A Rust type mapped to a [`ModelSchema`].
///
/// Usually derived, see [`guides::getting_started`]. Typed reads are provided on
/// top of the instance level operations of [`engine`].
pub trait Model: Sized + Send + 'static {
    /// Name of the type, used in schemas and error messages.
    const NAME: &'static str;

    /// Declares the fields of the model. Field types of embedded and referenced
    /// models are resolved through `registry`.
    fn declare(registry: &SchemaRegistry) -> Result<SchemaBuilder, SchemaError>;

    /// Named values of the fields, consumed by [`Instance::from_model`].
    fn into_fields(self) -> Result<Vec<(&'static str, Value)>>;

    fn from_instance(instance: &Instance) -> Result<Self>;

    /// Schema of the model, from the global registry.
    fn schema() -> Result<Arc<ModelSchema>, SchemaError> {
        SchemaRegistry::global().get_or_build::<Self>()
    }

    fn find<'a>(
        mongo: Mongo<'a>,
        query: QueryExpression,
        options: FindOptions,
    ) -> BoxFuture<'a, Result<Vec<Self>>> {
        async move {
            let schema = Self::schema()?;
            let instances = engine::find(mongo, &schema, query, options).await?;

            instances.iter().map(Instance::to_model).collect()
        }
        .boxed()
    }

    fn find_one<'a>(
        mongo: Mongo<'a>,
        query: QueryExpression,
        sort: Option<SortExpression>,
    ) -> BoxFuture<'a, Result<Option<Self>>> {
        async move {
            let schema = Self::schema()?;
            let instance = engine::find_one(mongo, &schema, query, sort).await?;

            instance.as_ref().map(Instance::to_model).transpose()
        }
        .boxed()
    }

    fn count<'a>(mongo: Mongo<'a>, query: QueryExpression) -> BoxFuture<'a, Result<u64>> {
        async move {
            let schema = Self::schema()?;
            engine::count(mongo, &schema, query).await
        }
        .boxed()
    }

    fn exists<'a>(mongo: Mongo<'a>, query: QueryExpression) -> BoxFuture<'a, Result<bool>> {
        async move {
            let count = Self::count(mongo, query).await?;

            Ok(count > 0)
        }
        .boxed()
    }

    fn delete<'a>(mongo: Mongo<'a>, query: QueryExpression) -> BoxFuture<'a, Result<u64>> {
        async move {
            let schema = Self::schema()?;
            engine::delete(mongo, &schema, query).await
        }
        .boxed()
    }
}

/// Handle on a database, optionally bound to a session.
#[derive(Debug)]
pub struct Mongo<'a> {
    pub db: &'a Database,
    pub session: Option<&'a mut ClientSession>,
}

impl<'a> Mongo<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db, session: None }
    }

    pub fn new_with_session(db: &'a Database, session: &'a mut ClientSession) -> Self {
        Self {
            db,
            session: Some(session),
        }
    }

    pub fn rb(&mut self) -> Mongo<'_> {
        Mongo {
            db: self.db,
            session: self.session.as_deref_mut(),
        }
    }
}

impl<'a> From<&'a Database> for Mongo<'a> {
    fn from(value: &'a Database) -> Self {
        Self::new(value)
    }
}

impl<'a> From<(&'a Database, &'a mut ClientSession)> for Mongo<'a> {
    fn from(value: (&'a Database, &'a mut ClientSession)) -> Self {
        Self::new_with_session(value.0, value.1)
    }
}

#[macro_export]
macro_rules! with_session {
    ($query: expr, $session: expr) => {
        match $session {
            Some(session) => $query.session(session),
            None => $query,
        }
    };
}

#[cfg(not(feature = "meta"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __declare_model {
    ($model:ty) => {};
}
