/// ## Getting started
///
/// A model is a Rust struct mapped to a [`ModelSchema`](crate::ModelSchema). Deriving
/// [`Model`](crate::Model) declares one field per struct field, resolving the field
/// type through [`FieldValue`](crate::FieldValue).
///
/// ```rust,ignore
/// use quarry::{Instance, Model};
///
/// #[derive(Model)]
/// struct Publisher {
///     name: String,
///     founded: i64,
///     #[field(default = None)]
///     location: Option<String>,
/// }
///
/// let publisher = Instance::from_model(Publisher {
///     name: "Hachette Livre".into(),
///     founded: 1826,
///     location: None,
/// })?;
/// ```
///
/// Models without a field marked `#[field(primary)]` get an implicit `id` field,
/// stored under `_id` and filled with a fresh
/// [`ObjectId`](mongodb::bson::oid::ObjectId). The implicit key only lives on the
/// [`Instance`](crate::Instance): converting back to the struct drops it, so keep
/// the instance around when you plan to save it again.
///
/// The collection name is the snake case form of the struct name, with a trailing
/// `Model` removed (`BookModel` → `book`). Override it with
/// `#[model(collection = "books")]`.
///
/// ### Field attributes
///
/// - `#[field(key = "...")]` stores the field under another key.
/// - `#[field(primary)]` makes the field the primary key, stored under `_id`.
/// - `#[field(default = expr)]` provides a static default, checked when the schema is
///   built.
/// - `#[field(default_factory = path)]` calls `path()` for every new instance.
///
/// ### Embedded models
///
/// `#[model(embedded)]` models have no collection and no primary key. They can be
/// used as field types, alone or inside a `Vec`, and are stored inline.
///
/// ### Without derives
///
/// Schemas can be assembled by hand with [`SchemaBuilder`](crate::SchemaBuilder) and
/// [`FieldSpec`](crate::FieldSpec), and instances built from named
/// [`Value`](crate::Value)s. Everything besides the typed handles works the same.
///
/// ### Creating `Mongo`
///
/// [`Mongo`](crate::Mongo) wraps a reference to a [`Database`](mongodb::Database),
/// optionally paired with a [`ClientSession`](mongodb::ClientSession). Reborrow it
/// with [`Mongo::rb`](crate::Mongo::rb) to run several operations.
///
/// ```rust,ignore
/// let client = Client::with_uri_str("mongodb://localhost").await?;
/// let db = client.database("library");
/// let mut mongo: Mongo = (&db).into();
///
/// engine::save(mongo.rb(), &mut publisher).await?;
/// let count = Publisher::count(mongo.rb(), QueryExpression::empty()).await?;
/// ```
pub mod getting_started {}

/// ## Queries and sorting
///
/// Every derived model gets a module named after it, in snake case, with one
/// function per field returning a typed [`Field`](crate::Field) handle. Handles
/// build [`QueryExpression`](crate::QueryExpression)s:
///
/// ```rust,ignore
/// let query = publisher::founded()?.lte(2000)?;
/// // { "founded": { "$lte": 2000 } }
///
/// let query = and_([
///     publisher::founded()?.gte(1800)?,
///     publisher::name()?.regex("^Hach")?,
/// ])?;
/// // { "$and": [{ "founded": { "$gte": 1800 } }, { "name": { "$regex": "^Hach" } }] }
/// ```
///
/// Compared values go through the validator of the model first, like assigned
/// values do: a hex string compared with an `ObjectId` field becomes an
/// `ObjectId`, and a string compared with an integer field is a validation error.
/// Regex patterns are passed through as they are.
///
/// `&` and `|` combine expressions as well. `and_`, `or_` and `nor_` require at
/// least two operands, ANDs and ORs nested in an operator of the same kind are
/// flattened.
///
/// The `filter!` macro of each model module is a shorthand for the common case of
/// ANDed comparisons:
///
/// ```rust,ignore
/// let query = publisher::filter! {
///     founded: Lte(2000),
///     name: "Hachette Livre",
/// }?;
/// ```
///
/// Paths through embedded models are built with [`Field::then`](crate::Field::then):
///
/// ```rust,ignore
/// let city = user::address()?.then(address::city()?)?;
/// let query = city.eq("Paris")?;
/// // { "address.city": "Paris" }
/// ```
///
/// Crossing a reference is rejected, so are ordering comparisons on embedded models.
///
/// ### Sorting
///
/// `asc` and `desc` on a handle produce a [`SortExpression`](crate::SortExpression),
/// concatenated with [`then`](crate::SortExpression::then):
///
/// ```rust,ignore
/// let sort = book::pages()?.desc()?.then(book::title()?.asc()?);
/// let books = Book::find(mongo, QueryExpression::empty(), FindOptions::new().sort(sort)).await?;
/// ```
pub mod queries_and_sorting {}

/// ## Change tracking
///
/// Every [`Instance`](crate::Instance) carries a [`ChangeTracker`](crate::ChangeTracker).
///
/// - A new instance has every field dirty.
/// - An instance loaded from the database has none.
/// - [`Instance::set`](crate::Instance::set) marks a field dirty unless the new value
///   equals the one last loaded or saved.
/// - Lists, documents and embedded models can be changed in place through
///   [`Instance::get_mut`](crate::Instance::get_mut), so they are always sent.
///
/// [`engine::save`](crate::engine::save) writes the primary key and the pending fields
/// with a single upsert, then resets the tracker.
///
/// The primary key cannot be reassigned. Use
/// [`Instance::copy_with`](crate::Instance::copy_with) to build a copy under a new key.
pub mod change_tracking {}

/// ## References
///
/// A [`Ref<M>`](crate::Ref) field stores the primary key of an `M` document. Finds
/// load referenced documents in the same aggregation, recursively, and saving an
/// instance saves its loaded references first.
///
/// References cannot be stored inside lists, and queries cannot reach into the
/// referenced document. Compare the reference itself instead:
///
/// ```rust,ignore
/// let query = book::publisher()?.eq(Ref::to(&hachette))?;
/// ```
pub mod references {}

/// ## Configuration
///
/// - `#[model(parse_doc_with_default_factories)]` lets documents missing a key fall
///   back to the default factory instead of failing.
/// - [`SchemaBuilder::validator`](crate::SchemaBuilder::validator) replaces the
///   [`TypeValidator`](crate::TypeValidator).
/// - [`SchemaBuilder::id_factory`](crate::SchemaBuilder::id_factory) replaces the
///   generator of implicit primary keys.
///
/// With the `meta` feature (on by default), derived models register themselves at
/// link time and
/// [`SchemaRegistry::preload_declared`](crate::SchemaRegistry::preload_declared)
/// builds every schema upfront, surfacing declaration errors at startup.
///
/// Quarry logs through [`tracing`](https://docs.rs/tracing): database operations at
/// `debug`, schema builds and ignored document keys at `trace`.
pub mod configuration {}
