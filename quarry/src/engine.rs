//! Database operations on instances.
//!
//! Reads go through an aggregation pipeline so that references can be loaded in
//! the same round trip. Writes are upserts keyed on the primary key, sending only
//! the fields pending in the change tracker.

use crate::{
    Mongo,
    codec,
    error::{Result, UsageError},
    instance::Instance,
    query::QueryExpression,
    schema::{ModelSchema, PRIMARY_KEY},
    sort::SortExpression,
    with_session,
};
use futures_util::{FutureExt, TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection, Database,
    bson::{Bson, Document, doc},
};
use std::sync::Arc;
use tracing::debug;

/// Sort, skip and limit of a find call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<SortExpression>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, sort: SortExpression) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Caps the number of results, has to be strictly positive.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

fn collection(db: &Database, schema: &ModelSchema) -> Result<Collection<Document>, UsageError> {
    schema
        .collection_name()
        .map(|name| db.collection(name))
        .ok_or_else(|| UsageError::EmbeddedRoot {
            model: schema.name().to_owned(),
        })
}

/// Stages loading every reference of `schema`, recursively.
///
/// Each reference field is replaced by the referenced document, or removed when
/// the referenced document does not exist.
pub fn reference_stages(schema: &ModelSchema) -> Vec<Document> {
    let mut stages = Vec::new();

    for field in schema.references() {
        let Some(referenced) = field.embedded_schema() else {
            continue;
        };
        let Some(from) = referenced.collection_name() else {
            continue;
        };

        let key = field.storage_key();
        let mut pipeline = vec![doc! {
            "$match": { "$expr": { "$eq": ["$_id", "$$foreign_id"] } }
        }];
        pipeline.extend(reference_stages(referenced));

        stages.push(doc! {
            "$lookup": {
                "from": from,
                "let": { "foreign_id": format!("${key}") },
                "pipeline": pipeline,
                "as": key,
            }
        });
        stages.push(doc! {
            "$unwind": {
                "path": format!("${key}"),
                "preserveNullAndEmptyArrays": true,
            }
        });
    }

    stages
}

/// Aggregation pipeline of a find call: match, sort, skip and limit, then the
/// reference lookups.
pub fn find_pipeline(
    schema: &ModelSchema,
    query: &QueryExpression,
    options: &FindOptions,
) -> Result<Vec<Document>, UsageError> {
    if schema.is_embedded() {
        return Err(UsageError::EmbeddedRoot {
            model: schema.name().to_owned(),
        });
    }

    let mut pipeline = vec![doc! { "$match": query.to_document() }];

    if let Some(sort) = options.sort.as_ref().filter(|sort| !sort.is_empty()) {
        pipeline.push(doc! { "$sort": sort.to_document() });
    }

    if let Some(skip) = options.skip.filter(|skip| *skip > 0) {
        pipeline.push(doc! { "$skip": Bson::Int64(i64::try_from(skip).unwrap_or(i64::MAX)) });
    }

    if let Some(limit) = options.limit {
        if limit <= 0 {
            return Err(UsageError::InvalidLimit(limit));
        }
        pipeline.push(doc! { "$limit": limit });
    }

    pipeline.extend(reference_stages(schema));

    Ok(pipeline)
}

pub fn find<'a>(
    mongo: Mongo<'a>,
    schema: &'a Arc<ModelSchema>,
    query: QueryExpression,
    options: FindOptions,
) -> BoxFuture<'a, Result<Vec<Instance>>> {
    async move {
        let Mongo { db, session } = mongo;
        let collection = collection(db, schema)?;
        let pipeline = find_pipeline(schema, &query, &options)?;

        debug!(collection = collection.name(), query = %query, "Executing find");

        let documents: Vec<Document> = match session {
            Some(session) => {
                collection
                    .aggregate(pipeline)
                    .session(&mut *session)
                    .await?
                    .stream(&mut *session)
                    .try_collect()
                    .await
            }
            None => collection.aggregate(pipeline).await?.try_collect().await,
        }?;

        let instances = documents
            .iter()
            .map(|document| codec::from_document(schema, document))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(instances)
    }
    .boxed()
}

pub fn find_one<'a>(
    mongo: Mongo<'a>,
    schema: &'a Arc<ModelSchema>,
    query: QueryExpression,
    sort: Option<SortExpression>,
) -> BoxFuture<'a, Result<Option<Instance>>> {
    async move {
        let options = FindOptions {
            sort,
            skip: None,
            limit: Some(1),
        };
        let instances = find(mongo, schema, query, options).await?;

        Ok(instances.into_iter().next())
    }
    .boxed()
}

pub fn count<'a>(
    mongo: Mongo<'a>,
    schema: &'a ModelSchema,
    query: QueryExpression,
) -> BoxFuture<'a, Result<u64>> {
    async move {
        let Mongo { db, session } = mongo;
        let collection = collection(db, schema)?;

        debug!(collection = collection.name(), query = %query, "Executing count");

        let count =
            with_session!(collection.count_documents(query.to_document()), session).await?;

        Ok(count)
    }
    .boxed()
}

/// Persists `instance`, saving loaded references first.
///
/// Only the primary key and the pending fields are written, as an upsert. The change
/// tracker is reset once the write succeeded.
pub fn save<'a>(mut mongo: Mongo<'a>, instance: &'a mut Instance) -> BoxFuture<'a, Result<()>> {
    async move {
        for referenced in instance.attached_references_mut() {
            save(mongo.rb(), referenced).await?;
        }

        if !instance.tracker().has_pending() {
            return Ok(());
        }

        let Some(key) = instance.primary_key().cloned() else {
            return Err(UsageError::EmbeddedRoot {
                model: instance.schema().name().to_owned(),
            }
            .into());
        };

        let Mongo { db, session } = mongo;
        let collection = collection(db, instance.schema())?;
        let update = codec::to_partial_document(instance);

        debug!(
            collection = collection.name(),
            fields = update.len(),
            "Executing save"
        );

        with_session!(
            collection
                .update_one(doc! { PRIMARY_KEY: key }, doc! { "$set": update })
                .upsert(true),
            session
        )
        .await?;

        instance.mark_saved();

        Ok(())
    }
    .boxed()
}

/// Saves each instance in turn, stopping at the first failure.
pub fn save_all<'a, I>(mut mongo: Mongo<'a>, instances: I) -> BoxFuture<'a, Result<()>>
where
    I: IntoIterator<Item = &'a mut Instance>,
    I::IntoIter: Send + 'a,
{
    let instances = instances.into_iter();

    async move {
        for instance in instances {
            save(mongo.rb(), instance).await?;
        }

        Ok(())
    }
    .boxed()
}

/// Deletes every document matching `query`, returning how many were removed.
pub fn delete<'a>(
    mongo: Mongo<'a>,
    schema: &'a ModelSchema,
    query: QueryExpression,
) -> BoxFuture<'a, Result<u64>> {
    async move {
        let Mongo { db, session } = mongo;
        let collection = collection(db, schema)?;

        debug!(collection = collection.name(), query = %query, "Executing delete");

        let result = with_session!(collection.delete_many(query.to_document()), session).await?;

        Ok(result.deleted_count)
    }
    .boxed()
}

/// Deletes the document of `instance`, returns whether one was found.
pub fn remove<'a>(mongo: Mongo<'a>, instance: &'a Instance) -> BoxFuture<'a, Result<bool>> {
    async move {
        let Some(key) = instance.primary_key().cloned() else {
            return Err(UsageError::EmbeddedRoot {
                model: instance.schema().name().to_owned(),
            }
            .into());
        };

        let Mongo { db, session } = mongo;
        let collection = collection(db, instance.schema())?;

        debug!(collection = collection.name(), "Executing remove");

        let result =
            with_session!(collection.delete_one(doc! { PRIMARY_KEY: key }), session).await?;

        Ok(result.deleted_count > 0)
    }
    .boxed()
}
