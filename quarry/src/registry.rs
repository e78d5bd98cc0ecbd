use crate::{Model, error::SchemaError, schema::ModelSchema};
use dashmap::DashMap;
use std::{
    any::TypeId,
    cell::RefCell,
    sync::{Arc, LazyLock},
};
use tracing::trace;

static GLOBAL: LazyLock<SchemaRegistry> = LazyLock::new(SchemaRegistry::new);

thread_local! {
    static BUILDING: RefCell<Vec<TypeId>> = const { RefCell::new(Vec::new()) };
}

/// Process wide cache of built schemas, one per model type.
///
/// Schemas are built on first use. Concurrent first uses may build the same schema
/// twice, the first one stored wins.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: DashMap<TypeId, Arc<ModelSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry used by typed models.
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    pub fn get<M: Model>(&self) -> Option<Arc<ModelSchema>> {
        self.schemas
            .get(&TypeId::of::<M>())
            .map(|entry| entry.value().clone())
    }

    /// Schema of `M`, built and stored on first call.
    pub fn get_or_build<M: Model>(&self) -> Result<Arc<ModelSchema>, SchemaError> {
        if let Some(schema) = self.get::<M>() {
            return Ok(schema);
        }

        let type_id = TypeId::of::<M>();
        let _guard = BuildGuard::enter(type_id, M::NAME)?;

        let schema = Arc::new(M::declare(self)?.build()?);
        trace!(model = M::NAME, fields = schema.len(), "built schema");

        Ok(self.schemas.entry(type_id).or_insert(schema).value().clone())
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Every schema built so far, in no particular order.
    pub fn schemas(&self) -> Vec<Arc<ModelSchema>> {
        self.schemas
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

/// Marks a type as being built on the current thread, to catch models that
/// contain themselves.
struct BuildGuard;

impl BuildGuard {
    fn enter(type_id: TypeId, model: &str) -> Result<Self, SchemaError> {
        BUILDING.with_borrow_mut(|building| {
            if building.contains(&type_id) {
                return Err(SchemaError::RecursiveModel {
                    model: model.to_owned(),
                });
            }

            building.push(type_id);
            Ok(Self)
        })
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        BUILDING.with_borrow_mut(|building| {
            building.pop();
        });
    }
}
