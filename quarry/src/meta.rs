//! Link-time collection of declared models.
//!
//! Every `#[derive(Model)]` submits a [`ModelDeclaration`], so schemas can be built
//! eagerly at startup instead of on first use.

use crate::{Model, error::SchemaError, registry::SchemaRegistry, schema::ModelSchema};
use std::sync::Arc;

#[doc(hidden)]
pub struct ModelDeclaration {
    name: &'static str,
    build: fn(&SchemaRegistry) -> Result<Arc<ModelSchema>, SchemaError>,
}

inventory::collect!(ModelDeclaration);

impl ModelDeclaration {
    pub const fn of<M: Model>() -> Self {
        Self {
            name: M::NAME,
            build: build::<M>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn build(&self, registry: &SchemaRegistry) -> Result<Arc<ModelSchema>, SchemaError> {
        (self.build)(registry)
    }
}

fn build<M: Model>(registry: &SchemaRegistry) -> Result<Arc<ModelSchema>, SchemaError> {
    registry.get_or_build::<M>()
}

pub fn declared_models() -> impl Iterator<Item = &'static ModelDeclaration> {
    inventory::iter::<ModelDeclaration>.into_iter()
}

impl SchemaRegistry {
    /// Builds the schema of every model declared with `#[derive(Model)]`, stopping
    /// at the first invalid one.
    pub fn preload_declared(&self) -> Result<Vec<Arc<ModelSchema>>, SchemaError> {
        declared_models()
            .map(|declaration| declaration.build(self))
            .collect()
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __declare_model {
    ($model:ty) => {
        $crate::inventory::submit! {
            $crate::meta::ModelDeclaration::of::<$model>()
        }
    };
}
