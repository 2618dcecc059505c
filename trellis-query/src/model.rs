//! Model definitions and the schema that resolves them by name.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{QueryError, QueryResult};
use crate::relations::{RelationDecl, RelationRegistry};

/// A model: its table, identifier column and declared relations.
///
/// ```rust
/// use trellis_query::model::ModelDef;
/// use trellis_query::relations::RelationDecl;
///
/// let site = ModelDef::new("Site", "sites")
///     .with_relation("authors", RelationDecl::has_many("Author"))
///     .with_relation("meta", RelationDecl::has_one("SiteMeta"));
///
/// assert_eq!(site.table_name(), "sites");
/// assert_eq!(site.id_attribute(), "id");
/// assert!(site.relation("meta").is_some());
/// ```
#[derive(Debug, Clone)]
pub struct ModelDef {
    name: String,
    table_name: String,
    id_attribute: String,
    relations: RelationRegistry,
}

impl ModelDef {
    /// Create a model backed by `table_name` with an `id` identifier.
    pub fn new(name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: table_name.into(),
            id_attribute: "id".to_string(),
            relations: RelationRegistry::new(),
        }
    }

    /// Use a different identifier column.
    pub fn id_attribute_name(mut self, attribute: impl Into<String>) -> Self {
        self.id_attribute = attribute.into();
        self
    }

    /// Declare a relation.
    pub fn with_relation(mut self, name: impl Into<String>, decl: RelationDecl) -> Self {
        self.relations.register(name, decl);
        self
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing table.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Identifier column.
    pub fn id_attribute(&self) -> &str {
        &self.id_attribute
    }

    /// A declared relation.
    pub fn relation(&self, name: &str) -> Option<&RelationDecl> {
        self.relations.get(name)
    }

    /// All declared relations.
    pub fn relations(&self) -> &RelationRegistry {
        &self.relations
    }
}

/// Registry of models, looked up by name.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    models: IndexMap<String, Arc<ModelDef>>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model, replacing any earlier model with the same name.
    pub fn register(mut self, model: ModelDef) -> Self {
        self.models.insert(model.name.clone(), Arc::new(model));
        self
    }

    /// Look a model up by name.
    pub fn get(&self, name: &str) -> Option<&Arc<ModelDef>> {
        self.models.get(name)
    }

    /// Look a model up by name, failing with a configuration error.
    pub fn model(&self, name: &str) -> QueryResult<Arc<ModelDef>> {
        self.get(name).cloned().ok_or_else(|| {
            QueryError::configuration(format!("`{}` is not a registered model", name))
                .with_model(name)
                .with_suggestion("Register the model with Schema::register before building relations to it")
        })
    }

    /// Find the model backed by `table`.
    pub fn by_table(&self, table: &str) -> Option<&Arc<ModelDef>> {
        self.models.values().find(|m| m.table_name == table)
    }

    /// Number of registered models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether no models are registered.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
