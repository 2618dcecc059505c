//! # trellis-query
//!
//! Relation resolution for the Trellis ORM.
//!
//! This crate provides:
//! - Model and relation declarations (`hasOne`, `hasMany`, `belongsTo`,
//!   `belongsToMany`, `morphOne`, `morphMany`, `morphTo`)
//! - Relation placeholders built for one owner or for a batch of parents
//! - Constraint building that turns a relation into filters and joins
//! - Eager loading of dotted relation paths with one query per relation and level
//! - Matching of fetched rows back onto their parents
//! - Attach/detach of many-to-many join-table rows
//!
//! The data store is reached only through the [`QueryEngine`] trait.
//!
//! ## Declaring models
//!
//! ```rust
//! use trellis_query::{ModelDef, RelationDecl, Schema};
//!
//! let schema = Schema::new()
//!     .register(
//!         ModelDef::new("Site", "sites")
//!             .with_relation("blogs", RelationDecl::has_many("Blog"))
//!             .with_relation("photos", RelationDecl::morph_many("Photo", "imageable")),
//!     )
//!     .register(ModelDef::new("Blog", "blogs").with_relation("site", RelationDecl::belongs_to("Site")))
//!     .register(
//!         ModelDef::new("Photo", "photos")
//!             .with_relation("imageable", RelationDecl::morph_to("imageable", ["Site"])),
//!     );
//!
//! assert_eq!(schema.len(), 3);
//! ```
//!
//! ## Building relations
//!
//! ```rust
//! use trellis_query::{LoadMode, ModelDef, Record, RelationBuilder, RelationDecl, Schema, row};
//!
//! let schema = Schema::new()
//!     .register(ModelDef::new("Site", "sites").with_relation("blogs", RelationDecl::has_many("Blog")))
//!     .register(ModelDef::new("Blog", "blogs"));
//! let site = Record::with_attributes(schema.model("Site")?, row! { "id" => 1 });
//!
//! let blogs = RelationBuilder::new(&schema, LoadMode::Instance).build(&site, "blogs")?;
//! assert!(blogs.is_many());
//! # Ok::<(), trellis_query::QueryError>(())
//! ```
//!
//! ## Filters
//!
//! ```rust
//! use trellis_query::{Filter, FilterValue};
//!
//! let filter = Filter::and([
//!     Filter::in_list("site_id", vec![FilterValue::Int(1), FilterValue::Int(2)]),
//!     Filter::equals("imageable_type", "sites"),
//! ]);
//! let (sql, params) = filter.to_sql(0);
//! assert_eq!(sql, "(site_id IN ($1, $2) AND imageable_type = $3)");
//! assert_eq!(params.len(), 3);
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use trellis_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::missing_relation_key("site_id", "site");
//! assert_eq!(err.code, ErrorCode::MissingRelationKey);
//! assert_eq!(err.to_string(), "[P1005] The site_id must be specified.");
//! ```

pub mod concurrent;
pub mod env;
pub mod error;
pub mod filter;
pub mod logging;
#[macro_use]
pub mod macros;
pub mod model;
pub mod query;
pub mod record;
pub mod relations;
pub mod row;
pub mod traits;
pub mod transaction;

pub use concurrent::{ConcurrencyConfig, ConcurrentExecutor, ExecutionStats};
pub use env::{EnvSource, MapEnvSource, StdEnvSource};
pub use error::{ErrorCode, ErrorContext, QueryError, QueryResult, Suggestion};
pub use filter::{Filter, FilterValue, MatchKey};
pub use model::{ModelDef, Schema};
pub use query::{Join, SelectQuery};
pub use record::{Collection, Record, Related, Relational};
pub use relations::{
    ConstraintBuilder, Correlation, EagerPlan, FetchOptions, LoadMode, PivotColumn, PivotItem,
    PivotManager, PlanNode, RelationBuilder, RelationDecl, RelationDescriptor, RelationKind,
    RelationLoader, RelationType, ResponseMatcher,
};
pub use row::{Row, RowExt};
pub use traits::{BoxFuture, QueryEngine};
pub use transaction::TransactionContext;

// Re-export logging utilities
pub use logging::{
    get_log_format, get_log_level, init as init_logging, init_debug, init_with_level,
    is_debug_enabled,
};

// Used by the logging macros
#[doc(hidden)]
pub use tracing;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::filter::{Filter, FilterValue};
    pub use crate::model::{ModelDef, Schema};
    pub use crate::record::{Collection, Record, Related, Relational};
    pub use crate::relations::{FetchOptions, PivotItem, RelationDecl, RelationLoader};
    pub use crate::row::{Row, RowExt};
    pub use crate::traits::QueryEngine;
    pub use crate::row;
    pub use crate::transaction::TransactionContext;
}
