//! # Trellis
//!
//! Relation loading for a record-oriented ORM.
//!
//! Trellis provides:
//! - Declarative relations between models: one-to-one, one-to-many,
//!   many-to-one, many-to-many through a join table, and polymorphic variants
//! - Eager loading of nested relation paths such as `"authors.ownPosts"`
//!   with one batched query per relation and level
//! - Attach/detach of join-table rows, including extra pivot columns
//! - A narrow [`QueryEngine`] seam to plug in any data store
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trellis_orm::prelude::*;
//!
//! let schema = Schema::new()
//!     .register(
//!         ModelDef::new("Site", "sites")
//!             .with_relation("blogs", RelationDecl::has_many("Blog"))
//!             .with_relation("authors", RelationDecl::has_many("Author")),
//!     )
//!     .register(ModelDef::new("Blog", "blogs").with_relation("posts", RelationDecl::has_many("Post")))
//!     .register(ModelDef::new("Author", "authors"))
//!     .register(ModelDef::new("Post", "posts"));
//!
//! #[tokio::main]
//! async fn main() -> Result<(), QueryError> {
//!     trellis_orm::init_logging();
//!     let loader = RelationLoader::new(MyEngine::connect().await?, schema);
//!
//!     let mut sites = Collection::new(loader.schema().model("Site")?);
//!     loader
//!         .fetch_collection(&mut sites, &FetchOptions::new().with_related(["blogs.posts", "authors"]))
//!         .await?;
//!
//!     println!("{}", sites.to_json());
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Relation declaration, building, eager loading and pivot management.
pub mod query {
    pub use trellis_query::*;
}

/// Relation types and operations.
pub mod relations {
    pub use trellis_query::relations::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use trellis_query::prelude::*;
}

// Re-export key types at the crate root
pub use trellis_query::{
    Collection, FetchOptions, ModelDef, QueryEngine, QueryError, QueryResult, Record, Related,
    RelationDecl, RelationLoader, Schema, init_logging,
};
