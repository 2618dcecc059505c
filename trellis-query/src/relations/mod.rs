//! Relation resolution: declaration, building, constraining, eager loading,
//! matching and pivot management.
//!
//! ## Example
//!
//! ```rust,ignore
//! let schema = Schema::new()
//!     .register(
//!         ModelDef::new("Site", "sites")
//!             .with_relation("authors", RelationDecl::has_many("Author"))
//!             .with_relation("admins", RelationDecl::belongs_to_many("Admin").with_pivot(["item"])),
//!     )
//!     .register(
//!         ModelDef::new("Author", "authors")
//!             .with_relation("ownPosts", RelationDecl::has_many("Post").foreign_key("owner_id")),
//!     )
//!     .register(ModelDef::new("Admin", "admins"))
//!     .register(ModelDef::new("Post", "posts"));
//!
//! let loader = RelationLoader::new(engine, schema);
//!
//! // Eager load two levels onto one site
//! let mut site = Record::with_attributes(loader.schema().model("Site")?, row! { "id" => 1 });
//! loader
//!     .fetch_record(&mut site, &FetchOptions::new().with_related(["authors.ownPosts"]))
//!     .await?;
//!
//! // Manage the join table of a many-to-many relation
//! let admins = loader.related(&site, "admins")?;
//! loader.attach(&admins, [1, 2]).await?;
//! loader.detach(&admins, None).await?;
//! ```

mod builder;
mod constraint;
mod loader;
mod matcher;
mod pivot;
mod plan;
mod spec;

pub use builder::{RelationBuilder, key_for};
pub use constraint::ConstraintBuilder;
pub use loader::{FetchOptions, RelationLoader};
pub use matcher::{FetchedGroup, FetchedRelation, ResponseMatcher};
pub use pivot::{PivotItem, PivotManager};
pub use plan::{EagerPlan, LoadState, PlanNode};
pub use spec::{
    Correlation, LoadMode, MorphKeys, PivotColumn, RelationDecl, RelationDescriptor,
    RelationKind, RelationRegistry, RelationType,
};
