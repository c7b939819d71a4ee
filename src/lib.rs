//! # Provkit
//!
//! The reconciliation core of a resource provider: schemas, typed access
//! to flattened state, and the engine that turns a planned diff into a new
//! authoritative state.
//!
//! ## Core Concepts
//!
//! - **SchemaMap**: the fields of a resource type and their [`FieldType`]s,
//!   built in code or loaded from TOML
//! - **ResourceData**: what lifecycle callbacks read and write, layered
//!   over the last known state and the pending diff
//! - **Resource**: a schema plus create/read/update/delete callbacks;
//!   [`Resource::apply`] and [`Resource::refresh`] drive an instance
//! - **Provider**: named resources, reconciled one at a time or in
//!   parallel batches
//!
//! ## Example
//!
//! ```
//! use provkit::{AttrDiff, FieldType, InstanceDiff, Resource, Schema, SchemaMap};
//!
//! let server: Resource = Resource::new(
//!     SchemaMap::new().with("size", Schema::optional(FieldType::Int)),
//! )
//! .with_create(|d, _| {
//!     d.set_id("srv-1");
//!     Ok(())
//! })
//! .with_update(|_, _| Ok(()));
//!
//! let diff = InstanceDiff::new().with_attribute("size", AttrDiff::new("2"));
//! let state = server.apply(None, &diff, &()).unwrap().unwrap();
//!
//! assert_eq!(state.id, "srv-1");
//! assert_eq!(state.attributes.get("size"), Some("2"));
//! ```

pub mod codec;
pub mod data;
pub mod error;
pub mod logging;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod validate;
pub mod value;

pub use data::ResourceData;
pub use error::{Error, Operation, ReconcileError, Result};
pub use instance::{AttrDiff, DiffSummary, FlatMap, InstanceDiff, InstanceState};
pub use provider::{ApplyRequest, Provider, RefreshRequest};
pub use resource::{
    CrudFn, ExistsFn, ReconcileResult, Resource, StateMigrateFn, internal_validate,
};
pub use schema::{FieldType, Schema, SchemaMap};
pub use validate::{
    ConfigGetter, FieldValidateFn, ResourceConfig, ResourceValidateFn, UNKNOWN_VALUE,
    compose_resource_validate_fn, int_between, string_in_slice, string_matches, validate_config,
    validate_field,
};
pub use value::Value;
