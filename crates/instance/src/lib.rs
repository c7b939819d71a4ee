//! # Instance
//!
//! State and diff types for a single managed resource instance.
//!
//! ## Core Concepts
//!
//! - **InstanceState**: the last known attributes of a real-world instance,
//!   flattened into a [`FlatMap`], plus metadata such as the schema version
//! - **InstanceDiff**: the planned delta for an instance, either a destroy
//!   marker or per-attribute changes ([`AttrDiff`])
//! - **Overlay**: what the attributes look like once a diff is laid over
//!   the base state
//!
//! Both types serialize to the JSON wire format shared with planners and
//! state stores:
//!
//! ```text
//! {"id": "i-123", "attributes": {"id": "i-123", "size": "2"}, "meta": {"schema_version": "1"}}
//! {"destroy": false, "attributes": {"size": {"old": "2", "new": "4", "requires_new": false, "new_computed": false}}}
//! ```
//!
//! ## Example
//!
//! ```
//! use instance::{AttrDiff, InstanceDiff, InstanceState};
//!
//! let state = InstanceState::new("i-123").with_attribute("size", "2");
//! let diff = InstanceDiff::new().with_attribute("size", AttrDiff::change("2", "4"));
//!
//! let overlay = diff.overlay(&state.attributes, "size");
//! assert_eq!(overlay.attributes.get("size"), Some("4"));
//! assert!(!diff.requires_new());
//! ```

mod diff;
mod error;
mod state;

pub use diff::{AttrDiff, DiffSummary, InstanceDiff, Overlay};
pub use error::{Error, Result};
pub use flatmap::FlatMap;
pub use state::{ID_ATTRIBUTE, InstanceState, SCHEMA_VERSION_KEY};
