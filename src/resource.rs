//! The resource engine: apply a diff, refresh from the real world, validate

use crate::data::ResourceData;
use crate::error::{Error, Operation, ReconcileError, Result};
use crate::schema::SchemaMap;
use crate::validate::{self, ConfigGetter, ResourceValidateFn};
use instance::{DiffSummary, ID_ATTRIBUTE, InstanceDiff, InstanceState};
use std::fmt;

/// Create, read, update or delete callback
pub type CrudFn<M> =
    Box<dyn Fn(&mut ResourceData<'_>, &M) -> anyhow::Result<()> + Send + Sync>;

/// Reports whether the instance still exists, before reading it
pub type ExistsFn<M> = Box<dyn Fn(&ResourceData<'_>, &M) -> anyhow::Result<bool> + Send + Sync>;

/// Upgrades state written with an older schema version
pub type StateMigrateFn<M> =
    Box<dyn Fn(u64, InstanceState, &M) -> anyhow::Result<InstanceState> + Send + Sync>;

/// Outcome of an apply or refresh. `Ok(None)` means the instance is gone.
pub type ReconcileResult = std::result::Result<Option<InstanceState>, ReconcileError>;

/// A managed resource type: its schema plus the callbacks that act on it.
///
/// `M` is the provider context handed to every callback untouched. A
/// resource is built once when the provider is assembled and is only read
/// afterwards.
pub struct Resource<M = ()> {
    pub schema: SchemaMap,

    /// Version of the schema stored state is written with. Bumped whenever
    /// the attribute layout changes, together with `migrate_state`.
    pub schema_version: u64,

    pub create: Option<CrudFn<M>>,
    pub read: Option<CrudFn<M>>,
    pub update: Option<CrudFn<M>>,
    pub delete: Option<CrudFn<M>>,
    pub exists: Option<ExistsFn<M>>,
    pub migrate_state: Option<StateMigrateFn<M>>,

    /// Cross-field validation run after the per-field schema checks
    pub validate: Option<ResourceValidateFn>,
}

impl<M> Default for Resource<M> {
    fn default() -> Self {
        Self {
            schema: SchemaMap::new(),
            schema_version: 0,
            create: None,
            read: None,
            update: None,
            delete: None,
            exists: None,
            migrate_state: None,
            validate: None,
        }
    }
}

impl<M> fmt::Debug for Resource<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("schema", &self.schema)
            .field("schema_version", &self.schema_version)
            .field("create", &self.create.is_some())
            .field("read", &self.read.is_some())
            .field("update", &self.update.is_some())
            .field("delete", &self.delete.is_some())
            .field("exists", &self.exists.is_some())
            .field("migrate_state", &self.migrate_state.is_some())
            .field("validate", &self.validate.is_some())
            .finish()
    }
}

impl<M> Resource<M> {
    pub fn new(schema: SchemaMap) -> Self {
        Self {
            schema,
            ..Default::default()
        }
    }

    pub fn with_schema_version(mut self, version: u64) -> Self {
        self.schema_version = version;
        self
    }

    pub fn with_create<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ResourceData<'_>, &M) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.create = Some(Box::new(f));
        self
    }

    pub fn with_read<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ResourceData<'_>, &M) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.read = Some(Box::new(f));
        self
    }

    pub fn with_update<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ResourceData<'_>, &M) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.update = Some(Box::new(f));
        self
    }

    pub fn with_delete<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ResourceData<'_>, &M) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.delete = Some(Box::new(f));
        self
    }

    pub fn with_exists<F>(mut self, f: F) -> Self
    where
        F: Fn(&ResourceData<'_>, &M) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.exists = Some(Box::new(f));
        self
    }

    pub fn with_migrate_state<F>(mut self, f: F) -> Self
    where
        F: Fn(u64, InstanceState, &M) -> anyhow::Result<InstanceState> + Send + Sync + 'static,
    {
        self.migrate_state = Some(Box::new(f));
        self
    }

    pub fn with_validate(mut self, f: ResourceValidateFn) -> Self {
        self.validate = Some(f);
        self
    }

    // ========================================================================
    // Apply
    // ========================================================================

    /// Drive an instance from `state` through `diff`.
    ///
    /// Destroys first when the diff destroys or forces recreation, then
    /// creates or updates. On failure the error carries whatever state the
    /// callbacks left behind.
    pub fn apply(
        &self,
        state: Option<&InstanceState>,
        diff: &InstanceDiff,
        meta: &M,
    ) -> ReconcileResult {
        let summary = DiffSummary::from_diff(diff);
        log::debug!(
            "Applying {summary} to {}",
            state.map_or("new instance", |s| s.id.as_str())
        );

        let recreate = diff.requires_new();
        if diff.destroy || recreate {
            if let Some(existing) = state.filter(|s| s.exists()) {
                let mut doomed = ResourceData::new(&self.schema, Some(existing), None);
                if let Some(delete) = &self.delete {
                    log::debug!("Deleting {}", existing.id);
                    if let Err(e) = delete(&mut doomed, meta) {
                        return Err(ReconcileError::new(
                            self.stamp(doomed.state()),
                            Error::callback(Operation::Delete, e),
                        ));
                    }
                }
            }

            if !recreate {
                return Ok(None);
            }
        }

        let base = if recreate { None } else { state };
        let mut data = ResourceData::new(&self.schema, base, Some(diff));

        let (operation, result) = if data.id().is_empty() {
            let Some(create) = &self.create else {
                return Err(ReconcileError::stateless(Error::MissingCallback(
                    Operation::Create,
                )));
            };
            (Operation::Create, create(&mut data, meta))
        } else {
            let Some(update) = &self.update else {
                return Err(ReconcileError::new(
                    state.cloned(),
                    Error::MissingCallback(Operation::Update),
                ));
            };
            (Operation::Update, update(&mut data, meta))
        };

        let new_state = self.stamp(data.state());
        match result {
            Ok(()) => {
                log::debug!(
                    "{operation} finished for {}",
                    new_state.as_ref().map_or("<gone>", |s| s.id.as_str())
                );
                Ok(new_state)
            }
            Err(e) => Err(ReconcileError::new(new_state, Error::callback(operation, e))),
        }
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Re-read an instance from the real world.
    ///
    /// State written with an older schema version is migrated first.
    /// Returns `Ok(None)` when the instance no longer exists.
    pub fn refresh(&self, state: Option<&InstanceState>, meta: &M) -> ReconcileResult {
        let Some(state) = state.filter(|s| s.exists()) else {
            return Ok(None);
        };
        log::debug!("Refreshing {}", state.id);

        if let Some(exists) = &self.exists {
            let data = ResourceData::new(&self.schema, Some(state), None);
            match exists(&data, meta) {
                Ok(true) => {}
                Ok(false) => {
                    log::debug!("{} no longer exists", state.id);
                    return Ok(None);
                }
                Err(e) => {
                    return Err(ReconcileError::new(
                        Some(state.clone()),
                        Error::callback(Operation::Exists, e),
                    ));
                }
            }
        }

        let stored_version = state
            .schema_version()
            .map_err(|e| ReconcileError::new(Some(state.clone()), e.into()))?;

        let mut working = state.clone();
        if stored_version < self.schema_version
            && let Some(migrate) = &self.migrate_state
        {
            log::debug!(
                "Migrating {} from schema version {stored_version} to {}",
                state.id,
                self.schema_version
            );
            working = migrate(stored_version, working, meta).map_err(|source| {
                ReconcileError::stateless(Error::Migration {
                    from: stored_version,
                    source,
                })
            })?;
        }

        let Some(read) = &self.read else {
            return Err(ReconcileError::new(
                Some(state.clone()),
                Error::MissingCallback(Operation::Read),
            ));
        };

        let mut data = ResourceData::new(&self.schema, Some(&working), None);
        read(&mut data, meta)
            .map_err(|e| ReconcileError::stateless(Error::callback(Operation::Read, e)))?;

        Ok(self.stamp(data.state()))
    }

    fn stamp(&self, state: Option<InstanceState>) -> Option<InstanceState> {
        state.map(|mut s| {
            s.record_schema_version(self.schema_version);
            s
        })
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Check a configuration against the schema, then run the resource's
    /// own validation. Returns warnings and errors.
    pub fn validate(&self, config: &dyn ConfigGetter) -> (Vec<String>, Vec<anyhow::Error>) {
        let (mut warnings, mut errors) = validate::validate_config(&self.schema, config);
        if let Some(validate) = &self.validate {
            let (w, e) = validate(config);
            warnings.extend(w);
            errors.extend(e);
        }
        (warnings, errors)
    }

    /// Static checks a provider runs over its own resource definitions
    pub fn internal_validate(&self) -> Result<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidSchema(problems))
        }
    }

    pub(crate) fn problems(&self) -> Vec<String> {
        let mut problems = self.schema.problems();

        if self.schema.get(ID_ATTRIBUTE).is_some() {
            problems.push(format!("{ID_ATTRIBUTE}: reserved field name"));
        }

        let updatable: Vec<&str> = self
            .schema
            .iter()
            .filter(|(_, s)| s.is_updatable())
            .map(|(name, _)| name.as_str())
            .collect();
        match (&self.update, updatable.is_empty()) {
            (None, false) => problems.push(format!(
                "update is not defined, set force_new on: {}",
                updatable.join(", ")
            )),
            (Some(_), true) => problems.push(
                "update is defined but every field is force_new or computed-only".to_string(),
            ),
            _ => {}
        }

        problems
    }
}

/// Validate a resource definition that may be missing altogether
pub fn internal_validate<M>(resource: Option<&Resource<M>>) -> Result<()> {
    resource.ok_or(Error::MissingResource)?.internal_validate()
}
