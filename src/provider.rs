//! Named resource registry with batch reconciliation

use crate::error::{Error, Result};
use crate::resource::{ReconcileResult, Resource};
use crate::validate::ConfigGetter;
use instance::{InstanceDiff, InstanceState};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// One instance to refresh
#[derive(Debug, Clone)]
pub struct RefreshRequest {
    pub type_name: String,
    pub state: Option<InstanceState>,
}

impl RefreshRequest {
    pub fn new(type_name: impl Into<String>, state: Option<InstanceState>) -> Self {
        Self {
            type_name: type_name.into(),
            state,
        }
    }
}

/// One diff to apply
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    pub type_name: String,
    pub state: Option<InstanceState>,
    pub diff: InstanceDiff,
}

impl ApplyRequest {
    pub fn new(
        type_name: impl Into<String>,
        state: Option<InstanceState>,
        diff: InstanceDiff,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            state,
            diff,
        }
    }
}

/// The resource types one provider manages, keyed by type name
#[derive(Debug)]
pub struct Provider<M = ()> {
    resources: BTreeMap<String, Resource<M>>,
}

impl<M> Default for Provider<M> {
    fn default() -> Self {
        Self {
            resources: BTreeMap::new(),
        }
    }
}

impl<M> Provider<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, type_name: impl Into<String>, resource: Resource<M>) -> Self {
        self.resources.insert(type_name.into(), resource);
        self
    }

    pub fn resource(&self, type_name: &str) -> Option<&Resource<M>> {
        self.resources.get(type_name)
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    fn lookup(&self, type_name: &str) -> Result<&Resource<M>> {
        self.resource(type_name)
            .ok_or_else(|| Error::UnknownResourceType(type_name.to_string()))
    }

    /// Check every registered resource definition, reporting all problems
    pub fn internal_validate(&self) -> Result<()> {
        let problems: Vec<String> = self
            .resources
            .iter()
            .flat_map(|(name, resource)| {
                resource
                    .problems()
                    .into_iter()
                    .map(move |p| format!("{name}: {p}"))
            })
            .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidSchema(problems))
        }
    }

    pub fn apply(
        &self,
        type_name: &str,
        state: Option<&InstanceState>,
        diff: &InstanceDiff,
        meta: &M,
    ) -> ReconcileResult {
        self.lookup(type_name)?.apply(state, diff, meta)
    }

    pub fn refresh(
        &self,
        type_name: &str,
        state: Option<&InstanceState>,
        meta: &M,
    ) -> ReconcileResult {
        self.lookup(type_name)?.refresh(state, meta)
    }

    pub fn validate_resource(
        &self,
        type_name: &str,
        config: &dyn ConfigGetter,
    ) -> Result<(Vec<String>, Vec<anyhow::Error>)> {
        Ok(self.lookup(type_name)?.validate(config))
    }
}

impl<M: Sync> Provider<M> {
    /// Refresh independent instances on up to `jobs` threads.
    ///
    /// Results come back in request order.
    pub fn refresh_all(
        &self,
        requests: &[RefreshRequest],
        meta: &M,
        jobs: usize,
    ) -> Result<Vec<ReconcileResult>> {
        log::info!("Refreshing {} instance(s) with {jobs} job(s)", requests.len());
        let pool = thread_pool(jobs)?;
        Ok(pool.install(|| {
            requests
                .par_iter()
                .map(|r| self.refresh(&r.type_name, r.state.as_ref(), meta))
                .collect()
        }))
    }

    /// Apply independent diffs on up to `jobs` threads.
    ///
    /// Results come back in request order.
    pub fn apply_all(
        &self,
        requests: &[ApplyRequest],
        meta: &M,
        jobs: usize,
    ) -> Result<Vec<ReconcileResult>> {
        log::info!("Applying {} diff(s) with {jobs} job(s)", requests.len());
        let pool = thread_pool(jobs)?;
        Ok(pool.install(|| {
            requests
                .par_iter()
                .map(|r| self.apply(&r.type_name, r.state.as_ref(), &r.diff, meta))
                .collect()
        }))
    }
}

fn thread_pool(jobs: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| Error::ThreadPool(e.to_string()))
}
