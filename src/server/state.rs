use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use thiserror::Error;

use crate::common::data::{PathPolicy, PolicyPatch};

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("no policy registered for path '{0}'")]
    UnknownPath(String),
}

/// Shared mapping from path to [`PathPolicy`]. Keys are never removed.
///
/// Every method returns owned snapshots, so a caller never observes a policy while a patch
/// is half applied.
pub trait PolicyStore {
    /// Returns the policy for `path`, registering an empty one first if there is none.
    fn fetch_or_create(&self, path: &str) -> PathPolicy;

    fn lookup(&self, path: &str) -> Option<PathPolicy>;

    /// Merges `patch` into an existing policy. Unknown paths are left unregistered.
    fn patch(&self, path: &str, patch: PolicyPatch) -> Result<PathPolicy, Error>;

    fn paths(&self) -> Vec<String>;

    fn snapshot(&self) -> BTreeMap<String, PathPolicy>;
}

#[derive(Default)]
pub struct InMemoryPolicyStore {
    policies: Mutex<BTreeMap<String, PathPolicy>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn policies(&self) -> MutexGuard<'_, BTreeMap<String, PathPolicy>> {
        // A panic while holding the lock cannot leave a policy half merged, because
        // `PathPolicy::apply` only assigns fields.
        self.policies.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn fetch_or_create(&self, path: &str) -> PathPolicy {
        let mut policies = self.policies();

        policies
            .entry(path.to_string())
            .or_insert_with(|| {
                tracing::debug!("Registering policy for path {}", path);
                PathPolicy::new(path)
            })
            .clone()
    }

    fn lookup(&self, path: &str) -> Option<PathPolicy> {
        self.policies().get(path).cloned()
    }

    fn patch(&self, path: &str, patch: PolicyPatch) -> Result<PathPolicy, Error> {
        let mut policies = self.policies();

        let policy = policies
            .get_mut(path)
            .ok_or_else(|| Error::UnknownPath(path.to_string()))?;

        tracing::debug!("Patching policy for path {}: {:?}", path, patch);
        policy.apply(patch);

        Ok(policy.clone())
    }

    fn paths(&self) -> Vec<String> {
        self.policies().keys().cloned().collect()
    }

    fn snapshot(&self) -> BTreeMap<String, PathPolicy> {
        self.policies().clone()
    }
}
