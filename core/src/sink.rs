//! Typed application of overrides to the process-wide identity state.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::PoisonError;
use std::sync::RwLock;

use crate::error::ApplyError;
use crate::profile::Override;
use crate::profile::OverrideKey;
use crate::profile::Profile;
use crate::profile::ProfileId;

/// Receives overrides one at a time.
///
/// Implementations write into whatever holds the host's build identity. A
/// failure for one key must not prevent later keys from being applied;
/// [`apply_profile`] relies on that.
pub trait OverrideSink: Send + Sync {
    fn apply(&self, value: &Override) -> Result<(), ApplyError>;
}

/// Result of applying one profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub profile: ProfileId,
    pub applied: Vec<OverrideKey>,
    pub failed: Vec<ApplyError>,
}

impl ApplyReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Apply every override of `profile`. Failed keys are logged and skipped.
pub fn apply_profile(sink: &dyn OverrideSink, profile: &Profile) -> ApplyReport {
    let mut report = ApplyReport {
        profile: profile.id(),
        applied: Vec::with_capacity(profile.len()),
        failed: Vec::new(),
    };

    for value in profile.iter() {
        let key = value.key();
        match sink.apply(value) {
            Ok(()) => {
                tracing::debug!(%key, field = %key.target(), value = %value, "set prop");
                report.applied.push(key);
            }
            Err(err) => {
                tracing::error!(%key, error = %err, "failed to set prop");
                report.failed.push(err);
            }
        }
    }

    report
}

/// In-memory build identity holder.
///
/// Stands in for the host's static build fields. Fields can be declared
/// missing to model hosts whose build holder lacks them.
#[derive(Debug, Default)]
pub struct BuildFields {
    values: RwLock<BTreeMap<OverrideKey, Override>>,
    missing: BTreeSet<OverrideKey>,
}

impl BuildFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holder without the given fields; writes to them fail.
    pub fn without_fields(missing: impl IntoIterator<Item = OverrideKey>) -> Self {
        Self {
            values: RwLock::new(BTreeMap::new()),
            missing: missing.into_iter().collect(),
        }
    }

    pub fn get(&self, key: OverrideKey) -> Option<Override> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    /// Copy of every field written so far.
    pub fn snapshot(&self) -> BTreeMap<OverrideKey, Override> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl OverrideSink for BuildFields {
    fn apply(&self, value: &Override) -> Result<(), ApplyError> {
        let key = value.key();
        if self.missing.contains(&key) {
            return Err(ApplyError::TargetFieldMissing {
                key,
                field: key.target().to_string(),
            });
        }
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value.clone());
        Ok(())
    }
}
