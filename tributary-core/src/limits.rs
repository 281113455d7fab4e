//! Per-tenant limits.
//!
//! Every tenant-facing resource has an explicit maximum. These are the
//! defaults; per-tenant overrides are applied by the ingester's limits
//! source.

use crate::error::{Error, Result};
use crate::labels::LabelSet;

/// Limits applied to a single tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantLimits {
    /// Maximum number of active streams per tenant on this ingester,
    /// before the replica share is applied. `0` disables the limit.
    pub max_local_streams_per_user: u32,
    /// Maximum number of label pairs per stream.
    pub max_label_names_per_series: u32,
    /// Maximum length of a label name in bytes.
    pub max_label_name_length: u32,
    /// Maximum length of a label value in bytes.
    pub max_label_value_length: u32,
}

impl TenantLimits {
    /// Creates limits with safe defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_local_streams_per_user: 10_000,
            max_label_names_per_series: 30,
            max_label_name_length: 1024,
            max_label_value_length: 2048,
        }
    }

    /// Sets the stream-count limit.
    #[must_use]
    pub const fn with_max_local_streams_per_user(mut self, max: u32) -> Self {
        self.max_local_streams_per_user = max;
        self
    }

    /// Validates that all limits are usable.
    ///
    /// # Errors
    /// Returns an error if a label limit is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_label_names_per_series == 0 {
            return Err(Error::InvalidArgument {
                name: "max_label_names_per_series",
                reason: "must be positive",
            });
        }
        if self.max_label_name_length == 0 {
            return Err(Error::InvalidArgument {
                name: "max_label_name_length",
                reason: "must be positive",
            });
        }
        if self.max_label_value_length == 0 {
            return Err(Error::InvalidArgument {
                name: "max_label_value_length",
                reason: "must be positive",
            });
        }
        Ok(())
    }

    /// Checks a label set against the label limits.
    ///
    /// # Errors
    /// Returns `InvalidLabels` naming the first limit the set violates.
    pub fn check_labels(&self, labels: &LabelSet) -> Result<()> {
        let too_long = |len: usize, max: u32| u32::try_from(len).map_or(true, |l| l > max);

        if too_long(labels.len(), self.max_label_names_per_series) {
            return Err(Error::InvalidLabels {
                input: labels.to_string(),
                reason: format!(
                    "{} labels exceeds limit of {}",
                    labels.len(),
                    self.max_label_names_per_series
                ),
            });
        }
        for label in labels.iter() {
            if too_long(label.name.len(), self.max_label_name_length) {
                return Err(Error::InvalidLabels {
                    input: labels.to_string(),
                    reason: format!("label name '{}' too long", label.name),
                });
            }
            if too_long(label.value.len(), self.max_label_value_length) {
                return Err(Error::InvalidLabels {
                    input: labels.to_string(),
                    reason: format!("value of label '{}' too long", label.name),
                });
            }
        }
        Ok(())
    }
}

impl Default for TenantLimits {
    fn default() -> Self {
        Self::new()
    }
}
