//! Strongly-typed identifiers for Tributary entities.
//!
//! Explicit types prevent bugs from mixing up a stream's instance-local id
//! with its label fingerprint, or a tenant key with a label string.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Macro to generate strongly-typed u64 wrappers.
///
/// Each type wraps a u64 and provides:
/// - Type safety (can't mix `StreamId` with `Fingerprint`)
/// - Debug/Display formatting (decimal or zero-padded hex)
/// - Zero-cost abstraction (same as raw u64)
macro_rules! define_id {
    ($name:ident, $prefix:expr, $doc:expr) => {
        define_id!(@common $name, $doc);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }
    };
    (hex $name:ident, $prefix:expr, $doc:expr) => {
        define_id!(@common $name, $doc);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:016x})", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:016x}", self.0)
            }
        }
    };
    (@common $name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new value from a raw u64.
            #[inline]
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw u64 value.
            #[inline]
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.get()
            }
        }
    };
}

define_id!(StreamId, "stream", "Instance-local identifier for a stream, assigned at creation.");
define_id!(hex Fingerprint, "fp", "64-bit hash of a canonical label set. Distinct label sets may collide.");

impl StreamId {
    /// Returns the next ID in sequence.
    ///
    /// # Panics
    /// Panics if the ID would overflow.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        assert!(self.0 < u64::MAX, "ID overflow");
        Self(self.0 + 1)
    }
}

/// Identity of a tenant (an isolated customer namespace).
///
/// Cheap to clone; the key is shared behind an `Arc`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TenantId(Arc<str>);

impl TenantId {
    /// Creates a tenant identity from its key.
    #[must_use]
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// Returns the tenant key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tenant({})", self.0)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TenantId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TenantId {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for TenantId {
    fn from(key: String) -> Self {
        Self(Arc::from(key))
    }
}
