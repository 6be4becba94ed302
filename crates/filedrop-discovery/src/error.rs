//! Discovery subsystem errors.

use thiserror::Error;

/// Errors reported by a [`DiscoveryProvider`](crate::DiscoveryProvider).
///
/// Native DNS-SD error codes collapse into this closed set via
/// [`ProviderError::from_code`]; anything unrecognised is carried through as
/// [`ProviderError::Unknown`] with the raw code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("out of memory")]
    OutOfMemory,

    #[error("bad parameter")]
    BadParameter,

    #[error("service name conflict")]
    NameConflict,

    #[error("operation not supported")]
    Unsupported,

    #[error("blocked by firewall")]
    Firewall,

    #[error("incompatible daemon version")]
    Incompatible,

    #[error("service daemon not running")]
    ServiceNotRunning,

    #[error("unknown provider error (code {0})")]
    Unknown(i32),
}

// kDNSServiceErr_* values from dns_sd.h.
const ERR_NO_MEMORY: i32 = -65539;
const ERR_BAD_PARAM: i32 = -65540;
const ERR_UNSUPPORTED: i32 = -65544;
const ERR_NAME_CONFLICT: i32 = -65548;
const ERR_FIREWALL: i32 = -65550;
const ERR_INCOMPATIBLE: i32 = -65551;
const ERR_SERVICE_NOT_RUNNING: i32 = -65563;

impl ProviderError {
    /// Map a native DNS-SD error code into the taxonomy.
    pub fn from_code(code: i32) -> Self {
        match code {
            ERR_NO_MEMORY => Self::OutOfMemory,
            ERR_BAD_PARAM => Self::BadParameter,
            ERR_UNSUPPORTED => Self::Unsupported,
            ERR_NAME_CONFLICT => Self::NameConflict,
            ERR_FIREWALL => Self::Firewall,
            ERR_INCOMPATIBLE => Self::Incompatible,
            ERR_SERVICE_NOT_RUNNING => Self::ServiceNotRunning,
            other => Self::Unknown(other),
        }
    }
}

/// Hostname resolution failure.
#[derive(Debug, Clone, Error)]
#[error("hostname lookup failed: {reason}")]
pub struct LookupError {
    /// Human-readable failure reason from the resolver.
    pub reason: String,
}

impl LookupError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Top-level discovery errors surfaced to the hosting layer.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_map_to_taxonomy() {
        assert_eq!(ProviderError::from_code(-65539), ProviderError::OutOfMemory);
        assert_eq!(
            ProviderError::from_code(-65540),
            ProviderError::BadParameter
        );
        assert_eq!(
            ProviderError::from_code(-65548),
            ProviderError::NameConflict
        );
        assert_eq!(ProviderError::from_code(-65544), ProviderError::Unsupported);
        assert_eq!(ProviderError::from_code(-65550), ProviderError::Firewall);
        assert_eq!(
            ProviderError::from_code(-65551),
            ProviderError::Incompatible
        );
        assert_eq!(
            ProviderError::from_code(-65563),
            ProviderError::ServiceNotRunning
        );
    }

    #[test]
    fn unknown_code_keeps_raw_value() {
        assert_eq!(
            ProviderError::from_code(-65537),
            ProviderError::Unknown(-65537)
        );
        assert_eq!(ProviderError::from_code(42), ProviderError::Unknown(42));
    }

    #[test]
    fn errors_are_human_readable() {
        assert_eq!(
            ProviderError::NameConflict.to_string(),
            "service name conflict"
        );
        let lookup = LookupError::new("no such host");
        assert_eq!(lookup.to_string(), "hostname lookup failed: no such host");
    }
}
