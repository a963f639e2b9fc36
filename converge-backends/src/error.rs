use converge_types::decl::Identity;
use thiserror::Error;

use crate::render::RenderError;

/// Apply-time failure. Every variant names the offending resource so a
/// partial run report can point at the exact declaration that stopped it.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("{identity}: source `{uri}` unavailable: {reason}")]
    SourceUnavailable {
        identity: Identity,
        uri: String,
        reason: String,
    },

    #[error("{identity}: template render failed: {reason}")]
    Render {
        identity: Identity,
        #[source]
        reason: RenderError,
    },

    #[error("{identity}: service manager rejected `{operation}`: {reason}")]
    ServiceControl {
        identity: Identity,
        operation: String,
        reason: String,
    },

    #[error("{identity}: {source}")]
    Io {
        identity: Identity,
        #[source]
        source: anyhow::Error,
    },
}

impl ApplyError {
    /// The resource this failure belongs to.
    pub fn identity(&self) -> &Identity {
        match self {
            ApplyError::SourceUnavailable { identity, .. }
            | ApplyError::Render { identity, .. }
            | ApplyError::ServiceControl { identity, .. }
            | ApplyError::Io { identity, .. } => identity,
        }
    }

    pub(crate) fn io(identity: &Identity, source: anyhow::Error) -> Self {
        ApplyError::Io {
            identity: identity.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_types::decl::ResourceKind;

    #[test]
    fn errors_carry_the_offending_identity() {
        let identity = Identity::new(ResourceKind::Service, "app");
        let err = ApplyError::ServiceControl {
            identity: identity.clone(),
            operation: "restart".to_string(),
            reason: "unit not found".to_string(),
        };
        assert_eq!(err.identity(), &identity);
        assert!(err.to_string().contains("service:app"));
        assert!(err.to_string().contains("restart"));
    }
}
