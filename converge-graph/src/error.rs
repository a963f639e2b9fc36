use converge_types::decl::Identity;
use thiserror::Error;

/// Structural plan rejection. All variants fail closed: a plan that produces
/// any of these is refused before a single resource is touched.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("duplicate resource identity `{identity}`")]
    DuplicateIdentity { identity: Identity },

    #[error("dependency cycle involving: {}", join_identities(identities))]
    Cycle { identities: Vec<Identity> },

    #[error("`{referenced_by}` references `{identity}`, which is not declared in the plan")]
    UnknownReference {
        identity: Identity,
        referenced_by: Identity,
    },

    #[error("`{referenced_by}` notifies `{target}`, which is not a service")]
    NotifyTarget {
        target: Identity,
        referenced_by: Identity,
    },
}

fn join_identities(identities: &[Identity]) -> String {
    identities
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
