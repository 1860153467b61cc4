use crate::AnchorRole;

/// Why an anchor detector produced no anchors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AnchorError {
    #[error("fiducials missing at {}", join_roles(.missing))]
    FiducialsMissing { missing: Vec<AnchorRole> },
    #[error("template has no fiducial layout")]
    NoFiducialLayout,
    #[error("text anchors insufficient ({found} found, {required} required)")]
    InsufficientTextAnchors { found: usize, required: usize },
    #[error("template has no row-anchor layout")]
    NoRowLayout,
    #[error("template is not registered for exact fiducial alignment")]
    RegistrationUnavailable,
    #[error("fiducials do not define a valid registration")]
    DegenerateRegistration,
    #[error("option pattern too sparse ({found} candidates, {required} required)")]
    PatternTooSparse { found: usize, required: usize },
}

fn join_roles(roles: &[AnchorRole]) -> String {
    roles
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
