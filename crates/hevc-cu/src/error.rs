use thiserror::Error;

/// Errors surfaced by the CU analysis core.
///
/// Collaborator failures pass through unchanged; the core never catches and
/// continues. Assertion-class defects (a CTU finishing without a finite-cost
/// decision) are not represented here, they abort the process with a
/// diagnostic naming the CTU address and depth.
#[derive(Debug, Error)]
pub enum CuError {
    /// The configuration was rejected at initialization.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// An external collaborator failed.
    #[error("collaborator failure: {0}")]
    Service(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl CuError {
    /// Wrap a collaborator error for pass-through propagation.
    pub fn service<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CuError::Service(Box::new(err))
    }
}
