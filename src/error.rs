use thiserror::Error;

/// Reasons a run stops before doing its work.
#[derive(Debug, Error)]
pub enum Abort {
    #[error("not a git repository")]
    NotARepository,
    #[error("{0}")]
    Precondition(String),
    /// The operator declined a step the run cannot do without.
    #[error("{0}")]
    Cancelled(String),
}
