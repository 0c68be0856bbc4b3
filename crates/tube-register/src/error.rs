use thiserror::Error;

/// Register-level failures. Reads never fail (an absent key is `None`);
/// only mailbox loss surfaces as an error.
#[derive(Debug, Clone, Error)]
pub enum RegisterError {
    #[error("register actor is no longer running")]
    Unavailable,
}
