use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChallengeError {
    #[error("Invalid fingerprint: expected 32 hexadecimal characters")]
    InvalidFingerprint,

    #[error("Origin not allowed")]
    OriginNotAllowed,

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited {
        retry_after_secs: u64,
        /// Length of the window that was hit
        window_secs: u64,
    },

    #[error("Transaction not found")]
    TransactionNotFound,

    #[error("Secure randomness unavailable: {0}")]
    RandomnessUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ChallengeError>;
