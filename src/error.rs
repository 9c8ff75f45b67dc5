use thiserror::Error;

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Solana RPC error: {0}")]
    SolanaRpc(#[from] solana_client::client_error::ClientError),

    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    #[error("account not eligible for reclaim: {0}")]
    NotEligible(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid pubkey: {0}")]
    ParsePubkey(#[from] solana_sdk::pubkey::ParsePubkeyError),

    #[error("invalid signature: {0}")]
    ParseSignature(#[from] solana_sdk::signature::ParseSignatureError),

    #[error("instruction build failed: {0}")]
    Instruction(#[from] solana_program::program_error::ProgramError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WardenError {
    /// Whether a read call that failed with this error is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            WardenError::RateLimited(_) => true,
            WardenError::SolanaRpc(e) => {
                let msg = e.to_string();
                msg.contains("429")
                    || msg.contains("Too Many Requests")
                    || msg.contains("timed out")
                    || msg.contains("connection")
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;
