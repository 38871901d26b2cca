use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection rejected: {0}")]
    ConnectionRejected(String),

    #[error("Client already connected: {0}")]
    DuplicateClient(String),

    #[error("Negotiation failed for {client_id}: {reason}")]
    NegotiationError { client_id: String, reason: String },

    #[error("Candidate rejected for {client_id}: {reason}")]
    CandidateError { client_id: String, reason: String },

    #[error("Offer already negotiated for {0}")]
    DuplicateOffer(String),

    #[error("Relay to {0} dropped")]
    RelayDropped(String),

    #[error("Encoder process fault: {0}")]
    SubprocessFault(String),

    #[error("Media stream write failed: {0}")]
    StreamWriteFault(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn negotiation(client_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::NegotiationError {
            client_id: client_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn candidate(client_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::CandidateError {
            client_id: client_id.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
