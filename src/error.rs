use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed oracle response: {0}")]
    OracleResponse(String),

    #[error("contract load error: {0}")]
    ContractLoad(String),

    #[error("insufficient funds: {available} sats available, {required} required")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("unknown contract method: {0}")]
    UnknownMethod(String),

    #[error("invalid arguments for method {method}: {reason}")]
    InvalidMethodArgs { method: String, reason: String },

    #[error("preimage computation failed: {0}")]
    PreimageComputation(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("wallet identity not initialized")]
    NoIdentity,

    #[error("no contract bound to this session")]
    NoContract,

    #[error("script error: {0}")]
    Script(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Tag of an [`Error`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidKeyMaterial,
    Network,
    OracleResponse,
    ContractLoad,
    InsufficientFunds,
    UnknownMethod,
    InvalidMethodArgs,
    PreimageComputation,
    Signing,
    NoIdentity,
    NoContract,
    Script,
    Config,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidKeyMaterial(_) => ErrorKind::InvalidKeyMaterial,
            Error::Network(_) => ErrorKind::Network,
            Error::OracleResponse(_) => ErrorKind::OracleResponse,
            Error::ContractLoad(_) => ErrorKind::ContractLoad,
            Error::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Error::UnknownMethod(_) => ErrorKind::UnknownMethod,
            Error::InvalidMethodArgs { .. } => ErrorKind::InvalidMethodArgs,
            Error::PreimageComputation(_) => ErrorKind::PreimageComputation,
            Error::Signing(_) => ErrorKind::Signing,
            Error::NoIdentity => ErrorKind::NoIdentity,
            Error::NoContract => ErrorKind::NoContract,
            Error::Script(_) => ErrorKind::Script,
            Error::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::OracleResponse(e.to_string())
        } else {
            Error::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            Error::InsufficientFunds {
                available: 10,
                required: 50
            }
            .kind(),
            ErrorKind::InsufficientFunds
        );
        assert_eq!(Error::UnknownMethod("x".into()).kind(), ErrorKind::UnknownMethod);
        assert_eq!(Error::NoIdentity.kind(), ErrorKind::NoIdentity);
    }

    #[test]
    fn insufficient_funds_message() {
        let e = Error::InsufficientFunds {
            available: 10,
            required: 50,
        };
        assert_eq!(
            e.to_string(),
            "insufficient funds: 10 sats available, 50 required"
        );
    }
}
