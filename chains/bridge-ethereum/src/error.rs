use ethers::providers::{ProviderError, WsClientError};

use bridge_core::ChainCommunicationError;

/// Errors establishing a connection to a chain
#[derive(Debug, thiserror::Error)]
pub enum EthereumProviderConnectionError {
    /// Websocket handshake failed
    #[error("failed to connect to {url}: {source}")]
    Connect {
        /// Endpoint
        url: String,
        /// Underlying transport error
        #[source]
        source: WsClientError,
    },
    /// Initial RPC request failed
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// The node serves a different chain than configured
    #[error("chain ID mismatch: expected {expected}, node reports {actual}")]
    ChainIdMismatch {
        /// Configured chain id
        expected: u64,
        /// Chain id reported by the node
        actual: u64,
    },
}

const REPLACEMENT_UNDERPRICED: &str = "replacement transaction underpriced";
const NONCE_TOO_LOW: &str = "nonce too low";

/// Map a provider error onto the relayer error taxonomy. Nodes only report
/// nonce conflicts through the error message, so this matches on it.
pub fn classify_provider_error(err: ProviderError) -> ChainCommunicationError {
    let message = err.to_string();
    let lowercase = message.to_lowercase();
    if lowercase.contains(REPLACEMENT_UNDERPRICED) {
        ChainCommunicationError::ReplacementUnderpriced(message)
    } else if lowercase.contains(NONCE_TOO_LOW) {
        ChainCommunicationError::NonceTooLow(message)
    } else {
        ChainCommunicationError::from_other(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_nonce_conflicts() {
        let err = classify_provider_error(ProviderError::CustomError(
            "nonce too low: next nonce 7, tx nonce 6".into(),
        ));
        assert!(matches!(err, ChainCommunicationError::NonceTooLow(_)));

        let err = classify_provider_error(ProviderError::CustomError(
            "Replacement transaction underpriced".into(),
        ));
        assert!(matches!(
            err,
            ChainCommunicationError::ReplacementUnderpriced(_)
        ));
    }

    #[test]
    fn other_errors_keep_their_message() {
        let err = classify_provider_error(ProviderError::CustomError(
            "insufficient funds for gas * price + value".into(),
        ));
        assert!(matches!(err, ChainCommunicationError::Other(_)));
        assert!(err.to_string().contains("insufficient funds"));
    }
}
