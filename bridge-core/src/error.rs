use std::any::Any;
use std::error::Error as StdError;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;

use crate::H256;

/// The result of interacting with a chain.
pub type ChainResult<T> = Result<T, ChainCommunicationError>;

/// The result of reading or writing one of the relayer stores.
pub type StoreResult<T> = Result<T, StoreError>;

/// An "Any"-typed error.
pub trait BridgeCustomError: StdError + Send + Sync + Any {}

impl<E: StdError + Send + Sync + Any> BridgeCustomError for E {}

/// Thin wrapper around a boxed BridgeCustomError; required to satisfy
/// AsDynError implementations. Basically a trait-object adaptor.
#[repr(transparent)]
pub struct BridgeCustomErrorWrapper(Box<dyn BridgeCustomError>);

impl Debug for BridgeCustomErrorWrapper {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", AsRef::<dyn BridgeCustomError>::as_ref(&self))
    }
}

impl Display for BridgeCustomErrorWrapper {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", AsRef::<dyn BridgeCustomError>::as_ref(&self))
    }
}

impl StdError for BridgeCustomErrorWrapper {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl AsRef<dyn BridgeCustomError> for BridgeCustomErrorWrapper {
    fn as_ref(&self) -> &dyn BridgeCustomError {
        self.0.as_ref()
    }
}

impl Deref for BridgeCustomErrorWrapper {
    type Target = Box<dyn BridgeCustomError>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug)]
#[repr(transparent)]
struct StringError(String);

impl Display for StringError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for StringError {}

/// ChainCommunicationError contains errors returned when attempting to
/// call a chain or dispatch a transaction
#[derive(Debug, thiserror::Error)]
pub enum ChainCommunicationError {
    /// The node already knows a transaction with the same nonce and an
    /// equal or higher gas price
    #[error("replacement transaction underpriced: {0}")]
    ReplacementUnderpriced(String),
    /// The nonce of the broadcast transaction was already used
    #[error("nonce too low: {0}")]
    NonceTooLow(String),
    /// No client is configured for the chain
    #[error("unsupported chain ID: {0}")]
    UnsupportedChain(u64),
    /// The live log subscription ended
    #[error("log subscription closed")]
    SubscriptionClosed,
    /// Failed to decode or encode a bridge payload
    #[error(transparent)]
    BridgeProtocolError(#[from] BridgeProtocolError),
    /// Any other error; does not implement `From` to prevent
    /// conflicting/absorbing other errors.
    #[error(transparent)]
    Other(BridgeCustomErrorWrapper),
}

impl ChainCommunicationError {
    /// Create a chain communication error from any other existing error
    pub fn from_other<E: BridgeCustomError>(err: E) -> Self {
        Self::Other(BridgeCustomErrorWrapper(Box::new(err)))
    }

    /// Creates a chain communication error of the other error variant from a string
    pub fn from_other_str(err: impl Into<String>) -> Self {
        Self::from_other(StringError(err.into()))
    }

    /// True if broadcasting failed because the nonce is already in use by
    /// another pending or mined transaction.
    pub fn is_nonce_conflict(&self) -> bool {
        matches!(
            self,
            Self::ReplacementUnderpriced(_) | Self::NonceTooLow(_)
        )
    }
}

/// Errors decoding logs emitted by the bridge contract or encoding calls
/// against it
#[derive(Debug, thiserror::Error)]
pub enum BridgeProtocolError {
    /// The first topic does not match any event this processor handles
    #[error("unknown topic {0:?}")]
    UnknownTopic(H256),
    /// Logs without a signature topic cannot be dispatched
    #[error("anonymous events are not supported")]
    AnonymousEvent,
    /// ABI decoding failed
    #[error("failed to decode {event}: {reason}")]
    Decode {
        /// The event or tuple being decoded
        event: &'static str,
        /// Underlying codec error
        reason: String,
    },
}

/// Errors returned by the tx, cursor and price stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Update of a record that does not exist
    #[error("record not found: {0}")]
    NotFound(String),
    /// A stored value could not be (de)serialized
    #[error("failed to (de)serialize record: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Backend specific failure
    #[error(transparent)]
    Other(BridgeCustomErrorWrapper),
}

impl StoreError {
    /// Create a store error from a backend error
    pub fn from_other<E: BridgeCustomError>(err: E) -> Self {
        Self::Other(BridgeCustomErrorWrapper(Box::new(err)))
    }
}
