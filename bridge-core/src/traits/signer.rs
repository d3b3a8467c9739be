use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use auto_impl::auto_impl;

use crate::{Address, ChainResult, Signature, TypedTransaction};

/// Signs transactions for a single chain.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait TxSigner: Send + Sync + Debug {
    /// Address of the signing account
    fn address(&self) -> Address;

    /// Sign an unsigned transaction
    async fn sign_transaction(&self, tx: &TypedTransaction) -> ChainResult<Signature>;
}

/// Produces a signer for a given chain. Every chain is signed for by the
/// same account.
#[auto_impl(&, Box, Arc)]
pub trait SignerProvider: Send + Sync + Debug {
    /// Address of the relayer account
    fn address(&self) -> Address;

    /// Signer bound to `chain_id`
    fn signer_for(&self, chain_id: u64) -> ChainResult<Arc<dyn TxSigner>>;
}
