use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::signers::{AwsSigner, AwsSignerError, LocalWallet, Signer, WalletError};
use ethers::types::transaction::eip712::Eip712;

use bridge_core::{
    Address, ChainCommunicationError, ChainResult, Signature, SignerProvider, TxSigner,
    TypedTransaction,
};

/// Ethereum-supported signer types
#[derive(Debug)]
pub enum Signers {
    /// A wallet instantiated with a locally stored private key
    Local(LocalWallet),
    /// A signer using a key stored in aws kms
    Aws(AwsSigner),
}

impl From<LocalWallet> for Signers {
    fn from(s: LocalWallet) -> Self {
        Signers::Local(s)
    }
}

impl From<AwsSigner> for Signers {
    fn from(s: AwsSigner) -> Self {
        Signers::Aws(s)
    }
}

/// Error types for Signers
#[derive(Debug, thiserror::Error)]
pub enum SignersError {
    /// Local wallet error
    #[error("{0}")]
    Local(#[from] WalletError),
    /// AWS signer error
    #[error("{0}")]
    Aws(#[from] AwsSignerError),
    /// No signer configured
    #[error("no chain to sign for")]
    NoSigners,
    /// Chains would be signed for by different accounts
    #[error("signer for chain {chain_id} uses {found:?}, expected {expected:?}")]
    AddressMismatch {
        /// Chain with the deviating signer
        chain_id: u64,
        /// Address of the first signer
        expected: Address,
        /// Address of the deviating signer
        found: Address,
    },
}

#[async_trait]
impl Signer for Signers {
    type Error = SignersError;

    async fn sign_message<S: Send + Sync + AsRef<[u8]>>(
        &self,
        message: S,
    ) -> Result<Signature, Self::Error> {
        match self {
            Signers::Local(signer) => Ok(signer.sign_message(message).await?),
            Signers::Aws(signer) => Ok(signer.sign_message(message).await?),
        }
    }

    async fn sign_transaction(&self, message: &TypedTransaction) -> Result<Signature, Self::Error> {
        match self {
            Signers::Local(signer) => Ok(signer.sign_transaction(message).await?),
            Signers::Aws(signer) => Ok(signer.sign_transaction(message).await?),
        }
    }

    async fn sign_typed_data<T: Eip712 + Send + Sync>(
        &self,
        payload: &T,
    ) -> Result<Signature, Self::Error> {
        match self {
            Signers::Local(signer) => Ok(signer.sign_typed_data(payload).await?),
            Signers::Aws(signer) => Ok(signer.sign_typed_data(payload).await?),
        }
    }

    fn address(&self) -> Address {
        match self {
            Signers::Local(signer) => signer.address(),
            Signers::Aws(signer) => signer.address(),
        }
    }

    fn chain_id(&self) -> u64 {
        match self {
            Signers::Local(signer) => signer.chain_id(),
            Signers::Aws(signer) => signer.chain_id(),
        }
    }

    fn with_chain_id<T: Into<u64>>(self, chain_id: T) -> Self {
        match self {
            Signers::Local(signer) => signer.with_chain_id(chain_id).into(),
            Signers::Aws(signer) => signer.with_chain_id(chain_id).into(),
        }
    }
}

#[async_trait]
impl TxSigner for Signers {
    fn address(&self) -> Address {
        Signer::address(self)
    }

    async fn sign_transaction(&self, tx: &TypedTransaction) -> ChainResult<Signature> {
        Signer::sign_transaction(self, tx)
            .await
            .map_err(ChainCommunicationError::from_other)
    }
}

/// One signer per configured chain, all backed by the same account
#[derive(Debug)]
pub struct ChainSigners {
    address: Address,
    signers: HashMap<u64, Arc<Signers>>,
}

impl ChainSigners {
    /// Group per-chain signers, checking they share one address
    pub fn new(signers: HashMap<u64, Signers>) -> Result<Self, SignersError> {
        let mut address = None;
        for (chain_id, signer) in &signers {
            let found = Signer::address(signer);
            match address {
                None => address = Some(found),
                Some(expected) if expected != found => {
                    return Err(SignersError::AddressMismatch {
                        chain_id: *chain_id,
                        expected,
                        found,
                    })
                }
                Some(_) => {}
            }
        }
        Ok(Self {
            address: address.ok_or(SignersError::NoSigners)?,
            signers: signers
                .into_iter()
                .map(|(chain_id, signer)| (chain_id, Arc::new(signer)))
                .collect(),
        })
    }
}

impl SignerProvider for ChainSigners {
    fn address(&self) -> Address {
        self.address
    }

    fn signer_for(&self, chain_id: u64) -> ChainResult<Arc<dyn TxSigner>> {
        self.signers
            .get(&chain_id)
            .map(|signer| signer.clone() as Arc<dyn TxSigner>)
            .ok_or(ChainCommunicationError::UnsupportedChain(chain_id))
    }
}

#[cfg(test)]
mod tests {
    use bridge_core::{TransactionRequest, U256};

    use super::*;

    const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn local(chain_id: u64) -> Signers {
        KEY.parse::<LocalWallet>()
            .unwrap()
            .with_chain_id(chain_id)
            .into()
    }

    #[tokio::test]
    async fn signs_for_configured_chains_only() {
        let signers = ChainSigners::new(HashMap::from([(1, local(1)), (2, local(2))])).unwrap();
        let expected: Address = KEY.parse::<LocalWallet>().unwrap().address();
        assert_eq!(SignerProvider::address(&signers), expected);

        let tx: TypedTransaction = TransactionRequest::new()
            .to(Address::repeat_byte(0xaa))
            .nonce(3)
            .gas(21_000)
            .gas_price(U256::from(1_000_000_000u64))
            .chain_id(2)
            .into();
        let signer = signers.signer_for(2).unwrap();
        let signature = signer.sign_transaction(&tx).await.unwrap();
        assert_eq!(signature.recover(tx.sighash()).unwrap(), expected);

        assert!(matches!(
            signers.signer_for(99),
            Err(ChainCommunicationError::UnsupportedChain(99))
        ));
    }

    #[test]
    fn refuses_signers_of_different_accounts() {
        let other: Signers = LocalWallet::new(&mut ethers::core::rand::thread_rng()).into();
        let result = ChainSigners::new(HashMap::from([(1, local(1)), (2, other)]));
        assert!(matches!(result, Err(SignersError::AddressMismatch { .. })));

        assert!(matches!(
            ChainSigners::new(HashMap::new()),
            Err(SignersError::NoSigners)
        ));
    }
}
