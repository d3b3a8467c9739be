use std::fmt::{Display, Formatter};
use std::ops::Deref;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Address, Bytes, TransactionReceipt, H256, U256, U64};

/// Identifier of a logical send. A new one is issued for every call to
/// the transaction manager, gas bumps keep the same id.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct TxId(Uuid);

impl TxId {
    /// Create a new random transaction id
    pub fn random() -> Self {
        TxId(Uuid::new_v4())
    }
}

impl Deref for TxId {
    type Target = Uuid;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for TxId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a transaction record.
///
/// `Pending -> Processing -> {Succeed | Failed | Errored}`
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    /// Stored, waiting for the processing loop
    #[default]
    Pending,
    /// Picked up by the processing loop, being broadcast or bumped
    Processing,
    /// Submission failed or no receipt was obtained within the retry budget
    Errored,
    /// Mined with a successful receipt
    Succeed,
    /// Mined but reverted
    Failed,
}

impl TxStatus {
    /// Whether the record reached a terminal state
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Errored | Self::Succeed | Self::Failed)
    }

    /// Lowercase label, used for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Errored => "errored",
            Self::Succeed => "succeed",
            Self::Failed => "failed",
        }
    }
}

impl Display for TxStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signed legacy transaction as it was last handed to the node
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SignedTx {
    /// keccak256 of `raw`
    pub hash: H256,
    /// RLP encoded signed transaction
    pub raw: Bytes,
    /// Account nonce used
    pub nonce: U256,
    /// Gas price used
    pub gas_price: U256,
}

/// Durable state of one logical send
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TxRecord {
    /// Unique id, primary key in the store
    pub id: TxId,
    /// Chain the call is sent on
    pub chain_id: u64,
    /// Callee
    pub to: Address,
    /// Call data
    pub data: Bytes,
    /// Gas limit of every attempt
    pub gas_limit: u64,
    /// Last signed attempt, overwritten on every bump
    pub signed_tx: Option<SignedTx>,
    /// Receipt of the mined attempt
    pub receipt: Option<TransactionReceipt>,
    /// Current status
    pub status: TxStatus,
    /// Human readable reason for the status, set for `Errored`
    pub message: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time of the last status or attempt update
    pub updated_at: DateTime<Utc>,
}

impl TxRecord {
    /// New `Pending` record for a call
    pub fn new(chain_id: u64, to: Address, data: Bytes, gas_limit: u64) -> Self {
        let now = Utc::now();
        Self {
            id: TxId::random(),
            chain_id,
            to,
            data,
            gas_limit,
            signed_tx: None,
            receipt: None,
            status: TxStatus::Pending,
            message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `status`, keeping the previous receipt unless a new one is
    /// given
    pub fn set_status(
        &mut self,
        status: TxStatus,
        message: Option<String>,
        receipt: Option<TransactionReceipt>,
    ) {
        self.status = status;
        self.message = message;
        if receipt.is_some() {
            self.receipt = receipt;
        }
        self.updated_at = Utc::now();
    }

    /// Record a new signed attempt
    pub fn set_signed_tx(&mut self, signed: SignedTx) {
        self.signed_tx = Some(signed);
        self.updated_at = Utc::now();
    }

    /// Whether the mined receipt reports a revert
    pub fn reverted(&self) -> bool {
        self.receipt
            .as_ref()
            .map(receipt_reverted)
            .unwrap_or(false)
    }
}

/// A receipt with status `0` is a mined but reverted transaction.
pub fn receipt_reverted(receipt: &TransactionReceipt) -> bool {
    receipt.status == Some(U64::zero())
}
