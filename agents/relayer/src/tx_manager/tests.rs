use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use ethers::types::Transaction;
use ethers::utils::{keccak256, rlp};
use parking_lot::Mutex;
use prometheus::Registry;

use bridge_base::MemoryStore;
use bridge_core::StoreResult;
use bridge_test::mocks::MockChainClient;
use bridge_test::test_utils::{receipt, test_address, test_signers};

use super::*;

const CHAIN: u64 = 2;
const GAS_LIMIT: u64 = 900_000;

fn target() -> Address {
    Address::from_low_u64_be(0xaa)
}

fn manager(client: MockChainClient) -> (Arc<TxManager>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::default());
    let metrics = CoreMetrics::new("test", Registry::new()).unwrap();
    let clients = HashMap::from([(CHAIN, Arc::new(client) as Arc<dyn ChainClient>)]);
    let manager = TxManager::new(
        clients,
        Arc::new(test_signers(&[CHAIN])),
        store.clone(),
        TxManagerConf::default(),
        &metrics,
    );
    (Arc::new(manager), store)
}

/// Captures every broadcast so nonces and gas prices can be inspected
#[derive(Clone, Default)]
struct Broadcasts(Arc<Mutex<Vec<Bytes>>>);

impl Broadcasts {
    fn push(&self, raw: Bytes) -> H256 {
        let hash = H256::from(keccak256(&raw));
        self.0.lock().push(raw);
        hash
    }

    fn decoded(&self) -> Vec<Transaction> {
        self.0
            .lock()
            .iter()
            .map(|raw| rlp::decode::<Transaction>(raw).unwrap())
            .collect()
    }

    fn hashes(&self) -> Vec<H256> {
        self.0
            .lock()
            .iter()
            .map(|raw| H256::from(keccak256(raw)))
            .collect()
    }

    fn len(&self) -> usize {
        self.0.lock().len()
    }
}

async fn queue(manager: &TxManager) -> TxId {
    manager
        .send_tx_async(CHAIN, target(), vec![0x12, 0x34].into(), GAS_LIMIT)
        .await
        .unwrap()
}

async fn record(store: &MemoryStore, id: &TxId) -> TxRecord {
    store.get_tx(id).await.unwrap().unwrap()
}

#[tokio::test]
async fn unknown_chains_are_rejected_without_a_record() {
    let (manager, store) = manager(MockChainClient::new());

    let err = manager
        .send_tx_async(99, target(), Bytes::default(), GAS_LIMIT)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "unsupported chain ID: 99");
    assert!(store.list_txs(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn mined_tx_succeeds_on_first_attempt() {
    let broadcasts = Broadcasts::default();
    let mut client = MockChainClient::new();
    client
        .expect__pending_nonce_at()
        .withf(|account| *account == test_address())
        .times(1)
        .returning(|_| Ok(U256::from(7u64)));
    client
        .expect__suggest_gas_price()
        .returning(|| Ok(U256::from(100u64)));
    let sent = broadcasts.clone();
    client
        .expect__send_transaction()
        .times(1)
        .returning(move |raw| Ok(sent.push(raw)));
    client
        .expect__transaction_receipt()
        .returning(|hash| Ok(Some(receipt(hash, true))));

    let (manager, store) = manager(client);
    let id = queue(&manager).await;
    assert_eq!(record(&store, &id).await.status, TxStatus::Pending);

    manager.process_txs().await.unwrap();

    let tx = record(&store, &id).await;
    assert_eq!(tx.status, TxStatus::Succeed);
    assert_eq!(tx.message, None);
    let signed = tx.signed_tx.unwrap();
    assert_eq!(signed.nonce, U256::from(7u64));
    assert_eq!(signed.gas_price, U256::from(115u64));
    assert_eq!(tx.receipt.unwrap().transaction_hash, broadcasts.hashes()[0]);

    let sent = &broadcasts.decoded()[0];
    assert_eq!(sent.to, Some(target()));
    assert_eq!(sent.nonce, U256::from(7u64));
    assert_eq!(sent.gas, U256::from(GAS_LIMIT));
    assert_eq!(sent.input, Bytes::from(vec![0x12, 0x34]));
}

#[tokio::test]
async fn reverted_receipt_marks_the_record_failed() {
    let mut client = MockChainClient::new();
    client
        .expect__pending_nonce_at()
        .returning(|_| Ok(U256::zero()));
    client
        .expect__suggest_gas_price()
        .returning(|| Ok(U256::from(100u64)));
    client
        .expect__send_transaction()
        .times(1)
        .returning(|raw| Ok(H256::from(keccak256(&raw))));
    client
        .expect__transaction_receipt()
        .returning(|hash| Ok(Some(receipt(hash, false))));

    let (manager, store) = manager(client);
    let id = queue(&manager).await;
    manager.process_txs().await.unwrap();

    let tx = record(&store, &id).await;
    assert_eq!(tx.status, TxStatus::Failed);
    assert!(tx.reverted());
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_tx_errors_after_exactly_five_attempts() {
    let broadcasts = Broadcasts::default();
    let suggestions = Arc::new(AtomicU64::new(0));
    let mut client = MockChainClient::new();
    client
        .expect__pending_nonce_at()
        .times(1)
        .returning(|_| Ok(U256::from(3u64)));
    // the node's suggestion moves up and down between attempts
    client.expect__suggest_gas_price().returning(move || {
        let call = suggestions.fetch_add(1, Ordering::SeqCst);
        Ok(U256::from([100u64, 150, 90, 400, 50][call as usize % 5]))
    });
    let sent = broadcasts.clone();
    client
        .expect__send_transaction()
        .returning(move |raw| Ok(sent.push(raw)));
    client
        .expect__transaction_receipt()
        .returning(|_| Ok(None));

    let (manager, store) = manager(client);
    let id = queue(&manager).await;
    manager.process_txs().await.unwrap();

    let tx = record(&store, &id).await;
    assert_eq!(tx.status, TxStatus::Errored);
    assert_eq!(
        tx.message.as_deref(),
        Some("tx not confirmed after several attempts")
    );
    assert_eq!(broadcasts.len(), MAX_ATTEMPTS as usize);

    let sent = broadcasts.decoded();
    let suggested = [100u64, 150, 90, 400, 50];
    for (i, sent_tx) in sent.iter().enumerate() {
        assert_eq!(sent_tx.nonce, U256::from(3u64));
        let price = sent_tx.gas_price.unwrap();
        let floor = U256::from(suggested[i]) * U256::from(100 + 15 * (i as u64 + 1)) / 100;
        assert!(price >= floor);
        if i > 0 {
            assert!(price >= sent[i - 1].gas_price.unwrap());
        }
    }
    // the record keeps the last attempt
    assert_eq!(tx.signed_tx.unwrap().hash, *broadcasts.hashes().last().unwrap());
}

#[tokio::test(start_paused = true)]
async fn replacement_underpriced_recovers_the_mined_previous_attempt() {
    let broadcasts = Broadcasts::default();
    let mut client = MockChainClient::new();
    client
        .expect__pending_nonce_at()
        .returning(|_| Ok(U256::one()));
    client
        .expect__suggest_gas_price()
        .returning(|| Ok(U256::from(100u64)));
    let sent = broadcasts.clone();
    client
        .expect__send_transaction()
        .times(2)
        .returning(move |raw| {
            if sent.len() == 0 {
                Ok(sent.push(raw))
            } else {
                sent.push(raw);
                Err(ChainCommunicationError::ReplacementUnderpriced(
                    "replacement transaction underpriced".into(),
                ))
            }
        });
    // the first attempt gets mined while the bump is signed
    let seen = broadcasts.clone();
    client.expect__transaction_receipt().returning(move |hash| {
        if seen.len() >= 2 {
            Ok(Some(receipt(hash, true)))
        } else {
            Ok(None)
        }
    });

    let (manager, store) = manager(client);
    let id = queue(&manager).await;
    manager.process_txs().await.unwrap();

    let tx = record(&store, &id).await;
    assert_eq!(tx.status, TxStatus::Succeed);
    assert_eq!(
        tx.receipt.unwrap().transaction_hash,
        broadcasts.hashes()[0]
    );
}

#[tokio::test]
async fn replacement_underpriced_without_previous_attempt_errors() {
    let mut client = MockChainClient::new();
    client
        .expect__pending_nonce_at()
        .returning(|_| Ok(U256::one()));
    client
        .expect__suggest_gas_price()
        .returning(|| Ok(U256::from(100u64)));
    client.expect__send_transaction().times(1).returning(|_| {
        Err(ChainCommunicationError::ReplacementUnderpriced(
            "replacement transaction underpriced".into(),
        ))
    });
    client.expect__transaction_receipt().never();

    let (manager, store) = manager(client);
    let id = queue(&manager).await;
    manager.process_txs().await.unwrap();

    let tx = record(&store, &id).await;
    assert_eq!(tx.status, TxStatus::Errored);
    assert_eq!(
        tx.message.as_deref(),
        Some("tx already mined but no previous tx found")
    );
}

#[tokio::test]
async fn nonce_too_low_resends_with_a_fresh_nonce() {
    let broadcasts = Broadcasts::default();
    let nonces = Arc::new(AtomicU64::new(3));
    let mut client = MockChainClient::new();
    client
        .expect__pending_nonce_at()
        .times(2)
        .returning(move |_| Ok(U256::from(nonces.fetch_add(1, Ordering::SeqCst))));
    client
        .expect__suggest_gas_price()
        .returning(|| Ok(U256::from(100u64)));
    let sent = broadcasts.clone();
    client
        .expect__send_transaction()
        .times(2)
        .returning(move |raw| {
            let first = sent.len() == 0;
            let hash = sent.push(raw);
            if first {
                Err(ChainCommunicationError::NonceTooLow("nonce too low".into()))
            } else {
                Ok(hash)
            }
        });
    client
        .expect__transaction_receipt()
        .returning(|hash| Ok(Some(receipt(hash, true))));

    let (manager, store) = manager(client);
    let id = queue(&manager).await;
    manager.process_txs().await.unwrap();

    let tx = record(&store, &id).await;
    assert_eq!(tx.status, TxStatus::Succeed);
    let nonces = broadcasts
        .decoded()
        .iter()
        .map(|tx| tx.nonce.as_u64())
        .collect::<Vec<_>>();
    assert_eq!(nonces, vec![3, 4]);
}

#[tokio::test]
async fn other_broadcast_errors_are_not_retried() {
    let mut client = MockChainClient::new();
    client
        .expect__pending_nonce_at()
        .returning(|_| Ok(U256::zero()));
    client
        .expect__suggest_gas_price()
        .returning(|| Ok(U256::from(100u64)));
    client
        .expect__send_transaction()
        .times(1)
        .returning(|_| Err(ChainCommunicationError::from_other_str("insufficient funds")));

    let (manager, store) = manager(client);
    let id = queue(&manager).await;
    manager.process_txs().await.unwrap();

    let tx = record(&store, &id).await;
    assert_eq!(tx.status, TxStatus::Errored);
    assert_eq!(
        tx.message.as_deref(),
        Some("failed to send tx: insufficient funds")
    );
}

#[tokio::test]
async fn gas_price_failures_error_the_record() {
    let mut client = MockChainClient::new();
    client
        .expect__pending_nonce_at()
        .returning(|_| Ok(U256::zero()));
    client
        .expect__suggest_gas_price()
        .returning(|| Err(ChainCommunicationError::from_other_str("connection reset")));
    client.expect__send_transaction().never();

    let (manager, store) = manager(client);
    let id = queue(&manager).await;
    manager.process_txs().await.unwrap();

    let tx = record(&store, &id).await;
    assert_eq!(tx.status, TxStatus::Errored);
    assert_eq!(tx.message.as_deref(), Some("connection reset"));
}

#[tokio::test]
async fn records_are_sent_one_after_another() {
    let broadcasts = Broadcasts::default();
    let nonce_calls = Arc::new(AtomicU64::new(0));
    let mut client = MockChainClient::new();
    // the pending nonce only moves once the previous record is mined
    let mined = broadcasts.clone();
    client
        .expect__pending_nonce_at()
        .times(3)
        .returning(move |_| {
            nonce_calls.fetch_add(1, Ordering::SeqCst);
            Ok(U256::from(mined.len() as u64))
        });
    client
        .expect__suggest_gas_price()
        .returning(|| Ok(U256::from(100u64)));
    let sent = broadcasts.clone();
    client
        .expect__send_transaction()
        .times(3)
        .returning(move |raw| Ok(sent.push(raw)));
    client
        .expect__transaction_receipt()
        .returning(|hash| Ok(Some(receipt(hash, true))));

    let (manager, store) = manager(client);
    let mut ids = vec![];
    for _ in 0..3 {
        ids.push(queue(&manager).await);
    }
    manager.process_txs().await.unwrap();

    for id in &ids {
        assert_eq!(record(&store, id).await.status, TxStatus::Succeed);
    }
    let nonces = broadcasts
        .decoded()
        .iter()
        .map(|tx| tx.nonce.as_u64())
        .collect::<Vec<_>>();
    assert_eq!(nonces, vec![0, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn waits_resolve_once_the_loop_processed_the_record() {
    let mut client = MockChainClient::new();
    client
        .expect__pending_nonce_at()
        .returning(|_| Ok(U256::zero()));
    client
        .expect__suggest_gas_price()
        .returning(|| Ok(U256::from(100u64)));
    client
        .expect__send_transaction()
        .returning(|raw| Ok(H256::from(keccak256(&raw))));
    client
        .expect__transaction_receipt()
        .returning(|hash| Ok(Some(receipt(hash, true))));

    let (manager, _store) = manager(client);
    manager.start();
    let id = queue(&manager).await;

    let signed = manager.wait_tx(&id).await.unwrap();
    let tx = manager.wait_tx_completed(&id).await.unwrap();
    assert_eq!(tx.status, TxStatus::Succeed);
    assert_eq!(tx.signed_tx, Some(signed));

    manager.stop().await;
    assert!(matches!(
        manager.wait_tx_completed(&id).await,
        Err(TxManagerError::Cancelled)
    ));
}

#[tokio::test]
async fn wait_tx_fails_for_records_that_were_never_signed() {
    let mut client = MockChainClient::new();
    client
        .expect__pending_nonce_at()
        .returning(|_| Err(ChainCommunicationError::from_other_str("node unavailable")));

    let (manager, _store) = manager(client);
    let id = queue(&manager).await;
    manager.process_txs().await.unwrap();

    match manager.wait_tx(&id).await {
        Err(TxManagerError::NeverSigned { message, .. }) => {
            assert_eq!(message, "node unavailable")
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[tokio::test]
async fn interrupted_records_recover_their_mined_attempt() {
    let receipts = Arc::new(AtomicUsize::new(0));
    let mut client = MockChainClient::new();
    let calls = receipts.clone();
    client.expect__transaction_receipt().returning(move |hash| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(receipt(hash, true)))
    });
    client.expect__send_transaction().never();

    let (manager, store) = manager(client);
    let id = queue(&manager).await;
    let signed = SignedTx {
        hash: H256::from_low_u64_be(0xfeed),
        raw: Bytes::default(),
        nonce: U256::from(9u64),
        gas_price: U256::from(115u64),
    };
    store.update_raw_tx(&id, &signed).await.unwrap();
    store
        .update_tx_status(&id, TxStatus::Processing, None, None)
        .await
        .unwrap();

    manager.requeue_interrupted().await.unwrap();
    assert_eq!(record(&store, &id).await.status, TxStatus::Pending);
    manager.process_txs().await.unwrap();

    let tx = record(&store, &id).await;
    assert_eq!(tx.status, TxStatus::Succeed);
    assert_eq!(tx.receipt.unwrap().transaction_hash, signed.hash);
    assert_eq!(receipts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_attempt_price_is_carried_into_the_fresh_nonce_attempt() {
    let broadcasts = Broadcasts::default();
    let suggestions = Arc::new(AtomicU64::new(0));
    let nonces = Arc::new(AtomicU64::new(5));
    let mut client = MockChainClient::new();
    client
        .expect__pending_nonce_at()
        .times(2)
        .returning(move |_| Ok(U256::from(nonces.fetch_add(1, Ordering::SeqCst))));
    client.expect__suggest_gas_price().returning(move || {
        let call = suggestions.fetch_add(1, Ordering::SeqCst);
        Ok(U256::from([100u64, 1000, 100, 100, 100][call as usize % 5]))
    });
    // the first attempt is never mined, the second hits a used nonce
    let sent = broadcasts.clone();
    client.expect__send_transaction().times(3).returning(move |raw| {
        let hash = sent.push(raw);
        if sent.len() == 2 {
            Err(ChainCommunicationError::NonceTooLow("nonce too low".into()))
        } else {
            Ok(hash)
        }
    });
    let seen = broadcasts.clone();
    client.expect__transaction_receipt().returning(move |hash| {
        let mined = seen.len() >= 3 && seen.hashes()[2] == hash;
        Ok(mined.then(|| receipt(hash, true)))
    });

    let (manager, store) = manager(client);
    let id = queue(&manager).await;
    manager.process_txs().await.unwrap();

    let tx = record(&store, &id).await;
    assert_eq!(tx.status, TxStatus::Succeed);
    assert_eq!(tx.receipt.unwrap().transaction_hash, broadcasts.hashes()[2]);

    let sent = broadcasts.decoded();
    let prices = sent
        .iter()
        .map(|tx| tx.gas_price.unwrap().as_u64())
        .collect::<Vec<_>>();
    assert_eq!(prices, vec![115, 1300, 1885]);
    let nonces = sent.iter().map(|tx| tx.nonce.as_u64()).collect::<Vec<_>>();
    assert_eq!(nonces, vec![5, 5, 6]);
}

#[tokio::test(start_paused = true)]
async fn stop_waits_for_the_attempt_in_flight() {
    let broadcasts = Broadcasts::default();
    let mut client = MockChainClient::new();
    client
        .expect__pending_nonce_at()
        .returning(|_| Ok(U256::zero()));
    client
        .expect__suggest_gas_price()
        .returning(|| Ok(U256::from(100u64)));
    let sent = broadcasts.clone();
    client
        .expect__send_transaction()
        .returning(move |raw| Ok(sent.push(raw)));
    // mined two blocks after the broadcast
    let started = tokio::time::Instant::now();
    client.expect__transaction_receipt().returning(move |hash| {
        let mined = started.elapsed() >= Duration::from_secs(24);
        Ok(mined.then(|| receipt(hash, true)))
    });

    let (manager, store) = manager(client);
    manager.start();
    let id = queue(&manager).await;
    manager.wait_tx(&id).await.unwrap();
    assert_eq!(record(&store, &id).await.status, TxStatus::Processing);

    manager.stop().await;

    assert_eq!(record(&store, &id).await.status, TxStatus::Succeed);
    assert_eq!(broadcasts.len(), 1);
}

/// Fails moving one record to `Processing`, delegates everything else
#[derive(Debug)]
struct FailingStore {
    inner: MemoryStore,
    broken: Mutex<Option<TxId>>,
}

#[async_trait::async_trait]
impl TxStore for FailingStore {
    async fn store_tx(&self, tx: &TxRecord) -> StoreResult<()> {
        self.inner.store_tx(tx).await
    }

    async fn get_tx(&self, id: &TxId) -> StoreResult<Option<TxRecord>> {
        self.inner.get_tx(id).await
    }

    async fn list_txs(&self, status: Option<TxStatus>) -> StoreResult<Vec<TxRecord>> {
        self.inner.list_txs(status).await
    }

    async fn update_tx_status(
        &self,
        id: &TxId,
        status: TxStatus,
        message: Option<String>,
        receipt: Option<TransactionReceipt>,
    ) -> StoreResult<()> {
        if *self.broken.lock() == Some(*id) {
            return Err(StoreError::NotFound(format!("tx {id}")));
        }
        self.inner
            .update_tx_status(id, status, message, receipt)
            .await
    }

    async fn update_raw_tx(&self, id: &TxId, signed: &SignedTx) -> StoreResult<()> {
        self.inner.update_raw_tx(id, signed).await
    }
}

#[tokio::test]
async fn store_failure_on_one_record_does_not_skip_the_rest() {
    let mut client = MockChainClient::new();
    client
        .expect__pending_nonce_at()
        .times(1)
        .returning(|_| Ok(U256::zero()));
    client
        .expect__suggest_gas_price()
        .returning(|| Ok(U256::from(100u64)));
    client
        .expect__send_transaction()
        .times(1)
        .returning(|raw| Ok(H256::from(keccak256(&raw))));
    client
        .expect__transaction_receipt()
        .returning(|hash| Ok(Some(receipt(hash, true))));

    let store = Arc::new(FailingStore {
        inner: MemoryStore::default(),
        broken: Mutex::new(None),
    });
    let metrics = CoreMetrics::new("test", Registry::new()).unwrap();
    let manager = TxManager::new(
        HashMap::from([(CHAIN, Arc::new(client) as Arc<dyn ChainClient>)]),
        Arc::new(test_signers(&[CHAIN])),
        store.clone(),
        TxManagerConf::default(),
        &metrics,
    );
    let first = queue(&manager).await;
    let second = queue(&manager).await;
    *store.broken.lock() = Some(first);

    manager.process_txs().await.unwrap();

    assert_eq!(
        store.get_tx(&first).await.unwrap().unwrap().status,
        TxStatus::Pending
    );
    assert_eq!(
        store.get_tx(&second).await.unwrap().unwrap().status,
        TxStatus::Succeed
    );
}
