//! End-to-end passes against a scripted chain and the in-memory store.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, U256};
use async_trait::async_trait;

use dripboard_core::checkpoint::{Checkpoint, CheckpointStore};
use dripboard_core::config::NetworkConfig;
use dripboard_core::error::SyncError;
use dripboard_core::pass::{SyncOutcome, SyncRequest, SyncSummary};
use dripboard_core::planner::PlanStart;
use dripboard_core::ranking::Leaderboard;
use dripboard_core::store::{LeaseOutcome, LeaseStore, StatsStore, WindowCommit};
use dripboard_core::types::AccountStats;
use dripboard_evm::decoder::{topic0, STREAM_CREATED_SIGNATURE, STREAM_WITHDRAWN_SIGNATURE};
use dripboard_evm::{EvmRpcClient, RawLog, SyncConfigBuilder, SyncEngine};
use dripboard_storage::InMemoryStorage;

const NETWORK: &str = "testnet";
const PROXY: &str = "0x5530975fde062fe6706298ff3945e3d1a17a310a";
const IMPL: &str = "0xead6af75911455673ef50975e8a429eb67267703";
const ALICE: &str = "0x00000000000000000000000000000000000000aa";
const BOB: &str = "0x00000000000000000000000000000000000000bb";

// ─── Scripted chain ──────────────────────────────────────────────────────────

#[derive(Default)]
struct MockChain {
    /// `None` makes `eth_blockNumber` fail.
    head: Mutex<Option<u64>>,
    logs: Mutex<HashMap<String, Vec<RawLog>>>,
    failing: Mutex<HashSet<String>>,
    requests: Mutex<Vec<(String, u64, u64)>>,
}

impl MockChain {
    fn at_head(head: u64) -> Arc<Self> {
        let chain = Self::default();
        *chain.head.lock().unwrap() = Some(head);
        Arc::new(chain)
    }

    fn set_head(&self, head: Option<u64>) {
        *self.head.lock().unwrap() = head;
    }

    fn push(&self, address: &str, log: RawLog) {
        self.logs
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .push(log);
    }

    fn fail(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }

    fn requests(&self) -> Vec<(String, u64, u64)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl EvmRpcClient for MockChain {
    async fn get_block_number(&self) -> Result<u64, SyncError> {
        (*self.head.lock().unwrap()).ok_or_else(|| SyncError::Rpc("connection refused".into()))
    }

    async fn get_logs(&self, address: &str, from: u64, to: u64) -> Result<Vec<RawLog>, SyncError> {
        self.requests
            .lock()
            .unwrap()
            .push((address.to_string(), from, to));
        if self.failing.lock().unwrap().contains(address) {
            return Err(SyncError::Rpc("upstream 503".into()));
        }
        Ok(self
            .logs
            .lock()
            .unwrap()
            .get(address)
            .map(|logs| {
                logs.iter()
                    .filter(|l| {
                        let b = l.block_number_u64().unwrap_or(u64::MAX);
                        b >= from && b <= to
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

// ─── Log builders ────────────────────────────────────────────────────────────

fn pad_address(addr: &str) -> String {
    format!("0x{:0>64}", addr.trim_start_matches("0x"))
}

fn raw(emitter: &str, block: u64, index: u64, topics: Vec<String>, data: Vec<u8>) -> RawLog {
    RawLog {
        address: emitter.into(),
        topics,
        data: format!("0x{}", hex::encode(data)),
        block_number: Some(format!("0x{block:x}")),
        block_hash: Some(format!("0x{block:064x}")),
        transaction_hash: Some(format!("0x{:064x}", block * 1_000 + index)),
        log_index: Some(format!("0x{index:x}")),
        removed: None,
    }
}

fn created(emitter: &str, block: u64, index: u64, sender: &str, deposit: u64) -> RawLog {
    let data = DynSolValue::Tuple(vec![
        DynSolValue::Array(vec![DynSolValue::Address(Address::repeat_byte(0x42))]),
        DynSolValue::Address(Address::repeat_byte(0x77)),
        DynSolValue::Uint(U256::from(deposit), 256),
        DynSolValue::Uint(U256::from(1_700_000_000u64), 256),
        DynSolValue::Uint(U256::from(1_700_086_400u64), 256),
        DynSolValue::String("Grant".into()),
        DynSolValue::String("Q3 contributor grant".into()),
    ])
    .abi_encode_params();
    raw(
        emitter,
        block,
        index,
        vec![
            topic0(STREAM_CREATED_SIGNATURE),
            format!("0x{:064x}", block),
            pad_address(sender),
        ],
        data,
    )
}

fn withdrawn(emitter: &str, block: u64, index: u64, recipient: &str, amount: u64) -> RawLog {
    let data = DynSolValue::Tuple(vec![DynSolValue::Uint(U256::from(amount), 256)]).abi_encode_params();
    raw(
        emitter,
        block,
        index,
        vec![
            topic0(STREAM_WITHDRAWN_SIGNATURE),
            format!("0x{:064x}", block),
            pad_address(recipient),
        ],
        data,
    )
}

// ─── Harness ─────────────────────────────────────────────────────────────────

fn network(genesis: Option<u64>) -> NetworkConfig {
    NetworkConfig {
        name: NETWORK.into(),
        chain_id: 31_337,
        rpc_url: "http://127.0.0.1:8545".into(),
        rpc_url_env: vec![],
        contract_address: PROXY.into(),
        implementation_addresses: vec![IMPL.into()],
        genesis_block: genesis,
    }
}

fn engine(
    chain: &Arc<MockChain>,
    store: &Arc<InMemoryStorage>,
    genesis: Option<u64>,
) -> SyncEngine<Arc<MockChain>, InMemoryStorage> {
    SyncConfigBuilder::new()
        .max_range(1000)
        .lookback(1000)
        .fetch_timeout_ms(1_000)
        .holder("test-worker")
        .build(network(genesis), chain.clone(), store.clone())
}

fn synced(outcome: SyncOutcome) -> SyncSummary {
    match outcome {
        SyncOutcome::Synced(s) => s,
        other => panic!("expected a synced pass, got {other:?}"),
    }
}

async fn checkpoint(store: &InMemoryStorage) -> Option<u64> {
    store
        .load_checkpoint(NETWORK)
        .await
        .unwrap()
        .map(|cp| cp.block_number)
}

fn request() -> SyncRequest {
    SyncRequest::network(NETWORK)
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_run_starts_at_genesis() {
    let chain = MockChain::at_head(500);
    let store = Arc::new(InMemoryStorage::new());
    let engine = engine(&chain, &store, Some(100));

    let summary = synced(engine.sync(&request()).await.unwrap());
    assert_eq!(summary.start, PlanStart::FirstRun);
    assert_eq!((summary.from_block, summary.to_block), (100, 500));
    assert_eq!(checkpoint(&store).await, Some(500));
    assert_eq!(summary.contract_addresses, vec![PROXY.to_string(), IMPL.to_string()]);
}

#[tokio::test]
async fn first_run_without_genesis_uses_lookback() {
    let chain = MockChain::at_head(5_000);
    let store = Arc::new(InMemoryStorage::new());
    let engine = engine(&chain, &store, None);

    let summary = synced(engine.sync(&request()).await.unwrap());
    assert_eq!((summary.from_block, summary.to_block), (4_000, 4_999));
    assert_eq!(checkpoint(&store).await, Some(4_999));
}

#[tokio::test]
async fn window_is_capped_and_resumes() {
    let chain = MockChain::at_head(2_600);
    let store = Arc::new(InMemoryStorage::new());
    store.pin_checkpoint(NETWORK, 500).await.unwrap();
    let engine = engine(&chain, &store, Some(100));

    let first = synced(engine.sync(&request()).await.unwrap());
    assert_eq!(first.start, PlanStart::Resume);
    assert_eq!((first.from_block, first.to_block), (501, 1_500));
    assert_eq!(checkpoint(&store).await, Some(1_500));

    let second = synced(engine.sync(&request()).await.unwrap());
    assert_eq!((second.from_block, second.to_block), (1_501, 2_500));

    let third = synced(engine.sync(&request()).await.unwrap());
    assert_eq!((third.from_block, third.to_block), (2_501, 2_600));
    assert_eq!(checkpoint(&store).await, Some(2_600));

    // Every requested range stays inside the planned windows.
    for (_, from, to) in chain.requests() {
        assert!(to - from < 1_000);
    }
}

#[tokio::test]
async fn created_and_withdrawn_update_one_account() {
    let chain = MockChain::at_head(500);
    chain.push(PROXY, created(PROXY, 120, 0, ALICE, 100));
    chain.push(PROXY, withdrawn(PROXY, 130, 1, ALICE, 30));
    let store = Arc::new(InMemoryStorage::new());
    let engine = engine(&chain, &store, Some(100));

    let summary = synced(engine.sync(&request()).await.unwrap());
    assert_eq!(summary.raw_log_count, 2);
    assert_eq!(summary.events_created, 1);
    assert_eq!(summary.events_withdrawn, 1);
    assert_eq!(summary.accounts_updated, 1);

    let alice = store.get_account(ALICE).await.unwrap().unwrap();
    assert_eq!(alice.streams_created, 1);
    assert_eq!(alice.withdrawals_claimed, 1);
    assert_eq!(alice.total_deposited, "100");
    assert_eq!(alice.total_withdrawn, "30");
    assert_eq!(alice.score, 15);
}

#[tokio::test]
async fn unknown_address_is_unranked_and_not_created() {
    let chain = MockChain::at_head(500);
    chain.push(PROXY, created(PROXY, 120, 0, ALICE, 100));
    let store = Arc::new(InMemoryStorage::new());
    engine(&chain, &store, Some(100)).sync(&request()).await.unwrap();

    let board = Leaderboard::new(store.clone());
    let before = board.top(50).await.unwrap().len();

    let rank = board.account(BOB).await.unwrap();
    assert_eq!(rank.rank, None);
    assert_eq!(rank.stats.score, 0);
    assert_eq!(rank.stats.streams_created, 0);
    assert_eq!(rank.stats.total_deposited, "0");

    assert_eq!(board.top(50).await.unwrap().len(), before);
    assert_eq!(store.account_count().await.unwrap(), 1);
}

#[tokio::test]
async fn implementation_failure_does_not_block_proxy() {
    let chain = MockChain::at_head(500);
    chain.push(PROXY, created(PROXY, 120, 0, ALICE, 100));
    chain.push(IMPL, created(IMPL, 121, 0, BOB, 100));
    chain.fail(IMPL);
    let store = Arc::new(InMemoryStorage::new());
    let engine = engine(&chain, &store, Some(100));

    let summary = synced(engine.sync(&request()).await.unwrap());
    assert!(summary.is_partial());
    assert_eq!(summary.fetch_failures.len(), 1);
    assert_eq!(summary.fetch_failures[0].address, IMPL);
    assert!(summary.fetch_failures[0].error.contains("upstream 503"));
    assert_eq!(summary.events_created, 1);
    assert_eq!(checkpoint(&store).await, Some(500));
    assert!(store.get_account(ALICE).await.unwrap().is_some());
    assert!(store.get_account(BOB).await.unwrap().is_none());
}

#[tokio::test]
async fn logs_from_both_addresses_are_merged() {
    let chain = MockChain::at_head(500);
    chain.push(PROXY, created(PROXY, 120, 0, ALICE, 100));
    chain.push(IMPL, created(IMPL, 150, 2, ALICE, 50));
    chain.push(IMPL, withdrawn(IMPL, 160, 0, BOB, 10));
    let store = Arc::new(InMemoryStorage::new());
    let summary = synced(engine(&chain, &store, Some(100)).sync(&request()).await.unwrap());

    assert_eq!(summary.raw_log_count, 3);
    let alice = store.get_account(ALICE).await.unwrap().unwrap();
    assert_eq!(alice.streams_created, 2);
    assert_eq!(alice.total_deposited, "150");
    assert_eq!(store.get_account(BOB).await.unwrap().unwrap().score, 5);
}

// ─── Properties ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn replaying_a_committed_window_is_a_noop() {
    let chain = MockChain::at_head(500);
    chain.push(PROXY, created(PROXY, 120, 0, ALICE, 100));
    let store = Arc::new(InMemoryStorage::new());
    let engine = engine(&chain, &store, Some(100));

    synced(engine.sync(&request()).await.unwrap());
    let again = engine.sync(&request()).await.unwrap();
    assert_eq!(
        again,
        SyncOutcome::NothingToDo {
            network: NETWORK.into(),
            from_block: 501,
            head: 500
        }
    );

    let alice = store.get_account(ALICE).await.unwrap().unwrap();
    assert_eq!(alice.streams_created, 1);
    assert_eq!(alice.score, 10);
    assert_eq!(checkpoint(&store).await, Some(500));
}

#[tokio::test]
async fn checkpoint_never_moves_backward_without_reset() {
    let chain = MockChain::at_head(300);
    let store = Arc::new(InMemoryStorage::new());
    let engine = engine(&chain, &store, Some(100));

    let mut last = 0;
    for head in [300u64, 300, 1_800, 1_800, 1_900, 4_000] {
        chain.set_head(Some(head));
        // An explicit start without reset is ignored once a checkpoint exists.
        let req = request().from_block(5);
        engine.sync(&req).await.unwrap();
        let cp = checkpoint(&store).await.unwrap();
        assert!(cp >= last, "checkpoint regressed from {last} to {cp}");
        last = cp;
    }
    assert_eq!(last, 2_900);
}

#[tokio::test]
async fn scores_are_recomputable_from_counters() {
    let chain = MockChain::at_head(3_000);
    for i in 0..40u64 {
        let who = if i % 3 == 0 { ALICE } else { BOB };
        let block = 100 + i * 70;
        if i % 2 == 0 {
            chain.push(PROXY, created(PROXY, block, i, who, 1_000 + i));
        } else {
            chain.push(IMPL, withdrawn(IMPL, block, i, who, i));
        }
    }
    let store = Arc::new(InMemoryStorage::new());
    let engine = engine(&chain, &store, Some(100));

    loop {
        if engine.sync(&request()).await.unwrap().summary().is_none() {
            break;
        }
        for row in store.top_by_score(100).await.unwrap() {
            assert_eq!(row.score, row.streams_created * 10 + row.withdrawals_claimed * 5);
        }
    }
    let total: u64 = store
        .top_by_score(100)
        .await
        .unwrap()
        .iter()
        .map(|r| r.streams_created + r.withdrawals_claimed)
        .sum();
    assert_eq!(total, 40);
}

// ─── Reset ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reset_rewinds_checkpoint() {
    let chain = MockChain::at_head(500);
    let store = Arc::new(InMemoryStorage::new());
    let engine = engine(&chain, &store, Some(100));
    synced(engine.sync(&request()).await.unwrap());

    let summary = synced(engine.sync(&request().reset(Some(250))).await.unwrap());
    assert_eq!(summary.start, PlanStart::Reset);
    assert_eq!((summary.from_block, summary.to_block), (250, 500));

    // Reset without a height falls back to genesis.
    let summary = synced(engine.sync(&request().reset(None)).await.unwrap());
    assert_eq!(summary.from_block, 100);
}

#[tokio::test]
async fn explicit_start_is_honoured_on_first_run() {
    let chain = MockChain::at_head(500);
    let store = Arc::new(InMemoryStorage::new());
    let engine = engine(&chain, &store, Some(100));

    let summary = synced(engine.sync(&request().from_block(400)).await.unwrap());
    assert_eq!((summary.from_block, summary.to_block), (400, 500));
}

// ─── Log hygiene ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn unrelated_malformed_removed_and_duplicate_logs() {
    let chain = MockChain::at_head(500);
    let good = created(PROXY, 120, 0, ALICE, 100);
    chain.push(PROXY, good.clone());
    chain.push(PROXY, good);

    let mut unrelated = withdrawn(PROXY, 121, 1, ALICE, 1);
    unrelated.topics[0] = topic0("Transfer(address,address,uint256)");
    chain.push(PROXY, unrelated);

    let mut malformed = withdrawn(PROXY, 122, 2, ALICE, 1);
    malformed.data = "0x1234".into();
    chain.push(PROXY, malformed);

    let mut removed = withdrawn(PROXY, 123, 3, ALICE, 1);
    removed.removed = Some(true);
    chain.push(PROXY, removed);

    let store = Arc::new(InMemoryStorage::new());
    let summary = synced(engine(&chain, &store, Some(100)).sync(&request()).await.unwrap());

    assert_eq!(summary.raw_log_count, 5);
    assert_eq!(summary.events_created, 1);
    assert_eq!(summary.events_withdrawn, 0);
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.decode_errors, 1);
    assert_eq!(
        summary.events_created as usize
            + summary.events_withdrawn as usize
            + summary.skipped
            + summary.decode_errors,
        summary.raw_log_count
    );
    assert_eq!(store.get_account(ALICE).await.unwrap().unwrap().streams_created, 1);
    assert_eq!(checkpoint(&store).await, Some(500));
}

// ─── Failure paths ───────────────────────────────────────────────────────────

#[tokio::test]
async fn held_lease_blocks_the_pass() {
    let chain = MockChain::at_head(500);
    let store = Arc::new(InMemoryStorage::new());
    assert!(matches!(
        store.try_acquire_lease(NETWORK, "other-worker", 300).await.unwrap(),
        LeaseOutcome::Acquired(_)
    ));

    let err = engine(&chain, &store, Some(100)).sync(&request()).await.unwrap_err();
    assert!(matches!(err, SyncError::LeaseHeld { ref holder, .. } if holder == "other-worker"));
    assert_eq!(checkpoint(&store).await, None);
    assert!(chain.requests().is_empty());
}

#[tokio::test]
async fn head_failure_leaves_checkpoint_and_releases_lease() {
    let chain = MockChain::at_head(500);
    chain.set_head(None);
    let store = Arc::new(InMemoryStorage::new());
    let engine = engine(&chain, &store, Some(100));

    let err = engine.sync(&request()).await.unwrap_err();
    assert!(matches!(err, SyncError::Rpc(_)));
    assert!(err.is_retryable());
    assert_eq!(checkpoint(&store).await, None);

    // The lease was released: another holder can take it immediately.
    assert!(matches!(
        store.try_acquire_lease(NETWORK, "someone-else", 60).await.unwrap(),
        LeaseOutcome::Acquired(_)
    ));
    store.release_lease(NETWORK, "someone-else").await.unwrap();

    chain.set_head(Some(500));
    synced(engine.sync(&request()).await.unwrap());
    assert_eq!(checkpoint(&store).await, Some(500));
}

/// Delegates to the in-memory store but fails every window commit.
#[derive(Default)]
struct CommitFails {
    inner: InMemoryStorage,
}

#[async_trait]
impl CheckpointStore for CommitFails {
    async fn load_checkpoint(&self, network: &str) -> Result<Option<Checkpoint>, SyncError> {
        self.inner.load_checkpoint(network).await
    }

    async fn pin_checkpoint(&self, network: &str, block_number: u64) -> Result<(), SyncError> {
        self.inner.pin_checkpoint(network, block_number).await
    }

    async fn delete_checkpoint(&self, network: &str) -> Result<(), SyncError> {
        self.inner.delete_checkpoint(network).await
    }
}

#[async_trait]
impl StatsStore for CommitFails {
    async fn commit_window(&self, _commit: WindowCommit) -> Result<(), SyncError> {
        Err(SyncError::Storage("disk I/O error".into()))
    }

    async fn get_account(&self, address: &str) -> Result<Option<AccountStats>, SyncError> {
        self.inner.get_account(address).await
    }

    async fn top_by_score(&self, limit: usize) -> Result<Vec<AccountStats>, SyncError> {
        self.inner.top_by_score(limit).await
    }

    async fn count_score_above(&self, score: u64) -> Result<u64, SyncError> {
        self.inner.count_score_above(score).await
    }

    async fn account_count(&self) -> Result<u64, SyncError> {
        self.inner.account_count().await
    }

    async fn clear_accounts(&self) -> Result<u64, SyncError> {
        self.inner.clear_accounts().await
    }
}

#[async_trait]
impl LeaseStore for CommitFails {
    async fn try_acquire_lease(
        &self,
        network: &str,
        holder: &str,
        ttl_secs: u64,
    ) -> Result<LeaseOutcome, SyncError> {
        self.inner.try_acquire_lease(network, holder, ttl_secs).await
    }

    async fn release_lease(&self, network: &str, holder: &str) -> Result<(), SyncError> {
        self.inner.release_lease(network, holder).await
    }
}

#[tokio::test]
async fn failed_commit_keeps_pinned_checkpoint_and_releases_lease() {
    let chain = MockChain::at_head(500);
    chain.push(PROXY, created(PROXY, 120, 0, ALICE, 100));
    chain.push(IMPL, withdrawn(IMPL, 130, 0, BOB, 40));
    let store = Arc::new(CommitFails::default());
    let engine = SyncConfigBuilder::new()
        .max_range(1000)
        .fetch_timeout_ms(1_000)
        .holder("test-worker")
        .build(network(Some(100)), chain.clone(), store.clone());

    let err = engine.sync(&request()).await.unwrap_err();
    assert!(matches!(err, SyncError::Storage(_)), "{err:?}");

    // First run pinned genesis - 1 before fetching; nothing past it landed.
    let cp = store.load_checkpoint(NETWORK).await.unwrap().map(|c| c.block_number);
    assert_eq!(cp, Some(99));
    assert!(store.get_account(ALICE).await.unwrap().is_none());
    assert!(store.get_account(BOB).await.unwrap().is_none());
    assert_eq!(store.account_count().await.unwrap(), 0);

    assert!(matches!(
        store.try_acquire_lease(NETWORK, "someone-else", 60).await.unwrap(),
        LeaseOutcome::Acquired(_)
    ));
}

#[tokio::test]
async fn missing_contract_address_is_a_config_error() {
    let chain = MockChain::at_head(500);
    let store = Arc::new(InMemoryStorage::new());
    let mut net = network(Some(100));
    net.contract_address = String::new();
    net.implementation_addresses.clear();
    let engine = SyncConfigBuilder::new().build(net, chain.clone(), store.clone());

    let err = engine.sync(&request()).await.unwrap_err();
    assert!(err.is_config());
    assert_eq!(checkpoint(&store).await, None);
}

#[tokio::test]
async fn request_for_another_network_is_rejected() {
    let chain = MockChain::at_head(500);
    let store = Arc::new(InMemoryStorage::new());
    let err = engine(&chain, &store, Some(100))
        .sync(&SyncRequest::network("mainnet"))
        .await
        .unwrap_err();
    assert!(err.is_config());
}
