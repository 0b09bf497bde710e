//! End-to-end scenarios over the in-memory node, store and cache backend.

use std::sync::Arc;
use std::time::Duration;

use chainingest_core::{
    Block, BlockStore, HashMatch, IngestMetrics, MemoryCacheBackend, MemoryNode, Page,
    Transaction, Watermark, WindowCache, WindowConfig,
};
use chainingest_engine::{
    Backfill, BackfillStep, ErrorRecovery, Importer, Listener, ListenerTick, RecoveryOutcome,
    Verifier, VerifyOutcome,
};
use chainingest_storage::InMemoryBlockStore;

fn tx(height: u64, i: u32) -> Transaction {
    Transaction {
        hash: format!("0x{height:x}{i:02x}"),
        block_number: height,
        block_hash: format!("0xb{height:x}"),
        index: i,
        from: "0xa11ce".into(),
        to: Some("0xb0b".into()),
        value: "0xde0b6b3a7640000".into(),
        gas: 21_000,
        gas_price: 30_000_000_000,
        nonce: u64::from(i),
        input: "0x".into(),
        status: Some(1),
        gas_used: Some(21_000),
        logs: vec![],
    }
}

fn block(height: u64) -> Block {
    let transactions: Vec<_> = (0..2).map(|i| tx(height, i)).collect();
    Block {
        number: height,
        hash: format!("0xb{height:x}"),
        parent_hash: format!("0xb{:x}", height.saturating_sub(1)),
        miner: "0x95222290dd7278aa3ddd389cc1e1d165cc4bafe5".into(),
        timestamp: 1_700_000_000 + height as i64 * 12,
        gas_used: 42_000,
        gas_limit: 30_000_000,
        tx_count: transactions.len() as u32,
        transactions,
    }
}

struct Setup {
    node: Arc<MemoryNode>,
    store: Arc<InMemoryBlockStore>,
    cache: Arc<WindowCache>,
    importer: Importer,
}

fn setup(chain_tip: u64, window: usize) -> Setup {
    let node = Arc::new(MemoryNode::with_blocks((1..=chain_tip).map(block)));
    let store = Arc::new(InMemoryBlockStore::new());
    let cache = Arc::new(WindowCache::new(
        Arc::new(MemoryCacheBackend::new()),
        WindowConfig {
            capacity: window,
            latest_txs: 5,
            ttl: Duration::from_secs(3600),
        },
    ));
    let importer = Importer::new(cache.clone(), store.clone(), Arc::new(IngestMetrics::new()));
    Setup {
        node,
        store,
        cache,
        importer,
    }
}

#[tokio::test]
async fn listener_gap_fills_error_queue() {
    let s = setup(103, 10);
    let mut listener = Listener::new(s.node.clone(), s.importer.clone(), Watermark::new(100));

    let tick = listener.tick().await.unwrap();
    assert_eq!(tick, ListenerTick::Imported { height: 103, gap: 2 });
    assert_eq!(listener.watermark().height(), 103);
    assert_eq!(s.cache.error_block_heights().await.unwrap(), vec![101, 102]);
    assert_eq!(s.cache.unverified_block_heights().await.unwrap(), vec![103]);

    // recovery fills the gap
    let mut recovery = ErrorRecovery::new(s.node.clone(), s.importer.clone(), 3);
    assert_eq!(
        recovery.tick().await.unwrap(),
        RecoveryOutcome::Recovered { height: 101 }
    );
    assert_eq!(
        recovery.tick().await.unwrap(),
        RecoveryOutcome::Recovered { height: 102 }
    );
    let heights: Vec<u64> = s.store.snapshot().unwrap().iter().map(|b| b.number).collect();
    assert_eq!(heights, vec![101, 102, 103]);

    // recovered heights are history, the window still leads with the tip
    let window = s.cache.latest_blocks(Page::new(0, 1)).await.unwrap();
    assert_eq!(window[0].number, 103);
    assert!(s.cache.latest_blocks(Page::new(0, 2)).await.is_err());
}

#[tokio::test]
async fn verifier_replaces_forked_block() {
    let s = setup(50, 10);
    let mut forked = block(42);
    forked.hash = "0xdeadbeef".into();
    forked.transactions.truncate(1);
    forked.tx_count = 1;
    s.store.insert(&forked).await.unwrap();
    s.cache.insert_unverified_blocks(42).await.unwrap();

    let verifier = Verifier::new(s.node.clone(), s.importer.clone(), Arc::new(HashMatch));
    assert_eq!(
        verifier.tick().await.unwrap(),
        VerifyOutcome::Repaired { height: 42 }
    );
    assert_eq!(s.store.block_by_height(42).await.unwrap(), Some(block(42)));
    assert_eq!(verifier.tick().await.unwrap(), VerifyOutcome::Idle);
}

#[tokio::test]
async fn always_true_backfill_never_mutates_store() {
    let s = setup(30, 10);
    // a store that disagrees with the node everywhere, with holes
    for h in (1..=30).filter(|h| h % 3 != 0) {
        let mut b = block(h);
        b.hash = format!("0xstale{h}");
        s.store.insert(&b).await.unwrap();
    }
    let before = s.store.snapshot().unwrap();

    let mut backfill = Backfill::new(
        s.node.clone(),
        s.importer.clone(),
        Arc::new(|_: &Block, _: &Block| true),
        10,
        Some(25),
    );
    let mut queued = Vec::new();
    for _ in 0..40 {
        if let BackfillStep::Queued { height } = backfill.step().await.unwrap() {
            queued.push(height);
        }
    }
    assert_eq!(s.store.snapshot().unwrap(), before);
    assert!(!queued.is_empty());
    assert!(queued.iter().all(|h| h % 3 == 0));
    assert_eq!(s.cache.error_block_heights().await.unwrap(), queued);
}

#[tokio::test]
async fn always_true_backfill_over_full_store_is_read_only() {
    let s = setup(20, 10);
    for h in 1..=20 {
        let mut b = block(h);
        b.miner = "0xsomeone-else".into();
        s.store.insert(&b).await.unwrap();
    }
    let before = s.store.snapshot().unwrap();

    let mut backfill = Backfill::new(
        s.node.clone(),
        s.importer.clone(),
        Arc::new(|_: &Block, _: &Block| true),
        1,
        None,
    );
    for _ in 0..50 {
        backfill.step().await.unwrap();
    }
    assert_eq!(s.store.snapshot().unwrap(), before);
}

#[tokio::test]
async fn reimport_is_idempotent() {
    let once = setup(5, 10);
    once.importer.import(&block(3)).await.unwrap();

    let twice = setup(5, 10);
    twice.importer.import(&block(3)).await.unwrap();
    twice.importer.reimport(&block(3)).await.unwrap();
    twice.importer.reimport(&block(3)).await.unwrap();

    assert_eq!(once.store.snapshot().unwrap(), twice.store.snapshot().unwrap());
}

#[tokio::test]
async fn cache_window_holds_recent_blocks_only() {
    let s = setup(12, 4);
    for h in 1..=12 {
        s.importer.import_tip(&block(h)).await.unwrap();
    }

    let latest = s.cache.latest_blocks(Page::new(0, 4)).await.unwrap();
    assert_eq!(
        latest.iter().map(|b| b.number).collect::<Vec<_>>(),
        vec![12, 11, 10, 9]
    );
    assert!(s.cache.latest_blocks(Page::new(2, 3)).await.is_err());
    for h in 9..=12 {
        let by_height = s.cache.block_by_height(h).await.unwrap();
        let by_hash = s.cache.block_by_hash(&block(h).hash).await.unwrap();
        assert_eq!(by_height, by_hash);
        assert!(by_height.transactions.is_empty());
    }
    assert!(s.cache.block_by_height(8).await.unwrap_err().is_not_found());
    assert!(s
        .cache
        .txs_by_block_height(8, Page::default())
        .await
        .unwrap_err()
        .is_not_found());
    assert_eq!(s.cache.latest_transactions(Page::new(0, 5)).await.unwrap().len(), 5);
}

#[tokio::test]
async fn verifier_repair_keeps_one_window_entry_per_height() {
    let s = setup(5, 10);
    for h in 1..=4 {
        s.importer.import_tip(&block(h)).await.unwrap();
    }
    let mut forked = block(5);
    forked.hash = "0xdeadbeef".into();
    s.importer.import_tip(&forked).await.unwrap();
    s.cache.insert_unverified_blocks(5).await.unwrap();

    let verifier = Verifier::new(s.node.clone(), s.importer.clone(), Arc::new(HashMatch));
    assert_eq!(
        verifier.tick().await.unwrap(),
        VerifyOutcome::Repaired { height: 5 }
    );

    let window: Vec<_> = s
        .cache
        .latest_blocks(Page::new(0, 5))
        .await
        .unwrap()
        .into_iter()
        .map(|b| (b.number, b.hash))
        .collect();
    let expected: Vec<_> = (1..=5).rev().map(|h| (h, block(h).hash)).collect();
    assert_eq!(window, expected);
    assert!(s.cache.block_by_hash("0xdeadbeef").await.unwrap_err().is_not_found());
    assert_eq!(s.cache.block_by_hash(&block(5).hash).await.unwrap().number, 5);
}

#[tokio::test]
async fn historical_imports_never_reach_the_window_head() {
    let s = setup(10, 10);
    for h in [8, 9, 10] {
        s.importer.import_tip(&block(h)).await.unwrap();
    }
    // backfill repair of a stored block and recovery of a hole
    let mut stale = block(2);
    stale.hash = "0xstale".into();
    s.store.insert(&stale).await.unwrap();
    s.cache.insert_error_blocks(3, 5).await.unwrap();

    let mut backfill = Backfill::new(
        s.node.clone(),
        s.importer.clone(),
        Arc::new(HashMatch),
        2,
        Some(2),
    );
    assert_eq!(
        backfill.step().await.unwrap(),
        BackfillStep::Repaired { height: 2 }
    );
    let mut recovery = ErrorRecovery::new(s.node.clone(), s.importer.clone(), 3);
    assert_eq!(
        recovery.tick().await.unwrap(),
        RecoveryOutcome::Recovered { height: 4 }
    );

    let heights: Vec<u64> = s
        .cache
        .latest_blocks(Page::new(0, 3))
        .await
        .unwrap()
        .iter()
        .map(|b| b.number)
        .collect();
    assert_eq!(heights, vec![10, 9, 8]);
    assert!(s.cache.latest_blocks(Page::new(0, 4)).await.is_err());
    assert_eq!(s.store.block_by_height(2).await.unwrap(), Some(block(2)));
}
