use powchain::blockchain::{setup_genesis_block, unix_time, BlockChain, BlockHeader, Genesis};
use powchain::config::{ChainConfig, MinerConfig};
use powchain::consensus::{Engine, FixedDifficulty, Pow};
use powchain::mempool::Mempool;
use powchain::miner::{Miner, MinerState};
use powchain::persistence::{MemoryStore, Store};
use powchain::signal::Quit;
use powchain::transaction::Transaction;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn setup(difficulty: u64) -> (Arc<Pow>, Arc<BlockChain>) {
    let db: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let genesis = Genesis {
        nonce: 0,
        timestamp: unix_time() - 3_600,
        extra_data: vec![],
        difficulty: Some(difficulty),
        coinbase: [0; 32],
        number: 0,
        parent_hash: [0; 32],
    };
    setup_genesis_block(db.as_ref(), Some(&genesis)).unwrap();
    let engine = Arc::new(Pow::new(FixedDifficulty(difficulty)));
    let chain = BlockChain::new(db, engine.clone(), ChainConfig::default()).unwrap();
    (engine, chain)
}

#[test]
fn sealed_block_passes_full_import() {
    let (engine, chain) = setup(500);
    engine.set_threads(2);

    let parent = chain.current_block();
    let mut header = BlockHeader {
        parent_hash: parent.hash(),
        number: 1,
        timestamp: parent.timestamp() + 10,
        difficulty: 0,
        nonce: 0,
        coinbase: [9; 32],
        extra: b"sealed".to_vec(),
        tx_root: [0; 32],
    };
    engine.prepare(chain.as_ref(), &mut header).unwrap();
    assert_eq!(header.difficulty, 500);
    let block = engine
        .finalize(header, vec![Transaction::new(b"tx".to_vec())])
        .unwrap();

    let sealed = engine.seal(&block, &Quit::new()).unwrap().unwrap();
    assert_eq!(sealed.header.seal_hash(), block.header.seal_hash());
    engine.verify_seal(&sealed.header).unwrap();

    assert_eq!(chain.insert_chain(std::slice::from_ref(&sealed)), (1, Ok(())));
    assert_eq!(chain.current_block(), sealed);
    chain.stop();
}

#[test]
fn miner_extends_the_chain_until_stopped() {
    let (engine, chain) = setup(1);
    engine.set_threads(1);
    let mempool = Arc::new(Mempool::new());
    mempool.add_transaction(Transaction::new(b"first".to_vec())).unwrap();
    let config = MinerConfig {
        recommit_interval_ms: 100,
        confirmation_depth: 1,
        ..MinerConfig::default()
    };
    let miner = Miner::new(chain.clone(), engine, mempool, &config).unwrap();

    miner.start([1; 32]);
    let started = Instant::now();
    while started.elapsed() < Duration::from_secs(20) && chain.current_block().number() < 2 {
        thread::sleep(Duration::from_millis(20));
    }
    miner.stop();
    assert!(!miner.is_mining());
    let height = chain.current_block().number();
    assert!(height >= 2);

    // Every mined block links to its predecessor and carries our coinbase.
    for number in 1..=height {
        let block = chain.get_block_by_number(number).unwrap().unwrap();
        let parent = chain.get_header_by_number(number - 1).unwrap().unwrap();
        assert_eq!(block.parent_hash(), parent.hash());
        assert_eq!(block.header.coinbase, [1; 32]);
    }
    assert!(miner.pending_block().is_some());

    miner.close();
    assert_eq!(miner.state(), MinerState::Idle);
    chain.stop();
}
