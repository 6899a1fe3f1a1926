//! Per-denomination Merkle trees over the page files.
//!
//! Leaves are SHA-256 of each page file's contents, indexed by page
//! number, with a zero hash standing in for absent files. Inner nodes
//! are SHA-256 of left then right, duplicating the last node of an odd
//! level. Trees are immutable once built; the store swaps them
//! wholesale, so readers clone an Arc and never see a partial rebuild.

use crate::error::HealError;
use raida_core::crypto::sha256;
use raida_core::{Denomination, PAGES_PER_DENOMINATION, TOTAL_DENOMINATIONS};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

const ZERO_HASH: [u8; 32] = [0u8; 32];

/// An immutable Merkle tree: levels[0] = leaves, last level = root
pub struct MerkleTree {
    levels: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    /// Build from leaf hashes, duplicating the last node of odd levels
    pub fn build(leaves: Vec<[u8; 32]>) -> MerkleTree {
        let mut levels = vec![leaves];
        while levels
            .last()
            .map(|level| level.len() > 1)
            .unwrap_or(false)
        {
            let prev = levels.last().unwrap_or_else(|| unreachable!());
            let mut next = Vec::with_capacity(prev.len().div_ceil(2));
            for pair in prev.chunks(2) {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                let mut combined = [0u8; 64];
                combined[..32].copy_from_slice(left);
                combined[32..].copy_from_slice(right);
                next.push(sha256(&combined));
            }
            levels.push(next);
        }
        MerkleTree { levels }
    }

    pub fn root(&self) -> [u8; 32] {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(ZERO_HASH)
    }

    /// Node at (level, index); level 0 is the leaves
    pub fn node(&self, level: usize, index: usize) -> Option<[u8; 32]> {
        self.levels.get(level)?.get(index).copied()
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }
}

/// Mutex-protected cache of one optional tree per denomination
pub struct MerkleStore {
    data_dir: PathBuf,
    trees: Mutex<Vec<Option<Arc<MerkleTree>>>>,
}

impl MerkleStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        MerkleStore {
            data_dir: data_dir.into(),
            trees: Mutex::new(vec![None; TOTAL_DENOMINATIONS]),
        }
    }

    fn page_path(&self, denomination: Denomination, page_no: u32) -> PathBuf {
        self.data_dir
            .join("Data")
            .join(format!("{:02x}", denomination.index()))
            .join(format!("{:02x}", page_no >> 8))
            .join(format!("{:04x}.bin", page_no))
    }

    /// Raw page-file bytes for the final healing step
    pub fn page_file_bytes(
        &self,
        denomination: Denomination,
        page_no: u32,
    ) -> Result<Vec<u8>, HealError> {
        Ok(std::fs::read(self.page_path(denomination, page_no))?)
    }

    /// Hash every page file of one denomination and swap in a new tree
    pub fn rebuild_denomination(&self, denomination: Denomination) -> Result<(), HealError> {
        let mut leaves = Vec::with_capacity(PAGES_PER_DENOMINATION as usize);
        for page_no in 0..PAGES_PER_DENOMINATION {
            match std::fs::read(self.page_path(denomination, page_no)) {
                Ok(bytes) => leaves.push(sha256(&bytes)),
                Err(e) if e.kind() == ErrorKind::NotFound => leaves.push(ZERO_HASH),
                Err(e) => return Err(e.into()),
            }
        }
        let tree = Arc::new(MerkleTree::build(leaves));
        let mut trees = self.trees.lock().unwrap_or_else(|e| e.into_inner());
        trees[denomination.index()] = Some(tree);
        Ok(())
    }

    /// Rebuild every denomination, logging failures and carrying on
    pub fn rebuild_all(&self) {
        for d in Denomination::all() {
            if let Err(e) = self.rebuild_denomination(d) {
                error!(denomination = %d, "integrity rebuild failed: {e}");
            }
        }
        debug!("integrity trees rebuilt");
    }

    /// Snapshot of a denomination's tree, if one has been built
    pub fn snapshot(&self, denomination: Denomination) -> Option<Arc<MerkleTree>> {
        self.trees.lock().unwrap_or_else(|e| e.into_inner())[denomination.index()].clone()
    }

    pub fn root(&self, denomination: Denomination) -> Option<[u8; 32]> {
        self.snapshot(denomination).map(|t| t.root())
    }

    pub fn node(
        &self,
        denomination: Denomination,
        level: usize,
        index: usize,
    ) -> Option<[u8; 32]> {
        self.snapshot(denomination)?.node(level, index)
    }
}

/// Background thread rebuilding the trees on a fixed period
pub struct IntegrityWorker {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl IntegrityWorker {
    pub fn spawn(store: Arc<MerkleStore>, period: Duration) -> std::io::Result<IntegrityWorker> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("integrity".into())
            .spawn(move || {
                info!("integrity worker started");
                const TICK: Duration = Duration::from_millis(250);
                let mut since_rebuild = period; // rebuild immediately on start
                while !flag.load(Ordering::Relaxed) {
                    if since_rebuild >= period {
                        since_rebuild = Duration::ZERO;
                        store.rebuild_all();
                    }
                    thread::sleep(TICK);
                    since_rebuild += TICK;
                }
            })?;

        Ok(IntegrityWorker {
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for IntegrityWorker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
