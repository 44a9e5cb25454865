//! Masked-hash proof of work.
//!
//! A proposal's PoW is keyed to the hex encoding of its pre-PoW digest:
//! the prover searches for a nonce such that the masked SHA-256 of
//! `src ‖ asciiDecimal(nonce)` begins with the delegate's difficulty
//! pattern. Masking clears bits `0x88` of each of the first `leading`
//! bytes, which restricts the leading hex nibbles to `0..=7` and makes the
//! binary difficulty patterns reachable.

use crate::error::{MinerError, MinerResult};
use ember_crypto::sha256;
use ember_primitives::Digest32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

/// Bits kept by the PoW mask
const MASK_KEEP: u8 = 0x77;

/// How many nonces a worker tries between deadline checks
const DEADLINE_STRIDE: u64 = 1024;

/// A solved PoW puzzle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintSolution {
    /// The masked digest the nonce produces
    pub hash: Digest32,
    /// The solving nonce
    pub nonce: u64,
}

/// The PoW oracle: finds a nonce whose masked hash carries a required
/// prefix, within a wall-clock budget.
pub trait Miner: Send + Sync {
    /// Search for a nonce such that `hex(mask(SHA256(src ‖ nonce)))` starts
    /// with `difficulty`. The difficulty length determines how many leading
    /// bytes are masked. Fails with [`MinerError::Timeout`] when the
    /// deadline passes without a solution.
    fn mint(&self, src: &str, difficulty: &str, timeout: Duration) -> MinerResult<MintSolution>;
}

/// Apply the PoW mask to the first `leading` bytes of a digest
pub fn masked_digest(digest: &Digest32, leading: u8) -> Digest32 {
    let mut bytes = *digest.as_bytes();
    for byte in bytes.iter_mut().take(leading as usize) {
        *byte &= MASK_KEEP;
    }
    Digest32::from_bytes(bytes)
}

/// The masked candidate digest for one `(src, nonce)` pair
pub fn pow_candidate(src: &str, nonce: u64, leading: u8) -> Digest32 {
    let mut preimage = Vec::with_capacity(src.len() + 20);
    preimage.extend_from_slice(src.as_bytes());
    preimage.extend_from_slice(nonce.to_string().as_bytes());
    masked_digest(&sha256(&preimage), leading)
}

/// Difficulty pattern for a delegate ring position: the position modulo
/// `2^leading − 1`, rendered as a binary string of width `leading`.
///
/// The modulus excludes the all-ones pattern, so every delegate maps to a
/// distinct reachable prefix and no two ring neighbours share one.
pub fn difficulty_for_index(index: u32, leading: u8) -> String {
    let leading = leading.max(1);
    let modulus = (1u32 << leading.min(31)) - 1;
    let raw = index % modulus.max(1);
    format!("{raw:0width$b}", width = leading as usize)
}

/// Verify a claimed PoW solution.
///
/// Recomputes the candidate from `(src, nonce)` and re-masks the submitted
/// hash before comparing, so a submitted hash with forbidden bits set
/// cannot smuggle in a different value.
pub fn verify_pow(
    src: &str,
    nonce: u64,
    submitted: &Digest32,
    difficulty: &str,
    leading: u8,
) -> bool {
    let candidate = pow_candidate(src, nonce, leading);
    if candidate != masked_digest(submitted, leading) {
        return false;
    }
    candidate.to_hex().starts_with(difficulty)
}

/// A multi-threaded in-process miner.
///
/// Workers stride the nonce space and race to the first solution; a shared
/// stop flag cancels the losers and the wall-clock deadline cancels
/// everyone.
#[derive(Debug, Clone)]
pub struct ThreadMiner {
    workers: usize,
}

impl ThreadMiner {
    /// Create a miner with a fixed worker count (at least one)
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }
}

impl Default for ThreadMiner {
    fn default() -> Self {
        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        Self::new(workers)
    }
}

impl Miner for ThreadMiner {
    fn mint(&self, src: &str, difficulty: &str, timeout: Duration) -> MinerResult<MintSolution> {
        let leading = difficulty.len() as u8;
        let deadline = Instant::now() + timeout;
        let stop = Arc::new(AtomicBool::new(false));
        let (solution_tx, solution_rx) = mpsc::channel();

        let mut handles = Vec::with_capacity(self.workers);
        for worker in 0..self.workers as u64 {
            let src = src.to_string();
            let difficulty = difficulty.to_string();
            let stop = Arc::clone(&stop);
            let solution_tx = solution_tx.clone();
            let step = self.workers as u64;

            handles.push(thread::spawn(move || {
                let mut nonce = worker;
                loop {
                    for _ in 0..DEADLINE_STRIDE {
                        let candidate = pow_candidate(&src, nonce, leading);
                        if candidate.to_hex().starts_with(&difficulty) {
                            let _ = solution_tx.send(MintSolution {
                                hash: candidate,
                                nonce,
                            });
                            stop.store(true, Ordering::Relaxed);
                            return;
                        }
                        nonce = nonce.wrapping_add(step);
                    }
                    if stop.load(Ordering::Relaxed) || Instant::now() >= deadline {
                        return;
                    }
                }
            }));
        }
        drop(solution_tx);

        let result = solution_rx.recv_timeout(deadline.saturating_duration_since(Instant::now()));
        stop.store(true, Ordering::Relaxed);
        for handle in handles {
            if handle.join().is_err() {
                return Err(MinerError::Worker("mining thread panicked".to_string()));
            }
        }

        result.map_err(|_| MinerError::Timeout)
    }
}
