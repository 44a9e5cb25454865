//! # ember-consensus
//!
//! The block-proposal consensus core of Emberchain.
//!
//! This crate provides:
//! - The slot clock mapping wall time to delegate slots
//! - The PoW oracle: masked-hash mint and verification keyed to a
//!   delegate's network address
//! - The delegate ring with position lookup
//! - The pending-block state machine: proposal creation/acceptance, vote
//!   creation, vote aggregation and threshold logic

#![warn(missing_docs)]
#![warn(clippy::all)]

mod delegates;
mod engine;
mod error;
mod pow;
mod slots;

pub use delegates::{DelegateRegistry, StaticDelegates};
pub use engine::{ConsensusEngine, ConsensusState, REMOTE_VOTE_FLOOR};
pub use error::{ConsensusError, ConsensusResult, MinerError, MinerResult};
pub use pow::{
    difficulty_for_index, masked_digest, pow_candidate, verify_pow, MintSolution, Miner,
    ThreadMiner,
};
pub use slots::SlotClock;
