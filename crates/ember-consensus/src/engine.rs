//! Block-proposal state machine.
//!
//! The engine tracks at most one pending block per node and the vote
//! accumulator attached to it. All mutation happens on the owning driver
//! task; the engine itself is single-threaded state plus pure verification.
//!
//! Verification failures are local: the offending proposal or vote is
//! dropped and counted, never relayed, and never clears the pending state.

use crate::delegates::DelegateRegistry;
use crate::error::{ConsensusError, ConsensusResult};
use crate::pow::{difficulty_for_index, verify_pow, Miner};
use crate::slots::SlotClock;
use ember_crypto::{verify, KeyPair, PublicKey};
use ember_metrics::Metrics;
use ember_types::codec;
use ember_types::{BlockHeader, EnvContext, Propose, Vote, VoteItem};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Minimum signature count that justifies relaying a remote vote bundle.
///
/// This is a propagation floor, not a finality bar: commitment always uses
/// the strict two-thirds predicate.
pub const REMOTE_VOTE_FLOOR: usize = 6;

/// Where the engine is in the current round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusState {
    /// No pending block
    Idle,
    /// A block is pending, votes below threshold
    Proposed,
    /// The pending block has gathered enough votes to commit
    Committable,
}

/// The consensus state machine: proposal creation and acceptance, vote
/// creation and aggregation, threshold logic.
pub struct ConsensusEngine {
    slots: SlotClock,
    delegates: Arc<dyn DelegateRegistry>,
    miner: Arc<dyn Miner>,
    metrics: Arc<Metrics>,
    pending_block: Option<BlockHeader>,
    pending_votes: Option<Vote>,
    vote_keys: HashSet<PublicKey>,
}

impl ConsensusEngine {
    /// Create an engine in the idle state
    pub fn new(
        slots: SlotClock,
        delegates: Arc<dyn DelegateRegistry>,
        miner: Arc<dyn Miner>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            slots,
            delegates,
            miner,
            metrics,
            pending_block: None,
            pending_votes: None,
            vote_keys: HashSet::new(),
        }
    }

    /// The slot clock this engine runs on
    pub fn slots(&self) -> &SlotClock {
        &self.slots
    }

    /// Current state of the round
    pub fn state(&self) -> ConsensusState {
        match (&self.pending_block, &self.pending_votes) {
            (None, _) => ConsensusState::Idle,
            (Some(_), Some(votes)) if self.has_enough_votes(votes) => ConsensusState::Committable,
            (Some(_), _) => ConsensusState::Proposed,
        }
    }

    /// Build a signed, PoW-bound proposal for a candidate block.
    ///
    /// The keypair must be the block generator's. Mining runs under the
    /// clock's PoW deadline; on timeout the slot is abandoned and no state
    /// changes.
    pub fn create_propose(
        &self,
        keypair: &KeyPair,
        block: &BlockHeader,
        address: &str,
        env: &EnvContext,
    ) -> ConsensusResult<Propose> {
        if keypair.public_key() != block.generator_public_key {
            return Err(ConsensusError::KeyMismatch);
        }

        let digest = codec::propose_digest(
            block.height,
            &block.id,
            &block.generator_public_key,
            block.timestamp,
            address,
            env,
        )?;

        let index = self
            .delegates
            .index_of(&block.generator_public_key)
            .ok_or(ConsensusError::IndexLookupFailed)?;
        let difficulty = difficulty_for_index(index, self.slots.leading());

        let solution = self
            .miner
            .mint(&digest.to_hex(), &difficulty, self.slots.pow_timeout())?;
        let signature = keypair.sign(solution.hash.as_bytes());

        debug!(
            height = block.height,
            id = %block.id,
            nonce = solution.nonce,
            %difficulty,
            "proposal minted"
        );

        Ok(Propose {
            height: block.height,
            id: block.id.clone(),
            timestamp: block.timestamp,
            generator_public_key: block.generator_public_key,
            address: address.to_string(),
            hash: solution.hash,
            nonce: solution.nonce,
            signature,
        })
    }

    /// Verify a received proposal: PoW first, then the Ed25519 signature
    /// over the PoW-masked hash.
    pub fn accept_propose(&self, propose: &Propose, env: &EnvContext) -> ConsensusResult<()> {
        let digest = codec::propose_digest(
            propose.height,
            &propose.id,
            &propose.generator_public_key,
            propose.timestamp,
            &propose.address,
            env,
        )?;

        let index = self
            .delegates
            .index_of(&propose.generator_public_key)
            .ok_or(ConsensusError::IndexLookupFailed)?;
        let difficulty = difficulty_for_index(index, self.slots.leading());

        if !verify_pow(
            &digest.to_hex(),
            propose.nonce,
            &propose.hash,
            &difficulty,
            self.slots.leading(),
        ) {
            self.metrics.incr("consensus.propose.rejected_pow");
            return Err(ConsensusError::PowInvalid);
        }

        if !verify(
            propose.hash.as_bytes(),
            &propose.signature,
            &propose.generator_public_key,
        ) {
            self.metrics.incr("consensus.propose.rejected_signature");
            return Err(ConsensusError::SignatureInvalid);
        }

        Ok(())
    }

    /// Install a fresh pending block, discarding any previous vote
    /// accumulator.
    pub fn set_pending_block(&mut self, block: BlockHeader) {
        info!(height = block.height, id = %block.id, "pending block installed");
        self.metrics
            .gauge("consensus.pending_height", block.height as i64);
        self.vote_keys.clear();
        self.pending_votes = Some(Vote::new(block.height, block.id.clone(), block.timestamp));
        self.pending_block = Some(block);
    }

    /// Whether a block is pending for the slot `timestamp` falls into.
    /// Used to reject stale rounds.
    pub fn has_pending_block(&self, timestamp: i32) -> bool {
        self.pending_block
            .as_ref()
            .is_some_and(|block| self.slots.same_slot(block.timestamp, timestamp))
    }

    /// The currently pending block, if any
    pub fn pending_block(&self) -> Option<&BlockHeader> {
        self.pending_block.as_ref()
    }

    /// The current vote accumulator, if a block is pending
    pub fn pending_votes(&self) -> Option<&Vote> {
        self.pending_votes.as_ref()
    }

    /// Sign a vote for a block with every local delegate keypair
    pub fn create_votes(
        &self,
        keypairs: &[KeyPair],
        block: &BlockHeader,
        env: &EnvContext,
    ) -> ConsensusResult<Vote> {
        let digest = codec::vote_digest(block.height, &block.id, env)?;
        let mut vote = Vote::new(block.height, block.id.clone(), block.timestamp);
        for keypair in keypairs {
            vote.signatures.push(VoteItem {
                key: keypair.public_key(),
                signature: keypair.sign(digest.as_bytes()),
            });
        }
        Ok(vote)
    }

    /// Merge a received vote bundle into the pending accumulator.
    ///
    /// Each signature item is admitted only if its signer is new to the
    /// accumulator and its signature verifies against the pending block's
    /// vote digest; everything else is silently dropped. A bundle for a
    /// different `(height, id)` leaves the accumulator untouched. Returns a
    /// copy of the accumulator after the merge.
    pub fn add_pending_votes(&mut self, vote: &Vote, env: &EnvContext) -> ConsensusResult<Vote> {
        let Some(pending) = self.pending_block.as_ref() else {
            self.metrics.incr("consensus.votes.dropped_no_pending");
            return Err(ConsensusError::UnknownPending);
        };

        let accumulator = self
            .pending_votes
            .as_mut()
            .ok_or(ConsensusError::UnknownPending)?;

        if !vote.endorses(pending.height, &pending.id) {
            self.metrics.incr("consensus.votes.dropped_mismatch");
            debug!(
                got_height = vote.height,
                got_id = %vote.id,
                pending_height = pending.height,
                pending_id = %pending.id,
                "vote for a different block, ignoring"
            );
            return Ok(accumulator.clone());
        }

        let digest = codec::vote_digest(pending.height, &pending.id, env)?;

        for item in &vote.signatures {
            if self.vote_keys.contains(&item.key) {
                self.metrics.incr("consensus.votes.dropped_duplicate");
                continue;
            }
            if !verify(digest.as_bytes(), &item.signature, &item.key) {
                self.metrics.incr("consensus.votes.dropped_invalid");
                continue;
            }
            self.vote_keys.insert(item.key);
            accumulator.signatures.push(*item);
        }

        debug!(
            height = pending.height,
            collected = accumulator.signatures.len(),
            "votes aggregated"
        );

        Ok(accumulator.clone())
    }

    /// Whether a vote bundle clears the commit threshold:
    /// strictly more than `⌊2·delegates/3⌋` signatures.
    pub fn has_enough_votes(&self, vote: &Vote) -> bool {
        vote.signatures.len() as u64 > self.slots.vote_threshold()
    }

    /// Whether a remote vote bundle is worth relaying (a lower bar than
    /// commitment; see [`REMOTE_VOTE_FLOOR`]).
    pub fn has_enough_votes_remote(&self, vote: &Vote) -> bool {
        vote.signatures.len() >= REMOTE_VOTE_FLOOR
    }

    /// Reset all pending state. Every slot boundary lands here.
    pub fn clear_state(&mut self) {
        self.pending_block = None;
        self.pending_votes = None;
        self.vote_keys.clear();
        self.metrics.gauge("consensus.pending_height", 0);
    }
}
