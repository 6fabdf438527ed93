//! Header relaying: verifies submitted external headers against the local chain copy.

use crate::{builder::Builder, outcome::ActionOutcome, router::QueuedRelayHeader, state::State};
use meridian_types::{
    action::decode_payload,
    content::RelayingHeaderContent,
    instruction::RelayingStatus,
    relaying::{LastCommit, RelayBlock, RelayChain, RelayHeader, RelayingHeaderChainState},
    Instruction,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderChainError {
    #[error("last commit {commit} does not match parent {parent}")]
    CommitMismatch { commit: String, parent: String },
}

/// Chain-continuity verifier for one relayed chain.
pub trait HeaderChain {
    fn latest_header(&self) -> &RelayHeader;

    /// Returns `Ok(true)` when the header extends the chain or is parked as
    /// pending, `Ok(false)` when it is invalid.
    fn receive_new_header(
        &mut self,
        header: RelayHeader,
        last_commit: &LastCommit,
    ) -> Result<bool, HeaderChainError>;
}

/// [`RelayingHeaderChainState`] with its pending-set bound.
pub struct BoundedChain<'a> {
    pub state: &'a mut RelayingHeaderChainState,
    pub max_pending: usize,
}

impl HeaderChain for BoundedChain<'_> {
    fn latest_header(&self) -> &RelayHeader {
        &self.state.latest
    }

    fn receive_new_header(
        &mut self,
        header: RelayHeader,
        last_commit: &LastCommit,
    ) -> Result<bool, HeaderChainError> {
        if last_commit.block_hash != header.last_block_hash {
            return Err(HeaderChainError::CommitMismatch {
                commit: last_commit.block_hash.to_hex(),
                parent: header.last_block_hash.to_hex(),
            });
        }

        let latest = &self.state.latest;
        if header.height <= latest.height {
            return Ok(false);
        }
        if header.height == latest.height + 1 {
            if header.last_block_hash != latest.hash() {
                return Ok(false);
            }
            let tip = header.height;
            self.state.latest = header;
            self.state.unconfirmed.retain(|pending| pending.height > tip);
            return Ok(true);
        }

        let hash = header.hash();
        if self
            .state
            .unconfirmed
            .iter()
            .any(|pending| pending.hash() == hash)
        {
            return Ok(false);
        }
        if self.state.unconfirmed.len() >= self.max_pending {
            return Ok(false);
        }
        self.state.unconfirmed.push(header);
        self.state
            .unconfirmed
            .sort_by_cached_key(|pending| (pending.height, pending.hash()));
        Ok(true)
    }
}

/// Runs one decoded relaying submission through the verifier.
///
/// `chain_state` is `None` when the chain was never seeded. On rejection the chain
/// is left unchanged.
pub fn verify_relaying_header(
    chain_state: Option<&mut RelayingHeaderChainState>,
    max_pending: usize,
    declared_height: u64,
    encoded_block: &str,
) -> Result<RelayingStatus, String> {
    let chain_state = chain_state.ok_or("no chain state")?;
    let block: RelayBlock =
        decode_payload(encoded_block).map_err(|err| format!("undecodable header: {err}"))?;
    if block.header.height != declared_height {
        return Err(format!(
            "declared height {declared_height} differs from header height {}",
            block.header.height
        ));
    }

    let prior = chain_state.latest.height;
    let mut chain = BoundedChain {
        state: chain_state,
        max_pending,
    };
    match chain.receive_new_header(block.header, &block.last_commit) {
        Ok(true) if chain.latest_header().height == prior + 1 => Ok(RelayingStatus::Confirmed),
        Ok(true) => Ok(RelayingStatus::Unconfirmed),
        Ok(false) => Err("header failed verification".to_string()),
        Err(err) => Err(err.to_string()),
    }
}

impl<'a, S: State> Builder<'a, S> {
    pub(crate) fn process_relaying_header(
        &mut self,
        chain: RelayChain,
        queued: &QueuedRelayHeader,
    ) -> ActionOutcome {
        let meta = &queued.action.meta;
        let content = RelayingHeaderContent {
            sender_address: meta.sender_address.clone(),
            header: meta.header.clone(),
            tx_req_id: queued.action.tx_req_id,
            block_height: meta.block_height,
        };
        let verdict = verify_relaying_header(
            self.working.chains.get_mut(&chain),
            self.params.max_pending_headers,
            meta.block_height,
            &meta.header,
        );
        let (status, reason) = match verdict {
            Ok(status) => (status, None),
            Err(reason) => (RelayingStatus::Rejected, Some(reason)),
        };
        let instruction = Instruction::RelayingHeader {
            chain,
            shard_id: queued.shard_id,
            status,
            content,
        };
        match reason {
            None => ActionOutcome::accepted(instruction),
            Some(reason) => ActionOutcome::rejected(instruction, reason),
        }
    }
}
