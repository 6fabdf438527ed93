//! Bridge issuance and the amount conversion shared with burning confirmations.

use crate::{builder::Builder, outcome::ActionOutcome, state::State};
use anyhow::Result;
use meridian_types::{
    action::{Action, IssuingEthRequestAction, IssuingRequestAction},
    content::{IssuingAcceptedContent, IssuingEthAcceptedContent},
    hash::TokenId,
    ledger::{Key, Value},
    params::ETH_DECIMAL_DIVISOR,
    Instruction, Verdict,
};
use std::collections::{BTreeMap, BTreeSet};

/// Converts an external amount into internal units.
///
/// Native ETH carries 18 decimals and is divided by 10^9; every other external
/// token passes through unscaled. `None` when the result does not fit `u64`.
pub fn to_internal_amount(
    external_token_id: &[u8],
    amount: u128,
    eth_token_id: &[u8],
) -> Option<u64> {
    let scaled = if external_token_id == eth_token_id {
        amount / ETH_DECIMAL_DIVISOR
    } else {
        amount
    };
    u64::try_from(scaled).ok()
}

/// Registrations accepted earlier in the height being built.
#[derive(Debug, Default)]
pub(crate) struct IssuanceTracker {
    centralized: BTreeSet<TokenId>,
    /// Internal ID to external ID.
    decentralized: BTreeMap<TokenId, Vec<u8>>,
    /// External ID to internal ID.
    external: BTreeMap<Vec<u8>, TokenId>,
    eth_txs: BTreeSet<Vec<u8>>,
}

impl IssuanceTracker {
    /// Registers a minted or burned ptoken as decentralized for the rest of the height.
    pub(crate) fn record_ptoken(&mut self, token_id: TokenId) {
        self.decentralized.entry(token_id).or_default();
    }
}

impl<'a, S: State> Builder<'a, S> {
    /// `(is_centralized, external_token_id)` of a registered token, including
    /// registrations earlier in this height.
    pub(crate) async fn registered_token(
        &self,
        token_id: &TokenId,
    ) -> Result<Option<(bool, Vec<u8>)>> {
        if self.issuance.centralized.contains(token_id) {
            return Ok(Some((true, Vec::new())));
        }
        if let Some(external) = self.issuance.decentralized.get(token_id) {
            return Ok(Some((false, external.clone())));
        }
        Ok(match self.snapshot(Key::BridgeToken(*token_id)).await? {
            Some(Value::BridgeToken(token)) => {
                Some((token.is_centralized, token.external_token_id))
            }
            _ => None,
        })
    }

    pub(crate) async fn process_issuing(&mut self, action: &Action) -> Result<ActionOutcome> {
        let request: IssuingRequestAction = match action.decode() {
            Ok(request) => request,
            Err(err) => return Ok(ActionOutcome::malformed(err)),
        };
        let meta = &request.meta;
        let rejected = Instruction::Issuing {
            shard_id: action.shard_id,
            verdict: Verdict::Rejected(request.tx_req_id),
        };

        if meta.deposited_amount == 0 {
            return Ok(ActionOutcome::rejected(rejected, "zero deposit"));
        }
        if let Some((false, _)) = self.registered_token(&meta.token_id).await? {
            return Ok(ActionOutcome::rejected(rejected, "token is decentralized"));
        }

        self.issuance.centralized.insert(meta.token_id);
        Ok(ActionOutcome::accepted(Instruction::Issuing {
            shard_id: action.shard_id,
            verdict: Verdict::Accepted(IssuingAcceptedContent {
                shard_id: action.shard_id,
                deposited_amount: meta.deposited_amount,
                receiver_address: meta.receiver_address.clone(),
                inc_token_id: meta.token_id,
                inc_token_name: meta.token_name.clone(),
                tx_req_id: request.tx_req_id,
            }),
        }))
    }

    pub(crate) async fn process_eth_issuing(&mut self, action: &Action) -> Result<ActionOutcome> {
        let request: IssuingEthRequestAction = match action.decode() {
            Ok(request) => request,
            Err(err) => return Ok(ActionOutcome::malformed(err)),
        };
        let meta = &request.meta;
        let rejected = Instruction::IssuingEth {
            shard_id: action.shard_id,
            verdict: Verdict::Rejected(request.tx_req_id),
        };

        if self.issuance.eth_txs.contains(&meta.uniq_eth_tx)
            || self
                .snapshot(Key::EthTxIssued(meta.uniq_eth_tx.clone()))
                .await?
                .is_some()
        {
            return Ok(ActionOutcome::rejected(rejected, "eth tx already issued"));
        }

        match self.registered_token(&meta.inc_token_id).await? {
            Some((true, _)) => {
                return Ok(ActionOutcome::rejected(rejected, "token is centralized"));
            }
            Some((false, external)) if external != meta.external_token_id => {
                return Ok(ActionOutcome::rejected(
                    rejected,
                    "token bound to another external token",
                ));
            }
            _ => {}
        }

        let bound = match self.issuance.external.get(&meta.external_token_id) {
            Some(token_id) => Some(*token_id),
            None => match self
                .snapshot(Key::ExternalToken(meta.external_token_id.clone()))
                .await?
            {
                Some(Value::TokenId(token_id)) => Some(token_id),
                _ => None,
            },
        };
        if bound.is_some_and(|token_id| token_id != meta.inc_token_id) {
            return Ok(ActionOutcome::rejected(
                rejected,
                "external token bound to another token",
            ));
        }

        let Some(issuing_amount) = to_internal_amount(
            &meta.external_token_id,
            meta.amount,
            &self.params.eth_external_token_id,
        )
        .filter(|amount| *amount > 0) else {
            return Ok(ActionOutcome::rejected(rejected, "amount out of range"));
        };

        self.issuance.eth_txs.insert(meta.uniq_eth_tx.clone());
        self.issuance
            .decentralized
            .insert(meta.inc_token_id, meta.external_token_id.clone());
        self.issuance
            .external
            .insert(meta.external_token_id.clone(), meta.inc_token_id);

        Ok(ActionOutcome::accepted(Instruction::IssuingEth {
            shard_id: action.shard_id,
            verdict: Verdict::Accepted(IssuingEthAcceptedContent {
                shard_id: action.shard_id,
                issuing_amount,
                receiver_address: meta.receiver_address.clone(),
                inc_token_id: meta.inc_token_id,
                tx_req_id: request.tx_req_id,
                uniq_eth_tx: meta.uniq_eth_tx.clone(),
                external_token_id: meta.external_token_id.clone(),
            }),
        }))
    }
}
