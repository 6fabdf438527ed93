//! Producer side of a beacon height: routed actions in, one ordered instruction list out.

use crate::{
    outcome::{ActionDiagnostic, ActionOutcome},
    protocols::{bridge::IssuanceTracker, WorkingSet},
    router::RoutedActions,
    sequencer::{order_trades, QueuedTrade},
    state::State,
};
use anyhow::{Context as _, Result};
use meridian_types::{
    action::PdeTradeRequestAction,
    hash::H256,
    instruction::WireInstruction,
    ledger::{Key, Value},
    meta::{MetaType, ShardId},
    Instruction, Params,
};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Instructions of one height in their only legal order, plus what was dropped or rejected.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildOutput {
    pub instructions: Vec<Instruction>,
    pub diagnostics: Vec<ActionDiagnostic>,
}

impl BuildOutput {
    pub fn to_wire(&self) -> Vec<WireInstruction> {
        self.instructions.iter().map(Instruction::to_wire).collect()
    }

    fn record(&mut self, meta_type: MetaType, shard_id: ShardId, outcome: ActionOutcome) {
        self.instructions.extend(outcome.instructions);
        if let Some(diagnostic) = outcome.diagnostic {
            debug!(%meta_type, shard_id, reason = %diagnostic, "action not accepted");
            self.diagnostics.push(ActionDiagnostic {
                meta_type,
                shard_id,
                diagnostic,
            });
        }
    }
}

/// Exclusively owned working copy for building one height.
///
/// Reads go to the snapshot finalized at `height - 1`; every mutation stays in the
/// builder and is dropped with it.
pub struct Builder<'a, S: State> {
    pub(crate) state: &'a S,
    pub(crate) params: &'a Params,
    pub(crate) height: u64,
    pub(crate) working: WorkingSet,
    pub(crate) issuance: IssuanceTracker,
    pub(crate) proofs_used: BTreeSet<H256>,
    pub(crate) completed_porting: BTreeSet<String>,
}

impl<'a, S: State> Builder<'a, S> {
    pub async fn load(state: &'a S, params: &'a Params, height: u64) -> Result<Self> {
        let working = WorkingSet::load(state)
            .await
            .with_context(|| format!("load working set (height={height})"))?;
        Ok(Self {
            state,
            params,
            height,
            working,
            issuance: IssuanceTracker::default(),
            proofs_used: BTreeSet::new(),
            completed_porting: BTreeSet::new(),
        })
    }

    pub(crate) async fn snapshot(&self, key: Key) -> Result<Option<Value>> {
        self.state
            .get(&key)
            .await
            .with_context(|| format!("read {key:?} (height={})", self.height))
    }

    pub async fn build(mut self, routed: RoutedActions) -> Result<BuildOutput> {
        let mut output = BuildOutput {
            instructions: Vec::new(),
            diagnostics: routed.diagnostics,
        };

        // Bridge issuance, plain and ETH interleaved.
        for action in routed.issuing.iter() {
            let outcome = match action.meta_type {
                MetaType::IssuingEthRequest => self.process_eth_issuing(action).await?,
                _ => self.process_issuing(action).await?,
            };
            output.record(action.meta_type, action.shard_id, outcome);
        }

        // PDE: trades (ordered), withdrawals, contributions.
        let mut trades = Vec::new();
        for action in routed.pde_trades.iter() {
            match action.decode::<PdeTradeRequestAction>() {
                Ok(request) => trades.push(QueuedTrade {
                    shard_id: action.shard_id,
                    request,
                }),
                Err(err) => output.record(
                    action.meta_type,
                    action.shard_id,
                    ActionOutcome::malformed(err),
                ),
            }
        }
        for trade in order_trades(trades, &self.working.pde.pool_pairs) {
            let outcome = self.process_trade(&trade)?;
            output.record(MetaType::PdeTradeRequest, trade.shard_id, outcome);
        }
        for action in routed.pde_withdrawals.iter() {
            let outcome = self.process_withdrawal(action)?;
            output.record(action.meta_type, action.shard_id, outcome);
        }
        for action in routed.pde_contributions.iter() {
            let outcome = self.process_contribution(action)?;
            output.record(action.meta_type, action.shard_id, outcome);
        }

        // Portal, in stage order.
        for action in routed.custodian_deposits.iter() {
            let outcome = self.process_custodian_deposit(action)?;
            output.record(action.meta_type, action.shard_id, outcome);
        }
        for action in routed.porting_requests.iter() {
            let outcome = self.process_porting_request(action).await?;
            output.record(action.meta_type, action.shard_id, outcome);
        }
        for action in routed.ptoken_requests.iter() {
            let outcome = self.process_ptoken_request(action).await?;
            output.record(action.meta_type, action.shard_id, outcome);
        }
        for action in routed.exchange_rates.iter() {
            let outcome = self.process_exchange_rates(action)?;
            output.record(action.meta_type, action.shard_id, outcome);
        }
        for action in routed.redeem_requests.iter() {
            let outcome = self.process_redeem_request(action).await?;
            output.record(action.meta_type, action.shard_id, outcome);
        }

        // Relaying: chains in fixed order, reported heights ascending.
        for (chain, heights) in routed.relaying {
            for queued in heights.into_values().flatten() {
                let outcome = self.process_relaying_header(chain, &queued);
                output.record(chain.meta_type(), queued.shard_id, outcome);
            }
        }

        info!(
            height = self.height,
            instructions = output.instructions.len(),
            diagnostics = output.diagnostics.len(),
            "built beacon instructions"
        );
        Ok(output)
    }
}
