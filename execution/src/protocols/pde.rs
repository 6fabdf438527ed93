//! PDE: constant-product pools, two-leg contributions and share withdrawals.

use super::{integer_sqrt, mul_div, mul_div_ceil, EffectError};
use crate::{builder::Builder, outcome::ActionOutcome, sequencer::QueuedTrade, state::State};
use anyhow::{Context as _, Result};
use meridian_types::{
    action::{Action, PdeContributionAction, PdeWithdrawalRequestAction},
    content::{
        PdeContributionContent, PdeMatchedContent, PdeTradeAcceptedContent,
        PdeTradeRefundContent, PdeWithdrawalAcceptedContent, PoolValueChange,
    },
    hash::TokenId,
    instruction::ContributionOutcome,
    ledger::{PdePoolPair, PdeState, PoolPairKey, WaitingContribution},
    meta::ShardId,
    Instruction, Verdict,
};

fn pool_label(key: &PoolPairKey) -> String {
    format!("{}-{}", key.token1, key.token2)
}

/// Amount of the other token received for selling `sell_amount` of `sell_token`.
///
/// The remaining buy reserve is rounded up, so any rounding favors the pool.
/// `None` when the pool cannot trade or the trade would receive nothing.
pub fn quote_trade(pool: &PdePoolPair, sell_token: &TokenId, sell_amount: u64) -> Option<u64> {
    let (sell_pool, buy_pool) = pool.reserves_for(sell_token)?;
    if sell_pool == 0 || buy_pool == 0 || sell_amount == 0 {
        return None;
    }
    let new_sell_pool = sell_pool.checked_add(sell_amount)?;
    let new_buy_pool = mul_div_ceil(sell_pool, buy_pool, new_sell_pool)?;
    let receive = buy_pool - new_buy_pool;
    (receive > 0).then_some(receive)
}

/// Splits `fee` across contributors by share. Remainders are dropped.
fn credit_trading_fee(pool: &mut PdePoolPair, fee: u64) {
    let total = pool.total_shares();
    if total == 0 || fee == 0 {
        return;
    }
    let PdePoolPair {
        shares,
        trading_fees,
        ..
    } = pool;
    for (contributor, share) in shares.iter() {
        let portion = (fee as u128 * *share as u128 / total) as u64;
        if portion > 0 {
            let accrued = trading_fees.entry(contributor.clone()).or_default();
            *accrued = accrued.saturating_add(portion);
        }
    }
}

pub fn apply_trade(
    pde: &mut PdeState,
    content: &PdeTradeAcceptedContent,
) -> Result<(), EffectError> {
    let key = PoolPairKey::new(content.token1_id, content.token2_id);
    let pool = pde
        .pool_pairs
        .get_mut(&key)
        .ok_or_else(|| EffectError::MissingPool(pool_label(&key)))?;
    let token1 = content
        .token1_change
        .apply(pool.token1_pool_value)
        .ok_or(EffectError::OutOfRange("token1 reserve"))?;
    let token2 = content
        .token2_change
        .apply(pool.token2_pool_value)
        .ok_or(EffectError::OutOfRange("token2 reserve"))?;
    pool.token1_pool_value = token1;
    pool.token2_pool_value = token2;
    credit_trading_fee(pool, content.trading_fee);
    Ok(())
}

pub fn apply_contribution(
    pde: &mut PdeState,
    shard_id: ShardId,
    outcome: &ContributionOutcome,
) -> Result<(), EffectError> {
    match outcome {
        ContributionOutcome::Waiting(leg) => {
            pde.waiting_contributions.insert(
                leg.pdex_pair_id.clone(),
                WaitingContribution {
                    pdex_pair_id: leg.pdex_pair_id.clone(),
                    shard_id,
                    contributor_address: leg.contributor_address.clone(),
                    token_id: leg.token_id,
                    amount: leg.contributed_amount,
                    tx_req_id: leg.tx_req_id,
                },
            );
        }
        ContributionOutcome::Refund(leg) => {
            pde.waiting_contributions.remove(&leg.pdex_pair_id);
        }
        ContributionOutcome::Matched(matched) => {
            pde.waiting_contributions.remove(&matched.pdex_pair_id);
            let key = PoolPairKey::new(matched.token1_id, matched.token2_id);
            let pool = pde
                .pool_pairs
                .entry(key)
                .or_insert_with(|| PdePoolPair::new(key));
            let token1 = pool
                .token1_pool_value
                .checked_add(matched.token1_amount)
                .ok_or(EffectError::OutOfRange("token1 reserve"))?;
            let token2 = pool
                .token2_pool_value
                .checked_add(matched.token2_amount)
                .ok_or(EffectError::OutOfRange("token2 reserve"))?;
            let share = pool
                .shares
                .get(&matched.contributor_address)
                .copied()
                .unwrap_or_default()
                .checked_add(matched.share_amount)
                .ok_or(EffectError::OutOfRange("share"))?;
            pool.token1_pool_value = token1;
            pool.token2_pool_value = token2;
            pool.shares.insert(matched.contributor_address.clone(), share);
        }
    }
    Ok(())
}

pub fn apply_withdrawal(
    pde: &mut PdeState,
    content: &PdeWithdrawalAcceptedContent,
) -> Result<(), EffectError> {
    let key = PoolPairKey::new(content.token1_id, content.token2_id);
    let pool = pde
        .pool_pairs
        .get_mut(&key)
        .ok_or_else(|| EffectError::MissingPool(pool_label(&key)))?;
    let token1 = pool
        .token1_pool_value
        .checked_sub(content.token1_amount)
        .ok_or(EffectError::OutOfRange("token1 reserve"))?;
    let token2 = pool
        .token2_pool_value
        .checked_sub(content.token2_amount)
        .ok_or(EffectError::OutOfRange("token2 reserve"))?;
    let owned = pool
        .shares
        .get(&content.withdrawer_address)
        .copied()
        .unwrap_or_default()
        .checked_sub(content.share_amount)
        .ok_or(EffectError::OutOfRange("share"))?;

    pool.token1_pool_value = token1;
    pool.token2_pool_value = token2;
    if owned == 0 {
        pool.shares.remove(&content.withdrawer_address);
    } else {
        pool.shares.insert(content.withdrawer_address.clone(), owned);
    }
    pool.trading_fees.remove(&content.withdrawer_address);
    Ok(())
}

/// Matches a second contribution leg against the waiting one.
fn plan_match(
    pde: &PdeState,
    waiting: &WaitingContribution,
    request: &PdeContributionAction,
) -> Result<PdeMatchedContent, &'static str> {
    let meta = &request.meta;
    let key = PoolPairKey::new(waiting.token_id, meta.token_id);
    let (amount1, amount2) = if waiting.token_id == key.token1 {
        (waiting.amount, meta.contributed_amount)
    } else {
        (meta.contributed_amount, waiting.amount)
    };

    let pool = pde.pool_pairs.get(&key);
    let total = pool.map(PdePoolPair::total_shares).unwrap_or_default();
    let (actual1, actual2, shares) = match pool.filter(|p| p.has_liquidity() && total > 0) {
        None => (amount1, amount2, integer_sqrt(amount1 as u128 * amount2 as u128)),
        Some(pool) => {
            let (reserve1, reserve2) = (pool.token1_pool_value, pool.token2_pool_value);
            let needed2 = mul_div(amount1, reserve2, reserve1).ok_or("ratio out of range")?;
            let (actual1, actual2) = if needed2 <= amount2 {
                (amount1, needed2)
            } else {
                (
                    mul_div(amount2, reserve1, reserve2).ok_or("ratio out of range")?,
                    amount2,
                )
            };
            let shares = u64::try_from(total * actual1 as u128 / reserve1 as u128)
                .map_err(|_| "share out of range")?;
            (actual1, actual2, shares)
        }
    };
    if shares == 0 {
        return Err("contribution mints no share");
    }
    if let Some(pool) = pool {
        if pool.token1_pool_value.checked_add(actual1).is_none()
            || pool.token2_pool_value.checked_add(actual2).is_none()
        {
            return Err("reserve overflow");
        }
        let owned = pool
            .shares
            .get(&meta.contributor_address)
            .copied()
            .unwrap_or_default();
        if owned.checked_add(shares).is_none() {
            return Err("share overflow");
        }
    }

    Ok(PdeMatchedContent {
        pdex_pair_id: meta.pdex_pair_id.clone(),
        contributor_address: meta.contributor_address.clone(),
        token1_id: key.token1,
        token1_amount: actual1,
        token1_returned: amount1 - actual1,
        token2_id: key.token2,
        token2_amount: actual2,
        token2_returned: amount2 - actual2,
        share_amount: shares,
        tx_req_ids: vec![waiting.tx_req_id, request.tx_req_id],
    })
}

fn plan_withdrawal(
    pde: &PdeState,
    request: &PdeWithdrawalRequestAction,
) -> Result<PdeWithdrawalAcceptedContent, &'static str> {
    let meta = &request.meta;
    if meta.token1_id == meta.token2_id {
        return Err("identical tokens");
    }
    if meta.share_amount == 0 {
        return Err("zero share");
    }
    let key = PoolPairKey::new(meta.token1_id, meta.token2_id);
    let pool = pde
        .pool_pairs
        .get(&key)
        .filter(|pool| pool.has_liquidity())
        .ok_or("pool missing or empty")?;
    let owned = pool
        .shares
        .get(&meta.withdrawer_address)
        .copied()
        .filter(|owned| *owned > 0)
        .ok_or("no share owned")?;

    let share = meta.share_amount.min(owned);
    let total = pool.total_shares();
    let token1_amount = (pool.token1_pool_value as u128 * share as u128 / total) as u64;
    let token2_amount = (pool.token2_pool_value as u128 * share as u128 / total) as u64;
    Ok(PdeWithdrawalAcceptedContent {
        withdrawer_address: meta.withdrawer_address.clone(),
        token1_id: key.token1,
        token1_amount,
        token2_id: key.token2,
        token2_amount,
        share_amount: share,
        fee_amount: pool
            .trading_fees
            .get(&meta.withdrawer_address)
            .copied()
            .unwrap_or_default(),
        tx_req_id: request.tx_req_id,
    })
}

impl<'a, S: State> Builder<'a, S> {
    pub(crate) fn process_trade(&mut self, trade: &QueuedTrade) -> Result<ActionOutcome> {
        let meta = &trade.request.meta;
        let refund = Instruction::PdeTrade {
            shard_id: trade.shard_id,
            verdict: Verdict::Rejected(PdeTradeRefundContent {
                trader_address: meta.trader_address.clone(),
                token_id_to_sell: meta.token_id_to_sell,
                refund_amount: meta.sell_amount.saturating_add(meta.trading_fee),
                tx_req_id: trade.request.tx_req_id,
            }),
        };

        if meta.token_id_to_buy == meta.token_id_to_sell {
            return Ok(ActionOutcome::rejected(refund, "identical tokens"));
        }
        let key = trade.pool_key();
        let Some(pool) = self
            .working
            .pde
            .pool_pairs
            .get(&key)
            .filter(|pool| pool.has_liquidity())
        else {
            return Ok(ActionOutcome::rejected(refund, "pool missing or empty"));
        };
        let Some(receive) = quote_trade(pool, &meta.token_id_to_sell, meta.sell_amount) else {
            return Ok(ActionOutcome::rejected(refund, "trade receives nothing"));
        };
        if receive < meta.min_acceptable_amount {
            return Ok(ActionOutcome::rejected(refund, "below minimum acceptable"));
        }

        let (token1_change, token2_change) = if meta.token_id_to_sell == key.token1 {
            (
                PoolValueChange::add(meta.sell_amount),
                PoolValueChange::sub(receive),
            )
        } else {
            (
                PoolValueChange::sub(receive),
                PoolValueChange::add(meta.sell_amount),
            )
        };
        let content = PdeTradeAcceptedContent {
            trader_address: meta.trader_address.clone(),
            token_id_to_buy: meta.token_id_to_buy,
            receive_amount: receive,
            token_id_to_sell: meta.token_id_to_sell,
            sell_amount: meta.sell_amount,
            trading_fee: meta.trading_fee,
            token1_id: key.token1,
            token2_id: key.token2,
            token1_change,
            token2_change,
            tx_req_id: trade.request.tx_req_id,
        };
        apply_trade(&mut self.working.pde, &content).context("apply accepted trade")?;
        Ok(ActionOutcome::accepted(Instruction::PdeTrade {
            shard_id: trade.shard_id,
            verdict: Verdict::Accepted(content),
        }))
    }

    pub(crate) fn process_withdrawal(&mut self, action: &Action) -> Result<ActionOutcome> {
        let request: PdeWithdrawalRequestAction = match action.decode() {
            Ok(request) => request,
            Err(err) => return Ok(ActionOutcome::malformed(err)),
        };
        match plan_withdrawal(&self.working.pde, &request) {
            Ok(content) => {
                apply_withdrawal(&mut self.working.pde, &content)
                    .context("apply accepted withdrawal")?;
                Ok(ActionOutcome::accepted(Instruction::PdeWithdrawal {
                    shard_id: action.shard_id,
                    verdict: Verdict::Accepted(content),
                }))
            }
            Err(reason) => Ok(ActionOutcome::rejected(
                Instruction::PdeWithdrawal {
                    shard_id: action.shard_id,
                    verdict: Verdict::Rejected(request),
                },
                reason,
            )),
        }
    }

    pub(crate) fn process_contribution(&mut self, action: &Action) -> Result<ActionOutcome> {
        let request: PdeContributionAction = match action.decode() {
            Ok(request) => request,
            Err(err) => return Ok(ActionOutcome::malformed(err)),
        };
        let meta = &request.meta;
        let leg = PdeContributionContent {
            pdex_pair_id: meta.pdex_pair_id.clone(),
            contributor_address: meta.contributor_address.clone(),
            token_id: meta.token_id,
            contributed_amount: meta.contributed_amount,
            tx_req_id: request.tx_req_id,
        };

        let Some(waiting) = self
            .working
            .pde
            .waiting_contributions
            .get(&meta.pdex_pair_id)
            .cloned()
        else {
            let outcome = if meta.contributed_amount == 0 {
                ContributionOutcome::Refund(leg)
            } else {
                ContributionOutcome::Waiting(leg)
            };
            let accepted = matches!(outcome, ContributionOutcome::Waiting(_));
            apply_contribution(&mut self.working.pde, action.shard_id, &outcome)
                .context("apply contribution")?;
            let instruction = Instruction::PdeContribution {
                shard_id: action.shard_id,
                outcome,
            };
            return Ok(if accepted {
                ActionOutcome::accepted(instruction)
            } else {
                ActionOutcome::rejected(instruction, "zero contribution")
            });
        };

        let matched = if waiting.token_id == meta.token_id {
            Err("both legs carry the same token")
        } else {
            plan_match(&self.working.pde, &waiting, &request)
        };
        match matched {
            Ok(matched) => {
                let outcome = ContributionOutcome::Matched(matched);
                apply_contribution(&mut self.working.pde, action.shard_id, &outcome)
                    .context("apply matched contribution")?;
                Ok(ActionOutcome::accepted(Instruction::PdeContribution {
                    shard_id: action.shard_id,
                    outcome,
                }))
            }
            Err(reason) => {
                let waiting_leg = PdeContributionContent {
                    pdex_pair_id: waiting.pdex_pair_id.clone(),
                    contributor_address: waiting.contributor_address.clone(),
                    token_id: waiting.token_id,
                    contributed_amount: waiting.amount,
                    tx_req_id: waiting.tx_req_id,
                };
                let refunds = vec![
                    (waiting.shard_id, ContributionOutcome::Refund(waiting_leg)),
                    (action.shard_id, ContributionOutcome::Refund(leg)),
                ];
                let mut instructions = Vec::with_capacity(refunds.len());
                for (shard_id, outcome) in refunds {
                    apply_contribution(&mut self.working.pde, shard_id, &outcome)
                        .context("apply contribution refund")?;
                    instructions.push(Instruction::PdeContribution { shard_id, outcome });
                }
                Ok(ActionOutcome::with_instructions(instructions, reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{pool, token};

    #[test]
    fn quote_rounds_in_pool_favor() {
        let pair = pool(token("a"), 1_000, token("b"), 1_000);
        let (sell, buy) = if pair.token1_id == token("a") {
            (pair.token1_id, pair.token2_id)
        } else {
            (pair.token2_id, pair.token1_id)
        };
        // new_buy = ceil(1000 * 1000 / 1100) = 910, receive = 90.
        assert_eq!(quote_trade(&pair, &sell, 100), Some(90));
        assert_eq!(quote_trade(&pair, &buy, 0), None);
        // ceil(1000 * 1000 / 1001) = 1000, nothing received.
        assert_eq!(quote_trade(&pair, &sell, 1), None);
        assert_eq!(quote_trade(&pair, &token("c"), 100), None);
    }

    #[test]
    fn trading_fee_split_by_share_dust_dropped() {
        let mut pair = pool(token("a"), 1_000, token("b"), 1_000);
        pair.shares.clear();
        pair.shares.insert("alice".into(), 2);
        pair.shares.insert("bob".into(), 1);
        credit_trading_fee(&mut pair, 10);
        assert_eq!(pair.trading_fees["alice"], 6);
        assert_eq!(pair.trading_fees["bob"], 3);
    }

    #[test]
    fn first_liquidity_mints_sqrt_shares() {
        let pde = PdeState::default();
        let waiting = WaitingContribution {
            pdex_pair_id: "pair".into(),
            shard_id: 0,
            contributor_address: "alice".into(),
            token_id: token("a"),
            amount: 1_000,
            tx_req_id: token("tx-1"),
        };
        let request = PdeContributionAction {
            meta: meridian_types::action::PdeContribution {
                pdex_pair_id: "pair".into(),
                contributor_address: "alice".into(),
                contributed_amount: 4_000,
                token_id: token("b"),
            },
            tx_req_id: token("tx-2"),
        };
        let matched = plan_match(&pde, &waiting, &request).expect("match");
        assert_eq!(matched.share_amount, 2_000);
        assert_eq!(matched.token1_returned + matched.token2_returned, 0);
        assert_eq!(matched.tx_req_ids, vec![token("tx-1"), token("tx-2")]);
    }

    #[test]
    fn later_liquidity_matches_pool_ratio() {
        let mut pde = PdeState::default();
        let pair = pool(token("a"), 1_000, token("b"), 2_000);
        let key = pair.key();
        pde.pool_pairs.insert(key, pair);

        let (waiting_token, other_token) = (key.token1, key.token2);
        let waiting = WaitingContribution {
            pdex_pair_id: "pair".into(),
            shard_id: 0,
            contributor_address: "carol".into(),
            token_id: waiting_token,
            amount: 100,
            tx_req_id: token("tx-1"),
        };
        let request = PdeContributionAction {
            meta: meridian_types::action::PdeContribution {
                pdex_pair_id: "pair".into(),
                contributor_address: "carol".into(),
                contributed_amount: 500,
                token_id: other_token,
            },
            tx_req_id: token("tx-2"),
        };
        let pair = &pde.pool_pairs[&key];
        let reserves = (pair.token1_pool_value, pair.token2_pool_value);
        let matched = plan_match(&pde, &waiting, &request).expect("match");
        assert_eq!(matched.token1_amount, 100);
        assert_eq!(matched.token2_amount, 100 * reserves.1 / reserves.0);
        assert_eq!(matched.token2_returned, 500 - matched.token2_amount);
        let total = pde.pool_pairs[&key].total_shares() as u64;
        assert_eq!(matched.share_amount, total * 100 / reserves.0);
    }

    #[test]
    fn withdrawal_pays_pro_rata_and_fees() {
        let mut pde = PdeState::default();
        let mut pair = pool(token("a"), 1_000, token("b"), 3_000);
        pair.shares.clear();
        pair.shares.insert("alice".into(), 75);
        pair.shares.insert("bob".into(), 25);
        pair.trading_fees.insert("bob".into(), 7);
        let key = pair.key();
        pde.pool_pairs.insert(key, pair);

        let request = PdeWithdrawalRequestAction {
            meta: meridian_types::action::PdeWithdrawalRequest {
                withdrawer_address: "bob".into(),
                token1_id: key.token2,
                token2_id: key.token1,
                share_amount: 1_000,
            },
            tx_req_id: token("tx"),
        };
        let content = plan_withdrawal(&pde, &request).expect("withdraw");
        assert_eq!(content.share_amount, 25);
        assert_eq!(content.token1_id, key.token1);
        assert_eq!(
            content.token1_amount,
            pde.pool_pairs[&key].token1_pool_value / 4
        );
        assert_eq!(content.fee_amount, 7);

        apply_withdrawal(&mut pde, &content).expect("apply");
        let pair = &pde.pool_pairs[&key];
        assert!(!pair.shares.contains_key("bob"));
        assert!(!pair.trading_fees.contains_key("bob"));

        let mut unknown = request.clone();
        unknown.meta.withdrawer_address = "mallory".into();
        assert_eq!(plan_withdrawal(&pde, &unknown), Err("no share owned"));
    }
}
