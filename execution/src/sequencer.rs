//! Trade ordering.
//!
//! Trades against a pool with reserves run in descending fee/sell ratio so that
//! higher-paying trades see the better price. Trades against a missing or empty
//! pool run afterwards.

use meridian_types::{
    action::PdeTradeRequestAction,
    ledger::{PdePoolPair, PoolPairKey},
    meta::ShardId,
};
use std::{cmp::Ordering, collections::BTreeMap};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedTrade {
    pub shard_id: ShardId,
    pub request: PdeTradeRequestAction,
}

impl QueuedTrade {
    pub fn pool_key(&self) -> PoolPairKey {
        PoolPairKey::new(
            self.request.meta.token_id_to_buy,
            self.request.meta.token_id_to_sell,
        )
    }
}

/// Orders `a` before `b` when `a` pays the higher fee per unit sold.
///
/// `fee_a / sell_a > fee_b / sell_b` is decided as `fee_a * sell_b > fee_b * sell_a`;
/// two `u64` factors never overflow `u128`. A fee with nothing sold ranks above every
/// ratio, and a trade with neither fee nor sell amount ranks last.
pub fn compare_fee_ratio(a: &QueuedTrade, b: &QueuedTrade) -> Ordering {
    let (a, b) = (&a.request.meta, &b.request.meta);
    let empty = |fee: u64, sell: u64| fee == 0 && sell == 0;
    match (
        empty(a.trading_fee, a.sell_amount),
        empty(b.trading_fee, b.sell_amount),
    ) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }
    let lhs = b.trading_fee as u128 * a.sell_amount as u128;
    let rhs = a.trading_fee as u128 * b.sell_amount as u128;
    lhs.cmp(&rhs)
}

/// Returns `trades` in execution order.
///
/// `trades` must arrive shard-ascending, then in per-shard order; ties and the
/// unsorted tail keep that order. Pools are grouped by key ascending.
pub fn order_trades(
    trades: Vec<QueuedTrade>,
    pools: &BTreeMap<PoolPairKey, PdePoolPair>,
) -> Vec<QueuedTrade> {
    let mut sortable: BTreeMap<PoolPairKey, Vec<QueuedTrade>> = BTreeMap::new();
    let mut tail: BTreeMap<PoolPairKey, Vec<QueuedTrade>> = BTreeMap::new();
    for trade in trades {
        let key = trade.pool_key();
        let live = pools.get(&key).is_some_and(PdePoolPair::has_liquidity);
        if live {
            sortable.entry(key).or_default().push(trade);
        } else {
            tail.entry(key).or_default().push(trade);
        }
    }

    let mut ordered = Vec::new();
    for mut group in sortable.into_values() {
        // `sort_by` is stable.
        group.sort_by(compare_fee_ratio);
        ordered.extend(group);
    }
    ordered.extend(tail.into_values().flatten());
    ordered
}
