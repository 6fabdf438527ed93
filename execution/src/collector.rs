//! Filters a shard instruction bag down to beacon-processed actions.

use meridian_types::{
    action::{Action, ShardInstructionBag},
    meta::{MetaType, ShardId, COMMITTEE_ACTIONS},
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Collected actions per shard, shards ascending, original order within a shard.
pub type ActionsByShard = BTreeMap<ShardId, Vec<Action>>;

/// Keeps entries whose first field is an allow-listed integer metadata type.
///
/// Committee-management entries, short entries and anything else are dropped
/// without error.
pub fn collect_stateful_actions(
    bag: &ShardInstructionBag,
    allow_list: &BTreeSet<MetaType>,
) -> ActionsByShard {
    let mut collected = ActionsByShard::new();
    for (shard_id, entries) in &bag.0 {
        for entry in entries {
            if entry.len() < 2 {
                continue;
            }
            if COMMITTEE_ACTIONS.contains(&entry[0].as_str()) {
                continue;
            }
            let Ok(code) = entry[0].parse::<i32>() else {
                debug!(shard_id = *shard_id, field = %entry[0], "dropping non-numeric instruction");
                continue;
            };
            let Some(meta_type) = MetaType::from_code(code).filter(|m| allow_list.contains(m))
            else {
                continue;
            };
            collected.entry(*shard_id).or_default().push(Action {
                meta_type,
                shard_id: *shard_id,
                payload: entry[1].clone(),
            });
        }
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn drops_committee_and_unlisted_entries() {
        let mut bag = ShardInstructionBag::default();
        bag.push(0, entry(&["stake", "a", "b"]));
        bag.push(0, entry(&["swap", "x"]));
        bag.push(0, entry(&["91", "trade-0"]));
        bag.push(0, entry(&["26", "contract"]));
        bag.push(0, entry(&["91"]));
        bag.push(0, entry(&["ninety", "bad"]));
        bag.push(0, entry(&["999", "unknown"]));
        bag.push(1, entry(&["24", "issue-1"]));

        let allow = MetaType::default_stateful().into_iter().collect();
        let collected = collect_stateful_actions(&bag, &allow);

        assert_eq!(collected.len(), 2);
        assert_eq!(collected[&0].len(), 1);
        assert_eq!(collected[&0][0].meta_type, MetaType::PdeTradeRequest);
        assert_eq!(collected[&0][0].payload, "trade-0");
        assert_eq!(collected[&1][0].meta_type, MetaType::IssuingRequest);
        assert_eq!(collected[&1][0].shard_id, 1);
    }

    #[test]
    fn preserves_order_and_respects_allow_list() {
        let mut bag = ShardInstructionBag::default();
        bag.push(3, entry(&["91", "t1"]));
        bag.push(3, entry(&["24", "i1"]));
        bag.push(3, entry(&["91", "t2"]));
        bag.push(1, entry(&["91", "t0"]));

        let allow = [MetaType::PdeTradeRequest].into_iter().collect();
        let collected = collect_stateful_actions(&bag, &allow);

        let shards: Vec<_> = collected.keys().copied().collect();
        assert_eq!(shards, vec![1, 3]);
        let payloads: Vec<_> = collected[&3].iter().map(|a| a.payload.as_str()).collect();
        assert_eq!(payloads, vec!["t1", "t2"]);
    }
}
