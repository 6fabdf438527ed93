//! Groups collected actions by protocol family and shard.

use crate::{
    collector::ActionsByShard,
    outcome::{ActionDiagnostic, Diagnostic},
};
use meridian_types::{
    action::{Action, RelayingHeaderAction},
    meta::{MetaType, ShardId},
    relaying::RelayChain,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Ordered multimap of actions keyed by shard. Iteration is shard-ascending, then
/// the order actions were pushed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShardActions(BTreeMap<ShardId, Vec<Action>>);

impl ShardActions {
    pub fn push(&mut self, action: Action) {
        self.0.entry(action.shard_id).or_default().push(action);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.0.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }
}

/// A relaying action decoded at routing time so it can be ordered by height.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedRelayHeader {
    pub shard_id: ShardId,
    pub action: RelayingHeaderAction,
}

/// Relaying actions per chain, then per reported external height ascending.
pub type RelayQueue = BTreeMap<RelayChain, BTreeMap<u64, Vec<QueuedRelayHeader>>>;

#[derive(Clone, Debug, Default)]
pub struct RoutedActions {
    /// Plain and ETH issuance, interleaved in original order.
    pub issuing: ShardActions,
    pub pde_trades: ShardActions,
    pub pde_withdrawals: ShardActions,
    pub pde_contributions: ShardActions,
    pub custodian_deposits: ShardActions,
    pub porting_requests: ShardActions,
    pub ptoken_requests: ShardActions,
    pub exchange_rates: ShardActions,
    pub redeem_requests: ShardActions,
    pub relaying: RelayQueue,
    /// Relaying actions that could not be decoded for ordering.
    pub diagnostics: Vec<ActionDiagnostic>,
}

pub fn route_actions(actions: &ActionsByShard) -> RoutedActions {
    let mut routed = RoutedActions::default();
    for action in actions.values().flatten() {
        let group = match action.meta_type {
            MetaType::IssuingRequest | MetaType::IssuingEthRequest => &mut routed.issuing,
            MetaType::PdeTradeRequest => &mut routed.pde_trades,
            MetaType::PdeWithdrawalRequest => &mut routed.pde_withdrawals,
            MetaType::PdeContribution => &mut routed.pde_contributions,
            MetaType::PortalCustodianDeposit => &mut routed.custodian_deposits,
            MetaType::PortalUserRegister => &mut routed.porting_requests,
            MetaType::PortalUserRequestPToken => &mut routed.ptoken_requests,
            MetaType::PortalExchangeRates => &mut routed.exchange_rates,
            MetaType::PortalRedeemRequest => &mut routed.redeem_requests,
            MetaType::RelayingBnbHeader | MetaType::RelayingBtcHeader => {
                route_relaying(&mut routed, action);
                continue;
            }
            MetaType::ContractingRequest
            | MetaType::BurningConfirm
            | MetaType::BurningConfirmForDepositToSc
            | MetaType::BurningConfirmV2
            | MetaType::BurningConfirmForDepositToScV2 => {
                debug!(meta_type = %action.meta_type, "not a beacon-processed action");
                continue;
            }
        };
        group.push(action.clone());
    }
    routed
}

fn route_relaying(routed: &mut RoutedActions, action: &Action) {
    let Some(chain) = RelayChain::from_meta_type(action.meta_type) else {
        return;
    };
    match action.decode::<RelayingHeaderAction>() {
        Ok(decoded) => routed
            .relaying
            .entry(chain)
            .or_default()
            .entry(decoded.meta.block_height)
            .or_default()
            .push(QueuedRelayHeader {
                shard_id: action.shard_id,
                action: decoded,
            }),
        Err(err) => {
            debug!(shard_id = action.shard_id, error = %err, "undecodable relaying action");
            routed.diagnostics.push(ActionDiagnostic {
                meta_type: action.meta_type,
                shard_id: action.shard_id,
                diagnostic: Diagnostic::Decode(err),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{relaying_action, tx_id};

    fn raw(meta_type: MetaType, shard_id: ShardId, payload: &str) -> Action {
        Action {
            meta_type,
            shard_id,
            payload: payload.to_string(),
        }
    }

    #[test]
    fn groups_by_family_preserving_shard_order() {
        let mut actions = ActionsByShard::new();
        actions.insert(
            0,
            vec![
                raw(MetaType::PdeTradeRequest, 0, "t0"),
                raw(MetaType::IssuingEthRequest, 0, "e0"),
            ],
        );
        actions.insert(
            2,
            vec![
                raw(MetaType::IssuingRequest, 2, "i2"),
                raw(MetaType::PdeTradeRequest, 2, "t2"),
                raw(MetaType::PortalCustodianDeposit, 2, "c2"),
            ],
        );

        let routed = route_actions(&actions);
        let issuing: Vec<_> = routed.issuing.iter().map(|a| a.payload.as_str()).collect();
        assert_eq!(issuing, vec!["e0", "i2"]);
        let trades: Vec<_> = routed.pde_trades.iter().map(|a| a.payload.as_str()).collect();
        assert_eq!(trades, vec!["t0", "t2"]);
        assert_eq!(routed.custodian_deposits.len(), 1);
        assert!(routed.redeem_requests.is_empty());
    }

    #[test]
    fn relaying_grouped_by_reported_height() {
        let mut actions = ActionsByShard::new();
        actions.insert(
            0,
            vec![relaying_action(MetaType::RelayingBnbHeader, 0, 12, "h12", tx_id(1))],
        );
        actions.insert(
            1,
            vec![
                relaying_action(MetaType::RelayingBnbHeader, 1, 11, "h11", tx_id(2)),
                raw(MetaType::RelayingBnbHeader, 1, "%%%"),
            ],
        );

        let routed = route_actions(&actions);
        let heights: Vec<_> = routed.relaying[&RelayChain::Bnb].keys().copied().collect();
        assert_eq!(heights, vec![11, 12]);
        assert_eq!(routed.relaying[&RelayChain::Bnb][&11][0].shard_id, 1);
        assert_eq!(routed.diagnostics.len(), 1);
        assert!(matches!(
            routed.diagnostics[0].diagnostic,
            Diagnostic::Decode(_)
        ));
    }
}
