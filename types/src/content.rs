//! JSON bodies carried in instruction position 3.

use crate::{
    hash::{serde_hex_bytes, TokenId, TxId, H256},
    ledger::{MatchedCustodian, MatchedRedeemCustodian},
    meta::ShardId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// === Bridge ===

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuingAcceptedContent {
    pub shard_id: ShardId,
    pub deposited_amount: u64,
    pub receiver_address: String,
    pub inc_token_id: TokenId,
    pub inc_token_name: String,
    pub tx_req_id: TxId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuingEthAcceptedContent {
    pub shard_id: ShardId,
    /// Internal (9-decimal) amount after conversion.
    pub issuing_amount: u64,
    pub receiver_address: String,
    pub inc_token_id: TokenId,
    pub tx_req_id: TxId,
    #[serde(with = "serde_hex_bytes")]
    pub uniq_eth_tx: Vec<u8>,
    #[serde(with = "serde_hex_bytes")]
    pub external_token_id: Vec<u8>,
}

// === PDE ===

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolValueChange {
    pub operator: PoolOp,
    pub value: u64,
}

impl PoolValueChange {
    pub fn add(value: u64) -> Self {
        Self {
            operator: PoolOp::Add,
            value,
        }
    }

    pub fn sub(value: u64) -> Self {
        Self {
            operator: PoolOp::Sub,
            value,
        }
    }

    pub fn apply(&self, reserve: u64) -> Option<u64> {
        match self.operator {
            PoolOp::Add => reserve.checked_add(self.value),
            PoolOp::Sub => reserve.checked_sub(self.value),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdeTradeAcceptedContent {
    pub trader_address: String,
    pub token_id_to_buy: TokenId,
    pub receive_amount: u64,
    pub token_id_to_sell: TokenId,
    pub sell_amount: u64,
    pub trading_fee: u64,
    pub token1_id: TokenId,
    pub token2_id: TokenId,
    pub token1_change: PoolValueChange,
    pub token2_change: PoolValueChange,
    pub tx_req_id: TxId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdeTradeRefundContent {
    pub trader_address: String,
    pub token_id_to_sell: TokenId,
    /// Sell amount plus trading fee.
    pub refund_amount: u64,
    pub tx_req_id: TxId,
}

/// One contribution leg: the waiting leg, or a refunded leg.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdeContributionContent {
    pub pdex_pair_id: String,
    pub contributor_address: String,
    pub token_id: TokenId,
    pub contributed_amount: u64,
    pub tx_req_id: TxId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdeMatchedContent {
    pub pdex_pair_id: String,
    pub contributor_address: String,
    pub token1_id: TokenId,
    pub token1_amount: u64,
    pub token1_returned: u64,
    pub token2_id: TokenId,
    pub token2_amount: u64,
    pub token2_returned: u64,
    pub share_amount: u64,
    /// Request IDs of the waiting leg and the matching leg.
    pub tx_req_ids: Vec<TxId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdeWithdrawalAcceptedContent {
    pub withdrawer_address: String,
    pub token1_id: TokenId,
    pub token1_amount: u64,
    pub token2_id: TokenId,
    pub token2_amount: u64,
    pub share_amount: u64,
    pub fee_amount: u64,
    pub tx_req_id: TxId,
}

// === Portal ===

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodianDepositContent {
    pub incognito_address: String,
    pub remote_addresses: BTreeMap<TokenId, String>,
    pub deposited_amount: u64,
    pub tx_req_id: TxId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortingRequestContent {
    pub unique_porting_id: String,
    pub token_id: TokenId,
    pub porter_address: String,
    pub amount: u64,
    pub custodians: Vec<MatchedCustodian>,
    pub porting_fee: u64,
    pub tx_req_id: TxId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PTokenRequestContent {
    pub unique_porting_id: String,
    pub token_id: TokenId,
    pub incognito_address: String,
    pub porting_amount: u64,
    pub proof_hash: H256,
    pub tx_req_id: TxId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRatesContent {
    pub sender_address: String,
    pub rates: BTreeMap<TokenId, u64>,
    pub tx_req_id: TxId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemRequestContent {
    pub unique_redeem_id: String,
    pub token_id: TokenId,
    pub redeemer_address: String,
    pub remote_address: String,
    pub redeem_amount: u64,
    pub custodians: Vec<MatchedRedeemCustodian>,
    pub redeem_fee: u64,
    pub tx_req_id: TxId,
}

// === Relaying ===

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayingHeaderContent {
    pub sender_address: String,
    /// base64 JSON of [`crate::relaying::RelayBlock`], as submitted.
    pub header: String,
    pub tx_req_id: TxId,
    pub block_height: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_op_serializes_as_sign() {
        let json = serde_json::to_string(&PoolValueChange::sub(5)).expect("serialize");
        assert_eq!(json, r#"{"operator":"-","value":5}"#);
    }

    #[test]
    fn pool_change_checks_bounds() {
        assert_eq!(PoolValueChange::add(5).apply(10), Some(15));
        assert_eq!(PoolValueChange::sub(11).apply(10), None);
        assert_eq!(PoolValueChange::add(1).apply(u64::MAX), None);
    }
}
