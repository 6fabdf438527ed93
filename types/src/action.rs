//! Shard-produced actions and their typed payloads.
//!
//! A shard bag entry is `[metaType, base64(JSON)]`. Payloads decode lazily through
//! [`Action::decode`] so a malformed entry only costs its own processing.

use crate::{
    hash::{serde_hex_bytes, TokenId, TxId, H256},
    meta::{MetaType, ShardId},
};
use base64::{engine::general_purpose, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Payload decoding failure for one action or instruction field.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid base64 payload: {0}")]
    Base64(String),
    #[error("invalid JSON payload: {0}")]
    Json(String),
}

/// Encodes a payload the way shards and the beacon carry it.
pub fn encode_payload<T: Serialize>(value: &T) -> String {
    // Serializing plain data structs with string map keys cannot fail.
    let json = serde_json::to_vec(value).unwrap_or_default();
    general_purpose::STANDARD.encode(json)
}

pub fn decode_payload<T: DeserializeOwned>(payload: &str) -> Result<T, DecodeError> {
    let bytes = general_purpose::STANDARD
        .decode(payload)
        .map_err(|err| DecodeError::Base64(err.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|err| DecodeError::Json(err.to_string()))
}

/// Raw per-shard instruction bag handed to the collector.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardInstructionBag(pub BTreeMap<ShardId, Vec<Vec<String>>>);

impl ShardInstructionBag {
    /// Decodes the action container. A failure here aborts the whole height.
    pub fn from_json(bytes: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(bytes).map_err(|err| DecodeError::Json(err.to_string()))
    }

    pub fn push(&mut self, shard_id: ShardId, entry: Vec<String>) {
        self.0.entry(shard_id).or_default().push(entry);
    }
}

/// A collected action, still carrying its undecoded payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Action {
    pub meta_type: MetaType,
    pub shard_id: ShardId,
    pub payload: String,
}

impl Action {
    pub fn new<T: Serialize>(meta_type: MetaType, shard_id: ShardId, body: &T) -> Self {
        Self {
            meta_type,
            shard_id,
            payload: encode_payload(body),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        decode_payload(&self.payload)
    }

    /// Wire form inside a shard bag.
    pub fn to_wire(&self) -> Vec<String> {
        vec![self.meta_type.code().to_string(), self.payload.clone()]
    }
}

// === Bridge ===

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuingRequest {
    pub receiver_address: String,
    pub deposited_amount: u64,
    pub token_id: TokenId,
    pub token_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuingRequestAction {
    pub meta: IssuingRequest,
    pub tx_req_id: TxId,
}

/// ETH-side deposit, already parsed from its receipt by the submitting shard.
/// `amount` is in the external token's own units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuingEthRequest {
    pub inc_token_id: TokenId,
    #[serde(with = "serde_hex_bytes")]
    pub external_token_id: Vec<u8>,
    pub amount: u128,
    pub receiver_address: String,
    #[serde(with = "serde_hex_bytes")]
    pub uniq_eth_tx: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuingEthRequestAction {
    pub meta: IssuingEthRequest,
    pub tx_req_id: TxId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractingRequest {
    pub burner_address: String,
    pub burned_amount: u64,
    pub token_id: TokenId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractingReqAction {
    pub meta: ContractingRequest,
    pub tx_req_id: TxId,
}

// === PDE ===

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdeTradeRequest {
    pub token_id_to_buy: TokenId,
    pub token_id_to_sell: TokenId,
    pub sell_amount: u64,
    pub min_acceptable_amount: u64,
    pub trading_fee: u64,
    pub trader_address: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdeTradeRequestAction {
    pub meta: PdeTradeRequest,
    pub tx_req_id: TxId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdeContribution {
    pub pdex_pair_id: String,
    pub contributor_address: String,
    pub contributed_amount: u64,
    pub token_id: TokenId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdeContributionAction {
    pub meta: PdeContribution,
    pub tx_req_id: TxId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdeWithdrawalRequest {
    pub withdrawer_address: String,
    pub token1_id: TokenId,
    pub token2_id: TokenId,
    pub share_amount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdeWithdrawalRequestAction {
    pub meta: PdeWithdrawalRequest,
    pub tx_req_id: TxId,
}

// === Portal ===

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalCustodianDeposit {
    pub incognito_address: String,
    /// Remote address per portal token the custodian can receive on.
    pub remote_addresses: BTreeMap<TokenId, String>,
    pub deposited_amount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalCustodianDepositAction {
    pub meta: PortalCustodianDeposit,
    pub tx_req_id: TxId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalUserRegister {
    pub unique_register_id: String,
    pub incognito_address: String,
    pub ptoken_id: TokenId,
    pub register_amount: u64,
    pub porting_fee: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalUserRegisterAction {
    pub meta: PortalUserRegister,
    pub tx_req_id: TxId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalRequestPTokens {
    pub unique_porting_id: String,
    pub token_id: TokenId,
    pub incognito_address: String,
    pub porting_amount: u64,
    /// base64 JSON of [`PortingProof`].
    pub porting_proof: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalRequestPTokensAction {
    pub meta: PortalRequestPTokens,
    pub tx_req_id: TxId,
}

/// Payment on the relayed chain backing a ptoken request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortingProof {
    pub block_height: u64,
    pub tx_hash: TxId,
    pub memo: String,
    pub outputs: Vec<ProofOutput>,
}

impl PortingProof {
    /// SHA-256 of the canonical JSON form, so re-encoded copies of one proof collide.
    pub fn hash(&self) -> H256 {
        H256::digest(&serde_json::to_vec(self).unwrap_or_default())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOutput {
    pub address: String,
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub token_id: TokenId,
    pub rate: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalExchangeRates {
    pub sender_address: String,
    pub rates: Vec<ExchangeRate>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalExchangeRatesAction {
    pub meta: PortalExchangeRates,
    pub tx_req_id: TxId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalRedeemRequest {
    pub unique_redeem_id: String,
    pub token_id: TokenId,
    pub redeem_amount: u64,
    pub redeemer_address: String,
    pub remote_address: String,
    pub redeem_fee: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalRedeemRequestAction {
    pub meta: PortalRedeemRequest,
    pub tx_req_id: TxId,
}

// === Relaying ===

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayingHeader {
    pub sender_address: String,
    /// base64 JSON of [`crate::relaying::RelayBlock`].
    pub header: String,
    pub block_height: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayingHeaderAction {
    pub meta: RelayingHeader,
    pub tx_req_id: TxId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::H256;

    fn trade() -> PdeTradeRequestAction {
        PdeTradeRequestAction {
            meta: PdeTradeRequest {
                token_id_to_buy: H256::digest(b"buy"),
                token_id_to_sell: H256::digest(b"sell"),
                sell_amount: 100,
                min_acceptable_amount: 1,
                trading_fee: 10,
                trader_address: "trader".into(),
            },
            tx_req_id: H256::digest(b"tx"),
        }
    }

    #[test]
    fn action_payload_round_trip() {
        let action = Action::new(MetaType::PdeTradeRequest, 3, &trade());
        let wire = action.to_wire();
        assert_eq!(wire[0], "91");
        let decoded: PdeTradeRequestAction = action.decode().expect("decode");
        assert_eq!(decoded, trade());
    }

    #[test]
    fn invalid_base64_is_a_decode_error() {
        let action = Action {
            meta_type: MetaType::PdeTradeRequest,
            shard_id: 0,
            payload: "%%% not base64 %%%".into(),
        };
        let err = action.decode::<PdeTradeRequestAction>().unwrap_err();
        assert!(matches!(err, DecodeError::Base64(_)));
    }

    #[test]
    fn wrong_shape_is_a_json_error() {
        let action = Action::new(MetaType::PdeTradeRequest, 0, &"just a string");
        let err = action.decode::<PdeTradeRequestAction>().unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn eth_amount_beyond_u64_decodes() {
        let action = IssuingEthRequestAction {
            meta: IssuingEthRequest {
                inc_token_id: H256::digest(b"peth"),
                external_token_id: vec![0u8; 20],
                amount: 20_000_000_000_000_000_000,
                receiver_address: "alice".into(),
                uniq_eth_tx: vec![1, 2, 3],
            },
            tx_req_id: H256::digest(b"eth"),
        };
        let encoded = encode_payload(&action);
        let decoded: IssuingEthRequestAction = decode_payload(&encoded).expect("decode");
        assert_eq!(decoded.meta.amount, 20_000_000_000_000_000_000);
    }

    #[test]
    fn bag_container_decode_failure_is_reported() {
        assert!(ShardInstructionBag::from_json(b"{not json").is_err());
        let bag = ShardInstructionBag::from_json(br#"{"1":[["91","abc"]]}"#).expect("decode");
        assert_eq!(bag.0[&1][0][0], "91");
    }

    #[test]
    fn reencoded_proof_keeps_its_hash() {
        let proof = PortingProof {
            block_height: 7,
            tx_hash: H256::digest(b"btc-tx"),
            memo: "PS1-porting-1".into(),
            outputs: vec![ProofOutput {
                address: "cust-remote".into(),
                amount: 1_000,
            }],
        };
        let pretty = serde_json::to_vec_pretty(&proof).expect("serialize");
        let reencoded = general_purpose::STANDARD.encode(pretty);
        assert_ne!(reencoded, encode_payload(&proof));

        let decoded: PortingProof = decode_payload(&reencoded).expect("decode");
        assert_eq!(decoded.hash(), proof.hash());

        let mut other = proof.clone();
        other.outputs[0].amount += 1;
        assert_ne!(other.hash(), proof.hash());
    }
}
