//! Beacon instructions: tagged union inside the pipeline, flat strings on the wire.
//!
//! Wire layout is `[metaType, shardID, status, content]` where content is base64 of
//! canonical JSON. Two exceptions:
//! - rejected issuance carries the request transaction ID in hex,
//! - burning confirmations use a positional 8-field layout.

use crate::{
    action::{
        decode_payload, encode_payload, ContractingReqAction, DecodeError,
        PdeWithdrawalRequestAction, PortalRedeemRequestAction, PortalRequestPTokensAction,
        PortalUserRegisterAction,
    },
    content::*,
    hash::{TokenId, TxId, H256},
    meta::{status, MetaType, ShardId},
    relaying::RelayChain,
};
use commonware_utils::{from_hex, hex};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Flat wire form of an instruction.
pub type WireInstruction = Vec<String>;

/// Number of fields in a burning confirmation.
pub const BURNING_CONFIRM_FIELDS: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InstructionError {
    #[error("instruction too short (len={len})")]
    TooShort { len: usize },
    #[error("metadata type is not an integer: {0:?}")]
    InvalidMetaType(String),
    #[error("metadata type {0} has no beacon instruction form")]
    UnknownMetaType(i32),
    #[error("invalid shard id: {0:?}")]
    InvalidShard(String),
    #[error("unexpected arity for {meta} (expected={expected}, got={got})")]
    Arity {
        meta: MetaType,
        expected: usize,
        got: usize,
    },
    #[error("unknown status {status:?} for {meta}")]
    UnknownStatus { meta: MetaType, status: String },
    #[error("invalid field {0}")]
    InvalidField(&'static str),
    #[error(transparent)]
    Payload(#[from] DecodeError),
}

/// Two-way outcome of a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict<A, R> {
    Accepted(A),
    Rejected(R),
}

impl<A, R> Verdict<A, R> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContributionOutcome {
    Waiting(PdeContributionContent),
    Matched(PdeMatchedContent),
    Refund(PdeContributionContent),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayingStatus {
    Confirmed,
    Unconfirmed,
    Rejected,
}

impl RelayingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RelayingStatus::Confirmed => status::CONFIRMED,
            RelayingStatus::Unconfirmed => status::UNCONFIRMED,
            RelayingStatus::Rejected => status::REJECTED,
        }
    }
}

/// Positional burning confirmation produced by shards for external unlocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BurningConfirm {
    pub meta_type: MetaType,
    pub shard_id: ShardId,
    pub external_token_id: Vec<u8>,
    pub remote_address: String,
    /// Amount in the external token's units.
    pub amount: u128,
    pub tx_id: TxId,
    pub inc_token_id: TokenId,
    pub beacon_height: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    Issuing {
        shard_id: ShardId,
        verdict: Verdict<IssuingAcceptedContent, TxId>,
    },
    IssuingEth {
        shard_id: ShardId,
        verdict: Verdict<IssuingEthAcceptedContent, TxId>,
    },
    Contracting {
        shard_id: ShardId,
        verdict: Verdict<ContractingReqAction, ContractingReqAction>,
    },
    BurningConfirm(BurningConfirm),
    PdeTrade {
        shard_id: ShardId,
        verdict: Verdict<PdeTradeAcceptedContent, PdeTradeRefundContent>,
    },
    PdeContribution {
        shard_id: ShardId,
        outcome: ContributionOutcome,
    },
    PdeWithdrawal {
        shard_id: ShardId,
        verdict: Verdict<PdeWithdrawalAcceptedContent, PdeWithdrawalRequestAction>,
    },
    PortalCustodianDeposit {
        shard_id: ShardId,
        verdict: Verdict<CustodianDepositContent, CustodianDepositContent>,
    },
    PortalPorting {
        shard_id: ShardId,
        verdict: Verdict<PortingRequestContent, PortalUserRegisterAction>,
    },
    PortalPToken {
        shard_id: ShardId,
        verdict: Verdict<PTokenRequestContent, PortalRequestPTokensAction>,
    },
    PortalExchangeRates {
        shard_id: ShardId,
        verdict: Verdict<ExchangeRatesContent, ExchangeRatesContent>,
    },
    PortalRedeem {
        shard_id: ShardId,
        verdict: Verdict<RedeemRequestContent, PortalRedeemRequestAction>,
    },
    RelayingHeader {
        chain: RelayChain,
        shard_id: ShardId,
        status: RelayingStatus,
        content: RelayingHeaderContent,
    },
}

fn verdict_wire<A: Serialize, R: Serialize>(
    meta: MetaType,
    shard_id: ShardId,
    verdict: &Verdict<A, R>,
    rejected: &str,
) -> WireInstruction {
    let (token, content) = match verdict {
        Verdict::Accepted(body) => (status::ACCEPTED, encode_payload(body)),
        Verdict::Rejected(body) => (rejected, encode_payload(body)),
    };
    vec![
        meta.code().to_string(),
        shard_id.to_string(),
        token.to_string(),
        content,
    ]
}

fn parse_verdict<A: DeserializeOwned, R: DeserializeOwned>(
    meta: MetaType,
    wire: &[String],
    rejected: &str,
) -> Result<Verdict<A, R>, InstructionError> {
    match wire[2].as_str() {
        status::ACCEPTED => Ok(Verdict::Accepted(decode_payload(&wire[3])?)),
        s if s == rejected => Ok(Verdict::Rejected(decode_payload(&wire[3])?)),
        other => Err(InstructionError::UnknownStatus {
            meta,
            status: other.to_string(),
        }),
    }
}

fn issuance_wire<A: Serialize>(
    meta: MetaType,
    shard_id: ShardId,
    verdict: &Verdict<A, TxId>,
) -> WireInstruction {
    let (token, content) = match verdict {
        Verdict::Accepted(body) => (status::ACCEPTED, encode_payload(body)),
        Verdict::Rejected(tx_req_id) => (status::REJECTED, tx_req_id.to_hex()),
    };
    vec![
        meta.code().to_string(),
        shard_id.to_string(),
        token.to_string(),
        content,
    ]
}

fn parse_issuance<A: DeserializeOwned>(
    meta: MetaType,
    wire: &[String],
) -> Result<Verdict<A, TxId>, InstructionError> {
    match wire[2].as_str() {
        status::ACCEPTED => Ok(Verdict::Accepted(decode_payload(&wire[3])?)),
        status::REJECTED => H256::from_hex(&wire[3])
            .map(Verdict::Rejected)
            .ok_or(InstructionError::InvalidField("tx_req_id")),
        other => Err(InstructionError::UnknownStatus {
            meta,
            status: other.to_string(),
        }),
    }
}

fn parse_shard(field: &str) -> Result<ShardId, InstructionError> {
    field
        .parse::<ShardId>()
        .map_err(|_| InstructionError::InvalidShard(field.to_string()))
}

impl Instruction {
    pub fn meta_type(&self) -> MetaType {
        match self {
            Instruction::Issuing { .. } => MetaType::IssuingRequest,
            Instruction::IssuingEth { .. } => MetaType::IssuingEthRequest,
            Instruction::Contracting { .. } => MetaType::ContractingRequest,
            Instruction::BurningConfirm(confirm) => confirm.meta_type,
            Instruction::PdeTrade { .. } => MetaType::PdeTradeRequest,
            Instruction::PdeContribution { .. } => MetaType::PdeContribution,
            Instruction::PdeWithdrawal { .. } => MetaType::PdeWithdrawalRequest,
            Instruction::PortalCustodianDeposit { .. } => MetaType::PortalCustodianDeposit,
            Instruction::PortalPorting { .. } => MetaType::PortalUserRegister,
            Instruction::PortalPToken { .. } => MetaType::PortalUserRequestPToken,
            Instruction::PortalExchangeRates { .. } => MetaType::PortalExchangeRates,
            Instruction::PortalRedeem { .. } => MetaType::PortalRedeemRequest,
            Instruction::RelayingHeader { chain, .. } => chain.meta_type(),
        }
    }

    /// Serializes to the flat wire form embedded in beacon blocks.
    pub fn to_wire(&self) -> WireInstruction {
        let meta = self.meta_type();
        match self {
            Instruction::Issuing { shard_id, verdict } => issuance_wire(meta, *shard_id, verdict),
            Instruction::IssuingEth { shard_id, verdict } => {
                issuance_wire(meta, *shard_id, verdict)
            }
            Instruction::Contracting { shard_id, verdict } => {
                verdict_wire(meta, *shard_id, verdict, status::REJECTED)
            }
            Instruction::BurningConfirm(confirm) => vec![
                meta.code().to_string(),
                confirm.shard_id.to_string(),
                hex(&confirm.external_token_id),
                confirm.remote_address.clone(),
                confirm.amount.to_string(),
                confirm.tx_id.to_hex(),
                confirm.inc_token_id.to_hex(),
                confirm.beacon_height.to_string(),
            ],
            Instruction::PdeTrade { shard_id, verdict } => {
                verdict_wire(meta, *shard_id, verdict, status::REFUND)
            }
            Instruction::PdeContribution { shard_id, outcome } => {
                let (token, content) = match outcome {
                    ContributionOutcome::Waiting(body) => (status::WAITING, encode_payload(body)),
                    ContributionOutcome::Matched(body) => (status::MATCHED, encode_payload(body)),
                    ContributionOutcome::Refund(body) => (status::REFUND, encode_payload(body)),
                };
                vec![
                    meta.code().to_string(),
                    shard_id.to_string(),
                    token.to_string(),
                    content,
                ]
            }
            Instruction::PdeWithdrawal { shard_id, verdict } => {
                verdict_wire(meta, *shard_id, verdict, status::REJECTED)
            }
            Instruction::PortalCustodianDeposit { shard_id, verdict } => {
                verdict_wire(meta, *shard_id, verdict, status::REFUND)
            }
            Instruction::PortalPorting { shard_id, verdict } => {
                verdict_wire(meta, *shard_id, verdict, status::REJECTED)
            }
            Instruction::PortalPToken { shard_id, verdict } => {
                verdict_wire(meta, *shard_id, verdict, status::REJECTED)
            }
            Instruction::PortalExchangeRates { shard_id, verdict } => {
                verdict_wire(meta, *shard_id, verdict, status::REJECTED)
            }
            Instruction::PortalRedeem { shard_id, verdict } => {
                verdict_wire(meta, *shard_id, verdict, status::REJECTED)
            }
            Instruction::RelayingHeader {
                shard_id,
                status,
                content,
                ..
            } => vec![
                meta.code().to_string(),
                shard_id.to_string(),
                status.as_str().to_string(),
                encode_payload(content),
            ],
        }
    }

    /// Parses one wire instruction. Instructions outside the pipeline (committee
    /// changes, response transactions) report [`InstructionError::UnknownMetaType`]
    /// or [`InstructionError::InvalidMetaType`].
    pub fn from_wire(wire: &[String]) -> Result<Self, InstructionError> {
        if wire.len() < 2 {
            return Err(InstructionError::TooShort { len: wire.len() });
        }
        let code = wire[0]
            .parse::<i32>()
            .map_err(|_| InstructionError::InvalidMetaType(wire[0].clone()))?;
        let meta = MetaType::from_code(code).ok_or(InstructionError::UnknownMetaType(code))?;

        if meta.is_burning_confirm() {
            if wire.len() < BURNING_CONFIRM_FIELDS {
                return Err(InstructionError::Arity {
                    meta,
                    expected: BURNING_CONFIRM_FIELDS,
                    got: wire.len(),
                });
            }
            return Ok(Instruction::BurningConfirm(BurningConfirm {
                meta_type: meta,
                shard_id: parse_shard(&wire[1])?,
                external_token_id: from_hex(&wire[2])
                    .ok_or(InstructionError::InvalidField("external_token_id"))?,
                remote_address: wire[3].clone(),
                amount: wire[4]
                    .parse::<u128>()
                    .map_err(|_| InstructionError::InvalidField("amount"))?,
                tx_id: H256::from_hex(&wire[5]).ok_or(InstructionError::InvalidField("tx_id"))?,
                inc_token_id: H256::from_hex(&wire[6])
                    .ok_or(InstructionError::InvalidField("inc_token_id"))?,
                beacon_height: wire[7]
                    .parse::<u64>()
                    .map_err(|_| InstructionError::InvalidField("beacon_height"))?,
            }));
        }

        if wire.len() != 4 {
            return Err(InstructionError::Arity {
                meta,
                expected: 4,
                got: wire.len(),
            });
        }
        let shard_id = parse_shard(&wire[1])?;
        let instruction = match meta {
            MetaType::IssuingRequest => Instruction::Issuing {
                shard_id,
                verdict: parse_issuance(meta, wire)?,
            },
            MetaType::IssuingEthRequest => Instruction::IssuingEth {
                shard_id,
                verdict: parse_issuance(meta, wire)?,
            },
            MetaType::ContractingRequest => Instruction::Contracting {
                shard_id,
                verdict: parse_verdict(meta, wire, status::REJECTED)?,
            },
            MetaType::PdeTradeRequest => Instruction::PdeTrade {
                shard_id,
                verdict: parse_verdict(meta, wire, status::REFUND)?,
            },
            MetaType::PdeContribution => {
                let outcome = match wire[2].as_str() {
                    status::WAITING => ContributionOutcome::Waiting(decode_payload(&wire[3])?),
                    status::MATCHED => ContributionOutcome::Matched(decode_payload(&wire[3])?),
                    status::REFUND => ContributionOutcome::Refund(decode_payload(&wire[3])?),
                    other => {
                        return Err(InstructionError::UnknownStatus {
                            meta,
                            status: other.to_string(),
                        })
                    }
                };
                Instruction::PdeContribution { shard_id, outcome }
            }
            MetaType::PdeWithdrawalRequest => Instruction::PdeWithdrawal {
                shard_id,
                verdict: parse_verdict(meta, wire, status::REJECTED)?,
            },
            MetaType::PortalCustodianDeposit => Instruction::PortalCustodianDeposit {
                shard_id,
                verdict: parse_verdict(meta, wire, status::REFUND)?,
            },
            MetaType::PortalUserRegister => Instruction::PortalPorting {
                shard_id,
                verdict: parse_verdict(meta, wire, status::REJECTED)?,
            },
            MetaType::PortalUserRequestPToken => Instruction::PortalPToken {
                shard_id,
                verdict: parse_verdict(meta, wire, status::REJECTED)?,
            },
            MetaType::PortalExchangeRates => Instruction::PortalExchangeRates {
                shard_id,
                verdict: parse_verdict(meta, wire, status::REJECTED)?,
            },
            MetaType::PortalRedeemRequest => Instruction::PortalRedeem {
                shard_id,
                verdict: parse_verdict(meta, wire, status::REJECTED)?,
            },
            MetaType::RelayingBnbHeader | MetaType::RelayingBtcHeader => {
                let status = match wire[2].as_str() {
                    status::CONFIRMED => RelayingStatus::Confirmed,
                    status::UNCONFIRMED => RelayingStatus::Unconfirmed,
                    status::REJECTED => RelayingStatus::Rejected,
                    other => {
                        return Err(InstructionError::UnknownStatus {
                            meta,
                            status: other.to_string(),
                        })
                    }
                };
                Instruction::RelayingHeader {
                    chain: RelayChain::from_meta_type(meta)
                        .ok_or(InstructionError::UnknownMetaType(code))?,
                    shard_id,
                    status,
                    content: decode_payload(&wire[3])?,
                }
            }
            MetaType::BurningConfirm
            | MetaType::BurningConfirmForDepositToSc
            | MetaType::BurningConfirmV2
            | MetaType::BurningConfirmForDepositToScV2 => {
                return Err(InstructionError::UnknownMetaType(code))
            }
        };
        Ok(instruction)
    }
}
