//! Metadata type codes and status tokens shared by actions and instructions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Shard identifier as carried in instruction position 1.
pub type ShardId = u8;

/// Committee-management instruction names. Their first field is not a metadata
/// code and they never reach protocol processing.
pub const COMMITTEE_ACTIONS: [&str; 5] = ["set", "stake", "swap", "random", "assign"];

/// Integer metadata codes understood by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum MetaType {
    IssuingRequest,
    ContractingRequest,
    BurningConfirm,
    IssuingEthRequest,
    BurningConfirmForDepositToSc,
    PdeContribution,
    PdeTradeRequest,
    PdeWithdrawalRequest,
    PortalCustodianDeposit,
    PortalUserRegister,
    PortalUserRequestPToken,
    PortalRedeemRequest,
    PortalExchangeRates,
    RelayingBnbHeader,
    RelayingBtcHeader,
    BurningConfirmV2,
    BurningConfirmForDepositToScV2,
}

impl MetaType {
    pub const fn code(self) -> i32 {
        match self {
            Self::IssuingRequest => 24,
            Self::ContractingRequest => 26,
            Self::BurningConfirm => 72,
            Self::IssuingEthRequest => 80,
            Self::BurningConfirmForDepositToSc => 97,
            Self::PdeContribution => 90,
            Self::PdeTradeRequest => 91,
            Self::PdeWithdrawalRequest => 93,
            Self::PortalCustodianDeposit => 100,
            Self::PortalUserRegister => 101,
            Self::PortalUserRequestPToken => 102,
            Self::PortalRedeemRequest => 103,
            Self::PortalExchangeRates => 107,
            Self::RelayingBnbHeader => 200,
            Self::RelayingBtcHeader => 201,
            Self::BurningConfirmV2 => 240,
            Self::BurningConfirmForDepositToScV2 => 243,
        }
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            24 => Self::IssuingRequest,
            26 => Self::ContractingRequest,
            72 => Self::BurningConfirm,
            80 => Self::IssuingEthRequest,
            97 => Self::BurningConfirmForDepositToSc,
            90 => Self::PdeContribution,
            91 => Self::PdeTradeRequest,
            93 => Self::PdeWithdrawalRequest,
            100 => Self::PortalCustodianDeposit,
            101 => Self::PortalUserRegister,
            102 => Self::PortalUserRequestPToken,
            103 => Self::PortalRedeemRequest,
            107 => Self::PortalExchangeRates,
            200 => Self::RelayingBnbHeader,
            201 => Self::RelayingBtcHeader,
            240 => Self::BurningConfirmV2,
            243 => Self::BurningConfirmForDepositToScV2,
            _ => return None,
        })
    }

    pub const fn is_burning_confirm(self) -> bool {
        matches!(
            self,
            Self::BurningConfirm
                | Self::BurningConfirmForDepositToSc
                | Self::BurningConfirmV2
                | Self::BurningConfirmForDepositToScV2
        )
    }

    /// Actions collected for beacon-side processing when no allow-list is configured.
    pub fn default_stateful() -> Vec<MetaType> {
        vec![
            Self::IssuingRequest,
            Self::IssuingEthRequest,
            Self::PdeContribution,
            Self::PdeTradeRequest,
            Self::PdeWithdrawalRequest,
            Self::PortalCustodianDeposit,
            Self::PortalUserRegister,
            Self::PortalUserRequestPToken,
            Self::PortalExchangeRates,
            Self::PortalRedeemRequest,
            Self::RelayingBnbHeader,
            Self::RelayingBtcHeader,
        ]
    }
}

impl fmt::Display for MetaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl TryFrom<i32> for MetaType {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        MetaType::from_code(code).ok_or_else(|| format!("unknown metadata type {code}"))
    }
}

impl From<MetaType> for i32 {
    fn from(meta: MetaType) -> Self {
        meta.code()
    }
}

/// Status tokens in instruction position 2.
pub mod status {
    pub const ACCEPTED: &str = "accepted";
    pub const REJECTED: &str = "rejected";
    pub const REFUND: &str = "refund";
    pub const WAITING: &str = "waiting";
    pub const MATCHED: &str = "matched";
    pub const CONFIRMED: &str = "confirmed";
    pub const UNCONFIRMED: &str = "unconfirmed";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in 0..300 {
            if let Some(meta) = MetaType::from_code(code) {
                assert_eq!(meta.code(), code);
            }
        }
        assert_eq!(MetaType::from_code(25), None);
    }

    #[test]
    fn default_allow_list_excludes_shard_only_types() {
        let stateful = MetaType::default_stateful();
        assert!(!stateful.contains(&MetaType::ContractingRequest));
        assert!(!stateful.iter().any(|m| m.is_burning_confirm()));
        assert!(stateful.contains(&MetaType::RelayingBtcHeader));
    }

    #[test]
    fn serde_as_integer() {
        let json = serde_json::to_string(&MetaType::PdeTradeRequest).expect("serialize");
        assert_eq!(json, "91");
        assert!(serde_json::from_str::<MetaType>("25").is_err());
    }
}
