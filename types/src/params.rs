//! Pipeline parameters.

use crate::{
    hash::{serde_hex_bytes, TokenId, H256},
    meta::MetaType,
    relaying::RelayChain,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// External token ID of native ETH on the bridge (20 zero bytes).
pub const ETH_EXTERNAL_TOKEN_ID: [u8; 20] = [0u8; 20];

/// Divisor from 18-decimal ETH units to the internal 9-decimal unit.
pub const ETH_DECIMAL_DIVISOR: u128 = 1_000_000_000;

/// Memo prefix a porting payment must carry, followed by the porting ID.
pub const PORTING_MEMO_PREFIX: &str = "PS1-";

const BASIS_POINTS_SCALE: u64 = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("stateful allow-list is empty")]
    EmptyAllowList,
    #[error("{0} is not a beacon-collected action")]
    NotCollectable(MetaType),
    #[error("eth external token id must be 20 bytes (got {0})")]
    InvalidEthTokenId(usize),
    #[error("portal token {0} configured twice")]
    DuplicatePortalToken(TokenId),
    #[error("portal token {0} is the collateral token")]
    CollateralIsPortalToken(TokenId),
    #[error("locked collateral percent must be at least 100 (got {0})")]
    CollateralPercentTooLow(u64),
    #[error("fee basis points must be at most {max} (got {got})")]
    FeeBasisPointsTooHigh { got: u64, max: u64 },
    #[error("no exchange rate feeders configured")]
    NoFeeders,
    #[error("max pending relay headers must be positive")]
    ZeroPendingHeaders,
}

/// A ptoken backed by custodians on a relayed chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalToken {
    pub token_id: TokenId,
    pub chain: RelayChain,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalParams {
    #[serde(default)]
    pub tokens: Vec<PortalToken>,
    /// Token custodians post as collateral; exchange rates convert into it.
    #[serde(default = "default_collateral_token")]
    pub collateral_token: TokenId,
    #[serde(default = "default_min_percent_locked_collateral")]
    pub min_percent_locked_collateral: u64,
    #[serde(default = "default_min_fee_bps")]
    pub min_porting_fee_bps: u64,
    #[serde(default = "default_min_fee_bps")]
    pub min_redeem_fee_bps: u64,
    /// Absolute fee floor in collateral units.
    #[serde(default)]
    pub min_portal_fee: u64,
    #[serde(default)]
    pub exchange_rate_feeders: Vec<String>,
}

impl Default for PortalParams {
    fn default() -> Self {
        Self {
            tokens: Vec::new(),
            collateral_token: default_collateral_token(),
            min_percent_locked_collateral: default_min_percent_locked_collateral(),
            min_porting_fee_bps: default_min_fee_bps(),
            min_redeem_fee_bps: default_min_fee_bps(),
            min_portal_fee: 0,
            exchange_rate_feeders: Vec::new(),
        }
    }
}

impl PortalParams {
    pub fn token(&self, token_id: &TokenId) -> Option<&PortalToken> {
        self.tokens.iter().find(|t| t.token_id == *token_id)
    }

    /// Porting fee floor for a request worth `value` collateral units.
    pub fn min_porting_fee(&self, value: u64) -> u64 {
        self.fee_floor(value, self.min_porting_fee_bps)
    }

    pub fn min_redeem_fee(&self, value: u64) -> u64 {
        self.fee_floor(value, self.min_redeem_fee_bps)
    }

    fn fee_floor(&self, value: u64, bps: u64) -> u64 {
        let proportional = (value as u128 * bps as u128 / BASIS_POINTS_SCALE as u128) as u64;
        proportional.max(self.min_portal_fee)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    #[serde(default = "MetaType::default_stateful")]
    pub stateful_meta_types: Vec<MetaType>,
    #[serde(default = "default_eth_token_id", with = "serde_hex_bytes")]
    pub eth_external_token_id: Vec<u8>,
    #[serde(default)]
    pub portal: PortalParams,
    #[serde(default = "default_max_pending_headers")]
    pub max_pending_headers: usize,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            stateful_meta_types: MetaType::default_stateful(),
            eth_external_token_id: default_eth_token_id(),
            portal: PortalParams::default(),
            max_pending_headers: default_max_pending_headers(),
        }
    }
}

fn default_eth_token_id() -> Vec<u8> {
    ETH_EXTERNAL_TOKEN_ID.to_vec()
}

fn default_collateral_token() -> TokenId {
    H256::ZERO
}

fn default_min_percent_locked_collateral() -> u64 {
    150
}

fn default_min_fee_bps() -> u64 {
    1
}

fn default_max_pending_headers() -> usize {
    64
}

impl Params {
    pub fn allow_list(&self) -> BTreeSet<MetaType> {
        self.stateful_meta_types.iter().copied().collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stateful_meta_types.is_empty() {
            return Err(ConfigError::EmptyAllowList);
        }
        let collectable = MetaType::default_stateful();
        if let Some(meta) = self
            .stateful_meta_types
            .iter()
            .find(|meta| !collectable.contains(meta))
        {
            return Err(ConfigError::NotCollectable(*meta));
        }
        if self.eth_external_token_id.len() != ETH_EXTERNAL_TOKEN_ID.len() {
            return Err(ConfigError::InvalidEthTokenId(
                self.eth_external_token_id.len(),
            ));
        }

        let portal = &self.portal;
        let mut seen = BTreeSet::new();
        for token in &portal.tokens {
            if !seen.insert(token.token_id) {
                return Err(ConfigError::DuplicatePortalToken(token.token_id));
            }
            if token.token_id == portal.collateral_token {
                return Err(ConfigError::CollateralIsPortalToken(token.token_id));
            }
        }
        if portal.min_percent_locked_collateral < 100 {
            return Err(ConfigError::CollateralPercentTooLow(
                portal.min_percent_locked_collateral,
            ));
        }
        for bps in [portal.min_porting_fee_bps, portal.min_redeem_fee_bps] {
            if bps > BASIS_POINTS_SCALE {
                return Err(ConfigError::FeeBasisPointsTooHigh {
                    got: bps,
                    max: BASIS_POINTS_SCALE,
                });
            }
        }
        if !portal.tokens.is_empty() && portal.exchange_rate_feeders.is_empty() {
            return Err(ConfigError::NoFeeders);
        }
        if self.max_pending_headers == 0 {
            return Err(ConfigError::ZeroPendingHeaders);
        }
        Ok(())
    }
}
