//! Persistent beacon ledger: keys, values and the records they hold.
//!
//! Every value has a tagged binary encoding. Maps are `BTreeMap`s so the
//! encoding of a value is unique and identical on every node.

use crate::{
    codec::{
        bytes_encode_size, map_encode_size, read_bytes, read_map, read_string, read_string_map,
        string_encode_size, string_map_encode_size, write_bytes, write_map, write_string,
        write_string_map, MAX_MAP_ENTRIES, MAX_STRING_LEN,
    },
    hash::{TokenId, TxId, H256},
    meta::ShardId,
    relaying::{RelayChain, RelayingHeaderChainState},
};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, ReadRangeExt, Write};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Longest external token ID or external transaction ID accepted.
pub const MAX_EXTERNAL_ID_LEN: usize = 64;

/// Most custodians matched to a single porting or redeem request.
pub const MAX_MATCHED_CUSTODIANS: usize = 256;

// === Bridge ===

/// Outstanding supply of one bridged token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BridgeTokenState {
    pub token_id: TokenId,
    pub external_token_id: Vec<u8>,
    pub is_centralized: bool,
    pub amount: u64,
}

impl Write for BridgeTokenState {
    fn write(&self, writer: &mut impl BufMut) {
        self.token_id.write(writer);
        write_bytes(&self.external_token_id, writer);
        self.is_centralized.write(writer);
        self.amount.write(writer);
    }
}

impl Read for BridgeTokenState {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            token_id: H256::read(reader)?,
            external_token_id: read_bytes(reader, MAX_EXTERNAL_ID_LEN)?,
            is_centralized: bool::read(reader)?,
            amount: u64::read(reader)?,
        })
    }
}

impl EncodeSize for BridgeTokenState {
    fn encode_size(&self) -> usize {
        self.token_id.encode_size()
            + bytes_encode_size(&self.external_token_id)
            + self.is_centralized.encode_size()
            + self.amount.encode_size()
    }
}

// === Request status ===

/// Request families with status rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequestKind {
    Issuing,
    EthIssuing,
    PdeTrade,
    PdeContribution,
    PdeWithdrawal,
    CustodianDeposit,
    Porting,
    PTokenRequest,
    ExchangeRates,
    Redeem,
    RelayingHeader,
}

impl RequestKind {
    const fn tag(self) -> u8 {
        match self {
            Self::Issuing => 0,
            Self::EthIssuing => 1,
            Self::PdeTrade => 2,
            Self::PdeContribution => 3,
            Self::PdeWithdrawal => 4,
            Self::CustodianDeposit => 5,
            Self::Porting => 6,
            Self::PTokenRequest => 7,
            Self::ExchangeRates => 8,
            Self::Redeem => 9,
            Self::RelayingHeader => 10,
        }
    }
}

impl Write for RequestKind {
    fn write(&self, writer: &mut impl BufMut) {
        self.tag().write(writer);
    }
}

impl Read for RequestKind {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(match u8::read(reader)? {
            0 => Self::Issuing,
            1 => Self::EthIssuing,
            2 => Self::PdeTrade,
            3 => Self::PdeContribution,
            4 => Self::PdeWithdrawal,
            5 => Self::CustodianDeposit,
            6 => Self::Porting,
            7 => Self::PTokenRequest,
            8 => Self::ExchangeRates,
            9 => Self::Redeem,
            10 => Self::RelayingHeader,
            i => return Err(Error::InvalidEnum(i)),
        })
    }
}

impl FixedSize for RequestKind {
    const SIZE: usize = u8::SIZE;
}

/// What a status lookup reports for a tracked request. A missing row is "not found".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusRecord {
    pub status: RequestStatus,
    pub beacon_height: u64,
}

impl Write for StatusRecord {
    fn write(&self, writer: &mut impl BufMut) {
        let tag: u8 = match self.status {
            RequestStatus::Pending => 0,
            RequestStatus::Accepted => 1,
            RequestStatus::Rejected => 2,
        };
        tag.write(writer);
        self.beacon_height.write(writer);
    }
}

impl Read for StatusRecord {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let status = match u8::read(reader)? {
            0 => RequestStatus::Pending,
            1 => RequestStatus::Accepted,
            2 => RequestStatus::Rejected,
            i => return Err(Error::InvalidEnum(i)),
        };
        Ok(Self {
            status,
            beacon_height: u64::read(reader)?,
        })
    }
}

impl FixedSize for StatusRecord {
    const SIZE: usize = u8::SIZE + u64::SIZE;
}

// === PDE ===

/// Canonical pool key: `token1 < token2` regardless of argument order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolPairKey {
    pub token1: TokenId,
    pub token2: TokenId,
}

impl PoolPairKey {
    pub fn new(a: TokenId, b: TokenId) -> Self {
        if a <= b {
            Self { token1: a, token2: b }
        } else {
            Self { token1: b, token2: a }
        }
    }
}

impl Write for PoolPairKey {
    fn write(&self, writer: &mut impl BufMut) {
        self.token1.write(writer);
        self.token2.write(writer);
    }
}

impl Read for PoolPairKey {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            token1: H256::read(reader)?,
            token2: H256::read(reader)?,
        })
    }
}

impl EncodeSize for PoolPairKey {
    fn encode_size(&self) -> usize {
        H256::LEN * 2
    }
}

/// Reserves of one AMM pool plus its contributors' shares and accrued trading fees.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PdePoolPair {
    pub token1_id: TokenId,
    pub token1_pool_value: u64,
    pub token2_id: TokenId,
    pub token2_pool_value: u64,
    pub shares: BTreeMap<String, u64>,
    pub trading_fees: BTreeMap<String, u64>,
}

impl PdePoolPair {
    pub fn new(key: PoolPairKey) -> Self {
        Self {
            token1_id: key.token1,
            token2_id: key.token2,
            ..Default::default()
        }
    }

    pub fn key(&self) -> PoolPairKey {
        PoolPairKey {
            token1: self.token1_id,
            token2: self.token2_id,
        }
    }

    pub fn has_liquidity(&self) -> bool {
        self.token1_pool_value > 0 && self.token2_pool_value > 0
    }

    pub fn total_shares(&self) -> u128 {
        self.shares.values().map(|s| *s as u128).sum()
    }

    /// `(reserve of sell token, reserve of the other token)`, or `None` when
    /// `sell` is not in this pool.
    pub fn reserves_for(&self, sell: &TokenId) -> Option<(u64, u64)> {
        if *sell == self.token1_id {
            Some((self.token1_pool_value, self.token2_pool_value))
        } else if *sell == self.token2_id {
            Some((self.token2_pool_value, self.token1_pool_value))
        } else {
            None
        }
    }
}

impl Write for PdePoolPair {
    fn write(&self, writer: &mut impl BufMut) {
        self.token1_id.write(writer);
        self.token1_pool_value.write(writer);
        self.token2_id.write(writer);
        self.token2_pool_value.write(writer);
        write_string_map(&self.shares, writer);
        write_string_map(&self.trading_fees, writer);
    }
}

impl Read for PdePoolPair {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            token1_id: H256::read(reader)?,
            token1_pool_value: u64::read(reader)?,
            token2_id: H256::read(reader)?,
            token2_pool_value: u64::read(reader)?,
            shares: read_string_map(reader)?,
            trading_fees: read_string_map(reader)?,
        })
    }
}

impl EncodeSize for PdePoolPair {
    fn encode_size(&self) -> usize {
        H256::LEN * 2
            + u64::SIZE * 2
            + string_map_encode_size(&self.shares)
            + string_map_encode_size(&self.trading_fees)
    }
}

/// First leg of a two-sided contribution waiting for its counterpart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaitingContribution {
    pub pdex_pair_id: String,
    pub shard_id: ShardId,
    pub contributor_address: String,
    pub token_id: TokenId,
    pub amount: u64,
    pub tx_req_id: TxId,
}

impl Write for WaitingContribution {
    fn write(&self, writer: &mut impl BufMut) {
        write_string(&self.pdex_pair_id, writer);
        self.shard_id.write(writer);
        write_string(&self.contributor_address, writer);
        self.token_id.write(writer);
        self.amount.write(writer);
        self.tx_req_id.write(writer);
    }
}

impl Read for WaitingContribution {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            pdex_pair_id: read_string(reader, MAX_STRING_LEN)?,
            shard_id: ShardId::read(reader)?,
            contributor_address: read_string(reader, MAX_STRING_LEN)?,
            token_id: H256::read(reader)?,
            amount: u64::read(reader)?,
            tx_req_id: H256::read(reader)?,
        })
    }
}

impl EncodeSize for WaitingContribution {
    fn encode_size(&self) -> usize {
        string_encode_size(&self.pdex_pair_id)
            + ShardId::SIZE
            + string_encode_size(&self.contributor_address)
            + H256::LEN * 2
            + u64::SIZE
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PdeState {
    pub waiting_contributions: BTreeMap<String, WaitingContribution>,
    pub pool_pairs: BTreeMap<PoolPairKey, PdePoolPair>,
}

impl Write for PdeState {
    fn write(&self, writer: &mut impl BufMut) {
        write_string_map(&self.waiting_contributions, writer);
        write_map(&self.pool_pairs, writer);
    }
}

impl Read for PdeState {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let waiting_contributions = read_string_map(reader)?;
        let pool_pairs: BTreeMap<PoolPairKey, PdePoolPair> = read_map(reader)?;
        if pool_pairs.iter().any(|(key, pool)| *key != pool.key()) {
            return Err(Error::Invalid("PdeState", "pool stored under wrong key"));
        }
        Ok(Self {
            waiting_contributions,
            pool_pairs,
        })
    }
}

impl EncodeSize for PdeState {
    fn encode_size(&self) -> usize {
        string_map_encode_size(&self.waiting_contributions) + map_encode_size(&self.pool_pairs)
    }
}

// === Portal ===

fn write_address_map(map: &BTreeMap<TokenId, String>, writer: &mut impl BufMut) {
    (map.len() as u32).write(writer);
    for (token, address) in map {
        token.write(writer);
        write_string(address, writer);
    }
}

fn read_address_map(reader: &mut impl Buf) -> Result<BTreeMap<TokenId, String>, Error> {
    let len = u32::read(reader)? as usize;
    if len > MAX_MAP_ENTRIES {
        return Err(Error::Invalid("Map", "too many entries"));
    }
    let mut map = BTreeMap::new();
    for _ in 0..len {
        let token = H256::read(reader)?;
        let address = read_string(reader, MAX_STRING_LEN)?;
        if map.insert(token, address).is_some() {
            return Err(Error::Invalid("Map", "duplicate key"));
        }
    }
    Ok(map)
}

fn address_map_encode_size(map: &BTreeMap<TokenId, String>) -> usize {
    4 + map
        .values()
        .map(|address| H256::LEN + string_encode_size(address))
        .sum::<usize>()
}

/// Collateral ledger of one custodian.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Custodian {
    pub incognito_address: String,
    pub total_collateral: u64,
    pub free_collateral: u64,
    pub holding_public_tokens: BTreeMap<TokenId, u64>,
    pub locked_collateral: BTreeMap<TokenId, u64>,
    pub remote_addresses: BTreeMap<TokenId, String>,
}

impl Write for Custodian {
    fn write(&self, writer: &mut impl BufMut) {
        write_string(&self.incognito_address, writer);
        self.total_collateral.write(writer);
        self.free_collateral.write(writer);
        write_map(&self.holding_public_tokens, writer);
        write_map(&self.locked_collateral, writer);
        write_address_map(&self.remote_addresses, writer);
    }
}

impl Read for Custodian {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            incognito_address: read_string(reader, MAX_STRING_LEN)?,
            total_collateral: u64::read(reader)?,
            free_collateral: u64::read(reader)?,
            holding_public_tokens: read_map(reader)?,
            locked_collateral: read_map(reader)?,
            remote_addresses: read_address_map(reader)?,
        })
    }
}

impl EncodeSize for Custodian {
    fn encode_size(&self) -> usize {
        string_encode_size(&self.incognito_address)
            + u64::SIZE * 2
            + map_encode_size(&self.holding_public_tokens)
            + map_encode_size(&self.locked_collateral)
            + address_map_encode_size(&self.remote_addresses)
    }
}

/// A custodian's share of a porting request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedCustodian {
    pub incognito_address: String,
    pub remote_address: String,
    pub amount: u64,
    pub locked_collateral: u64,
}

impl Write for MatchedCustodian {
    fn write(&self, writer: &mut impl BufMut) {
        write_string(&self.incognito_address, writer);
        write_string(&self.remote_address, writer);
        self.amount.write(writer);
        self.locked_collateral.write(writer);
    }
}

impl Read for MatchedCustodian {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            incognito_address: read_string(reader, MAX_STRING_LEN)?,
            remote_address: read_string(reader, MAX_STRING_LEN)?,
            amount: u64::read(reader)?,
            locked_collateral: u64::read(reader)?,
        })
    }
}

impl EncodeSize for MatchedCustodian {
    fn encode_size(&self) -> usize {
        string_encode_size(&self.incognito_address)
            + string_encode_size(&self.remote_address)
            + u64::SIZE * 2
    }
}

/// A custodian's share of a redeem request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedRedeemCustodian {
    pub incognito_address: String,
    pub remote_address: String,
    pub amount: u64,
}

impl Write for MatchedRedeemCustodian {
    fn write(&self, writer: &mut impl BufMut) {
        write_string(&self.incognito_address, writer);
        write_string(&self.remote_address, writer);
        self.amount.write(writer);
    }
}

impl Read for MatchedRedeemCustodian {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            incognito_address: read_string(reader, MAX_STRING_LEN)?,
            remote_address: read_string(reader, MAX_STRING_LEN)?,
            amount: u64::read(reader)?,
        })
    }
}

impl EncodeSize for MatchedRedeemCustodian {
    fn encode_size(&self) -> usize {
        string_encode_size(&self.incognito_address)
            + string_encode_size(&self.remote_address)
            + u64::SIZE
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortingRequest {
    pub unique_porting_id: String,
    pub tx_req_id: TxId,
    pub token_id: TokenId,
    pub porter_address: String,
    pub amount: u64,
    pub custodians: Vec<MatchedCustodian>,
    pub porting_fee: u64,
    pub beacon_height: u64,
}

impl Write for PortingRequest {
    fn write(&self, writer: &mut impl BufMut) {
        write_string(&self.unique_porting_id, writer);
        self.tx_req_id.write(writer);
        self.token_id.write(writer);
        write_string(&self.porter_address, writer);
        self.amount.write(writer);
        self.custodians.write(writer);
        self.porting_fee.write(writer);
        self.beacon_height.write(writer);
    }
}

impl Read for PortingRequest {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            unique_porting_id: read_string(reader, MAX_STRING_LEN)?,
            tx_req_id: H256::read(reader)?,
            token_id: H256::read(reader)?,
            porter_address: read_string(reader, MAX_STRING_LEN)?,
            amount: u64::read(reader)?,
            custodians: Vec::<MatchedCustodian>::read_range(reader, 0..=MAX_MATCHED_CUSTODIANS)?,
            porting_fee: u64::read(reader)?,
            beacon_height: u64::read(reader)?,
        })
    }
}

impl EncodeSize for PortingRequest {
    fn encode_size(&self) -> usize {
        string_encode_size(&self.unique_porting_id)
            + H256::LEN * 2
            + string_encode_size(&self.porter_address)
            + self.custodians.encode_size()
            + u64::SIZE * 3
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedeemRequest {
    pub unique_redeem_id: String,
    pub tx_req_id: TxId,
    pub token_id: TokenId,
    pub redeemer_address: String,
    pub remote_address: String,
    pub amount: u64,
    pub custodians: Vec<MatchedRedeemCustodian>,
    pub redeem_fee: u64,
    pub beacon_height: u64,
}

impl Write for RedeemRequest {
    fn write(&self, writer: &mut impl BufMut) {
        write_string(&self.unique_redeem_id, writer);
        self.tx_req_id.write(writer);
        self.token_id.write(writer);
        write_string(&self.redeemer_address, writer);
        write_string(&self.remote_address, writer);
        self.amount.write(writer);
        self.custodians.write(writer);
        self.redeem_fee.write(writer);
        self.beacon_height.write(writer);
    }
}

impl Read for RedeemRequest {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            unique_redeem_id: read_string(reader, MAX_STRING_LEN)?,
            tx_req_id: H256::read(reader)?,
            token_id: H256::read(reader)?,
            redeemer_address: read_string(reader, MAX_STRING_LEN)?,
            remote_address: read_string(reader, MAX_STRING_LEN)?,
            amount: u64::read(reader)?,
            custodians: Vec::<MatchedRedeemCustodian>::read_range(
                reader,
                0..=MAX_MATCHED_CUSTODIANS,
            )?,
            redeem_fee: u64::read(reader)?,
            beacon_height: u64::read(reader)?,
        })
    }
}

impl EncodeSize for RedeemRequest {
    fn encode_size(&self) -> usize {
        string_encode_size(&self.unique_redeem_id)
            + H256::LEN * 2
            + string_encode_size(&self.redeemer_address)
            + string_encode_size(&self.remote_address)
            + self.custodians.encode_size()
            + u64::SIZE * 3
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortalState {
    pub custodians: BTreeMap<String, Custodian>,
    pub waiting_porting: BTreeMap<String, PortingRequest>,
    pub waiting_redeem: BTreeMap<String, RedeemRequest>,
    /// Final exchange rate per token, in a common quote unit.
    pub exchange_rates: BTreeMap<TokenId, u64>,
}

impl Write for PortalState {
    fn write(&self, writer: &mut impl BufMut) {
        write_string_map(&self.custodians, writer);
        write_string_map(&self.waiting_porting, writer);
        write_string_map(&self.waiting_redeem, writer);
        write_map(&self.exchange_rates, writer);
    }
}

impl Read for PortalState {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            custodians: read_string_map(reader)?,
            waiting_porting: read_string_map(reader)?,
            waiting_redeem: read_string_map(reader)?,
            exchange_rates: read_map(reader)?,
        })
    }
}

impl EncodeSize for PortalState {
    fn encode_size(&self) -> usize {
        string_map_encode_size(&self.custodians)
            + string_map_encode_size(&self.waiting_porting)
            + string_map_encode_size(&self.waiting_redeem)
            + map_encode_size(&self.exchange_rates)
    }
}

// === Keys and values ===

#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Clone, Debug)]
pub enum Key {
    /// Last applied beacon height (tag 0)
    BeaconHeight,

    // Bridge (tags 1-4)
    BridgeToken(TokenId),
    ExternalToken(Vec<u8>),
    EthTxIssued(Vec<u8>),
    BurningConfirm(TxId),

    /// Status row of a tracked request (tag 5)
    RequestStatus(RequestKind, String),

    /// AMM working state (tag 6)
    PdeState,

    // Portal (tags 7-9)
    PortalState,
    PortingRequest(String),
    PortingProof(H256),

    /// Relayed header chain (tag 10)
    RelayingChain(RelayChain),
}

impl Write for Key {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::BeaconHeight => 0u8.write(writer),
            Self::BridgeToken(token) => {
                1u8.write(writer);
                token.write(writer);
            }
            Self::ExternalToken(id) => {
                2u8.write(writer);
                write_bytes(id, writer);
            }
            Self::EthTxIssued(id) => {
                3u8.write(writer);
                write_bytes(id, writer);
            }
            Self::BurningConfirm(tx) => {
                4u8.write(writer);
                tx.write(writer);
            }
            Self::RequestStatus(kind, id) => {
                5u8.write(writer);
                kind.write(writer);
                write_string(id, writer);
            }
            Self::PdeState => 6u8.write(writer),
            Self::PortalState => 7u8.write(writer),
            Self::PortingRequest(id) => {
                8u8.write(writer);
                write_string(id, writer);
            }
            Self::PortingProof(hash) => {
                9u8.write(writer);
                hash.write(writer);
            }
            Self::RelayingChain(chain) => {
                10u8.write(writer);
                chain.write(writer);
            }
        }
    }
}

impl Read for Key {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let kind = u8::read(reader)?;
        let key = match kind {
            0 => Self::BeaconHeight,
            1 => Self::BridgeToken(H256::read(reader)?),
            2 => Self::ExternalToken(read_bytes(reader, MAX_EXTERNAL_ID_LEN)?),
            3 => Self::EthTxIssued(read_bytes(reader, MAX_EXTERNAL_ID_LEN)?),
            4 => Self::BurningConfirm(H256::read(reader)?),
            5 => Self::RequestStatus(
                RequestKind::read(reader)?,
                read_string(reader, MAX_STRING_LEN)?,
            ),
            6 => Self::PdeState,
            7 => Self::PortalState,
            8 => Self::PortingRequest(read_string(reader, MAX_STRING_LEN)?),
            9 => Self::PortingProof(H256::read(reader)?),
            10 => Self::RelayingChain(RelayChain::read(reader)?),
            i => return Err(Error::InvalidEnum(i)),
        };
        Ok(key)
    }
}

impl EncodeSize for Key {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::BeaconHeight | Self::PdeState | Self::PortalState => 0,
                Self::BridgeToken(_) | Self::BurningConfirm(_) | Self::PortingProof(_) => H256::LEN,
                Self::ExternalToken(id) | Self::EthTxIssued(id) => bytes_encode_size(id),
                Self::RequestStatus(_, id) => RequestKind::SIZE + string_encode_size(id),
                Self::PortingRequest(id) => string_encode_size(id),
                Self::RelayingChain(chain) => chain.encode_size(),
            }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum Value {
    /// A beacon height (applied height, or the height a marker row was written at).
    Height(u64),
    BridgeToken(BridgeTokenState),
    TokenId(TokenId),
    RequestStatus(StatusRecord),
    PdeState(PdeState),
    PortalState(PortalState),
    PortingRequest(PortingRequest),
    RelayingChain(RelayingHeaderChainState),
}

impl Write for Value {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Height(height) => {
                0u8.write(writer);
                height.write(writer);
            }
            Self::BridgeToken(state) => {
                1u8.write(writer);
                state.write(writer);
            }
            Self::TokenId(token) => {
                2u8.write(writer);
                token.write(writer);
            }
            Self::RequestStatus(record) => {
                3u8.write(writer);
                record.write(writer);
            }
            Self::PdeState(state) => {
                4u8.write(writer);
                state.write(writer);
            }
            Self::PortalState(state) => {
                5u8.write(writer);
                state.write(writer);
            }
            Self::PortingRequest(request) => {
                6u8.write(writer);
                request.write(writer);
            }
            Self::RelayingChain(chain) => {
                7u8.write(writer);
                chain.write(writer);
            }
        }
    }
}

impl Read for Value {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let kind = u8::read(reader)?;
        let value = match kind {
            0 => Self::Height(u64::read(reader)?),
            1 => Self::BridgeToken(BridgeTokenState::read(reader)?),
            2 => Self::TokenId(H256::read(reader)?),
            3 => Self::RequestStatus(StatusRecord::read(reader)?),
            4 => Self::PdeState(PdeState::read(reader)?),
            5 => Self::PortalState(PortalState::read(reader)?),
            6 => Self::PortingRequest(PortingRequest::read(reader)?),
            7 => Self::RelayingChain(RelayingHeaderChainState::read(reader)?),
            i => return Err(Error::InvalidEnum(i)),
        };
        Ok(value)
    }
}

impl EncodeSize for Value {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Height(height) => height.encode_size(),
                Self::BridgeToken(state) => state.encode_size(),
                Self::TokenId(token) => token.encode_size(),
                Self::RequestStatus(record) => record.encode_size(),
                Self::PdeState(state) => state.encode_size(),
                Self::PortalState(state) => state.encode_size(),
                Self::PortingRequest(request) => request.encode_size(),
                Self::RelayingChain(chain) => chain.encode_size(),
            }
    }
}
