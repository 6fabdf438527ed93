//! Fixtures for exercising the pipeline against an in-memory store.

use crate::{
    protocols::integer_sqrt,
    state::{Memory, State},
};
use meridian_types::{
    action::{
        encode_payload, Action, IssuingEthRequest, IssuingEthRequestAction, IssuingRequest,
        IssuingRequestAction, PdeTradeRequest, PdeTradeRequestAction, PortalCustodianDeposit,
        PortalCustodianDepositAction, RelayingHeader, RelayingHeaderAction, ShardInstructionBag,
    },
    hash::{TokenId, TxId, H256},
    ledger::{
        BridgeTokenState, Custodian, Key, PdePoolPair, PdeState, PoolPairKey, PortalState, Value,
    },
    meta::{MetaType, ShardId},
    params::{PortalToken, ETH_EXTERNAL_TOKEN_ID},
    relaying::{LastCommit, RelayBlock, RelayChain, RelayHeader, RelayingHeaderChainState},
    Params,
};
use std::collections::BTreeMap;

/// Installs a test-writer subscriber once; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Deterministic token ID derived from a label.
pub fn token(label: &str) -> TokenId {
    H256::digest(label.as_bytes())
}

/// Deterministic request ID derived from a counter.
pub fn tx_id(n: u64) -> TxId {
    H256::digest(&n.to_be_bytes())
}

pub fn bridge_token(token_id: TokenId, is_centralized: bool, amount: u64) -> BridgeTokenState {
    BridgeTokenState {
        token_id,
        external_token_id: Vec::new(),
        is_centralized,
        amount,
    }
}

/// Pool with the given reserves and a single liquidity provider `lp`.
pub fn pool(a: TokenId, a_value: u64, b: TokenId, b_value: u64) -> PdePoolPair {
    let key = PoolPairKey::new(a, b);
    let mut pair = PdePoolPair::new(key);
    if key.token1 == a {
        pair.token1_pool_value = a_value;
        pair.token2_pool_value = b_value;
    } else {
        pair.token1_pool_value = b_value;
        pair.token2_pool_value = a_value;
    }
    let shares = integer_sqrt(a_value as u128 * b_value as u128).max(1);
    pair.shares.insert("lp".to_string(), shares);
    pair
}

pub fn trade_request(
    buy: TokenId,
    sell: TokenId,
    sell_amount: u64,
    trading_fee: u64,
    trader: &str,
) -> PdeTradeRequestAction {
    PdeTradeRequestAction {
        meta: PdeTradeRequest {
            token_id_to_buy: buy,
            token_id_to_sell: sell,
            sell_amount,
            min_acceptable_amount: 0,
            trading_fee,
            trader_address: trader.to_string(),
        },
        tx_req_id: token(&format!("trade-{trader}")),
    }
}

/// Custodian with `free` collateral and a remote address for `token_id`.
pub fn custodian(name: &str, free: u64, token_id: TokenId) -> Custodian {
    Custodian {
        incognito_address: name.to_string(),
        total_collateral: free,
        free_collateral: free,
        remote_addresses: BTreeMap::from([(token_id, format!("{name}-remote"))]),
        ..Default::default()
    }
}

pub fn relay_header(height: u64, last_block_hash: H256) -> RelayHeader {
    RelayHeader {
        height,
        last_block_hash,
        data_hash: H256::digest(format!("data-{height}").as_bytes()),
        time: height * 10,
    }
}

/// base64 JSON block carrying `header` and a commit for its parent.
pub fn encoded_block(header: &RelayHeader) -> String {
    encode_payload(&RelayBlock {
        header: header.clone(),
        last_commit: LastCommit {
            block_hash: header.last_block_hash,
        },
    })
}

/// Relaying action with an opaque `header` payload.
pub fn relaying_action(
    meta_type: MetaType,
    shard_id: ShardId,
    block_height: u64,
    header: &str,
    tx_req_id: TxId,
) -> Action {
    Action::new(
        meta_type,
        shard_id,
        &RelayingHeaderAction {
            meta: RelayingHeader {
                sender_address: "relayer".to_string(),
                header: header.to_string(),
                block_height,
            },
            tx_req_id,
        },
    )
}

/// Relaying action submitting `header` for `chain` at its own height.
pub fn relay_block_action(
    chain: RelayChain,
    shard_id: ShardId,
    header: &RelayHeader,
    tx_req_id: TxId,
) -> Action {
    relaying_action(
        chain.meta_type(),
        shard_id,
        header.height,
        &encoded_block(header),
        tx_req_id,
    )
}

pub fn issuing_action(
    shard_id: ShardId,
    token_id: TokenId,
    amount: u64,
    tx_req_id: TxId,
) -> Action {
    Action::new(
        MetaType::IssuingRequest,
        shard_id,
        &IssuingRequestAction {
            meta: IssuingRequest {
                receiver_address: "alice".to_string(),
                deposited_amount: amount,
                token_id,
                token_name: "pUSD".to_string(),
            },
            tx_req_id,
        },
    )
}

/// ETH-side deposit of `amount` wei of native ETH.
pub fn eth_issuing_action(
    shard_id: ShardId,
    token_id: TokenId,
    amount: u128,
    uniq_eth_tx: &[u8],
    tx_req_id: TxId,
) -> Action {
    Action::new(
        MetaType::IssuingEthRequest,
        shard_id,
        &IssuingEthRequestAction {
            meta: IssuingEthRequest {
                inc_token_id: token_id,
                external_token_id: ETH_EXTERNAL_TOKEN_ID.to_vec(),
                amount,
                receiver_address: "alice".to_string(),
                uniq_eth_tx: uniq_eth_tx.to_vec(),
            },
            tx_req_id,
        },
    )
}

pub fn trade_action(shard_id: ShardId, request: &PdeTradeRequestAction) -> Action {
    Action::new(MetaType::PdeTradeRequest, shard_id, request)
}

pub fn custodian_deposit_action(
    shard_id: ShardId,
    name: &str,
    amount: u64,
    token_id: TokenId,
    tx_req_id: TxId,
) -> Action {
    Action::new(
        MetaType::PortalCustodianDeposit,
        shard_id,
        &PortalCustodianDepositAction {
            meta: PortalCustodianDeposit {
                incognito_address: name.to_string(),
                remote_addresses: BTreeMap::from([(token_id, format!("{name}-remote"))]),
                deposited_amount: amount,
            },
            tx_req_id,
        },
    )
}

/// Shard bag holding each action under its own shard, in order.
pub fn bag(actions: &[Action]) -> ShardInstructionBag {
    let mut bag = ShardInstructionBag::default();
    for action in actions {
        bag.push(action.shard_id, action.to_wire());
    }
    bag
}

/// Params with one portal token relayed over `chain`, the zero token as
/// collateral and `feeder` allowed to post rates.
pub fn portal_params(ptoken: TokenId, chain: RelayChain, feeder: &str) -> Params {
    let mut params = Params::default();
    params.portal.tokens.push(PortalToken {
        token_id: ptoken,
        chain,
        name: "pBNB".to_string(),
    });
    params.portal.exchange_rate_feeders.push(feeder.to_string());
    params
}

pub async fn seed_height(state: &mut Memory, height: u64) {
    state
        .insert(Key::BeaconHeight, Value::Height(height))
        .await
        .expect("seed height");
}

pub async fn seed_pools(state: &mut Memory, pools: Vec<PdePoolPair>) {
    let pde = PdeState {
        pool_pairs: pools.into_iter().map(|pair| (pair.key(), pair)).collect(),
        ..Default::default()
    };
    state
        .insert(Key::PdeState, Value::PdeState(pde))
        .await
        .expect("seed pools");
}

pub async fn seed_portal(state: &mut Memory, portal: PortalState) {
    state
        .insert(Key::PortalState, Value::PortalState(portal))
        .await
        .expect("seed portal");
}

/// Seeds `chain` with `genesis` as its latest header.
pub async fn seed_chain(state: &mut Memory, chain: RelayChain, genesis: RelayHeader) {
    state
        .insert(
            Key::RelayingChain(chain),
            Value::RelayingChain(RelayingHeaderChainState::genesis(genesis)),
        )
        .await
        .expect("seed chain");
}

pub async fn seed_token(state: &mut Memory, token: BridgeTokenState) {
    state
        .insert(Key::BridgeToken(token.token_id), Value::BridgeToken(token))
        .await
        .expect("seed token");
}
