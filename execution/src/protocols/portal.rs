//! Portal: custodian-collateralized bridging.
//!
//! Stages run in a fixed order within a height (custodian deposits, porting
//! requests, ptoken requests, exchange rates, then redeem requests) and each stage
//! observes the working-copy changes of the stages before it.

use super::{mul_div, mul_div_ceil, EffectError};
use crate::{builder::Builder, outcome::ActionOutcome, state::State};
use anyhow::{Context as _, Result};
use meridian_types::{
    action::{
        decode_payload, Action, PortalCustodianDepositAction, PortalExchangeRatesAction,
        PortalRedeemRequestAction, PortalRequestPTokensAction, PortalUserRegisterAction,
        PortingProof,
    },
    content::{
        CustodianDepositContent, ExchangeRatesContent, PTokenRequestContent,
        PortingRequestContent, RedeemRequestContent,
    },
    hash::TokenId,
    ledger::{
        Custodian, Key, MatchedCustodian, MatchedRedeemCustodian, PortalState, PortingRequest,
        RedeemRequest, RequestKind, RequestStatus,
    },
    params::{PortalParams, PORTING_MEMO_PREFIX},
    Instruction, Verdict,
};
use std::collections::BTreeMap;

/// `amount` of `token_id` expressed in collateral units through the final exchange rates.
pub fn collateral_value(
    portal: &PortalState,
    params: &PortalParams,
    token_id: &TokenId,
    amount: u64,
) -> Option<u64> {
    let token_rate = *portal.exchange_rates.get(token_id)?;
    let collateral_rate = *portal.exchange_rates.get(&params.collateral_token)?;
    mul_div(amount, token_rate, collateral_rate)
}

/// Picks custodians to back a porting request of `amount` needing `required` collateral.
///
/// Custodians holding a remote address for the token are ranked by free collateral
/// descending, then address ascending. The top custodian takes everything when it
/// can; otherwise each custodian in rank order takes as much as its free
/// collateral covers.
pub fn match_porting_custodians(
    portal: &PortalState,
    token_id: &TokenId,
    amount: u64,
    required: u64,
) -> Option<Vec<MatchedCustodian>> {
    if amount == 0 || required == 0 {
        return None;
    }
    let mut ranked: Vec<(&String, &Custodian, &String)> = portal
        .custodians
        .iter()
        .filter(|(_, custodian)| custodian.free_collateral > 0)
        .filter_map(|(address, custodian)| {
            let remote = custodian.remote_addresses.get(token_id)?;
            Some((address, custodian, remote))
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.1.free_collateral
            .cmp(&a.1.free_collateral)
            .then_with(|| a.0.cmp(b.0))
    });

    if let Some((address, custodian, remote)) = ranked.first() {
        if custodian.free_collateral >= required {
            return Some(vec![MatchedCustodian {
                incognito_address: (*address).clone(),
                remote_address: (*remote).clone(),
                amount,
                locked_collateral: required,
            }]);
        }
    }

    let mut remaining = amount;
    let mut matched = Vec::new();
    for (address, custodian, remote) in ranked {
        if remaining == 0 {
            break;
        }
        let capacity = mul_div(custodian.free_collateral, amount, required)?;
        let take = remaining.min(capacity);
        if take == 0 {
            continue;
        }
        let locked = mul_div_ceil(take, required, amount)?.min(custodian.free_collateral);
        matched.push(MatchedCustodian {
            incognito_address: address.clone(),
            remote_address: remote.clone(),
            amount: take,
            locked_collateral: locked,
        });
        remaining -= take;
    }
    (remaining == 0).then_some(matched)
}

/// Picks custodians to release `amount` of `token_id`, largest holding first.
pub fn match_redeem_custodians(
    portal: &PortalState,
    token_id: &TokenId,
    amount: u64,
) -> Option<Vec<MatchedRedeemCustodian>> {
    let mut ranked: Vec<(&String, u64, &String)> = portal
        .custodians
        .iter()
        .filter_map(|(address, custodian)| {
            let holding = custodian
                .holding_public_tokens
                .get(token_id)
                .copied()
                .filter(|holding| *holding > 0)?;
            let remote = custodian.remote_addresses.get(token_id)?;
            Some((address, holding, remote))
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut remaining = amount;
    let mut matched = Vec::new();
    for (address, holding, remote) in ranked {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(holding);
        matched.push(MatchedRedeemCustodian {
            incognito_address: address.clone(),
            remote_address: remote.clone(),
            amount: take,
        });
        remaining -= take;
    }
    (remaining == 0 && !matched.is_empty()).then_some(matched)
}

// === Effects ===

pub fn apply_custodian_deposit(
    portal: &mut PortalState,
    content: &CustodianDepositContent,
) -> Result<(), EffectError> {
    let (total, free) = match portal.custodians.get(&content.incognito_address) {
        Some(custodian) => (
            custodian
                .total_collateral
                .checked_add(content.deposited_amount)
                .ok_or(EffectError::OutOfRange("total collateral"))?,
            custodian
                .free_collateral
                .checked_add(content.deposited_amount)
                .ok_or(EffectError::OutOfRange("free collateral"))?,
        ),
        None => (content.deposited_amount, content.deposited_amount),
    };
    let custodian = portal
        .custodians
        .entry(content.incognito_address.clone())
        .or_insert_with(|| Custodian {
            incognito_address: content.incognito_address.clone(),
            ..Default::default()
        });
    custodian.total_collateral = total;
    custodian.free_collateral = free;
    for (token_id, remote) in &content.remote_addresses {
        custodian
            .remote_addresses
            .entry(*token_id)
            .or_insert_with(|| remote.clone());
    }
    Ok(())
}

pub fn apply_porting_request(
    portal: &mut PortalState,
    content: &PortingRequestContent,
    beacon_height: u64,
) -> Result<(), EffectError> {
    for matched in &content.custodians {
        let custodian = portal
            .custodians
            .get(&matched.incognito_address)
            .ok_or_else(|| EffectError::MissingCustodian(matched.incognito_address.clone()))?;
        if custodian.free_collateral < matched.locked_collateral {
            return Err(EffectError::OutOfRange("free collateral"));
        }
    }
    for matched in &content.custodians {
        if let Some(custodian) = portal.custodians.get_mut(&matched.incognito_address) {
            custodian.free_collateral -= matched.locked_collateral;
            let locked = custodian.locked_collateral.entry(content.token_id).or_default();
            *locked = locked.saturating_add(matched.locked_collateral);
        }
    }
    portal.waiting_porting.insert(
        content.unique_porting_id.clone(),
        PortingRequest {
            unique_porting_id: content.unique_porting_id.clone(),
            tx_req_id: content.tx_req_id,
            token_id: content.token_id,
            porter_address: content.porter_address.clone(),
            amount: content.amount,
            custodians: content.custodians.clone(),
            porting_fee: content.porting_fee,
            beacon_height,
        },
    );
    Ok(())
}

/// Completes a waiting porting request and returns it for the completed-request row.
pub fn apply_ptoken_request(
    portal: &mut PortalState,
    content: &PTokenRequestContent,
) -> Result<PortingRequest, EffectError> {
    let request = portal
        .waiting_porting
        .remove(&content.unique_porting_id)
        .ok_or_else(|| EffectError::MissingRequest(content.unique_porting_id.clone()))?;
    for matched in &request.custodians {
        if let Some(custodian) = portal.custodians.get_mut(&matched.incognito_address) {
            let holding = custodian
                .holding_public_tokens
                .entry(request.token_id)
                .or_default();
            *holding = holding.saturating_add(matched.amount);
        }
    }
    Ok(request)
}

pub fn apply_exchange_rates(portal: &mut PortalState, content: &ExchangeRatesContent) {
    for (token_id, rate) in &content.rates {
        portal.exchange_rates.insert(*token_id, *rate);
    }
}

pub fn apply_redeem_request(
    portal: &mut PortalState,
    content: &RedeemRequestContent,
    beacon_height: u64,
) -> Result<(), EffectError> {
    for matched in &content.custodians {
        let holding = portal
            .custodians
            .get(&matched.incognito_address)
            .ok_or_else(|| EffectError::MissingCustodian(matched.incognito_address.clone()))?
            .holding_public_tokens
            .get(&content.token_id)
            .copied()
            .unwrap_or_default();
        if holding < matched.amount {
            return Err(EffectError::OutOfRange("custodian holding"));
        }
    }
    for matched in &content.custodians {
        if let Some(holding) = portal
            .custodians
            .get_mut(&matched.incognito_address)
            .and_then(|custodian| custodian.holding_public_tokens.get_mut(&content.token_id))
        {
            *holding -= matched.amount;
        }
    }
    portal.waiting_redeem.insert(
        content.unique_redeem_id.clone(),
        RedeemRequest {
            unique_redeem_id: content.unique_redeem_id.clone(),
            tx_req_id: content.tx_req_id,
            token_id: content.token_id,
            redeemer_address: content.redeemer_address.clone(),
            remote_address: content.remote_address.clone(),
            amount: content.redeem_amount,
            custodians: content.custodians.clone(),
            redeem_fee: content.redeem_fee,
            beacon_height,
        },
    );
    Ok(())
}

// === Validation ===

fn plan_custodian_deposit(
    portal: &PortalState,
    params: &PortalParams,
    content: &CustodianDepositContent,
) -> Result<(), &'static str> {
    if content.deposited_amount == 0 {
        return Err("zero deposit");
    }
    if content.remote_addresses.is_empty() {
        return Err("no remote address");
    }
    if content
        .remote_addresses
        .keys()
        .any(|token_id| params.token(token_id).is_none())
    {
        return Err("unsupported portal token");
    }
    if let Some(custodian) = portal.custodians.get(&content.incognito_address) {
        if custodian
            .total_collateral
            .checked_add(content.deposited_amount)
            .is_none()
        {
            return Err("collateral overflow");
        }
    }
    Ok(())
}

fn plan_porting(
    portal: &PortalState,
    params: &PortalParams,
    request: &PortalUserRegisterAction,
    already_known: bool,
) -> Result<PortingRequestContent, &'static str> {
    let meta = &request.meta;
    if already_known || portal.waiting_porting.contains_key(&meta.unique_register_id) {
        return Err("duplicate porting id");
    }
    if params.token(&meta.ptoken_id).is_none() {
        return Err("unsupported portal token");
    }
    if meta.register_amount == 0 {
        return Err("zero amount");
    }
    let value = collateral_value(portal, params, &meta.ptoken_id, meta.register_amount)
        .ok_or("missing exchange rate")?;
    if value == 0 {
        return Err("value rounds to zero");
    }
    if meta.porting_fee < params.min_porting_fee(value) {
        return Err("porting fee below minimum");
    }
    let required = mul_div(value, params.min_percent_locked_collateral, 100)
        .ok_or("collateral out of range")?;
    let custodians =
        match_porting_custodians(portal, &meta.ptoken_id, meta.register_amount, required)
            .ok_or("insufficient custodian collateral")?;
    Ok(PortingRequestContent {
        unique_porting_id: meta.unique_register_id.clone(),
        token_id: meta.ptoken_id,
        porter_address: meta.incognito_address.clone(),
        amount: meta.register_amount,
        custodians,
        porting_fee: meta.porting_fee,
        tx_req_id: request.tx_req_id,
    })
}

fn plan_ptoken<S: State>(
    builder: &Builder<'_, S>,
    request: &PortalRequestPTokensAction,
    proof: Option<&PortingProof>,
    proof_seen: bool,
    centralized: bool,
) -> Result<PTokenRequestContent, &'static str> {
    let meta = &request.meta;
    if centralized {
        return Err("ptoken registered as centralized");
    }
    let porting = builder
        .working
        .portal
        .waiting_porting
        .get(&meta.unique_porting_id)
        .ok_or("unknown porting request")?;
    if porting.token_id != meta.token_id {
        return Err("token mismatch");
    }
    if porting.porter_address != meta.incognito_address {
        return Err("address mismatch");
    }
    if porting.amount != meta.porting_amount {
        return Err("amount mismatch");
    }
    let proof = proof.ok_or("malformed proof")?;
    let proof_hash = proof.hash();
    if proof_seen || builder.proofs_used.contains(&proof_hash) {
        return Err("proof already used");
    }
    let chain = builder
        .params
        .portal
        .token(&meta.token_id)
        .ok_or("unsupported portal token")?
        .chain;
    let relayed = builder
        .working
        .chains
        .get(&chain)
        .ok_or("no relayed chain state")?;
    if relayed.latest.height < proof.block_height {
        return Err("proof block not confirmed");
    }
    if proof.memo != format!("{PORTING_MEMO_PREFIX}{}", meta.unique_porting_id) {
        return Err("memo mismatch");
    }
    let mut paid: BTreeMap<&str, u128> = BTreeMap::new();
    for output in &proof.outputs {
        *paid.entry(output.address.as_str()).or_default() += output.amount as u128;
    }
    for matched in &porting.custodians {
        let received = paid
            .get(matched.remote_address.as_str())
            .copied()
            .unwrap_or_default();
        if received < matched.amount as u128 {
            return Err("custodian not paid in full");
        }
    }
    Ok(PTokenRequestContent {
        unique_porting_id: meta.unique_porting_id.clone(),
        token_id: meta.token_id,
        incognito_address: meta.incognito_address.clone(),
        porting_amount: meta.porting_amount,
        proof_hash,
        tx_req_id: request.tx_req_id,
    })
}

fn plan_exchange_rates(
    params: &PortalParams,
    request: &PortalExchangeRatesAction,
) -> Result<ExchangeRatesContent, &'static str> {
    let meta = &request.meta;
    if !params.exchange_rate_feeders.contains(&meta.sender_address) {
        return Err("unauthorized feeder");
    }
    if meta.rates.is_empty() {
        return Err("no rates");
    }
    let mut rates = BTreeMap::new();
    for rate in &meta.rates {
        if rate.rate == 0 {
            return Err("zero rate");
        }
        if rate.token_id != params.collateral_token && params.token(&rate.token_id).is_none() {
            return Err("unsupported rate token");
        }
        rates.insert(rate.token_id, rate.rate);
    }
    Ok(ExchangeRatesContent {
        sender_address: meta.sender_address.clone(),
        rates,
        tx_req_id: request.tx_req_id,
    })
}

fn plan_redeem(
    portal: &PortalState,
    params: &PortalParams,
    request: &PortalRedeemRequestAction,
    already_known: bool,
    centralized: bool,
) -> Result<RedeemRequestContent, &'static str> {
    let meta = &request.meta;
    if already_known || portal.waiting_redeem.contains_key(&meta.unique_redeem_id) {
        return Err("duplicate redeem id");
    }
    if params.token(&meta.token_id).is_none() {
        return Err("unsupported portal token");
    }
    if centralized {
        return Err("ptoken registered as centralized");
    }
    if meta.redeem_amount == 0 {
        return Err("zero amount");
    }
    if meta.remote_address.is_empty() {
        return Err("empty remote address");
    }
    let value = collateral_value(portal, params, &meta.token_id, meta.redeem_amount)
        .ok_or("missing exchange rate")?;
    if meta.redeem_fee < params.min_redeem_fee(value) {
        return Err("redeem fee below minimum");
    }
    let custodians = match_redeem_custodians(portal, &meta.token_id, meta.redeem_amount)
        .ok_or("insufficient custodian holdings")?;
    Ok(RedeemRequestContent {
        unique_redeem_id: meta.unique_redeem_id.clone(),
        token_id: meta.token_id,
        redeemer_address: meta.redeemer_address.clone(),
        remote_address: meta.remote_address.clone(),
        redeem_amount: meta.redeem_amount,
        custodians,
        redeem_fee: meta.redeem_fee,
        tx_req_id: request.tx_req_id,
    })
}

impl<'a, S: State> Builder<'a, S> {
    async fn is_centralized(&self, token_id: &TokenId) -> Result<bool> {
        Ok(matches!(
            self.registered_token(token_id).await?,
            Some((true, _))
        ))
    }

    pub(crate) fn process_custodian_deposit(&mut self, action: &Action) -> Result<ActionOutcome> {
        let request: PortalCustodianDepositAction = match action.decode() {
            Ok(request) => request,
            Err(err) => return Ok(ActionOutcome::malformed(err)),
        };
        let content = CustodianDepositContent {
            incognito_address: request.meta.incognito_address,
            remote_addresses: request.meta.remote_addresses,
            deposited_amount: request.meta.deposited_amount,
            tx_req_id: request.tx_req_id,
        };
        if let Err(reason) =
            plan_custodian_deposit(&self.working.portal, &self.params.portal, &content)
        {
            return Ok(ActionOutcome::rejected(
                Instruction::PortalCustodianDeposit {
                    shard_id: action.shard_id,
                    verdict: Verdict::Rejected(content),
                },
                reason,
            ));
        }
        apply_custodian_deposit(&mut self.working.portal, &content)
            .context("apply custodian deposit")?;
        Ok(ActionOutcome::accepted(Instruction::PortalCustodianDeposit {
            shard_id: action.shard_id,
            verdict: Verdict::Accepted(content),
        }))
    }

    pub(crate) async fn process_porting_request(
        &mut self,
        action: &Action,
    ) -> Result<ActionOutcome> {
        let request: PortalUserRegisterAction = match action.decode() {
            Ok(request) => request,
            Err(err) => return Ok(ActionOutcome::malformed(err)),
        };
        let id = &request.meta.unique_register_id;
        let already_known = self.completed_porting.contains(id)
            || self
                .snapshot(Key::PortingRequest(id.clone()))
                .await?
                .is_some();
        match plan_porting(
            &self.working.portal,
            &self.params.portal,
            &request,
            already_known,
        ) {
            Ok(content) => {
                apply_porting_request(&mut self.working.portal, &content, self.height)
                    .context("apply porting request")?;
                Ok(ActionOutcome::accepted(Instruction::PortalPorting {
                    shard_id: action.shard_id,
                    verdict: Verdict::Accepted(content),
                }))
            }
            Err(reason) => Ok(ActionOutcome::rejected(
                Instruction::PortalPorting {
                    shard_id: action.shard_id,
                    verdict: Verdict::Rejected(request),
                },
                reason,
            )),
        }
    }

    pub(crate) async fn process_ptoken_request(
        &mut self,
        action: &Action,
    ) -> Result<ActionOutcome> {
        let request: PortalRequestPTokensAction = match action.decode() {
            Ok(request) => request,
            Err(err) => return Ok(ActionOutcome::malformed(err)),
        };
        let proof: Option<PortingProof> = decode_payload(&request.meta.porting_proof).ok();
        let proof_seen = match &proof {
            Some(proof) => self
                .snapshot(Key::PortingProof(proof.hash()))
                .await?
                .is_some(),
            None => false,
        };
        let centralized = self.is_centralized(&request.meta.token_id).await?;
        match plan_ptoken(self, &request, proof.as_ref(), proof_seen, centralized) {
            Ok(content) => {
                apply_ptoken_request(&mut self.working.portal, &content)
                    .context("apply ptoken request")?;
                self.issuance.record_ptoken(content.token_id);
                self.proofs_used.insert(content.proof_hash);
                self.completed_porting
                    .insert(content.unique_porting_id.clone());
                Ok(ActionOutcome::accepted(Instruction::PortalPToken {
                    shard_id: action.shard_id,
                    verdict: Verdict::Accepted(content),
                }))
            }
            Err(reason) => Ok(ActionOutcome::rejected(
                Instruction::PortalPToken {
                    shard_id: action.shard_id,
                    verdict: Verdict::Rejected(request),
                },
                reason,
            )),
        }
    }

    pub(crate) fn process_exchange_rates(&mut self, action: &Action) -> Result<ActionOutcome> {
        let request: PortalExchangeRatesAction = match action.decode() {
            Ok(request) => request,
            Err(err) => return Ok(ActionOutcome::malformed(err)),
        };
        match plan_exchange_rates(&self.params.portal, &request) {
            Ok(content) => {
                apply_exchange_rates(&mut self.working.portal, &content);
                Ok(ActionOutcome::accepted(Instruction::PortalExchangeRates {
                    shard_id: action.shard_id,
                    verdict: Verdict::Accepted(content),
                }))
            }
            Err(reason) => {
                let content = ExchangeRatesContent {
                    sender_address: request.meta.sender_address.clone(),
                    rates: request
                        .meta
                        .rates
                        .iter()
                        .map(|rate| (rate.token_id, rate.rate))
                        .collect(),
                    tx_req_id: request.tx_req_id,
                };
                Ok(ActionOutcome::rejected(
                    Instruction::PortalExchangeRates {
                        shard_id: action.shard_id,
                        verdict: Verdict::Rejected(content),
                    },
                    reason,
                ))
            }
        }
    }

    pub(crate) async fn process_redeem_request(
        &mut self,
        action: &Action,
    ) -> Result<ActionOutcome> {
        let request: PortalRedeemRequestAction = match action.decode() {
            Ok(request) => request,
            Err(err) => return Ok(ActionOutcome::malformed(err)),
        };
        let status = crate::state::request_status(
            self.state,
            RequestKind::Redeem,
            &request.meta.unique_redeem_id,
        )
        .await?;
        let already_known = matches!(
            status,
            Some(RequestStatus::Pending) | Some(RequestStatus::Accepted)
        );
        let centralized = self.is_centralized(&request.meta.token_id).await?;
        match plan_redeem(
            &self.working.portal,
            &self.params.portal,
            &request,
            already_known,
            centralized,
        ) {
            Ok(content) => {
                apply_redeem_request(&mut self.working.portal, &content, self.height)
                    .context("apply redeem request")?;
                self.issuance.record_ptoken(content.token_id);
                Ok(ActionOutcome::accepted(Instruction::PortalRedeem {
                    shard_id: action.shard_id,
                    verdict: Verdict::Accepted(content),
                }))
            }
            Err(reason) => Ok(ActionOutcome::rejected(
                Instruction::PortalRedeem {
                    shard_id: action.shard_id,
                    verdict: Verdict::Rejected(request),
                },
                reason,
            )),
        }
    }
}
