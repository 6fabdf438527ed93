//! Validator side of a beacon height: replays finalized instructions into a
//! pending write set.
//!
//! Per-token supply changes are aggregated in [`UpdatingInfo`] while replaying
//! and committed as exactly one bridge-token write per token in [`Applier::finalize`].

use crate::{
    protocols::{
        bridge::to_internal_amount,
        pde::{apply_contribution, apply_trade, apply_withdrawal},
        portal::{
            apply_custodian_deposit, apply_exchange_rates, apply_porting_request,
            apply_ptoken_request, apply_redeem_request,
        },
        relaying::verify_relaying_header,
        WorkingSet,
    },
    state::{State, Status},
};
use anyhow::{anyhow, Context as _, Result};
use meridian_types::{
    content::RelayingHeaderContent,
    hash::TokenId,
    instruction::{BurningConfirm, ContributionOutcome, RelayingStatus, WireInstruction},
    ledger::{BridgeTokenState, Key, RequestKind, RequestStatus, StatusRecord, Value},
    relaying::RelayChain,
    Instruction, InstructionError, Params, Verdict,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Aggregated supply change of one token within one height.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdatingInfo {
    pub token_id: TokenId,
    pub count_up: u128,
    pub deduct: u128,
    pub external_token_id: Vec<u8>,
    pub is_centralized: bool,
}

/// Net direction of a committed token update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetChange {
    CountUp(u64),
    Deduct(u64),
    Unchanged,
}

impl NetChange {
    pub fn marker(&self) -> &'static str {
        match self {
            NetChange::CountUp(_) => "+",
            NetChange::Deduct(_) => "-",
            NetChange::Unchanged => "",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenUpdate {
    pub token_id: TokenId,
    pub change: NetChange,
    /// Outstanding amount after the update.
    pub amount: u64,
}

#[derive(Debug)]
pub struct ApplyOutput {
    pub changes: Vec<(Key, Status)>,
    pub token_updates: Vec<TokenUpdate>,
    pub applied: usize,
    pub skipped: usize,
}

/// Reason an instruction was skipped during replay.
type Skip = Option<String>;

fn skip(reason: impl Into<String>) -> Result<Skip> {
    Ok(Some(reason.into()))
}

pub struct Applier<'a, S: State> {
    state: &'a S,
    params: &'a Params,
    height: u64,
    pending: BTreeMap<Key, Status>,
    working: WorkingSet,
    updating: BTreeMap<TokenId, UpdatingInfo>,
    applied: usize,
    skipped: usize,
}

impl<'a, S: State> Applier<'a, S> {
    pub async fn load(state: &'a S, params: &'a Params, height: u64) -> Result<Self> {
        let working = WorkingSet::load(state)
            .await
            .with_context(|| format!("load working set (height={height})"))?;
        Ok(Self {
            state,
            params,
            height,
            pending: BTreeMap::new(),
            working,
            updating: BTreeMap::new(),
            applied: 0,
            skipped: 0,
        })
    }

    pub fn updating(&self) -> &BTreeMap<TokenId, UpdatingInfo> {
        &self.updating
    }

    fn set_status(&mut self, kind: RequestKind, id: String, status: RequestStatus) {
        self.pending.insert(
            Key::RequestStatus(kind, id),
            Status::Update(Value::RequestStatus(StatusRecord {
                status,
                beacon_height: self.height,
            })),
        );
    }

    /// Records a rejection unless the ID already has a status row.
    async fn set_rejected_if_absent(&mut self, kind: RequestKind, id: String) -> Result<()> {
        if self
            .get(&Key::RequestStatus(kind, id.clone()))
            .await?
            .is_none()
        {
            self.set_status(kind, id, RequestStatus::Rejected);
        }
        Ok(())
    }

    /// `Some(is_centralized)` for a registered token, including registrations
    /// earlier in this height.
    async fn token_kind(&self, token_id: &TokenId) -> Result<Option<bool>> {
        if let Some(info) = self.updating.get(token_id) {
            return Ok(Some(info.is_centralized));
        }
        Ok(match self.get(&Key::BridgeToken(*token_id)).await? {
            Some(Value::BridgeToken(token)) => Some(token.is_centralized),
            _ => None,
        })
    }

    /// Supply of `token_id` after the updates replayed so far in this height.
    async fn outstanding(&self, token_id: &TokenId) -> Result<u128> {
        let stored = match self.get(&Key::BridgeToken(*token_id)).await? {
            Some(Value::BridgeToken(token)) => token.amount as u128,
            _ => 0,
        };
        Ok(match self.updating.get(token_id) {
            Some(info) => (stored + info.count_up).saturating_sub(info.deduct),
            None => stored,
        })
    }

    fn count_up(
        &mut self,
        token_id: TokenId,
        amount: u64,
        external_token_id: &[u8],
        centralized: bool,
    ) {
        let info = self.updating.entry(token_id).or_insert_with(|| UpdatingInfo {
            token_id,
            external_token_id: external_token_id.to_vec(),
            is_centralized: centralized,
            ..Default::default()
        });
        info.count_up += amount as u128;
    }

    fn deduct(&mut self, token_id: TokenId, amount: u64, centralized: bool) {
        let info = self.updating.entry(token_id).or_insert_with(|| UpdatingInfo {
            token_id,
            is_centralized: centralized,
            ..Default::default()
        });
        info.deduct += amount as u128;
    }

    /// Replays `instructions` in order. Instructions outside the pipeline are
    /// ignored; malformed or inapplicable ones are skipped individually.
    pub async fn apply(&mut self, instructions: &[WireInstruction]) -> Result<()> {
        for wire in instructions {
            let instruction = match Instruction::from_wire(wire) {
                Ok(instruction) => instruction,
                Err(
                    InstructionError::UnknownMetaType(_) | InstructionError::InvalidMetaType(_),
                ) => continue,
                Err(err) => {
                    warn!(height = self.height, error = %err, "skipping malformed instruction");
                    self.skipped += 1;
                    continue;
                }
            };
            let meta_type = instruction.meta_type();
            match self
                .apply_instruction(instruction)
                .await
                .with_context(|| format!("apply {meta_type} (height={})", self.height))?
            {
                None => self.applied += 1,
                Some(reason) => {
                    warn!(height = self.height, %meta_type, %reason, "skipping instruction");
                    self.skipped += 1;
                }
            }
        }
        Ok(())
    }

    async fn apply_instruction(&mut self, instruction: Instruction) -> Result<Skip> {
        match instruction {
            Instruction::Issuing { verdict, .. } => match verdict {
                Verdict::Rejected(tx_req_id) => {
                    self.set_status(
                        RequestKind::Issuing,
                        tx_req_id.to_hex(),
                        RequestStatus::Rejected,
                    );
                }
                Verdict::Accepted(content) => {
                    if self.token_kind(&content.inc_token_id).await? == Some(false) {
                        return skip("token is decentralized");
                    }
                    self.count_up(content.inc_token_id, content.deposited_amount, &[], true);
                    self.set_status(
                        RequestKind::Issuing,
                        content.tx_req_id.to_hex(),
                        RequestStatus::Accepted,
                    );
                }
            },
            Instruction::IssuingEth { verdict, .. } => match verdict {
                Verdict::Rejected(tx_req_id) => {
                    self.set_status(
                        RequestKind::EthIssuing,
                        tx_req_id.to_hex(),
                        RequestStatus::Rejected,
                    );
                }
                Verdict::Accepted(content) => {
                    if self.token_kind(&content.inc_token_id).await? == Some(true) {
                        return skip("token is centralized");
                    }
                    if self
                        .get(&Key::EthTxIssued(content.uniq_eth_tx.clone()))
                        .await?
                        .is_some()
                    {
                        return skip("eth tx already issued");
                    }
                    self.count_up(
                        content.inc_token_id,
                        content.issuing_amount,
                        &content.external_token_id,
                        false,
                    );
                    self.pending.insert(
                        Key::EthTxIssued(content.uniq_eth_tx),
                        Status::Update(Value::Height(self.height)),
                    );
                    self.pending.insert(
                        Key::ExternalToken(content.external_token_id),
                        Status::Update(Value::TokenId(content.inc_token_id)),
                    );
                    self.set_status(
                        RequestKind::EthIssuing,
                        content.tx_req_id.to_hex(),
                        RequestStatus::Accepted,
                    );
                }
            },
            Instruction::Contracting { verdict, .. } => {
                let Verdict::Accepted(request) = verdict else {
                    return skip("rejected contracting request");
                };
                let token_id = request.meta.token_id;
                if self.token_kind(&token_id).await? != Some(true) {
                    return skip("token is not a registered centralized token");
                }
                if request.meta.burned_amount as u128 > self.outstanding(&token_id).await? {
                    return skip("burn exceeds outstanding supply");
                }
                self.deduct(token_id, request.meta.burned_amount, true);
            }
            Instruction::BurningConfirm(confirm) => {
                return self.apply_burning_confirm(confirm).await
            }
            Instruction::PdeTrade { verdict, .. } => match verdict {
                Verdict::Accepted(content) => {
                    if let Err(err) = apply_trade(&mut self.working.pde, &content) {
                        return skip(err.to_string());
                    }
                    self.set_status(
                        RequestKind::PdeTrade,
                        content.tx_req_id.to_hex(),
                        RequestStatus::Accepted,
                    );
                }
                Verdict::Rejected(refund) => self.set_status(
                    RequestKind::PdeTrade,
                    refund.tx_req_id.to_hex(),
                    RequestStatus::Rejected,
                ),
            },
            Instruction::PdeContribution { shard_id, outcome } => {
                if let Err(err) = apply_contribution(&mut self.working.pde, shard_id, &outcome) {
                    return skip(err.to_string());
                }
                let (pair_id, status) = match &outcome {
                    ContributionOutcome::Waiting(leg) => {
                        (&leg.pdex_pair_id, RequestStatus::Pending)
                    }
                    ContributionOutcome::Matched(matched) => {
                        (&matched.pdex_pair_id, RequestStatus::Accepted)
                    }
                    ContributionOutcome::Refund(leg) => {
                        (&leg.pdex_pair_id, RequestStatus::Rejected)
                    }
                };
                self.set_status(RequestKind::PdeContribution, pair_id.clone(), status);
            }
            Instruction::PdeWithdrawal { verdict, .. } => match verdict {
                Verdict::Accepted(content) => {
                    if let Err(err) = apply_withdrawal(&mut self.working.pde, &content) {
                        return skip(err.to_string());
                    }
                    self.set_status(
                        RequestKind::PdeWithdrawal,
                        content.tx_req_id.to_hex(),
                        RequestStatus::Accepted,
                    );
                }
                Verdict::Rejected(request) => self.set_status(
                    RequestKind::PdeWithdrawal,
                    request.tx_req_id.to_hex(),
                    RequestStatus::Rejected,
                ),
            },
            Instruction::PortalCustodianDeposit { verdict, .. } => match verdict {
                Verdict::Accepted(content) => {
                    if let Err(err) = apply_custodian_deposit(&mut self.working.portal, &content) {
                        return skip(err.to_string());
                    }
                    self.set_status(
                        RequestKind::CustodianDeposit,
                        content.tx_req_id.to_hex(),
                        RequestStatus::Accepted,
                    );
                }
                Verdict::Rejected(content) => self.set_status(
                    RequestKind::CustodianDeposit,
                    content.tx_req_id.to_hex(),
                    RequestStatus::Rejected,
                ),
            },
            Instruction::PortalPorting { verdict, .. } => match verdict {
                Verdict::Accepted(content) => {
                    if let Err(err) =
                        apply_porting_request(&mut self.working.portal, &content, self.height)
                    {
                        return skip(err.to_string());
                    }
                    self.set_status(
                        RequestKind::Porting,
                        content.unique_porting_id,
                        RequestStatus::Pending,
                    );
                }
                Verdict::Rejected(request) => {
                    let id = request.meta.unique_register_id;
                    self.set_rejected_if_absent(RequestKind::Porting, id).await?;
                }
            },
            Instruction::PortalPToken { verdict, .. } => match verdict {
                Verdict::Accepted(content) => {
                    if self.token_kind(&content.token_id).await? == Some(true) {
                        return skip("ptoken registered as centralized");
                    }
                    let completed = match apply_ptoken_request(&mut self.working.portal, &content) {
                        Ok(completed) => completed,
                        Err(err) => return skip(err.to_string()),
                    };
                    let id = content.unique_porting_id.clone();
                    self.pending.insert(
                        Key::PortingRequest(id.clone()),
                        Status::Update(Value::PortingRequest(completed)),
                    );
                    self.pending.insert(
                        Key::PortingProof(content.proof_hash),
                        Status::Update(Value::Height(self.height)),
                    );
                    self.set_status(
                        RequestKind::PTokenRequest,
                        id.clone(),
                        RequestStatus::Accepted,
                    );
                    self.set_status(RequestKind::Porting, id, RequestStatus::Accepted);
                    self.count_up(content.token_id, content.porting_amount, &[], false);
                }
                Verdict::Rejected(request) => self.set_status(
                    RequestKind::PTokenRequest,
                    request.meta.unique_porting_id,
                    RequestStatus::Rejected,
                ),
            },
            Instruction::PortalExchangeRates { verdict, .. } => match verdict {
                Verdict::Accepted(content) => {
                    apply_exchange_rates(&mut self.working.portal, &content);
                    self.set_status(
                        RequestKind::ExchangeRates,
                        content.tx_req_id.to_hex(),
                        RequestStatus::Accepted,
                    );
                }
                Verdict::Rejected(content) => self.set_status(
                    RequestKind::ExchangeRates,
                    content.tx_req_id.to_hex(),
                    RequestStatus::Rejected,
                ),
            },
            Instruction::PortalRedeem { verdict, .. } => match verdict {
                Verdict::Accepted(content) => {
                    if self.token_kind(&content.token_id).await? == Some(true) {
                        return skip("ptoken registered as centralized");
                    }
                    if let Err(err) =
                        apply_redeem_request(&mut self.working.portal, &content, self.height)
                    {
                        return skip(err.to_string());
                    }
                    self.deduct(content.token_id, content.redeem_amount, false);
                    self.set_status(
                        RequestKind::Redeem,
                        content.unique_redeem_id,
                        RequestStatus::Pending,
                    );
                }
                Verdict::Rejected(request) => {
                    let id = request.meta.unique_redeem_id;
                    self.set_rejected_if_absent(RequestKind::Redeem, id).await?;
                }
            },
            Instruction::RelayingHeader {
                chain,
                status,
                content,
                ..
            } => return Ok(self.apply_relaying_header(chain, status, content)),
        }
        Ok(None)
    }

    async fn apply_burning_confirm(&mut self, confirm: BurningConfirm) -> Result<Skip> {
        let Some(amount) = to_internal_amount(
            &confirm.external_token_id,
            confirm.amount,
            &self.params.eth_external_token_id,
        ) else {
            return skip("burn amount out of range");
        };
        if self.token_kind(&confirm.inc_token_id).await? != Some(false) {
            return skip("token is not a registered decentralized token");
        }
        if self
            .get(&Key::BurningConfirm(confirm.tx_id))
            .await?
            .is_some()
        {
            return skip("burn already confirmed");
        }
        if amount as u128 > self.outstanding(&confirm.inc_token_id).await? {
            return skip("burn exceeds outstanding supply");
        }
        self.deduct(confirm.inc_token_id, amount, false);
        self.pending.insert(
            Key::BurningConfirm(confirm.tx_id),
            Status::Update(Value::Height(self.height)),
        );
        Ok(None)
    }

    fn apply_relaying_header(
        &mut self,
        chain: RelayChain,
        status: RelayingStatus,
        content: RelayingHeaderContent,
    ) -> Skip {
        let id = content.tx_req_id.to_hex();
        if status == RelayingStatus::Rejected {
            self.set_status(RequestKind::RelayingHeader, id, RequestStatus::Rejected);
            return None;
        }
        let Some(current) = self.working.chains.get(&chain) else {
            return Some(format!("no chain state for {chain:?}"));
        };
        let mut replay = current.clone();
        match verify_relaying_header(
            Some(&mut replay),
            self.params.max_pending_headers,
            content.block_height,
            &content.header,
        ) {
            Ok(replayed) if replayed == status => {
                self.working.chains.insert(chain, replay);
                self.set_status(RequestKind::RelayingHeader, id, RequestStatus::Accepted);
                None
            }
            Ok(replayed) => Some(format!(
                "replay produced {} instead of {}",
                replayed.as_str(),
                status.as_str()
            )),
            Err(reason) => Some(reason),
        }
    }

    /// Commits one bridge-token write per updated token, then the protocol
    /// working set.
    ///
    /// A net deduct larger than the stored supply clears it to zero. A count up
    /// that overflows `u64` aborts the height.
    pub async fn finalize(mut self) -> Result<ApplyOutput> {
        let updating = std::mem::take(&mut self.updating);
        let mut token_updates = Vec::with_capacity(updating.len());
        for (token_id, info) in updating {
            let mut token = match self.get(&Key::BridgeToken(token_id)).await? {
                Some(Value::BridgeToken(token)) => token,
                _ => BridgeTokenState {
                    token_id,
                    external_token_id: info.external_token_id.clone(),
                    is_centralized: info.is_centralized,
                    amount: 0,
                },
            };
            let change = if info.count_up > info.deduct {
                let diff = u64::try_from(info.count_up - info.deduct)
                    .map_err(|_| anyhow!("count up for token {token_id} exceeds u64"))?;
                token.amount = token
                    .amount
                    .checked_add(diff)
                    .ok_or_else(|| anyhow!("count up of {diff} overflows token {token_id}"))?;
                NetChange::CountUp(diff)
            } else if info.deduct > info.count_up {
                let requested = info.deduct - info.count_up;
                let diff = u64::try_from(requested)
                    .unwrap_or(u64::MAX)
                    .min(token.amount);
                if diff as u128 != requested {
                    warn!(
                        height = self.height,
                        token = %token_id,
                        %requested,
                        outstanding = token.amount,
                        "clamping deduct to outstanding supply"
                    );
                }
                token.amount -= diff;
                if diff == 0 {
                    NetChange::Unchanged
                } else {
                    NetChange::Deduct(diff)
                }
            } else {
                NetChange::Unchanged
            };
            if token.external_token_id.is_empty() {
                token.external_token_id = info.external_token_id;
            }
            debug!(
                height = self.height,
                token = %token_id,
                marker = change.marker(),
                amount = token.amount,
                "committing token update"
            );
            token_updates.push(TokenUpdate {
                token_id,
                change,
                amount: token.amount,
            });
            self.pending
                .insert(Key::BridgeToken(token_id), Status::Update(Value::BridgeToken(token)));
        }

        let Applier {
            mut pending,
            working,
            height,
            applied,
            skipped,
            ..
        } = self;
        for (key, value) in working.into_writes() {
            pending.insert(key, Status::Update(value));
        }
        info!(
            height,
            applied,
            skipped,
            tokens = token_updates.len(),
            "applied beacon instructions"
        );
        Ok(ApplyOutput {
            changes: pending.into_iter().collect(),
            token_updates,
            applied,
            skipped,
        })
    }
}

impl<'a, S: State> State for Applier<'a, S> {
    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        Ok(match self.pending.get(key) {
            Some(Status::Update(value)) => Some(value.clone()),
            Some(Status::Delete) => None,
            None => self.state.get(key).await?,
        })
    }

    async fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        self.pending.insert(key, Status::Update(value));
        Ok(())
    }

    async fn delete(&mut self, key: &Key) -> Result<()> {
        self.pending.insert(key.clone(), Status::Delete);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mocks::{bridge_token, token},
        state::Memory,
    };
    use commonware_runtime::{deterministic::Runner, Runner as _};
    use meridian_types::{
        action::{ContractingReqAction, ContractingRequest},
        content::IssuingAcceptedContent,
        meta::MetaType,
    };

    fn issuing(token_id: TokenId, amount: u64, tx: &str) -> WireInstruction {
        Instruction::Issuing {
            shard_id: 0,
            verdict: Verdict::Accepted(IssuingAcceptedContent {
                shard_id: 0,
                deposited_amount: amount,
                receiver_address: "alice".into(),
                inc_token_id: token_id,
                inc_token_name: "pUSD".into(),
                tx_req_id: token(tx),
            }),
        }
        .to_wire()
    }

    fn contracting(token_id: TokenId, amount: u64, tx: &str) -> WireInstruction {
        Instruction::Contracting {
            shard_id: 0,
            verdict: Verdict::Accepted(ContractingReqAction {
                meta: ContractingRequest {
                    burner_address: "alice".into(),
                    burned_amount: amount,
                    token_id,
                },
                tx_req_id: token(tx),
            }),
        }
        .to_wire()
    }

    #[test]
    fn net_commit_markers() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let params = Params::default();
            let (up, down, flat) = (token("up"), token("down"), token("flat"));
            let mut state = Memory::default();
            for (token_id, amount) in [(down, 100), (flat, 50)] {
                let registered = bridge_token(token_id, true, amount);
                state
                    .insert(Key::BridgeToken(token_id), Value::BridgeToken(registered))
                    .await
                    .unwrap();
            }

            let mut applier = Applier::load(&state, &params, 1).await.unwrap();
            applier
                .apply(&[
                    issuing(up, 30, "i1"),
                    issuing(up, 12, "i2"),
                    contracting(down, 40, "c1"),
                    issuing(flat, 5, "i3"),
                    contracting(flat, 5, "c2"),
                ])
                .await
                .unwrap();
            assert_eq!(applier.updating()[&up].count_up, 42);
            let output = applier.finalize().await.unwrap();

            let by_token: BTreeMap<_, _> = output
                .token_updates
                .iter()
                .map(|update| (update.token_id, update))
                .collect();
            assert_eq!(by_token.len(), 3);
            assert_eq!(by_token[&up].change, NetChange::CountUp(42));
            assert_eq!(by_token[&up].change.marker(), "+");
            assert_eq!(by_token[&down].change, NetChange::Deduct(40));
            assert_eq!(by_token[&down].amount, 60);
            assert_eq!(by_token[&flat].change.marker(), "");
            assert_eq!(by_token[&flat].amount, 50);
        });
    }

    #[test]
    fn oversized_burn_skips_only_itself() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let params = Params::default();
            let (usd, eur) = (token("usd"), token("eur"));
            let mut state = Memory::default();
            state
                .insert(Key::BridgeToken(usd), Value::BridgeToken(bridge_token(usd, true, 10)))
                .await
                .unwrap();

            let mut applier = Applier::load(&state, &params, 1).await.unwrap();
            applier
                .apply(&[
                    issuing(eur, 7, "i1"),
                    contracting(usd, 11, "c1"),
                    // Counts this height's issuance: 10 + 5 covers 15.
                    issuing(usd, 5, "i2"),
                    contracting(usd, 15, "c2"),
                    contracting(usd, 1, "c3"),
                ])
                .await
                .unwrap();
            let output = applier.finalize().await.unwrap();
            assert_eq!(output.applied, 3);
            assert_eq!(output.skipped, 2);

            let by_token: BTreeMap<_, _> = output
                .token_updates
                .iter()
                .map(|update| (update.token_id, update))
                .collect();
            assert_eq!(by_token[&eur].change, NetChange::CountUp(7));
            assert_eq!(by_token[&usd].change, NetChange::Deduct(10));
            assert_eq!(by_token[&usd].amount, 0);
            assert!(output.changes.contains(&(
                Key::RequestStatus(RequestKind::Issuing, token("i1").to_hex()),
                Status::Update(Value::RequestStatus(StatusRecord {
                    status: RequestStatus::Accepted,
                    beacon_height: 1,
                })),
            )));
        });
    }

    #[test]
    fn rejected_issuance_only_writes_status() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let params = Params::default();
            let state = Memory::default();
            let rejected = Instruction::Issuing {
                shard_id: 0,
                verdict: Verdict::Rejected(token("tx")),
            }
            .to_wire();

            let mut applier = Applier::load(&state, &params, 4).await.unwrap();
            applier.apply(&[rejected]).await.unwrap();
            assert!(applier.updating().is_empty());
            let output = applier.finalize().await.unwrap();
            assert!(output.token_updates.is_empty());
            assert!(output.changes.contains(&(
                Key::RequestStatus(RequestKind::Issuing, token("tx").to_hex()),
                Status::Update(Value::RequestStatus(StatusRecord {
                    status: RequestStatus::Rejected,
                    beacon_height: 4,
                })),
            )));
        });
    }

    #[test]
    fn contracting_unknown_token_is_skipped() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let params = Params::default();
            let state = Memory::default();
            let committee: WireInstruction = vec!["swap".into(), "a".into(), "b".into()];
            let unknown_meta: WireInstruction =
                vec![MetaType::ContractingRequest.code().to_string(), "0".into()];

            let mut applier = Applier::load(&state, &params, 1).await.unwrap();
            applier
                .apply(&[committee, unknown_meta, contracting(token("nope"), 5, "c1")])
                .await
                .unwrap();
            let output = applier.finalize().await.unwrap();
            assert_eq!(output.applied, 0);
            assert_eq!(output.skipped, 2);
            assert!(output.token_updates.is_empty());
        });
    }
}
