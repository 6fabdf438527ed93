//! End-to-end tests across the producer and the applier.
//!
//! Each test builds a height from a shard bag, checks the instruction list, then
//! applies it and inspects the resulting state.

#[cfg(test)]
mod tests {
    use crate::{
        builder::BuildOutput,
        mocks::{
            bag, bridge_token, custodian_deposit_action, eth_issuing_action, init_tracing,
            issuing_action, pool, portal_params, relay_block_action, relay_header, seed_chain,
            seed_pools, seed_portal, seed_token, token, trade_action, trade_request, tx_id,
        },
        outcome::Diagnostic,
        state::{request_status, Memory, State},
        state_transition::{build_instructions, execute_beacon_height, StateTransitionResult},
        NetChange,
    };
    use commonware_runtime::{deterministic::Runner, Runner as _};
    use meridian_types::{
        action::{
            encode_payload, Action, ExchangeRate, PortalExchangeRates, PortalExchangeRatesAction,
            PortalRedeemRequest, PortalRedeemRequestAction, PortalRequestPTokens,
            PortalRequestPTokensAction, PortalUserRegister, PortalUserRegisterAction,
            PortingProof, ProofOutput,
        },
        hash::{TokenId, H256},
        instruction::RelayingStatus,
        ledger::{Key, PortalState, RequestKind, RequestStatus, Value},
        meta::MetaType,
        relaying::RelayChain,
        Instruction, Params, Verdict,
    };
    use std::collections::BTreeMap;

    async fn produce_and_apply(
        state: &mut Memory,
        params: &Params,
        height: u64,
        bag: &meridian_types::action::ShardInstructionBag,
    ) -> (BuildOutput, StateTransitionResult) {
        let output = build_instructions(&*state, params, height, bag)
            .await
            .expect("build");
        let result = execute_beacon_height(state, params, height, &output.to_wire())
            .await
            .expect("apply");
        (output, result)
    }

    async fn token_amount(state: &Memory, token_id: TokenId) -> Option<u64> {
        match state.get(&Key::BridgeToken(token_id)).await.unwrap() {
            Some(Value::BridgeToken(token)) => Some(token.amount),
            _ => None,
        }
    }

    #[test]
    fn cheaper_fee_ratio_trade_runs_first() {
        init_tracing();
        let executor = Runner::default();
        executor.start(|_| async move {
            let params = Params::default();
            let mut state = Memory::default();
            let (buy, sell) = (token("buy"), token("sell"));
            seed_pools(&mut state, vec![pool(buy, 1_000_000, sell, 1_000_000)]).await;

            // A: fee 10 on 100 sold, B: fee 3 on 10 sold. B pays the higher ratio.
            let a = trade_request(buy, sell, 100, 10, "a");
            let b = trade_request(buy, sell, 10, 3, "b");
            let bag = bag(&[trade_action(0, &a), trade_action(1, &b)]);

            let (output, result) = produce_and_apply(&mut state, &params, 1, &bag).await;
            let traders: Vec<_> = output
                .instructions
                .iter()
                .filter_map(|instruction| match instruction {
                    Instruction::PdeTrade {
                        verdict: Verdict::Accepted(content),
                        ..
                    } => Some(content.trader_address.as_str()),
                    _ => None,
                })
                .collect();
            assert_eq!(traders, vec!["b", "a"]);
            assert_eq!(result.applied, 2);

            for request in [&a, &b] {
                let status =
                    request_status(&state, RequestKind::PdeTrade, &request.tx_req_id.to_hex())
                        .await
                        .unwrap();
                assert_eq!(status, Some(RequestStatus::Accepted));
            }
        });
    }

    #[test]
    fn eth_issuance_drops_nine_decimals() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let params = Params::default();
            let mut state = Memory::default();
            let peth = token("peth");
            let wei = 1_500_000_000_000_000_000u128;
            let bag1 = bag(&[
                eth_issuing_action(0, peth, wei, b"eth-tx-1", tx_id(1)),
                eth_issuing_action(1, peth, wei, b"eth-tx-1", tx_id(2)),
            ]);

            let (output, result) = produce_and_apply(&mut state, &params, 1, &bag1).await;
            assert_eq!(output.instructions.len(), 2);
            match &output.instructions[0] {
                Instruction::IssuingEth {
                    verdict: Verdict::Accepted(content),
                    ..
                } => assert_eq!(content.issuing_amount, 1_500_000_000),
                other => panic!("unexpected instruction {other:?}"),
            }
            // Same ETH transaction in the same height.
            assert!(matches!(
                output.instructions[1],
                Instruction::IssuingEth {
                    verdict: Verdict::Rejected(_),
                    ..
                }
            ));
            assert_eq!(result.token_updates.len(), 1);
            assert_eq!(
                result.token_updates[0].change,
                NetChange::CountUp(1_500_000_000)
            );
            assert_eq!(token_amount(&state, peth).await, Some(1_500_000_000));

            // Same ETH transaction in a later height.
            let bag2 = bag(&[eth_issuing_action(0, peth, wei, b"eth-tx-1", tx_id(3))]);
            let (output, result) = produce_and_apply(&mut state, &params, 2, &bag2).await;
            assert!(matches!(
                output.instructions[0],
                Instruction::IssuingEth {
                    verdict: Verdict::Rejected(_),
                    ..
                }
            ));
            assert!(result.token_updates.is_empty());
            assert_eq!(token_amount(&state, peth).await, Some(1_500_000_000));
        });
    }

    #[test]
    fn relayed_headers_confirm_park_or_reject() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let params = Params::default();
            let mut state = Memory::default();
            let genesis = relay_header(100, H256::ZERO);
            seed_chain(&mut state, RelayChain::Bnb, genesis.clone()).await;

            let unlinked = relay_header(101, H256::digest(b"wrong parent"));
            let next = relay_header(101, genesis.hash());
            let ahead = relay_header(105, H256::digest(b"unknown"));
            let bag = bag(&[
                relay_block_action(RelayChain::Bnb, 0, &ahead, tx_id(3)),
                relay_block_action(RelayChain::Bnb, 0, &unlinked, tx_id(1)),
                relay_block_action(RelayChain::Bnb, 1, &next, tx_id(2)),
            ]);

            let (output, result) = produce_and_apply(&mut state, &params, 1, &bag).await;
            let statuses: Vec<_> = output
                .instructions
                .iter()
                .map(|instruction| match instruction {
                    Instruction::RelayingHeader { status, .. } => *status,
                    other => panic!("unexpected instruction {other:?}"),
                })
                .collect();
            assert_eq!(
                statuses,
                vec![
                    RelayingStatus::Rejected,
                    RelayingStatus::Confirmed,
                    RelayingStatus::Unconfirmed,
                ]
            );
            assert_eq!(result.skipped, 0);

            let Some(Value::RelayingChain(chain)) = state
                .get(&Key::RelayingChain(RelayChain::Bnb))
                .await
                .unwrap()
            else {
                panic!("missing chain state");
            };
            assert_eq!(chain.latest, next);
            assert_eq!(chain.unconfirmed, vec![ahead]);
            let rejected = request_status(&state, RequestKind::RelayingHeader, &tx_id(1).to_hex())
                .await
                .unwrap();
            assert_eq!(rejected, Some(RequestStatus::Rejected));
        });
    }

    #[test]
    fn undecodable_action_does_not_stop_siblings() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let params = Params::default();
            let state = Memory::default();
            let usd = token("usd");
            let mut bag = bag(&[
                issuing_action(0, usd, 10, tx_id(1)),
                issuing_action(1, usd, 20, tx_id(2)),
            ]);
            let code = MetaType::IssuingRequest.code().to_string();
            bag.push(0, vec![code, "%%% not base64".to_string()]);

            let output = build_instructions(&state, &params, 1, &bag).await.unwrap();
            assert_eq!(output.instructions.len(), 2);
            assert!(output
                .instructions
                .iter()
                .all(|instruction| matches!(
                    instruction,
                    Instruction::Issuing {
                        verdict: Verdict::Accepted(_),
                        ..
                    }
                )));
            assert_eq!(output.diagnostics.len(), 1);
            assert_eq!(output.diagnostics[0].shard_id, 0);
            assert!(matches!(
                output.diagnostics[0].diagnostic,
                Diagnostic::Decode(_)
            ));
        });
    }

    #[test]
    fn rejected_issuance_leaves_supply_unchanged() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let params = Params::default();
            let mut state = Memory::default();
            let peth = token("peth");
            seed_token(&mut state, bridge_token(peth, false, 500)).await;

            // Centralized issuance of a decentralized token.
            let bag = bag(&[issuing_action(0, peth, 100, tx_id(1))]);
            let (output, result) = produce_and_apply(&mut state, &params, 1, &bag).await;
            assert!(matches!(
                output.instructions[0],
                Instruction::Issuing {
                    verdict: Verdict::Rejected(_),
                    ..
                }
            ));
            assert!(result.token_updates.is_empty());
            assert_eq!(token_amount(&state, peth).await, Some(500));
        });
    }

    #[test]
    fn token_supply_is_the_sum_of_accepted_deltas() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let params = Params::default();
            let mut state = Memory::default();
            let usd = token("usd");
            let bag1 = bag(&[
                issuing_action(0, usd, 10, tx_id(1)),
                issuing_action(1, usd, 20, tx_id(2)),
                issuing_action(2, usd, 0, tx_id(3)),
                issuing_action(2, usd, 30, tx_id(4)),
            ]);
            let (_, result) = produce_and_apply(&mut state, &params, 1, &bag1).await;
            assert_eq!(result.token_updates.len(), 1);
            assert_eq!(result.token_updates[0].change, NetChange::CountUp(60));
            assert_eq!(result.token_updates[0].change.marker(), "+");
            assert_eq!(token_amount(&state, usd).await, Some(60));

            let bag2 = bag(&[issuing_action(0, usd, 5, tx_id(5))]);
            produce_and_apply(&mut state, &params, 2, &bag2).await;
            assert_eq!(token_amount(&state, usd).await, Some(65));
        });
    }

    fn porting_action(shard_id: u8, id: &str, ptoken: TokenId, amount: u64) -> Action {
        Action::new(
            MetaType::PortalUserRegister,
            shard_id,
            &PortalUserRegisterAction {
                meta: PortalUserRegister {
                    unique_register_id: id.to_string(),
                    incognito_address: "porter".to_string(),
                    ptoken_id: ptoken,
                    register_amount: amount,
                    porting_fee: 5,
                },
                tx_req_id: tx_id(20),
            },
        )
    }

    fn porting_proof(id: &str, paid: u64) -> PortingProof {
        PortingProof {
            block_height: 100,
            tx_hash: tx_id(99),
            memo: format!("PS1-{id}"),
            outputs: vec![ProofOutput {
                address: "cust-remote".to_string(),
                amount: paid,
            }],
        }
    }

    fn ptoken_action(shard_id: u8, id: &str, ptoken: TokenId, paid: u64) -> Action {
        let proof = porting_proof(id, paid);
        Action::new(
            MetaType::PortalUserRequestPToken,
            shard_id,
            &PortalRequestPTokensAction {
                meta: PortalRequestPTokens {
                    unique_porting_id: id.to_string(),
                    token_id: ptoken,
                    incognito_address: "porter".to_string(),
                    porting_amount: paid,
                    porting_proof: encode_payload(&proof),
                },
                tx_req_id: tx_id(21),
            },
        )
    }

    fn redeem_action(shard_id: u8, id: &str, ptoken: TokenId, amount: u64) -> Action {
        Action::new(
            MetaType::PortalRedeemRequest,
            shard_id,
            &PortalRedeemRequestAction {
                meta: PortalRedeemRequest {
                    unique_redeem_id: id.to_string(),
                    token_id: ptoken,
                    redeem_amount: amount,
                    redeemer_address: "porter".to_string(),
                    remote_address: "bnb-addr".to_string(),
                    redeem_fee: 1,
                },
                tx_req_id: tx_id(22),
            },
        )
    }

    fn rates_action(shard_id: u8, rates: &[(TokenId, u64)]) -> Action {
        Action::new(
            MetaType::PortalExchangeRates,
            shard_id,
            &PortalExchangeRatesAction {
                meta: PortalExchangeRates {
                    sender_address: "feeder".to_string(),
                    rates: rates
                        .iter()
                        .map(|(token_id, rate)| ExchangeRate {
                            token_id: *token_id,
                            rate: *rate,
                        })
                        .collect(),
                },
                tx_req_id: tx_id(23),
            },
        )
    }

    #[test]
    fn portal_stages_observe_earlier_stages_in_one_height() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let pbnb = token("pbnb");
            let params = portal_params(pbnb, RelayChain::Bnb, "feeder");
            let mut state = Memory::default();
            seed_chain(&mut state, RelayChain::Bnb, relay_header(100, H256::ZERO)).await;
            seed_portal(
                &mut state,
                PortalState {
                    exchange_rates: BTreeMap::from([(pbnb, 2), (H256::ZERO, 1)]),
                    ..Default::default()
                },
            )
            .await;

            // Later stages sit on earlier shards; stage order still wins.
            let bag = bag(&[
                redeem_action(0, "redeem-1", pbnb, 400),
                ptoken_action(0, "porting-1", pbnb, 1_000),
                porting_action(1, "porting-1", pbnb, 1_000),
                custodian_deposit_action(2, "cust", 10_000, pbnb, tx_id(10)),
            ]);
            let (output, result) = produce_and_apply(&mut state, &params, 1, &bag).await;

            let kinds: Vec<_> = output
                .instructions
                .iter()
                .map(|instruction| (instruction.meta_type(), accepted(instruction)))
                .collect();
            assert_eq!(
                kinds,
                vec![
                    (MetaType::PortalCustodianDeposit, true),
                    (MetaType::PortalUserRegister, true),
                    (MetaType::PortalUserRequestPToken, true),
                    (MetaType::PortalRedeemRequest, true),
                ]
            );
            assert_eq!(result.skipped, 0);
            assert_eq!(result.token_updates.len(), 1);
            assert_eq!(result.token_updates[0].change, NetChange::CountUp(600));

            let Some(Value::PortalState(portal)) = state.get(&Key::PortalState).await.unwrap()
            else {
                panic!("missing portal state");
            };
            let cust = &portal.custodians["cust"];
            assert_eq!(cust.free_collateral, 7_000);
            assert_eq!(cust.locked_collateral[&pbnb], 3_000);
            assert_eq!(cust.holding_public_tokens[&pbnb], 600);
            assert!(portal.waiting_porting.is_empty());
            assert!(portal.waiting_redeem.contains_key("redeem-1"));

            let porting = request_status(&state, RequestKind::Porting, "porting-1")
                .await
                .unwrap();
            assert_eq!(porting, Some(RequestStatus::Accepted));
            let redeem = request_status(&state, RequestKind::Redeem, "redeem-1")
                .await
                .unwrap();
            assert_eq!(redeem, Some(RequestStatus::Pending));
            assert!(state
                .get(&Key::PortingRequest("porting-1".to_string()))
                .await
                .unwrap()
                .is_some());
            let proof_hash = porting_proof("porting-1", 1_000).hash();
            assert_eq!(
                state.get(&Key::PortingProof(proof_hash)).await.unwrap(),
                Some(Value::Height(1))
            );

            // The same proof cannot complete the request twice.
            let replay = bag_of_one(ptoken_action(0, "porting-1", pbnb, 1_000));
            let (output, _) = produce_and_apply(&mut state, &params, 2, &replay).await;
            assert!(!accepted(&output.instructions[0]));
        });
    }

    #[test]
    fn centralized_registration_blocks_ptoken_mint() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let pbnb = token("pbnb");
            let params = portal_params(pbnb, RelayChain::Bnb, "feeder");
            let mut state = Memory::default();
            seed_chain(&mut state, RelayChain::Bnb, relay_header(100, H256::ZERO)).await;
            seed_portal(
                &mut state,
                PortalState {
                    exchange_rates: BTreeMap::from([(pbnb, 2), (H256::ZERO, 1)]),
                    ..Default::default()
                },
            )
            .await;

            // A centralized issuance of the portal token earlier in the same height.
            let bag = bag(&[
                issuing_action(0, pbnb, 5, tx_id(1)),
                custodian_deposit_action(0, "cust", 10_000, pbnb, tx_id(10)),
                porting_action(1, "porting-1", pbnb, 1_000),
                ptoken_action(2, "porting-1", pbnb, 1_000),
            ]);
            let (output, result) = produce_and_apply(&mut state, &params, 1, &bag).await;

            let ptoken = output
                .instructions
                .iter()
                .find(|instruction| instruction.meta_type() == MetaType::PortalUserRequestPToken)
                .expect("ptoken instruction");
            assert!(!accepted(ptoken));
            assert!(output.diagnostics.iter().any(|d| matches!(
                &d.diagnostic,
                Diagnostic::Rejected(reason) if reason.contains("centralized")
            )));

            // Every emitted instruction replays; the ledger only sees the issuance.
            assert_eq!(result.skipped, 0);
            assert_eq!(result.applied, output.instructions.len());
            assert_eq!(result.token_updates.len(), 1);
            assert_eq!(result.token_updates[0].change, NetChange::CountUp(5));
            assert_eq!(
                request_status(&state, RequestKind::Porting, "porting-1")
                    .await
                    .unwrap(),
                Some(RequestStatus::Pending)
            );
        });
    }

    #[test]
    fn exchange_rates_apply_after_porting() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let pbnb = token("pbnb");
            let params = portal_params(pbnb, RelayChain::Bnb, "feeder");
            let mut state = Memory::default();

            let bag = bag(&[
                rates_action(0, &[(pbnb, 2), (H256::ZERO, 1)]),
                custodian_deposit_action(0, "cust", 10_000, pbnb, tx_id(10)),
                porting_action(1, "porting-1", pbnb, 1_000),
            ]);
            let (output, _) = produce_and_apply(&mut state, &params, 1, &bag).await;
            let kinds: Vec<_> = output
                .instructions
                .iter()
                .map(|instruction| (instruction.meta_type(), accepted(instruction)))
                .collect();
            assert_eq!(
                kinds,
                vec![
                    (MetaType::PortalCustodianDeposit, true),
                    (MetaType::PortalUserRegister, false),
                    (MetaType::PortalExchangeRates, true),
                ]
            );
            let porting = request_status(&state, RequestKind::Porting, "porting-1")
                .await
                .unwrap();
            assert_eq!(porting, Some(RequestStatus::Rejected));

            // With rates finalized, the next height accepts it.
            let retry = bag_of_one(porting_action(0, "porting-1", pbnb, 1_000));
            let (output, _) = produce_and_apply(&mut state, &params, 2, &retry).await;
            assert!(accepted(&output.instructions[0]));
            let porting = request_status(&state, RequestKind::Porting, "porting-1")
                .await
                .unwrap();
            assert_eq!(porting, Some(RequestStatus::Pending));
        });
    }

    fn bag_of_one(action: Action) -> meridian_types::action::ShardInstructionBag {
        bag(&[action])
    }

    fn accepted(instruction: &Instruction) -> bool {
        match instruction {
            Instruction::PortalCustodianDeposit { verdict, .. } => verdict.is_accepted(),
            Instruction::PortalPorting { verdict, .. } => verdict.is_accepted(),
            Instruction::PortalPToken { verdict, .. } => verdict.is_accepted(),
            Instruction::PortalExchangeRates { verdict, .. } => verdict.is_accepted(),
            Instruction::PortalRedeem { verdict, .. } => verdict.is_accepted(),
            _ => false,
        }
    }
}
