// Copyright (C) 2024 Polytope Labs.
// SPDX-License-Identifier: Apache-2.0

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// 	http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Filler selection and order execution.
//!
//! Bids are joined from the hub's on-chain deposits and off-chain bid
//! blobs, validated against the order's requested outputs, ranked by USD
//! value, simulated, and the winner is authorized with the order's session
//! key and shipped to a bundler. Same-chain orders may fill partially and
//! loop back for another round; a used set keeps retired `(solver, nonce)`
//! pairs from being re-selected.

use super::{
    alloy_u256, bundler::{unpack_user_operation, BundlerClient}, select_solver_digest, sp_u256,
    BidBlob, FillerBid, OrderV2, PackedUserOperation, TokenAmount,
};
use crate::{
    session::SessionKey,
    store::{session_key_entry, Scoped},
    HyperbridgeClient,
};
use alloy_primitives::Address;
use alloy_sol_types::{SolCall, SolEvent, SolValue};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chain_clients::{
    abi,
    evm::{CallRequest, EvmClient, Log},
    Client, ClientError,
};
use codec::Decode;
use ismp_primitives::{keys::bid_storage_key, StateMachine};
use sp_core::{Bytes, H160, H256, U256};
use std::{collections::HashSet, sync::Arc, time::Duration};

/// Configuration for the intent execution flow.
#[derive(Clone, Debug)]
pub struct IntentConfig {
    /// The v0.7 entry point contract
    pub entry_point: H160,
    /// Bundler endpoint, required for execution
    pub bundler_url: Option<String>,
    /// How long to poll for bids before giving up
    pub bid_timeout: Duration,
    /// Minimum fresh bids to collect before ranking
    pub min_bids: usize,
    /// EIP-712 domain name of the intent gateway
    pub domain_name: String,
    /// EIP-712 domain version of the intent gateway
    pub domain_version: String,
    /// Stablecoin token ids and their decimals, priced at one dollar
    pub stable_tokens: Vec<(H256, u8)>,
    /// The wrapped native token id, priced through the dex
    pub wrapped_native: H256,
    /// The destination fee token, synthesized solvent in gas estimates
    pub fee_token: Option<H160>,
    /// Runtime code injected for the solver account during gas estimates
    pub solver_account_code: Option<Vec<u8>>,
    /// Bump applied to the quoted priority fee, in percent
    pub priority_fee_bump: u64,
    /// Bump applied to the quoted max fee, in percent
    pub max_fee_bump: u64,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            entry_point: H160::zero(),
            bundler_url: None,
            bid_timeout: Duration::from_secs(30),
            min_bids: 1,
            domain_name: "IntentGateway".to_string(),
            domain_version: "1".to_string(),
            stable_tokens: vec![],
            wrapped_native: H256::zero(),
            fee_token: None,
            solver_account_code: None,
            priority_fee_bump: 8,
            max_fee_bump: 10,
        }
    }
}

/// Price discovery consumed by bid ranking and gas estimation. The actual
/// dex plumbing is external to the SDK.
#[async_trait]
pub trait PriceQuote: Send + Sync {
    /// USD value of `1e18` units of the chain's wrapped native token,
    /// quoted against usdc.
    async fn native_token_price(&self, chain: StateMachine) -> Result<f64, anyhow::Error>;

    /// Convert an estimated gas cost on `chain` into the chain's fee
    /// token, returning the amount and the token's decimals.
    async fn gas_cost_in_fee_token(
        &self,
        chain: StateMachine,
        gas_limit: u64,
    ) -> Result<(U256, u8), anyhow::Error>;

    /// Decimals of the fee token on `chain`.
    async fn fee_token_decimals(&self, chain: StateMachine) -> Result<u8, anyhow::Error>;
}

/// A bid that decoded and validated against the order.
#[derive(Clone, Debug)]
pub struct DecodedBid {
    /// The raw joined bid
    pub bid: FillerBid,
    /// The solver's account on the destination, the user op sender
    pub solver: H160,
    /// The outputs the solver promises
    pub outputs: Vec<TokenAmount>,
    /// The `fillOrder` calldata inside the batch
    pub fill_data: Vec<u8>,
    /// Native value attached to the fill call
    pub fill_value: U256,
    /// USD value of the promised outputs
    pub usd_value: f64,
}

/// How an execution round ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FillOutcome {
    /// The order is fully filled
    Full,
    /// A cross-chain fill was submitted; delivery is tracked separately
    CrossChainSubmitted,
}

/// The result of the execution flow. Failures are events, not errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Execution completed
    Complete(FillOutcome),
    /// Execution failed terminally
    Failed {
        /// What went wrong
        description: String,
    },
}

/// An order prepared for placement: calldata for the caller to sign and
/// broadcast, and the session key stamped into the order.
#[derive(Clone, Debug)]
pub struct PreparedOrder {
    /// The order with its session address assigned
    pub order: OrderV2,
    /// `placeOrder` calldata
    pub calldata: Vec<u8>,
    /// The generated session key
    pub session: SessionKey,
}

/// The intent execution client.
pub struct IntentClient {
    /// The underlying SDK client
    pub client: HyperbridgeClient,
    /// EVM adapter for the order's source chain
    pub source_evm: Arc<EvmClient>,
    /// EVM adapter for the order's destination chain
    pub dest_evm: Arc<EvmClient>,
    /// Price discovery
    pub price: Arc<dyn PriceQuote>,
    /// Flow configuration
    pub config: IntentConfig,
    bundler: Option<BundlerClient>,
}

impl IntentClient {
    /// Create the execution client. The bundler connection is established
    /// lazily from the configured url.
    pub fn new(
        client: HyperbridgeClient,
        source_evm: Arc<EvmClient>,
        dest_evm: Arc<EvmClient>,
        price: Arc<dyn PriceQuote>,
        config: IntentConfig,
    ) -> Result<Self, ClientError> {
        let bundler = match &config.bundler_url {
            Some(url) => Some(BundlerClient::new(url)?),
            None => None,
        };
        Ok(Self { client, source_evm, dest_evm, price, config, bundler })
    }

    pub(crate) fn bundler(&self) -> Result<&BundlerClient, ClientError> {
        self.bundler
            .as_ref()
            .ok_or_else(|| ClientError::Config("no bundler url was configured".to_string()))
    }

    /// Generate a session key, stamp its address into the order and encode
    /// the placement calldata for the caller to sign and broadcast.
    pub fn prepare_order(
        &self,
        mut order: OrderV2,
        graffiti: H256,
    ) -> Result<PreparedOrder, anyhow::Error> {
        let session = SessionKey::generate()?;
        order.session = session.address;
        let calldata = abi::placeOrderCall {
            order: order.to_sol(),
            graffiti: alloy_primitives::B256::from(graffiti.0),
        }
        .abi_encode();
        Ok(PreparedOrder { order, calldata, session })
    }

    /// Reconcile a placed order against its `OrderPlaced` event and store
    /// the session key under the final commitment. The contract may have
    /// deducted a protocol fee or normalized amounts, so the emitted nonce,
    /// fees and inputs are authoritative.
    pub async fn finalize_order(
        &self,
        prepared: PreparedOrder,
        transaction_hash: H256,
    ) -> Result<OrderV2, anyhow::Error> {
        let PreparedOrder { mut order, session, .. } = prepared;
        let gateway = self.source_evm.intent_gateway_address()?;
        let receipt = crate::tracker::retry_rpc(|| async {
            self.source_evm
                .transaction_receipt(transaction_hash)
                .await?
                .ok_or_else(|| ClientError::Other("placement receipt not yet available".into()))
        })
        .await
        .context("fetching the placement receipt")?;

        let placed = receipt
            .logs
            .iter()
            .filter(|log| log.address == gateway)
            .find_map(|log| decode_event::<abi::OrderPlaced>(log))
            .ok_or_else(|| anyhow!("no OrderPlaced event in receipt {transaction_hash:?}"))?;

        order.nonce = placed
            .nonce
            .try_into()
            .map_err(|_| anyhow!("order nonce overflows u64"))?;
        order.fees = sp_u256(placed.fees);
        order.inputs = placed
            .inputs
            .iter()
            .map(|asset| TokenAmount {
                token: H256(asset.token.0),
                amount: sp_u256(asset.amount),
            })
            .collect();
        let commitment = order.commitment();
        order.id = commitment;

        Scoped::new(&*self.client.store)
            .set(&session_key_entry(commitment), &session)
            .context("persisting the session key")?;
        Ok(order)
    }

    /// Drop the session key stored for `commitment`.
    pub fn prune_session_key(&self, commitment: H256) -> Result<(), anyhow::Error> {
        Scoped::new(&*self.client.store).remove(&session_key_entry(commitment))
    }

    /// Run the filler-selection flow for a finalized order.
    pub async fn execute_order(&self, order: &OrderV2) -> ExecutionResult {
        match self.execute_inner(order).await {
            Ok(outcome) => ExecutionResult::Complete(outcome),
            Err(error) => {
                log::warn!(target: "hyperbridge-client", "order execution failed: {error:#}");
                ExecutionResult::Failed { description: format!("{error:#}") }
            }
        }
    }

    async fn execute_inner(&self, order: &OrderV2) -> Result<FillOutcome, anyhow::Error> {
        let commitment = order.commitment();
        let session: SessionKey = Scoped::new(&*self.client.store)
            .get(&session_key_entry(commitment))?
            .ok_or_else(|| anyhow!("no session key stored for order {commitment:?}"))?;
        let gateway = self.dest_evm.intent_gateway_address()?;
        let mut used: HashSet<([u8; 32], [u8; 32])> = HashSet::new();

        loop {
            let bids = self.poll_bids(order, commitment, gateway, &used).await?;
            let mut ranked = self.rank_bids(order, bids).await;
            ranked.sort_by(|a, b| {
                b.usd_value.partial_cmp(&a.usd_value).unwrap_or(std::cmp::Ordering::Equal)
            });

            let mut selected = None;
            for candidate in ranked {
                let signature = self.session_signature(&session, commitment, &candidate)?;
                match self.simulate_fill(order, commitment, gateway, &candidate, &signature).await
                {
                    Ok(()) => {
                        selected = Some((candidate, signature));
                        break;
                    }
                    Err(error) => {
                        log::debug!(target: "hyperbridge-client", "bid from {:?} failed simulation: {error:#}", candidate.solver);
                    }
                }
            }
            let Some((bid, session_signature)) = selected else {
                Err(anyhow!("no bid for order {commitment:?} survived simulation"))?
            };
            used.insert((bid.bid.filler, bid.bid.user_op.nonce));

            // the final signature is the solver's own followed by the
            // session authorization
            let mut user_op = bid.bid.user_op.clone();
            user_op.signature.extend_from_slice(&session_signature);
            let unpacked = unpack_user_operation(&user_op);
            let bundler = self.bundler()?;
            let op_hash = bundler
                .send_user_operation(&unpacked, self.config.entry_point)
                .await
                .context("submitting the user operation")?;
            log::info!(target: "hyperbridge-client", "submitted user op {op_hash:?} for order {commitment:?}");

            if !order.is_same_chain() {
                return Ok(FillOutcome::CrossChainSubmitted);
            }

            let receipt = bundler.wait_for_receipt(op_hash).await?;
            match same_chain_fill_kind(gateway, &receipt.receipt.logs) {
                Some(SameChainFill::Full) => {
                    self.prune_session_key(commitment)?;
                    return Ok(FillOutcome::Full);
                }
                Some(SameChainFill::Partial) => {
                    log::info!(target: "hyperbridge-client", "order {commitment:?} partially filled, collecting more bids");
                    continue;
                }
                None => Err(anyhow!(
                    "user operation {op_hash:?} landed without a fill event"
                ))?,
            }
        }
    }

    /// Join bids from the hub's storages, waiting up to the bid timeout
    /// for enough fresh `(solver, nonce)` pairs.
    async fn poll_bids(
        &self,
        order: &OrderV2,
        commitment: H256,
        gateway: H160,
        used: &HashSet<([u8; 32], [u8; 32])>,
    ) -> Result<Vec<DecodedBid>, anyhow::Error> {
        let deadline = tokio::time::Instant::now() + self.config.bid_timeout;
        loop {
            let entries = self.client.hyperbridge.query_order_bid_entries(commitment).await?;
            let mut fresh = vec![];
            for (filler, deposit) in entries {
                let Some(blob) = self
                    .client
                    .hyperbridge
                    .offchain_storage(bid_storage_key(commitment, filler))
                    .await?
                else {
                    continue;
                };
                // malformed bids are skipped, not fatal
                let Some(bid) = decode_bid_blob(filler, deposit, &blob) else {
                    log::debug!(target: "hyperbridge-client", "skipping undecodable bid from {}", hex::encode(filler));
                    continue;
                };
                if used.contains(&(bid.filler, bid.user_op.nonce)) {
                    continue;
                }
                match decode_bid(order, gateway, bid) {
                    Some(decoded) => fresh.push(decoded),
                    None => {
                        log::debug!(target: "hyperbridge-client", "skipping bid with undecodable call data");
                    }
                }
            }
            if fresh.len() >= self.config.min_bids {
                return Ok(fresh);
            }
            if tokio::time::Instant::now() >= deadline {
                if fresh.is_empty() {
                    Err(anyhow!("no bids arrived for order {commitment:?}"))?
                }
                return Ok(fresh);
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Drop invalid bids and price the rest in USD.
    async fn rank_bids(&self, order: &OrderV2, bids: Vec<DecodedBid>) -> Vec<DecodedBid> {
        let native_price = match self.price.native_token_price(order.destination).await {
            Ok(price) => price,
            Err(error) => {
                log::debug!(target: "hyperbridge-client", "no dex quote for the native token: {error:#}");
                0.0
            }
        };
        bids.into_iter()
            .filter(|bid| {
                validate_outputs(&order.output.assets, &bid.outputs, order.is_same_chain())
            })
            .map(|mut bid| {
                bid.usd_value = usd_value(
                    &bid.outputs,
                    &self.config.stable_tokens,
                    self.config.wrapped_native,
                    native_price,
                );
                bid
            })
            .collect()
    }

    fn session_signature(
        &self,
        session: &SessionKey,
        commitment: H256,
        bid: &DecodedBid,
    ) -> Result<[u8; 65], anyhow::Error> {
        let StateMachine::Evm(chain_id) = self.dest_evm.state_machine_id().state_id else {
            Err(anyhow!("intent orders fill on evm chains"))?
        };
        let digest = select_solver_digest(
            commitment,
            bid.solver,
            &self.config.domain_name,
            &self.config.domain_version,
            chain_id as u64,
            self.dest_evm.intent_gateway_address()?,
        );
        session.sign_digest(digest)
    }

    /// Simulate `select` followed by the solver's own `fillOrder` through
    /// the solver account's batch executor.
    async fn simulate_fill(
        &self,
        order: &OrderV2,
        commitment: H256,
        gateway: H160,
        bid: &DecodedBid,
        session_signature: &[u8; 65],
    ) -> Result<(), anyhow::Error> {
        let gateway_address = Address::from_slice(gateway.as_bytes());
        let select = abi::selectCall {
            commitment: alloy_primitives::B256::from(commitment.0),
            solver: Address::from_slice(bid.solver.as_bytes()),
            signature: session_signature.to_vec().into(),
        }
        .abi_encode();
        let calls = vec![
            abi::Call {
                target: gateway_address,
                value: alloy_u256(U256::zero()),
                data: select.into(),
            },
            abi::Call {
                target: gateway_address,
                value: alloy_u256(bid.fill_value),
                data: bid.fill_data.clone().into(),
            },
        ];
        let batch = abi::executeCall { calls }.abi_encode();
        self.dest_evm
            .call(CallRequest {
                from: Some(self.config.entry_point),
                to: bid.solver,
                value: Some(order.native_value()),
                data: Bytes(batch),
            })
            .await?;
        Ok(())
    }
}

/// Whether a same-chain fill receipt reports a full or partial fill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SameChainFill {
    /// `OrderFilled` was emitted
    Full,
    /// `PartialFill` was emitted
    Partial,
}

/// Inspect receipt logs for the gateway's fill events.
pub fn same_chain_fill_kind(gateway: H160, logs: &[Log]) -> Option<SameChainFill> {
    for log in logs {
        if log.address != gateway {
            continue;
        }
        let Some(topic) = log.topics.first() else { continue };
        if topic.0 == abi::OrderFilled::SIGNATURE_HASH.0 {
            return Some(SameChainFill::Full);
        }
        if topic.0 == abi::PartialFill::SIGNATURE_HASH.0 {
            return Some(SameChainFill::Partial);
        }
    }
    None
}

/// Decode a raw bid blob from the hub's off-chain store.
pub fn decode_bid_blob(filler: [u8; 32], deposit: u128, blob: &[u8]) -> Option<FillerBid> {
    let blob = BidBlob::decode(&mut &*blob).ok()?;
    if blob.filler != filler {
        return None;
    }
    let user_op = PackedUserOperation::decode(&mut &*blob.user_op).ok()?;
    Some(FillerBid { filler, user_op, deposit })
}

/// Locate the inner `fillOrder` call in a bid's batch-executor payload and
/// extract the promised outputs.
pub fn decode_bid(order: &OrderV2, gateway: H160, bid: FillerBid) -> Option<DecodedBid> {
    let batch = abi::executeCall::abi_decode(&bid.user_op.call_data, true).ok()?;
    let gateway_address = Address::from_slice(gateway.as_bytes());
    let fill = batch.calls.iter().find(|call| {
        call.target == gateway_address && call.data.starts_with(&abi::fillOrderCall::SELECTOR)
    })?;
    let fill_call = abi::fillOrderCall::abi_decode(&fill.data, true).ok()?;
    // the bid must be for this order
    if H256(sp_crypto_hashing::keccak_256(&fill_call.order.abi_encode())) != order.commitment() {
        return None;
    }
    let outputs = fill_call
        .order
        .output
        .assets
        .iter()
        .map(|asset| TokenAmount { token: H256(asset.token.0), amount: sp_u256(asset.amount) })
        .collect();
    Some(DecodedBid {
        solver: H160::from_slice(&bid.user_op.sender),
        outputs,
        fill_data: fill.data.to_vec(),
        fill_value: sp_u256(fill.value),
        usd_value: 0.0,
        bid,
    })
}

/// The §bid validity rule. Cross-chain fills must meet every requested
/// amount; same-chain fills may be partial but every requested output must
/// be present and positive.
pub fn validate_outputs(
    requested: &[TokenAmount],
    offered: &[TokenAmount],
    same_chain: bool,
) -> bool {
    if same_chain {
        requested.iter().enumerate().all(|(index, asset)| {
            offered
                .get(index)
                .map(|offer| offer.token == asset.token && !offer.amount.is_zero())
                .unwrap_or(false)
        })
    } else {
        requested.len() == offered.len() &&
            requested.iter().zip(offered).all(|(asset, offer)| {
                offer.token == asset.token && offer.amount >= asset.amount
            })
    }
}

/// USD value of a set of outputs: stables at one dollar, the wrapped
/// native token at the dex quote, anything else at zero.
pub fn usd_value(
    outputs: &[TokenAmount],
    stable_tokens: &[(H256, u8)],
    wrapped_native: H256,
    native_price: f64,
) -> f64 {
    outputs
        .iter()
        .map(|output| {
            if let Some((_, decimals)) =
                stable_tokens.iter().find(|(token, _)| *token == output.token)
            {
                to_float(output.amount) / 10f64.powi(*decimals as i32)
            } else if output.token == wrapped_native || output.token == H256::zero() {
                to_float(output.amount) / 1e18 * native_price
            } else {
                0.0
            }
        })
        .sum()
}

fn to_float(amount: U256) -> f64 {
    // saturating: ranking only needs relative magnitudes
    u128::try_from(amount).map(|value| value as f64).unwrap_or(f64::MAX)
}

pub(crate) fn decode_event<E: SolEvent>(log: &Log) -> Option<E> {
    let topics = log.topics.iter().map(|topic| alloy_primitives::B256::from(topic.0));
    E::decode_raw_log(topics, &log.data.0, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(token: u8, value: u64) -> TokenAmount {
        TokenAmount { token: H256::repeat_byte(token), amount: value.into() }
    }

    #[test]
    fn cross_chain_bids_must_meet_every_output() {
        let requested = vec![amount(1, 100), amount(2, 50)];
        assert!(validate_outputs(&requested, &[amount(1, 100), amount(2, 50)], false));
        assert!(validate_outputs(&requested, &[amount(1, 150), amount(2, 51)], false));
        // short on the second output
        assert!(!validate_outputs(&requested, &[amount(1, 150), amount(2, 49)], false));
        // wrong token
        assert!(!validate_outputs(&requested, &[amount(1, 150), amount(3, 50)], false));
        // missing output
        assert!(!validate_outputs(&requested, &[amount(1, 150)], false));
    }

    #[test]
    fn same_chain_bids_may_be_partial_but_not_empty() {
        let requested = vec![amount(1, 100), amount(2, 50)];
        assert!(validate_outputs(&requested, &[amount(1, 10), amount(2, 1)], true));
        assert!(!validate_outputs(&requested, &[amount(1, 10), amount(2, 0)], true));
        assert!(!validate_outputs(&requested, &[amount(1, 10)], true));
    }

    #[test]
    fn ranking_prices_stables_at_par_and_unknowns_at_zero() {
        let usdc = H256::repeat_byte(0xa0);
        let weth = H256::repeat_byte(0xb0);
        let stables = vec![(usdc, 6u8)];
        // 25 usdc + 0.5 weth at $2000 + an unknown token
        let outputs = vec![
            TokenAmount { token: usdc, amount: 25_000_000u64.into() },
            TokenAmount { token: weth, amount: U256::from(500_000_000_000_000_000u128) },
            TokenAmount { token: H256::repeat_byte(0xc0), amount: 1_000_000u64.into() },
        ];
        let value = usd_value(&outputs, &stables, weth, 2_000.0);
        assert!((value - 1_025.0).abs() < 1e-6, "got {value}");
    }

    #[test]
    fn bid_blobs_reject_filler_mismatches() {
        let op = PackedUserOperation {
            sender: [1u8; 20],
            nonce: [0u8; 32],
            init_code: vec![],
            call_data: vec![],
            account_gas_limits: [0u8; 32],
            pre_verification_gas: [0u8; 32],
            gas_fees: [0u8; 32],
            paymaster_and_data: vec![],
            signature: vec![],
        };
        let blob = BidBlob { filler: [7u8; 32], user_op: codec::Encode::encode(&op) };
        let encoded = codec::Encode::encode(&blob);
        assert!(decode_bid_blob([7u8; 32], 1, &encoded).is_some());
        assert!(decode_bid_blob([8u8; 32], 1, &encoded).is_none());
        assert!(decode_bid_blob([7u8; 32], 1, b"garbage").is_none());
    }

    #[test]
    fn bids_decode_through_the_batch_executor_payload() {
        let order = OrderV2 {
            source: StateMachine::Evm(97),
            destination: StateMachine::Evm(1),
            output: crate::intents::PaymentInfo {
                assets: vec![amount(1, 100)],
                beneficiary: H256::repeat_byte(2),
            },
            ..Default::default()
        };
        let gateway = H160::repeat_byte(0x9a);
        let fill = abi::fillOrderCall {
            order: order.to_sol(),
            options: abi::FillOptions { relayerFee: alloy_u256(5u64.into()) },
        }
        .abi_encode();
        let batch = abi::executeCall {
            calls: vec![abi::Call {
                target: Address::from_slice(gateway.as_bytes()),
                value: alloy_u256(7u64.into()),
                data: fill.into(),
            }],
        }
        .abi_encode();
        let bid = FillerBid {
            filler: [3u8; 32],
            user_op: PackedUserOperation {
                sender: [4u8; 20],
                nonce: [0u8; 32],
                init_code: vec![],
                call_data: batch,
                account_gas_limits: [0u8; 32],
                pre_verification_gas: [0u8; 32],
                gas_fees: [0u8; 32],
                paymaster_and_data: vec![],
                signature: vec![],
            },
            deposit: 9,
        };
        let decoded = decode_bid(&order, gateway, bid.clone()).unwrap();
        assert_eq!(decoded.solver, H160::repeat_byte(4));
        assert_eq!(decoded.outputs, vec![amount(1, 100)]);
        assert_eq!(decoded.fill_value, U256::from(7u64));

        // a bid for a different order is rejected
        let mut other = order.clone();
        other.nonce = 99;
        assert!(decode_bid(&other, gateway, bid).is_none());
    }
}
