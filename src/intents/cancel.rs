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

//! Order cancellation.
//!
//! Same-chain orders refund with a single `cancelOrder` call. Cross-chain
//! orders must first prove to the source chain that the order was never
//! filled on the destination: a non-inclusion proof travels back through a
//! GET-request round trip on the hub. Every intermediate artifact is
//! persisted so the flow resumes across process restarts from the latest
//! completed step.

use super::{
    executor::{decode_event, IntentClient},
    OrderV2,
};
use crate::{
    queries::{UpdateCriterion, UpdateFilter},
    store::{cancel_keys, session_key_entry, Scoped},
    tracker::{retry_rpc, wait_for_challenge_period},
    types::RequestStatus,
};
use alloy_sol_types::SolCall;
use anyhow::{anyhow, Context};
use async_stream::try_stream;
use chain_clients::{abi, ClientError, ProofKeys};
use futures::{Stream, StreamExt};
use ismp_primitives::{
    hash_get_request,
    messages::{GetRequest, Proof},
    slots::map_slot,
    IsmpMessage, StateMachineHeight,
};
use sp_core::{H256, U256};
use std::time::Duration;

/// Storage slot of the gateway's filled-orders mapping; its emptiness is
/// what the non-inclusion proof attests to.
pub const FILLED_ORDERS_SLOT: u64 = 4;

const HUB_RECEIPT_RETRIES: u32 = 10;
const HUB_RECEIPT_BACKOFF: Duration = Duration::from_secs(5);

/// Progress events of a cross-chain cancellation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancelStatus {
    /// The destination non-inclusion proof is persisted and the
    /// `cancelOrder` calldata is ready for the caller to sign and
    /// broadcast on the source chain
    DestinationProofReady {
        /// `cancelOrder` calldata
        calldata: Vec<u8>,
    },
    /// Waiting for the caller to hand back the source transaction hash
    AwaitingGetRequest,
    /// The source block carrying the GET request is finalized on the hub
    SourceFinalized,
    /// The GET request and both proofs were submitted to the hub
    HyperbridgeSubmitted {
        /// Hash of the hub extrinsic
        transaction_hash: H256,
    },
    /// The hub delivered the GET request
    HyperbridgeDelivered,
    /// The refund is final; all persisted artifacts were purged
    Cancelled,
    /// The flow failed terminally
    Failed {
        /// What went wrong
        description: String,
    },
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
struct PersistedProof {
    height: u64,
    proof: Vec<u8>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
struct PersistedGetRequest {
    source: String,
    dest: String,
    nonce: u64,
    from: Vec<u8>,
    keys: Vec<Vec<u8>>,
    height: u64,
    context: Vec<u8>,
    timeout_timestamp: u64,
}

impl TryFrom<PersistedGetRequest> for GetRequest {
    type Error = anyhow::Error;

    fn try_from(persisted: PersistedGetRequest) -> Result<Self, Self::Error> {
        Ok(GetRequest {
            source: persisted.source.parse()?,
            dest: persisted.dest.parse()?,
            nonce: persisted.nonce,
            from: persisted.from,
            keys: persisted.keys,
            height: persisted.height,
            context: persisted.context,
            timeout_timestamp: persisted.timeout_timestamp,
        })
    }
}

impl From<&GetRequest> for PersistedGetRequest {
    fn from(request: &GetRequest) -> Self {
        Self {
            source: request.source.to_string(),
            dest: request.dest.to_string(),
            nonce: request.nonce,
            from: request.from.clone(),
            keys: request.keys.clone(),
            height: request.height,
            context: request.context.clone(),
            timeout_timestamp: request.timeout_timestamp,
        }
    }
}

/// The slot whose emptiness proves the order was never filled.
pub fn filled_order_slot(commitment: H256) -> H256 {
    map_slot(commitment.as_bytes(), FILLED_ORDERS_SLOT)
}

impl IntentClient {
    /// Calldata cancelling a same-chain order; the refund is a single
    /// on-chain call.
    pub fn cancel_same_chain_calldata(&self, order: &OrderV2) -> Vec<u8> {
        abi::cancelOrderCall {
            order: order.to_sol(),
            options: abi::CancelOptions {
                relayerFee: super::alloy_u256(U256::zero()),
                height: 0,
            },
        }
        .abi_encode()
    }

    /// Confirm a same-chain cancellation by locating the `EscrowRefunded`
    /// event in the receipt, then drop the order's session key.
    pub async fn confirm_cancel(
        &self,
        order: &OrderV2,
        transaction_hash: H256,
    ) -> Result<(), anyhow::Error> {
        let gateway = self.source_evm.intent_gateway_address()?;
        let receipt = retry_rpc(|| async {
            self.source_evm
                .transaction_receipt(transaction_hash)
                .await?
                .ok_or_else(|| ClientError::Other("cancel receipt not yet available".into()))
        })
        .await
        .context("fetching the cancellation receipt")?;
        receipt
            .logs
            .iter()
            .filter(|log| log.address == gateway)
            .find_map(decode_event::<abi::EscrowRefunded>)
            .ok_or_else(|| anyhow!("no EscrowRefunded event in {transaction_hash:?}"))?;
        self.prune_session_key(order.commitment())?;
        Ok(())
    }

    /// Drive a cross-chain cancellation. Resumes from the latest persisted
    /// step; pass the source transaction hash once the `cancelOrder` call
    /// has been broadcast. Without it the stream parks at
    /// `AwaitingGetRequest`.
    pub fn cancel_order_stream(
        &self,
        order: OrderV2,
        source_tx: Option<H256>,
    ) -> impl Stream<Item = CancelStatus> + '_ {
        let inner = try_stream! {
            let commitment = order.commitment();
            let order_id = if order.id == H256::zero() { commitment } else { order.id };
            let hub = self.client.hyperbridge_id();
            let dest_id = self.client.dest.state_machine_id();
            let source_id = self.client.source.state_machine_id();
            let scoped = Scoped::new(&*self.client.store);

            // non-inclusion proof of the order on the destination, read at
            // a hub-known height past the deadline
            let dest_proof: PersistedProof =
                match scoped.get(&cancel_keys::dest_proof(order_id))? {
                    Some(proof) => proof,
                    None => {
                        let update = self
                            .client
                            .wait_for_update(UpdateFilter {
                                state_machine_id: dest_id,
                                chain: hub.state_id,
                                criterion: UpdateCriterion::MinTimestamp(order.deadline),
                            })
                            .await?;
                        let slot = filled_order_slot(commitment);
                        let proof = retry_rpc(|| {
                            self.client
                                .dest
                                .query_state_proof(update.height, vec![slot.as_bytes().to_vec()])
                        })
                        .await
                        .context("proving the unfilled order on the destination")?;
                        let persisted = PersistedProof { height: update.height, proof };
                        scoped.set(&cancel_keys::dest_proof(order_id), &persisted)?;
                        persisted
                    }
                };
            let calldata = abi::cancelOrderCall {
                order: order.to_sol(),
                options: abi::CancelOptions {
                    relayerFee: super::alloy_u256(U256::zero()),
                    height: dest_proof.height,
                },
            }
            .abi_encode();
            yield CancelStatus::DestinationProofReady { calldata };

            // the cancelOrder call dispatches a GET request on the source;
            // its snapshot comes from the receipt the caller hands back
            let get_request: GetRequest =
                match scoped.get::<PersistedGetRequest>(&cancel_keys::get_request(order_id))? {
                    Some(persisted) => persisted.try_into()?,
                    None => {
                        let Some(transaction_hash) = source_tx else {
                            yield CancelStatus::AwaitingGetRequest;
                            return;
                        };
                        let request =
                            self.parse_get_request(&order, transaction_hash).await?;
                        scoped.set(
                            &cancel_keys::get_request(order_id),
                            &PersistedGetRequest::from(&request),
                        )?;
                        request
                    }
                };
            let get_commitment = hash_get_request(&get_request);

            // source finality for the block carrying the dispatch
            let dispatched = self
                .wait_for_get_status(get_commitment, RequestStatus::Source)
                .await?;
            let update = self
                .client
                .wait_for_update(UpdateFilter {
                    state_machine_id: source_id,
                    chain: hub.state_id,
                    criterion: UpdateCriterion::MinHeight(dispatched),
                })
                .await?;
            yield CancelStatus::SourceFinalized;

            let source_proof: PersistedProof =
                match scoped.get(&cancel_keys::source_proof(order_id))? {
                    Some(proof) => proof,
                    None => {
                        let proof = retry_rpc(|| {
                            self.client.source.query_proof(
                                ProofKeys::Requests(vec![get_commitment]),
                                hub.state_id,
                                Some(update.height),
                            )
                        })
                        .await
                        .context("proving the get request on the source")?;
                        let persisted = PersistedProof { height: update.height, proof };
                        scoped.set(&cancel_keys::source_proof(order_id), &persisted)?;
                        persisted
                    }
                };

            // the hub cannot accept the proof until the source update's
            // challenge period lapses
            let height = StateMachineHeight { id: source_id, height: source_proof.height };
            wait_for_challenge_period(self.client.hyperbridge.as_client(), height).await?;

            let message = IsmpMessage::GetRequest {
                requests: vec![get_request.clone()],
                source_proof: Proof { height, proof: source_proof.proof.clone() },
                response_proof: Proof {
                    height: StateMachineHeight { id: dest_id, height: dest_proof.height },
                    proof: dest_proof.proof.clone(),
                },
                signer: vec![],
            };
            let included = self.client.hyperbridge.submit_unsigned(message).await?;
            yield CancelStatus::HyperbridgeSubmitted { transaction_hash: included.tx_hash };

            // the hub's receipt is the evidence the coprocessor accepted it
            let mut registered = false;
            for attempt in 0..HUB_RECEIPT_RETRIES {
                if self
                    .client
                    .hyperbridge
                    .query_request_receipt(get_commitment)
                    .await?
                    .is_some()
                {
                    registered = true;
                    break;
                }
                log::debug!(target: "hyperbridge-client", "no hub receipt for {get_commitment:?} yet (attempt {attempt})");
                tokio::time::sleep(HUB_RECEIPT_BACKOFF).await;
            }
            if !registered {
                Err(anyhow!("the hub never registered get request {get_commitment:?}"))?
            }

            self.wait_for_get_status(get_commitment, RequestStatus::HyperbridgeDelivered)
                .await?;
            yield CancelStatus::HyperbridgeDelivered;

            self.wait_for_get_status(get_commitment, RequestStatus::HyperbridgeFinalized)
                .await?;
            // terminal: drop everything persisted for this order
            scoped.remove(&cancel_keys::dest_proof(order_id))?;
            scoped.remove(&cancel_keys::get_request(order_id))?;
            scoped.remove(&cancel_keys::source_proof(order_id))?;
            scoped.remove(&session_key_entry(commitment))?;
            yield CancelStatus::Cancelled;
        };
        inner.map(|item: Result<CancelStatus, anyhow::Error>| {
            item.unwrap_or_else(|error| CancelStatus::Failed { description: format!("{error:#}") })
        })
    }

    /// Extract the structured GET request from the `GetRequestEvent` the
    /// host emitted for the cancellation.
    async fn parse_get_request(
        &self,
        order: &OrderV2,
        transaction_hash: H256,
    ) -> Result<GetRequest, anyhow::Error> {
        let host = self.source_evm.host_address();
        let receipt = retry_rpc(|| async {
            self.source_evm
                .transaction_receipt(transaction_hash)
                .await?
                .ok_or_else(|| ClientError::Other("cancel receipt not yet available".into()))
        })
        .await
        .context("fetching the cancellation receipt")?;
        let event = receipt
            .logs
            .iter()
            .filter(|log| log.address == host)
            .find_map(decode_event::<abi::GetRequestEvent>)
            .ok_or_else(|| anyhow!("no GetRequestEvent in {transaction_hash:?}"))?;

        Ok(GetRequest {
            source: order.source,
            dest: order.destination,
            nonce: event
                .nonce
                .try_into()
                .map_err(|_| anyhow!("get request nonce overflows u64"))?,
            from: event.from.to_vec(),
            keys: event.keys.iter().map(|key| key.to_vec()).collect(),
            height: event
                .height
                .try_into()
                .map_err(|_| anyhow!("get request height overflows u64"))?,
            context: event.context.to_vec(),
            timeout_timestamp: event
                .timeoutTimestamp
                .try_into()
                .map_err(|_| anyhow!("get request timeout overflows u64"))?,
        })
    }

    /// Poll the indexer's get-request record for a status of at least
    /// `status`, returning its block number.
    async fn wait_for_get_status(
        &self,
        commitment: H256,
        status: RequestStatus,
    ) -> Result<u64, anyhow::Error> {
        loop {
            if let Some(record) = self.client.queries.get_request(commitment).await? {
                let node = record
                    .statuses
                    .iter()
                    .filter(|node| node.status.weight() >= status.weight())
                    .min_by_key(|node| node.status.weight());
                if let Some(node) = node {
                    return Ok(node.block_number);
                }
            }
            tokio::time::sleep(self.client.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        intents::{
            executor::{IntentConfig, PriceQuote},
            PaymentInfo, TokenAmount,
        },
        mock::{dest_id, hub_id, mock_chains, mock_client_with, update_event, MockIndexer},
    };
    use async_trait::async_trait;
    use chain_clients::evm::{EvmClient, EvmConfig};
    use futures::pin_mut;
    use ismp_primitives::StateMachine;
    use sp_core::H160;
    use std::sync::Arc;

    struct FlatPrice;

    #[async_trait]
    impl PriceQuote for FlatPrice {
        async fn native_token_price(&self, _chain: StateMachine) -> Result<f64, anyhow::Error> {
            Ok(1_000.0)
        }

        async fn gas_cost_in_fee_token(
            &self,
            _chain: StateMachine,
            _gas_limit: u64,
        ) -> Result<(U256, u8), anyhow::Error> {
            Ok((U256::from(1_000_000u64), 6))
        }

        async fn fee_token_decimals(&self, _chain: StateMachine) -> Result<u8, anyhow::Error> {
            Ok(6)
        }
    }

    fn offline_evm(chain: StateMachine) -> Arc<EvmClient> {
        Arc::new(
            EvmClient::new(EvmConfig {
                rpc_url: "http://localhost:1".to_string(),
                state_machine: chain,
                consensus_state_id: "ETH0".to_string(),
                host_address: H160::repeat_byte(1),
                handler_address: H160::repeat_byte(2),
                intent_gateway_address: Some(H160::repeat_byte(3)),
            })
            .unwrap(),
        )
    }

    fn cross_chain_order() -> OrderV2 {
        OrderV2 {
            source: StateMachine::Evm(97),
            destination: StateMachine::Evm(1),
            deadline: 50,
            user: H256::repeat_byte(7),
            output: PaymentInfo {
                assets: vec![TokenAmount { token: H256::zero(), amount: 100u64.into() }],
                beneficiary: H256::repeat_byte(8),
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn cancellation_persists_and_resumes_the_destination_proof() {
        let _ = env_logger::try_init();
        let indexer = MockIndexer::default();
        // the hub has finalized the destination past the deadline
        indexer.insert_update(update_event(dest_id(), hub_id().state_id, 80));

        let (source_chain, dest_chain, hub_chain) = mock_chains();
        let client = mock_client_with(&indexer, source_chain, dest_chain.clone(), hub_chain);
        let intents = IntentClient::new(
            client,
            offline_evm(StateMachine::Evm(97)),
            offline_evm(StateMachine::Evm(1)),
            Arc::new(FlatPrice),
            IntentConfig::default(),
        )
        .unwrap();
        let order = cross_chain_order();

        // first invocation computes and persists the proof, then parks
        let stream = intents.cancel_order_stream(order.clone(), None);
        pin_mut!(stream);
        match stream.next().await.unwrap() {
            CancelStatus::DestinationProofReady { calldata } => assert!(!calldata.is_empty()),
            other => panic!("unexpected status: {other:?}"),
        }
        assert_eq!(stream.next().await.unwrap(), CancelStatus::AwaitingGetRequest);
        assert!(stream.next().await.is_none());
        assert_eq!(dest_chain.state_proof_queries(), 1);

        // a second invocation resumes from the persisted proof without
        // re-querying the destination
        let stream = intents.cancel_order_stream(order, None);
        pin_mut!(stream);
        match stream.next().await.unwrap() {
            CancelStatus::DestinationProofReady { .. } => {}
            other => panic!("unexpected status: {other:?}"),
        }
        assert_eq!(stream.next().await.unwrap(), CancelStatus::AwaitingGetRequest);
        assert_eq!(dest_chain.state_proof_queries(), 1);
    }

    #[test]
    fn same_chain_cancel_calldata_decodes() {
        let indexer = MockIndexer::default();
        let (source_chain, dest_chain, hub_chain) = mock_chains();
        let client = mock_client_with(&indexer, source_chain, dest_chain, hub_chain);
        let intents = IntentClient::new(
            client,
            offline_evm(StateMachine::Evm(97)),
            offline_evm(StateMachine::Evm(97)),
            Arc::new(FlatPrice),
            IntentConfig::default(),
        )
        .unwrap();
        let mut order = cross_chain_order();
        order.destination = order.source;
        let calldata = intents.cancel_same_chain_calldata(&order);
        let decoded = abi::cancelOrderCall::abi_decode(&calldata, true).unwrap();
        assert_eq!(decoded.options.height, 0);
        assert_eq!(&decoded.order.destChain[..], b"EVM-97");
    }
}
