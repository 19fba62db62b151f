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

//! EVM chain adapter.

use crate::{abi, state_machine_numeric, Client, ClientError, ProofKeys};
use alloy_primitives::{Address, B256, U256 as AlloyU256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use codec::{Decode, Encode};
use ismp_primitives::{
    messages::{EvmStateProof, MmrProof, SubstrateStateProof},
    slots, IsmpMessage, PostRequest, StateMachine, StateMachineHeight, StateMachineId,
};
use jsonrpsee::{
    core::client::ClientT,
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use mmr_utils::{mmr_position_to_k_index, NodesUtils};
use serde::{Deserialize, Serialize};
use sp_core::{Bytes, H160, H256, U256};
use std::collections::{BTreeMap, BTreeSet};

/// Configuration for an EVM chain adapter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvmConfig {
    /// Http url for the execution client
    pub rpc_url: String,
    /// State machine identifier for this chain
    pub state_machine: StateMachine,
    /// Consensus state id of the consensus client tracking this chain on
    /// its counterparties
    pub consensus_state_id: String,
    /// Ismp host contract address
    pub host_address: H160,
    /// Ismp handler contract address
    pub handler_address: H160,
    /// Intent gateway contract address, where deployed
    pub intent_gateway_address: Option<H160>,
}

/// Core EVM client.
pub struct EvmClient {
    client: HttpClient,
    state_machine: StateMachine,
    consensus_state_id: [u8; 4],
    host_address: H160,
    handler_address: H160,
    intent_gateway_address: Option<H160>,
}

/// An `eth_call`/`eth_estimateGas` request object.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    /// Sender of the call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<H160>,
    /// Target contract
    pub to: H160,
    /// Native value sent with the call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    /// Call input
    pub data: Bytes,
}

impl Default for CallRequest {
    fn default() -> Self {
        Self { from: None, to: H160::default(), value: None, data: Bytes(Vec::new()) }
    }
}

/// A log entry in a transaction receipt.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    /// Contract that emitted the log
    pub address: H160,
    /// Indexed topics
    pub topics: Vec<H256>,
    /// Unindexed payload
    pub data: Bytes,
}

/// A transaction receipt, reduced to the fields the client consumes.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    /// 1 for success, 0 for revert
    pub status: Option<U256>,
    /// Block the transaction was included in
    pub block_number: Option<U256>,
    /// Logs emitted by the transaction
    pub logs: Vec<Log>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageProofEntry {
    proof: Vec<Bytes>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Eip1186Proof {
    account_proof: Vec<Bytes>,
    storage_proof: Vec<StorageProofEntry>,
}

impl EvmClient {
    /// Create a new client. The underlying http client is constructed once
    /// and shared by every flow borrowing this adapter.
    pub fn new(config: EvmConfig) -> Result<Self, ClientError> {
        let consensus_state_id: [u8; 4] =
            config.consensus_state_id.as_bytes().try_into().map_err(|_| {
                ClientError::Config(format!(
                    "consensus state id must be exactly 4 bytes, got {:?}",
                    config.consensus_state_id
                ))
            })?;
        let client = HttpClientBuilder::default().build(&config.rpc_url)?;
        Ok(Self {
            client,
            state_machine: config.state_machine,
            consensus_state_id,
            host_address: config.host_address,
            handler_address: config.handler_address,
            intent_gateway_address: config.intent_gateway_address,
        })
    }

    /// The ismp host contract address.
    pub fn host_address(&self) -> H160 {
        self.host_address
    }

    /// The ismp handler contract address.
    pub fn handler_address(&self) -> H160 {
        self.handler_address
    }

    /// The intent gateway contract address.
    pub fn intent_gateway_address(&self) -> Result<H160, ClientError> {
        self.intent_gateway_address.ok_or_else(|| {
            ClientError::Config(format!("no intent gateway on {}", self.state_machine))
        })
    }

    /// Execute a read-only contract call.
    pub async fn call(&self, request: CallRequest) -> Result<Vec<u8>, ClientError> {
        let out: Bytes = self.client.request("eth_call", rpc_params![request, "latest"]).await?;
        Ok(out.0)
    }

    /// Execute a read-only call against the host contract.
    async fn call_host(&self, data: Vec<u8>) -> Result<Vec<u8>, ClientError> {
        self.call(CallRequest {
            to: self.host_address,
            data: Bytes(data),
            ..Default::default()
        })
        .await
    }

    /// Estimate the gas cost of `request`.
    pub async fn estimate_gas(&self, request: CallRequest) -> Result<u64, ClientError> {
        let out: U256 =
            self.client.request("eth_estimateGas", rpc_params![request, "latest"]).await?;
        Ok(out.low_u64())
    }

    /// Current gas price in wei.
    pub async fn gas_price(&self) -> Result<U256, ClientError> {
        Ok(self.client.request("eth_gasPrice", rpc_params![]).await?)
    }

    /// Current priority fee in wei.
    pub async fn max_priority_fee_per_gas(&self) -> Result<U256, ClientError> {
        Ok(self.client.request("eth_maxPriorityFeePerGas", rpc_params![]).await?)
    }

    /// Latest block number.
    pub async fn latest_block_number(&self) -> Result<u64, ClientError> {
        let number: U256 = self.client.request("eth_blockNumber", rpc_params![]).await?;
        Ok(number.low_u64())
    }

    /// Read a raw storage word.
    pub async fn get_storage_at(
        &self,
        address: H160,
        slot: H256,
        at: Option<u64>,
    ) -> Result<H256, ClientError> {
        let block = block_tag(at);
        let word: H256 =
            self.client.request("eth_getStorageAt", rpc_params![address, slot, block]).await?;
        Ok(word)
    }

    /// Fetch the receipt for a transaction, `None` while pending.
    pub async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>, ClientError> {
        Ok(self
            .client
            .request("eth_getTransactionReceipt", rpc_params![hash])
            .await?)
    }

    /// Produce an account + storage merkle-patricia proof for slots of
    /// `address`.
    async fn query_account_proof(
        &self,
        address: H160,
        slots: Vec<H256>,
        at: Option<u64>,
    ) -> Result<EvmStateProof, ClientError> {
        let block = block_tag(at);
        let proof: Eip1186Proof = self
            .client
            .request("eth_getProof", rpc_params![address, slots, block])
            .await?;
        Ok(assemble_state_proof(address, proof.account_proof, proof.storage_proof))
    }
}

fn block_tag(at: Option<u64>) -> String {
    match at {
        Some(number) => format!("{number:#x}"),
        None => "latest".to_string(),
    }
}

/// Collect an eip-1186 response into the scale envelope, deduplicating
/// shared trie nodes by identity.
fn assemble_state_proof(
    address: H160,
    account_proof: Vec<Bytes>,
    storage_proofs: Vec<StorageProofEntry>,
) -> EvmStateProof {
    let mut seen = BTreeSet::new();
    let mut nodes = vec![];
    for entry in storage_proofs {
        for node in entry.proof {
            if seen.insert(node.0.clone()) {
                nodes.push(node.0);
            }
        }
    }
    let mut storage_proof = BTreeMap::new();
    storage_proof.insert(address.as_bytes().to_vec(), nodes);
    EvmStateProof {
        contract_proof: account_proof.into_iter().map(|node| node.0).collect(),
        storage_proof,
    }
}

fn to_sol_post(req: &PostRequest) -> abi::PostRequest {
    abi::PostRequest {
        source: req.source.to_string().into_bytes().into(),
        dest: req.dest.to_string().into_bytes().into(),
        nonce: req.nonce,
        from: req.from.clone().into(),
        to: req.to.clone().into(),
        timeoutTimestamp: req.timeout_timestamp,
        body: req.body.clone().into(),
    }
}

fn to_sol_get(req: &ismp_primitives::GetRequest) -> abi::GetRequest {
    abi::GetRequest {
        source: req.source.to_string().into_bytes().into(),
        dest: req.dest.to_string().into_bytes().into(),
        nonce: req.nonce,
        from: req.from.clone().into(),
        timeoutTimestamp: req.timeout_timestamp,
        keys: req.keys.iter().cloned().map(Into::into).collect(),
        height: req.height,
        context: req.context.clone().into(),
    }
}

fn to_sol_proof(
    height: StateMachineHeight,
    envelope: &MmrProof,
) -> (abi::Proof, BTreeMap<u64, u64>) {
    let mmr_size = NodesUtils::new(envelope.leaf_count).size();
    let mut positions: Vec<u64> =
        envelope.leaf_index_and_pos.iter().map(|leaf| leaf.pos).collect();
    positions.sort_unstable();
    let k_indices: BTreeMap<u64, u64> =
        mmr_position_to_k_index(positions, mmr_size).into_iter().collect();
    let proof = abi::Proof {
        height: abi::StateMachineHeight {
            stateMachineId: AlloyU256::from(state_machine_numeric(height.id.state_id)),
            height: AlloyU256::from(height.height),
        },
        multiproof: envelope.items.iter().map(|item| B256::from(item.0)).collect(),
        leafCount: AlloyU256::from(envelope.leaf_count),
    };
    (proof, k_indices)
}

#[async_trait]
impl Client for EvmClient {
    fn state_machine_id(&self) -> StateMachineId {
        StateMachineId {
            state_id: self.state_machine,
            consensus_state_id: self.consensus_state_id,
        }
    }

    async fn query_timestamp(&self) -> Result<u64, ClientError> {
        let out = self.call_host(abi::timestampCall {}.abi_encode()).await?;
        let ret = abi::timestampCall::abi_decode_returns(&out, true)?;
        Ok(ret._0.try_into().map_err(|_| ClientError::Other("timestamp overflow".into()))?)
    }

    fn request_receipt_key(&self, commitment: H256) -> Vec<u8> {
        slots::request_receipt_slot(commitment).as_bytes().to_vec()
    }

    async fn query_request_receipt(
        &self,
        commitment: H256,
    ) -> Result<Option<Vec<u8>>, ClientError> {
        let slot = slots::request_receipt_slot(commitment);
        let word = self.get_storage_at(self.host_address, slot, None).await?;
        if word == H256::zero() {
            Ok(None)
        } else {
            Ok(Some(word.as_bytes().to_vec()))
        }
    }

    async fn query_state_proof(
        &self,
        at: u64,
        keys: Vec<Vec<u8>>,
    ) -> Result<Vec<u8>, ClientError> {
        let slot_keys = keys
            .into_iter()
            .map(|key| {
                if key.len() == 32 {
                    Ok(H256::from_slice(&key))
                } else {
                    Err(ClientError::Other(format!(
                        "evm storage keys are 32 bytes, got {}",
                        key.len()
                    )))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        let proof = self.query_account_proof(self.host_address, slot_keys, Some(at)).await?;
        Ok(proof.encode())
    }

    async fn query_proof(
        &self,
        keys: ProofKeys,
        _counterparty: StateMachine,
        at: Option<u64>,
    ) -> Result<Vec<u8>, ClientError> {
        // requests sourced on an evm chain are proven with an account +
        // storage proof of the commitment words
        let slot_keys = match keys {
            ProofKeys::Requests(commitments) => commitments
                .into_iter()
                .flat_map(|commitment| {
                    let (slot1, slot2) = slots::commitment_slots(commitment);
                    [slot2, slot1]
                })
                .collect::<Vec<_>>(),
            ProofKeys::Responses(commitments) => commitments
                .into_iter()
                .map(|commitment| {
                    let derived = slots::map_slot(
                        commitment.as_bytes(),
                        slots::RESPONSE_COMMITMENTS_SLOT,
                    );
                    slots::slot_with_offset(derived, 1)
                })
                .collect(),
        };
        let proof = self.query_account_proof(self.host_address, slot_keys, at).await?;
        Ok(proof.encode())
    }

    async fn query_latest_state_machine_height(
        &self,
        id: StateMachineId,
    ) -> Result<u64, ClientError> {
        let call = abi::latestStateMachineHeightCall {
            id: AlloyU256::from(state_machine_numeric(id.state_id)),
        };
        let out = self.call_host(call.abi_encode()).await?;
        let ret = abi::latestStateMachineHeightCall::abi_decode_returns(&out, true)?;
        Ok(ret._0.try_into().map_err(|_| ClientError::Other("height overflow".into()))?)
    }

    async fn query_challenge_period(&self, _id: StateMachineId) -> Result<u64, ClientError> {
        // the host configures a single challenge period for all its
        // counterparties
        let out = self.call_host(abi::challengePeriodCall {}.abi_encode()).await?;
        let ret = abi::challengePeriodCall::abi_decode_returns(&out, true)?;
        Ok(ret._0.try_into().map_err(|_| ClientError::Other("period overflow".into()))?)
    }

    async fn query_state_machine_update_time(
        &self,
        height: StateMachineHeight,
    ) -> Result<u64, ClientError> {
        let slot = slots::state_commitment_slot(
            state_machine_numeric(height.id.state_id),
            height.height,
            slots::state_commitment_field::TIMESTAMP,
        );
        let word = self.get_storage_at(self.host_address, slot, None).await?;
        Ok(U256::from_big_endian(word.as_bytes()).low_u64())
    }

    fn encode(&self, message: IsmpMessage) -> Result<Vec<u8>, ClientError> {
        match message {
            IsmpMessage::PostRequest { requests, proof, .. } => {
                let envelope = MmrProof::decode(&mut &proof.proof[..])?;
                let (sol_proof, k_indices) = to_sol_proof(proof.height, &envelope);
                let leaves = requests
                    .iter()
                    .zip(envelope.leaf_index_and_pos.iter())
                    .map(|(request, leaf)| {
                        let k_index = k_indices.get(&leaf.pos).copied().ok_or_else(|| {
                            ClientError::Other(format!("no k-index for leaf at {}", leaf.pos))
                        })?;
                        Ok(abi::PostRequestLeaf {
                            request: to_sol_post(request),
                            index: AlloyU256::from(leaf.leaf_index),
                            kIndex: AlloyU256::from(k_index),
                        })
                    })
                    .collect::<Result<Vec<_>, ClientError>>()?;
                let call = abi::handlePostRequestsCall {
                    host: Address::from_slice(self.host_address.as_bytes()),
                    request: abi::PostRequestMessage { proof: sol_proof, requests: leaves },
                };
                Ok(call.abi_encode())
            }
            IsmpMessage::TimeoutPostRequest { requests, proof } => {
                let state_proof = SubstrateStateProof::decode(&mut &proof.proof[..])?;
                let nodes = match state_proof {
                    SubstrateStateProof::OverlayProof { storage_proof, .. } |
                    SubstrateStateProof::StateProof { storage_proof, .. } => storage_proof,
                };
                let call = abi::handlePostRequestTimeoutsCall {
                    host: Address::from_slice(self.host_address.as_bytes()),
                    message: abi::PostRequestTimeoutMessage {
                        timeouts: requests.iter().map(to_sol_post).collect(),
                        height: abi::StateMachineHeight {
                            stateMachineId: AlloyU256::from(state_machine_numeric(
                                proof.height.id.state_id,
                            )),
                            height: AlloyU256::from(proof.height.height),
                        },
                        proof: nodes.into_iter().map(Into::into).collect(),
                    },
                };
                Ok(call.abi_encode())
            }
            IsmpMessage::GetResponse { responses, proof, .. } => {
                let envelope = MmrProof::decode(&mut &proof.proof[..])?;
                let (sol_proof, k_indices) = to_sol_proof(proof.height, &envelope);
                let leaves = responses
                    .iter()
                    .zip(envelope.leaf_index_and_pos.iter())
                    .map(|(response, leaf)| {
                        let k_index = k_indices.get(&leaf.pos).copied().ok_or_else(|| {
                            ClientError::Other(format!("no k-index for leaf at {}", leaf.pos))
                        })?;
                        Ok(abi::GetResponseLeaf {
                            response: abi::GetResponse {
                                request: to_sol_get(&response.get),
                                values: response
                                    .values
                                    .iter()
                                    .map(|value| abi::StorageValue {
                                        key: value.key.clone().into(),
                                        value: value.value.clone().unwrap_or_default().into(),
                                    })
                                    .collect(),
                            },
                            index: AlloyU256::from(leaf.leaf_index),
                            kIndex: AlloyU256::from(k_index),
                        })
                    })
                    .collect::<Result<Vec<_>, ClientError>>()?;
                let call = abi::handleGetResponsesCall {
                    host: Address::from_slice(self.host_address.as_bytes()),
                    message: abi::GetResponseMessage { proof: sol_proof, responses: leaves },
                };
                Ok(call.abi_encode())
            }
            IsmpMessage::GetRequest { .. } => Err(ClientError::UnsupportedVariant {
                chain: self.state_machine,
                variant: "GetRequest",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::SolCall;
    use ismp_primitives::{
        messages::{LeafIndexAndPos, Proof},
        StateMachine,
    };

    fn test_client() -> EvmClient {
        EvmClient::new(EvmConfig {
            rpc_url: "http://localhost:8545".to_string(),
            state_machine: StateMachine::Evm(97),
            consensus_state_id: "BSC0".to_string(),
            host_address: H160::repeat_byte(1),
            handler_address: H160::repeat_byte(2),
            intent_gateway_address: None,
        })
        .unwrap()
    }

    fn sample_post() -> PostRequest {
        PostRequest {
            source: StateMachine::Polkadot(3367),
            dest: StateMachine::Evm(97),
            from: vec![0xaa; 32],
            to: vec![0xbb; 20],
            nonce: 3,
            body: vec![0xcc; 16],
            timeout_timestamp: 5_000,
        }
    }

    #[test]
    fn rejects_malformed_consensus_state_ids() {
        let result = EvmClient::new(EvmConfig {
            rpc_url: "http://localhost:8545".to_string(),
            state_machine: StateMachine::Evm(97),
            consensus_state_id: "TOOLONG".to_string(),
            host_address: H160::zero(),
            handler_address: H160::zero(),
            intent_gateway_address: None,
        });
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    fn post_request_calldata_carries_leaf_indices() {
        let _ = env_logger::try_init();
        let client = test_client();
        // a 7 leaf tree, the request is the last leaf at position 10
        let envelope = MmrProof {
            leaf_index_and_pos: vec![LeafIndexAndPos { leaf_index: 6, pos: 10 }],
            leaf_count: 7,
            items: vec![H256::repeat_byte(9); 2],
        };
        let proof = Proof {
            height: StateMachineHeight {
                id: StateMachineId {
                    state_id: StateMachine::Polkadot(3367),
                    consensus_state_id: *b"PARA",
                },
                height: 88,
            },
            proof: envelope.encode(),
        };
        let calldata = client
            .encode(IsmpMessage::PostRequest {
                requests: vec![sample_post()],
                proof,
                signer: vec![],
            })
            .unwrap();
        let decoded = abi::handlePostRequestsCall::abi_decode(&calldata, true).unwrap();
        assert_eq!(decoded.request.requests.len(), 1);
        assert_eq!(decoded.request.requests[0].index, AlloyU256::from(6u64));
        // sole leaf of the third peak
        assert_eq!(decoded.request.requests[0].kIndex, AlloyU256::from(0u64));
        assert_eq!(decoded.request.proof.leafCount, AlloyU256::from(7u64));
        assert_eq!(
            decoded.request.proof.height.stateMachineId,
            AlloyU256::from(3367u64)
        );
        assert_eq!(&decoded.request.requests[0].request.source[..], b"POLKADOT-3367");
    }

    #[test]
    fn get_requests_cannot_be_encoded_for_evm() {
        let client = test_client();
        let message = IsmpMessage::GetRequest {
            requests: vec![],
            source_proof: Proof {
                height: StateMachineHeight {
                    id: StateMachineId {
                        state_id: StateMachine::Evm(97),
                        consensus_state_id: *b"BSC0",
                    },
                    height: 1,
                },
                proof: vec![],
            },
            response_proof: Proof {
                height: StateMachineHeight {
                    id: StateMachineId {
                        state_id: StateMachine::Evm(97),
                        consensus_state_id: *b"BSC0",
                    },
                    height: 1,
                },
                proof: vec![],
            },
            signer: vec![],
        };
        assert!(matches!(
            client.encode(message),
            Err(ClientError::UnsupportedVariant { variant: "GetRequest", .. })
        ));
    }

    #[test]
    fn state_proof_nodes_are_deduplicated() {
        let shared = Bytes(vec![1, 2, 3]);
        let proof = assemble_state_proof(
            H160::repeat_byte(1),
            vec![Bytes(vec![9])],
            vec![
                StorageProofEntry { proof: vec![shared.clone(), Bytes(vec![4])] },
                StorageProofEntry { proof: vec![shared, Bytes(vec![5])] },
            ],
        );
        let nodes = proof.storage_proof.get(H160::repeat_byte(1).as_bytes()).unwrap();
        assert_eq!(nodes, &vec![vec![1, 2, 3], vec![4], vec![5]]);
    }
}
