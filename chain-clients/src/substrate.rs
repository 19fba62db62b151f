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

//! Substrate chain adapter.
//!
//! ISMP commitments and receipts live in the `:child_storage:default:ISMP`
//! child trie; everything else is regular pallet storage. Messages are
//! submitted as unsigned extrinsics and resolve once included in a block.

use crate::{Client, ClientError, ProofKeys};
use codec::{Decode, Encode};
use frame_metadata::{RuntimeMetadata, RuntimeMetadataPrefixed};
use ismp_primitives::{
    hashing::HashAlgorithm,
    keys,
    messages::{
        GetRequestsWithProof, Message, Request, RequestMessage, SubstrateStateProof,
        TimeoutMessage,
    },
    IsmpMessage, StateMachine, StateMachineHeight, StateMachineId,
};
use jsonrpsee::{
    core::client::{ClientT, Subscription, SubscriptionClientT},
    rpc_params,
    ws_client::{WsClient, WsClientBuilder},
};
use serde::{Deserialize, Serialize};
use sp_core::{Bytes, H256};
use sp_crypto_hashing::blake2_256;
use std::sync::{Arc, RwLock};

/// The transaction version unsigned extrinsics are encoded with.
const EXTRINSIC_VERSION: u8 = 4;

/// Configuration for a substrate chain adapter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubstrateConfig {
    /// WebSocket url for the node
    pub ws_url: String,
    /// State machine identifier for this chain
    pub state_machine: StateMachine,
    /// Consensus state id of the consensus client tracking this chain on
    /// its counterparties
    pub consensus_state_id: String,
    /// The hashing algorithm of the chain's state trie. Which chains hash
    /// with keccak is configuration, not convention.
    pub hasher: HashAlgorithm,
}

/// Core substrate client.
pub struct SubstrateClient {
    ws: RwLock<Option<Arc<WsClient>>>,
    state_machine: StateMachine,
    consensus_state_id: [u8; 4],
    hasher: HashAlgorithm,
    ismp_pallet_index: u8,
    coprocessor_pallet_index: Option<u8>,
}

/// A state or child-trie proof returned over RPC.
#[derive(Clone, Debug, Deserialize)]
pub struct RpcProof {
    /// Scale encoded proof
    pub proof: Bytes,
    /// Height at which the proof was read
    pub height: u64,
}

#[derive(Clone, Debug, Deserialize)]
struct ReadProof {
    proof: Vec<Bytes>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Header {
    number: String,
}

/// The resolution of a submitted extrinsic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtrinsicIncluded {
    /// Hash of the extrinsic
    pub tx_hash: H256,
    /// Hash of the block it was included in
    pub block_hash: H256,
    /// Number of the block it was included in
    pub block_number: u64,
    /// Chain timestamp at that block, in seconds
    pub timestamp: u64,
}

impl SubstrateClient {
    /// Connect to the node and resolve the pallet indices the adapter
    /// submits through.
    pub async fn new(config: SubstrateConfig) -> Result<Self, ClientError> {
        let consensus_state_id: [u8; 4] =
            config.consensus_state_id.as_bytes().try_into().map_err(|_| {
                ClientError::Config(format!(
                    "consensus state id must be exactly 4 bytes, got {:?}",
                    config.consensus_state_id
                ))
            })?;
        let ws = Arc::new(WsClientBuilder::default().build(&config.ws_url).await?);
        let encoded: Bytes = ws.request("state_getMetadata", rpc_params![]).await?;
        let metadata = RuntimeMetadataPrefixed::decode(&mut &encoded.0[..])?;
        let ismp_pallet_index = pallet_index(&metadata, "Ismp").ok_or_else(|| {
            ClientError::Config(format!("no ismp pallet on {}", config.state_machine))
        })?;
        let coprocessor_pallet_index = pallet_index(&metadata, "StateCoprocessor");

        Ok(Self {
            ws: RwLock::new(Some(ws)),
            state_machine: config.state_machine,
            consensus_state_id,
            hasher: config.hasher,
            ismp_pallet_index,
            coprocessor_pallet_index,
        })
    }

    /// Drop the underlying WebSocket connection. Any operation after this
    /// fails with a configuration error.
    pub fn disconnect(&self) {
        self.ws.write().expect("ws lock poisoned").take();
    }

    fn ws(&self) -> Result<Arc<WsClient>, ClientError> {
        self.ws
            .read()
            .expect("ws lock poisoned")
            .clone()
            .ok_or_else(|| ClientError::Config("client was disconnected".to_string()))
    }

    /// Hash of the block at `height`, `None` when not yet produced.
    pub async fn block_hash(&self, height: u64) -> Result<Option<H256>, ClientError> {
        Ok(self.ws()?.request("chain_getBlockHash", rpc_params![height]).await?)
    }

    async fn storage(
        &self,
        key: Vec<u8>,
        at: Option<H256>,
    ) -> Result<Option<Vec<u8>>, ClientError> {
        let value: Option<Bytes> =
            self.ws()?.request("state_getStorage", rpc_params![Bytes(key), at]).await?;
        Ok(value.map(|bytes| bytes.0))
    }

    async fn child_storage(
        &self,
        key: Vec<u8>,
        at: Option<H256>,
    ) -> Result<Option<Vec<u8>>, ClientError> {
        let child_key = Bytes(keys::CHILD_TRIE_PREFIX.to_vec());
        let value: Option<Bytes> = self
            .ws()?
            .request("childstate_getStorage", rpc_params![child_key, Bytes(key), at])
            .await?;
        Ok(value.map(|bytes| bytes.0))
    }

    /// Read a value from the node's persistent off-chain storage.
    pub async fn offchain_storage(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>, ClientError> {
        let value: Option<Bytes> = self
            .ws()?
            .request("offchain_localStorageGet", rpc_params!["PERSISTENT", Bytes(key)])
            .await?;
        Ok(value.map(|bytes| bytes.0))
    }

    /// Enumerate the on-chain bid entries for an order, as
    /// `(filler, deposit)` pairs.
    pub async fn query_order_bid_entries(
        &self,
        commitment: H256,
    ) -> Result<Vec<([u8; 32], u128)>, ClientError> {
        let mut prefix = keys::storage_value_key("IntentGateway", "Bids");
        prefix.extend_from_slice(commitment.as_bytes());
        let storage_keys: Vec<Bytes> = self
            .ws()?
            .request(
                "state_getKeysPaged",
                rpc_params![Bytes(prefix.clone()), 1000u32, Option::<Bytes>::None],
            )
            .await?;
        let mut entries = vec![];
        for key in storage_keys {
            if key.0.len() < prefix.len() + 32 {
                continue;
            }
            let mut filler = [0u8; 32];
            filler.copy_from_slice(&key.0[key.0.len() - 32..]);
            let Some(value) = self.storage(key.0.clone(), None).await? else { continue };
            let deposit = u128::decode(&mut &value[..])?;
            entries.push((filler, deposit));
        }
        Ok(entries)
    }

    /// Submit `message` as an unsigned extrinsic and wait for it to enter a
    /// block.
    pub async fn submit_unsigned(
        &self,
        message: IsmpMessage,
    ) -> Result<ExtrinsicIncluded, ClientError> {
        let call = self.encode(message)?;
        let mut inner = vec![EXTRINSIC_VERSION];
        inner.extend_from_slice(&call);
        // extrinsics go over the wire length-prefixed
        let extrinsic = inner.encode();
        let tx_hash: H256 = blake2_256(&extrinsic).into();

        let mut subscription: Subscription<serde_json::Value> = self
            .ws()?
            .subscribe(
                "author_submitAndWatchExtrinsic",
                rpc_params![Bytes(extrinsic)],
                "author_unwatchExtrinsic",
            )
            .await?;

        let block_hash = loop {
            let Some(status) = subscription.next().await else {
                Err(ClientError::Other("extrinsic watch ended unexpectedly".to_string()))?
            };
            let status = status.map_err(|e| ClientError::Other(e.to_string()))?;
            if let Some(object) = status.as_object() {
                if let Some(hash) = object.get("inBlock").or_else(|| object.get("finalized")) {
                    let hash: H256 = serde_json::from_value(hash.clone())
                        .map_err(|e| ClientError::Other(e.to_string()))?;
                    break hash;
                }
                if object.contains_key("usurped") {
                    Err(ClientError::Other("extrinsic was usurped".to_string()))?
                }
            } else if let Some(variant) = status.as_str() {
                if matches!(variant, "dropped" | "invalid") {
                    Err(ClientError::Other(format!("extrinsic was {variant}")))?
                }
            }
        };

        log::debug!(target: "chain-clients", "extrinsic {tx_hash:?} included in block {block_hash:?}");
        let header: Header =
            self.ws()?.request("chain_getHeader", rpc_params![block_hash]).await?;
        let block_number = u64::from_str_radix(header.number.trim_start_matches("0x"), 16)
            .map_err(|e| ClientError::Other(format!("invalid block number: {e}")))?;
        let timestamp = self
            .storage(keys::timestamp_now_key(), Some(block_hash))
            .await?
            .map(|value| u64::decode(&mut &value[..]))
            .transpose()?
            .unwrap_or_default() /
            1000;

        Ok(ExtrinsicIncluded { tx_hash, block_hash, block_number, timestamp })
    }

    async fn child_trie_proof(
        &self,
        child_keys: Vec<Vec<u8>>,
        at: Option<u64>,
    ) -> Result<Vec<Vec<u8>>, ClientError> {
        let at = match at {
            Some(height) => self.block_hash(height).await?,
            None => None,
        };
        let keys: Vec<Bytes> = child_keys.into_iter().map(Bytes).collect();
        let proof: RpcProof =
            self.ws()?.request("ismp_queryChildTrieProof", rpc_params![keys, at]).await?;
        Ok(Vec::<Vec<u8>>::decode(&mut &proof.proof.0[..])?)
    }
}

fn pallet_index(metadata: &RuntimeMetadataPrefixed, name: &str) -> Option<u8> {
    match &metadata.1 {
        RuntimeMetadata::V14(meta) => {
            meta.pallets.iter().find(|pallet| pallet.name == name).map(|pallet| pallet.index)
        }
        RuntimeMetadata::V15(meta) => {
            meta.pallets.iter().find(|pallet| pallet.name == name).map(|pallet| pallet.index)
        }
        _ => None,
    }
}

/// Encode `message` as call bytes for the chain's unsigned handlers,
/// `[pallet_index, 0, ...scale(args)]`.
pub fn encode_call(
    ismp_pallet_index: u8,
    coprocessor_pallet_index: Option<u8>,
    chain: StateMachine,
    message: IsmpMessage,
) -> Result<Vec<u8>, ClientError> {
    let (pallet, args) = match message {
        IsmpMessage::PostRequest { requests, proof, signer } => {
            let message = Message::Request(RequestMessage { requests, proof, signer });
            (ismp_pallet_index, vec![message].encode())
        }
        IsmpMessage::TimeoutPostRequest { requests, proof } => {
            let message = Message::Timeout(TimeoutMessage::Post {
                requests: requests.into_iter().map(Request::Post).collect(),
                timeout_proof: proof,
            });
            (ismp_pallet_index, vec![message].encode())
        }
        IsmpMessage::GetRequest { requests, source_proof, response_proof, signer } => {
            let index = coprocessor_pallet_index.ok_or_else(|| {
                ClientError::Config(format!("no state coprocessor pallet on {chain}"))
            })?;
            let message = GetRequestsWithProof {
                requests,
                source: source_proof,
                response: response_proof,
                signer,
            };
            (index, message.encode())
        }
        IsmpMessage::GetResponse { .. } => Err(ClientError::UnsupportedVariant {
            chain,
            variant: "GetResponse",
        })?,
    };
    let mut call = vec![pallet, 0];
    call.extend_from_slice(&args);
    Ok(call)
}

#[async_trait::async_trait]
impl Client for SubstrateClient {
    fn state_machine_id(&self) -> StateMachineId {
        StateMachineId {
            state_id: self.state_machine,
            consensus_state_id: self.consensus_state_id,
        }
    }

    async fn query_timestamp(&self) -> Result<u64, ClientError> {
        let millis = self
            .storage(keys::timestamp_now_key(), None)
            .await?
            .map(|value| u64::decode(&mut &value[..]))
            .transpose()?
            .unwrap_or_default();
        Ok(millis / 1000)
    }

    fn request_receipt_key(&self, commitment: H256) -> Vec<u8> {
        keys::request_receipt_key(commitment)
    }

    async fn query_request_receipt(
        &self,
        commitment: H256,
    ) -> Result<Option<Vec<u8>>, ClientError> {
        self.child_storage(keys::request_receipt_key(commitment), None).await
    }

    async fn query_state_proof(
        &self,
        at: u64,
        keys: Vec<Vec<u8>>,
    ) -> Result<Vec<u8>, ClientError> {
        // commitments and receipts are proven out of the child trie, any
        // other key out of the main trie
        let child_items: &[&[u8]] =
            &[b"RequestCommitments", b"RequestReceipts", b"ResponseCommitments"];
        let is_child = keys
            .iter()
            .all(|key| child_items.iter().any(|prefix| key.starts_with(prefix)));
        let proof = if is_child {
            SubstrateStateProof::OverlayProof {
                hasher: self.hasher,
                storage_proof: self.child_trie_proof(keys, Some(at)).await?,
            }
        } else {
            let at = self.block_hash(at).await?;
            let keys: Vec<Bytes> = keys.into_iter().map(Bytes).collect();
            let read_proof: ReadProof =
                self.ws()?.request("state_getReadProof", rpc_params![keys, at]).await?;
            SubstrateStateProof::StateProof {
                hasher: self.hasher,
                storage_proof: read_proof.proof.into_iter().map(|node| node.0).collect(),
            }
        };
        Ok(proof.encode())
    }

    async fn query_proof(
        &self,
        keys: ProofKeys,
        counterparty: StateMachine,
        at: Option<u64>,
    ) -> Result<Vec<u8>, ClientError> {
        match counterparty {
            StateMachine::Evm(_) => {
                // evm handlers verify mmr multiproofs
                let at = match at {
                    Some(height) => height,
                    None => {
                        let header: Header = self
                            .ws()?
                            .request("chain_getHeader", rpc_params![Option::<H256>::None])
                            .await?;
                        u64::from_str_radix(header.number.trim_start_matches("0x"), 16)
                            .map_err(|e| ClientError::Other(format!("invalid block number: {e}")))?
                    }
                };
                let proof: RpcProof =
                    self.ws()?.request("mmr_queryProof", rpc_params![at, keys]).await?;
                Ok(proof.proof.0)
            }
            StateMachine::Polkadot(_) | StateMachine::Kusama(_) | StateMachine::Substrate(_) => {
                let child_keys = match keys {
                    ProofKeys::Requests(commitments) => commitments
                        .into_iter()
                        .map(ismp_primitives::keys::request_commitment_key)
                        .collect::<Vec<_>>(),
                    ProofKeys::Responses(commitments) => commitments
                        .into_iter()
                        .map(ismp_primitives::keys::response_commitment_key)
                        .collect(),
                };
                let proof = SubstrateStateProof::OverlayProof {
                    hasher: self.hasher,
                    storage_proof: self.child_trie_proof(child_keys, at).await?,
                };
                Ok(proof.encode())
            }
            StateMachine::Tendermint(_) => {
                Err(ClientError::UnsupportedCounterparty { counterparty })
            }
        }
    }

    async fn query_latest_state_machine_height(
        &self,
        id: StateMachineId,
    ) -> Result<u64, ClientError> {
        let key = keys::storage_map_key(
            "Ismp",
            "LatestStateMachineHeight",
            keys::StorageHasher::Blake2_128Concat,
            &id,
        );
        let height = self
            .storage(key, None)
            .await?
            .map(|value| u64::decode(&mut &value[..]))
            .transpose()?
            .unwrap_or_default();
        Ok(height)
    }

    async fn query_challenge_period(&self, id: StateMachineId) -> Result<u64, ClientError> {
        let key = keys::storage_map_key(
            "Ismp",
            "ChallengePeriod",
            keys::StorageHasher::Blake2_128Concat,
            &id,
        );
        let period = self
            .storage(key, None)
            .await?
            .map(|value| u64::decode(&mut &value[..]))
            .transpose()?
            .unwrap_or_default();
        Ok(period)
    }

    async fn query_state_machine_update_time(
        &self,
        height: StateMachineHeight,
    ) -> Result<u64, ClientError> {
        let key = keys::storage_map_key(
            "Ismp",
            "StateMachineUpdateTime",
            keys::StorageHasher::Blake2_128Concat,
            &height,
        );
        self.storage(key, None)
            .await?
            .map(|value| u64::decode(&mut &value[..]))
            .transpose()?
            .ok_or_else(|| {
                ClientError::Other(format!("no update time for {:?} at {}", height.id, height.height))
            })
    }

    fn encode(&self, message: IsmpMessage) -> Result<Vec<u8>, ClientError> {
        encode_call(
            self.ismp_pallet_index,
            self.coprocessor_pallet_index,
            self.state_machine,
            message,
        )
    }
}

#[async_trait::async_trait]
impl crate::HubClient for SubstrateClient {
    async fn submit_unsigned(
        &self,
        message: IsmpMessage,
    ) -> Result<ExtrinsicIncluded, ClientError> {
        SubstrateClient::submit_unsigned(self, message).await
    }

    async fn offchain_storage(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>, ClientError> {
        SubstrateClient::offchain_storage(self, key).await
    }

    async fn query_order_bid_entries(
        &self,
        commitment: H256,
    ) -> Result<Vec<([u8; 32], u128)>, ClientError> {
        SubstrateClient::query_order_bid_entries(self, commitment).await
    }

    fn disconnect(&self) {
        SubstrateClient::disconnect(self)
    }

    fn as_client(&self) -> &dyn Client {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ismp_primitives::messages::{PostRequest, Proof};

    fn sample_proof() -> Proof {
        Proof {
            height: StateMachineHeight {
                id: StateMachineId {
                    state_id: StateMachine::Evm(97),
                    consensus_state_id: *b"BSC0",
                },
                height: 11,
            },
            proof: vec![7, 7, 7],
        }
    }

    fn sample_post() -> PostRequest {
        PostRequest {
            source: StateMachine::Evm(97),
            dest: StateMachine::Polkadot(3367),
            from: vec![1; 20],
            to: vec![2; 32],
            nonce: 1,
            body: vec![3; 8],
            timeout_timestamp: 100,
        }
    }

    #[test]
    fn request_calls_are_pallet_prefixed() {
        let message = IsmpMessage::PostRequest {
            requests: vec![sample_post()],
            proof: sample_proof(),
            signer: vec![0u8; 32],
        };
        let call = encode_call(8, Some(9), StateMachine::Polkadot(3367), message.clone()).unwrap();
        assert_eq!(&call[..2], &[8, 0]);
        let IsmpMessage::PostRequest { requests, proof, signer } = message else { unreachable!() };
        let expected =
            vec![Message::Request(RequestMessage { requests, proof, signer })].encode();
        assert_eq!(&call[2..], &expected[..]);
    }

    #[test]
    fn get_requests_go_through_the_state_coprocessor() {
        let message = IsmpMessage::GetRequest {
            requests: vec![],
            source_proof: sample_proof(),
            response_proof: sample_proof(),
            signer: vec![],
        };
        let call = encode_call(8, Some(42), StateMachine::Polkadot(3367), message.clone()).unwrap();
        assert_eq!(&call[..2], &[42, 0]);

        // and fail without one
        assert!(matches!(
            encode_call(8, None, StateMachine::Polkadot(3367), message),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn get_responses_cannot_be_encoded_for_substrate() {
        let message = IsmpMessage::GetResponse {
            responses: vec![],
            proof: sample_proof(),
            signer: vec![],
        };
        assert!(matches!(
            encode_call(8, None, StateMachine::Polkadot(3367), message),
            Err(ClientError::UnsupportedVariant { variant: "GetResponse", .. })
        ));
    }

    #[test]
    fn unsigned_extrinsics_are_length_prefixed() {
        let call = vec![8u8, 0, 1, 2, 3];
        let mut inner = vec![EXTRINSIC_VERSION];
        inner.extend_from_slice(&call);
        let extrinsic = inner.encode();
        // compact length prefix, then the version byte, then the call
        let decoded = Vec::<u8>::decode(&mut &extrinsic[..]).unwrap();
        assert_eq!(decoded[0], EXTRINSIC_VERSION);
        assert_eq!(&decoded[1..], &call[..]);
    }
}
