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

//! Mock chains and a mock indexer for flow tests.

use crate::{
    queries::{
        GetRequestRecord, GetResponseRecord, IndexerGateway, OrderPlacedRecord,
        PostRequestRecord, StateMachineUpdateEvent, StatusMetadataNode, TeleportRecord,
        UpdateCriterion, UpdateFilter,
    },
    store::MemoryStore,
    HyperbridgeClient,
};
use async_trait::async_trait;
use chain_clients::{substrate::ExtrinsicIncluded, Client, ClientError, HubClient, ProofKeys};
use ismp_primitives::{
    GetRequest, IsmpMessage, PostRequest, StateMachine, StateMachineHeight, StateMachineId,
};
use parking_lot::RwLock;
use sp_core::H256;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

pub fn source_id() -> StateMachineId {
    StateMachineId { state_id: StateMachine::Evm(97), consensus_state_id: *b"SRC0" }
}

pub fn dest_id() -> StateMachineId {
    StateMachineId { state_id: StateMachine::Evm(1), consensus_state_id: *b"DST0" }
}

pub fn hub_id() -> StateMachineId {
    StateMachineId { state_id: StateMachine::Polkadot(3367), consensus_state_id: *b"PARA" }
}

pub fn sample_post(source: StateMachine, dest: StateMachine) -> PostRequest {
    PostRequest {
        source,
        dest,
        from: vec![0xaa; 20],
        to: vec![0xbb; 20],
        nonce: 1,
        body: vec![0xcc; 8],
        timeout_timestamp: 0,
    }
}

pub fn update_event(
    state_machine_id: StateMachineId,
    chain: StateMachine,
    height: u64,
) -> StateMachineUpdateEvent {
    StateMachineUpdateEvent {
        state_machine_id,
        height,
        chain,
        block_hash: H256::repeat_byte(0x11),
        block_number: height,
        transaction_hash: H256::repeat_byte(0x22),
        timestamp: 100,
    }
}

#[derive(Default)]
struct ChainState {
    timestamp: AtomicU64,
    challenge_period: AtomicU64,
    receipts: RwLock<HashSet<H256>>,
    offchain: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    bids: RwLock<Vec<([u8; 32], u128)>>,
    submissions: RwLock<Vec<IsmpMessage>>,
    state_proof_queries: AtomicU64,
}

/// A chain adapter with scriptable state.
#[derive(Clone)]
pub struct MockChain {
    id: StateMachineId,
    state: Arc<ChainState>,
}

impl MockChain {
    pub fn new(id: StateMachineId) -> Self {
        let state = ChainState::default();
        state.timestamp.store(1_000_000, Ordering::SeqCst);
        Self { id, state: Arc::new(state) }
    }

    pub fn set_timestamp(&self, timestamp: u64) {
        self.state.timestamp.store(timestamp, Ordering::SeqCst);
    }

    pub fn set_challenge_period(&self, period: u64) {
        self.state.challenge_period.store(period, Ordering::SeqCst);
    }

    pub fn set_receipt(&self, commitment: H256) {
        self.state.receipts.write().insert(commitment);
    }

    pub fn set_offchain(&self, key: Vec<u8>, value: Vec<u8>) {
        self.state.offchain.write().insert(key, value);
    }

    pub fn set_bid_entry(&self, filler: [u8; 32], deposit: u128) {
        self.state.bids.write().push((filler, deposit));
    }

    pub fn submissions(&self) -> Vec<IsmpMessage> {
        self.state.submissions.read().clone()
    }

    pub fn state_proof_queries(&self) -> u64 {
        self.state.state_proof_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Client for MockChain {
    fn state_machine_id(&self) -> StateMachineId {
        self.id
    }

    async fn query_timestamp(&self) -> Result<u64, ClientError> {
        Ok(self.state.timestamp.load(Ordering::SeqCst))
    }

    fn request_receipt_key(&self, commitment: H256) -> Vec<u8> {
        commitment.as_bytes().to_vec()
    }

    async fn query_request_receipt(
        &self,
        commitment: H256,
    ) -> Result<Option<Vec<u8>>, ClientError> {
        Ok(self.state.receipts.read().contains(&commitment).then(|| vec![1u8; 32]))
    }

    async fn query_state_proof(
        &self,
        _at: u64,
        _keys: Vec<Vec<u8>>,
    ) -> Result<Vec<u8>, ClientError> {
        self.state.state_proof_queries.fetch_add(1, Ordering::SeqCst);
        Ok(b"state-proof".to_vec())
    }

    async fn query_proof(
        &self,
        _keys: ProofKeys,
        _counterparty: StateMachine,
        _at: Option<u64>,
    ) -> Result<Vec<u8>, ClientError> {
        Ok(b"membership-proof".to_vec())
    }

    async fn query_latest_state_machine_height(
        &self,
        _id: StateMachineId,
    ) -> Result<u64, ClientError> {
        Ok(1_000)
    }

    async fn query_challenge_period(&self, _id: StateMachineId) -> Result<u64, ClientError> {
        Ok(self.state.challenge_period.load(Ordering::SeqCst))
    }

    async fn query_state_machine_update_time(
        &self,
        _height: StateMachineHeight,
    ) -> Result<u64, ClientError> {
        Ok(self.state.timestamp.load(Ordering::SeqCst))
    }

    fn encode(&self, _message: IsmpMessage) -> Result<Vec<u8>, ClientError> {
        Ok(b"calldata".to_vec())
    }
}

#[async_trait]
impl HubClient for MockChain {
    async fn submit_unsigned(
        &self,
        message: IsmpMessage,
    ) -> Result<ExtrinsicIncluded, ClientError> {
        self.state.submissions.write().push(message);
        Ok(ExtrinsicIncluded {
            tx_hash: H256::repeat_byte(0xab),
            block_hash: H256::repeat_byte(0xcd),
            block_number: 1,
            timestamp: self.state.timestamp.load(Ordering::SeqCst),
        })
    }

    async fn offchain_storage(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>, ClientError> {
        Ok(self.state.offchain.read().get(&key).cloned())
    }

    async fn query_order_bid_entries(
        &self,
        _commitment: H256,
    ) -> Result<Vec<([u8; 32], u128)>, ClientError> {
        Ok(self.state.bids.read().clone())
    }

    fn disconnect(&self) {}

    fn as_client(&self) -> &dyn Client {
        self
    }
}

#[derive(Default)]
struct IndexerState {
    requests: RwLock<HashMap<H256, PostRequestRecord>>,
    get_requests: RwLock<HashMap<H256, GetRequestRecord>>,
    updates: RwLock<Vec<StateMachineUpdateEvent>>,
}

/// An in-memory indexer gateway tests can script.
#[derive(Clone, Default)]
pub struct MockIndexer {
    state: Arc<IndexerState>,
}

impl MockIndexer {
    pub fn insert_request(
        &self,
        commitment: H256,
        request: PostRequest,
        statuses: Vec<StatusMetadataNode>,
    ) {
        self.state
            .requests
            .write()
            .insert(commitment, PostRequestRecord { request, statuses });
    }

    pub fn insert_get_request(
        &self,
        commitment: H256,
        request: GetRequest,
        statuses: Vec<StatusMetadataNode>,
    ) {
        self.state
            .get_requests
            .write()
            .insert(commitment, GetRequestRecord { request, statuses });
    }

    pub fn push_status(&self, commitment: H256, node: StatusMetadataNode) {
        if let Some(record) = self.state.requests.write().get_mut(&commitment) {
            record.statuses.push(node);
        }
    }

    pub fn push_get_status(&self, commitment: H256, node: StatusMetadataNode) {
        if let Some(record) = self.state.get_requests.write().get_mut(&commitment) {
            record.statuses.push(node);
        }
    }

    pub fn insert_update(&self, update: StateMachineUpdateEvent) {
        self.state.updates.write().push(update);
    }
}

#[async_trait]
impl IndexerGateway for MockIndexer {
    async fn request(&self, commitment: H256) -> Result<Option<PostRequestRecord>, anyhow::Error> {
        Ok(self.state.requests.read().get(&commitment).cloned())
    }

    async fn get_request(
        &self,
        commitment: H256,
    ) -> Result<Option<GetRequestRecord>, anyhow::Error> {
        Ok(self.state.get_requests.read().get(&commitment).cloned())
    }

    async fn state_machine_update(
        &self,
        filter: UpdateFilter,
    ) -> Result<Option<StateMachineUpdateEvent>, anyhow::Error> {
        let updates = self.state.updates.read();
        let satisfying = updates
            .iter()
            .filter(|update| {
                update.state_machine_id == filter.state_machine_id &&
                    update.chain == filter.chain &&
                    match filter.criterion {
                        UpdateCriterion::MinHeight(height) => update.height >= height,
                        UpdateCriterion::MinTimestamp(timestamp) =>
                            update.timestamp >= timestamp,
                    }
            })
            .min_by_key(|update| update.height);
        Ok(satisfying.cloned())
    }

    async fn asset_teleports(&self, _from: Vec<u8>) -> Result<Vec<TeleportRecord>, anyhow::Error> {
        Ok(vec![])
    }

    async fn token_gateway_teleports(
        &self,
        _from: Vec<u8>,
    ) -> Result<Vec<TeleportRecord>, anyhow::Error> {
        Ok(vec![])
    }

    async fn orders_placed(&self, _user: H256) -> Result<Vec<OrderPlacedRecord>, anyhow::Error> {
        Ok(vec![])
    }

    async fn get_response(
        &self,
        _request_id: H256,
    ) -> Result<Option<GetResponseRecord>, anyhow::Error> {
        Ok(None)
    }
}

/// Fresh mock chains for source, destination and hub.
pub fn mock_chains() -> (MockChain, MockChain, MockChain) {
    (MockChain::new(source_id()), MockChain::new(dest_id()), MockChain::new(hub_id()))
}

/// A client over the given chains and indexer, with a fast poll interval.
pub fn mock_client_with(
    indexer: &MockIndexer,
    source: MockChain,
    dest: MockChain,
    hub: MockChain,
) -> HyperbridgeClient {
    HyperbridgeClient {
        source: Arc::new(source),
        dest: Arc::new(dest),
        hyperbridge: Arc::new(hub),
        queries: crate::queries::QueryClient::new(Arc::new(indexer.clone())),
        store: Arc::new(MemoryStore::default()),
        poll_interval: Duration::from_millis(10),
    }
}

/// A client over fresh mock chains.
pub fn mock_client(indexer: &MockIndexer) -> HyperbridgeClient {
    let (source, dest, hub) = mock_chains();
    mock_client_with(indexer, source, dest, hub)
}
