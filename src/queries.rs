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

//! Read facade over the indexer.
//!
//! The indexer is authoritative for what has been observed on each chain;
//! adapters are only consulted when fresh calldata or proofs are needed.
//! The transport behind [`IndexerGateway`] is external to the SDK.

use crate::types::{EventMetadata, RequestStatus};
use async_trait::async_trait;
use ismp_primitives::{GetRequest, PostRequest, StateMachine, StateMachineId};
use sp_core::{H256, U256};
use std::{sync::Arc, time::Duration};

/// A status entry in an indexer record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusMetadataNode {
    /// The status reached
    pub status: RequestStatus,
    /// Hash of the block the evidence landed in
    pub block_hash: H256,
    /// Number of that block
    pub block_number: u64,
    /// Chain timestamp at the block, in seconds
    pub timestamp: u64,
    /// The chain the evidence was observed on
    pub chain: StateMachine,
    /// Hash of the transaction carrying the evidence
    pub transaction_hash: H256,
}

impl StatusMetadataNode {
    /// View this node as stream event metadata.
    pub fn metadata(&self) -> EventMetadata {
        EventMetadata {
            block_hash: self.block_hash,
            block_number: self.block_number,
            transaction_hash: self.transaction_hash,
            chain: self.chain,
            timestamp: self.timestamp,
        }
    }
}

/// An indexed post request and its observed statuses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostRequestRecord {
    /// The request as dispatched
    pub request: PostRequest,
    /// Statuses observed so far, unordered
    pub statuses: Vec<StatusMetadataNode>,
}

/// An indexed get request and its observed statuses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetRequestRecord {
    /// The request as dispatched
    pub request: GetRequest,
    /// Statuses observed so far, unordered
    pub statuses: Vec<StatusMetadataNode>,
}

/// An indexed assertion that `chain` has finalized `state_machine_id` up to
/// `height`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateMachineUpdateEvent {
    /// The state machine that was finalized
    pub state_machine_id: StateMachineId,
    /// The finalized height
    pub height: u64,
    /// The chain the update happened on
    pub chain: StateMachine,
    /// Hash of the block carrying the update
    pub block_hash: H256,
    /// Number of that block
    pub block_number: u64,
    /// Hash of the update transaction
    pub transaction_hash: H256,
    /// Chain timestamp at the block, in seconds
    pub timestamp: u64,
}

impl StateMachineUpdateEvent {
    /// View this event as stream event metadata.
    pub fn metadata(&self) -> EventMetadata {
        EventMetadata {
            block_hash: self.block_hash,
            block_number: self.block_number,
            transaction_hash: self.transaction_hash,
            chain: self.chain,
            timestamp: self.timestamp,
        }
    }
}

/// How to pick the smallest satisfying state machine update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateCriterion {
    /// The update must finalize at least this height
    MinHeight(u64),
    /// The update must be timestamped at or after this unix time
    MinTimestamp(u64),
}

/// Filter for state machine update queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdateFilter {
    /// The state machine the update is for
    pub state_machine_id: StateMachineId,
    /// The chain the update must be observed on
    pub chain: StateMachine,
    /// The satisfaction criterion
    pub criterion: UpdateCriterion,
}

/// A catalog view of an asset teleport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TeleportRecord {
    /// Sender on the source chain
    pub from: Vec<u8>,
    /// Beneficiary on the destination chain
    pub to: Vec<u8>,
    /// Amount teleported
    pub amount: U256,
    /// The destination chain
    pub dest: StateMachine,
    /// Commitment of the carrying request
    pub commitment: H256,
}

/// A catalog view of a placed order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderPlacedRecord {
    /// Commitment of the order
    pub commitment: H256,
    /// Account that placed it
    pub user: H256,
    /// The destination chain
    pub dest: StateMachine,
    /// Hash of the placement transaction
    pub transaction_hash: H256,
    /// Number of the placement block
    pub block_number: u64,
}

/// A catalog view of a get response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetResponseRecord {
    /// Commitment of the responded request
    pub commitment: H256,
    /// The values returned, in key order
    pub values: Vec<Option<Vec<u8>>>,
}

/// The indexer read surface the SDK consumes. Implementations own the
/// GraphQL transport.
#[async_trait]
pub trait IndexerGateway: Send + Sync {
    /// The post request identified by `commitment`, if indexed yet.
    async fn request(&self, commitment: H256) -> Result<Option<PostRequestRecord>, anyhow::Error>;

    /// The get request identified by `commitment`, if indexed yet.
    async fn get_request(
        &self,
        commitment: H256,
    ) -> Result<Option<GetRequestRecord>, anyhow::Error>;

    /// The smallest state machine update satisfying `filter`.
    async fn state_machine_update(
        &self,
        filter: UpdateFilter,
    ) -> Result<Option<StateMachineUpdateEvent>, anyhow::Error>;

    /// Asset teleports dispatched by `from`, newest first.
    async fn asset_teleports(&self, from: Vec<u8>) -> Result<Vec<TeleportRecord>, anyhow::Error>;

    /// Token gateway teleports dispatched by `from`, newest first.
    async fn token_gateway_teleports(
        &self,
        from: Vec<u8>,
    ) -> Result<Vec<TeleportRecord>, anyhow::Error>;

    /// Orders placed by `user`, newest first.
    async fn orders_placed(&self, user: H256) -> Result<Vec<OrderPlacedRecord>, anyhow::Error>;

    /// The response to a get request, if delivered yet.
    async fn get_response(
        &self,
        request_id: H256,
    ) -> Result<Option<GetResponseRecord>, anyhow::Error>;
}

/// Retry policy for indexer reads.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Initial backoff
    pub initial_backoff: Duration,
    /// Total attempts before surfacing the error
    pub attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { initial_backoff: Duration::from_secs(1), attempts: 3 }
    }
}

/// A thin read facade that retries with exponential backoff and normalizes
/// records into weight-sorted status sequences.
#[derive(Clone)]
pub struct QueryClient {
    gateway: Arc<dyn IndexerGateway>,
    policy: RetryPolicy,
}

impl QueryClient {
    /// Wrap a gateway with the default retry policy.
    pub fn new(gateway: Arc<dyn IndexerGateway>) -> Self {
        Self { gateway, policy: RetryPolicy::default() }
    }

    /// Override the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn with_retries<T, F, Fut>(&self, mut op: F) -> Result<T, anyhow::Error>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
    {
        let mut backoff = self.policy.initial_backoff;
        let mut last_err = None;
        for attempt in 0..self.policy.attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    log::debug!(target: "hyperbridge-client", "indexer query failed (attempt {attempt}): {error:?}");
                    last_err = Some(error);
                    if attempt + 1 < self.policy.attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }
        Err(last_err.expect("at least one attempt was made; qed"))
    }

    /// The post request for `commitment`, with its statuses sorted by
    /// weight.
    pub async fn request(
        &self,
        commitment: H256,
    ) -> Result<Option<PostRequestRecord>, anyhow::Error> {
        let record = self.with_retries(|| self.gateway.request(commitment)).await?;
        Ok(record.map(|mut record| {
            record.statuses.sort_by_key(|node| node.status.weight());
            record
        }))
    }

    /// The get request for `commitment`, with its statuses sorted by
    /// weight.
    pub async fn get_request(
        &self,
        commitment: H256,
    ) -> Result<Option<GetRequestRecord>, anyhow::Error> {
        let record = self.with_retries(|| self.gateway.get_request(commitment)).await?;
        Ok(record.map(|mut record| {
            record.statuses.sort_by_key(|node| node.status.weight());
            record
        }))
    }

    /// The smallest state machine update satisfying `filter`.
    pub async fn state_machine_update(
        &self,
        filter: UpdateFilter,
    ) -> Result<Option<StateMachineUpdateEvent>, anyhow::Error> {
        self.with_retries(|| self.gateway.state_machine_update(filter)).await
    }

    /// Asset teleports dispatched by `from`.
    pub async fn asset_teleports(
        &self,
        from: Vec<u8>,
    ) -> Result<Vec<TeleportRecord>, anyhow::Error> {
        self.with_retries(|| self.gateway.asset_teleports(from.clone())).await
    }

    /// Token gateway teleports dispatched by `from`.
    pub async fn token_gateway_teleports(
        &self,
        from: Vec<u8>,
    ) -> Result<Vec<TeleportRecord>, anyhow::Error> {
        self.with_retries(|| self.gateway.token_gateway_teleports(from.clone())).await
    }

    /// Orders placed by `user`.
    pub async fn orders_placed(
        &self,
        user: H256,
    ) -> Result<Vec<OrderPlacedRecord>, anyhow::Error> {
        self.with_retries(|| self.gateway.orders_placed(user)).await
    }

    /// The response to a get request, if delivered yet.
    pub async fn get_response(
        &self,
        request_id: H256,
    ) -> Result<Option<GetResponseRecord>, anyhow::Error> {
        self.with_retries(|| self.gateway.get_response(request_id)).await
    }

    /// The heaviest status the indexer has observed for `commitment`, if
    /// any.
    pub async fn latest_status(
        &self,
        commitment: H256,
    ) -> Result<Option<StatusMetadataNode>, anyhow::Error> {
        Ok(self.request(commitment).await?.and_then(|record| record.statuses.into_iter().last()))
    }
}
