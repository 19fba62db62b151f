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

//! The indexer-driven request lifecycle tracker.
//!
//! Each request is a deterministic state machine: the indexer is
//! authoritative for which events have happened, the chain adapters for the
//! proofs and calldata that advance the next stage. Streams own nothing but
//! their cursor and are restartable from any point because the indexer is
//! append-only.

use crate::{
    queries::{PostRequestRecord, StatusMetadataNode, UpdateCriterion, UpdateFilter},
    types::{CombinedStatus, EventMetadata, RequestStatus, StatusUpdate, TimeoutStatus},
    HyperbridgeClient,
};
use anyhow::{anyhow, Context};
use async_stream::try_stream;
use chain_clients::{Client, ClientError, ProofKeys};
use futures::{pin_mut, Stream, StreamExt};
use ismp_primitives::{
    messages::Proof, IsmpMessage, StateMachineHeight,
};
use sp_core::H256;
use std::time::Duration;

/// Seconds left of a challenge period that started at `update_time`.
pub fn challenge_wait_secs(challenge_period: u64, update_time: u64, now: u64) -> u64 {
    challenge_period.saturating_sub(now.saturating_sub(update_time))
}

/// Sleep out whatever remains of the challenge period for `height` on
/// `client`, re-checking after each sleep. Returns without sleeping when the
/// period has already elapsed.
pub async fn wait_for_challenge_period(
    client: &dyn Client,
    height: StateMachineHeight,
) -> Result<(), ClientError> {
    let challenge_period = client.query_challenge_period(height.id).await?;
    if challenge_period == 0 {
        return Ok(());
    }
    let update_time = client.query_state_machine_update_time(height).await?;
    loop {
        let now = client.query_timestamp().await?;
        let remaining = challenge_wait_secs(challenge_period, update_time, now);
        if remaining == 0 {
            return Ok(());
        }
        log::trace!(target: "hyperbridge-client", "waiting {remaining}s of challenge period on {}", height.id.state_id);
        tokio::time::sleep(Duration::from_secs(remaining)).await;
    }
}

/// Retry a transient chain query with exponential backoff, three attempts
/// at a one second base.
pub(crate) async fn retry_rpc<T, F, Fut>(mut op: F) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ClientError>>,
{
    let mut backoff = Duration::from_secs(1);
    let mut last_err = None;
    for attempt in 0u32..3 {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                log::debug!(target: "hyperbridge-client", "rpc failed (attempt {attempt}): {error:?}");
                last_err = Some(error);
                if attempt < 2 {
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }
    Err(last_err.expect("at least one attempt was made; qed"))
}

fn find_node(record: &PostRequestRecord, status: RequestStatus) -> Option<StatusMetadataNode> {
    record.statuses.iter().find(|node| node.status == status).cloned()
}

impl HyperbridgeClient {
    /// Poll the indexer until the request is indexed.
    pub(crate) async fn wait_for_record(
        &self,
        commitment: H256,
    ) -> Result<PostRequestRecord, anyhow::Error> {
        loop {
            if let Some(record) = self.queries.request(commitment).await? {
                return Ok(record);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Poll the indexer until a status of at least `status` is recorded,
    /// returning the lightest satisfying node.
    pub(crate) async fn wait_for_status_at_least(
        &self,
        commitment: H256,
        status: RequestStatus,
    ) -> Result<StatusMetadataNode, anyhow::Error> {
        loop {
            if let Some(record) = self.queries.request(commitment).await? {
                let node = record
                    .statuses
                    .iter()
                    .filter(|node| node.status.weight() >= status.weight())
                    .min_by_key(|node| node.status.weight());
                if let Some(node) = node {
                    return Ok(node.clone());
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Poll the indexer until a state machine update satisfying `filter`
    /// exists.
    pub(crate) async fn wait_for_update(
        &self,
        filter: UpdateFilter,
    ) -> Result<crate::queries::StateMachineUpdateEvent, anyhow::Error> {
        loop {
            if let Some(update) = self.queries.state_machine_update(filter).await? {
                return Ok(update);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Fabricate the destination calldata for a delivered request: a fresh
    /// multiproof from the hub at `hub_height`, encoded for the
    /// destination's handler.
    async fn destination_calldata(
        &self,
        request: &ismp_primitives::PostRequest,
        commitment: H256,
        hub_height: u64,
    ) -> Result<Vec<u8>, anyhow::Error> {
        let height = StateMachineHeight { id: self.hyperbridge_id(), height: hub_height };
        let proof = retry_rpc(|| {
            self.hyperbridge.query_proof(
                ProofKeys::Requests(vec![commitment]),
                request.dest,
                Some(hub_height),
            )
        })
        .await
        .context("fetching hub multiproof")?;
        let calldata = self.dest.encode(IsmpMessage::PostRequest {
            requests: vec![request.clone()],
            proof: Proof { height, proof },
            signer: vec![],
        })?;
        Ok(calldata)
    }

    /// The main delivery stream of §post-request tracking: one item per
    /// stage, terminating at `DESTINATION`.
    fn delivery_stream(
        &self,
        commitment: H256,
    ) -> impl Stream<Item = Result<StatusUpdate, anyhow::Error>> + '_ {
        try_stream! {
            let record = self.wait_for_record(commitment).await?;
            let request = record.request.clone();
            let hub = self.hyperbridge_id();
            let source_is_hub = request.source == hub.state_id;
            let dest_is_hub = request.dest == hub.state_id;

            let initial = if source_is_hub {
                RequestStatus::HyperbridgeDelivered
            } else {
                RequestStatus::Source
            };
            // resume from whichever is further along: the bootstrap status
            // or what the indexer has already seen
            let mut current = match record.statuses.last() {
                Some(node) if node.status.weight() > initial.weight() => node.status,
                _ => initial,
            };
            let metadata = find_node(&record, current)
                .or_else(|| record.statuses.last().cloned())
                .map(|node| node.metadata());
            yield StatusUpdate::status(CombinedStatus::Request(current), metadata);

            loop {
                match current {
                    RequestStatus::Source => {
                        let dispatched = find_node(&record, RequestStatus::Source)
                            .ok_or_else(|| anyhow!("indexer record is missing the dispatch"))?;
                        let update = self
                            .wait_for_update(UpdateFilter {
                                state_machine_id: self.source.state_machine_id(),
                                chain: hub.state_id,
                                criterion: UpdateCriterion::MinHeight(dispatched.block_number),
                            })
                            .await?;
                        current = RequestStatus::SourceFinalized;
                        yield StatusUpdate::status(
                            CombinedStatus::Request(current),
                            Some(update.metadata()),
                        );
                    }
                    RequestStatus::SourceFinalized => {
                        let node = self
                            .wait_for_status_at_least(
                                commitment,
                                RequestStatus::HyperbridgeDelivered,
                            )
                            .await?;
                        if dest_is_hub {
                            // delivery to the hub is delivery to the destination
                            current = RequestStatus::Destination;
                        } else {
                            current = node.status;
                        }
                        yield StatusUpdate::status(
                            CombinedStatus::Request(current),
                            Some(node.metadata()),
                        );
                    }
                    RequestStatus::HyperbridgeDelivered => {
                        let delivered = self
                            .wait_for_status_at_least(
                                commitment,
                                RequestStatus::HyperbridgeDelivered,
                            )
                            .await?;
                        let update = self
                            .wait_for_update(UpdateFilter {
                                state_machine_id: hub,
                                chain: request.dest,
                                criterion: UpdateCriterion::MinHeight(delivered.block_number),
                            })
                            .await?;
                        let calldata = self
                            .destination_calldata(&request, commitment, update.height)
                            .await?;
                        let height = StateMachineHeight { id: hub, height: update.height };
                        wait_for_challenge_period(&*self.dest, height).await?;
                        current = RequestStatus::HyperbridgeFinalized;
                        yield StatusUpdate::Status {
                            status: CombinedStatus::Request(current),
                            metadata: Some(update.metadata()),
                            calldata: Some(calldata),
                        };
                    }
                    RequestStatus::HyperbridgeFinalized => {
                        let node = self
                            .wait_for_status_at_least(commitment, RequestStatus::Destination)
                            .await?;
                        current = RequestStatus::Destination;
                        yield StatusUpdate::status(
                            CombinedStatus::Request(current),
                            Some(node.metadata()),
                        );
                    }
                    RequestStatus::Destination |
                    RequestStatus::HyperbridgeTimedOut |
                    RequestStatus::TimedOut => break,
                }
            }
        }
    }

    /// Watches the destination clock and yields `PENDING_TIMEOUT` once it
    /// passes the request timeout. Yields nothing for requests without a
    /// timeout.
    fn timeout_watcher(
        &self,
        commitment: H256,
    ) -> impl Stream<Item = Result<StatusUpdate, anyhow::Error>> + '_ {
        try_stream! {
            let record = self.wait_for_record(commitment).await?;
            let timeout = record.request.timeout_timestamp;
            if timeout != 0 {
                loop {
                    let now = retry_rpc(|| self.dest.query_timestamp()).await?;
                    if now >= timeout {
                        yield StatusUpdate::status(
                            CombinedStatus::Timeout(TimeoutStatus::PendingTimeout),
                            None,
                        );
                        break;
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Track a post request to `DESTINATION` or a pending timeout,
    /// whichever comes first. The delivery stream and the timeout watcher
    /// run concurrently with race semantics; dropping the returned stream
    /// cancels both.
    pub fn request_status_stream(
        &self,
        commitment: H256,
    ) -> impl Stream<Item = StatusUpdate> + '_ {
        enum Raced {
            Delivery(Option<Result<StatusUpdate, anyhow::Error>>),
            Watcher(Option<Result<StatusUpdate, anyhow::Error>>),
        }

        async_stream::stream! {
            let delivery = self.delivery_stream(commitment);
            let watcher = self.timeout_watcher(commitment);
            pin_mut!(delivery, watcher);
            let mut delivery = delivery.fuse();
            let mut watcher = watcher.fuse();
            loop {
                let raced = futures::select! {
                    item = delivery.next() => Raced::Delivery(item),
                    item = watcher.next() => Raced::Watcher(item),
                };
                match raced {
                    Raced::Delivery(None) => return,
                    Raced::Delivery(Some(item)) => {
                        let update = unwrap_or_failed(item, commitment);
                        let terminal = match &update {
                            StatusUpdate::Failed { .. } => true,
                            StatusUpdate::Status { status, .. } => matches!(
                                status,
                                CombinedStatus::Request(RequestStatus::Destination) |
                                    CombinedStatus::Request(RequestStatus::TimedOut)
                            ),
                        };
                        yield update;
                        if terminal {
                            return;
                        }
                    }
                    // the watcher fired first: surface it and cancel the
                    // delivery stream
                    Raced::Watcher(Some(item)) => {
                        yield unwrap_or_failed(item, commitment);
                        return;
                    }
                    // no timeout to watch; keep draining the delivery side
                    Raced::Watcher(None) => {}
                }
            }
        }
    }

    /// Drive a timed-out request through the timeout lifecycle, fabricating
    /// the proofs that mark it timed out on the hub and finally on the
    /// source chain.
    pub fn request_timeout_stream(
        &self,
        commitment: H256,
    ) -> impl Stream<Item = StatusUpdate> + '_ {
        let inner = try_stream! {
            let record = self.wait_for_record(commitment).await?;
            let request = record.request.clone();
            let hub = self.hyperbridge_id();
            let dest_id = self.dest.state_machine_id();

            // the request must actually be timeable: undelivered, and past
            // its timeout on the destination clock
            let receipt = retry_rpc(|| self.dest.query_request_receipt(commitment)).await?;
            if receipt.is_some() {
                Err(anyhow!("request was delivered, it can no longer time out"))?
            }
            let now = retry_rpc(|| self.dest.query_timestamp()).await?;
            if now < request.timeout_timestamp {
                Err(anyhow!(
                    "destination clock {} has not passed the timeout {}",
                    now,
                    request.timeout_timestamp
                ))?
            }
            yield StatusUpdate::status(
                CombinedStatus::Timeout(TimeoutStatus::PendingTimeout),
                None,
            );

            // await the hub's view of the destination advancing past the
            // timeout, then prove the receipt slot is still empty
            let update = self
                .wait_for_update(UpdateFilter {
                    state_machine_id: dest_id,
                    chain: hub.state_id,
                    criterion: UpdateCriterion::MinTimestamp(request.timeout_timestamp),
                })
                .await?;
            let receipt_key = self.dest.request_receipt_key(commitment);
            let proof = retry_rpc(|| {
                self.dest.query_state_proof(update.height, vec![receipt_key.clone()])
            })
            .await
            .context("proving the empty receipt on the destination")?;
            yield StatusUpdate::status(
                CombinedStatus::Timeout(TimeoutStatus::DestinationFinalizedTimeout),
                Some(update.metadata()),
            );

            // the hub verifies the non-membership proof via an unsigned
            // extrinsic
            let message = IsmpMessage::TimeoutPostRequest {
                requests: vec![request.clone()],
                proof: Proof {
                    height: StateMachineHeight { id: dest_id, height: update.height },
                    proof,
                },
            };
            let included = self.hyperbridge.submit_unsigned(message).await?;
            yield StatusUpdate::status(
                CombinedStatus::Timeout(TimeoutStatus::HyperbridgeTimedOut),
                Some(EventMetadata {
                    block_hash: included.block_hash,
                    block_number: included.block_number,
                    transaction_hash: included.tx_hash,
                    chain: hub.state_id,
                    timestamp: included.timestamp,
                }),
            );

            // once the source finalizes the hub past the timeout, hand the
            // caller calldata proving the hub dropped the request
            let update = self
                .wait_for_update(UpdateFilter {
                    state_machine_id: hub,
                    chain: request.source,
                    criterion: UpdateCriterion::MinHeight(included.block_number),
                })
                .await?;
            let hub_receipt_key = self.hyperbridge.request_receipt_key(commitment);
            let hub_proof = retry_rpc(|| {
                self.hyperbridge.query_state_proof(update.height, vec![hub_receipt_key.clone()])
            })
            .await
            .context("proving the empty receipt on the hub")?;
            let height = StateMachineHeight { id: hub, height: update.height };
            let calldata = self.source.encode(IsmpMessage::TimeoutPostRequest {
                requests: vec![request.clone()],
                proof: Proof { height, proof: hub_proof },
            })?;
            wait_for_challenge_period(&*self.source, height).await?;
            yield StatusUpdate::Status {
                status: CombinedStatus::Timeout(TimeoutStatus::HyperbridgeFinalizedTimeout),
                metadata: Some(update.metadata()),
                calldata: Some(calldata),
            };

            // indexer confirmation of the source-chain timeout event
            let node = self
                .wait_for_status_at_least(commitment, RequestStatus::TimedOut)
                .await?;
            yield StatusUpdate::status(
                CombinedStatus::Timeout(TimeoutStatus::TimedOut),
                Some(node.metadata()),
            );
        };
        wrap_failures(inner, commitment)
    }

    /// Inject the finality milestones the indexer does not record between
    /// observed statuses, returning the full history sorted on the combined
    /// scale.
    pub async fn add_request_finality_events(
        &self,
        record: &PostRequestRecord,
    ) -> Result<Vec<StatusUpdate>, anyhow::Error> {
        let commitment = ismp_primitives::hash_post_request(&record.request);
        let hub = self.hyperbridge_id();
        let has = |status: RequestStatus| record.statuses.iter().any(|node| node.status == status);
        let heaviest =
            record.statuses.iter().map(|node| node.status.weight()).max().unwrap_or_default();

        let mut events: Vec<StatusUpdate> = record
            .statuses
            .iter()
            .map(|node| {
                StatusUpdate::status(CombinedStatus::Request(node.status), Some(node.metadata()))
            })
            .collect();

        if let Some(dispatched) = find_node(record, RequestStatus::Source) {
            let finalized_beyond = heaviest >= RequestStatus::HyperbridgeDelivered.weight();
            if finalized_beyond && !has(RequestStatus::SourceFinalized) {
                let update = self
                    .queries
                    .state_machine_update(UpdateFilter {
                        state_machine_id: self.source.state_machine_id(),
                        chain: hub.state_id,
                        criterion: UpdateCriterion::MinHeight(dispatched.block_number),
                    })
                    .await?;
                if let Some(update) = update {
                    events.push(StatusUpdate::status(
                        CombinedStatus::Request(RequestStatus::SourceFinalized),
                        Some(update.metadata()),
                    ));
                }
            }
        }

        if let Some(delivered) = find_node(record, RequestStatus::HyperbridgeDelivered) {
            let delivered_beyond = heaviest >= RequestStatus::Destination.weight();
            if delivered_beyond && !has(RequestStatus::HyperbridgeFinalized) {
                let update = self
                    .queries
                    .state_machine_update(UpdateFilter {
                        state_machine_id: hub,
                        chain: record.request.dest,
                        criterion: UpdateCriterion::MinHeight(delivered.block_number),
                    })
                    .await?;
                if let Some(update) = update {
                    let calldata = self
                        .destination_calldata(&record.request, commitment, update.height)
                        .await?;
                    events.push(StatusUpdate::Status {
                        status: CombinedStatus::Request(RequestStatus::HyperbridgeFinalized),
                        metadata: Some(update.metadata()),
                        calldata: Some(calldata),
                    });
                }
            }
        }

        events.sort_by_key(|event| event.weight());
        Ok(events)
    }

    /// The full, gap-free status history of a post request.
    pub async fn query_request_full_status(
        &self,
        commitment: H256,
    ) -> Result<Vec<StatusUpdate>, anyhow::Error> {
        let Some(record) = self.queries.request(commitment).await? else {
            return Ok(vec![]);
        };
        self.add_request_finality_events(&record).await
    }

    /// The status history of a get request, sorted by weight.
    pub async fn query_get_request_full_status(
        &self,
        commitment: H256,
    ) -> Result<Vec<StatusUpdate>, anyhow::Error> {
        let Some(record) = self.queries.get_request(commitment).await? else {
            return Ok(vec![]);
        };
        Ok(record
            .statuses
            .iter()
            .map(|node| {
                StatusUpdate::status(CombinedStatus::Request(node.status), Some(node.metadata()))
            })
            .collect())
    }
}

fn unwrap_or_failed(
    item: Result<StatusUpdate, anyhow::Error>,
    commitment: H256,
) -> StatusUpdate {
    item.unwrap_or_else(|error| StatusUpdate::Failed {
        commitment,
        description: format!("{error:#}"),
    })
}

/// Adapt a fallible stream into one that ends with a terminal `Failed`
/// event instead of surfacing errors.
fn wrap_failures<'a>(
    inner: impl Stream<Item = Result<StatusUpdate, anyhow::Error>> + 'a,
    commitment: H256,
) -> impl Stream<Item = StatusUpdate> + 'a {
    inner.map(move |item| unwrap_or_failed(item, commitment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{
        dest_id, hub_id, mock_chains, mock_client, mock_client_with, sample_post, source_id,
        update_event, MockIndexer,
    };
    use ismp_primitives::StateMachine;

    fn node_at(
        status: RequestStatus,
        chain: StateMachine,
        block_number: u64,
    ) -> StatusMetadataNode {
        StatusMetadataNode {
            status,
            block_hash: H256::repeat_byte(status.weight() + 1),
            block_number,
            timestamp: 100,
            chain,
            transaction_hash: H256::repeat_byte(0x77),
        }
    }

    #[test]
    fn challenge_wait_is_exact() {
        assert_eq!(challenge_wait_secs(60, 1_000, 1_030), 30);
        assert_eq!(challenge_wait_secs(60, 1_000, 1_060), 0);
        assert_eq!(challenge_wait_secs(60, 1_000, 2_000), 0);
        // a clock behind the update time still waits the full period
        assert_eq!(challenge_wait_secs(60, 1_000, 999), 60);
    }

    #[tokio::test]
    async fn hub_sourced_requests_bootstrap_as_delivered() {
        let _ = env_logger::try_init();
        let hub = StateMachine::Polkadot(3367);
        let indexer = MockIndexer::default();
        let request = sample_post(hub, StateMachine::Evm(97));
        let commitment = ismp_primitives::hash_post_request(&request);
        indexer.insert_request(
            commitment,
            request,
            vec![node_at(RequestStatus::Source, hub, 5)],
        );
        let client = mock_client(&indexer);
        let stream = client.request_status_stream(commitment);
        pin_mut!(stream);
        let first = stream.next().await.unwrap();
        match first {
            StatusUpdate::Status { status, .. } => assert_eq!(
                status,
                CombinedStatus::Request(RequestStatus::HyperbridgeDelivered)
            ),
            other => panic!("unexpected first update: {other:?}"),
        }
    }

    #[tokio::test]
    async fn delivery_stream_walks_the_lifecycle() {
        let _ = env_logger::try_init();
        let hub = StateMachine::Polkadot(3367);
        let source = StateMachine::Evm(97);
        let dest = StateMachine::Evm(1);
        let indexer = MockIndexer::default();
        let request = sample_post(source, dest);
        let commitment = ismp_primitives::hash_post_request(&request);
        indexer.insert_request(
            commitment,
            request,
            vec![
                node_at(RequestStatus::Source, source, 5),
                node_at(RequestStatus::HyperbridgeDelivered, hub, 50),
                node_at(RequestStatus::Destination, dest, 500),
            ],
        );
        // finality evidence on both sides
        indexer.insert_update(update_event(source_id(), hub, 10));
        indexer.insert_update(update_event(hub_id(), dest, 60));

        let client = mock_client(&indexer);
        let stream = client.request_status_stream(commitment);
        let updates: Vec<_> = stream.collect().await;
        let statuses: Vec<_> = updates
            .iter()
            .map(|update| match update {
                StatusUpdate::Status { status, .. } => *status,
                StatusUpdate::Failed { description, .. } => panic!("failed: {description}"),
            })
            .collect();
        // resumes from the heaviest indexed status and completes
        assert_eq!(
            statuses,
            vec![CombinedStatus::Request(RequestStatus::Destination)]
        );
    }

    #[tokio::test]
    async fn fresh_requests_stream_every_transition() {
        let _ = env_logger::try_init();
        let hub = StateMachine::Polkadot(3367);
        let source = StateMachine::Evm(97);
        let dest = StateMachine::Evm(1);
        let indexer = MockIndexer::default();
        let request = sample_post(source, dest);
        let commitment = ismp_primitives::hash_post_request(&request);
        indexer.insert_request(
            commitment,
            request,
            vec![node_at(RequestStatus::Source, source, 5)],
        );
        indexer.insert_update(update_event(source_id(), hub, 10));
        indexer.insert_update(update_event(hub_id(), dest, 60));

        let client = mock_client(&indexer);
        let stream = client.request_status_stream(commitment);
        pin_mut!(stream);

        let mut statuses = vec![];
        for _ in 0..2 {
            match stream.next().await.unwrap() {
                StatusUpdate::Status { status, .. } => statuses.push(status),
                StatusUpdate::Failed { description, .. } => panic!("failed: {description}"),
            }
        }
        assert_eq!(
            statuses,
            vec![
                CombinedStatus::Request(RequestStatus::Source),
                CombinedStatus::Request(RequestStatus::SourceFinalized),
            ]
        );
        // the hub delivers, then the destination
        indexer.push_status(commitment, node_at(RequestStatus::HyperbridgeDelivered, hub, 50));
        match stream.next().await.unwrap() {
            StatusUpdate::Status { status, .. } => {
                assert_eq!(status, CombinedStatus::Request(RequestStatus::HyperbridgeDelivered));
                statuses.push(status);
            }
            StatusUpdate::Failed { description, .. } => panic!("failed: {description}"),
        }
        // the hyperbridge finalized event carries destination calldata
        match stream.next().await.unwrap() {
            StatusUpdate::Status { status, calldata, .. } => {
                assert_eq!(status, CombinedStatus::Request(RequestStatus::HyperbridgeFinalized));
                assert_eq!(calldata, Some(b"calldata".to_vec()));
                statuses.push(status);
            }
            StatusUpdate::Failed { description, .. } => panic!("failed: {description}"),
        }
        indexer.push_status(commitment, node_at(RequestStatus::Destination, dest, 500));
        let mut weights: Vec<u8> = statuses.iter().map(|s| s.combined_weight()).collect();
        while let Some(update) = stream.next().await {
            match update {
                StatusUpdate::Status { status, .. } => weights.push(status.combined_weight()),
                StatusUpdate::Failed { description, .. } => panic!("failed: {description}"),
            }
        }
        // weights never decrease
        assert!(weights.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(*weights.last().unwrap(), 4);
    }

    #[tokio::test]
    async fn finality_enrichment_fills_the_gaps() {
        let _ = env_logger::try_init();
        let hub = StateMachine::Polkadot(3367);
        let source = StateMachine::Evm(97);
        let dest = StateMachine::Evm(1);
        let indexer = MockIndexer::default();
        let request = sample_post(source, dest);
        let commitment = ismp_primitives::hash_post_request(&request);
        indexer.insert_request(
            commitment,
            request,
            vec![
                node_at(RequestStatus::Source, source, 5),
                node_at(RequestStatus::HyperbridgeDelivered, hub, 50),
                node_at(RequestStatus::Destination, dest, 500),
            ],
        );
        indexer.insert_update(update_event(source_id(), hub, 10));
        indexer.insert_update(update_event(hub_id(), dest, 60));

        let client = mock_client(&indexer);
        let history = client.query_request_full_status(commitment).await.unwrap();
        let statuses: Vec<_> = history
            .iter()
            .map(|update| match update {
                StatusUpdate::Status { status, .. } => *status,
                StatusUpdate::Failed { description, .. } => panic!("failed: {description}"),
            })
            .collect();
        assert_eq!(
            statuses,
            vec![
                CombinedStatus::Request(RequestStatus::Source),
                CombinedStatus::Request(RequestStatus::SourceFinalized),
                CombinedStatus::Request(RequestStatus::HyperbridgeDelivered),
                CombinedStatus::Request(RequestStatus::HyperbridgeFinalized),
                CombinedStatus::Request(RequestStatus::Destination),
            ]
        );
        // the injected finality event carries fresh calldata
        let finalized = &history[3];
        match finalized {
            StatusUpdate::Status { calldata, .. } => assert!(calldata.is_some()),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn timeout_stream_rejects_delivered_requests() {
        let _ = env_logger::try_init();
        let source = StateMachine::Evm(97);
        let dest = StateMachine::Evm(1);
        let indexer = MockIndexer::default();
        let request = sample_post(source, dest);
        let commitment = ismp_primitives::hash_post_request(&request);
        indexer.insert_request(commitment, request, vec![]);

        let (source_chain, dest_chain, hub_chain) = mock_chains();
        // mark the request delivered on the destination
        dest_chain.set_receipt(commitment);
        let client = mock_client_with(&indexer, source_chain, dest_chain, hub_chain);
        let stream = client.request_timeout_stream(commitment);
        pin_mut!(stream);
        match stream.next().await.unwrap() {
            StatusUpdate::Failed { description, .. } => {
                assert!(description.contains("delivered"))
            }
            other => panic!("unexpected update: {other:?}"),
        }
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn timeout_stream_walks_the_timeout_lifecycle() {
        let _ = env_logger::try_init();
        let hub = StateMachine::Polkadot(3367);
        let source = StateMachine::Evm(97);
        let dest = StateMachine::Evm(1);
        let indexer = MockIndexer::default();
        let mut request = sample_post(source, dest);
        request.timeout_timestamp = 50;
        let commitment = ismp_primitives::hash_post_request(&request);
        indexer.insert_request(commitment, request, vec![]);
        // the hub has finalized the destination past the timeout, and the
        // source has finalized the hub past the timeout extrinsic
        indexer.insert_update(update_event(dest_id(), hub, 70));
        indexer.insert_update(update_event(hub_id(), source, 60));

        let (source_chain, dest_chain, hub_chain) = mock_chains();
        let client =
            mock_client_with(&indexer, source_chain, dest_chain, hub_chain.clone());
        let stream = client.request_timeout_stream(commitment);
        pin_mut!(stream);

        let mut statuses = vec![];
        for _ in 0..4 {
            match stream.next().await.unwrap() {
                StatusUpdate::Status { status, .. } => statuses.push(status),
                StatusUpdate::Failed { description, .. } => panic!("failed: {description}"),
            }
        }
        assert_eq!(
            statuses,
            vec![
                CombinedStatus::Timeout(TimeoutStatus::PendingTimeout),
                CombinedStatus::Timeout(TimeoutStatus::DestinationFinalizedTimeout),
                CombinedStatus::Timeout(TimeoutStatus::HyperbridgeTimedOut),
                CombinedStatus::Timeout(TimeoutStatus::HyperbridgeFinalizedTimeout),
            ]
        );
        // the hub saw exactly one timeout submission
        assert_eq!(hub_chain.submissions().len(), 1);

        // the indexer confirms the source-chain timeout
        indexer.push_status(commitment, node_at(RequestStatus::TimedOut, source, 600));
        match stream.next().await.unwrap() {
            StatusUpdate::Status { status, .. } => {
                assert_eq!(status, CombinedStatus::Timeout(TimeoutStatus::TimedOut))
            }
            StatusUpdate::Failed { description, .. } => panic!("failed: {description}"),
        }
        assert!(stream.next().await.is_none());
    }
}
