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

//! Request lifecycle statuses and the events the tracker emits.
//!
//! Both status families are totally ordered by weight and a combined scale
//! interleaves them, so a mixed history of delivery and timeout events can
//! be sorted into a single timeline.

use ismp_primitives::StateMachine;
use sp_core::H256;

/// The delivery lifecycle of a request, as observed by the indexer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RequestStatus {
    /// Dispatched on the source chain
    Source,
    /// The source block containing the request is finalized on the hub
    SourceFinalized,
    /// Delivered to the hub
    HyperbridgeDelivered,
    /// The hub block containing the delivery is finalized on the destination
    HyperbridgeFinalized,
    /// Delivered to the destination chain
    Destination,
    /// Timed out on the hub
    HyperbridgeTimedOut,
    /// Timed out on the source chain
    TimedOut,
}

impl RequestStatus {
    /// The status weight; greater weights are later in the lifecycle.
    pub fn weight(&self) -> u8 {
        match self {
            RequestStatus::Source => 0,
            RequestStatus::SourceFinalized => 1,
            RequestStatus::HyperbridgeDelivered => 2,
            RequestStatus::HyperbridgeFinalized => 3,
            RequestStatus::Destination => 4,
            RequestStatus::HyperbridgeTimedOut => 5,
            RequestStatus::TimedOut => 6,
        }
    }
}

/// The timeout lifecycle of a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TimeoutStatus {
    /// The destination clock has passed the request timeout
    PendingTimeout,
    /// The destination is finalized past the timeout on the hub
    DestinationFinalizedTimeout,
    /// The hub has registered the timeout
    HyperbridgeTimedOut,
    /// The hub block containing the timeout is finalized on the source
    HyperbridgeFinalizedTimeout,
    /// The source chain has registered the timeout
    TimedOut,
}

impl TimeoutStatus {
    /// The status weight; greater weights are later in the lifecycle.
    pub fn weight(&self) -> u8 {
        match self {
            TimeoutStatus::PendingTimeout => 1,
            TimeoutStatus::DestinationFinalizedTimeout => 2,
            TimeoutStatus::HyperbridgeTimedOut => 3,
            TimeoutStatus::HyperbridgeFinalizedTimeout => 4,
            TimeoutStatus::TimedOut => 5,
        }
    }
}

/// A status from either lifecycle, ordered on the combined scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CombinedStatus {
    /// A delivery status
    Request(RequestStatus),
    /// A timeout status
    Timeout(TimeoutStatus),
}

impl CombinedStatus {
    /// Weight on the combined scale interleaving both lifecycles.
    pub fn combined_weight(&self) -> u8 {
        match self {
            CombinedStatus::Request(status) => match status {
                RequestStatus::Source => 0,
                RequestStatus::SourceFinalized => 1,
                RequestStatus::HyperbridgeDelivered => 2,
                RequestStatus::HyperbridgeFinalized => 3,
                RequestStatus::Destination => 4,
                RequestStatus::HyperbridgeTimedOut => 7,
                RequestStatus::TimedOut => 9,
            },
            CombinedStatus::Timeout(status) => match status {
                TimeoutStatus::PendingTimeout => 5,
                TimeoutStatus::DestinationFinalizedTimeout => 6,
                TimeoutStatus::HyperbridgeTimedOut => 7,
                TimeoutStatus::HyperbridgeFinalizedTimeout => 8,
                TimeoutStatus::TimedOut => 9,
            },
        }
    }
}

impl PartialOrd for CombinedStatus {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CombinedStatus {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.combined_weight().cmp(&other.combined_weight())
    }
}

/// Where and when a status was observed on chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EventMetadata {
    /// Hash of the block the event landed in
    pub block_hash: H256,
    /// Number of that block
    pub block_number: u64,
    /// Hash of the transaction that produced the event
    pub transaction_hash: H256,
    /// The chain the event was observed on
    pub chain: StateMachine,
    /// Chain timestamp at the block, in seconds
    pub timestamp: u64,
}

/// An item yielded by a tracking stream.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StatusUpdate {
    /// The request advanced a stage
    Status {
        /// The stage reached
        status: CombinedStatus,
        /// On-chain coordinates of the evidence, where observed
        metadata: Option<EventMetadata>,
        /// Calldata to submit to advance the next stage, where applicable
        calldata: Option<Vec<u8>>,
    },
    /// The stream failed terminally
    Failed {
        /// Commitment of the request being tracked
        commitment: H256,
        /// What went wrong
        description: String,
    },
}

impl StatusUpdate {
    /// Convenience constructor for a plain status.
    pub fn status(status: CombinedStatus, metadata: Option<EventMetadata>) -> Self {
        StatusUpdate::Status { status, metadata, calldata: None }
    }

    /// The combined weight of this update, `None` for failures.
    pub fn weight(&self) -> Option<u8> {
        match self {
            StatusUpdate::Status { status, .. } => Some(status.combined_weight()),
            StatusUpdate::Failed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_lifecycles_are_totally_ordered() {
        let delivery = [
            RequestStatus::Source,
            RequestStatus::SourceFinalized,
            RequestStatus::HyperbridgeDelivered,
            RequestStatus::HyperbridgeFinalized,
            RequestStatus::Destination,
            RequestStatus::HyperbridgeTimedOut,
            RequestStatus::TimedOut,
        ];
        assert!(delivery.windows(2).all(|pair| pair[0].weight() < pair[1].weight()));

        let timeout = [
            TimeoutStatus::PendingTimeout,
            TimeoutStatus::DestinationFinalizedTimeout,
            TimeoutStatus::HyperbridgeTimedOut,
            TimeoutStatus::HyperbridgeFinalizedTimeout,
            TimeoutStatus::TimedOut,
        ];
        assert!(timeout.windows(2).all(|pair| pair[0].weight() < pair[1].weight()));
    }

    #[test]
    fn the_combined_scale_interleaves_timeouts_after_delivery() {
        let mut history = vec![
            CombinedStatus::Timeout(TimeoutStatus::PendingTimeout),
            CombinedStatus::Request(RequestStatus::Source),
            CombinedStatus::Timeout(TimeoutStatus::TimedOut),
            CombinedStatus::Request(RequestStatus::HyperbridgeDelivered),
            CombinedStatus::Request(RequestStatus::SourceFinalized),
        ];
        history.sort();
        assert_eq!(
            history,
            vec![
                CombinedStatus::Request(RequestStatus::Source),
                CombinedStatus::Request(RequestStatus::SourceFinalized),
                CombinedStatus::Request(RequestStatus::HyperbridgeDelivered),
                CombinedStatus::Timeout(TimeoutStatus::PendingTimeout),
                CombinedStatus::Timeout(TimeoutStatus::TimedOut),
            ]
        );
    }

    #[test]
    fn equivalent_statuses_share_a_combined_weight() {
        assert_eq!(
            CombinedStatus::Request(RequestStatus::HyperbridgeTimedOut).combined_weight(),
            CombinedStatus::Timeout(TimeoutStatus::HyperbridgeTimedOut).combined_weight(),
        );
        assert_eq!(
            CombinedStatus::Request(RequestStatus::TimedOut).combined_weight(),
            CombinedStatus::Timeout(TimeoutStatus::TimedOut).combined_weight(),
        );
    }
}
