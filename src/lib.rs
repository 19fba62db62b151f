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

//! Client SDK for the Hyperbridge interoperability protocol.
//!
//! A cross-chain message is dispatched on a source chain, relayed through
//! Hyperbridge and delivered on a destination chain. This crate observes
//! that journey through an indexer, fabricates the proofs and calldata
//! needed to advance each stage, and drives the timeout and cancellation
//! paths when delivery fails.

pub mod intents;
pub mod queries;
pub mod session;
pub mod store;
pub mod tracker;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

use anyhow::anyhow;
use chain_clients::{AnyClient, ChainConfig, SubstrateClient, SubstrateConfig};
use queries::{IndexerGateway, QueryClient};
use std::{sync::Arc, time::Duration};
use store::Keyvalue;

pub use chain_clients::{Client, ClientError, HubClient, ProofKeys};
pub use ismp_primitives::{
    IsmpMessage, PostRequest, StateMachine, StateMachineHeight, StateMachineId,
};

/// Configuration for a [`HyperbridgeClient`].
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ClientConfig {
    /// The chain requests are dispatched from
    pub source: ChainConfig,
    /// The chain requests are delivered to
    pub dest: ChainConfig,
    /// The hub coordinating the transfer
    pub hyperbridge: SubstrateConfig,
    /// Indexer poll interval in milliseconds
    pub poll_interval_ms: Option<u64>,
}

/// The entry point of the SDK: chain adapters for the source, destination
/// and hub, an indexer facade, and the scoped key/value store.
///
/// Adapters hold one long-lived RPC connection each and are shared by
/// reference across every stream started from this client.
#[derive(Clone)]
pub struct HyperbridgeClient {
    /// Adapter for the source chain
    pub source: Arc<dyn Client>,
    /// Adapter for the destination chain
    pub dest: Arc<dyn Client>,
    /// Adapter for the hub
    pub hyperbridge: Arc<dyn HubClient>,
    /// Read facade over the indexer
    pub queries: QueryClient,
    /// Scoped persistence for session keys and resumable cancellations
    pub store: Arc<dyn Keyvalue>,
    /// How long to sleep between indexer polls
    pub poll_interval: Duration,
}

impl HyperbridgeClient {
    /// Construct a client, establishing one RPC connection per chain.
    pub async fn new(
        config: ClientConfig,
        gateway: Arc<dyn IndexerGateway>,
        store: Arc<dyn Keyvalue>,
    ) -> Result<Self, anyhow::Error> {
        let hyperbridge = SubstrateClient::new(config.hyperbridge).await?;
        if !Client::state_machine_id(&hyperbridge).state_id.is_substrate() {
            Err(anyhow!("the hub must be a substrate chain"))?
        }
        Ok(Self {
            source: Arc::new(AnyClient::new(config.source).await?),
            dest: Arc::new(AnyClient::new(config.dest).await?),
            hyperbridge: Arc::new(hyperbridge),
            queries: QueryClient::new(gateway),
            store,
            poll_interval: Duration::from_millis(config.poll_interval_ms.unwrap_or(10_000)),
        })
    }

    /// The hub's state machine identifier.
    pub fn hyperbridge_id(&self) -> StateMachineId {
        self.hyperbridge.state_machine_id()
    }

    /// Tear down the hub's WebSocket connection.
    pub fn disconnect(&self) {
        self.hyperbridge.disconnect();
    }
}
