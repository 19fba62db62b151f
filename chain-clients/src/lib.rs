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

//! Uniform chain adapters for the Hyperbridge client.
//!
//! Every chain family exposes the same contract: timestamp and height
//! queries, receipt lookups, state-proof generation and ISMP message
//! encoding. Proof encodings are family specific: MMR multiproofs when the
//! prover is the hub and the verifier an EVM chain, child-trie storage
//! proofs between substrate chains, and account/storage merkle-patricia
//! proofs out of EVM chains.

pub mod abi;
pub mod evm;
pub mod substrate;
pub mod tron;

pub use evm::{EvmClient, EvmConfig};
pub use substrate::{SubstrateClient, SubstrateConfig};
pub use tron::{TronClient, TronConfig};

use async_trait::async_trait;
use ismp_primitives::{IsmpMessage, StateMachine, StateMachineHeight, StateMachineId};
use sp_core::H256;

/// Errors returned by chain adapters.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The underlying JSON-RPC transport failed
    #[error("rpc error: {0}")]
    Rpc(#[from] jsonrpsee::core::ClientError),
    /// A plain http request failed
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// A SCALE payload failed to decode
    #[error("codec error: {0}")]
    Codec(#[from] codec::Error),
    /// An ABI payload failed to decode
    #[error("abi error: {0}")]
    Abi(#[from] alloy_sol_types::Error),
    /// The requested proof pairing is not supported
    #[error("cannot prove for an unknown counterparty: {counterparty}")]
    UnsupportedCounterparty {
        /// The counterparty the proof was requested for
        counterparty: StateMachine,
    },
    /// The message variant cannot be encoded for this chain family
    #[error("{variant} messages cannot be encoded for {chain}")]
    UnsupportedVariant {
        /// The chain the encoding was requested on
        chain: StateMachine,
        /// Name of the offending message variant
        variant: &'static str,
    },
    /// The client is missing configuration it needs for the operation
    #[error("misconfigured client: {0}")]
    Config(String),
    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl From<String> for ClientError {
    fn from(value: String) -> Self {
        Self::Other(value)
    }
}

impl From<anyhow::Error> for ClientError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(format!("{value:?}"))
    }
}

/// The storage items a membership proof can be requested for. Serializes
/// with external tagging, the shape the hub's mmr RPC expects.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub enum ProofKeys {
    /// Request commitments
    Requests(Vec<H256>),
    /// Response commitments
    Responses(Vec<H256>),
}

/// The uniform contract all chain adapters expose.
#[async_trait]
pub trait Client: Send + Sync {
    /// The identifier of the chain this adapter is connected to.
    fn state_machine_id(&self) -> StateMachineId;

    /// Current unix timestamp of the chain, in seconds.
    async fn query_timestamp(&self) -> Result<u64, ClientError>;

    /// The family-specific storage key of the request receipt for
    /// `commitment`.
    fn request_receipt_key(&self, commitment: H256) -> Vec<u8>;

    /// Read the request receipt for `commitment`. Returns `None` when the
    /// storage slot is empty, i.e. the request has not been delivered.
    async fn query_request_receipt(&self, commitment: H256)
        -> Result<Option<Vec<u8>>, ClientError>;

    /// Produce a SCALE encoded, family-specific state proof for `keys` at
    /// `at`.
    async fn query_state_proof(&self, at: u64, keys: Vec<Vec<u8>>)
        -> Result<Vec<u8>, ClientError>;

    /// Produce a membership proof for `keys` suitable for verification on
    /// the given counterparty, optionally at a specific height.
    async fn query_proof(
        &self,
        keys: ProofKeys,
        counterparty: StateMachine,
        at: Option<u64>,
    ) -> Result<Vec<u8>, ClientError>;

    /// The latest height of `id` as finalized on this chain.
    async fn query_latest_state_machine_height(
        &self,
        id: StateMachineId,
    ) -> Result<u64, ClientError>;

    /// The configured challenge period for `id` on this chain, in seconds.
    async fn query_challenge_period(&self, id: StateMachineId) -> Result<u64, ClientError>;

    /// The unix timestamp at which `height` was finalized on this chain.
    async fn query_state_machine_update_time(
        &self,
        height: StateMachineHeight,
    ) -> Result<u64, ClientError>;

    /// Encode `message` into calldata for this chain's local handler.
    fn encode(&self, message: IsmpMessage) -> Result<Vec<u8>, ClientError>;
}

/// The extra surface the hub exposes beyond the uniform adapter contract:
/// unsigned submission and its off-chain storages.
#[async_trait]
pub trait HubClient: Client {
    /// Submit `message` as an unsigned extrinsic and wait for block
    /// inclusion.
    async fn submit_unsigned(
        &self,
        message: IsmpMessage,
    ) -> Result<substrate::ExtrinsicIncluded, ClientError>;

    /// Read a value from the hub's persistent off-chain storage.
    async fn offchain_storage(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>, ClientError>;

    /// Enumerate the on-chain bid entries for an order.
    async fn query_order_bid_entries(
        &self,
        commitment: H256,
    ) -> Result<Vec<([u8; 32], u128)>, ClientError>;

    /// Tear down the underlying connection.
    fn disconnect(&self);

    /// View this adapter through the uniform contract.
    fn as_client(&self) -> &dyn Client;
}

/// A chain adapter of any supported family.
pub enum AnyClient {
    /// An EVM chain
    Evm(EvmClient),
    /// A substrate chain
    Substrate(SubstrateClient),
    /// A Tron chain
    Tron(TronClient),
}

/// Configuration for any supported chain family.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum ChainConfig {
    /// EVM configuration
    Evm(EvmConfig),
    /// Substrate configuration
    Substrate(SubstrateConfig),
    /// Tron configuration
    Tron(TronConfig),
}

impl AnyClient {
    /// Construct the adapter for `config`, establishing its RPC connection.
    pub async fn new(config: ChainConfig) -> Result<Self, ClientError> {
        let client = match config {
            ChainConfig::Evm(config) => AnyClient::Evm(EvmClient::new(config)?),
            ChainConfig::Substrate(config) => {
                AnyClient::Substrate(SubstrateClient::new(config).await?)
            }
            ChainConfig::Tron(config) => AnyClient::Tron(TronClient::new(config)?),
        };
        Ok(client)
    }

    /// The inner EVM client, if this is an EVM-family chain. Tron delegates
    /// its ISMP operations to an embedded EVM client.
    pub fn evm(&self) -> Option<&EvmClient> {
        match self {
            AnyClient::Evm(client) => Some(client),
            AnyClient::Tron(client) => Some(client.evm()),
            AnyClient::Substrate(_) => None,
        }
    }

    /// The inner substrate client, if this is a substrate-family chain.
    pub fn substrate(&self) -> Option<&SubstrateClient> {
        match self {
            AnyClient::Substrate(client) => Some(client),
            _ => None,
        }
    }
}

#[async_trait]
impl Client for AnyClient {
    fn state_machine_id(&self) -> StateMachineId {
        match self {
            AnyClient::Evm(client) => client.state_machine_id(),
            AnyClient::Substrate(client) => client.state_machine_id(),
            AnyClient::Tron(client) => client.state_machine_id(),
        }
    }

    async fn query_timestamp(&self) -> Result<u64, ClientError> {
        match self {
            AnyClient::Evm(client) => client.query_timestamp().await,
            AnyClient::Substrate(client) => client.query_timestamp().await,
            AnyClient::Tron(client) => client.query_timestamp().await,
        }
    }

    fn request_receipt_key(&self, commitment: H256) -> Vec<u8> {
        match self {
            AnyClient::Evm(client) => client.request_receipt_key(commitment),
            AnyClient::Substrate(client) => client.request_receipt_key(commitment),
            AnyClient::Tron(client) => client.request_receipt_key(commitment),
        }
    }

    async fn query_request_receipt(
        &self,
        commitment: H256,
    ) -> Result<Option<Vec<u8>>, ClientError> {
        match self {
            AnyClient::Evm(client) => client.query_request_receipt(commitment).await,
            AnyClient::Substrate(client) => client.query_request_receipt(commitment).await,
            AnyClient::Tron(client) => client.query_request_receipt(commitment).await,
        }
    }

    async fn query_state_proof(
        &self,
        at: u64,
        keys: Vec<Vec<u8>>,
    ) -> Result<Vec<u8>, ClientError> {
        match self {
            AnyClient::Evm(client) => client.query_state_proof(at, keys).await,
            AnyClient::Substrate(client) => client.query_state_proof(at, keys).await,
            AnyClient::Tron(client) => client.query_state_proof(at, keys).await,
        }
    }

    async fn query_proof(
        &self,
        keys: ProofKeys,
        counterparty: StateMachine,
        at: Option<u64>,
    ) -> Result<Vec<u8>, ClientError> {
        match self {
            AnyClient::Evm(client) => client.query_proof(keys, counterparty, at).await,
            AnyClient::Substrate(client) => client.query_proof(keys, counterparty, at).await,
            AnyClient::Tron(client) => client.query_proof(keys, counterparty, at).await,
        }
    }

    async fn query_latest_state_machine_height(
        &self,
        id: StateMachineId,
    ) -> Result<u64, ClientError> {
        match self {
            AnyClient::Evm(client) => client.query_latest_state_machine_height(id).await,
            AnyClient::Substrate(client) => client.query_latest_state_machine_height(id).await,
            AnyClient::Tron(client) => client.query_latest_state_machine_height(id).await,
        }
    }

    async fn query_challenge_period(&self, id: StateMachineId) -> Result<u64, ClientError> {
        match self {
            AnyClient::Evm(client) => client.query_challenge_period(id).await,
            AnyClient::Substrate(client) => client.query_challenge_period(id).await,
            AnyClient::Tron(client) => client.query_challenge_period(id).await,
        }
    }

    async fn query_state_machine_update_time(
        &self,
        height: StateMachineHeight,
    ) -> Result<u64, ClientError> {
        match self {
            AnyClient::Evm(client) => client.query_state_machine_update_time(height).await,
            AnyClient::Substrate(client) => client.query_state_machine_update_time(height).await,
            AnyClient::Tron(client) => client.query_state_machine_update_time(height).await,
        }
    }

    fn encode(&self, message: IsmpMessage) -> Result<Vec<u8>, ClientError> {
        match self {
            AnyClient::Evm(client) => client.encode(message),
            AnyClient::Substrate(client) => client.encode(message),
            AnyClient::Tron(client) => client.encode(message),
        }
    }
}

/// The numeric identity of a state machine, as EVM host contracts key their
/// storage by it.
pub fn state_machine_numeric(state_machine: StateMachine) -> u64 {
    match state_machine {
        StateMachine::Evm(id) => id as u64,
        StateMachine::Polkadot(id) => id as u64,
        StateMachine::Kusama(id) => id as u64,
        StateMachine::Substrate(tag) => u32::from_be_bytes(tag) as u64,
        StateMachine::Tendermint(tag) => u32::from_be_bytes(tag) as u64,
    }
}
