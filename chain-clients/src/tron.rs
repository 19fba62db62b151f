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

//! Tron chain adapter.
//!
//! Tron is EVM-compatible at the contract layer, so every ISMP operation is
//! delegated to an embedded EVM adapter pointed at the chain's JSON-RPC
//! endpoint. The only Tron-native surface is transaction broadcast and
//! confirmation, which go through the full node's REST API.

use crate::{evm::EvmClient, Client, ClientError, EvmConfig, ProofKeys};
use async_trait::async_trait;
use ismp_primitives::{IsmpMessage, StateMachine, StateMachineHeight, StateMachineId};
use sp_core::H256;
use std::time::Duration;

const CONFIRM_RETRIES: u32 = 30;
const CONFIRM_INTERVAL: Duration = Duration::from_secs(3);

/// Configuration for a Tron chain adapter.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct TronConfig {
    /// The embedded EVM adapter configuration
    pub evm: EvmConfig,
    /// Base url of the full node's REST API
    pub api_url: String,
}

/// Core tron client.
pub struct TronClient {
    evm: EvmClient,
    api_url: String,
    http: reqwest::Client,
}

impl TronClient {
    /// Create a new client.
    pub fn new(config: TronConfig) -> Result<Self, ClientError> {
        Ok(Self {
            evm: EvmClient::new(config.evm)?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        })
    }

    /// The embedded EVM adapter.
    pub fn evm(&self) -> &EvmClient {
        &self.evm
    }

    /// Broadcast a signed transaction, returning its Tron transaction id.
    pub async fn broadcast_transaction(
        &self,
        signed: serde_json::Value,
    ) -> Result<String, ClientError> {
        let url = format!("{}/wallet/broadcasttransaction", self.api_url);
        let response: serde_json::Value =
            self.http.post(url).json(&signed).send().await?.json().await?;
        if response.get("result").and_then(|value| value.as_bool()) != Some(true) {
            Err(ClientError::Other(format!("tron broadcast failed: {response}")))?
        }
        let txid = response
            .get("txid")
            .and_then(|value| value.as_str())
            .ok_or_else(|| ClientError::Other("tron broadcast returned no txid".to_string()))?;
        Ok(txid.to_string())
    }

    /// Poll the node for the transaction's execution info until it lands in
    /// a block, returning its id as a zero-prefixed hex hash.
    pub async fn wait_for_transaction(&self, txid: &str) -> Result<H256, ClientError> {
        let url = format!("{}/wallet/gettransactioninfobyid", self.api_url);
        for _ in 0..CONFIRM_RETRIES {
            let info: serde_json::Value = self
                .http
                .post(&url)
                .json(&serde_json::json!({ "value": txid }))
                .send()
                .await?
                .json()
                .await?;
            if info.get("blockNumber").is_some() {
                return tx_hash_from_id(txid);
            }
            log::trace!(target: "chain-clients", "tron transaction {txid} still pending");
            tokio::time::sleep(CONFIRM_INTERVAL).await;
        }
        Err(ClientError::Other(format!("tron transaction {txid} was not confirmed")))
    }
}

/// Convert a tron transaction id to the uniform `0x`-prefixed 32 byte hash.
pub fn tx_hash_from_id(txid: &str) -> Result<H256, ClientError> {
    let bytes = hex::decode(txid.trim_start_matches("0x"))
        .map_err(|e| ClientError::Other(format!("invalid tron txid: {e}")))?;
    if bytes.len() != 32 {
        Err(ClientError::Other(format!("invalid tron txid length: {}", bytes.len())))?
    }
    Ok(H256::from_slice(&bytes))
}

#[async_trait]
impl Client for TronClient {
    fn state_machine_id(&self) -> StateMachineId {
        self.evm.state_machine_id()
    }

    async fn query_timestamp(&self) -> Result<u64, ClientError> {
        self.evm.query_timestamp().await
    }

    fn request_receipt_key(&self, commitment: H256) -> Vec<u8> {
        self.evm.request_receipt_key(commitment)
    }

    async fn query_request_receipt(
        &self,
        commitment: H256,
    ) -> Result<Option<Vec<u8>>, ClientError> {
        self.evm.query_request_receipt(commitment).await
    }

    async fn query_state_proof(
        &self,
        at: u64,
        keys: Vec<Vec<u8>>,
    ) -> Result<Vec<u8>, ClientError> {
        self.evm.query_state_proof(at, keys).await
    }

    async fn query_proof(
        &self,
        keys: ProofKeys,
        counterparty: StateMachine,
        at: Option<u64>,
    ) -> Result<Vec<u8>, ClientError> {
        self.evm.query_proof(keys, counterparty, at).await
    }

    async fn query_latest_state_machine_height(
        &self,
        id: StateMachineId,
    ) -> Result<u64, ClientError> {
        self.evm.query_latest_state_machine_height(id).await
    }

    async fn query_challenge_period(&self, id: StateMachineId) -> Result<u64, ClientError> {
        self.evm.query_challenge_period(id).await
    }

    async fn query_state_machine_update_time(
        &self,
        height: StateMachineHeight,
    ) -> Result<u64, ClientError> {
        self.evm.query_state_machine_update_time(height).await
    }

    fn encode(&self, message: IsmpMessage) -> Result<Vec<u8>, ClientError> {
        self.evm.encode(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tron_tx_ids_become_prefixed_hashes() {
        let txid = "a06fec39a9ff5b901671a9917ec30dc84c8950e8120bc1b7ee8661b452354f29";
        let hash = tx_hash_from_id(txid).unwrap();
        assert_eq!(format!("{hash:?}"), format!("0x{txid}"));
        assert!(tx_hash_from_id("deadbeef").is_err());
    }
}
