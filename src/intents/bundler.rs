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

//! ERC-4337 bundler JSON-RPC client.
//!
//! Bundlers consume the v0.7 *unpacked* user-operation shape: factory and
//! paymaster fields split out of `initCode` and `paymasterAndData`, gas
//! words split into their halves.

use super::{unpack_high_low, PackedUserOperation};
use chain_clients::{evm::Log, ClientError};
use jsonrpsee::{
    core::client::ClientT,
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use serde::{Deserialize, Serialize};
use sp_core::{Bytes, H160, H256, U256};
use std::time::Duration;

const RECEIPT_RETRIES: u32 = 5;
const RECEIPT_BACKOFF: Duration = Duration::from_secs(2);

/// The unpacked v0.7 user operation, as bundlers accept it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    /// The account dispatching this operation
    pub sender: H160,
    /// Account nonce
    pub nonce: U256,
    /// Factory for counterfactual deployment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factory: Option<H160>,
    /// Factory calldata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
    /// The call the account executes
    pub call_data: Bytes,
    /// Gas limit for the execution phase
    pub call_gas_limit: U256,
    /// Gas limit for the verification phase
    pub verification_gas_limit: U256,
    /// Gas to compensate the bundler
    pub pre_verification_gas: U256,
    /// Fee cap
    pub max_fee_per_gas: U256,
    /// Priority fee cap
    pub max_priority_fee_per_gas: U256,
    /// Paymaster address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<H160>,
    /// Paymaster verification gas limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    /// Paymaster post-op gas limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
    /// Paymaster calldata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    /// Account signature
    pub signature: Bytes,
}

/// Convert a packed user operation into the bundler's unpacked shape.
pub fn unpack_user_operation(packed: &PackedUserOperation) -> UserOperation {
    let (verification_gas_limit, call_gas_limit) = unpack_high_low(&packed.account_gas_limits);
    let (max_priority_fee_per_gas, max_fee_per_gas) = unpack_high_low(&packed.gas_fees);
    let (factory, factory_data) = if packed.init_code.len() >= 20 {
        (
            Some(H160::from_slice(&packed.init_code[..20])),
            Some(Bytes(packed.init_code[20..].to_vec())),
        )
    } else {
        (None, None)
    };
    let (paymaster, paymaster_verification_gas_limit, paymaster_post_op_gas_limit, paymaster_data) =
        if packed.paymaster_and_data.len() >= 52 {
            let mut half = [0u8; 32];
            half[16..].copy_from_slice(&packed.paymaster_and_data[20..36]);
            let verification = U256::from_big_endian(&half);
            half[16..].copy_from_slice(&packed.paymaster_and_data[36..52]);
            let post_op = U256::from_big_endian(&half);
            (
                Some(H160::from_slice(&packed.paymaster_and_data[..20])),
                Some(verification),
                Some(post_op),
                Some(Bytes(packed.paymaster_and_data[52..].to_vec())),
            )
        } else {
            (None, None, None, None)
        };

    UserOperation {
        sender: H160::from_slice(&packed.sender),
        nonce: U256::from_big_endian(&packed.nonce),
        factory,
        factory_data,
        call_data: Bytes(packed.call_data.clone()),
        call_gas_limit,
        verification_gas_limit,
        pre_verification_gas: U256::from_big_endian(&packed.pre_verification_gas),
        max_fee_per_gas,
        max_priority_fee_per_gas,
        paymaster,
        paymaster_verification_gas_limit,
        paymaster_post_op_gas_limit,
        paymaster_data,
        signature: Bytes(packed.signature.clone()),
    }
}

/// Gas dimensions returned by `eth_estimateUserOperationGas`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationGasEstimate {
    /// Gas limit for the execution phase
    pub call_gas_limit: U256,
    /// Gas limit for the verification phase
    pub verification_gas_limit: U256,
    /// Gas to compensate the bundler
    pub pre_verification_gas: U256,
}

/// The receipt of an executed user operation.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    /// Whether the operation's execution succeeded
    pub success: bool,
    /// The enclosing transaction receipt
    pub receipt: EnclosingReceipt,
}

/// The transaction receipt enclosing a user operation.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnclosingReceipt {
    /// Logs emitted by the enclosing transaction
    pub logs: Vec<Log>,
}

/// A JSON-RPC client for an ERC-4337 bundler endpoint.
pub struct BundlerClient {
    client: HttpClient,
}

impl BundlerClient {
    /// Connect to the bundler at `url`.
    pub fn new(url: &str) -> Result<Self, ClientError> {
        Ok(Self { client: HttpClientBuilder::default().build(url)? })
    }

    /// Submit a user operation, returning its hash.
    pub async fn send_user_operation(
        &self,
        op: &UserOperation,
        entry_point: H160,
    ) -> Result<H256, ClientError> {
        Ok(self
            .client
            .request("eth_sendUserOperation", rpc_params![op, entry_point])
            .await?)
    }

    /// Estimate the gas dimensions of a user operation, optionally under
    /// synthesized state overrides.
    pub async fn estimate_user_operation_gas(
        &self,
        op: &UserOperation,
        entry_point: H160,
        overrides: Option<serde_json::Value>,
    ) -> Result<UserOperationGasEstimate, ClientError> {
        let estimate = match overrides {
            Some(overrides) => {
                self.client
                    .request(
                        "eth_estimateUserOperationGas",
                        rpc_params![op, entry_point, overrides],
                    )
                    .await?
            }
            None => {
                self.client
                    .request("eth_estimateUserOperationGas", rpc_params![op, entry_point])
                    .await?
            }
        };
        Ok(estimate)
    }

    /// Fetch the receipt for a user operation, `None` while pending.
    pub async fn user_operation_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<UserOperationReceipt>, ClientError> {
        Ok(self
            .client
            .request("eth_getUserOperationReceipt", rpc_params![hash])
            .await?)
    }

    /// Poll for the receipt of a user operation. The bundler answering
    /// "not yet" is expected while the operation is being bundled, so the
    /// poll retries before surfacing an error.
    pub async fn wait_for_receipt(
        &self,
        hash: H256,
    ) -> Result<UserOperationReceipt, ClientError> {
        for attempt in 0..RECEIPT_RETRIES {
            match self.user_operation_receipt(hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {
                    log::debug!(target: "hyperbridge-client", "user op {hash:?} not yet bundled (attempt {attempt})");
                }
                Err(error) => {
                    log::debug!(target: "hyperbridge-client", "receipt query failed (attempt {attempt}): {error:?}");
                }
            }
            tokio::time::sleep(RECEIPT_BACKOFF).await;
        }
        Err(ClientError::Other(format!("no receipt for user operation {hash:?}")))
    }
}
