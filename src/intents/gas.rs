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

//! ERC-4337 gas estimation for fills.
//!
//! The bundler path estimates against synthesized state overrides so a
//! solver that is not yet funded still produces an estimate; the fallback
//! path estimates the fill call directly against the destination.

use super::{
    bundler::unpack_user_operation,
    executor::{DecodedBid, IntentClient},
    OrderV2,
};
use anyhow::Context;
use chain_clients::evm::CallRequest;
use ismp_primitives::slots::{double_map_slot, map_slot, u256_bytes};
use sp_core::{Bytes, H160, H256, U256};

/// Gas the source chain spends handling the fill's post request; converted
/// to the fee token to price the relayer fee.
const POST_REQUEST_GAS: u64 = 150_000;

/// Balance mapping slot of the canonical ERC-20 layout.
pub const ERC20_BALANCE_SLOT: u64 = 0;
/// Allowance mapping slot of the canonical ERC-20 layout.
pub const ERC20_ALLOWANCE_SLOT: u64 = 1;
/// Deposits mapping slot of the entry point contract.
pub const ENTRY_POINT_DEPOSITS_SLOT: u64 = 0;

/// The full parameter set of an estimated fill.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FillGasEstimate {
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
    /// Native value the fill must carry
    pub native_value: U256,
    /// Protocol dispatch fee with the safety margin, in the fee token
    pub protocol_fee: U256,
    /// Relayer fee with the safety margin, in the destination fee token
    pub relayer_fee: U256,
}

/// Apply the 0.5% safety margin.
pub fn add_safety_margin(value: U256) -> U256 {
    value.saturating_mul(1_005u64.into()) / 1_000u64
}

/// Bump a quoted gas price by `percent`.
pub fn bump(value: U256, percent: u64) -> U256 {
    value.saturating_mul((100 + percent).into()) / 100u64
}

/// The 5% buffer applied to bundler-returned gas dimensions.
pub fn buffer(value: U256) -> U256 {
    bump(value, 5)
}

/// Re-scale an amount between token decimal bases.
pub fn scale_amount(amount: U256, from_decimals: u8, to_decimals: u8) -> U256 {
    if to_decimals >= from_decimals {
        amount.saturating_mul(U256::from(10u64).pow((to_decimals - from_decimals).into()))
    } else {
        amount / U256::from(10u64).pow((from_decimals - to_decimals).into())
    }
}

fn pad_address(address: H160) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[12..].copy_from_slice(address.as_bytes());
    out
}

fn hex_word(word: H256) -> String {
    format!("0x{}", hex::encode(word))
}

fn hex_amount(value: U256) -> String {
    format!("{value:#x}")
}

/// Synthesize the state overrides that make an unfunded solver estimable:
/// native balance, account code, a full entry-point deposit, and fee-token
/// solvency plus allowance for the gateway.
pub fn fill_state_overrides(
    solver: H160,
    gateway: H160,
    entry_point: H160,
    fee_token: Option<H160>,
    native_value: U256,
    solver_code: Option<Vec<u8>>,
) -> serde_json::Value {
    let plenty = U256::from(1u64) << 127;
    let mut overrides = serde_json::Map::new();

    let mut solver_entry = serde_json::Map::new();
    solver_entry.insert(
        "balance".to_string(),
        serde_json::Value::String(hex_amount(native_value.saturating_add(plenty))),
    );
    if let Some(code) = solver_code {
        solver_entry.insert(
            "code".to_string(),
            serde_json::Value::String(format!("0x{}", hex::encode(code))),
        );
    }
    overrides.insert(format!("{solver:?}"), serde_json::Value::Object(solver_entry));

    let deposit_slot = map_slot(&pad_address(solver), ENTRY_POINT_DEPOSITS_SLOT);
    overrides.insert(
        format!("{entry_point:?}"),
        serde_json::json!({
            "stateDiff": { hex_word(deposit_slot): hex_word(H256(u256_bytes(plenty))) }
        }),
    );

    if let Some(token) = fee_token {
        let balance_slot = map_slot(&pad_address(solver), ERC20_BALANCE_SLOT);
        let allowance_slot =
            double_map_slot(&pad_address(solver), &pad_address(gateway), ERC20_ALLOWANCE_SLOT);
        overrides.insert(
            format!("{token:?}"),
            serde_json::json!({
                "stateDiff": {
                    hex_word(balance_slot): hex_word(H256(u256_bytes(plenty))),
                    hex_word(allowance_slot): hex_word(H256(u256_bytes(plenty))),
                }
            }),
        );
    }
    serde_json::Value::Object(overrides)
}

impl IntentClient {
    /// Produce the full ERC-4337 parameter set for filling `order` with
    /// `bid`.
    pub async fn estimate_fill_gas(
        &self,
        order: &OrderV2,
        bid: &DecodedBid,
    ) -> Result<FillGasEstimate, anyhow::Error> {
        let native_value = order.native_value();
        let gateway = self.dest_evm.intent_gateway_address()?;

        // the relayer is reimbursed on the destination for gas spent
        // posting the fill receipt back to the source
        let (source_fee, source_decimals) = self
            .price
            .gas_cost_in_fee_token(order.source, POST_REQUEST_GAS)
            .await
            .context("pricing the source post-request fee")?;
        let dest_decimals = self.price.fee_token_decimals(order.destination).await?;
        let relayer_fee =
            add_safety_margin(scale_amount(source_fee, source_decimals, dest_decimals));
        let protocol_fee = add_safety_margin(order.predispatch.fee);

        let unpacked = unpack_user_operation(&bid.bid.user_op);
        let overrides = fill_state_overrides(
            bid.solver,
            gateway,
            self.config.entry_point,
            self.config.fee_token,
            native_value,
            self.config.solver_account_code.clone(),
        );
        let (call_gas_limit, verification_gas_limit, pre_verification_gas) = match self
            .bundler()?
            .estimate_user_operation_gas(&unpacked, self.config.entry_point, Some(overrides))
            .await
        {
            Ok(estimate) => (
                buffer(estimate.call_gas_limit),
                buffer(estimate.verification_gas_limit),
                buffer(estimate.pre_verification_gas),
            ),
            Err(error) => {
                log::debug!(target: "hyperbridge-client", "bundler estimate failed, falling back to a contract estimate: {error:#}");
                let gas = self
                    .dest_evm
                    .estimate_gas(CallRequest {
                        from: Some(bid.solver),
                        to: gateway,
                        value: Some(native_value),
                        data: Bytes(bid.fill_data.clone()),
                    })
                    .await?;
                (
                    buffer(gas.into()),
                    unpacked.verification_gas_limit,
                    unpacked.pre_verification_gas,
                )
            }
        };

        let base = self.dest_evm.gas_price().await?;
        let priority = self.dest_evm.max_priority_fee_per_gas().await?;
        Ok(FillGasEstimate {
            call_gas_limit,
            verification_gas_limit,
            pre_verification_gas,
            max_fee_per_gas: bump(base, self.config.max_fee_bump),
            max_priority_fee_per_gas: bump(priority, self.config.priority_fee_bump),
            native_value,
            protocol_fee,
            relayer_fee,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn margins_and_bumps() {
        assert_eq!(add_safety_margin(U256::from(10_000u64)), U256::from(10_050u64));
        assert_eq!(bump(U256::from(100u64), 8), U256::from(108u64));
        assert_eq!(bump(U256::from(100u64), 10), U256::from(110u64));
        assert_eq!(buffer(U256::from(200_000u64)), U256::from(210_000u64));
    }

    #[test]
    fn amounts_scale_between_decimal_bases() {
        // 1.5 units in 6 decimals to 18 decimals and back
        let six = U256::from(1_500_000u64);
        let eighteen = scale_amount(six, 6, 18);
        assert_eq!(eighteen, U256::from(1_500_000_000_000_000_000u128));
        assert_eq!(scale_amount(eighteen, 18, 6), six);
        assert_eq!(scale_amount(six, 6, 6), six);
    }

    #[test]
    fn overrides_cover_every_synthesized_account() {
        let solver = H160::repeat_byte(1);
        let gateway = H160::repeat_byte(2);
        let entry_point = H160::repeat_byte(3);
        let token = H160::repeat_byte(4);
        let overrides = fill_state_overrides(
            solver,
            gateway,
            entry_point,
            Some(token),
            U256::from(1_000u64),
            Some(vec![0x60, 0x80]),
        );
        let map = overrides.as_object().unwrap();
        assert_eq!(map.len(), 3);
        let solver_entry = &map[&format!("{solver:?}")];
        assert!(solver_entry["balance"].is_string());
        assert_eq!(solver_entry["code"], "0x6080");
        // entry point deposit keyed by the solver's padded address
        let deposit_slot = hex_word(map_slot(&pad_address(solver), ENTRY_POINT_DEPOSITS_SLOT));
        assert!(map[&format!("{entry_point:?}")]["stateDiff"][&deposit_slot].is_string());
        // fee token solvency and allowance
        let diff = map[&format!("{token:?}")]["stateDiff"].as_object().unwrap();
        assert_eq!(diff.len(), 2);
    }
}
