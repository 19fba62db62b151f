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

//! Intent orders and their execution flow.
//!
//! An order escrows input assets on its source chain and names the output
//! payment it wants on the destination. Solvers bid for the fill through
//! the hub's off-chain bid store; the winning bid is simulated, authorized
//! by the order's session key and submitted to an ERC-4337 bundler.

pub mod bundler;
pub mod cancel;
pub mod executor;
pub mod gas;

use alloy_primitives::{Address, B256, U256 as AlloyU256};
use alloy_sol_types::{SolStruct, SolValue};
use chain_clients::abi;
use codec::{Decode, Encode};
use ismp_primitives::StateMachine;
use sp_core::{H160, H256, U256};
use sp_crypto_hashing::keccak_256;

/// An asset and an amount of it. The zero token identifies the chain's
/// native token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenAmount {
    /// Token identifier
    pub token: H256,
    /// Amount of the token
    pub amount: U256,
}

/// The payment an order requests on its destination.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PaymentInfo {
    /// Assets to be paid out
    pub assets: Vec<TokenAmount>,
    /// Account the assets are paid to
    pub beneficiary: H256,
}

/// A dispatch executed on the destination before funds are released.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchInfo {
    /// Module receiving the dispatch
    pub module: H256,
    /// Dispatch timeout in seconds
    pub timeout: u64,
    /// Fee paid to the protocol for the dispatch
    pub fee: U256,
    /// Opaque dispatch payload
    pub payload: Vec<u8>,
}

/// An intent order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderV2 {
    /// The order commitment, assigned once the placement is reconciled
    pub id: H256,
    /// Account that placed the order
    pub user: H256,
    /// The chain the inputs are escrowed on
    pub source: StateMachine,
    /// The chain the outputs are paid on
    pub destination: StateMachine,
    /// Timestamp after which the order can be cancelled
    pub deadline: u64,
    /// Order nonce on the gateway
    pub nonce: u64,
    /// Fees escrowed for the filler
    pub fees: U256,
    /// Ephemeral session key authorized to select a solver
    pub session: H160,
    /// Dispatch executed before funds are released
    pub predispatch: DispatchInfo,
    /// Escrowed input assets
    pub inputs: Vec<TokenAmount>,
    /// Requested output payment
    pub output: PaymentInfo,
}

impl Default for OrderV2 {
    fn default() -> Self {
        Self {
            id: Default::default(),
            user: Default::default(),
            source: StateMachine::Evm(0),
            destination: StateMachine::Evm(0),
            deadline: 0,
            nonce: 0,
            fees: Default::default(),
            session: Default::default(),
            predispatch: Default::default(),
            inputs: vec![],
            output: Default::default(),
        }
    }
}

impl OrderV2 {
    /// View the order in its ABI shape.
    pub fn to_sol(&self) -> abi::Order {
        abi::Order {
            user: B256::from(self.user.0),
            sourceChain: self.source.to_string().into_bytes().into(),
            destChain: self.destination.to_string().into_bytes().into(),
            deadline: AlloyU256::from(self.deadline),
            nonce: AlloyU256::from(self.nonce),
            fees: alloy_u256(self.fees),
            session: Address::from_slice(self.session.as_bytes()),
            predispatch: abi::DispatchInfo {
                module: B256::from(self.predispatch.module.0),
                timeout: self.predispatch.timeout,
                fee: alloy_u256(self.predispatch.fee),
                payload: self.predispatch.payload.clone().into(),
            },
            inputs: self.inputs.iter().map(to_sol_token).collect(),
            output: abi::PaymentInfo {
                assets: self.output.assets.iter().map(to_sol_token).collect(),
                beneficiary: B256::from(self.output.beneficiary.0),
            },
        }
    }

    /// The order commitment, the keccak hash of the ABI encoding of the
    /// order tuple.
    pub fn commitment(&self) -> H256 {
        keccak_256(&self.to_sol().abi_encode()).into()
    }

    /// Whether the order fills on the chain it was placed on.
    pub fn is_same_chain(&self) -> bool {
        self.source == self.destination
    }

    /// The native value a fill must carry: native-typed outputs plus the
    /// protocol dispatch fee.
    pub fn native_value(&self) -> U256 {
        let outputs = self
            .output
            .assets
            .iter()
            .filter(|asset| asset.token == H256::zero())
            .fold(U256::zero(), |sum, asset| sum.saturating_add(asset.amount));
        outputs.saturating_add(self.predispatch.fee)
    }
}

fn to_sol_token(asset: &TokenAmount) -> abi::TokenAmount {
    abi::TokenAmount { token: B256::from(asset.token.0), amount: alloy_u256(asset.amount) }
}

/// Convert between the two U256 representations; both are little-endian
/// 64 bit limbs.
pub fn alloy_u256(value: U256) -> AlloyU256 {
    AlloyU256::from_limbs(value.0)
}

/// Convert an alloy integer back to the sp-core representation.
pub fn sp_u256(value: AlloyU256) -> U256 {
    U256(value.into_limbs())
}

/// The v0.7 packed account-abstraction user operation, SCALE encodable for
/// the hub's bid store: addresses as 20 bytes, uint256 fields as 32 bytes,
/// variable-length bytes as vectors.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct PackedUserOperation {
    /// The account dispatching this operation
    pub sender: [u8; 20],
    /// Account nonce
    pub nonce: [u8; 32],
    /// Factory address and data for counterfactual deployment
    pub init_code: Vec<u8>,
    /// The call the account executes
    pub call_data: Vec<u8>,
    /// `verificationGasLimit << 128 | callGasLimit`
    pub account_gas_limits: [u8; 32],
    /// Gas to compensate the bundler
    pub pre_verification_gas: [u8; 32],
    /// `maxPriorityFeePerGas << 128 | maxFeePerGas`
    pub gas_fees: [u8; 32],
    /// Paymaster address, gas limits and data
    pub paymaster_and_data: Vec<u8>,
    /// Account signature
    pub signature: Vec<u8>,
}

/// A solver's bid blob as stored in the hub's off-chain storage.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct BidBlob {
    /// The solver's account on the hub
    pub filler: [u8; 32],
    /// SCALE encoded [`PackedUserOperation`]
    pub user_op: Vec<u8>,
}

/// A bid joined from on-chain and off-chain storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FillerBid {
    /// The solver's account on the hub
    pub filler: [u8; 32],
    /// The fill operation the solver proposes
    pub user_op: PackedUserOperation,
    /// The solver's deposit backing the bid
    pub deposit: u128,
}

/// Pack two 128 bit halves into the word layout used by `accountGasLimits`
/// and `gasFees`.
pub fn pack_high_low(high: U256, low: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut buf = [0u8; 32];
    high.to_big_endian(&mut buf);
    out[..16].copy_from_slice(&buf[16..]);
    low.to_big_endian(&mut buf);
    out[16..].copy_from_slice(&buf[16..]);
    out
}

/// Split a packed word back into its `(high, low)` halves.
pub fn unpack_high_low(word: &[u8; 32]) -> (U256, U256) {
    let mut half = [0u8; 32];
    half[16..].copy_from_slice(&word[..16]);
    let high = U256::from_big_endian(&half);
    half[16..].copy_from_slice(&word[16..]);
    let low = U256::from_big_endian(&half);
    (high, low)
}

/// The EIP-712 digest a session key signs to authorize `solver` for
/// `commitment`.
pub fn select_solver_digest(
    commitment: H256,
    solver: H160,
    domain_name: &str,
    domain_version: &str,
    chain_id: u64,
    verifying_contract: H160,
) -> H256 {
    let domain = alloy_sol_types::Eip712Domain::new(
        Some(domain_name.to_string().into()),
        Some(domain_version.to_string().into()),
        Some(AlloyU256::from(chain_id)),
        Some(Address::from_slice(verifying_contract.as_bytes())),
        None,
    );
    let message = abi::SelectSolver {
        commitment: B256::from(commitment.0),
        solver: Address::from_slice(solver.as_bytes()),
    };
    H256(message.eip712_signing_hash(&domain).0)
}
