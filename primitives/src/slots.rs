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

//! EVM storage slot derivation for the host and intent gateway contracts.
//!
//! Solidity stores a `mapping(K => V)` entry for key `K` declared at slot
//! `S` under `keccak(K || uint256(S))`; nested mappings apply the derivation
//! once per key, and struct fields live at the derived slot plus their field
//! offset.

use sp_core::{H256, U256};
use sp_crypto_hashing::keccak_256;

/// Slot of the request commitments mapping on the EVM host.
pub const REQUEST_COMMITMENTS_SLOT: u64 = 0;
/// Slot of the response commitments mapping on the EVM host.
pub const RESPONSE_COMMITMENTS_SLOT: u64 = 1;
/// Slot of the request receipts mapping on the EVM host.
pub const REQUEST_RECEIPTS_SLOT: u64 = 2;
/// Slot of the response receipts mapping on the EVM host.
pub const RESPONSE_RECEIPTS_SLOT: u64 = 3;
/// Slot of the state commitments double mapping on the EVM host.
pub const STATE_COMMITMENTS_SLOT: u64 = 5;

/// Field offsets of the state commitment struct.
pub mod state_commitment_field {
    /// Unix timestamp at which the commitment was stored.
    pub const TIMESTAMP: u64 = 0;
    /// The overlay (mmr) root.
    pub const OVERLAY_ROOT: u64 = 1;
    /// The state trie root.
    pub const STATE_ROOT: u64 = 2;
}

/// Derive the storage slot for `key` in the mapping declared at `slot`.
pub fn map_slot(key: &[u8], slot: u64) -> H256 {
    let mut buf = Vec::with_capacity(key.len() + 32);
    buf.extend_from_slice(key);
    buf.extend_from_slice(&u256_bytes(slot.into()));
    keccak_256(&buf).into()
}

/// Derive the storage slot for `(key1, key2)` in the nested mapping declared
/// at `slot`.
pub fn double_map_slot(key1: &[u8], key2: &[u8], slot: u64) -> H256 {
    let inner = map_slot(key1, slot);
    let mut buf = Vec::with_capacity(key2.len() + 32);
    buf.extend_from_slice(key2);
    buf.extend_from_slice(inner.as_bytes());
    keccak_256(&buf).into()
}

/// Offset a derived slot by a struct field index, wrapping mod 2^256.
pub fn slot_with_offset(slot: H256, offset: u64) -> H256 {
    let (sum, _) = U256::from_big_endian(slot.as_bytes()).overflowing_add(offset.into());
    let mut out = [0u8; 32];
    sum.to_big_endian(&mut out);
    H256(out)
}

/// The two adjacent words holding a request commitment's metadata.
///
/// Returns `(slot1, slot2)` where `slot2` is the derived slot and `slot1`
/// is `slot2 + 1`.
pub fn commitment_slots(commitment: H256) -> (H256, H256) {
    let derived = map_slot(commitment.as_bytes(), REQUEST_COMMITMENTS_SLOT);
    (slot_with_offset(derived, 1), derived)
}

/// The slot of the request receipt for `commitment` on the EVM host.
pub fn request_receipt_slot(commitment: H256) -> H256 {
    map_slot(commitment.as_bytes(), REQUEST_RECEIPTS_SLOT)
}

/// A field of the state commitment stored for `state_machine_id` at `height`.
pub fn state_commitment_slot(state_machine_id: u64, height: u64, field: u64) -> H256 {
    let base = double_map_slot(
        &u256_bytes(state_machine_id.into()),
        &u256_bytes(height.into()),
        STATE_COMMITMENTS_SLOT,
    );
    slot_with_offset(base, field)
}

/// Big-endian 32 byte representation of `value`.
pub fn u256_bytes(value: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    value.to_big_endian(&mut out);
    out
}
