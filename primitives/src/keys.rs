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

//! Substrate storage key derivation.
//!
//! ISMP commitments and receipts live in a dedicated child trie on substrate
//! chains; the remaining queries target regular pallet storage whose keys
//! are `twox128(pallet) ++ twox128(item) ++ hashed(key)`.

use codec::Encode;
use sp_core::H256;
use sp_crypto_hashing::{blake2_128, twox_128, twox_64};

/// The child trie the ISMP pallet keeps its commitments in.
pub const CHILD_TRIE_PREFIX: &[u8] = b":child_storage:default:ISMP";

/// Prefix for bids in the hub's off-chain storage.
pub const BID_STORAGE_PREFIX: &[u8] = b"intents::bid::";

/// Child trie key for a request commitment.
pub fn request_commitment_key(commitment: H256) -> Vec<u8> {
    let mut key = b"RequestCommitments".to_vec();
    key.extend_from_slice(commitment.as_bytes());
    key
}

/// Child trie key for a request receipt.
pub fn request_receipt_key(commitment: H256) -> Vec<u8> {
    let mut key = b"RequestReceipts".to_vec();
    key.extend_from_slice(commitment.as_bytes());
    key
}

/// Child trie key for a response commitment.
pub fn response_commitment_key(commitment: H256) -> Vec<u8> {
    let mut key = b"ResponseCommitments".to_vec();
    key.extend_from_slice(commitment.as_bytes());
    key
}

/// The hasher a pallet storage map applies to its keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageHasher {
    /// `blake2_128(key) ++ key`
    Blake2_128Concat,
    /// `twox_64(key) ++ key`
    Twox64Concat,
    /// the key itself
    Identity,
}

impl StorageHasher {
    fn hash(&self, key: &[u8]) -> Vec<u8> {
        match self {
            StorageHasher::Blake2_128Concat => {
                let mut out = blake2_128(key).to_vec();
                out.extend_from_slice(key);
                out
            }
            StorageHasher::Twox64Concat => {
                let mut out = twox_64(key).to_vec();
                out.extend_from_slice(key);
                out
            }
            StorageHasher::Identity => key.to_vec(),
        }
    }
}

/// Key of a `StorageValue` item.
pub fn storage_value_key(pallet: &str, item: &str) -> Vec<u8> {
    let mut key = twox_128(pallet.as_bytes()).to_vec();
    key.extend_from_slice(&twox_128(item.as_bytes()));
    key
}

/// Key of a `StorageMap` entry for a SCALE-encodable map key.
pub fn storage_map_key<K: Encode>(
    pallet: &str,
    item: &str,
    hasher: StorageHasher,
    key: &K,
) -> Vec<u8> {
    let mut out = storage_value_key(pallet, item);
    out.extend_from_slice(&hasher.hash(&key.encode()));
    out
}

/// Key of `timestamp.now()`, the chain's current unix time in milliseconds.
pub fn timestamp_now_key() -> Vec<u8> {
    storage_value_key("Timestamp", "Now")
}

/// Off-chain storage key for a solver's bid on an order.
pub fn bid_storage_key(commitment: H256, filler: [u8; 32]) -> Vec<u8> {
    let mut key = BID_STORAGE_PREFIX.to_vec();
    key.extend_from_slice(commitment.as_bytes());
    key.extend_from_slice(&filler);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_trie_keys_are_item_prefixed() {
        let commitment = H256::repeat_byte(7);
        let key = request_receipt_key(commitment);
        assert!(key.starts_with(b"RequestReceipts"));
        assert!(key.ends_with(commitment.as_bytes()));
        assert_eq!(key.len(), b"RequestReceipts".len() + 32);
    }

    #[test]
    fn storage_map_keys_have_the_pallet_prefix() {
        let key = storage_map_key("Ismp", "LatestStateMachineHeight", StorageHasher::Blake2_128Concat, &42u64);
        assert_eq!(&key[..16], &twox_128(b"Ismp"));
        assert_eq!(&key[16..32], &twox_128(b"LatestStateMachineHeight"));
        // blake2_128 prefix followed by the scale encoded key
        assert_eq!(&key[48..], &42u64.encode());
    }

    #[test]
    fn bid_keys_concatenate_prefix_commitment_and_filler() {
        let key = bid_storage_key(H256::repeat_byte(1), [2u8; 32]);
        assert_eq!(key.len(), BID_STORAGE_PREFIX.len() + 64);
        assert!(key.starts_with(b"intents::bid::"));
    }
}
