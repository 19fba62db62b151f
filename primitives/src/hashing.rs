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

//! Hasher selection for state proofs.

use codec::{Decode, Encode};
use scale_info::TypeInfo;
use sp_core::H256;

/// The hashing algorithm a chain applies to its state trie.
///
/// EVM chains and the hub hash with keccak; standalone substrate chains
/// typically hash with Blake2. Which chains are keccak-hashed is a
/// configuration input, not a hard-coded lookup.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Encode,
    Decode,
    Debug,
    TypeInfo,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum HashAlgorithm {
    /// The keccak-256 hash function
    #[codec(index = 0)]
    Keccak,
    /// The Blake2b-256 hash function
    #[codec(index = 1)]
    Blake2,
}

impl HashAlgorithm {
    /// Hash `bytes` with the selected algorithm.
    pub fn hash(&self, bytes: &[u8]) -> H256 {
        match self {
            HashAlgorithm::Keccak => keccak_256(bytes),
            HashAlgorithm::Blake2 => sp_crypto_hashing::blake2_256(bytes).into(),
        }
    }
}

/// Compute the keccak-256 hash of `bytes`.
pub fn keccak_256(bytes: &[u8]) -> H256 {
    sp_crypto_hashing::keccak_256(bytes).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn known_digests() {
        // keccak256("") and blake2b_256("")
        assert_eq!(
            HashAlgorithm::Keccak.hash(b""),
            H256(hex!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"))
        );
        assert_eq!(
            HashAlgorithm::Blake2.hash(b""),
            H256(hex!("0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"))
        );
    }
}
