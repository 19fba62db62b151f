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

//! Ephemeral session keys.
//!
//! A session key authorizes exactly one solver selection for one order. It
//! is pure data: a private key blob and its EVM address, stored under the
//! order commitment and signed with as a pure function of the digest.

use anyhow::anyhow;
use sp_core::{ecdsa, Pair, H160, H256};
use sp_crypto_hashing::keccak_256;

/// A session signing key and its EVM address.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionKey {
    /// The private key seed
    pub private_key: H256,
    /// EVM address of the corresponding public key
    pub address: H160,
}

impl SessionKey {
    /// Generate a fresh session key.
    pub fn generate() -> Result<Self, anyhow::Error> {
        let (pair, seed) = ecdsa::Pair::generate();
        Ok(Self { private_key: H256(seed), address: evm_address(&pair.public())? })
    }

    /// Reconstruct the signing pair from the stored seed.
    fn pair(&self) -> Result<ecdsa::Pair, anyhow::Error> {
        ecdsa::Pair::from_seed_slice(self.private_key.as_bytes())
            .map_err(|e| anyhow!("invalid session key seed: {e:?}"))
    }

    /// Sign a 32 byte digest, returning the 65 byte `r || s || v` signature
    /// with the recovery id offset to 27 as EVM verifiers expect.
    pub fn sign_digest(&self, digest: H256) -> Result<[u8; 65], anyhow::Error> {
        let signature = self.pair()?.sign_prehashed(&digest.0);
        let mut out: [u8; 65] = AsRef::<[u8]>::as_ref(&signature)
            .try_into()
            .map_err(|_| anyhow!("ecdsa signatures are 65 bytes; qed"))?;
        out[64] += 27;
        Ok(out)
    }
}

/// Derive the EVM address of a compressed secp256k1 public key.
pub fn evm_address(public: &ecdsa::Public) -> Result<H160, anyhow::Error> {
    let compressed: &[u8; 33] = AsRef::<[u8]>::as_ref(public)
        .try_into()
        .map_err(|_| anyhow!("compressed public keys are 33 bytes; qed"))?;
    let uncompressed = libsecp256k1::PublicKey::parse_compressed(compressed)
        .map_err(|e| anyhow!("invalid public key: {e:?}"))?
        .serialize();
    // drop the 0x04 prefix, the address is the tail of the keccak digest
    let digest = keccak_256(&uncompressed[1..]);
    Ok(H160::from_slice(&digest[12..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_sign_recoverably() {
        let key = SessionKey::generate().unwrap();
        let digest = H256(keccak_256(b"select solver"));
        let signature = key.sign_digest(digest).unwrap();
        assert!(signature[64] == 27 || signature[64] == 28);

        // recovering the signer yields the session address
        let recovery = libsecp256k1::RecoveryId::parse(signature[64] - 27).unwrap();
        let sig = libsecp256k1::Signature::parse_standard_slice(&signature[..64]).unwrap();
        let message = libsecp256k1::Message::parse(&digest.0);
        let public = libsecp256k1::recover(&message, &sig, &recovery).unwrap();
        let uncompressed = public.serialize();
        let derived = H160::from_slice(&keccak_256(&uncompressed[1..])[12..]);
        assert_eq!(derived, key.address);
    }

    #[test]
    fn known_key_derives_known_address() {
        // the well-known dev key
        let pair = ecdsa::Pair::from_seed_slice(&[0x01; 32]).unwrap();
        let address = evm_address(&pair.public()).unwrap();
        assert_eq!(
            address,
            H160::from_slice(&hex::decode("1a642f0e3c3af545e7acbd38b07251b3990914f1").unwrap())
        );
    }
}
