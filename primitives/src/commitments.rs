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

//! Request commitments.
//!
//! A commitment is the keccak hash of a request's tightly packed fields and
//! uniquely identifies the request across every chain it touches. State
//! machine identifiers enter the hash as their UTF-8 string form, numeric
//! fields as big-endian bytes.

use crate::messages::{GetRequest, PostRequest, Request};
use sp_core::H256;
use sp_crypto_hashing::keccak_256;

/// Compute the commitment for a post request.
pub fn hash_post_request(req: &PostRequest) -> H256 {
    let mut buf = Vec::new();
    buf.extend_from_slice(req.source.to_string().as_bytes());
    buf.extend_from_slice(req.dest.to_string().as_bytes());
    buf.extend_from_slice(&req.nonce.to_be_bytes());
    buf.extend_from_slice(&req.timeout_timestamp.to_be_bytes());
    buf.extend_from_slice(&req.from);
    buf.extend_from_slice(&req.to);
    buf.extend_from_slice(&req.body);
    keccak_256(&buf).into()
}

/// Compute the commitment for a get request.
pub fn hash_get_request(req: &GetRequest) -> H256 {
    let mut buf = Vec::new();
    buf.extend_from_slice(req.source.to_string().as_bytes());
    buf.extend_from_slice(req.dest.to_string().as_bytes());
    buf.extend_from_slice(&req.nonce.to_be_bytes());
    buf.extend_from_slice(&req.height.to_be_bytes());
    buf.extend_from_slice(&req.timeout_timestamp.to_be_bytes());
    buf.extend_from_slice(&req.from);
    for key in &req.keys {
        buf.extend_from_slice(key);
    }
    buf.extend_from_slice(&req.context);
    keccak_256(&buf).into()
}

/// Compute the commitment for either kind of request.
pub fn hash_request(req: &Request) -> H256 {
    match req {
        Request::Post(post) => hash_post_request(post),
        Request::Get(get) => hash_get_request(get),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::StateMachine;

    #[test]
    fn post_request_commitment_packs_fields_in_order() {
        let req = PostRequest {
            source: StateMachine::Evm(1),
            dest: StateMachine::Evm(2),
            nonce: 5,
            timeout_timestamp: 1_000,
            from: vec![0xaa],
            to: vec![0xbb],
            body: vec![0xcc],
        };
        let mut packed = Vec::new();
        packed.extend_from_slice(b"EVM-1");
        packed.extend_from_slice(b"EVM-2");
        packed.extend_from_slice(&5u64.to_be_bytes());
        packed.extend_from_slice(&1_000u64.to_be_bytes());
        packed.extend_from_slice(&[0xaa, 0xbb, 0xcc]);
        assert_eq!(hash_post_request(&req), H256(keccak_256(&packed)));
    }

    #[test]
    fn commitments_are_stable_across_reencoding() {
        use codec::{Decode, Encode};
        let req = PostRequest {
            source: StateMachine::Polkadot(3367),
            dest: StateMachine::Substrate(*b"cere"),
            nonce: 42,
            timeout_timestamp: 9_999,
            from: vec![0x11; 32],
            to: vec![0x22; 20],
            body: vec![0x33; 64],
        };
        let decoded = PostRequest::decode(&mut &*req.encode()).unwrap();
        assert_eq!(hash_post_request(&decoded), hash_post_request(&req));
    }

    #[test]
    fn get_request_commitment_concatenates_keys() {
        let req = GetRequest {
            source: StateMachine::Polkadot(3367),
            dest: StateMachine::Evm(97),
            nonce: 1,
            from: vec![0x01; 20],
            keys: vec![vec![0x02; 32], vec![0x03; 32]],
            height: 99,
            context: vec![0x04],
            timeout_timestamp: 2_000,
        };
        let mut packed = Vec::new();
        packed.extend_from_slice(b"POLKADOT-3367");
        packed.extend_from_slice(b"EVM-97");
        packed.extend_from_slice(&1u64.to_be_bytes());
        packed.extend_from_slice(&99u64.to_be_bytes());
        packed.extend_from_slice(&2_000u64.to_be_bytes());
        packed.extend_from_slice(&[0x01; 20]);
        packed.extend_from_slice(&[0x02; 32]);
        packed.extend_from_slice(&[0x03; 32]);
        packed.extend_from_slice(&[0x04]);
        assert_eq!(hash_get_request(&req), H256(keccak_256(&packed)));
    }
}
