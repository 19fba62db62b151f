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

//! Request, response and message types as they appear on the wire.

use crate::{
    hashing::HashAlgorithm,
    state_machine::{StateMachine, StateMachineHeight},
};
use codec::{Decode, Encode};
use scale_info::TypeInfo;
use sp_core::H256;
use std::collections::BTreeMap;

/// A post request, the sending of some opaque bytes from a module on the
/// source chain to a module on the destination chain.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, TypeInfo)]
pub struct PostRequest {
    /// The source state machine of this request
    pub source: StateMachine,
    /// The destination state machine of this request
    pub dest: StateMachine,
    /// Module identifier of the sending module
    pub from: Vec<u8>,
    /// Module identifier of the receiving module
    pub to: Vec<u8>,
    /// The nonce of this request on the source chain
    pub nonce: u64,
    /// Opaque request body
    pub body: Vec<u8>,
    /// Unix timestamp in seconds after which this request can no longer be
    /// delivered
    pub timeout_timestamp: u64,
}

/// A get request, a read of some storage keys on the destination chain at a
/// given height.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, TypeInfo)]
pub struct GetRequest {
    /// The source state machine of this request
    pub source: StateMachine,
    /// The destination state machine of this request
    pub dest: StateMachine,
    /// The nonce of this request on the source chain
    pub nonce: u64,
    /// Module identifier of the sending module
    pub from: Vec<u8>,
    /// Raw storage keys to be read on the destination
    pub keys: Vec<Vec<u8>>,
    /// Height of the destination chain at which to read the keys
    pub height: u64,
    /// Opaque context returned to the requesting module alongside the values
    pub context: Vec<u8>,
    /// Unix timestamp in seconds after which this request can no longer be
    /// responded to
    pub timeout_timestamp: u64,
}

/// An ISMP request.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, TypeInfo)]
pub enum Request {
    /// A post request
    #[codec(index = 0)]
    Post(PostRequest),
    /// A get request
    #[codec(index = 1)]
    Get(GetRequest),
}

impl Request {
    /// The chain this request was dispatched from.
    pub fn source_chain(&self) -> StateMachine {
        match self {
            Request::Post(post) => post.source,
            Request::Get(get) => get.source,
        }
    }

    /// The chain this request is addressed to.
    pub fn dest_chain(&self) -> StateMachine {
        match self {
            Request::Post(post) => post.dest,
            Request::Get(get) => get.dest,
        }
    }

    /// The request nonce on its source chain.
    pub fn nonce(&self) -> u64 {
        match self {
            Request::Post(post) => post.nonce,
            Request::Get(get) => get.nonce,
        }
    }

    /// The timestamp after which this request times out.
    pub fn timeout_timestamp(&self) -> u64 {
        match self {
            Request::Post(post) => post.timeout_timestamp,
            Request::Get(get) => get.timeout_timestamp,
        }
    }
}

/// A single key/value read out of a get response.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, TypeInfo)]
pub struct StorageValue {
    /// The storage key that was read
    pub key: Vec<u8>,
    /// The value found under the key, `None` for an empty slot
    pub value: Option<Vec<u8>>,
}

/// The response to a post request.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, TypeInfo)]
pub struct PostResponse {
    /// The request that initiated this response
    pub post: PostRequest,
    /// Opaque response body
    pub response: Vec<u8>,
    /// Unix timestamp in seconds after which this response can no longer be
    /// delivered
    pub timeout_timestamp: u64,
}

/// The response to a get request.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, TypeInfo)]
pub struct GetResponse {
    /// The request that initiated this response
    pub get: GetRequest,
    /// Values read at the requested keys, in key order
    pub values: Vec<StorageValue>,
}

/// An ISMP response.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, TypeInfo)]
pub enum Response {
    /// A response to a post request
    #[codec(index = 0)]
    Post(PostResponse),
    /// A response to a get request
    #[codec(index = 1)]
    Get(GetResponse),
}

/// A state proof attesting to some facts about a counterparty chain at a
/// finalized height. The payload is family-specific: an MMR multiproof
/// envelope for requests sourced on the hub, a trie proof otherwise.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, TypeInfo)]
pub struct Proof {
    /// The height at which this proof was generated
    pub height: StateMachineHeight,
    /// Scale encoded proof payload
    pub proof: Vec<u8>,
}

/// A request message, delivering one or more post requests with a proof of
/// their inclusion on the source.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, TypeInfo)]
pub struct RequestMessage {
    /// The requests to deliver
    pub requests: Vec<PostRequest>,
    /// Membership proof for the requests
    pub proof: Proof,
    /// Account to credit with delivery fees
    pub signer: Vec<u8>,
}

/// A response message, delivering one or more responses with a proof of
/// their inclusion on the responding chain.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, TypeInfo)]
pub struct ResponseMessage {
    /// The responses to deliver
    pub responses: Vec<Response>,
    /// Membership proof for the responses
    pub proof: Proof,
    /// Account to credit with delivery fees
    pub signer: Vec<u8>,
}

/// A timeout message, proving to a chain that requests it dispatched were
/// never delivered within their timeout window.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, TypeInfo)]
pub enum TimeoutMessage {
    /// Timeout for post requests, carries a non-membership proof
    #[codec(index = 0)]
    Post {
        /// The requests that timed out
        requests: Vec<Request>,
        /// Non-membership proof of the request receipts on the destination
        timeout_proof: Proof,
    },
    /// Timeout for post responses, carries a non-membership proof
    #[codec(index = 1)]
    PostResponse {
        /// The responses that timed out
        responses: Vec<PostResponse>,
        /// Non-membership proof of the response receipts on the destination
        timeout_proof: Proof,
    },
    /// Timeout for get requests, requires no proof
    #[codec(index = 2)]
    Get {
        /// The requests that timed out
        requests: Vec<Request>,
    },
}

/// A consensus proof for updating the view of a counterparty chain.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, TypeInfo)]
pub struct ConsensusMessage {
    /// Opaque consensus proof
    pub consensus_proof: Vec<u8>,
    /// The consensus state to be updated
    pub consensus_state_id: [u8; 4],
    /// Account to credit with update fees
    pub signer: Vec<u8>,
}

/// Two conflicting consensus proofs for the same round, evidence of
/// byzantine behaviour.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, TypeInfo)]
pub struct FraudProofMessage {
    /// The first consensus proof
    pub proof_1: Vec<u8>,
    /// The conflicting consensus proof
    pub proof_2: Vec<u8>,
    /// The consensus state both proofs verify against
    pub consensus_state_id: [u8; 4],
}

/// The top level ISMP message, as handled by chain-native handlers.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, TypeInfo)]
pub enum Message {
    /// A consensus update
    #[codec(index = 0)]
    Consensus(ConsensusMessage),
    /// Evidence of byzantine behaviour
    #[codec(index = 1)]
    FraudProof(FraudProofMessage),
    /// Request delivery
    #[codec(index = 2)]
    Request(RequestMessage),
    /// Response delivery
    #[codec(index = 3)]
    Response(ResponseMessage),
    /// Request/response timeouts
    #[codec(index = 4)]
    Timeout(TimeoutMessage),
}

/// Get requests paired with the proofs the hub's state coprocessor needs to
/// both verify their dispatch and respond to them.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, TypeInfo)]
pub struct GetRequestsWithProof {
    /// The get requests
    pub requests: Vec<GetRequest>,
    /// Membership proof of the requests on their source chain
    pub source: Proof,
    /// State proof of the requested keys on the destination chain
    pub response: Proof,
    /// Account to credit with delivery fees
    pub signer: Vec<u8>,
}

/// The position of a leaf in the MMR paired with its leaf index.
#[derive(Clone, Copy, PartialEq, Eq, Encode, Decode, Debug, TypeInfo)]
pub struct LeafIndexAndPos {
    /// The 0-based leaf index
    pub leaf_index: u64,
    /// The node position of the leaf in the tree
    pub pos: u64,
}

/// An MMR multiproof envelope for a set of leaves.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, TypeInfo)]
pub struct MmrProof {
    /// Positions of the leaves the proof is for
    pub leaf_index_and_pos: Vec<LeafIndexAndPos>,
    /// Number of leaves in the MMR when the proof was generated
    pub leaf_count: u64,
    /// Proof elements, hashes of siblings on the paths to the peaks
    pub items: Vec<H256>,
}

/// A state proof read out of a substrate chain.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, TypeInfo)]
pub enum SubstrateStateProof {
    /// Proof against the overlay (child trie) root
    #[codec(index = 0)]
    OverlayProof {
        /// The hashing algorithm of the trie
        hasher: HashAlgorithm,
        /// Raw trie nodes
        storage_proof: Vec<Vec<u8>>,
    },
    /// Proof against the state root
    #[codec(index = 1)]
    StateProof {
        /// The hashing algorithm of the trie
        hasher: HashAlgorithm,
        /// Raw trie nodes
        storage_proof: Vec<Vec<u8>>,
    },
}

/// An account and storage proof read out of an EVM chain via `eth_getProof`.
///
/// Storage proofs are grouped by contract address and their nodes are
/// deduplicated on assembly.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, Default, TypeInfo)]
pub struct EvmStateProof {
    /// Merkle-patricia proof of the contract account
    pub contract_proof: Vec<Vec<u8>>,
    /// Merkle-patricia proofs of the storage slots, keyed by contract address
    pub storage_proof: BTreeMap<Vec<u8>, Vec<Vec<u8>>>,
}

/// A fully formed message ready to be encoded for a chain-native handler.
/// Constructed by the tracker when advancing a stage and consumed by a chain
/// adapter; never persisted.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum IsmpMessage {
    /// Deliver post requests to their destination
    PostRequest {
        /// The requests to deliver
        requests: Vec<PostRequest>,
        /// Membership proof on the proving chain
        proof: Proof,
        /// Account to credit with delivery fees
        signer: Vec<u8>,
    },
    /// Deliver get requests to the hub's state coprocessor
    GetRequest {
        /// The get requests
        requests: Vec<GetRequest>,
        /// Membership proof of the requests on their source chain
        source_proof: Proof,
        /// State proof of the requested keys on the destination chain
        response_proof: Proof,
        /// Account to credit with delivery fees
        signer: Vec<u8>,
    },
    /// Deliver get responses back to the requesting chain
    GetResponse {
        /// The responses to deliver
        responses: Vec<GetResponse>,
        /// Membership proof on the proving chain
        proof: Proof,
        /// Account to credit with delivery fees
        signer: Vec<u8>,
    },
    /// Prove the non-delivery of post requests back on their source
    TimeoutPostRequest {
        /// The requests that timed out
        requests: Vec<PostRequest>,
        /// Non-membership proof of the request receipts
        proof: Proof,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::StateMachineId;

    fn sample_post() -> PostRequest {
        PostRequest {
            source: StateMachine::Evm(97),
            dest: StateMachine::Polkadot(3367),
            from: vec![0xaa; 20],
            to: vec![0xbb; 32],
            nonce: 7,
            body: vec![0xcc; 48],
            timeout_timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn messages_round_trip_through_scale() {
        let proof = Proof {
            height: StateMachineHeight {
                id: StateMachineId {
                    state_id: StateMachine::Polkadot(3367),
                    consensus_state_id: *b"PARA",
                },
                height: 42,
            },
            proof: vec![1, 2, 3],
        };
        let messages = vec![
            Message::Request(RequestMessage {
                requests: vec![sample_post()],
                proof: proof.clone(),
                signer: vec![0u8; 32],
            }),
            Message::Timeout(TimeoutMessage::Post {
                requests: vec![Request::Post(sample_post())],
                timeout_proof: proof.clone(),
            }),
            Message::Timeout(TimeoutMessage::Get {
                requests: vec![Request::Post(sample_post())],
            }),
            Message::Consensus(ConsensusMessage {
                consensus_proof: vec![9; 16],
                consensus_state_id: *b"ETH0",
                signer: vec![],
            }),
        ];
        for message in messages {
            let decoded = Message::decode(&mut &*message.encode()).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn mmr_envelope_round_trips() {
        let envelope = MmrProof {
            leaf_index_and_pos: vec![LeafIndexAndPos { leaf_index: 6, pos: 10 }],
            leaf_count: 7,
            items: vec![H256::repeat_byte(1), H256::repeat_byte(2)],
        };
        let decoded = MmrProof::decode(&mut &*envelope.encode()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn substrate_proof_envelope_is_tagged_by_hasher() {
        let proof = SubstrateStateProof::OverlayProof {
            hasher: HashAlgorithm::Blake2,
            storage_proof: vec![vec![1, 2], vec![3]],
        };
        let encoded = proof.encode();
        // variant index, then the hasher tag
        assert_eq!(&encoded[..2], &[0, 1]);
        assert_eq!(SubstrateStateProof::decode(&mut &*encoded).unwrap(), proof);
    }
}
