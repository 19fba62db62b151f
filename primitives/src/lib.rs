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

//! ISMP data model, codecs and hash primitives for the Hyperbridge client.

#![deny(missing_docs)]

pub mod commitments;
pub mod hashing;
pub mod keys;
pub mod messages;
pub mod slots;
pub mod state_machine;

pub use commitments::{hash_get_request, hash_post_request, hash_request};
pub use hashing::HashAlgorithm;
pub use messages::{
    ConsensusMessage, EvmStateProof, FraudProofMessage, GetRequest, GetRequestsWithProof,
    GetResponse, IsmpMessage, LeafIndexAndPos, Message, MmrProof, PostRequest, PostResponse,
    Proof, Request, RequestMessage, Response, ResponseMessage, StorageValue, SubstrateStateProof,
    TimeoutMessage,
};
pub use state_machine::{StateMachine, StateMachineHeight, StateMachineId};

/// 32 byte hash type used for commitments and state roots.
pub type H256 = sp_core::H256;
/// 20 byte type for EVM addresses.
pub type H160 = sp_core::H160;
