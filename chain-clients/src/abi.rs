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

//! Solidity rust bindings
#![allow(missing_docs)]

use alloy_sol_macro::sol;

sol! {
    struct StateMachineHeight {
        // the state machine identifier
        uint256 stateMachineId;
        // height of this state machine
        uint256 height;
    }

    struct Proof {
        // height of the state machine
        StateMachineHeight height;
        // the multiproof
        bytes32[] multiproof;
        // The total number of leaves in the mmr for this proof.
        uint256 leafCount;
    }

    struct PostRequest {
        // the source state machine of this request as utf8 string bytes
        bytes source;
        // the destination state machine of this request as utf8 string bytes
        bytes dest;
        // request nonce
        uint64 nonce;
        // Module Id of this request origin
        bytes from;
        // destination module id
        bytes to;
        // timestamp by which this request times out.
        uint64 timeoutTimestamp;
        // request body
        bytes body;
    }

    struct PostRequestLeaf {
        // The request
        PostRequest request;
        // Its index in the mmr
        uint256 index;
        // Its k-index within its peak
        uint256 kIndex;
    }

    struct PostRequestMessage {
        // proof for the requests
        Proof proof;
        // the requests, contained in the merkle mountain range tree
        PostRequestLeaf[] requests;
    }

    struct PostRequestTimeoutMessage {
        // requests which have timed-out
        PostRequest[] timeouts;
        // the height of the state machine proving the timeouts
        StateMachineHeight height;
        // non-membership proof of the request receipts
        bytes[] proof;
    }

    struct GetRequest {
        // the source state machine of this request as utf8 string bytes
        bytes source;
        // the destination state machine of this request as utf8 string bytes
        bytes dest;
        // request nonce
        uint64 nonce;
        // Module Id of this request origin
        bytes from;
        // timestamp by which this request times out.
        uint64 timeoutTimestamp;
        // raw storage keys
        bytes[] keys;
        // height at which to read the destination state machine
        uint64 height;
        // opaque context returned alongside the response
        bytes context;
    }

    struct StorageValue {
        bytes key;
        bytes value;
    }

    struct GetResponse {
        // The request that initiated this response
        GetRequest request;
        // storage values for the requested keys
        StorageValue[] values;
    }

    struct GetResponseLeaf {
        // The response
        GetResponse response;
        // Its index in the mmr
        uint256 index;
        // Its k-index within its peak
        uint256 kIndex;
    }

    struct GetResponseMessage {
        // proof for the responses
        Proof proof;
        // the responses, contained in the merkle mountain range tree
        GetResponseLeaf[] responses;
    }

    function handlePostRequests(address host, PostRequestMessage memory request) external;
    function handlePostRequestTimeouts(address host, PostRequestTimeoutMessage memory message) external;
    function handleGetResponses(address host, GetResponseMessage memory message) external;

    // EvmHost views consumed by the adapter
    function timestamp() external view returns (uint256);
    function challengePeriod() external view returns (uint256);
    function latestStateMachineHeight(uint256 id) external view returns (uint256);
    function hostParams() external view returns (bytes memory);

    event GetRequestEvent(
        bytes source,
        bytes dest,
        bytes from,
        bytes[] keys,
        uint256 indexed nonce,
        uint256 height,
        uint256 timeoutTimestamp,
        bytes context,
        uint256 fee
    );
}

sol! {
    // Intent gateway order shapes. The order commitment is the keccak hash
    // of `abi.encode(order)`.
    struct TokenAmount {
        // token identifier, zero for the native token
        bytes32 token;
        // amount of the token
        uint256 amount;
    }

    struct PaymentInfo {
        // assets to be paid out on the destination
        TokenAmount[] assets;
        // account the assets are paid to
        bytes32 beneficiary;
    }

    struct DispatchInfo {
        // module receiving the dispatch on the destination
        bytes32 module;
        // dispatch timeout in seconds
        uint64 timeout;
        // fee paid to the protocol for the dispatch
        uint256 fee;
        // opaque dispatch payload
        bytes payload;
    }

    struct Order {
        // account placing the order
        bytes32 user;
        // source state machine as utf8 string bytes
        bytes sourceChain;
        // destination state machine as utf8 string bytes
        bytes destChain;
        // timestamp after which the order can be cancelled
        uint256 deadline;
        // order nonce on the gateway
        uint256 nonce;
        // fees escrowed for the filler
        uint256 fees;
        // ephemeral session key authorized to select a solver
        address session;
        // dispatch executed before funds are released
        DispatchInfo predispatch;
        // escrowed input assets
        TokenAmount[] inputs;
        // requested output payment
        PaymentInfo output;
    }

    struct FillOptions {
        // fee paid to the relayer delivering the fill receipt
        uint256 relayerFee;
    }

    struct CancelOptions {
        // fee paid to the relayer delivering the cancellation
        uint256 relayerFee;
        // destination height the non-inclusion proof is read at
        uint64 height;
    }

    function placeOrder(Order memory order, bytes32 graffiti) external payable;
    function fillOrder(Order memory order, FillOptions memory options) external payable;
    function cancelOrder(Order memory order, CancelOptions memory options) external;
    function select(bytes32 commitment, address solver, bytes memory signature) external;

    event OrderPlaced(
        bytes32 indexed user,
        uint256 nonce,
        uint256 fees,
        TokenAmount[] inputs
    );

    event OrderFilled(bytes32 indexed commitment, address indexed filler);

    event PartialFill(bytes32 indexed commitment, address indexed filler);

    event EscrowRefunded(bytes32 indexed commitment, address indexed user);

    // the struct a session key signs over to authorize a solver
    struct SelectSolver {
        bytes32 commitment;
        address solver;
    }
}

sol! {
    // account abstraction v0.7 packed user operation
    struct PackedUserOperation {
        address sender;
        uint256 nonce;
        bytes initCode;
        bytes callData;
        // verificationGasLimit << 128 | callGasLimit
        bytes32 accountGasLimits;
        uint256 preVerificationGas;
        // maxPriorityFeePerGas << 128 | maxFeePerGas
        bytes32 gasFees;
        bytes paymasterAndData;
        bytes signature;
    }

    // the batch executor a solver account routes its calls through
    struct Call {
        address target;
        uint256 value;
        bytes data;
    }

    function execute(Call[] memory calls) external payable;
}
