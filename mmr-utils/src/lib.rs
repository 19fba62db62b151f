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

//! Merkle mountain range positional arithmetic.
//!
//! An MMR is indexed by node position. Leaves are appended left to right and
//! a parent is inserted whenever two sibling subtrees of equal height exist,
//! so a forest of perfect binary trees ("peaks") commits to all leaves.
//! EVM handlers verify multiproofs against `(leaf_index, k_index)` pairs,
//! where the k-index is the leaf's rank inside its peak's subtree.

use mmr_lib::{Merge, MerkleProof, MMR};
use sp_core::H256;
use sp_crypto_hashing::keccak_256;

/// Node count arithmetic for an MMR with a given number of leaves.
pub struct NodesUtils {
    no_of_leaves: u64,
}

impl NodesUtils {
    /// Create new instance of MMR nodes utilities for given number of leaves.
    pub fn new(no_of_leaves: u64) -> Self {
        Self { no_of_leaves }
    }

    /// Calculate number of peaks in the MMR.
    pub fn number_of_peaks(&self) -> u64 {
        self.number_of_leaves().count_ones() as u64
    }

    /// Return the number of leaves in the MMR.
    pub fn number_of_leaves(&self) -> u64 {
        self.no_of_leaves
    }

    /// Calculate the total size of MMR (number of nodes). Every subtree that
    /// is not part of a larger one saves its missing right sibling, hence
    /// `2n - popcount(n)`.
    pub fn size(&self) -> u64 {
        2 * self.no_of_leaves - self.number_of_peaks()
    }
}

/// Height of the node at `pos` (0-based position, leaves have height 0).
///
/// Jump left along the peak line until `pos + 1` is all ones; the height is
/// then one less than its bit length.
pub fn node_height(pos: u64) -> u32 {
    let mut pos = pos + 1;
    while !all_ones(pos) {
        pos = jump_left(pos)
    }
    64 - pos.leading_zeros() - 1
}

/// Enumerate the peak positions of an MMR of `mmr_size` nodes, walking the
/// leftmost peak upward and then descending right across the remaining
/// non-full subtrees.
pub fn peak_positions(mmr_size: u64) -> Vec<u64> {
    if mmr_size == 0 {
        return vec![];
    }
    let (mut height, mut pos) = left_peak_height_pos(mmr_size);
    let mut peaks = vec![pos];
    while height > 0 {
        match right_peak(height, pos, mmr_size) {
            Some((next_height, next_pos)) => {
                height = next_height;
                pos = next_pos;
                peaks.push(pos);
            }
            None => break,
        }
    }
    peaks
}

/// Node position of the leaf with the given 0-based index.
pub fn leaf_index_to_pos(index: u64) -> u64 {
    2 * index - index.count_ones() as u64
}

/// Map leaf positions to their `(position, k_index)` pairs.
///
/// Each peak consumes the leaves at or below it; for those leaves the
/// k-index is accumulated by walking down from the peak, doubling per level
/// and adding one when the target lies in the right subtree. A leaf sitting
/// exactly on the left child boundary belongs to the left subtree.
pub fn mmr_position_to_k_index(mut leaves: Vec<u64>, mmr_size: u64) -> Vec<(u64, u64)> {
    let peaks = peak_positions(mmr_size);
    let mut indices = Vec::with_capacity(leaves.len());
    for peak in peaks {
        let in_peak: Vec<u64> = {
            let split = leaves.iter().position(|pos| *pos > peak).unwrap_or(leaves.len());
            leaves.drain(..split).collect()
        };
        for pos in in_peak {
            let mut height = node_height(peak);
            let mut cursor = peak;
            let mut k_index = 0u64;
            while height > 0 {
                let left_child = cursor - parent_offset(height - 1);
                k_index <<= 1;
                if pos <= left_child {
                    cursor = left_child;
                } else {
                    cursor -= 1;
                    k_index += 1;
                }
                height -= 1;
            }
            indices.push((pos, k_index));
        }
    }
    indices
}

/// Merges nodes by hashing their concatenation with keccak.
pub struct MergeKeccak;

impl Merge for MergeKeccak {
    type Item = H256;

    fn merge(lhs: &Self::Item, rhs: &Self::Item) -> mmr_lib::Result<Self::Item> {
        let mut concat = Vec::with_capacity(64);
        concat.extend_from_slice(lhs.as_bytes());
        concat.extend_from_slice(rhs.as_bytes());
        Ok(keccak_256(&concat).into())
    }
}

/// A fabricated MMR root and membership proof for an encoded request.
pub struct RootWithProof {
    /// The MMR root over the synthesized leaf set
    pub root: H256,
    /// Sibling hashes proving the request leaf
    pub proof: Vec<H256>,
    /// Index of the request leaf, always the last
    pub leaf_index: u64,
    /// K-index of the request leaf within its peak
    pub k_index: u64,
    /// Number of leaves in the tree
    pub leaf_count: u64,
    /// Number of nodes in the tree
    pub mmr_size: u64,
}

/// Build an MMR of `tree_size` leaves whose last leaf is the hash of
/// `encoded_request` and whose other leaves are synthetic variants of it,
/// returning the root and a proof for the request leaf.
pub fn generate_root_with_proof(
    encoded_request: &[u8],
    tree_size: u64,
) -> Result<RootWithProof, anyhow::Error> {
    if tree_size == 0 {
        Err(anyhow::anyhow!("Can't build an mmr without leaves"))?
    }
    let store = mmr_lib::util::MemStore::default();
    let mut mmr = MMR::<H256, MergeKeccak, _>::new(0, &store);
    for i in 0..(tree_size - 1) {
        // vary every byte so no two synthetic leaves collide
        let variant: Vec<u8> =
            encoded_request.iter().map(|byte| byte ^ (i as u8).wrapping_add(1)).collect();
        mmr.push(keccak_256(&variant).into())
            .map_err(|e| anyhow::anyhow!("Mmr push failed: {e:?}"))?;
    }
    let leaf_pos = mmr
        .push(keccak_256(encoded_request).into())
        .map_err(|e| anyhow::anyhow!("Mmr push failed: {e:?}"))?;
    let mmr_size = mmr.mmr_size();
    let root = mmr.get_root().map_err(|e| anyhow::anyhow!("Mmr root failed: {e:?}"))?;
    let proof = mmr
        .gen_proof(vec![leaf_pos])
        .map_err(|e| anyhow::anyhow!("Mmr proof generation failed: {e:?}"))?;
    let k_index = mmr_position_to_k_index(vec![leaf_pos], mmr_size)
        .pop()
        .expect("the request leaf was just pushed; qed")
        .1;

    Ok(RootWithProof {
        root,
        proof: proof.proof_items().to_vec(),
        leaf_index: tree_size - 1,
        k_index,
        leaf_count: tree_size,
        mmr_size,
    })
}

/// Verify a fabricated proof, used in tests and simulations.
pub fn verify_proof(
    root: H256,
    mmr_size: u64,
    proof_items: Vec<H256>,
    leaves: Vec<(u64, H256)>,
) -> Result<bool, anyhow::Error> {
    let proof = MerkleProof::<H256, MergeKeccak>::new(mmr_size, proof_items);
    proof
        .verify(root, leaves)
        .map_err(|e| anyhow::anyhow!("Mmr verification failed: {e:?}"))
}

fn all_ones(pos: u64) -> bool {
    pos != 0 && pos.count_zeros() == pos.leading_zeros()
}

fn jump_left(pos: u64) -> u64 {
    let bit_length = 64 - pos.leading_zeros();
    let most_significant_bit = 1 << (bit_length - 1);
    pos - (most_significant_bit - 1)
}

fn parent_offset(height: u32) -> u64 {
    2 << height
}

fn sibling_offset(height: u32) -> u64 {
    (2 << height) - 1
}

fn left_peak_height_pos(mmr_size: u64) -> (u32, u64) {
    let mut height = 1u32;
    let mut prev_pos = 0u64;
    let mut pos = peak_pos_by_height(height);
    while pos < mmr_size {
        prev_pos = pos;
        height += 1;
        pos = peak_pos_by_height(height);
    }
    (height - 1, prev_pos)
}

fn peak_pos_by_height(height: u32) -> u64 {
    (1 << (height + 1)) - 2
}

fn right_peak(mut height: u32, mut pos: u64, mmr_size: u64) -> Option<(u32, u64)> {
    pos += sibling_offset(height);
    while pos > mmr_size - 1 {
        if height == 0 {
            return None;
        }
        height -= 1;
        pos -= parent_offset(height);
    }
    Some((height, pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mmr_size_matches_the_popcount_formula() {
        for leaves in 1..=512u64 {
            let utils = NodesUtils::new(leaves);
            assert_eq!(utils.size(), 2 * leaves - leaves.count_ones() as u64);
            assert_eq!(
                peak_positions(utils.size()).len() as u64,
                leaves.count_ones() as u64,
                "wrong peak count for {leaves} leaves"
            );
        }
    }

    #[test]
    fn seven_leaves_make_eleven_nodes_with_three_peaks() {
        let utils = NodesUtils::new(7);
        assert_eq!(utils.size(), 11);
        assert_eq!(peak_positions(11), vec![6, 9, 10]);
    }

    #[test]
    fn node_heights_follow_the_insertion_order() {
        // positions:        0  1  2  3  4  5  6  7  8  9  10
        let expected = [0u32, 0, 1, 0, 0, 1, 2, 0, 0, 1, 0];
        for (pos, height) in expected.into_iter().enumerate() {
            assert_eq!(node_height(pos as u64), height, "wrong height at {pos}");
        }
    }

    #[test]
    fn leaf_positions_skip_parent_nodes() {
        let expected = [0u64, 1, 3, 4, 7, 8, 10, 11];
        for (index, pos) in expected.into_iter().enumerate() {
            assert_eq!(leaf_index_to_pos(index as u64), pos);
        }
    }

    #[test]
    fn k_indices_enumerate_each_peak_left_to_right() {
        // 7 leaves: peak 6 holds leaves 0,1,3,4; peak 9 holds 7,8; peak 10
        // holds itself.
        let leaves = vec![0, 1, 3, 4, 7, 8, 10];
        let indices = mmr_position_to_k_index(leaves, 11);
        assert_eq!(
            indices,
            vec![(0, 0), (1, 1), (3, 2), (4, 3), (7, 0), (8, 1), (10, 0)]
        );
    }

    #[test]
    fn k_indices_are_unique_within_a_peak() {
        for leaves in 1..=64u64 {
            let mmr_size = NodesUtils::new(leaves).size();
            let positions: Vec<u64> = (0..leaves).map(leaf_index_to_pos).collect();
            let indices = mmr_position_to_k_index(positions.clone(), mmr_size);
            assert_eq!(indices.len() as u64, leaves);
            // all leaves are consumed in position order
            assert_eq!(indices.iter().map(|(p, _)| *p).collect::<Vec<_>>(), positions);
        }
    }

    #[test]
    fn fabricated_proofs_verify_against_their_root() {
        for tree_size in [1u64, 2, 3, 7, 12, 31] {
            let leaf = b"encoded request".to_vec();
            let result = generate_root_with_proof(&leaf, tree_size).unwrap();
            assert_eq!(result.leaf_index, tree_size - 1);
            assert_eq!(result.mmr_size, NodesUtils::new(tree_size).size());
            let pos = leaf_index_to_pos(result.leaf_index);
            let ok = verify_proof(
                result.root,
                result.mmr_size,
                result.proof.clone(),
                vec![(pos, keccak_256(&leaf).into())],
            )
            .unwrap();
            assert!(ok, "proof for tree of {tree_size} leaves failed");
            if tree_size == 1 {
                assert!(result.proof.is_empty());
            }
        }
    }

    #[test]
    fn zero_leaves_is_invalid() {
        assert!(generate_root_with_proof(b"request", 0).is_err());
    }
}
