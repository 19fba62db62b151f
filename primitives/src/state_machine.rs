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

//! State machine identifiers and their string representation.

use codec::{Decode, Encode};
use core::{fmt, str::FromStr};
use scale_info::TypeInfo;

/// A unique identifier for a state machine participating in the protocol.
///
/// The string form is `"<FAMILY>-<value>"`, decimal for the numeric variants
/// and UTF-8 text for the byte-tagged variants, e.g. `"EVM-97"`,
/// `"POLKADOT-3367"`, `"SUBSTRATE-cere"`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Debug, TypeInfo)]
pub enum StateMachine {
    /// Evm chains, identified by their chain id
    #[codec(index = 0)]
    Evm(u32),
    /// Polkadot parachains, identified by their para id
    #[codec(index = 1)]
    Polkadot(u32),
    /// Kusama parachains, identified by their para id
    #[codec(index = 2)]
    Kusama(u32),
    /// Standalone substrate chains, identified by a 4 byte tag
    #[codec(index = 3)]
    Substrate([u8; 4]),
    /// Tendermint chains, identified by a 4 byte tag
    #[codec(index = 4)]
    Tendermint([u8; 4]),
}

impl StateMachine {
    /// Returns true if this is an EVM-family chain.
    pub fn is_evm(&self) -> bool {
        matches!(self, StateMachine::Evm(_))
    }

    /// Returns true if this is a substrate-family chain.
    pub fn is_substrate(&self) -> bool {
        matches!(
            self,
            StateMachine::Polkadot(_) | StateMachine::Kusama(_) | StateMachine::Substrate(_)
        )
    }
}

impl fmt::Display for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateMachine::Evm(id) => write!(f, "EVM-{id}"),
            StateMachine::Polkadot(id) => write!(f, "POLKADOT-{id}"),
            StateMachine::Kusama(id) => write!(f, "KUSAMA-{id}"),
            StateMachine::Substrate(tag) => {
                write!(f, "SUBSTRATE-{}", String::from_utf8_lossy(tag))
            }
            StateMachine::Tendermint(tag) => {
                write!(f, "TENDERMINT-{}", String::from_utf8_lossy(tag))
            }
        }
    }
}

/// Error returned when parsing a state machine identifier fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown state machine: {0}")]
pub struct ParseError(pub String);

impl FromStr for StateMachine {
    type Err = ParseError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let (family, value) =
            name.split_once('-').ok_or_else(|| ParseError(name.to_string()))?;
        let state_machine = match family {
            "EVM" => {
                StateMachine::Evm(value.parse().map_err(|_| ParseError(name.to_string()))?)
            }
            "POLKADOT" => {
                StateMachine::Polkadot(value.parse().map_err(|_| ParseError(name.to_string()))?)
            }
            "KUSAMA" => {
                StateMachine::Kusama(value.parse().map_err(|_| ParseError(name.to_string()))?)
            }
            "SUBSTRATE" => StateMachine::Substrate(byte_tag(value, name)?),
            "TENDERMINT" => StateMachine::Tendermint(byte_tag(value, name)?),
            _ => Err(ParseError(name.to_string()))?,
        };
        Ok(state_machine)
    }
}

fn byte_tag(value: &str, name: &str) -> Result<[u8; 4], ParseError> {
    let bytes = value.as_bytes();
    if bytes.len() != 4 {
        Err(ParseError(name.to_string()))?
    }
    let mut tag = [0u8; 4];
    tag.copy_from_slice(bytes);
    Ok(tag)
}

impl serde::Serialize for StateMachine {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for StateMachine {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Identifies a state machine and the consensus client that tracks it.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Encode,
    Decode,
    Debug,
    TypeInfo,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct StateMachineId {
    /// The state machine identifier
    pub state_id: StateMachine,
    /// Consensus state id for the consensus client tracking this state machine
    pub consensus_state_id: [u8; 4],
}

/// A finalized view of one chain on another.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Encode,
    Decode,
    Debug,
    TypeInfo,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct StateMachineHeight {
    /// The state machine identifier
    pub id: StateMachineId,
    /// Finalized block height
    pub height: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_identifiers() {
        assert_eq!("EVM-97".parse::<StateMachine>().unwrap(), StateMachine::Evm(97));
        assert_eq!("POLKADOT-3367".parse::<StateMachine>().unwrap(), StateMachine::Polkadot(3367));
        assert_eq!("KUSAMA-2000".parse::<StateMachine>().unwrap(), StateMachine::Kusama(2000));
        assert_eq!(
            "SUBSTRATE-cere".parse::<StateMachine>().unwrap(),
            StateMachine::Substrate(*b"cere")
        );
        assert_eq!(
            "SUBSTRATE-cere".parse::<StateMachine>().unwrap(),
            StateMachine::Substrate([0x63, 0x65, 0x72, 0x65])
        );
    }

    #[test]
    fn rejects_malformed_identifiers() {
        for name in ["EVM", "EVM-", "EVM-abc", "SUBSTRATE-toolong", "SOLANA-1", "-42"] {
            assert!(name.parse::<StateMachine>().is_err(), "{name} should not parse");
        }
    }

    #[test]
    fn display_is_an_inverse_of_parsing() {
        let machines = [
            StateMachine::Evm(1),
            StateMachine::Polkadot(3367),
            StateMachine::Kusama(2000),
            StateMachine::Substrate(*b"cere"),
            StateMachine::Tendermint(*b"celo"),
        ];
        for machine in machines {
            assert_eq!(machine.to_string().parse::<StateMachine>().unwrap(), machine);
        }
    }
}
