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

//! Scoped key/value persistence.
//!
//! Session keys and resumable cancellation snapshots are stored as JSON
//! documents behind a single last-write-wins interface. Large integers are
//! serialized with a tagged representation so they survive JSON's number
//! range.

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use sp_core::{H256, U256};
use std::{collections::HashMap, path::PathBuf};

/// A last-write-wins key/value store holding JSON documents.
pub trait Keyvalue: Send + Sync {
    /// Read the document under `key`.
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, anyhow::Error>;

    /// Write the document under `key`, replacing any previous value.
    fn set(&self, key: &str, value: serde_json::Value) -> Result<(), anyhow::Error>;

    /// Delete the document under `key`.
    fn remove(&self, key: &str) -> Result<(), anyhow::Error>;
}

/// An in-memory store, used by tests and short-lived processes.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, serde_json::Value>>,
}

impl Keyvalue for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, anyhow::Error> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: serde_json::Value) -> Result<(), anyhow::Error> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), anyhow::Error> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// A file-backed store; the whole map is rewritten on every mutation, which
/// is fine at the handful of entries the SDK keeps.
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, serde_json::Value>>,
}

impl FileStore {
    /// Open the store at `path`, creating it if absent.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, anyhow::Error> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(error) => Err(error)?,
        };
        Ok(Self { path, entries: RwLock::new(entries) })
    }

    fn flush(&self, entries: &HashMap<String, serde_json::Value>) -> Result<(), anyhow::Error> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec_pretty(entries)?)?;
        Ok(())
    }
}

impl Keyvalue for FileStore {
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, anyhow::Error> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: serde_json::Value) -> Result<(), anyhow::Error> {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), value);
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), anyhow::Error> {
        let mut entries = self.entries.write();
        entries.remove(key);
        self.flush(&entries)
    }
}

/// A 256 bit integer with a JSON representation of
/// `{"__type": "bigint", "value": "<decimal>"}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct BigInt(pub U256);

impl From<U256> for BigInt {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl From<u64> for BigInt {
    fn from(value: u64) -> Self {
        Self(value.into())
    }
}

impl Serialize for BigInt {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut out = serializer.serialize_struct("BigInt", 2)?;
        out.serialize_field("__type", "bigint")?;
        out.serialize_field("value", &self.0.to_string())?;
        out.end()
    }
}

impl<'de> serde::Deserialize<'de> for BigInt {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        struct Tagged {
            #[serde(rename = "__type")]
            tag: String,
            value: String,
        }
        let tagged = Tagged::deserialize(deserializer)?;
        if tagged.tag != "bigint" {
            Err(serde::de::Error::custom(format!("unexpected tag {:?}", tagged.tag)))?
        }
        let value = U256::from_dec_str(&tagged.value)
            .map_err(|e| serde::de::Error::custom(format!("invalid bigint: {e:?}")))?;
        Ok(Self(value))
    }
}

/// Typed reads and writes over a [`Keyvalue`] store.
pub struct Scoped<'a> {
    store: &'a dyn Keyvalue,
}

impl<'a> Scoped<'a> {
    /// Wrap a store.
    pub fn new(store: &'a dyn Keyvalue) -> Self {
        Self { store }
    }

    /// Read and decode the document under `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, anyhow::Error> {
        match self.store.get(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Encode and write `value` under `key`.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), anyhow::Error> {
        self.store.set(key, serde_json::to_value(value)?)
    }

    /// Delete the document under `key`.
    pub fn remove(&self, key: &str) -> Result<(), anyhow::Error> {
        self.store.remove(key)
    }
}

/// The key a session key entry is stored under: the order commitment.
pub fn session_key_entry(commitment: H256) -> String {
    format!("0x{}", hex::encode(commitment))
}

/// Keys of the persisted steps of a resumable cancellation.
pub mod cancel_keys {
    use sp_core::H256;

    /// The destination non-inclusion proof.
    pub fn dest_proof(order_id: H256) -> String {
        format!("cancel-order:0x{}:destProof", hex::encode(order_id))
    }

    /// The parsed get request snapshot.
    pub fn get_request(order_id: H256) -> String {
        format!("cancel-order:0x{}:getRequest", hex::encode(order_id))
    }

    /// The source membership proof.
    pub fn source_proof(order_id: H256) -> String {
        format!("cancel-order:0x{}:sourceProof", hex::encode(order_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bigints_round_trip_through_their_tagged_representation() {
        let value = BigInt(U256::from_dec_str("340282366920938463463374607431768211456").unwrap());
        let json = serde_json::to_value(value).unwrap();
        assert_eq!(json["__type"], "bigint");
        assert_eq!(json["value"], "340282366920938463463374607431768211456");
        let decoded: BigInt = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, value);

        // a mistagged document is rejected
        let bad = serde_json::json!({"__type": "number", "value": "1"});
        assert!(serde_json::from_value::<BigInt>(bad).is_err());
    }

    #[test]
    fn set_get_remove_lifecycle() {
        let store = MemoryStore::default();
        let scoped = Scoped::new(&store);
        let key = session_key_entry(H256::repeat_byte(3));
        scoped.set(&key, &BigInt(7u64.into())).unwrap();
        assert_eq!(scoped.get::<BigInt>(&key).unwrap(), Some(BigInt(7u64.into())));
        scoped.remove(&key).unwrap();
        assert_eq!(scoped.get::<BigInt>(&key).unwrap(), None);
    }

    #[test]
    fn file_store_survives_reopening() {
        let dir = std::env::temp_dir().join(format!("hbc-store-{}", std::process::id()));
        let path = dir.join("store.json");
        let _ = std::fs::remove_file(&path);
        {
            let store = FileStore::open(&path).unwrap();
            store.set("a", serde_json::json!({"x": 1})).unwrap();
            store.set("b", serde_json::json!("y")).unwrap();
            store.remove("b").unwrap();
        }
        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(serde_json::json!({"x": 1})));
        assert_eq!(store.get("b").unwrap(), None);
        let _ = std::fs::remove_file(&path);
    }
}
