// Copyright 2022 Jeremy Wall (Jeremy@marzhilsltudios.com)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! The content-addressed [`ChunkStore`]: a deduplicated blob table keyed by
//! SHA-256. This is the same shape as the merkle-dag lineage's `Store<HW>`
//! trait (`contains`/`get`/`store`), specialized here to a dense append-only
//! table rather than a generic KV backend, since chunk ids in an envelope
//! are small integers assigned in first-seen order rather than
//! content-derived ids.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::sha256_hex;

/// Small integer identifying a chunk within one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkId(pub u32);

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A frozen, content-addressed blob: its declared SHA-256 must equal the
/// hash of its bytes, verified unconditionally on decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: ChunkId,
    pub sha256: String,
    pub size: u64,
    #[serde(with = "crate::base64_bytes")]
    pub data: Vec<u8>,
}

/// Deduplicated blob table. `intern` is idempotent: equal bytes always
/// return the same chunk id no matter how many times they're interned.
#[derive(Debug, Default)]
pub struct ChunkStore {
    by_hash: HashMap<String, ChunkId>,
    records: Vec<ChunkRecord>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert bytes into the store, returning their chunk id. Equal bytes
    /// (by SHA-256) always yield the same id.
    pub fn intern(&mut self, bytes: &[u8]) -> ChunkId {
        self.intern_with_digest(bytes, sha256_hex(bytes))
    }

    /// As `intern`, but with the SHA-256 already computed -- the entry
    /// point `intern_split` uses once hashing has (optionally) happened off
    /// the main thread, so the digest isn't computed twice.
    fn intern_with_digest(&mut self, bytes: &[u8], digest: String) -> ChunkId {
        if let Some(id) = self.by_hash.get(&digest) {
            return *id;
        }
        let id = ChunkId(self.records.len() as u32);
        self.records.push(ChunkRecord {
            id,
            sha256: digest.clone(),
            size: bytes.len() as u64,
            data: bytes.to_vec(),
        });
        self.by_hash.insert(digest, id);
        id
    }

    /// Split `bytes` into fixed-size pieces no larger than `threshold` and
    /// intern each independently, returning the ordered sub-chunk ids.
    /// Bytes at or under the threshold occupy a single chunk.
    ///
    /// Chunks are independent and commute (spec's resource model: "the
    /// encoder may optionally use multiple worker threads for per-chunk
    /// hashing"), so with the `parallel-hash` feature the SHA-256 digests
    /// for a multi-piece split are computed across a `rayon` thread pool;
    /// id assignment itself stays on the calling thread and in piece order,
    /// since "first-seen" dedup requires a single sequential pass.
    pub fn intern_split(&mut self, bytes: &[u8], threshold: usize) -> Vec<ChunkId> {
        if bytes.len() <= threshold || threshold == 0 {
            return vec![self.intern(bytes)];
        }
        let pieces: Vec<&[u8]> = bytes.chunks(threshold).collect();
        let digests = Self::hash_pieces(&pieces);
        pieces
            .into_iter()
            .zip(digests)
            .map(|(piece, digest)| self.intern_with_digest(piece, digest))
            .collect()
    }

    #[cfg(feature = "parallel-hash")]
    fn hash_pieces(pieces: &[&[u8]]) -> Vec<String> {
        use rayon::prelude::*;
        pieces.par_iter().map(|piece| sha256_hex(piece)).collect()
    }

    #[cfg(not(feature = "parallel-hash"))]
    fn hash_pieces(pieces: &[&[u8]]) -> Vec<String> {
        pieces.iter().map(|piece| sha256_hex(piece)).collect()
    }

    pub fn get(&self, id: ChunkId) -> Option<&[u8]> {
        self.records.get(id.0 as usize).map(|r| r.data.as_slice())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consume the store, handing back its records in id order for
    /// inclusion in an envelope document.
    pub fn into_records(self) -> Vec<ChunkRecord> {
        self.records
    }

    /// Rebuild a lookup table from decoded records, verifying every
    /// chunk's declared hash against its bytes. Fails fast: a single
    /// mismatch fails the whole load.
    pub fn from_records(records: Vec<ChunkRecord>) -> Result<Self, ChunkId> {
        let mut by_hash = HashMap::new();
        for record in &records {
            if sha256_hex(&record.data) != record.sha256 {
                return Err(record.id);
            }
            by_hash.insert(record.sha256.clone(), record.id);
        }
        Ok(Self {
            by_hash,
            records,
        })
    }

    /// Assemble the bytes referenced by an ordered sub-chunk id list.
    pub fn assemble(&self, ids: &[ChunkId]) -> Option<Vec<u8>> {
        let mut out = Vec::new();
        for id in ids {
            out.extend_from_slice(self.get(*id)?);
        }
        Some(out)
    }
}
