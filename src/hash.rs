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
//! Hashing abstraction used by the [chunk store](crate::chunk::ChunkStore).
//!
//! Kept as a trait, rather than calling `sha2` directly everywhere, so the
//! content-addressing scheme stays swappable the same way it was in the
//! merkle-dag lineage this crate grew out of.

use sha2::{Digest, Sha256};

/// Record bytes into a running hash and read back the digest.
///
/// Implementations are expected to be stateful: `hash()` may be called
/// multiple times while more bytes are still being recorded.
pub trait HashWriter: Default {
    fn record<I: Iterator<Item = u8>>(&mut self, bs: I);
    fn hash(&self) -> Vec<u8>;
}

/// SHA-256 [`HashWriter`]. The envelope format commits to SHA-256 hex
/// digests for chunk content addresses.
#[derive(Default, Clone)]
pub struct Sha256Writer(Sha256);

impl HashWriter for Sha256Writer {
    fn record<I: Iterator<Item = u8>>(&mut self, bs: I) {
        let buf: Vec<u8> = bs.collect();
        self.0.update(&buf);
    }

    fn hash(&self) -> Vec<u8> {
        self.0.clone().finalize().to_vec()
    }
}

/// One-shot SHA-256 hex digest of a byte slice, routed through
/// [`Sha256Writer`] so the [`ChunkStore`](crate::chunk::ChunkStore)'s
/// hashing goes through the same swappable-backend seam the merkle-dag
/// lineage used, rather than calling `sha2` directly.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut writer = Sha256Writer::default();
    writer.record(bytes.iter().copied());
    hex_encode(&writer.hash())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
