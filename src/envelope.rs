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
//! Envelope framing: outer to inner, a zstd-compressed byte stream wrapping
//! a textual UTF-8 JSON [`Document`](crate::document::Document). No magic
//! header beyond zstd's own frame header is added; any decompression
//! failure, JSON parse failure, or structural violation fails the load as
//! `MalformedEnvelope`.

use crate::document::Document;
use crate::error::{PyserError, Result};

/// Compress a document's JSON encoding with zstd at `compression_level`.
pub fn frame(document: &Document, compression_level: i32) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(document).map_err(|e| PyserError::MalformedEnvelope {
        detail: format!("failed to encode document: {e}"),
    })?;
    zstd::encode_all(json.as_slice(), compression_level).map_err(|e| {
        PyserError::MalformedEnvelope {
            detail: format!("zstd compression failed: {e}"),
        }
    })
}

/// Decompress and parse an envelope back into a [`Document`]. Structural
/// reference validation is left to the caller (`crate::decoder`), but any
/// parse failure at this layer is unconditionally fatal.
pub fn unframe(bytes: &[u8]) -> Result<Document> {
    let json = zstd::decode_all(bytes).map_err(|e| PyserError::MalformedEnvelope {
        detail: format!("zstd decompression failed: {e}"),
    })?;
    serde_json::from_slice(&json).map_err(|e| PyserError::MalformedEnvelope {
        detail: format!("failed to parse document: {e}"),
    })
}
