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
//! Encoder-visible configuration. The decoder has no matching config: the
//! envelope is self-describing and decode behavior does not branch on it.

/// One megabyte, the default [`SerializeConfig::chunk_threshold`].
pub const DEFAULT_CHUNK_THRESHOLD: usize = 1024 * 1024;

/// Default `zstd` compression level forwarded to the envelope codec.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

#[derive(Debug, Clone)]
pub struct SerializeConfig {
    /// If true, neutralize user-installed custom-serialization hooks on
    /// callables during encode so the code-object path is always taken.
    /// This crate has no host-runtime reduce hooks to neutralize; the flag
    /// is still accepted and threaded through so embeddings of this core
    /// against a real dynamic runtime have a stable place to act on it.
    pub sanitize_runtime_reduce: bool,
    /// Byte length above which a blob value is split into fixed-size
    /// sub-chunks before interning.
    pub chunk_threshold: usize,
    /// Forwarded to the `zstd` encoder.
    pub compression_level: i32,
}

impl Default for SerializeConfig {
    fn default() -> Self {
        Self {
            sanitize_runtime_reduce: false,
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = SerializeConfig::default();
        assert!(!cfg.sanitize_runtime_reduce);
        assert_eq!(cfg.chunk_threshold, 1024 * 1024);
        assert_eq!(cfg.compression_level, 3);
    }
}
