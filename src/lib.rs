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
//! A content-addressed, cycle-safe serialization envelope for
//! dynamic-runtime object graphs: scalars, containers, blobs,
//! user-defined aggregates, shared references, cycles, and code/callable
//! values all round-trip through one textual, zstd-compressed document.
//!
//! The crate core (`value`, `encoder`, `decoder`, `document`, `envelope`,
//! `chunk`, `node`, `pointer`) has no dependency on any particular host
//! runtime. [`aggregate::TypeRegistry`] and [`code::CodeObjectBuilder`] are
//! the seams a real embedding (a PyO3 binding, say) plugs its own type
//! system and bytecode constructor into; `testutil` backs both with plain
//! `HashMap`-based implementations for this crate's own tests and for
//! downstream integration tests that just need something that works.

pub mod aggregate;
pub mod base64_bytes;
pub mod chunk;
pub mod code;
pub mod config;
pub mod decoder;
pub mod document;
pub mod encoder;
pub mod envelope;
pub mod error;
pub mod hash;
pub mod node;
pub mod pointer;
pub mod value;

pub mod testutil;

use std::fs;
use std::path::Path;

use crate::aggregate::TypeRegistry;
use crate::code::CodeObjectBuilder;
use crate::config::SerializeConfig;
use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::Result;
use crate::value::Handle;

/// Encode `root` into a complete envelope: graph walk, chunk interning,
/// JSON encoding, then zstd framing.
pub fn serialize(root: &Handle, config: &SerializeConfig) -> Result<Vec<u8>> {
    let document = Encoder::new(config).encode(root)?;
    envelope::frame(&document, config.compression_level)
}

/// Unframe, validate, and reconstruct an envelope's graph. `registry` and
/// `code_builder` are the embedding's own hooks for aggregate and
/// code-object reconstruction.
pub fn deserialize(
    bytes: &[u8],
    registry: &dyn TypeRegistry,
    code_builder: &dyn CodeObjectBuilder,
) -> Result<Handle> {
    let document = envelope::unframe(bytes)?;
    Decoder::new(registry, code_builder).decode(document)
}

/// [`serialize`], written to `path`.
pub fn serialize_to_file(root: &Handle, path: &Path, config: &SerializeConfig) -> Result<()> {
    let bytes = serialize(root, config)?;
    fs::write(path, bytes)?;
    Ok(())
}

/// [`deserialize`], read from `path`.
pub fn deserialize_from_file(
    path: &Path,
    registry: &dyn TypeRegistry,
    code_builder: &dyn CodeObjectBuilder,
) -> Result<Handle> {
    let bytes = fs::read(path)?;
    deserialize(&bytes, registry, code_builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ReplayBuilder, TestRegistry};
    use crate::value::{structural_eq, Value};

    #[test]
    fn serialize_then_deserialize_round_trips_a_graph() {
        let root = Value::list(vec![
            Value::int(1),
            Value::str("two"),
            Value::map(vec![(Value::str("k"), Value::bool(true))]),
        ]);
        let config = SerializeConfig::default();
        let bytes = serialize(&root, &config).unwrap();

        let registry = TestRegistry::new();
        let builder = ReplayBuilder::default();
        let back = deserialize(&bytes, &registry, &builder).unwrap();

        assert!(structural_eq(&root, &back));
    }

    #[test]
    fn serialize_to_file_then_deserialize_from_file_round_trips() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("pyser-lib-test-{}.pys", std::process::id()));
        let root = Value::tuple(vec![Value::int(7), Value::null()]);
        let config = SerializeConfig::default();
        serialize_to_file(&root, &path, &config).unwrap();

        let registry = TestRegistry::new();
        let builder = ReplayBuilder::default();
        let back = deserialize_from_file(&path, &registry, &builder).unwrap();

        assert!(structural_eq(&root, &back));
        let _ = fs::remove_file(&path);
    }
}
