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
//! The error taxonomy for encode and decode failures.
//!
//! Every variant here is fatal: there is no lossy or partial decode path.
//! This generalizes the merkle-dag lineage's small `StoreError` enum
//! (`StoreFailure(String)`, `NoSuchDependents`) to the larger surface this
//! format requires.

use crate::node::NodeId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PyserError>;

#[derive(Debug, Error)]
pub enum PyserError {
    #[error("cannot serialize value of type `{type_name}` at {path}")]
    UnserializableValue { type_name: String, path: String },

    #[error("unknown module `{module}`")]
    UnknownModule { module: String },

    #[error("unknown type `{module}.{qualname}`")]
    UnknownType { module: String, qualname: String },

    #[error("type `{module}.{qualname}` could not be instantiated")]
    UninstantiableType { module: String, qualname: String },

    #[error("incompatible code-object version: field `{field}` expected `{expected}`, found `{found}`")]
    IncompatibleCodeVersion {
        field: String,
        expected: String,
        found: String,
    },

    #[error("chunk {chunk_id} failed hash verification")]
    ChunkHashMismatch { chunk_id: u32 },

    #[error("malformed envelope: {detail}")]
    MalformedEnvelope { detail: String },

    #[error("dangling reference from node {from} ({slot_desc}) to node {to}")]
    DanglingReference {
        from: NodeId,
        slot_desc: String,
        to: NodeId,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
