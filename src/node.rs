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
//! `Node` types: the record that describes a single vertex of an encoded
//! graph. Every node carries a stable id, a kind tag, a kind-specific
//! payload, and optional metadata (type name / attribute ordering).
//!
//! Node ids here are dense small integers assigned in encounter order
//! during encode, not content-derived like the merkle-dag lineage's node
//! ids — a document's shape, not its bytes, is what must be stable across
//! a decode/re-encode round trip.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkId;

/// Small integer uniquely identifying a node within one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optional metadata carried alongside a node: the fully-qualified type
/// name for aggregates/callables, and the attribute-name ordering for
/// aggregates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr_names: Option<Vec<String>>,
}

/// Fields of a `code` node that are not themselves child references.
/// `consts` are recorded as pointer edges (`Slot::Index`) off the node
/// since a constant may be a nested code body, a container, or a scalar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodePayload {
    #[serde(with = "crate::base64_bytes")]
    pub bytecode: Vec<u8>,
    pub names: Vec<String>,
    pub varnames: Vec<String>,
    pub freevars: Vec<String>,
    pub cellvars: Vec<String>,
    pub filename: String,
    pub qualname: String,
    pub argcount: u32,
    pub posonlyargcount: u32,
    pub kwonlyargcount: u32,
    pub nlocals: u32,
    pub stacksize: u32,
    pub flags: u32,
    pub firstlineno: u32,
    #[serde(with = "crate::base64_bytes")]
    pub lnotab: Vec<u8>,
    #[serde(default, with = "crate::base64_bytes::option", skip_serializing_if = "Option::is_none")]
    pub exception_table: Option<Vec<u8>>,
    /// Host-runtime version the code body was captured from; compared
    /// against the decoder's target version.
    pub runtime_version: String,
}

/// Fields of a `callable` node that are not themselves child references.
/// The code reference, captured free-cell contents, positional defaults,
/// and keyword-only defaults all ride as attribute-labeled pointer edges
/// (see `crate::encoder` for the labeling convention).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallablePayload {
    pub qualname: String,
    pub module: String,
    /// Parallel to the `kwdefault.<name>` edges, so decode can recover
    /// which attribute-labeled edges are keyword-only defaults without
    /// guessing from the label text alone.
    pub kwdefault_names: Vec<String>,
}

/// The kind-specific payload of a node, tagged by `type` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum NodeKind {
    #[serde(rename = "null")]
    Null,
    #[serde(rename = "bool")]
    Bool { value: bool },
    #[serde(rename = "int")]
    Int {
        negative: bool,
        #[serde(with = "crate::base64_bytes")]
        magnitude: Vec<u8>,
    },
    #[serde(rename = "float")]
    Float { bits: u64 },
    #[serde(rename = "string")]
    Str { value: String },
    #[serde(rename = "bytes")]
    Bytes { chunk_ids: Vec<ChunkId> },
    #[serde(rename = "bytearray")]
    ByteArray { chunk_ids: Vec<ChunkId> },
    #[serde(rename = "bufferview")]
    BufferView { chunk_ids: Vec<ChunkId> },
    #[serde(rename = "list")]
    List,
    #[serde(rename = "tuple")]
    Tuple,
    #[serde(rename = "set")]
    Set,
    #[serde(rename = "frozenset")]
    FrozenSet,
    #[serde(rename = "map")]
    Map,
    #[serde(rename = "aggregate")]
    Aggregate,
    #[serde(rename = "code")]
    Code(Box<CodePayload>),
    #[serde(rename = "callable")]
    Callable(CallablePayload),
}

impl NodeKind {
    /// Human-readable tag, used in error messages and CLI `inspect` output.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Null => "null",
            NodeKind::Bool { .. } => "bool",
            NodeKind::Int { .. } => "int",
            NodeKind::Float { .. } => "float",
            NodeKind::Str { .. } => "string",
            NodeKind::Bytes { .. } => "bytes",
            NodeKind::ByteArray { .. } => "bytearray",
            NodeKind::BufferView { .. } => "bufferview",
            NodeKind::List => "list",
            NodeKind::Tuple => "tuple",
            NodeKind::Set => "set",
            NodeKind::FrozenSet => "frozenset",
            NodeKind::Map => "map",
            NodeKind::Aggregate => "aggregate",
            NodeKind::Code(_) => "code",
            NodeKind::Callable(_) => "callable",
        }
    }
}

/// A single node record in the node table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<NodeMeta>,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: NodeMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Append-only during encode, random-access by id during decode.
#[derive(Debug, Default)]
pub struct NodeTable {
    nodes: Vec<Node>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next id without supplying a kind yet. Used by the
    /// encoder so an id can be handed out (and recorded in the identity
    /// map) before the node's payload is known, which is what makes
    /// cycles representable.
    pub fn reserve(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(id, NodeKind::Null));
        id
    }

    /// Fill in the payload for a previously reserved id.
    pub fn fill(&mut self, id: NodeId, node: Node) {
        debug_assert_eq!(id, node.id);
        self.nodes[id.0 as usize] = node;
    }

    pub fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = self.reserve();
        self.fill(id, Node::new(id, kind));
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn into_vec(self) -> Vec<Node> {
        self.nodes
    }

    pub fn from_vec(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_then_fill_preserves_id() {
        let mut table = NodeTable::new();
        let id = table.reserve();
        table.fill(id, Node::new(id, NodeKind::Bool { value: true }));
        assert_eq!(table.get(id).unwrap().kind, NodeKind::Bool { value: true });
    }

    #[test]
    fn node_kind_round_trips_through_json() {
        let node = Node::new(NodeId(3), NodeKind::Str { value: "hi".into() })
            .with_meta(NodeMeta {
                type_name: Some("pkg.Thing".into()),
                attr_names: Some(vec!["a".into(), "b".into()]),
            });
        let json = serde_json::to_string(&node).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(node, back);
    }
}
