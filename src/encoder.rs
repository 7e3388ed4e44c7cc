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
//! The graph encoder: walks a [`Value`] graph from its root, interning
//! blobs via the [chunk store](crate::chunk), recording nodes into the
//! node table and edges into the pointer table.

use std::collections::HashMap;

use crate::chunk::ChunkStore;
use crate::code::payload_from_body;
use crate::config::SerializeConfig;
use crate::document::Document;
use crate::error::{PyserError, Result};
use crate::node::{CallablePayload, Node, NodeId, NodeKind, NodeMeta, NodeTable};
use crate::pointer::{PointerTable, Slot};
use crate::value::{identity, Handle, Value};

/// Attribute-edge label conventions for a `callable` node's structured
/// children, since `Slot::Attr` only carries a single string.
mod callable_slots {
    pub const CODE: &str = "code";
    pub fn free_cell(i: usize) -> String {
        format!("freevar.{i}")
    }
    pub fn default_value(i: usize) -> String {
        format!("default.{i}")
    }
    pub fn kwdefault(name: &str) -> String {
        format!("kwdefault.{name}")
    }
}

pub struct Encoder<'a> {
    config: &'a SerializeConfig,
    nodes: NodeTable,
    pointers: PointerTable,
    chunks: ChunkStore,
    seen: HashMap<usize, NodeId>,
}

impl<'a> Encoder<'a> {
    pub fn new(config: &'a SerializeConfig) -> Self {
        Self {
            config,
            nodes: NodeTable::new(),
            pointers: PointerTable::new(),
            chunks: ChunkStore::new(),
            seen: HashMap::new(),
        }
    }

    /// Encode `root` into a complete [`Document`].
    pub fn encode(mut self, root: &Handle) -> Result<Document> {
        let root_id = self.encode_value(root, "$")?;
        Ok(Document {
            root_id,
            nodes: self.nodes.into_vec(),
            pointers: self.pointers.into_vec(),
            chunks: self.chunks.into_records(),
        })
    }

    fn encode_value(&mut self, h: &Handle, path: &str) -> Result<NodeId> {
        let key = identity(h);
        if let Some(id) = self.seen.get(&key) {
            return Ok(*id);
        }

        // Reserve the id up front: a cyclic child encountered while this
        // frame is still on the (Rust call) stack finds this entry and
        // returns immediately rather than re-descending.
        let node_id = self.nodes.reserve();
        self.seen.insert(key, node_id);

        let (kind, meta) = self.encode_kind(h, node_id, path)?;
        self.nodes.fill(node_id, Node { id: node_id, kind, meta });
        Ok(node_id)
    }

    fn encode_kind(
        &mut self,
        h: &Handle,
        node_id: NodeId,
        path: &str,
    ) -> Result<(NodeKind, Option<NodeMeta>)> {
        // Borrow scoped tightly: children are encoded through recursive
        // calls to `encode_value`, which must themselves borrow other
        // handles, so we can't hold this borrow across those calls.
        let snapshot = h.borrow().clone_shallow();

        match snapshot {
            Shallow::Null => Ok((NodeKind::Null, None)),
            Shallow::Bool(v) => Ok((NodeKind::Bool { value: v }, None)),
            Shallow::Int(v) => Ok((
                NodeKind::Int {
                    negative: v.negative,
                    magnitude: v.magnitude,
                },
                None,
            )),
            Shallow::Float(v) => Ok((NodeKind::Float { bits: v.to_bits() }, None)),
            Shallow::Str(v) => Ok((NodeKind::Str { value: v }, None)),
            Shallow::Bytes(bytes) => {
                let ids = self.chunks.intern_split(&bytes, self.config.chunk_threshold);
                Ok((NodeKind::Bytes { chunk_ids: ids }, None))
            }
            Shallow::ByteArray(bytes) => {
                let ids = self.chunks.intern_split(&bytes, self.config.chunk_threshold);
                Ok((NodeKind::ByteArray { chunk_ids: ids }, None))
            }
            Shallow::BufferView(bytes) => {
                let ids = self.chunks.intern_split(&bytes, self.config.chunk_threshold);
                Ok((NodeKind::BufferView { chunk_ids: ids }, None))
            }
            Shallow::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    let child = self.encode_value(item, &format!("{path}[{i}]"))?;
                    self.pointers.push(node_id, Slot::Index(i as u32), child);
                }
                Ok((NodeKind::List, None))
            }
            Shallow::Tuple(items) => {
                for (i, item) in items.iter().enumerate() {
                    let child = self.encode_value(item, &format!("{path}[{i}]"))?;
                    self.pointers.push(node_id, Slot::Index(i as u32), child);
                }
                Ok((NodeKind::Tuple, None))
            }
            Shallow::Set(items) => {
                for (i, item) in items.iter().enumerate() {
                    let child = self.encode_value(item, &format!("{path}{{{i}}}"))?;
                    self.pointers.push(node_id, Slot::Ordinal(i as u32), child);
                }
                Ok((NodeKind::Set, None))
            }
            Shallow::FrozenSet(items) => {
                for (i, item) in items.iter().enumerate() {
                    let child = self.encode_value(item, &format!("{path}{{{i}}}"))?;
                    self.pointers.push(node_id, Slot::Ordinal(i as u32), child);
                }
                Ok((NodeKind::FrozenSet, None))
            }
            Shallow::Map(entries) => {
                for (k, v) in entries.iter() {
                    let key_id = self.encode_value(k, &format!("{path}.key"))?;
                    let val_id = self.encode_value(v, &format!("{path}.value"))?;
                    self.pointers.push(node_id, Slot::Key(key_id), val_id);
                }
                Ok((NodeKind::Map, None))
            }
            Shallow::Aggregate { module, qualname, attrs } => {
                let mut attr_names = Vec::with_capacity(attrs.len());
                for (name, value) in attrs.iter() {
                    let child = self.encode_value(value, &format!("{path}.{name}"))?;
                    self.pointers
                        .push(node_id, Slot::Attr(name.clone()), child);
                    attr_names.push(name.clone());
                }
                Ok((
                    NodeKind::Aggregate,
                    Some(NodeMeta {
                        type_name: Some(format!("{module}.{qualname}")),
                        attr_names: Some(attr_names),
                    }),
                ))
            }
            Shallow::Code(body) => {
                for (i, c) in body.consts.iter().enumerate() {
                    let child = self.encode_value(c, &format!("{path}.const[{i}]"))?;
                    self.pointers.push(node_id, Slot::Index(i as u32), child);
                }
                let payload = payload_from_body(&body);
                Ok((NodeKind::Code(Box::new(payload)), None))
            }
            Shallow::Callable {
                code,
                free_cells,
                defaults,
                kwdefaults,
                qualname,
                module,
            } => {
                if self.config.sanitize_runtime_reduce {
                    log::debug!(
                        "sanitize_runtime_reduce enabled: taking code-object path for {path}"
                    );
                }
                let code_id = self.encode_value(&code, &format!("{path}.__code__"))?;
                self.pointers.push(
                    node_id,
                    Slot::Attr(callable_slots::CODE.to_string()),
                    code_id,
                );
                for (i, cell) in free_cells.iter().enumerate() {
                    let child = self.encode_value(cell, &format!("{path}.freevar[{i}]"))?;
                    self.pointers.push(
                        node_id,
                        Slot::Attr(callable_slots::free_cell(i)),
                        child,
                    );
                }
                for (i, default) in defaults.iter().enumerate() {
                    let child = self.encode_value(default, &format!("{path}.default[{i}]"))?;
                    self.pointers.push(
                        node_id,
                        Slot::Attr(callable_slots::default_value(i)),
                        child,
                    );
                }
                let mut kwdefault_names = Vec::with_capacity(kwdefaults.len());
                for (name, value) in kwdefaults.iter() {
                    let child = self.encode_value(value, &format!("{path}.kwdefault.{name}"))?;
                    self.pointers.push(
                        node_id,
                        Slot::Attr(callable_slots::kwdefault(name)),
                        child,
                    );
                    kwdefault_names.push(name.clone());
                }
                Ok((
                    NodeKind::Callable(CallablePayload {
                        qualname,
                        module,
                        kwdefault_names,
                    }),
                    None,
                ))
            }
            Shallow::Unserializable(type_name) => Err(PyserError::UnserializableValue {
                type_name,
                path: path.to_string(),
            }),
        }
    }
}

/// A one-level-deep, owned snapshot of a `Value` borrow, so the borrow can
/// be dropped before recursing into children (children may alias the same
/// `RefCell` in a cycle, which a held borrow would deadlock/panic on).
enum Shallow {
    Null,
    Bool(bool),
    Int(crate::value::BigInt),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    ByteArray(Vec<u8>),
    BufferView(Vec<u8>),
    List(Vec<Handle>),
    Tuple(Vec<Handle>),
    Set(Vec<Handle>),
    FrozenSet(Vec<Handle>),
    Map(Vec<(Handle, Handle)>),
    Aggregate {
        module: String,
        qualname: String,
        attrs: Vec<(String, Handle)>,
    },
    Code(crate::value::CodeBody),
    Callable {
        code: Handle,
        free_cells: Vec<Handle>,
        defaults: Vec<Handle>,
        kwdefaults: Vec<(String, Handle)>,
        qualname: String,
        module: String,
    },
    Unserializable(String),
}

trait CloneShallow {
    fn clone_shallow(&self) -> Shallow;
}

impl CloneShallow for Value {
    fn clone_shallow(&self) -> Shallow {
        match self {
            Value::Null => Shallow::Null,
            Value::Bool(v) => Shallow::Bool(*v),
            Value::Int(v) => Shallow::Int(v.clone()),
            Value::Float(v) => Shallow::Float(*v),
            Value::Str(v) => Shallow::Str(v.clone()),
            Value::Bytes(v) => Shallow::Bytes(v.clone()),
            Value::ByteArray(v) => Shallow::ByteArray(v.clone()),
            Value::BufferView(v) => Shallow::BufferView(v.clone()),
            Value::List(v) => Shallow::List(v.clone()),
            Value::Tuple(v) => Shallow::Tuple(v.clone()),
            Value::Set(v) => Shallow::Set(v.clone()),
            Value::FrozenSet(v) => Shallow::FrozenSet(v.clone()),
            Value::Map(v) => Shallow::Map(v.clone()),
            Value::Aggregate(a) => Shallow::Aggregate {
                module: a.module.clone(),
                qualname: a.qualname.clone(),
                attrs: a.attrs.clone(),
            },
            Value::Code(body) => Shallow::Code(body.clone()),
            Value::Callable(c) => Shallow::Callable {
                code: c.code.clone(),
                free_cells: c.free_cells.clone(),
                defaults: c.defaults.clone(),
                kwdefaults: c.kwdefaults.clone(),
                qualname: c.qualname.clone(),
                module: c.module.clone(),
            },
            Value::Uninit => Shallow::Unserializable("uninit".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    #[test]
    fn scalar_encodes_as_single_node() {
        let cfg = SerializeConfig::default();
        let doc = Encoder::new(&cfg).encode(&Value::int(42)).unwrap();
        assert_eq!(doc.nodes.len(), 1);
        assert!(matches!(doc.nodes[0].kind, NodeKind::Int { .. }));
    }

    #[test]
    fn shared_child_gets_one_node_id() {
        let cfg = SerializeConfig::default();
        let shared = Value::int(7);
        let root = Value::list(vec![shared.clone(), shared.clone()]);
        let doc = Encoder::new(&cfg).encode(&root).unwrap();
        // root list + one shared int == 2 nodes, not 3.
        assert_eq!(doc.nodes.len(), 2);
        let child_ids: Vec<_> = doc
            .pointers
            .iter()
            .map(|e| e.child_id)
            .collect();
        assert_eq!(child_ids[0], child_ids[1]);
    }

    #[test]
    fn self_referential_list_does_not_recurse_forever() {
        let cfg = SerializeConfig::default();
        let list = Value::list(vec![]);
        match &mut *list.borrow_mut() {
            Value::List(items) => items.push(list.clone()),
            _ => unreachable!(),
        }
        let doc = Encoder::new(&cfg).encode(&list).unwrap();
        assert_eq!(doc.nodes.len(), 1);
        assert_eq!(doc.pointers.len(), 1);
        assert_eq!(doc.pointers[0].child_id, doc.root_id);
    }

    #[test]
    fn uninit_value_is_unserializable() {
        let cfg = SerializeConfig::default();
        let bad = crate::value::handle(Value::Uninit);
        let err = Encoder::new(&cfg).encode(&bad).unwrap_err();
        assert!(matches!(err, PyserError::UnserializableValue { .. }));
    }
}
