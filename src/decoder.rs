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
//! The graph decoder: two-phase reconstruction. Phase 1
//! allocates every node -- scalars and blobs materialize fully, containers
//! get an empty placeholder, aggregates a blank instance, callables a
//! stand-in -- before any edge is resolved. Phase 2 walks the pointer
//! table grouped by parent and fills each placeholder in place. Because
//! every node exists before any edge is processed, a cyclic edge processed
//! "second" always finds its target already allocated.

use std::collections::BTreeMap;

use crate::aggregate::TypeRegistry;
use crate::chunk::ChunkStore;
use crate::code::{body_from_payload, CodeObjectBuilder};
use crate::document::Document;
use crate::error::{PyserError, Result};
use crate::node::{Node, NodeId, NodeKind};
use crate::pointer::{PointerEdge, PointerTable, Slot};
use crate::value::{handle, Callable, Handle, Value};

pub struct Decoder<'a> {
    registry: &'a dyn TypeRegistry,
    code_builder: &'a dyn CodeObjectBuilder,
}

impl<'a> Decoder<'a> {
    pub fn new(registry: &'a dyn TypeRegistry, code_builder: &'a dyn CodeObjectBuilder) -> Self {
        Self {
            registry,
            code_builder,
        }
    }

    pub fn decode(&self, document: Document) -> Result<Handle> {
        document.validate_references()?;

        let chunks = ChunkStore::from_records(document.chunks).map_err(|chunk_id| {
            PyserError::ChunkHashMismatch {
                chunk_id: chunk_id.0,
            }
        })?;

        log::debug!("decode phase 1: allocating {} nodes", document.nodes.len());
        let mut handles: Vec<Handle> = Vec::with_capacity(document.nodes.len());
        for node in &document.nodes {
            handles.push(self.allocate(node, &chunks)?);
        }

        log::debug!("decode phase 2: filling {} nodes", document.nodes.len());
        let pointers = PointerTable::from_vec(document.pointers);
        let grouped = pointers.by_parent();
        for node in &document.nodes {
            let edges: &[&PointerEdge] = grouped
                .get(&node.id)
                .map(|v| v.as_slice())
                .unwrap_or(&[]);
            self.fill(node, &handles, edges)?;
        }

        Ok(handles[document.root_id.0 as usize].clone())
    }

    fn allocate(&self, node: &Node, chunks: &ChunkStore) -> Result<Handle> {
        let value = match &node.kind {
            NodeKind::Null => Value::Null,
            NodeKind::Bool { value } => Value::Bool(*value),
            NodeKind::Int { negative, magnitude } => Value::Int(crate::value::BigInt {
                negative: *negative,
                magnitude: magnitude.clone(),
            }),
            NodeKind::Float { bits } => Value::Float(f64::from_bits(*bits)),
            NodeKind::Str { value } => Value::Str(value.clone()),
            NodeKind::Bytes { chunk_ids } => Value::Bytes(self.assemble(chunks, chunk_ids, node.id)?),
            NodeKind::ByteArray { chunk_ids } => {
                Value::ByteArray(self.assemble(chunks, chunk_ids, node.id)?)
            }
            NodeKind::BufferView { chunk_ids } => {
                Value::BufferView(self.assemble(chunks, chunk_ids, node.id)?)
            }
            NodeKind::List => Value::List(Vec::new()),
            NodeKind::Tuple => Value::Tuple(Vec::new()),
            NodeKind::Set => Value::Set(Vec::new()),
            NodeKind::FrozenSet => Value::FrozenSet(Vec::new()),
            NodeKind::Map => Value::Map(Vec::new()),
            NodeKind::Aggregate => {
                let type_name = node
                    .meta
                    .as_ref()
                    .and_then(|m| m.type_name.as_ref())
                    .ok_or_else(|| PyserError::MalformedEnvelope {
                        detail: format!("aggregate node {} is missing meta.type_name", node.id),
                    })?;
                let (module, qualname) = split_type_name(type_name);
                return crate::aggregate::allocate(self.registry, &module, &qualname);
            }
            NodeKind::Code(payload) => {
                let body = body_from_payload((**payload).clone(), Vec::new());
                Value::Code(body)
            }
            NodeKind::Callable(payload) => Value::Callable(Callable {
                code: Value::null(),
                free_cells: Vec::new(),
                defaults: Vec::new(),
                kwdefaults: Vec::new(),
                qualname: payload.qualname.clone(),
                module: payload.module.clone(),
            }),
        };
        Ok(handle(value))
    }

    fn assemble(&self, chunks: &ChunkStore, ids: &[crate::chunk::ChunkId], node_id: NodeId) -> Result<Vec<u8>> {
        // `Document::validate_references` already confirmed every chunk id
        // here is in range, so this can only fail on a coding error, not on
        // hostile input.
        chunks.assemble(ids).ok_or_else(|| PyserError::MalformedEnvelope {
            detail: format!("node {node_id} references an unassemblable chunk"),
        })
    }

    fn fill(&self, node: &Node, handles: &[Handle], edges: &[&PointerEdge]) -> Result<()> {
        match &node.kind {
            NodeKind::Null
            | NodeKind::Bool { .. }
            | NodeKind::Int { .. }
            | NodeKind::Float { .. }
            | NodeKind::Str { .. }
            | NodeKind::Bytes { .. }
            | NodeKind::ByteArray { .. }
            | NodeKind::BufferView { .. } => Ok(()),

            NodeKind::List | NodeKind::Tuple => {
                let mut items: Vec<(u32, Handle)> = edges
                    .iter()
                    .map(|e| match &e.slot {
                        Slot::Index(i) => Ok((*i, handles[e.child_id.0 as usize].clone())),
                        other => Err(malformed_slot(node.id, other)),
                    })
                    .collect::<Result<_>>()?;
                items.sort_by_key(|(i, _)| *i);
                let items: Vec<Handle> = items.into_iter().map(|(_, h)| h).collect();
                match &mut *handles[node.id.0 as usize].borrow_mut() {
                    Value::List(v) | Value::Tuple(v) => *v = items,
                    _ => unreachable!("allocate() kind must match fill() kind"),
                }
                Ok(())
            }

            NodeKind::Set | NodeKind::FrozenSet => {
                let mut items: Vec<(u32, Handle)> = edges
                    .iter()
                    .map(|e| match &e.slot {
                        Slot::Ordinal(o) => Ok((*o, handles[e.child_id.0 as usize].clone())),
                        other => Err(malformed_slot(node.id, other)),
                    })
                    .collect::<Result<_>>()?;
                items.sort_by_key(|(o, _)| *o);
                let items: Vec<Handle> = items.into_iter().map(|(_, h)| h).collect();
                match &mut *handles[node.id.0 as usize].borrow_mut() {
                    Value::Set(v) | Value::FrozenSet(v) => *v = items,
                    _ => unreachable!("allocate() kind must match fill() kind"),
                }
                Ok(())
            }

            NodeKind::Map => {
                let mut entries = Vec::with_capacity(edges.len());
                for e in edges {
                    let key_id = match &e.slot {
                        Slot::Key(id) => *id,
                        other => return Err(malformed_slot(node.id, other)),
                    };
                    let key = handles[key_id.0 as usize].clone();
                    let value = handles[e.child_id.0 as usize].clone();
                    entries.push((key, value));
                }
                match &mut *handles[node.id.0 as usize].borrow_mut() {
                    Value::Map(v) => *v = entries,
                    _ => unreachable!("allocate() kind must match fill() kind"),
                }
                Ok(())
            }

            NodeKind::Aggregate => {
                let attr_names = node
                    .meta
                    .as_ref()
                    .and_then(|m| m.attr_names.clone())
                    .ok_or_else(|| PyserError::MalformedEnvelope {
                        detail: format!("aggregate node {} is missing meta.attr_names", node.id),
                    })?;
                let mut by_name: BTreeMap<String, Handle> = BTreeMap::new();
                for e in edges {
                    match &e.slot {
                        Slot::Attr(name) => {
                            by_name.insert(name.clone(), handles[e.child_id.0 as usize].clone());
                        }
                        other => return Err(malformed_slot(node.id, other)),
                    }
                }
                let mut attrs = Vec::with_capacity(attr_names.len());
                for name in attr_names {
                    if let Some(value) = by_name.remove(&name) {
                        attrs.push((name, value));
                    }
                    // A name recorded in meta but missing an edge is
                    // dropped rather than failing the whole decode --
                    // this mirrors the permissive attribute assignment
                    // this crate calls for on the encode->decode boundary.
                }
                match &mut *handles[node.id.0 as usize].borrow_mut() {
                    Value::Aggregate(agg) => agg.attrs = attrs,
                    _ => {
                        return Err(PyserError::UninstantiableType {
                            module: "unknown".to_string(),
                            qualname: "unknown".to_string(),
                        })
                    }
                }
                Ok(())
            }

            NodeKind::Code(payload) => {
                let mut consts: Vec<(u32, Handle)> = edges
                    .iter()
                    .map(|e| match &e.slot {
                        Slot::Index(i) => Ok((*i, handles[e.child_id.0 as usize].clone())),
                        other => Err(malformed_slot(node.id, other)),
                    })
                    .collect::<Result<_>>()?;
                consts.sort_by_key(|(i, _)| *i);
                let consts: Vec<Handle> = consts.into_iter().map(|(_, h)| h).collect();
                let body = body_from_payload((**payload).clone(), consts);
                let built = self.code_builder.build(body)?;
                let built_value = built.borrow().clone();
                *handles[node.id.0 as usize].borrow_mut() = built_value;
                Ok(())
            }

            NodeKind::Callable(payload) => {
                let mut code: Option<Handle> = None;
                let mut free_cells: BTreeMap<usize, Handle> = BTreeMap::new();
                let mut defaults: BTreeMap<usize, Handle> = BTreeMap::new();
                let mut kwdefaults_by_name: BTreeMap<String, Handle> = BTreeMap::new();

                for e in edges {
                    let label = match &e.slot {
                        Slot::Attr(label) => label,
                        other => return Err(malformed_slot(node.id, other)),
                    };
                    let child = handles[e.child_id.0 as usize].clone();
                    if label == "code" {
                        code = Some(child);
                    } else if let Some(rest) = label.strip_prefix("freevar.") {
                        let idx: usize = rest.parse().map_err(|_| malformed_label(node.id, label))?;
                        free_cells.insert(idx, child);
                    } else if let Some(rest) = label.strip_prefix("default.") {
                        let idx: usize = rest.parse().map_err(|_| malformed_label(node.id, label))?;
                        defaults.insert(idx, child);
                    } else if let Some(name) = label.strip_prefix("kwdefault.") {
                        kwdefaults_by_name.insert(name.to_string(), child);
                    } else {
                        return Err(malformed_label(node.id, label));
                    }
                }

                let code = code.ok_or_else(|| PyserError::MalformedEnvelope {
                    detail: format!("callable node {} is missing its code edge", node.id),
                })?;
                let free_cells: Vec<Handle> = free_cells.into_values().collect();
                let defaults: Vec<Handle> = defaults.into_values().collect();
                let mut kwdefaults = Vec::with_capacity(payload.kwdefault_names.len());
                for name in &payload.kwdefault_names {
                    if let Some(value) = kwdefaults_by_name.remove(name) {
                        kwdefaults.push((name.clone(), value));
                    }
                }

                match &mut *handles[node.id.0 as usize].borrow_mut() {
                    Value::Callable(c) => {
                        c.code = code;
                        c.free_cells = free_cells;
                        c.defaults = defaults;
                        c.kwdefaults = kwdefaults;
                    }
                    _ => unreachable!("allocate() kind must match fill() kind"),
                }
                Ok(())
            }
        }
    }
}

fn split_type_name(full: &str) -> (String, String) {
    match full.rsplit_once('.') {
        Some((module, qualname)) => (module.to_string(), qualname.to_string()),
        None => (String::new(), full.to_string()),
    }
}

fn malformed_slot(node_id: NodeId, slot: &Slot) -> PyserError {
    PyserError::MalformedEnvelope {
        detail: format!("node {node_id} has an edge with an unexpected slot kind: {slot}"),
    }
}

fn malformed_label(node_id: NodeId, label: &str) -> PyserError {
    PyserError::MalformedEnvelope {
        detail: format!("callable node {node_id} has an unrecognized edge label {label:?}"),
    }
}
