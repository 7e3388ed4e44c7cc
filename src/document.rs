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
//! The logical document: `(root_id, node table, pointer table, chunk
//! table)`. This is what the [envelope codec](crate::envelope) frames on
//! encode and unframes on decode.

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkRecord;
use crate::node::{Node, NodeId};
use crate::pointer::PointerEdge;

#[derive(Debug, Serialize, Deserialize)]
pub struct Document {
    pub root_id: NodeId,
    pub nodes: Vec<Node>,
    pub pointers: Vec<PointerEdge>,
    pub chunks: Vec<ChunkRecord>,
}

impl Document {
    /// The root id and every id referenced
    /// by an edge or a blob payload must exist in the node table. Checked
    /// structurally before any object is allocated, so a dangling
    /// reference is reported as `DanglingReference` rather than a panic
    /// mid-decode.
    pub fn validate_references(&self) -> Result<(), crate::error::PyserError> {
        use crate::error::PyserError;
        use crate::node::NodeKind;
        use crate::pointer::Slot;

        let max_id = self.nodes.len() as u32;
        let in_range = |id: NodeId| id.0 < max_id;

        for (i, node) in self.nodes.iter().enumerate() {
            if node.id.0 != i as u32 {
                return Err(PyserError::MalformedEnvelope {
                    detail: format!(
                        "node table is not densely indexed: position {i} holds id {}",
                        node.id
                    ),
                });
            }
        }

        if !in_range(self.root_id) {
            return Err(PyserError::DanglingReference {
                from: self.root_id,
                slot_desc: "root".to_string(),
                to: self.root_id,
            });
        }

        for node in &self.nodes {
            if let NodeKind::Bytes { chunk_ids }
            | NodeKind::ByteArray { chunk_ids }
            | NodeKind::BufferView { chunk_ids } = &node.kind
            {
                for chunk_id in chunk_ids {
                    if chunk_id.0 as usize >= self.chunks.len() {
                        return Err(PyserError::MalformedEnvelope {
                            detail: format!(
                                "node {} references unknown chunk {}",
                                node.id, chunk_id
                            ),
                        });
                    }
                }
            }
        }

        for edge in &self.pointers {
            if !in_range(edge.parent_id) {
                return Err(PyserError::DanglingReference {
                    from: edge.parent_id,
                    slot_desc: edge.slot.to_string(),
                    to: edge.child_id,
                });
            }
            if !in_range(edge.child_id) {
                return Err(PyserError::DanglingReference {
                    from: edge.parent_id,
                    slot_desc: edge.slot.to_string(),
                    to: edge.child_id,
                });
            }
            // A map edge's slot carries a second node id (the key) beyond
            // the usual parent/child pair; `fill` indexes straight into the
            // handle vector with it, so it needs the same range check.
            if let Slot::Key(key_id) = &edge.slot {
                if !in_range(*key_id) {
                    return Err(PyserError::DanglingReference {
                        from: edge.parent_id,
                        slot_desc: edge.slot.to_string(),
                        to: *key_id,
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use crate::pointer::Slot;

    #[test]
    fn dangling_root_is_rejected() {
        let doc = Document {
            root_id: NodeId(5),
            nodes: vec![Node::new(NodeId(0), NodeKind::Null)],
            pointers: vec![],
            chunks: vec![],
        };
        assert!(doc.validate_references().is_err());
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let doc = Document {
            root_id: NodeId(0),
            nodes: vec![Node::new(NodeId(0), NodeKind::List)],
            pointers: vec![PointerEdge {
                parent_id: NodeId(0),
                slot: Slot::Index(0),
                child_id: NodeId(9),
            }],
            chunks: vec![],
        };
        assert!(doc.validate_references().is_err());
    }

    #[test]
    fn dangling_map_key_slot_is_rejected() {
        let doc = Document {
            root_id: NodeId(0),
            nodes: vec![
                Node::new(NodeId(0), NodeKind::Map),
                Node::new(NodeId(1), NodeKind::Bool { value: true }),
            ],
            pointers: vec![PointerEdge {
                parent_id: NodeId(0),
                slot: Slot::Key(NodeId(9)),
                child_id: NodeId(1),
            }],
            chunks: vec![],
        };
        assert!(doc.validate_references().is_err());
    }

    #[test]
    fn well_formed_document_passes() {
        let doc = Document {
            root_id: NodeId(0),
            nodes: vec![
                Node::new(NodeId(0), NodeKind::List),
                Node::new(NodeId(1), NodeKind::Bool { value: true }),
            ],
            pointers: vec![PointerEdge {
                parent_id: NodeId(0),
                slot: Slot::Index(0),
                child_id: NodeId(1),
            }],
            chunks: vec![],
        };
        assert!(doc.validate_references().is_ok());
    }
}
