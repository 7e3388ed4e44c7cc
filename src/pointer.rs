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
//! The pointer table: parent -> child edges with slot labels. Logically a
//! multiset of edges keyed by parent.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// The role a child plays under its parent. Which variant is used depends
/// on the parent's node kind: `Index` for ordered sequences and code
/// constants, `Attr` for aggregate attributes and callable sub-fields,
/// `Key` for map entries (the key node's own id doubles as the edge slot),
/// `Ordinal` for unordered collection elements (first-seen order, not
/// semantically meaningful).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Slot {
    Index(u32),
    Attr(String),
    Key(NodeId),
    Ordinal(u32),
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Index(i) => write!(f, "index {i}"),
            Slot::Attr(name) => write!(f, "attr {name:?}"),
            Slot::Key(id) => write!(f, "key node {id}"),
            Slot::Ordinal(o) => write!(f, "ordinal {o}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerEdge {
    pub parent_id: NodeId,
    pub slot: Slot,
    pub child_id: NodeId,
}

/// Edges in encounter order, plus a per-parent index built on demand for
/// decode (the required iteration order -- positional ascending,
/// attribute-name order, map-recorded order, or set first-seen order --
/// all of which fall out of "encounter order" on the encode side, so no
/// separate sort is needed at decode time).
#[derive(Debug, Default)]
pub struct PointerTable {
    edges: Vec<PointerEdge>,
}

impl PointerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, parent_id: NodeId, slot: Slot, child_id: NodeId) {
        self.edges.push(PointerEdge {
            parent_id,
            slot,
            child_id,
        });
    }

    pub fn into_vec(self) -> Vec<PointerEdge> {
        self.edges
    }

    pub fn from_vec(edges: Vec<PointerEdge>) -> Self {
        Self { edges }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PointerEdge> {
        self.edges.iter()
    }

    /// Group edges by parent, preserving each parent's edges in the order
    /// they appear in the table (i.e. encounter order).
    pub fn by_parent(&self) -> BTreeMap<NodeId, Vec<&PointerEdge>> {
        let mut map: BTreeMap<NodeId, Vec<&PointerEdge>> = BTreeMap::new();
        for edge in &self.edges {
            map.entry(edge.parent_id).or_default().push(edge);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_parent_preserves_encounter_order() {
        let mut table = PointerTable::new();
        table.push(NodeId(0), Slot::Index(0), NodeId(1));
        table.push(NodeId(0), Slot::Index(1), NodeId(2));
        table.push(NodeId(3), Slot::Attr("x".into()), NodeId(4));
        let grouped = table.by_parent();
        let parent0 = &grouped[&NodeId(0)];
        assert_eq!(parent0[0].child_id, NodeId(1));
        assert_eq!(parent0[1].child_id, NodeId(2));
        assert_eq!(grouped[&NodeId(3)][0].slot, Slot::Attr("x".into()));
    }

    #[test]
    fn slot_round_trips_through_json() {
        for slot in [
            Slot::Index(7),
            Slot::Attr("name".into()),
            Slot::Key(NodeId(2)),
            Slot::Ordinal(3),
        ] {
            let json = serde_json::to_string(&slot).unwrap();
            let back: Slot = serde_json::from_str(&json).unwrap();
            assert_eq!(slot, back);
        }
    }
}
