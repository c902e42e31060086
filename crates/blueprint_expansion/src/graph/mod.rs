//! # Blueprint Graph Document
//!
//! The in-memory graph that macro nodes are placed in and expanded against.
//! Nodes own an ordered list of pins; pins hold symmetric links to peer pins
//! and an optional literal default. Pin order is meaningful (exec fan-out
//! order, sequence outputs) and can be changed with [`BlueprintGraph::move_pin`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;
use uuid::Uuid;

use crate::nodes::NodeKind;

pub mod schema;
pub mod type_system;
pub use type_system::*;

/// Well-known pin names shared by primitive and macro nodes.
pub mod pin_names {
    pub const EXECUTE: &str = "execute";
    pub const THEN: &str = "then";
    pub const ELSE: &str = "else";
    pub const CONDITION: &str = "Condition";
    pub const RETURN_VALUE: &str = "ReturnValue";
    pub const VARIABLE: &str = "Variable";
    pub const VALUE: &str = "Value";
    pub const SELF: &str = "self";
    pub const DELEGATE: &str = "Delegate";
    pub const OUTPUT_DELEGATE: &str = "OutputDelegate";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PinId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

impl std::fmt::Display for PinId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pin#{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    #[error("{0} does not exist in the graph")]
    NodeNotFound(NodeId),

    #[error("{0} does not exist in the graph")]
    UnknownPin(PinId),

    #[error("{node} has no pin named '{name}'")]
    PinNotFound { node: NodeId, name: String },

    #[error("{node} already has an {direction:?} pin named '{name}'")]
    DuplicatePin {
        node: NodeId,
        name: String,
        direction: PinDirection,
    },

    #[error("function '{0}' is not registered in the library")]
    UnknownFunction(String),

    #[error("failed to (de)serialize graph: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinDirection {
    Input,
    Output,
}

impl PinDirection {
    pub fn opposite(self) -> Self {
        match self {
            PinDirection::Input => PinDirection::Output,
            PinDirection::Output => PinDirection::Input,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pin {
    pub id: PinId,
    pub owner: NodeId,
    pub name: String,
    pub friendly_name: Option<String>,
    pub tooltip: String,
    pub direction: PinDirection,
    pub pin_type: PinType,
    pub linked_to: SmallVec<[PinId; 2]>,
    pub default_value: String,
    pub default_object: Option<String>,
    pub default_text: Option<String>,
    pub advanced_view: bool,
}

impl Pin {
    /// Name shown to users; falls back to the pin identity.
    pub fn display_name(&self) -> &str {
        self.friendly_name.as_deref().unwrap_or(&self.name)
    }

    pub fn is_exec(&self) -> bool {
        self.pin_type.is_exec()
    }

    pub fn has_links(&self) -> bool {
        !self.linked_to.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub guid: Uuid,
    pub kind: NodeKind,
    pub title: String,
    pub position: Position,
    pub pins: Vec<PinId>,
    /// Spawned by an expansion rather than authored by the user.
    pub intermediate: bool,
    /// Macro node whose expansion produced this node.
    pub source_node: Option<NodeId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlueprintGraph {
    pub name: String,
    nodes: BTreeMap<NodeId, Node>,
    pins: BTreeMap<PinId, Pin>,
    next_node_id: u32,
    next_pin_id: u32,
    #[serde(skip)]
    modified: bool,
    #[serde(skip)]
    change_count: u64,
}

impl BlueprintGraph {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Place a node without pins. Pin shape comes from
    /// [`crate::nodes::allocate_default_pins`].
    pub fn add_node(&mut self, kind: NodeKind, position: Position) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;

        let node = Node {
            id,
            guid: Uuid::new_v4(),
            title: kind.title(),
            kind,
            position,
            pins: Vec::new(),
            intermediate: false,
            source_node: None,
        };
        self.nodes.insert(id, node);
        self.mark_modified();
        id
    }

    /// Place a node that belongs to the expansion of `source`.
    pub fn add_intermediate_node(&mut self, kind: NodeKind, source: NodeId) -> NodeId {
        let position = self.node(source).map(|n| n.position).unwrap_or_default();
        let id = self.add_node(kind, position);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.intermediate = true;
            node.source_node = Some(source);
        }
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn node_checked(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.pins.values().map(|p| p.linked_to.len()).sum::<usize>() / 2
    }

    /// Remove a node, its pins, and every link touching them.
    pub fn remove_node(&mut self, id: NodeId) {
        self.dissolve_node(id);
        if self.nodes.remove(&id).is_some() {
            self.mark_modified();
        }
    }

    /// Drop every link and pin of a node, leaving an empty husk in place.
    pub fn dissolve_node(&mut self, id: NodeId) {
        self.break_all_node_links(id);
        let pins = match self.nodes.get_mut(&id) {
            Some(node) => std::mem::take(&mut node.pins),
            None => return,
        };
        for pin in pins {
            self.pins.remove(&pin);
        }
        self.mark_modified();
    }

    pub fn create_pin(
        &mut self,
        node: NodeId,
        direction: PinDirection,
        pin_type: PinType,
        name: &str,
    ) -> Result<PinId, GraphError> {
        if !self.nodes.contains_key(&node) {
            return Err(GraphError::NodeNotFound(node));
        }
        if self.find_pin(node, name, Some(direction)).is_some() {
            return Err(GraphError::DuplicatePin {
                node,
                name: name.to_string(),
                direction,
            });
        }

        let id = PinId(self.next_pin_id);
        self.next_pin_id += 1;

        self.pins.insert(
            id,
            Pin {
                id,
                owner: node,
                name: name.to_string(),
                friendly_name: None,
                tooltip: String::new(),
                direction,
                pin_type,
                linked_to: SmallVec::new(),
                default_value: String::new(),
                default_object: None,
                default_text: None,
                advanced_view: false,
            },
        );
        if let Some(owner) = self.nodes.get_mut(&node) {
            owner.pins.push(id);
        }
        Ok(id)
    }

    pub fn pin(&self, id: PinId) -> Option<&Pin> {
        self.pins.get(&id)
    }

    pub fn pin_mut(&mut self, id: PinId) -> Option<&mut Pin> {
        self.pins.get_mut(&id)
    }

    pub fn pin_checked(&self, id: PinId) -> Result<&Pin, GraphError> {
        self.pins.get(&id).ok_or(GraphError::UnknownPin(id))
    }

    pub fn pin_checked_mut(&mut self, id: PinId) -> Result<&mut Pin, GraphError> {
        self.pins.get_mut(&id).ok_or(GraphError::UnknownPin(id))
    }

    /// Ordered pins of a node; empty for unknown nodes.
    pub fn pins_of(&self, node: NodeId) -> &[PinId] {
        self.nodes.get(&node).map(|n| n.pins.as_slice()).unwrap_or(&[])
    }

    pub fn find_pin(&self, node: NodeId, name: &str, direction: Option<PinDirection>) -> Option<PinId> {
        self.pins_of(node).iter().copied().find(|id| {
            self.pins
                .get(id)
                .is_some_and(|p| p.name == name && direction.map_or(true, |d| p.direction == d))
        })
    }

    pub fn find_pin_checked(&self, node: NodeId, name: &str) -> Result<PinId, GraphError> {
        self.find_pin(node, name, None).ok_or_else(|| GraphError::PinNotFound {
            node,
            name: name.to_string(),
        })
    }

    pub fn linked_to(&self, pin: PinId) -> Vec<PinId> {
        self.pins
            .get(&pin)
            .map(|p| p.linked_to.to_vec())
            .unwrap_or_default()
    }

    pub fn owner_of(&self, pin: PinId) -> Option<NodeId> {
        self.pins.get(&pin).map(|p| p.owner)
    }

    pub fn pin_type(&self, pin: PinId) -> Option<&PinType> {
        self.pins.get(&pin).map(|p| &p.pin_type)
    }

    pub fn set_pin_type(&mut self, pin: PinId, pin_type: PinType) -> Result<(), GraphError> {
        self.pin_checked_mut(pin)?.pin_type = pin_type;
        Ok(())
    }

    pub fn set_default_value(&mut self, pin: PinId, value: &str) -> Result<(), GraphError> {
        self.pin_checked_mut(pin)?.default_value = value.to_string();
        Ok(())
    }

    /// Link two pins without any compatibility check or notification.
    pub fn make_link(&mut self, a: PinId, b: PinId) -> Result<(), GraphError> {
        self.pin_checked(a)?;
        self.pin_checked(b)?;
        if a == b {
            return Ok(());
        }

        if let Some(pin) = self.pins.get_mut(&a) {
            if !pin.linked_to.contains(&b) {
                pin.linked_to.push(b);
            }
        }
        if let Some(pin) = self.pins.get_mut(&b) {
            if !pin.linked_to.contains(&a) {
                pin.linked_to.push(a);
            }
        }
        Ok(())
    }

    pub fn break_link(&mut self, a: PinId, b: PinId) {
        if let Some(pin) = self.pins.get_mut(&a) {
            pin.linked_to.retain(|peer| *peer != b);
        }
        if let Some(pin) = self.pins.get_mut(&b) {
            pin.linked_to.retain(|peer| *peer != a);
        }
    }

    /// Break every link on a pin, returning the peers it was linked to.
    pub fn break_all_pin_links(&mut self, pin: PinId) -> Vec<PinId> {
        let peers = self.linked_to(pin);
        for peer in &peers {
            self.break_link(pin, *peer);
        }
        peers
    }

    pub fn break_all_node_links(&mut self, node: NodeId) {
        for pin in self.pins_of(node).to_vec() {
            self.break_all_pin_links(pin);
        }
    }

    /// Move a pin to `new_index` within its node's pin order.
    pub fn move_pin(&mut self, node: NodeId, pin: PinId, new_index: usize) -> bool {
        let Some(owner) = self.nodes.get_mut(&node) else {
            return false;
        };
        let Some(current) = owner.pins.iter().position(|p| *p == pin) else {
            return false;
        };
        if new_index >= owner.pins.len() {
            return false;
        }
        owner.pins.remove(current);
        owner.pins.insert(new_index, pin);
        true
    }

    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn clear_modified(&mut self) {
        self.modified = false;
    }

    /// Signal that the graph's visual state changed and should be redrawn.
    pub fn notify_graph_changed(&mut self) {
        self.change_count += 1;
        tracing::trace!("[GRAPH] '{}' changed ({} notifications)", self.name, self.change_count);
    }

    pub fn change_count(&self) -> u64 {
        self.change_count
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        serde_json::to_string_pretty(self).map_err(|e| GraphError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        serde_json::from_str(json).map_err(|e| GraphError::Serialization(e.to_string()))
    }
}
