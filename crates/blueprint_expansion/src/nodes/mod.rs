//! # Node Kinds
//!
//! Every node in a [`BlueprintGraph`] carries a [`NodeKind`]. Primitive kinds
//! (events, variables, branches, function calls) are what the compiler backend
//! understands directly. Macro kinds (`ForEach`, `MapForEach`, `BindEvents`)
//! only exist at edit time: the expansion pass replaces each of them with a
//! subgraph of primitives.
//!
//! Macro kinds implement [`ExpandableNode`]. Their persistent state lives in
//! the `NodeKind` payload, so the trait is a set of associated functions that
//! look the state up in the graph instead of methods on a detached object.

use serde::{Deserialize, Serialize};

use crate::compiler::CompilerContext;
use crate::graph::{BlueprintGraph, GraphError, NodeId, PinId};

pub mod bind_events;
pub mod for_each;
pub mod map_for_each;
pub mod primitives;

pub use bind_events::BindEventsNode;
pub use for_each::ForEachLoop;
pub use map_for_each::MapForEachLoop;
pub use primitives::{
    AddDelegateNode, CallFunctionNode, CustomEventNode, EventNode, TemporaryVariableNode, UserPinInfo,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeKind {
    Event(EventNode),
    CustomEvent(CustomEventNode),
    TemporaryVariable(TemporaryVariableNode),
    Assignment,
    IfThenElse,
    ExecutionSequence { outputs: usize },
    CallFunction(CallFunctionNode),
    AddDelegate(AddDelegateNode),
    ForEach(ForEachLoop),
    MapForEach(MapForEachLoop),
    BindEvents(BindEventsNode),
}

impl NodeKind {
    pub fn title(&self) -> String {
        match self {
            NodeKind::Event(event) => format!("Event {}", event.name),
            NodeKind::CustomEvent(event) => event.name.clone(),
            NodeKind::TemporaryVariable(var) => format!("Local {}", var.variable_type),
            NodeKind::Assignment => "Assign".to_string(),
            NodeKind::IfThenElse => "Branch".to_string(),
            NodeKind::ExecutionSequence { .. } => "Sequence".to_string(),
            NodeKind::CallFunction(call) => call.signature.name.clone(),
            NodeKind::AddDelegate(add) => format!("Bind Event to {}", add.dispatcher),
            NodeKind::ForEach(_) => for_each::TITLE.to_string(),
            NodeKind::MapForEach(_) => map_for_each::TITLE.to_string(),
            NodeKind::BindEvents(bind) => format!("Bind Events on {}", bind.class.name),
        }
    }

    pub fn is_macro(&self) -> bool {
        self.expansion_state().is_some()
    }

    /// Lifecycle state of a macro node; `None` for primitives.
    pub fn expansion_state(&self) -> Option<ExpansionState> {
        match self {
            NodeKind::ForEach(state) => Some(state.expansion),
            NodeKind::MapForEach(state) => Some(state.expansion),
            NodeKind::BindEvents(state) => Some(state.expansion),
            _ => None,
        }
    }

    /// Macro node still waiting for the expansion pass.
    pub fn is_pending_expansion(&self) -> bool {
        self.expansion_state() == Some(ExpansionState::Unexpanded)
    }
}

/// Lifecycle of a macro node during compilation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpansionState {
    #[default]
    Unexpanded,
    Validating,
    /// Replaced by intermediate nodes and detached from the graph.
    Expanded,
    /// Failed validation; detached without emitting anything.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionOutcome {
    Expanded { spawned: usize },
    Rejected,
}

/// Capability interface of macro node kinds.
pub trait ExpandableNode {
    fn allocate_default_pins(graph: &mut BlueprintGraph, node: NodeId) -> Result<(), GraphError>;

    /// Called after the link list of one of the node's pins changed.
    fn pin_connection_list_changed(_graph: &mut BlueprintGraph, _node: NodeId, _pin: PinId) {}

    fn post_paste_node(_graph: &mut BlueprintGraph, _node: NodeId) {}

    /// Report problems to the message log. Returns `true` if the node must
    /// not be expanded.
    fn check_for_errors(graph: &BlueprintGraph, ctx: &mut CompilerContext<'_>, node: NodeId) -> bool;

    /// Spawn the intermediate subgraph and move the node's links onto it.
    fn expand_node(graph: &mut BlueprintGraph, ctx: &mut CompilerContext<'_>, node: NodeId) -> Result<(), GraphError>;

    fn expansion_state(graph: &BlueprintGraph, node: NodeId) -> Option<ExpansionState>;

    fn set_expansion_state(graph: &mut BlueprintGraph, node: NodeId, state: ExpansionState);

    /// Validate, expand, and detach the node.
    ///
    /// A node that fails validation is detached with no replacement, so an
    /// invalid macro emits nothing.
    fn expand(graph: &mut BlueprintGraph, ctx: &mut CompilerContext<'_>, node: NodeId) -> Result<ExpansionOutcome, GraphError> {
        match Self::expansion_state(graph, node) {
            Some(ExpansionState::Unexpanded) => {}
            Some(ExpansionState::Rejected) => return Ok(ExpansionOutcome::Rejected),
            Some(state) => {
                tracing::debug!("[EXPAND] {} skipped, already {:?}", node, state);
                return Ok(ExpansionOutcome::Expanded { spawned: 0 });
            }
            None => return Err(GraphError::NodeNotFound(node)),
        }

        Self::set_expansion_state(graph, node, ExpansionState::Validating);
        if Self::check_for_errors(graph, ctx, node) {
            graph.dissolve_node(node);
            Self::set_expansion_state(graph, node, ExpansionState::Rejected);
            tracing::warn!("[EXPAND] {} rejected", node);
            return Ok(ExpansionOutcome::Rejected);
        }

        let before = ctx.spawned_nodes().len();
        Self::expand_node(graph, ctx, node)?;
        graph.dissolve_node(node);
        Self::set_expansion_state(graph, node, ExpansionState::Expanded);

        let spawned = ctx.spawned_nodes().len() - before;
        tracing::debug!("[EXPAND] {} replaced by {} intermediate node(s)", node, spawned);
        Ok(ExpansionOutcome::Expanded { spawned })
    }
}

/// Create the pin layout for a freshly placed node.
pub fn allocate_default_pins(graph: &mut BlueprintGraph, node: NodeId) -> Result<(), GraphError> {
    let kind = graph.node_checked(node)?.kind.clone();
    match kind {
        NodeKind::ForEach(_) => ForEachLoop::allocate_default_pins(graph, node),
        NodeKind::MapForEach(_) => MapForEachLoop::allocate_default_pins(graph, node),
        NodeKind::BindEvents(_) => BindEventsNode::allocate_default_pins(graph, node),
        primitive => primitives::allocate_default_pins(graph, node, &primitive),
    }
}

/// Place a node and give it its default pins.
pub fn spawn_node(
    graph: &mut BlueprintGraph,
    kind: NodeKind,
    position: crate::graph::Position,
) -> Result<NodeId, GraphError> {
    let node = graph.add_node(kind, position);
    allocate_default_pins(graph, node)?;
    Ok(node)
}

/// Route a connection-list change on `pin` to the node that owns it.
pub fn pin_connection_list_changed(graph: &mut BlueprintGraph, pin: PinId) {
    let Some(owner) = graph.owner_of(pin) else {
        return;
    };
    let Some(node) = graph.node(owner) else {
        return;
    };

    match node.kind {
        NodeKind::ForEach(_) => ForEachLoop::pin_connection_list_changed(graph, owner, pin),
        NodeKind::MapForEach(_) => MapForEachLoop::pin_connection_list_changed(graph, owner, pin),
        NodeKind::BindEvents(_) => BindEventsNode::pin_connection_list_changed(graph, owner, pin),
        NodeKind::Assignment => primitives::assignment_connection_changed(graph, owner, pin),
        _ => {}
    }
}

/// Re-derive transient state after a node was pasted or loaded.
pub fn post_paste_node(graph: &mut BlueprintGraph, node: NodeId) {
    let Some(kind) = graph.node(node).map(|n| &n.kind) else {
        return;
    };

    match kind {
        NodeKind::ForEach(_) => ForEachLoop::post_paste_node(graph, node),
        NodeKind::MapForEach(_) => MapForEachLoop::post_paste_node(graph, node),
        NodeKind::BindEvents(_) => BindEventsNode::post_paste_node(graph, node),
        _ => {}
    }
}

/// Expand a macro node. Returns `None` for primitive nodes.
pub fn expand_node(
    graph: &mut BlueprintGraph,
    ctx: &mut CompilerContext<'_>,
    node: NodeId,
) -> Result<Option<ExpansionOutcome>, GraphError> {
    let outcome = match graph.node_checked(node)?.kind {
        NodeKind::ForEach(_) => ForEachLoop::expand(graph, ctx, node)?,
        NodeKind::MapForEach(_) => MapForEachLoop::expand(graph, ctx, node)?,
        NodeKind::BindEvents(_) => BindEventsNode::expand(graph, ctx, node)?,
        _ => return Ok(None),
    };
    Ok(Some(outcome))
}
