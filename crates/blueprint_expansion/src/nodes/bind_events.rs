//! # Bind Events
//!
//! Subscribes to every event dispatcher of a class in one node. Each
//! dispatcher gets an exec output (fired when the dispatcher broadcasts) and
//! one output per dispatcher parameter, named `"<Dispatcher> - <Param>"`.
//!
//! Expansion stages the target in a temporary variable, then chains one
//! delegate binding per dispatcher, each bound to a generated custom event.

use serde::{Deserialize, Serialize};

use super::primitives::assignment_pins;
use super::{ExpandableNode, ExpansionState, NodeKind, TemporaryVariableNode};
use crate::compiler::utils::{create_event_dispatcher_pins, expand_dispatcher_pins, move_pin_links_or_copy_defaults};
use crate::compiler::CompilerContext;
use crate::graph::{pin_names, schema, BlueprintGraph, GraphError, NodeId, PinDirection, PinType};
use crate::library::ClassDescription;

pub const TARGET_PIN: &str = "Target";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindEventsNode {
    pub class: ClassDescription,
    /// Dispatchers that get no pins.
    pub ignore_dispatchers: Vec<String>,
    pub make_advanced: bool,
    pub expansion: ExpansionState,
}

impl BindEventsNode {
    pub fn new(class: ClassDescription) -> Self {
        Self {
            class,
            ignore_dispatchers: Vec::new(),
            make_advanced: false,
            expansion: ExpansionState::Unexpanded,
        }
    }

    pub fn ignoring(mut self, dispatcher: &str) -> Self {
        self.ignore_dispatchers.push(dispatcher.to_string());
        self
    }
}

fn state(graph: &BlueprintGraph, node: NodeId) -> Option<&BindEventsNode> {
    match &graph.node(node)?.kind {
        NodeKind::BindEvents(state) => Some(state),
        _ => None,
    }
}

fn state_mut(graph: &mut BlueprintGraph, node: NodeId) -> Option<&mut BindEventsNode> {
    match &mut graph.node_mut(node)?.kind {
        NodeKind::BindEvents(state) => Some(state),
        _ => None,
    }
}

impl ExpandableNode for BindEventsNode {
    fn allocate_default_pins(graph: &mut BlueprintGraph, node: NodeId) -> Result<(), GraphError> {
        let state = state(graph, node).cloned().ok_or(GraphError::NodeNotFound(node))?;

        graph.create_pin(node, PinDirection::Input, PinType::exec(), pin_names::EXECUTE)?;
        let target = graph.create_pin(
            node,
            PinDirection::Input,
            PinType::object(state.class.name.as_str()),
            TARGET_PIN,
        )?;
        graph.pin_checked_mut(target)?.tooltip = format!("{} whose events are bound", state.class.name);
        graph.create_pin(node, PinDirection::Output, PinType::exec(), pin_names::THEN)?;

        create_event_dispatcher_pins(
            graph,
            &state.class,
            node,
            None,
            state.make_advanced,
            &state.ignore_dispatchers,
        );
        Ok(())
    }

    fn check_for_errors(graph: &BlueprintGraph, ctx: &mut CompilerContext<'_>, node: NodeId) -> bool {
        let Some(state) = state(graph, node) else {
            return true;
        };

        let has_target = graph
            .find_pin(node, TARGET_PIN, Some(PinDirection::Input))
            .and_then(|pin| graph.pin(pin))
            .is_some_and(|pin| pin.has_links() || pin.default_object.is_some());
        if !has_target {
            ctx.message_log
                .error(graph, "Bind Events node @@ must have a target to bind to.", node);
            return true;
        }

        let bound = state
            .class
            .dispatchers
            .iter()
            .filter(|d| !state.ignore_dispatchers.contains(&d.name))
            .count();
        if bound == 0 {
            ctx.message_log
                .warning(graph, "Bind Events node @@ has no event dispatchers to bind.", node);
        }
        false
    }

    fn expand_node(graph: &mut BlueprintGraph, ctx: &mut CompilerContext<'_>, node: NodeId) -> Result<(), GraphError> {
        let class = state(graph, node)
            .map(|s| s.class.clone())
            .ok_or(GraphError::NodeNotFound(node))?;

        let exec_pin = graph.find_pin_checked(node, pin_names::EXECUTE)?;
        let target_pin = graph.find_pin_checked(node, TARGET_PIN)?;
        let then_pin = graph.find_pin_checked(node, pin_names::THEN)?;

        // Every binding reads the same instance
        let instance = ctx.spawn_intermediate_node(
            graph,
            node,
            NodeKind::TemporaryVariable(TemporaryVariableNode::new(PinType::object(class.name.as_str()))),
        )?;
        let instance_var = graph.find_pin_checked(instance, pin_names::VARIABLE)?;

        let assign = ctx.spawn_intermediate_node(graph, node, NodeKind::Assignment)?;
        let (assign_exec, assign_then, assign_var, assign_value) = assignment_pins(graph, assign)?;
        ctx.move_pin_links_to_intermediate(graph, exec_pin, assign_exec)?;
        schema::try_create_connection(graph, assign_var, instance_var);
        move_pin_links_or_copy_defaults(ctx, graph, target_pin, assign_value)?;

        let last_then = expand_dispatcher_pins(ctx, graph, node, assign_then, &class, instance_var, &|pin| {
            pin.name != pin_names::THEN
        })?;
        ctx.move_pin_links_to_intermediate(graph, then_pin, last_then)?;

        Ok(())
    }

    fn expansion_state(graph: &BlueprintGraph, node: NodeId) -> Option<ExpansionState> {
        state(graph, node).map(|s| s.expansion)
    }

    fn set_expansion_state(graph: &mut BlueprintGraph, node: NodeId, expansion: ExpansionState) {
        if let Some(s) = state_mut(graph, node) {
            s.expansion = expansion;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Position;
    use crate::library::{DispatcherDescription, FunctionParam, FunctionSignature};
    use crate::nodes;

    fn door() -> ClassDescription {
        ClassDescription::new("Door")
            .with_dispatcher(DispatcherDescription::new(
                "OnOpened",
                Some(FunctionSignature::new("OnOpened").param(FunctionParam::input("Angle", "f32"))),
            ))
            .with_dispatcher(DispatcherDescription::new("OnClosed", None))
    }

    #[test]
    fn test_pin_shape_per_dispatcher() {
        let mut graph = BlueprintGraph::new("bind");
        let node = nodes::spawn_node(
            &mut graph,
            NodeKind::BindEvents(BindEventsNode::new(door())),
            Position::default(),
        )
        .unwrap();

        let names: Vec<_> = graph
            .pins_of(node)
            .iter()
            .map(|p| graph.pin(*p).unwrap().name.clone())
            .collect();
        assert_eq!(names, vec!["execute", TARGET_PIN, "then", "OnOpened", "OnOpened - Angle", "OnClosed"]);
        let target = graph.find_pin_checked(node, TARGET_PIN).unwrap();
        assert_eq!(graph.pin_type(target), Some(&PinType::object("Door")));
    }

    #[test]
    fn test_ignored_dispatchers_get_no_pins() {
        let mut graph = BlueprintGraph::new("bind");
        let node = nodes::spawn_node(
            &mut graph,
            NodeKind::BindEvents(BindEventsNode::new(door()).ignoring("OnOpened")),
            Position::default(),
        )
        .unwrap();

        assert!(graph.find_pin(node, "OnOpened", None).is_none());
        assert!(graph.find_pin(node, "OnOpened - Angle", None).is_none());
        assert!(graph.find_pin(node, "OnClosed", None).is_some());
    }
}
