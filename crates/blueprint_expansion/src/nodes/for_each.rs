//! # For Each Loop (Native)
//!
//! Iterates an array without the overhead of a macro graph. At compile time
//! the node expands into:
//!
//! ```text
//! execute -> Counter = 0 -> Branch(Counter < Length(Array))
//!     true  -> Sequence
//!                then_0 -> Loop Body        (Element = Array[Counter])
//!                then_1 -> Counter = Counter + 1 -> Branch
//!     false -> Completed
//! Break -> Counter = LastIndex(Array)
//! ```
//!
//! Break does not jump to Completed. It moves the counter to the last index,
//! so the increment that runs after the current body pushes it past the end
//! and the next branch falls through to Completed.

use serde::{Deserialize, Serialize};

use super::{ExpandableNode, ExpansionState, NodeKind, TemporaryVariableNode};
use crate::compiler::utils::set_pin_tooltip;
use crate::compiler::CompilerContext;
use crate::graph::{
    pin_names, schema, BlueprintGraph, ContainerType, GraphError, NodeId, PinDirection, PinId, PinType,
};
use crate::nodes::primitives::{assignment_pins, sequence_then_pin_name};

pub const TITLE: &str = "For Each Loop (Native)";

pub const ARRAY_PIN: &str = "ArrayPin";
pub const BREAK_PIN: &str = "BreakPin";
pub const ELEMENT_PIN: &str = "ElementPin";
pub const ARRAY_INDEX_PIN: &str = "ArrayIndexPin";
pub const COMPLETED_PIN: &str = "CompletedPin";

const ARRAY_TOOLTIP: &str = "Array to visit all elements of";
const ELEMENT_TOOLTIP: &str = "Element of the Array";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForEachLoop {
    /// Array pin type at allocation; restored when the array is disconnected.
    pub original_wildcard_type: Option<PinType>,
    /// Array pin type as last resolved from its connection.
    pub input_current_type: Option<PinType>,
    pub expansion: ExpansionState,
}

fn state(graph: &BlueprintGraph, node: NodeId) -> Option<&ForEachLoop> {
    match &graph.node(node)?.kind {
        NodeKind::ForEach(state) => Some(state),
        _ => None,
    }
}

fn state_mut(graph: &mut BlueprintGraph, node: NodeId) -> Option<&mut ForEachLoop> {
    match &mut graph.node_mut(node)?.kind {
        NodeKind::ForEach(state) => Some(state),
        _ => None,
    }
}

fn named(graph: &mut BlueprintGraph, pin: PinId, friendly: &str) -> Result<(), GraphError> {
    graph.pin_checked_mut(pin)?.friendly_name = Some(friendly.to_string());
    Ok(())
}

fn wildcard_array() -> PinType {
    PinType::wildcard_array().as_const_ref()
}

impl ExpandableNode for ForEachLoop {
    fn allocate_default_pins(graph: &mut BlueprintGraph, node: NodeId) -> Result<(), GraphError> {
        graph.create_pin(node, PinDirection::Input, PinType::exec(), pin_names::EXECUTE)?;

        let array = graph.create_pin(node, PinDirection::Input, wildcard_array(), ARRAY_PIN)?;
        named(graph, array, "Array")?;
        let original = graph.pin_checked(array)?.pin_type.clone();

        let break_pin = graph.create_pin(node, PinDirection::Input, PinType::exec(), BREAK_PIN)?;
        named(graph, break_pin, "Break")?;
        graph.pin_checked_mut(break_pin)?.advanced_view = true;

        let body = graph.create_pin(node, PinDirection::Output, PinType::exec(), pin_names::THEN)?;
        named(graph, body, "Loop Body")?;

        let element = graph.create_pin(node, PinDirection::Output, PinType::wildcard(), ELEMENT_PIN)?;
        named(graph, element, "Array Element")?;

        let index = graph.create_pin(node, PinDirection::Output, PinType::int(), ARRAY_INDEX_PIN)?;
        named(graph, index, "Array Index")?;
        graph.pin_checked_mut(index)?.tooltip = "Index of Element into Array".to_string();

        let completed = graph.create_pin(node, PinDirection::Output, PinType::exec(), COMPLETED_PIN)?;
        named(graph, completed, "Completed")?;
        graph.pin_checked_mut(completed)?.tooltip = "Execution once all array elements have been visited".to_string();

        let current = state(graph, node).and_then(|s| s.input_current_type.clone());
        match current {
            None => {
                if let Some(s) = state_mut(graph, node) {
                    s.input_current_type = Some(original.clone());
                }
            }
            Some(current) if !current.is_wildcard() => {
                graph.set_pin_type(element, current.terminal_type_for_container())?;
                graph.set_pin_type(array, current)?;
            }
            Some(_) => {}
        }
        if let Some(s) = state_mut(graph, node) {
            s.original_wildcard_type = Some(original);
        }

        set_pin_tooltip(graph, array, ARRAY_TOOLTIP)?;
        set_pin_tooltip(graph, element, ELEMENT_TOOLTIP)?;
        Ok(())
    }

    fn pin_connection_list_changed(graph: &mut BlueprintGraph, node: NodeId, pin: PinId) {
        if graph.pin(pin).map(|p| p.name.as_str()) != Some(ARRAY_PIN) {
            return;
        }
        let Some(element) = graph.find_pin(node, ELEMENT_PIN, Some(PinDirection::Output)) else {
            return;
        };

        // Only an array-shaped peer can resolve the array pin
        let resolved = graph
            .linked_to(pin)
            .first()
            .and_then(|peer| graph.pin_type(*peer))
            .filter(|peer_type| peer_type.container == ContainerType::Array)
            .cloned();
        let current = resolved.unwrap_or_else(|| {
            state(graph, node)
                .and_then(|s| s.original_wildcard_type.clone())
                .unwrap_or_else(wildcard_array)
        });

        tracing::debug!("[EXPAND] {} array pin now {}", node, current);
        if let Err(err) = graph.set_pin_type(pin, current.clone()) {
            tracing::warn!("[EXPAND] Could not retype array pin of {}: {}", node, err);
        }
        if let Err(err) = graph.set_pin_type(element, current.terminal_type_for_container()) {
            tracing::warn!("[EXPAND] Could not retype element pin of {}: {}", node, err);
        }
        if let Some(s) = state_mut(graph, node) {
            s.input_current_type = Some(current);
        }

        schema::refresh_allowed_connections(graph, node, element);

        for (target, tooltip) in [(pin, ARRAY_TOOLTIP), (element, ELEMENT_TOOLTIP)] {
            if let Err(err) = set_pin_tooltip(graph, target, tooltip) {
                tracing::warn!("[EXPAND] Tooltip refresh failed on {}: {}", node, err);
            }
        }
    }

    fn post_paste_node(graph: &mut BlueprintGraph, node: NodeId) {
        if let Some(s) = state_mut(graph, node) {
            s.input_current_type = None;
        }
        if let Some(array) = graph.find_pin(node, ARRAY_PIN, Some(PinDirection::Input)) {
            if graph.pin(array).is_some_and(|p| p.has_links()) {
                Self::pin_connection_list_changed(graph, node, array);
            }
        }
    }

    fn check_for_errors(graph: &BlueprintGraph, ctx: &mut CompilerContext<'_>, node: NodeId) -> bool {
        let has_array = graph
            .find_pin(node, ARRAY_PIN, Some(PinDirection::Input))
            .and_then(|pin| graph.pin(pin))
            .is_some_and(|pin| pin.has_links());

        if !has_array {
            ctx.message_log
                .error(graph, "For Each (Native) node @@ must have an array to iterate.", node);
            return true;
        }
        false
    }

    fn expand_node(graph: &mut BlueprintGraph, ctx: &mut CompilerContext<'_>, node: NodeId) -> Result<(), GraphError> {
        let exec_pin = graph.find_pin_checked(node, pin_names::EXECUTE)?;
        let array_pin = graph.find_pin_checked(node, ARRAY_PIN)?;
        let break_pin = graph.find_pin_checked(node, BREAK_PIN)?;
        let body_pin = graph.find_pin_checked(node, pin_names::THEN)?;
        let element_pin = graph.find_pin_checked(node, ELEMENT_PIN)?;
        let index_pin = graph.find_pin_checked(node, ARRAY_INDEX_PIN)?;
        let completed_pin = graph.find_pin_checked(node, COMPLETED_PIN)?;

        let array_type = graph.pin_checked(array_pin)?.pin_type.clone();
        let element_type = graph.pin_checked(element_pin)?.pin_type.clone();

        // Loop counter
        let counter = ctx.spawn_intermediate_node(
            graph,
            node,
            NodeKind::TemporaryVariable(TemporaryVariableNode::new(PinType::int())),
        )?;
        let counter_var = graph.find_pin_checked(counter, pin_names::VARIABLE)?;
        ctx.move_pin_links_to_intermediate(graph, index_pin, counter_var)?;

        // Counter = 0
        let init = ctx.spawn_intermediate_node(graph, node, NodeKind::Assignment)?;
        let (init_exec, init_then, init_var, init_value) = assignment_pins(graph, init)?;
        ctx.move_pin_links_to_intermediate(graph, exec_pin, init_exec)?;
        schema::try_create_connection(graph, init_var, counter_var);
        graph.set_default_value(init_value, "0")?;

        // Branch on Counter < Length(Array)
        let branch = ctx.spawn_intermediate_node(graph, node, NodeKind::IfThenElse)?;
        let branch_exec = graph.find_pin_checked(branch, pin_names::EXECUTE)?;
        let branch_condition = graph.find_pin_checked(branch, pin_names::CONDITION)?;
        let branch_then = graph.find_pin_checked(branch, pin_names::THEN)?;
        let branch_else = graph.find_pin_checked(branch, pin_names::ELSE)?;
        graph.make_link(init_then, branch_exec)?;
        ctx.move_pin_links_to_intermediate(graph, completed_pin, branch_else)?;

        let compare = ctx.spawn_call_function(graph, node, "Less_IntInt")?;
        let compare_a = graph.find_pin_checked(compare, "A")?;
        let compare_b = graph.find_pin_checked(compare, "B")?;
        let compare_return = graph.find_pin_checked(compare, pin_names::RETURN_VALUE)?;
        graph.make_link(branch_condition, compare_return)?;
        graph.make_link(counter_var, compare_a)?;

        let length = ctx.spawn_call_function(graph, node, "Array_Length")?;
        let length_array = graph.find_pin_checked(length, "TargetArray")?;
        let length_return = graph.find_pin_checked(length, pin_names::RETURN_VALUE)?;
        graph.set_pin_type(length_array, array_type.clone())?;
        graph.make_link(compare_b, length_return)?;
        ctx.copy_pin_links_to_intermediate(graph, array_pin, length_array)?;

        // Loop body first, increment second
        let sequence = ctx.spawn_intermediate_node(graph, node, NodeKind::ExecutionSequence { outputs: 2 })?;
        let sequence_exec = graph.find_pin_checked(sequence, pin_names::EXECUTE)?;
        let sequence_body = graph.find_pin_checked(sequence, &sequence_then_pin_name(0))?;
        let sequence_increment = graph.find_pin_checked(sequence, &sequence_then_pin_name(1))?;
        graph.make_link(branch_then, sequence_exec)?;
        ctx.move_pin_links_to_intermediate(graph, body_pin, sequence_body)?;

        let get = ctx.spawn_call_function(graph, node, "Array_Get")?;
        let get_array = graph.find_pin_checked(get, "TargetArray")?;
        let get_index = graph.find_pin_checked(get, "Index")?;
        let get_item = graph.find_pin_checked(get, "Item")?;
        graph.set_pin_type(get_array, array_type.clone())?;
        graph.set_pin_type(get_item, element_type)?;
        ctx.copy_pin_links_to_intermediate(graph, array_pin, get_array)?;
        graph.make_link(get_index, counter_var)?;
        ctx.move_pin_links_to_intermediate(graph, element_pin, get_item)?;

        // Counter = Counter + 1, then back to the branch
        let increment = ctx.spawn_intermediate_node(graph, node, NodeKind::Assignment)?;
        let (inc_exec, inc_then, inc_var, inc_value) = assignment_pins(graph, increment)?;
        graph.make_link(sequence_increment, inc_exec)?;
        graph.make_link(branch_exec, inc_then)?;
        schema::try_create_connection(graph, counter_var, inc_var);

        let add = ctx.spawn_call_function(graph, node, "Add_IntInt")?;
        let add_a = graph.find_pin_checked(add, "A")?;
        let add_b = graph.find_pin_checked(add, "B")?;
        let add_return = graph.find_pin_checked(add, pin_names::RETURN_VALUE)?;
        graph.make_link(counter_var, add_a)?;
        graph.set_default_value(add_b, "1")?;
        graph.make_link(add_return, inc_value)?;

        // Break: Counter = LastIndex(Array)
        let fast_forward = ctx.spawn_intermediate_node(graph, node, NodeKind::Assignment)?;
        let (ff_exec, _, ff_var, ff_value) = assignment_pins(graph, fast_forward)?;
        ctx.move_pin_links_to_intermediate(graph, break_pin, ff_exec)?;
        schema::try_create_connection(graph, counter_var, ff_var);

        let last_index = ctx.spawn_call_function(graph, node, "Array_LastIndex")?;
        let last_array = graph.find_pin_checked(last_index, "TargetArray")?;
        let last_return = graph.find_pin_checked(last_index, pin_names::RETURN_VALUE)?;
        graph.set_pin_type(last_array, array_type)?;
        ctx.copy_pin_links_to_intermediate(graph, array_pin, last_array)?;
        graph.make_link(last_return, ff_value)?;

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
