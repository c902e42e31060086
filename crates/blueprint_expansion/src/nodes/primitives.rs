//! Primitive node kinds understood by the compiler backend and the VM.

use serde::{Deserialize, Serialize};

use super::NodeKind;
use crate::compiler::utils::create_function_pins;
use crate::graph::{pin_names, schema, BlueprintGraph, GraphError, NodeId, PinDirection, PinId, PinType};
use crate::library::{FunctionParam, FunctionSignature};

/// Name of the `index`-th output of an execution sequence.
pub fn sequence_then_pin_name(index: usize) -> String {
    format!("then_{}", index)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPinInfo {
    pub name: String,
    pub pin_type: PinType,
}

/// Entry point fired by the host, e.g. `BeginPlay`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventNode {
    pub name: String,
    pub params: Vec<UserPinInfo>,
}

impl EventNode {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: &str, pin_type: PinType) -> Self {
        self.params.push(UserPinInfo {
            name: name.to_string(),
            pin_type,
        });
        self
    }
}

/// Event with a delegate output, bound to a dispatcher at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomEventNode {
    pub name: String,
    pub user_pins: Vec<UserPinInfo>,
}

impl CustomEventNode {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            user_pins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporaryVariableNode {
    pub variable_type: PinType,
}

impl TemporaryVariableNode {
    pub fn new(variable_type: PinType) -> Self {
        Self { variable_type }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallFunctionNode {
    pub signature: FunctionSignature,
}

impl CallFunctionNode {
    pub fn new(signature: FunctionSignature) -> Self {
        Self { signature }
    }
}

/// Adds the delegate on its `Delegate` pin to a dispatcher of the `self` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddDelegateNode {
    pub class: String,
    pub dispatcher: String,
}

impl AddDelegateNode {
    pub fn new(class: &str, dispatcher: &str) -> Self {
        Self {
            class: class.to_string(),
            dispatcher: dispatcher.to_string(),
        }
    }
}

fn exec_in(graph: &mut BlueprintGraph, node: NodeId) -> Result<PinId, GraphError> {
    graph.create_pin(node, PinDirection::Input, PinType::exec(), pin_names::EXECUTE)
}

fn then_out(graph: &mut BlueprintGraph, node: NodeId) -> Result<PinId, GraphError> {
    graph.create_pin(node, PinDirection::Output, PinType::exec(), pin_names::THEN)
}

pub(super) fn allocate_default_pins(graph: &mut BlueprintGraph, node: NodeId, kind: &NodeKind) -> Result<(), GraphError> {
    match kind {
        NodeKind::Event(event) => {
            then_out(graph, node)?;
            for param in &event.params {
                graph.create_pin(node, PinDirection::Output, param.pin_type.clone(), &param.name)?;
            }
        }
        NodeKind::CustomEvent(event) => {
            graph.create_pin(node, PinDirection::Output, PinType::delegate(), pin_names::OUTPUT_DELEGATE)?;
            then_out(graph, node)?;
            for param in &event.user_pins {
                graph.create_pin(node, PinDirection::Output, param.pin_type.clone(), &param.name)?;
            }
        }
        NodeKind::TemporaryVariable(var) => {
            graph.create_pin(node, PinDirection::Output, var.variable_type.clone(), pin_names::VARIABLE)?;
        }
        NodeKind::Assignment => {
            exec_in(graph, node)?;
            then_out(graph, node)?;
            let mut variable_type = PinType::wildcard();
            variable_type.is_reference = true;
            graph.create_pin(node, PinDirection::Input, variable_type, pin_names::VARIABLE)?;
            graph.create_pin(node, PinDirection::Input, PinType::wildcard(), pin_names::VALUE)?;
        }
        NodeKind::IfThenElse => {
            exec_in(graph, node)?;
            let condition = graph.create_pin(node, PinDirection::Input, PinType::boolean(), pin_names::CONDITION)?;
            graph.set_default_value(condition, "true")?;
            let then = then_out(graph, node)?;
            let otherwise = graph.create_pin(node, PinDirection::Output, PinType::exec(), pin_names::ELSE)?;
            graph.pin_checked_mut(then)?.friendly_name = Some("true".to_string());
            graph.pin_checked_mut(otherwise)?.friendly_name = Some("false".to_string());
        }
        NodeKind::ExecutionSequence { outputs } => {
            exec_in(graph, node)?;
            for index in 0..*outputs {
                graph.create_pin(node, PinDirection::Output, PinType::exec(), &sequence_then_pin_name(index))?;
            }
        }
        NodeKind::CallFunction(call) => {
            let signature = &call.signature;
            if !signature.is_pure {
                exec_in(graph, node)?;
                then_out(graph, node)?;
            }

            let name: &dyn Fn(&FunctionParam) -> String = &|param| param.name.clone();
            let tooltip: &dyn Fn(&FunctionParam) -> String = &|param| param.tooltip.clone().unwrap_or_default();
            create_function_pins(
                graph,
                node,
                Some(signature),
                PinDirection::Input,
                false,
                Some(name),
                Some(tooltip),
            );

            for param in signature.output_params() {
                let pin = graph.create_pin(node, PinDirection::Output, param.pin_type(), &param.name)?;
                graph.pin_checked_mut(pin)?.tooltip = tooltip(param);
            }
        }
        NodeKind::AddDelegate(add) => {
            exec_in(graph, node)?;
            then_out(graph, node)?;
            graph.create_pin(node, PinDirection::Input, PinType::object(add.class.as_str()), pin_names::SELF)?;
            graph.create_pin(node, PinDirection::Input, PinType::delegate(), pin_names::DELEGATE)?;
        }
        NodeKind::ForEach(_) | NodeKind::MapForEach(_) | NodeKind::BindEvents(_) => {
            tracing::error!("[GRAPH] Macro node {} routed to primitive pin allocation", node);
        }
    }
    Ok(())
}

/// Add an output pin to a custom event and record it as user-defined.
pub fn create_user_defined_pin(
    graph: &mut BlueprintGraph,
    node: NodeId,
    name: &str,
    pin_type: PinType,
) -> Result<PinId, GraphError> {
    let pin = graph.create_pin(node, PinDirection::Output, pin_type.clone(), name)?;
    if let Some(NodeKind::CustomEvent(event)) = graph.node_mut(node).map(|n| &mut n.kind) {
        event.user_pins.push(UserPinInfo {
            name: name.to_string(),
            pin_type,
        });
    }
    Ok(pin)
}

/// Rename a custom event, keeping the node title in sync.
pub fn rename_custom_event(graph: &mut BlueprintGraph, node: NodeId, name: &str) {
    if let Some(n) = graph.node_mut(node) {
        if let NodeKind::CustomEvent(event) = &mut n.kind {
            event.name = name.to_string();
            n.title = name.to_string();
        }
    }
}

/// Pins of an assignment node: (execute, then, Variable, Value).
pub(crate) fn assignment_pins(graph: &BlueprintGraph, node: NodeId) -> Result<(PinId, PinId, PinId, PinId), GraphError> {
    Ok((
        graph.find_pin_checked(node, pin_names::EXECUTE)?,
        graph.find_pin_checked(node, pin_names::THEN)?,
        graph.find_pin_checked(node, pin_names::VARIABLE)?,
        graph.find_pin_checked(node, pin_names::VALUE)?,
    ))
}

/// Assignment pins take the type of the variable they write to.
pub(super) fn assignment_connection_changed(graph: &mut BlueprintGraph, node: NodeId, pin: PinId) {
    if graph.pin(pin).map(|p| p.name.as_str()) != Some(pin_names::VARIABLE) {
        return;
    }

    let resolved = schema::get_input_pin_link(graph, pin)
        .and_then(|source| graph.pin_type(source).cloned())
        .unwrap_or_else(PinType::wildcard);

    let mut variable_type = resolved.clone();
    variable_type.is_reference = true;
    let mut value_type = resolved;
    value_type.is_reference = false;
    value_type.is_const = false;

    let value = graph.find_pin(node, pin_names::VALUE, Some(PinDirection::Input));
    if graph.set_pin_type(pin, variable_type).is_err() {
        return;
    }
    if let Some(value) = value {
        let _ = graph.set_pin_type(value, value_type);
    }
    graph.mark_modified();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Position;
    use crate::library::FunctionLibrary;
    use crate::nodes::spawn_node;

    #[test]
    fn test_branch_defaults_to_true() {
        let mut graph = BlueprintGraph::new("branch");
        let branch = spawn_node(&mut graph, NodeKind::IfThenElse, Position::default()).unwrap();
        let condition = graph.find_pin_checked(branch, pin_names::CONDITION).unwrap();
        assert_eq!(graph.pin(condition).unwrap().default_value, "true");
        assert_eq!(graph.pins_of(branch).len(), 4);
    }

    #[test]
    fn test_call_function_pin_layout() {
        let library = FunctionLibrary::with_builtins();

        let mut graph = BlueprintGraph::new("calls");
        let pure = CallFunctionNode::new(library.signature("Array_Get").unwrap().clone());
        let get = spawn_node(&mut graph, NodeKind::CallFunction(pure), Position::default()).unwrap();
        let names: Vec<_> = graph
            .pins_of(get)
            .iter()
            .map(|p| graph.pin(*p).unwrap().name.clone())
            .collect();
        assert_eq!(names, vec!["TargetArray", "Index", "Item"]);
        assert_eq!(graph.pin(graph.find_pin_checked(get, "Item").unwrap()).unwrap().direction, PinDirection::Output);

        let impure = CallFunctionNode::new(library.signature("Map_Keys").unwrap().clone());
        let keys = spawn_node(&mut graph, NodeKind::CallFunction(impure), Position::default()).unwrap();
        assert!(graph.find_pin(keys, pin_names::EXECUTE, Some(PinDirection::Input)).is_some());
        assert!(graph.find_pin(keys, pin_names::THEN, Some(PinDirection::Output)).is_some());
    }

    #[test]
    fn test_assignment_follows_variable_type() {
        let mut graph = BlueprintGraph::new("assign");
        let var = spawn_node(
            &mut graph,
            NodeKind::TemporaryVariable(TemporaryVariableNode::new(PinType::int())),
            Position::default(),
        )
        .unwrap();
        let assign = spawn_node(&mut graph, NodeKind::Assignment, Position::default()).unwrap();
        let var_out = graph.find_pin_checked(var, pin_names::VARIABLE).unwrap();
        let assign_var = graph.find_pin_checked(assign, pin_names::VARIABLE).unwrap();
        let assign_value = graph.find_pin_checked(assign, pin_names::VALUE).unwrap();

        assert!(schema::try_create_connection(&mut graph, assign_var, var_out));
        assert_eq!(graph.pin_type(assign_value), Some(&PinType::int()));

        graph.break_all_pin_links(assign_var);
        crate::nodes::pin_connection_list_changed(&mut graph, assign_var);
        assert!(graph.pin_type(assign_value).unwrap().is_bare_wildcard());
    }

    #[test]
    fn test_user_defined_pins_recorded() {
        let mut graph = BlueprintGraph::new("custom");
        let event = spawn_node(
            &mut graph,
            NodeKind::CustomEvent(CustomEventNode::new("OnHit")),
            Position::default(),
        )
        .unwrap();
        create_user_defined_pin(&mut graph, event, "Damage", PinType::int()).unwrap();
        rename_custom_event(&mut graph, event, "OnHit_1");

        let node = graph.node(event).unwrap();
        assert_eq!(node.title, "OnHit_1");
        match &node.kind {
            NodeKind::CustomEvent(custom) => {
                assert_eq!(custom.name, "OnHit_1");
                assert_eq!(custom.user_pins.len(), 1);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }
}
