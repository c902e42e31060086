//! Pins derived from function and dispatcher signatures.
//!
//! Nodes such as function calls and "bind events" generate pins from a
//! [`FunctionSignature`] at placement time and rewire them during expansion.
//! Missing inputs (no signature, no naming callback) are contract violations:
//! they trip a debug assertion and otherwise return without doing anything.

use crate::compiler::CompilerContext;
use crate::graph::{pin_names, BlueprintGraph, GraphError, NodeId, Pin, PinDirection, PinId};
use crate::library::{ClassDescription, DispatcherDescription, FunctionParam, FunctionSignature};
use crate::nodes::primitives::{create_user_defined_pin, rename_custom_event};
use crate::nodes::{AddDelegateNode, CustomEventNode, NodeKind};

/// Naming or tooltip callback applied to a signature parameter.
pub type ParamText<'f> = &'f dyn Fn(&FunctionParam) -> String;

/// Per-parameter rewiring step used by [`expand_function_pins`].
pub type PinExpansion<'f> = &'f mut dyn FnMut(&mut BlueprintGraph, &FunctionParam, PinId) -> Result<(), GraphError>;

/// Parameters of `signature` that get a pin: inputs and by-reference outputs.
fn pin_params(signature: &FunctionSignature) -> impl Iterator<Item = &FunctionParam> {
    signature.params.iter().filter(|p| p.is_input_pin())
}

/// Name of the pin carrying `param` of `dispatcher` on a node.
pub fn dispatcher_param_pin_name(dispatcher: &DispatcherDescription, param: &FunctionParam) -> String {
    format!("{} - {}", dispatcher.name, param.name)
}

/// Create one pin per input (or by-reference) parameter of `signature`.
pub fn create_function_pins(
    graph: &mut BlueprintGraph,
    node: NodeId,
    signature: Option<&FunctionSignature>,
    direction: PinDirection,
    make_advanced: bool,
    pin_name: Option<ParamText<'_>>,
    pin_tooltip: Option<ParamText<'_>>,
) -> Vec<PinId> {
    if !crate::ensure_always!(graph.node(node).is_some(), "create_function_pins: {} is not in the graph", node) {
        return Vec::new();
    }
    let Some(signature) = signature else {
        crate::ensure_always!(false, "create_function_pins: no signature for {}", node);
        return Vec::new();
    };
    let Some(pin_name) = pin_name else {
        crate::ensure_always!(false, "create_function_pins: no pin naming for '{}'", signature.name);
        return Vec::new();
    };

    let mut new_pins = Vec::new();
    for param in pin_params(signature) {
        let name = pin_name(param);
        match graph.create_pin(node, direction, param.pin_type(), &name) {
            Ok(pin) => {
                if let Some(pin_ref) = graph.pin_mut(pin) {
                    if let Some(tooltip) = pin_tooltip {
                        pin_ref.tooltip = tooltip(param);
                    }
                    pin_ref.advanced_view = make_advanced;
                }
                new_pins.push(pin);
            }
            Err(err) => {
                crate::ensure_always!(false, "create_function_pins: {}", err);
            }
        }
    }
    new_pins
}

/// Run `expansion` for every existing pin that [`create_function_pins`]
/// would have created for `signature`.
///
/// Parameters whose pin is missing from the node are skipped.
pub fn expand_function_pins(
    graph: &mut BlueprintGraph,
    node: NodeId,
    signature: Option<&FunctionSignature>,
    direction: PinDirection,
    pin_name: Option<ParamText<'_>>,
    expansion: Option<PinExpansion<'_>>,
) -> Result<(), GraphError> {
    if !crate::ensure_always!(graph.node(node).is_some(), "expand_function_pins: {} is not in the graph", node) {
        return Ok(());
    }
    let (Some(signature), Some(pin_name), Some(expansion)) = (signature, pin_name, expansion) else {
        crate::ensure_always!(false, "expand_function_pins: missing signature or callback for {}", node);
        return Ok(());
    };

    for param in pin_params(signature) {
        let Some(pin) = graph.find_pin(node, &pin_name(param), Some(direction)) else {
            continue;
        };
        expansion(graph, param, pin)?;
    }
    Ok(())
}

/// Add an exec output per dispatcher of `class`, followed by that
/// dispatcher's parameter pins.
pub fn create_event_dispatcher_pins(
    graph: &mut BlueprintGraph,
    class: &ClassDescription,
    node: NodeId,
    mut out_pins: Option<&mut Vec<PinId>>,
    make_advanced: bool,
    ignore_dispatchers: &[String],
) {
    let tooltip: ParamText<'_> = &|param| param.tooltip.clone().unwrap_or_default();

    for dispatcher in &class.dispatchers {
        if ignore_dispatchers.contains(&dispatcher.name) {
            continue;
        }

        let exec = match graph.create_pin(node, PinDirection::Output, crate::graph::PinType::exec(), &dispatcher.name) {
            Ok(pin) => pin,
            Err(err) => {
                crate::ensure_always!(false, "create_event_dispatcher_pins: {}", err);
                continue;
            }
        };
        if let Some(pin) = graph.pin_mut(exec) {
            pin.advanced_view = make_advanced;
            pin.tooltip = dispatcher.tooltip.clone();
        }
        if let Some(out) = out_pins.as_deref_mut() {
            out.push(exec);
        }

        let Some(signature) = &dispatcher.signature else {
            continue;
        };
        let name: ParamText<'_> = &|param| dispatcher_param_pin_name(dispatcher, param);
        let params = create_function_pins(
            graph,
            node,
            Some(signature),
            PinDirection::Output,
            make_advanced,
            Some(name),
            Some(tooltip),
        );
        if let Some(out) = out_pins.as_deref_mut() {
            out.extend(params);
        }
    }
}

/// Spawn a custom event bound to `source_pin` (a delegate input) whose
/// execution continues where `external_pin` used to lead.
pub fn create_custom_event(
    ctx: &mut CompilerContext<'_>,
    graph: &mut BlueprintGraph,
    source_pin: PinId,
    node: NodeId,
    external_pin: PinId,
) -> Result<NodeId, GraphError> {
    let name = format!(
        "{}_{}",
        graph.pin_checked(source_pin)?.name,
        ctx.unique_name_suffix(graph, node)
    );
    let event = ctx.spawn_intermediate_node(graph, node, NodeKind::CustomEvent(CustomEventNode::new(&name)))?;

    let delegate = graph.find_pin_checked(event, pin_names::OUTPUT_DELEGATE)?;
    graph.make_link(source_pin, delegate)?;

    let then = graph.find_pin_checked(event, pin_names::THEN)?;
    ctx.move_pin_links_to_intermediate(graph, external_pin, then)?;

    Ok(event)
}

/// Replace the generated dispatcher pins of `node` with a chain of
/// delegate bindings, one per dispatcher, starting from `exec_pin`.
///
/// Each binding subscribes a fresh custom event that takes over the
/// dispatcher pin's exec links and parameter links. Returns the last `then`
/// pin of the chain, or `exec_pin` when nothing was bound.
pub fn expand_dispatcher_pins(
    ctx: &mut CompilerContext<'_>,
    graph: &mut BlueprintGraph,
    node: NodeId,
    exec_pin: PinId,
    class: &ClassDescription,
    instance_pin: PinId,
    is_generated_pin: &dyn Fn(&Pin) -> bool,
) -> Result<PinId, GraphError> {
    let mut last_then = exec_pin;

    for pin in graph.pins_of(node).to_vec() {
        let Some(pin_ref) = graph.pin(pin) else {
            continue;
        };
        if !pin_ref.is_exec() || pin_ref.direction != PinDirection::Output || !is_generated_pin(pin_ref) {
            continue;
        }
        let pin_name = pin_ref.name.clone();
        let Some(dispatcher) = class.find_dispatcher(&pin_name) else {
            continue;
        };

        let add = ctx.spawn_intermediate_node(
            graph,
            node,
            NodeKind::AddDelegate(AddDelegateNode::new(&class.name, &dispatcher.name)),
        )?;
        let add_self = graph.find_pin_checked(add, pin_names::SELF)?;
        graph.make_link(instance_pin, add_self)?;

        let add_exec = graph.find_pin_checked(add, pin_names::EXECUTE)?;
        graph.make_link(last_then, add_exec)?;
        last_then = graph.find_pin_checked(add, pin_names::THEN)?;

        let add_delegate = graph.find_pin_checked(add, pin_names::DELEGATE)?;
        let event = create_custom_event(ctx, graph, add_delegate, node, pin)?;
        let event_name = format!("{}_{}", pin_name, ctx.unique_name_suffix(graph, node));
        rename_custom_event(graph, event, &event_name);

        let Some(signature) = &dispatcher.signature else {
            continue;
        };
        let name: ParamText<'_> = &|param| dispatcher_param_pin_name(dispatcher, param);
        let mut move_to_event = |graph: &mut BlueprintGraph, param: &FunctionParam, node_pin: PinId| -> Result<(), GraphError> {
            let pin_type = graph.pin_checked(node_pin)?.pin_type.clone();
            let event_pin = create_user_defined_pin(graph, event, &param.name, pin_type)?;
            ctx.move_pin_links_to_intermediate(graph, node_pin, event_pin)
        };
        expand_function_pins(
            graph,
            node,
            Some(signature),
            PinDirection::Output,
            Some(name),
            Some(&mut move_to_event),
        )?;
    }

    Ok(last_then)
}

/// Move `pin` to `new_index` in the pin order of `node`.
///
/// Pins that don't belong to the node are ignored; an out-of-range index is
/// a contract violation.
pub fn reorder_pin(graph: &mut BlueprintGraph, node: NodeId, pin: PinId, new_index: usize) {
    if !graph.pins_of(node).contains(&pin) {
        return;
    }
    let moved = graph.move_pin(node, pin, new_index);
    crate::ensure_always!(moved, "reorder_pin: index {} out of range for {}", new_index, node);
}

/// Tooltip in the editor's layout: display name, description, then type.
pub fn set_pin_tooltip(graph: &mut BlueprintGraph, pin: PinId, description: &str) -> Result<(), GraphError> {
    let pin_ref = graph.pin_checked_mut(pin)?;
    let mut tooltip = pin_ref.display_name().to_string();
    if !description.is_empty() {
        tooltip.push('\n');
        tooltip.push_str(description);
    }
    tooltip.push_str("\n\n");
    tooltip.push_str(&pin_ref.pin_type.to_string());
    pin_ref.tooltip = tooltip;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{PinType, Position};
    use crate::library::FunctionLibrary;
    use crate::nodes::EventNode;

    fn host(graph: &mut BlueprintGraph) -> NodeId {
        graph.add_node(NodeKind::Event(EventNode::new("Host")), Position::default())
    }

    fn sample_signature() -> FunctionSignature {
        FunctionSignature::new("Sample")
            .param(FunctionParam::input("Count", "i32").with_tooltip("How many"))
            .param(FunctionParam::by_ref("Items", "&mut Vec<i32>"))
            .param(FunctionParam::output("Result", "bool"))
    }

    #[test]
    fn test_create_function_pins_skips_value_outputs() {
        let mut graph = BlueprintGraph::new("pins");
        let node = host(&mut graph);
        let name: ParamText<'_> = &|p| format!("In {}", p.name);
        let tooltip: ParamText<'_> = &|p| p.tooltip.clone().unwrap_or_default();

        let pins = create_function_pins(
            &mut graph,
            node,
            Some(&sample_signature()),
            PinDirection::Input,
            true,
            Some(name),
            Some(tooltip),
        );

        assert_eq!(pins.len(), 2);
        let count = graph.pin(pins[0]).unwrap();
        assert_eq!(count.name, "In Count");
        assert_eq!(count.tooltip, "How many");
        assert!(count.advanced_view);
        assert_eq!(count.pin_type, PinType::int());
        assert_eq!(graph.pin(pins[1]).unwrap().name, "In Items");
        assert!(graph.find_pin(node, "In Result", None).is_none());
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic)]
    fn test_create_function_pins_without_naming_is_a_no_op() {
        let mut graph = BlueprintGraph::new("pins");
        let node = host(&mut graph);
        let pins = create_function_pins(
            &mut graph,
            node,
            Some(&sample_signature()),
            PinDirection::Input,
            false,
            None,
            None,
        );
        assert!(pins.is_empty());
        assert!(graph.pins_of(node).is_empty());
    }

    #[test]
    fn test_expand_function_pins_visits_existing_pins() {
        let mut graph = BlueprintGraph::new("expand");
        let node = host(&mut graph);
        let signature = sample_signature();
        let name: ParamText<'_> = &|p| p.name.clone();
        // Only "Count" exists; "Items" is skipped
        graph.create_pin(node, PinDirection::Output, PinType::int(), "Count").unwrap();

        let mut visited = Vec::new();
        let mut record = |_: &mut BlueprintGraph, param: &FunctionParam, _: PinId| -> Result<(), GraphError> {
            visited.push(param.name.clone());
            Ok(())
        };
        expand_function_pins(
            &mut graph,
            node,
            Some(&signature),
            PinDirection::Output,
            Some(name),
            Some(&mut record),
        )
        .unwrap();

        assert_eq!(visited, vec!["Count".to_string()]);
    }

    #[test]
    fn test_dispatcher_pins_and_ignore_list() {
        let class = ClassDescription::new("Door")
            .with_dispatcher(DispatcherDescription::new(
                "OnOpened",
                Some(FunctionSignature::new("OnOpened").param(FunctionParam::input("By", "Object<Pawn>"))),
            ))
            .with_dispatcher(DispatcherDescription::new("OnClosed", None))
            .with_dispatcher(DispatcherDescription::new("OnLocked", None));

        let mut graph = BlueprintGraph::new("dispatchers");
        let node = host(&mut graph);
        let mut created = Vec::new();
        create_event_dispatcher_pins(&mut graph, &class, node, Some(&mut created), false, &["OnLocked".to_string()]);

        let names: Vec<_> = created.iter().map(|p| graph.pin(*p).unwrap().name.clone()).collect();
        assert_eq!(names, vec!["OnOpened", "OnOpened - By", "OnClosed"]);
        let by = graph.find_pin_checked(node, "OnOpened - By").unwrap();
        assert_eq!(graph.pin(by).unwrap().direction, PinDirection::Output);
        assert_eq!(graph.pin(by).unwrap().pin_type, PinType::object("Pawn"));
    }

    #[test]
    fn test_expand_dispatcher_pins_builds_binding_chain() {
        let library = FunctionLibrary::new();
        let mut ctx = CompilerContext::new(&library);
        let class = ClassDescription::new("Door")
            .with_dispatcher(DispatcherDescription::new(
                "OnOpened",
                Some(FunctionSignature::new("OnOpened").param(FunctionParam::input("Angle", "f32"))),
            ))
            .with_dispatcher(DispatcherDescription::new("OnClosed", None));

        let mut graph = BlueprintGraph::new("bindings");
        let node = host(&mut graph);
        let start = graph.create_pin(node, PinDirection::Output, PinType::exec(), "start").unwrap();
        let instance = graph.create_pin(node, PinDirection::Output, PinType::object("Door"), "instance").unwrap();
        create_event_dispatcher_pins(&mut graph, &class, node, None, false, &[]);

        let listener = host(&mut graph);
        let listener_exec = graph.create_pin(listener, PinDirection::Input, PinType::exec(), "execute").unwrap();
        let listener_angle = graph.create_pin(listener, PinDirection::Input, PinType::float(), "angle").unwrap();
        let opened = graph.find_pin_checked(node, "OnOpened").unwrap();
        let angle = graph.find_pin_checked(node, "OnOpened - Angle").unwrap();
        graph.make_link(opened, listener_exec).unwrap();
        graph.make_link(angle, listener_angle).unwrap();

        let generated = |pin: &Pin| pin.name != "start";
        let last_then = expand_dispatcher_pins(&mut ctx, &mut graph, node, start, &class, instance, &generated).unwrap();

        // Two bindings and two custom events
        assert_eq!(ctx.spawned_nodes().len(), 4);
        let first_add = graph.owner_of(graph.linked_to(start)[0]).unwrap();
        assert!(matches!(graph.node(first_add).unwrap().kind, NodeKind::AddDelegate(_)));
        assert_ne!(last_then, start);
        assert_eq!(graph.linked_to(instance).len(), 2);

        // The listener is now driven by the custom event bound to OnOpened
        let event = graph.owner_of(graph.linked_to(listener_exec)[0]).unwrap();
        let suffix = ctx.unique_name_suffix(&graph, node);
        assert_eq!(graph.node(event).unwrap().title, format!("OnOpened_{}", suffix));
        let event_angle = graph.find_pin_checked(event, "Angle").unwrap();
        assert_eq!(graph.linked_to(listener_angle), vec![event_angle]);
        assert!(graph.linked_to(opened).is_empty());
    }

    #[test]
    fn test_reorder_and_tooltip() {
        let mut graph = BlueprintGraph::new("order");
        let node = host(&mut graph);
        let a = graph.create_pin(node, PinDirection::Input, PinType::int(), "A").unwrap();
        let b = graph.create_pin(node, PinDirection::Input, PinType::int(), "B").unwrap();

        reorder_pin(&mut graph, node, b, 0);
        assert_eq!(graph.pins_of(node), &[b, a]);

        let other = host(&mut graph);
        reorder_pin(&mut graph, other, a, 0);
        assert_eq!(graph.pins_of(node), &[b, a]);

        set_pin_tooltip(&mut graph, a, "First operand").unwrap();
        assert_eq!(graph.pin(a).unwrap().tooltip, "A\nFirst operand\n\nint");
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic)]
    fn test_reorder_out_of_range_is_a_contract_violation() {
        let mut graph = BlueprintGraph::new("order");
        let node = host(&mut graph);
        let a = graph.create_pin(node, PinDirection::Input, PinType::int(), "A").unwrap();
        reorder_pin(&mut graph, node, a, 3);
        assert_eq!(graph.pins_of(node), &[a]);
    }
}
