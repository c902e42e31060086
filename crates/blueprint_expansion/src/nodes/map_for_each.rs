//! # For Each Loop (Map)
//!
//! Iterates the entries of a map. The expansion collects the keys with
//! `Map_Keys`, drives an embedded [`ForEachLoop`] over them, and looks each
//! value up with `Map_Find`. The embedded loop is itself a macro node and is
//! expanded by a later pass of the pipeline.

use serde::{Deserialize, Serialize};

use super::for_each::{self, ForEachLoop};
use super::{ExpandableNode, ExpansionState, NodeKind};
use crate::compiler::utils::set_pin_tooltip;
use crate::compiler::CompilerContext;
use crate::graph::{
    pin_names, schema, BlueprintGraph, ContainerType, GraphError, NodeId, PinDirection, PinId, PinType,
};

pub const TITLE: &str = "For Each Loop (Map)";

pub const MAP_PIN: &str = "MapPin";
pub const BREAK_PIN: &str = "BreakPin";
pub const KEY_PIN: &str = "KeyPin";
pub const VALUE_PIN: &str = "ValuePin";
pub const COMPLETED_PIN: &str = "CompletedPin";

const MAP_TOOLTIP: &str = "Map to visit all elements of";
const KEY_TOOLTIP: &str = "Key of Value into Map";
const VALUE_TOOLTIP: &str = "Value of the Map";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapForEachLoop {
    pub input_wildcard_type: PinType,
    pub output_wildcard_type: PinType,
    pub input_current_type: PinType,
    pub key_current_type: PinType,
    pub value_current_type: PinType,
    /// Capture the wildcard types on the next pin allocation.
    pub one_time_init: bool,
    /// User-visible name of the key pin.
    pub key_name: String,
    /// User-visible name of the value pin.
    pub value_name: String,
    pub expansion: ExpansionState,
}

impl Default for MapForEachLoop {
    fn default() -> Self {
        Self {
            input_wildcard_type: wildcard_map(),
            output_wildcard_type: PinType::wildcard(),
            input_current_type: wildcard_map(),
            key_current_type: PinType::wildcard(),
            value_current_type: PinType::wildcard(),
            one_time_init: true,
            key_name: "Map Key".to_string(),
            value_name: "Map Value".to_string(),
            expansion: ExpansionState::Unexpanded,
        }
    }
}

fn wildcard_map() -> PinType {
    PinType::wildcard_map().as_const_ref()
}

fn state(graph: &BlueprintGraph, node: NodeId) -> Option<&MapForEachLoop> {
    match &graph.node(node)?.kind {
        NodeKind::MapForEach(state) => Some(state),
        _ => None,
    }
}

fn state_mut(graph: &mut BlueprintGraph, node: NodeId) -> Option<&mut MapForEachLoop> {
    match &mut graph.node_mut(node)?.kind {
        NodeKind::MapForEach(state) => Some(state),
        _ => None,
    }
}

fn set_friendly_name(graph: &mut BlueprintGraph, node: NodeId, pin_name: &str, friendly: &str) {
    if let Some(pin) = graph.find_pin(node, pin_name, None).and_then(|p| graph.pin_mut(p)) {
        pin.friendly_name = Some(friendly.to_string());
    }
}

/// Rename the key pin as shown to users.
pub fn set_key_name(graph: &mut BlueprintGraph, node: NodeId, name: &str) {
    if let Some(s) = state_mut(graph, node) {
        s.key_name = name.to_string();
        set_friendly_name(graph, node, KEY_PIN, name);
        graph.notify_graph_changed();
        graph.mark_modified();
    }
}

/// Rename the value pin as shown to users.
pub fn set_value_name(graph: &mut BlueprintGraph, node: NodeId, name: &str) {
    if let Some(s) = state_mut(graph, node) {
        s.value_name = name.to_string();
        set_friendly_name(graph, node, VALUE_PIN, name);
        graph.notify_graph_changed();
        graph.mark_modified();
    }
}

impl ExpandableNode for MapForEachLoop {
    fn allocate_default_pins(graph: &mut BlueprintGraph, node: NodeId) -> Result<(), GraphError> {
        let state = state(graph, node).cloned().ok_or(GraphError::NodeNotFound(node))?;

        graph.create_pin(node, PinDirection::Input, PinType::exec(), pin_names::EXECUTE)?;

        let map = graph.create_pin(node, PinDirection::Input, wildcard_map(), MAP_PIN)?;
        graph.pin_checked_mut(map)?.friendly_name = Some("Map".to_string());

        let break_pin = graph.create_pin(node, PinDirection::Input, PinType::exec(), BREAK_PIN)?;
        let break_ref = graph.pin_checked_mut(break_pin)?;
        break_ref.friendly_name = Some("Break".to_string());
        break_ref.advanced_view = true;

        let body = graph.create_pin(node, PinDirection::Output, PinType::exec(), pin_names::THEN)?;
        graph.pin_checked_mut(body)?.friendly_name = Some("Loop Body".to_string());

        let key = graph.create_pin(node, PinDirection::Output, PinType::wildcard(), KEY_PIN)?;
        graph.pin_checked_mut(key)?.friendly_name = Some(state.key_name.clone());

        let value = graph.create_pin(node, PinDirection::Output, PinType::wildcard(), VALUE_PIN)?;
        graph.pin_checked_mut(value)?.friendly_name = Some(state.value_name.clone());

        let completed = graph.create_pin(node, PinDirection::Output, PinType::exec(), COMPLETED_PIN)?;
        let completed_ref = graph.pin_checked_mut(completed)?;
        completed_ref.friendly_name = Some("Completed".to_string());
        completed_ref.tooltip = "Execution once all map entries have been visited".to_string();

        if state.one_time_init {
            let map_type = graph.pin_checked(map)?.pin_type.clone();
            let key_type = graph.pin_checked(key)?.pin_type.clone();
            let value_type = graph.pin_checked(value)?.pin_type.clone();
            if let Some(s) = state_mut(graph, node) {
                s.input_wildcard_type = map_type.clone();
                s.output_wildcard_type = value_type.clone();
                s.input_current_type = map_type;
                s.key_current_type = key_type;
                s.value_current_type = value_type;
                s.one_time_init = false;
            }
        } else {
            graph.set_pin_type(map, state.input_current_type)?;
            graph.set_pin_type(key, state.key_current_type)?;
            graph.set_pin_type(value, state.value_current_type)?;
        }

        set_pin_tooltip(graph, map, MAP_TOOLTIP)?;
        set_pin_tooltip(graph, key, KEY_TOOLTIP)?;
        set_pin_tooltip(graph, value, VALUE_TOOLTIP)?;
        Ok(())
    }

    fn pin_connection_list_changed(graph: &mut BlueprintGraph, node: NodeId, pin: PinId) {
        if graph.pin(pin).map(|p| p.name.as_str()) != Some(MAP_PIN) {
            return;
        }
        let (Some(key), Some(value)) = (
            graph.find_pin(node, KEY_PIN, Some(PinDirection::Output)),
            graph.find_pin(node, VALUE_PIN, Some(PinDirection::Output)),
        ) else {
            return;
        };
        let Some(remembered) = state(graph, node).cloned() else {
            return;
        };

        let linked = graph
            .linked_to(pin)
            .first()
            .and_then(|peer| graph.pin_type(*peer))
            .filter(|peer_type| peer_type.container == ContainerType::Map)
            .cloned();
        let (map_type, key_type, value_type) = match linked {
            Some(linked) => {
                let key_type = linked.terminal_type_for_container();
                let value_type = linked.map_value_type();
                (linked, key_type, value_type)
            }
            None => (
                remembered.input_wildcard_type,
                remembered.output_wildcard_type.clone(),
                remembered.output_wildcard_type,
            ),
        };

        tracing::debug!("[EXPAND] {} map pin now {}", node, map_type);
        for (target, pin_type) in [(pin, &map_type), (key, &key_type), (value, &value_type)] {
            if let Err(err) = graph.set_pin_type(target, pin_type.clone()) {
                tracing::warn!("[EXPAND] Could not retype {} on {}: {}", target, node, err);
            }
        }
        if let Some(s) = state_mut(graph, node) {
            s.input_current_type = map_type;
            s.key_current_type = key_type;
            s.value_current_type = value_type;
        }

        schema::refresh_allowed_connections(graph, node, key);
        schema::refresh_allowed_connections(graph, node, value);

        for (target, tooltip) in [(pin, MAP_TOOLTIP), (key, KEY_TOOLTIP), (value, VALUE_TOOLTIP)] {
            if let Err(err) = set_pin_tooltip(graph, target, tooltip) {
                tracing::warn!("[EXPAND] Tooltip refresh failed on {}: {}", node, err);
            }
        }
    }

    fn post_paste_node(graph: &mut BlueprintGraph, node: NodeId) {
        let map_linked = graph
            .find_pin(node, MAP_PIN, Some(PinDirection::Input))
            .and_then(|pin| graph.pin(pin))
            .is_some_and(|pin| pin.has_links());
        if !map_linked {
            if let Some(s) = state_mut(graph, node) {
                s.one_time_init = true;
            }
        }
    }

    fn check_for_errors(graph: &BlueprintGraph, ctx: &mut CompilerContext<'_>, node: NodeId) -> bool {
        let has_map = graph
            .find_pin(node, MAP_PIN, Some(PinDirection::Input))
            .and_then(|pin| graph.pin(pin))
            .is_some_and(|pin| pin.has_links());

        if !has_map {
            ctx.message_log
                .error(graph, "For Each (Map) node @@ must have a Map to iterate.", node);
            return true;
        }
        false
    }

    fn expand_node(graph: &mut BlueprintGraph, ctx: &mut CompilerContext<'_>, node: NodeId) -> Result<(), GraphError> {
        let exec_pin = graph.find_pin_checked(node, pin_names::EXECUTE)?;
        let map_pin = graph.find_pin_checked(node, MAP_PIN)?;
        let break_pin = graph.find_pin_checked(node, BREAK_PIN)?;
        let body_pin = graph.find_pin_checked(node, pin_names::THEN)?;
        let key_pin = graph.find_pin_checked(node, KEY_PIN)?;
        let value_pin = graph.find_pin_checked(node, VALUE_PIN)?;
        let completed_pin = graph.find_pin_checked(node, COMPLETED_PIN)?;

        let map_type = graph.pin_checked(map_pin)?.pin_type.clone();
        let key_type = graph.pin_checked(key_pin)?.pin_type.clone();
        let value_type = graph.pin_checked(value_pin)?.pin_type.clone();

        // Keys = Map_Keys(Map)
        let keys = ctx.spawn_call_function(graph, node, "Map_Keys")?;
        let keys_exec = graph.find_pin_checked(keys, pin_names::EXECUTE)?;
        let keys_then = graph.find_pin_checked(keys, pin_names::THEN)?;
        let keys_map = graph.find_pin_checked(keys, "TargetMap")?;
        let keys_array = graph.find_pin_checked(keys, "Keys")?;
        graph.set_pin_type(keys_map, map_type.clone())?;
        graph.set_pin_type(keys_array, PinType::array_of(map_type.category.clone()))?;
        ctx.copy_pin_links_to_intermediate(graph, map_pin, keys_map)?;
        ctx.move_pin_links_to_intermediate(graph, exec_pin, keys_exec)?;

        // Iterate the keys with an array loop
        let keys_loop = ctx.spawn_intermediate_node(graph, node, NodeKind::ForEach(ForEachLoop::default()))?;
        let loop_exec = graph.find_pin_checked(keys_loop, pin_names::EXECUTE)?;
        let loop_array = graph.find_pin_checked(keys_loop, for_each::ARRAY_PIN)?;
        let loop_break = graph.find_pin_checked(keys_loop, for_each::BREAK_PIN)?;
        let loop_body = graph.find_pin_checked(keys_loop, pin_names::THEN)?;
        let loop_element = graph.find_pin_checked(keys_loop, for_each::ELEMENT_PIN)?;
        let loop_completed = graph.find_pin_checked(keys_loop, for_each::COMPLETED_PIN)?;

        ctx.move_pin_links_to_intermediate(graph, body_pin, loop_body)?;
        ctx.move_pin_links_to_intermediate(graph, break_pin, loop_break)?;
        ctx.move_pin_links_to_intermediate(graph, completed_pin, loop_completed)?;
        graph.make_link(keys_then, loop_exec)?;
        // Through the schema so the loop resolves its element type
        schema::try_create_connection(graph, keys_array, loop_array);
        ctx.move_pin_links_to_intermediate(graph, key_pin, loop_element)?;

        // Value = Map_Find(Map, Key)
        let find = ctx.spawn_call_function(graph, node, "Map_Find")?;
        let find_map = graph.find_pin_checked(find, "TargetMap")?;
        let find_key = graph.find_pin_checked(find, "Key")?;
        let find_value = graph.find_pin_checked(find, "Value")?;
        graph.set_pin_type(find_map, map_type)?;
        graph.set_pin_type(find_key, key_type)?;
        graph.set_pin_type(find_value, value_type)?;
        ctx.move_pin_links_to_intermediate(graph, map_pin, find_map)?;
        schema::try_create_connection(graph, loop_element, find_key);
        ctx.move_pin_links_to_intermediate(graph, value_pin, find_value)?;

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
    use crate::graph::{PinCategory, Position};
    use crate::nodes::{self, EventNode};

    fn setup() -> (BlueprintGraph, NodeId, NodeId) {
        let mut graph = BlueprintGraph::new("map for each");
        let event = nodes::spawn_node(
            &mut graph,
            NodeKind::Event(
                EventNode::new("BeginPlay").with_param("Scores", PinType::map_of(PinCategory::Name, PinCategory::Int)),
            ),
            Position::default(),
        )
        .unwrap();
        let map_loop =
            nodes::spawn_node(&mut graph, NodeKind::MapForEach(MapForEachLoop::default()), Position::default()).unwrap();
        (graph, event, map_loop)
    }

    #[test]
    fn test_one_time_init_captures_wildcards() {
        let (graph, _, map_loop) = setup();
        let s = state(&graph, map_loop).unwrap();
        assert!(!s.one_time_init);
        assert_eq!(s.input_wildcard_type, wildcard_map());
        assert!(s.output_wildcard_type.is_bare_wildcard());

        let key = graph.pin(graph.find_pin_checked(map_loop, KEY_PIN).unwrap()).unwrap();
        assert_eq!(key.display_name(), "Map Key");
        let value = graph.pin(graph.find_pin_checked(map_loop, VALUE_PIN).unwrap()).unwrap();
        assert_eq!(value.display_name(), "Map Value");
    }

    #[test]
    fn test_key_and_value_follow_map_type() {
        let (mut graph, event, map_loop) = setup();
        let scores = graph.find_pin_checked(event, "Scores").unwrap();
        let map = graph.find_pin_checked(map_loop, MAP_PIN).unwrap();
        let key = graph.find_pin_checked(map_loop, KEY_PIN).unwrap();
        let value = graph.find_pin_checked(map_loop, VALUE_PIN).unwrap();

        assert!(schema::try_create_connection(&mut graph, scores, map));
        assert_eq!(graph.pin_type(key), Some(&PinType::name()));
        assert_eq!(graph.pin_type(value), Some(&PinType::int()));
        let s = state(&graph, map_loop).unwrap();
        assert_eq!(s.key_current_type, PinType::name());
        assert_eq!(s.value_current_type, PinType::int());

        schema::break_pin_links(&mut graph, map);
        assert_eq!(graph.pin_type(map), Some(&wildcard_map()));
        assert!(graph.pin_type(key).unwrap().is_bare_wildcard());
        assert!(graph.pin_type(value).unwrap().is_bare_wildcard());
    }

    #[test]
    fn test_reallocation_restores_current_types() {
        let (mut graph, event, map_loop) = setup();
        let scores = graph.find_pin_checked(event, "Scores").unwrap();
        let map = graph.find_pin_checked(map_loop, MAP_PIN).unwrap();
        assert!(schema::try_create_connection(&mut graph, scores, map));

        // Recreate the node from its saved state, as on reload
        let saved = graph.node(map_loop).unwrap().kind.clone();
        let reloaded = nodes::spawn_node(&mut graph, saved, Position::default()).unwrap();
        let value = graph.find_pin_checked(reloaded, VALUE_PIN).unwrap();
        assert_eq!(graph.pin_type(value), Some(&PinType::int()));

        // Unlinked after paste: capture wildcards again on next allocation
        nodes::post_paste_node(&mut graph, reloaded);
        assert!(state(&graph, reloaded).unwrap().one_time_init);
    }

    #[test]
    fn test_rename_key_and_value_pins() {
        let (mut graph, _, map_loop) = setup();
        graph.clear_modified();
        let changes = graph.change_count();
        set_key_name(&mut graph, map_loop, "Player");
        set_value_name(&mut graph, map_loop, "Score");

        let key = graph.pin(graph.find_pin_checked(map_loop, KEY_PIN).unwrap()).unwrap();
        assert_eq!(key.display_name(), "Player");
        assert_eq!(state(&graph, map_loop).unwrap().value_name, "Score");
        assert_eq!(graph.change_count(), changes + 2);
        assert!(graph.is_modified());
    }

    #[test]
    fn test_map_pin_ignores_non_map_peer() {
        let (mut graph, event, map_loop) = setup();
        let numbers = nodes::spawn_node(
            &mut graph,
            NodeKind::Event(EventNode::new("Tick").with_param("Numbers", PinType::array_of(PinCategory::Int))),
            Position::default(),
        )
        .unwrap();
        let numbers = graph.find_pin_checked(numbers, "Numbers").unwrap();
        let scores = graph.find_pin_checked(event, "Scores").unwrap();
        let map = graph.find_pin_checked(map_loop, MAP_PIN).unwrap();
        let key = graph.find_pin_checked(map_loop, KEY_PIN).unwrap();

        assert!(!schema::try_create_connection(&mut graph, numbers, map));

        // An array restored without checks leaves the map pin a wildcard map
        graph.make_link(numbers, map).unwrap();
        nodes::pin_connection_list_changed(&mut graph, map);
        assert_eq!(graph.pin_type(map), Some(&wildcard_map()));
        assert!(graph.pin_type(key).unwrap().is_bare_wildcard());

        graph.break_all_pin_links(map);
        assert!(schema::try_create_connection(&mut graph, scores, map));
        assert_eq!(graph.pin_type(key), Some(&PinType::name()));
    }
}
