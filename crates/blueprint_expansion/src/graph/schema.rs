//! Connection rules for the blueprint graph.
//!
//! Raw linking lives on [`BlueprintGraph`]; this module is the checked path
//! that decides whether two pins may be connected and tells the owning nodes
//! when their connection lists change.

use super::{BlueprintGraph, NodeId, PinDirection, PinId};
use crate::nodes;

/// Why a connection attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionResponse {
    Allowed,
    SameDirection,
    SameNode,
    ExecDataMismatch,
    IncompatibleTypes,
    MissingPin,
}

/// Check whether `a` and `b` may be linked, in either order.
pub fn can_create_connection(graph: &BlueprintGraph, a: PinId, b: PinId) -> ConnectionResponse {
    let (Some(pin_a), Some(pin_b)) = (graph.pin(a), graph.pin(b)) else {
        return ConnectionResponse::MissingPin;
    };

    if pin_a.direction == pin_b.direction {
        return ConnectionResponse::SameDirection;
    }
    if pin_a.owner == pin_b.owner {
        return ConnectionResponse::SameNode;
    }
    if pin_a.is_exec() != pin_b.is_exec() {
        return ConnectionResponse::ExecDataMismatch;
    }
    if !pin_a.pin_type.is_compatible_with(&pin_b.pin_type) {
        return ConnectionResponse::IncompatibleTypes;
    }

    ConnectionResponse::Allowed
}

/// Link two pins if the schema allows it and notify both owning nodes.
///
/// Returns `false` for refused connections; callers treat that as a silent
/// drop rather than an error.
pub fn try_create_connection(graph: &mut BlueprintGraph, a: PinId, b: PinId) -> bool {
    let response = can_create_connection(graph, a, b);
    if response != ConnectionResponse::Allowed {
        tracing::debug!("[SCHEMA] Refused connection {} <-> {}: {:?}", a, b, response);
        return false;
    }

    // An input data pin takes a single source
    let input = match graph.pin(a).map(|p| p.direction) {
        Some(PinDirection::Input) => a,
        _ => b,
    };
    let replaces_source = graph
        .pin(input)
        .is_some_and(|p| !p.is_exec() && p.has_links());
    if replaces_source {
        for peer in graph.break_all_pin_links(input) {
            nodes::pin_connection_list_changed(graph, peer);
        }
    }

    if graph.make_link(a, b).is_err() {
        return false;
    }

    nodes::pin_connection_list_changed(graph, a);
    nodes::pin_connection_list_changed(graph, b);
    graph.mark_modified();
    true
}

/// Break every link on `pin` and notify the owners of both ends.
pub fn break_pin_links(graph: &mut BlueprintGraph, pin: PinId) {
    let peers = graph.break_all_pin_links(pin);
    if peers.is_empty() {
        return;
    }
    for peer in peers {
        nodes::pin_connection_list_changed(graph, peer);
    }
    nodes::pin_connection_list_changed(graph, pin);
    graph.mark_modified();
}

/// Forcibly detach and attempt to reattach all the links of a pin.
///
/// Used after a pin's type changed: links that are no longer type-compatible
/// are dropped, the rest are recreated in their original order.
pub fn refresh_allowed_connections(graph: &mut BlueprintGraph, node: NodeId, pin: PinId) {
    let previous = graph.break_all_pin_links(pin);
    let total = previous.len();
    let mut dropped = 0usize;

    for peer in previous {
        if !try_create_connection(graph, pin, peer) {
            dropped += 1;
            nodes::pin_connection_list_changed(graph, peer);
        }
    }

    if dropped > 0 {
        tracing::debug!("[SCHEMA] Dropped {} incompatible link(s) from {} on {}", dropped, pin, node);
    }
    // Reattached links already notified the owner
    if total > 0 && dropped == total {
        nodes::pin_connection_list_changed(graph, pin);
    }

    graph.notify_graph_changed();
    graph.mark_modified();
}

/// The output pin acting as the source of an input pin.
pub fn get_input_pin_link(graph: &BlueprintGraph, pin: PinId) -> Option<PinId> {
    let input = graph.pin(pin)?;
    if input.direction == PinDirection::Output {
        return None;
    }

    input.linked_to.iter().copied().find(|peer| {
        graph
            .pin(*peer)
            .is_some_and(|p| p.direction == PinDirection::Output)
    })
}
