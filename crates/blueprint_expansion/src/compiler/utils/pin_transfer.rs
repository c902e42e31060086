use crate::compiler::CompilerContext;
use crate::graph::{BlueprintGraph, GraphError, PinId};

/// Hand the connection or literal default of `source` over to `dest`.
///
/// If `source` is linked, its links move to `dest` and `dest`'s own default
/// is left alone. Otherwise the literal default (value, object and text) is
/// copied across and no links change.
pub fn move_pin_links_or_copy_defaults(
    ctx: &mut CompilerContext<'_>,
    graph: &mut BlueprintGraph,
    source: PinId,
    dest: PinId,
) -> Result<(), GraphError> {
    let source_pin = graph.pin_checked(source)?;
    graph.pin_checked(dest)?;

    if source_pin.has_links() {
        return ctx.move_pin_links_to_intermediate(graph, source, dest);
    }

    let value = source_pin.default_value.clone();
    let object = source_pin.default_object.clone();
    let text = source_pin.default_text.clone();

    let dest_pin = graph.pin_checked_mut(dest)?;
    dest_pin.default_value = value;
    dest_pin.default_object = object;
    dest_pin.default_text = text;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{PinDirection, PinType, Position};
    use crate::library::FunctionLibrary;
    use crate::nodes::{EventNode, NodeKind};

    fn setup() -> (BlueprintGraph, PinId, PinId, PinId) {
        let mut graph = BlueprintGraph::new("transfer");
        let a = graph.add_node(NodeKind::Event(EventNode::new("A")), Position::default());
        let b = graph.add_node(NodeKind::Event(EventNode::new("B")), Position::default());
        let upstream = graph.create_pin(a, PinDirection::Output, PinType::object("Door"), "out").unwrap();
        let source = graph.create_pin(b, PinDirection::Input, PinType::object("Door"), "Target").unwrap();
        let dest = graph.create_pin(b, PinDirection::Input, PinType::object("Door"), "Value").unwrap();
        (graph, upstream, source, dest)
    }

    #[test]
    fn test_linked_source_moves_links_and_keeps_dest_default() {
        let library = FunctionLibrary::new();
        let mut ctx = CompilerContext::new(&library);
        let (mut graph, upstream, source, dest) = setup();
        graph.make_link(upstream, source).unwrap();
        graph.pin_mut(dest).unwrap().default_value = "keep".to_string();

        move_pin_links_or_copy_defaults(&mut ctx, &mut graph, source, dest).unwrap();

        assert!(graph.linked_to(source).is_empty());
        assert_eq!(graph.linked_to(dest), vec![upstream]);
        assert_eq!(graph.pin(dest).unwrap().default_value, "keep");
    }

    #[test]
    fn test_unlinked_source_copies_defaults() {
        let library = FunctionLibrary::new();
        let mut ctx = CompilerContext::new(&library);
        let (mut graph, upstream, source, dest) = setup();
        {
            let pin = graph.pin_mut(source).unwrap();
            pin.default_value = "7".to_string();
            pin.default_object = Some("FrontDoor".to_string());
            pin.default_text = Some("Front door".to_string());
        }

        move_pin_links_or_copy_defaults(&mut ctx, &mut graph, source, dest).unwrap();

        let dest_pin = graph.pin(dest).unwrap();
        assert_eq!(dest_pin.default_value, "7");
        assert_eq!(dest_pin.default_object.as_deref(), Some("FrontDoor"));
        assert_eq!(dest_pin.default_text.as_deref(), Some("Front door"));
        assert!(!dest_pin.has_links());
        assert!(graph.linked_to(upstream).is_empty());
    }
}
