//! # Compiler Utilities
//!
//! Helpers shared by the macro node expansions.
//!
//! ## Pin Transfer (`pin_transfer`)
//! Hand a user pin's links, or its literal default, over to an intermediate pin.
//!
//! ## Signature Pins (`signature`)
//! Pins generated from function and event dispatcher signatures:
//! - Create input pins for a function's parameters
//! - Create exec and parameter pins per event dispatcher
//! - Rewire those pins onto delegate bindings and custom events
//! - Reorder pins and build pin tooltips

pub mod pin_transfer;
pub mod signature;

pub use pin_transfer::move_pin_links_or_copy_defaults;
pub use signature::{
    create_custom_event, create_event_dispatcher_pins, create_function_pins, dispatcher_param_pin_name,
    expand_dispatcher_pins, expand_function_pins, reorder_pin, set_pin_tooltip, ParamText, PinExpansion,
};
