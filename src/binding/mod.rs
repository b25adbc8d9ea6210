//! Consumers of store state: connected bindings and hook-style selections.

mod connector;
mod selection;

pub use connector::{bind_component, Binding, BindingPhase, ConnectedProps, Connector};
pub use selection::{get_selection, Selection};
