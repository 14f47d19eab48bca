//! Default transitions of the route engine, split by concern

mod active;
mod common;
mod quiescent;

pub use active::add_active_transitions;
pub use common::{add_common_transitions, add_wildcard_transitions};
pub use quiescent::add_quiescent_transitions;

use super::table::{RouteTable, RouteTableBuilder};

/// Assemble the full default table
pub fn build_default_table() -> RouteTable {
    let mut builder = RouteTableBuilder::new();
    add_common_transitions(&mut builder);
    add_active_transitions(&mut builder);
    add_quiescent_transitions(&mut builder);
    add_wildcard_transitions(&mut builder);
    builder.build()
}
