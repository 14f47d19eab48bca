//! Audio route and focus state machine
//!
//! Decides where call audio is rendered (earpiece, bluetooth, wired headset
//! or speaker) and whether the device currently holds audio focus. The
//! registry drives it with focus changes and user requests; the platform
//! drives it with accessory connectivity.

pub mod engine;
pub mod hardware;
pub mod message;
pub mod route;
pub mod state;
pub mod table;
pub mod tables;

pub use engine::AudioRouteEngine;
pub use hardware::{AudioHardware, HardwareCall, SimulatedAudioHardware};
pub use message::{Focus, HardwareEvent, RouteMessage};
pub use route::{AudioRoute, RouteMask};
pub use state::{AudioStateChange, AudioStateSnapshot, RouteState};
pub use table::{RouteAction, RouteGuard, RouteKey, RouteTable, RouteTableBuilder, RouteTransition};

use lazy_static::lazy_static;
use std::sync::Arc;

lazy_static! {
    /// The default route table, built once
    pub static ref DEFAULT_ROUTE_TABLE: Arc<RouteTable> = Arc::new(build_route_table());
}

fn build_route_table() -> RouteTable {
    let table = tables::build_default_table();
    if let Err(errors) = table.validate() {
        tracing::error!("Default route table validation failed: {:?}", errors);
    }
    tracing::debug!("Built route table with {} transitions", table.transition_count());
    table
}
