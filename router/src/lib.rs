pub mod algo;
pub mod global_router;
pub mod grid;
pub mod layer_assign;
pub mod net;
pub mod rc_tree;
pub mod ripup;
pub mod steiner;
pub mod tree;
pub mod twopin;
pub mod utils;

pub use global_router::{NetState, Router, RoutingResult};

use grt_common::db::core::RoutingDB;
use grt_common::error::Result;
use grt_common::util::config::RouterConfig;

pub fn route(db: &RoutingDB, config: &RouterConfig) -> Result<RoutingResult> {
    Router::new(db, config)?.run()
}
