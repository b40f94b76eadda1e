//! Test fixtures
//!
//! - [`SimLink`]: two sans-IO tunnels joined by an in-memory link with a
//!   controllable clock and loss
//! - [`TwoNodeFixture`]: two real nodes on loopback

pub mod sim_link;
pub mod two_node;

pub use sim_link::{Side, SimLink};
pub use two_node::TwoNodeFixture;
