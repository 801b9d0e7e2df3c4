//! joinwatch-monitor library
//!
//! Watches chat-community channels through a rendered page, detects newly
//! joined participants from join announcements and the member list, and
//! reports each new participant once to an operator channel.
//!
//! Data flow:
//! [`orchestrator`] -> [`matcher`] / [`roster`] -> [`detection`] ->
//! [`ledger`] + [`store`] -> [`compose`] -> [`notify`]

pub mod compose;
pub mod context;
pub mod detection;
pub mod driver;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod matcher;
pub mod notify;
pub mod orchestrator;
pub mod roster;
pub mod store;

pub use error::{MonitorError, MonitorResult};
