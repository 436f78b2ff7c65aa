//! KATA Events - Change Notification Hub
//!
//! A per-entity-kind broadcast channel. Repositories publish after every
//! successful mutation; consumers subscribe per kind and receive an
//! independent, ordered sequence of changes.
//!
//! Publishing is fire-and-forget: subscribers that fall behind never block
//! a publisher. Each subscriber has a bounded buffer and the oldest
//! entries are dropped on overflow. There is no replay; a new subscriber
//! only sees events published after it subscribed.

mod hub;
mod notifier;

pub use hub::ChangeHub;
pub use notifier::{ChangeKind, ChangeNotifier, ChangeStream, EntityChange};
