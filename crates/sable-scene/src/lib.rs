//! sable-scene: the retained scene graph and its animation system.
//!
//! Clients build a persistent tree of nodes inside a [`Storage`], mutate node
//! properties over time (directly or through [`animation`] tracks), and ask
//! the store for a flattened, sorted draw list each frame. The painter crate
//! consumes that list; this crate never touches a surface except through the
//! [`Node::draw`] entry point.

pub mod animation;
mod node;
mod storage;

pub use node::{Node, NodeId, PropertyKey, Style};
pub use storage::Storage;
