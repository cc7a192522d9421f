//! Keeping committed routes current.
//!
//! [`DynamicRerouter`] folds a [`ChangeSet`] into a route and commits it to
//! the [`RouteRegistry`] with compare-and-swap on the route version.

mod changes;
mod registry;
mod rerouter;

pub use changes::ChangeSet;
pub use registry::RouteRegistry;
pub use rerouter::DynamicRerouter;
