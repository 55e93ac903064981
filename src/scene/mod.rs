/// Generational slot storage for registered objects.
pub mod arena;
/// Added/removed/dirty bookkeeping between freshen cycles.
pub mod dirty;
/// Scene-graph collaborator contract.
pub mod graph;
pub(crate) mod listener;
/// In-memory scene graph.
pub mod memory;
