//! The reconciler: per-entry state machines deciding how a walked entry
//! maps onto the catalog.

mod file;
mod folder;
