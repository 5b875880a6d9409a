//! Workspace root. No library code of its own: `bridge-shared`,
//! `bridge-engine-client`, `bridge-worker`, and `bridge-ctl` are the
//! independently buildable crates this workspace ships.
