//! Device integrations.

pub mod shelly;
