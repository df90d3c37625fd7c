//! Onboard CLI library: the command implementations behind the `onboard`
//! binary, exposed so integration tests can drive them directly.

pub mod commands;
