//! Ambient infrastructure: logging setup.

pub mod logging;
