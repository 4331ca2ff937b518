//! Utility functions and helpers for the swarm-calib library.

pub(crate) mod text;
