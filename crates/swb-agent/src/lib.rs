//! swb-agent - development host for the switchboard pairing service.
//!
//! Wires the pairing core to a TCP link and to detached device services so
//! the protocol can be exercised from a workstation.

pub mod config;
pub mod link;
pub mod services;
