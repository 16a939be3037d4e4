//! Switchboard core - secure pairing for the robot's companion link.
//!
//! This crate implements:
//! - The pairing state machine and its post-authentication handlers
//! - Device identity and session key management
//! - The client key store and its persistence backends
//! - A single-threaded reactor that drives the machine
//!
//! Transports and device services are traits; the agent binary supplies the
//! concrete implementations.

#![forbid(unsafe_code)]

// Core state machine
pub mod pairing;
pub mod reactor;

// Collaborator boundaries
pub mod transport;
pub mod services;

// Infrastructure
pub mod store;
pub mod keys;
pub mod config;

// Supporting modules
pub mod errors;
pub mod harness;

pub use config::PairingConfig;
pub use errors::{FaultKind, PairingError, StoreError, TransportError};
pub use pairing::{PairingSignal, PairingStateMachine, Phase, TimerCommand, TimerKind};
pub use reactor::{Reactor, ReactorEvent};
