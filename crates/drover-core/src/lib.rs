//! Core bridge for driving CLI-shaped AI coding-agent backends.
//!
//! drover-core spawns and supervises vendor agent CLIs, translates their
//! heterogeneous output into one backend-agnostic event protocol, and
//! exposes that protocol through a connection/prompt state machine with
//! single-flight concurrency control.
//!
//! Layering, leaf-first:
//!
//! - [`runner`] -- generic subprocess execution under timeout with
//!   escalating termination and host-signal forwarding.
//! - [`port`] -- the per-vendor backend contract. Concrete ports live
//!   outside this crate and use the runner to drive their binary.
//! - [`protocol`] -- the shared event and notification types.
//! - [`bridge`] -- pure translation of stream events into session-update
//!   notifications, with a byte-accurate truncation policy.
//! - [`state`] -- connection status, the prompt guard, auth caching, and
//!   per-session mode/model memory.
//! - [`adapter`] -- the composition root binding one port, the bridge,
//!   and the state machine into the consumed surface.
//!
//! The terminal UI, configuration loading, tool hosts, and session
//! persistence are this crate's callers, not its contents.

pub mod adapter;
pub mod bridge;
pub mod port;
pub mod protocol;
pub mod runner;
pub mod state;

pub use adapter::{AdapterError, HarnessAdapter};
pub use bridge::{Bridge, Emission, TOOL_RESULT_LIMIT, Truncation, truncate_value};
pub use port::{BackendPort, PortRegistry};
pub use runner::{
    CommandOptions, CommandResult, ProcessRunner, RunnerConfig, RunnerError, StreamingOptions,
    StreamingResult,
};
pub use state::{AdapterState, PromptInProgress, SessionSettings, extract_prompt_text};
