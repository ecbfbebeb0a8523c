//! Sessions with running AutoCAD instances.
//!
//! COM handles are apartment-bound, so every session owns a dedicated OS
//! thread. The registry is the only entry point for the HTTP layer; it maps
//! an instance id to a worker handle and serializes all work per key.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    tokio runtime                          │
//! │                                                           │
//! │  axum handlers ──▶ SessionRegistry                        │
//! │                    ├─ slots: HashMap<id, Mutex<Slot>>     │
//! │                    │         (per-key async gate)         │
//! │                    └─ phase: Absent/Connecting/Alive/Stale│
//! └──────────────────────────────────────────────────────────┘
//!                               │ mpsc + oneshot
//!         ┌─────────────────────┼─────────────────────┐
//!         ▼                     ▼                     ▼
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ "default"    │     │ "cad2"       │     │ "cadN"       │
//! │ acad-session │     │ acad-session │     │ acad-session │
//! │ COM thread   │     │ COM thread   │     │ COM thread   │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

mod loop_impl;
mod registry;
mod request;
mod types;
mod worker;

pub use loop_impl::run_session_loop;
pub use registry::{SessionHandle, SessionRegistry};
pub use request::{Connected, SessionRequest};
pub use types::{ConnectionInfo, ConnectionSummary, DocumentInfo, ExecutionResult, SessionPhase};
pub use worker::SessionWorker;
