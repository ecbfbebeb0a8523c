//! AutoCAD automation bridge
//!
//! This library exposes a REST server that turns structured drawing requests
//! into AutoLISP source text and runs it inside a locally running AutoCAD
//! through Windows COM automation.
//!
//! # Architecture
//!
//! COM objects **must** stay on the thread that created them. The
//! architecture is:
//!
//! - **HTTP runtime**: a tokio multi-thread runtime serving the axum router
//!   (`server::router`) through a hyper accept loop.
//!
//! - **SessionRegistry**: owns the map of instance id to session. One
//!   registry per process, injected into the handlers through `AppState`.
//!
//! - **Session worker**: every session runs on its own OS thread
//!   (`session::run_session_loop`). The thread initializes the automation
//!   runtime, owns the application/document handles and serves requests
//!   sent over a channel by `SessionWorker`.
//!
//! - **Automation backend**: the narrow trait interface the worker talks to.
//!   On Windows it is backed by COM `IDispatch` late binding, elsewhere by a
//!   backend that reports automation as unavailable.
//!
//! - **lisp**: pure functions generating AutoLISP for walls, doors, windows,
//!   rooms, layers, text, dimensions and furniture.
//!
//! # Routes
//!
//! ## Connections
//! - `POST /api/autocad/connect`, `POST /api/autocad/disconnect`
//! - `POST /api/autocad/disconnect_all`, `GET /api/autocad/connections`
//! - `GET /api/autocad/document`
//!
//! ## Drawing
//! - `POST /api/drawing/{wall,door,window,room,save}`
//! - `POST /api/layout/{grid,layer,current_layer}`
//! - `POST /api/annotation/{text,dimension}`
//! - `POST /api/furniture/insert`
//! - `POST /api/view/{zoom_extents,regen}`
//!
//! ## Utilities
//! - `POST /api/utils/{calculate_area,convert_units}`
//! - `POST /api/lisp/{execute,load}`

use std::path::PathBuf;

pub mod automation;
pub mod config;
pub mod drawing;
pub mod error;
pub mod geometry;
pub mod lisp;
pub mod server;
pub mod session;

pub use automation::{default_backend, AutomationBackend, AutomationFault};
pub use config::{Environment, Settings};
pub use drawing::Point;
pub use error::{ApiError, ConnectionError, SessionError};
pub use server::{router, AppState};
pub use session::{
    ConnectionInfo, ConnectionSummary, DocumentInfo, ExecutionResult, SessionPhase,
    SessionRegistry,
};

/// Expand `~/` prefix to the user's home directory.
pub fn expand_path(path: &str) -> PathBuf {
    path.strip_prefix("~/")
        .and_then(|stripped| {
            std::env::var_os("HOME")
                .or_else(|| std::env::var_os("USERPROFILE"))
                .map(|h| PathBuf::from(h).join(stripped))
        })
        .unwrap_or_else(|| PathBuf::from(path))
}
