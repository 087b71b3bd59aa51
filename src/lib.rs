//! executron: an HTTP gateway that runs user-submitted code on a fixed pool
//! of named sandboxes.
//!
//! JavaScript and TypeScript run as temporary scripts; Python runs inside a
//! short-lived execution context. See [`gateway`] for the request flow.

pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod observability;
pub mod sandbox;
pub mod selector;
pub mod types;

pub use config::Config;
pub use dispatch::{Dispatcher, ExecutionOutcome};
pub use gateway::{router, run_gateway, AppState};
pub use sandbox::{Sandbox, SandboxProvider};
pub use selector::{SandboxId, SandboxSelector, SelectionStrategy};
pub use types::{ExecutionRequest, Language};
