//! Identity session manager for BC ledger clients
//!
//! Establishes the cryptographic identity ("Node") a client acts as:
//!
//! ```text
//! core_identity ──> node ──> lifecycle ──> access
//!  (key store)    (materialize) (export/import/switch) (get_node dialog flow)
//!                     │             │
//!                     └── ledger ───┘   session: root, peers, cache/network/node
//! ```

pub mod access;
pub mod callbacks;
pub mod config;
pub mod core_identity;
pub mod errors;
pub mod ledger;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod session;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use access::{AccessDialog, AccessOptions, AccessOrchestrator, AccessPrompt, AccessRequest};
pub use callbacks::AccessCallbacks;
pub use config::Config;
pub use errors::{AccessError, AccessResult};
pub use lifecycle::{AccessCode, Lifecycle};
pub use logging::{init_logging, LogLevel};
pub use node::{Node, NodeFactory};
pub use session::Session;
