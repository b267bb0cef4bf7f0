//! # Execution Reconciler
//!
//! Watches running agent executions and reconciles two unreliable update
//! sources into one monotone view:
//! - a push channel (one SSE connection per agent, shared by every
//!   execution of that agent), and
//! - a pull channel (periodic REST snapshots of one execution).
//!
//! ## Data flow
//!
//! ```text
//!   SSE frames ──► normalizer ──► ConnectionRegistry ──┐ (broadcast per agent)
//!                                                     ▼
//!   REST snapshots ──► Poller ──────────────► SessionActor ──► reducer
//!                                                     │            │
//!                                                     │            ▼
//!                                                     │   ConversationMessageState
//!                                                     ▼
//!                               LogBook + LogPacer ──► ExecutionView (watch)
//!                                                     │
//!                                                     ▼
//!                                   CompletionSink (once, after logs drain)
//! ```
//!
//! ## Modules
//! - `normalizer`: Wire frames to [`events::ExecutionEvent`]
//! - `reducer`: Pure state machine folding events and snapshots
//! - `pacer`: Bounded, deduplicated log with paced reveal
//! - `transport`: Push/pull clients and the shared connection registry
//! - `session`: Per-execution actor tying it all together
//! - `dashboard`: Live sessions keyed by agent
//! - `api`: HTTP view server

pub mod api;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod events;
pub mod execution;
pub mod normalizer;
pub mod pacer;
pub mod reducer;
pub mod session;
pub mod transport;
pub mod util;

pub use config::Config;
pub use dashboard::Dashboard;
pub use events::ExecutionEvent;
pub use execution::{Execution, ExecutionStatus};
pub use reducer::ConversationMessageState;
pub use session::{ExecutionView, SessionHandle};
