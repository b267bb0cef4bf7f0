//! HTTP view server.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Health check
//! - `GET /api/executions` - Current view of every session
//! - `POST /api/executions/watch` - Start reconciling an execution
//! - `GET /api/executions/:id` - Current view of one execution
//! - `GET /api/executions/:id/stream` - View updates via SSE
//! - `POST /api/executions/:id/cancel` - Request cancellation
//! - `POST /api/executions/:id/resubscribe` - Reopen the push subscription
//! - `DELETE /api/executions/:id` - Stop watching an execution

mod executions;
mod routes;
pub mod types;

pub use routes::{router, serve, AppState};
