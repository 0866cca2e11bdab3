//! # LessonBell Gateway
//! HTTP entry point for on-demand "Timeline changed" notifications.
//!
//! Routes:
//! - `GET  /health`
//! - `POST /api/notify-timeline-change`

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
