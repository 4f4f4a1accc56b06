//! Example tool provider backed by the National Weather Service API.
//!
//! Exposes `get_alerts` and `get_forecast`. Upstream failures never become
//! protocol errors; they are reported as fixed messages in the tool result.

pub mod nws;
pub mod report;
pub mod tools;

pub use nws::{NWS_API_BASE, NwsClient, UpstreamError};
pub use tools::{GetAlerts, GetForecast, router};
