//! HTTP Client Factory
//!
//! Builds the shared `reqwest` client used by the HTTP providers.

use std::time::Duration;

use crate::types::{LlmError, LlmResult};

/// Connection establishment budget. Whole-request budgets are enforced per
/// call by the structured invoker, not here.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a `reqwest::Client`.
///
/// - `Some(url)` -> route every request through that proxy
/// - `None` -> explicitly disable proxy (`no_proxy`), ignoring env vars
pub fn build_http_client(proxy_url: Option<&str>) -> LlmResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);
    match proxy_url {
        Some(url) => {
            let proxy = reqwest::Proxy::all(url).map_err(|e| LlmError::InvalidRequest {
                message: format!("invalid proxy URL '{}': {}", url, e),
            })?;
            builder = builder.proxy(proxy);
        }
        None => {
            builder = builder.no_proxy();
        }
    }
    builder.build().map_err(|e| LlmError::Other {
        message: format!("failed to build HTTP client: {}", e),
    })
}
