//! `verify`: poll a running deployment's read-only endpoints.

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use crate::terminal::Style;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3001";

/// Endpoints checked, in order.
pub const ENDPOINTS: [&str; 4] = ["/", "/api/health", "/api/debug", "/api/stats"];

const HEALTH_ENDPOINT: &str = "/api/health";

#[derive(Debug, Clone, PartialEq)]
pub enum EndpointStatus {
    /// The server answered with this HTTP status.
    Http(u16),
    TimedOut,
    /// The request never produced a response.
    Unreachable(String),
}

#[derive(Debug, Clone)]
pub struct EndpointResult {
    pub endpoint: &'static str,
    pub status: EndpointStatus,
    /// Parsed JSON body, when the response had one.
    pub body: Option<Value>,
}

impl EndpointResult {
    pub fn is_ok(&self) -> bool {
        self.status == EndpointStatus::Http(200)
    }

    fn error(&self) -> String {
        match &self.status {
            EndpointStatus::Http(code) => {
                let message = self
                    .body
                    .as_ref()
                    .and_then(|body| body.get("error"))
                    .and_then(Value::as_str);
                match (message, &self.body) {
                    (Some(message), _) => format!("Status: {code} - Error: {message}"),
                    (None, None) => format!("Status: {code} - Error: Invalid JSON response"),
                    (None, Some(_)) => format!("Status: {code}"),
                }
            }
            EndpointStatus::TimedOut => "Status: TIMEOUT - Error: Request timed out".to_string(),
            EndpointStatus::Unreachable(message) => format!("Status: ERROR - Error: {message}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub base_url: String,
    pub results: Vec<EndpointResult>,
}

impl VerifyReport {
    pub fn successful(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.successful()
    }

    pub fn passed(&self) -> bool {
        !self.results.is_empty() && self.failed() == 0
    }

    /// The `connected` flag from the health body, if health answered with one.
    pub fn database_connected(&self) -> Option<bool> {
        self.results
            .iter()
            .find(|r| r.endpoint == HEALTH_ENDPOINT)
            .and_then(|r| r.body.as_ref())
            .and_then(|body| body.get("connected"))
            .and_then(Value::as_bool)
    }

    fn health_error(&self) -> Option<&str> {
        self.results
            .iter()
            .find(|r| r.endpoint == HEALTH_ENDPOINT)
            .and_then(|r| r.body.as_ref())
            .and_then(|body| body.get("error"))
            .and_then(Value::as_str)
    }

    pub fn render(&self, style: &Style) {
        println!("{}", style.heading("Verifying NeoRide API deployment"));
        println!("{}", style.detail(&format!("Base URL: {}", self.base_url)));
        println!();

        for result in &self.results {
            if result.is_ok() {
                println!("{}", style.ok(&format!("{} - Status: 200", result.endpoint)));
            } else {
                println!(
                    "{}",
                    style.fail(&format!("{} - {}", result.endpoint, result.error()))
                );
            }

            if result.endpoint == HEALTH_ENDPOINT {
                match self.database_connected() {
                    Some(true) => println!("{}", style.detail("Database connection: connected")),
                    Some(false) => println!(
                        "{}",
                        style.detail(&format!(
                            "Database connection: not connected ({})",
                            self.health_error().unwrap_or("unknown error")
                        ))
                    ),
                    None => {}
                }
            }
        }

        let total = self.results.len();
        println!();
        println!("{}", style.heading("Summary"));
        println!("{}", style.detail(&format!("Successful: {}/{}", self.successful(), total)));
        println!("{}", style.detail(&format!("Failed: {}/{}", self.failed(), total)));
        println!();

        if !self.passed() {
            println!("{}", style.fail("Some checks failed, see the errors above"));
        } else if self.database_connected() == Some(true) {
            println!("{}", style.ok("All endpoints healthy and the database is connected"));
        } else {
            println!(
                "{}",
                style.warn("All endpoints answered but the database connection may have issues")
            );
        }
    }
}

/// GET every endpoint in [`ENDPOINTS`] under `base_url`.
///
/// Transport failures are recorded per endpoint, not returned.
///
/// # Errors
///
/// Only when the HTTP client itself cannot be built.
pub async fn run(base_url: &str, timeout: Duration) -> Result<VerifyReport> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build HTTP client")?;
    let base = base_url.trim_end_matches('/');

    let mut results = Vec::with_capacity(ENDPOINTS.len());
    for endpoint in ENDPOINTS {
        let url = format!("{base}{endpoint}");
        debug!(url = %url, "checking endpoint");
        results.push(check(&client, endpoint, &url).await);
    }

    Ok(VerifyReport {
        base_url: base.to_string(),
        results,
    })
}

async fn check(client: &reqwest::Client, endpoint: &'static str, url: &str) -> EndpointResult {
    match client.get(url).send().await {
        Ok(response) => {
            let status = EndpointStatus::Http(response.status().as_u16());
            let body = response.json::<Value>().await.ok();
            EndpointResult {
                endpoint,
                status,
                body,
            }
        }
        Err(err) => EndpointResult {
            endpoint,
            status: if err.is_timeout() {
                EndpointStatus::TimedOut
            } else {
                EndpointStatus::Unreachable(err.to_string())
            },
            body: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(endpoint: &'static str, status: EndpointStatus, body: Option<Value>) -> EndpointResult {
        EndpointResult {
            endpoint,
            status,
            body,
        }
    }

    #[test]
    fn summary_counts_only_200_as_success() {
        let report = VerifyReport {
            base_url: DEFAULT_BASE_URL.to_string(),
            results: vec![
                result("/", EndpointStatus::Http(200), Some(json!({}))),
                result(
                    "/api/health",
                    EndpointStatus::Http(500),
                    Some(json!({"connected": false, "error": "no servers"})),
                ),
                result("/api/debug", EndpointStatus::TimedOut, None),
                result("/api/stats", EndpointStatus::Unreachable("refused".into()), None),
            ],
        };

        assert_eq!(report.successful(), 1);
        assert_eq!(report.failed(), 3);
        assert!(!report.passed());
        assert_eq!(report.database_connected(), Some(false));
        assert_eq!(report.health_error(), Some("no servers"));
    }

    #[test]
    fn database_flag_absent_without_health_body() {
        let report = VerifyReport {
            base_url: DEFAULT_BASE_URL.to_string(),
            results: vec![result("/api/health", EndpointStatus::TimedOut, None)],
        };
        assert_eq!(report.database_connected(), None);
    }

    #[test]
    fn error_text_prefers_body_message() {
        let failed = result(
            "/api/stats",
            EndpointStatus::Http(500),
            Some(json!({"error": "database connection failed after 3 attempts"})),
        );
        assert_eq!(
            failed.error(),
            "Status: 500 - Error: database connection failed after 3 attempts"
        );

        let html = result("/", EndpointStatus::Http(502), None);
        assert_eq!(html.error(), "Status: 502 - Error: Invalid JSON response");
    }

    #[test]
    fn empty_report_has_not_passed() {
        let report = VerifyReport {
            base_url: DEFAULT_BASE_URL.to_string(),
            results: Vec::new(),
        };
        assert!(!report.passed());
    }
}
