//! `db-check`: probe the database directly, without going through the API.
//!
//! The probe connects through the same [`ConnectionManager`] the service uses,
//! pings, lists collections and round-trips a throwaway document in
//! [`PROBE_COLLECTION`].

use anyhow::Result;
use mongodb::bson::{doc, DateTime, Document};
use tracing::debug;

use neoride_lib::connection::{MONGODB_DATABASE_ENV, MONGODB_URI_ENV};
use neoride_lib::{ConnectionConfig, ConnectionManager, Error as LibError, MongoConnector};

use crate::terminal::Style;

/// Collection holding the probe document. Left empty after a successful run.
pub const PROBE_COLLECTION: &str = "connection_tests";

pub const TROUBLESHOOTING_TIPS: [&str; 5] = [
    "Check that the MongoDB cluster is running",
    "Verify that this machine's IP address is allowed by the cluster's access list",
    "Ensure the connection string is correct, including the URL-encoded password",
    "Check that the database user has read and write permissions",
    "For a quick test, temporarily allow access from 0.0.0.0/0",
];

/// Result of a single probe step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: &'static str,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Step succeeded; the payload is a short description of what was seen.
    Passed(String),
    Failed(String),
}

/// Full probe report.
#[derive(Debug, Clone)]
pub struct DbCheckReport {
    pub uri: String,
    pub database: String,
    pub collections: Vec<String>,
    pub steps: Vec<Step>,
}

impl DbCheckReport {
    fn new(config: &ConnectionConfig) -> Self {
        Self {
            uri: redact_uri(config.uri().unwrap_or_default()),
            database: config.database.clone(),
            collections: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        !self.steps.is_empty()
            && self
                .steps
                .iter()
                .all(|step| matches!(step.outcome, Outcome::Passed(_)))
    }

    /// Whether the failure happened before a connection was established.
    pub fn connection_failed(&self) -> bool {
        matches!(
            self.steps.first(),
            Some(Step {
                name: "connect",
                outcome: Outcome::Failed(_)
            })
        )
    }

    fn record(&mut self, name: &'static str, result: std::result::Result<String, String>) -> bool {
        let outcome = match result {
            Ok(summary) => Outcome::Passed(summary),
            Err(message) => Outcome::Failed(message),
        };
        let passed = matches!(outcome, Outcome::Passed(_));
        self.steps.push(Step { name, outcome });
        passed
    }

    /// Print the report to stdout.
    pub fn render(&self, style: &Style) {
        println!("{}", style.heading("NeoRide database check"));
        println!("{}", style.detail(&format!("URI: {}", self.uri)));
        println!("{}", style.detail(&format!("Database: {}", self.database)));
        println!();

        for step in &self.steps {
            match &step.outcome {
                Outcome::Passed(summary) => println!("{}", style.ok(summary)),
                Outcome::Failed(message) => {
                    println!("{}", style.fail(&format!("{} failed: {}", step.name, message)))
                }
            }
            if step.name == "list collections" && matches!(step.outcome, Outcome::Passed(_)) {
                for name in &self.collections {
                    println!("{}", style.detail(&format!("- {name}")));
                }
            }
        }

        println!();
        if self.passed() {
            println!("{}", style.ok("All database operations succeeded"));
        } else if self.connection_failed() {
            println!("{}", style.heading("Troubleshooting tips:"));
            for (index, tip) in TROUBLESHOOTING_TIPS.iter().enumerate() {
                println!("{}", style.detail(&format!("{}. {}", index + 1, tip)));
            }
        }
    }
}

/// Resolve the connection settings from `--uri` or the environment.
///
/// # Errors
///
/// [`LibError::ConfigurationMissing`] when neither source provides a URI.
pub fn resolve_config(uri: Option<String>, attempts: u32) -> Result<ConnectionConfig> {
    let uri = uri
        .or_else(|| std::env::var(MONGODB_URI_ENV).ok())
        .filter(|uri| !uri.trim().is_empty())
        .ok_or_else(|| LibError::ConfigurationMissing {
            variable: MONGODB_URI_ENV.to_string(),
        })?;

    let fallback = std::env::var(MONGODB_DATABASE_ENV).ok();
    let mut config = ConnectionConfig::resolve(Some(uri), fallback.as_deref());
    config.max_attempts = attempts.max(1);
    Ok(config)
}

fn cleanup_outcome(
    deleted: std::result::Result<u64, String>,
) -> std::result::Result<String, String> {
    match deleted? {
        1 => Ok("Deleted test document".to_string()),
        n => Err(format!(
            "expected to delete 1 test document, deleted {n}; check {PROBE_COLLECTION} for leftovers"
        )),
    }
}

/// Hide credentials in a connection string: `mongodb+srv://user:pw@host` →
/// `mongodb+srv://***@host`.
pub fn redact_uri(uri: &str) -> String {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return "***".to_string();
    };
    match rest.rsplit_once('@') {
        Some((_, host)) => format!("{scheme}://***@{host}"),
        None => uri.to_string(),
    }
}

/// Run every probe step, stopping at the first failure.
pub async fn run(config: ConnectionConfig) -> DbCheckReport {
    let mut report = DbCheckReport::new(&config);
    let manager = ConnectionManager::new(config, MongoConnector);

    let connection = match manager.connect().await {
        Ok(connection) => {
            report.record("connect", Ok("Connected to MongoDB".to_string()));
            connection
        }
        Err(err) => {
            report.record("connect", Err(err.to_string()));
            return report;
        }
    };
    let database = connection.database();

    let ping = database
        .run_command(doc! { "ping": 1 })
        .await
        .map(|_| "Database ping successful".to_string())
        .map_err(|err| err.to_string());
    if !report.record("ping", ping) {
        manager.disconnect().await;
        return report;
    }

    let listed = match database.list_collection_names().await {
        Ok(mut names) => {
            names.sort();
            let summary = format!("Found {} collections", names.len());
            report.collections = names;
            Ok(summary)
        }
        Err(err) => Err(err.to_string()),
    };
    if !report.record("list collections", listed) {
        manager.disconnect().await;
        return report;
    }

    let probes = database.collection::<Document>(PROBE_COLLECTION);
    let inserted = probes
        .insert_one(doc! { "name": "Connection Test", "createdAt": DateTime::now() })
        .await;
    let id = match inserted {
        Ok(result) => {
            report.record("insert", Ok("Created test document".to_string()));
            result.inserted_id
        }
        Err(err) => {
            report.record("insert", Err(err.to_string()));
            manager.disconnect().await;
            return report;
        }
    };
    debug!(id = %id, collection = PROBE_COLLECTION, "probe document inserted");

    let read = match probes.find_one(doc! { "_id": id.clone() }).await {
        Ok(Some(found)) => Ok(format!(
            "Retrieved test document: {}",
            found.get_str("name").unwrap_or("<unnamed>")
        )),
        Ok(None) => Err("test document was not found after insert".to_string()),
        Err(err) => Err(err.to_string()),
    };
    report.record("read", read);

    // Clean up even when the read failed, so a leftover probe is reported.
    let deleted = probes
        .delete_one(doc! { "_id": id })
        .await
        .map(|result| result.deleted_count)
        .map_err(|err| err.to_string());
    report.record("delete", cleanup_outcome(deleted));

    manager.disconnect().await;
    report
}
