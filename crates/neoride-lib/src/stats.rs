use serde::Serialize;
use serde_json::json;

use crate::driver::DriverStatus;
use crate::error::Result;
use crate::store::Store;

/// Aggregate record counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_customers: u64,
    pub total_drivers: u64,
    pub approved_drivers: u64,
    pub pending_drivers: u64,
}

/// Run the four counts concurrently. Any failure fails the whole query.
pub async fn collect_stats(store: &dyn Store) -> Result<Stats> {
    let drivers = store.drivers();
    let (total_customers, total_drivers, approved_drivers, pending_drivers) = tokio::try_join!(
        store.customers().count(),
        drivers.count(),
        drivers.count_where("status", json!(DriverStatus::Approved.as_str())),
        drivers.count_where("status", json!(DriverStatus::Pending.as_str())),
    )?;

    Ok(Stats {
        total_customers,
        total_drivers,
        approved_drivers,
        pending_drivers,
    })
}
