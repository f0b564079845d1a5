//! Driver documents.
//!
//! A driver carries a derived vehicle record, a GeoJSON location and a weekly
//! schedule in addition to their profile. All three are server-set at
//! creation; afterwards they are ordinary data that updates may overwrite.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use validator::Validate;

use crate::entity::{flatten_validation, lowercase_field, timestamp, to_json, uppercase_field, Entity};
use crate::error::{FieldErrors, Result};
use crate::store::{EntityStore, Store};

/// A driver account keyed by the identity provider's user id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    #[serde(rename = "_id")]
    pub id: String,

    #[validate(length(min = 1, message = "is required"))]
    pub external_id: String,

    #[validate(email(message = "must be a valid email address"))]
    pub email: String,

    #[validate(length(min = 1, message = "is required"))]
    pub full_name: String,

    #[validate(length(min = 1, message = "is required"))]
    pub phone: String,

    #[validate(length(min = 1, message = "is required"))]
    pub license_number: String,

    #[validate(length(min = 1, message = "is required"))]
    pub vehicle_model: String,

    #[validate(length(min = 1, message = "is required"))]
    pub vehicle_plate: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_image_url: Option<String>,

    #[serde(default)]
    pub status: DriverStatus,

    #[serde(default)]
    pub is_available: bool,

    #[serde(default)]
    pub is_online: bool,

    #[serde(default)]
    #[validate(range(min = 0.0, max = 5.0, message = "must be between 0 and 5"))]
    pub rating: f64,

    #[serde(default)]
    #[validate(range(min = 0, message = "must not be negative"))]
    pub total_rides: i64,

    #[serde(default)]
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub total_earnings: f64,

    #[serde(default)]
    #[validate(nested)]
    pub vehicle: Vehicle,

    #[serde(default)]
    pub location: Location,

    #[serde(default)]
    pub working_hours: WorkingHours,

    #[serde(default)]
    #[validate(nested)]
    pub ride_history: Vec<DriverRide>,

    #[serde(default)]
    #[validate(nested)]
    pub reviews: Vec<Review>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Account review state. New drivers start as `pending`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverStatus {
    #[default]
    Pending,
    Approved,
    Suspended,
    Rejected,
}

impl DriverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverStatus::Pending => "pending",
            DriverStatus::Approved => "approved",
            DriverStatus::Suspended => "suspended",
            DriverStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleKind {
    #[default]
    Sedan,
    Suv,
    Hatchback,
    Luxury,
    Economy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1900, max = 2100, message = "must be between 1900 and 2100"))]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate_number: Option<String>,
    #[serde(default)]
    pub kind: VehicleKind,
    #[serde(default = "default_capacity")]
    #[validate(range(min = 1, max = 50, message = "must be between 1 and 50"))]
    pub capacity: i32,
}

impl Default for Vehicle {
    fn default() -> Self {
        Self {
            make: None,
            model: None,
            year: None,
            color: None,
            plate_number: None,
            kind: VehicleKind::default(),
            capacity: default_capacity(),
        }
    }
}

impl Vehicle {
    /// Derive a vehicle record from a free-text model string such as
    /// `"Toyota Corolla Altis"`: the first word is the make, the rest the
    /// model. Either part falls back to `Unknown` when empty.
    pub fn from_model(vehicle_model: &str, plate: &str, year: i32) -> Self {
        let mut words = vehicle_model.split_whitespace();
        let make = words.next().unwrap_or("Unknown").to_string();
        let model = words.collect::<Vec<_>>().join(" ");
        let model = if model.is_empty() {
            "Unknown".to_string()
        } else {
            model
        };

        Self {
            make: Some(make),
            model: Some(model),
            year: Some(year),
            color: Some("Unknown".to_string()),
            plate_number: Some(plate.to_uppercase()),
            kind: VehicleKind::Sedan,
            capacity: default_capacity(),
        }
    }
}

fn default_capacity() -> i32 {
    4
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeoJsonType {
    #[default]
    Point,
}

/// GeoJSON point, `[longitude, latitude]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(rename = "type", default)]
    pub kind: GeoJsonType,
    #[serde(default)]
    pub coordinates: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            kind: GeoJsonType::Point,
            coordinates: [0.0, 0.0],
            address: None,
            last_updated: None,
        }
    }
}

impl Location {
    fn check(&self, errors: &mut FieldErrors) {
        let [longitude, latitude] = self.coordinates;
        if !(-180.0..=180.0).contains(&longitude) {
            errors.insert(
                "location.coordinates.0".to_string(),
                "longitude must be between -180 and 180".to_string(),
            );
        }
        if !(-90.0..=90.0).contains(&latitude) {
            errors.insert(
                "location.coordinates.1".to_string(),
                "latitude must be between -90 and 90".to_string(),
            );
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySchedule {
    #[serde(default = "default_start")]
    pub start: String,
    #[serde(default = "default_end")]
    pub end: String,
    #[serde(default)]
    pub is_working: bool,
}

impl DaySchedule {
    fn standard(is_working: bool) -> Self {
        Self {
            start: default_start(),
            end: default_end(),
            is_working,
        }
    }
}

impl Default for DaySchedule {
    fn default() -> Self {
        Self::standard(false)
    }
}

fn default_start() -> String {
    "09:00".to_string()
}

fn default_end() -> String {
    "17:00".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingHours {
    #[serde(default)]
    pub monday: DaySchedule,
    #[serde(default)]
    pub tuesday: DaySchedule,
    #[serde(default)]
    pub wednesday: DaySchedule,
    #[serde(default)]
    pub thursday: DaySchedule,
    #[serde(default)]
    pub friday: DaySchedule,
    #[serde(default)]
    pub saturday: DaySchedule,
    #[serde(default)]
    pub sunday: DaySchedule,
}

impl WorkingHours {
    /// 09:00–17:00 on weekdays, weekends off.
    pub fn standard() -> Self {
        Self {
            monday: DaySchedule::standard(true),
            tuesday: DaySchedule::standard(true),
            wednesday: DaySchedule::standard(true),
            thursday: DaySchedule::standard(true),
            friday: DaySchedule::standard(true),
            saturday: DaySchedule::standard(false),
            sunday: DaySchedule::standard(false),
        }
    }

    fn days(&self) -> [(&'static str, &DaySchedule); 7] {
        [
            ("monday", &self.monday),
            ("tuesday", &self.tuesday),
            ("wednesday", &self.wednesday),
            ("thursday", &self.thursday),
            ("friday", &self.friday),
            ("saturday", &self.saturday),
            ("sunday", &self.sunday),
        ]
    }

    fn check(&self, errors: &mut FieldErrors) {
        for (day, schedule) in self.days() {
            for (edge, value) in [("start", &schedule.start), ("end", &schedule.end)] {
                if !is_clock_time(value) {
                    errors.insert(
                        format!("workingHours.{day}.{edge}"),
                        "must be a time formatted as HH:MM".to_string(),
                    );
                }
            }
        }
    }
}

/// `HH:MM`, 24-hour clock.
fn is_clock_time(value: &str) -> bool {
    let Some((hours, minutes)) = value.split_once(':') else {
        return false;
    };
    if hours.len() != 2 || minutes.len() != 2 {
        return false;
    }
    matches!(
        (hours.parse::<u8>(), minutes.parse::<u8>()),
        (Ok(h), Ok(m)) if h < 24 && m < 60
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DriverRide {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ride_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub earnings: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0, max = 5.0, message = "must be between 0 and 5"))]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0, max = 5.0, message = "must be between 0 and 5"))]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

fn required_str<'a>(payload: &'a Map<String, Value>, key: &str) -> &'a str {
    payload.get(key).and_then(Value::as_str).unwrap_or_default()
}

impl Entity for Driver {
    const NAME: &'static str = "Driver";
    const COLLECTION: &'static str = "drivers";
    const REQUIRED_FIELDS: &'static [&'static str] = &[
        "externalId",
        "email",
        "fullName",
        "phone",
        "licenseNumber",
        "vehicleModel",
        "vehiclePlate",
    ];
    const UNIQUE_FIELDS: &'static [&'static str] =
        &["externalId", "email", "licenseNumber", "vehiclePlate"];

    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn unique_values(&self) -> Vec<(&'static str, String)> {
        vec![
            ("externalId", self.external_id.clone()),
            ("email", self.email.clone()),
            ("licenseNumber", self.license_number.clone()),
            ("vehiclePlate", self.vehicle_plate.clone()),
        ]
    }

    fn creation_defaults(
        payload: &Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<Map<String, Value>> {
        let vehicle = Vehicle::from_model(
            required_str(payload, "vehicleModel"),
            required_str(payload, "vehiclePlate"),
            now.year(),
        );
        let location = Location {
            last_updated: Some(now),
            ..Location::default()
        };

        let mut defaults = Map::new();
        defaults.insert("status".to_string(), json!(DriverStatus::Pending.as_str()));
        defaults.insert("isAvailable".to_string(), json!(false));
        defaults.insert("isOnline".to_string(), json!(false));
        defaults.insert("rating".to_string(), json!(0.0));
        defaults.insert("totalRides".to_string(), json!(0));
        defaults.insert("totalEarnings".to_string(), json!(0.0));
        defaults.insert("vehicle".to_string(), to_json(&vehicle)?);
        defaults.insert("location".to_string(), to_json(&location)?);
        defaults.insert("workingHours".to_string(), to_json(&WorkingHours::standard())?);

        if let Some(Value::Object(location)) = defaults.get_mut("location") {
            location.insert("lastUpdated".to_string(), timestamp(now));
        }

        Ok(defaults)
    }

    fn normalize(fields: &mut Map<String, Value>) {
        lowercase_field(fields, "email");
        uppercase_field(fields, "vehiclePlate");
    }

    fn check(&self) -> std::result::Result<(), FieldErrors> {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(errors) => flatten_validation(&errors),
        };
        self.location.check(&mut errors);
        self.working_hours.check(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn select(store: &dyn Store) -> &dyn EntityStore<Self> {
        store.drivers()
    }
}
