//! Customer documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use validator::Validate;

use crate::entity::{flatten_validation, lowercase_field, Entity};
use crate::error::{FieldErrors, Result};
use crate::store::{EntityStore, Store};

/// A rider account keyed by the identity provider's user id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
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

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,

    #[serde(default)]
    pub is_verified: bool,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default)]
    pub preferences: Preferences,

    #[serde(default)]
    pub address: Address,

    #[serde(default)]
    pub payment_methods: Vec<PaymentMethod>,

    #[serde(default)]
    #[validate(nested)]
    pub ride_history: Vec<CustomerRide>,

    #[serde(default)]
    #[validate(range(min = 0, message = "must not be negative"))]
    pub total_rides: i64,

    #[serde(default)]
    #[validate(range(min = 0.0, max = 5.0, message = "must be between 0 and 5"))]
    pub average_rating: f64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Notification preferences. Everything is on until the customer opts out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default = "default_true")]
    pub notifications: bool,
    #[serde(default = "default_true")]
    pub sms_alerts: bool,
    #[serde(default = "default_true")]
    pub email_updates: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            notifications: true,
            sms_alerts: true,
            email_updates: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    Card,
    Wallet,
    Cash,
}

/// A stored payment method. `details` is opaque provider data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    pub kind: PaymentKind,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Denormalised copy of a finished ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRide {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ride_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0, max = 5.0, message = "must be between 0 and 5"))]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Entity for Customer {
    const NAME: &'static str = "Customer";
    const COLLECTION: &'static str = "customers";
    const REQUIRED_FIELDS: &'static [&'static str] = &["externalId", "email", "fullName", "phone"];
    const UNIQUE_FIELDS: &'static [&'static str] = &["externalId", "email"];

    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn unique_values(&self) -> Vec<(&'static str, String)> {
        vec![
            ("externalId", self.external_id.clone()),
            ("email", self.email.clone()),
        ]
    }

    fn creation_defaults(
        _payload: &Map<String, Value>,
        _now: DateTime<Utc>,
    ) -> Result<Map<String, Value>> {
        let mut defaults = Map::new();
        defaults.insert(
            "preferences".to_string(),
            json!({
                "notifications": true,
                "smsAlerts": true,
                "emailUpdates": true
            }),
        );
        defaults.insert(
            "paymentMethods".to_string(),
            json!([{ "kind": "cash", "isDefault": true }]),
        );
        defaults.insert("totalRides".to_string(), json!(0));
        defaults.insert("averageRating".to_string(), json!(0.0));
        Ok(defaults)
    }

    fn normalize(fields: &mut Map<String, Value>) {
        lowercase_field(fields, "email");
    }

    fn check(&self) -> std::result::Result<(), FieldErrors> {
        self.validate().map_err(|errors| flatten_validation(&errors))
    }

    fn select(store: &dyn Store) -> &dyn EntityStore<Self> {
        store.customers()
    }
}
