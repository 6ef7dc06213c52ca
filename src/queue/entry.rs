//! Queued mutation data model.
//!
//! Payloads are a closed tagged union — one schema per entity kind that
//! can be edited offline — so replay matches exhaustively instead of
//! interpreting loose JSON. Reference data (products, drivers, regions,
//! prices, notifications) is cached read-only and never enters the
//! queue.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};

use crate::store::collections;

/// Reserved prefix marking client-generated placeholder identifiers.
pub const LOCAL_ID_PREFIX: &str = "offline-";

/// An entity identifier: either a client-generated placeholder created
/// while offline, or a server-assigned one. Serialized as a plain
/// string; the reserved prefix keeps the two distinguishable.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecordId {
    Local(String),
    Server(String),
}

impl RecordId {
    /// Generates a fresh placeholder for an entity created offline.
    pub fn new_local() -> Self {
        let suffix: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(|c| (c as char).to_ascii_lowercase())
            .collect();
        RecordId::Local(format!("{LOCAL_ID_PREFIX}{suffix}"))
    }

    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.starts_with(LOCAL_ID_PREFIX) {
            RecordId::Local(raw)
        } else {
            RecordId::Server(raw)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RecordId::Local(id) | RecordId::Server(id) => id,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, RecordId::Local(_))
    }
}

impl From<String> for RecordId {
    fn from(raw: String) -> Self {
        RecordId::parse(raw)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        match id {
            RecordId::Local(id) | RecordId::Server(id) => id,
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain entity kinds with a snapshot cache. Only a subset is writable
/// offline; the rest are reference data refreshed wholesale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Shipment,
    Product,
    Driver,
    Region,
    ProductPrice,
    Notification,
    Installment,
    InstallmentPayment,
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Shipment,
        EntityKind::Product,
        EntityKind::Driver,
        EntityKind::Region,
        EntityKind::ProductPrice,
        EntityKind::Notification,
        EntityKind::Installment,
        EntityKind::InstallmentPayment,
    ];

    /// Remote table backing this kind.
    pub fn table_name(&self) -> &'static str {
        match self {
            EntityKind::Shipment => "shipments",
            EntityKind::Product => "products",
            EntityKind::Driver => "drivers",
            EntityKind::Region => "regions",
            EntityKind::ProductPrice => "product_prices",
            EntityKind::Notification => "notifications",
            EntityKind::Installment => "installments",
            EntityKind::InstallmentPayment => "installment_payments",
        }
    }

    /// Local snapshot collection backing this kind.
    pub fn store_name(&self) -> &'static str {
        match self {
            EntityKind::Shipment => collections::SHIPMENTS,
            EntityKind::Product => collections::PRODUCTS,
            EntityKind::Driver => collections::DRIVERS,
            EntityKind::Region => collections::REGIONS,
            EntityKind::ProductPrice => collections::PRODUCT_PRICES,
            EntityKind::Notification => collections::NOTIFICATIONS,
            EntityKind::Installment => collections::INSTALLMENTS,
            EntityKind::InstallmentPayment => collections::INSTALLMENT_PAYMENTS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
}

/// One product line on a shipment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShipmentProduct {
    pub product_id: String,
    pub product_name: String,
    pub carton_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_wage_price: Option<f64>,
}

/// Full shipment as captured offline. The placeholder id and the pending
/// marker are stripped before the row reaches the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShipmentDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pending_sync: bool,
    pub sales_order: String,
    pub order_date: String,
    pub region_id: String,
    pub driver_id: String,
    pub status: String,
    pub products: Vec<ShipmentProduct>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

/// Sparse set of changed shipment fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShipmentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub products: Option<Vec<ShipmentProduct>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_due_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstallmentDraft {
    pub shipment_id: RecordId,
    pub payable_amount: f64,
    pub remaining_amount: f64,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installment_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InstallmentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payable_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installment_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentDraft {
    pub installment_id: RecordId,
    pub amount: f64,
    pub received_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// The closed set of mutations the dashboard can stage offline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mutation {
    AddShipment { shipment: ShipmentDraft },
    UpdateShipment { target: RecordId, changes: ShipmentPatch },
    CreateInstallment { installment: InstallmentDraft },
    UpdateInstallment { target: RecordId, changes: InstallmentPatch },
    AddInstallmentPayment { payment: PaymentDraft },
    UpdateInstallmentPayment { target: RecordId, changes: PaymentPatch },
}

impl Mutation {
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            Mutation::AddShipment { .. } | Mutation::UpdateShipment { .. } => EntityKind::Shipment,
            Mutation::CreateInstallment { .. } | Mutation::UpdateInstallment { .. } => {
                EntityKind::Installment
            }
            Mutation::AddInstallmentPayment { .. } | Mutation::UpdateInstallmentPayment { .. } => {
                EntityKind::InstallmentPayment
            }
        }
    }

    pub fn operation(&self) -> OperationKind {
        match self {
            Mutation::AddShipment { .. }
            | Mutation::CreateInstallment { .. }
            | Mutation::AddInstallmentPayment { .. } => OperationKind::Create,
            Mutation::UpdateShipment { .. }
            | Mutation::UpdateInstallment { .. }
            | Mutation::UpdateInstallmentPayment { .. } => OperationKind::Update,
        }
    }

    /// For updates, the identifier the mutation targets.
    pub fn update_target(&self) -> Option<&RecordId> {
        match self {
            Mutation::UpdateShipment { target, .. }
            | Mutation::UpdateInstallment { target, .. }
            | Mutation::UpdateInstallmentPayment { target, .. } => Some(target),
            _ => None,
        }
    }

    /// For creates made offline, the client-generated placeholder.
    pub fn local_placeholder(&self) -> Option<&RecordId> {
        match self {
            Mutation::AddShipment { shipment } => {
                shipment.id.as_ref().filter(|id| id.is_local())
            }
            _ => None,
        }
    }
}

/// One pending local mutation, as persisted (encrypted) in the queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    pub mutation: Mutation,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueueEntry {
    pub fn new(mutation: Mutation) -> Self {
        Self {
            id: generate_entry_id(),
            mutation,
            submitted_at: Utc::now(),
            last_error: None,
        }
    }
}

fn generate_entry_id() -> String {
    let suffix: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect();
    format!("{}-{}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_id_parses_by_prefix() {
        assert!(RecordId::parse("offline-ab12").is_local());
        assert!(!RecordId::parse("3f8a9c50-1d2e").is_local());
        assert!(RecordId::new_local().is_local());
    }

    #[test]
    fn record_id_serializes_as_plain_string() {
        let id = RecordId::parse("offline-x1");
        assert_eq!(serde_json::to_value(&id).unwrap(), json!("offline-x1"));

        let parsed: RecordId = serde_json::from_value(json!("offline-x1")).unwrap();
        assert!(parsed.is_local());
    }

    #[test]
    fn mutation_discriminants() {
        let create = Mutation::AddShipment {
            shipment: ShipmentDraft {
                id: Some(RecordId::new_local()),
                pending_sync: true,
                sales_order: "SO-1001".into(),
                order_date: "2026-08-01".into(),
                region_id: "r-1".into(),
                driver_id: "d-1".into(),
                status: "pending".into(),
                products: vec![],
                due_amount: None,
                notes: None,
                created_by: None,
            },
        };
        assert_eq!(create.entity_kind(), EntityKind::Shipment);
        assert_eq!(create.operation(), OperationKind::Create);
        assert!(create.local_placeholder().is_some());
        assert!(create.update_target().is_none());

        let update = Mutation::UpdateInstallment {
            target: RecordId::parse("i-9"),
            changes: InstallmentPatch {
                remaining_amount: Some(0.0),
                status: Some("completed".into()),
                ..InstallmentPatch::default()
            },
        };
        assert_eq!(update.operation(), OperationKind::Update);
        assert_eq!(update.update_target().unwrap().as_str(), "i-9");
    }

    #[test]
    fn queue_entry_roundtrips_through_json() {
        let entry = QueueEntry::new(Mutation::UpdateShipment {
            target: RecordId::parse("offline-abc"),
            changes: ShipmentPatch {
                status: Some("delivered".into()),
                ..ShipmentPatch::default()
            },
        });

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["mutation"]["type"], json!("update_shipment"));
        let parsed: QueueEntry = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, entry);
    }
}
