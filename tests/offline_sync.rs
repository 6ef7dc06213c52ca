//! End-to-end drain over the REST backend: offline edits accumulate,
//! connectivity returns, and the queue reconciles against a mocked row
//! API with identifier remapping.

#![cfg(not(target_arch = "wasm32"))]

use std::sync::Arc;

use httpmock::prelude::*;
use serde_json::json;
use shipsync::api::SyncService;
use shipsync::config::SyncConfig;
use shipsync::queue::{Mutation, RecordId, ShipmentDraft, ShipmentPatch, ShipmentProduct};
use shipsync::remote::{RestOptions, RestRowBackend};
use shipsync::store::MemoryEngine;
use shipsync::sync::DrainNotice;

fn test_config() -> SyncConfig {
    SyncConfig {
        rate_limit: chrono::Duration::zero(),
        initially_online: false,
        ..SyncConfig::default()
    }
}

fn service_against(server: &MockServer) -> SyncService {
    let backend = Arc::new(RestRowBackend::new(RestOptions::new(
        server.url("/rest/v1/").parse().unwrap(),
        "anon-key",
    )));
    SyncService::new(Arc::new(MemoryEngine::default()), backend, test_config())
}

/// The transition to online schedules a detached drain; wait for its
/// ended notice instead of racing it.
async fn drained(service: &SyncService) {
    let notices = service.subscribe_to_drain_notices();
    service.set_online(true);
    loop {
        match notices.recv().await.expect("notice bus closed") {
            DrainNotice::Ended { .. } => break,
            DrainNotice::Started { .. } => {}
        }
    }
}

fn offline_shipment(local_id: &str) -> Mutation {
    Mutation::AddShipment {
        shipment: ShipmentDraft {
            id: Some(RecordId::parse(local_id)),
            pending_sync: true,
            sales_order: "SO-2051".into(),
            order_date: "2026-08-04".into(),
            region_id: "r-1".into(),
            driver_id: "d-2".into(),
            status: "pending".into(),
            products: vec![ShipmentProduct {
                product_id: "p-4".into(),
                product_name: "Olive oil 4L".into(),
                carton_count: 25,
                product_wage_price: Some(3.0),
            }],
            due_amount: Some(2100.0),
            notes: Some("left at depot".into()),
            created_by: Some("u-12".into()),
        },
    }
}

#[tokio::test(flavor = "current_thread")]
async fn offline_edits_reconcile_with_remapped_identifiers() {
    let server = MockServer::start();

    let insert = server.mock(|when, then| {
        when.method(POST).path("/rest/v1/shipments");
        then.status(201).json_body(json!([{
            "id": "srv-100",
            "sales_order": "SO-2051",
            "status": "pending"
        }]));
    });
    // The update must arrive against the server-assigned identifier,
    // never the literal placeholder.
    let update = server.mock(|when, then| {
        when.method("PATCH")
            .path("/rest/v1/shipments")
            .query_param("id", "eq.srv-100");
        then.status(200).json_body(json!([{
            "id": "srv-100",
            "status": "delivered"
        }]));
    });
    // Snapshot refresh sweeps every table after the pass.
    let refresh = server.mock(|when, then| {
        when.method(GET)
            .path_matches(Regex::new("^/rest/v1/.+").unwrap());
        then.status(200).json_body(json!([]));
    });

    let service = service_against(&server);

    // Two edits land while offline; nothing touches the network.
    service
        .enqueue_mutation(offline_shipment("offline-e2e"))
        .await
        .unwrap();
    service
        .enqueue_mutation(Mutation::UpdateShipment {
            target: RecordId::parse("offline-e2e"),
            changes: ShipmentPatch {
                status: Some("delivered".into()),
                ..ShipmentPatch::default()
            },
        })
        .await
        .unwrap();
    assert_eq!(service.current_status().pending_count, 2);
    insert.assert_hits(0);

    drained(&service).await;

    insert.assert();
    update.assert();
    assert!(refresh.hits() > 0);

    let status = service.current_status();
    assert_eq!(status.pending_count, 0);
    assert!(status.last_sync_time.is_some());
    assert!(status.last_sync_error.is_none());
}

#[tokio::test(flavor = "current_thread")]
async fn backend_outage_retains_the_queue_for_the_next_pass() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/rest/v1/shipments");
        then.status(503).body("maintenance window");
    });
    server.mock(|when, then| {
        when.method(GET)
            .path_matches(Regex::new("^/rest/v1/.+").unwrap());
        then.status(200).json_body(json!([]));
    });

    let service = service_against(&server);

    service
        .enqueue_mutation(offline_shipment("offline-retry"))
        .await
        .unwrap();

    drained(&service).await;

    let status = service.current_status();
    assert_eq!(status.pending_count, 1);
    assert!(status.last_sync_error.is_some());
    assert!(status.last_sync_time.is_some());
}
