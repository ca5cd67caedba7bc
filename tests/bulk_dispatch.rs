mod common;

use common::{RecordingTransport, Reply, client_with};
use serde_json::{Value, json};
use suprsend_client::{
    Attachment, BulkLimits, BulkResponse, BulkStatus, Event, IdentityOp, UserEdit,
    WorkflowTrigger,
};

fn assert_counts_balance(response: &BulkResponse) {
    assert_eq!(
        response.total,
        response.success_count + response.failure_count,
        "{response}"
    );
    assert_eq!(response.failed_records.len(), response.failure_count);
}

fn workflow(user: &str) -> WorkflowTrigger {
    WorkflowTrigger::from_value(json!({
        "name": "welcome",
        "template": "welcome-email",
        "notification_category": "transactional",
        "users": [{ "distinct_id": user }],
        "data": { "first_name": user },
    }))
    .unwrap()
}

#[tokio::test]
async fn events_are_sent_in_ordered_chunks_of_one_hundred() {
    let transport = RecordingTransport::default();
    let client = client_with(&transport);

    let mut bulk = client.bulk_events();
    bulk.append((0..250).map(|i| Event::new(format!("user-{i}"), "signup")));
    let response = bulk.trigger().await;

    assert_eq!(response.status, Some(BulkStatus::Success));
    assert_eq!(response.total, 250);
    assert_eq!(response.success_count, 250);
    assert!(response.failed_records.is_empty());
    assert_counts_balance(&response);

    let bodies = transport.bodies();
    let lens: Vec<usize> = bodies
        .iter()
        .map(|body| body.as_array().unwrap().len())
        .collect();
    assert_eq!(lens, vec![100, 100, 50]);

    let ids: Vec<String> = bodies
        .iter()
        .flat_map(|body| body.as_array().unwrap().iter())
        .map(|record| record["distinct_id"].as_str().unwrap().to_string())
        .collect();
    let expected: Vec<String> = (0..250).map(|i| format!("user-{i}")).collect();
    assert_eq!(ids, expected);

    for request in transport.requests() {
        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "https://hub.test/event/");
    }
}

#[tokio::test]
async fn invalid_records_make_the_call_partial() {
    let transport = RecordingTransport::default();
    let client = client_with(&transport);

    let mut bulk = client.bulk_events();
    bulk.append([
        Event::new("user-1", "signup"),
        Event::new("", "signup"),
        Event::new("user-2", "signup"),
    ]);
    let response = bulk.trigger().await;

    assert_eq!(response.status, Some(BulkStatus::Partial));
    assert_eq!(response.total, 3);
    assert_eq!(response.success_count, 2);
    assert_eq!(response.failure_count, 1);
    assert_counts_balance(&response);

    let failed = &response.failed_records[0];
    assert_eq!(failed.code, 500);
    assert!(failed.error.contains("distinct_id"), "{}", failed.error);
    assert_eq!(failed.record["event"], "signup");

    let bodies = transport.bodies();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn empty_bulk_succeeds_without_requests() {
    let transport = RecordingTransport::default();
    let client = client_with(&transport);

    let response = client.bulk_workflows().trigger().await;

    assert_eq!(response.status_str(), "success");
    assert_eq!(response.total, 0);
    assert_eq!(response.success_count, 0);
    assert_eq!(response.failure_count, 0);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn rejected_chunk_fails_every_record_with_provider_status() {
    let transport = RecordingTransport::new(vec![Reply::Status(503, "service unavailable")]);
    let client = client_with(&transport);

    let mut bulk = client.bulk_workflows();
    bulk.append((0..3).map(|i| workflow(&format!("user-{i}"))));
    let response = bulk.trigger().await;

    assert_eq!(response.status, Some(BulkStatus::Fail));
    assert_eq!(response.total, 3);
    assert_eq!(response.failure_count, 3);
    assert_counts_balance(&response);
    for failed in &response.failed_records {
        assert_eq!(failed.code, 503);
        assert_eq!(failed.error, "service unavailable");
        assert_eq!(failed.record["name"], "welcome");
    }

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://hub.test/ws_key/trigger/");
}

#[tokio::test]
async fn mixed_chunk_outcomes_aggregate_to_partial() {
    let transport = RecordingTransport::new(vec![
        Reply::Status(202, "{}"),
        Reply::Status(429, "slow down"),
        Reply::Unreachable,
    ]);
    let client = client_with(&transport);

    let mut bulk = client.bulk_events();
    bulk.append((0..250).map(|i| Event::new(format!("user-{i}"), "signup")));
    let response = bulk.trigger().await;

    assert_eq!(response.status, Some(BulkStatus::Partial));
    assert_eq!(response.total, 250);
    assert_eq!(response.success_count, 100);
    assert_eq!(response.failure_count, 150);
    assert_counts_balance(&response);

    let codes: Vec<u16> = response.failed_records.iter().map(|r| r.code).collect();
    assert_eq!(codes.iter().filter(|code| **code == 429).count(), 100);
    assert_eq!(codes.iter().filter(|code| **code == 500).count(), 50);
    assert!(response.failed_records[100].error.contains("CONNECT-REFUSED"));
}

#[tokio::test]
async fn oversized_identity_edit_fails_before_dispatch() {
    let transport = RecordingTransport::default();
    let client = client_with(&transport);

    let mut edit = UserEdit::new("user-1");
    edit.set("bio", "x".repeat(11 * 1024));

    let mut bulk = client.bulk_user_edits();
    bulk.append([edit]);
    let response = bulk.save().await;

    assert_eq!(response.status, Some(BulkStatus::Fail));
    assert_eq!(response.total, 1);
    assert_eq!(response.failure_count, 1);
    assert!(
        response.failed_records[0].error.contains("10KB"),
        "{}",
        response.failed_records[0].error
    );
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn identity_edit_warnings_reach_the_response() {
    let transport = RecordingTransport::default();
    let client = client_with(&transport);

    let mut edit = UserEdit::new("user-1");
    edit.set("plan", "pro").set("$internal", 1).add_email("not-an-email");

    let mut bulk = client.bulk_user_edits();
    bulk.append([edit]);
    let response = bulk.save().await;

    assert_eq!(response.status, Some(BulkStatus::Success));
    assert_eq!(response.warnings.len(), 2);
    assert!(response.warnings.iter().all(|w| w.starts_with("distinct_id 'user-1'")));

    let bodies = transport.bodies();
    assert_eq!(bodies[0][0]["$set"], json!({ "plan": "pro" }));
}

#[tokio::test]
async fn appended_records_are_snapshots() {
    let transport = RecordingTransport::default();
    let client = client_with(&transport);

    let mut events = vec![Event::new("user-1", "signup")];
    let mut bulk = client.bulk_events();
    bulk.append_cloned(&events);
    events[0].distinct_id = "someone-else".into();
    let response = bulk.trigger().await;

    assert_eq!(response.success_count, 1);
    assert_eq!(transport.bodies()[0][0]["distinct_id"], "user-1");
}

#[tokio::test]
async fn none_entries_are_skipped() {
    let transport = RecordingTransport::default();
    let client = client_with(&transport);

    let mut bulk = client.bulk_events();
    bulk.append([Some(Event::new("user-1", "signup")), None]);
    assert_eq!(bulk.len(), 1);
    let response = bulk.trigger().await;
    assert_eq!(response.total, 1);
}

#[tokio::test]
async fn response_serializes_provider_shape() {
    let transport = RecordingTransport::default();
    let client = client_with(&transport);

    let mut bulk = client.bulk_events();
    bulk.append([Event::new("user-1", "signup")]);
    let response = bulk.trigger().await;

    let value: Value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["status"], "success");
    assert_eq!(value["total"], 1);
    assert_eq!(value["failed_records"], json!([]));
    assert_eq!(
        response.to_string(),
        "BulkResponse<status: success | total: 1 | success: 1 | failure: 0 | warnings: 0>"
    );
}

fn invoice_event(user: &str) -> Event {
    let mut event = Event::new(user, "invoice_ready").with_property("amount", 42);
    event
        .add_attachment(&Attachment::from_bytes(
            "invoice.pdf",
            "application/pdf",
            &[7u8; 3000],
        ))
        .unwrap();
    event
}

#[tokio::test]
async fn attachments_are_dropped_from_bulk_when_disallowed() {
    let limits = BulkLimits {
        max_chunk_size_bytes: 4096,
        allow_attachments_in_bulk: false,
        ..BulkLimits::default()
    };
    let transport = RecordingTransport::default();
    let client = client_with(&transport).with_limits(limits);

    let mut bulk = client.bulk_events();
    bulk.append([invoice_event("user-1"), invoice_event("user-2")]);
    let response = bulk.trigger().await;

    assert_eq!(response.status, Some(BulkStatus::Success), "{:?}", response.failed_records);
    assert_eq!(response.success_count, 2);

    let bodies = transport.bodies();
    assert_eq!(bodies.len(), 1);
    for record in bodies[0].as_array().unwrap() {
        assert_eq!(record["properties"]["amount"], 42);
        assert!(record["properties"].get("$attachments").is_none());
    }
}

#[tokio::test]
async fn attachments_count_against_the_ceiling_when_allowed() {
    let limits = BulkLimits {
        max_chunk_size_bytes: 4096,
        allow_attachments_in_bulk: true,
        ..BulkLimits::default()
    };
    let transport = RecordingTransport::default();
    let client = client_with(&transport).with_limits(limits);

    let mut bulk = client.bulk_events();
    bulk.append([invoice_event("user-1")]);
    let response = bulk.trigger().await;

    assert_eq!(response.status, Some(BulkStatus::Fail));
    assert!(response.failed_records[0].error.starts_with("event too big"));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn custom_identity_ops_keep_generated_keys_intact() {
    let transport = RecordingTransport::default();
    let client = client_with(&transport);

    let mut edit = UserEdit::new("user-1");
    edit.set("plan", "pro")
        .push_op(IdentityOp::Custom {
            key: "distinct_id".into(),
            value: json!(""),
        })
        .push_op(IdentityOp::Custom {
            key: "env".into(),
            value: json!("other-ws"),
        })
        .push_op(IdentityOp::Custom {
            key: "$set".into(),
            value: json!({ "x": 1 }),
        });

    let mut bulk = client.bulk_user_edits();
    bulk.append([edit]);
    let response = bulk.save().await;

    assert_eq!(response.status, Some(BulkStatus::Success));
    assert_eq!(response.warnings.len(), 2);

    let record = &transport.bodies()[0][0];
    assert_eq!(record["distinct_id"], "user-1");
    assert_eq!(record["env"], "ws_key");
    assert_eq!(record["$set"], json!({ "plan": "pro", "x": 1 }));
}
