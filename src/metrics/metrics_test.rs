use warp::Filter;

use super::*;

fn create_test_gauges() -> ControllerGauges {
    ControllerGauges::new("cache_test").unwrap()
}

#[test]
fn test_custom_registry_prefixes_metric_names() {
    let gauges = create_test_gauges();

    gauges
        .changes_processed
        .with_label_values(&[EntityKind::Charm.as_str(), OP_UPSERT])
        .inc();
    let metrics = gauges.registry().gather();
    assert!(!metrics.is_empty());

    let metric_names: Vec<_> = metrics.iter().map(|m| m.get_name()).collect();
    assert!(
        metric_names.contains(&"cache_test_changes_processed"),
        "Missing cache_test_changes_processed"
    );
}

#[test]
fn test_counter_increment() {
    let gauges = create_test_gauges();

    gauges
        .changes_processed
        .with_label_values(&[EntityKind::Unit.as_str(), OP_REMOVE])
        .inc();
    gauges
        .changes_processed
        .with_label_values(&[EntityKind::Unit.as_str(), OP_REMOVE])
        .inc();

    assert_eq!(gauges.changes_processed(EntityKind::Unit, OP_REMOVE), 2);
    assert_eq!(gauges.changes_processed(EntityKind::Unit, OP_UPSERT), 0);
}

#[test]
fn test_gauge_labels_are_independent() {
    let gauges = create_test_gauges();

    gauges.entities.with_label_values(&[EntityKind::Model.as_str()]).inc();
    gauges.entities.with_label_values(&[EntityKind::Machine.as_str()]).add(3);
    gauges.entities.with_label_values(&[EntityKind::Machine.as_str()]).dec();

    assert_eq!(gauges.entity_count(EntityKind::Model), 1);
    assert_eq!(gauges.entity_count(EntityKind::Machine), 2);
    assert_eq!(gauges.entity_count(EntityKind::Charm), 0);
}

#[test]
fn test_separate_instances_do_not_share_values() {
    let a = create_test_gauges();
    let b = create_test_gauges();

    a.hub_handler_failures.inc();

    assert_eq!(a.handler_failures(), 1);
    assert_eq!(b.handler_failures(), 0);
}

#[test]
fn test_empty_namespace_is_rejected() {
    assert!(ControllerGauges::new("").is_err());
}

#[tokio::test]
async fn test_metrics_endpoint_format() {
    let gauges = create_test_gauges();
    gauges.changes_rejected.with_label_values(&[REASON_UNKNOWN_KIND]).inc();
    let registry = gauges.registry().clone();

    let metrics_route = warp::path!("metrics")
        .map(move || registry.clone())
        .and_then(metrics_handler);

    let response = warp::test::request()
        .method("GET")
        .path("/metrics")
        .reply(&metrics_route)
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("Content-Type"),
        Some(&"text/plain; charset=utf-8".parse().unwrap())
    );

    let body = String::from_utf8(response.body().to_vec()).unwrap();
    assert!(body.contains("cache_test_changes_rejected"));
    assert!(body.contains("unknown_kind"));
}

#[test]
fn test_encode_text_contains_entity_gauge() {
    let gauges = create_test_gauges();
    gauges.entities.with_label_values(&[EntityKind::Charm.as_str()]).set(7);

    let text = gauges.encode_text();
    assert!(text.contains("cache_test_entities{kind=\"charm\"} 7"));
}
