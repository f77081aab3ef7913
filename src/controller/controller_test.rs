use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing_test::traced_test;

use super::*;
use crate::EventType;
use crate::HubConfig;
use crate::Life;
use crate::MonitoringConfig;
use crate::TopicPattern;

fn setup_cache(kinds: &[&str]) -> ControllerCache {
    let config = CacheConfig {
        enabled_kinds: kinds.iter().map(|k| k.to_string()).collect(),
        cascade_application_units: true,
    };
    let gauges = Arc::new(ControllerGauges::new("controller_test").unwrap());
    let hub = Hub::new(HubConfig::default(), gauges.clone());
    ControllerCache::with_hub(config, hub, gauges).unwrap()
}

fn full_cache() -> ControllerCache {
    setup_cache(&["model", "application", "machine", "unit", "charm"])
}

/// Populates one model with an application, two units, a machine and a charm
fn populate_model(
    cache: &ControllerCache,
    uuid: &str,
) {
    let records = vec![
        ChangeRecord::upsert(Model::new(uuid, "default")),
        ChangeRecord::upsert(Application::new(uuid, "mysql", "cs:mysql-3")),
        ChangeRecord::upsert(Unit::new(uuid, "mysql/0", "mysql")),
        ChangeRecord::upsert(Unit::new(uuid, "mysql/1", "mysql")),
        ChangeRecord::upsert(Machine::new(uuid, "0")),
        ChangeRecord::upsert(Charm::new(uuid, "cs:mysql-3", 3)),
    ];
    for record in records {
        cache.apply_change(record).unwrap();
    }
}

#[test]
fn test_new_registers_configured_kinds_only() {
    let cache = setup_cache(&["charm", "unit"]);

    assert!(cache.is_registered(EntityKind::Charm));
    assert!(cache.is_registered(EntityKind::Unit));
    assert!(!cache.is_registered(EntityKind::Model));
    assert!(!cache.is_registered(EntityKind::Machine));
}

#[test]
fn test_new_rejects_unknown_kind_in_config() {
    let config = CacheConfig {
        enabled_kinds: vec!["relation".to_string()],
        cascade_application_units: true,
    };
    let gauges = Arc::new(ControllerGauges::new("controller_test").unwrap());
    let hub = Hub::new(HubConfig::default(), gauges.clone());

    assert!(matches!(
        ControllerCache::with_hub(config, hub, gauges),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_apply_change_routes_to_store_of_kind() {
    let cache = full_cache();
    populate_model(&cache, "uuid-1");

    assert_eq!(cache.model("uuid-1").unwrap().name, "default");
    assert_eq!(cache.application("uuid-1", "mysql").unwrap().charm_url, "cs:mysql-3");
    assert_eq!(cache.unit("uuid-1", "mysql/1").unwrap().application, "mysql");
    assert_eq!(cache.machine("uuid-1", "0").unwrap().id, "0");
    assert_eq!(cache.charm("uuid-1", "cs:mysql-3").unwrap().revision, 3);
    assert_eq!(cache.gauges().entity_count(EntityKind::Unit), 2);
}

#[test]
fn test_accessor_not_found() {
    let cache = full_cache();

    let err = cache.unit("uuid-1", "mysql/0").unwrap_err();
    assert!(err.is_not_found());
    match err {
        Error::Cache(CacheError::NotFound { kind, key }) => {
            assert_eq!(kind, EntityKind::Unit);
            assert_eq!(key, EntityKey::new("uuid-1", "mysql/0"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
#[traced_test]
fn test_unknown_kind_rejects_record_only() {
    let cache = setup_cache(&["charm"]);

    let result = cache.apply_change(ChangeRecord::upsert(Unit::new("uuid-1", "mysql/0", "mysql")));
    assert!(matches!(
        result,
        Err(Error::Cache(CacheError::UnknownKind(ref kind))) if kind == "unit"
    ));

    let result = cache.apply_change(ChangeRecord::Remove {
        kind: "relation".to_string(),
        key: EntityKey::new("uuid-1", "db"),
    });
    assert!(matches!(result, Err(Error::Cache(CacheError::UnknownKind(_)))));

    assert_eq!(cache.gauges().changes_rejected(REASON_UNKNOWN_KIND), 2);
    assert!(logs_contain("Dropping change record for unregistered kind"));

    // Cache still usable
    cache.apply_change(ChangeRecord::upsert(Charm::new("uuid-1", "ch1", 1))).unwrap();
    assert_eq!(cache.charm("uuid-1", "ch1").unwrap().revision, 1);
    assert!(matches!(
        cache.unit("uuid-1", "mysql/0"),
        Err(Error::Cache(CacheError::UnknownKind(_)))
    ));
    assert!(cache.units("uuid-1").is_empty());
}

#[test]
fn test_duplicate_records_are_idempotent() {
    let cache = full_cache();
    let mut unit = Unit::new("uuid-1", "mysql/0", "mysql");
    unit.workload_status = "active".to_string();

    cache.apply_change(ChangeRecord::upsert(unit.clone())).unwrap();
    cache.apply_change(ChangeRecord::upsert(unit.clone())).unwrap();
    assert_eq!(cache.unit("uuid-1", "mysql/0").unwrap(), unit);
    assert_eq!(cache.gauges().changes_unchanged(EntityKind::Unit), 1);

    let removal = ChangeRecord::from(unit.identity());
    cache.apply_change(removal.clone()).unwrap();
    cache.apply_change(removal).unwrap();
    assert!(cache.unit("uuid-1", "mysql/0").unwrap_err().is_not_found());
    assert_eq!(cache.gauges().entity_count(EntityKind::Unit), 0);
}

#[test]
fn test_model_removal_cascades_to_scoped_entities() {
    let cache = full_cache();
    populate_model(&cache, "uuid-1");
    populate_model(&cache, "uuid-2");

    cache
        .apply_change(ChangeRecord::remove(EntityKind::Model, EntityKey::model("uuid-1")))
        .unwrap();

    assert!(cache.model("uuid-1").unwrap_err().is_not_found());
    assert!(cache.applications("uuid-1").is_empty());
    assert!(cache.machines("uuid-1").is_empty());
    assert!(cache.units("uuid-1").is_empty());
    assert!(cache.charms("uuid-1").is_empty());

    // Other models untouched
    assert_eq!(cache.models().len(), 1);
    assert_eq!(cache.units("uuid-2").len(), 2);
    assert_eq!(cache.charms("uuid-2").len(), 1);

    let gauges = cache.gauges();
    assert_eq!(gauges.cascade_removals(EntityKind::Unit), 2);
    assert_eq!(gauges.cascade_removals(EntityKind::Application), 1);
    assert_eq!(gauges.cascade_removals(EntityKind::Machine), 1);
    assert_eq!(gauges.cascade_removals(EntityKind::Charm), 1);
    assert_eq!(gauges.cascade_removals(EntityKind::Model), 0);
}

#[tokio::test]
async fn test_model_removal_is_published_last() {
    let cache = full_cache();
    populate_model(&cache, "uuid-1");
    let mut watcher = cache.hub().watch(TopicPattern::all().event(EventType::Removed).model("uuid-1"));

    cache
        .apply_change(ChangeRecord::remove(EntityKind::Model, EntityKey::model("uuid-1")))
        .unwrap();

    let mut kinds = Vec::new();
    while let Some(message) = watcher.try_recv() {
        kinds.push(message.topic.kind());
    }
    assert_eq!(
        kinds,
        vec![
            EntityKind::Unit,
            EntityKind::Unit,
            EntityKind::Application,
            EntityKind::Machine,
            EntityKind::Charm,
            EntityKind::Model,
        ]
    );
}

#[test]
fn test_application_removal_cascades_to_its_units() {
    let cache = full_cache();
    populate_model(&cache, "uuid-1");
    cache
        .apply_change(ChangeRecord::upsert(Unit::new("uuid-1", "wordpress/0", "wordpress")))
        .unwrap();

    cache
        .apply_change(ChangeRecord::remove(
            EntityKind::Application,
            EntityKey::new("uuid-1", "mysql"),
        ))
        .unwrap();

    assert!(cache.units_of_application("uuid-1", "mysql").is_empty());
    let remaining: Vec<_> = cache.units("uuid-1").into_iter().map(|u| u.name).collect();
    assert_eq!(remaining, vec!["wordpress/0"]);
    assert_eq!(cache.gauges().cascade_removals(EntityKind::Unit), 2);
}

#[test]
fn test_application_cascade_can_be_disabled() {
    let config = CacheConfig {
        cascade_application_units: false,
        ..CacheConfig::default()
    };
    let gauges = Arc::new(ControllerGauges::new("controller_test").unwrap());
    let hub = Hub::new(HubConfig::default(), gauges.clone());
    let cache = ControllerCache::with_hub(config, hub, gauges).unwrap();
    populate_model(&cache, "uuid-1");

    cache
        .apply_change(ChangeRecord::remove(
            EntityKind::Application,
            EntityKey::new("uuid-1", "mysql"),
        ))
        .unwrap();

    assert_eq!(cache.units_of_application("uuid-1", "mysql").len(), 2);
}

#[test]
fn test_mark_and_sweep_across_stores() {
    let cache = full_cache();
    populate_model(&cache, "uuid-1");

    cache.mark();
    // Replay only mentions the model, the application and one unit
    cache.apply_change(ChangeRecord::upsert(Model::new("uuid-1", "default"))).unwrap();
    cache
        .apply_change(ChangeRecord::upsert(Application::new("uuid-1", "mysql", "cs:mysql-3")))
        .unwrap();
    let mut unit = Unit::new("uuid-1", "mysql/0", "mysql");
    unit.life = Life::Dying;
    cache.apply_change(ChangeRecord::upsert(unit)).unwrap();

    assert_eq!(cache.sweep(), 3);

    assert!(cache.model("uuid-1").is_ok());
    assert_eq!(cache.unit("uuid-1", "mysql/0").unwrap().life, Life::Dying);
    assert!(cache.unit("uuid-1", "mysql/1").unwrap_err().is_not_found());
    assert!(cache.machines("uuid-1").is_empty());
    assert!(cache.charms("uuid-1").is_empty());
    assert_eq!(cache.sweep(), 0);
}

#[tokio::test]
async fn test_run_applies_records_until_channel_closes() {
    let cache = full_cache();
    let (tx, rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(());

    tx.send(ChangeRecord::upsert(Charm::new("uuid-1", "ch1", 3))).await.unwrap();
    tx.send(ChangeRecord::Remove {
        kind: "relation".to_string(),
        key: EntityKey::new("uuid-1", "db"),
    })
    .await
    .unwrap();
    tx.send(ChangeRecord::upsert(Charm::new("uuid-1", "ch1", 4))).await.unwrap();
    drop(tx);

    timeout(Duration::from_secs(1), cache.run(rx, shutdown_rx))
        .await
        .expect("ingest loop should stop on channel close")
        .unwrap();

    assert_eq!(cache.charm("uuid-1", "ch1").unwrap().revision, 4);
    assert_eq!(cache.gauges().changes_rejected(REASON_UNKNOWN_KIND), 1);
}

#[tokio::test]
async fn test_run_stops_on_shutdown_signal() {
    let cache = full_cache();
    let (_tx, rx) = mpsc::channel::<ChangeRecord>(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(()).unwrap();
    });

    timeout(Duration::from_secs(1), cache.run(rx, shutdown_rx))
        .await
        .expect("ingest loop should stop on shutdown")
        .unwrap();
    stopper.await.unwrap();
}

async fn scrape(port: u16) -> std::io::Result<String> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await?;
    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await?;
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    Ok(String::from_utf8_lossy(&response).into_owned())
}

#[tokio::test]
async fn test_serve_metrics_disabled_binds_nothing() {
    let cache = full_cache();
    let (_shutdown_tx, shutdown_rx) = watch::channel(());

    let addr = cache.serve_metrics(&MonitoringConfig::default(), shutdown_rx).unwrap();
    assert!(addr.is_none());
}

#[tokio::test]
async fn test_serve_metrics_scrape_then_shutdown() {
    let cache = full_cache();
    cache.apply_change(ChangeRecord::upsert(Charm::new("uuid-1", "ch1", 3))).unwrap();

    let monitoring = MonitoringConfig {
        prometheus_enabled: true,
        prometheus_port: 0,
        ..MonitoringConfig::default()
    };
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let addr = cache
        .serve_metrics(&monitoring, shutdown_rx)
        .unwrap()
        .expect("endpoint should be bound when enabled");
    assert_ne!(addr.port(), 0);

    let response = timeout(Duration::from_secs(2), scrape(addr.port()))
        .await
        .expect("Timeout scraping metrics")
        .expect("scrape should succeed");
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("controller_test_entities{kind=\"charm\"} 1"));

    shutdown_tx.send(()).unwrap();
    timeout(Duration::from_secs(2), async {
        while TcpStream::connect(("127.0.0.1", addr.port())).await.is_ok() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("metrics endpoint should stop after shutdown");
}
