//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::fmt::Debug;
use std::time::Duration;

use fleet_names::{CharmUrl, ServiceName, StorageTag, UnitTag};
use fleet_unit_agent::filter::EventReceiver;
use fleet_unit_agent::remote::{AttachmentRecord, Life, StorageKind};
use fleet_unit_agent::MemoryModel;

/// Upper bound for anything that is expected to happen.
pub const LONG_WAIT: Duration = Duration::from_secs(5);

/// How long to watch for something that is expected not to happen.
pub const SHORT_WAIT: Duration = Duration::from_millis(50);

pub fn charm(url: &str) -> CharmUrl {
    CharmUrl::parse(url).unwrap()
}

pub fn storage_tag(id: &str) -> StorageTag {
    StorageTag::parse(id).unwrap()
}

/// A model with service `mysql` (charm `cs:quantal/mysql-1`) and unit
/// `mysql/0`.
pub fn mysql_model() -> (MemoryModel, ServiceName, UnitTag) {
    let model = MemoryModel::new();
    let service = ServiceName::parse("mysql").unwrap();
    model.add_service(&service, &charm("cs:quantal/mysql-1"));
    let unit = model.add_unit(&service).unwrap();
    (model, service, unit)
}

pub fn attachment(id: &str, unit: &UnitTag, life: Life) -> AttachmentRecord {
    AttachmentRecord {
        storage_tag: storage_tag(id),
        unit_tag: unit.clone(),
        life,
        kind: StorageKind::Block,
        location: "/dev/sdb".to_string(),
    }
}

/// Wait for the next event on a topic.
pub async fn next_event<T: Clone>(rx: &EventReceiver<T>) -> T {
    tokio::time::timeout(LONG_WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event topic closed")
}

/// Check that no event arrives on a topic for a little while.
pub async fn assert_no_event<T: Clone + Debug + PartialEq>(rx: &EventReceiver<T>) {
    tokio::time::sleep(SHORT_WAIT).await;
    assert_eq!(rx.try_recv(), None);
}

/// Poll `condition` until it holds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + LONG_WAIT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
