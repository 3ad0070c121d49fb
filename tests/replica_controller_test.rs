//! End-to-end scenario: a database controller that manages replica objects.
//!
//! Tests verify that:
//! - the controller creates owned replicas and reports them in status
//! - replica status changes flow back to the owning database
//! - scaling the spec converges the replica set
//! - deletion cleans up replicas before the finalizer is released

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use converge::converge_core::is_owned_by;
use converge::prelude::*;

const FINALIZER: &str = "db.example.com/replicas";

#[derive(Debug, Clone, Default)]
struct Database {
    metadata: ObjectMeta,
    spec: DatabaseSpec,
    status: DatabaseStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct DatabaseSpec {
    replicas: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct DatabaseStatus {
    replicas: usize,
    ready_replicas: usize,
}

impl Resource for Database {
    type Spec = DatabaseSpec;
    type Status = DatabaseStatus;

    fn gvk() -> GroupVersionKind {
        GroupVersionKind::new("db.example.com", "v1", "Database")
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn spec(&self) -> &DatabaseSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut DatabaseSpec {
        &mut self.spec
    }

    fn status(&self) -> &DatabaseStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut DatabaseStatus {
        &mut self.status
    }
}

#[derive(Debug, Clone, Default)]
struct Replica {
    metadata: ObjectMeta,
    spec: ReplicaSpec,
    status: ReplicaStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ReplicaSpec {
    index: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ReplicaStatus {
    ready: bool,
}

impl Resource for Replica {
    type Spec = ReplicaSpec;
    type Status = ReplicaStatus;

    fn gvk() -> GroupVersionKind {
        GroupVersionKind::new("db.example.com", "v1", "Replica")
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn spec(&self) -> &ReplicaSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut ReplicaSpec {
        &mut self.spec
    }

    fn status(&self) -> &ReplicaStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut ReplicaStatus {
        &mut self.status
    }
}

async fn owned_replicas(replicas: &MemoryStore<Replica>, db: &Database) -> Vec<Replica> {
    replicas
        .list()
        .await
        .into_iter()
        .filter(|r| is_owned_by(&r.metadata, &db.metadata.uid))
        .collect()
}

/// Drive the replica set of `db` toward `db.spec.replicas`.
async fn sync_replicas(replicas: &MemoryStore<Replica>, db: &mut Database) -> anyhow::Result<()> {
    let namespace = db.metadata.namespace.clone();

    if db.metadata.is_being_deleted() {
        for replica in owned_replicas(replicas, db).await {
            replicas.delete(&namespace, &replica.metadata.name).await?;
        }
        db.metadata.remove_finalizer(FINALIZER);
        return Ok(());
    }
    db.metadata.add_finalizer(FINALIZER);

    let existing = owned_replicas(replicas, db).await;
    for index in 0..db.spec.replicas {
        if existing.iter().any(|r| r.spec.index == index) {
            continue;
        }
        let mut replica = Replica {
            metadata: ObjectMeta::new(
                namespace.as_str(),
                format!("{}-{index}", db.metadata.name),
            ),
            spec: ReplicaSpec { index },
            status: ReplicaStatus::default(),
        };
        set_owner_reference(&mut replica.metadata, &*db, true)?;
        match replicas.create(replica).await {
            Ok(_) | Err(ClientError::AlreadyExists { .. }) => {}
            Err(err) => return Err(err.into()),
        }
    }
    for replica in existing.iter().filter(|r| r.spec.index >= db.spec.replicas) {
        replicas.delete(&namespace, &replica.metadata.name).await?;
    }

    let current = owned_replicas(replicas, db).await;
    db.status.replicas = current.len();
    db.status.ready_replicas = current.iter().filter(|r| r.status.ready).count();
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..300 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn database_controller_manages_replicas_end_to_end() {
    init_tracing();

    // GIVEN: A running database controller that owns replicas
    let databases = MemoryStore::<Database>::new();
    let replicas = MemoryStore::<Replica>::new();
    let replica_client = replicas.clone();
    let reconciler = reconciler_fn::<Database, _>(move |db: &mut Database| {
        let replicas = replica_client.clone();
        Box::pin(async move { sync_replicas(&replicas, db).await })
    });
    let options = ControllerOptions::new()
        .with_concurrency(2)
        .with_rate_limiter(&RateLimiterConfig {
            base_delay_ms: 1,
            max_delay_ms: 20,
            ..RateLimiterConfig::default()
        })
        .unwrap()
        .with_owned_type(OwnedType::new::<Replica>(
            Arc::new(replicas.clone()),
            Database::gvk(),
            true,
        ));
    let controller = Controller::new(Arc::new(databases.clone()), Arc::new(reconciler), options);
    let (stop, signal) = stop_channel();
    let running = tokio::spawn({
        let controller = controller.clone();
        async move { controller.run(signal).await }
    });

    // WHEN: A database asking for three replicas is created
    let mut db = Database::default();
    db.metadata = ObjectMeta::new("default", "orders");
    db.spec.replicas = 3;
    databases.create(db).await.unwrap();

    // THEN: Three replicas exist and the status counts them
    assert!(
        eventually(|| async {
            databases
                .get("default", "orders")
                .await
                .is_ok_and(|db| db.status.replicas == 3 && db.metadata.has_finalizer(FINALIZER))
        })
        .await
    );
    assert_eq!(replicas.list().await.len(), 3);

    // WHEN: Every replica reports ready
    for replica in replicas.list().await {
        let mut ready = replica.clone();
        ready.status.ready = true;
        replicas.update_status("default", &ready).await.unwrap();
    }

    // THEN: The database observes the ready replicas through its owned watch
    assert!(
        eventually(|| async {
            databases
                .get("default", "orders")
                .await
                .is_ok_and(|db| db.status.ready_replicas == 3)
        })
        .await
    );

    // WHEN: The database is scaled down to one replica
    let mut scaled = databases.get("default", "orders").await.unwrap();
    scaled.spec.replicas = 1;
    databases.force_update("default", &scaled).await.unwrap();

    // THEN: Extra replicas are removed
    assert!(eventually(|| async { replicas.list().await.len() == 1 }).await);
    assert!(
        eventually(|| async {
            databases
                .get("default", "orders")
                .await
                .is_ok_and(|db| db.status.replicas == 1 && db.spec.replicas == 1)
        })
        .await
    );

    // WHEN: The database is deleted
    databases.delete("default", "orders").await.unwrap();

    // THEN: Replicas are cleaned up before the database disappears
    assert!(eventually(|| async { !databases.contains("default", "orders") }).await);
    assert!(replicas.list().await.is_empty());

    stop.stop();
    tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let stats = controller.stats();
    assert_eq!(stats.permanent_failures, 0);
    assert!(stats.metadata_writes >= 2);
    assert!(stats.status_writes >= 3);
}
