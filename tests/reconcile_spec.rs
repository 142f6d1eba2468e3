use std::time::Duration;

use async_trait::async_trait;
use dataplane_compute::db::Database;
use dataplane_compute::deploy::*;
use dataplane_compute::models::*;
use dataplane_compute::reconcile::reconcile_node;
use dataplane_compute::store::{ObjectStore, StoreError};
use speculate2::speculate;
use tokio_test::block_on;
use tokio_util::sync::CancellationToken;

fn create_test_node(db: &Database, name: &str) -> DataPlaneNode {
    db.create_node(CreateNodeInput {
        namespace: "openstack".to_string(),
        name: name.to_string(),
    })
    .expect("Failed to create node")
}

fn deployment(image: &str) -> ComputeDeployment {
    ComputeDeployment {
        ssh_key_secret: "ssh-key".to_string(),
        inventory_config_map: "inventory".to_string(),
        network_attachments: vec!["ctlplane".to_string()],
        ansible_ee_image: image.to_string(),
    }
}

/// Database whose compute record is bumped by another writer on every fetch.
struct RacingDb {
    db: Database,
}

#[async_trait]
impl ObjectStore for RacingDb {
    async fn fetch(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<Option<ExternalCompute>, StoreError> {
        let fetched = self.db.fetch(key, cancel).await?;
        if let Some(record) = &fetched {
            self.db.update_external_compute_status(
                key,
                &record.status,
                record.metadata.resource_version,
            )?;
        }
        Ok(fetched)
    }

    async fn write(
        &self,
        record: ExternalCompute,
        cancel: &CancellationToken,
    ) -> Result<ExternalCompute, StoreError> {
        self.db.write(record, cancel).await
    }
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
        let cancel = CancellationToken::new();
    }

    describe "reconcile_node" {
        it "creates the compute and finishes" {
            let node = create_test_node(&db, "edpm-compute-0");

            let outcome = block_on(reconcile_node(&db, &db, &node.metadata.key(), &deployment("runner:1"), &cancel))
                .expect("Reconcile failed");

            assert!(outcome.succeeded());
            assert!(!outcome.conflict);
            assert_eq!(outcome.action, ReconcileAction::done());
            let compute = outcome.compute.expect("Compute not returned");
            assert_eq!(compute.spec.ansible_ee_container_image, "runner:1");
        }

        it "asks to be requeued after losing a write race" {
            let node = create_test_node(&db, "edpm-compute-0");
            let key = node.metadata.key();
            block_on(reconcile_node(&db, &db, &key, &deployment("runner:1"), &cancel))
                .expect("First reconcile failed");
            let racing = RacingDb { db: db.clone() };

            let outcome = block_on(reconcile_node(&db, &racing, &key, &deployment("runner:2"), &cancel))
                .expect("Reconcile failed");

            assert!(outcome.conflict);
            assert!(!outcome.succeeded());
            assert_eq!(outcome.action.requeue_after, Some(Duration::from_secs(1)));
            let stored = db.get_external_compute(&key).unwrap().unwrap();
            assert_eq!(stored.spec.ansible_ee_container_image, "runner:1");
        }

        it "persists a mirrored error on the node" {
            let node = create_test_node(&db, "edpm-compute-0");
            let key = node.metadata.key();
            block_on(reconcile_node(&db, &db, &key, &deployment("runner:1"), &cancel))
                .expect("First reconcile failed");
            let compute = db.get_external_compute(&key).unwrap().unwrap();
            let mut status = compute.status.clone();
            status.conditions.set(Condition::false_(READY, Severity::Error, "Error", "Playbook failed"));
            db.update_external_compute_status(&key, &status, compute.metadata.resource_version)
                .expect("Status update failed");

            let outcome = block_on(reconcile_node(&db, &db, &key, &deployment("runner:1"), &cancel))
                .expect("Reconcile failed");

            assert!(!outcome.conflict);
            assert_eq!(outcome.action, ReconcileAction::done());
            assert!(outcome.error.is_some());
            let stored = db.get_node(&key).unwrap().unwrap();
            assert!(is_error(stored.status.conditions.get(&NOVA_COMPUTE_READY.into())));
        }

        it "fails for an unknown node" {
            let key = ObjectKey::new("openstack", "missing");

            let err = block_on(reconcile_node(&db, &db, &key, &deployment("runner:1"), &cancel)).unwrap_err();

            assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::NotFound(_))));
        }
    }
}
