//! Hierarchical ownership checks.
//!
//! Every hop is an explicit [`Store::get`] by primary key. Nothing relies on
//! relations being loaded alongside a record, so the walk is the same on
//! every backend.

use std::sync::Arc;

use homeman_core::{Error, Principal, ResourceKind, ResourceRef, Result};
use homeman_storage::{Record, Store};
use tracing::debug;
use uuid::Uuid;

/// Most edges between a resource and its owning user (Reading → Sensor →
/// Device → User).
pub const MAX_HOPS: usize = ResourceKind::Reading.depth();

/// The user a record belongs to, when it can be read off the record itself.
fn owning_user(record: &Record) -> Option<Uuid> {
    match record {
        Record::Device(device) => Some(device.user_id),
        other => other.as_user_id(),
    }
}

/// Decides whether a principal owns a resource.
#[derive(Clone)]
pub struct OwnershipResolver {
    store: Arc<dyn Store>,
}

impl OwnershipResolver {
    /// Resolves against `store`.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// `Ok` when `principal` owns `target`.
    ///
    /// Fails with `NotFound` when the target, or any record on its chain, is
    /// absent, and with `Forbidden` when the chain ends at another user. The
    /// principal's privilege flag is not consulted.
    pub async fn authorize_resource(
        &self,
        principal: &Principal,
        target: &ResourceRef,
    ) -> Result<()> {
        let owner = self.owner_of(target).await?;
        if owner == principal.subject_id {
            Ok(())
        } else {
            debug!(%target, subject = %principal.subject_id, "ownership denied");
            Err(Error::forbidden(format!(
                "You are not the owner of this {}",
                target.kind.label().to_lowercase()
            )))
        }
    }

    /// Walks from `target` up to the user that owns it.
    pub async fn owner_of(&self, target: &ResourceRef) -> Result<Uuid> {
        let not_found = || Error::not_found(format!("{} not found", target.kind.label()));

        let mut record = self
            .store
            .get(target.kind, &target.id)
            .await?
            .ok_or_else(not_found)?;

        for _ in 0..target.kind.depth().min(MAX_HOPS) {
            if let Some(user_id) = owning_user(&record) {
                return Ok(user_id);
            }
            let Some(edge) = record.owner() else {
                break;
            };
            let expected = record.kind().owner_kind();
            record = self
                .store
                .get(edge.kind, &edge.id)
                .await?
                .ok_or_else(|| {
                    debug!(%target, missing = %edge, "ownership chain is broken");
                    not_found()
                })?;
            if Some(record.kind()) != expected {
                return Err(Error::backend(format!(
                    "{edge} resolved to a {} record",
                    record.kind()
                )));
            }
        }

        owning_user(&record)
            .ok_or_else(|| Error::backend(format!("ownership chain of {target} is too long")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use homeman_core::ResourceKind;
    use homeman_storage::{MemoryStore, NewDevice, NewSensor, NewUser};

    struct World {
        store: Arc<MemoryStore>,
        resolver: OwnershipResolver,
        alice: Principal,
        bob: Principal,
        device: Uuid,
        sensor: Uuid,
        reading: i64,
    }

    async fn user(store: &MemoryStore, email: &str) -> Uuid {
        store
            .create_user(NewUser {
                email: email.into(),
                full_name: None,
                is_superuser: false,
                hashed_password: "x".into(),
            })
            .await
            .unwrap()
            .id
    }

    async fn world() -> World {
        let store = Arc::new(MemoryStore::new());
        let alice = user(&store, "alice@example.com").await;
        let bob = user(&store, "bob@example.com").await;
        let device = store
            .create_device(
                alice,
                NewDevice {
                    name: "Hall".into(),
                    is_active: true,
                    type_id: None,
                },
            )
            .await
            .unwrap();
        let sensor_type = store.create_sensor_type("Temperature", "°C").await.unwrap();
        let sensor = store
            .create_sensor(NewSensor {
                name: "Hall temp".into(),
                is_active: true,
                type_id: sensor_type.id,
                device_id: device.id,
            })
            .await
            .unwrap();
        let reading = store.create_reading(sensor.id, 21.5).await.unwrap();

        World {
            resolver: OwnershipResolver::new(store.clone()),
            store,
            alice: Principal::new(alice),
            bob: Principal::new(bob),
            device: device.id,
            sensor: sensor.id,
            reading: reading.id,
        }
    }

    // ------------------------------------------------------------------------
    // Decisions
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_owner_is_allowed() {
        let w = world().await;
        for target in [
            ResourceRef::device(w.device),
            ResourceRef::sensor(w.sensor),
            ResourceRef::reading(w.reading),
        ] {
            w.resolver.authorize_resource(&w.alice, &target).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_other_user_is_forbidden() {
        let w = world().await;
        let err = w
            .resolver
            .authorize_resource(&w.bob, &ResourceRef::sensor(w.sensor))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert_eq!(err.to_string(), "You are not the owner of this sensor");
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let w = world().await;
        let err = w
            .resolver
            .authorize_resource(&w.alice, &ResourceRef::new(ResourceKind::Sensor, "unknown-id"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(err.to_string(), "Sensor not found");
    }

    #[tokio::test]
    async fn test_not_found_wins_over_forbidden() {
        let w = world().await;
        let err = w
            .resolver
            .authorize_resource(&w.bob, &ResourceRef::device(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_privilege_does_not_bypass_ownership() {
        let w = world().await;
        let admin = Principal::privileged(w.bob.subject_id);
        let err = w
            .resolver
            .authorize_resource(&admin, &ResourceRef::device(w.device))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_user_owns_itself() {
        let w = world().await;
        let me = ResourceRef::new(ResourceKind::User, w.alice.subject_id.to_string());
        w.resolver.authorize_resource(&w.alice, &me).await.unwrap();
        assert!(w.resolver.authorize_resource(&w.bob, &me).await.is_err());
    }

    // ------------------------------------------------------------------------
    // Hops
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_one_lookup_per_hop() {
        let w = world().await;
        let cases = [
            (ResourceRef::device(w.device), 1),
            (ResourceRef::sensor(w.sensor), 2),
            (ResourceRef::reading(w.reading), 3),
        ];
        for (target, expected) in cases {
            let before = w.store.lookups();
            w.resolver.authorize_resource(&w.alice, &target).await.unwrap();
            assert_eq!(w.store.lookups() - before, expected, "{target}");
            assert!(expected <= MAX_HOPS);
        }
    }

    #[tokio::test]
    async fn test_reading_chain_reports_owner() {
        let w = world().await;
        let owner = w
            .resolver
            .owner_of(&ResourceRef::reading(w.reading))
            .await
            .unwrap();
        assert_eq!(owner, w.alice.subject_id);
    }
}
