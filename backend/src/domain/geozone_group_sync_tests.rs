//! Tests for the geozone group sync service.

use std::sync::Arc;

use uuid::Uuid;

use super::*;
use crate::domain::fleet::ItineraryItem;
use crate::domain::geometry::{geometry_hash, normalize_polygon, GeoPoint, GeofenceShape};
use crate::domain::ports::{
    MockDeviceConfigGateway, MockGeofenceMappingRepository, MockGeozoneGroupMappingRepository,
};
use crate::domain::GeofenceMapping;

fn geofence(client_id: Uuid, name: &str, offset: f64) -> Geofence {
    Geofence {
        id: Uuid::new_v4(),
        client_id,
        name: name.to_owned(),
        shape: GeofenceShape::Polygon {
            points: vec![
                GeoPoint::new(-23.50 + offset, -46.60),
                GeoPoint::new(-23.50 + offset, -46.50),
                GeoPoint::new(-23.40 + offset, -46.50),
            ],
        },
    }
}

fn mapping_for(geofence: &Geofence, external: &str) -> GeofenceMapping {
    let ring = normalize_polygon(&geofence.shape, None).expect("valid shape");
    GeofenceMapping {
        geofence_id: geofence.id,
        client_id: geofence.client_id,
        external_geozone_id: ExternalGeozoneId::new(external),
        geometry_hash: geometry_hash(&ring),
        external_name: format!("Transportes Ipiranga - {}", geofence.name),
    }
}

struct Fixture {
    itinerary: Itinerary,
    ctx: GroupSyncContext,
    geofences: Vec<Geofence>,
}

fn fixture() -> Fixture {
    let client_id = Uuid::new_v4();
    let a = geofence(client_id, "Centro", 0.0);
    let b = geofence(client_id, "Porto", 0.5);
    let itinerary = Itinerary {
        id: Uuid::new_v4(),
        client_id,
        name: "Rota Litoral".to_owned(),
        description: None,
        items: vec![
            ItineraryItem::Geofence(a.id),
            ItineraryItem::Route(Uuid::new_v4()),
            ItineraryItem::Geofence(b.id),
        ],
    };
    let ctx = GroupSyncContext {
        client_id,
        client_display_name: "Transportes Ipiranga".to_owned(),
        geofences_by_id: [(a.id, a.clone()), (b.id, b.clone())].into_iter().collect(),
    };
    Fixture {
        itinerary,
        ctx,
        geofences: vec![a, b],
    }
}

fn service_with(
    geofence_mappings: MockGeofenceMappingRepository,
    groups: MockGeozoneGroupMappingRepository,
    gateway: MockDeviceConfigGateway,
) -> GeozoneGroupSyncService {
    let gateway = Arc::new(gateway);
    let geofence_sync = Arc::new(GeofenceSyncService::new(
        Arc::new(geofence_mappings),
        gateway.clone(),
        None,
    ));
    GeozoneGroupSyncService::new(geofence_sync, Arc::new(groups), gateway)
}

#[tokio::test]
async fn first_sync_creates_group_with_member_external_ids() {
    let Fixture {
        itinerary,
        ctx,
        geofences,
    } = fixture();
    let synced_a = mapping_for(&geofences[0], "gz-a");
    let synced_b = mapping_for(&geofences[1], "gz-b");

    // Members are already synced, so the group write is the only
    // external call.
    let mut geofence_mappings = MockGeofenceMappingRepository::new();
    let (id_a, id_b) = (geofences[0].id, geofences[1].id);
    geofence_mappings
        .expect_find()
        .times(2)
        .returning(move |geofence_id, _| {
            if geofence_id == id_a {
                Ok(Some(synced_a.clone()))
            } else if geofence_id == id_b {
                Ok(Some(synced_b.clone()))
            } else {
                Ok(None)
            }
        });

    let mut groups = MockGeozoneGroupMappingRepository::new();
    groups.expect_find().times(1).return_once(|_, _| Ok(None));
    let itinerary_id = itinerary.id;
    groups
        .expect_upsert()
        .times(1)
        .withf(move |mapping| {
            mapping.scope == GroupScope::Itinerary(itinerary_id)
                && mapping.external_group_id.as_str() == "grp-1"
        })
        .return_once(|_| Ok(()));

    let mut gateway = MockDeviceConfigGateway::new();
    gateway.expect_import_geozone().times(0);
    gateway
        .expect_upsert_geozone_group()
        .times(1)
        .withf(|existing, name, members| {
            existing.is_none()
                && name == "Transportes Ipiranga - Rota Litoral"
                && members.len() == 2
        })
        .return_once(|_, _, _| Ok(ExternalGroupId::new("grp-1")));

    let service = service_with(geofence_mappings, groups, gateway);
    let group_id = service
        .ensure_group(&itinerary, &ctx)
        .await
        .expect("group sync succeeds");
    assert_eq!(group_id.as_str(), "grp-1");
}

#[tokio::test]
async fn unchanged_members_skip_the_external_group_write() {
    let Fixture {
        itinerary,
        ctx,
        geofences,
    } = fixture();
    let synced_a = mapping_for(&geofences[0], "gz-a");
    let synced_b = mapping_for(&geofences[1], "gz-b");
    let expected_hash = member_set_hash(&[
        synced_a.external_geozone_id.clone(),
        synced_b.external_geozone_id.clone(),
    ]);

    let mut geofence_mappings = MockGeofenceMappingRepository::new();
    let (id_a, id_b) = (geofences[0].id, geofences[1].id);
    geofence_mappings
        .expect_find()
        .times(2)
        .returning(move |geofence_id, _| {
            if geofence_id == id_a {
                Ok(Some(synced_a.clone()))
            } else if geofence_id == id_b {
                Ok(Some(synced_b.clone()))
            } else {
                Ok(None)
            }
        });

    let client_id = ctx.client_id;
    let itinerary_id = itinerary.id;
    let mut groups = MockGeozoneGroupMappingRepository::new();
    groups.expect_find().times(1).return_once(move |_, _| {
        Ok(Some(GeozoneGroupMapping {
            scope: GroupScope::Itinerary(itinerary_id),
            client_id,
            external_group_id: ExternalGroupId::new("grp-9"),
            member_set_hash: expected_hash,
        }))
    });
    groups.expect_upsert().times(0);

    let mut gateway = MockDeviceConfigGateway::new();
    gateway.expect_import_geozone().times(0);
    gateway.expect_upsert_geozone_group().times(0);

    let service = service_with(geofence_mappings, groups, gateway);
    let group_id = service
        .ensure_group(&itinerary, &ctx)
        .await
        .expect("group sync succeeds");
    assert_eq!(group_id.as_str(), "grp-9");
}

#[tokio::test]
async fn changed_membership_updates_the_existing_group_in_place() {
    let Fixture {
        itinerary,
        ctx,
        geofences,
    } = fixture();
    let synced_a = mapping_for(&geofences[0], "gz-a");
    let synced_b = mapping_for(&geofences[1], "gz-b");

    let mut geofence_mappings = MockGeofenceMappingRepository::new();
    let (id_a, id_b) = (geofences[0].id, geofences[1].id);
    geofence_mappings
        .expect_find()
        .times(2)
        .returning(move |geofence_id, _| {
            if geofence_id == id_a {
                Ok(Some(synced_a.clone()))
            } else if geofence_id == id_b {
                Ok(Some(synced_b.clone()))
            } else {
                Ok(None)
            }
        });

    let client_id = ctx.client_id;
    let itinerary_id = itinerary.id;
    let mut groups = MockGeozoneGroupMappingRepository::new();
    groups.expect_find().times(1).return_once(move |_, _| {
        Ok(Some(GeozoneGroupMapping {
            scope: GroupScope::Itinerary(itinerary_id),
            client_id,
            external_group_id: ExternalGroupId::new("grp-9"),
            member_set_hash: "stale".to_owned(),
        }))
    });
    groups
        .expect_upsert()
        .times(1)
        .withf(|mapping| mapping.external_group_id.as_str() == "grp-9")
        .return_once(|_| Ok(()));

    let mut gateway = MockDeviceConfigGateway::new();
    gateway
        .expect_upsert_geozone_group()
        .times(1)
        .withf(|existing, _, _| {
            existing.as_ref().map(ExternalGroupId::as_str) == Some("grp-9")
        })
        .return_once(|existing, _, _| Ok(existing.expect("update keeps the id")));

    let service = service_with(geofence_mappings, groups, gateway);
    let group_id = service
        .ensure_group(&itinerary, &ctx)
        .await
        .expect("group sync succeeds");
    assert_eq!(group_id.as_str(), "grp-9");
}

#[tokio::test]
async fn missing_member_geofence_fails_without_external_calls() {
    let Fixture {
        itinerary, mut ctx, ..
    } = fixture();
    ctx.geofences_by_id.clear();

    let geofence_mappings = MockGeofenceMappingRepository::new();
    let mut groups = MockGeozoneGroupMappingRepository::new();
    groups.expect_find().times(0);
    let mut gateway = MockDeviceConfigGateway::new();
    gateway.expect_upsert_geozone_group().times(0);

    let service = service_with(geofence_mappings, groups, gateway);
    let error = service
        .ensure_group(&itinerary, &ctx)
        .await
        .expect_err("missing geofence");
    assert_eq!(error.code(), crate::domain::ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn ad_hoc_scope_syncs_under_its_own_key() {
    let Fixture { ctx, geofences, .. } = fixture();
    let synced_a = mapping_for(&geofences[0], "gz-a");

    let mut geofence_mappings = MockGeofenceMappingRepository::new();
    geofence_mappings
        .expect_find()
        .times(1)
        .returning(move |_, _| Ok(Some(synced_a.clone())));

    let mut groups = MockGeozoneGroupMappingRepository::new();
    groups
        .expect_find()
        .times(1)
        .withf(|scope, _| *scope == GroupScope::AdHoc("painel-sul".to_owned()))
        .return_once(|_, _| Ok(None));
    groups
        .expect_upsert()
        .times(1)
        .withf(|mapping| mapping.scope == GroupScope::AdHoc("painel-sul".to_owned()))
        .return_once(|_| Ok(()));

    let mut gateway = MockDeviceConfigGateway::new();
    gateway
        .expect_upsert_geozone_group()
        .times(1)
        .withf(|existing, name, members| {
            existing.is_none() && name == "Painel Sul" && members.len() == 1
        })
        .return_once(|_, _, _| Ok(ExternalGroupId::new("grp-2")));

    let service = service_with(geofence_mappings, groups, gateway);
    let group_id = service
        .sync_group_for_geofences(
            AdHocGroupRequest {
                scope_key: "painel-sul".to_owned(),
                group_name: "Painel Sul".to_owned(),
                geofence_ids: vec![geofences[0].id],
            },
            &ctx,
        )
        .await
        .expect("ad-hoc sync succeeds");
    assert_eq!(group_id.as_str(), "grp-2");
}

#[test]
fn member_set_hash_is_order_insensitive() {
    let a = ExternalGeozoneId::new("gz-a");
    let b = ExternalGeozoneId::new("gz-b");
    assert_eq!(
        member_set_hash(&[a.clone(), b.clone()]),
        member_set_hash(&[b, a])
    );
}

#[test]
fn member_set_hash_tracks_membership() {
    let a = ExternalGeozoneId::new("gz-a");
    let b = ExternalGeozoneId::new("gz-b");
    assert_ne!(member_set_hash(&[a.clone()]), member_set_hash(&[a, b]));
}
