//! Scene assembly against a recording container access

mod helpers;

use helpers::{container_file, new_asset, temp_store, PlacedKind, RecordingAccess};
use scenepack_common::db::{AssetRecord, ResourceKind};
use scenepack_indexer::db::{assets, packs};
use scenepack_indexer::loader::{build_scene, build_scene_from_ids, BuildOptions};
use sqlx::SqlitePool;
use std::path::Path;

async fn stored(pool: &SqlitePool, pack_id: i64, name: &str, container: &Path, kind: ResourceKind, category: &str) -> AssetRecord {
    let mut asset = new_asset(pack_id, name, container, kind);
    asset.category = category.to_string();
    let id = assets::create_asset(pool, &asset).await.unwrap();
    assets::get_asset(pool, id).await.unwrap().unwrap()
}

fn at(x: f64) -> Vec<f64> {
    vec![x, 0.0, 0.0]
}

fn seeded() -> BuildOptions {
    BuildOptions { seed: Some(11) }
}

#[tokio::test]
async fn test_missing_container_dropped_valid_entry_placed() {
    let (dir, pool) = temp_store().await;
    let pack_id = packs::create_pack(&pool, "p", "/p", None, None).await.unwrap();
    let props = container_file(dir.path(), "props.blend", 2048);
    let gone = dir.path().join("gone.blend");

    let barrel = stored(&pool, pack_id, "Barrel", &props, ResourceKind::Object, "props").await;
    let ghost = stored(&pool, pack_id, "Ghost", &gone, ResourceKind::Object, "props").await;

    let mut access = RecordingAccess::new().with_container(&props, &[], &["Barrel"]);
    let report = build_scene(&mut access, &[barrel, ghost], &[at(0.0), at(5.0)], &[], &seeded());

    assert_eq!(report.placements.len(), 1);
    assert_eq!(report.placeholders, 0);
    assert_eq!(report.placements[0].resolved_name.as_deref(), Some("Barrel"));

    assert_eq!(report.dropped.len(), 1);
    assert_eq!(report.dropped[0].index, 1);
    assert_eq!(report.dropped[0].asset_name.as_deref(), Some("Ghost"));
    assert!(report.dropped[0].reason.contains("container file missing"));

    // The missing file is never opened
    assert_eq!(access.opened, vec![props.clone()]);
    assert_eq!(access.placed.len(), 1);
}

#[tokio::test]
async fn test_shared_container_opened_and_loaded_once() {
    let (dir, pool) = temp_store().await;
    let pack_id = packs::create_pack(&pool, "p", "/p", None, None).await.unwrap();
    let city = container_file(dir.path(), "city.blend", 2048);
    let street = container_file(dir.path(), "street.blend", 2048);

    let building = stored(&pool, pack_id, "Building_A", &city, ResourceKind::Collection, "architecture").await;
    let barrel = stored(&pool, pack_id, "Barrel", &city, ResourceKind::Object, "props").await;
    let lamp = stored(&pool, pack_id, "Lamp", &street, ResourceKind::Object, "lighting").await;

    let mut access = RecordingAccess::new()
        .with_container(&city, &["Building_A", "Car_01"], &["Barrel.001", "Crate"])
        .with_container(&street, &[], &["Lamp"]);

    let records = vec![building, barrel.clone(), lamp, barrel];
    let locations = vec![at(0.0), at(1.0), at(2.0), at(3.0)];
    let report = build_scene(&mut access, &records, &locations, &[], &seeded());

    assert_eq!(report.containers_opened, 2);
    assert_eq!(report.batch_loads, 2);
    assert_eq!(access.opened.len(), 2);
    assert_eq!(report.placements.len(), 4);
    assert_eq!(report.placeholders, 0);
    assert!(report.dropped.is_empty());

    let (path, city_batch) = access
        .batches
        .iter()
        .find(|(path, _)| path == &city)
        .unwrap();
    assert_eq!(path, &city);
    assert_eq!(city_batch.groups, vec!["Building_A".to_string()]);
    // Fuzzy match, requested once for both barrels
    assert_eq!(city_batch.objects, vec!["Barrel.001".to_string()]);

    let groups = access
        .placed
        .iter()
        .filter(|p| p.kind == PlacedKind::Group("Building_A".to_string()))
        .count();
    let barrels = access
        .placed
        .iter()
        .filter(|p| p.kind == PlacedKind::Object("Barrel.001".to_string()))
        .count();
    assert_eq!(groups, 1);
    assert_eq!(barrels, 2);

    let building_placement = report
        .placements
        .iter()
        .find(|p| p.tag.asset_name == "Building_A")
        .unwrap();
    assert_eq!(building_placement.transform.scale, 1.0);
    for placement in report.placements.iter().filter(|p| p.tag.asset_name != "Building_A") {
        assert!((0.95..=1.05).contains(&placement.transform.scale));
    }
}

#[tokio::test]
async fn test_unresolved_resources_become_placeholders() {
    let (dir, pool) = temp_store().await;
    let pack_id = packs::create_pack(&pool, "p", "/p", None, None).await.unwrap();
    let city = container_file(dir.path(), "city.blend", 2048);
    let locked = container_file(dir.path(), "locked.blend", 2048);

    let tower = stored(&pool, pack_id, "Tower", &city, ResourceKind::Collection, "architecture").await;
    let bench = stored(&pool, pack_id, "Bench", &city, ResourceKind::Object, "props").await;
    let sign = stored(&pool, pack_id, "Sign", &city, ResourceKind::Object, "lighting").await;
    let drone = stored(&pool, pack_id, "Drone", &locked, ResourceKind::Object, "robots").await;

    // `locked.blend` exists on disk but the host cannot open it
    let mut access = RecordingAccess::new()
        .with_container(&city, &["Towers"], &["Sign", "Bench"])
        .with_unloadable("Sign");

    let records = vec![tower.clone(), bench, sign, drone.clone()];
    let locations = vec![at(0.0), at(1.0), at(2.0), at(3.0)];
    let rotations = vec![vec![0.0, 0.0, 1.57]];
    let report = build_scene(&mut access, &records, &locations, &rotations, &seeded());

    assert_eq!(report.placements.len(), 4);
    assert_eq!(report.placeholders, 3);
    assert_eq!(access.placeholders().len(), 3);

    let by_name = |name: &str| {
        report
            .placements
            .iter()
            .find(|p| p.tag.asset_name == name)
            .unwrap()
    };

    // Groups match by exact name only
    let tower_placement = by_name("Tower");
    assert!(tower_placement.placeholder);
    assert!(tower_placement.reason.as_deref().unwrap_or_default().contains("not in container"));
    assert_eq!(tower_placement.tag.asset_id, tower.id);
    assert_eq!(tower_placement.transform.scale, 1.0);
    assert_eq!(tower_placement.transform.rotation, [0.0, 0.0, 1.57]);

    let bench_placement = by_name("Bench");
    assert!(!bench_placement.placeholder);
    assert_eq!(bench_placement.transform.rotation, [0.0; 3]);

    let sign_placement = by_name("Sign");
    assert!(sign_placement.placeholder);
    assert!(sign_placement.reason.as_deref().unwrap_or_default().contains("missing from batch load"));

    let drone_placement = by_name("Drone");
    assert!(drone_placement.placeholder);
    assert_eq!(drone_placement.tag.container_path, drone.container_path);
    assert!(drone_placement.reason.as_deref().unwrap_or_default().contains("Cannot open container"));

    assert_eq!(report.containers_opened, 1);
    assert!(report.reasoning.contains("3 placeholder(s)"));
}

#[tokio::test]
async fn test_build_from_ids() {
    let (dir, pool) = temp_store().await;
    let pack_id = packs::create_pack(&pool, "p", "/p", None, None).await.unwrap();
    let props = container_file(dir.path(), "props.blend", 2048);

    let barrel = stored(&pool, pack_id, "Barrel", &props, ResourceKind::Object, "props").await;
    let crate_box = stored(&pool, pack_id, "Crate", &props, ResourceKind::Object, "props").await;

    let mut access = RecordingAccess::new().with_container(&props, &[], &["Barrel", "Crate"]);
    let ids = [barrel.id, 9999, crate_box.id, barrel.id];
    // Fewer locations than ids: the last id is ignored
    let locations = vec![at(0.0), at(1.0), vec![f64::NAN, 0.0, 0.0]];
    let rotations = vec![vec![0.0, 0.0], vec![], vec![0.0, 0.0, 0.5]];

    let report = build_scene_from_ids(&pool, &ids, &locations, &rotations, &mut access, &seeded())
        .await
        .unwrap();

    assert_eq!(report.placements.len(), 1);
    assert_eq!(report.placements[0].tag.asset_id, barrel.id);
    assert_eq!(report.placements[0].transform.rotation, [0.0; 3]);

    let reasons: Vec<(usize, &str)> = report
        .dropped
        .iter()
        .map(|d| (d.index, d.reason.as_str()))
        .collect();
    assert_eq!(reasons.len(), 2);
    assert_eq!(reasons[0].0, 1);
    assert!(reasons[0].1.contains("unknown asset"));
    assert_eq!(reasons[1].0, 2);
    assert!(reasons[1].1.contains("location"));
}

#[tokio::test]
async fn test_rebuild_clears_and_repeats_with_seed() {
    let (dir, pool) = temp_store().await;
    let pack_id = packs::create_pack(&pool, "p", "/p", None, None).await.unwrap();
    let props = container_file(dir.path(), "props.blend", 2048);
    let barrel = stored(&pool, pack_id, "Barrel", &props, ResourceKind::Object, "props").await;

    let mut access = RecordingAccess::new().with_container(&props, &[], &["Barrel"]);
    let records = vec![barrel.clone(), barrel];
    let locations = vec![at(0.0), at(4.0)];

    let first = build_scene(&mut access, &records, &locations, &[], &seeded());
    let second = build_scene(&mut access, &records, &locations, &[], &seeded());

    assert_eq!(access.cleared, 2);
    assert_eq!(access.placed.len(), 2);
    let scales = |r: &scenepack_indexer::loader::SceneBuildReport| -> Vec<f64> {
        r.placements.iter().map(|p| p.transform.scale).collect()
    };
    assert_eq!(scales(&first), scales(&second));
}

#[tokio::test]
async fn test_empty_request() {
    let mut access = RecordingAccess::new();
    let report = build_scene(&mut access, &[], &[], &[], &BuildOptions::default());

    assert!(report.placements.is_empty());
    assert!(report.dropped.is_empty());
    assert_eq!(report.containers_opened, 0);
    assert!(access.opened.is_empty());
}
