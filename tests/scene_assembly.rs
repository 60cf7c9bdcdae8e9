//! Scene Assembly Tests
//!
//! Single-file and paired-file scene assembly against real files in a
//! temporary directory.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use polar_l1_runner::assembly::{DropReason, FileRole, Observation, SceneAssembler, SceneKey};
use polar_l1_runner::types::{FileEvent, Platform};

const TERRA_PDS: &str = "P0420064AAAAAAAAAAAAAA14239075753001.PDS";
const AQUA_PDS: &str = "P1540064AAAAAAAAAAAAAA12298130323001.PDS";
const AQUA_GBAD: &str = "P1540957154095815409590012298130323001.PDS";

fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"pds").unwrap();
    path
}

fn event(path: &Path, platform: &str, sensor: &str) -> FileEvent {
    FileEvent {
        uri: format!("ssh://safe{}", path.display()),
        host: "safe".to_string(),
        path: path.to_path_buf(),
        platform_name: platform.to_string(),
        sensors: vec![sensor.to_string()],
        start_time: Some(
            NaiveDate::from_ymd_opt(2012, 10, 24)
                .unwrap()
                .and_hms_opt(13, 3, 23)
                .unwrap(),
        ),
        end_time: None,
        orbit_number: Some(57412),
    }
}

fn assembler() -> SceneAssembler {
    SceneAssembler::new(Duration::from_secs(3600))
}

// ============================================================================
// Single-file family
// ============================================================================

#[test]
fn terra_file_is_a_complete_scene_without_prior_state() {
    let tmp = tempfile::tempdir().unwrap();
    let pds = touch(tmp.path(), TERRA_PDS);

    let mut assembler = assembler();
    let scene = assembler
        .observe(&Platform::Terra, event(&pds, "EOS-Terra", "modis"))
        .into_scene()
        .expect("single-file scene completes at once");

    assert_eq!(scene.file_count(), 1);
    assert_eq!(scene.file(FileRole::Primary), Some(pds.as_path()));
    assert_eq!(assembler.pending_count(), 0);
}

#[test]
fn same_terra_file_twice_gives_two_scenes() {
    let tmp = tempfile::tempdir().unwrap();
    let pds = touch(tmp.path(), TERRA_PDS);
    let mut assembler = assembler();

    for _ in 0..2 {
        assert!(matches!(
            assembler.observe(&Platform::Terra, event(&pds, "EOS-Terra", "modis")),
            Observation::Complete(_)
        ));
    }
}

#[test]
fn noaa_file_of_any_name_is_a_scene() {
    let tmp = tempfile::tempdir().unwrap();
    let hrpt = touch(tmp.path(), "hrpt_noaa19_20121024_1303_19422.l1b");
    let platform = Platform::Aapp("noaa19".to_string());

    let scene = assembler()
        .observe(&platform, event(&hrpt, "NOAA-19", "avhrr/3"))
        .into_scene()
        .unwrap();
    assert_eq!(scene.key, SceneKey::new("201210241303"));
}

#[test]
fn non_scene_terra_file_is_dropped() {
    let tmp = tempfile::tempdir().unwrap();
    // Second PDS file of the pass, not the scene file
    let pds = touch(tmp.path(), "P0420064AAAAAAAAAAAAAA14239075753000.PDS");

    assert!(matches!(
        assembler().observe(&Platform::Terra, event(&pds, "EOS-Terra", "modis")),
        Observation::Dropped(DropReason::Unclassified(_))
    ));
}

#[test]
fn missing_file_is_dropped() {
    let tmp = tempfile::tempdir().unwrap();
    let absent = tmp.path().join(TERRA_PDS);

    assert!(matches!(
        assembler().observe(&Platform::Terra, event(&absent, "EOS-Terra", "modis")),
        Observation::Dropped(DropReason::FileMissing(_))
    ));
}

// ============================================================================
// Paired family
// ============================================================================

#[test]
fn aqua_pair_completes_in_either_order() {
    let tmp = tempfile::tempdir().unwrap();
    let pds = touch(tmp.path(), AQUA_PDS);
    let gbad = touch(tmp.path(), AQUA_GBAD);

    for order in [[&pds, &gbad], [&gbad, &pds]] {
        let mut assembler = assembler();
        let first = assembler.observe(&Platform::Aqua, event(order[0], "EOS-Aqua", "modis"));
        assert_eq!(first, Observation::Pending(SceneKey::new("201210241303")));
        assert_eq!(assembler.pending_count(), 1);

        let scene = assembler
            .observe(&Platform::Aqua, event(order[1], "EOS-Aqua", "gbad"))
            .into_scene()
            .expect("second file completes the pair");
        assert_eq!(scene.file(FileRole::Primary), Some(pds.as_path()));
        assert_eq!(scene.file(FileRole::Packet), Some(gbad.as_path()));
        assert_eq!(assembler.pending_count(), 0);
    }
}

#[test]
fn repeated_aqua_file_is_absorbed() {
    let tmp = tempfile::tempdir().unwrap();
    let pds = touch(tmp.path(), AQUA_PDS);
    let gbad = touch(tmp.path(), AQUA_GBAD);
    let mut assembler = assembler();

    assembler.observe(&Platform::Aqua, event(&pds, "EOS-Aqua", "modis"));
    assert!(matches!(
        assembler.observe(&Platform::Aqua, event(&pds, "EOS-Aqua", "modis")),
        Observation::Duplicate(_)
    ));

    let scene = assembler
        .observe(&Platform::Aqua, event(&gbad, "EOS-Aqua", "gbad"))
        .into_scene()
        .unwrap();
    assert_eq!(scene.file_count(), 2);
}

#[test]
fn conflicting_aqua_file_is_ambiguous() {
    let tmp = tempfile::tempdir().unwrap();
    let pds = touch(tmp.path(), AQUA_PDS);
    let other = touch(tmp.path(), "P1540064AAAAAAAAAAAAAA12298130400001.PDS");
    let mut assembler = assembler();

    assembler.observe(&Platform::Aqua, event(&pds, "EOS-Aqua", "modis"));
    match assembler.observe(&Platform::Aqua, event(&other, "EOS-Aqua", "modis")) {
        Observation::Dropped(DropReason::AmbiguousRole { role, existing, rejected }) => {
            assert_eq!(role, FileRole::Primary);
            assert_eq!(existing, pds);
            assert_eq!(rejected, other);
        }
        other => panic!("expected an ambiguous role, got {other:?}"),
    }
    // The scene is not advanced
    assert_eq!(assembler.pending_count(), 1);
}

#[test]
fn aqua_event_without_start_time_cannot_be_keyed() {
    let tmp = tempfile::tempdir().unwrap();
    let pds = touch(tmp.path(), AQUA_PDS);
    let mut e = event(&pds, "EOS-Aqua", "modis");
    e.start_time = None;

    assert_eq!(
        assembler().observe(&Platform::Aqua, e),
        Observation::Dropped(DropReason::MissingStartTime)
    );
}

#[test]
fn incomplete_aqua_scene_expires() {
    let tmp = tempfile::tempdir().unwrap();
    let pds = touch(tmp.path(), AQUA_PDS);
    let gbad = touch(tmp.path(), AQUA_GBAD);
    let mut assembler = SceneAssembler::new(Duration::from_secs(60));
    let start = Instant::now();

    assembler.observe_at(&Platform::Aqua, event(&pds, "EOS-Aqua", "modis"), start);
    let expired = assembler.evict_expired(start + Duration::from_secs(61));
    assert_eq!(expired, vec![SceneKey::new("201210241303")]);

    // The late partner starts a new pending scene instead of completing one
    assert!(matches!(
        assembler.observe_at(
            &Platform::Aqua,
            event(&gbad, "EOS-Aqua", "gbad"),
            start + Duration::from_secs(62)
        ),
        Observation::Pending(_)
    ));
}
