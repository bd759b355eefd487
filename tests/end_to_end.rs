//! Flujo completo contra una base de datos JSON en disco:
//! config -> run -> sync, con las clases de serie.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use amflow_rust::am_core::{validate_artifact, ArtifactIssue, Database, FileKind, StepFilter};
use amflow_rust::{builtin_registry, open_database, Engine, RunPaths};

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(path, content).expect("write");
}

/// Base de datos con un part de dos layers; la potencia viene con el nombre
/// propio de la máquina y debe normalizarse por sinónimos.
fn seed_database(root: &Path) {
    write(&root.join("build.json"),
          r#"{"name": "B1", "metadata": {
                "Layer Thickness (m)": {"value": 5e-5, "unit": "m"},
                "Preheat (K)": {"value": 353.0, "unit": "K"},
                "Material": "IN625"}}"#);
    write(&root.join("parts/P1/part.json"),
          r#"{"layers": [1, 2], "metadata": {
                "Laser Beam Power (W)": {"value": 280.0, "unit": "W"},
                "Spot Size (µm)": {"value": 85.0, "unit": "µm"}}}"#);
    write(&root.join("parts/P1/layers/1.json"), r#"{"metadata": {"scanpath": {"file": "scan_1.txt"}}}"#);
    write(&root.join("parts/P1/layers/2.json"), r#"{"metadata": {"scanpath": {"file": "scan_2.txt"}}}"#);
    write(&root.join("parts/P1/layers/scan_1.txt"), "1,0.0,0.0,0.001\n");
    write(&root.join("parts/P1/layers/scan_2.txt"), "1,0.0,0.0,0.001\n");
}

fn install_execute_script(paths: &RunPaths) {
    let dir = paths.interface_dir("solidification_part", "thesis");
    fs::create_dir_all(&dir).expect("mkdir interface");
    let script = dir.join("execute");
    fs::write(&script,
              "#!/bin/sh\n\
               echo 'x (m),y (m),g (K/m),v (m/s)' > solidification.csv\n\
               echo '0.0,0.0,1.2e6,0.35' >> solidification.csv\n").expect("write script");
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");
}

fn manifest(root: &Path, db_root: &Path) -> PathBuf {
    let path = root.join("input.yaml");
    write(&path,
          &format!("workers: 2\n\
                    steps:\n\
                    \x20 - name: solidification\n\
                    \x20   class: solidification_part\n\
                    \x20   application: thesis\n\
                    \x20   execute:\n\
                    \x20     np: 4\n\
                    data:\n\
                    \x20 datatype: amjson\n\
                    \x20 path: {}\n",
                   db_root.display()));
    path
}

#[test]
fn config_run_sync_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_root = dir.path().join("db");
    seed_database(&db_root);

    let paths = RunPaths::rooted(dir.path().join("install"), dir.path().join("work"));
    fs::create_dir_all(&paths.interfaces_root).expect("mkdir");
    install_execute_script(&paths);

    let db = open_database("amjson", &db_root).expect("open db");
    assert_eq!(db.build_name(), "B1");
    let registry = builtin_registry();
    let engine = Engine { paths: &paths,
                          db: &db,
                          registry: &registry };
    let input = manifest(dir.path(), &db_root);

    let configured = engine.configure(&input).expect("configure");
    assert_eq!(configured.failed, 0);
    assert_eq!(configured.manifest.output_paths["solidification"].len(), 2);
    // Los scanpaths por layer quedaron copiados en cada caso.
    assert!(paths.workspace_root.join("B1/P1/1/solidification/scan_1.txt").is_file());

    let summary = engine.run(&input, &StepFilter::default()).expect("run");
    assert_eq!(summary.failed, 0);
    // Los dos layers tienen scanpaths con el mismo contenido: una sola
    // ejecución y un enlace.
    assert_eq!(summary.executed + summary.linked, 2);
    assert_eq!(summary.executed, 1);

    let output = paths.workspace_root.join("B1/P1/2/solidification/solidification.csv");
    assert_eq!(validate_artifact(FileKind::Gv, &output), Ok(()));

    let sync = engine.sync(&input, &StepFilter::default()).expect("sync");
    assert_eq!(sync.failed, 0);
    assert_eq!(sync.synced, 2);
    let published = db_root.join("results/B1/P1/1/solidification/solidification.csv");
    assert!(published.is_file(), "{}", published.display());
    assert!(published.with_file_name("sync.yaml").is_file());
}

#[test]
fn artifact_validation_rejects_foreign_headers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("melt.csv");
    fs::write(&path, "x (m),y (m),g (K/m),v (m/s)\n").expect("write");
    assert!(matches!(validate_artifact(FileKind::MeltPoolGeometry, &path),
                     Err(ArtifactIssue::BadHeader { .. })));
}
