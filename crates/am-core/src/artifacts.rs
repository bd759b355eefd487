//! Validez y checksums de los artefactos producidos por los steps.
//!
//! Un artefacto vale si existe, no está vacío y su cabecera corresponde al
//! tipo declarado. La comprobación de cabecera lee solo la primera línea:
//! los artefactos de solidificación pueden ocupar gigabytes.
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::component::FileKind;

/// Motivo por el que un artefacto no es válido.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ArtifactIssue {
    Missing,
    Empty,
    BadHeader { expected: String, found: String },
}

impl std::fmt::Display for ArtifactIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "file missing"),
            Self::Empty => write!(f, "file empty"),
            Self::BadHeader { expected, found } => {
                write!(f, "bad header: expected '{expected}', found '{found}'")
            }
        }
    }
}

/// Marcador que debe aparecer en la primera línea de cada tipo.
fn header_marker(kind: FileKind) -> &'static str {
    match kind {
        FileKind::Gv => "g (K/m)",
        FileKind::ReducedSolidification => "ts (s)",
        FileKind::MeltPoolGeometry => "Time (s)",
        FileKind::ClusterIds => "cluster",
        FileKind::Rve => "rve",
        FileKind::Vtk | FileKind::GrainVtk => "# vtk DataFile",
    }
}

/// Comprueba que `path` es un artefacto válido del tipo dado.
pub fn validate_artifact(kind: FileKind, path: &Path) -> Result<(), ArtifactIssue> {
    let Ok(metadata) = std::fs::metadata(path) else {
        return Err(ArtifactIssue::Missing);
    };
    if !metadata.is_file() {
        return Err(ArtifactIssue::Missing);
    }
    if metadata.len() == 0 {
        return Err(ArtifactIssue::Empty);
    }
    let marker = header_marker(kind);
    let first_line = File::open(path).ok()
                                     .and_then(|f| BufReader::new(f).lines().next())
                                     .and_then(|l| l.ok())
                                     .unwrap_or_default();
    if first_line.contains(marker) {
        Ok(())
    } else {
        Err(ArtifactIssue::BadHeader { expected: marker.to_string(),
                                       found: first_line.chars().take(80).collect() })
    }
}

/// Checksum SHA-256 del contenido, en streaming.
pub fn content_checksum(path: &Path) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut reader = BufReader::new(File::open(path)?);
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn gv_header_is_recognised() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("solidification.csv");
        fs::write(&path, "x (m),y (m),g (K/m),v (m/s)\n0.0,0.0,1e6,0.1\n").expect("write");
        assert_eq!(validate_artifact(FileKind::Gv, &path), Ok(()));
    }

    #[test]
    fn wrong_header_is_reported_with_both_sides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("solidification.csv");
        fs::write(&path, "time,melt_depth\n").expect("write");
        match validate_artifact(FileKind::Gv, &path) {
            Err(ArtifactIssue::BadHeader { expected, found }) => {
                assert_eq!(expected, "g (K/m)");
                assert!(found.starts_with("time"), "{found}");
            }
            other => panic!("expected BadHeader, got {other:?}"),
        }
    }

    #[test]
    fn missing_and_empty_files_are_distinguished() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.csv");
        assert_eq!(validate_artifact(FileKind::Gv, &missing), Err(ArtifactIssue::Missing));
        let empty = dir.path().join("empty.csv");
        fs::write(&empty, "").expect("write");
        assert_eq!(validate_artifact(FileKind::Gv, &empty), Err(ArtifactIssue::Empty));
    }

    #[test]
    fn vtk_header_applies_to_both_vtk_kinds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("grains.vtk");
        fs::write(&path, "# vtk DataFile Version 3.0\ngrains\n").expect("write");
        assert_eq!(validate_artifact(FileKind::GrainVtk, &path), Ok(()));
        assert_eq!(validate_artifact(FileKind::Vtk, &path), Ok(()));
    }

    #[test]
    fn checksum_is_stable_and_content_sensitive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        fs::write(&a, "same").expect("write");
        fs::write(&b, "same").expect("write");
        assert_eq!(content_checksum(&a).expect("checksum"), content_checksum(&b).expect("checksum"));
        fs::write(&b, "diff").expect("write");
        assert_ne!(content_checksum(&a).expect("checksum"), content_checksum(&b).expect("checksum"));
    }
}
