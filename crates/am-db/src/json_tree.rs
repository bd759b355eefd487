//! Lector de bases de datos de build en árbol JSON sobre disco.
//!
//! Layout:
//!
//! ```text
//! <root>/build.json                    metadatos de granularidad build
//! <root>/parts/<part>/part.json        layers, regions y metadatos de part
//! <root>/parts/<part>/layers/<n>.json  metadatos de granularidad layer
//! ```
//!
//! Las claves de metadatos pueden venir con los nombres propios de la
//! máquina ("Power (W)", "Laser Beam Power (W)", ...); la tabla de
//! sinónimos las normaliza a las claves canónicas en el momento de la
//! lectura. Los metadatos de fichero se declaran como `{"file": "nombre"}`
//! relativo al documento que los contiene.
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use am_core::{CoreError, Database};
use am_domain::tree::{BuildTree, PartNode, RegionNode};
use am_domain::{MetadataKind, MetadataValue, ScopeUnit, SynonymTable, DEFAULT_SYNONYMS};

pub const BUILD_FILE: &str = "build.json";
pub const PART_FILE: &str = "part.json";
pub const PARTS_DIR: &str = "parts";
pub const LAYERS_DIR: &str = "layers";
pub const RESULTS_DIR: &str = "results";

#[derive(Debug, Deserialize)]
struct BuildDoc {
    name: String,
    #[serde(default)]
    metadata: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct PartDoc {
    #[serde(default)]
    layers: Vec<u32>,
    #[serde(default)]
    regions: indexmap::IndexMap<String, RegionDoc>,
    #[serde(default)]
    metadata: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RegionDoc {
    #[serde(default)]
    layers: Vec<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LayerDoc {
    #[serde(default)]
    metadata: serde_json::Map<String, Value>,
}

pub struct JsonTreeDatabase {
    root: PathBuf,
    name: String,
    synonyms: SynonymTable,
}

impl JsonTreeDatabase {
    /// Abre la base de datos leyendo `build.json` bajo `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CoreError> {
        Self::open_with_synonyms(root, DEFAULT_SYNONYMS.clone())
    }

    pub fn open_with_synonyms(root: impl Into<PathBuf>, synonyms: SynonymTable) -> Result<Self, CoreError> {
        let root = root.into();
        let doc: BuildDoc = read_json(&root.join(BUILD_FILE))?;
        Ok(Self { root,
                  name: doc.name,
                  synonyms })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn part_dir(&self, part: &str) -> PathBuf {
        self.root.join(PARTS_DIR).join(part)
    }

    /// Documento de metadatos para el scope dado, junto a su directorio
    /// base (para resolver rutas de fichero relativas).
    fn metadata_doc(&self, scope: &ScopeUnit) -> Result<Option<(serde_json::Map<String, Value>, PathBuf)>, CoreError> {
        match (&scope.part, scope.layer) {
            (None, None) => {
                let doc: BuildDoc = read_json(&self.root.join(BUILD_FILE))?;
                Ok(Some((doc.metadata, self.root.clone())))
            }
            (Some(part), None) => {
                let dir = self.part_dir(part);
                let path = dir.join(PART_FILE);
                if !path.is_file() {
                    return Ok(None);
                }
                let doc: PartDoc = read_json(&path)?;
                Ok(Some((doc.metadata, dir)))
            }
            (Some(part), Some(layer)) => {
                let dir = self.part_dir(part).join(LAYERS_DIR);
                let path = dir.join(format!("{layer}.json"));
                if !path.is_file() {
                    return Ok(None);
                }
                let doc: LayerDoc = read_json(&path)?;
                Ok(Some((doc.metadata, dir)))
            }
            (None, Some(_)) => Ok(None),
        }
    }

    fn lookup<'a>(&self,
                  kind: MetadataKind,
                  metadata: &'a serde_json::Map<String, Value>)
                  -> Option<&'a Value> {
        let key = self.synonyms.find_key(kind, metadata.keys().map(|k| k.as_str()))?;
        metadata.get(key)
    }
}

impl Database for JsonTreeDatabase {
    fn build_name(&self) -> &str {
        &self.name
    }

    fn load_tree(&self) -> Result<BuildTree, CoreError> {
        let mut tree = BuildTree::new(&self.name);
        let parts_dir = self.root.join(PARTS_DIR);
        if !parts_dir.is_dir() {
            return Ok(tree);
        }
        let mut part_names: Vec<String> = Vec::new();
        for entry in fs::read_dir(&parts_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                part_names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        part_names.sort_unstable();
        for part in part_names {
            let doc: PartDoc = read_json(&self.part_dir(&part).join(PART_FILE))?;
            let regions = doc.regions
                             .into_iter()
                             .map(|(name, r)| (name, RegionNode { layers: r.layers }))
                             .collect();
            tree.parts.insert(part, PartNode { layers: doc.layers,
                                               regions });
        }
        Ok(tree)
    }

    fn read_value(&self, kind: MetadataKind, scope: &ScopeUnit) -> Result<Option<MetadataValue>, CoreError> {
        let Some((metadata, _)) = self.metadata_doc(scope)? else {
            return Ok(None);
        };
        let Some(raw) = self.lookup(kind, &metadata) else {
            return Ok(None);
        };
        parse_value(raw).map(Some).map_err(|detail| {
                                      CoreError::Database(format!("{} @ {scope}: {detail}",
                                                                  kind.canonical_key()))
                                  })
    }

    fn fetch_file(&self,
                  kind: MetadataKind,
                  scope: &ScopeUnit,
                  case_dir: &Path)
                  -> Result<Option<MetadataValue>, CoreError> {
        let Some((metadata, base_dir)) = self.metadata_doc(scope)? else {
            return Ok(None);
        };
        let Some(raw) = self.lookup(kind, &metadata) else {
            return Ok(None);
        };
        let Some(file_name) = raw.get("file").and_then(Value::as_str) else {
            return Err(CoreError::Database(format!("{} @ {scope}: expected {{\"file\": ...}}",
                                                   kind.canonical_key())));
        };
        let source = base_dir.join(file_name);
        if !source.is_file() {
            return Err(CoreError::Database(format!("{} @ {scope}: file not found: {}",
                                                   kind.canonical_key(),
                                                   source.display())));
        }
        let dest = case_dir.join(file_name);
        fs::copy(&source, &dest)?;
        Ok(Some(MetadataValue::file(dest, source)))
    }

    /// Publica el artefacto bajo `results/` espejando el scope y escribe un
    /// sidecar YAML con la procedencia y el checksum de la sincronización.
    fn register_artifact(&self, step: &str, scope: &ScopeUnit, artifact: &Path) -> Result<PathBuf, CoreError> {
        let mut dest_dir = self.root.join(RESULTS_DIR);
        for component in scope.dir_components() {
            dest_dir.push(component);
        }
        dest_dir.push(step);
        fs::create_dir_all(&dest_dir)?;
        let file_name = artifact.file_name()
                                .ok_or_else(|| {
                                    CoreError::Database(format!("artifact without file name: {}",
                                                                artifact.display()))
                                })?;
        let dest = dest_dir.join(file_name);
        fs::copy(artifact, &dest)?;

        let checksum = am_core::content_checksum(&dest)?;
        let sidecar = serde_yaml::to_string(&serde_json::json!({
                          "step": step,
                          "scope": scope.to_string(),
                          "source": artifact.display().to_string(),
                          "sha256": checksum,
                          "synced_at": chrono::Utc::now().to_rfc3339(),
                      })).map_err(|e| CoreError::Database(e.to_string()))?;
        fs::write(dest_dir.join("sync.yaml"), sidecar)?;
        log::debug!("registered {} for {scope}", dest.display());
        Ok(dest)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CoreError> {
    let text = fs::read_to_string(path).map_err(|e| CoreError::Database(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&text).map_err(|e| CoreError::Database(format!("{}: {e}", path.display())))
}

/// Valores soportados: número desnudo, string, u objeto `{value, unit}`.
fn parse_value(raw: &Value) -> Result<MetadataValue, String> {
    match raw {
        Value::Number(n) => Ok(MetadataValue::scalar(n.as_f64().unwrap_or_default(), "")),
        Value::String(s) => Ok(MetadataValue::text(s.clone())),
        Value::Object(map) => {
            let value = map.get("value").and_then(Value::as_f64);
            match value {
                Some(v) => {
                    let unit = map.get("unit").and_then(Value::as_str).unwrap_or_default();
                    Ok(MetadataValue::scalar(v, unit))
                }
                None => Err("object without numeric 'value'".to_string()),
            }
        }
        other => Err(format!("unsupported value shape: {other}")),
    }
}
