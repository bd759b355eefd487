//! Manifiesto de workflow (documento YAML) y documentos de workspace.
//!
//! El manifiesto declara la secuencia de `steps` (clase de componente,
//! aplicación, mapas de opciones por fase) y la sección `data` (tipo de base
//! de datos, ruta y filtros de part/region/layer). Un documento `workspace`
//! externo aporta defaults compartidos que se fusionan por debajo de los
//! overrides del step: el valor del step gana.
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use am_domain::tree::PartNode;

use crate::errors::CoreError;
use crate::executor::Phase;

/// Mapa plano clave -> valor pasado a los scripts de fase como flags.
pub type OptionMap = IndexMap<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    pub class: String,
    pub application: String,
    /// Step aguas arriba que aporta los ficheros de entrada. Si falta y la
    /// clase declara entrada, se encadena con el step anterior.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
    /// Binario del solver externo; se añade como `--exec <path>` a las fases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,
    #[serde(default)]
    pub configure: OptionMap,
    #[serde(default)]
    pub execute: OptionMap,
    #[serde(default)]
    pub postprocess: OptionMap,
}

impl StepSpec {
    pub fn options(&self, phase: Phase) -> &OptionMap {
        match phase {
            Phase::Configure => &self.configure,
            Phase::Execute => &self.execute,
            Phase::Postprocess => &self.postprocess,
        }
    }

    fn options_mut(&mut self, phase: Phase) -> &mut OptionMap {
        match phase {
            Phase::Configure => &mut self.configure,
            Phase::Execute => &mut self.execute,
            Phase::Postprocess => &mut self.postprocess,
        }
    }
}

/// Sección `data`: de dónde leer el build y qué subconjunto correr.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSpec {
    pub datatype: String,
    pub path: PathBuf,
    /// Filtros explícitos de parts/regions/layers. Vacío = todo el árbol
    /// publicado por la base de datos.
    #[serde(default)]
    pub parts: IndexMap<String, PartNode>,
}

/// Procedencia de la configuración, escrita al manifiesto resuelto.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStamp {
    pub version: String,
    pub run_id: Uuid,
    pub configured_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl RunStamp {
    pub fn new() -> Self {
        Self { version: crate::constants::ENGINE_VERSION.to_string(),
               run_id: Uuid::new_v4(),
               configured_at: Utc::now(),
               user: std::env::var("USER").ok() }
    }
}

impl Default for RunStamp {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,
    /// Presupuesto de workers para el fan-out dentro de un step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    pub steps: Vec<StepSpec>,
    pub data: DataSpec,
    /// Procedencia; se rellena en `config` y no participa en fingerprints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amflow: Option<RunStamp>,
    /// Rutas de artefacto esperadas por step, resueltas en `config`.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub output_paths: IndexMap<String, Vec<PathBuf>>,
}

impl Manifest {
    pub fn step(&self, name: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn step_index(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }
}

/// Documento de workspace: defaults por aplicación y clase.
/// `{ <application>: { <class>: { configure: {...}, execute: {...},
///    postprocess: {...}, executable: ... } } }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceDoc(pub IndexMap<String, IndexMap<String, WorkspaceEntry>>);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,
    #[serde(default)]
    pub configure: OptionMap,
    #[serde(default)]
    pub execute: OptionMap,
    #[serde(default)]
    pub postprocess: OptionMap,
}

impl WorkspaceEntry {
    fn options(&self, phase: Phase) -> &OptionMap {
        match phase {
            Phase::Configure => &self.configure,
            Phase::Execute => &self.execute,
            Phase::Postprocess => &self.postprocess,
        }
    }
}

pub fn load_manifest(path: &Path) -> Result<Manifest, CoreError> {
    let text = fs::read_to_string(path)?;
    let mut manifest: Manifest =
        serde_yaml::from_str(&text).map_err(|e| CoreError::Manifest(format!("{}: {e}", path.display())))?;
    if manifest.steps.is_empty() {
        return Err(CoreError::Manifest(format!("{}: no steps declared", path.display())));
    }
    if let Some(ws) = manifest.workspace.clone() {
        let ws_path = if ws.is_absolute() {
            ws
        } else {
            path.parent().unwrap_or_else(|| Path::new(".")).join(ws)
        };
        let doc = load_workspace(&ws_path)?;
        apply_workspace_defaults(&mut manifest, &doc);
    }
    Ok(manifest)
}

pub fn load_workspace(path: &Path) -> Result<WorkspaceDoc, CoreError> {
    let text = fs::read_to_string(path)?;
    serde_yaml::from_str(&text).map_err(|e| CoreError::Manifest(format!("{}: {e}", path.display())))
}

pub fn write_manifest(path: &Path, manifest: &Manifest) -> Result<(), CoreError> {
    let text = serde_yaml::to_string(manifest).map_err(|e| CoreError::Manifest(e.to_string()))?;
    fs::write(path, text)?;
    Ok(())
}

/// Merge shallow determinista: las claves del step ganan sobre los defaults
/// del workspace; las claves solo-default conservan su posición inicial.
pub fn merge_options(defaults: &OptionMap, overrides: &OptionMap) -> OptionMap {
    let mut out = defaults.clone();
    for (k, v) in overrides {
        out.insert(k.clone(), v.clone());
    }
    out
}

/// Fusiona los defaults del workspace bajo cada step. El valor del step
/// siempre gana; el `executable` del step tiene prioridad sobre el del
/// workspace.
pub fn apply_workspace_defaults(manifest: &mut Manifest, doc: &WorkspaceDoc) {
    for step in &mut manifest.steps {
        let Some(entry) = doc.0.get(&step.application).and_then(|by_class| by_class.get(&step.class)) else {
            continue;
        };
        for phase in Phase::ALL {
            let merged = merge_options(entry.options(phase), step.options(phase));
            *step.options_mut(phase) = merged;
        }
        if step.executable.is_none() {
            step.executable = entry.executable.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step_with(execute: &[(&str, Value)]) -> StepSpec {
        let mut map = OptionMap::new();
        for (k, v) in execute {
            map.insert(k.to_string(), v.clone());
        }
        StepSpec { name: "solidification".into(),
                   class: "solidification_part".into(),
                   application: "thesis".into(),
                   depends_on: None,
                   executable: None,
                   configure: OptionMap::new(),
                   execute: map,
                   postprocess: OptionMap::new() }
    }

    fn manifest_with(step: StepSpec) -> Manifest {
        Manifest { workspace: None,
                   workers: None,
                   steps: vec![step],
                   data: DataSpec { datatype: "amjson".into(),
                                    path: PathBuf::from("/tmp/db"),
                                    parts: IndexMap::new() },
                   amflow: None,
                   output_paths: IndexMap::new() }
    }

    #[test]
    fn step_values_win_over_workspace_defaults() {
        let mut manifest = manifest_with(step_with(&[("np", json!(8))]));
        let mut entry = WorkspaceEntry::default();
        entry.execute.insert("np".into(), json!(2));
        entry.execute.insert("solver_tol".into(), json!(1e-6));
        entry.executable = Some("/opt/thesis/bin/thesis".into());
        let mut by_class = IndexMap::new();
        by_class.insert("solidification_part".to_string(), entry);
        let mut doc = WorkspaceDoc::default();
        doc.0.insert("thesis".to_string(), by_class);

        apply_workspace_defaults(&mut manifest, &doc);
        let step = &manifest.steps[0];
        assert_eq!(step.execute["np"], json!(8), "step override must win");
        assert_eq!(step.execute["solver_tol"], json!(1e-6), "default must fill in");
        assert_eq!(step.executable.as_deref(), Some("/opt/thesis/bin/thesis"));
    }

    #[test]
    fn workspace_for_other_application_is_ignored() {
        let mut manifest = manifest_with(step_with(&[]));
        let mut by_class = IndexMap::new();
        by_class.insert("solidification_part".to_string(), WorkspaceEntry::default());
        let mut doc = WorkspaceDoc::default();
        doc.0.insert("additivefoam".to_string(), by_class);
        apply_workspace_defaults(&mut manifest, &doc);
        assert!(manifest.steps[0].execute.is_empty());
    }

    #[test]
    fn manifest_yaml_round_trip_preserves_step_order() {
        let manifest = manifest_with(step_with(&[("np", json!(4)), ("mode", json!("fast"))]));
        let text = serde_yaml::to_string(&manifest).expect("serialize");
        let back: Manifest = serde_yaml::from_str(&text).expect("deserialize");
        assert_eq!(back.steps[0].name, "solidification");
        let keys: Vec<&String> = back.steps[0].execute.keys().collect();
        assert_eq!(keys, vec!["np", "mode"]);
    }

    #[test]
    fn merge_keeps_default_key_positions() {
        let mut defaults = OptionMap::new();
        defaults.insert("a".into(), json!(1));
        defaults.insert("b".into(), json!(2));
        let mut overrides = OptionMap::new();
        overrides.insert("b".into(), json!(3));
        let merged = merge_options(&defaults, &overrides);
        assert_eq!(merged.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(merged["b"], json!(3));
    }
}
