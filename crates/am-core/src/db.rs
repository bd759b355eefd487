//! Abstracción de la base de datos de build.
//!
//! El motor habla con la base de datos a través del trait `Database`; los
//! lectores concretos (árbol JSON en disco, etc.) viven en `am-db`. Aquí
//! también vive la resolución de requisitos: cada metadato se consulta en el
//! scope recortado a su granularidad declarada, y los fallos de un caso se
//! agrupan en un único diagnóstico por lotes.
use std::path::{Path, PathBuf};

use am_domain::{MetadataBundle, MetadataGranularity, MetadataKind, MetadataValue, ScopeUnit};

use crate::component::ComponentDescriptor;
use crate::errors::CoreError;

pub trait Database: Send + Sync {
    /// Nombre del build publicado por este lector.
    fn build_name(&self) -> &str;

    /// Árbol completo de parts/regions/layers.
    fn load_tree(&self) -> Result<am_domain::BuildTree, CoreError>;

    /// Valor de un metadato en un scope exacto. `None` = no publicado ahí.
    fn read_value(&self, kind: MetadataKind, scope: &ScopeUnit) -> Result<Option<MetadataValue>, CoreError>;

    /// Copia un metadato de tipo fichero al directorio del caso y devuelve
    /// el `FileRef` resultante (ruta local + ruta de origen). `None` = no
    /// publicado para ese scope.
    fn fetch_file(&self,
                  kind: MetadataKind,
                  scope: &ScopeUnit,
                  case_dir: &Path)
                  -> Result<Option<MetadataValue>, CoreError>;

    /// Registra un artefacto producido por un step (fase de sync).
    /// Devuelve la ruta bajo la que quedó publicado.
    fn register_artifact(&self, step: &str, scope: &ScopeUnit, artifact: &Path) -> Result<PathBuf, CoreError>;
}

/// Recorta un scope a la granularidad declarada de un metadato: un valor de
/// granularidad part se consulta en `(build, part)` aunque el caso sea de
/// layer.
pub fn scope_at(scope: &ScopeUnit, granularity: MetadataGranularity) -> ScopeUnit {
    match granularity {
        MetadataGranularity::Build => ScopeUnit::build(&scope.build),
        MetadataGranularity::Part => {
            let mut s = ScopeUnit::build(&scope.build);
            s.part = scope.part.clone();
            s
        }
        MetadataGranularity::Layer => {
            let mut s = ScopeUnit::build(&scope.build);
            s.part = scope.part.clone();
            s.layer = scope.layer;
            s
        }
    }
}

/// Resuelve todos los requisitos del descriptor para un caso. Los fallos se
/// acumulan y se devuelven juntos en `MissingMetadata`, nunca solo el
/// primero.
pub fn resolve_requirements(db: &dyn Database,
                            descriptor: &ComponentDescriptor,
                            scope: &ScopeUnit,
                            case_dir: &Path)
                            -> Result<MetadataBundle, CoreError> {
    let mut bundle = MetadataBundle::new();
    let mut diagnostics = Vec::new();
    for kind in &descriptor.requirements {
        let lookup = scope_at(scope, kind.granularity());
        let resolved = if kind.is_file() {
            db.fetch_file(*kind, &lookup, case_dir)?
        } else {
            db.read_value(*kind, &lookup)?
        };
        match resolved {
            Some(value) => {
                bundle.insert(kind.canonical_key().to_string(), value);
            }
            None => diagnostics.push(format!("{} @ {}", kind.canonical_key(), lookup)),
        }
    }
    if diagnostics.is_empty() {
        Ok(bundle)
    } else {
        Err(CoreError::MissingMetadata { case: scope.to_string(),
                                         diagnostics })
    }
}

/// Base de datos en memoria para tests y demos.
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    name: String,
    tree: am_domain::BuildTree,
    values: std::collections::HashMap<(MetadataKind, ScopeUnit), MetadataValue>,
    registered: std::sync::Mutex<Vec<(String, ScopeUnit, PathBuf)>>,
}

impl InMemoryDatabase {
    pub fn new(tree: am_domain::BuildTree) -> Self {
        Self { name: tree.name.clone(),
               tree,
               values: Default::default(),
               registered: Default::default() }
    }

    pub fn set(&mut self, kind: MetadataKind, scope: ScopeUnit, value: MetadataValue) {
        self.values.insert((kind, scope), value);
    }

    pub fn registered_artifacts(&self) -> Vec<(String, ScopeUnit, PathBuf)> {
        self.registered.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl Database for InMemoryDatabase {
    fn build_name(&self) -> &str {
        &self.name
    }

    fn load_tree(&self) -> Result<am_domain::BuildTree, CoreError> {
        Ok(self.tree.clone())
    }

    fn read_value(&self, kind: MetadataKind, scope: &ScopeUnit) -> Result<Option<MetadataValue>, CoreError> {
        Ok(self.values.get(&(kind, scope.clone())).cloned())
    }

    fn fetch_file(&self,
                  kind: MetadataKind,
                  scope: &ScopeUnit,
                  case_dir: &Path)
                  -> Result<Option<MetadataValue>, CoreError> {
        let Some(MetadataValue::FileRef { database: src, .. }) = self.values.get(&(kind, scope.clone())).cloned()
        else {
            return Ok(None);
        };
        let file_name = src.file_name()
                           .map(|n| n.to_os_string())
                           .unwrap_or_else(|| "input.dat".into());
        let dest = case_dir.join(file_name);
        std::fs::copy(&src, &dest)?;
        Ok(Some(MetadataValue::file(dest, src)))
    }

    fn register_artifact(&self, step: &str, scope: &ScopeUnit, artifact: &Path) -> Result<PathBuf, CoreError> {
        let mut registered = self.registered
                                 .lock()
                                 .map_err(|_| CoreError::Database("registry mutex poisoned".into()))?;
        registered.push((step.to_string(), scope.clone(), artifact.to_path_buf()));
        Ok(artifact.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::FileKind;
    use am_domain::ScopeLevel;

    fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor { class_name: "solidification_part",
                              input_file: None,
                              output_file: FileKind::Gv,
                              requirements: vec![MetadataKind::LaserPower, MetadataKind::LayerThickness],
                              levels: vec![ScopeLevel::Part, ScopeLevel::Layer],
                              operational_params: vec![] }
    }

    fn db_with_power() -> InMemoryDatabase {
        let mut tree = am_domain::BuildTree::new("B1");
        tree.parts.insert("P1".into(), Default::default());
        let mut db = InMemoryDatabase::new(tree);
        db.set(MetadataKind::LaserPower,
               ScopeUnit::build("B1").with_part("P1"),
               MetadataValue::scalar(280.0, "W"));
        db
    }

    #[test]
    fn lookup_coarsens_to_declared_granularity() {
        let layer_scope = ScopeUnit::build("B1").with_part("P1").with_layer(7);
        // LaserPower es de granularidad part: el layer no participa.
        assert_eq!(scope_at(&layer_scope, MetadataGranularity::Part),
                   ScopeUnit::build("B1").with_part("P1"));
        assert_eq!(scope_at(&layer_scope, MetadataGranularity::Build), ScopeUnit::build("B1"));
    }

    #[test]
    fn missing_requirements_are_batched() {
        let mut db = db_with_power();
        // LayerThickness falta a propósito.
        db.set(MetadataKind::LaserPower,
               ScopeUnit::build("B1").with_part("P1"),
               MetadataValue::scalar(280.0, "W"));
        let dir = tempfile::tempdir().expect("tempdir");
        let scope = ScopeUnit::build("B1").with_part("P1").with_layer(1);
        let err = resolve_requirements(&db, &descriptor(), &scope, dir.path()).unwrap_err();
        match err {
            CoreError::MissingMetadata { case, diagnostics } => {
                assert_eq!(case, "B1/P1/1");
                assert_eq!(diagnostics.len(), 1);
                assert!(diagnostics[0].contains("layer_thickness"), "{diagnostics:?}");
            }
            other => panic!("expected MissingMetadata, got {other}"),
        }
    }

    #[test]
    fn resolved_bundle_uses_canonical_keys() {
        let mut db = db_with_power();
        db.set(MetadataKind::LayerThickness,
               ScopeUnit::build("B1"),
               MetadataValue::scalar(5e-5, "m"));
        let dir = tempfile::tempdir().expect("tempdir");
        let scope = ScopeUnit::build("B1").with_part("P1").with_layer(1);
        let bundle = resolve_requirements(&db, &descriptor(), &scope, dir.path()).expect("resolve");
        assert!(bundle.contains_key("laser_power"));
        assert!(bundle.contains_key("layer_thickness"));
    }
}
