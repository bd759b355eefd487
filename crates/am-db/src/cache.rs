//! Cache de resolución de metadatos por (requisito, scope).
//!
//! La base de datos es estable durante una corrida: el primer valor leído
//! para un (requisito, scope) es el que ven todos los casos, aunque el
//! fichero subyacente cambie a mitad de corrida. El árbol del build se
//! carga una sola vez.
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

use am_core::{CoreError, Database};
use am_domain::{BuildTree, MetadataKind, MetadataValue, ScopeUnit};

pub struct CachedDatabase<D> {
    inner: D,
    values: DashMap<(MetadataKind, ScopeUnit), Option<MetadataValue>>,
    tree: OnceCell<BuildTree>,
}

impl<D: Database> CachedDatabase<D> {
    pub fn new(inner: D) -> Self {
        Self { inner,
               values: DashMap::new(),
               tree: OnceCell::new() }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn cached_values(&self) -> usize {
        self.values.len()
    }
}

impl<D: Database> Database for CachedDatabase<D> {
    fn build_name(&self) -> &str {
        self.inner.build_name()
    }

    fn load_tree(&self) -> Result<BuildTree, CoreError> {
        self.tree.get_or_try_init(|| self.inner.load_tree()).cloned()
    }

    fn read_value(&self, kind: MetadataKind, scope: &ScopeUnit) -> Result<Option<MetadataValue>, CoreError> {
        if let Some(hit) = self.values.get(&(kind, scope.clone())) {
            return Ok(hit.clone());
        }
        let value = self.inner.read_value(kind, scope)?;
        self.values.insert((kind, scope.clone()), value.clone());
        Ok(value)
    }

    // Las copias de fichero dependen del directorio de caso destino, así
    // que no se cachean; la fuente ya vive en disco.
    fn fetch_file(&self,
                  kind: MetadataKind,
                  scope: &ScopeUnit,
                  case_dir: &Path)
                  -> Result<Option<MetadataValue>, CoreError> {
        self.inner.fetch_file(kind, scope, case_dir)
    }

    fn register_artifact(&self, step: &str, scope: &ScopeUnit, artifact: &Path) -> Result<PathBuf, CoreError> {
        self.inner.register_artifact(step, scope, artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json_tree::{JsonTreeDatabase, BUILD_FILE};
    use std::fs;

    fn seed(root: &Path) {
        fs::write(root.join(BUILD_FILE),
                  r#"{"name": "B1", "metadata": {"Material": "IN625"}}"#).expect("write");
    }

    #[test]
    fn first_read_wins_over_later_file_changes() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed(dir.path());
        let db = CachedDatabase::new(JsonTreeDatabase::open(dir.path()).expect("open"));
        let scope = ScopeUnit::build("B1");

        let first = db.read_value(MetadataKind::Material, &scope).expect("read").expect("present");
        assert_eq!(first, MetadataValue::text("IN625"));

        // El fichero cambia a mitad de corrida; la cache mantiene la
        // lectura original.
        fs::write(dir.path().join(BUILD_FILE),
                  r#"{"name": "B1", "metadata": {"Material": "SS316"}}"#).expect("rewrite");
        let second = db.read_value(MetadataKind::Material, &scope).expect("read").expect("present");
        assert_eq!(second, MetadataValue::text("IN625"));
        assert_eq!(db.cached_values(), 1);
    }

    #[test]
    fn absent_values_are_cached_too() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed(dir.path());
        let db = CachedDatabase::new(JsonTreeDatabase::open(dir.path()).expect("open"));
        let scope = ScopeUnit::build("B1");
        assert_eq!(db.read_value(MetadataKind::SpotSize, &scope).expect("read"), None);
        assert_eq!(db.read_value(MetadataKind::SpotSize, &scope).expect("read"), None);
        assert_eq!(db.cached_values(), 1);
    }

    #[test]
    fn tree_is_loaded_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed(dir.path());
        let db = CachedDatabase::new(JsonTreeDatabase::open(dir.path()).expect("open"));
        let first = db.load_tree().expect("tree");
        fs::write(dir.path().join(BUILD_FILE), r#"{"name": "B2"}"#).expect("rewrite");
        let second = db.load_tree().expect("tree");
        assert_eq!(first, second);
    }
}
