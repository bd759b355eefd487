//! Adaptadores de base de datos de build.
//!
//! Implementaciones concretas del trait `Database` de `am-core`: el lector
//! de árbol JSON en disco y la cache de resolución que lo envuelve durante
//! una corrida.
pub mod cache;
pub mod json_tree;

pub use cache::CachedDatabase;
pub use json_tree::JsonTreeDatabase;

use am_core::CoreError;
use std::path::Path;

/// Abre la base de datos declarada en la sección `data` del manifiesto.
pub fn open_database(datatype: &str, path: &Path) -> Result<CachedDatabase<JsonTreeDatabase>, CoreError> {
    match datatype {
        "amjson" => Ok(CachedDatabase::new(JsonTreeDatabase::open(path)?)),
        other => Err(CoreError::Database(format!("unsupported datatype '{other}' (supported: amjson)"))),
    }
}
