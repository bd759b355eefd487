//! Fachada del workspace: re-exporta las crates del orquestador.
//!
//! - `am_domain`: scopes, árbol del build, metadatos y sinónimos.
//! - `am_core`: motor (manifiesto, matriz de casos, fingerprints, ejecución
//!   y validación de artefactos).
//! - `am_db`: lectores de base de datos de build.
//! - `am_apps`: clases de componente de serie.
pub use am_apps;
pub use am_core;
pub use am_db;
pub use am_domain;

pub use am_apps::builtin_registry;
pub use am_core::{Engine, RunPaths, StepFilter};
pub use am_db::open_database;
