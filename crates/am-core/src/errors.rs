//! Taxonomía de errores del motor de orquestación.
//!
//! Los errores de caso (metadatos ausentes, scope inexistente, aplicación
//! externa) se aíslan y se registran por caso; los errores de corrida
//! (manifiesto, ciclo en el DAG, colisión de fingerprint) abortan antes o
//! durante la ejecución completa.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::executor::Phase;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Requisitos ausentes para un caso; `diagnostics` agrupa todos los
    /// (requisito, scope) fallidos del caso, no solo el primero.
    #[error("missing metadata for case {case}: {}", diagnostics.join("; "))]
    MissingMetadata { case: String, diagnostics: Vec<String> },

    /// El scope pedido por un filtro no existe en el árbol de la base de
    /// datos. Falla solo el caso afectado.
    #[error("scope not found in database tree: {0}")]
    ScopeNotFound(String),

    /// Fase externa con salida distinta de cero o sin el output declarado.
    #[error("external application failed in {phase} phase (exit {exit:?}): {detail}")]
    ExternalApplication { phase: Phase, exit: Option<i32>, detail: String },

    /// Mismo digest, payload canónico distinto: defecto de canonicalización.
    /// Fatal para la corrida, nunca se reutilizan resultados ajenos.
    #[error("fingerprint collision on digest {digest}")]
    FingerprintCollision { digest: String },

    /// El DAG de steps contiene un ciclo. Se detecta antes de crear ningún
    /// directorio de caso.
    #[error("step dependency cycle involving: {}", names.join(" -> "))]
    Cycle { names: Vec<String> },

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("database error: {0}")]
    Database(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Errores que abortan la corrida completa en lugar de un caso.
    pub fn is_fatal(&self) -> bool {
        matches!(self,
                 Self::FingerprintCollision { .. } | Self::Cycle { .. } | Self::Manifest(_))
    }
}

/// Forma serializable de un error de caso para el event log y la tabla de
/// estado. Conserva la variante y el texto, no el error completo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFailure {
    pub kind: String,
    pub detail: String,
}

impl From<&CoreError> for CaseFailure {
    fn from(err: &CoreError) -> Self {
        let kind = match err {
            CoreError::MissingMetadata { .. } => "missing_metadata",
            CoreError::ScopeNotFound(_) => "scope_not_found",
            CoreError::ExternalApplication { .. } => "external_application",
            CoreError::FingerprintCollision { .. } => "fingerprint_collision",
            CoreError::Cycle { .. } => "cycle",
            CoreError::Manifest(_) => "manifest",
            CoreError::Database(_) => "database",
            CoreError::Io(_) => "io",
        };
        Self { kind: kind.to_string(),
               detail: err.to_string() }
    }
}
