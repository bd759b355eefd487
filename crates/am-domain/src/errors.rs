use thiserror::Error;

/// Errores del dominio (árbol de build y metadatos).
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum DomainError {
    #[error("unknown metadata key: {0}")]
    UnknownMetadataKey(String),
    #[error("synonym conflict: alias '{alias}' maps to both '{first}' and '{second}'")]
    SynonymConflict { alias: String, first: String, second: String },
    #[error("invalid scope: {0}")]
    InvalidScope(String),
}
