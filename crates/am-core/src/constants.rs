//! Nombres de fichero y constantes compartidas del motor.

/// Documento por caso con scope, metadatos y opciones de fase.
pub const CASE_DATA_FILE: &str = "case_data.yaml";

/// Nombres de los scripts de fase dentro del directorio de interfaz.
pub const CONFIGURE_SCRIPT: &str = "configure";
pub const EXECUTE_SCRIPT: &str = "execute";
pub const POSTPROCESS_SCRIPT: &str = "postprocess";

/// Versión del motor, estampada en el manifiesto resuelto.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
