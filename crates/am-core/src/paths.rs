//! Rutas de la corrida, resueltas una vez y pasadas explícitamente.
//!
//! Las rutas de instalación e interfaces viajan en esta struct en vez de en
//! variables de entorno globales del proceso; solo se exportan al entorno
//! de los subprocesos de fase, nunca se leen de vuelta por el motor.
use std::path::{Path, PathBuf};

use crate::errors::CoreError;

/// Variables exportadas al entorno de cada fase externa.
pub const ENV_INTERFACE_PATH: &str = "AMFLOW_INTERFACE_PATH";
pub const ENV_INSTALL_PATH: &str = "AMFLOW_INSTALL_PATH";
pub const ENV_STEP_NAME: &str = "AMFLOW_STEP_NAME";
pub const ENV_STEP_INDEX: &str = "AMFLOW_STEP_INDEX";
pub const ENV_LAST_STEP_NAME: &str = "AMFLOW_LAST_STEP_NAME";

#[derive(Debug, Clone)]
pub struct RunPaths {
    /// Raíz de la instalación (plantillas y recursos compartidos).
    pub install_root: PathBuf,
    /// Raíz de los scripts de interfaz `<class>/<application>/{configure,
    /// execute,postprocess}`.
    pub interfaces_root: PathBuf,
    /// Raíz bajo la que se generan los directorios de caso.
    pub workspace_root: PathBuf,
}

impl RunPaths {
    pub fn new(install_root: impl Into<PathBuf>,
               interfaces_root: impl Into<PathBuf>,
               workspace_root: impl Into<PathBuf>)
               -> Self {
        Self { install_root: install_root.into(),
               interfaces_root: interfaces_root.into(),
               workspace_root: workspace_root.into() }
    }

    /// Instalación e interfaces bajo la misma raíz, workspace aparte.
    pub fn rooted(install_root: impl Into<PathBuf>, workspace_root: impl Into<PathBuf>) -> Self {
        let install_root = install_root.into();
        let interfaces_root = install_root.join("interfaces");
        Self { install_root,
               interfaces_root,
               workspace_root: workspace_root.into() }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        for (label, path) in [("install root", &self.install_root), ("interfaces root", &self.interfaces_root)] {
            if !path.is_dir() {
                return Err(CoreError::Manifest(format!("{label} is not a directory: {}", path.display())));
            }
        }
        Ok(())
    }

    /// Directorio de scripts de una pareja (clase, aplicación): la clase de
    /// componente agrupa y la aplicación concreta cuelga debajo.
    pub fn interface_dir(&self, class: &str, application: &str) -> PathBuf {
        self.interfaces_root.join(class).join(application)
    }

    /// Directorio de plantilla opcional de la pareja (clase, aplicación).
    /// Su contenido se copia a cada caso antes de configurar.
    pub fn template_dir(&self, class: &str, application: &str) -> PathBuf {
        self.interface_dir(class, application).join("template")
    }

    /// Directorio de un caso bajo la raíz del workspace:
    /// `<build>/<part>[/<region>][/<layer>]/<step>`.
    pub fn case_dir(&self, scope_components: &[String], step_name: &str) -> PathBuf {
        let mut dir = self.workspace_root.clone();
        for component in scope_components {
            dir.push(component);
        }
        dir.push(step_name);
        dir
    }
}

/// Sustituye los placeholders soportados en valores de opciones y rutas de
/// ejecutable: `{name}`, `{build}`, `$AMFLOW_INSTALL_PATH` y
/// `$AMFLOW_INTERFACE_PATH`.
pub fn substitute_placeholders(raw: &str, paths: &RunPaths, step_name: &str, build: &str) -> String {
    raw.replace("{name}", step_name)
       .replace("{build}", build)
       .replace(&format!("${ENV_INSTALL_PATH}"), &paths.install_root.to_string_lossy())
       .replace(&format!("${ENV_INTERFACE_PATH}"), &paths.interfaces_root.to_string_lossy())
}

/// Ruta del manifiesto resuelto que `config` escribe junto al original.
pub fn resolved_manifest_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    input.with_file_name(format!("{stem}_resolved.yaml"))
}
