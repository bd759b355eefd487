//! Registro declarativo de clases de componente.
//!
//! Cada clase de step ("solidification_part", "microstructure_region", ...)
//! se describe con un `ComponentDescriptor`: tipos de fichero de entrada y
//! salida, requisitos de metadatos, niveles de scope sobre los que opera y
//! la declaración explícita y auditable de qué parámetros son puramente
//! operativos (excluidos del fingerprint). Las clases nuevas registran un
//! descriptor; no hay jerarquías de herencia abiertas.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use am_domain::{MetadataKind, ScopeLevel};

use crate::errors::CoreError;

/// Tipos de fichero de artefacto que producen/consumen los componentes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// CSV espacial de gradiente térmico y velocidad de solidificación.
    Gv,
    /// Serie reducida de eventos de solidificación por punto.
    ReducedSolidification,
    /// Geometría del melt pool por tiempo.
    MeltPoolGeometry,
    /// Identificadores de cluster por punto.
    ClusterIds,
    /// Selección de volumen representativo (RVE).
    Rve,
    /// Malla VTK.
    Vtk,
    /// Microestructura de granos en VTK.
    GrainVtk,
}

impl FileKind {
    /// Extensión del fichero de salida por defecto de cada tipo.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Gv | Self::ReducedSolidification | Self::MeltPoolGeometry | Self::ClusterIds | Self::Rve => "csv",
            Self::Vtk | Self::GrainVtk => "vtk",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gv => "gv",
            Self::ReducedSolidification => "reduced_solidification",
            Self::MeltPoolGeometry => "melt_pool_geometry",
            Self::ClusterIds => "cluster_ids",
            Self::Rve => "rve",
            Self::Vtk => "vtk",
            Self::GrainVtk => "grain_vtk",
        };
        f.write_str(name)
    }
}

/// Descriptor sin estado de una clase de componente. Muchos casos comparten
/// un descriptor.
#[derive(Debug, Clone)]
pub struct ComponentDescriptor {
    pub class_name: &'static str,
    /// Tipo de fichero que el step consume desde el step aguas arriba.
    pub input_file: Option<FileKind>,
    pub output_file: FileKind,
    pub requirements: Vec<MetadataKind>,
    /// Niveles de scope sobre los que opera; el más fino determina la
    /// expansión de la matriz de casos.
    pub levels: Vec<ScopeLevel>,
    /// Parámetros operativos excluidos del fingerprint, además del conjunto
    /// global `OPERATIONAL_PARAMS`.
    pub operational_params: Vec<&'static str>,
}

impl ComponentDescriptor {
    pub fn finest_level(&self) -> ScopeLevel {
        ScopeLevel::finest(&self.levels)
    }

    pub fn operates_on(&self, level: ScopeLevel) -> bool {
        self.levels.contains(&level)
    }
}

/// Parámetros operativos comunes a todas las clases: afectan al cómo se
/// corre la aplicación externa, nunca a la física del caso.
pub const OPERATIONAL_PARAMS: &[&str] = &["np", "cores", "threads", "mpi_ranks", "batch", "verbose", "verbosity",
                                          "overwrite", "exec"];

/// Registro de descriptores por nombre de clase.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    descriptors: HashMap<&'static str, ComponentDescriptor>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ComponentDescriptor) {
        self.descriptors.insert(descriptor.class_name, descriptor);
    }

    pub fn get(&self, class_name: &str) -> Result<&ComponentDescriptor, CoreError> {
        self.descriptors
            .get(class_name)
            .ok_or_else(|| CoreError::Manifest(format!("unknown component class '{class_name}'")))
    }

    pub fn class_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.descriptors.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// `true` si `key` debe excluirse del fingerprint para esta clase.
    pub fn is_operational(descriptor: &ComponentDescriptor, key: &str) -> bool {
        OPERATIONAL_PARAMS.contains(&key) || descriptor.operational_params.contains(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor { class_name: "solidification_part",
                              input_file: None,
                              output_file: FileKind::Gv,
                              requirements: vec![MetadataKind::LaserPower, MetadataKind::Scanpath],
                              levels: vec![ScopeLevel::Build, ScopeLevel::Part, ScopeLevel::Layer],
                              operational_params: vec!["sim_dirname"] }
    }

    #[test]
    fn registry_lookup_by_class_name() {
        let mut reg = ComponentRegistry::new();
        reg.register(descriptor());
        assert!(reg.get("solidification_part").is_ok());
        assert!(matches!(reg.get("nope"), Err(CoreError::Manifest(_))));
    }

    #[test]
    fn finest_level_drives_matrix_expansion() {
        assert_eq!(descriptor().finest_level(), ScopeLevel::Layer);
    }

    #[test]
    fn operational_params_combine_global_and_per_class() {
        let d = descriptor();
        assert!(ComponentRegistry::is_operational(&d, "np"));
        assert!(ComponentRegistry::is_operational(&d, "sim_dirname"));
        assert!(!ComponentRegistry::is_operational(&d, "laser_power"));
    }
}
