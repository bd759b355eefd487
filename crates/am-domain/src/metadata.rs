//! Requisitos de metadatos declarados por los componentes.
//!
//! Cada requisito tiene una granularidad (build/part/layer) y es o bien un
//! valor escalar/texto o bien un fichero de la base de datos. La resolución
//! es perezosa: el resolver consulta el adaptador de base de datos y cachea
//! el resultado por (requisito, scope) durante toda la corrida.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::DomainError;

/// Granularidad a la que se resuelve un requisito.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataGranularity {
    Build,
    Part,
    Layer,
}

/// Requisitos de metadatos conocidos por el sistema.
///
/// Conjunto cerrado: los componentes declaran sus requisitos por variante y
/// los adaptadores de base de datos los resuelven por variante, sin cadenas
/// de herencia abiertas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKind {
    LaserPower,
    LayerThickness,
    PreheatTemperature,
    SpotSize,
    Material,
    PrintOrder,
    Scanpath,
    PartStl,
    PartIdMap,
}

impl MetadataKind {
    pub const ALL: &'static [MetadataKind] = &[MetadataKind::LaserPower,
                                               MetadataKind::LayerThickness,
                                               MetadataKind::PreheatTemperature,
                                               MetadataKind::SpotSize,
                                               MetadataKind::Material,
                                               MetadataKind::PrintOrder,
                                               MetadataKind::Scanpath,
                                               MetadataKind::PartStl,
                                               MetadataKind::PartIdMap];

    /// Clave canónica estable. Es la clave bajo la que el valor resuelto se
    /// escribe en los documentos por caso y la que normaliza la tabla de
    /// sinónimos.
    pub fn canonical_key(&self) -> &'static str {
        match self {
            Self::LaserPower => "laser_power",
            Self::LayerThickness => "layer_thickness",
            Self::PreheatTemperature => "preheat_temperature",
            Self::SpotSize => "spot_size",
            Self::Material => "material",
            Self::PrintOrder => "print_order",
            Self::Scanpath => "scanpath",
            Self::PartStl => "part_stl",
            Self::PartIdMap => "part_id_map",
        }
    }

    pub fn granularity(&self) -> MetadataGranularity {
        match self {
            Self::LayerThickness | Self::PreheatTemperature | Self::Material | Self::PrintOrder | Self::PartIdMap => {
                MetadataGranularity::Build
            }
            Self::LaserPower | Self::SpotSize | Self::PartStl => MetadataGranularity::Part,
            Self::Scanpath => MetadataGranularity::Layer,
        }
    }

    /// `true` si el requisito se resuelve a un fichero y no a un valor.
    pub fn is_file(&self) -> bool {
        matches!(self, Self::Scanpath | Self::PartStl | Self::PartIdMap)
    }
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_key())
    }
}

impl FromStr for MetadataKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetadataKind::ALL.iter()
                         .find(|k| k.canonical_key() == s)
                         .copied()
                         .ok_or_else(|| DomainError::UnknownMetadataKey(s.to_string()))
    }
}

/// Valor resuelto de un requisito.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetadataValue {
    /// Escalar con unidad (p. ej. potencia del láser en W).
    Scalar { value: f64, unit: String },
    /// Texto corto (p. ej. nombre del material).
    Text { value: String },
    /// Fichero copiado desde la base de datos a los recursos locales.
    FileRef { local: PathBuf, database: PathBuf },
}

impl MetadataValue {
    pub fn scalar(value: f64, unit: impl Into<String>) -> Self {
        Self::Scalar { value, unit: unit.into() }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text { value: value.into() }
    }

    pub fn file(local: impl Into<PathBuf>, database: impl Into<PathBuf>) -> Self {
        Self::FileRef { local: local.into(),
                        database: database.into() }
    }

    pub fn as_file(&self) -> Option<&PathBuf> {
        match self {
            Self::FileRef { local, .. } => Some(local),
            _ => None,
        }
    }
}

/// Conjunto de valores resueltos para un caso, indexado por clave canónica.
/// `IndexMap` preserva el orden de inserción para escrituras deterministas;
/// la canonicalización del fingerprint reordena por clave de todos modos.
pub type MetadataBundle = IndexMap<String, MetadataValue>;
