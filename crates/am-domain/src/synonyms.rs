//! Tabla explícita de sinónimos de claves de metadatos.
//!
//! Bases de datos distintas nombran el mismo parámetro de proceso de formas
//! distintas ("Laser Beam Power (W)", "Power (W)", ...). La tabla mapea cada
//! alias a una única clave canónica y se valida al construirse: un alias que
//! apunte a dos canónicas distintas es un error de configuración, no algo a
//! resolver en tiempo de consulta.
use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::errors::DomainError;
use crate::metadata::MetadataKind;

#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    canonical_by_alias: HashMap<String, String>,
}

impl SynonymTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construye la tabla desde pares (canónica, aliases), validando
    /// conflictos entre aliases.
    pub fn from_entries(entries: &[(&str, &[&str])]) -> Result<Self, DomainError> {
        let mut table = Self::new();
        for (canonical, aliases) in entries {
            for alias in aliases.iter() {
                table.insert(canonical, alias)?;
            }
        }
        Ok(table)
    }

    pub fn insert(&mut self, canonical: &str, alias: &str) -> Result<(), DomainError> {
        if let Some(existing) = self.canonical_by_alias.get(alias) {
            if existing != canonical {
                return Err(DomainError::SynonymConflict { alias: alias.to_string(),
                                                          first: existing.clone(),
                                                          second: canonical.to_string() });
            }
            return Ok(());
        }
        self.canonical_by_alias.insert(alias.to_string(), canonical.to_string());
        Ok(())
    }

    /// Normaliza una clave observada en la base de datos a su forma canónica.
    /// Una clave ya canónica pasa sin cambios.
    pub fn normalize<'a>(&'a self, key: &'a str) -> &'a str {
        self.canonical_by_alias.get(key).map(|s| s.as_str()).unwrap_or(key)
    }

    /// Busca en `available` la primera clave que normalice a `kind`.
    /// Equivale a la búsqueda de clave sinónima sobre los nombres de
    /// parámetros publicados por la base de datos.
    pub fn find_key<'a>(&self, kind: MetadataKind, available: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
        let canonical = kind.canonical_key();
        available.into_iter().find(|k| self.normalize(k) == canonical)
    }
}

/// Tabla por defecto: alias observados en las bases de datos soportadas.
pub static DEFAULT_SYNONYMS: Lazy<SynonymTable> = Lazy::new(|| {
    SynonymTable::from_entries(&[("laser_power", &["Laser Beam Power (W)", "Power (W)", "beam_power"]),
                                 ("spot_size", &["Laser Spot Size (µm)", "Spot Size (µm)", "spot_diameter"]),
                                 ("layer_thickness", &["Layer Thickness (m)", "slice_thickness"]),
                                 ("preheat_temperature", &["Preheat (K)", "bed_temperature"]),
                                 ("material", &["Material", "material_name"]),
                                 ("print_order", &["Melt Order", "melt_order"])])
        .expect("builtin synonym table has no conflicts")
});
