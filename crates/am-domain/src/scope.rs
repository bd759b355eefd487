//! Unidades de alcance dentro de la jerarquía de un build.
//!
//! Un `ScopeUnit` identifica una posición `(build, part?, region?, layer?)`.
//! Los alcances parciales son válidos (p. ej. solo build). La igualdad es
//! estructural y el orden es el orden determinista de emisión de casos:
//! nombre de part, luego layer ascendente, luego nombre de region.
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Nivel de granularidad dentro de la jerarquía del build.
///
/// `rank` crece hacia lo más fino: Build < Part < Region < Layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
    Build,
    Part,
    Region,
    Layer,
}

impl ScopeLevel {
    pub fn rank(&self) -> u8 {
        match self {
            Self::Build => 0,
            Self::Part => 1,
            Self::Region => 2,
            Self::Layer => 3,
        }
    }

    /// Nivel más fino de un conjunto declarado por un componente.
    /// Un conjunto vacío colapsa a `Build`.
    pub fn finest(levels: &[ScopeLevel]) -> ScopeLevel {
        levels.iter()
              .copied()
              .max_by_key(|l| l.rank())
              .unwrap_or(ScopeLevel::Build)
    }
}

impl fmt::Display for ScopeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => write!(f, "build"),
            Self::Part => write!(f, "part"),
            Self::Region => write!(f, "region"),
            Self::Layer => write!(f, "layer"),
        }
    }
}

/// Posición inmutable en la jerarquía del build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeUnit {
    pub build: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<u32>,
}

impl ScopeUnit {
    pub fn build(build: impl Into<String>) -> Self {
        Self { build: build.into(),
               part: None,
               region: None,
               layer: None }
    }

    pub fn with_part(mut self, part: impl Into<String>) -> Self {
        self.part = Some(part.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_layer(mut self, layer: u32) -> Self {
        self.layer = Some(layer);
        self
    }

    /// Nivel más fino poblado en esta unidad.
    pub fn level(&self) -> ScopeLevel {
        if self.layer.is_some() {
            ScopeLevel::Layer
        } else if self.region.is_some() {
            ScopeLevel::Region
        } else if self.part.is_some() {
            ScopeLevel::Part
        } else {
            ScopeLevel::Build
        }
    }

    /// Componentes de directorio del caso, del build hacia lo más fino.
    /// El layout en disco sigue la jerarquía física:
    /// `<build>/<part>/<region>/<layer>`.
    pub fn dir_components(&self) -> Vec<String> {
        let mut out = vec![self.build.clone()];
        if let Some(p) = &self.part {
            out.push(p.clone());
        }
        if let Some(r) = &self.region {
            out.push(r.clone());
        }
        if let Some(l) = self.layer {
            out.push(l.to_string());
        }
        out
    }
}

impl fmt::Display for ScopeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_components().join("/"))
    }
}

// Orden de emisión de casos: part, luego layer ascendente, luego region.
// `None` ordena antes que `Some` para que los alcances gruesos precedan.
impl Ord for ScopeUnit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.build
            .cmp(&other.build)
            .then_with(|| self.part.cmp(&other.part))
            .then_with(|| self.layer.cmp(&other.layer))
            .then_with(|| self.region.cmp(&other.region))
    }
}

impl PartialOrd for ScopeUnit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finest_level_of_declared_set() {
        assert_eq!(ScopeLevel::finest(&[ScopeLevel::Build]), ScopeLevel::Build);
        assert_eq!(ScopeLevel::finest(&[ScopeLevel::Build, ScopeLevel::Part, ScopeLevel::Layer]),
                   ScopeLevel::Layer);
        assert_eq!(ScopeLevel::finest(&[]), ScopeLevel::Build);
    }

    #[test]
    fn scope_ordering_is_part_then_layer_then_region() {
        let a = ScopeUnit::build("B").with_part("P1").with_layer(1);
        let b = ScopeUnit::build("B").with_part("P1").with_layer(2);
        let c = ScopeUnit::build("B").with_part("P2").with_layer(1);
        let mut v = vec![c.clone(), b.clone(), a.clone()];
        v.sort();
        assert_eq!(v, vec![a, b, c]);
    }

    #[test]
    fn region_breaks_ties_after_layer() {
        let a = ScopeUnit::build("B").with_part("P").with_region("R1").with_layer(3);
        let b = ScopeUnit::build("B").with_part("P").with_region("R2").with_layer(3);
        assert!(a < b);
    }

    #[test]
    fn dir_components_follow_physical_hierarchy() {
        let s = ScopeUnit::build("B1").with_part("P1").with_region("R2").with_layer(12);
        assert_eq!(s.dir_components(), vec!["B1", "P1", "R2", "12"]);
        assert_eq!(s.to_string(), "B1/P1/R2/12");
    }
}
