//! Caso de simulación: una unidad de scope bajo un step, con su directorio
//! de trabajo y su máquina de estados.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use am_domain::{MetadataBundle, ScopeUnit};

use crate::errors::CaseFailure;
use crate::manifest::OptionMap;

/// Estados por los que transita un caso. Solo avanza; `Failed` y `Synced`
/// son terminales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseState {
    Pending,
    Configured,
    Executing,
    Executed,
    Postprocessed,
    Synced,
    Failed,
}

impl CaseState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Synced | Self::Failed)
    }

    /// `true` si la fase de ejecución ya quedó atrás.
    pub fn has_executed(&self) -> bool {
        matches!(self, Self::Executed | Self::Postprocessed | Self::Synced)
    }
}

impl fmt::Display for CaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Configured => "configured",
            Self::Executing => "executing",
            Self::Executed => "executed",
            Self::Postprocessed => "postprocessed",
            Self::Synced => "synced",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl FromStr for CaseState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "configured" => Ok(Self::Configured),
            "executing" => Ok(Self::Executing),
            "executed" => Ok(Self::Executed),
            "postprocessed" => Ok(Self::Postprocessed),
            "synced" => Ok(Self::Synced),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown case state '{other}'")),
        }
    }
}

/// Un caso concreto de un step: scope + metadatos resueltos + directorio.
#[derive(Debug, Clone)]
pub struct Case {
    pub step_name: String,
    pub scope: ScopeUnit,
    pub dir: PathBuf,
    pub metadata: MetadataBundle,
    /// Rutas de los ficheros de salida declarados por el descriptor.
    pub expected_outputs: Vec<PathBuf>,
    /// Rutas de entrada heredadas del step aguas arriba.
    pub input_files: Vec<PathBuf>,
    pub state: CaseState,
    pub fingerprint: Option<String>,
    pub failure: Option<CaseFailure>,
}

impl Case {
    pub fn new(step_name: &str, scope: ScopeUnit, dir: PathBuf) -> Self {
        Self { step_name: step_name.to_string(),
               scope,
               dir,
               metadata: MetadataBundle::new(),
               expected_outputs: Vec::new(),
               input_files: Vec::new(),
               state: CaseState::Pending,
               failure: None,
               fingerprint: None }
    }

    /// Identidad legible del caso, usada en el log de eventos y en el CLI.
    pub fn label(&self) -> String {
        format!("{}/{}", self.scope, self.step_name)
    }

    pub fn fail(&mut self, failure: CaseFailure) {
        self.state = CaseState::Failed;
        self.failure = Some(failure);
    }
}

/// Documento `case_data.yaml` escrito en cada directorio de caso: todo lo
/// que los scripts de fase necesitan para ser autocontenidos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseDocument {
    pub build: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<u32>,
    pub step_name: String,
    pub class: String,
    pub application: String,
    pub metadata: MetadataBundle,
    #[serde(default)]
    pub configure: OptionMap,
    #[serde(default)]
    pub execute: OptionMap,
    #[serde(default)]
    pub postprocess: OptionMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_files: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_outputs: Vec<PathBuf>,
}

/// Resumen de un caso para informes (`status`, fin de run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub step_name: String,
    pub scope: ScopeUnit,
    pub state: CaseState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_to: Option<ScopeUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaseReport {
    pub fn from_case(case: &Case) -> Self {
        Self { step_name: case.step_name.clone(),
               scope: case.scope.clone(),
               state: case.state,
               fingerprint: case.fingerprint.clone(),
               linked_to: None,
               error: case.failure.as_ref().map(|f| f.detail.clone()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_str() {
        for state in [CaseState::Pending,
                      CaseState::Configured,
                      CaseState::Executing,
                      CaseState::Executed,
                      CaseState::Postprocessed,
                      CaseState::Synced,
                      CaseState::Failed]
        {
            assert_eq!(state.to_string().parse::<CaseState>(), Ok(state));
        }
    }

    #[test]
    fn terminal_states() {
        assert!(CaseState::Synced.is_terminal());
        assert!(CaseState::Failed.is_terminal());
        assert!(!CaseState::Executed.is_terminal());
    }

    #[test]
    fn executed_predicate_covers_later_states() {
        assert!(!CaseState::Configured.has_executed());
        assert!(CaseState::Executed.has_executed());
        assert!(CaseState::Synced.has_executed());
    }

    #[test]
    fn label_combines_scope_and_step() {
        let scope = ScopeUnit::build("B1").with_part("P1").with_layer(3);
        let case = Case::new("solidification", scope, PathBuf::from("/tmp/x"));
        assert_eq!(case.label(), "B1/P1/3/solidification");
    }
}
