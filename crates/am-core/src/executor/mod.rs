//! Ejecución de las fases externas de un step.
//!
//! Cada pareja (aplicación, clase) aporta hasta tres scripts ejecutables en
//! su directorio de interfaz: `configure`, `execute` y `postprocess`. Un
//! script ausente se omite; si falta `execute`, el caso cuenta como
//! ejecutado vacuamente.
mod process;
mod runner;

pub use process::{PhaseInvocation, PhaseOutcome};
pub use runner::{scope_covers, write_case_document, StepOutcome, StepRunner};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{CONFIGURE_SCRIPT, EXECUTE_SCRIPT, POSTPROCESS_SCRIPT};

/// Las tres fases del contrato con la aplicación externa, en orden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Configure,
    Execute,
    Postprocess,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Configure, Phase::Execute, Phase::Postprocess];

    pub fn script_name(&self) -> &'static str {
        match self {
            Self::Configure => CONFIGURE_SCRIPT,
            Self::Execute => EXECUTE_SCRIPT,
            Self::Postprocess => POSTPROCESS_SCRIPT,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.script_name())
    }
}
