//! Log de eventos de corrida, una línea JSON por evento (`run_events.jsonl`).
//!
//! Fuente de verdad para `status` y para auditar qué casos ejecutaron de
//! verdad y cuáles se enlazaron por fingerprint. Append-only: un resume
//! añade eventos al mismo fichero.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use am_domain::ScopeUnit;

use crate::errors::{CaseFailure, CoreError};

pub const EVENT_LOG_FILE: &str = "run_events.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEventKind {
    RunStarted { run_id: Uuid, manifest: PathBuf },
    CaseConfigured { step: String, scope: ScopeUnit },
    CaseExecuted {
        step: String,
        scope: ScopeUnit,
        fingerprint: String,
        /// Dueño del digest si este caso se enlazó en vez de ejecutar.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        linked_to: Option<ScopeUnit>,
    },
    CasePostprocessed { step: String, scope: ScopeUnit },
    CaseSynced { step: String, scope: ScopeUnit },
    CaseFailed { step: String, scope: ScopeUnit, failure: CaseFailure },
    StepCompleted { step: String, cases: usize, failed: usize },
    RunFinished { run_id: Uuid, failed_cases: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: RunEventKind,
}

/// Escritor append-only compartido entre los workers de un step.
#[derive(Debug)]
pub struct EventLog {
    file: Mutex<File>,
    path: PathBuf,
}

impl EventLog {
    /// Abre (o crea) el log en `run_root`, en modo append.
    pub fn open(run_root: &Path) -> Result<Self, CoreError> {
        let path = run_root.join(EVENT_LOG_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { file: Mutex::new(file),
                  path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, kind: RunEventKind) -> Result<(), CoreError> {
        let event = RunEvent { ts: Utc::now(),
                               kind };
        let line = serde_json::to_string(&event).map_err(|e| CoreError::Manifest(e.to_string()))?;
        let mut file = self.file
                           .lock()
                           .map_err(|_| CoreError::Database("event log mutex poisoned".to_string()))?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

/// Lee todos los eventos de un log existente. Las líneas corruptas se
/// descartan en vez de abortar: el log puede estar truncado tras un kill.
pub fn read_events(run_root: &Path) -> Result<Vec<RunEvent>, CoreError> {
    let path = run_root.join(EVENT_LOG_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(&path)?);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(event) = serde_json::from_str::<RunEvent>(&line) {
            events.push(event);
        }
    }
    Ok(events)
}
