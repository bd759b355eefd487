//! Motor de orquestación de workflows de simulación de fabricación aditiva.
//!
//! Mapea los metadatos de un build (parts, regions, layers) sobre una
//! secuencia de steps de simulación, genera un directorio de trabajo por
//! caso, deduplica casos físicamente idénticos por fingerprint y ejecuta
//! las aplicaciones externas en tres fases (configure, execute,
//! postprocess) con paralelismo acotado, aislamiento de fallos y resume.
pub mod artifacts;
pub mod case;
pub mod component;
pub mod constants;
pub mod db;
pub mod engine;
pub mod errors;
pub mod events;
pub mod executor;
pub mod fingerprint;
pub mod hashing;
pub mod manifest;
pub mod matrix;
pub mod paths;
pub mod workflow;

pub use artifacts::{content_checksum, validate_artifact, ArtifactIssue};
pub use case::{Case, CaseDocument, CaseReport, CaseState};
pub use component::{ComponentDescriptor, ComponentRegistry, FileKind, OPERATIONAL_PARAMS};
pub use db::{resolve_requirements, scope_at, Database, InMemoryDatabase};
pub use engine::{ConfigSummary, Engine, RunSummary, StepFilter, SyncSummary};
pub use errors::{CaseFailure, CoreError};
pub use events::{read_events, EventLog, RunEvent, RunEventKind};
pub use executor::{Phase, PhaseInvocation, StepRunner};
pub use fingerprint::{ClaimOutcome, FingerprintIndex, FingerprintInput};
pub use manifest::{load_manifest, write_manifest, Manifest, OptionMap, StepSpec};
pub use matrix::{effective_tree, expand, EffectiveTree};
pub use paths::RunPaths;
pub use workflow::{Workflow, WorkflowStep};
