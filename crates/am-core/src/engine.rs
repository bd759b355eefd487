//! Motor de orquestación: las cuatro operaciones del flujo de trabajo.
//!
//! `configure` valida el manifiesto, expande la matriz de casos, genera los
//! directorios y escribe el manifiesto resuelto. `run` ejecuta los steps en
//! orden topológico con deduplicación y resume. `sync` registra los
//! artefactos válidos en la base de datos. `status` reconstruye el estado
//! por caso desde el log de eventos.
use indexmap::IndexMap;
use log::{info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use am_domain::ScopeUnit;

use crate::artifacts::validate_artifact;
use crate::case::{Case, CaseReport, CaseState};
use crate::component::ComponentRegistry;
use crate::constants::CASE_DATA_FILE;
use crate::db::{resolve_requirements, Database};
use crate::errors::{CaseFailure, CoreError};
use crate::events::{read_events, EventLog, RunEventKind};
use crate::executor::StepRunner;
use crate::manifest::{load_manifest, write_manifest, Manifest, RunStamp};
use crate::matrix::{effective_tree, expand, EffectiveTree};
use crate::paths::{resolved_manifest_path, RunPaths};
use crate::workflow::{Workflow, WorkflowStep};

const DEFAULT_WORKERS: usize = 4;

/// Subconjunto de steps a correr/sincronizar. Vacío = todos.
#[derive(Debug, Clone, Default)]
pub struct StepFilter {
    pub steps: Vec<String>,
}

impl StepFilter {
    pub fn matches(&self, name: &str) -> bool {
        self.steps.is_empty() || self.steps.iter().any(|s| s == name)
    }
}

/// Resultado de `configure`: el manifiesto resuelto más el detalle por
/// caso. Los casos que no pudieron configurarse quedan en los reports.
#[derive(Debug)]
pub struct ConfigSummary {
    pub manifest: Manifest,
    pub reports: Vec<CaseReport>,
    pub failed: usize,
}

#[derive(Debug)]
pub struct RunSummary {
    pub reports: Vec<CaseReport>,
    pub executed: usize,
    pub linked: usize,
    pub resumed: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct SyncSummary {
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
    pub reports: Vec<CaseReport>,
}

pub struct Engine<'a> {
    pub paths: &'a RunPaths,
    pub db: &'a dyn Database,
    pub registry: &'a ComponentRegistry,
}

impl Engine<'_> {
    /// Valida el manifiesto, genera la estructura de casos en disco y
    /// escribe el manifiesto resuelto con procedencia y rutas de salida.
    /// Un caso sin metadatos o con scope inexistente queda fallido en el
    /// resumen; sus hermanos se configuran igual.
    pub fn configure(&self, manifest_path: &Path) -> Result<ConfigSummary, CoreError> {
        let mut manifest = load_manifest(manifest_path)?;
        let workflow = Workflow::from_manifest(&manifest, self.registry)?;
        self.paths.validate()?;
        let effective = self.effective(&manifest)?;

        let mut reports = Vec::new();
        let mut failed = 0;
        let mut output_paths: IndexMap<String, Vec<PathBuf>> = IndexMap::new();
        for step in &workflow.steps {
            let cases = self.build_cases(step, &effective);
            let mut outputs = Vec::with_capacity(cases.len());
            for mut case in cases {
                if case.state != CaseState::Failed {
                    let result = (|| -> Result<PathBuf, CoreError> {
                        std::fs::create_dir_all(&case.dir)?;
                        case.metadata = resolve_requirements(self.db, &step.descriptor, &case.scope, &case.dir)?;
                        let expected =
                            case.dir
                                .join(format!("{}.{}", step.spec.name, step.descriptor.output_file.extension()));
                        case.expected_outputs = vec![expected.clone()];
                        let doc_path = case.dir.join(CASE_DATA_FILE);
                        crate::executor::write_case_document(&doc_path, step, &case)?;
                        Ok(expected)
                    })();
                    match result {
                        Ok(expected) => {
                            case.state = CaseState::Configured;
                            outputs.push(expected);
                        }
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(err) => case.fail(CaseFailure::from(&err)),
                    }
                }
                if case.state == CaseState::Failed {
                    warn!("cannot configure {}: {}",
                          case.label(),
                          case.failure.as_ref().map(|f| f.detail.as_str()).unwrap_or("unknown"));
                    failed += 1;
                }
                reports.push(CaseReport::from_case(&case));
            }
            output_paths.insert(step.spec.name.clone(), outputs);
        }

        manifest.amflow = Some(RunStamp::new());
        manifest.output_paths = output_paths;
        write_manifest(&resolved_manifest_path(manifest_path), &manifest)?;
        info!("configured {} steps under {}", workflow.steps.len(), self.paths.workspace_root.display());
        Ok(ConfigSummary { manifest,
                           reports,
                           failed })
    }

    /// Corre los steps en orden topológico. Los steps fuera del filtro no
    /// ejecutan, pero sus casos se reconstruyen como proveedores de
    /// entradas para los steps que sí corren.
    pub fn run(&self, manifest_path: &Path, filter: &StepFilter) -> Result<RunSummary, CoreError> {
        let manifest = load_manifest(manifest_path)?;
        let workflow = Workflow::from_manifest(&manifest, self.registry)?;
        self.paths.validate()?;
        let effective = self.effective(&manifest)?;
        std::fs::create_dir_all(&self.paths.workspace_root)?;
        let log = EventLog::open(&self.paths.workspace_root)?;
        let run_id = manifest.amflow.as_ref().map(|s| s.run_id).unwrap_or_else(uuid::Uuid::new_v4);
        log.record(RunEventKind::RunStarted { run_id,
                                              manifest: manifest_path.to_path_buf() })?;

        let workers = manifest.workers.unwrap_or(DEFAULT_WORKERS);
        let runner = StepRunner { paths: self.paths,
                                  db: self.db,
                                  log: &log,
                                  workers };

        let mut summary = RunSummary { reports: Vec::new(),
                                       executed: 0,
                                       linked: 0,
                                       resumed: 0,
                                       failed: 0 };
        let mut finished: HashMap<String, Vec<Case>> = HashMap::new();
        let mut last_step_name: Option<String> = None;
        for (index, step) in workflow.steps.iter().enumerate() {
            let cases = self.build_cases(step, &effective);
            if !filter.matches(&step.spec.name) {
                // Fuera del filtro: sus salidas en disco siguen sirviendo de
                // entrada a los steps posteriores.
                finished.insert(step.spec.name.clone(), self.presumed_finished(step, cases));
                last_step_name = Some(step.spec.name.clone());
                continue;
            }
            let upstream = step.upstream.as_deref().and_then(|name| finished.get(name)).map(|v| v.as_slice());
            info!("running step '{}' ({} cases)", step.spec.name, cases.len());
            let (done, outcome) = runner.run_step(step, index, last_step_name.as_deref(), upstream, cases)?;
            summary.executed += outcome.executed;
            summary.linked += outcome.linked;
            summary.resumed += outcome.resumed;
            summary.failed += outcome.failed;
            if outcome.failed > 0 {
                warn!("step '{}': {} case(s) failed", step.spec.name, outcome.failed);
            }
            summary.reports.extend(outcome.reports);
            finished.insert(step.spec.name.clone(), done);
            last_step_name = Some(step.spec.name.clone());
        }
        log.record(RunEventKind::RunFinished { run_id,
                                               failed_cases: summary.failed })?;
        Ok(summary)
    }

    /// Registra en la base de datos los artefactos válidos de cada caso.
    /// La validez comprueba existencia, contenido y cabecera del tipo
    /// declarado; los casos sin artefacto válido se reportan y no bloquean
    /// al resto.
    pub fn sync(&self, manifest_path: &Path, filter: &StepFilter) -> Result<SyncSummary, CoreError> {
        let manifest = load_manifest(manifest_path)?;
        let workflow = Workflow::from_manifest(&manifest, self.registry)?;
        let effective = self.effective(&manifest)?;
        let log = EventLog::open(&self.paths.workspace_root)?;

        let mut summary = SyncSummary { synced: 0,
                                        skipped: 0,
                                        failed: 0,
                                        reports: Vec::new() };
        for step in &workflow.steps {
            if !filter.matches(&step.spec.name) {
                summary.skipped += 1;
                continue;
            }
            for case in self.build_cases(step, &effective) {
                let output = case.dir
                                 .join(format!("{}.{}", step.spec.name, step.descriptor.output_file.extension()));
                let mut report = CaseReport::from_case(&case);
                if case.state == CaseState::Failed {
                    summary.failed += 1;
                    summary.reports.push(report);
                    continue;
                }
                match validate_artifact(step.descriptor.output_file, &output) {
                    Ok(()) => match self.db.register_artifact(&step.spec.name, &case.scope, &output) {
                        Ok(_) => {
                            log.record(RunEventKind::CaseSynced { step: step.spec.name.clone(),
                                                                  scope: case.scope.clone() })?;
                            report.state = CaseState::Synced;
                            summary.synced += 1;
                        }
                        Err(err) => {
                            let failure = CaseFailure::from(&err);
                            log.record(RunEventKind::CaseFailed { step: step.spec.name.clone(),
                                                                  scope: case.scope.clone(),
                                                                  failure: failure.clone() })?;
                            report.state = CaseState::Failed;
                            report.error = Some(failure.detail);
                            summary.failed += 1;
                        }
                    },
                    Err(issue) => {
                        warn!("no valid output to sync for {}: {issue}", case.label());
                        report.error = Some(format!("{}: {issue}", output.display()));
                        summary.failed += 1;
                    }
                }
                summary.reports.push(report);
            }
        }
        Ok(summary)
    }

    /// Estado por caso reconstruido del log de eventos, en orden de último
    /// evento visto.
    pub fn status(&self) -> Result<Vec<CaseReport>, CoreError> {
        let events = read_events(&self.paths.workspace_root)?;
        let mut by_case: IndexMap<(String, ScopeUnit), CaseReport> = IndexMap::new();
        for event in events {
            let (step, scope, state, linked_to, error) = match event.kind {
                RunEventKind::CaseConfigured { step, scope } => (step, scope, CaseState::Configured, None, None),
                RunEventKind::CaseExecuted { step, scope, linked_to, .. } => {
                    (step, scope, CaseState::Executed, linked_to, None)
                }
                RunEventKind::CasePostprocessed { step, scope } => {
                    (step, scope, CaseState::Postprocessed, None, None)
                }
                RunEventKind::CaseSynced { step, scope } => (step, scope, CaseState::Synced, None, None),
                RunEventKind::CaseFailed { step, scope, failure } => {
                    (step, scope, CaseState::Failed, None, Some(failure.detail))
                }
                _ => continue,
            };
            let entry = by_case.entry((step.clone(), scope.clone()))
                               .or_insert_with(|| CaseReport { step_name: step,
                                                               scope,
                                                               state,
                                                               fingerprint: None,
                                                               linked_to: None,
                                                               error: None });
            entry.state = state;
            if linked_to.is_some() {
                entry.linked_to = linked_to;
            }
            entry.error = error;
        }
        Ok(by_case.into_values().collect())
    }

    fn effective(&self, manifest: &Manifest) -> Result<EffectiveTree, CoreError> {
        let tree = self.db.load_tree()?;
        Ok(effective_tree(&tree, &manifest.data.parts))
    }

    /// Casos del step sobre el árbol efectivo. Cada scope pedido y ausente
    /// de la base de datos entra como caso ya fallido; nunca arrastra al
    /// resto de la matriz.
    fn build_cases(&self, step: &WorkflowStep, effective: &EffectiveTree) -> Vec<Case> {
        let mut cases: Vec<Case> =
            expand(&effective.tree, step.descriptor.finest_level()).into_iter()
                                                                   .map(|scope| {
                                                                       let dir =
                                                                           self.paths
                                                                               .case_dir(&scope.dir_components(),
                                                                                         &step.spec.name);
                                                                       Case::new(&step.spec.name, scope, dir)
                                                                   })
                                                                   .collect();
        for (scope, detail) in &effective.missing {
            let dir = self.paths.case_dir(&scope.dir_components(), &step.spec.name);
            let mut case = Case::new(&step.spec.name, scope.clone(), dir);
            case.fail(CaseFailure::from(&CoreError::ScopeNotFound(detail.clone())));
            cases.push(case);
        }
        cases
    }

    /// Casos de un step filtrado: se presumen terminados con sus salidas en
    /// disco, para que los steps aguas abajo hereden las rutas.
    fn presumed_finished(&self, step: &WorkflowStep, cases: Vec<Case>) -> Vec<Case> {
        cases.into_iter()
             .map(|mut case| {
                 if case.state != CaseState::Failed {
                     case.expected_outputs = vec![case.dir.join(format!("{}.{}",
                                                                        step.spec.name,
                                                                        step.descriptor
                                                                            .output_file
                                                                            .extension()))];
                     case.state = CaseState::Postprocessed;
                 }
                 case
             })
             .collect()
    }
}
