//! Corredor de un step: fan-out acotado sobre los casos, deduplicación por
//! fingerprint y aislamiento de fallos por caso.
//!
//! La ejecución va por oleadas: primero se configuran todos los casos en
//! paralelo (directorio, plantilla, metadatos, `case_data.yaml`, script de
//! configure, fingerprint); después se agrupan por digest de forma
//! secuencial y determinista; solo un representante por digest corre la
//! fase de execute, y los equivalentes enlazan copiando sus salidas; por
//! último se postprocesa todo lo ejecutado. Un fallo en un caso nunca
//! arrastra a sus hermanos, salvo los errores fatales de corrida.
use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use am_domain::ScopeUnit;

use crate::artifacts::validate_artifact;
use crate::case::{Case, CaseDocument, CaseReport, CaseState};
use crate::component::FileKind;
use crate::constants::CASE_DATA_FILE;
use crate::db::{resolve_requirements, Database};
use crate::errors::{CaseFailure, CoreError};
use crate::events::{EventLog, RunEventKind};
use crate::fingerprint::{ClaimOutcome, FingerprintIndex, FingerprintInput};
use crate::hashing::hash_file;
use crate::paths::RunPaths;
use crate::workflow::WorkflowStep;

use super::{Phase, PhaseInvocation};

/// Papel de cada caso tras la agrupación por fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Role {
    /// Ejecuta la fase de execute de verdad.
    Representative,
    /// Enlaza las salidas del dueño del digest.
    Equivalent(ScopeUnit),
    /// Salidas ya válidas en disco: no se toca nada.
    Resumed,
    /// Falló antes de llegar a la agrupación.
    Skipped,
}

#[derive(Debug)]
pub struct StepOutcome {
    pub reports: Vec<CaseReport>,
    pub executed: usize,
    pub linked: usize,
    pub resumed: usize,
    pub failed: usize,
}

pub struct StepRunner<'a> {
    pub paths: &'a RunPaths,
    pub db: &'a dyn Database,
    pub log: &'a EventLog,
    pub workers: usize,
}

impl StepRunner<'_> {
    /// Corre un step completo sobre sus casos. `upstream` son los casos del
    /// step del que este hereda sus entradas, ya terminados.
    pub fn run_step(&self,
                    step: &WorkflowStep,
                    step_index: usize,
                    last_step_name: Option<&str>,
                    upstream: Option<&[Case]>,
                    mut cases: Vec<Case>)
                    -> Result<(Vec<Case>, StepOutcome), CoreError> {
        self.wire_inputs(step, upstream, &mut cases);
        for case in cases.iter().filter(|c| c.state == CaseState::Failed) {
            if let Some(failure) = &case.failure {
                self.log.record(RunEventKind::CaseFailed { step: step.spec.name.clone(),
                                                           scope: case.scope.clone(),
                                                           failure: failure.clone() })?;
            }
        }

        let pool = rayon::ThreadPoolBuilder::new().num_threads(self.workers.max(1))
                                                  .build()
                                                  .map_err(|e| CoreError::Manifest(format!("worker pool: {e}")))?;

        // Oleada 1: configurar y calcular fingerprints en paralelo.
        let canonicals: DashMap<ScopeUnit, String> = DashMap::new();
        pool.install(|| {
                cases.par_iter_mut().try_for_each(|case| {
                                        self.configure_case(step, step_index, last_step_name, case, &canonicals)
                                    })
            })?;

        // Agrupación secuencial y determinista por digest.
        let index = FingerprintIndex::new();
        let mut roles = Vec::with_capacity(cases.len());
        for case in &cases {
            let role = match (&case.state, &case.fingerprint) {
                (CaseState::Failed, _) => Role::Skipped,
                (CaseState::Postprocessed, _) => Role::Resumed,
                (_, Some(digest)) => {
                    let canonical = canonicals.get(&case.scope).map(|c| c.clone()).unwrap_or_default();
                    match index.claim(digest, &canonical, &case.scope) {
                        ClaimOutcome::Claimed => Role::Representative,
                        ClaimOutcome::Equivalent { owner } => Role::Equivalent(owner),
                        ClaimOutcome::Collision => {
                            return Err(CoreError::FingerprintCollision { digest: digest.clone() })
                        }
                    }
                }
                _ => Role::Skipped,
            };
            roles.push(role);
        }

        // Oleada 2: ejecutar solo los representantes.
        pool.install(|| {
                cases.par_iter_mut()
                     .zip(roles.par_iter())
                     .filter(|(_, role)| **role == Role::Representative)
                     .try_for_each(|(case, _)| self.execute_case(step, step_index, last_step_name, case))
            })?;

        // Enlace de equivalentes: copiar las salidas del dueño del digest.
        let owner_ok: HashMap<ScopeUnit, bool> =
            cases.iter()
                 .zip(roles.iter())
                 .filter(|(_, role)| **role == Role::Representative)
                 .map(|(case, _)| (case.scope.clone(), case.state.has_executed()))
                 .collect();
        pool.install(|| {
                cases.par_iter_mut()
                     .zip(roles.par_iter())
                     .try_for_each(|(case, role)| {
                         let Role::Equivalent(owner) = role else {
                             return Ok(());
                         };
                         self.link_case(step, case, owner, owner_ok.get(owner).copied().unwrap_or(false))
                     })
            })?;

        // Oleada 3: postprocesar todo lo ejecutado.
        pool.install(|| {
                cases.par_iter_mut()
                     .filter(|case| case.state == CaseState::Executed)
                     .try_for_each(|case| self.postprocess_case(step, step_index, last_step_name, case))
            })?;

        let mut outcome = StepOutcome { reports: Vec::with_capacity(cases.len()),
                                        executed: 0,
                                        linked: 0,
                                        resumed: 0,
                                        failed: 0 };
        for (case, role) in cases.iter().zip(roles.iter()) {
            let mut report = CaseReport::from_case(case);
            match role {
                Role::Representative if case.state != CaseState::Failed => outcome.executed += 1,
                Role::Equivalent(owner) if case.state != CaseState::Failed => {
                    report.linked_to = Some(owner.clone());
                    outcome.linked += 1;
                }
                Role::Resumed => outcome.resumed += 1,
                _ => {}
            }
            if case.state == CaseState::Failed {
                outcome.failed += 1;
            }
            outcome.reports.push(report);
        }
        self.log.record(RunEventKind::StepCompleted { step: step.spec.name.clone(),
                                                      cases: cases.len(),
                                                      failed: outcome.failed })?;
        Ok((cases, outcome))
    }

    /// Hereda entradas del step aguas arriba. Un caso cuyo proveedor falló
    /// se marca fallido sin configurar nada.
    fn wire_inputs(&self, step: &WorkflowStep, upstream: Option<&[Case]>, cases: &mut [Case]) {
        let Some(upstream) = upstream else {
            return;
        };
        if step.descriptor.input_file.is_none() {
            return;
        }
        for case in cases.iter_mut() {
            if case.state == CaseState::Failed {
                continue;
            }
            let mut inputs = Vec::new();
            let mut failed_provider = None;
            for up in upstream {
                if scope_covers(&up.scope, &case.scope) || scope_covers(&case.scope, &up.scope) {
                    if up.state == CaseState::Failed {
                        failed_provider = Some(up.scope.clone());
                    } else {
                        inputs.extend(up.expected_outputs.iter().cloned());
                    }
                }
            }
            if let Some(provider) = failed_provider {
                case.fail(CaseFailure { kind: "upstream_failed".to_string(),
                                        detail: format!("upstream case {provider} failed") });
            } else if inputs.is_empty() {
                case.fail(CaseFailure { kind: "upstream_failed".to_string(),
                                        detail: format!("no upstream case provides inputs for {}",
                                                        case.scope) });
            } else {
                case.input_files = inputs;
            }
        }
    }

    fn configure_case(&self,
                      step: &WorkflowStep,
                      step_index: usize,
                      last_step_name: Option<&str>,
                      case: &mut Case,
                      canonicals: &DashMap<ScopeUnit, String>)
                      -> Result<(), CoreError> {
        if case.state == CaseState::Failed {
            return Ok(());
        }
        case.expected_outputs =
            vec![case.dir.join(format!("{}.{}", step.spec.name, step.descriptor.output_file.extension()))];

        // Resume: salidas válidas en disco = nada que hacer en este caso.
        if outputs_valid(step.descriptor.output_file, &case.expected_outputs) {
            case.state = CaseState::Postprocessed;
            return Ok(());
        }

        let result = (|| -> Result<(), CoreError> {
            fs::create_dir_all(&case.dir)?;
            let template = self.paths.template_dir(&step.spec.class, &step.spec.application);
            if template.is_dir() {
                copy_dir_recursive(&template, &case.dir)?;
            }

            case.metadata = resolve_requirements(self.db, &step.descriptor, &case.scope, &case.dir)?;
            let case_data = case.dir.join(CASE_DATA_FILE);
            if !case_data.exists() {
                write_case_document(&case_data, step, case)?;
            }

            if let Some(invocation) = self.invocation(Phase::Configure, step, step_index, last_step_name, case) {
                invocation.run()?;
            }

            let mut checksums = Vec::with_capacity(case.input_files.len());
            for input in &case.input_files {
                checksums.push(hash_file(input)?);
            }
            let input = FingerprintInput::new(&step.spec, &step.descriptor, &case.metadata, checksums)?;
            let canonical = input.canonical();
            case.fingerprint = Some(input.digest());
            canonicals.insert(case.scope.clone(), canonical);
            case.state = CaseState::Configured;
            Ok(())
        })();

        match result {
            Ok(()) => self.log.record(RunEventKind::CaseConfigured { step: step.spec.name.clone(),
                                                                     scope: case.scope.clone() }),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                let failure = CaseFailure::from(&err);
                self.log.record(RunEventKind::CaseFailed { step: step.spec.name.clone(),
                                                           scope: case.scope.clone(),
                                                           failure: failure.clone() })?;
                case.fail(failure);
                Ok(())
            }
        }
    }

    fn execute_case(&self,
                    step: &WorkflowStep,
                    step_index: usize,
                    last_step_name: Option<&str>,
                    case: &mut Case)
                    -> Result<(), CoreError> {
        case.state = CaseState::Executing;
        let result = (|| -> Result<(), CoreError> {
            // Sin script de execute el caso cuenta como ejecutado vacuamente.
            if let Some(invocation) = self.invocation(Phase::Execute, step, step_index, last_step_name, case) {
                invocation.run()?;
                for output in &case.expected_outputs {
                    if let Err(issue) = validate_artifact(step.descriptor.output_file, output) {
                        return Err(CoreError::ExternalApplication {
                            phase: Phase::Execute,
                            exit: Some(0),
                            detail: format!("declared output {} invalid: {issue}", output.display()),
                        });
                    }
                }
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                case.state = CaseState::Executed;
                self.log.record(RunEventKind::CaseExecuted {
                    step: step.spec.name.clone(),
                    scope: case.scope.clone(),
                    fingerprint: case.fingerprint.clone().unwrap_or_default(),
                    linked_to: None,
                })
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                let failure = CaseFailure::from(&err);
                self.log.record(RunEventKind::CaseFailed { step: step.spec.name.clone(),
                                                           scope: case.scope.clone(),
                                                           failure: failure.clone() })?;
                case.fail(failure);
                Ok(())
            }
        }
    }

    fn link_case(&self, step: &WorkflowStep, case: &mut Case, owner: &ScopeUnit, owner_ok: bool)
                 -> Result<(), CoreError> {
        if !owner_ok {
            let failure = CaseFailure { kind: "external_application".to_string(),
                                        detail: format!("fingerprint owner {owner} failed to execute") };
            self.log.record(RunEventKind::CaseFailed { step: step.spec.name.clone(),
                                                       scope: case.scope.clone(),
                                                       failure: failure.clone() })?;
            case.fail(failure);
            return Ok(());
        }
        let owner_dir = self.paths.case_dir(&owner.dir_components(), &step.spec.name);
        for output in &case.expected_outputs {
            let name = output.file_name().ok_or_else(|| {
                                              CoreError::Manifest(format!("output without file name: {}",
                                                                          output.display()))
                                          })?;
            let source = owner_dir.join(name);
            if source.is_file() {
                fs::copy(&source, output)?;
            }
        }
        case.state = CaseState::Executed;
        self.log.record(RunEventKind::CaseExecuted { step: step.spec.name.clone(),
                                                     scope: case.scope.clone(),
                                                     fingerprint: case.fingerprint.clone().unwrap_or_default(),
                                                     linked_to: Some(owner.clone()) })
    }

    fn postprocess_case(&self,
                        step: &WorkflowStep,
                        step_index: usize,
                        last_step_name: Option<&str>,
                        case: &mut Case)
                        -> Result<(), CoreError> {
        let result = match self.invocation(Phase::Postprocess, step, step_index, last_step_name, case) {
            Some(invocation) => invocation.run().map(|_| ()),
            None => Ok(()),
        };
        match result {
            Ok(()) => {
                case.state = CaseState::Postprocessed;
                self.log.record(RunEventKind::CasePostprocessed { step: step.spec.name.clone(),
                                                                  scope: case.scope.clone() })
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                let failure = CaseFailure::from(&err);
                self.log.record(RunEventKind::CaseFailed { step: step.spec.name.clone(),
                                                           scope: case.scope.clone(),
                                                           failure: failure.clone() })?;
                case.fail(failure);
                Ok(())
            }
        }
    }

    fn invocation(&self,
                  phase: Phase,
                  step: &WorkflowStep,
                  step_index: usize,
                  last_step_name: Option<&str>,
                  case: &Case)
                  -> Option<PhaseInvocation> {
        PhaseInvocation::prepare(phase,
                                 self.paths,
                                 &step.spec.application,
                                 &step.spec.class,
                                 &step.spec.name,
                                 step_index,
                                 last_step_name,
                                 &case.scope.build,
                                 &case.dir,
                                 step.spec.options(phase),
                                 step.spec.executable.as_deref())
    }
}

/// `true` si `coarse` cubre a `fine`: mismo build y cada campo poblado de
/// `coarse` coincide con el de `fine`.
pub fn scope_covers(coarse: &ScopeUnit, fine: &ScopeUnit) -> bool {
    if coarse.build != fine.build {
        return false;
    }
    let part_ok = coarse.part.is_none() || coarse.part == fine.part;
    let region_ok = coarse.region.is_none() || coarse.region == fine.region;
    let layer_ok = coarse.layer.is_none() || coarse.layer == fine.layer;
    part_ok && region_ok && layer_ok
}

/// `true` si todas las salidas existen y pasan la validación de cabecera
/// del tipo declarado.
fn outputs_valid(kind: FileKind, outputs: &[std::path::PathBuf]) -> bool {
    !outputs.is_empty() && outputs.iter().all(|p| validate_artifact(kind, p).is_ok())
}

/// Escribe el documento `case_data.yaml` de un caso.
pub fn write_case_document(path: &Path, step: &WorkflowStep, case: &Case) -> Result<(), CoreError> {
    let doc = CaseDocument { build: case.scope.build.clone(),
                             part: case.scope.part.clone(),
                             region: case.scope.region.clone(),
                             layer: case.scope.layer,
                             step_name: step.spec.name.clone(),
                             class: step.spec.class.clone(),
                             application: step.spec.application.clone(),
                             metadata: case.metadata.clone(),
                             configure: step.spec.configure.clone(),
                             execute: step.spec.execute.clone(),
                             postprocess: step.spec.postprocess.clone(),
                             input_files: case.input_files.clone(),
                             expected_outputs: case.expected_outputs.clone() };
    let text = serde_yaml::to_string(&doc).map_err(|e| CoreError::Manifest(e.to_string()))?;
    fs::write(path, text)?;
    Ok(())
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<(), CoreError> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            fs::create_dir_all(&target)?;
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
