//! Workflow validado: steps del manifiesto resueltos contra el registro de
//! componentes y ordenados topológicamente.
//!
//! Toda la validación estructural (clases desconocidas, dependencias
//! inexistentes, ciclos, incompatibilidad de tipos de fichero) ocurre aquí,
//! antes de crear ningún directorio de caso.
use std::collections::{HashMap, HashSet};

use crate::component::{ComponentDescriptor, ComponentRegistry};
use crate::errors::CoreError;
use crate::manifest::{Manifest, StepSpec};

#[derive(Debug, Clone)]
pub struct WorkflowStep {
    pub spec: StepSpec,
    pub descriptor: ComponentDescriptor,
    /// Step aguas arriba resuelto (explícito o encadenado al anterior).
    pub upstream: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Workflow {
    /// Steps en orden topológico; a igualdad de restricciones se conserva
    /// el orden del manifiesto.
    pub steps: Vec<WorkflowStep>,
}

impl Workflow {
    pub fn from_manifest(manifest: &Manifest, registry: &ComponentRegistry) -> Result<Self, CoreError> {
        let mut names = HashSet::new();
        for step in &manifest.steps {
            if !names.insert(step.name.as_str()) {
                return Err(CoreError::Manifest(format!("duplicate step name '{}'", step.name)));
            }
        }

        let mut resolved = Vec::with_capacity(manifest.steps.len());
        for (idx, spec) in manifest.steps.iter().enumerate() {
            let descriptor = registry.get(&spec.class)?.clone();
            let upstream = match &spec.depends_on {
                Some(name) => {
                    if !names.contains(name.as_str()) {
                        return Err(CoreError::Manifest(format!("step '{}' depends on unknown step '{name}'",
                                                               spec.name)));
                    }
                    if name == &spec.name {
                        return Err(CoreError::Cycle { names: vec![spec.name.clone()] });
                    }
                    Some(name.clone())
                }
                // Sin dependencia explícita: una clase con input se
                // encadena al step anterior del manifiesto.
                None if descriptor.input_file.is_some() => {
                    if idx == 0 {
                        return Err(CoreError::Manifest(format!("step '{}' consumes {} input but is the first \
                                                                step",
                                                               spec.name,
                                                               descriptor.input_file
                                                                         .map(|k| k.to_string())
                                                                         .unwrap_or_default())));
                    }
                    Some(manifest.steps[idx - 1].name.clone())
                }
                None => None,
            };
            resolved.push(WorkflowStep { spec: spec.clone(),
                                         descriptor,
                                         upstream });
        }

        let ordered = topo_order(resolved)?;
        check_file_compatibility(&ordered)?;
        Ok(Self { steps: ordered })
    }

    pub fn step(&self, name: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.spec.name == name)
    }
}

/// Kahn con preferencia por el orden del manifiesto. Los nodos que quedan
/// sin procesar forman el ciclo reportado.
fn topo_order(steps: Vec<WorkflowStep>) -> Result<Vec<WorkflowStep>, CoreError> {
    let index_of: HashMap<String, usize> =
        steps.iter().enumerate().map(|(i, s)| (s.spec.name.clone(), i)).collect();
    let mut indegree = vec![0usize; steps.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
    for (i, step) in steps.iter().enumerate() {
        if let Some(up) = &step.upstream {
            let u = index_of[up.as_str()];
            indegree[i] += 1;
            dependents[u].push(i);
        }
    }

    let mut ready: Vec<usize> = (0..steps.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(steps.len());
    while !ready.is_empty() {
        let i = ready.remove(0);
        order.push(i);
        for &d in &dependents[i] {
            indegree[d] -= 1;
            if indegree[d] == 0 {
                // Inserción ordenada para respetar el orden del manifiesto.
                let pos = ready.binary_search(&d).unwrap_or_else(|p| p);
                ready.insert(pos, d);
            }
        }
    }

    if order.len() != steps.len() {
        let names: Vec<String> = steps.iter()
                                      .enumerate()
                                      .filter(|(i, _)| !order.contains(i))
                                      .map(|(_, s)| s.spec.name.clone())
                                      .collect();
        return Err(CoreError::Cycle { names });
    }

    let mut by_index: Vec<Option<WorkflowStep>> = steps.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| by_index[i].take()).collect())
}

fn check_file_compatibility(steps: &[WorkflowStep]) -> Result<(), CoreError> {
    let by_name: HashMap<&str, &WorkflowStep> = steps.iter().map(|s| (s.spec.name.as_str(), s)).collect();
    for step in steps {
        let (Some(input), Some(up_name)) = (step.descriptor.input_file, &step.upstream) else {
            continue;
        };
        let upstream = by_name[up_name.as_str()];
        if upstream.descriptor.output_file != input {
            return Err(CoreError::Manifest(format!("step '{}' expects {} input but '{}' produces {}",
                                                   step.spec.name,
                                                   input,
                                                   up_name,
                                                   upstream.descriptor.output_file)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::FileKind;
    use crate::manifest::{DataSpec, OptionMap};
    use am_domain::{MetadataKind, ScopeLevel};
    use indexmap::IndexMap;
    use std::path::PathBuf;

    fn registry() -> ComponentRegistry {
        let mut reg = ComponentRegistry::new();
        reg.register(ComponentDescriptor { class_name: "solidification_part",
                                           input_file: None,
                                           output_file: FileKind::Gv,
                                           requirements: vec![MetadataKind::LaserPower],
                                           levels: vec![ScopeLevel::Part, ScopeLevel::Layer],
                                           operational_params: vec![] });
        reg.register(ComponentDescriptor { class_name: "microstructure_region",
                                           input_file: Some(FileKind::Gv),
                                           output_file: FileKind::GrainVtk,
                                           requirements: vec![MetadataKind::Material],
                                           levels: vec![ScopeLevel::Region, ScopeLevel::Layer],
                                           operational_params: vec![] });
        reg.register(ComponentDescriptor { class_name: "mesh_part",
                                           input_file: None,
                                           output_file: FileKind::Vtk,
                                           requirements: vec![MetadataKind::PartStl],
                                           levels: vec![ScopeLevel::Part],
                                           operational_params: vec![] });
        reg
    }

    fn step(name: &str, class: &str, depends_on: Option<&str>) -> StepSpec {
        StepSpec { name: name.into(),
                   class: class.into(),
                   application: "test_app".into(),
                   depends_on: depends_on.map(String::from),
                   executable: None,
                   configure: OptionMap::new(),
                   execute: OptionMap::new(),
                   postprocess: OptionMap::new() }
    }

    fn manifest(steps: Vec<StepSpec>) -> Manifest {
        Manifest { workspace: None,
                   workers: None,
                   steps,
                   data: DataSpec { datatype: "amjson".into(),
                                    path: PathBuf::from("/tmp/db"),
                                    parts: IndexMap::new() },
                   amflow: None,
                   output_paths: IndexMap::new() }
    }

    #[test]
    fn implicit_chaining_uses_previous_step() {
        let m = manifest(vec![step("solid", "solidification_part", None),
                              step("micro", "microstructure_region", None)]);
        let wf = Workflow::from_manifest(&m, &registry()).expect("valid workflow");
        assert_eq!(wf.steps[1].upstream.as_deref(), Some("solid"));
    }

    #[test]
    fn forward_dependency_is_reordered() {
        let m = manifest(vec![step("micro", "microstructure_region", Some("solid")),
                              step("solid", "solidification_part", None)]);
        let wf = Workflow::from_manifest(&m, &registry()).expect("valid workflow");
        let names: Vec<&str> = wf.steps.iter().map(|s| s.spec.name.as_str()).collect();
        assert_eq!(names, vec!["solid", "micro"]);
    }

    #[test]
    fn unknown_class_is_rejected() {
        let m = manifest(vec![step("x", "not_a_class", None)]);
        assert!(matches!(Workflow::from_manifest(&m, &registry()), Err(CoreError::Manifest(_))));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let m = manifest(vec![step("solid", "solidification_part", Some("solid"))]);
        assert!(matches!(Workflow::from_manifest(&m, &registry()), Err(CoreError::Cycle { .. })));
    }

    #[test]
    fn incompatible_file_kinds_are_rejected() {
        // mesh_part produce vtk; microstructure_region consume gv.
        let m = manifest(vec![step("mesh", "mesh_part", None),
                              step("micro", "microstructure_region", Some("mesh"))]);
        let err = Workflow::from_manifest(&m, &registry()).unwrap_err();
        assert!(matches!(err, CoreError::Manifest(_)), "{err}");
    }

    #[test]
    fn input_consuming_first_step_is_rejected() {
        let m = manifest(vec![step("micro", "microstructure_region", None)]);
        assert!(matches!(Workflow::from_manifest(&m, &registry()), Err(CoreError::Manifest(_))));
    }

    #[test]
    fn duplicate_step_names_are_rejected() {
        let m = manifest(vec![step("solid", "solidification_part", None),
                              step("solid", "solidification_part", None)]);
        assert!(matches!(Workflow::from_manifest(&m, &registry()), Err(CoreError::Manifest(_))));
    }
}
