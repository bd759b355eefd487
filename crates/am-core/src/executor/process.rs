//! Invocación de un script de fase como subproceso.
//!
//! Contrato uniforme: el script se lanza con `cwd` en el directorio del
//! caso, las opciones de fase como flags `--clave valor` (los booleanos
//! `true` son flags de presencia, los `false` se omiten) y el contexto del
//! run en variables de entorno `AMFLOW_*`. Los placeholders `{name}`,
//! `{build}`, `$AMFLOW_INSTALL_PATH` y `$AMFLOW_INTERFACE_PATH` se expanden
//! en los valores antes de pasar nada al proceso.
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::errors::CoreError;
use crate::manifest::OptionMap;
use crate::paths::{substitute_placeholders, RunPaths, ENV_INSTALL_PATH, ENV_INTERFACE_PATH, ENV_LAST_STEP_NAME,
                   ENV_STEP_INDEX, ENV_STEP_NAME};

use super::Phase;

#[derive(Debug)]
pub struct PhaseOutcome {
    pub stdout: String,
    pub stderr: String,
}

/// Una invocación lista para correr: script, argumentos y entorno.
#[derive(Debug)]
pub struct PhaseInvocation {
    pub phase: Phase,
    pub script: PathBuf,
    pub case_dir: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl PhaseInvocation {
    /// Prepara la invocación de `phase` para un caso. Devuelve `None` si la
    /// interfaz no trae script para esa fase.
    #[allow(clippy::too_many_arguments)]
    pub fn prepare(phase: Phase,
                   paths: &RunPaths,
                   application: &str,
                   class: &str,
                   step_name: &str,
                   step_index: usize,
                   last_step_name: Option<&str>,
                   build: &str,
                   case_dir: &Path,
                   options: &OptionMap,
                   executable: Option<&str>)
                   -> Option<Self> {
        let script = paths.interface_dir(class, application).join(phase.script_name());
        if !script.is_file() {
            return None;
        }

        let mut args = Vec::new();
        for (key, value) in options {
            match value {
                Value::Bool(true) => args.push(format!("--{key}")),
                Value::Bool(false) => {}
                other => {
                    args.push(format!("--{key}"));
                    args.push(substitute_placeholders(&render_value(other), paths, step_name, build));
                }
            }
        }
        if let Some(exe) = executable {
            args.push("--exec".to_string());
            args.push(substitute_placeholders(exe, paths, step_name, build));
        }

        let mut env = vec![(ENV_INTERFACE_PATH.to_string(), paths.interfaces_root.to_string_lossy().into_owned()),
                           (ENV_INSTALL_PATH.to_string(), paths.install_root.to_string_lossy().into_owned()),
                           (ENV_STEP_NAME.to_string(), step_name.to_string()),
                           (ENV_STEP_INDEX.to_string(), step_index.to_string())];
        if let Some(last) = last_step_name {
            env.push((ENV_LAST_STEP_NAME.to_string(), last.to_string()));
        }

        Some(Self { phase,
                    script,
                    case_dir: case_dir.to_path_buf(),
                    args,
                    env })
    }

    pub fn run(&self) -> Result<PhaseOutcome, CoreError> {
        let output = Command::new(&self.script).args(&self.args)
                                               .current_dir(&self.case_dir)
                                               .envs(self.env.iter().map(|(k, v)| (k, v)))
                                               .output()
                                               .map_err(|e| CoreError::ExternalApplication {
                                                   phase: self.phase,
                                                   exit: None,
                                                   detail: format!("failed to spawn {}: {e}",
                                                                   self.script.display()),
                                               })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(CoreError::ExternalApplication { phase: self.phase,
                                                        exit: output.status.code(),
                                                        detail: tail(&stderr, 20) });
        }
        Ok(PhaseOutcome { stdout, stderr })
    }
}

/// Valor de opción como argumento plano: los strings van sin comillas, el
/// resto en su forma JSON compacta.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    fn paths(root: &Path) -> RunPaths {
        RunPaths::new(root.join("install"), root.join("install/interfaces"), root.join("work"))
    }

    fn install_script(paths: &RunPaths, phase: Phase, body: &str) {
        let dir = paths.interface_dir("test_class", "test_app");
        fs::create_dir_all(&dir).expect("mkdir");
        let script = dir.join(phase.script_name());
        fs::write(&script, format!("#!/bin/sh\n{body}\n")).expect("write script");
        #[cfg(unix)]
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");
    }

    fn prepare(paths: &RunPaths, case_dir: &Path, options: &OptionMap, executable: Option<&str>)
               -> Option<PhaseInvocation> {
        PhaseInvocation::prepare(Phase::Execute,
                                 paths,
                                 "test_app",
                                 "test_class",
                                 "solidification",
                                 1,
                                 Some("meshing"),
                                 "B1",
                                 case_dir,
                                 options,
                                 executable)
    }

    #[test]
    fn absent_script_yields_no_invocation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = paths(dir.path());
        assert!(prepare(&paths, dir.path(), &OptionMap::new(), None).is_none());
    }

    #[test]
    fn bool_options_are_presence_flags() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = paths(dir.path());
        install_script(&paths, Phase::Execute, "exit 0");
        let mut options = OptionMap::new();
        options.insert("verbose".into(), json!(true));
        options.insert("quiet".into(), json!(false));
        options.insert("np".into(), json!(4));
        let inv = prepare(&paths, dir.path(), &options, None).expect("script installed");
        assert_eq!(inv.args, vec!["--verbose", "--np", "4"]);
    }

    #[test]
    fn exec_override_is_appended() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = paths(dir.path());
        install_script(&paths, Phase::Execute, "exit 0");
        let inv = prepare(&paths, dir.path(), &OptionMap::new(), Some("$AMFLOW_INSTALL_PATH/bin/solver"))
            .expect("script installed");
        assert_eq!(inv.args[0], "--exec");
        assert_eq!(inv.args[1], format!("{}/bin/solver", paths.install_root.display()));
    }

    #[cfg(unix)]
    #[test]
    fn run_captures_cwd_env_and_args() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = paths(dir.path());
        install_script(&paths, Phase::Execute, "pwd; echo \"$AMFLOW_STEP_NAME/$AMFLOW_STEP_INDEX\"; echo \"$@\"");
        let case_dir = dir.path().join("work/B1/P1/solidification");
        fs::create_dir_all(&case_dir).expect("mkdir case");
        let mut options = OptionMap::new();
        options.insert("res".into(), json!(1e-5));
        let inv = prepare(&paths, &case_dir, &options, None).expect("script installed");
        let out = inv.run().expect("phase runs");
        assert!(out.stdout.contains("solidification/1"), "{}", out.stdout);
        assert!(out.stdout.contains("--res"), "{}", out.stdout);
        assert!(out.stdout.contains(&case_dir.display().to_string()), "{}", out.stdout);
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_maps_to_external_application_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = paths(dir.path());
        install_script(&paths, Phase::Execute, "echo boom >&2; exit 3");
        let inv = prepare(&paths, dir.path(), &OptionMap::new(), None).expect("script installed");
        match inv.run() {
            Err(CoreError::ExternalApplication { exit, detail, .. }) => {
                assert_eq!(exit, Some(3));
                assert!(detail.contains("boom"), "{detail}");
            }
            other => panic!("expected ExternalApplication, got {other:?}"),
        }
    }
}
