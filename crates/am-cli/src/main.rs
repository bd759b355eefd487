use std::path::PathBuf;

use am_apps::builtin_registry;
use am_core::{load_manifest, CaseState, Engine, RunPaths, StepFilter};
use am_db::open_database;

// Códigos de salida: 0 ok, 1 casos fallidos, 2 uso, 3 manifiesto/rutas,
// 4 recurso no encontrado, 5 error interno.
fn main() {
    // Cargar .env si existe para AMFLOW_INSTALL_PATH / AMFLOW_INTERFACE_PATH
    let _ = dotenvy::dotenv();
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        usage();
        std::process::exit(2);
    }
    let command = args[1].as_str();
    if !matches!(command, "config" | "run" | "sync" | "status") {
        eprintln!("[amflow] comando desconocido: {command}");
        usage();
        std::process::exit(2);
    }

    let mut input: Option<PathBuf> = None;
    let mut workspace: Option<PathBuf> = None;
    let mut install: Option<PathBuf> = None;
    let mut interfaces: Option<PathBuf> = None;
    let mut steps: Vec<String> = Vec::new();
    let mut json = false;
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--input" => {
                i += 1;
                if i < args.len() { input = Some(PathBuf::from(&args[i])); }
            }
            "--workspace" => {
                i += 1;
                if i < args.len() { workspace = Some(PathBuf::from(&args[i])); }
            }
            "--install" => {
                i += 1;
                if i < args.len() { install = Some(PathBuf::from(&args[i])); }
            }
            "--interfaces" => {
                i += 1;
                if i < args.len() { interfaces = Some(PathBuf::from(&args[i])); }
            }
            "--step" => {
                i += 1;
                if i < args.len() { steps.push(args[i].clone()); }
            }
            "--json" => json = true,
            other => {
                eprintln!("[amflow {command}] opción desconocida: {other}");
                std::process::exit(2);
            }
        }
        i += 1;
    }

    let Some(input) = input else {
        eprintln!("Uso: amflow {command} --input <manifest.yaml> [--workspace <DIR>] [--install <DIR>] \
                   [--interfaces <DIR>] [--step <NOMBRE>]...");
        std::process::exit(2);
    };

    let install = install.or_else(|| std::env::var("AMFLOW_INSTALL_PATH").ok().map(PathBuf::from));
    let Some(install) = install else {
        eprintln!("[amflow {command}] falta --install o AMFLOW_INSTALL_PATH");
        std::process::exit(2);
    };
    let interfaces = interfaces.or_else(|| std::env::var("AMFLOW_INTERFACE_PATH").ok().map(PathBuf::from))
                               .unwrap_or_else(|| install.join("interfaces"));
    let workspace = workspace.unwrap_or_else(|| {
                                 input.parent().map(|p| p.to_path_buf()).unwrap_or_else(|| PathBuf::from("."))
                             });
    let paths = RunPaths::new(install, interfaces, workspace);

    let manifest = match load_manifest(&input) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("[amflow {command}] manifiesto inválido: {e}");
            std::process::exit(3);
        }
    };
    let db = match open_database(&manifest.data.datatype, &manifest.data.path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("[amflow {command}] base de datos: {e}");
            std::process::exit(4);
        }
    };
    let registry = builtin_registry();
    let engine = Engine { paths: &paths,
                          db: &db,
                          registry: &registry };
    let filter = StepFilter { steps };

    match command {
        "config" => match engine.configure(&input) {
            Ok(summary) => {
                println!("configurado: {} steps, build '{}'",
                         summary.manifest.steps.len(),
                         db_name(&engine));
                for report in &summary.reports {
                    if report.state == CaseState::Failed {
                        eprintln!("  FALLO {}/{}: {}",
                                  report.scope,
                                  report.step_name,
                                  report.error.as_deref().unwrap_or("sin detalle"));
                    }
                }
                std::process::exit(if summary.failed > 0 { 1 } else { 0 });
            }
            Err(e) => {
                eprintln!("[amflow config] error: {e}");
                std::process::exit(3);
            }
        },
        "run" => match engine.run(&input, &filter) {
            Ok(summary) => {
                println!("ejecutados={} enlazados={} reanudados={} fallidos={}",
                         summary.executed, summary.linked, summary.resumed, summary.failed);
                for report in &summary.reports {
                    if report.state == CaseState::Failed {
                        eprintln!("  FALLO {}/{}: {}",
                                  report.scope,
                                  report.step_name,
                                  report.error.as_deref().unwrap_or("sin detalle"));
                    }
                }
                std::process::exit(if summary.failed > 0 { 1 } else { 0 });
            }
            Err(e) => {
                eprintln!("[amflow run] error: {e}");
                std::process::exit(5);
            }
        },
        "sync" => match engine.sync(&input, &filter) {
            Ok(summary) => {
                println!("sincronizados={} fallidos={}", summary.synced, summary.failed);
                std::process::exit(if summary.failed > 0 { 1 } else { 0 });
            }
            Err(e) => {
                eprintln!("[amflow sync] error: {e}");
                std::process::exit(5);
            }
        },
        "status" => match engine.status() {
            Ok(reports) => {
                if json {
                    match serde_json::to_string_pretty(&reports) {
                        Ok(text) => println!("{text}"),
                        Err(e) => {
                            eprintln!("[amflow status] error: {e}");
                            std::process::exit(5);
                        }
                    }
                } else {
                    println!("{:<40} {:<24} {:<14} {}", "CASO", "STEP", "ESTADO", "DETALLE");
                    for report in &reports {
                        let detail = report.linked_to
                                           .as_ref()
                                           .map(|o| format!("enlazado a {o}"))
                                           .or_else(|| report.error.clone())
                                           .unwrap_or_default();
                        println!("{:<40} {:<24} {:<14} {detail}",
                                 report.scope.to_string(),
                                 report.step_name,
                                 report.state.to_string());
                    }
                }
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("[amflow status] error: {e}");
                std::process::exit(5);
            }
        },
        _ => unreachable!(),
    }
}

fn db_name(engine: &Engine<'_>) -> String {
    engine.db.build_name().to_string()
}

fn usage() {
    eprintln!("Uso: amflow <config|run|sync|status> --input <manifest.yaml> [--workspace <DIR>] \
               [--install <DIR>] [--interfaces <DIR>] [--step <NOMBRE>]... [--json]");
}
