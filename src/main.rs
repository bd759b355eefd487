//! Demo autocontenida del motor: un build en memoria, un step sin scripts
//! de fase (ejecución vacua) y deduplicación de layers físicamente
//! idénticos.
use std::fs;

use am_core::{ComponentDescriptor, ComponentRegistry, Engine, FileKind, InMemoryDatabase, RunPaths, StepFilter};
use am_domain::tree::{BuildTree, PartNode};
use am_domain::{MetadataKind, MetadataValue, ScopeLevel, ScopeUnit};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let root = std::env::temp_dir().join("amflow-demo");
    let _ = fs::remove_dir_all(&root);
    let install = root.join("install");
    let interfaces = install.join("interfaces");
    // Directorio de interfaz vacío: sin scripts, las tres fases se omiten.
    fs::create_dir_all(interfaces.join("demo_thermal/demo_app"))?;
    let workspace = root.join("work");
    fs::create_dir_all(&workspace)?;

    let manifest_path = root.join("input.yaml");
    fs::write(&manifest_path,
              "steps:\n  - name: thermal\n    class: demo_thermal\n    application: demo_app\n    execute:\n      np: 4\ndata:\n  datatype: demo\n  path: /dev/null\n")?;

    let mut tree = BuildTree::new("B1");
    tree.parts.insert("P1".into(), PartNode { layers: vec![1, 2],
                                              regions: Default::default() });
    tree.parts.insert("P2".into(), PartNode { layers: vec![1],
                                              regions: Default::default() });
    let mut db = InMemoryDatabase::new(tree);
    // P1 y P2 con potencias distintas: los dos layers de P1 colapsan a un
    // solo caso ejecutado; P2 ejecuta por separado.
    db.set(MetadataKind::LaserPower,
           ScopeUnit::build("B1").with_part("P1"),
           MetadataValue::scalar(280.0, "W"));
    db.set(MetadataKind::LaserPower,
           ScopeUnit::build("B1").with_part("P2"),
           MetadataValue::scalar(195.0, "W"));
    db.set(MetadataKind::Material, ScopeUnit::build("B1"), MetadataValue::text("IN625"));

    let mut registry = ComponentRegistry::new();
    registry.register(ComponentDescriptor { class_name: "demo_thermal",
                                            input_file: None,
                                            output_file: FileKind::Gv,
                                            requirements: vec![MetadataKind::LaserPower,
                                                               MetadataKind::Material],
                                            levels: vec![ScopeLevel::Part, ScopeLevel::Layer],
                                            operational_params: vec![] });

    let paths = RunPaths::new(install, interfaces, workspace);
    let engine = Engine { paths: &paths,
                          db: &db,
                          registry: &registry };

    engine.configure(&manifest_path)?;
    let summary = engine.run(&manifest_path, &StepFilter::default())?;
    println!("ejecutados={} enlazados={} fallidos={}",
             summary.executed, summary.linked, summary.failed);
    for report in &summary.reports {
        match &report.linked_to {
            Some(owner) => println!("  {} -> enlazado a {owner}", report.scope),
            None => println!("  {} -> {}", report.scope, report.state),
        }
    }
    Ok(())
}
