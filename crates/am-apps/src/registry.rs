//! Clases de componente de serie.
//!
//! Cada clase declara sus requisitos de metadatos, los niveles de scope
//! sobre los que opera, sus tipos de fichero de entrada/salida y los
//! parámetros puramente operativos que se excluyen del fingerprint además
//! del conjunto global.
use am_core::{ComponentDescriptor, ComponentRegistry, FileKind};
use am_domain::MetadataKind::{self, *};
use am_domain::ScopeLevel::{self, *};

fn descriptor(class_name: &'static str,
              input_file: Option<FileKind>,
              output_file: FileKind,
              requirements: &[MetadataKind],
              levels: &[ScopeLevel],
              operational_params: &[&'static str])
              -> ComponentDescriptor {
    ComponentDescriptor { class_name,
                          input_file,
                          output_file,
                          requirements: requirements.to_vec(),
                          levels: levels.to_vec(),
                          operational_params: operational_params.to_vec() }
}

/// Registro con todas las clases de serie.
pub fn builtin_registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();
    registry.register(descriptor("mesh_part", None, FileKind::Vtk, &[PartStl], &[Part], &[]));
    registry.register(descriptor("melt_pool_geometry_part",
                                 None,
                                 FileKind::MeltPoolGeometry,
                                 &[LaserPower, SpotSize, LayerThickness, PreheatTemperature, Scanpath],
                                 &[Part, Layer],
                                 &[]));
    registry.register(descriptor("solidification_part",
                                 None,
                                 FileKind::Gv,
                                 &[LaserPower, SpotSize, LayerThickness, PreheatTemperature, Material,
                                   Scanpath],
                                 &[Build, Part, Layer],
                                 &[]));
    registry.register(descriptor("solidification_part_reduced",
                                 None,
                                 FileKind::ReducedSolidification,
                                 &[LaserPower, SpotSize, LayerThickness, PreheatTemperature, Material,
                                   Scanpath],
                                 &[Part, Layer],
                                 &[]));
    registry.register(descriptor("solidification_region",
                                 None,
                                 FileKind::Gv,
                                 &[LaserPower, SpotSize, LayerThickness, PreheatTemperature, Material,
                                   Scanpath],
                                 &[Region, Layer],
                                 &[]));
    registry.register(descriptor("rve_selection",
                                 Some(FileKind::ReducedSolidification),
                                 FileKind::Rve,
                                 &[PartIdMap],
                                 &[Part],
                                 // El plot de control no cambia la selección.
                                 &["plot"]));
    registry.register(descriptor("cluster_solidification",
                                 Some(FileKind::ReducedSolidification),
                                 FileKind::ClusterIds,
                                 &[Material],
                                 &[Part, Layer],
                                 &["n_jobs", "plot"]));
    registry.register(descriptor("microstructure_region",
                                 Some(FileKind::Gv),
                                 FileKind::GrainVtk,
                                 &[Material],
                                 &[Region, Layer],
                                 &[]));
    registry
}
