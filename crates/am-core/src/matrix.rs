//! Expansión de la matriz de casos de un step.
//!
//! El nivel más fino declarado por la clase del componente determina la
//! granularidad: un step de nivel part produce un caso por part; uno de
//! nivel layer produce un caso por (part, layer) o (part, region, layer) si
//! hay regiones filtradas. El orden de emisión es siempre part, layer
//! ascendente, region.
use indexmap::IndexMap;

use am_domain::tree::{BuildTree, PartNode};
use am_domain::{ScopeLevel, ScopeUnit};

/// Árbol efectivo a correr más los scopes pedidos que no existen.
///
/// Un filtro que nombra un part/region/layer ausente no aborta nada: el
/// scope ausente se devuelve en `missing` para que falle solo su caso,
/// mientras el resto del árbol sigue expandiéndose.
#[derive(Debug, Clone, Default)]
pub struct EffectiveTree {
    pub tree: BuildTree,
    /// Scopes pedidos por el manifiesto que la base de datos no publica,
    /// con el detalle de qué falta.
    pub missing: Vec<(ScopeUnit, String)>,
}

/// Recorta el árbol de la base de datos con los filtros del manifiesto.
/// Filtros vacíos significan "todo".
pub fn effective_tree(db_tree: &BuildTree, filters: &IndexMap<String, PartNode>) -> EffectiveTree {
    if filters.is_empty() {
        return EffectiveTree { tree: db_tree.clone(),
                               missing: Vec::new() };
    }
    let mut parts = IndexMap::new();
    let mut missing = Vec::new();
    for (part_name, filter) in filters {
        let part_scope = ScopeUnit::build(&db_tree.name).with_part(part_name);
        let Some(db_part) = db_tree.parts.get(part_name) else {
            missing.push((part_scope,
                          format!("part '{part_name}' not present in build '{}'", db_tree.name)));
            continue;
        };
        let layers = restrict_layers(&db_part.layers, &filter.layers, &part_scope, part_name, "part",
                                     &mut missing);
        let mut regions = IndexMap::new();
        for (region_name, region_filter) in &filter.regions {
            let region_scope = part_scope.clone().with_region(region_name);
            let Some(db_region) = db_part.regions.get(region_name) else {
                missing.push((region_scope,
                              format!("region '{region_name}' not present in part '{part_name}'")));
                continue;
            };
            let region_layers = restrict_layers(&db_region.layers, &region_filter.layers, &region_scope,
                                                region_name, "region", &mut missing);
            regions.insert(region_name.clone(), am_domain::tree::RegionNode { layers: region_layers });
        }
        parts.insert(part_name.clone(), PartNode { layers, regions });
    }
    EffectiveTree { tree: BuildTree { name: db_tree.name.clone(),
                                      parts },
                    missing }
}

/// Capa pedida y ausente: se aparta a `missing` y se conserva el resto.
fn restrict_layers(available: &[u32],
                   requested: &[u32],
                   scope: &ScopeUnit,
                   name: &str,
                   kind: &str,
                   missing: &mut Vec<(ScopeUnit, String)>)
                   -> Vec<u32> {
    if requested.is_empty() {
        return available.to_vec();
    }
    let mut kept = Vec::with_capacity(requested.len());
    for layer in requested {
        if available.contains(layer) {
            kept.push(*layer);
        } else {
            missing.push((scope.clone().with_layer(*layer),
                          format!("layer {layer} not present in {kind} '{name}'")));
        }
    }
    kept
}

/// Expande los casos de un step al nivel indicado, en orden determinista.
pub fn expand(tree: &BuildTree, level: ScopeLevel) -> Vec<ScopeUnit> {
    let mut scopes = Vec::new();
    match level {
        ScopeLevel::Build => scopes.push(ScopeUnit::build(&tree.name)),
        ScopeLevel::Part => {
            for part in tree.part_names_sorted() {
                scopes.push(ScopeUnit::build(&tree.name).with_part(part));
            }
        }
        ScopeLevel::Region => {
            for part in tree.part_names_sorted() {
                let node = &tree.parts[part];
                for region in node.region_names_sorted() {
                    scopes.push(ScopeUnit::build(&tree.name).with_part(part).with_region(region));
                }
            }
        }
        ScopeLevel::Layer => {
            for part in tree.part_names_sorted() {
                let node = &tree.parts[part];
                if node.regions.is_empty() {
                    for layer in node.layers_sorted() {
                        scopes.push(ScopeUnit::build(&tree.name).with_part(part).with_layer(layer));
                    }
                } else {
                    // Con regiones, el caso más fino es (part, region, layer).
                    for region in node.region_names_sorted() {
                        let region_node = &node.regions[region];
                        for layer in region_node.layers_sorted() {
                            scopes.push(ScopeUnit::build(&tree.name).with_part(part)
                                                                    .with_region(region)
                                                                    .with_layer(layer));
                        }
                    }
                }
            }
        }
    }
    scopes.sort();
    scopes
}
