//! Árbol de metadatos del build tal como lo publica la base de datos.
//!
//! `build -> parts -> {layers, regions -> layers}`. Los mapas son `IndexMap`
//! para preservar el orden de inserción del lector; los accesores `*_sorted`
//! dan el orden determinista que usa el generador de la matriz de casos.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionNode {
    #[serde(default)]
    pub layers: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartNode {
    #[serde(default)]
    pub layers: Vec<u32>,
    #[serde(default)]
    pub regions: IndexMap<String, RegionNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildTree {
    pub name: String,
    #[serde(default)]
    pub parts: IndexMap<String, PartNode>,
}

impl BuildTree {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(),
               parts: IndexMap::new() }
    }

    pub fn part(&self, name: &str) -> Option<&PartNode> {
        self.parts.get(name)
    }

    pub fn part_names_sorted(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.parts.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl PartNode {
    pub fn layers_sorted(&self) -> Vec<u32> {
        let mut layers = self.layers.clone();
        layers.sort_unstable();
        layers.dedup();
        layers
    }

    pub fn region_names_sorted(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.regions.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl RegionNode {
    pub fn layers_sorted(&self) -> Vec<u32> {
        let mut layers = self.layers.clone();
        layers.sort_unstable();
        layers.dedup();
        layers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BuildTree {
        let mut tree = BuildTree::new("B1");
        tree.parts.insert("P2".into(), PartNode { layers: vec![1],
                                                  regions: IndexMap::new() });
        tree.parts.insert("P1".into(), PartNode { layers: vec![2, 1, 2],
                                                  regions: IndexMap::new() });
        tree
    }

    #[test]
    fn part_names_come_back_sorted() {
        assert_eq!(sample().part_names_sorted(), vec!["P1", "P2"]);
    }

    #[test]
    fn layers_are_sorted_and_deduplicated() {
        let tree = sample();
        assert_eq!(tree.part("P1").expect("P1 exists").layers_sorted(), vec![1, 2]);
    }

    #[test]
    fn tree_round_trips_through_json() {
        let tree = sample();
        let text = serde_json::to_string(&tree).expect("serialize");
        let back: BuildTree = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(back, tree);
    }
}
