//! am-domain: modelo del árbol de construcción (build/part/region/layer) y
//! de los requisitos de metadatos que consumen los componentes de simulación.
pub mod errors;
pub mod metadata;
pub mod scope;
pub mod synonyms;
pub mod tree;

pub use errors::DomainError;
pub use metadata::{MetadataBundle, MetadataGranularity, MetadataKind, MetadataValue};
pub use scope::{ScopeLevel, ScopeUnit};
pub use synonyms::{SynonymTable, DEFAULT_SYNONYMS};
pub use tree::{BuildTree, PartNode, RegionNode};
