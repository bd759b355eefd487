//! Fingerprint físico de un caso y el índice de deduplicación.
//!
//! El fingerprint hashea la identidad física del caso: clase, aplicación,
//! opciones de fase filtradas de parámetros operativos, metadatos resueltos
//! y checksums de los ficheros de entrada. Deliberadamente NO incluye el
//! scope: dos layers con la misma física deben colapsar al mismo digest.
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use am_domain::{MetadataBundle, MetadataValue, ScopeUnit};

use crate::component::{ComponentDescriptor, ComponentRegistry};
use crate::hashing::{hash_file, hash_str, to_canonical_json};
use crate::manifest::{OptionMap, StepSpec};

/// Payload serializable que define la identidad física de un caso.
#[derive(Debug, Serialize)]
pub struct FingerprintInput {
    pub class: String,
    pub application: String,
    pub configure: OptionMap,
    pub execute: OptionMap,
    pub postprocess: OptionMap,
    /// Metadatos resueltos; los de tipo fichero entran por checksum de
    /// contenido, nunca por ruta: dos layers con scanpaths idénticos deben
    /// colapsar aunque vivan en directorios distintos.
    pub metadata: IndexMap<String, Value>,
    /// Checksums de contenido de los inputs heredados, ordenados para que
    /// el orden de descubrimiento no altere el digest.
    pub input_checksums: Vec<String>,
}

impl FingerprintInput {
    pub fn new(step: &StepSpec,
               descriptor: &ComponentDescriptor,
               metadata: &MetadataBundle,
               mut input_checksums: Vec<String>)
               -> std::io::Result<Self> {
        input_checksums.sort_unstable();
        Ok(Self { class: step.class.clone(),
                  application: step.application.clone(),
                  configure: filter_operational(&step.configure, descriptor),
                  execute: filter_operational(&step.execute, descriptor),
                  postprocess: filter_operational(&step.postprocess, descriptor),
                  metadata: normalize_metadata(metadata)?,
                  input_checksums })
    }

    /// Texto canónico del payload. Se guarda junto al digest para detectar
    /// colisiones reales del hash.
    pub fn canonical(&self) -> String {
        let value: Value = serde_json::to_value(self).unwrap_or(Value::Null);
        to_canonical_json(&value)
    }

    pub fn digest(&self) -> String {
        hash_str(&self.canonical())
    }
}

/// Forma hasheable de los metadatos: escalares y textos tal cual, ficheros
/// por checksum de contenido.
fn normalize_metadata(metadata: &MetadataBundle) -> std::io::Result<IndexMap<String, Value>> {
    let mut out = IndexMap::with_capacity(metadata.len());
    for (key, value) in metadata {
        let normalized = match value {
            MetadataValue::FileRef { local, .. } => {
                serde_json::json!({ "file_checksum": hash_file(local)? })
            }
            other => serde_json::to_value(other).unwrap_or(Value::Null),
        };
        out.insert(key.clone(), normalized);
    }
    Ok(out)
}

fn filter_operational(options: &OptionMap, descriptor: &ComponentDescriptor) -> OptionMap {
    options.iter()
           .filter(|(k, _)| !ComponentRegistry::is_operational(descriptor, k))
           .map(|(k, v)| (k.clone(), v.clone()))
           .collect()
}

/// Resultado de reclamar un digest dentro de un step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Primer caso con este digest: ejecuta de verdad.
    Claimed,
    /// Digest ya reclamado con el mismo payload canónico: enlaza los
    /// resultados del dueño en vez de ejecutar.
    Equivalent { owner: ScopeUnit },
    /// Digest igual, payload canónico distinto. Fatal.
    Collision,
}

#[derive(Debug)]
struct Claim {
    canonical: String,
    owner: ScopeUnit,
}

/// Índice concurrente de digests reclamados dentro de un step. Seguro para
/// el fan-out en paralelo de los casos.
#[derive(Debug, Default)]
pub struct FingerprintIndex {
    claims: DashMap<String, Claim>,
}

impl FingerprintIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, digest: &str, canonical: &str, scope: &ScopeUnit) -> ClaimOutcome {
        let entry = self.claims
                        .entry(digest.to_string())
                        .or_insert_with(|| Claim { canonical: canonical.to_string(),
                                                   owner: scope.clone() });
        if entry.owner == *scope {
            ClaimOutcome::Claimed
        } else if entry.canonical == canonical {
            ClaimOutcome::Equivalent { owner: entry.owner.clone() }
        } else {
            ClaimOutcome::Collision
        }
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::FileKind;
    use am_domain::{MetadataKind, MetadataValue, ScopeLevel};
    use serde_json::json;

    fn descriptor() -> ComponentDescriptor {
        ComponentDescriptor { class_name: "solidification_part",
                              input_file: None,
                              output_file: FileKind::Gv,
                              requirements: vec![MetadataKind::LaserPower],
                              levels: vec![ScopeLevel::Part, ScopeLevel::Layer],
                              operational_params: vec![] }
    }

    fn step(np: i64, power: f64) -> (StepSpec, MetadataBundle) {
        let mut step = StepSpec { name: "solidification".into(),
                                  class: "solidification_part".into(),
                                  application: "thesis".into(),
                                  depends_on: None,
                                  executable: None,
                                  configure: OptionMap::new(),
                                  execute: OptionMap::new(),
                                  postprocess: OptionMap::new() };
        step.execute.insert("np".into(), json!(np));
        step.execute.insert("res".into(), json!(1e-5));
        let mut metadata = MetadataBundle::new();
        metadata.insert("laser_power".into(), MetadataValue::scalar(power, "W"));
        (step, metadata)
    }

    #[test]
    fn operational_params_do_not_affect_digest() {
        let d = descriptor();
        let (s1, m1) = step(4, 200.0);
        let (s2, m2) = step(32, 200.0);
        let a = FingerprintInput::new(&s1, &d, &m1, vec![]).expect("fingerprint");
        let b = FingerprintInput::new(&s2, &d, &m2, vec![]).expect("fingerprint");
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn physical_params_change_the_digest() {
        let d = descriptor();
        let (s1, m1) = step(4, 200.0);
        let (s2, m2) = step(4, 250.0);
        let a = FingerprintInput::new(&s1, &d, &m1, vec![]).expect("fingerprint");
        let b = FingerprintInput::new(&s2, &d, &m2, vec![]).expect("fingerprint");
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn integer_and_float_forms_collapse() {
        let d = descriptor();
        let (mut s1, m) = step(4, 200.0);
        let (mut s2, _) = step(4, 200.0);
        s1.execute.insert("power".into(), json!(200));
        s2.execute.insert("power".into(), json!(200.0));
        let a = FingerprintInput::new(&s1, &d, &m, vec![]).expect("fingerprint");
        let b = FingerprintInput::new(&s2, &d, &m, vec![]).expect("fingerprint");
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn input_checksum_order_is_irrelevant() {
        let d = descriptor();
        let (s, m) = step(4, 200.0);
        let a = FingerprintInput::new(&s, &d, &m, vec!["aaa".into(), "bbb".into()]).expect("fingerprint");
        let b = FingerprintInput::new(&s, &d, &m, vec!["bbb".into(), "aaa".into()]).expect("fingerprint");
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn file_metadata_hashes_by_content_not_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = dir.path().join("case1/scan.txt");
        let second = dir.path().join("case2/scan.txt");
        std::fs::create_dir_all(first.parent().expect("parent")).expect("mkdir");
        std::fs::create_dir_all(second.parent().expect("parent")).expect("mkdir");
        std::fs::write(&first, "1,0.0,0.0").expect("write");
        std::fs::write(&second, "1,0.0,0.0").expect("write");

        let d = descriptor();
        let (s, mut m1) = step(4, 200.0);
        let mut m2 = m1.clone();
        m1.insert("scanpath".into(), MetadataValue::file(&first, "/db/scan.txt"));
        m2.insert("scanpath".into(), MetadataValue::file(&second, "/db/scan.txt"));
        let a = FingerprintInput::new(&s, &d, &m1, vec![]).expect("fingerprint");
        let b = FingerprintInput::new(&s, &d, &m2, vec![]).expect("fingerprint");
        assert_eq!(a.digest(), b.digest());

        std::fs::write(&second, "2,9.9,9.9").expect("rewrite");
        let c = FingerprintInput::new(&s, &d, &m2, vec![]).expect("fingerprint");
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn index_claims_then_links_equivalents() {
        let index = FingerprintIndex::new();
        let first = ScopeUnit::build("B").with_part("P1").with_layer(1);
        let second = ScopeUnit::build("B").with_part("P1").with_layer(2);
        assert_eq!(index.claim("d1", "{}", &first), ClaimOutcome::Claimed);
        assert_eq!(index.claim("d1", "{}", &second),
                   ClaimOutcome::Equivalent { owner: first.clone() });
        // Re-reclamar el mismo scope sigue siendo dueño.
        assert_eq!(index.claim("d1", "{}", &first), ClaimOutcome::Claimed);
    }

    #[test]
    fn canonical_mismatch_is_a_collision() {
        let index = FingerprintIndex::new();
        let first = ScopeUnit::build("B").with_part("P1").with_layer(1);
        let second = ScopeUnit::build("B").with_part("P1").with_layer(2);
        index.claim("d1", r#"{"a":1}"#, &first);
        assert_eq!(index.claim("d1", r#"{"a":2}"#, &second), ClaimOutcome::Collision);
    }
}
