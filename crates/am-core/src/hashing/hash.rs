//! Hash helpers – abstracción para poder cambiar de algoritmo sin tocar el
//! resto del motor.
use blake3::Hasher;
use serde_json::Value;

use super::to_canonical_json;

/// Hashea un string y devuelve hex.
pub fn hash_str(input: &str) -> String {
    let mut h = Hasher::new();
    h.update(input.as_bytes());
    h.finalize().to_hex().to_string()
}

/// Hashea un `Value` sobre su forma canónica.
pub fn hash_value(value: &Value) -> String {
    hash_str(&to_canonical_json(value))
}

/// Checksum de contenido de un fichero, en streaming.
pub fn hash_file(path: &std::path::Path) -> std::io::Result<String> {
    let mut h = Hasher::new();
    let mut file = std::fs::File::open(path)?;
    std::io::copy(&mut file, &mut h)?;
    Ok(h.finalize().to_hex().to_string())
}
