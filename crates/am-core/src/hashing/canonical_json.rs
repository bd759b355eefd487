//! JSON canónico: claves ordenadas y formato numérico normalizado.
//!
//! Dos casos con los mismos parámetros físicos deben producir exactamente el
//! mismo texto canónico aunque el manifiesto escriba `200` y la base de
//! datos devuelva `200.0`. Por eso los números se normalizan: los flotantes
//! con valor entero se emiten como enteros y el resto con el formato mínimo
//! de `f64`.
use serde_json::Value;
use std::collections::BTreeMap;

pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => canonical_number(n),
        Value::String(s) => quote(s),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let mut tree = BTreeMap::new();
            for (k, v) in map {
                tree.insert(k, to_canonical_json(v));
            }
            let items: Vec<String> = tree.into_iter()
                                         .map(|(k, v)| format!("{}:{}", quote(k), v))
                                         .collect();
            format!("{{{}}}", items.join(","))
        }
    }
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

fn canonical_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        // Flotante con valor entero -> forma entera ("200.0" == "200").
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => {
            let mut s = format!("{f}");
            // `{}` de f64 ya es la representación mínima; nos aseguramos de
            // no emitir "-0".
            if s == "-0" {
                s = "0".to_string();
            }
            s
        }
        None => n.to_string(),
    }
}
