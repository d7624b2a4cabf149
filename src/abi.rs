//! Solidity JSON ABI ingestion.
//!
//! Turns a compiler ABI (or a build artifact carrying an `abi` field) into
//! canonical signatures in declaration order. Tuple parameters are expanded
//! from their `components`, so `tuple[]` becomes `(address,uint8,bytes4[])[]`.

use serde_json::Value;

use crate::error::CutError;
use crate::types::FunctionSignature;

/// Extract the canonical function signatures from an ABI document.
///
/// Accepts either the ABI array itself or an object with an `abi` array.
/// Non-function entries (events, errors, constructor, fallback, receive)
/// are skipped.
pub fn signatures_from_abi(document: &Value) -> Result<Vec<FunctionSignature>, CutError> {
    let entries = match document {
        Value::Array(entries) => entries,
        Value::Object(map) => map
            .get("abi")
            .and_then(Value::as_array)
            .ok_or_else(|| CutError::Abi("object has no 'abi' array".to_string()))?,
        _ => return Err(CutError::Abi("expected an array or an artifact object".to_string())),
    };

    let mut signatures = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        // Per the ABI format, a missing `type` means "function".
        let kind = entry.get("type").and_then(Value::as_str).unwrap_or("function");
        if kind != "function" {
            continue;
        }

        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| CutError::Abi(format!("entry #{index} has no name")))?;

        let params = match entry.get("inputs") {
            None | Some(Value::Null) => String::new(),
            Some(inputs) => canonical_params(inputs)
                .map_err(|e| CutError::Abi(format!("{name}: {e}")))?,
        };

        signatures.push(FunctionSignature::parse(&format!("{name}({params})"))?);
    }
    Ok(signatures)
}

fn canonical_params(inputs: &Value) -> Result<String, String> {
    let inputs = inputs
        .as_array()
        .ok_or_else(|| "inputs is not an array".to_string())?;

    let types = inputs
        .iter()
        .map(canonical_type)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(types.join(","))
}

fn canonical_type(param: &Value) -> Result<String, String> {
    let ty = param
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| "parameter has no type".to_string())?;

    match ty.strip_prefix("tuple") {
        Some(array_suffix) => {
            let components = param
                .get("components")
                .ok_or_else(|| format!("{ty} parameter has no components"))?;
            Ok(format!("({}){}", canonical_params(components)?, array_suffix))
        }
        None => Ok(ty.to_string()),
    }
}
