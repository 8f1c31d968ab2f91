use serde_json::Value;

/// Pulls a JSON value out of free-form assistant text. Accepts a bare JSON
/// document, a fenced ```json block, or the outermost `{...}` span.
pub fn extract_json(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let body_start = after_fence.find('\n').map(|index| index + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        if let Some(end) = body.find("```") {
            if let Ok(value) = serde_json::from_str(body[..end].trim()) {
                return Some(value);
            }
        }
    }

    let open = trimmed.find('{')?;
    let close = trimmed.rfind('}')?;
    if close <= open {
        return None;
    }
    serde_json::from_str(&trimmed[open..=close]).ok()
}

/// Validates `value` against a JSON Schema, returning one message per
/// violation prefixed with the instance path.
pub fn validate_against_schema(value: &Value, schema: &Value) -> Result<(), Vec<String>> {
    let compiled = jsonschema::JSONSchema::compile(schema)
        .map_err(|error| vec![format!("invalid schema: {}", error)])?;

    let errors: Vec<String> = compiled
        .validate(value)
        .err()
        .map(|errors| {
            errors
                .map(|error| {
                    let path = error.instance_path.to_string();
                    if path.is_empty() {
                        error.to_string()
                    } else {
                        format!("{}: {}", path, error)
                    }
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
