use serde_json::{Map, Value};

use super::settings::RetrievalSettings;
use crate::core::errors::ApiError;

pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65_535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
    }

    if let Some(auth) = expect_optional_object(root, "auth")? {
        validate_non_empty_string_field(auth, "auth.jwt_secret", "jwt_secret")?;
        validate_one_of(
            auth,
            "auth.jwt_algorithm",
            "jwt_algorithm",
            &["HS256", "HS384", "HS512"],
        )?;
    }

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_non_empty_string_field(llm, "llm.base_url", "base_url")?;
        validate_optional_string_field(llm, "llm.api_key", "api_key")?;
        validate_non_empty_string_field(llm, "llm.model", "model")?;
        validate_f64_field(llm, "llm.temperature", "temperature", 0.0, 2.0)?;
        validate_u64_field(llm, "llm.max_tokens", "max_tokens", 1, 32_768)?;
        validate_u64_field(llm, "llm.timeout_secs", "timeout_secs", 1, 3_600)?;
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_one_of(
            embedding,
            "embedding.provider",
            "provider",
            &["hash", "openai", "openai_compatible"],
        )?;
        validate_optional_string_field(embedding, "embedding.base_url", "base_url")?;
        validate_non_empty_string_field(embedding, "embedding.model", "model")?;
        validate_u64_field(embedding, "embedding.dimensions", "dimensions", 8, 8_192)?;
    }

    if let Some(vector) = expect_optional_object(root, "vector")? {
        validate_one_of(vector, "vector.backend", "backend", &["sqlite", "memory"])?;
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_u64_field(retrieval, "retrieval.default_k", "default_k", 1, 50)?;
        validate_u64_field(retrieval, "retrieval.max_k", "max_k", 1, 1_000)?;
        validate_u64_field(
            retrieval,
            "retrieval.context_max_chars",
            "context_max_chars",
            100,
            1_000_000,
        )?;
        validate_u64_field(
            retrieval,
            "retrieval.chunk_max_chars",
            "chunk_max_chars",
            2,
            1_000_000,
        )?;
        validate_u64_field(
            retrieval,
            "retrieval.snippet_chars",
            "snippet_chars",
            1,
            100_000,
        )?;

        let defaults = RetrievalSettings::default();
        let default_k = retrieval
            .get("default_k")
            .and_then(Value::as_u64)
            .unwrap_or(defaults.default_k as u64);
        let max_k = retrieval
            .get("max_k")
            .and_then(Value::as_u64)
            .unwrap_or(defaults.max_k as u64);
        if default_k > max_k {
            return Err(ApiError::Validation(
                "Invalid config at 'retrieval.default_k': must not exceed max_k".to_string(),
            ));
        }
    }

    if let Some(ingestion) = expect_optional_object(root, "ingestion")? {
        validate_u64_field(ingestion, "ingestion.batch_size", "batch_size", 1, 100_000)?;
        validate_u64_field(ingestion, "ingestion.chunk_size", "chunk_size", 1, 1_000_000)?;
        validate_u64_field(
            ingestion,
            "ingestion.chunk_overlap",
            "chunk_overlap",
            0,
            1_000_000,
        )?;
        validate_bool_field(
            ingestion,
            "ingestion.compensate_on_index_failure",
            "compensate_on_index_failure",
        )?;
        validate_u64_field(
            ingestion,
            "ingestion.reconcile_interval_secs",
            "reconcile_interval_secs",
            0,
            604_800,
        )?;
        validate_u64_field(
            ingestion,
            "ingestion.max_upload_bytes",
            "max_upload_bytes",
            1,
            1_073_741_824,
        )?;

        let chunk_size = ingestion.get("chunk_size").and_then(Value::as_u64);
        let overlap = ingestion.get("chunk_overlap").and_then(Value::as_u64);
        if let (Some(size), Some(overlap)) = (chunk_size, overlap) {
            if overlap >= size {
                return Err(ApiError::Validation(
                    "Invalid config at 'ingestion.chunk_overlap': must be smaller than chunk_size"
                        .to_string(),
                ));
            }
        }
    }

    if let Some(sessions) = expect_optional_object(root, "sessions")? {
        validate_u64_field(
            sessions,
            "sessions.recency_window_hours",
            "recency_window_hours",
            1,
            8_760,
        )?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(ApiError::Validation(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if number < min || number > max {
        return Err(ApiError::Validation(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_non_empty_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(ApiError::Validation(format!(
            "Invalid config at '{}': value cannot be empty",
            path
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.is_null() || value.as_str().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "string"))
}

fn validate_one_of(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    allowed: &[&str],
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if allowed.contains(&text) {
        return Ok(());
    }
    Err(ApiError::Validation(format!(
        "Invalid config at '{}': expected one of {}",
        path,
        allowed.join(", ")
    )))
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(ApiError::Validation(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::Validation(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}
