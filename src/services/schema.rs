// src/services/schema.rs
//
// The output schema declared to the model, and the validator that re-checks
// it. The declared schema is only a hint to the model; everything that comes
// back is treated as untrusted input.
use crate::errors::AnalysisError;
use crate::models::{MotifEntry, PaletteEntry, ProductionOrder};
use log::{debug, warn};
use serde_json::{Map, Value, json};
use std::collections::HashSet;

const TOTAL_TIME_TOLERANCE: f64 = 0.5;

/// JSON schema for a production order, in the OpenAPI subset both providers
/// accept.
pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "orderCode": { "type": "string" },
            "productType": { "type": "string" },
            "fabric": { "type": "string" },
            "theme": { "type": "string" },
            "details": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "sequenceNumber": { "type": "integer" },
                        "motifName": { "type": "string" },
                        "technique": { "type": "string" },
                        "threadCode": { "type": "string" },
                        "colorName": { "type": "string" },
                        "colorHex": { "type": "string" },
                        "timeMinutes": { "type": "number" },
                        "technicalNote": { "type": "string" }
                    },
                    "required": [
                        "sequenceNumber", "motifName", "technique", "threadCode",
                        "colorName", "colorHex", "timeMinutes", "technicalNote"
                    ]
                }
            },
            "totalTimeMinutes": { "type": "number" },
            "palette": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "code": { "type": "string" },
                        "name": { "type": "string" },
                        "hex": { "type": "string" }
                    },
                    "required": ["code", "name", "hex"]
                }
            },
            "qcNote": { "type": "string" }
        },
        "required": [
            "orderCode", "productType", "fabric", "theme",
            "details", "totalTimeMinutes", "palette", "qcNote"
        ]
    })
}

/// Removes a surrounding Markdown code fence (```` ``` ```` or ```` ```json ````).
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `JSON`, ...) up to the first newline.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parses and validates raw model text into a `ProductionOrder`.
pub fn parse_order(text: &str) -> Result<ProductionOrder, AnalysisError> {
    let body = strip_code_fence(text);
    if body.is_empty() {
        return Err(AnalysisError::MalformedResponse(
            "model returned an empty response".to_string(),
        ));
    }
    let value: Value = serde_json::from_str(body).map_err(|e| {
        AnalysisError::MalformedResponse(format!(
            "not valid JSON at line {}, column {}",
            e.line(),
            e.column()
        ))
    })?;
    validate_order(&value)
}

pub fn validate_order(value: &Value) -> Result<ProductionOrder, AnalysisError> {
    let root = value
        .as_object()
        .ok_or_else(|| AnalysisError::schema("$", "expected a JSON object"))?;

    let details = parse_details(root)?;
    let reported_total = non_negative_number(root, "totalTimeMinutes", "totalTimeMinutes")?;
    let computed_total: f64 = details.iter().map(|d| d.time_minutes).sum();
    if (computed_total - reported_total).abs() > TOTAL_TIME_TOLERANCE {
        warn!(
            "Model reported totalTimeMinutes={reported_total}, motifs sum to {computed_total}; using the sum"
        );
    }

    Ok(ProductionOrder {
        order_code: non_empty_string(root, "orderCode", "orderCode")?,
        product_type: non_empty_string(root, "productType", "productType")?,
        fabric: non_empty_string(root, "fabric", "fabric")?,
        theme: non_empty_string(root, "theme", "theme")?,
        details,
        total_time_minutes: computed_total,
        palette: parse_palette(root)?,
        qc_note: non_empty_string(root, "qcNote", "qcNote")?,
    })
}

fn parse_details(root: &Map<String, Value>) -> Result<Vec<MotifEntry>, AnalysisError> {
    let items = array(root, "details", "details")?;
    if items.is_empty() {
        return Err(AnalysisError::schema(
            "details",
            "order must contain at least one motif",
        ));
    }

    let mut seen = HashSet::new();
    let mut details = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let path = format!("details[{i}]");
        let entry = item
            .as_object()
            .ok_or_else(|| AnalysisError::schema(&path, "expected an object"))?;
        let field = |name: &str| format!("{path}.{name}");

        let sequence_number = positive_integer(entry, "sequenceNumber", &field("sequenceNumber"))?;
        if !seen.insert(sequence_number) {
            return Err(AnalysisError::schema(
                field("sequenceNumber"),
                format!("sequence number {sequence_number} is used more than once"),
            ));
        }

        details.push(MotifEntry {
            sequence_number,
            motif_name: non_empty_string(entry, "motifName", &field("motifName"))?,
            technique: string(entry, "technique", &field("technique"))?,
            thread_code: non_empty_string(entry, "threadCode", &field("threadCode"))?,
            color_name: string(entry, "colorName", &field("colorName"))?,
            color_hex: hex_color(entry, "colorHex", &field("colorHex"))?,
            time_minutes: non_negative_number(entry, "timeMinutes", &field("timeMinutes"))?,
            technical_note: string(entry, "technicalNote", &field("technicalNote"))?,
        });
    }
    Ok(details)
}

fn parse_palette(root: &Map<String, Value>) -> Result<Vec<PaletteEntry>, AnalysisError> {
    let items = array(root, "palette", "palette")?;
    let mut seen = HashSet::new();
    let mut palette = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let path = format!("palette[{i}]");
        let entry = item
            .as_object()
            .ok_or_else(|| AnalysisError::schema(&path, "expected an object"))?;

        let code = non_empty_string(entry, "code", &format!("{path}.code"))?;
        let name = string(entry, "name", &format!("{path}.name"))?;
        let hex = hex_color(entry, "hex", &format!("{path}.hex"))?;

        if !seen.insert(code.to_lowercase()) {
            debug!("Dropping repeated palette entry for thread {code}");
            continue;
        }
        palette.push(PaletteEntry { code, name, hex });
    }
    Ok(palette)
}

fn required<'a>(obj: &'a Map<String, Value>, key: &str, path: &str) -> Result<&'a Value, AnalysisError> {
    match obj.get(key) {
        None | Some(Value::Null) => Err(AnalysisError::schema(path, "required field is missing")),
        Some(value) => Ok(value),
    }
}

fn array<'a>(obj: &'a Map<String, Value>, key: &str, path: &str) -> Result<&'a Vec<Value>, AnalysisError> {
    required(obj, key, path)?
        .as_array()
        .ok_or_else(|| AnalysisError::schema(path, "expected an array"))
}

fn string(obj: &Map<String, Value>, key: &str, path: &str) -> Result<String, AnalysisError> {
    required(obj, key, path)?
        .as_str()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| AnalysisError::schema(path, "expected a string"))
}

fn non_empty_string(obj: &Map<String, Value>, key: &str, path: &str) -> Result<String, AnalysisError> {
    let value = string(obj, key, path)?;
    if value.is_empty() {
        return Err(AnalysisError::schema(path, "must not be empty"));
    }
    Ok(value)
}

fn hex_color(obj: &Map<String, Value>, key: &str, path: &str) -> Result<String, AnalysisError> {
    let value = string(obj, key, path)?;
    if !is_hex_color(&value) {
        return Err(AnalysisError::schema(
            path,
            format!("`{value}` is not a #RRGGBB colour"),
        ));
    }
    Ok(value.to_ascii_uppercase())
}

fn non_negative_number(obj: &Map<String, Value>, key: &str, path: &str) -> Result<f64, AnalysisError> {
    let value = required(obj, key, path)?
        .as_f64()
        .ok_or_else(|| AnalysisError::schema(path, "expected a number"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(AnalysisError::schema(path, "must be a non-negative number"));
    }
    Ok(value)
}

fn positive_integer(obj: &Map<String, Value>, key: &str, path: &str) -> Result<u32, AnalysisError> {
    let value = required(obj, key, path)?;
    // Models occasionally emit `1.0` for integer fields.
    let n = match value.as_u64() {
        Some(n) => n,
        None => match value.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= 0.0 => f as u64,
            _ => return Err(AnalysisError::schema(path, "expected a positive integer")),
        },
    };
    if n == 0 || n > u32::MAX as u64 {
        return Err(AnalysisError::schema(path, "expected a positive integer"));
    }
    Ok(n as u32)
}

pub fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Value {
        json!({
            "orderCode": "LSX-2025-014",
            "productType": "Khăn tay",
            "fabric": "Cotton",
            "theme": "Hoa sen",
            "details": [
                {
                    "sequenceNumber": 1,
                    "motifName": "Cánh sen",
                    "technique": "Thêu lướt vặn",
                    "threadCode": "3354",
                    "colorName": "Hồng phấn",
                    "colorHex": "#e4a6ac",
                    "timeMinutes": 60,
                    "technicalNote": "Mũi thêu đều"
                },
                {
                    "sequenceNumber": 2,
                    "motifName": "Lá sen",
                    "technique": "Thêu sa",
                    "threadCode": "987",
                    "colorName": "Xanh lá",
                    "colorHex": "#587B3C",
                    "timeMinutes": 75.5,
                    "technicalNote": ""
                }
            ],
            "totalTimeMinutes": 135.5,
            "palette": [
                { "code": "3354", "name": "Hồng phấn", "hex": "#E4A6AC" },
                { "code": "987", "name": "Xanh lá", "hex": "#587B3C" }
            ],
            "qcNote": "Kiểm tra độ mịn đường thêu"
        })
    }

    fn violation_field(err: AnalysisError) -> String {
        match err {
            AnalysisError::SchemaViolation { field, .. } => field,
            other => panic!("expected schema violation, got {other:?}"),
        }
    }

    #[test]
    fn valid_order_passes_and_normalises_hex() {
        let order = validate_order(&sample_order()).unwrap();
        assert_eq!(order.details.len(), 2);
        assert_eq!(order.details[0].color_hex, "#E4A6AC");
        assert_eq!(order.total_time_minutes, 135.5);
    }

    #[test]
    fn empty_details_names_the_field() {
        let mut value = sample_order();
        value["details"] = json!([]);
        assert_eq!(violation_field(validate_order(&value).unwrap_err()), "details");
    }

    #[test]
    fn bad_hex_is_rejected_with_its_path() {
        let mut value = sample_order();
        value["details"][1]["colorHex"] = json!("green");
        assert_eq!(
            violation_field(validate_order(&value).unwrap_err()),
            "details[1].colorHex"
        );

        let mut value = sample_order();
        value["palette"][0]["hex"] = json!("#E4A6A");
        assert_eq!(violation_field(validate_order(&value).unwrap_err()), "palette[0].hex");
    }

    #[test]
    fn missing_and_blank_top_level_fields_are_rejected() {
        let mut value = sample_order();
        value.as_object_mut().unwrap().remove("qcNote");
        assert_eq!(violation_field(validate_order(&value).unwrap_err()), "qcNote");

        let mut value = sample_order();
        value["orderCode"] = json!("   ");
        assert_eq!(violation_field(validate_order(&value).unwrap_err()), "orderCode");

        let mut value = sample_order();
        value["totalTimeMinutes"] = Value::Null;
        assert_eq!(
            violation_field(validate_order(&value).unwrap_err()),
            "totalTimeMinutes"
        );
    }

    #[test]
    fn duplicate_or_zero_sequence_numbers_are_rejected() {
        let mut value = sample_order();
        value["details"][1]["sequenceNumber"] = json!(1);
        assert_eq!(
            violation_field(validate_order(&value).unwrap_err()),
            "details[1].sequenceNumber"
        );

        let mut value = sample_order();
        value["details"][0]["sequenceNumber"] = json!(0);
        assert_eq!(
            violation_field(validate_order(&value).unwrap_err()),
            "details[0].sequenceNumber"
        );
    }

    #[test]
    fn negative_time_is_rejected() {
        let mut value = sample_order();
        value["details"][0]["timeMinutes"] = json!(-5);
        assert_eq!(
            violation_field(validate_order(&value).unwrap_err()),
            "details[0].timeMinutes"
        );
    }

    #[test]
    fn total_time_is_recomputed_from_motifs() {
        let mut value = sample_order();
        value["totalTimeMinutes"] = json!(500);
        let order = validate_order(&value).unwrap();
        assert_eq!(order.total_time_minutes, 135.5);
    }

    #[test]
    fn palette_is_deduplicated_by_thread_code() {
        let mut value = sample_order();
        value["palette"]
            .as_array_mut()
            .unwrap()
            .push(json!({ "code": "3354", "name": "Hồng", "hex": "#E4A6AC" }));
        let order = validate_order(&value).unwrap();
        assert_eq!(order.palette.len(), 2);
        assert_eq!(order.palette[0].name, "Hồng phấn");
    }

    #[test]
    fn integral_float_sequence_numbers_are_accepted() {
        let mut value = sample_order();
        value["details"][0]["sequenceNumber"] = json!(1.0);
        assert!(validate_order(&value).is_ok());
    }

    #[test]
    fn strips_json_and_bare_code_fences() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  ```\n{}\n```  "), "{}");
        assert_eq!(strip_code_fence("```json {\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn unparseable_text_is_malformed_not_schema() {
        let err = parse_order("Xin lỗi, tôi không thể phân tích ảnh này.").unwrap_err();
        assert_eq!(err.kind(), "MalformedResponse");
        assert!(matches!(parse_order("```json\n```").unwrap_err(), AnalysisError::MalformedResponse(_)));
    }

    #[test]
    fn non_object_json_is_a_schema_violation() {
        assert_eq!(violation_field(parse_order("[1, 2, 3]").unwrap_err()), "$");
    }

    #[test]
    fn hex_pattern_requires_exactly_six_digits() {
        assert!(is_hex_color("#C50022"));
        assert!(is_hex_color("#abcdef"));
        assert!(!is_hex_color("C50022"));
        assert!(!is_hex_color("#C5002"));
        assert!(!is_hex_color("#C500222"));
        assert!(!is_hex_color("#GG0022"));
    }
}
