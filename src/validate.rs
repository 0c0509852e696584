//! Structural validators for generated artifacts.
//!
//! Two independent, pure entry points — [`validate_structured`] for JSON
//! documents and [`validate_sql`] for SQL statements — plus
//! [`validate_composite`] for artifacts carrying both. Expected failure
//! conditions (malformed input, imbalanced syntax) are returned as data
//! in the [`ValidationResult`], never as errors.
//!
//! Confidence is a heuristic trust score clamped to `[0.1, 0.95]`, not a
//! probability: parse failures bottom out at 0.1, structural recognition
//! raises it, errors and warnings lower it.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::models::{SqlEntities, ValidationResult, ValidatorKind};

/// Floor and ceiling for every confidence score this module produces.
pub const CONFIDENCE_MIN: f64 = 0.1;
pub const CONFIDENCE_MAX: f64 = 0.95;

/// Nesting depth beyond which a JSON document draws a warning.
const MAX_REASONABLE_DEPTH: usize = 10;

fn clamp_confidence(c: f64) -> f64 {
    c.clamp(CONFIDENCE_MIN, CONFIDENCE_MAX)
}

// ============ Structured (JSON) validation ============

/// Validate a candidate JSON document.
///
/// Unparseable text short-circuits to `valid = false` at confidence 0.1.
/// A successful parse scores 0.9; structural heuristics (depth, `$ref`
/// cycles, conventional shapes) only add warnings — confidence on this
/// path reflects parseability, not completeness.
pub fn validate_structured(text: &str) -> ValidationResult {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            return ValidationResult {
                valid: false,
                errors: vec![format!("JSON parse failed: {}", e)],
                warnings: Vec::new(),
                confidence: CONFIDENCE_MIN,
                kind: ValidatorKind::Json,
                extracted: None,
            };
        }
    };

    let warnings = structural_warnings(&value);

    ValidationResult {
        valid: true,
        errors: Vec::new(),
        warnings,
        confidence: 0.9,
        kind: ValidatorKind::Json,
        extracted: None,
    }
}

/// Soft structural heuristics over a parsed JSON value. Warnings only.
fn structural_warnings(value: &Value) -> Vec<String> {
    let mut warnings = Vec::new();

    let depth = max_depth(value);
    if depth > MAX_REASONABLE_DEPTH {
        warnings.push(format!(
            "nesting depth {} exceeds {} levels",
            depth, MAX_REASONABLE_DEPTH
        ));
    }

    if let Some(cycle) = find_ref_cycle(value) {
        warnings.push(format!("$ref cycle detected through '{}'", cycle));
    }

    if let Some(obj) = value.as_object() {
        // API envelope: a data/result payload usually travels with a
        // status or error indicator.
        let has_payload = obj.contains_key("data") || obj.contains_key("result");
        let has_status = obj.contains_key("status")
            || obj.contains_key("success")
            || obj.contains_key("error");
        if has_payload && !has_status {
            warnings.push("looks like an API envelope but carries no status field".to_string());
        }

        // JSON Schema: properties without a type declaration.
        if obj.contains_key("properties") && !obj.contains_key("type") {
            warnings.push("schema-like object declares properties but no type".to_string());
        }

        // Connection config: a port without a host is usually a mistake.
        if obj.contains_key("port") && !obj.contains_key("host") {
            warnings.push("config-like object has a port but no host".to_string());
        }
    }

    warnings
}

fn max_depth(value: &Value) -> usize {
    match value {
        Value::Object(map) => 1 + map.values().map(max_depth).max().unwrap_or(0),
        Value::Array(items) => 1 + items.iter().map(max_depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// Walk intra-document `$ref` pointers with a currently-visiting set.
///
/// JSON values cannot alias in memory, so the reference graph is the
/// conventional `#/definitions/...` / `#/$defs/...` pointer graph. A
/// revisit while descending is reported as the offending definition
/// name; it is never a hard error.
fn find_ref_cycle(value: &Value) -> Option<String> {
    let defs = value
        .get("definitions")
        .or_else(|| value.get("$defs"))?
        .as_object()?;

    for name in defs.keys() {
        let mut visiting = HashSet::new();
        if walk_refs(name, defs, &mut visiting) {
            return Some(name.clone());
        }
    }
    None
}

fn walk_refs(
    name: &str,
    defs: &serde_json::Map<String, Value>,
    visiting: &mut HashSet<String>,
) -> bool {
    if !visiting.insert(name.to_string()) {
        return true;
    }
    let Some(def) = defs.get(name) else {
        visiting.remove(name);
        return false;
    };
    for target in collect_refs(def) {
        if walk_refs(&target, defs, visiting) {
            return true;
        }
    }
    visiting.remove(name);
    false
}

fn collect_refs(value: &Value) -> Vec<String> {
    let mut refs = Vec::new();
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                if k == "$ref" {
                    if let Some(s) = v.as_str() {
                        if let Some(target) = s
                            .strip_prefix("#/definitions/")
                            .or_else(|| s.strip_prefix("#/$defs/"))
                        {
                            refs.push(target.to_string());
                        }
                    }
                } else {
                    refs.extend(collect_refs(v));
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                refs.extend(collect_refs(item));
            }
        }
        _ => {}
    }
    refs
}

// ============ SQL validation ============

/// Statement kind, classified from the first keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlStatementKind {
    CreateTable,
    CreateOther,
    Select,
    Insert,
    Update,
    Delete,
    Alter,
    Drop,
    Truncate,
    Unknown,
}

impl SqlStatementKind {
    fn classify(sql: &str) -> Self {
        let upper = sql.trim_start().to_ascii_uppercase();
        let mut words = upper.split_whitespace();
        match words.next() {
            Some("CREATE") => {
                if words.next() == Some("TABLE") {
                    SqlStatementKind::CreateTable
                } else {
                    SqlStatementKind::CreateOther
                }
            }
            Some("SELECT") => SqlStatementKind::Select,
            Some("INSERT") => SqlStatementKind::Insert,
            Some("UPDATE") => SqlStatementKind::Update,
            Some("DELETE") => SqlStatementKind::Delete,
            Some("ALTER") => SqlStatementKind::Alter,
            Some("DROP") => SqlStatementKind::Drop,
            Some("TRUNCATE") => SqlStatementKind::Truncate,
            _ => SqlStatementKind::Unknown,
        }
    }

    fn recognized(&self) -> bool {
        !matches!(self, SqlStatementKind::Unknown)
    }
}

fn table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:FROM|JOIN|UPDATE|INTO|CREATE\s+TABLE(?:\s+IF\s+NOT\s+EXISTS)?)\s+([A-Za-z_][A-Za-z0-9_.]*)",
        )
        .expect("table extraction regex is valid")
    })
}

fn select_list_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)\bSELECT\s+(.*?)\s+FROM\b").expect("select list regex is valid")
    })
}

/// Injection-like fragments. A defense-in-depth heuristic, not a
/// security boundary: matches draw a warning, never an error.
const INJECTION_MARKERS: [&str; 5] = ["or 1=1", "union select", "; drop ", "sleep(", "benchmark("];

/// Deprecated syntax that still parses on old engines.
const DEPRECATED_TOKENS: [&str; 3] = ["type=myisam", "(+)", "*="];

/// Validate a candidate SQL statement.
///
/// Runs universal lexical checks (parenthesis and quote balance,
/// terminator, suspicious substrings), statement-specific checks keyed
/// on the first keyword, and independent regex passes that extract
/// table and column names as recognition evidence.
pub fn validate_sql(text: &str) -> ValidationResult {
    let sql = text.trim();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let kind = SqlStatementKind::classify(sql);

    if sql.is_empty() {
        errors.push("empty SQL statement".to_string());
    }

    lexical_checks(sql, &mut errors, &mut warnings);
    statement_checks(sql, kind, &mut errors, &mut warnings);

    let extracted = extract_entities(sql);

    let mut confidence = 0.5;
    if kind.recognized() {
        confidence += 0.2;
    }
    if !extracted.tables.is_empty() {
        confidence += 0.1;
    }
    if !extracted.columns.is_empty() {
        confidence += 0.1;
    }
    confidence -= 0.2 * errors.len() as f64;
    confidence -= 0.05 * warnings.len() as f64;

    ValidationResult {
        valid: errors.is_empty(),
        errors,
        warnings,
        confidence: clamp_confidence(confidence),
        kind: ValidatorKind::Sql,
        extracted: Some(extracted),
    }
}

fn lexical_checks(sql: &str, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
    if sql.is_empty() {
        return;
    }

    let open = sql.matches('(').count();
    let close = sql.matches(')').count();
    if open != close {
        errors.push(format!(
            "unbalanced parentheses: {} open, {} close",
            open, close
        ));
    }

    if sql.matches('\'').count() % 2 != 0 {
        errors.push("unbalanced single quotes".to_string());
    }
    if sql.matches('"').count() % 2 != 0 {
        errors.push("unbalanced double quotes".to_string());
    }

    if !sql.ends_with(';') {
        warnings.push("missing terminating semicolon".to_string());
    }

    let lower = sql.to_ascii_lowercase();
    for marker in INJECTION_MARKERS {
        if lower.contains(marker) {
            warnings.push(format!("suspicious substring '{}'", marker.trim()));
        }
    }
    for token in DEPRECATED_TOKENS {
        if lower.contains(token) {
            warnings.push(format!("deprecated syntax '{}'", token));
        }
    }
}

fn statement_checks(
    sql: &str,
    kind: SqlStatementKind,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    let upper = sql.to_ascii_uppercase();
    match kind {
        SqlStatementKind::CreateTable => {
            match column_list(sql) {
                Some(list) => {
                    for def in split_top_level(&list) {
                        let def = def.trim();
                        if def.is_empty() || is_table_constraint(def) {
                            continue;
                        }
                        if def.split_whitespace().count() < 2 {
                            errors.push(format!("malformed column definition: '{}'", def));
                        }
                    }
                }
                None => {
                    errors.push("CREATE TABLE has no parseable column list".to_string());
                }
            }
            if !upper.contains("PRIMARY KEY") {
                warnings.push("no PRIMARY KEY declared".to_string());
            }
        }
        SqlStatementKind::Insert => {
            if !upper.contains("VALUES") && !upper.contains("SELECT") {
                errors.push("INSERT requires VALUES or SELECT".to_string());
            }
        }
        SqlStatementKind::Update => {
            if !upper.contains(" SET ") && !upper.contains("\nSET ") {
                errors.push("UPDATE requires SET".to_string());
            }
            if !upper.contains("WHERE") {
                warnings.push("UPDATE without WHERE affects every row".to_string());
            }
        }
        SqlStatementKind::Delete => {
            if !upper.contains("WHERE") {
                warnings.push("DELETE without WHERE affects every row".to_string());
            }
        }
        _ => {}
    }
}

/// Text between the first `(` and its matching `)` at depth 0, if the
/// parentheses actually balance.
fn column_list(sql: &str) -> Option<String> {
    let start = sql.find('(')?;
    let mut depth = 0usize;
    for (i, ch) in sql[start..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(sql[start + 1..start + i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Split a column list on commas outside nested parentheses.
fn split_top_level(list: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in list.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

fn is_table_constraint(def: &str) -> bool {
    let first = def
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();
    matches!(
        first.as_str(),
        "PRIMARY" | "FOREIGN" | "UNIQUE" | "CONSTRAINT" | "KEY" | "CHECK" | "INDEX"
    )
}

/// Independent regex passes for table and column names.
///
/// Column extraction is skipped when the select list is `*`.
fn extract_entities(sql: &str) -> SqlEntities {
    let mut tables = Vec::new();
    for cap in table_re().captures_iter(sql) {
        let name = cap[1].to_string();
        if !tables.contains(&name) {
            tables.push(name);
        }
    }

    let mut columns = Vec::new();
    if let Some(cap) = select_list_re().captures(sql) {
        let list = cap[1].trim();
        if list != "*" {
            for item in split_top_level(list) {
                let item = item.trim();
                if item.is_empty() || item.contains('(') {
                    continue;
                }
                // "t.name AS n" → "t.name"
                let name = item.split_whitespace().next().unwrap_or(item);
                if name != "*" && !columns.contains(&name.to_string()) {
                    columns.push(name.to_string());
                }
            }
        }
    }

    SqlEntities { tables, columns }
}

// ============ Composite validation ============

/// Field names treated as SQL sub-artifacts.
const SQL_FIELDS: [&str; 3] = ["sql", "ddl", "statements"];
/// Field names treated as structured sub-artifacts.
const JSON_FIELDS: [&str; 4] = ["data", "json", "mapping", "config"];

/// Validate a composite artifact carrying both structured and SQL
/// sub-fields, unioning their errors and warnings.
///
/// Overall confidence is `0.8 − 0.2 × errors − 0.05 × warnings`,
/// clamped to the usual bounds.
pub fn validate_composite(artifact: &Value) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut checked_any = false;

    if let Some(obj) = artifact.as_object() {
        for field in SQL_FIELDS {
            let Some(value) = obj.get(field) else { continue };
            checked_any = true;
            for sql in string_items(value) {
                let result = validate_sql(&sql);
                errors.extend(result.errors.into_iter().map(|e| format!("{}: {}", field, e)));
                warnings.extend(result.warnings.into_iter().map(|w| format!("{}: {}", field, w)));
            }
        }
        for field in JSON_FIELDS {
            let Some(value) = obj.get(field) else { continue };
            checked_any = true;
            match value {
                Value::String(s) => {
                    let result = validate_structured(s);
                    errors.extend(result.errors.into_iter().map(|e| format!("{}: {}", field, e)));
                    warnings
                        .extend(result.warnings.into_iter().map(|w| format!("{}: {}", field, w)));
                }
                other => {
                    warnings.extend(
                        structural_warnings(other)
                            .into_iter()
                            .map(|w| format!("{}: {}", field, w)),
                    );
                }
            }
        }
    }

    if !checked_any {
        warnings.extend(structural_warnings(artifact));
    }

    let confidence =
        clamp_confidence(0.8 - 0.2 * errors.len() as f64 - 0.05 * warnings.len() as f64);

    ValidationResult {
        valid: errors.is_empty(),
        errors,
        warnings,
        confidence,
        kind: ValidatorKind::Quality,
        extracted: None,
    }
}

fn string_items(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_parse_failure_bottoms_out() {
        let result = validate_structured("{ not json");
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("parse failed"));
        assert_eq!(result.confidence, 0.1);
        assert_eq!(result.kind, ValidatorKind::Json);
    }

    #[test]
    fn test_structured_success_base_confidence() {
        let result = validate_structured(r#"{"status": "ok", "data": {"rows": 3}}"#);
        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn test_structured_warnings_do_not_touch_confidence() {
        // Envelope shape without a status field draws a warning only.
        let result = validate_structured(r#"{"data": {"rows": 3}}"#);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("envelope"));
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn test_structured_depth_warning() {
        let mut text = String::new();
        for _ in 0..12 {
            text.push_str(r#"{"a":"#);
        }
        text.push('1');
        for _ in 0..12 {
            text.push('}');
        }
        let result = validate_structured(&text);
        assert!(result.valid);
        assert!(result.warnings.iter().any(|w| w.contains("nesting depth")));
    }

    #[test]
    fn test_structured_ref_cycle_is_warning_not_error() {
        let doc = json!({
            "definitions": {
                "a": { "$ref": "#/definitions/b" },
                "b": { "$ref": "#/definitions/a" }
            }
        });
        let result = validate_structured(&doc.to_string());
        assert!(result.valid);
        assert!(result.warnings.iter().any(|w| w.contains("$ref cycle")));
    }

    #[test]
    fn test_structured_acyclic_refs_no_warning() {
        let doc = json!({
            "definitions": {
                "a": { "$ref": "#/definitions/b" },
                "b": { "type": "string" }
            }
        });
        let result = validate_structured(&doc.to_string());
        assert!(!result.warnings.iter().any(|w| w.contains("cycle")));
    }

    #[test]
    fn test_sql_missing_paren_example() {
        let result = validate_sql("CREATE TABLE t (id INT, name VARCHAR(10)");
        assert!(!result.valid);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("unbalanced parentheses")));
        assert!(
            result.confidence <= 0.3 + 1e-9,
            "confidence {} too high",
            result.confidence
        );
    }

    #[test]
    fn test_sql_clean_create_table() {
        let result =
            validate_sql("CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(50));");
        assert!(result.valid, "errors: {:?}", result.errors);
        assert!(result.warnings.is_empty(), "warnings: {:?}", result.warnings);
        assert!((result.confidence - 0.8).abs() < 1e-9);
        let extracted = result.extracted.unwrap();
        assert_eq!(extracted.tables, vec!["users"]);
    }

    #[test]
    fn test_sql_create_table_without_pk_warns() {
        let result = validate_sql("CREATE TABLE logs (id INT, message TEXT);");
        assert!(result.valid);
        assert!(result.warnings.iter().any(|w| w.contains("PRIMARY KEY")));
    }

    #[test]
    fn test_sql_malformed_column_is_error() {
        let result = validate_sql("CREATE TABLE t (id INT, badcolumn);");
        assert!(!result.valid);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("malformed column definition")));
    }

    #[test]
    fn test_sql_select_extracts_entities() {
        let result =
            validate_sql("SELECT id, name FROM customers JOIN orders ON a = b WHERE id > 3;");
        assert!(result.valid);
        let extracted = result.extracted.unwrap();
        assert_eq!(extracted.tables, vec!["customers", "orders"]);
        assert_eq!(extracted.columns, vec!["id", "name"]);
        // kind + table + column recognition all credited.
        assert!((result.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_sql_select_star_skips_columns() {
        let result = validate_sql("SELECT * FROM customers;");
        let extracted = result.extracted.unwrap();
        assert!(extracted.columns.is_empty());
        assert_eq!(extracted.tables, vec!["customers"]);
    }

    #[test]
    fn test_sql_insert_requires_values_or_select() {
        let result = validate_sql("INSERT INTO t (a, b);");
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("VALUES")));

        let ok = validate_sql("INSERT INTO t (a) VALUES (1);");
        assert!(ok.valid, "errors: {:?}", ok.errors);
    }

    #[test]
    fn test_sql_update_delete_where_warnings() {
        let update = validate_sql("UPDATE t SET a = 1;");
        assert!(update.valid);
        assert!(update.warnings.iter().any(|w| w.contains("WHERE")));

        let update_no_set = validate_sql("UPDATE t a = 1;");
        assert!(!update_no_set.valid);

        let delete = validate_sql("DELETE FROM t;");
        assert!(delete.valid);
        assert!(delete.warnings.iter().any(|w| w.contains("WHERE")));
    }

    #[test]
    fn test_sql_injection_marker_is_warning_not_error() {
        let result = validate_sql("SELECT id FROM t WHERE x = '' OR 1=1;");
        assert!(result.warnings.iter().any(|w| w.contains("suspicious")));
        assert!(result.valid);
    }

    #[test]
    fn test_sql_missing_semicolon_warns() {
        let result = validate_sql("SELECT id FROM t");
        assert!(result.valid);
        assert!(result.warnings.iter().any(|w| w.contains("semicolon")));
    }

    #[test]
    fn test_confidence_bounds_hold_for_garbage() {
        for input in [
            "",
            ";;;",
            "((((((((((",
            "'''",
            "DROP",
            "CREATE TABLE ((((",
            "\u{0} \u{1} \u{2}",
        ] {
            let sql = validate_sql(input);
            assert!(
                (CONFIDENCE_MIN..=CONFIDENCE_MAX).contains(&sql.confidence),
                "sql confidence {} out of bounds for {:?}",
                sql.confidence,
                input
            );
            let json = validate_structured(input);
            assert!(
                (CONFIDENCE_MIN..=CONFIDENCE_MAX).contains(&json.confidence),
                "json confidence {} out of bounds for {:?}",
                json.confidence,
                input
            );
        }
    }

    #[test]
    fn test_revalidation_is_idempotent() {
        let sql = "SELECT id, name FROM customers;";
        let first = validate_sql(sql);
        let second = validate_sql(sql);
        assert_eq!(first.errors, second.errors);
        assert_eq!(first.warnings, second.warnings);
        assert_eq!(first.confidence, second.confidence);
    }

    #[test]
    fn test_composite_unions_sub_results() {
        let artifact = json!({
            "sql": "CREATE TABLE t (id INT, name VARCHAR(10)",
            "data": "{ broken json"
        });
        let result = validate_composite(&artifact);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.starts_with("sql:")));
        assert!(result.errors.iter().any(|e| e.starts_with("data:")));
        assert_eq!(result.kind, ValidatorKind::Quality);
        assert!((CONFIDENCE_MIN..=CONFIDENCE_MAX).contains(&result.confidence));
    }

    #[test]
    fn test_composite_clean_artifact() {
        let artifact = json!({
            "sql": "CREATE TABLE users (id INT PRIMARY KEY);",
            "data": r#"{"status": "ok"}"#
        });
        let result = validate_composite(&artifact);
        assert!(result.valid, "errors: {:?}", result.errors);
        assert!((result.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_composite_statement_array() {
        let artifact = json!({
            "statements": [
                "CREATE TABLE a (id INT PRIMARY KEY);",
                "INSERT INTO a (id);"
            ]
        });
        let result = validate_composite(&artifact);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("VALUES")));
    }
}
