use std::path::Path;

use regex::Regex;

/// One `SOURCE_SCHEMA, TARGET_DB_SCHEMA` row from the crosswalk CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMapping {
    pub source_schema: String,
    pub target_schema: String,
}

fn unquote(field: &str) -> String {
    let trimmed = field.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
        .to_string()
}

/// Parse a crosswalk CSV with a header row and `SOURCE_SCHEMA,
/// TARGET_DB_SCHEMA` columns. Unparseable or short rows are skipped.
pub fn parse_crosswalk_csv(content: &str) -> Vec<SchemaMapping> {
    let mut lines = content.lines();
    lines.next(); // header

    lines
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let mut fields = line.splitn(2, ',');
            let source = unquote(fields.next()?);
            let target = unquote(fields.next()?);
            if source.is_empty() {
                return None;
            }
            Some(SchemaMapping {
                source_schema: source,
                target_schema: target,
            })
        })
        .collect()
}

pub fn load_crosswalk(path: &Path) -> std::io::Result<Vec<SchemaMapping>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_crosswalk_csv(&content))
}

/// Rewrite every schema-qualified identifier `SOURCE_SCHEMA.x` to
/// `TARGET_DB_SCHEMA.x`, case-insensitively, leaving bare occurrences of
/// the schema name (not followed by a `.`) untouched. Grounded on
/// `scripts/schema_conversion_teradata_to_snowflake.py`'s
/// `process_sql_with_pandas_replace` regex
/// (`\b{old_schema}\b(?=\.)`, case-insensitive).
pub fn apply_crosswalk(sql: &str, mappings: &[SchemaMapping]) -> String {
    let mut rewritten = sql.to_string();
    for mapping in mappings {
        if mapping.source_schema.is_empty() {
            continue;
        }
        let pattern = format!(
            r"(?i)\b{}\b(?=\.)",
            regex::escape(&mapping.source_schema)
        );
        if let Ok(re) = Regex::new(&pattern) {
            rewritten = re
                .replace_all(&rewritten, mapping.target_schema.as_str())
                .into_owned();
        }
    }
    rewritten
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_csv_rows_after_header() {
        let csv = "SOURCE_SCHEMA,TARGET_DB_SCHEMA\nLEGACY_DB,PROD.MIGRATED\n";
        let mappings = parse_crosswalk_csv(csv);
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].source_schema, "LEGACY_DB");
        assert_eq!(mappings[0].target_schema, "PROD.MIGRATED");
    }

    #[test]
    fn rewrites_only_schema_qualified_identifiers() {
        let mappings = vec![SchemaMapping {
            source_schema: "LEGACY_DB".to_string(),
            target_schema: "PROD.MIGRATED".to_string(),
        }];
        let sql = "SELECT * FROM LEGACY_DB.CUSTOMERS WHERE LEGACY_DB_BACKUP = 1;";
        let rewritten = apply_crosswalk(sql, &mappings);
        assert_eq!(
            rewritten,
            "SELECT * FROM PROD.MIGRATED.CUSTOMERS WHERE LEGACY_DB_BACKUP = 1;"
        );
    }

    #[test]
    fn is_case_insensitive() {
        let mappings = vec![SchemaMapping {
            source_schema: "legacy_db".to_string(),
            target_schema: "PROD".to_string(),
        }];
        let rewritten = apply_crosswalk("SELECT * FROM LEGACY_DB.T;", &mappings);
        assert_eq!(rewritten, "SELECT * FROM PROD.T;");
    }
}
