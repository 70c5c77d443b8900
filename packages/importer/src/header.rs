//! Turning raw header cells into safe, unique column names.

use std::collections::HashMap;

/// Longest column name a datastore table accepts.
pub const MAX_COLUMN_LENGTH: usize = 64;

/// Words that cannot be used bare as column names (MySQL 5.6-8 and MariaDB).
pub const RESERVED_WORDS: &[&str] = &[
    "accessible", "add", "all", "alter", "analyze", "and", "as", "asc",
    "asensitive", "before", "between", "bigint", "binary", "blob", "both", "by",
    "call", "cascade", "case", "change", "char", "character", "check",
    "collate", "column", "condition", "constraint", "continue", "convert",
    "create", "cross", "cube", "cume_dist", "current_date", "current_role",
    "current_time", "current_timestamp", "current_user", "cursor", "database",
    "databases", "day_hour", "day_microsecond", "day_minute", "day_second",
    "dec", "decimal", "declare", "default", "delayed", "delete", "dense_rank",
    "desc", "describe", "deterministic", "distinct", "distinctrow", "div",
    "do_domain_ids", "double", "drop", "dual", "each", "else", "elseif",
    "empty", "enclosed", "escaped", "except", "exists", "exit", "explain",
    "false", "fetch", "first_value", "float", "float4", "float8", "for",
    "force", "foreign", "from", "fulltext", "function", "general", "generated",
    "get", "grant", "group", "grouping", "groups", "having", "high_priority",
    "hour_microsecond", "hour_minute", "hour_second", "if", "ignore",
    "ignore_domain_ids", "ignore_server_ids", "in", "index", "infile", "inner",
    "inout", "insensitive", "insert", "int", "int1", "int2", "int3", "int4",
    "int8", "integer", "intersect", "interval", "into", "io_after_gtids",
    "io_before_gtids", "is", "iterate", "join", "json_table", "key", "keys",
    "kill", "lag", "last_value", "lateral", "lead", "leading", "leave", "left",
    "like", "limit", "linear", "lines", "load", "localtime", "localtimestamp",
    "lock", "long", "longblob", "longtext", "loop", "low_priority",
    "master_bind", "master_heartbeat_period", "master_ssl_verify_server_cert",
    "match", "maxvalue", "mediumblob", "mediumint", "mediumtext", "middleint",
    "minute_microsecond", "minute_second", "mod", "modifies", "natural", "not",
    "no_write_to_binlog", "nth_value", "ntile", "null", "numeric", "of",
    "offset", "on", "optimize", "optimizer_costs", "option", "optionally", "or",
    "order", "out", "outer", "outfile", "over", "page_checksum",
    "parse_vcol_expr", "partition", "percent_rank", "position", "precision",
    "primary", "procedure", "purge", "range", "rank", "read", "reads",
    "read_write", "real", "recursive", "references", "ref_system_id", "regexp",
    "release", "rename", "repeat", "replace", "require", "resignal", "restrict",
    "return", "returning", "revoke", "right", "rlike", "row", "row_number",
    "rows", "schema", "schemas", "second_microsecond", "select", "sensitive",
    "separator", "set", "show", "signal", "slow", "smallint", "spatial",
    "specific", "sql", "sql_big_result", "sql_calc_found_rows", "sqlexception",
    "sql_small_result", "sqlstate", "sqlwarning", "ssl", "starting",
    "stats_auto_recalc", "stats_persistent", "stats_sample_pages", "stored",
    "straight_join", "system", "table", "terminated", "then", "tinyblob",
    "tinyint", "tinytext", "to", "trailing", "trigger", "true", "undo", "union",
    "unique", "unlock", "unsigned", "update", "usage", "use", "using",
    "utc_date", "utc_time", "utc_timestamp", "values", "varbinary", "varchar",
    "varcharacter", "varying", "virtual", "when", "where", "while", "window",
    "with", "write", "xor", "year_month", "zerofill",
];

/// Reduce a header cell to `[a-z0-9_]`.
///
/// Spaces and line breaks become `_`, anything else outside `[A-Za-z0-9_]`
/// is dropped, surrounding underscores are trimmed and the result is
/// lowercased. Numeric names and reserved words get a leading `_`.
pub fn sanitize_header(column: &str) -> String {
    let spaced = column
        .replace("\r\n", "_")
        .replace(['\r', '\n', ' '], "_");
    let stripped: String = spaced
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    let name = stripped.trim_matches('_').to_ascii_lowercase();

    if is_numeric(&name) || RESERVED_WORDS.contains(&name.as_str()) {
        format!("_{name}")
    } else {
        name
    }
}

/// Digits, optionally with a decimal exponent (`1e5`).
fn is_numeric(name: &str) -> bool {
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    match name.split_once('e') {
        Some((mantissa, exponent)) => digits(mantissa) && digits(exponent),
        None => digits(name),
    }
}

/// Bound a column name to [`MAX_COLUMN_LENGTH`].
///
/// Longer names keep their first `MAX_COLUMN_LENGTH - 5` characters followed
/// by `_` and the first four hex digits of the MD5 of the full name.
pub fn truncate_header(column: &str) -> String {
    if column.len() <= MAX_COLUMN_LENGTH {
        return column.to_string();
    }
    let digest = format!("{:x}", md5::compute(column.as_bytes()));
    let mut cut = MAX_COLUMN_LENGTH - 5;
    while !column.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}_{}", &column[..cut], &digest[..4])
}

/// Header text collapsed onto one line: each line trimmed, blanks dropped.
pub fn sanitize_description(column: &str) -> String {
    column
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sanitized, truncated column name for a raw header cell.
pub fn column_name(raw: &str) -> String {
    truncate_header(&sanitize_header(raw))
}

/// Fail with `Duplicate headers error: a, b` if any name occurs twice.
///
/// Duplicates are listed once each, in order of first appearance.
pub fn assert_unique(names: &[String]) -> Result<(), String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in names {
        *counts.entry(name.as_str()).or_default() += 1;
    }

    let mut duplicates: Vec<&str> = Vec::new();
    for name in names {
        if counts.get(name.as_str()).is_some_and(|n| *n > 1) && !duplicates.contains(&name.as_str()) {
            duplicates.push(name);
        }
    }

    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(format!("Duplicate headers error: {}", duplicates.join(", ")))
    }
}
