// ABOUTME: Translates source column type names into target column type names
// ABOUTME: Mapping tables are injected data; the embedded target gets a simplification pass

use std::collections::HashMap;

/// How rich the destination engine's type system is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetEngine {
    /// Full relational type system (PostgreSQL)
    RelationalFull,
    /// Reduced storage classes (SQLite)
    EmbeddedLite,
}

/// Lowercase source type name → target type, plus the type used for anything unmapped.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMapping {
    types: HashMap<String, String>,
    default: String,
}

const SQLSERVER_TO_POSTGRES: &[(&str, &str)] = &[
    ("bigint", "bigint"),
    ("bit", "boolean"),
    ("decimal", "decimal"),
    ("int", "integer"),
    ("money", "decimal(19,4)"),
    ("numeric", "numeric"),
    ("smallint", "smallint"),
    ("smallmoney", "decimal(10,4)"),
    ("tinyint", "smallint"),
    ("float", "double precision"),
    ("real", "real"),
    ("date", "date"),
    ("datetime2", "timestamp"),
    ("datetime", "timestamp"),
    ("datetimeoffset", "timestamp with time zone"),
    ("smalldatetime", "timestamp"),
    ("time", "time"),
    ("char", "char"),
    ("varchar", "varchar"),
    ("text", "text"),
    ("nchar", "char"),
    ("nvarchar", "varchar"),
    ("ntext", "text"),
    ("binary", "bytea"),
    ("varbinary", "bytea"),
    ("image", "bytea"),
    ("uniqueidentifier", "uuid"),
];

// Declared-type names seen when the source is a SQLite file.
const SQLITE_TO_POSTGRES: &[(&str, &str)] = &[
    ("integer", "integer"),
    ("boolean", "boolean"),
    ("double", "double precision"),
    ("double precision", "double precision"),
    ("character", "char"),
    ("character varying", "varchar"),
    ("clob", "text"),
    ("blob", "bytea"),
    ("timestamp", "timestamp"),
    ("uuid", "uuid"),
];

impl TypeMapping {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            types: HashMap::new(),
            default: default.into(),
        }
    }

    /// Built-in mapping from SQL Server (and SQLite declared types) to PostgreSQL.
    pub fn sqlserver_to_postgres() -> Self {
        SQLSERVER_TO_POSTGRES
            .iter()
            .chain(SQLITE_TO_POSTGRES)
            .fold(Self::new("text"), |mapping, (source, target)| {
                mapping.with(*source, *target)
            })
    }

    /// Add or replace one entry. Source names are stored lowercase.
    #[must_use]
    pub fn with(mut self, source_type: impl AsRef<str>, target_type: impl Into<String>) -> Self {
        self.insert(source_type, target_type);
        self
    }

    pub fn insert(&mut self, source_type: impl AsRef<str>, target_type: impl Into<String>) {
        self.types.insert(
            source_type.as_ref().trim().to_lowercase(),
            target_type.into(),
        );
    }

    /// Merge user-supplied overrides on top of the existing entries.
    pub fn merge<I, K, V>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (source_type, target_type) in overrides {
            self.insert(source_type, target_type);
        }
    }

    pub fn default_type(&self) -> &str {
        &self.default
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for TypeMapping {
    fn default() -> Self {
        Self::sqlserver_to_postgres()
    }
}

/// Pure lookup from source type to target type.
#[derive(Debug, Clone)]
pub struct TypeMapper {
    mapping: TypeMapping,
}

impl TypeMapper {
    pub fn new(mapping: TypeMapping) -> Self {
        Self { mapping }
    }

    /// Map a source type name for the given target engine.
    ///
    /// Lookup is case-insensitive and never fails: unknown names get the
    /// mapping's default type.
    pub fn map(&self, source_type: &str, engine: TargetEngine) -> String {
        let full = self.map_full(source_type);
        match engine {
            TargetEngine::RelationalFull => full.to_string(),
            TargetEngine::EmbeddedLite => simplify(full).to_string(),
        }
    }

    fn map_full(&self, source_type: &str) -> &str {
        self.mapping
            .types
            .get(&source_type.trim().to_lowercase())
            .map(String::as_str)
            .unwrap_or(self.mapping.default_type())
    }

    pub fn mapping(&self) -> &TypeMapping {
        &self.mapping
    }
}

impl Default for TypeMapper {
    fn default() -> Self {
        Self::new(TypeMapping::default())
    }
}

/// Collapse a full relational type into one of SQLite's storage classes.
pub fn simplify(full_type: &str) -> &'static str {
    let lowered = full_type.trim().to_lowercase();
    let base = lowered
        .split('(')
        .next()
        .map(str::trim)
        .unwrap_or_default();

    match base {
        "char" | "character" | "varchar" | "character varying" | "bpchar" | "text" | "nchar"
        | "nvarchar" | "ntext" | "clob" | "citext" | "xml" | "json" | "jsonb" => "TEXT",
        "decimal" | "numeric" | "money" | "real" | "float" | "float4" | "float8" | "double"
        | "double precision" => "REAL",
        "boolean" | "bool" | "bit" | "tinyint" | "smallint" | "int" | "integer" | "bigint"
        | "int2" | "int4" | "int8" => "INTEGER",
        "bytea" | "blob" | "binary" | "varbinary" | "image" => "BLOB",
        _ => "TEXT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_mapping_uses_builtin_table() {
        let mapper = TypeMapper::default();
        assert_eq!(mapper.map("int", TargetEngine::RelationalFull), "integer");
        assert_eq!(mapper.map("bit", TargetEngine::RelationalFull), "boolean");
        assert_eq!(mapper.map("money", TargetEngine::RelationalFull), "decimal(19,4)");
        assert_eq!(
            mapper.map("datetimeoffset", TargetEngine::RelationalFull),
            "timestamp with time zone"
        );
        assert_eq!(mapper.map("uniqueidentifier", TargetEngine::RelationalFull), "uuid");
        assert_eq!(mapper.map("nvarchar", TargetEngine::RelationalFull), "varchar");
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mapper = TypeMapper::default();
        assert_eq!(mapper.map("NVARCHAR", TargetEngine::RelationalFull), "varchar");
        assert_eq!(mapper.map(" BigInt ", TargetEngine::RelationalFull), "bigint");
    }

    #[test]
    fn test_unknown_type_falls_back_to_default() {
        let mapper = TypeMapper::default();
        assert_eq!(mapper.map("geography", TargetEngine::RelationalFull), "text");
        assert_eq!(mapper.map("geography", TargetEngine::EmbeddedLite), "TEXT");
        assert_eq!(mapper.map("", TargetEngine::RelationalFull), "text");
    }

    #[test]
    fn test_embedded_simplification_collapses_families() {
        let mapper = TypeMapper::default();
        let lite = |t: &str| mapper.map(t, TargetEngine::EmbeddedLite);

        assert_eq!(lite("varchar"), "TEXT");
        assert_eq!(lite("nchar"), "TEXT");
        assert_eq!(lite("money"), "REAL");
        assert_eq!(lite("decimal"), "REAL");
        assert_eq!(lite("float"), "REAL");
        assert_eq!(lite("bit"), "INTEGER");
        assert_eq!(lite("tinyint"), "INTEGER");
        assert_eq!(lite("bigint"), "INTEGER");
        assert_eq!(lite("varbinary"), "BLOB");
        assert_eq!(lite("datetime2"), "TEXT");
        assert_eq!(lite("uniqueidentifier"), "TEXT");
    }

    #[test]
    fn test_simplify_is_total_over_builtin_outputs() {
        let mapping = TypeMapping::sqlserver_to_postgres();
        for target in mapping.types.values() {
            let simplified = simplify(target);
            assert!(["TEXT", "REAL", "INTEGER", "BLOB"].contains(&simplified));
            assert_eq!(simplified, simplify(target));
        }
    }

    #[test]
    fn test_injected_mappings_do_not_leak() {
        let custom = TypeMapper::new(TypeMapping::new("varchar").with("INT", "int4"));
        let builtin = TypeMapper::default();

        assert_eq!(custom.map("int", TargetEngine::RelationalFull), "int4");
        assert_eq!(custom.map("bit", TargetEngine::RelationalFull), "varchar");
        assert_eq!(builtin.map("int", TargetEngine::RelationalFull), "integer");
    }

    #[test]
    fn test_merge_overrides_replace_entries() {
        let mut mapping = TypeMapping::sqlserver_to_postgres();
        let before = mapping.len();
        mapping.merge([("XML", "xml"), ("bit", "smallint")]);

        let mapper = TypeMapper::new(mapping);
        assert_eq!(mapper.map("xml", TargetEngine::RelationalFull), "xml");
        assert_eq!(mapper.map("bit", TargetEngine::RelationalFull), "smallint");
        assert_eq!(mapper.mapping().len(), before + 1);
    }
}
