//! Qualified table and field identifiers.
//!
//! Fields are scoped to the table that produced them so that downstream
//! operators can resolve `col`, `t.col`, `s.t.col` and fully-qualified
//! references against the same field list. A `*` qualifier part matches any
//! table, which is how scope-agnostic references are written.

use std::fmt;

/// A (database, schema, relation) table reference. Any prefix may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableIdent {
    pub database: Option<String>,
    pub schema: Option<String>,
    pub relation: Option<String>,
}

impl TableIdent {
    pub fn new(ident: &str) -> Self {
        let mut parts: Vec<Option<String>> =
            ident.split('.').map(|p| Some(p.to_string())).collect();
        while parts.len() < 3 {
            parts.insert(0, None);
        }
        TableIdent {
            database: parts[0].take(),
            schema: parts[1].take(),
            relation: parts[2].take(),
        }
    }

    pub fn relation(name: impl Into<String>) -> Self {
        TableIdent {
            database: None,
            schema: None,
            relation: Some(name.into()),
        }
    }

    /// Anonymous identity for streams with no source relation, e.g. the
    /// output of an aggregation.
    pub fn temporary() -> Self {
        Self::relation("<temporary>")
    }

    /// Identity for the output of a join, where each field keeps its own
    /// original qualifier.
    pub fn merged() -> Self {
        Self::relation("<merged>")
    }

    /// Scope a field name to this table.
    pub fn field(&self, name: impl Into<String>) -> FieldIdent {
        FieldIdent {
            table: Some(self.clone()),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [&self.database, &self.schema, &self.relation]
            .iter()
            .filter_map(|p| p.as_deref())
            .collect();
        write!(f, "{}", parts.join("."))
    }
}

/// A field name plus the table it is scoped to.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldIdent {
    pub table: Option<TableIdent>,
    pub name: String,
}

impl FieldIdent {
    pub fn unqualified(name: impl Into<String>) -> Self {
        FieldIdent {
            table: None,
            name: name.into(),
        }
    }

    /// Parse a possibly-dotted reference like `t.col` into a scoped field.
    pub fn parse(name: &str) -> Self {
        match name.split_once('.') {
            Some((table, field)) => FieldIdent {
                table: Some(TableIdent::relation(table)),
                name: field.to_string(),
            },
            None => Self::unqualified(name),
        }
    }

    /// Scope a list of column names to one table, preserving order.
    pub fn columns_from(table: &TableIdent, names: &[String]) -> Vec<FieldIdent> {
        names.iter().map(|n| table.field(n)).collect()
    }

    /// Whether `candidate` (as written in a query) resolves to this field.
    ///
    /// A bare name matches on the field name alone. Dotted candidates match
    /// right-aligned against the field's qualifiers; a `*` part matches any
    /// qualifier.
    pub fn matches(&self, candidate: &str) -> bool {
        let parts: Vec<&str> = candidate.split('.').collect();
        let (field_part, quals) = match parts.split_last() {
            Some(split) => split,
            None => return false,
        };

        if *field_part != self.name {
            return false;
        }
        if quals.is_empty() {
            return true;
        }

        let table = match &self.table {
            Some(table) => table,
            None => return false,
        };

        // Right-aligned: `t.col` checks relation, `s.t.col` also schema, etc.
        let own = [
            table.relation.as_deref(),
            table.schema.as_deref(),
            table.database.as_deref(),
        ];
        if quals.len() > own.len() {
            return false;
        }
        quals
            .iter()
            .rev()
            .zip(own.iter())
            .all(|(cand, own)| *cand == "*" || Some(*cand) == *own)
    }

    /// Re-scope this field under a different table, keeping the name.
    pub fn rescope(&self, table: &TableIdent) -> FieldIdent {
        table.field(self.name.clone())
    }
}

impl fmt::Display for FieldIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_ident_parsing() {
        let t = TableIdent::new("db.main.events");
        assert_eq!(t.database.as_deref(), Some("db"));
        assert_eq!(t.schema.as_deref(), Some("main"));
        assert_eq!(t.relation.as_deref(), Some("events"));

        let t = TableIdent::new("events");
        assert_eq!(t.database, None);
        assert_eq!(t.schema, None);
        assert_eq!(t.relation.as_deref(), Some("events"));
        assert_eq!(t.to_string(), "events");
    }

    #[test]
    fn test_field_matching_partial_forms() {
        let field = TableIdent::new("db.main.events").field("note");

        assert!(field.matches("note"));
        assert!(field.matches("events.note"));
        assert!(field.matches("main.events.note"));
        assert!(field.matches("db.main.events.note"));

        assert!(!field.matches("other.note"));
        assert!(!field.matches("velocity"));
        assert!(!field.matches("db.other.events.note"));
    }

    #[test]
    fn test_field_matching_glob() {
        let field = TableIdent::relation("events").field("note");
        assert!(field.matches("*.note"));
        assert!(!field.matches("*.velocity"));
    }

    #[test]
    fn test_unqualified_field_only_matches_bare_name() {
        let field = FieldIdent::unqualified("note");
        assert!(field.matches("note"));
        assert!(!field.matches("events.note"));
    }

    #[test]
    fn test_rescope() {
        let field = TableIdent::relation("events").field("note");
        let scoped = field.rescope(&TableIdent::relation("cte"));
        assert!(scoped.matches("cte.note"));
        assert!(!scoped.matches("events.note"));
    }
}
