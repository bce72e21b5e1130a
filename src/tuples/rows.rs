//! Immutable row tuples.
//!
//! A [`Row`] is an ordered tuple of values plus the field list describing it.
//! The field list is shared (`Arc`) across every row of a stream, so cloning
//! rows is cheap. Lookup is by partial-match against qualified field names;
//! a bare name that matches more than one field is an ambiguity error.

use crate::error::{DbError, DbResult};
use crate::tuples::identifiers::FieldIdent;
use crate::tuples::values::FieldValue;
use std::sync::Arc;

/// One tuple of a row stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    fields: Arc<Vec<FieldIdent>>,
    data: Vec<FieldValue>,
}

impl Row {
    pub fn new(fields: Arc<Vec<FieldIdent>>, data: Vec<FieldValue>) -> Self {
        Row { fields, data }
    }

    pub fn fields(&self) -> &[FieldIdent] {
        &self.fields
    }

    pub fn data(&self) -> &[FieldValue] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Positional access.
    pub fn index(&self, i: usize) -> DbResult<&FieldValue> {
        self.data.get(i).ok_or_else(|| {
            DbError::execution(format!(
                "Column index {} out of range for row of width {}",
                i,
                self.data.len()
            ))
        })
    }

    /// Resolve a (possibly qualified) name to exactly one value.
    pub fn field(&self, name: &str) -> DbResult<&FieldValue> {
        let mut found: Option<usize> = None;
        for (i, field) in self.fields.iter().enumerate() {
            if field.matches(name) {
                if found.is_some() {
                    return Err(DbError::AmbiguousField {
                        name: name.to_string(),
                    });
                }
                found = Some(i);
            }
        }
        match found {
            Some(i) => Ok(&self.data[i]),
            None => Err(DbError::UnknownField {
                name: name.to_string(),
            }),
        }
    }

    /// Concatenate two rows: field lists and data, in order. The caller
    /// supplies the merged field list so it is allocated once per stream,
    /// not once per row.
    pub fn merge(left: &Row, right: &Row, fields: Arc<Vec<FieldIdent>>) -> Row {
        let mut data = Vec::with_capacity(left.data.len() + right.data.len());
        data.extend_from_slice(&left.data);
        data.extend_from_slice(&right.data);
        Row { fields, data }
    }

    /// The same data under a different field list, used when an operator
    /// re-scopes a stream without touching values.
    pub fn with_fields(&self, fields: Arc<Vec<FieldIdent>>) -> Row {
        Row {
            fields,
            data: self.data.clone(),
        }
    }
}

/// A row of NULLs matching `fields`, for outer-join padding.
pub fn null_row_data(width: usize) -> Vec<FieldValue> {
    vec![FieldValue::Null; width]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuples::identifiers::TableIdent;

    fn test_row(table: &str, cols: &[(&str, FieldValue)]) -> Row {
        let table = TableIdent::relation(table);
        let fields = Arc::new(
            cols.iter()
                .map(|(name, _)| table.field(*name))
                .collect::<Vec<_>>(),
        );
        let data = cols.iter().map(|(_, value)| value.clone()).collect();
        Row::new(fields, data)
    }

    #[test]
    fn test_field_lookup() {
        let row = test_row(
            "events",
            &[
                ("note", FieldValue::Text("A".to_string())),
                ("velocity", FieldValue::Integer(80)),
            ],
        );

        assert_eq!(
            row.field("note").unwrap(),
            &FieldValue::Text("A".to_string())
        );
        assert_eq!(
            row.field("events.velocity").unwrap(),
            &FieldValue::Integer(80)
        );
        assert!(matches!(
            row.field("missing").unwrap_err(),
            DbError::UnknownField { .. }
        ));
    }

    #[test]
    fn test_ambiguous_lookup() {
        let left = test_row("a", &[("id", FieldValue::Integer(1))]);
        let right = test_row("b", &[("id", FieldValue::Integer(2))]);

        let mut fields = left.fields().to_vec();
        fields.extend(right.fields().to_vec());
        let merged = Row::merge(&left, &right, Arc::new(fields));

        assert!(matches!(
            merged.field("id").unwrap_err(),
            DbError::AmbiguousField { .. }
        ));
        assert_eq!(merged.field("a.id").unwrap(), &FieldValue::Integer(1));
        assert_eq!(merged.field("b.id").unwrap(), &FieldValue::Integer(2));
    }

    #[test]
    fn test_merge_preserves_order() {
        let left = test_row("l", &[("x", FieldValue::Integer(1))]);
        let right = test_row(
            "r",
            &[
                ("y", FieldValue::Integer(2)),
                ("z", FieldValue::Integer(3)),
            ],
        );

        let mut fields = left.fields().to_vec();
        fields.extend(right.fields().to_vec());
        let merged = Row::merge(&left, &right, Arc::new(fields));

        assert_eq!(
            merged.data(),
            &[
                FieldValue::Integer(1),
                FieldValue::Integer(2),
                FieldValue::Integer(3)
            ]
        );
    }
}
