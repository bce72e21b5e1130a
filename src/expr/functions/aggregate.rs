//! Aggregate accumulators.
//!
//! An [`Accumulator`] holds the mutable state of one aggregate call for one
//! grouping key. The aggregate operator binds a fresh set per key:
//! `start()` resets state, `update()` runs once per row in the group with
//! the already-evaluated argument values, `result()` finalizes.

use crate::error::{DbError, DbResult};
use crate::tuples::values::{group_key, FieldValue};
use std::collections::HashSet;

/// Per-group aggregate state.
pub trait Accumulator: Send {
    fn start(&mut self);
    fn update(&mut self, values: &[FieldValue]) -> DbResult<()>;
    fn result(&self) -> DbResult<FieldValue>;
}

/// Resolve an aggregate by case-insensitive name into a fresh accumulator.
pub fn bind(name: &str, distinct: bool) -> DbResult<Box<dyn Accumulator>> {
    match name.to_uppercase().as_str() {
        "MIN" => Ok(Box::new(MinMax::new(false))),
        "MAX" => Ok(Box::new(MinMax::new(true))),
        "SUM" => Ok(Box::new(Sum::default())),
        "AVG" | "MEAN" => Ok(Box::new(Average::default())),
        "COUNT" => Ok(Box::new(Count::new(distinct))),
        "LIST_AGG" | "LISTAGG" => Ok(Box::new(ListAgg::new(distinct))),
        _ => Err(DbError::unknown_function(name, "aggregate")),
    }
}

/// True when `name` resolves to an aggregate.
pub fn exists(name: &str) -> bool {
    matches!(
        name.to_uppercase().as_str(),
        "MIN" | "MAX" | "SUM" | "AVG" | "MEAN" | "COUNT" | "LIST_AGG" | "LISTAGG"
    )
}

fn first_value<'a>(values: &'a [FieldValue], name: &str) -> DbResult<&'a FieldValue> {
    values
        .first()
        .ok_or_else(|| DbError::execution(format!("{} requires an argument", name)))
}

/// MIN and MAX share one shape; NULL inputs are skipped.
struct MinMax {
    take_greater: bool,
    current: Option<FieldValue>,
}

impl MinMax {
    fn new(take_greater: bool) -> Self {
        MinMax {
            take_greater,
            current: None,
        }
    }

    fn name(&self) -> &'static str {
        if self.take_greater {
            "MAX"
        } else {
            "MIN"
        }
    }
}

impl Accumulator for MinMax {
    fn start(&mut self) {
        self.current = None;
    }

    fn update(&mut self, values: &[FieldValue]) -> DbResult<()> {
        let value = first_value(values, self.name())?;
        if value.is_null() {
            return Ok(());
        }
        match &self.current {
            None => self.current = Some(value.clone()),
            Some(current) => {
                let replace = match value.compare(current)? {
                    Some(ordering) => {
                        if self.take_greater {
                            ordering == std::cmp::Ordering::Greater
                        } else {
                            ordering == std::cmp::Ordering::Less
                        }
                    }
                    None => false,
                };
                if replace {
                    self.current = Some(value.clone());
                }
            }
        }
        Ok(())
    }

    fn result(&self) -> DbResult<FieldValue> {
        Ok(self.current.clone().unwrap_or(FieldValue::Null))
    }
}

#[derive(Default)]
struct Sum {
    total: Option<FieldValue>,
}

impl Accumulator for Sum {
    fn start(&mut self) {
        self.total = None;
    }

    fn update(&mut self, values: &[FieldValue]) -> DbResult<()> {
        let value = first_value(values, "SUM")?;
        if value.is_null() {
            return Ok(());
        }
        if !value.is_numeric() {
            return Err(DbError::type_error("numeric", value.type_name()));
        }
        self.total = Some(match &self.total {
            None => value.clone(),
            Some(total) => total.add(value)?,
        });
        Ok(())
    }

    fn result(&self) -> DbResult<FieldValue> {
        Ok(self.total.clone().unwrap_or(FieldValue::Null))
    }
}

#[derive(Default)]
struct Average {
    total: f64,
    seen: u64,
}

impl Accumulator for Average {
    fn start(&mut self) {
        self.total = 0.0;
        self.seen = 0;
    }

    fn update(&mut self, values: &[FieldValue]) -> DbResult<()> {
        match first_value(values, "AVG")? {
            FieldValue::Integer(i) => {
                self.total += *i as f64;
                self.seen += 1;
            }
            FieldValue::Float(f) => {
                self.total += f;
                self.seen += 1;
            }
            FieldValue::Null => {}
            other => return Err(DbError::type_error("numeric", other.type_name())),
        }
        Ok(())
    }

    fn result(&self) -> DbResult<FieldValue> {
        if self.seen == 0 {
            Ok(FieldValue::Null)
        } else {
            Ok(FieldValue::Float(self.total / self.seen as f64))
        }
    }
}

/// COUNT counts every evaluated argument, NULL included; `COUNT(1)` is the
/// row count. With DISTINCT only the first occurrence of each value counts.
struct Count {
    distinct: bool,
    seen: HashSet<String>,
    count: i64,
}

impl Count {
    fn new(distinct: bool) -> Self {
        Count {
            distinct,
            seen: HashSet::new(),
            count: 0,
        }
    }
}

impl Accumulator for Count {
    fn start(&mut self) {
        self.seen.clear();
        self.count = 0;
    }

    fn update(&mut self, values: &[FieldValue]) -> DbResult<()> {
        let value = first_value(values, "COUNT")?;
        if self.distinct {
            self.seen.insert(group_key(std::slice::from_ref(value)));
        } else {
            self.count += 1;
        }
        Ok(())
    }

    fn result(&self) -> DbResult<FieldValue> {
        if self.distinct {
            Ok(FieldValue::Integer(self.seen.len() as i64))
        } else {
            Ok(FieldValue::Integer(self.count))
        }
    }
}

/// LIST_AGG(value [, delimiter]) joins rendered values in encounter order.
struct ListAgg {
    distinct: bool,
    delimiter: String,
    items: Vec<String>,
}

impl ListAgg {
    fn new(distinct: bool) -> Self {
        ListAgg {
            distinct,
            delimiter: ",".to_string(),
            items: Vec::new(),
        }
    }
}

impl Accumulator for ListAgg {
    fn start(&mut self) {
        self.items.clear();
        self.delimiter = ",".to_string();
    }

    fn update(&mut self, values: &[FieldValue]) -> DbResult<()> {
        let value = first_value(values, "LIST_AGG")?;
        if let Some(delimiter) = values.get(1) {
            match delimiter {
                FieldValue::Text(s) => self.delimiter = s.clone(),
                other => {
                    return Err(DbError::type_error(
                        "string delimiter",
                        other.type_name(),
                    ))
                }
            }
        }
        if !value.is_null() {
            self.items.push(value.to_display_string());
        }
        Ok(())
    }

    fn result(&self) -> DbResult<FieldValue> {
        let joined = if self.distinct {
            let mut seen = HashSet::new();
            let mut unique = Vec::new();
            for item in &self.items {
                if seen.insert(item.clone()) {
                    unique.push(item.clone());
                }
            }
            unique.join(&self.delimiter)
        } else {
            self.items.join(&self.delimiter)
        };
        Ok(FieldValue::Text(joined))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(name: &str, distinct: bool, rows: &[&[FieldValue]]) -> FieldValue {
        let mut acc = bind(name, distinct).unwrap();
        acc.start();
        for values in rows {
            acc.update(values).unwrap();
        }
        acc.result().unwrap()
    }

    #[test]
    fn test_count_includes_every_row() {
        let result = run(
            "COUNT",
            false,
            &[
                &[FieldValue::Integer(1)],
                &[FieldValue::Integer(1)],
                &[FieldValue::Null],
            ],
        );
        assert_eq!(result, FieldValue::Integer(3));
    }

    #[test]
    fn test_count_over_no_rows_is_zero() {
        assert_eq!(run("COUNT", false, &[]), FieldValue::Integer(0));
    }

    #[test]
    fn test_count_distinct() {
        let result = run(
            "count",
            true,
            &[
                &[FieldValue::Text("a".to_string())],
                &[FieldValue::Text("a".to_string())],
                &[FieldValue::Text("b".to_string())],
            ],
        );
        assert_eq!(result, FieldValue::Integer(2));
    }

    #[test]
    fn test_sum_skips_nulls() {
        let result = run(
            "SUM",
            false,
            &[
                &[FieldValue::Integer(2)],
                &[FieldValue::Null],
                &[FieldValue::Integer(3)],
            ],
        );
        assert_eq!(result, FieldValue::Integer(5));
    }

    #[test]
    fn test_sum_of_nothing_is_null() {
        assert_eq!(run("SUM", false, &[]), FieldValue::Null);
    }

    #[test]
    fn test_min_max() {
        let values: Vec<&[FieldValue]> = vec![
            &[FieldValue::Integer(3)],
            &[FieldValue::Integer(1)],
            &[FieldValue::Integer(2)],
        ];
        assert_eq!(run("MIN", false, &values), FieldValue::Integer(1));
        assert_eq!(run("MAX", false, &values), FieldValue::Integer(3));
    }

    #[test]
    fn test_avg() {
        let result = run(
            "AVG",
            false,
            &[&[FieldValue::Integer(1)], &[FieldValue::Integer(2)]],
        );
        assert_eq!(result, FieldValue::Float(1.5));
    }

    #[test]
    fn test_list_agg_with_delimiter() {
        let delim = FieldValue::Text("|".to_string());
        let result = run(
            "LIST_AGG",
            false,
            &[
                &[FieldValue::Text("a".to_string()), delim.clone()],
                &[FieldValue::Text("b".to_string()), delim.clone()],
            ],
        );
        assert_eq!(result, FieldValue::Text("a|b".to_string()));
    }

    #[test]
    fn test_unknown_aggregate() {
        assert!(bind("MEDIAN", false).is_err());
    }
}
