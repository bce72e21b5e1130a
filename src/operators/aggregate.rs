//! Grouped aggregation.
//!
//! GROUP BY terms are 1-based positional references into the projection
//! list. Each projection is classified at run start as group-defining or
//! aggregating; a projection mixing bare fields with aggregate calls is
//! rejected, as is a bare field that is not grouped. Accumulators are bound
//! fresh per grouping key, so the expression tree itself stays stateless.
//!
//! Nothing can be emitted until the input is exhausted; groups then come out
//! in first-encounter order, values spliced back into projection order.

use crate::error::{DbError, DbResult};
use crate::expr::ast::{Expr, ProjectionList};
use crate::expr::eval::ExpressionEvaluator;
use crate::expr::functions::aggregate::{self, Accumulator};
use crate::operators::{Operator, OperatorArgs, OperatorEnv};
use crate::stream::Rows;
use crate::tuples::context::ExecutionContext;
use crate::tuples::identifiers::TableIdent;
use crate::tuples::rows::Row;
use crate::tuples::values::{group_key, FieldValue};

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub struct AggregateOperator {
    group_by: Vec<Expr>,
    projections: ProjectionList,
}

/// How one projection position contributes to the output.
enum Role {
    /// Evaluated per row; part of the grouping key.
    Group,
    /// A top-level aggregate call, bound per group.
    Aggregate {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },
}

struct GroupState {
    /// Group-defining values in projection-position order.
    values: Vec<FieldValue>,
    accumulators: Vec<Box<dyn Accumulator>>,
}

impl AggregateOperator {
    pub fn new(group_by: Vec<Expr>, projections: ProjectionList) -> Self {
        AggregateOperator {
            group_by,
            projections,
        }
    }

    /// Resolve GROUP BY positions and classify every projection. All the
    /// "bad SQL" validation lives here, before any row is pulled.
    fn classify(&self) -> DbResult<Vec<Role>> {
        let projections = &self.projections.projections;

        let mut grouped_fields: HashSet<String> = HashSet::new();
        let mut group_positions: HashSet<usize> = HashSet::new();
        for grouping in &self.group_by {
            let position = grouping.as_position().ok_or_else(|| {
                DbError::unsupported(
                    "GROUP BY expressions are not implemented; use a positional reference",
                )
            })?;
            if position > projections.len() {
                return Err(DbError::validation(format!(
                    "GROUP BY position {} is out of range",
                    position
                )));
            }
            let projection = &projections[position - 1];
            if !projection.expr.aggregated_fields()?.is_empty() {
                return Err(DbError::validation(
                    "Cannot group by an aggregated projection",
                ));
            }
            grouped_fields.extend(projection.expr.non_aggregated_fields()?);
            group_positions.insert(position - 1);
        }

        let mut roles = Vec::with_capacity(projections.len());
        for (i, projection) in projections.iter().enumerate() {
            let aggregated = projection.expr.aggregated_fields()?;
            let scalar = projection.expr.non_aggregated_fields()?;

            if !aggregated.is_empty() && !scalar.is_empty() {
                return Err(DbError::validation(
                    "Projection mixes aggregated and non-aggregated fields",
                ));
            }
            for field in &scalar {
                if !grouped_fields.contains(field) {
                    return Err(DbError::validation(format!(
                        "Field {} is neither grouped nor aggregated",
                        field
                    )));
                }
            }

            if group_positions.contains(&i) {
                roles.push(Role::Group);
                continue;
            }
            match &projection.expr {
                Expr::AggregateCall {
                    name,
                    args,
                    distinct,
                } => roles.push(Role::Aggregate {
                    name: name.clone(),
                    args: args.clone(),
                    distinct: *distinct,
                }),
                _ if !aggregated.is_empty() => {
                    return Err(DbError::unsupported(
                        "Aggregate projections must be a single aggregate call",
                    ))
                }
                // Without a GROUP BY the single implicit group has no key
                // values, so every projection must aggregate.
                _ if self.group_by.is_empty() => {
                    return Err(DbError::validation(
                        "Projection must be aggregated when there is no GROUP BY",
                    ))
                }
                _ => roles.push(Role::Group),
            }
        }
        Ok(roles)
    }

    fn bind_accumulators(roles: &[Role]) -> DbResult<Vec<Box<dyn Accumulator>>> {
        let mut accumulators = Vec::new();
        for role in roles {
            if let Role::Aggregate { name, distinct, .. } = role {
                let mut acc = aggregate::bind(name, *distinct)?;
                acc.start();
                accumulators.push(acc);
            }
        }
        Ok(accumulators)
    }
}

#[async_trait]
impl Operator for AggregateOperator {
    fn name(&self) -> &'static str {
        "Aggregate"
    }

    async fn run(&self, args: &mut OperatorArgs, env: &OperatorEnv) -> DbResult<Rows> {
        let mut input = args.take_one("rows")?;
        let env = env.clone();
        env.stats.start_running();

        let roles = self.classify()?;

        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, GroupState> = HashMap::new();

        // With no GROUP BY every projection is an aggregate; the single
        // implicit group exists even over zero input rows, which is how
        // COUNT of an empty stream comes back as one row of 0.
        if self.group_by.is_empty() {
            let key = group_key(&[]);
            order.push(key.clone());
            groups.insert(
                key,
                GroupState {
                    values: Vec::new(),
                    accumulators: Self::bind_accumulators(&roles)?,
                },
            );
        }

        while let Some(result) = input.next().await {
            env.check_cancelled()?;
            let row = result?;
            env.stats.row_processed();
            let ctx = ExecutionContext::new(&row);

            let mut group_values = Vec::new();
            let mut agg_inputs: Vec<Vec<FieldValue>> = Vec::new();
            for (i, role) in roles.iter().enumerate() {
                match role {
                    Role::Group => {
                        let expr = &self.projections.projections[i].expr;
                        group_values.push(ExpressionEvaluator::evaluate(expr, &ctx)?);
                    }
                    Role::Aggregate { args, .. } => {
                        let mut values = Vec::with_capacity(args.len());
                        for arg in args {
                            values.push(ExpressionEvaluator::evaluate(arg, &ctx)?);
                        }
                        agg_inputs.push(values);
                    }
                }
            }

            let key = group_key(&group_values);
            if !groups.contains_key(&key) {
                order.push(key.clone());
                groups.insert(
                    key.clone(),
                    GroupState {
                        values: group_values,
                        accumulators: Self::bind_accumulators(&roles)?,
                    },
                );
            }
            let state = groups
                .get_mut(&key)
                .ok_or_else(|| DbError::execution("Aggregation group vanished during update"))?;
            for (acc, values) in state.accumulators.iter_mut().zip(&agg_inputs) {
                acc.update(values)?;
            }
        }

        // Output shape: anonymous table, one field per projection.
        let table = TableIdent::temporary();
        let fields: Vec<_> = self
            .projections
            .projections
            .iter()
            .enumerate()
            .map(|(i, p)| table.field(p.output_name(i)))
            .collect();
        let schema = Arc::new(fields);

        let mut out_rows = Vec::with_capacity(order.len());
        for key in &order {
            let state = groups.get(key).ok_or_else(|| {
                DbError::execution("Aggregation group vanished before emission")
            })?;
            let mut group_iter = state.values.iter();
            let mut acc_iter = state.accumulators.iter();
            let mut data = Vec::with_capacity(roles.len());
            for role in &roles {
                match role {
                    Role::Group => {
                        let value = group_iter.next().ok_or_else(|| {
                            DbError::execution("Aggregation group is missing a key value")
                        })?;
                        data.push(value.clone());
                    }
                    Role::Aggregate { .. } => {
                        let acc = acc_iter.next().ok_or_else(|| {
                            DbError::execution("Aggregation group is missing an accumulator")
                        })?;
                        data.push(acc.result()?);
                    }
                }
            }
            out_rows.push(Row::new(Arc::clone(&schema), data));
        }

        let output = {
            let env = env.clone();
            try_stream! {
                for row in out_rows {
                    env.stats.row_emitted();
                    yield row;
                }
                env.stats.done_running();
            }
        };
        Ok(Rows::from_parts(table, schema, Box::pin(output)))
    }
}
