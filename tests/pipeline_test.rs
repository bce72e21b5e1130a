//! Pipelines exercising stream fan-out, projection, window functions, and
//! scope renaming through complete plans.

use dbdb::expr::ast::{BinaryOp, FrameBound, FrameSpec, WindowSpec};
use dbdb::operators::distinct::DistinctOperator;
use dbdb::operators::filter::FilterOperator;
use dbdb::operators::joins::{JoinCondition, JoinKind, NestedLoopJoinOperator};
use dbdb::operators::project::ProjectOperator;
use dbdb::operators::rename::RenameScopeOperator;
use dbdb::operators::table_function::TableFunctionOperator;
use dbdb::operators::union::UnionOperator;
use dbdb::{
    Engine, Expr, FieldValue, Plan, Projection, ProjectionList, SortTerm, TableIdent,
};

fn series(plan: &mut Plan, name: &str, count: i64) -> dbdb::NodeId {
    plan.add_node(Box::new(TableFunctionOperator::new(
        TableIdent::relation(name),
        "GENERATE_SERIES",
        vec![FieldValue::Integer(count)],
    )))
}

fn ints(rows: &[Vec<FieldValue>], index: usize) -> Vec<i64> {
    rows.iter()
        .map(|row| match &row[index] {
            FieldValue::Integer(i) => *i,
            other => panic!("expected integer, got {:?}", other),
        })
        .collect()
}

#[tokio::test]
async fn test_one_source_feeds_two_branches() {
    // The same generator output is consumed by two filters and re-unioned;
    // multicast replay means the generator itself runs only once.
    let mut plan = Plan::new();
    let source = series(&mut plan, "series", 6);
    let low = plan.add_node(Box::new(FilterOperator::new(Expr::binary(
        BinaryOp::Lt,
        Expr::column("i"),
        Expr::int(3),
    ))));
    let high = plan.add_node(Box::new(FilterOperator::new(Expr::binary(
        BinaryOp::GtEq,
        Expr::column("i"),
        Expr::int(4),
    ))));
    let union = plan.add_node(Box::new(UnionOperator::new(false)));
    plan.add_edge(source, low, "rows");
    plan.add_edge(source, high, "rows");
    plan.add_list_edge(low, union, "inputs");
    plan.add_list_edge(high, union, "inputs");

    let result = Engine::new().run(plan).await.unwrap();
    assert_eq!(ints(&result.rows, 0), vec![0, 1, 2, 4, 5]);
}

#[tokio::test]
async fn test_projection_with_aliases_and_arithmetic() {
    let mut plan = Plan::new();
    let source = series(&mut plan, "series", 3);
    let project = plan.add_node(Box::new(ProjectOperator::new(ProjectionList::new(vec![
        Projection::new(Expr::Star),
        Projection::aliased(
            Expr::binary(BinaryOp::Multiply, Expr::column("i"), Expr::int(10)),
            "tens",
        ),
    ]))));
    plan.add_edge(source, project, "rows");

    let result = Engine::new().run(plan).await.unwrap();
    assert_eq!(result.columns, vec!["i".to_string(), "tens".to_string()]);
    assert_eq!(ints(&result.rows, 1), vec![0, 10, 20]);
}

#[tokio::test]
async fn test_running_sum_window_preserves_input_order() {
    let mut plan = Plan::new();
    let source = series(&mut plan, "series", 4);
    let window = plan.add_node(Box::new(ProjectOperator::new(ProjectionList::new(vec![
        Projection::new(Expr::column("i")),
        Projection::aliased(
            Expr::WindowCall {
                name: "SUM".to_string(),
                args: vec![Expr::column("i")],
                spec: WindowSpec {
                    partition_by: vec![],
                    order_by: vec![SortTerm::asc(Expr::column("i"))],
                    frame: Some(FrameSpec {
                        start: FrameBound::UnboundedPreceding,
                        end: FrameBound::CurrentRow,
                    }),
                },
            },
            "running",
        ),
    ]))));
    plan.add_edge(source, window, "rows");

    let result = Engine::new().run(plan).await.unwrap();
    assert_eq!(ints(&result.rows, 0), vec![0, 1, 2, 3]);
    assert_eq!(ints(&result.rows, 1), vec![0, 1, 3, 6]);
}

#[tokio::test]
async fn test_rename_scope_changes_qualified_resolution() {
    let mut plan = Plan::new();
    let source = series(&mut plan, "series", 3);
    let renamed = plan.add_node(Box::new(RenameScopeOperator::new("cte")));
    let filter = plan.add_node(Box::new(FilterOperator::new(Expr::binary(
        BinaryOp::Gt,
        Expr::column("cte.i"),
        Expr::int(0),
    ))));
    plan.add_edge(source, renamed, "rows");
    plan.add_edge(renamed, filter, "rows");

    let result = Engine::new().run(plan).await.unwrap();
    assert_eq!(ints(&result.rows, 0), vec![1, 2]);
}

#[tokio::test]
async fn test_cross_join_then_distinct() {
    // 3 x 2 cross product, projected down to the left column, deduplicated.
    let mut plan = Plan::new();
    let left = series(&mut plan, "a", 3);
    let right = series(&mut plan, "b", 2);
    let join = plan.add_node(Box::new(NestedLoopJoinOperator::new(
        JoinKind::Cross,
        JoinCondition::Unconditional,
    )));
    let project = plan.add_node(Box::new(ProjectOperator::new(ProjectionList::new(vec![
        Projection::new(Expr::column("a.i")),
    ]))));
    let distinct = plan.add_node(Box::new(DistinctOperator::new()));
    plan.add_edge(left, join, "left");
    plan.add_edge(right, join, "right");
    plan.add_edge(join, project, "rows");
    plan.add_edge(project, distinct, "rows");

    let result = Engine::new().run(plan).await.unwrap();
    assert_eq!(ints(&result.rows, 0), vec![0, 1, 2]);
}
