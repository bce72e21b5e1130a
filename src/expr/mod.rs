//! Expression trees and their evaluation.

pub mod ast;
pub mod eval;
pub mod functions;

pub use ast::{
    BinaryOp, Expr, FrameBound, FrameSpec, Projection, ProjectionList, SortTerm, WindowSpec,
};
pub use eval::ExpressionEvaluator;
