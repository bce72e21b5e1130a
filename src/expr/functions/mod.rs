//! Function registry, split by invocation category. The same name can live
//! in more than one category; dispatch depends on how it is called. `SUM(x)`
//! in a grouped projection binds an accumulator, `SUM(x) OVER (...)` runs as
//! a window function.

pub mod aggregate;
pub mod scalar;
pub mod table;
pub mod window;
