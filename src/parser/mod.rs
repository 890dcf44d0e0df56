// Query language parser module

pub mod ast;
pub mod command;
pub mod lexer;
pub mod pipeline;

// Public API re-exports
pub use ast::{ChartStage, Query, Stage};
pub use pipeline::{parse, parse_query};
