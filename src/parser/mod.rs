//! Parser for the placeholder language embedded in document parts

pub mod ast;
mod grammar;
pub mod lexer;

pub use ast::*;
pub use grammar::parse;
