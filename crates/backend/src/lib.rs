mod block;
pub mod expr;
pub mod func;
pub mod program;
pub mod types;

pub use func::{CBlock, Func};
pub use program::{GlobalValue, Program, Struct};
pub use types::{binary_join, CType};

use thiserror::Error;

/// Errors surfaced by `Program::translate` and the emit entry points.
/// None are recovered internally; partial output is never produced.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("unsupported {kind}: {what}")]
    Unsupported { kind: &'static str, what: String },
    #[error("malformed IR: {0}")]
    MalformedIr(String),
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl TranslateError {
    pub(crate) fn unsupported(kind: &'static str, what: impl Into<String>) -> Self {
        TranslateError::Unsupported {
            kind,
            what: what.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TranslateError>;

/// Translate a parsed LLVM module into its C representation.
pub fn translate(module: &parse::ast::Module) -> Result<Program> {
    Program::translate(module)
}
