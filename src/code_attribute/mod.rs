mod edit;
mod parser;
mod types;

use std::fmt;

pub use self::edit::{apply_edits, CodeEdit};
pub use self::parser::{code_parser, code_writer, code_writer_with_addresses, instruction_parser};
pub use self::types::Instruction;

/// Errors from decoding, editing, or re-encoding a method's instruction
/// stream.
#[derive(Clone, Debug, PartialEq)]
pub enum CodeError {
    /// The code array ended with bytes that do not decode to an instruction.
    TrailingBytes { remaining: usize },
    /// An edit request did not line up with the decoded instruction list.
    InvalidEdit { message: String },
    /// A branch or exception-table entry referenced an address that is not
    /// an instruction boundary.
    BranchTarget { address: u32 },
    /// An adjusted branch offset or exception-table pc no longer fits its
    /// encoded width after splicing.
    OffsetOverflow { address: u32 },
    /// Instruction re-encoding failed.
    Encode { message: String },
    /// A Code attribute body could not be decoded or encoded.
    Attribute { message: String },
}

impl fmt::Display for CodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeError::TrailingBytes { remaining } => {
                write!(f, "{} trailing bytes after last decodable instruction", remaining)
            }
            CodeError::InvalidEdit { message } => write!(f, "invalid code edit: {}", message),
            CodeError::BranchTarget { address } => {
                write!(f, "address {} is not an instruction boundary", address)
            }
            CodeError::OffsetOverflow { address } => {
                write!(f, "offset at address {} overflows its encoding after splice", address)
            }
            CodeError::Encode { message } => write!(f, "encode error: {}", message),
            CodeError::Attribute { message } => write!(f, "attribute error: {}", message),
        }
    }
}

impl std::error::Error for CodeError {}
