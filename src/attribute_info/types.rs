use binrw::io::Cursor;
use binrw::{binrw, BinRead, BinWrite};

use crate::code_attribute::CodeError;

/// A raw, undecoded attribute. The pass only ever decodes `Code` attributes;
/// everything else is carried through untouched as bytes.
#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct AttributeInfo {
    pub attribute_name_index: u16,
    pub attribute_length: u32,
    #[br(count = attribute_length as usize)]
    pub info: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

/// The decoded body of a `Code` attribute (JVMS §4.7.3). The instruction
/// stream itself stays as raw bytes here; `code_attribute::code_parser`
/// decodes it and `code_attribute::code_writer` re-encodes it.
#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_length: u32,
    #[br(count = code_length as usize)]
    pub code: Vec<u8>,
    pub exception_table_length: u16,
    #[br(count = exception_table_length)]
    pub exception_table: Vec<ExceptionEntry>,
    pub attributes_count: u16,
    #[br(count = attributes_count)]
    pub attributes: Vec<AttributeInfo>,
}

impl CodeAttribute {
    /// Decodes the body of an attribute previously identified as `Code`.
    pub fn from_attribute(attr: &AttributeInfo) -> Result<CodeAttribute, CodeError> {
        CodeAttribute::read(&mut Cursor::new(&attr.info)).map_err(|e| CodeError::Attribute {
            message: format!("failed to decode Code attribute: {}", e),
        })
    }

    /// Re-encodes this attribute into `attr`, syncing the length-prefix
    /// fields first so the written bytes are self-consistent.
    pub fn store_into(&mut self, attr: &mut AttributeInfo) -> Result<(), CodeError> {
        self.code_length = self.code.len() as u32;
        self.exception_table_length = self.exception_table.len() as u16;
        self.attributes_count = self.attributes.len() as u16;

        let mut out = Cursor::new(Vec::new());
        self.write(&mut out).map_err(|e| CodeError::Attribute {
            message: format!("failed to encode Code attribute: {}", e),
        })?;
        let bytes = out.into_inner();
        attr.attribute_length = bytes.len() as u32;
        attr.info = bytes;
        Ok(())
    }
}
