use binrw::io::Cursor;
use binrw::{BinRead, BinWrite};

use super::types::Instruction;
use super::CodeError;

/// Decodes a single instruction from the front of `input`. `address` is the
/// bytecode offset of the instruction within its method, needed for switch
/// alignment. Returns the unconsumed remainder alongside the instruction.
pub fn instruction_parser(input: &[u8], address: u32) -> Result<(&[u8], Instruction), CodeError> {
    let mut cursor = Cursor::new(input);
    let instruction = Instruction::read_args(&mut cursor, binrw::args! { address })
        .map_err(|e| CodeError::Encode {
            message: format!("undecodable instruction at address {}: {}", address, e),
        })?;
    Ok((&input[cursor.position() as usize..], instruction))
}

/// Decodes a whole code array into `(address, instruction)` pairs.
///
/// Decoding stops at the first byte sequence that is not a complete
/// instruction; whatever is left is returned as the remainder, so callers
/// decide whether a non-empty tail is an error.
#[allow(clippy::type_complexity)]
pub fn code_parser(input: &[u8]) -> Result<(&[u8], Vec<(u32, Instruction)>), CodeError> {
    let mut instructions = Vec::new();
    let mut offset = 0usize;
    while offset < input.len() {
        let address = offset as u32;
        match instruction_parser(&input[offset..], address) {
            Ok((rest, instruction)) => {
                let consumed = input.len() - offset - rest.len();
                instructions.push((address, instruction));
                offset += consumed;
            }
            Err(_) => break,
        }
    }
    Ok((&input[offset..], instructions))
}

/// Encodes an instruction sequence back into a code array.
pub fn code_writer(instructions: &[Instruction]) -> Result<Vec<u8>, CodeError> {
    code_writer_with_addresses(instructions).map(|(bytes, _)| bytes)
}

/// Encodes an instruction sequence, also returning the byte address each
/// instruction was laid out at. The splice layer uses the addresses to remap
/// branch offsets before the final encode.
pub fn code_writer_with_addresses(
    instructions: &[Instruction],
) -> Result<(Vec<u8>, Vec<u32>), CodeError> {
    let mut cursor = Cursor::new(Vec::new());
    let mut addresses = Vec::with_capacity(instructions.len());
    for instruction in instructions {
        let address = cursor.position() as u32;
        addresses.push(address);
        instruction
            .write_args(&mut cursor, binrw::args! { address })
            .map_err(|e| CodeError::Encode {
                message: format!("failed to encode {:?} at address {}: {}", instruction, address, e),
            })?;
    }
    Ok((cursor.into_inner(), addresses))
}
