use std::collections::HashMap;

use crate::attribute_info::CodeAttribute;

use super::parser::{code_parser, code_writer_with_addresses};
use super::types::Instruction;
use super::CodeError;

/// One planned splice against a decoded instruction list: insert a block
/// before instruction `at`, optionally removing `at` itself.
///
/// Edits are collected in a read-only pass over the decoded snapshot and
/// applied together by [`apply_edits`], so the instruction list is never
/// mutated while it is being walked.
#[derive(Clone, Debug)]
pub struct CodeEdit {
    at: usize,
    insert: Vec<Instruction>,
    replace: bool,
}

impl CodeEdit {
    /// Replace the instruction at `at` with `insert`. Jumps and exception
    /// ranges that referenced the replaced instruction are redirected to the
    /// first inserted instruction.
    pub fn replace_at(at: usize, insert: Vec<Instruction>) -> CodeEdit {
        CodeEdit { at, insert, replace: true }
    }

    /// Insert `insert` before the instruction at `at`, keeping `at`. Jumps
    /// that targeted `at` keep targeting the original instruction, not the
    /// inserted block, so a loop back to the insertion point does not
    /// re-execute the block.
    pub fn insert_before(at: usize, insert: Vec<Instruction>) -> CodeEdit {
        CodeEdit { at, insert, replace: false }
    }
}

/// Applies a set of splices to a `Code` attribute body.
///
/// Splicing changes byte addresses, so this also remaps every relative
/// branch offset (including `tableswitch`/`lookupswitch` entries) and every
/// exception-table pc through an old-address → new-address map. Untouched
/// instructions keep their relative order. Inserted blocks must be
/// straight-line code: a branch inside an inserted block has no old address
/// to remap from.
pub fn apply_edits(code: &mut CodeAttribute, edits: &[CodeEdit]) -> Result<(), CodeError> {
    let (rest, old) = code_parser(&code.code)?;
    if !rest.is_empty() {
        return Err(CodeError::TrailingBytes { remaining: rest.len() });
    }

    let mut edit_at: HashMap<usize, &CodeEdit> = HashMap::new();
    for edit in edits {
        if edit.at >= old.len() {
            return Err(CodeError::InvalidEdit {
                message: format!(
                    "edit targets instruction {} but the routine has {}",
                    edit.at,
                    old.len()
                ),
            });
        }
        if edit.insert.iter().any(Instruction::is_branch) {
            return Err(CodeError::InvalidEdit {
                message: "inserted blocks must be straight-line code".to_string(),
            });
        }
        if edit_at.insert(edit.at, edit).is_some() {
            return Err(CodeError::InvalidEdit {
                message: format!("two edits target instruction {}", edit.at),
            });
        }
    }

    let old_len = code.code.len() as u32;
    let mut index_at_address = HashMap::new();
    for (i, (address, _)) in old.iter().enumerate() {
        index_at_address.insert(*address, i);
    }

    // Build the new instruction list, remembering for every old instruction
    // both where a jump to it should now land and (if it survived) where the
    // instruction itself now lives.
    let mut new_insns: Vec<Instruction> = Vec::with_capacity(old.len());
    let mut target_index_of_old: Vec<usize> = Vec::with_capacity(old.len());
    let mut kept_index_of_old: Vec<Option<usize>> = Vec::with_capacity(old.len());
    for (i, (_, insn)) in old.iter().enumerate() {
        match edit_at.get(&i) {
            Some(edit) if edit.replace => {
                target_index_of_old.push(new_insns.len());
                kept_index_of_old.push(None);
                new_insns.extend(edit.insert.iter().cloned());
            }
            Some(edit) => {
                new_insns.extend(edit.insert.iter().cloned());
                target_index_of_old.push(new_insns.len());
                kept_index_of_old.push(Some(new_insns.len()));
                new_insns.push(insn.clone());
            }
            None => {
                target_index_of_old.push(new_insns.len());
                kept_index_of_old.push(Some(new_insns.len()));
                new_insns.push(insn.clone());
            }
        }
    }

    // Lay the new list out once to learn the new addresses. Offset fixes
    // below never change instruction sizes (switch padding depends only on
    // the address, which is already final), so one layout pass is enough.
    let (draft, new_addresses) = code_writer_with_addresses(&new_insns)?;
    let new_len = draft.len() as u32;

    let map_address = |address: u32| -> Result<u32, CodeError> {
        if address == old_len {
            return Ok(new_len);
        }
        let index = index_at_address
            .get(&address)
            .ok_or(CodeError::BranchTarget { address })?;
        Ok(new_addresses[target_index_of_old[*index]])
    };

    let remap = |old_address: u32, offset: i64, new_address: u32| -> Result<i64, CodeError> {
        let target = old_address as i64 + offset;
        let target = u32::try_from(target)
            .map_err(|_| CodeError::BranchTarget { address: old_address })?;
        Ok(map_address(target)? as i64 - new_address as i64)
    };

    for (i, (old_address, _)) in old.iter().enumerate() {
        let Some(j) = kept_index_of_old[i] else { continue };
        let new_address = new_addresses[j];
        match &mut new_insns[j] {
            Instruction::Goto(offset)
            | Instruction::Jsr(offset)
            | Instruction::Ifeq(offset)
            | Instruction::Ifne(offset)
            | Instruction::Iflt(offset)
            | Instruction::Ifge(offset)
            | Instruction::Ifgt(offset)
            | Instruction::Ifle(offset)
            | Instruction::IfIcmpeq(offset)
            | Instruction::IfIcmpne(offset)
            | Instruction::IfIcmplt(offset)
            | Instruction::IfIcmpge(offset)
            | Instruction::IfIcmpgt(offset)
            | Instruction::IfIcmple(offset)
            | Instruction::IfAcmpeq(offset)
            | Instruction::IfAcmpne(offset)
            | Instruction::Ifnull(offset)
            | Instruction::Ifnonnull(offset) => {
                let adjusted = remap(*old_address, *offset as i64, new_address)?;
                *offset = i16::try_from(adjusted)
                    .map_err(|_| CodeError::OffsetOverflow { address: new_address })?;
            }
            Instruction::GotoW(offset) | Instruction::JsrW(offset) => {
                let adjusted = remap(*old_address, *offset as i64, new_address)?;
                *offset = i32::try_from(adjusted)
                    .map_err(|_| CodeError::OffsetOverflow { address: new_address })?;
            }
            Instruction::Tableswitch { default, offsets, .. } => {
                let adjusted = remap(*old_address, *default as i64, new_address)?;
                *default = i32::try_from(adjusted)
                    .map_err(|_| CodeError::OffsetOverflow { address: new_address })?;
                for offset in offsets {
                    let adjusted = remap(*old_address, *offset as i64, new_address)?;
                    *offset = i32::try_from(adjusted)
                        .map_err(|_| CodeError::OffsetOverflow { address: new_address })?;
                }
            }
            Instruction::Lookupswitch { default, pairs, .. } => {
                let adjusted = remap(*old_address, *default as i64, new_address)?;
                *default = i32::try_from(adjusted)
                    .map_err(|_| CodeError::OffsetOverflow { address: new_address })?;
                for (_, offset) in pairs {
                    let adjusted = remap(*old_address, *offset as i64, new_address)?;
                    *offset = i32::try_from(adjusted)
                        .map_err(|_| CodeError::OffsetOverflow { address: new_address })?;
                }
            }
            _ => {}
        }
    }

    // Exception ranges use absolute pcs; end_pc may legally equal the code
    // length.
    for entry in &mut code.exception_table {
        entry.start_pc = map_pc(entry.start_pc, &map_address)?;
        entry.end_pc = map_pc(entry.end_pc, &map_address)?;
        entry.handler_pc = map_pc(entry.handler_pc, &map_address)?;
    }

    let (bytes, _) = code_writer_with_addresses(&new_insns)?;
    code.code_length = bytes.len() as u32;
    code.code = bytes;
    Ok(())
}

fn map_pc(
    pc: u16,
    map_address: &impl Fn(u32) -> Result<u32, CodeError>,
) -> Result<u16, CodeError> {
    let mapped = map_address(pc as u32)?;
    u16::try_from(mapped).map_err(|_| CodeError::OffsetOverflow { address: mapped })
}
