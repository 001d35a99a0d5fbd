extern crate classfile_stringpool;

use classfile_stringpool::attribute_info::{CodeAttribute, ExceptionEntry};
use classfile_stringpool::code_attribute::{
    apply_edits, code_parser, code_writer, CodeEdit, CodeError, Instruction,
};

fn code_from(instructions: &[Instruction]) -> CodeAttribute {
    let code = code_writer(instructions).unwrap();
    CodeAttribute {
        max_stack: 4,
        max_locals: 1,
        code_length: code.len() as u32,
        code,
        exception_table_length: 0,
        exception_table: Vec::new(),
        attributes_count: 0,
        attributes: Vec::new(),
    }
}

fn decode(code: &CodeAttribute) -> Vec<(u32, Instruction)> {
    let (rest, instructions) = code_parser(&code.code).unwrap();
    assert!(rest.is_empty());
    instructions
}

#[test]
fn insert_before_grows_forward_branch() {
    // goto skips over the nop it targets being pushed further away.
    let mut code = code_from(&[
        Instruction::Goto(3),
        Instruction::Nop,
        Instruction::Return,
    ]);
    apply_edits(
        &mut code,
        &[CodeEdit::insert_before(1, vec![Instruction::Nop, Instruction::Nop])],
    )
    .unwrap();
    let decoded = decode(&code);
    assert_eq!(decoded[0], (0, Instruction::Goto(5)));
    assert_eq!(decoded.len(), 5);
}

#[test]
fn insert_before_keeps_backward_branch_on_original_instruction() {
    // The loop header gets a block inserted before it; the back edge must
    // still land on the header, not on the inserted block.
    let mut code = code_from(&[Instruction::Nop, Instruction::Goto(-1)]);
    apply_edits(
        &mut code,
        &[CodeEdit::insert_before(0, vec![Instruction::Nop, Instruction::Nop])],
    )
    .unwrap();
    let decoded = decode(&code);
    // layout: nop@0 nop@1 nop@2 goto@3, back edge to address 2
    assert_eq!(decoded[3], (3, Instruction::Goto(-1)));
}

#[test]
fn replace_at_redirects_branch_to_replacement_start() {
    let mut code = code_from(&[Instruction::Nop, Instruction::Goto(-1)]);
    apply_edits(
        &mut code,
        &[CodeEdit::replace_at(0, vec![Instruction::Iconst0, Instruction::Pop])],
    )
    .unwrap();
    let decoded = decode(&code);
    // layout: iconst_0@0 pop@1 goto@2, edge to address 0
    assert_eq!(decoded[2], (2, Instruction::Goto(-2)));
}

#[test]
fn lookupswitch_offsets_are_remapped() {
    // switch@0 occupies 20 bytes (1 opcode + 3 pad + default + npairs + one
    // pair); default hits the nop, the pair hits the return.
    let mut code = code_from(&[
        Instruction::Lookupswitch {
            default: 20,
            npairs: 1,
            pairs: vec![(0, 21)],
        },
        Instruction::Nop,
        Instruction::Return,
    ]);
    apply_edits(&mut code, &[CodeEdit::insert_before(1, vec![Instruction::Nop])]).unwrap();
    let decoded = decode(&code);
    match &decoded[0].1 {
        Instruction::Lookupswitch { default, pairs, .. } => {
            assert_eq!(*default, 21);
            assert_eq!(pairs, &[(0, 22)]);
        }
        other => panic!("expected lookupswitch, got {:?}", other),
    }
}

#[test]
fn tableswitch_offsets_are_remapped() {
    // switch@0 occupies 24 bytes (1 opcode + 3 pad + default + low/high +
    // two offsets); default and the second offset hit the nop, the first
    // offset hits the return.
    let mut code = code_from(&[
        Instruction::Tableswitch {
            default: 24,
            low: 0,
            high: 1,
            offsets: vec![25, 24],
        },
        Instruction::Nop,
        Instruction::Return,
    ]);
    apply_edits(&mut code, &[CodeEdit::insert_before(1, vec![Instruction::Nop])]).unwrap();
    let decoded = decode(&code);
    match &decoded[0].1 {
        Instruction::Tableswitch { default, offsets, .. } => {
            assert_eq!(*default, 25);
            assert_eq!(offsets, &[26, 25]);
        }
        other => panic!("expected tableswitch, got {:?}", other),
    }
}

#[test]
fn exception_table_pcs_shift_with_the_splice() {
    let mut code = code_from(&[Instruction::Nop, Instruction::Athrow, Instruction::Return]);
    code.exception_table.push(ExceptionEntry {
        start_pc: 0,
        end_pc: 2,
        handler_pc: 2,
        catch_type: 0,
    });
    code.exception_table_length = 1;
    apply_edits(
        &mut code,
        &[CodeEdit::insert_before(0, vec![Instruction::Nop, Instruction::Nop])],
    )
    .unwrap();
    let entry = &code.exception_table[0];
    assert_eq!(entry.start_pc, 2);
    assert_eq!(entry.end_pc, 4);
    assert_eq!(entry.handler_pc, 4);
}

#[test]
fn end_pc_at_code_length_maps_to_new_length() {
    let mut code = code_from(&[Instruction::Nop, Instruction::Return]);
    code.exception_table.push(ExceptionEntry {
        start_pc: 0,
        end_pc: 2,
        handler_pc: 0,
        catch_type: 0,
    });
    code.exception_table_length = 1;
    apply_edits(&mut code, &[CodeEdit::insert_before(1, vec![Instruction::Nop])]).unwrap();
    assert_eq!(code.exception_table[0].end_pc, 3);
    assert_eq!(code.code_length, 3);
}

#[test]
fn duplicate_edits_on_one_instruction_are_rejected() {
    let mut code = code_from(&[Instruction::Nop, Instruction::Return]);
    let result = apply_edits(
        &mut code,
        &[
            CodeEdit::insert_before(0, vec![Instruction::Nop]),
            CodeEdit::replace_at(0, vec![Instruction::Nop]),
        ],
    );
    assert!(matches!(result, Err(CodeError::InvalidEdit { .. })));
}

#[test]
fn branches_inside_inserted_blocks_are_rejected() {
    let mut code = code_from(&[Instruction::Return]);
    let result = apply_edits(
        &mut code,
        &[CodeEdit::insert_before(0, vec![Instruction::Goto(0)])],
    );
    assert!(matches!(result, Err(CodeError::InvalidEdit { .. })));
}

#[test]
fn out_of_bounds_edit_is_rejected() {
    let mut code = code_from(&[Instruction::Return]);
    let result = apply_edits(&mut code, &[CodeEdit::insert_before(1, vec![Instruction::Nop])]);
    assert!(matches!(result, Err(CodeError::InvalidEdit { .. })));
}

#[test]
fn no_edits_is_a_no_op() {
    let original = code_from(&[
        Instruction::Iconst0,
        Instruction::Ifeq(4),
        Instruction::Nop,
        Instruction::Return,
    ]);
    let mut code = original.clone();
    apply_edits(&mut code, &[]).unwrap();
    assert_eq!(code.code, original.code);
}
