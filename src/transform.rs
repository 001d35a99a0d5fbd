//! The string-pool rewriting pass.
//!
//! One invocation owns a mutable [`ClassFile`] for its duration and runs five
//! ordered stages: eligibility check, constant scan, pool build, load
//! rewriting, and initializer synthesis. The scan must complete before any
//! rewriting starts so pool indices are frozen; a pool miss during rewriting
//! is therefore a broken invariant and aborts the class loudly.

use std::fmt;

use crate::attribute_info::{AttributeInfo, CodeAttribute};
use crate::code_attribute::{apply_edits, code_parser, code_writer, CodeEdit, CodeError, Instruction};
use crate::field_info::{FieldAccessFlags, FieldInfo};
use crate::method_info::{MethodAccessFlags, MethodInfo};
use crate::string_pool::StringPool;
use crate::{ClassAccessFlags, ClassFile};

/// Name of the synthesized array field. Reserved: later passes and the host
/// pipeline must tolerate it, and a class that already declares it is
/// rejected.
pub const POOL_FIELD_NAME: &str = "arrayOfStrings";

/// Descriptor of the synthesized array field.
pub const POOL_FIELD_DESCRIPTOR: &str = "[Ljava/lang/String;";

const STATIC_INITIALIZER_NAME: &str = "<clinit>";
const STATIC_INITIALIZER_DESCRIPTOR: &str = "()V";
const STRING_CLASS: &str = "java/lang/String";

/// Code sub-attributes that index bytecode offsets which go stale when the
/// stream is spliced. They are dropped from rewritten routines rather than
/// recomputed; the class stays loadable without them.
const STALE_OFFSET_ATTRIBUTES: [&str; 4] = [
    "LineNumberTable",
    "LocalVariableTable",
    "LocalVariableTypeTable",
    "StackMapTable",
];

#[derive(Clone, Debug)]
pub struct TransformOptions {
    /// Master switch; a disabled pass returns the class untouched.
    pub enabled: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        TransformOptions { enabled: true }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    Interface,
}

/// What one invocation did to the class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransformOutcome {
    /// Valid, expected no-op; the class was returned without modification.
    Skipped(SkipReason),
    Transformed {
        /// Number of distinct string values pooled.
        pool_size: usize,
        /// Number of load sites rewritten across all routines.
        rewritten_loads: usize,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum TransformError {
    /// The class already declares a field with the reserved pool name.
    FieldNameCollision { name: String },
    /// A routine's instruction stream or Code attribute could not be used.
    MalformedCode { method: String, message: String },
    /// A value seen by the scan was missing from the pool at rewrite time.
    /// This is a broken invariant between stages, not a property of the
    /// input class.
    PoolLookupMiss { value: String },
    /// The class structure itself was unusable (missing this-class entry,
    /// undecodable bytes).
    ClassFormat { message: String },
    Code(CodeError),
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::FieldNameCollision { name } => {
                write!(f, "class already declares a field named {}", name)
            }
            TransformError::MalformedCode { method, message } => {
                write!(f, "malformed code in method {}: {}", method, message)
            }
            TransformError::PoolLookupMiss { value } => {
                write!(f, "string pool invariant violated: {:?} missing at rewrite time", value)
            }
            TransformError::ClassFormat { message } => write!(f, "class format error: {}", message),
            TransformError::Code(e) => write!(f, "code error: {}", e),
        }
    }
}

impl std::error::Error for TransformError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransformError::Code(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CodeError> for TransformError {
    fn from(e: CodeError) -> Self {
        TransformError::Code(e)
    }
}

/// The pass. Holds only configuration; all per-class state is created inside
/// [`process`](StringPoolTransformer::process) and dropped before it
/// returns, so one transformer may be shared across classes (and threads,
/// one class per invocation).
#[derive(Clone, Debug, Default)]
pub struct StringPoolTransformer {
    options: TransformOptions,
}

impl StringPoolTransformer {
    pub fn new() -> StringPoolTransformer {
        StringPoolTransformer::default()
    }

    pub fn with_options(options: TransformOptions) -> StringPoolTransformer {
        StringPoolTransformer { options }
    }

    /// Run the pass over one class, in place.
    ///
    /// On success the class has one new field prepended, every string load
    /// rewritten to an indexed array lookup, and a static initializer (new
    /// or pre-existing) that populates the array before anything else. On
    /// error the class must be considered spoiled and not committed.
    pub fn process(&self, class_file: &mut ClassFile) -> Result<TransformOutcome, TransformError> {
        if !self.options.enabled {
            return Ok(TransformOutcome::Skipped(SkipReason::Disabled));
        }
        if class_file.access_flags.contains(ClassAccessFlags::INTERFACE) {
            return Ok(TransformOutcome::Skipped(SkipReason::Interface));
        }
        if class_file
            .fields
            .iter()
            .any(|f| class_file.get_utf8(f.name_index) == Some(POOL_FIELD_NAME))
        {
            return Err(TransformError::FieldNameCollision {
                name: POOL_FIELD_NAME.to_string(),
            });
        }

        let pool = scan_string_loads(class_file)?;
        log::debug!(
            "{}: pooled {} distinct string constant(s)",
            class_file.this_class_name().unwrap_or("<unnamed>"),
            pool.len()
        );

        let name_index = class_file.get_or_add_utf8(POOL_FIELD_NAME);
        let descriptor_index = class_file.get_or_add_utf8(POOL_FIELD_DESCRIPTOR);
        class_file.fields.insert(
            0,
            FieldInfo {
                access_flags: FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC,
                name_index,
                descriptor_index,
                attributes_count: 0,
                attributes: Vec::new(),
            },
        );

        let this_class = class_file
            .this_class_name()
            .ok_or_else(|| TransformError::ClassFormat {
                message: "this_class does not resolve to a class name".to_string(),
            })?
            .to_string();
        let field_ref =
            class_file.get_or_add_field_ref(&this_class, POOL_FIELD_NAME, POOL_FIELD_DESCRIPTOR);

        let rewritten_loads = rewrite_string_loads(class_file, &pool, field_ref)?;
        synthesize_initializer(class_file, &pool, field_ref)?;
        class_file.sync_counts();

        Ok(TransformOutcome::Transformed {
            pool_size: pool.len(),
            rewritten_loads,
        })
    }
}

/// Stage 2–3: walk every routine in declaration order, instructions in
/// stream order, and collect distinct string values in first-seen order.
/// Never mutates the class.
fn scan_string_loads(class_file: &ClassFile) -> Result<StringPool, TransformError> {
    let mut pool = StringPool::new();
    for method in &class_file.methods {
        let Some(attr_index) = code_attribute_index(class_file, method) else {
            continue; // abstract or native
        };
        let code = CodeAttribute::from_attribute(&method.attributes[attr_index]).map_err(|e| {
            TransformError::MalformedCode {
                method: method_name(class_file, method),
                message: e.to_string(),
            }
        })?;
        let (rest, instructions) = code_parser(&code.code)?;
        if !rest.is_empty() {
            return Err(TransformError::MalformedCode {
                method: method_name(class_file, method),
                message: format!("{} undecodable trailing bytes", rest.len()),
            });
        }
        for (_, instruction) in &instructions {
            if let Some(cp_index) = string_load_target(instruction) {
                if let Some(value) = class_file.get_string(cp_index) {
                    pool.insert(value);
                }
            }
        }
    }
    Ok(pool)
}

/// Stage 4: replace every string load with `getstatic` + index push +
/// `aaload`, from the frozen pool. Edits are planned against a decoded
/// snapshot and applied in one splice per routine.
fn rewrite_string_loads(
    class_file: &mut ClassFile,
    pool: &StringPool,
    field_ref: u16,
) -> Result<usize, TransformError> {
    let mut rewritten = 0usize;
    for method_index in 0..class_file.methods.len() {
        let Some(attr_index) = code_attribute_index(class_file, &class_file.methods[method_index])
        else {
            continue;
        };
        let mut code =
            CodeAttribute::from_attribute(&class_file.methods[method_index].attributes[attr_index])
                .map_err(|e| TransformError::MalformedCode {
                    method: method_name(class_file, &class_file.methods[method_index]),
                    message: e.to_string(),
                })?;
        let (_, instructions) = code_parser(&code.code)?;

        let mut sites: Vec<(usize, u16)> = Vec::new();
        for (i, (_, instruction)) in instructions.iter().enumerate() {
            if let Some(cp_index) = string_load_target(instruction) {
                if let Some(value) = class_file.get_string(cp_index) {
                    let pool_index =
                        pool.index_of(value)
                            .ok_or_else(|| TransformError::PoolLookupMiss {
                                value: value.to_string(),
                            })?;
                    sites.push((i, pool_index));
                }
            }
        }
        if sites.is_empty() {
            continue;
        }

        let mut edits = Vec::with_capacity(sites.len());
        for (at, pool_index) in &sites {
            let mut replacement = vec![Instruction::Getstatic(field_ref)];
            push_int_const(class_file, &mut replacement, *pool_index as i32);
            replacement.push(Instruction::Aaload);
            edits.push(CodeEdit::replace_at(*at, replacement));
        }
        apply_edits(&mut code, &edits)?;
        // The replacement briefly holds the array reference and the index
        // where the original load held a single value.
        code.max_stack += 1;
        strip_stale_offset_attributes(class_file, &mut code);
        code.store_into(&mut class_file.methods[method_index].attributes[attr_index])?;

        log::trace!(
            "rewrote {} string load(s) in {}",
            sites.len(),
            method_name(class_file, &class_file.methods[method_index])
        );
        rewritten += sites.len();
    }
    Ok(rewritten)
}

/// Stage 5: make `<clinit>` allocate and fill the array before any original
/// static initialization runs.
fn synthesize_initializer(
    class_file: &mut ClassFile,
    pool: &StringPool,
    field_ref: u16,
) -> Result<(), TransformError> {
    let string_class = class_file.get_or_add_class(STRING_CLASS);
    let mut block = Vec::new();
    push_int_const(class_file, &mut block, pool.len() as i32);
    block.push(Instruction::Anewarray(string_class));
    for (index, value) in pool.values().iter().enumerate() {
        block.push(Instruction::Dup);
        push_int_const(class_file, &mut block, index as i32);
        let cp_index = class_file.get_or_add_string(value);
        push_ldc(&mut block, cp_index);
        block.push(Instruction::Aastore);
    }
    block.push(Instruction::Putstatic(field_ref));
    // Peak: array ref, duplicate, index, value. An empty pool only ever
    // holds the fresh array reference.
    let required_stack: u16 = if pool.is_empty() { 1 } else { 4 };

    let existing = class_file
        .methods
        .iter()
        .position(|m| class_file.get_utf8(m.name_index) == Some(STATIC_INITIALIZER_NAME));

    match existing {
        Some(method_index) => {
            let attr_index = code_attribute_index(class_file, &class_file.methods[method_index])
                .ok_or_else(|| TransformError::MalformedCode {
                    method: STATIC_INITIALIZER_NAME.to_string(),
                    message: "static initializer has no Code attribute".to_string(),
                })?;
            let mut code = CodeAttribute::from_attribute(
                &class_file.methods[method_index].attributes[attr_index],
            )
            .map_err(|e| TransformError::MalformedCode {
                method: STATIC_INITIALIZER_NAME.to_string(),
                message: e.to_string(),
            })?;

            if code.code.is_empty() {
                block.push(Instruction::Return);
                code.code = code_writer(&block)?;
            } else {
                apply_edits(&mut code, &[CodeEdit::insert_before(0, block)])?;
            }
            code.max_stack = code.max_stack.max(required_stack);
            strip_stale_offset_attributes(class_file, &mut code);
            code.store_into(&mut class_file.methods[method_index].attributes[attr_index])?;
            log::debug!("extended existing static initializer");
        }
        None => {
            block.push(Instruction::Return);
            let mut code = CodeAttribute {
                max_stack: required_stack,
                max_locals: 0,
                code_length: 0,
                code: code_writer(&block)?,
                exception_table_length: 0,
                exception_table: Vec::new(),
                attributes_count: 0,
                attributes: Vec::new(),
            };
            let code_name_index = class_file.get_or_add_utf8("Code");
            let mut attr = AttributeInfo {
                attribute_name_index: code_name_index,
                attribute_length: 0,
                info: Vec::new(),
            };
            code.store_into(&mut attr)?;

            let name_index = class_file.get_or_add_utf8(STATIC_INITIALIZER_NAME);
            let descriptor_index = class_file.get_or_add_utf8(STATIC_INITIALIZER_DESCRIPTOR);
            class_file.methods.push(MethodInfo {
                access_flags: MethodAccessFlags::STATIC,
                name_index,
                descriptor_index,
                attributes_count: 1,
                attributes: vec![attr],
            });
            log::debug!("created static initializer");
        }
    }
    Ok(())
}

fn method_name(class_file: &ClassFile, method: &MethodInfo) -> String {
    class_file
        .get_utf8(method.name_index)
        .unwrap_or("<unnamed>")
        .to_string()
}

fn code_attribute_index(class_file: &ClassFile, method: &MethodInfo) -> Option<usize> {
    method
        .attributes
        .iter()
        .position(|a| class_file.get_utf8(a.attribute_name_index) == Some("Code"))
}

/// The constant pool index a string-literal load reads from, if this is one.
fn string_load_target(instruction: &Instruction) -> Option<u16> {
    match instruction {
        Instruction::Ldc(index) => Some(*index as u16),
        Instruction::LdcW(index) => Some(*index),
        _ => None,
    }
}

fn strip_stale_offset_attributes(class_file: &ClassFile, code: &mut CodeAttribute) {
    code.attributes.retain(|a| {
        match class_file.get_utf8(a.attribute_name_index) {
            Some(name) => !STALE_OFFSET_ATTRIBUTES.contains(&name),
            None => true,
        }
    });
    code.attributes_count = code.attributes.len() as u16;
}

/// Push an int constant with the shortest encoding that fits.
fn push_int_const(class_file: &mut ClassFile, out: &mut Vec<Instruction>, value: i32) {
    match value {
        -1 => out.push(Instruction::Iconstm1),
        0 => out.push(Instruction::Iconst0),
        1 => out.push(Instruction::Iconst1),
        2 => out.push(Instruction::Iconst2),
        3 => out.push(Instruction::Iconst3),
        4 => out.push(Instruction::Iconst4),
        5 => out.push(Instruction::Iconst5),
        v if (-128..=127).contains(&v) => out.push(Instruction::Bipush(v as i8)),
        v if (-32768..=32767).contains(&v) => out.push(Instruction::Sipush(v as i16)),
        v => {
            let cp_index = class_file.get_or_add_integer(v);
            push_ldc(out, cp_index);
        }
    }
}

fn push_ldc(out: &mut Vec<Instruction>, cp_index: u16) {
    if cp_index <= 255 {
        out.push(Instruction::Ldc(cp_index as u8));
    } else {
        out.push(Instruction::LdcW(cp_index));
    }
}
