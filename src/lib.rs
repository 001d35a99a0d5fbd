//! A [Java Classfile](https://docs.oracle.com/javase/specs/jvms/se10/html/jvms-4.html)
//! rewriting pass that pools a class's inline string constants into a single
//! synthesized `public static String[]` field and replaces every string load
//! with an indexed lookup into it.
//!
//! The class model round-trips through [`binrw`]; the pass itself lives in
//! [`transform`].

use std::fs::File;
use std::io::{prelude::*, BufReader, Cursor};
use std::path::Path;

use binrw::{BinRead, BinWrite};

#[macro_use]
extern crate bitflags;

pub mod attribute_info;
pub mod constant_info;
pub mod field_info;
pub mod method_info;

pub mod code_attribute;
pub mod string_pool;
pub mod transform;

pub mod types;

pub use types::*;

use transform::{StringPoolTransformer, TransformError, TransformOutcome};

/// Attempt to parse a class file given a path to a class file (without .class extension)
///
/// ```rust,no_run
/// match classfile_stringpool::parse_class("./compiled-classes/BasicClass") {
///     Ok(class_file) => {
///         println!("version {},{}", class_file.major_version, class_file.minor_version);
///     }
///     Err(ex) => panic!("Failed to parse: {}", ex),
/// };
/// ```
pub fn parse_class(class_name: &str) -> Result<ClassFile, String> {
    let class_file_name = &format!("{}.class", class_name);
    let path = Path::new(class_file_name);
    let display = path.display();

    let file = match File::open(path) {
        Err(why) => {
            return Err(format!("Unable to open {}: {}", display, &why.to_string()));
        }
        Ok(file) => file,
    };

    let mut reader = BufReader::new(file);
    parse_class_from_reader(&mut reader)
}

/// Attempt to parse a class file given a reader that implements the std::io::Read trait.
///
/// ```rust
/// let mut reader = "this_will_be_parsed_as_classfile".as_bytes();
/// let result = classfile_stringpool::parse_class_from_reader(&mut reader);
/// assert!(result.is_err());
/// ```
pub fn parse_class_from_reader<T: Read>(reader: &mut T) -> Result<ClassFile, String> {
    let mut class_bytes = Vec::new();
    if let Err(why) = reader.read_to_end(&mut class_bytes) {
        return Err(format!("Failed to read classfile bytes: {}", why));
    }

    let mut cursor = Cursor::new(&class_bytes);
    match ClassFile::read(&mut cursor) {
        Ok(class_file) => {
            let remaining = class_bytes.len() as u64 - cursor.position();
            if remaining > 0 {
                eprintln!(
                    "Warning: not all bytes were consumed when parsing classfile, {} bytes remaining",
                    remaining
                );
            }
            Ok(class_file)
        }
        Err(e) => Err(format!("Failed to parse classfile: {}", e)),
    }
}

/// Serialize a class back into class-file bytes.
pub fn write_class(class_file: &ClassFile) -> Result<Vec<u8>, String> {
    let mut cursor = Cursor::new(Vec::new());
    class_file
        .write(&mut cursor)
        .map_err(|e| format!("Failed to write classfile: {}", e))?;
    Ok(cursor.into_inner())
}

/// Run the string-pool pass over raw class-file bytes, returning the rewritten
/// bytes and what the pass did. A skipped class is returned byte-identical.
pub fn transform_class_bytes(
    bytes: &[u8],
    transformer: &StringPoolTransformer,
) -> Result<(Vec<u8>, TransformOutcome), TransformError> {
    let mut cursor = Cursor::new(bytes);
    let mut class_file =
        ClassFile::read(&mut cursor).map_err(|e| TransformError::ClassFormat {
            message: format!("undecodable classfile: {}", e),
        })?;
    let outcome = transformer.process(&mut class_file)?;
    if matches!(outcome, TransformOutcome::Skipped(_)) {
        return Ok((bytes.to_vec(), outcome));
    }
    let mut out = Cursor::new(Vec::new());
    class_file
        .write(&mut out)
        .map_err(|e| TransformError::ClassFormat {
            message: format!("failed to encode classfile: {}", e),
        })?;
    Ok((out.into_inner(), outcome))
}
