use crate::attribute_info::AttributeInfo;
use crate::constant_info::{
    ClassConstant, ConstantInfo, FieldRefConstant, IntegerConstant, NameAndTypeConstant,
    StringConstant, Utf8Constant,
};
use crate::field_info::FieldInfo;
use crate::method_info::MethodInfo;

use binrw::{binrw, BinRead, BinResult, BinWrite};

#[derive(Clone, Debug)]
#[binrw]
#[brw(big, magic = b"\xca\xfe\xba\xbe")]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub const_pool_size: u16,
    #[br(parse_with = parse_const_pool, args(const_pool_size))]
    #[bw(write_with = write_const_pool)]
    pub const_pool: Vec<ConstantInfo>,
    pub access_flags: ClassAccessFlags,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces_count: u16,
    #[br(count = interfaces_count)]
    pub interfaces: Vec<u16>,
    pub fields_count: u16,
    #[br(count = fields_count)]
    pub fields: Vec<FieldInfo>,
    pub methods_count: u16,
    #[br(count = methods_count)]
    pub methods: Vec<MethodInfo>,
    pub attributes_count: u16,
    #[br(count = attributes_count)]
    pub attributes: Vec<AttributeInfo>,
}

/// The constant pool count is one more than the number of logical slots, and
/// `Long`/`Double` entries each take two slots; the extra slot is filled with
/// `Unusable` in memory.
#[binrw::parser(reader, endian)]
fn parse_const_pool(count: u16) -> BinResult<Vec<ConstantInfo>> {
    let mut entries = Vec::new();
    let mut slot = 1u16;
    while slot < count {
        let entry = ConstantInfo::read_options(reader, endian, ())?;
        let wide = matches!(entry, ConstantInfo::Long(_) | ConstantInfo::Double(_));
        entries.push(entry);
        if wide {
            entries.push(ConstantInfo::Unusable);
            slot += 2;
        } else {
            slot += 1;
        }
    }
    Ok(entries)
}

#[binrw::writer(writer, endian)]
fn write_const_pool(entries: &Vec<ConstantInfo>) -> BinResult<()> {
    for entry in entries {
        if matches!(entry, ConstantInfo::Unusable) {
            continue;
        }
        entry.write_options(writer, endian, ())?;
    }
    Ok(())
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[binrw]
pub struct ClassAccessFlags(u16);

bitflags! {
    impl ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;     //	Declared public; may be accessed from outside its package.
        const FINAL = 0x0010;      //	Declared final; no subclasses allowed.
        const SUPER = 0x0020;      //	Treat superclass methods specially when invoked by the invokespecial instruction.
        const INTERFACE = 0x0200;  //	Is an interface, not a class.
        const ABSTRACT = 0x0400;   //	Declared abstract; must not be instantiated.
        const SYNTHETIC = 0x1000;  //	Declared synthetic; not present in the source code.
        const ANNOTATION = 0x2000; //	Declared as an annotation type.
        const ENUM = 0x4000;       //	Declared as an enum type.
        const MODULE = 0x8000;     //	Declared as a module type.
    }
}

/// Constant pool lookups and additions. Pool indices are 1-based, as in the
/// class file format; new entries are always appended, so indices handed out
/// earlier stay valid.
impl ClassFile {
    fn push_constant(&mut self, entry: ConstantInfo) -> u16 {
        self.const_pool.push(entry);
        let index = self.const_pool.len() as u16;
        self.const_pool_size = index + 1;
        index
    }

    /// Look up a UTF-8 constant by 1-based index.
    pub fn get_utf8(&self, index: u16) -> Option<&str> {
        match self.const_pool.get((index as usize).checked_sub(1)?)? {
            ConstantInfo::Utf8(u) => Some(&u.utf8_string),
            _ => None,
        }
    }

    /// Resolve a String constant to its character data.
    pub fn get_string(&self, index: u16) -> Option<&str> {
        match self.const_pool.get((index as usize).checked_sub(1)?)? {
            ConstantInfo::String(s) => self.get_utf8(s.string_index),
            _ => None,
        }
    }

    pub fn find_utf8_index(&self, value: &str) -> Option<u16> {
        self.const_pool
            .iter()
            .position(|entry| matches!(entry, ConstantInfo::Utf8(u) if u.utf8_string == value))
            .map(|i| (i + 1) as u16)
    }

    pub fn add_utf8(&mut self, value: &str) -> u16 {
        self.push_constant(ConstantInfo::Utf8(Utf8Constant {
            utf8_string: value.to_string(),
        }))
    }

    pub fn get_or_add_utf8(&mut self, value: &str) -> u16 {
        match self.find_utf8_index(value) {
            Some(index) => index,
            None => self.add_utf8(value),
        }
    }

    pub fn get_or_add_integer(&mut self, value: i32) -> u16 {
        let found = self.const_pool.iter().position(|entry| {
            matches!(entry, ConstantInfo::Integer(c) if c.value == value)
        });
        match found {
            Some(i) => (i + 1) as u16,
            None => self.push_constant(ConstantInfo::Integer(IntegerConstant { value })),
        }
    }

    pub fn find_class_index(&self, name: &str) -> Option<u16> {
        self.const_pool
            .iter()
            .position(|entry| {
                matches!(entry, ConstantInfo::Class(c) if self.get_utf8(c.name_index) == Some(name))
            })
            .map(|i| (i + 1) as u16)
    }

    pub fn get_or_add_class(&mut self, name: &str) -> u16 {
        if let Some(index) = self.find_class_index(name) {
            return index;
        }
        let name_index = self.get_or_add_utf8(name);
        self.push_constant(ConstantInfo::Class(ClassConstant { name_index }))
    }

    pub fn get_or_add_string(&mut self, value: &str) -> u16 {
        let found = self.const_pool.iter().position(|entry| {
            matches!(entry, ConstantInfo::String(s) if self.get_utf8(s.string_index) == Some(value))
        });
        if let Some(i) = found {
            return (i + 1) as u16;
        }
        let string_index = self.get_or_add_utf8(value);
        self.push_constant(ConstantInfo::String(StringConstant { string_index }))
    }

    pub fn get_or_add_name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let found = self.const_pool.iter().position(|entry| {
            matches!(
                entry,
                ConstantInfo::NameAndType(nat)
                    if self.get_utf8(nat.name_index) == Some(name)
                        && self.get_utf8(nat.descriptor_index) == Some(descriptor)
            )
        });
        if let Some(i) = found {
            return (i + 1) as u16;
        }
        let name_index = self.get_or_add_utf8(name);
        let descriptor_index = self.get_or_add_utf8(descriptor);
        self.push_constant(ConstantInfo::NameAndType(NameAndTypeConstant {
            name_index,
            descriptor_index,
        }))
    }

    pub fn get_or_add_field_ref(&mut self, class_name: &str, name: &str, descriptor: &str) -> u16 {
        let found = self.const_pool.iter().position(|entry| {
            match entry {
                ConstantInfo::FieldRef(r) => {
                    let class_matches = matches!(
                        self.const_pool.get((r.class_index as usize).wrapping_sub(1)),
                        Some(ConstantInfo::Class(c)) if self.get_utf8(c.name_index) == Some(class_name)
                    );
                    let nat_matches = matches!(
                        self.const_pool.get((r.name_and_type_index as usize).wrapping_sub(1)),
                        Some(ConstantInfo::NameAndType(nat))
                            if self.get_utf8(nat.name_index) == Some(name)
                                && self.get_utf8(nat.descriptor_index) == Some(descriptor)
                    );
                    class_matches && nat_matches
                }
                _ => false,
            }
        });
        if let Some(i) = found {
            return (i + 1) as u16;
        }
        let class_index = self.get_or_add_class(class_name);
        let name_and_type_index = self.get_or_add_name_and_type(name, descriptor);
        self.push_constant(ConstantInfo::FieldRef(FieldRefConstant {
            class_index,
            name_and_type_index,
        }))
    }

    /// Resolve the name of the class this file defines.
    pub fn this_class_name(&self) -> Option<&str> {
        match self.const_pool.get((self.this_class as usize).checked_sub(1)?)? {
            ConstantInfo::Class(c) => self.get_utf8(c.name_index),
            _ => None,
        }
    }

    /// Re-derive every count field from its collection. Call after adding or
    /// removing members so the written file is self-consistent.
    pub fn sync_counts(&mut self) {
        self.const_pool_size = self.const_pool.len() as u16 + 1;
        self.interfaces_count = self.interfaces.len() as u16;
        self.fields_count = self.fields.len() as u16;
        self.methods_count = self.methods.len() as u16;
        self.attributes_count = self.attributes.len() as u16;
        for field in &mut self.fields {
            field.attributes_count = field.attributes.len() as u16;
        }
        for method in &mut self.methods {
            method.attributes_count = method.attributes.len() as u16;
        }
    }
}
