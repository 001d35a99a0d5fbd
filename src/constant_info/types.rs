use binrw::io::{Read, Seek, Write};
use binrw::{binrw, BinResult};

/// One entry of the class file constant pool, tagged as in JVMS §4.4.
///
/// `Long` and `Double` entries occupy two pool slots; the slot after them is
/// filled with `Unusable` when the pool is parsed and skipped when it is
/// written back.
#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub enum ConstantInfo {
    #[brw(magic = 1u8)]
    Utf8(Utf8Constant),
    #[brw(magic = 3u8)]
    Integer(IntegerConstant),
    #[brw(magic = 4u8)]
    Float(FloatConstant),
    #[brw(magic = 5u8)]
    Long(LongConstant),
    #[brw(magic = 6u8)]
    Double(DoubleConstant),
    #[brw(magic = 7u8)]
    Class(ClassConstant),
    #[brw(magic = 8u8)]
    String(StringConstant),
    #[brw(magic = 9u8)]
    FieldRef(FieldRefConstant),
    #[brw(magic = 10u8)]
    MethodRef(MethodRefConstant),
    #[brw(magic = 11u8)]
    InterfaceMethodRef(InterfaceMethodRefConstant),
    #[brw(magic = 12u8)]
    NameAndType(NameAndTypeConstant),
    #[brw(magic = 15u8)]
    MethodHandle(MethodHandleConstant),
    #[brw(magic = 16u8)]
    MethodType(MethodTypeConstant),
    #[brw(magic = 17u8)]
    Dynamic(DynamicConstant),
    #[brw(magic = 18u8)]
    InvokeDynamic(InvokeDynamicConstant),
    #[brw(magic = 19u8)]
    Module(ModuleConstant),
    #[brw(magic = 20u8)]
    Package(PackageConstant),
    // Tag 0 is invalid in a class file; this variant only exists in memory as
    // the second slot of a Long/Double entry and is never written out.
    #[brw(magic = 0u8)]
    Unusable,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
pub struct Utf8Constant {
    #[br(parse_with = parse_modified_utf8)]
    #[bw(write_with = write_modified_utf8)]
    pub utf8_string: String,
}

/// Reads a length-prefixed modified-UTF-8 string. Embedded NULs encoded as
/// `0xC0 0x80` are decoded, and six-byte surrogate pairs (the mandated
/// encoding for supplementary-plane characters, JVMS §4.4.7) are folded back
/// into the real code point.
#[binrw::parser(reader)]
fn parse_modified_utf8() -> BinResult<String> {
    let pos = reader.stream_position()?;
    let mut len_buf = [0u8; 2];
    reader.read_exact(&mut len_buf)?;
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;

    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == 0xc0 && i + 1 < bytes.len() && bytes[i + 1] == 0x80 {
            decoded.push(0);
            i += 2;
        } else if let Some(ch) = decode_surrogate_pair(&bytes[i..]) {
            let mut buf = [0u8; 4];
            decoded.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            i += 6;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).map_err(|_| binrw::Error::AssertFail {
        pos,
        message: "constant pool Utf8 entry is not valid modified UTF-8".to_string(),
    })
}

/// Folds a six-byte `ED A0..AF xx ED B0..BF xx` surrogate pair back into its
/// supplementary-plane character.
fn decode_surrogate_pair(bytes: &[u8]) -> Option<char> {
    if bytes.len() < 6 {
        return None;
    }
    let (hi, lo) = (&bytes[..3], &bytes[3..6]);
    if hi[0] != 0xed || !(0xa0..=0xaf).contains(&hi[1]) || hi[2] & 0xc0 != 0x80 {
        return None;
    }
    if lo[0] != 0xed || !(0xb0..=0xbf).contains(&lo[1]) || lo[2] & 0xc0 != 0x80 {
        return None;
    }
    let high = 0xd000u32 | ((hi[1] as u32 & 0x3f) << 6) | (hi[2] as u32 & 0x3f);
    let low = 0xd000u32 | ((lo[1] as u32 & 0x3f) << 6) | (lo[2] as u32 & 0x3f);
    char::from_u32(0x10000 + ((high - 0xd800) << 10) + (low - 0xdc00))
}

#[binrw::writer(writer)]
fn write_modified_utf8(value: &String) -> BinResult<()> {
    let mut encoded = Vec::with_capacity(value.len());
    for ch in value.chars() {
        match ch as u32 {
            0 => encoded.extend_from_slice(&[0xc0, 0x80]),
            cp if cp >= 0x10000 => {
                let cp = cp - 0x10000;
                encode_bmp_three_byte(&mut encoded, 0xd800 + (cp >> 10));
                encode_bmp_three_byte(&mut encoded, 0xdc00 + (cp & 0x3ff));
            }
            _ => {
                let mut buf = [0u8; 4];
                encoded.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    writer.write_all(&(encoded.len() as u16).to_be_bytes())?;
    writer.write_all(&encoded)?;
    Ok(())
}

fn encode_bmp_three_byte(out: &mut Vec<u8>, v: u32) {
    out.push(0xe0 | (v >> 12) as u8);
    out.push(0x80 | ((v >> 6) & 0x3f) as u8);
    out.push(0x80 | (v & 0x3f) as u8);
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
pub struct IntegerConstant {
    pub value: i32,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
pub struct FloatConstant {
    pub value: f32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
pub struct LongConstant {
    pub value: i64,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
pub struct DoubleConstant {
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
pub struct ClassConstant {
    pub name_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
pub struct StringConstant {
    pub string_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
pub struct FieldRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
pub struct MethodRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
pub struct InterfaceMethodRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
pub struct NameAndTypeConstant {
    pub name_index: u16,
    pub descriptor_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
pub struct MethodHandleConstant {
    pub reference_kind: u8,
    pub reference_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
pub struct MethodTypeConstant {
    pub descriptor_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
pub struct DynamicConstant {
    pub bootstrap_method_attr_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
pub struct InvokeDynamicConstant {
    pub bootstrap_method_attr_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
pub struct ModuleConstant {
    pub name_index: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
pub struct PackageConstant {
    pub name_index: u16,
}

#[cfg(test)]
mod tests {
    use binrw::io::Cursor;
    use binrw::{BinRead, BinWrite};

    use super::ConstantInfo;

    fn read_utf8(bytes: &[u8]) -> String {
        match ConstantInfo::read(&mut Cursor::new(bytes)).unwrap() {
            ConstantInfo::Utf8(u) => u.utf8_string,
            other => panic!("expected a Utf8 constant, got {:?}", other),
        }
    }

    fn write_entry(entry: &ConstantInfo) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        entry.write(&mut out).unwrap();
        out.into_inner()
    }

    #[test]
    fn utf8_decodes_embedded_nul() {
        let bytes = [1u8, 0, 3, 0x61, 0xc0, 0x80];
        assert_eq!(read_utf8(&bytes), "a\0");
        let entry = ConstantInfo::read(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(write_entry(&entry), bytes);
    }

    #[test]
    fn utf8_decodes_six_byte_surrogate_pairs() {
        // U+1D11E (musical G clef) in modified UTF-8
        let bytes = [1u8, 0, 6, 0xed, 0xa0, 0xb4, 0xed, 0xb4, 0x9e];
        assert_eq!(read_utf8(&bytes), "\u{1D11E}");
        let entry = ConstantInfo::read(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(write_entry(&entry), bytes);
    }

    #[test]
    fn utf8_mixes_planes_and_plain_ascii() {
        // "a🎼b": the emoji (U+1F3BC) takes a surrogate pair, the letters
        // stay single bytes.
        let bytes = [
            1u8, 0, 8, 0x61, 0xed, 0xa0, 0xbc, 0xed, 0xbe, 0xbc, 0x62,
        ];
        assert_eq!(read_utf8(&bytes), "a\u{1F3BC}b");
        let entry = ConstantInfo::read(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(write_entry(&entry), bytes);
    }
}
