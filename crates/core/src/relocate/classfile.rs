//! Constant-pool level access to class files.
//!
//! Every symbolic name in a class file (this/super class, field and method
//! descriptors, generic signatures, string literals, module and package
//! names) is stored in a CONSTANT_Utf8 entry. Rewriting those entries in
//! place keeps every constant pool index valid, so the rest of the file is
//! copied verbatim.

use thiserror::Error;

const MAGIC: u32 = 0xCAFE_BABE;
const HEADER_LEN: usize = 10;

const TAG_UTF8: u8 = 1;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;

#[derive(Debug, Error)]
pub enum ClassFileError {
    #[error("not a class file")]
    BadMagic,
    #[error("truncated class file")]
    Truncated,
    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownTag { tag: u8, index: u32 },
    #[error("constant #{index} would grow to {len} bytes")]
    Utf8TooLong { index: u32, len: usize },
}

/// Payload width of every non-Utf8 constant kind.
fn fixed_width(tag: u8) -> Option<usize> {
    match tag {
        3 | 4 => Some(4),        // Integer, Float
        TAG_LONG | TAG_DOUBLE => Some(8),
        7 | 8 | 16 | 19 | 20 => Some(2), // Class, String, MethodType, Module, Package
        9 | 10 | 11 | 12 => Some(4), // Field/Method/InterfaceMethod refs, NameAndType
        15 => Some(3),           // MethodHandle
        17 | 18 => Some(4),      // Dynamic, InvokeDynamic
        _ => None,
    }
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], ClassFileError> {
        let end = self.pos.checked_add(n).ok_or(ClassFileError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(ClassFileError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ClassFileError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ClassFileError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, ClassFileError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[derive(Debug)]
pub struct Rewritten {
    pub bytes: Vec<u8>,
    /// Number of Utf8 constants that changed.
    pub constants: usize,
}

/// Passes every Utf8 constant to `rewrite` and splices in the replacements
/// it returns.
pub fn rewrite_utf8_constants<F>(class: &[u8], mut rewrite: F) -> Result<Rewritten, ClassFileError>
where
    F: FnMut(&[u8]) -> Option<Vec<u8>>,
{
    let mut reader = ByteReader {
        bytes: class,
        pos: 0,
    };
    if reader.u32()? != MAGIC {
        return Err(ClassFileError::BadMagic);
    }
    reader.take(4)?; // minor, major
    let count = u32::from(reader.u16()?);

    let mut out = Vec::with_capacity(class.len());
    out.extend_from_slice(&class[..HEADER_LEN]);
    let mut constants = 0;

    let mut index = 1u32;
    while index < count {
        let start = reader.pos;
        let tag = reader.u8()?;
        if tag == TAG_UTF8 {
            let len = usize::from(reader.u16()?);
            let value = reader.take(len)?;
            match rewrite(value) {
                Some(replacement) => {
                    let new_len = u16::try_from(replacement.len()).map_err(|_| {
                        ClassFileError::Utf8TooLong {
                            index,
                            len: replacement.len(),
                        }
                    })?;
                    out.push(TAG_UTF8);
                    out.extend_from_slice(&new_len.to_be_bytes());
                    out.extend_from_slice(&replacement);
                    constants += 1;
                }
                None => out.extend_from_slice(&class[start..reader.pos]),
            }
        } else {
            let width = fixed_width(tag).ok_or(ClassFileError::UnknownTag { tag, index })?;
            reader.take(width)?;
            out.extend_from_slice(&class[start..reader.pos]);
            // 8-byte constants occupy two pool slots.
            if tag == TAG_LONG || tag == TAG_DOUBLE {
                index += 1;
            }
        }
        index += 1;
    }

    out.extend_from_slice(&class[reader.pos..]);
    Ok(Rewritten {
        bytes: out,
        constants,
    })
}

/// Copies of every Utf8 constant, in pool order.
pub fn utf8_constants(class: &[u8]) -> Result<Vec<Vec<u8>>, ClassFileError> {
    let mut values = Vec::new();
    rewrite_utf8_constants(class, |value| {
        values.push(value.to_vec());
        None
    })?;
    Ok(values)
}
