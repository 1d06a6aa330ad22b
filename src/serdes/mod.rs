//! Little-endian binary codec shared by the main file, item-set blobs and
//! child-segment blobs.

mod boolean;
mod num;
mod string;
mod tuple;
mod vec;

use std::io::{Read, Write};

use crate::error::CodecError;

pub trait Encode {
    fn encode<W>(&self, writer: &mut W) -> Result<(), CodecError>
    where
        W: Write;

    /// Number of bytes `encode` writes.
    fn size(&self) -> usize;
}

impl<T: Encode> Encode for &T {
    fn encode<W>(&self, writer: &mut W) -> Result<(), CodecError>
    where
        W: Write,
    {
        Encode::encode(*self, writer)
    }

    fn size(&self) -> usize {
        Encode::size(*self)
    }
}

pub trait Decode: Sized {
    fn decode<R>(reader: &mut R) -> Result<Self, CodecError>
    where
        R: Read;
}

/// Encodes `value` into a fresh buffer sized by [`Encode::size`].
pub(crate) fn encode_to_vec<T: Encode + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(value.size());
    value.encode(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read, Write};

    use super::*;

    #[test]
    fn test_encode_decode() {
        // Implement a simple struct that implements Encode and Decode
        struct TestStruct(u32);

        impl Encode for TestStruct {
            fn encode<W>(&self, writer: &mut W) -> Result<(), CodecError>
            where
                W: Write,
            {
                self.0.encode(writer)?;

                Ok(())
            }

            fn size(&self) -> usize {
                std::mem::size_of::<u32>()
            }
        }

        impl Decode for TestStruct {
            fn decode<R>(reader: &mut R) -> Result<Self, CodecError>
            where
                R: Read,
            {
                Ok(TestStruct(u32::decode(reader)?))
            }
        }

        let original = TestStruct(42);
        let buf = encode_to_vec(&original).unwrap();
        assert_eq!(buf.len(), original.size());

        let decoded = TestStruct::decode(&mut Cursor::new(buf)).unwrap();

        assert_eq!(original.0, decoded.0);
    }

    #[test]
    fn test_truncated_input_is_io_error() {
        let buf = encode_to_vec(&7u64).unwrap();
        let err = u64::decode(&mut Cursor::new(&buf[..3])).unwrap_err();

        assert!(matches!(err, CodecError::Io(_)));
    }
}
