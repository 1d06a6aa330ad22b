use std::{
    io::{Read, Write},
    mem::size_of,
};

use crate::{
    error::CodecError,
    serdes::{Decode, Encode},
};

impl<T> Decode for Vec<T>
where
    T: Decode,
{
    fn decode<R>(reader: &mut R) -> Result<Self, CodecError>
    where
        R: Read,
    {
        let len = u32::decode(reader)? as usize;
        // the length may be corrupt, cap the up-front reservation
        let mut items = Vec::with_capacity(len.min(1 << 16));

        for _ in 0..len {
            items.push(T::decode(reader)?);
        }
        Ok(items)
    }
}

impl<T> Encode for [T]
where
    T: Encode,
{
    fn encode<W>(&self, writer: &mut W) -> Result<(), CodecError>
    where
        W: Write,
    {
        (self.len() as u32).encode(writer)?;

        for item in self {
            item.encode(writer)?;
        }
        Ok(())
    }

    fn size(&self) -> usize {
        self.iter().map(|item| item.size()).sum::<usize>() + size_of::<u32>()
    }
}

impl<T> Encode for Vec<T>
where
    T: Encode,
{
    fn encode<W>(&self, writer: &mut W) -> Result<(), CodecError>
    where
        W: Write,
    {
        self.as_slice().encode(writer)
    }

    fn size(&self) -> usize {
        self.as_slice().size()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::serdes::{encode_to_vec, Decode, Encode};

    #[test]
    fn test_u8_encode_decode() {
        let source = b"hello! invix".to_vec();

        let bytes = encode_to_vec(&source).unwrap();
        assert_eq!(bytes.len(), source.size());

        let decoded = Vec::<u8>::decode(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(source, decoded);
    }

    #[test]
    fn test_nested_strings() {
        let source = vec!["a".to_string(), String::new(), "posting".to_string()];

        let bytes = encode_to_vec(&source).unwrap();
        let decoded = Vec::<String>::decode(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(source, decoded);
    }
}
