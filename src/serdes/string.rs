use std::{
    io::{self, Read, Write},
    mem::size_of,
};

use super::{Decode, Encode};
use crate::error::CodecError;

impl Encode for str {
    fn encode<W>(&self, writer: &mut W) -> Result<(), CodecError>
    where
        W: Write,
    {
        (self.len() as u32).encode(writer)?;
        writer.write_all(self.as_bytes())?;

        Ok(())
    }

    fn size(&self) -> usize {
        size_of::<u32>() + self.len()
    }
}

impl Encode for String {
    fn encode<W>(&self, writer: &mut W) -> Result<(), CodecError>
    where
        W: Write,
    {
        self.as_str().encode(writer)
    }

    fn size(&self) -> usize {
        self.as_str().size()
    }
}

impl Decode for String {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let len = u32::decode(reader)? as usize;
        let mut buf = Vec::with_capacity(len.min(1 << 16));
        reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
        if buf.len() != len {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }

        String::from_utf8(buf).map_err(|_| CodecError::InvalidUtf8)
    }
}
