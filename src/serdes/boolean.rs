use std::{
    io::{Read, Write},
    mem::size_of,
};

use crate::{
    error::CodecError,
    serdes::{Decode, Encode},
};

impl Encode for bool {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
        u8::from(*self).encode(writer)
    }

    fn size(&self) -> usize {
        size_of::<u8>()
    }
}

impl Decode for bool {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        match u8::decode(reader)? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(CodecError::InvalidTag(tag)),
        }
    }
}
