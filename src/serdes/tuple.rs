use std::io::{Read, Write};

use super::{Decode, Encode};
use crate::error::CodecError;

impl<A, B> Encode for (A, B)
where
    A: Encode,
    B: Encode,
{
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
        self.0.encode(writer)?;
        self.1.encode(writer)
    }

    fn size(&self) -> usize {
        self.0.size() + self.1.size()
    }
}

impl<A, B> Decode for (A, B)
where
    A: Decode,
    B: Decode,
{
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let a = A::decode(reader)?;
        let b = B::decode(reader)?;
        Ok((a, b))
    }
}
