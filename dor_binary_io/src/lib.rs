/*! Traits for binary serialization of DOR wire structures.

`FromBytes` parses a structure with [nom] streaming combinators so that
codecs can distinguish an incomplete buffer from a malformed one.
`ToBytes` writes a structure with [cookie-factory] generators into a
caller-provided buffer.
*/

pub use cookie_factory::GenError;
pub use nom::IResult;

/// De-serialize a structure from bytes.
pub trait FromBytes: Sized {
    /// De-serialize an object from bytes, returning the unconsumed input
    /// alongside the parsed value.
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self>;
}

/// Serialize a structure into bytes.
pub trait ToBytes {
    /// Serialize an object into the `(buffer, offset)` pair, returning the
    /// buffer and the offset past the written bytes.
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError>;
}

/// Fail serialization with a custom error code. Meant to be used inside
/// `do_gen!` chains via `gen_call!` or a bare function call.
pub fn gen_error(buf: (&mut [u8], usize), error: u32) -> Result<(&mut [u8], usize), GenError> {
    let _ = buf;
    Err(GenError::CustomError(error))
}

/// Fail serialization when more than `limit` bytes were written. Used as the
/// final step of `do_gen!` chains for size-bounded packets.
pub fn gen_len_limit(buf: (&mut [u8], usize), limit: usize) -> Result<(&mut [u8], usize), GenError> {
    if buf.1 <= limit {
        Ok(buf)
    } else {
        Err(GenError::BufferTooSmall(buf.1 - limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gen_error_always_fails() {
        let mut buf = [0; 8];
        let res = gen_error((&mut buf, 0), 42);
        assert!(matches!(res, Err(GenError::CustomError(42))));
    }

    #[test]
    fn gen_len_limit_within_limit() {
        let mut buf = [0; 8];
        assert!(gen_len_limit((&mut buf, 8), 8).is_ok());
    }

    #[test]
    fn gen_len_limit_exceeded() {
        let mut buf = [0; 8];
        let res = gen_len_limit((&mut buf, 10), 8);
        assert!(matches!(res, Err(GenError::BufferTooSmall(2))));
    }
}
