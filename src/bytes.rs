use crate::schema::Endian;

/// A read ran past the end of the buffer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ShortRead {
    pub offset: usize,
    pub needed: usize,
}

/// Sequential reader over a byte slice with configurable byte order.
///
/// Multi-byte integers in the envelope layouts are always big-endian; binary
/// record payloads follow the schema's declared endianness.
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    endian: Endian,
}

macro_rules! read_int {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self) -> Result<$ty, ShortRead> {
            const N: usize = std::mem::size_of::<$ty>();
            let bytes: [u8; N] = self.take(N)?.try_into().expect("slice length checked");
            Ok(match self.endian {
                Endian::Big => <$ty>::from_be_bytes(bytes),
                Endian::Little => <$ty>::from_le_bytes(bytes),
            })
        }
    };
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8], endian: Endian) -> Self {
        ByteReader {
            buf,
            pos: 0,
            endian,
        }
    }

    pub fn big_endian(buf: &'a [u8]) -> Self {
        Self::new(buf, Endian::Big)
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ShortRead> {
        if self.remaining() < n {
            return Err(ShortRead {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Read the remainder of the buffer.
    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }

    read_int!(read_i8, i8);
    read_int!(read_i16, i16);
    read_int!(read_i32, i32);
    read_int!(read_i64, i64);

    pub fn read_f32(&mut self) -> Result<f32, ShortRead> {
        Ok(f32::from_bits(self.read_i32()? as u32))
    }

    pub fn read_f64(&mut self) -> Result<f64, ShortRead> {
        Ok(f64::from_bits(self.read_i64()? as u64))
    }
}

/// Append-only big-endian writer for the envelope layouts.
pub(crate) struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        ByteWriter { buf: Vec::new() }
    }

    pub fn put_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Write a length-prefixed buffer; `None` and empty both write length 0
    /// with no bytes following.
    pub fn put_buffer(&mut self, buf: Option<&[u8]>) {
        let buf = buf.unwrap_or(&[]);
        self.put_i32(buf.len() as i32);
        self.buf.extend_from_slice(buf);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
