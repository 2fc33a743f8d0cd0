use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;

pub trait ReadExt: Read + Seek {
    fn read_string(&mut self, len: usize) -> io::Result<String>;

    fn peek_byte(&mut self) -> io::Result<u8>;

    fn read_uint_be(&mut self, width: usize) -> io::Result<u64>;
}

impl<T> ReadExt for T
where
    T: Read + Seek,
{
    /// Reads `len` bytes as a string, replacing invalid UTF-8 sequences.
    fn read_string(&mut self, len: usize) -> io::Result<String> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Peeks a single byte from the reader without advancing its position.
    fn peek_byte(&mut self) -> io::Result<u8> {
        let pos = self.stream_position()?;
        let mut buf = [0u8; 1];
        let n = self.read(&mut buf)?;
        self.seek(SeekFrom::Start(pos))?;
        if n == 0 {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "EOF"))
        } else {
            Ok(buf[0])
        }
    }

    /// Reads a big-endian unsigned integer of 1 to 8 bytes.
    fn read_uint_be(&mut self, width: usize) -> io::Result<u64> {
        if width == 0 || width > 8 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid integer width {width}"),
            ));
        }
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf[8 - width..])?;
        Ok(u64::from_be_bytes(buf))
    }
}

/// Utility methods for working with seekable streams.
pub trait SeekExt: Seek {
    /// Skips over the given number of bytes from the current position.
    fn skip<P: Copy + 'static>(&mut self, size: P) -> io::Result<u64>
    where
        u64: TryFrom<P>;
}

impl<T> SeekExt for T
where
    T: Seek,
{
    fn skip<P: Copy + 'static>(&mut self, size: P) -> io::Result<u64>
    where
        u64: TryFrom<P>,
    {
        let size = u64::try_from(size).map_err(|_| io::Error::from(io::ErrorKind::InvalidData))?;

        self.seek(SeekFrom::Current(size as i64))
    }
}
