use std::io::{self, BufWriter, Write};

/// Destination for primes in the order the coordinator finalizes them.
pub trait PrimeSink {
    fn emit(&mut self, prime: u64) -> io::Result<()>;

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// One decimal number per line, nothing else.
pub struct LineSink<W: Write> {
    writer: BufWriter<W>,
    itoa_buf: itoa::Buffer,
}

impl<W: Write> LineSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(128 * 1024, inner),
            itoa_buf: itoa::Buffer::new(),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}

impl<W: Write> PrimeSink for LineSink<W> {
    fn emit(&mut self, prime: u64) -> io::Result<()> {
        self.writer.write_all(self.itoa_buf.format(prime).as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl PrimeSink for Vec<u64> {
    fn emit(&mut self, prime: u64) -> io::Result<()> {
        self.push(prime);
        Ok(())
    }
}
