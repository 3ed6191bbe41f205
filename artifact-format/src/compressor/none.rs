use std::io::{self, Read, Write};

use super::{Codec, DynRead, DynWrite, FinishableWriter};

pub struct NoneCodec;

struct PassthroughWriter(DynWrite);

impl Write for PassthroughWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl FinishableWriter for PassthroughWriter {
    fn finish(self: Box<Self>) -> io::Result<()> {
        self.0.finish()
    }
}

impl Codec for NoneCodec {
    fn id(&self) -> &'static str {
        "none"
    }

    fn suffix(&self) -> &'static str {
        ""
    }

    fn new_reader(&self, inner: DynRead) -> super::Result<DynRead> {
        Ok(inner)
    }

    fn new_writer(&self, inner: DynWrite) -> super::Result<DynWrite> {
        Ok(Box::new(PassthroughWriter(inner)))
    }
}

// A reader/writer that never had a FinishableWriter wrapped around it yet
// (used as the innermost sink passed to `new_writer`/`new_reader`).
pub struct IdentitySink<T>(pub T);

impl<T: Read> Read for IdentitySink<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<T: Write> Write for IdentitySink<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<T: Write> FinishableWriter for IdentitySink<T> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let mut this = self;
        this.flush()
    }
}
