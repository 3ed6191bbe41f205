use std::io::{self, Write};

use super::{Codec, DynRead, DynWrite, FinishableWriter};

pub struct ZstdCodec;

const LEVEL: i32 = 19;

struct ZstdWriter<'a>(zstd::Encoder<'a, DynWrite>);

impl Write for ZstdWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl FinishableWriter for ZstdWriter<'_> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let inner = self.0.finish()?;
        inner.finish()
    }
}

impl Codec for ZstdCodec {
    fn id(&self) -> &'static str {
        "zstd"
    }

    fn suffix(&self) -> &'static str {
        ".zst"
    }

    fn new_reader(&self, inner: DynRead) -> super::Result<DynRead> {
        Ok(Box::new(zstd::stream::Decoder::new(inner)?))
    }

    fn new_writer(&self, inner: DynWrite) -> super::Result<DynWrite> {
        Ok(Box::new(ZstdWriter(zstd::Encoder::new(inner, LEVEL)?)))
    }
}
