use std::io::{self, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::{Codec, DynRead, DynWrite, FinishableWriter};

pub struct GzipCodec;

struct GzWriter(GzEncoder<DynWrite>);

impl Write for GzWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl FinishableWriter for GzWriter {
    fn finish(self: Box<Self>) -> io::Result<()> {
        // Flush the gzip footer, then cascade the finish down to whatever
        // sink this codec was layered on top of (a checksum tee, another
        // codec, or the final file/stream).
        let inner = self.0.finish()?;
        inner.finish()
    }
}

impl Codec for GzipCodec {
    fn id(&self) -> &'static str {
        "gzip"
    }

    fn suffix(&self) -> &'static str {
        ".gz"
    }

    fn new_reader(&self, inner: DynRead) -> super::Result<DynRead> {
        Ok(Box::new(GzDecoder::new(inner)))
    }

    fn new_writer(&self, inner: DynWrite) -> super::Result<DynWrite> {
        Ok(Box::new(GzWriter(GzEncoder::new(inner, Compression::best()))))
    }
}
