use std::io::{self, Write};

use xz2::read::XzDecoder;
use xz2::stream::{Check, Filters, LzmaOptions, MatchFinder, Stream};
use xz2::write::XzEncoder;

use super::{Codec, DynRead, DynWrite, FinishableWriter};

pub struct LzmaCodec;

// Matches `xz -9` output: 64 MiB dictionary, CRC64 integrity check, binary
// tree match finder with 4-byte hashing. liblzma picks the container block
// size itself (it defaults to roughly 3x the dictionary at this preset); the
// stream encoder API this crate binds to doesn't expose an independent
// block-size knob to override that.
const DICT_SIZE: u32 = 64 * 1024 * 1024;
const PRESET: u32 = 9;

fn xz_stream() -> io::Result<Stream> {
    let mut opts = LzmaOptions::new_preset(PRESET).map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    opts.dict_size(DICT_SIZE);
    opts.match_finder(MatchFinder::BinaryTree4);

    let mut filters = Filters::new();
    filters.lzma2(&opts);

    Stream::new_stream_encoder(&filters, Check::Crc64).map_err(|err| io::Error::new(io::ErrorKind::Other, err))
}

struct LzmaWriter(XzEncoder<DynWrite>);

impl Write for LzmaWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl FinishableWriter for LzmaWriter {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let inner = self.0.finish()?;
        inner.finish()
    }
}

impl Codec for LzmaCodec {
    fn id(&self) -> &'static str {
        "lzma"
    }

    fn suffix(&self) -> &'static str {
        ".xz"
    }

    fn new_reader(&self, inner: DynRead) -> super::Result<DynRead> {
        Ok(Box::new(XzDecoder::new(inner)))
    }

    fn new_writer(&self, inner: DynWrite) -> super::Result<DynWrite> {
        let stream = xz_stream()?;
        Ok(Box::new(LzmaWriter(XzEncoder::new_stream(inner, stream))))
    }
}
