//! Render trace writer (`SPEC_FULL.md` §4.3.1).
//!
//! An append-only binary stream of context and texture-insert records. This module specifies
//! and implements the writer side only; an offline trace-viewer reading the same format back is
//! out of this core's scope (`SPEC_FULL.md` §1).

use std::io::{self, Write};

const TAG_CONTEXT: u32 = 0x5854_4143; // "CATX"
const TAG_TEXTURE: u32 = 0x5854_4554; // "TETX"

pub struct TraceWriter<W: Write> {
    out: W,
}

impl<W: Write> TraceWriter<W> {
    pub fn new(out: W) -> Self {
        TraceWriter { out }
    }

    pub fn write_texture_insert(&mut self, tsp: u32, tcw: u32, frame: u64, texel: &[u8]) -> io::Result<()> {
        self.out.write_all(&TAG_TEXTURE.to_le_bytes())?;
        self.out.write_all(&tsp.to_le_bytes())?;
        self.out.write_all(&tcw.to_le_bytes())?;
        self.out.write_all(&frame.to_le_bytes())?;
        self.out.write_all(&(texel.len() as u32).to_le_bytes())?;
        self.out.write_all(texel)
    }

    pub fn write_context(&mut self, base_address: u32, frame: u64, params: &[u8]) -> io::Result<()> {
        self.out.write_all(&TAG_CONTEXT.to_le_bytes())?;
        self.out.write_all(&base_address.to_le_bytes())?;
        self.out.write_all(&frame.to_le_bytes())?;
        self.out.write_all(&(params.len() as u32).to_le_bytes())?;
        self.out.write_all(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_recognizable_tags() {
        let mut buf = Vec::new();
        {
            let mut w = TraceWriter::new(&mut buf);
            w.write_context(0x1000_0000, 1, &[0u8; 32]).unwrap();
        }
        assert_eq!(&buf[0..4], &TAG_CONTEXT.to_le_bytes());
    }
}
