use bytes::{Bytes, BytesMut};

/// Splits a byte stream into newline-terminated frames.
///
/// Frames may span any number of chunks. Returned frames include their trailing newline so that
/// they may be forwarded without copying.
#[derive(Debug, Default)]
pub(crate) struct LineFrames {
    buf: BytesMut,
}

impl LineFrames {
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub(crate) fn next_frame(&mut self) -> Option<Bytes> {
        let end = self.buf.iter().position(|b| *b == b'\n')?;
        Some(self.buf.split_to(end + 1).freeze())
    }

    /// Returns any unterminated frame left when the stream ends.
    pub(crate) fn finish(&mut self) -> Option<Bytes> {
        if self.buf.iter().all(u8::is_ascii_whitespace) {
            self.buf.clear();
            return None;
        }
        Some(self.buf.split().freeze())
    }
}
