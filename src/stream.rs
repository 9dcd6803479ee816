//! Line reading over child output pipes.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Reads newline-terminated lines from a byte stream.
///
/// Unlike `tokio::io::Lines`, invalid UTF-8 does not end the stream: malformed
/// bytes are replaced with U+FFFD and reading continues.
pub struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::with_capacity(256),
        }
    }

    /// Returns the next line without its terminator, or `None` at end of stream.
    ///
    /// Cancel safe: bytes of a partially read line are kept for the next call.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.reader.read_until(b'\n', &mut self.buf).await?;
        if self.buf.is_empty() {
            return Ok(None);
        }
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Ok(Some(line))
    }
}
