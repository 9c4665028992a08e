use super::backend::Backend;
use super::writer::Writer;
use super::Error;
use std::io;

/// Binary sink over the current property (or untyped set) value. While it
/// lives, the writer is mutably borrowed: no other operation can interleave.
/// Dropping it disposes the underlying scope best-effort; call `finish` to
/// observe disposal errors.
pub struct BinaryStreamWriter<'w, 'm, B: Backend> {
    writer: &'w mut Writer<'m, B>,
    finished: bool,
}

impl<'w, 'm, B: Backend> BinaryStreamWriter<'w, 'm, B> {
    pub(crate) fn new(writer: &'w mut Writer<'m, B>) -> Self {
        BinaryStreamWriter {
            writer,
            finished: false,
        }
    }

    /// Dispose the sub-writer, closing the value and returning control to
    /// the writer.
    pub fn finish(mut self) -> Result<(), Error> {
        self.finished = true;
        self.writer.stream_disposed()
    }
}

impl<'w, 'm, B: Backend> io::Write for BinaryStreamWriter<'w, 'm, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer
            .write_binary_chunk(buf)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'w, 'm, B: Backend> Drop for BinaryStreamWriter<'w, 'm, B> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.writer.stream_disposed();
        }
    }
}

/// Character sink over the current property value; the text twin of
/// `BinaryStreamWriter`.
pub struct TextValueWriter<'w, 'm, B: Backend> {
    writer: &'w mut Writer<'m, B>,
    finished: bool,
}

impl<'w, 'm, B: Backend> TextValueWriter<'w, 'm, B> {
    pub(crate) fn new(writer: &'w mut Writer<'m, B>) -> Self {
        TextValueWriter {
            writer,
            finished: false,
        }
    }

    pub fn write_str(&mut self, chunk: &str) -> Result<(), Error> {
        self.writer.write_text_chunk(chunk)
    }

    pub fn finish(mut self) -> Result<(), Error> {
        self.finished = true;
        self.writer.stream_disposed()
    }
}

impl<'w, 'm, B: Backend> Drop for TextValueWriter<'w, 'm, B> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.writer.stream_disposed();
        }
    }
}

/// Async-mode binary sink. Disposal cannot await from a destructor: a
/// dropped, unfinished instance leaves its scope open and the next `end`
/// reports the undisposed stream.
pub struct AsyncBinaryStreamWriter<'w, 'm, B: Backend> {
    writer: &'w mut Writer<'m, B>,
    finished: bool,
}

impl<'w, 'm, B: Backend> AsyncBinaryStreamWriter<'w, 'm, B> {
    pub(crate) fn new(writer: &'w mut Writer<'m, B>) -> Self {
        AsyncBinaryStreamWriter {
            writer,
            finished: false,
        }
    }

    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), Error> {
        self.writer.write_binary_chunk_async(chunk).await
    }

    pub async fn finish(mut self) -> Result<(), Error> {
        self.finished = true;
        self.writer.stream_disposed_async().await
    }
}

impl<'w, 'm, B: Backend> Drop for AsyncBinaryStreamWriter<'w, 'm, B> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("async binary sub-writer dropped without finish; its scope stays open");
        }
    }
}

/// Async-mode character sink; see `AsyncBinaryStreamWriter` on disposal.
pub struct AsyncTextValueWriter<'w, 'm, B: Backend> {
    writer: &'w mut Writer<'m, B>,
    finished: bool,
}

impl<'w, 'm, B: Backend> AsyncTextValueWriter<'w, 'm, B> {
    pub(crate) fn new(writer: &'w mut Writer<'m, B>) -> Self {
        AsyncTextValueWriter {
            writer,
            finished: false,
        }
    }

    pub async fn write_str(&mut self, chunk: &str) -> Result<(), Error> {
        self.writer.write_text_chunk_async(chunk).await
    }

    pub async fn finish(mut self) -> Result<(), Error> {
        self.finished = true;
        self.writer.stream_disposed_async().await
    }
}

impl<'w, 'm, B: Backend> Drop for AsyncTextValueWriter<'w, 'm, B> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("async text sub-writer dropped without finish; its scope stays open");
        }
    }
}
