use std::io::{self, Write};

#[derive(Debug)]
enum Frame {
    Object { first: bool },
    Array { first: bool },
}

/// A minimal streaming JSON writer: tracks container nesting for comma
/// placement and escapes strings through serde_json. Values are written
/// as they arrive; nothing is buffered beyond the underlying sink.
#[derive(Debug)]
pub(crate) struct Emitter<W: Write> {
    w: W,
    frames: Vec<Frame>,
}

impl<W: Write> Emitter<W> {
    pub fn new(w: W) -> Emitter<W> {
        Emitter {
            w,
            frames: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.w
    }

    // Array elements separate themselves; object members separate in name().
    fn separate_value(&mut self) -> io::Result<()> {
        if let Some(Frame::Array { first }) = self.frames.last_mut() {
            if *first {
                *first = false;
            } else {
                self.w.write_all(b",")?;
            }
        }
        Ok(())
    }

    pub fn begin_object(&mut self) -> io::Result<()> {
        self.separate_value()?;
        self.w.write_all(b"{")?;
        self.frames.push(Frame::Object { first: true });
        Ok(())
    }

    pub fn end_object(&mut self) -> io::Result<()> {
        self.frames.pop();
        self.w.write_all(b"}")
    }

    pub fn begin_array(&mut self) -> io::Result<()> {
        self.separate_value()?;
        self.w.write_all(b"[")?;
        self.frames.push(Frame::Array { first: true });
        Ok(())
    }

    pub fn end_array(&mut self) -> io::Result<()> {
        self.frames.pop();
        self.w.write_all(b"]")
    }

    /// Write an object member name, with its separating comma and colon.
    pub fn name(&mut self, name: &str) -> io::Result<()> {
        if let Some(Frame::Object { first }) = self.frames.last_mut() {
            if *first {
                *first = false;
            } else {
                self.w.write_all(b",")?;
            }
        }
        serde_json::to_writer(&mut self.w, name)?;
        self.w.write_all(b":")
    }

    pub fn value(&mut self, value: &serde_json::Value) -> io::Result<()> {
        self.separate_value()?;
        serde_json::to_writer(&mut self.w, value)?;
        Ok(())
    }

    pub fn string(&mut self, value: &str) -> io::Result<()> {
        self.separate_value()?;
        serde_json::to_writer(&mut self.w, value)?;
        Ok(())
    }

    /// Open a string value written in chunks.
    pub fn begin_string(&mut self) -> io::Result<()> {
        self.separate_value()?;
        self.w.write_all(b"\"")
    }

    /// A chunk requiring JSON escaping.
    pub fn escaped_chunk(&mut self, chunk: &str) -> io::Result<()> {
        let encoded = serde_json::to_string(chunk)?;
        self.w.write_all(encoded[1..encoded.len() - 1].as_bytes())
    }

    /// A chunk already within the safe JSON string alphabet (base64).
    pub fn plain_chunk(&mut self, chunk: &str) -> io::Result<()> {
        self.w.write_all(chunk.as_bytes())
    }

    pub fn end_string(&mut self) -> io::Result<()> {
        self.w.write_all(b"\"")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.w.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_framing_and_commas() {
        let mut emitter = Emitter::new(Vec::new());
        emitter.begin_object().unwrap();
        emitter.name("a").unwrap();
        emitter.value(&json!(1)).unwrap();
        emitter.name("b").unwrap();
        emitter.begin_array().unwrap();
        emitter.value(&json!("x")).unwrap();
        emitter.value(&json!(null)).unwrap();
        emitter.begin_object().unwrap();
        emitter.end_object().unwrap();
        emitter.end_array().unwrap();
        emitter.end_object().unwrap();

        let out = String::from_utf8(emitter.into_inner()).unwrap();
        assert_eq!(out, r#"{"a":1,"b":["x",null,{}]}"#);
    }

    #[test]
    fn test_chunked_string() {
        let mut emitter = Emitter::new(Vec::new());
        emitter.begin_array().unwrap();
        emitter.begin_string().unwrap();
        emitter.escaped_chunk("line\n").unwrap();
        emitter.escaped_chunk("\"quoted\"").unwrap();
        emitter.end_string().unwrap();
        emitter.end_array().unwrap();

        let out = String::from_utf8(emitter.into_inner()).unwrap();
        assert_eq!(out, r#"["line\n\"quoted\""]"#);

        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed[0], json!("line\n\"quoted\""));
    }
}
