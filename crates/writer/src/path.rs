use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::Value;
use std::fmt::{self, Display, Write};

// Characters escaped within key literals of a path segment.
const KEY_LITERAL: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'?')
    .add(b'(')
    .add(b')');

/// One segment of an OData path.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    EntitySet(String),
    Singleton(String),
    /// Key values, rendered in parentheses appended to the prior segment.
    /// A single unnamed key renders bare: `Customers(1)`; compound keys
    /// render as `name=value` pairs.
    Key(Vec<(String, Value)>),
    /// A type-cast segment, present when the concrete type differs from the
    /// declared one.
    Cast(String),
    Navigation(String),
    Property(String),
}

/// Path mirrors the current scope chain as an OData path, e.g.
/// `Customers(1)/Orders(10)`. It only ever grows by one segment per scope
/// push; an empty path means the payload has no addressable root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path(Vec<Segment>);

impl Path {
    pub fn empty() -> Path {
        Path(Vec::new())
    }

    pub fn root(segment: Segment) -> Path {
        Path(vec![segment])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, segment: Segment) {
        self.0.push(segment);
    }

    /// A copy of this path extended by one segment.
    pub fn child(&self, segment: Segment) -> Path {
        let mut path = self.clone();
        path.push(segment);
        path
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::EntitySet(name) | Segment::Singleton(name) => {
                    if index != 0 {
                        f.write_char('/')?;
                    }
                    f.write_str(name)?;
                }
                Segment::Key(values) => {
                    f.write_char('(')?;
                    for (position, (name, value)) in values.iter().enumerate() {
                        if position != 0 {
                            f.write_char(',')?;
                        }
                        if values.len() > 1 {
                            write!(f, "{name}=")?;
                        }
                        write_key_value(f, value)?;
                    }
                    f.write_char(')')?;
                }
                Segment::Cast(name) => write!(f, "/{name}")?,
                Segment::Navigation(name) | Segment::Property(name) => {
                    if index != 0 {
                        f.write_char('/')?;
                    }
                    f.write_str(name)?;
                }
            }
        }
        Ok(())
    }
}

// Key literals follow OData conventions: strings are quoted with doubled
// embedded quotes, other primitives render as their JSON literal.
fn write_key_value(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::String(s) => {
            let escaped = s.replace('\'', "''");
            write!(f, "'{}'", utf8_percent_encode(&escaped, KEY_LITERAL))
        }
        other => write!(f, "{other}"),
    }
}
