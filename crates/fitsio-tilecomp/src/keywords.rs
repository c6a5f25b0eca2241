//! Header keywords as seen by the compression engine.
//!
//! The engine does not parse FITS header cards itself. A header reader hands
//! it a list of already-parsed [`Keyword`]s and looks values up through the
//! helpers here.

use alloc::string::String;

/// A parsed header value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Logical(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

/// One header keyword and its value.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub name: String,
    pub value: Value,
}

impl Keyword {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Keyword {
            name: name.into(),
            value,
        }
    }

    pub fn integer(name: impl Into<String>, value: i64) -> Self {
        Self::new(name, Value::Integer(value))
    }

    pub fn float(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, Value::Float(value))
    }

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, Value::String(value.into()))
    }
}

fn find<'a>(keywords: &'a [Keyword], name: &str) -> Option<&'a Value> {
    keywords
        .iter()
        .find(|k| k.name.trim() == name)
        .map(|k| &k.value)
}

/// Find an integer-valued keyword.
pub fn find_integer_keyword(keywords: &[Keyword], name: &str) -> Option<i64> {
    match find(keywords, name)? {
        Value::Integer(n) => Some(*n),
        _ => None,
    }
}

/// Find a float-valued keyword, promoting integers to `f64`.
pub fn find_float_keyword(keywords: &[Keyword], name: &str) -> Option<f64> {
    match find(keywords, name)? {
        Value::Float(f) => Some(*f),
        Value::Integer(n) => Some(*n as f64),
        _ => None,
    }
}

/// Find a string-valued keyword, with surrounding blanks removed.
pub fn find_string_keyword<'a>(keywords: &'a [Keyword], name: &str) -> Option<&'a str> {
    match find(keywords, name)? {
        Value::String(s) => Some(s.trim()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Keyword> {
        vec![
            Keyword::integer("ZNAXIS", 2),
            Keyword::float("ZSCALE", 0.5),
            Keyword::string("ZCMPTYPE", "RICE_1  "),
            Keyword::new("ZSIMPLE", Value::Logical(true)),
        ]
    }

    #[test]
    fn integer_lookup() {
        let kw = sample();
        assert_eq!(find_integer_keyword(&kw, "ZNAXIS"), Some(2));
        assert_eq!(find_integer_keyword(&kw, "ZSCALE"), None);
        assert_eq!(find_integer_keyword(&kw, "NAXIS"), None);
    }

    #[test]
    fn float_lookup_promotes_integers() {
        let kw = sample();
        assert_eq!(find_float_keyword(&kw, "ZSCALE"), Some(0.5));
        assert_eq!(find_float_keyword(&kw, "ZNAXIS"), Some(2.0));
        assert_eq!(find_float_keyword(&kw, "ZCMPTYPE"), None);
    }

    #[test]
    fn string_lookup_trims() {
        let kw = sample();
        assert_eq!(find_string_keyword(&kw, "ZCMPTYPE"), Some("RICE_1"));
        assert_eq!(find_string_keyword(&kw, "ZSIMPLE"), None);
    }
}
