//! JSON text rendering for Mace values.
//!
//! Output keeps object keys in insertion order. A few values have no JSON
//! spelling and are rendered the way the query language itself writes them:
//!
//! - `NaN`, `Infinity` and `-Infinity` appear as bare words;
//! - an exact fraction appears as the quoted string `"n/d"`;
//! - dates and date-times appear as quoted `"YYYY-MM-DD"` and
//!   `"YYYY-MM-DD HH:MM:SS"` strings.
//!
//! # Examples
//!
//! ```
//! use mace_lang::Value;
//! use mace_lang::output::{to_json, to_json_pretty};
//!
//! let value = Value::Array(vec![Value::Integer(1), Value::Float(2.0)]);
//!
//! assert_eq!(to_json(&value), "[1,2.0]");
//! assert_eq!(to_json_pretty(&value), "[\n  1,\n  2.0\n]");
//! ```

use std::fmt::Write;

use crate::value::Value;

pub struct JsonPrinter {
    pretty: bool,
}

impl JsonPrinter {
    pub fn new(pretty: bool) -> Self {
        JsonPrinter { pretty }
    }

    pub fn print(&self, value: &Value) -> String {
        let mut out = String::new();
        self.write_value(&mut out, value, 0);
        out
    }

    fn write_value(&self, out: &mut String, value: &Value, indent: usize) {
        match value {
            Value::Null => out.push_str("null"),
            Value::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Integer(n) => {
                let _ = write!(out, "{}", n);
            }
            Value::Float(n) => out.push_str(&format_float(*n)),
            Value::Rational(r) => write_string(out, &r.to_string()),
            Value::String(s) => write_string(out, s),
            Value::Date(d) => write_string(out, &d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => write_string(out, &dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            Value::Array(arr) => {
                self.write_seq(out, '[', ']', arr.iter(), indent, |p, out, v, ind| {
                    p.write_value(out, v, ind)
                })
            }
            Value::Object(obj) => {
                self.write_seq(out, '{', '}', obj.iter(), indent, |p, out, (k, v), ind| {
                    write_string(out, k);
                    out.push_str(if p.pretty { ": " } else { ":" });
                    p.write_value(out, v, ind);
                })
            }
        }
    }

    fn write_seq<I, T>(
        &self,
        out: &mut String,
        open: char,
        close: char,
        items: I,
        indent: usize,
        write_item: impl Fn(&Self, &mut String, T, usize),
    ) where
        I: ExactSizeIterator<Item = T>,
    {
        out.push(open);
        if items.len() == 0 {
            out.push(close);
            return;
        }
        for (i, item) in items.enumerate() {
            if i > 0 {
                out.push(',');
            }
            if self.pretty {
                out.push('\n');
                out.push_str(&"  ".repeat(indent + 1));
            }
            write_item(self, out, item, indent + 1);
        }
        if self.pretty {
            out.push('\n');
            out.push_str(&"  ".repeat(indent));
        }
        out.push(close);
    }
}

/// Formats a float so that whole numbers keep a trailing `.0`.
pub fn format_float(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        // Debug keeps `.0` on whole numbers and switches to exponents at the extremes
        format!("{:?}", n)
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Converts a Value to compact JSON text.
pub fn to_json(value: &Value) -> String {
    JsonPrinter::new(false).print(value)
}

/// Converts a Value to JSON text with 2-space indentation.
pub fn to_json_pretty(value: &Value) -> String {
    JsonPrinter::new(true).print(value)
}
