//! Output formatting for filter results.

use serde_json::Value;

const RESET: &str = "\x1b[0m";
const NULL_COLOR: &str = "\x1b[1;30m";
const SCALAR_COLOR: &str = "\x1b[0;39m";
const STRING_COLOR: &str = "\x1b[0;32m";
const CONTAINER_COLOR: &str = "\x1b[1;39m";
const KEY_COLOR: &str = "\x1b[34;1m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indent {
    Compact,
    Spaces(usize),
    Tab,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintOptions {
    pub indent: Indent,
    pub sort_keys: bool,
    pub color: bool,
    /// Print top-level strings without quotes
    pub raw: bool,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            indent: Indent::Spaces(2),
            sort_keys: false,
            color: true,
            raw: false,
        }
    }
}

/// Render one output value, without the trailing newline.
pub fn render(value: &Value, opts: &PrintOptions) -> String {
    if opts.raw
        && let Value::String(s) = value
    {
        return s.clone();
    }
    let mut out = String::new();
    write_value(&mut out, value, opts, 0);
    out
}

fn paint(out: &mut String, color: &str, text: &str, opts: &PrintOptions) {
    if opts.color {
        out.push_str(color);
        out.push_str(text);
        out.push_str(RESET);
    } else {
        out.push_str(text);
    }
}

fn newline(out: &mut String, opts: &PrintOptions, depth: usize) {
    match opts.indent {
        Indent::Compact | Indent::Spaces(0) => {}
        Indent::Spaces(n) => {
            out.push('\n');
            out.push_str(&" ".repeat(n * depth));
        }
        Indent::Tab => {
            out.push('\n');
            out.push_str(&"\t".repeat(depth));
        }
    }
}

fn is_pretty(opts: &PrintOptions) -> bool {
    !matches!(opts.indent, Indent::Compact | Indent::Spaces(0))
}

fn quote(s: &str) -> String {
    // serializing a str cannot fail
    serde_json::to_string(s).unwrap_or_default()
}

fn write_value(out: &mut String, value: &Value, opts: &PrintOptions, depth: usize) {
    match value {
        Value::Null => paint(out, NULL_COLOR, "null", opts),
        Value::Bool(b) => paint(out, SCALAR_COLOR, if *b { "true" } else { "false" }, opts),
        Value::Number(n) => paint(out, SCALAR_COLOR, &n.to_string(), opts),
        Value::String(s) => paint(out, STRING_COLOR, &quote(s), opts),
        Value::Array(items) => {
            if items.is_empty() {
                paint(out, CONTAINER_COLOR, "[]", opts);
                return;
            }
            paint(out, CONTAINER_COLOR, "[", opts);
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    paint(out, CONTAINER_COLOR, ",", opts);
                }
                newline(out, opts, depth + 1);
                write_value(out, item, opts, depth + 1);
            }
            newline(out, opts, depth);
            paint(out, CONTAINER_COLOR, "]", opts);
        }
        Value::Object(map) => {
            if map.is_empty() {
                paint(out, CONTAINER_COLOR, "{}", opts);
                return;
            }
            let mut entries: Vec<_> = map.iter().collect();
            if opts.sort_keys {
                entries.sort_by(|a, b| a.0.cmp(b.0));
            }

            paint(out, CONTAINER_COLOR, "{", opts);
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    paint(out, CONTAINER_COLOR, ",", opts);
                }
                newline(out, opts, depth + 1);
                paint(out, KEY_COLOR, &quote(key), opts);
                paint(out, CONTAINER_COLOR, ":", opts);
                if is_pretty(opts) {
                    out.push(' ');
                }
                write_value(out, item, opts, depth + 1);
            }
            newline(out, opts, depth);
            paint(out, CONTAINER_COLOR, "}", opts);
        }
    }
}
