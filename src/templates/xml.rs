//! Structured value to XML rendering.
//!
//! ClickHouse configuration is XML while `config` and `users` are open
//! mappings. The `xml` filter bridges the two:
//!
//! - a mapping key becomes an element, nested mappings nest
//! - an array repeats its parent element once per item
//! - keys starting with `@` on a mapping become attributes of its element
//! - scalars become escaped text, `null` an empty element
//!
//! Applied to a scalar the filter just escapes it.

use std::collections::HashMap;

use serde_json::{Map, Value};

/// Spaces added per nesting level.
const INDENT_STEP: usize = 4;

const ATTRIBUTE_PREFIX: char = '@';

/// Tera filter: `{{ config | xml(indent=4, skip=["zookeeper"]) }}`.
///
/// `indent` is the number of leading spaces for top-level elements and
/// `skip` lists top-level keys the template renders itself.
pub fn xml_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let indent = match args.get("indent") {
        None => 0,
        Some(v) => v
            .as_u64()
            .ok_or_else(|| tera::Error::msg("xml: `indent` must be a non-negative integer"))?
            as usize,
    };

    let skip: Vec<&str> = match args.get("skip") {
        None => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        Some(_) => return Err(tera::Error::msg("xml: `skip` must be an array of key names")),
    };

    let mut out = String::new();
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key.starts_with(ATTRIBUTE_PREFIX) || skip.contains(&key.as_str()) {
                    continue;
                }
                write_element(&mut out, key, child, indent)?;
            }
        }
        Value::Array(_) => {
            return Err(tera::Error::msg(
                "xml: arrays need an enclosing key to name their elements",
            ))
        }
        scalar => out.push_str(&escape_xml(&scalar_text(scalar))),
    }

    Ok(Value::String(out))
}

/// Escape the five XML special characters.
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn write_element(out: &mut String, name: &str, value: &Value, level: usize) -> tera::Result<()> {
    check_name(name)?;
    let pad = " ".repeat(level);

    match value {
        Value::Array(items) => {
            for item in items {
                write_element(out, name, item, level)?;
            }
        }
        Value::Object(map) => {
            let attrs = attributes(map)?;
            let mut children = map
                .iter()
                .filter(|(key, _)| !key.starts_with(ATTRIBUTE_PREFIX))
                .peekable();

            if children.peek().is_none() {
                out.push_str(&format!("{}<{}{}/>\n", pad, name, attrs));
            } else {
                out.push_str(&format!("{}<{}{}>\n", pad, name, attrs));
                for (key, child) in children {
                    write_element(out, key, child, level + INDENT_STEP)?;
                }
                out.push_str(&format!("{}</{}>\n", pad, name));
            }
        }
        Value::Null => out.push_str(&format!("{}<{}/>\n", pad, name)),
        scalar => out.push_str(&format!(
            "{}<{}>{}</{}>\n",
            pad,
            name,
            escape_xml(&scalar_text(scalar)),
            name
        )),
    }

    Ok(())
}

fn attributes(map: &Map<String, Value>) -> tera::Result<String> {
    let mut attrs = String::new();
    for (key, value) in map {
        let Some(name) = key.strip_prefix(ATTRIBUTE_PREFIX) else {
            continue;
        };
        check_name(name)?;
        if value.is_object() || value.is_array() {
            return Err(tera::Error::msg(format!(
                "xml: attribute `{}` must be a scalar",
                key
            )));
        }
        attrs.push_str(&format!(" {}=\"{}\"", name, escape_xml(&scalar_text(value))));
    }
    Ok(attrs)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Whether `name` can be written as an element or attribute name.
///
/// Restricted to the ASCII subset ClickHouse configs use: a letter or `_`,
/// then letters, digits, `_`, `-`, `.` or `:`.
pub fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
        }
        _ => false,
    }
}

fn check_name(name: &str) -> tera::Result<()> {
    if is_xml_name(name) {
        Ok(())
    } else {
        Err(tera::Error::msg(format!("xml: `{}` is not a valid element name", name)))
    }
}
