//! Indented, YAML-like rendering of diff nodes.
//!
//! Every node prints its dotted path as a `#` comment, then the parent
//! steps that differ from the previous node, then the `-` (x) and `+` (y)
//! values.

use std::fmt::Write as _;

use serde_json::Value;

use super::{DiffNode, PathStep};

const MASK: &str = "*****";

#[derive(Debug, Clone, Default)]
pub struct Renderer {
    left_padding: usize,
    mask_path_prefix: Option<String>,
}

impl Renderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_left_padding(mut self, padding: usize) -> Self {
        self.left_padding = padding;
        self
    }

    /// Replace values under paths starting with `prefix` by `*****`.
    #[must_use]
    pub fn with_mask_path(mut self, prefix: impl Into<String>) -> Self {
        self.mask_path_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn render(&self, nodes: &[DiffNode]) -> String {
        let mut out = String::new();
        let mut previous: &[PathStep] = &[];

        for node in nodes {
            let duplicate = duplicate_depth(&node.path, previous);
            previous = &node.path;
            let _ = writeln!(
                out,
                "{}#{}",
                pad((self.left_padding + duplicate) * 2),
                node.path_string
            );

            let mut in_array = false;
            for i in duplicate..node.path.len().saturating_sub(1) {
                let step = &node.path[i];
                if matches!(step, PathStep::Index(_)) {
                    let _ = write!(out, "{}- ", pad((self.left_padding + i) * 2));
                    in_array = true;
                    continue;
                }
                if in_array {
                    let _ = writeln!(out, "{step}:");
                    in_array = false;
                    continue;
                }
                let _ = writeln!(out, "{}{step}:", pad((self.left_padding + i) * 2));
            }

            let Some(last) = node.path.last() else {
                continue;
            };
            let masked = self
                .mask_path_prefix
                .as_deref()
                .is_some_and(|prefix| node.path_string.starts_with(prefix));
            let mask = |v: &Option<Value>| {
                if masked {
                    v.as_ref().map(|_| Value::String(MASK.to_string()))
                } else {
                    v.clone()
                }
            };
            let depth = self.left_padding + node.path.len() - 1;
            print_value(&mut out, '-', mask(&node.x).as_ref(), last, depth);
            print_value(&mut out, '+', mask(&node.y).as_ref(), last, depth);
        }
        out
    }
}

fn print_value(out: &mut String, mark: char, value: Option<&Value>, last: &PathStep, depth: usize) {
    let Some(value) = value else {
        return;
    };
    let (text, multiline) = render_node_value(value, "");
    if text.is_empty() {
        return;
    }
    let is_index = matches!(last, PathStep::Index(_));
    let multiline = multiline && !is_index;
    let head = pad((depth * 2).saturating_sub(1).max(1));
    let body = pad(depth * 2 + 1);

    if is_index {
        let _ = write!(out, "{mark}{head}- ");
    } else if multiline {
        let _ = writeln!(out, "{mark}{head}{last}:");
    } else {
        let _ = write!(out, "{mark}{head}{last}: ");
    }

    for (i, part) in text.split('\n').enumerate() {
        if (!is_index && multiline) || (is_index && i > 0) {
            let _ = writeln!(out, "{mark}{body}{part}");
        } else {
            let _ = writeln!(out, "{part}");
        }
    }
}

/// Render a value as YAML-ish text. The flag reports whether it spans lines
/// and must start on a new one.
fn render_node_value(value: &Value, prefix: &str) -> (String, bool) {
    match value {
        Value::Object(map) => {
            let child_prefix = format!("{prefix}  ");
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let lines: Vec<String> = keys
                .into_iter()
                .map(|key| {
                    let (sub, multiline) = render_node_value(&map[key], &child_prefix);
                    if multiline {
                        format!("{prefix}{key}:\n{sub}")
                    } else {
                        format!("{prefix}{key}: {sub}")
                    }
                })
                .collect();
            if lines.is_empty() {
                return (String::new(), false);
            }
            (lines.join("\n"), true)
        }
        Value::Array(items) => {
            let child_prefix = format!("{prefix}  ");
            let mut lines = Vec::new();
            for item in items {
                let (sub, _) = render_node_value(item, &child_prefix);
                for (i, part) in sub.split('\n').enumerate() {
                    let part = part.strip_prefix(child_prefix.as_str()).unwrap_or(part);
                    if i == 0 {
                        lines.push(format!("{prefix}- {part}"));
                    } else {
                        lines.push(format!("{prefix}  {part}"));
                    }
                }
            }
            (lines.join("\n"), true)
        }
        Value::String(s) => (s.clone(), false),
        Value::Number(n) => (render_number(n), false),
        Value::Bool(b) => (b.to_string(), false),
        Value::Null => (String::new(), false),
    }
}

fn render_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    n.as_f64().map_or_else(|| n.to_string(), |f| f.to_string())
}

/// Index of the first step where `x` and `y` differ; zero when one is a
/// prefix of the other.
fn duplicate_depth(x: &[PathStep], y: &[PathStep]) -> usize {
    x.iter()
        .zip(y)
        .position(|(a, b)| a != b)
        .unwrap_or(0)
}

fn pad(width: usize) -> String {
    " ".repeat(width)
}
