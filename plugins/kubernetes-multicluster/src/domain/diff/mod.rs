//! Structural diff between two manifest bodies.
//!
//! `x` is always the "before" side (running or live state) and `y` the
//! "after" side (target or Git). Nodes are reported at the deepest path
//! where the two sides disagree and are sorted by their dotted path.

mod list;
mod render;

use std::fmt;

use serde_json::Value;

pub use list::{diff_list, DiffListChange, DiffListResult, DiffRenderOptions};
pub use render::Renderer;

use super::manifest::Manifest;

/// Equality relaxations applied while walking both sides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// A missing value equals an empty one (`null`, `""`, `0`, `false`, `[]`, `{}`).
    pub equate_empty: bool,
    /// Map keys that exist only on the `x` side are not reported.
    pub ignore_adding_map_keys: bool,
    /// `5` equals `"5"` and `1.5` equals `"1.5"`.
    pub compare_number_and_numeric_string: bool,
}

impl DiffOptions {
    /// All three relaxations, as used for drift detection.
    #[must_use]
    pub fn relaxed() -> Self {
        Self {
            equate_empty: true,
            ignore_adding_map_keys: true,
            compare_number_and_numeric_string: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiffNode {
    pub path: Vec<PathStep>,
    pub path_string: String,
    pub x: Option<Value>,
    pub y: Option<Value>,
}

impl DiffNode {
    /// Whether the path is exactly `pattern`, where `*` matches any single
    /// step and `a|b` matches either key.
    #[must_use]
    pub fn path_matches(&self, pattern: &[&str]) -> bool {
        self.path.len() == pattern.len()
            && self.path.iter().zip(pattern).all(|(step, want)| {
                *want == "*" || want.split('|').any(|alt| alt == step.to_string())
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffResult {
    nodes: Vec<DiffNode>,
}

impl DiffResult {
    #[must_use]
    pub fn has_diff(&self) -> bool {
        !self.nodes.is_empty()
    }

    #[must_use]
    pub fn nodes(&self) -> &[DiffNode] {
        &self.nodes
    }

    pub fn find_by_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a DiffNode> {
        self.nodes
            .iter()
            .filter(move |node| node.path_string.starts_with(prefix))
    }
}

/// Diff two JSON values.
#[must_use]
pub fn diff_values(x: &Value, y: &Value, options: DiffOptions) -> DiffResult {
    let mut differ = Differ {
        options,
        nodes: Vec::new(),
    };
    differ.diff(&mut Vec::new(), Some(x), Some(y));
    differ
        .nodes
        .sort_by(|a, b| a.path_string.cmp(&b.path_string));
    DiffResult {
        nodes: differ.nodes,
    }
}

/// Diff the bodies of two manifests.
#[must_use]
pub fn diff_manifests(x: &Manifest, y: &Manifest, options: DiffOptions) -> DiffResult {
    diff_values(x.body(), y.body(), options)
}

struct Differ {
    options: DiffOptions,
    nodes: Vec<DiffNode>,
}

impl Differ {
    fn add_node(&mut self, path: &[PathStep], x: Option<&Value>, y: Option<&Value>) {
        let path_string = path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".");
        self.nodes.push(DiffNode {
            path: path.to_vec(),
            path_string,
            x: x.cloned(),
            y: y.cloned(),
        });
    }

    fn diff(&mut self, path: &mut Vec<PathStep>, x: Option<&Value>, y: Option<&Value>) {
        let (x, y) = match (x, y) {
            (None, None) => return,
            (None, Some(y)) => {
                if !(self.options.equate_empty && is_empty(y)) {
                    self.add_node(path, None, Some(y));
                }
                return;
            }
            (Some(x), None) => {
                if !(self.options.equate_empty && is_empty(x)) {
                    self.add_node(path, Some(x), None);
                }
                return;
            }
            (Some(x), Some(y)) => (x, y),
        };

        if self.options.equate_empty && is_empty(x) && is_empty(y) {
            return;
        }

        if let (Some(nx), Some(ny)) = (as_number(x, false), as_number(y, false)) {
            if nx.total_cmp(&ny).is_ne() {
                self.add_node(path, Some(x), Some(y));
            }
            return;
        }

        if self.options.compare_number_and_numeric_string
            && (x.is_number() || y.is_number())
        {
            if let (Some(nx), Some(ny)) = (as_number(x, true), as_number(y, true)) {
                if nx.total_cmp(&ny).is_ne() {
                    self.add_node(path, Some(x), Some(y));
                }
                return;
            }
        }

        match (x, y) {
            (Value::Object(mx), Value::Object(my)) => {
                let keys = mx
                    .keys()
                    .chain(my.keys().filter(|k| !mx.contains_key(*k)));
                for key in keys {
                    let (vx, vy) = (mx.get(key), my.get(key));
                    if self.options.ignore_adding_map_keys && vy.is_none() {
                        continue;
                    }
                    path.push(PathStep::Key(key.clone()));
                    self.diff(path, vx, vy);
                    path.pop();
                }
            }
            (Value::Array(ax), Value::Array(ay)) => {
                for index in 0..ax.len().max(ay.len()) {
                    path.push(PathStep::Index(index));
                    match (ax.get(index), ay.get(index)) {
                        (Some(vx), Some(vy)) => self.diff(path, Some(vx), Some(vy)),
                        (vx, vy) => self.add_node(path, vx, vy),
                    }
                    path.pop();
                }
            }
            (Value::Null, Value::Null) => {}
            (Value::String(sx), Value::String(sy)) if sx == sy => {}
            (Value::Bool(bx), Value::Bool(by)) if bx == by => {}
            _ => self.add_node(path, Some(x), Some(y)),
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.abs() < f64::EPSILON),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn as_number(value: &Value, parse_strings: bool) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if parse_strings => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
