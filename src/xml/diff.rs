//! Structural diff between two XML subtrees.
//!
//! Sibling elements are matched first by `@name`, then by positional order
//! when the unnamed counts agree, else by a similarity score (tag match 0.3,
//! text equality 0.3 or containment 0.15, attribute Jaccard weighted 0.4);
//! pairs below the 0.5 threshold stay unmatched and report as added/removed.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;

use crate::xml::node::XmlNode;

/// What happened to a given path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffType {
    /// Present only in the target.
    Added,
    /// Present only in the source.
    Removed,
    /// Present in both with different content.
    Changed,
    /// Present in both with identical content.
    Unchanged,
}

/// One diff entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffItem {
    /// Diff classification.
    #[serde(rename = "type")]
    pub diff_type: DiffType,
    /// Slash path of the element (attribute diffs end in `@attr`).
    pub path: String,
    /// Source-side value or element summary.
    pub source_value: Option<Value>,
    /// Target-side value or element summary.
    pub target_value: Option<Value>,
}

/// Compare two elements and return the differences.
pub fn compare(source: &XmlNode, target: &XmlNode) -> Vec<DiffItem> {
    let mut diffs = Vec::new();
    let path = format!("/{}", source.tag);
    compare_elements(source, target, &path, &mut diffs);
    diffs
}

/// Render diffs as plain text, one line per item.
pub fn format_text(diffs: &[DiffItem]) -> String {
    let mut lines = Vec::with_capacity(diffs.len());
    for diff in diffs {
        match diff.diff_type {
            DiffType::Added => lines.push(format!(
                "+ {}: {}",
                diff.path,
                render_value(&diff.target_value)
            )),
            DiffType::Removed => lines.push(format!(
                "- {}: {}",
                diff.path,
                render_value(&diff.source_value)
            )),
            DiffType::Changed => lines.push(format!(
                "~ {}: {} -> {}",
                diff.path,
                render_value(&diff.source_value),
                render_value(&diff.target_value)
            )),
            DiffType::Unchanged => {}
        }
    }
    lines.join("\n")
}

fn render_value(value: &Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn element_summary(node: &XmlNode) -> Value {
    let mut summary = serde_json::Map::new();
    summary.insert("tag".to_string(), json!(node.tag));
    if !node.attributes.is_empty() {
        let attrs: serde_json::Map<String, Value> = node
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();
        summary.insert("attributes".to_string(), Value::Object(attrs));
    }
    if let Some(text) = &node.text {
        summary.insert("text".to_string(), json!(text));
    }
    if !node.children.is_empty() {
        summary.insert("children_count".to_string(), json!(node.children.len()));
    }
    Value::Object(summary)
}

fn compare_elements(source: &XmlNode, target: &XmlNode, path: &str, diffs: &mut Vec<DiffItem>) {
    // Attributes.
    for (key, source_value) in &source.attributes {
        match target.attr(key) {
            None => diffs.push(DiffItem {
                diff_type: DiffType::Removed,
                path: format!("{path}/@{key}"),
                source_value: Some(json!(source_value)),
                target_value: None,
            }),
            Some(target_value) if target_value != source_value => diffs.push(DiffItem {
                diff_type: DiffType::Changed,
                path: format!("{path}/@{key}"),
                source_value: Some(json!(source_value)),
                target_value: Some(json!(target_value)),
            }),
            Some(_) => {}
        }
    }
    for (key, target_value) in &target.attributes {
        if source.attr(key).is_none() {
            diffs.push(DiffItem {
                diff_type: DiffType::Added,
                path: format!("{path}/@{key}"),
                source_value: None,
                target_value: Some(json!(target_value)),
            });
        }
    }

    // Text.
    let source_text = source.text.as_deref().unwrap_or("");
    let target_text = target.text.as_deref().unwrap_or("");
    if source_text != target_text {
        diffs.push(DiffItem {
            diff_type: DiffType::Changed,
            path: format!("{path}/text()"),
            source_value: Some(json!(source_text)),
            target_value: Some(json!(target_text)),
        });
    }

    // Children, grouped by tag.
    let tags: BTreeSet<&str> = source
        .children
        .iter()
        .chain(target.children.iter())
        .map(|c| c.tag.as_str())
        .collect();

    for tag in tags {
        let source_elems: Vec<&XmlNode> = source.children_named(tag).collect();
        let target_elems: Vec<&XmlNode> = target.children_named(tag).collect();
        compare_sibling_group(tag, &source_elems, &target_elems, path, diffs);
    }
}

fn compare_sibling_group(
    tag: &str,
    source_elems: &[&XmlNode],
    target_elems: &[&XmlNode],
    path: &str,
    diffs: &mut Vec<DiffItem>,
) {
    // Named siblings match by name.
    let mut source_unnamed: Vec<&XmlNode> = Vec::new();
    let mut target_unnamed: Vec<&XmlNode> = target_elems
        .iter()
        .filter(|e| e.name().is_none())
        .copied()
        .collect();

    for source_elem in source_elems {
        match source_elem.name() {
            Some(name) => {
                let child_path = format!("{path}/{tag}[@name='{name}']");
                match target_elems
                    .iter()
                    .find(|t| t.name() == Some(name))
                {
                    Some(target_elem) => {
                        compare_elements(source_elem, target_elem, &child_path, diffs)
                    }
                    None => diffs.push(DiffItem {
                        diff_type: DiffType::Removed,
                        path: child_path,
                        source_value: Some(element_summary(source_elem)),
                        target_value: None,
                    }),
                }
            }
            None => source_unnamed.push(source_elem),
        }
    }
    for target_elem in target_elems {
        if let Some(name) = target_elem.name() {
            if !source_elems.iter().any(|s| s.name() == Some(name)) {
                diffs.push(DiffItem {
                    diff_type: DiffType::Added,
                    path: format!("{path}/{tag}[@name='{name}']"),
                    source_value: None,
                    target_value: Some(element_summary(target_elem)),
                });
            }
        }
    }

    // Unnamed siblings: positional when counts agree, else similarity.
    if source_unnamed.len() == target_unnamed.len() {
        for (i, (s, t)) in source_unnamed.iter().zip(target_unnamed.iter()).enumerate() {
            let child_path = format!("{path}/{tag}[{}]", i + 1);
            compare_elements(s, t, &child_path, diffs);
        }
        return;
    }

    for (i, source_elem) in source_unnamed.iter().enumerate() {
        let best = target_unnamed
            .iter()
            .enumerate()
            .map(|(j, t)| (j, similarity_score(source_elem, t)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        match best {
            Some((j, score)) if score >= 0.5 => {
                let target_elem = target_unnamed.remove(j);
                let child_path = format!("{path}/{tag}[{}]", i + 1);
                compare_elements(source_elem, target_elem, &child_path, diffs);
            }
            _ => diffs.push(DiffItem {
                diff_type: DiffType::Removed,
                path: format!("{path}/{tag}[{}]", i + 1),
                source_value: Some(element_summary(source_elem)),
                target_value: None,
            }),
        }
    }
    for (j, target_elem) in target_unnamed.iter().enumerate() {
        diffs.push(DiffItem {
            diff_type: DiffType::Added,
            path: format!("{path}/{tag}[{}]", j + 1),
            source_value: None,
            target_value: Some(element_summary(target_elem)),
        });
    }
}

/// Similarity between two elements in `[0, 1]`.
pub fn similarity_score(a: &XmlNode, b: &XmlNode) -> f64 {
    let mut score = 0.0;

    if a.tag == b.tag {
        score += 0.3;
    }

    let text_a = a.text.as_deref().unwrap_or("").trim();
    let text_b = b.text.as_deref().unwrap_or("").trim();
    if text_a == text_b {
        score += 0.3;
    } else if !text_a.is_empty() && !text_b.is_empty() && (text_a.contains(text_b) || text_b.contains(text_a))
    {
        score += 0.15;
    }

    let attrs_a: BTreeSet<(&str, &str)> = a
        .attributes
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let attrs_b: BTreeSet<(&str, &str)> = b
        .attributes
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    if !attrs_a.is_empty() && !attrs_b.is_empty() {
        let common = attrs_a.intersection(&attrs_b).count() as f64;
        let total = attrs_a.union(&attrs_b).count() as f64;
        score += 0.4 * (common / total);
    }

    score
}
