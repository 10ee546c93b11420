use std::collections::HashMap;

use regex::Regex;
use std::sync::OnceLock;

use super::expr::{collect_references, parse_expr, DEFAULT_MAX_DEPTH};
use super::module_source::{classify_module_source, parse_version_constraints, ModuleSource};
use crate::model::{DependencyGraph, Edge, EdgeKind, Node, NodeKind, SourceLocation, UnresolvedReference};

/// The six Terraform block types that yield exactly one node each
/// (spec §4.1: "locals blocks yield one per name").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TfBlockKind {
    Resource,
    Data,
    Module,
    Variable,
    Output,
    Locals,
}

/// A single parsed top-level Terraform block, already split into a flat
/// attribute map. This module does not implement general HCL grammar; it
/// recognizes the block headers and one-line-or-balanced-brace attribute
/// values that detection actually needs.
#[derive(Debug, Clone)]
pub struct TfBlock {
    pub kind: TfBlockKind,
    pub type_label: Option<String>,
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub start_line: u32,
    pub end_line: u32,
}

fn block_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*(resource|data|module|variable|output|locals)\s*(?:"([^"]+)"\s*)?(?:"([^"]+)"\s*)?\{"#)
            .unwrap()
    })
}

fn attr_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^\s*([A-Za-z_][A-Za-z0-9_-]*)\s*=\s*(.+?)\s*$"#).unwrap())
}

/// Split a `.tf` file's source into top-level blocks. Nested blocks inside a
/// resource/data body (`lifecycle { ... }`, `tags = { ... }`) are folded into
/// the parent's attribute list as a single opaque or object-shaped value.
pub fn parse_blocks(source: &str, file: &str) -> Vec<TfBlock> {
    let lines: Vec<&str> = source.lines().collect();
    let mut blocks = Vec::new();
    let mut i = 0usize;

    while i < lines.len() {
        let line = lines[i];
        if let Some(caps) = block_header_re().captures(line) {
            let keyword = &caps[1];
            let kind = match keyword {
                "resource" => TfBlockKind::Resource,
                "data" => TfBlockKind::Data,
                "module" => TfBlockKind::Module,
                "variable" => TfBlockKind::Variable,
                "output" => TfBlockKind::Output,
                "locals" => TfBlockKind::Locals,
                _ => unreachable!(),
            };
            let label1 = caps.get(2).map(|m| m.as_str().to_string());
            let label2 = caps.get(3).map(|m| m.as_str().to_string());

            let start_line = (i + 1) as u32;
            let (body_lines, end_idx) = collect_balanced_body(&lines, i);
            let end_line = (end_idx + 1) as u32;
            let attributes = parse_attributes(&body_lines);

            match kind {
                TfBlockKind::Resource | TfBlockKind::Data => {
                    let type_label = label1.unwrap_or_default();
                    let name = label2.unwrap_or_default();
                    blocks.push(TfBlock { kind, type_label: Some(type_label), name, attributes, start_line, end_line });
                }
                TfBlockKind::Module | TfBlockKind::Variable | TfBlockKind::Output => {
                    let name = label1.unwrap_or_default();
                    blocks.push(TfBlock { kind, type_label: None, name, attributes, start_line, end_line });
                }
                TfBlockKind::Locals => {
                    // Each `name = expr` line inside `locals { }` is its own node.
                    for (name, expr) in &attributes {
                        blocks.push(TfBlock {
                            kind: TfBlockKind::Locals,
                            type_label: None,
                            name: name.clone(),
                            attributes: vec![("value".to_string(), expr.clone())],
                            start_line,
                            end_line,
                        });
                    }
                }
            }
            i = end_idx + 1;
        } else {
            i += 1;
        }
    }

    let _ = file;
    blocks
}

/// Starting at a block header line, consume lines until braces balance;
/// return the body lines (header/footer stripped) and the index of the
/// closing line.
fn collect_balanced_body<'a>(lines: &[&'a str], header_idx: usize) -> (Vec<&'a str>, usize) {
    let mut depth = 0i32;
    let mut started = false;
    let mut body = Vec::new();
    let mut idx = header_idx;

    while idx < lines.len() {
        let line = lines[idx];
        for c in line.chars() {
            match c {
                '{' => {
                    depth += 1;
                    started = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if idx != header_idx {
            body.push(line);
        }
        if started && depth <= 0 {
            break;
        }
        idx += 1;
    }

    if !body.is_empty() {
        body.pop(); // drop the closing `}` line
    }
    (body, idx.min(lines.len().saturating_sub(1)))
}

fn parse_attributes(body: &[&str]) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut i = 0usize;
    while i < body.len() {
        let line = body[i];
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
            i += 1;
            continue;
        }
        if let Some(caps) = attr_line_re().captures(line) {
            let key = caps[1].to_string();
            let mut value = caps[2].to_string();
            // Fold a brace-opening object value across subsequent lines.
            if value.ends_with('{') {
                let mut depth = 1i32;
                let mut j = i + 1;
                while j < body.len() && depth > 0 {
                    for c in body[j].chars() {
                        match c {
                            '{' => depth += 1,
                            '}' => depth -= 1,
                            _ => {}
                        }
                    }
                    value.push(' ');
                    value.push_str(body[j].trim());
                    j += 1;
                }
                i = j;
                attrs.push((key, value));
                continue;
            }
            attrs.push((key, value));
        }
        i += 1;
    }
    attrs
}

/// Known resource-type provider prefixes (rule 5: `T.N` where `T` starts with
/// a known provider prefix resolves to a `references` edge to a resource node).
fn is_provider_prefixed(segment: &str) -> bool {
    const PREFIXES: &[&str] = &[
        "aws_", "google_", "azurerm_", "kubernetes_", "helm_", "random_", "null_", "local_file",
        "template_", "tls_", "archive_", "time_", "kubectl_", "helm_release", "docker_",
    ];
    PREFIXES.iter().any(|p| segment.starts_with(p))
}

fn is_contextual(segment: &str) -> bool {
    matches!(segment, "count" | "each" | "self" | "path" | "terraform")
}

/// Resolve a reference path per spec §4.1 rules 1-6, returning the target
/// node id and edge kind, or `None` if it's contextual (rule 6, no edge).
fn resolve_reference(parts: &[String]) -> Option<(String, EdgeKind)> {
    if parts.is_empty() {
        return None;
    }
    match parts[0].as_str() {
        "var" if parts.len() >= 2 => Some((Node::terraform_variable_id(&parts[1]), EdgeKind::InputVariable)),
        "local" if parts.len() >= 2 => Some((Node::terraform_local_id(&parts[1]), EdgeKind::LocalReference)),
        "data" if parts.len() >= 3 => {
            Some((Node::terraform_data_id(&parts[1], &parts[2]), EdgeKind::DataReference))
        }
        "module" if parts.len() >= 2 => Some((Node::terraform_module_id(&parts[1]), EdgeKind::ModuleCall)),
        first if is_contextual(first) => None,
        first if parts.len() >= 2 && is_provider_prefixed(first) => {
            Some((Node::terraform_resource_id(first, &parts[1]), EdgeKind::References))
        }
        _ => None,
    }
}

/// Run Terraform detection over one file's parsed blocks, adding nodes,
/// resolved edges, and unresolved-reference records to `graph`.
pub fn detect_file(source: &str, file: &str, graph: &mut DependencyGraph) {
    let blocks = parse_blocks(source, file);

    for block in &blocks {
        let (id, kind) = match block.kind {
            TfBlockKind::Resource => {
                (Node::terraform_resource_id(block.type_label.as_deref().unwrap_or(""), &block.name), NodeKind::TerraformResource)
            }
            TfBlockKind::Data => {
                (Node::terraform_data_id(block.type_label.as_deref().unwrap_or(""), &block.name), NodeKind::TerraformData)
            }
            TfBlockKind::Module => (Node::terraform_module_id(&block.name), NodeKind::TerraformModule),
            TfBlockKind::Variable => (Node::terraform_variable_id(&block.name), NodeKind::TerraformVariable),
            TfBlockKind::Output => (Node::terraform_output_id(&block.name), NodeKind::TerraformOutput),
            TfBlockKind::Locals => (Node::terraform_local_id(&block.name), NodeKind::TerraformLocal),
        };

        let location = SourceLocation::new(file, block.start_line, block.end_line);
        let mut node = Node::new(id, &block.name, kind, location);
        if let Some(type_label) = &block.type_label {
            node = node.with_attribute("resourceType", type_label.clone());
        }
        for (key, value) in &block.attributes {
            node = node.with_attribute(key.clone(), value.clone());
        }
        if block.kind == TfBlockKind::Module {
            let version_attr = block.attributes.iter().find(|(k, _)| k == "version").map(|(_, v)| v.trim().trim_matches('"'));

            if let Some((_, source_raw)) = block.attributes.iter().find(|(k, _)| k == "source") {
                let unquoted = source_raw.trim().trim_matches('"');
                node = node.with_attribute("moduleSource", unquoted.to_string());

                let mut classified = classify_module_source(unquoted);
                if let (ModuleSource::Registry { version, .. }, Some(raw)) = (&mut classified, version_attr) {
                    *version = Some(raw.to_string());
                }
                if let Ok(value) = serde_json::to_value(&classified) {
                    node = node.with_attribute("moduleSourceClassified", value);
                }
            }
            if let Some(raw) = version_attr {
                if let Ok(value) = serde_json::to_value(parse_version_constraints(raw)) {
                    node = node.with_attribute("versionConstraints", value);
                }
            }
        }
        graph.add_node(node);
    }

    for block in &blocks {
        let from_id = match block.kind {
            TfBlockKind::Resource => Node::terraform_resource_id(block.type_label.as_deref().unwrap_or(""), &block.name),
            TfBlockKind::Data => Node::terraform_data_id(block.type_label.as_deref().unwrap_or(""), &block.name),
            TfBlockKind::Module => Node::terraform_module_id(&block.name),
            TfBlockKind::Variable => Node::terraform_variable_id(&block.name),
            TfBlockKind::Output => Node::terraform_output_id(&block.name),
            TfBlockKind::Locals => Node::terraform_local_id(&block.name),
        };

        for (attr_name, raw_value) in &block.attributes {
            let expr = parse_expr(raw_value);
            let mut refs = Vec::new();
            collect_references(&expr, DEFAULT_MAX_DEPTH, &mut refs);

            for parts in refs {
                let joined = parts.join(".");
                match resolve_reference(&parts) {
                    Some((target_id, edge_kind)) => {
                        if graph.contains(&target_id) {
                            let edge = Edge::new(from_id.clone(), target_id, edge_kind, 100);
                            graph.add_edge(edge);
                        } else {
                            graph.record_unresolved(UnresolvedReference {
                                from_node: from_id.clone(),
                                target_path: joined,
                                file: file.to_string(),
                                line: block.start_line,
                            });
                        }
                    }
                    None => {
                        if !is_contextual(parts.first().map(String::as_str).unwrap_or("")) {
                            graph.record_unresolved(UnresolvedReference {
                                from_node: from_id.clone(),
                                target_path: format!("{attr_name}:{joined}"),
                                file: file.to_string(),
                                line: block.start_line,
                            });
                        }
                    }
                }
            }
        }
    }
}
