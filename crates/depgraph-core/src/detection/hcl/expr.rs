use serde::{Deserialize, Serialize};

/// An HCL expression tree, restricted to the shapes spec §9 calls out:
/// `literal | reference(parts) | function(name, args) | array | object | template`.
/// Anything else (interpolation forms we don't recognize) is an `Opaque` leaf.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Expr {
    Literal(String),
    Reference(Vec<String>),
    Function { name: String, args: Vec<Expr> },
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Template(Vec<Expr>),
    Opaque(String),
}

/// Parse a single HCL attribute value string into an `Expr` tree.
///
/// This is not a general HCL parser: it recognizes bare references
/// (`var.x`, `aws_instance.web.id`), `${...}` template interpolation,
/// function calls (`trimspace(var.x)`), and quoted string literals — the
/// shapes that actually appear as Terraform attribute values. Anything else
/// becomes an `Opaque` leaf, per spec §9.
pub fn parse_expr(raw: &str) -> Expr {
    let trimmed = raw.trim();

    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        let inner = &trimmed[1..trimmed.len() - 1];
        if inner.contains("${") {
            return parse_template(inner);
        }
        return Expr::Literal(inner.to_string());
    }

    if trimmed.contains("${") {
        return parse_template(trimmed);
    }

    parse_bare(trimmed)
}

fn parse_template(s: &str) -> Expr {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let literal = &rest[..start];
        if !literal.is_empty() {
            parts.push(Expr::Literal(literal.to_string()));
        }
        let after = &rest[start + 2..];
        let Some(end) = find_matching_brace(after) else {
            parts.push(Expr::Opaque(rest.to_string()));
            return Expr::Template(parts);
        };
        let inner = &after[..end];
        parts.push(parse_bare(inner.trim()));
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        parts.push(Expr::Literal(rest.to_string()));
    }
    if parts.len() == 1 {
        parts.into_iter().next().unwrap()
    } else {
        Expr::Template(parts)
    }
}

fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

/// Parse a bare (non-quoted, non-template) expression: a reference path, a
/// function call, or an opaque leaf.
fn parse_bare(s: &str) -> Expr {
    let s = s.trim();
    if s.is_empty() {
        return Expr::Opaque(String::new());
    }

    if let Some(open) = s.find('(') {
        if s.ends_with(')') && is_identifier_like(&s[..open]) {
            let name = s[..open].to_string();
            let args_str = &s[open + 1..s.len() - 1];
            let args = split_args(args_str).into_iter().map(|a| parse_bare(a.trim())).collect();
            return Expr::Function { name, args };
        }
    }

    if is_reference_path(s) {
        return Expr::Reference(s.split('.').map(str::to_string).collect());
    }

    if s.starts_with('"') && s.ends_with('"') && s.len() >= 2 {
        return Expr::Literal(s[1..s.len() - 1].to_string());
    }

    Expr::Opaque(s.to_string())
}

fn is_identifier_like(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_reference_path(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|part| {
            let part = part.split('[').next().unwrap_or(part);
            !part.is_empty() && part.chars().next().map(|c| c.is_ascii_alphabetic() || c == '_').unwrap_or(false)
        })
        && s.contains('.')
}

fn split_args(s: &str) -> Vec<&str> {
    let mut args = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            ',' if depth == 0 => {
                args.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < s.len() {
        args.push(&s[start..]);
    }
    args
}

/// Maximum recursion depth for expression walking (spec §4.1, §9: `maxDepth`, default 10).
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Recursively collect every `Reference` path reachable from `expr`, bounded
/// by `max_depth`. Function-call arguments and nested array/object/template
/// members are walked (spec §4.1: "References inside function-call arguments
/// and nested blocks are walked recursively").
pub fn collect_references(expr: &Expr, max_depth: usize, out: &mut Vec<Vec<String>>) {
    collect_references_at(expr, 0, max_depth, out);
}

fn collect_references_at(expr: &Expr, depth: usize, max_depth: usize, out: &mut Vec<Vec<String>>) {
    if depth > max_depth {
        return;
    }
    match expr {
        Expr::Reference(parts) => out.push(parts.clone()),
        Expr::Function { args, .. } => {
            for arg in args {
                collect_references_at(arg, depth + 1, max_depth, out);
            }
        }
        Expr::Array(items) | Expr::Template(items) => {
            for item in items {
                collect_references_at(item, depth + 1, max_depth, out);
            }
        }
        Expr::Object(pairs) => {
            for (_, value) in pairs {
                collect_references_at(value, depth + 1, max_depth, out);
            }
        }
        Expr::Literal(_) | Expr::Opaque(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_reference() {
        assert_eq!(parse_expr("var.ami_id"), Expr::Reference(vec!["var".into(), "ami_id".into()]));
    }

    #[test]
    fn parses_quoted_literal() {
        assert_eq!(parse_expr("\"hello\""), Expr::Literal("hello".into()));
    }

    #[test]
    fn parses_template_interpolation() {
        let expr = parse_expr("\"${var.name}-suffix\"");
        match expr {
            Expr::Template(parts) => {
                assert_eq!(parts[0], Expr::Reference(vec!["var".into(), "name".into()]));
                assert_eq!(parts[1], Expr::Literal("-suffix".into()));
            }
            other => panic!("expected template, got {other:?}"),
        }
    }

    #[test]
    fn parses_function_call_with_nested_reference() {
        let expr = parse_expr("trimspace(var.ami_id)");
        match expr {
            Expr::Function { name, args } => {
                assert_eq!(name, "trimspace");
                assert_eq!(args[0], Expr::Reference(vec!["var".into(), "ami_id".into()]));
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn collects_nested_references_within_depth() {
        let expr = parse_expr("coalesce(var.a, local.b)");
        let mut out = Vec::new();
        collect_references(&expr, DEFAULT_MAX_DEPTH, &mut out);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn depth_cap_stops_recursion() {
        let expr = Expr::Function {
            name: "f".into(),
            args: vec![Expr::Function {
                name: "g".into(),
                args: vec![Expr::Reference(vec!["var".into(), "x".into()])],
            }],
        };
        let mut out = Vec::new();
        collect_references(&expr, 0, &mut out);
        assert!(out.is_empty());
    }
}
