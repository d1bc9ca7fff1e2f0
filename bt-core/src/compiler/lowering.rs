//! AST → `CompiledTree` lowering pass: assigns dense numeric node ids
//! in post-order and validates arity/keyword rules. Each node's children
//! are recorded as soon as they are lowered; no address fixup pass is
//! needed.

use crate::compiler::ast::{Atom, SExpr};
use crate::engine::tree::{CompiledNode, CompiledTree, KeyedArgs, LeafArg, NodeKind};
use crate::error::{CompileError, CompileErrorKind};

/// Per-leaf `(name, required_keys, allowed_keys)`. `allowed` is the full set
/// a leaf's tick-time dispatch ever reads; any `:key` outside it is rejected
/// at compile time rather than silently ignored.
const KEYED_LEAVES: &[(&str, &[&str], &[&str])] = &[
    (
        "plan-action",
        &["model_service"],
        &["model_service", "state_key", "action_key", "seed", "budget_ms", "work_max", "max_depth", "gamma", "c_ucb", "pw_k", "pw_alpha"],
    ),
    ("vla-request", &["job_key"], &["job_key", "instruction", "task_id", "dims", "deadline_ms"]),
    ("vla-wait", &["job_key"], &["job_key", "action_key"]),
    ("vla-cancel", &["job_key"], &["job_key"]),
];

pub fn lower(ast: &SExpr) -> Result<CompiledTree, Vec<CompileError>> {
    let mut nodes = Vec::new();
    let mut errors = Vec::new();
    let root_id = lower_node(ast, &mut nodes, &mut errors);
    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(CompiledTree { nodes, root_id })
}

fn push_node(nodes: &mut Vec<CompiledNode>, kind: NodeKind, children: Vec<u32>) -> u32 {
    let node_id = nodes.len() as u32;
    nodes.push(CompiledNode { node_id, kind, children });
    node_id
}

fn lower_node(expr: &SExpr, nodes: &mut Vec<CompiledNode>, errors: &mut Vec<CompileError>) -> u32 {
    let (items, path) = match expr {
        SExpr::List(items, path) => (items, path.clone()),
        SExpr::Atom(_) => {
            errors.push(CompileError::new(CompileErrorKind::Syntax, "expected a node form, found a bare literal"));
            return push_node(nodes, NodeKind::Fail, vec![]);
        }
    };

    let head = match items.first() {
        Some(SExpr::Atom(Atom::Symbol(s))) => s.as_str(),
        _ => {
            errors.push(CompileError::at(CompileErrorKind::Syntax, &path, "node form must start with a symbol"));
            return push_node(nodes, NodeKind::Fail, vec![]);
        }
    };
    let rest = &items[1..];

    match head {
        "seq" | "sel" | "mem-seq" | "mem-sel" | "async-seq" | "reactive-seq" | "reactive-sel" => {
            if rest.is_empty() {
                errors.push(CompileError::at(CompileErrorKind::Arity, &path, format!("'{head}' requires at least one child")));
            }
            let children: Vec<u32> = rest.iter().map(|c| lower_node(c, nodes, errors)).collect();
            let kind = match head {
                "seq" => NodeKind::Seq,
                "sel" => NodeKind::Sel,
                "mem-seq" => NodeKind::MemSeq,
                "mem-sel" => NodeKind::MemSel,
                "async-seq" => NodeKind::AsyncSeq,
                "reactive-seq" => NodeKind::ReactiveSeq,
                _ => NodeKind::ReactiveSel,
            };
            push_node(nodes, kind, children)
        }
        "invert" => lower_unary_decorator(rest, &path, nodes, errors, |child| (NodeKind::Invert, vec![child])),
        "repeat" | "retry" => lower_counted_decorator(head, rest, &path, nodes, errors),
        "cond" | "act" => lower_named_leaf(head, rest, &path, nodes, errors),
        "plan-action" | "vla-request" | "vla-wait" | "vla-cancel" => lower_keyed_leaf(head, rest, &path, nodes, errors),
        "succeed" => push_node(nodes, NodeKind::Succeed, vec![]),
        "fail" => push_node(nodes, NodeKind::Fail, vec![]),
        "running" => push_node(nodes, NodeKind::Running, vec![]),
        other => {
            errors.push(CompileError::at(CompileErrorKind::Syntax, &path, format!("unknown node kind '{other}'")));
            push_node(nodes, NodeKind::Fail, vec![])
        }
    }
}

fn lower_unary_decorator(
    rest: &[SExpr],
    path: &str,
    nodes: &mut Vec<CompiledNode>,
    errors: &mut Vec<CompileError>,
    build: impl FnOnce(u32) -> (NodeKind, Vec<u32>),
) -> u32 {
    if rest.len() != 1 {
        errors.push(CompileError::at(CompileErrorKind::Arity, path, "decorator requires exactly one child"));
    }
    let child = rest.first().map(|c| lower_node(c, nodes, errors)).unwrap_or_else(|| push_node(nodes, NodeKind::Fail, vec![]));
    let (kind, children) = build(child);
    push_node(nodes, kind, children)
}

fn lower_counted_decorator(
    head: &str,
    rest: &[SExpr],
    path: &str,
    nodes: &mut Vec<CompiledNode>,
    errors: &mut Vec<CompileError>,
) -> u32 {
    if rest.len() != 2 {
        errors.push(CompileError::at(CompileErrorKind::Arity, path, format!("'{head}' requires a count and exactly one child")));
        return push_node(nodes, NodeKind::Fail, vec![]);
    }
    let count = match &rest[0] {
        SExpr::Atom(Atom::Int(n)) if *n >= 0 => *n as u32,
        _ => {
            errors.push(CompileError::at(CompileErrorKind::InvalidLiteral, path, format!("'{head}' count must be a non-negative integer")));
            0
        }
    };
    let child = lower_node(&rest[1], nodes, errors);
    let kind = if head == "repeat" { NodeKind::Repeat(count) } else { NodeKind::Retry(count) };
    push_node(nodes, kind, vec![child])
}

fn atom_to_leaf_arg(atom: &Atom, path: &str, errors: &mut Vec<CompileError>) -> LeafArg {
    match atom {
        Atom::Nil => LeafArg::Nil,
        Atom::Bool(b) => LeafArg::Bool(*b),
        Atom::Int(i) => LeafArg::Int(*i),
        Atom::Float(f) => LeafArg::Float(*f),
        Atom::Text(s) => LeafArg::Text(s.clone()),
        Atom::Symbol(s) => LeafArg::Symbol(s.clone()),
        Atom::Keyword(k) => {
            errors.push(CompileError::at(CompileErrorKind::Syntax, path, format!("unexpected keyword ':{k}' in literal position")));
            LeafArg::Nil
        }
    }
}

fn lower_named_leaf(head: &str, rest: &[SExpr], path: &str, nodes: &mut Vec<CompiledNode>, errors: &mut Vec<CompileError>) -> u32 {
    let name = match rest.first() {
        Some(SExpr::Atom(Atom::Symbol(s))) | Some(SExpr::Atom(Atom::Text(s))) => s.clone(),
        _ => {
            errors.push(CompileError::at(CompileErrorKind::Arity, path, format!("'{head}' requires a name")));
            String::new()
        }
    };
    let mut args = Vec::new();
    for item in &rest[1.min(rest.len())..] {
        match item {
            SExpr::Atom(atom) => args.push(atom_to_leaf_arg(atom, path, errors)),
            SExpr::List(_, child_path) => {
                errors.push(CompileError::at(CompileErrorKind::InvalidLiteral, child_path, "leaf args must be literals, not nested forms"));
            }
        }
    }
    let kind = if head == "cond" { NodeKind::Cond { name, args } } else { NodeKind::Act { name, args } };
    push_node(nodes, kind, vec![])
}

fn lower_keyed_leaf(head: &str, rest: &[SExpr], path: &str, nodes: &mut Vec<CompiledNode>, errors: &mut Vec<CompileError>) -> u32 {
    let mut args: KeyedArgs = Vec::new();
    let mut i = 0;
    while i < rest.len() {
        let key = match &rest[i] {
            SExpr::Atom(Atom::Keyword(k)) => k.clone(),
            _ => {
                errors.push(CompileError::at(CompileErrorKind::Syntax, path, format!("'{head}' expects :keyword value pairs")));
                i += 1;
                continue;
            }
        };
        i += 1;
        if i >= rest.len() {
            errors.push(CompileError::at(CompileErrorKind::Arity, path, format!("keyword ':{key}' missing a value")));
            break;
        }
        let value = match &rest[i] {
            SExpr::Atom(atom) => atom_to_leaf_arg(atom, path, errors),
            SExpr::List(_, child_path) => {
                errors.push(CompileError::at(CompileErrorKind::InvalidLiteral, child_path, "keyed leaf values must be literals"));
                LeafArg::Nil
            }
        };
        args.push((key, value));
        i += 1;
    }

    if let Some((_, required, allowed)) = KEYED_LEAVES.iter().find(|(name, _, _)| *name == head) {
        for key in *required {
            if !args.iter().any(|(k, _)| k == key) {
                errors.push(CompileError::at(CompileErrorKind::MissingKey, path, format!("'{head}' requires :{key}")));
            }
        }
        for (key, _) in &args {
            if !allowed.contains(&key.as_str()) {
                errors.push(CompileError::at(CompileErrorKind::UnknownKeyword, path, format!("'{head}' does not accept :{key}")));
            }
        }
    }

    let kind = match head {
        "plan-action" => NodeKind::PlanAction { args },
        "vla-request" => NodeKind::VlaRequest { args },
        "vla-wait" => NodeKind::VlaWait { args },
        _ => NodeKind::VlaCancel { args },
    };
    push_node(nodes, kind, vec![])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::parser::parse;

    #[test]
    fn lowers_seq_of_leaves() {
        let ast = parse("(seq (cond always-true) (act noop))").unwrap();
        let tree = lower(&ast).unwrap();
        assert_eq!(tree.nodes.len(), 3);
        assert_eq!(tree.root_id, 2);
    }

    #[test]
    fn rejects_plan_action_without_model_service() {
        let ast = parse("(plan-action :work_max 10)").unwrap();
        let errors = lower(&ast).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == CompileErrorKind::MissingKey));
    }

    #[test]
    fn rejects_unknown_keyword_on_keyed_leaf() {
        let ast = parse("(vla-cancel :job_key job :not_a_real_key 1)").unwrap();
        let errors = lower(&ast).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == CompileErrorKind::UnknownKeyword));
    }

    #[test]
    fn rejects_negative_repeat_count() {
        let ast = parse("(repeat -1 (succeed))").unwrap();
        let errors = lower(&ast).unwrap_err();
        assert!(errors.iter().any(|e| e.kind == CompileErrorKind::InvalidLiteral));
    }
}
