//! Structural verification pass: dense node ids, valid child references,
//! decorator arity. Run after lowering and again after decoding a binary
//! tree, since a corrupt or hand-written `CompiledTree` can violate
//! invariants the lowering pass would never produce. Collects every
//! violation instead of bailing on the first one.

use crate::engine::tree::{CompiledTree, NodeKind};
use crate::error::{CompileError, CompileErrorKind};

pub fn verify(tree: &CompiledTree) -> Vec<CompileError> {
    let mut errors = Vec::new();

    for (idx, node) in tree.nodes.iter().enumerate() {
        if node.node_id as usize != idx {
            errors.push(CompileError::new(
                CompileErrorKind::Syntax,
                format!("node id {} is not dense (expected {idx})", node.node_id),
            ));
        }
        for &child in &node.children {
            if child as usize >= tree.nodes.len() {
                errors.push(CompileError::at(
                    CompileErrorKind::Syntax,
                    format!("node[{idx}]"),
                    format!("child id {child} out of range"),
                ));
            }
        }
        match &node.kind {
            k if k.is_composite() && node.children.is_empty() => {
                errors.push(CompileError::at(CompileErrorKind::Arity, format!("node[{idx}]"), "composite requires at least one child"));
            }
            k if k.is_decorator() && node.children.len() != 1 => {
                errors.push(CompileError::at(CompileErrorKind::Arity, format!("node[{idx}]"), "decorator requires exactly one child"));
            }
            NodeKind::Cond { name, .. } | NodeKind::Act { name, .. } if name.is_empty() => {
                errors.push(CompileError::at(CompileErrorKind::MissingKey, format!("node[{idx}]"), "leaf name must not be empty"));
            }
            _ => {}
        }
    }

    if (tree.root_id as usize) >= tree.nodes.len() {
        errors.push(CompileError::new(CompileErrorKind::Syntax, format!("root id {} out of range", tree.root_id)));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tree::CompiledNode;

    #[test]
    fn flags_out_of_range_child() {
        let tree = CompiledTree {
            root_id: 0,
            nodes: vec![CompiledNode { node_id: 0, kind: NodeKind::Seq, children: vec![99] }],
        };
        assert!(!verify(&tree).is_empty());
    }

    #[test]
    fn accepts_well_formed_tree() {
        let tree = CompiledTree {
            root_id: 1,
            nodes: vec![
                CompiledNode { node_id: 0, kind: NodeKind::Succeed, children: vec![] },
                CompiledNode { node_id: 1, kind: NodeKind::Seq, children: vec![0] },
            ],
        };
        assert!(verify(&tree).is_empty());
    }
}
