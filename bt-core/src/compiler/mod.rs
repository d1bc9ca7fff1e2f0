pub mod ast;
pub mod binary;
pub mod lowering;
pub mod parser;
pub mod verifier;

use crate::engine::tree::CompiledTree;
use crate::error::CompileError;

/// Parses, lowers, and verifies a tree description in one call — the
/// compiler's only public entry point for the S-expression front end.
pub fn compile(src: &str) -> Result<CompiledTree, Vec<CompileError>> {
    let ast = parser::parse(src).map_err(|e| vec![e])?;
    let tree = lowering::lower(&ast)?;
    let errors = verifier::verify(&tree);
    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_scenario_tree() {
        let tree = compile("(sel (seq (cond target-visible) (act grasp)) (act search-target))").unwrap();
        assert!(tree.nodes.len() >= 5);
    }

    #[test]
    fn reports_errors_without_panicking() {
        let err = compile("(repeat -1 (succeed))").unwrap_err();
        assert!(!err.is_empty());
    }
}
