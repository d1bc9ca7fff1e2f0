//! MBT1 binary tree format: a flat, versioned encoding of a
//! `CompiledTree` for transport or on-disk storage outside the S-expression
//! authoring path.
//!
//! Layout (little-endian): magic `"MBT1"`, `u32 version=1`, `u8
//! endianness=1`, 3 reserved bytes, `u32 node_count`, `u32 root_id`, then
//! per node: `u8 kind`, 3 reserved, `i64 int_param` (decorator count),
//! `u32 child_count`, child ids, `u32 name_len` + name bytes (leaf name,
//! empty otherwise), `u32 arg_count`, then each arg as `u8 kind` + payload.
//! Keyed leaves (`plan-action`/`vla-*`) encode each `:key value` pair as
//! two consecutive args: a symbol carrying the key, then the typed value.

use crate::engine::tree::{CompiledNode, CompiledTree, KeyedArgs, LeafArg, NodeKind};
use crate::error::{CompileError, CompileErrorKind};

const MAGIC: &[u8; 4] = b"MBT1";
const VERSION: u32 = 1;

fn kind_code(kind: &NodeKind) -> u8 {
    match kind {
        NodeKind::Seq => 0,
        NodeKind::Sel => 1,
        NodeKind::MemSeq => 2,
        NodeKind::MemSel => 3,
        NodeKind::AsyncSeq => 4,
        NodeKind::ReactiveSeq => 5,
        NodeKind::ReactiveSel => 6,
        NodeKind::Invert => 7,
        NodeKind::Repeat(_) => 8,
        NodeKind::Retry(_) => 9,
        NodeKind::Cond { .. } => 10,
        NodeKind::Act { .. } => 11,
        NodeKind::PlanAction { .. } => 12,
        NodeKind::VlaRequest { .. } => 13,
        NodeKind::VlaWait { .. } => 14,
        NodeKind::VlaCancel { .. } => 15,
        NodeKind::Succeed => 16,
        NodeKind::Fail => 17,
        NodeKind::Running => 18,
    }
}

fn write_leaf_arg(buf: &mut Vec<u8>, arg: &LeafArg) {
    match arg {
        LeafArg::Nil => buf.push(0),
        LeafArg::Bool(b) => {
            buf.push(1);
            buf.push(*b as u8);
        }
        LeafArg::Int(i) => {
            buf.push(2);
            buf.extend_from_slice(&i.to_le_bytes());
        }
        LeafArg::Float(f) => {
            buf.push(3);
            buf.extend_from_slice(&f.to_le_bytes());
        }
        LeafArg::Text(s) => {
            buf.push(4);
            buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        LeafArg::Symbol(s) => {
            buf.push(5);
            buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
    }
}

pub fn encode(tree: &CompiledTree) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.push(1u8);
    buf.extend_from_slice(&[0u8; 3]);
    buf.extend_from_slice(&(tree.nodes.len() as u32).to_le_bytes());
    buf.extend_from_slice(&tree.root_id.to_le_bytes());

    for node in &tree.nodes {
        buf.push(kind_code(&node.kind));
        buf.extend_from_slice(&[0u8; 3]);
        let int_param: i64 = match &node.kind {
            NodeKind::Repeat(n) | NodeKind::Retry(n) => *n as i64,
            _ => 0,
        };
        buf.extend_from_slice(&int_param.to_le_bytes());

        buf.extend_from_slice(&(node.children.len() as u32).to_le_bytes());
        for &child in &node.children {
            buf.extend_from_slice(&child.to_le_bytes());
        }

        let name: &str = match &node.kind {
            NodeKind::Cond { name, .. } | NodeKind::Act { name, .. } => name.as_str(),
            _ => "",
        };
        buf.extend_from_slice(&(name.len() as u32).to_le_bytes());
        buf.extend_from_slice(name.as_bytes());

        let mut args_buf = Vec::new();
        let mut arg_count = 0u32;
        match &node.kind {
            NodeKind::Cond { args, .. } | NodeKind::Act { args, .. } => {
                for arg in args {
                    write_leaf_arg(&mut args_buf, arg);
                    arg_count += 1;
                }
            }
            NodeKind::PlanAction { args } | NodeKind::VlaRequest { args } | NodeKind::VlaWait { args } | NodeKind::VlaCancel { args } => {
                for (key, value) in args {
                    write_leaf_arg(&mut args_buf, &LeafArg::Symbol(key.clone()));
                    write_leaf_arg(&mut args_buf, value);
                    arg_count += 2;
                }
            }
            _ => {}
        }
        buf.extend_from_slice(&arg_count.to_le_bytes());
        buf.extend_from_slice(&args_buf);
    }

    buf
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CompileError> {
        if self.pos + n > self.data.len() {
            return Err(CompileError::new(CompileErrorKind::Syntax, "MBT1: unexpected end of buffer"));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, CompileError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, CompileError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn i64(&mut self) -> Result<i64, CompileError> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f64(&mut self) -> Result<f64, CompileError> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn string(&mut self, len: usize) -> Result<String, CompileError> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CompileError::new(CompileErrorKind::InvalidLiteral, "MBT1: invalid UTF-8"))
    }

    fn leaf_arg(&mut self) -> Result<LeafArg, CompileError> {
        match self.u8()? {
            0 => Ok(LeafArg::Nil),
            1 => Ok(LeafArg::Bool(self.u8()? != 0)),
            2 => Ok(LeafArg::Int(self.i64()?)),
            3 => Ok(LeafArg::Float(self.f64()?)),
            4 => {
                let len = self.u32()? as usize;
                Ok(LeafArg::Text(self.string(len)?))
            }
            5 => {
                let len = self.u32()? as usize;
                Ok(LeafArg::Symbol(self.string(len)?))
            }
            other => Err(CompileError::new(CompileErrorKind::Syntax, format!("MBT1: unknown arg kind {other}"))),
        }
    }
}

pub fn decode(data: &[u8]) -> Result<CompiledTree, CompileError> {
    let mut r = Reader { data, pos: 0 };
    let magic = r.take(4)?;
    if magic != MAGIC {
        return Err(CompileError::new(CompileErrorKind::Syntax, "MBT1: bad magic"));
    }
    let version = r.u32()?;
    if version != VERSION {
        return Err(CompileError::new(CompileErrorKind::Syntax, format!("MBT1: unsupported version {version}")));
    }
    let _endianness = r.u8()?;
    r.take(3)?;
    let node_count = r.u32()?;
    let root_id = r.u32()?;

    let mut nodes = Vec::with_capacity(node_count as usize);
    for node_id in 0..node_count {
        let kind_byte = r.u8()?;
        r.take(3)?;
        let int_param = r.i64()?;
        let child_count = r.u32()?;
        let mut children = Vec::with_capacity(child_count as usize);
        for _ in 0..child_count {
            children.push(r.u32()?);
        }
        let name_len = r.u32()? as usize;
        let name = r.string(name_len)?;
        let arg_count = r.u32()?;

        let kind = match kind_byte {
            0 => NodeKind::Seq,
            1 => NodeKind::Sel,
            2 => NodeKind::MemSeq,
            3 => NodeKind::MemSel,
            4 => NodeKind::AsyncSeq,
            5 => NodeKind::ReactiveSeq,
            6 => NodeKind::ReactiveSel,
            7 => NodeKind::Invert,
            8 => NodeKind::Repeat(int_param.max(0) as u32),
            9 => NodeKind::Retry(int_param.max(0) as u32),
            10 | 11 => {
                let mut args = Vec::with_capacity(arg_count as usize);
                for _ in 0..arg_count {
                    args.push(r.leaf_arg()?);
                }
                if kind_byte == 10 { NodeKind::Cond { name, args } } else { NodeKind::Act { name, args } }
            }
            12..=15 => {
                let mut args: KeyedArgs = Vec::with_capacity((arg_count / 2) as usize);
                let mut remaining = arg_count;
                while remaining >= 2 {
                    let key = match r.leaf_arg()? {
                        LeafArg::Symbol(s) => s,
                        _ => return Err(CompileError::new(CompileErrorKind::Syntax, "MBT1: keyed arg key must be a symbol")),
                    };
                    let value = r.leaf_arg()?;
                    args.push((key, value));
                    remaining -= 2;
                }
                match kind_byte {
                    12 => NodeKind::PlanAction { args },
                    13 => NodeKind::VlaRequest { args },
                    14 => NodeKind::VlaWait { args },
                    _ => NodeKind::VlaCancel { args },
                }
            }
            16 => NodeKind::Succeed,
            17 => NodeKind::Fail,
            18 => NodeKind::Running,
            other => return Err(CompileError::new(CompileErrorKind::Syntax, format!("MBT1: unknown node kind {other}"))),
        };

        nodes.push(CompiledNode { node_id, kind, children });
    }

    Ok(CompiledTree { nodes, root_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{lowering::lower, parser::parse, verifier::verify};

    #[test]
    fn round_trips_through_binary() {
        let ast = parse("(seq (cond always-true 1 2.5 \"x\") (repeat 3 (succeed)))").unwrap();
        let tree = lower(&ast).unwrap();
        assert!(verify(&tree).is_empty());

        let bytes = encode(&tree);
        let decoded = decode(&bytes).unwrap();
        assert!(verify(&decoded).is_empty());
        assert_eq!(decoded.nodes.len(), tree.nodes.len());
        assert_eq!(decoded.root_id, tree.root_id);
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = vec![0u8; 16];
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn round_trips_keyed_leaf() {
        let ast = parse(r#"(plan-action :model_service "toy-1d" :work_max 10)"#).unwrap();
        let tree = lower(&ast).unwrap();
        let bytes = encode(&tree);
        let decoded = decode(&bytes).unwrap();
        match &decoded.nodes[decoded.root_id as usize].kind {
            NodeKind::PlanAction { args } => assert_eq!(args.len(), 2),
            _ => panic!("expected plan-action"),
        }
    }
}
