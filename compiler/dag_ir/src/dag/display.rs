use std::fmt;

use super::{Dag, NodeId, Payload, ValueRef};

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.slot == 0 {
            write!(f, "{}", self.node)
        } else {
            write!(f, "{}:{}", self.node, self.slot)
        }
    }
}

/// Display adapter for one node of a [`Dag`].
pub struct NodeDisplay<'a> {
    pub(super) dag: &'a Dag,
    pub(super) id: NodeId,
}

impl fmt::Display for NodeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(node) = self.dag.get(self.id) else {
            return write!(f, "{}: <deleted>", self.id);
        };
        write!(f, "{}: ", self.id)?;
        for (i, vt) in node.results.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{vt}")?;
        }
        if !node.results.is_empty() {
            f.write_str(" = ")?;
        }
        f.write_str(node.opcode.name())?;
        match &node.payload {
            Payload::None | Payload::Signature(_) => {}
            Payload::Bits(b) => write!(f, "<{b:#x}>")?,
            Payload::Argument { index, offset } => write!(f, "<#{index}+{offset}>")?,
            Payload::Frame(slot) => write!(f, "<fi#{slot}>")?,
            Payload::Cond(cc) => write!(f, "<{cc}>")?,
            Payload::InRegType(vt) => write!(f, "<{vt}>")?,
            Payload::Part(p) => write!(f, "<{p}>")?,
            Payload::Mem(m) => write!(f, "<{} {:?} align {}>", m.mem_vt, m.ext, m.align)?,
            Payload::Mask(mask) => {
                f.write_str("<")?;
                for (i, lane) in mask.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    match lane {
                        Some(l) => write!(f, "{l}")?,
                        None => f.write_str("u")?,
                    }
                }
                f.write_str(">")?;
            }
            Payload::Routine(r) => write!(f, "<{}>", r.symbol)?,
            Payload::Block(b) => write!(f, "<bb{b}>")?,
        }
        for (i, op) in node.operands.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            write!(f, "{op}")?;
        }
        Ok(())
    }
}
