//! Operation tags and the per-node attributes that refine them.
//!
//! [`Opcode`] is a fieldless tag so that handler tables can be indexed
//! densely by it. Attributes that vary per node (constant bits, comparison
//! predicates, memory descriptors, shuffle masks, routine descriptors)
//! live in the node's [`Payload`](crate::dag::Payload).

mod libcall;

use std::fmt;

use bitflags::bitflags;

use crate::types::ValueType;

pub use libcall::{Libcall, SoftCmp};

// ── Opcodes ─────────────────────────────────────────────────────────

macro_rules! opcodes {
    ($($(#[$doc:meta])* $name:ident => $text:literal,)*) => {
        /// Operation performed by a DAG node.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(u8)]
        pub enum Opcode {
            $($(#[$doc])* $name,)*
        }

        impl Opcode {
            /// Every opcode, in declaration order.
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            /// Number of opcodes.
            pub const COUNT: usize = Opcode::ALL.len();

            /// Lower-case mnemonic used in dumps and diagnostics.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Opcode::$name => $text,)*
                }
            }
        }
    };
}

opcodes! {
    // Leaves
    /// Start of the memory chain. Result: `Chain`.
    EntryToken => "entry",
    /// Integer constant; bits in `Payload::Bits`.
    Constant => "constant",
    /// Float constant; encoding in `Payload::Bits`.
    ConstantFp => "constantfp",
    /// Unspecified value of any type.
    Undef => "undef",
    /// Function argument; `Payload::Argument` selects the index and the
    /// bit offset within it.
    Argument => "argument",
    /// Address of a stack object; `Payload::Frame`.
    FrameIndex => "frameindex",

    // Integer arithmetic (elementwise on vectors)
    Add => "add",
    Sub => "sub",
    Mul => "mul",
    /// High half of the unsigned double-width product.
    MulHu => "mulhu",
    SDiv => "sdiv",
    UDiv => "udiv",
    SRem => "srem",
    URem => "urem",
    And => "and",
    Or => "or",
    Xor => "xor",
    /// Shift left. Operand 1 is the amount and may have any integer type;
    /// amounts at or beyond the width produce zero.
    Shl => "shl",
    /// Arithmetic shift right; oversized amounts fill with the sign bit.
    Sra => "sra",
    /// Logical shift right; oversized amounts produce zero.
    Srl => "srl",
    Neg => "neg",
    /// Count leading zeros (zero input yields the width).
    Ctlz => "ctlz",
    /// Count trailing zeros (zero input yields the width).
    Cttz => "cttz",
    Ctpop => "ctpop",
    Bswap => "bswap",

    // Carry arithmetic
    /// `(a + b, carry)`.
    AddC => "addc",
    /// `(a - b, borrow)`.
    SubC => "subc",
    /// `(a + b + carry_in, carry)`.
    AddE => "adde",
    /// `(a - b - borrow_in, borrow)`.
    SubE => "sube",

    // Conversions
    SignExtend => "sign_extend",
    ZeroExtend => "zero_extend",
    /// Extension whose new high bits are unspecified.
    AnyExtend => "any_extend",
    Truncate => "truncate",
    /// Sign-extend from the width in `Payload::InRegType` within the
    /// operand's own type.
    SignExtendInReg => "sign_extend_inreg",
    /// Reinterpret the bits as another type of the same width.
    BitCast => "bitcast",
    FpToSint => "fp_to_sint",
    FpToUint => "fp_to_uint",
    SintToFp => "sint_to_fp",
    UintToFp => "uint_to_fp",
    FpExtend => "fp_extend",
    FpRound => "fp_round",

    // Float arithmetic
    FAdd => "fadd",
    FSub => "fsub",
    FMul => "fmul",
    FDiv => "fdiv",
    FNeg => "fneg",

    // Compare and select
    /// Compare operands 0 and 1 with `Payload::Cond`; 1 when true, 0 when false.
    SetCc => "setcc",
    /// `cond ? a : b`. Only bit 0 of the condition is significant; a
    /// vector condition selects per element.
    Select => "select",

    // Pairs
    /// Concatenate two equal-width integers, operand 0 in the low bits.
    BuildPair => "build_pair",
    /// Half `Payload::Part` (0 = low, 1 = high) of an integer.
    ExtractElement => "extract_element",

    // Memory
    /// `(chain, ptr) -> (value, chain)` described by `Payload::Mem`.
    Load => "load",
    /// `(chain, value, ptr) -> chain`, truncating to the memory type.
    Store => "store",
    /// Join several chains into one.
    TokenFactor => "token_factor",

    // Control
    /// `(chain, cond) -> chain`; branch target in `Payload::Block`. Only
    /// bit 0 of the condition is significant.
    BrCond => "brcond",
    /// `(chain, values...)`; no results. `Payload::Signature` keeps the
    /// declared return types so legalized parts can be reassembled.
    Ret => "ret",

    // Vectors
    BuildVector => "build_vector",
    /// `(vector, index)`; an out-of-range index yields an unspecified value.
    ExtractVectorElt => "extract_vector_elt",
    /// `(vector, element, index)`; out-of-range indices leave the vector unchanged.
    InsertVectorElt => "insert_vector_elt",
    /// Select elements of `concat(a, b)` by `Payload::Mask`.
    VectorShuffle => "vector_shuffle",
    ConcatVectors => "concat_vectors",
    /// Subvector starting at element `Payload::Part`.
    ExtractSubvector => "extract_subvector",
    /// Wrapping sum of all elements.
    VecReduceAdd => "vecreduce_add",

    // Calls
    /// Call of a pure out-of-line routine described by `Payload::Routine`.
    Call => "call",
}

impl Opcode {
    /// Dense index of this opcode, for table lookups.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether the operation has no inputs.
    pub const fn is_leaf(self) -> bool {
        matches!(
            self,
            Opcode::EntryToken
                | Opcode::Constant
                | Opcode::ConstantFp
                | Opcode::Undef
                | Opcode::Argument
                | Opcode::FrameIndex
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Comparison predicates ───────────────────────────────────────────

/// Predicate of a [`Opcode::SetCc`] node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CondCode {
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
    /// Ordered and equal.
    FOeq,
    /// Ordered and less than.
    FOlt,
    FOle,
    FOgt,
    FOge,
    /// Unordered or not equal.
    FUne,
    /// Either operand is NaN.
    FUno,
    /// Neither operand is NaN.
    FOrd,
}

impl CondCode {
    /// Signed integer ordering predicates.
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            CondCode::Slt | CondCode::Sle | CondCode::Sgt | CondCode::Sge
        )
    }

    /// Integer equality predicates.
    pub const fn is_equality(self) -> bool {
        matches!(self, CondCode::Eq | CondCode::Ne)
    }

    /// Predicates that compare floats.
    pub const fn is_float(self) -> bool {
        matches!(
            self,
            CondCode::FOeq
                | CondCode::FOlt
                | CondCode::FOle
                | CondCode::FOgt
                | CondCode::FOge
                | CondCode::FUne
                | CondCode::FUno
                | CondCode::FOrd
        )
    }

    /// The unsigned predicate with the same ordering direction.
    ///
    /// Low limbs of a multi-limb integer are always compared unsigned.
    pub const fn to_unsigned(self) -> CondCode {
        match self {
            CondCode::Slt => CondCode::Ult,
            CondCode::Sle => CondCode::Ule,
            CondCode::Sgt => CondCode::Ugt,
            CondCode::Sge => CondCode::Uge,
            other => other,
        }
    }
}

impl fmt::Display for CondCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CondCode::Eq => "eq",
            CondCode::Ne => "ne",
            CondCode::Ult => "ult",
            CondCode::Ule => "ule",
            CondCode::Ugt => "ugt",
            CondCode::Uge => "uge",
            CondCode::Slt => "slt",
            CondCode::Sle => "sle",
            CondCode::Sgt => "sgt",
            CondCode::Sge => "sge",
            CondCode::FOeq => "oeq",
            CondCode::FOlt => "olt",
            CondCode::FOle => "ole",
            CondCode::FOgt => "ogt",
            CondCode::FOge => "oge",
            CondCode::FUne => "une",
            CondCode::FUno => "uno",
            CondCode::FOrd => "ord",
        };
        f.write_str(s)
    }
}

// ── Memory descriptors ──────────────────────────────────────────────

/// How a load widens the memory value into its result type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LoadExt {
    /// Memory type equals the result type.
    None,
    Sign,
    Zero,
    /// High bits of the result are unspecified.
    Any,
}

bitflags! {
    /// Ordering and aliasing properties of a memory access.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct MemFlags: u8 {
        /// Access must not be removed, duplicated or reordered with other
        /// volatile accesses.
        const VOLATILE = 1 << 0;
        /// Access is unlikely to be reused soon.
        const NON_TEMPORAL = 1 << 1;
        /// Memory does not change for the duration of the function.
        const INVARIANT = 1 << 2;
    }
}

/// Memory access description carried by loads and stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemInfo {
    /// Type of the value as it sits in memory. A store whose value is
    /// wider truncates; a load whose result is wider extends per `ext`.
    pub mem_vt: ValueType,
    pub ext: LoadExt,
    /// Alignment in bytes.
    pub align: u32,
    pub flags: MemFlags,
}

impl MemInfo {
    /// Plain access of `mem_vt` with its natural alignment.
    pub fn new(mem_vt: ValueType) -> Self {
        Self {
            mem_vt,
            ext: LoadExt::None,
            align: mem_vt.store_bytes().max(1),
            flags: MemFlags::empty(),
        }
    }

    #[must_use]
    pub fn with_ext(self, ext: LoadExt) -> Self {
        Self { ext, ..self }
    }

    #[must_use]
    pub fn with_align(self, align: u32) -> Self {
        Self { align, ..self }
    }

    #[must_use]
    pub fn with_flags(self, flags: MemFlags) -> Self {
        Self { flags, ..self }
    }

    #[must_use]
    pub fn with_mem_vt(self, mem_vt: ValueType) -> Self {
        Self { mem_vt, ..self }
    }

    /// Descriptor for the part of this access that starts `byte_offset`
    /// bytes later: alignment drops to what the offset guarantees.
    #[must_use]
    pub fn at_offset(self, mem_vt: ValueType, byte_offset: u32) -> Self {
        let align = if byte_offset == 0 {
            self.align
        } else {
            self.align.min(1 << byte_offset.trailing_zeros())
        };
        Self {
            mem_vt,
            align,
            ..self
        }
    }

    #[inline]
    pub fn is_volatile(&self) -> bool {
        self.flags.contains(MemFlags::VOLATILE)
    }
}
