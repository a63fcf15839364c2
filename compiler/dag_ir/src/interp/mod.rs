//! Reference interpreter for operation DAGs.
//!
//! Executes a DAG from its root and reports everything observable: the
//! values returned, the branch decisions taken, and the final contents of
//! memory outside the stack region. Running a DAG before and after a
//! transformation and comparing the two [`Outcome`]s checks that the
//! transformation preserved behaviour.
//!
//! # Value model
//!
//! Scalars of any kind (integers, float encodings, flags, pointers) are
//! raw bits in a `u128`, zero above their width. Vectors are one `u128`
//! per element. Memory is byte addressed and little-endian; a value is
//! laid out as its bit string (elements in order, element 0 in the low
//! bits). Stack objects live above [`STACK_BASE`].
//!
//! # Calling convention
//!
//! `Call` operands and `Ret` operands are matched against declared types
//! (routine parameters, return signature) in order. A declared value is
//! taken from one operand at least as wide as it (the low bits), or from
//! the concatenation of consecutive narrower operands, low part first.
//! This makes a value passed whole, widened, or as its little-endian
//! parts all read the same.
//!
//! Integer operations handle widths up to 128 bits. Float arithmetic
//! covers `F32`, `F64` and `PpcF128`.

mod float;

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};

use crate::dag::{Dag, NodeId, Payload};
use crate::limbs;
use crate::opcode::{CondCode, Libcall, LoadExt, Opcode, SoftCmp};
use crate::types::{FloatFormat, ValueType};

/// First address of the stack region.
pub const STACK_BASE: u64 = 0x7000_0000;

// ── Bit strings ─────────────────────────────────────────────────────

/// An arbitrary-length little-endian bit string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Bits {
    words: Vec<u64>,
    width: u32,
}

impl Bits {
    pub fn new() -> Self {
        Self::default()
    }

    /// The low `width` bits of `value`.
    pub fn from_u128(value: u128, width: u32) -> Self {
        let mut bits = Self::new();
        bits.push(value, width);
        bits
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    fn bit(&self, i: u32) -> bool {
        i < self.width && (self.words[(i / 64) as usize] >> (i % 64)) & 1 == 1
    }

    fn push_bit(&mut self, on: bool) {
        if self.width % 64 == 0 {
            self.words.push(0);
        }
        if on {
            self.words[(self.width / 64) as usize] |= 1 << (self.width % 64);
        }
        self.width += 1;
    }

    /// Append the low `width` bits of `value` above the current bits.
    pub fn push(&mut self, value: u128, width: u32) {
        for i in 0..width {
            self.push_bit(i < 128 && (value >> i) & 1 == 1);
        }
    }

    pub fn append(&mut self, other: &Bits) {
        for i in 0..other.width {
            self.push_bit(other.bit(i));
        }
    }

    /// Up to 128 bits starting at `offset`; bits past the end read as zero.
    pub fn extract(&self, offset: u32, width: u32) -> u128 {
        (0..width.min(128)).fold(0, |acc, i| {
            acc | (u128::from(self.bit(offset.saturating_add(i))) << i)
        })
    }

    /// The first `width` bits as a new string.
    #[must_use]
    pub fn prefix(&self, width: u32) -> Bits {
        let mut out = Bits::new();
        for i in 0..width {
            out.push_bit(self.bit(i));
        }
        out
    }
}

impl From<u128> for Bits {
    fn from(value: u128) -> Self {
        Bits::from_u128(value, 128)
    }
}

// ── Errors and results ──────────────────────────────────────────────

/// Why a DAG could not be evaluated.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("{opcode} is not supported at type {vt}")]
    Unsupported { opcode: Opcode, vt: ValueType },
    #[error("argument {index} was not supplied")]
    MissingArgument { index: u32 },
    #[error("{node} passes too few bits for its declared values")]
    BadSignature { node: NodeId },
    #[error("{node} is malformed: {detail}")]
    Malformed { node: NodeId, detail: &'static str },
}

/// Everything a DAG execution makes observable.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Outcome {
    /// Declared return values concatenated, first value in the low bits.
    pub returned: Option<Bits>,
    /// `(block, taken)` for each conditional branch, in execution order.
    pub branches: Vec<(u32, bool)>,
    /// Memory outside the stack region.
    pub memory: BTreeMap<u64, u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Val {
    Scalar(u128),
    Vector(Vec<u128>),
    Token,
}

/// Execute `dag` with the given arguments and initial memory.
pub fn evaluate(
    dag: &Dag,
    args: &[Bits],
    memory: &BTreeMap<u64, u8>,
) -> Result<Outcome, EvalError> {
    let mut machine = Machine::new(dag, args, memory);
    for id in dag.topological_order() {
        let results = machine.step(id)?;
        machine.values[id.index()] = results;
    }
    Ok(machine.finish())
}

// ── Machine ─────────────────────────────────────────────────────────

struct Machine<'a> {
    dag: &'a Dag,
    args: &'a [Bits],
    memory: FxHashMap<u64, u8>,
    frame: Vec<u64>,
    values: Vec<SmallVec<[Val; 2]>>,
    outcome: Outcome,
}

fn elem_bits(vt: ValueType) -> u32 {
    vt.scalar_type().bits()
}

fn elem_format(vt: ValueType) -> Option<FloatFormat> {
    vt.scalar_type().float_format()
}

/// Bit string of a value of type `vt`.
fn to_bits(val: &Val, vt: ValueType) -> Bits {
    match val {
        Val::Scalar(v) => Bits::from_u128(*v, vt.bits()),
        Val::Vector(elems) => {
            let w = elem_bits(vt);
            let mut bits = Bits::new();
            for e in elems {
                bits.push(*e, w);
            }
            bits
        }
        Val::Token => Bits::new(),
    }
}

/// Decode a value of type `vt` starting `offset` bits into `bits`.
fn from_bits(bits: &Bits, offset: u32, vt: ValueType) -> Val {
    match vt {
        ValueType::Vector(v) => {
            let w = v.elem.bits();
            Val::Vector(
                (0..v.count)
                    .map(|i| bits.extract(offset + i * w, w))
                    .collect(),
            )
        }
        ValueType::Chain => Val::Token,
        other => Val::Scalar(bits.extract(offset, other.bits())),
    }
}

/// Read declared values from consecutive operands; see the module docs.
fn gather(
    node: NodeId,
    widths: &[u32],
    operands: &[(Val, ValueType)],
) -> Result<Vec<Bits>, EvalError> {
    let mut out = Vec::with_capacity(widths.len());
    let mut next = operands.iter();
    for &w in widths {
        let mut acc = Bits::new();
        while acc.width() < w {
            let (val, vt) = next.next().ok_or(EvalError::BadSignature { node })?;
            acc.append(&to_bits(val, *vt));
        }
        out.push(acc.prefix(w));
    }
    Ok(out)
}

fn scalar(val: &Val) -> u128 {
    match val {
        Val::Scalar(v) => *v,
        Val::Vector(e) => e.first().copied().unwrap_or(0),
        Val::Token => 0,
    }
}

/// Apply `f` to matching elements of two values; a scalar paired with a
/// vector is broadcast.
fn zip_with(
    a: &Val,
    b: &Val,
    mut f: impl FnMut(usize, u128, u128) -> Option<u128>,
) -> Option<Val> {
    match (a, b) {
        (Val::Scalar(x), Val::Scalar(y)) => Some(Val::Scalar(f(0, *x, *y)?)),
        (Val::Vector(xs), Val::Vector(ys)) => Some(Val::Vector(
            xs.iter()
                .zip(ys)
                .enumerate()
                .map(|(i, (x, y))| f(i, *x, *y))
                .collect::<Option<_>>()?,
        )),
        (Val::Vector(xs), Val::Scalar(y)) => Some(Val::Vector(
            xs.iter()
                .enumerate()
                .map(|(i, x)| f(i, *x, *y))
                .collect::<Option<_>>()?,
        )),
        (Val::Scalar(x), Val::Vector(ys)) => Some(Val::Vector(
            ys.iter()
                .enumerate()
                .map(|(i, y)| f(i, *x, *y))
                .collect::<Option<_>>()?,
        )),
        _ => None,
    }
}

fn map(a: &Val, mut f: impl FnMut(u128) -> Option<u128>) -> Option<Val> {
    match a {
        Val::Scalar(x) => Some(Val::Scalar(f(*x)?)),
        Val::Vector(xs) => Some(Val::Vector(
            xs.iter().map(|x| f(*x)).collect::<Option<_>>()?,
        )),
        Val::Token => None,
    }
}

/// High `w` bits of the `2w`-bit product of two `w`-bit values.
fn mul_high(a: u128, b: u128, w: u32) -> u128 {
    if w <= 64 {
        return limbs::truncate((a * b) >> w, w);
    }
    let (a_lo, a_hi) = (a & u128::from(u64::MAX), a >> 64);
    let (b_lo, b_hi) = (b & u128::from(u64::MAX), b >> 64);
    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;
    let mid = (ll >> 64) + (lh & u128::from(u64::MAX)) + (hl & u128::from(u64::MAX));
    let lo = (ll & u128::from(u64::MAX)) | (mid << 64);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    if w == 128 {
        hi
    } else {
        limbs::truncate((lo >> w) | (hi << (128 - w)), w)
    }
}

fn int_binary(op: Opcode, w: u32, a: u128, b: u128) -> Option<u128> {
    let r = match op {
        Opcode::Add => a.wrapping_add(b),
        Opcode::Sub => a.wrapping_sub(b),
        Opcode::Mul => a.wrapping_mul(b),
        Opcode::MulHu => mul_high(a, b, w),
        Opcode::UDiv => a.checked_div(b).unwrap_or(0),
        Opcode::URem => a.checked_rem(b).unwrap_or(0),
        Opcode::SDiv | Opcode::SRem => {
            let (x, y) = (limbs::as_signed(a, w), limbs::as_signed(b, w));
            if y == 0 {
                0
            } else if op == Opcode::SDiv {
                x.wrapping_div(y) as u128
            } else {
                x.wrapping_rem(y) as u128
            }
        }
        Opcode::And => a & b,
        Opcode::Or => a | b,
        Opcode::Xor => a ^ b,
        Opcode::Shl => {
            if b >= u128::from(w) {
                0
            } else {
                a << b
            }
        }
        Opcode::Srl => {
            if b >= u128::from(w) {
                0
            } else {
                a >> b
            }
        }
        Opcode::Sra => {
            let amount = b.min(u128::from(w - 1)) as u32;
            (limbs::as_signed(a, w) >> amount) as u128
        }
        _ => return None,
    };
    Some(limbs::truncate(r, w))
}

fn int_unary(op: Opcode, w: u32, a: u128) -> Option<u128> {
    let r = match op {
        Opcode::Neg => 0u128.wrapping_sub(a),
        Opcode::Ctlz => u128::from(a.leading_zeros() - (128 - w)),
        Opcode::Cttz => u128::from(a.trailing_zeros().min(w)),
        Opcode::Ctpop => u128::from(limbs::truncate(a, w).count_ones()),
        Opcode::Bswap if w % 8 == 0 && w > 0 => a.swap_bytes() >> (128 - w),
        _ => return None,
    };
    Some(limbs::truncate(r, w))
}

fn int_compare(cc: CondCode, w: u32, a: u128, b: u128) -> Option<bool> {
    let (sa, sb) = (limbs::as_signed(a, w), limbs::as_signed(b, w));
    Some(match cc {
        CondCode::Eq => a == b,
        CondCode::Ne => a != b,
        CondCode::Ult => a < b,
        CondCode::Ule => a <= b,
        CondCode::Ugt => a > b,
        CondCode::Uge => a >= b,
        CondCode::Slt => sa < sb,
        CondCode::Sle => sa <= sb,
        CondCode::Sgt => sa > sb,
        CondCode::Sge => sa >= sb,
        _ => return None,
    })
}

fn float_compare(cc: CondCode, format: FloatFormat, a: u128, b: u128) -> Option<bool> {
    use std::cmp::Ordering::{Equal, Greater, Less};
    let ord = float::compare(format, a, b)?;
    Some(match cc {
        CondCode::FOeq => ord == Some(Equal),
        CondCode::FOlt => ord == Some(Less),
        CondCode::FOle => matches!(ord, Some(Less | Equal)),
        CondCode::FOgt => ord == Some(Greater),
        CondCode::FOge => matches!(ord, Some(Greater | Equal)),
        CondCode::FUne => ord != Some(Equal),
        CondCode::FUno => ord.is_none(),
        CondCode::FOrd => ord.is_some(),
        _ => return None,
    })
}

/// Execute a software routine on its parameter values.
fn run_routine(call: Libcall, params: &[u128]) -> Option<u128> {
    use std::cmp::Ordering::{Equal, Greater, Less};
    let arg = |i: usize| params.get(i).copied();
    match call {
        Libcall::SDiv(w) => int_binary(Opcode::SDiv, w, arg(0)?, arg(1)?),
        Libcall::UDiv(w) => int_binary(Opcode::UDiv, w, arg(0)?, arg(1)?),
        Libcall::SRem(w) => int_binary(Opcode::SRem, w, arg(0)?, arg(1)?),
        Libcall::URem(w) => int_binary(Opcode::URem, w, arg(0)?, arg(1)?),
        Libcall::Ctlz(w) => int_unary(Opcode::Ctlz, w, arg(0)?),
        Libcall::Cttz(w) => int_unary(Opcode::Cttz, w, arg(0)?),
        Libcall::Ctpop(w) => int_unary(Opcode::Ctpop, w, arg(0)?),
        Libcall::FAdd(f) => float::binary(Opcode::FAdd, f, arg(0)?, arg(1)?),
        Libcall::FSub(f) => float::binary(Opcode::FSub, f, arg(0)?, arg(1)?),
        Libcall::FMul(f) => float::binary(Opcode::FMul, f, arg(0)?, arg(1)?),
        Libcall::FDiv(f) => float::binary(Opcode::FDiv, f, arg(0)?, arg(1)?),
        Libcall::FCmp(cmp, f) => {
            let ord = float::compare(f, arg(0)?, arg(1)?)?;
            let result: i32 = match (cmp, ord) {
                (SoftCmp::Unord, None) => 1,
                (SoftCmp::Unord, Some(_)) => 0,
                (SoftCmp::Eq | SoftCmp::Ne, Some(Equal)) => 0,
                (SoftCmp::Eq | SoftCmp::Ne, _) => 1,
                (SoftCmp::Lt | SoftCmp::Le, None) => 1,
                (SoftCmp::Gt | SoftCmp::Ge, None) => -1,
                (_, Some(Less)) => -1,
                (_, Some(Equal)) => 0,
                (_, Some(Greater)) => 1,
            };
            Some(u128::from(result as u32))
        }
        Libcall::FpToSint(f, w) => float::to_int(f, arg(0)?, w, true),
        Libcall::FpToUint(f, w) => float::to_int(f, arg(0)?, w, false),
        Libcall::SintToFp(w, f) => float::from_int(w, arg(0)?, true, f),
        Libcall::UintToFp(w, f) => float::from_int(w, arg(0)?, false, f),
        Libcall::FpExtend(a, b) | Libcall::FpRound(a, b) => float::convert(a, b, arg(0)?),
    }
}

impl<'a> Machine<'a> {
    fn new(dag: &'a Dag, args: &'a [Bits], memory: &BTreeMap<u64, u8>) -> Self {
        let mut frame = Vec::with_capacity(dag.stack_objects().len());
        let mut cursor = STACK_BASE;
        for obj in dag.stack_objects() {
            let align = u64::from(obj.align);
            cursor = cursor.div_ceil(align) * align;
            frame.push(cursor);
            cursor += u64::from(obj.size.max(1));
        }
        Machine {
            dag,
            args,
            memory: memory.iter().map(|(a, b)| (*a, *b)).collect(),
            frame,
            values: vec![SmallVec::new(); dag.id_bound()],
            outcome: Outcome::default(),
        }
    }

    fn finish(mut self) -> Outcome {
        self.outcome.memory = self
            .memory
            .iter()
            .filter(|(addr, _)| **addr < STACK_BASE)
            .map(|(a, b)| (*a, *b))
            .collect();
        self.outcome
    }

    fn operand(&self, id: NodeId, i: usize) -> &Val {
        let v = self.dag[id].operands[i];
        &self.values[v.node.index()][v.slot as usize]
    }

    fn operand_type(&self, id: NodeId, i: usize) -> ValueType {
        self.dag.value_type(self.dag[id].operands[i])
    }

    fn read(&self, addr: u64, bytes: u32) -> Bits {
        let mut bits = Bits::new();
        for i in 0..u64::from(bytes) {
            let byte = self.memory.get(&addr.wrapping_add(i)).copied().unwrap_or(0);
            bits.push(u128::from(byte), 8);
        }
        bits
    }

    fn write(&mut self, addr: u64, bits: &Bits, bytes: u32) {
        for i in 0..bytes {
            let byte = bits.extract(i * 8, 8) as u8;
            self.memory.insert(addr.wrapping_add(u64::from(i)), byte);
        }
    }

    fn step(&mut self, id: NodeId) -> Result<SmallVec<[Val; 2]>, EvalError> {
        let dag = self.dag;
        let node = &dag[id];
        let op = node.opcode;
        let vt = node.results.first().copied().unwrap_or(ValueType::Chain);
        let unsupported = || EvalError::Unsupported { opcode: op, vt };
        let malformed = |detail| EvalError::Malformed { node: id, detail };
        let w = elem_bits(vt);
        if vt.is_data() && w > 128 {
            return Err(unsupported());
        }

        let one = |v: Val| -> SmallVec<[Val; 2]> { smallvec![v] };
        let result = match op {
            Opcode::EntryToken | Opcode::TokenFactor => one(Val::Token),
            Opcode::Constant | Opcode::ConstantFp => {
                let bits = node.payload.bits().ok_or_else(|| malformed("missing bits"))?;
                one(Val::Scalar(limbs::truncate(bits, vt.bits())))
            }
            Opcode::Undef => one(match vt.as_vector() {
                Some(v) => Val::Vector(vec![0; v.count as usize]),
                None => Val::Scalar(0),
            }),
            Opcode::Argument => {
                let Payload::Argument { index, offset } = node.payload else {
                    return Err(malformed("missing argument index"));
                };
                let arg = self
                    .args
                    .get(index as usize)
                    .ok_or(EvalError::MissingArgument { index })?;
                one(from_bits(arg, offset, vt))
            }
            Opcode::FrameIndex => {
                let Payload::Frame(slot) = node.payload else {
                    return Err(malformed("missing frame slot"));
                };
                let addr = self
                    .frame
                    .get(slot as usize)
                    .ok_or_else(|| malformed("unknown frame slot"))?;
                one(Val::Scalar(u128::from(*addr)))
            }

            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::MulHu
            | Opcode::SDiv
            | Opcode::UDiv
            | Opcode::SRem
            | Opcode::URem
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Shl
            | Opcode::Sra
            | Opcode::Srl => {
                let (a, b) = (self.operand(id, 0), self.operand(id, 1));
                one(zip_with(a, b, |_, x, y| int_binary(op, w, x, y)).ok_or_else(unsupported)?)
            }
            Opcode::Neg | Opcode::Ctlz | Opcode::Cttz | Opcode::Ctpop | Opcode::Bswap => {
                let src_w = elem_bits(self.operand_type(id, 0));
                let r = map(self.operand(id, 0), |x| {
                    int_unary(op, src_w, x).map(|r| limbs::truncate(r, w))
                });
                one(r.ok_or_else(unsupported)?)
            }

            Opcode::AddC | Opcode::SubC | Opcode::AddE | Opcode::SubE => {
                let a = scalar(self.operand(id, 0));
                let b = scalar(self.operand(id, 1));
                let c = if matches!(op, Opcode::AddE | Opcode::SubE) {
                    scalar(self.operand(id, 2)) & 1
                } else {
                    0
                };
                let (value, carry) = if matches!(op, Opcode::AddC | Opcode::AddE) {
                    let (s1, o1) = a.overflowing_add(b);
                    let (s2, o2) = s1.overflowing_add(c);
                    let carry = if w == 128 { o1 || o2 } else { s2 >> w != 0 };
                    (limbs::truncate(s2, w), carry)
                } else {
                    let borrow = a < b || (a == b && c == 1) || (a > b && a - b < c);
                    (limbs::truncate(a.wrapping_sub(b).wrapping_sub(c), w), borrow)
                };
                smallvec![Val::Scalar(value), Val::Scalar(u128::from(carry))]
            }

            Opcode::SignExtend | Opcode::ZeroExtend | Opcode::AnyExtend | Opcode::Truncate => {
                let src_w = elem_bits(self.operand_type(id, 0));
                let r = map(self.operand(id, 0), |x| {
                    Some(if op == Opcode::SignExtend {
                        limbs::sign_extend_to(x, src_w, w)
                    } else {
                        limbs::truncate(x, w)
                    })
                });
                one(r.ok_or_else(unsupported)?)
            }
            Opcode::SignExtendInReg => {
                let from = node
                    .payload
                    .in_reg_type()
                    .ok_or_else(|| malformed("missing source type"))?;
                let from_w = elem_bits(from);
                let r = map(self.operand(id, 0), |x| {
                    Some(limbs::sign_extend_to(x, from_w, w))
                });
                one(r.ok_or_else(unsupported)?)
            }
            Opcode::BitCast => {
                let bits = to_bits(self.operand(id, 0), self.operand_type(id, 0));
                one(from_bits(&bits, 0, vt))
            }
            Opcode::FpToSint | Opcode::FpToUint => {
                let from = elem_format(self.operand_type(id, 0)).ok_or_else(unsupported)?;
                let signed = op == Opcode::FpToSint;
                let r = map(self.operand(id, 0), |x| float::to_int(from, x, w, signed));
                one(r.ok_or_else(unsupported)?)
            }
            Opcode::SintToFp | Opcode::UintToFp => {
                let to = elem_format(vt).ok_or_else(unsupported)?;
                let src_w = elem_bits(self.operand_type(id, 0));
                let signed = op == Opcode::SintToFp;
                let r = map(self.operand(id, 0), |x| float::from_int(src_w, x, signed, to));
                one(r.ok_or_else(unsupported)?)
            }
            Opcode::FpExtend | Opcode::FpRound => {
                let from = elem_format(self.operand_type(id, 0)).ok_or_else(unsupported)?;
                let to = elem_format(vt).ok_or_else(unsupported)?;
                let r = map(self.operand(id, 0), |x| float::convert(from, to, x));
                one(r.ok_or_else(unsupported)?)
            }
            Opcode::FAdd | Opcode::FSub | Opcode::FMul | Opcode::FDiv => {
                let format = elem_format(vt).ok_or_else(unsupported)?;
                let (a, b) = (self.operand(id, 0), self.operand(id, 1));
                let r = zip_with(a, b, |_, x, y| float::binary(op, format, x, y));
                one(r.ok_or_else(unsupported)?)
            }
            Opcode::FNeg => {
                let format = elem_format(vt).ok_or_else(unsupported)?;
                let r = map(self.operand(id, 0), |x| Some(float::negate(format, x)));
                one(r.ok_or_else(unsupported)?)
            }

            Opcode::SetCc => {
                let cc = node.payload.cond().ok_or_else(|| malformed("missing predicate"))?;
                let operand_vt = self.operand_type(id, 0);
                let src_w = elem_bits(operand_vt);
                let format = elem_format(operand_vt);
                let (a, b) = (self.operand(id, 0), self.operand(id, 1));
                let r = zip_with(a, b, |_, x, y| {
                    let truth = match format {
                        Some(f) => float_compare(cc, f, x, y)?,
                        None => int_compare(cc, src_w, x, y)?,
                    };
                    Some(u128::from(truth))
                });
                one(r.ok_or_else(unsupported)?)
            }
            Opcode::Select => {
                let cond = self.operand(id, 0);
                let (a, b) = (self.operand(id, 1), self.operand(id, 2));
                let r = match cond {
                    Val::Scalar(c) => {
                        if c & 1 == 1 {
                            a.clone()
                        } else {
                            b.clone()
                        }
                    }
                    Val::Vector(cs) => {
                        zip_with(a, b, |i, x, y| Some(if cs.get(i)? & 1 == 1 { x } else { y }))
                            .ok_or_else(unsupported)?
                    }
                    Val::Token => return Err(malformed("token condition")),
                };
                one(r)
            }

            Opcode::BuildPair => {
                let half = self.operand_type(id, 0).bits();
                let lo = scalar(self.operand(id, 0));
                let hi = scalar(self.operand(id, 1));
                one(Val::Scalar(limbs::join(lo, hi, half)))
            }
            Opcode::ExtractElement => {
                let part = node.payload.part().ok_or_else(|| malformed("missing part"))?;
                let src = scalar(self.operand(id, 0));
                let shifted = if part == 0 { src } else { src >> w };
                one(Val::Scalar(limbs::truncate(shifted, w)))
            }

            Opcode::Load => {
                let mem = node.payload.mem().ok_or_else(|| malformed("missing memory info"))?;
                let addr = scalar(self.operand(id, 1)) as u64;
                let raw = from_bits(&self.read(addr, mem.mem_vt.store_bytes()), 0, mem.mem_vt);
                let from_w = elem_bits(mem.mem_vt);
                let value = match (mem.ext, raw) {
                    (LoadExt::Sign, Val::Scalar(x)) => {
                        Val::Scalar(limbs::sign_extend_to(x, from_w, w))
                    }
                    (LoadExt::Sign, Val::Vector(xs)) => Val::Vector(
                        xs.into_iter()
                            .map(|x| limbs::sign_extend_to(x, from_w, w))
                            .collect(),
                    ),
                    (_, raw) => raw,
                };
                smallvec![value, Val::Token]
            }
            Opcode::Store => {
                let mem = node.payload.mem().ok_or_else(|| malformed("missing memory info"))?;
                let value_vt = self.operand_type(id, 1);
                let addr = scalar(self.operand(id, 2)) as u64;
                let bits = match (self.operand(id, 1), mem.mem_vt) {
                    // Truncating vector stores narrow each element.
                    (Val::Vector(xs), ValueType::Vector(m)) => {
                        let mut bits = Bits::new();
                        for x in xs {
                            bits.push(*x, m.elem.bits());
                        }
                        bits
                    }
                    (val, _) => to_bits(val, value_vt).prefix(mem.mem_vt.bits()),
                };
                self.write(addr, &bits, mem.mem_vt.store_bytes());
                one(Val::Token)
            }

            Opcode::BrCond => {
                let Payload::Block(block) = node.payload else {
                    return Err(malformed("missing branch target"));
                };
                let taken = scalar(self.operand(id, 1)) & 1 == 1;
                self.outcome.branches.push((block, taken));
                one(Val::Token)
            }
            Opcode::Ret => {
                let Payload::Signature(signature) = &node.payload else {
                    return Err(malformed("missing return signature"));
                };
                let widths: Vec<u32> = signature.iter().map(|vt| vt.bits()).collect();
                let operands: Vec<(Val, ValueType)> = (1..node.operands.len())
                    .map(|i| (self.operand(id, i).clone(), self.operand_type(id, i)))
                    .collect();
                let mut returned = Bits::new();
                for bits in gather(id, &widths, &operands)? {
                    returned.append(&bits);
                }
                self.outcome.returned = Some(returned);
                SmallVec::new()
            }
            Opcode::Call => {
                let routine = node
                    .payload
                    .routine()
                    .ok_or_else(|| malformed("missing routine"))?;
                let call = routine.libcall;
                let widths: Vec<u32> = call.params().iter().map(|vt| vt.bits()).collect();
                let operands: Vec<(Val, ValueType)> = (0..node.operands.len())
                    .map(|i| (self.operand(id, i).clone(), self.operand_type(id, i)))
                    .collect();
                let params: Vec<u128> = gather(id, &widths, &operands)?
                    .iter()
                    .map(|b| b.extract(0, b.width()))
                    .collect();
                let result = run_routine(call, &params).ok_or_else(unsupported)?;
                let result_w = call.result().bits();
                if let [only] = node.results.as_slice() {
                    one(Val::Scalar(limbs::truncate(result, only.bits().min(result_w))))
                } else {
                    let bits = Bits::from_u128(result, result_w);
                    let mut offset = 0;
                    let mut values = SmallVec::new();
                    for part in &node.results {
                        values.push(from_bits(&bits, offset, *part));
                        offset += part.bits();
                    }
                    values
                }
            }

            Opcode::BuildVector => {
                let elems = (0..node.operands.len())
                    .map(|i| limbs::truncate(scalar(self.operand(id, i)), w))
                    .collect();
                one(Val::Vector(elems))
            }
            Opcode::ExtractVectorElt => {
                let Val::Vector(elems) = self.operand(id, 0) else {
                    return Err(malformed("extract from a non-vector"));
                };
                let idx = scalar(self.operand(id, 1));
                let elem = usize::try_from(idx)
                    .ok()
                    .and_then(|i| elems.get(i).copied())
                    .unwrap_or(0);
                one(Val::Scalar(limbs::truncate(elem, w)))
            }
            Opcode::InsertVectorElt => {
                let Val::Vector(elems) = self.operand(id, 0) else {
                    return Err(malformed("insert into a non-vector"));
                };
                let mut elems = elems.clone();
                let elt = limbs::truncate(scalar(self.operand(id, 1)), w);
                let idx = scalar(self.operand(id, 2));
                if let Some(slot) = usize::try_from(idx).ok().and_then(|i| elems.get_mut(i)) {
                    *slot = elt;
                }
                one(Val::Vector(elems))
            }
            Opcode::VectorShuffle => {
                let mask = node.payload.mask().ok_or_else(|| malformed("missing mask"))?;
                let mut pool = Vec::new();
                for i in 0..2 {
                    match self.operand(id, i) {
                        Val::Vector(xs) => pool.extend_from_slice(xs),
                        _ => return Err(malformed("shuffle of a non-vector")),
                    }
                }
                let elems = mask
                    .iter()
                    .map(|lane| lane.and_then(|l| pool.get(l as usize).copied()).unwrap_or(0))
                    .collect();
                one(Val::Vector(elems))
            }
            Opcode::ConcatVectors => {
                let mut elems = Vec::new();
                for i in 0..node.operands.len() {
                    match self.operand(id, i) {
                        Val::Vector(xs) => elems.extend_from_slice(xs),
                        _ => return Err(malformed("concat of a non-vector")),
                    }
                }
                one(Val::Vector(elems))
            }
            Opcode::ExtractSubvector => {
                let first = node.payload.part().ok_or_else(|| malformed("missing start"))?;
                let Val::Vector(src) = self.operand(id, 0) else {
                    return Err(malformed("extract from a non-vector"));
                };
                let count = vt.element_count();
                let elems = (first..first + count)
                    .map(|i| src.get(i as usize).copied().unwrap_or(0))
                    .collect();
                one(Val::Vector(elems))
            }
            Opcode::VecReduceAdd => {
                let Val::Vector(elems) = self.operand(id, 0) else {
                    return Err(malformed("reduce of a non-vector"));
                };
                let sum = elems.iter().fold(0u128, |acc, e| acc.wrapping_add(*e));
                one(Val::Scalar(limbs::truncate(sum, w)))
            }
        };
        Ok(result)
    }
}
