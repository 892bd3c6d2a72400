/*
 * Copyright © 2023 Collabora, Ltd.
 * SPDX-License-Identifier: MIT
 */

extern crate sil_ir_proc;

pub use crate::builder::{Builder, SSABuilder, SSAFnBuilder};
use crate::cfg::DomInfo;
use crate::meta::Metadata;

use rustc_hash::FxHashMap;
use sil_ir_proc::*;
use std::fmt;

/// A scalar type: a float or unsigned integer of a given bit width
///
/// Every SSA value in the IR is a single scalar.  Wider data such as 64-bit
/// addresses or vector texture results are represented as multiple scalar
/// values by the translation layer which produces the IR.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ScalarType {
    F16 = 0,
    F32 = 1,
    U16 = 2,
    U32 = 3,
}

impl ScalarType {
    /// Returns the bit width of this type
    pub fn bits(&self) -> u8 {
        match self {
            ScalarType::F16 | ScalarType::U16 => 16,
            ScalarType::F32 | ScalarType::U32 => 32,
        }
    }

    /// Returns true if this is a floating-point type
    pub fn is_float(&self) -> bool {
        match self {
            ScalarType::F16 | ScalarType::F32 => true,
            ScalarType::U16 | ScalarType::U32 => false,
        }
    }

    /// Returns the unsigned integer type of the given bit width
    pub fn uint(bits: u8) -> ScalarType {
        match bits {
            16 => ScalarType::U16,
            32 => ScalarType::U32,
            _ => panic!("Unsupported integer bit width"),
        }
    }

    /// Returns the float type of the given bit width
    pub fn float(bits: u8) -> ScalarType {
        match bits {
            16 => ScalarType::F16,
            32 => ScalarType::F32,
            _ => panic!("Unsupported float bit width"),
        }
    }
}

impl From<ScalarType> for u8 {
    fn from(value: ScalarType) -> u8 {
        value as u8
    }
}

impl TryFrom<u32> for ScalarType {
    type Error = &'static str;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ScalarType::F16),
            1 => Ok(ScalarType::F32),
            2 => Ok(ScalarType::U16),
            3 => Ok(ScalarType::U32),
            _ => Err("Invalid scalar type number"),
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarType::F16 => write!(f, "f16"),
            ScalarType::F32 => write!(f, "f32"),
            ScalarType::U16 => write!(f, "u16"),
            ScalarType::U32 => write!(f, "u32"),
        }
    }
}

/// An SSA value
///
/// Each SSA value is defined by exactly one instruction and logically
/// contains two things: an index and a scalar type.  It is required that
/// each index refers to a unique SSA value, regardless of type.  This way
/// the index can be used to key tightly-packed data structures such as the
/// def-use index without having to determine separate ranges per type.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct SSAValue {
    packed: u32,
}

impl SSAValue {
    /// A special SSA value which is always invalid
    pub const NONE: Self = SSAValue { packed: 0 };

    /// Returns an SSA value with the given type and index
    pub fn new(ty: ScalarType, idx: u32) -> SSAValue {
        assert!(idx > 0 && idx < 1 << 30);
        let mut packed = idx;
        packed |= u32::from(u8::from(ty)) << 30;
        SSAValue { packed: packed }
    }

    /// Returns the index of this SSA value
    pub fn idx(&self) -> u32 {
        self.packed & 0x3fffffff
    }

    /// Returns the scalar type of this SSA value
    pub fn ty(&self) -> ScalarType {
        ScalarType::try_from(self.packed >> 30).unwrap()
    }

    /// Returns the bit width of this SSA value
    pub fn bits(&self) -> u8 {
        self.ty().bits()
    }

    /// Returns true if this SSA value is equal to SSAValue::NONE
    #[allow(dead_code)]
    pub fn is_none(&self) -> bool {
        self.packed == 0
    }
}

impl fmt::Display for SSAValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.ty(), self.idx())
    }
}

/// Hands out fresh SSA value indices
pub struct SSAValueAllocator {
    count: u32,
}

impl SSAValueAllocator {
    pub fn new() -> SSAValueAllocator {
        SSAValueAllocator { count: 0 }
    }

    pub fn alloc(&mut self, ty: ScalarType) -> SSAValue {
        self.count += 1;
        SSAValue::new(ty, self.count)
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn set_count(&mut self, count: u32) {
        self.count = count;
    }
}

#[derive(Clone, Copy, Debug)]
pub enum Dst {
    None,
    SSA(SSAValue),
}

impl Dst {
    pub fn as_ssa(&self) -> Option<&SSAValue> {
        match self {
            Dst::SSA(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        match self {
            Dst::None => true,
            _ => false,
        }
    }
}

impl From<SSAValue> for Dst {
    fn from(ssa: SSAValue) -> Dst {
        Dst::SSA(ssa)
    }
}

impl fmt::Display for Dst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dst::None => write!(f, "NULL"),
            Dst::SSA(v) => v.fmt(f),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SrcRef {
    Zero,
    True,
    Imm32(u32),
    SSA(SSAValue),
}

impl SrcRef {
    pub fn as_ssa(&self) -> Option<&SSAValue> {
        match self {
            SrcRef::SSA(v) => Some(v),
            _ => None,
        }
    }
}

impl From<SSAValue> for SrcRef {
    fn from(ssa: SSAValue) -> SrcRef {
        SrcRef::SSA(ssa)
    }
}

impl fmt::Display for SrcRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SrcRef::Zero => write!(f, "ZERO"),
            SrcRef::True => write!(f, "TRUE"),
            SrcRef::Imm32(u) => write!(f, "{:#x}", u),
            SrcRef::SSA(v) => v.fmt(f),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Src {
    pub src_ref: SrcRef,
}

impl Src {
    pub fn new_zero() -> Src {
        SrcRef::Zero.into()
    }

    pub fn new_true() -> Src {
        SrcRef::True.into()
    }

    pub fn new_imm_u32(u: u32) -> Src {
        SrcRef::Imm32(u).into()
    }

    pub fn new_imm_f32(x: f32) -> Src {
        SrcRef::Imm32(x.to_bits()).into()
    }

    pub fn as_ssa(&self) -> Option<&SSAValue> {
        self.src_ref.as_ssa()
    }

    pub fn is_always_true(&self) -> bool {
        match self.src_ref {
            SrcRef::True => true,
            _ => false,
        }
    }
}

impl<T: Into<SrcRef>> From<T> for Src {
    fn from(src_ref: T) -> Src {
        Src {
            src_ref: src_ref.into(),
        }
    }
}

impl fmt::Display for Src {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.src_ref.fmt(f)
    }
}

pub trait SrcsAsSlice {
    fn srcs_as_slice(&self) -> &[Src];
    fn srcs_as_mut_slice(&mut self) -> &mut [Src];
}

pub trait DstsAsSlice {
    fn dsts_as_slice(&self) -> &[Dst];
    fn dsts_as_mut_slice(&mut self) -> &mut [Dst];
}

/// Float rounding mode
#[derive(Clone, Copy, Eq, PartialEq)]
pub enum FRndMode {
    NearestEven,
    NegInf,
    PosInf,
    Zero,
}

impl fmt::Display for FRndMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FRndMode::NearestEven => write!(f, "re"),
            FRndMode::NegInf => write!(f, "rm"),
            FRndMode::PosInf => write!(f, "rp"),
            FRndMode::Zero => write!(f, "rz"),
        }
    }
}

/// Floating-point control state attached to every instruction
///
/// Rewrites which replace a float instruction must stamp the replacement
/// sequence with the control state of the instruction being replaced so the
/// rounding and precision behavior of the lowered sequence matches the
/// original.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct FpCtrl {
    pub rnd_mode: FRndMode,
    pub precise: bool,
}

impl FpCtrl {
    pub fn is_default(&self) -> bool {
        *self == Default::default()
    }
}

impl Default for FpCtrl {
    fn default() -> FpCtrl {
        FpCtrl {
            rnd_mode: FRndMode::NearestEven,
            precise: false,
        }
    }
}

impl fmt::Display for FpCtrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rnd_mode)?;
        if self.precise {
            write!(f, ".precise")?;
        }
        Ok(())
    }
}

#[repr(C)]
#[derive(SrcsAsSlice, DstsAsSlice)]
pub struct OpFAdd {
    pub dst: Dst,
    pub srcs: [Src; 2],
}

impl fmt::Display for OpFAdd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FADD {} {{ {}, {} }}", self.dst, self.srcs[0], self.srcs[1])
    }
}

#[repr(C)]
#[derive(SrcsAsSlice, DstsAsSlice)]
pub struct OpFMul {
    pub dst: Dst,
    pub srcs: [Src; 2],
}

impl fmt::Display for OpFMul {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FMUL {} {{ {}, {} }}", self.dst, self.srcs[0], self.srcs[1])
    }
}

#[repr(C)]
#[derive(SrcsAsSlice, DstsAsSlice)]
pub struct OpIAdd {
    pub dst: Dst,
    pub srcs: [Src; 2],
}

impl fmt::Display for OpIAdd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IADD {} {{ {}, {} }}", self.dst, self.srcs[0], self.srcs[1])
    }
}

/// Sine with a radians-domain source
///
/// Produced by the translation layer; no hardware target consumes it
/// directly.  Lowered to OpMuFu by the trig-lowering pass.
#[repr(C)]
#[derive(SrcsAsSlice, DstsAsSlice)]
pub struct OpFSin {
    pub dst: Dst,
    pub src: Src,
}

impl fmt::Display for OpFSin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FSIN {} {}", self.dst, self.src)
    }
}

/// Cosine with a radians-domain source
#[repr(C)]
#[derive(SrcsAsSlice, DstsAsSlice)]
pub struct OpFCos {
    pub dst: Dst,
    pub src: Src,
}

impl fmt::Display for OpFCos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FCOS {} {}", self.dst, self.src)
    }
}

#[derive(Clone, Copy, Eq, PartialEq)]
pub enum MuFuOp {
    Sin,
    Cos,
}

impl fmt::Display for MuFuOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MuFuOp::Sin => write!(f, "SIN"),
            MuFuOp::Cos => write!(f, "COS"),
        }
    }
}

/// Multi-function transcendental unit op
///
/// The hardware unit expects a turns-based source domain: one full period
/// of the function maps to the source interval [0, 1).
#[repr(C)]
#[derive(SrcsAsSlice, DstsAsSlice)]
pub struct OpMuFu {
    pub dst: Dst,
    pub op: MuFuOp,
    pub src: Src,
}

impl fmt::Display for OpMuFu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MUFU.{} {} {}", self.op, self.dst, self.src)
    }
}

/// Float-to-float resize; the widths come from the source and destination
/// value types
#[repr(C)]
#[derive(SrcsAsSlice, DstsAsSlice)]
pub struct OpF2F {
    pub dst: Dst,
    pub src: Src,
}

impl fmt::Display for OpF2F {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F2F {} {}", self.dst, self.src)
    }
}

/// Precision-lowerable down-convert
///
/// Like OpF2F to f16 except that the consumer has declared the narrowing
/// tolerable, so fusion passes may fold it into the producer.
#[repr(C)]
#[derive(SrcsAsSlice, DstsAsSlice)]
pub struct OpF2FMp {
    pub dst: Dst,
    pub src: Src,
}

impl fmt::Display for OpF2FMp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F2FMP {} {}", self.dst, self.src)
    }
}

/// Unsigned integer resize
#[repr(C)]
#[derive(SrcsAsSlice, DstsAsSlice)]
pub struct OpU2U {
    pub dst: Dst,
    pub src: Src,
}

impl fmt::Display for OpU2U {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U2U {} {}", self.dst, self.src)
    }
}

#[repr(C)]
#[derive(SrcsAsSlice, DstsAsSlice)]
pub struct OpMov {
    pub dst: Dst,
    pub src: Src,
}

impl fmt::Display for OpMov {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MOV {} {}", self.dst, self.src)
    }
}

/// Interpolated attribute load
#[repr(C)]
#[derive(SrcsAsSlice, DstsAsSlice)]
pub struct OpALd {
    pub dst: Dst,
    pub addr: u16,
    pub comp: u8,
}

impl fmt::Display for OpALd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ALD {} a[{:#x}].{}", self.dst, self.addr, self.comp)
    }
}

/// Shader output store; `slot` indexes the bound output buffers
#[repr(C)]
#[derive(SrcsAsSlice, DstsAsSlice)]
pub struct OpASt {
    pub src: Src,
    pub slot: u8,
}

impl fmt::Display for OpASt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AST o[{}] {}", self.slot, self.src)
    }
}

#[derive(Clone, Copy, Eq, PartialEq)]
pub enum MemSpace {
    Global,
    Shared,
}

impl fmt::Display for MemSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemSpace::Global => write!(f, "global"),
            MemSpace::Shared => write!(f, "shared"),
        }
    }
}

/// Memory load from `[offset + base]`
#[repr(C)]
#[derive(SrcsAsSlice, DstsAsSlice)]
pub struct OpLd {
    pub dst: Dst,
    pub offset: Src,
    pub space: MemSpace,
    pub base: u32,
}

impl OpLd {
    pub const OFFSET_SLOT: usize = 0;
}

impl fmt::Display for OpLd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LD.{} {} [{}+{:#x}]",
            self.space, self.dst, self.offset, self.base
        )
    }
}

/// Memory store to `[offset + base]`
#[repr(C)]
#[derive(SrcsAsSlice, DstsAsSlice)]
pub struct OpSt {
    pub data: Src,
    pub offset: Src,
    pub space: MemSpace,
    pub base: u32,
}

impl OpSt {
    pub const OFFSET_SLOT: usize = 1;
}

impl fmt::Display for OpSt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ST.{} [{}+{:#x}] {}",
            self.space, self.offset, self.base, self.data
        )
    }
}

/// Image load at a coordinate
#[repr(C)]
#[derive(SrcsAsSlice, DstsAsSlice)]
pub struct OpSuLd {
    pub dst: Dst,
    pub coord: Src,
    pub image: u8,
}

impl fmt::Display for OpSuLd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SULD img[{}] {} [{}]", self.image, self.dst, self.coord)
    }
}

/// Image store at a coordinate
#[repr(C)]
#[derive(SrcsAsSlice, DstsAsSlice)]
pub struct OpSuSt {
    pub coord: Src,
    pub data: Src,
    pub image: u8,
}

impl fmt::Display for OpSuSt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SUST img[{}] [{}] {}", self.image, self.coord, self.data)
    }
}

/// Branch to the block with the given id, taken when `cond` is non-zero
#[repr(C)]
#[derive(SrcsAsSlice, DstsAsSlice)]
pub struct OpBra {
    pub cond: Src,
    pub target: u32,
}

impl fmt::Display for OpBra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cond.is_always_true() {
            write!(f, "BRA b{}", self.target)
        } else {
            write!(f, "BRA b{} ({})", self.target, self.cond)
        }
    }
}

#[repr(C)]
#[derive(SrcsAsSlice, DstsAsSlice)]
pub struct OpExit {}

impl fmt::Display for OpExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EXIT")
    }
}

#[derive(Display, DstsAsSlice, SrcsAsSlice, FromVariants)]
pub enum Op {
    FAdd(OpFAdd),
    FMul(OpFMul),
    IAdd(OpIAdd),
    FSin(OpFSin),
    FCos(OpFCos),
    MuFu(OpMuFu),
    F2F(OpF2F),
    F2FMp(OpF2FMp),
    U2U(OpU2U),
    Mov(OpMov),
    ALd(OpALd),
    ASt(OpASt),
    Ld(OpLd),
    St(OpSt),
    SuLd(OpSuLd),
    SuSt(OpSuSt),
    Bra(OpBra),
    Exit(OpExit),
}

#[derive(Clone, Copy, Eq, PartialEq)]
pub enum OpCategory {
    ALU,
    Intrinsic,
    ControlFlow,
}

impl Op {
    pub fn category(&self) -> OpCategory {
        match self {
            Op::FAdd(_)
            | Op::FMul(_)
            | Op::IAdd(_)
            | Op::FSin(_)
            | Op::FCos(_)
            | Op::MuFu(_)
            | Op::F2F(_)
            | Op::F2FMp(_)
            | Op::U2U(_)
            | Op::Mov(_) => OpCategory::ALU,
            Op::ALd(_)
            | Op::ASt(_)
            | Op::Ld(_)
            | Op::St(_)
            | Op::SuLd(_)
            | Op::SuSt(_) => OpCategory::Intrinsic,
            Op::Bra(_) | Op::Exit(_) => OpCategory::ControlFlow,
        }
    }
}

pub struct Instr {
    pub op: Op,
    pub fp: FpCtrl,
}

impl Instr {
    pub fn new(op: impl Into<Op>) -> Instr {
        Instr {
            op: op.into(),
            fp: Default::default(),
        }
    }

    pub fn new_boxed(op: impl Into<Op>) -> Box<Self> {
        Box::new(Instr::new(op))
    }

    pub fn dsts(&self) -> &[Dst] {
        self.op.dsts_as_slice()
    }

    pub fn dsts_mut(&mut self) -> &mut [Dst] {
        self.op.dsts_as_mut_slice()
    }

    pub fn srcs(&self) -> &[Src] {
        self.op.srcs_as_slice()
    }

    pub fn srcs_mut(&mut self) -> &mut [Src] {
        self.op.srcs_as_mut_slice()
    }

    /// Returns the single SSA value this instruction defines, if any
    pub fn def(&self) -> Option<SSAValue> {
        for dst in self.dsts() {
            if let Dst::SSA(v) = dst {
                return Some(*v);
            }
        }
        None
    }

    pub fn is_terminator(&self) -> bool {
        match self.op {
            Op::Bra(_) | Op::Exit(_) => true,
            _ => false,
        }
    }

    pub fn can_eliminate(&self) -> bool {
        match self.op {
            Op::ASt(_) | Op::St(_) | Op::SuSt(_) | Op::Bra(_) | Op::Exit(_) => {
                false
            }
            _ => true,
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.fp.is_default() {
            write!(f, "@{} ", self.fp)?;
        }
        write!(f, "{}", self.op)
    }
}

impl<T: Into<Op>> From<T> for Instr {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

/// A stable handle to an instruction in its function's arena
///
/// Handles stay valid across insertions and removals of other instructions;
/// removal only tombstones the arena slot.  This is what lets def-use edges
/// be stored as plain index pairs.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct InstrRef(u32);

impl InstrRef {
    fn idx(&self) -> usize {
        usize::try_from(self.0).unwrap()
    }
}

impl fmt::Display for InstrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

/// One use of an SSA value: a consuming instruction and the slot within its
/// uniform source slice
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SrcUse {
    pub instr: InstrRef,
    pub slot: u16,
}

pub struct Block {
    pub id: u32,
    pub instrs: Vec<InstrRef>,
}

impl Block {
    pub fn new(id: u32) -> Block {
        Block {
            id: id,
            instrs: Vec::new(),
        }
    }
}

pub struct Function {
    pub ssa_alloc: SSAValueAllocator,
    pub blocks: Vec<Block>,
    instrs: Vec<Option<Box<Instr>>>,
    pub(crate) defs: FxHashMap<SSAValue, InstrRef>,
    pub(crate) uses: FxHashMap<SSAValue, Vec<SrcUse>>,
    pub(crate) valid_meta: Metadata,
    pub(crate) dom: Option<DomInfo>,
}

impl Function {
    pub fn new() -> Function {
        Function {
            ssa_alloc: SSAValueAllocator::new(),
            blocks: Vec::new(),
            instrs: Vec::new(),
            defs: FxHashMap::default(),
            uses: FxHashMap::default(),
            valid_meta: Metadata::empty(),
            dom: None,
        }
    }

    pub fn instr(&self, r: InstrRef) -> &Instr {
        self.instrs[r.idx()].as_ref().expect("Removed instruction")
    }

    /// Mutable access to an instruction's non-source fields.  Sources must
    /// be rewritten through rewrite_src() so the def-use index stays
    /// consistent.
    pub fn instr_mut(&mut self, r: InstrRef) -> &mut Instr {
        self.instrs[r.idx()].as_mut().expect("Removed instruction")
    }

    pub fn is_removed(&self, r: InstrRef) -> bool {
        self.instrs[r.idx()].is_none()
    }

    /// Iterates the handles of every live instruction in the arena, in
    /// allocation order
    pub(crate) fn arena_refs(&self) -> impl Iterator<Item = InstrRef> + '_ {
        self.instrs.iter().enumerate().filter_map(|(i, slot)| {
            slot.as_ref()
                .map(|_| InstrRef(u32::try_from(i).unwrap()))
        })
    }

    /// Returns the instruction defining the given value, if it is still in
    /// the function
    pub fn def_instr(&self, v: SSAValue) -> Option<InstrRef> {
        self.defs.get(&v).copied()
    }

    /// Returns every use of the given value
    pub fn uses_of(&self, v: SSAValue) -> &[SrcUse] {
        self.uses.get(&v).map(|u| &u[..]).unwrap_or(&[])
    }

    /// Adds an instruction to the arena and registers its defs and uses.
    /// The caller is responsible for placing the returned handle in a
    /// block's instruction list.
    pub fn alloc_instr(&mut self, instr: Box<Instr>) -> InstrRef {
        let r = InstrRef(u32::try_from(self.instrs.len()).unwrap());
        for (slot, src) in instr.srcs().iter().enumerate() {
            if let Some(v) = src.as_ssa() {
                self.uses.entry(*v).or_default().push(SrcUse {
                    instr: r,
                    slot: u16::try_from(slot).unwrap(),
                });
            }
        }
        if let Some(v) = instr.def() {
            let prev = self.defs.insert(v, r);
            assert!(prev.is_none(), "Value defined twice");
        }
        self.instrs.push(Some(instr));
        r
    }

    /// Unregisters an instruction's defs and uses and tombstones its arena
    /// slot.  The handle must already be gone from every block list.
    pub(crate) fn unlink_instr(&mut self, r: InstrRef) {
        let instr = self.instrs[r.idx()].take().expect("Removed instruction");
        for (slot, src) in instr.srcs().iter().enumerate() {
            if let Some(v) = src.as_ssa() {
                self.remove_use(
                    *v,
                    SrcUse {
                        instr: r,
                        slot: u16::try_from(slot).unwrap(),
                    },
                );
            }
        }
        if let Some(v) = instr.def() {
            assert!(
                self.uses_of(v).is_empty(),
                "Removing the definition of a value which still has uses"
            );
            self.defs.remove(&v);
            self.uses.remove(&v);
        }
    }

    /// Removes an instruction from its block and the arena
    pub fn remove_instr(&mut self, r: InstrRef) {
        for b in &mut self.blocks {
            b.instrs.retain(|&i| i != r);
        }
        self.unlink_instr(r);
    }

    fn remove_use(&mut self, v: SSAValue, u: SrcUse) {
        let list = self.uses.get_mut(&v).expect("Unknown value");
        let pos = list
            .iter()
            .position(|&x| x == u)
            .expect("Stale def-use index");
        list.swap_remove(pos);
    }

    /// Redirects one source of an instruction, keeping the def-use index
    /// consistent
    pub fn rewrite_src(&mut self, r: InstrRef, slot: usize, new: Src) {
        let old = self.instr(r).srcs()[slot];
        if let Some(v) = old.as_ssa() {
            self.remove_use(
                *v,
                SrcUse {
                    instr: r,
                    slot: u16::try_from(slot).unwrap(),
                },
            );
        }
        if let Some(v) = new.as_ssa() {
            self.uses.entry(*v).or_default().push(SrcUse {
                instr: r,
                slot: u16::try_from(slot).unwrap(),
            });
        }
        self.instrs[r.idx()].as_mut().unwrap().srcs_mut()[slot] = new;
    }

    /// Transactionally redirects every use of `old` to `new`.  After this
    /// returns no instruction in the function references `old`.
    pub fn replace_uses(&mut self, old: SSAValue, new: SSAValue) {
        let Some(list) = self.uses.remove(&old) else {
            return;
        };
        for u in &list {
            let instr = self.instrs[u.instr.idx()]
                .as_mut()
                .expect("Stale def-use index");
            instr.srcs_mut()[usize::from(u.slot)] = new.into();
        }
        self.uses.entry(new).or_default().extend(list);
    }

    /// Re-keys the destination of an instruction to a fresh value of the
    /// given type and returns the new value.  Existing uses keep referencing
    /// the old value; the caller must redirect them before the rewrite
    /// completes.
    pub fn retype_def(&mut self, r: InstrRef, ty: ScalarType) -> SSAValue {
        let old = self.instr(r).def().expect("Instruction has no destination");
        let new = self.ssa_alloc.alloc(ty);
        for dst in self.instrs[r.idx()].as_mut().unwrap().dsts_mut() {
            if let Dst::SSA(v) = dst {
                if *v == old {
                    *dst = new.into();
                }
            }
        }
        self.defs.remove(&old);
        self.defs.insert(new, r);
        new
    }

    /// Rebuilds the def-use index from scratch.  Needed after wholesale
    /// rewrites such as value renumbering which bypass the incremental
    /// bookkeeping.
    pub fn rebuild_def_use(&mut self) {
        self.defs.clear();
        self.uses.clear();
        for (idx, slot) in self.instrs.iter().enumerate() {
            let Some(instr) = slot else {
                continue;
            };
            let r = InstrRef(u32::try_from(idx).unwrap());
            for (s, src) in instr.srcs().iter().enumerate() {
                if let Some(v) = src.as_ssa() {
                    self.uses.entry(*v).or_default().push(SrcUse {
                        instr: r,
                        slot: u16::try_from(s).unwrap(),
                    });
                }
            }
            if let Some(v) = instr.def() {
                let prev = self.defs.insert(v, r);
                assert!(prev.is_none(), "Value defined twice");
            }
        }
    }

    /// Iterates the live instructions of a block in order
    pub fn block_instrs<'a>(
        &'a self,
        b: &'a Block,
    ) -> impl Iterator<Item = &'a Instr> + 'a {
        b.instrs.iter().map(move |&r| self.instr(r))
    }

    pub fn block_branch(&self, b: &Block) -> Option<&Instr> {
        let i = self.instr(*b.instrs.last()?);
        if i.is_terminator() {
            Some(i)
        } else {
            None
        }
    }

    pub fn block_falls_through(&self, b: &Block) -> bool {
        match self.block_branch(b) {
            Some(i) => match &i.op {
                Op::Bra(bra) => !bra.cond.is_always_true(),
                _ => false,
            },
            None => true,
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.blocks {
            write!(f, "block {} {{\n", b.id)?;
            for i in self.block_instrs(b) {
                write!(f, "    {}\n", i)?;
            }
            write!(f, "}}\n")?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
            ShaderStage::Compute => write!(f, "compute"),
        }
    }
}

pub struct Shader {
    pub stage: ShaderStage,
    pub functions: Vec<Function>,
}

impl Shader {
    pub fn new(stage: ShaderStage) -> Shader {
        Shader {
            stage: stage,
            functions: Vec::new(),
        }
    }
}

impl fmt::Display for Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for func in &self.functions {
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}
