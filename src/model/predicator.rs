//! Predicator: the packed label carried by every arc.
//!
//! A predicator is a single `u64` so it can be copied, hashed and compared
//! without indirection. Stored predicators are fully resolved; probe
//! predicators may leave any field as wildcard and carry comparison flags
//! in the modifier byte plus matching hints in the ephemeral byte.
//!
//! ## Layout
//!
//! | Bits    | Field                                                   |
//! |---------|---------------------------------------------------------|
//! | 0..32   | value (`u32`, `i32` or `f32` bits, per modifier)         |
//! | 32..34  | arc direction                                           |
//! | 34..48  | relationship code (14 bits)                             |
//! | 48..53  | stored modifier type                                    |
//! | 53      | forward-only (stored) / negated comparison (probe)      |
//! | 54..56  | LTE / GTE comparison flags (probe)                      |
//! | 56..64  | ephemeral byte: value (4), type (3), negation (1)       |

use serde::{Deserialize, Serialize};

// ============================================================================
// Bit layout
// ============================================================================

pub(crate) const VAL_MASK: u64 = 0x0000_0000_ffff_ffff;
pub(crate) const DIR_MASK: u64 = 0x0000_0003_0000_0000;
pub(crate) const REL_MASK: u64 = 0x0000_fffc_0000_0000;
pub(crate) const MOD_MASK: u64 = 0x00ff_0000_0000_0000;
pub(crate) const SMT_MASK: u64 = 0x001f_0000_0000_0000;
pub(crate) const FWD_MASK: u64 = 0x0020_0000_0000_0000;
pub(crate) const NEG_MASK: u64 = 0x0020_0000_0000_0000;
pub(crate) const CMP_MASK: u64 = 0x00e0_0000_0000_0000;
pub(crate) const FLT_MASK: u64 = 0x0010_0000_0000_0000;
pub(crate) const LTE_MASK: u64 = 0x0040_0000_0000_0000;
pub(crate) const GTE_MASK: u64 = 0x0080_0000_0000_0000;
pub(crate) const EQU_MASK: u64 = 0x00c0_0000_0000_0000;
pub(crate) const KEY_MASK: u64 = 0x001f_fffc_0000_0000;
pub(crate) const DAT_MASK: u64 = 0x001f_fffc_ffff_ffff;
pub(crate) const EPH_MASK: u64 = 0xff00_0000_0000_0000;

const DIR_SHIFT: u32 = 32;
const REL_SHIFT: u32 = 34;
const MOD_SHIFT: u32 = 48;
const EPH_SHIFT: u32 = 56;

/// Expiration timestamp meaning "never".
pub const TIME_EXPIRES_NEVER: u32 = u32::MAX;

// ============================================================================
// Direction
// ============================================================================

/// Arc direction relative to the vertex owning the arcvector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ArcDirection {
    #[default]
    Any,
    In,
    Out,
    Both,
}

impl ArcDirection {
    pub const fn code(self) -> u64 {
        match self {
            Self::Any => 0,
            Self::In => 1,
            Self::Out => 2,
            Self::Both => 3,
        }
    }

    pub const fn from_code(code: u64) -> Self {
        match code & 0x3 {
            1 => Self::In,
            2 => Self::Out,
            3 => Self::Both,
            _ => Self::Any,
        }
    }

    /// The direction seen from the other end of the arc.
    pub const fn reversed(self) -> Self {
        match self {
            Self::In => Self::Out,
            Self::Out => Self::In,
            other => other,
        }
    }
}

// ============================================================================
// Relationship
// ============================================================================

/// 14-bit relationship code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Relationship(pub u16);

impl Relationship {
    pub const NONE: Self = Self(0x0000);
    pub const WILDCARD: Self = Self(0x0000);
    pub const RELATED: Self = Self(0x0101);
    pub const SIMILAR: Self = Self(0x0102);
    pub const NONEXIST: Self = Self(0x0103);
    pub const SELF_REF: Self = Self(0x0104);
    pub const SYNTHETIC: Self = Self(0x0105);
    pub const NO_MAPPING: Self = Self(0x3f01);
    pub const LOCKED: Self = Self(0x3f09);
    pub const INVALID: Self = Self(0x3f0b);
    pub const ERROR: Self = Self(0x3f0e);

    pub const USER_START: u16 = 0x0200;
    pub const USER_END: u16 = 0x3eff;
    pub const MAX: u16 = 0x3fff;

    pub const fn is_wildcard(self) -> bool {
        self.0 == 0
    }

    pub const fn is_user(self) -> bool {
        self.0 >= Self::USER_START && self.0 <= Self::USER_END
    }

    pub const fn is_system(self) -> bool {
        self.0 >= 0x0100 && self.0 <= 0x01ff
    }

    pub const fn is_exception(self) -> bool {
        self.0 >= 0x3f00 && self.0 <= Self::MAX
    }

    /// True for codes that may label a stored arc.
    pub const fn is_valid(self) -> bool {
        self.is_user() || self.is_system()
    }
}

impl std::fmt::Display for Relationship {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:04x}", self.0)
    }
}

// ============================================================================
// Modifier
// ============================================================================

/// Value type tag of a predicator.
///
/// Bit 4 of the code flags a float value; bits 2..4 select the class
/// (system, basic, accumulator, timestamp).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Modifier {
    #[default]
    None = 0x00,
    Static = 0x01,
    Similarity = 0x12,
    Distance = 0x13,
    Lsh = 0x04,
    Integer = 0x05,
    Unsigned = 0x06,
    Float = 0x17,
    Counter = 0x08,
    Accumulator = 0x19,
    IntAggregator = 0x0A,
    FloatAggregator = 0x1B,
    TimeCreated = 0x0C,
    TimeModified = 0x0D,
    TimeExpires = 0x0E,
}

/// Modifier class, bits 2..4 of the modifier code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifierClass {
    System,
    Basic,
    Accumulator,
    Timestamp,
}

/// How the 32 value bits are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Unsigned,
    Integer,
    Real,
}

impl Modifier {
    const CLASS_MASK: u8 = 0x0C;

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => Self::None,
            0x01 => Self::Static,
            0x12 => Self::Similarity,
            0x13 => Self::Distance,
            0x04 => Self::Lsh,
            0x05 => Self::Integer,
            0x06 => Self::Unsigned,
            0x17 => Self::Float,
            0x08 => Self::Counter,
            0x19 => Self::Accumulator,
            0x0A => Self::IntAggregator,
            0x1B => Self::FloatAggregator,
            0x0C => Self::TimeCreated,
            0x0D => Self::TimeModified,
            0x0E => Self::TimeExpires,
            _ => return None,
        })
    }

    pub const fn class(self) -> ModifierClass {
        match self.code() & Self::CLASS_MASK {
            0x00 => ModifierClass::System,
            0x04 => ModifierClass::Basic,
            0x08 => ModifierClass::Accumulator,
            _ => ModifierClass::Timestamp,
        }
    }

    pub const fn is_float(self) -> bool {
        self.code() & 0x10 != 0
    }

    pub const fn value_kind(self) -> ValueKind {
        match self {
            _ if self.is_float() => ValueKind::Real,
            Self::Integer | Self::IntAggregator => ValueKind::Integer,
            _ => ValueKind::Unsigned,
        }
    }

    pub const fn is_accumulator(self) -> bool {
        matches!(self.class(), ModifierClass::Accumulator)
    }

    pub const fn is_timestamp(self) -> bool {
        matches!(self.class(), ModifierClass::Timestamp)
    }
}

// ============================================================================
// Value comparison
// ============================================================================

/// Comparison code used by probes and value conditions.
///
/// The low nibble of the basic codes maps directly onto the probe
/// comparison bits of the modifier byte (`code << 4`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueComparison {
    #[default]
    Any = 0x00,
    Neg = 0x02,
    Lte = 0x04,
    Gt = 0x06,
    Gte = 0x08,
    Lt = 0x0A,
    Equ = 0x0C,
    Neq = 0x0E,
    Range = 0x10,
    NRange = 0x12,
    DynRange = 0x18,
    DynRangeRatio = 0x19,
    DynLte = 0x1A,
    DynGt = 0x1B,
    DynGte = 0x1C,
    DynLt = 0x1D,
    DynEqu = 0x1E,
    DynNeq = 0x1F,
}

impl ValueComparison {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => Self::Any,
            0x02 => Self::Neg,
            0x04 => Self::Lte,
            0x06 => Self::Gt,
            0x08 => Self::Gte,
            0x0A => Self::Lt,
            0x0C => Self::Equ,
            0x0E => Self::Neq,
            0x10 => Self::Range,
            0x12 => Self::NRange,
            0x18 => Self::DynRange,
            0x19 => Self::DynRangeRatio,
            0x1A => Self::DynLte,
            0x1B => Self::DynGt,
            0x1C => Self::DynGte,
            0x1D => Self::DynLt,
            0x1E => Self::DynEqu,
            0x1F => Self::DynNeq,
            _ => return None,
        })
    }

    /// Single-value comparison that fits in the predicator's comparison bits.
    pub const fn is_basic(self) -> bool {
        self.code() < 0x10
    }

    pub const fn is_range(self) -> bool {
        matches!(self, Self::Range | Self::NRange | Self::DynRange | Self::DynRangeRatio)
    }

    pub const fn is_dynamic(self) -> bool {
        self.code() & 0x18 == 0x18
    }

    /// The basic comparison a dynamic comparison applies after its update.
    pub const fn basic_of_dynamic(self) -> Self {
        match self {
            Self::DynLte => Self::Lte,
            Self::DynGt => Self::Gt,
            Self::DynGte => Self::Gte,
            Self::DynLt => Self::Lt,
            Self::DynEqu => Self::Equ,
            Self::DynNeq => Self::Neq,
            other => other,
        }
    }

    /// Apply this comparison to an ordered pair; ranges use both bounds
    /// with endpoints included.
    pub fn compare<T: PartialOrd>(self, x: T, v1: T, v2: T) -> bool {
        match self.basic_of_dynamic() {
            Self::Any => true,
            Self::Lte => x <= v1,
            Self::Gt => x > v1,
            Self::Gte => x >= v1,
            Self::Lt => x < v1,
            Self::Equ => x == v1,
            Self::Neq => x != v1,
            Self::Range | Self::DynRange | Self::DynRangeRatio => !(v1 > x || v2 < x),
            Self::NRange => v1 > x || v2 < x,
            _ => false,
        }
    }
}

// ============================================================================
// Ephemeral byte
// ============================================================================

/// Matching hint carried only by probes and write requests, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum EphemeralType {
    #[default]
    None = 0,
    Lsh = 1,
    DynDelta = 2,
    DynRatio = 3,
    Distance = 4,
    ForwardOnly = 6,
    AutoTimestamps = 7,
}

impl EphemeralType {
    const fn from_code(code: u8) -> Self {
        match code & 0x7 {
            1 => Self::Lsh,
            2 => Self::DynDelta,
            3 => Self::DynRatio,
            4 => Self::Distance,
            6 => Self::ForwardOnly,
            7 => Self::AutoTimestamps,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Ephemeral {
    /// 4-bit parameter: hamming threshold for LSH, comparison code for dynamic updates.
    pub value: u8,
    pub kind: EphemeralType,
    /// Negated condition (reject mode).
    pub neg: bool,
}

impl Ephemeral {
    pub const NONE: Self = Self { value: 0, kind: EphemeralType::None, neg: false };

    const fn to_byte(self) -> u8 {
        (self.value & 0x0f) | ((self.kind as u8) << 4) | if self.neg { 0x80 } else { 0 }
    }

    const fn from_byte(byte: u8) -> Self {
        Self {
            value: byte & 0x0f,
            kind: EphemeralType::from_code(byte >> 4),
            neg: byte & 0x80 != 0,
        }
    }
}

// ============================================================================
// Value
// ============================================================================

/// A predicator value interpreted per its modifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PredicatorValue {
    Unsigned(u32),
    Integer(i32),
    Real(f32),
}

impl PredicatorValue {
    pub const ZERO: Self = Self::Unsigned(0);

    pub fn to_bits(self) -> u32 {
        match self {
            Self::Unsigned(u) => u,
            Self::Integer(i) => i as u32,
            Self::Real(r) => r.to_bits(),
        }
    }

    pub fn from_bits(bits: u32, kind: ValueKind) -> Self {
        match kind {
            ValueKind::Unsigned => Self::Unsigned(bits),
            ValueKind::Integer => Self::Integer(bits as i32),
            ValueKind::Real => Self::Real(f32::from_bits(bits)),
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Self::Unsigned(u) => u as f64,
            Self::Integer(i) => i as f64,
            Self::Real(r) => r as f64,
        }
    }

    /// Convert into the representation required by `kind`.
    pub fn coerce(self, kind: ValueKind) -> Self {
        match (self, kind) {
            (Self::Unsigned(_), ValueKind::Unsigned)
            | (Self::Integer(_), ValueKind::Integer)
            | (Self::Real(_), ValueKind::Real) => self,
            (Self::Integer(i), ValueKind::Unsigned) => Self::Unsigned(i.max(0) as u32),
            (Self::Unsigned(u), ValueKind::Integer) => Self::Integer(u.min(i32::MAX as u32) as i32),
            (v, ValueKind::Real) => Self::Real(v.as_f64() as f32),
            (Self::Real(r), ValueKind::Integer) => Self::Integer(r.round() as i32),
            (Self::Real(r), ValueKind::Unsigned) => Self::Unsigned(r.round() as u32),
        }
    }
}

impl From<u32> for PredicatorValue {
    fn from(v: u32) -> Self {
        Self::Unsigned(v)
    }
}

impl From<i32> for PredicatorValue {
    fn from(v: i32) -> Self {
        Self::Integer(v)
    }
}

impl From<f32> for PredicatorValue {
    fn from(v: f32) -> Self {
        Self::Real(v)
    }
}

// ============================================================================
// Predicator
// ============================================================================

/// Packed arc label.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Predicator(u64);

impl Predicator {
    /// Full wildcard.
    pub const NONE: Self = Self(0);

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// A fully resolved predicator, ready to be written.
    pub fn new(rel: Relationship, modifier: Modifier, value: impl Into<PredicatorValue>) -> Self {
        let value = value.into().coerce(modifier.value_kind());
        Self::NONE
            .with_relationship(rel)
            .with_modifier(modifier)
            .with_value_bits(value.to_bits())
    }

    /// A probe restricted by relationship only.
    pub fn relationship_probe(rel: Relationship) -> Self {
        Self::NONE.with_relationship(rel)
    }

    /// A probe restricted by relationship and modifier, any value.
    pub fn key_probe(rel: Relationship, modifier: Modifier) -> Self {
        Self::NONE.with_relationship(rel).with_modifier(modifier)
    }

    /// A probe with a single-value comparison.
    pub fn value_probe(
        rel: Relationship,
        modifier: Modifier,
        vcomp: ValueComparison,
        value: impl Into<PredicatorValue>,
    ) -> Self {
        Self::new(rel, modifier, value).with_comparison(vcomp)
    }

    /// A relationship-only predicator for the synthetic fallback arc.
    pub fn synthetic() -> Self {
        Self::NONE
            .with_relationship(Relationship::SYNTHETIC)
            .with_modifier(Modifier::Static)
    }

    // ------------------------------------------------------------------------
    // Field accessors
    // ------------------------------------------------------------------------

    pub const fn relationship(self) -> Relationship {
        Relationship(((self.0 & REL_MASK) >> REL_SHIFT) as u16)
    }

    pub const fn direction(self) -> ArcDirection {
        ArcDirection::from_code((self.0 & DIR_MASK) >> DIR_SHIFT)
    }

    pub const fn modifier_code(self) -> u8 {
        ((self.0 & SMT_MASK) >> MOD_SHIFT) as u8
    }

    pub fn modifier(self) -> Modifier {
        Modifier::from_code(self.modifier_code()).unwrap_or(Modifier::None)
    }

    /// Basic comparison encoded in the probe comparison bits.
    pub fn comparison(self) -> ValueComparison {
        let code = (((self.0 & CMP_MASK) >> MOD_SHIFT) as u8) >> 4;
        ValueComparison::from_code(code).unwrap_or(ValueComparison::Any)
    }

    pub const fn ephemeral(self) -> Ephemeral {
        Ephemeral::from_byte((self.0 >> EPH_SHIFT) as u8)
    }

    pub const fn value_bits(self) -> u32 {
        (self.0 & VAL_MASK) as u32
    }

    pub fn value(self) -> PredicatorValue {
        PredicatorValue::from_bits(self.value_bits(), self.value_kind())
    }

    pub fn value_kind(self) -> ValueKind {
        if self.is_float() {
            ValueKind::Real
        } else {
            self.modifier().value_kind()
        }
    }

    pub const fn is_float(self) -> bool {
        self.0 & FLT_MASK != 0
    }

    pub const fn as_u32(self) -> u32 {
        self.value_bits()
    }

    pub const fn as_i32(self) -> i32 {
        self.value_bits() as i32
    }

    pub fn as_f32(self) -> f32 {
        f32::from_bits(self.value_bits())
    }

    /// Relationship and stored modifier, the identity of an arc between two vertices.
    pub const fn key(self) -> u64 {
        self.0 & KEY_MASK
    }

    /// Key and value, excluding direction and ephemeral bits.
    pub const fn data(self) -> u64 {
        self.0 & DAT_MASK
    }

    // ------------------------------------------------------------------------
    // Condition shape
    // ------------------------------------------------------------------------

    pub const fn has_relationship(self) -> bool {
        self.0 & REL_MASK != 0
    }

    pub const fn has_modifier(self) -> bool {
        self.0 & SMT_MASK != 0
    }

    pub const fn has_value(self) -> bool {
        self.0 & EQU_MASK != 0
    }

    /// No restriction on relationship or modifier.
    pub const fn is_full_wildcard(self) -> bool {
        self.0 & KEY_MASK == 0
    }

    /// Both relationship and modifier given.
    pub const fn is_specific(self) -> bool {
        self.has_relationship() && self.has_modifier()
    }

    pub const fn is_synthetic(self) -> bool {
        self.relationship().0 == Relationship::SYNTHETIC.0
    }

    pub const fn is_negated_value(self) -> bool {
        self.0 & NEG_MASK != 0
    }

    /// Set on stored predicators of arcs that have no reverse entry.
    pub const fn is_stored_forward_only(self) -> bool {
        self.0 & FWD_MASK != 0
    }

    pub const fn is_forward_only(self) -> bool {
        matches!(self.ephemeral().kind, EphemeralType::ForwardOnly)
    }

    pub const fn is_auto_timestamps(self) -> bool {
        matches!(self.ephemeral().kind, EphemeralType::AutoTimestamps)
    }

    pub const fn is_lsh(self) -> bool {
        matches!(self.ephemeral().kind, EphemeralType::Lsh)
    }

    pub const fn is_dynamic(self) -> bool {
        matches!(self.ephemeral().kind, EphemeralType::DynDelta | EphemeralType::DynRatio)
    }

    pub const fn is_positive(self) -> bool {
        !self.ephemeral().neg
    }

    pub fn is_expiration(self) -> bool {
        self.modifier() == Modifier::TimeExpires
    }

    pub fn is_accumulator(self) -> bool {
        self.modifier().is_accumulator()
    }

    /// Expiration predicator whose timestamp has passed.
    pub fn is_expired(self, now: u32) -> bool {
        self.is_expiration() && self.as_u32() <= now
    }

    pub const fn is_cmp_lt(self) -> bool {
        self.0 & CMP_MASK == (GTE_MASK | NEG_MASK)
    }

    pub const fn is_cmp_gt(self) -> bool {
        self.0 & CMP_MASK == (LTE_MASK | NEG_MASK)
    }

    // ------------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------------

    pub const fn with_relationship(self, rel: Relationship) -> Self {
        Self((self.0 & !REL_MASK) | (((rel.0 & Relationship::MAX) as u64) << REL_SHIFT))
    }

    pub const fn with_direction(self, dir: ArcDirection) -> Self {
        Self((self.0 & !DIR_MASK) | (dir.code() << DIR_SHIFT))
    }

    pub const fn with_modifier(self, modifier: Modifier) -> Self {
        Self((self.0 & !SMT_MASK) | (((modifier as u8 & 0x1f) as u64) << MOD_SHIFT))
    }

    pub const fn with_value_bits(self, bits: u32) -> Self {
        Self((self.0 & !VAL_MASK) | bits as u64)
    }

    pub fn with_value(self, value: impl Into<PredicatorValue>) -> Self {
        let value = value.into().coerce(self.value_kind());
        self.with_value_bits(value.to_bits())
    }

    /// Set the basic comparison bits. Range and dynamic codes have no
    /// single-predicator encoding and leave the comparison unset.
    pub fn with_comparison(self, vcomp: ValueComparison) -> Self {
        let code = if vcomp.is_basic() { vcomp.code() } else { 0 };
        Self((self.0 & !CMP_MASK) | (((code as u64) << 4) << MOD_SHIFT))
    }

    pub const fn with_ephemeral(self, eph: Ephemeral) -> Self {
        Self((self.0 & !EPH_MASK) | ((eph.to_byte() as u64) << EPH_SHIFT))
    }

    /// Flip the overall accept/reject sign of a probe.
    pub const fn inverted(self) -> Self {
        let mut eph = self.ephemeral();
        eph.neg = !eph.neg;
        self.with_ephemeral(eph)
    }

    /// Create the arc without reverse storage on the head.
    pub const fn forward_only(self) -> Self {
        self.with_ephemeral(Ephemeral { value: 0, kind: EphemeralType::ForwardOnly, neg: false })
    }

    /// Create creation/modification (and optional expiration) timestamp arcs alongside.
    pub const fn auto_timestamps(self) -> Self {
        self.with_ephemeral(Ephemeral { value: 0, kind: EphemeralType::AutoTimestamps, neg: false })
    }

    /// Match on hamming distance between value bit patterns.
    pub const fn lsh_threshold(self, threshold: u8) -> Self {
        self.with_ephemeral(Ephemeral { value: threshold & 0x0f, kind: EphemeralType::Lsh, neg: false })
    }

    /// Compare against the previous arc's value plus `delta`.
    pub fn dynamic_delta(self, vcomp: ValueComparison, delta: impl Into<PredicatorValue>) -> Self {
        let delta = match delta.into() {
            PredicatorValue::Real(r) if !self.is_float() => PredicatorValue::Integer(r.round() as i32),
            PredicatorValue::Unsigned(u) if !self.is_float() => PredicatorValue::Integer(u.min(i32::MAX as u32) as i32),
            v if self.is_float() => PredicatorValue::Real(v.as_f64() as f32),
            v => v,
        };
        self.with_comparison(vcomp.basic_of_dynamic())
            .with_value_bits(delta.to_bits())
            .with_ephemeral(Ephemeral { value: vcomp.code() & 0x0f, kind: EphemeralType::DynDelta, neg: false })
    }

    /// Compare against the previous arc's value scaled by `ratio`.
    pub fn dynamic_ratio(self, vcomp: ValueComparison, ratio: f32) -> Self {
        self.with_comparison(vcomp.basic_of_dynamic())
            .with_value_bits(ratio.to_bits())
            .with_ephemeral(Ephemeral { value: vcomp.code() & 0x0f, kind: EphemeralType::DynRatio, neg: false })
    }

    /// The predicator as written into an arcvector in direction `dir`.
    ///
    /// The forward-only bit shares its position with the negated
    /// comparison bit, so only the ephemeral flag decides it.
    pub fn into_stored(self, dir: ArcDirection) -> Self {
        let mut stored = Self(self.0 & DAT_MASK).with_direction(dir);
        if !stored.has_modifier() {
            stored = stored.with_modifier(Modifier::Static);
        }
        if self.is_forward_only() {
            stored = Self(stored.0 | FWD_MASK);
        }
        stored
    }

    /// Take over `src`'s relationship and modifier.
    pub const fn merge_inherit_key(self, src: Predicator) -> Self {
        Self((self.0 & !KEY_MASK) | (src.0 & KEY_MASK))
    }

    /// Compare key and value, ignoring direction and ephemeral bits.
    pub const fn data_match(a: Predicator, b: Predicator) -> bool {
        a.data() == b.data()
    }

    /// New stored value when `set` is written over `previous`.
    ///
    /// Accumulators add to the existing value; integer accumulation
    /// saturates at the bounds of the modifier's value range.
    pub fn update_if_accumulator(previous: Predicator, set: Predicator) -> Predicator {
        if !set.is_accumulator() {
            return set;
        }
        let updated = match set.modifier() {
            m if m.is_float() => PredicatorValue::Real(previous.as_f32() + set.as_f32()),
            Modifier::IntAggregator => PredicatorValue::Integer(previous.as_i32().saturating_add(set.as_i32())),
            _ => {
                let sum = previous.as_u32() as i64 + set.as_i32() as i64;
                PredicatorValue::Unsigned(sum.clamp(0, u32::MAX as i64) as u32)
            }
        };
        previous.with_value_bits(updated.to_bits())
    }
}

impl std::fmt::Debug for Predicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Predicator({self})")
    }
}

impl std::fmt::Display for Predicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rel={} mod={:02x} dir={:?} val={:?}",
            self.relationship(),
            self.modifier_code(),
            self.direction(),
            self.value()
        )?;
        let cmp = self.comparison();
        if cmp != ValueComparison::Any {
            write!(f, " cmp={cmp:?}")?;
        }
        let eph = self.ephemeral();
        if eph != Ephemeral::NONE {
            write!(f, " eph={:?}/{}{}", eph.kind, eph.value, if eph.neg { "/neg" } else { "" })?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const REL_A: Relationship = Relationship(0x0201);

    #[test]
    fn test_field_roundtrip() {
        let p = Predicator::new(REL_A, Modifier::Integer, -7).with_direction(ArcDirection::Out);
        assert_eq!(p.relationship(), REL_A);
        assert_eq!(p.modifier(), Modifier::Integer);
        assert_eq!(p.direction(), ArcDirection::Out);
        assert_eq!(p.value(), PredicatorValue::Integer(-7));
        assert!(!p.is_float());
    }

    #[test]
    fn test_float_modifier_sets_flt_bit() {
        let p = Predicator::new(REL_A, Modifier::Float, 2.5f32);
        assert!(p.is_float());
        assert_eq!(p.as_f32(), 2.5);
        assert_eq!(p.value_kind(), ValueKind::Real);
    }

    #[test]
    fn test_key_excludes_direction_and_value() {
        let a = Predicator::new(REL_A, Modifier::Counter, 1u32).with_direction(ArcDirection::Out);
        let b = Predicator::new(REL_A, Modifier::Counter, 99u32).with_direction(ArcDirection::In);
        assert_eq!(a.key(), b.key());
        assert_ne!(a.data(), b.data());
    }

    #[test]
    fn test_comparison_bits() {
        for vcomp in [
            ValueComparison::Lte,
            ValueComparison::Gt,
            ValueComparison::Gte,
            ValueComparison::Lt,
            ValueComparison::Equ,
            ValueComparison::Neq,
        ] {
            let p = Predicator::value_probe(REL_A, Modifier::Integer, vcomp, 3);
            assert_eq!(p.comparison(), vcomp);
            assert!(p.has_value());
        }
        let lt = Predicator::value_probe(REL_A, Modifier::Integer, ValueComparison::Lt, 3);
        assert!(lt.is_cmp_lt());
        assert!(lt.is_negated_value());
    }

    #[test]
    fn test_stored_form() {
        let p = Predicator::relationship_probe(REL_A)
            .with_comparison(ValueComparison::Gte)
            .forward_only()
            .into_stored(ArcDirection::Out);
        assert_eq!(p.modifier(), Modifier::Static);
        assert!(!p.has_value());
        assert!(p.is_stored_forward_only());
        assert_eq!(p.ephemeral(), Ephemeral::NONE);
    }

    #[test]
    fn test_stored_form_ignores_negated_comparison() {
        for vcomp in [ValueComparison::Gt, ValueComparison::Lt, ValueComparison::Neq, ValueComparison::Neg] {
            let p = Predicator::value_probe(REL_A, Modifier::Integer, vcomp, 3).into_stored(ArcDirection::Out);
            assert!(!p.is_stored_forward_only(), "{vcomp:?} stored as forward-only");
            assert_eq!(p.as_i32(), 3);
        }
    }

    #[test]
    fn test_full_wildcard() {
        assert!(Predicator::NONE.is_full_wildcard());
        assert!(!Predicator::relationship_probe(REL_A).is_full_wildcard());
        assert!(Predicator::key_probe(REL_A, Modifier::Integer).is_specific());
    }

    #[test]
    fn test_accumulator_saturates() {
        let prev = Predicator::new(REL_A, Modifier::Counter, u32::MAX - 1);
        let set = Predicator::new(REL_A, Modifier::Counter, 10u32);
        // Counter deltas are signed; reinterpret through the value bits.
        let set = set.with_value_bits(10i32 as u32);
        assert_eq!(Predicator::update_if_accumulator(prev, set).as_u32(), u32::MAX);

        let neg = set.with_value_bits((-5i32) as u32);
        let small = Predicator::new(REL_A, Modifier::Counter, 3u32);
        assert_eq!(Predicator::update_if_accumulator(small, neg).as_u32(), 0);
    }

    #[test]
    fn test_float_accumulator_adds() {
        let prev = Predicator::new(REL_A, Modifier::Accumulator, 1.5f32);
        let set = Predicator::new(REL_A, Modifier::Accumulator, 2.0f32);
        assert_eq!(Predicator::update_if_accumulator(prev, set).as_f32(), 3.5);
    }

    #[test]
    fn test_non_accumulator_overwrites() {
        let prev = Predicator::new(REL_A, Modifier::Integer, 1);
        let set = Predicator::new(REL_A, Modifier::Integer, 8);
        assert_eq!(Predicator::update_if_accumulator(prev, set), set);
    }

    #[test]
    fn test_expiration() {
        let p = Predicator::new(REL_A, Modifier::TimeExpires, 1000u32);
        assert!(p.is_expired(1000));
        assert!(!p.is_expired(999));
        assert!(!Predicator::new(REL_A, Modifier::Unsigned, 1u32).is_expired(5000));
    }

    #[test]
    fn test_merge_inherit_key() {
        let src = Predicator::new(REL_A, Modifier::Float, 1.0f32);
        let probe = Predicator::NONE.with_direction(ArcDirection::In);
        let merged = probe.merge_inherit_key(src);
        assert_eq!(merged.key(), src.key());
        assert_eq!(merged.direction(), ArcDirection::In);
    }

    #[test]
    fn test_ephemeral_roundtrip() {
        let p = Predicator::new(REL_A, Modifier::Lsh, 0xffu32).lsh_threshold(5).inverted();
        let eph = p.ephemeral();
        assert_eq!(eph.kind, EphemeralType::Lsh);
        assert_eq!(eph.value, 5);
        assert!(eph.neg);
        assert!(!p.is_positive());
    }
}
