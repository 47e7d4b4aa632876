//! Predicator matching.
//!
//! Every matcher takes `(probe, target)` where `probe` is a query
//! predicator (fields may be wildcard, comparison bits in the modifier
//! byte) and `target` is a stored predicator. The specialized matchers
//! assume the caller already knows which probe fields are live; only
//! [`match_generic`] inspects wildcard bits at runtime.
//!
//! ## Value comparison
//!
//! | Probe bits  | Meaning        | Negated |
//! |-------------|----------------|---------|
//! | `GTE`       | target >= v    | `<`     |
//! | `LTE`       | target <= v    | `>`     |
//! | `EQU`       | target == v    | `!=`    |
//!
//! Float equality uses an epsilon of `1/2^18`.

use super::predicator::{
    EphemeralType, Predicator, PredicatorValue, ValueKind, CMP_MASK, EQU_MASK, GTE_MASK, LTE_MASK,
};

/// Epsilon used for float (in)equality.
pub const FLOAT_EPSILON: f32 = 1.0 / (1 << 18) as f32;

/// Signature shared by all specialized matchers.
pub type PredicatorMatchFn = fn(Predicator, Predicator) -> bool;

// ============================================================================
// Primitive comparisons
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ordering3 {
    Less,
    Equal,
    Greater,
}

fn compare_values(target: Predicator, probe: Predicator) -> Ordering3 {
    // The probe decides the interpretation when it names a modifier.
    let kind = if probe.has_modifier() { probe.value_kind() } else { target.value_kind() };
    match kind {
        ValueKind::Real => {
            let (t, p) = (target.as_f32(), probe.as_f32());
            if (t - p).abs() <= FLOAT_EPSILON {
                Ordering3::Equal
            } else if t < p {
                Ordering3::Less
            } else {
                Ordering3::Greater
            }
        }
        ValueKind::Integer => ordering_of(target.as_i32().cmp(&probe.as_i32())),
        ValueKind::Unsigned => ordering_of(target.as_u32().cmp(&probe.as_u32())),
    }
}

fn ordering_of(o: std::cmp::Ordering) -> Ordering3 {
    match o {
        std::cmp::Ordering::Less => Ordering3::Less,
        std::cmp::Ordering::Equal => Ordering3::Equal,
        std::cmp::Ordering::Greater => Ordering3::Greater,
    }
}

/// Apply the probe's GTE/LTE/EQU bits (and their negation) to an ordering.
fn apply_comparison(probe: Predicator, ord: Ordering3) -> bool {
    let neg = probe.is_negated_value();
    let bits = probe.bits() & CMP_MASK & EQU_MASK;
    if bits == EQU_MASK {
        !((ord != Ordering3::Equal) ^ neg)
    } else if bits == GTE_MASK {
        !((ord == Ordering3::Less) ^ neg)
    } else if bits == LTE_MASK {
        !((ord == Ordering3::Greater) ^ neg)
    } else {
        !neg
    }
}

/// Compare the target value against the probe value.
pub fn match_value(probe: Predicator, target: Predicator) -> bool {
    apply_comparison(probe, compare_values(target, probe))
}

/// Compare the hamming distance between the value bit patterns against
/// the probe's LSH threshold.
pub fn match_hamming(probe: Predicator, target: Predicator) -> bool {
    let distance = (probe.as_u32() ^ target.as_u32()).count_ones();
    let threshold = probe.ephemeral().value as u32;
    apply_comparison(probe, ordering_of(distance.cmp(&threshold)))
}

// ============================================================================
// Specialized matchers
// ============================================================================

pub fn match_relationship(probe: Predicator, target: Predicator) -> bool {
    probe.relationship() == target.relationship()
}

pub fn match_modifier(probe: Predicator, target: Predicator) -> bool {
    probe.modifier_code() == target.modifier_code()
}

/// Relationship and modifier.
pub fn match_specific(probe: Predicator, target: Predicator) -> bool {
    probe.key() == target.key()
}

pub fn match_relationship_value(probe: Predicator, target: Predicator) -> bool {
    match_relationship(probe, target) && match_value(probe, target)
}

pub fn match_modifier_value(probe: Predicator, target: Predicator) -> bool {
    match_modifier(probe, target) && match_value(probe, target)
}

pub fn match_specific_value(probe: Predicator, target: Predicator) -> bool {
    match_specific(probe, target) && match_value(probe, target)
}

pub fn match_relationship_hamming(probe: Predicator, target: Predicator) -> bool {
    match_relationship(probe, target) && match_hamming(probe, target)
}

pub fn match_modifier_hamming(probe: Predicator, target: Predicator) -> bool {
    match_modifier(probe, target) && match_hamming(probe, target)
}

pub fn match_specific_hamming(probe: Predicator, target: Predicator) -> bool {
    match_specific(probe, target) && match_hamming(probe, target)
}

/// Runtime-dispatched matcher.
///
/// A full-wildcard probe and a synthetic target always hit. The value
/// is only compared when the probe names a modifier.
pub fn match_generic(probe: Predicator, target: Predicator) -> bool {
    if probe.is_full_wildcard() || target.is_synthetic() {
        return true;
    }
    if probe.has_relationship() && !match_relationship(probe, target) {
        return false;
    }
    if probe.has_modifier() {
        if !match_modifier(probe, target) {
            return false;
        }
        if probe.has_value() {
            return if probe.is_lsh() {
                match_hamming(probe, target)
            } else {
                match_value(probe, target)
            };
        }
    }
    true
}

// ============================================================================
// Dynamic updates
// ============================================================================

/// Float-ness of a dynamic probe and the value it updates from disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicTypeMismatch;

fn write_integer(probe: Predicator, value: i64) -> Predicator {
    let v = match probe.modifier().value_kind() {
        ValueKind::Integer => PredicatorValue::Integer(value.clamp(i32::MIN as i64, i32::MAX as i64) as i32),
        _ => PredicatorValue::Unsigned(value.clamp(0, u32::MAX as i64) as u32),
    };
    probe.with_value_bits(v.to_bits())
}

fn integer_base(previous: Predicator) -> i64 {
    match previous.value_kind() {
        ValueKind::Integer => previous.as_i32() as i64,
        _ => previous.as_u32() as i64,
    }
}

/// `probe.value = previous.value + delta`. Integer deltas are always
/// signed 32-bit; the result saturates at the bounds of the probe's type.
pub fn update_value_from_delta(probe: Predicator, previous: Predicator) -> Result<Predicator, DynamicTypeMismatch> {
    if probe.is_float() != previous.is_float() {
        return Err(DynamicTypeMismatch);
    }
    if probe.is_float() {
        let v = previous.as_f32() + probe.as_f32();
        return Ok(probe.with_value_bits(v.to_bits()));
    }
    let delta = probe.as_i32() as i64;
    Ok(write_integer(probe, integer_base(previous).saturating_add(delta)))
}

/// `probe.value = round(ratio * previous.value)`, saturating for integers.
pub fn update_value_from_ratio(probe: Predicator, previous: Predicator) -> Result<Predicator, DynamicTypeMismatch> {
    if probe.is_float() != previous.is_float() {
        return Err(DynamicTypeMismatch);
    }
    let ratio = probe.as_f32() as f64;
    if probe.is_float() {
        let v = (ratio * previous.as_f32() as f64) as f32;
        return Ok(probe.with_value_bits(v.to_bits()));
    }
    let scaled = (ratio * integer_base(previous) as f64).round();
    // `as` saturates for out-of-range floats and maps NaN to 0.
    Ok(write_integer(probe, scaled as i64))
}

/// Match a dynamic probe after updating it from `previous`.
///
/// Non-dynamic probes fall through to [`match_generic`]. A dynamic probe
/// whose modifier differs from `previous`, or whose update fails, misses.
pub fn dynamic_predicator_match(probe: Predicator, previous: Predicator, target: Predicator) -> bool {
    if probe.is_full_wildcard() {
        return true;
    }
    let resolved = match probe.ephemeral().kind {
        EphemeralType::DynDelta | EphemeralType::DynRatio if probe.modifier_code() != previous.modifier_code() => {
            return false;
        }
        EphemeralType::DynDelta => update_value_from_delta(probe, previous),
        EphemeralType::DynRatio => update_value_from_ratio(probe, previous),
        _ => Ok(probe),
    };
    match resolved {
        Ok(p) => match_generic(p, target),
        Err(_) => false,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::predicator::{Modifier, Relationship, ValueComparison};
    use proptest::prelude::*;

    const REL_A: Relationship = Relationship(0x0201);
    const REL_B: Relationship = Relationship(0x0202);

    fn int(v: i32) -> Predicator {
        Predicator::new(REL_A, Modifier::Integer, v)
    }

    fn probe(vcomp: ValueComparison, v: i32) -> Predicator {
        Predicator::value_probe(REL_A, Modifier::Integer, vcomp, v)
    }

    #[test]
    fn test_value_comparisons() {
        assert!(match_value(probe(ValueComparison::Gte, 5), int(5)));
        assert!(!match_value(probe(ValueComparison::Gte, 5), int(4)));
        assert!(match_value(probe(ValueComparison::Lt, 5), int(4)));
        assert!(!match_value(probe(ValueComparison::Lt, 5), int(5)));
        assert!(match_value(probe(ValueComparison::Lte, 5), int(5)));
        assert!(!match_value(probe(ValueComparison::Gt, 5), int(5)));
        assert!(match_value(probe(ValueComparison::Gt, -1), int(0)));
        assert!(match_value(probe(ValueComparison::Equ, 7), int(7)));
        assert!(match_value(probe(ValueComparison::Neq, 7), int(8)));
        assert!(!match_value(probe(ValueComparison::Neq, 7), int(7)));
    }

    #[test]
    fn test_unsigned_comparison_is_unsigned() {
        let p = Predicator::value_probe(REL_A, Modifier::Unsigned, ValueComparison::Gt, 1u32);
        let big = Predicator::new(REL_A, Modifier::Unsigned, u32::MAX);
        assert!(match_value(p, big));
    }

    #[test]
    fn test_float_epsilon() {
        let p = Predicator::value_probe(REL_A, Modifier::Float, ValueComparison::Equ, 1.0f32);
        let close = Predicator::new(REL_A, Modifier::Float, 1.0f32 + FLOAT_EPSILON / 2.0);
        let far = Predicator::new(REL_A, Modifier::Float, 1.01f32);
        assert!(match_value(p, close));
        assert!(!match_value(p, far));
    }

    #[test]
    fn test_hamming() {
        let p = Predicator::value_probe(REL_A, Modifier::Lsh, ValueComparison::Lte, 0b0000u32).lsh_threshold(2);
        let p = p.with_comparison(ValueComparison::Lte);
        assert!(match_hamming(p, Predicator::new(REL_A, Modifier::Lsh, 0b0011u32)));
        assert!(!match_hamming(p, Predicator::new(REL_A, Modifier::Lsh, 0b0111u32)));
        assert!(match_generic(p, Predicator::new(REL_A, Modifier::Lsh, 0b0001u32)));
    }

    #[test]
    fn test_generic_checks_fields() {
        let target = int(3);
        assert!(match_generic(Predicator::relationship_probe(REL_A), target));
        assert!(!match_generic(Predicator::relationship_probe(REL_B), target));
        assert!(!match_generic(Predicator::key_probe(REL_A, Modifier::Float), target));
        assert!(match_generic(probe(ValueComparison::Equ, 3), target));
        assert!(!match_generic(probe(ValueComparison::Equ, 4), target));
    }

    #[test]
    fn test_specific_and_paired() {
        let target = int(3);
        assert!(match_specific(Predicator::key_probe(REL_A, Modifier::Integer), target));
        assert!(match_relationship_value(probe(ValueComparison::Gte, 2), target));
        assert!(!match_modifier_value(probe(ValueComparison::Gte, 4), target));
        assert!(match_specific_value(probe(ValueComparison::Lte, 3), target));
    }

    #[test]
    fn test_delta_update() {
        let prev = Predicator::new(REL_A, Modifier::Unsigned, 10u32);
        let p = Predicator::key_probe(REL_A, Modifier::Unsigned).dynamic_delta(ValueComparison::DynGte, -3);
        let updated = update_value_from_delta(p, prev).unwrap();
        assert_eq!(updated.as_u32(), 7);

        let under = Predicator::key_probe(REL_A, Modifier::Unsigned).dynamic_delta(ValueComparison::DynGte, -30);
        assert_eq!(update_value_from_delta(under, prev).unwrap().as_u32(), 0);
    }

    #[test]
    fn test_delta_type_mismatch() {
        let prev = Predicator::new(REL_A, Modifier::Float, 1.0f32);
        let p = Predicator::key_probe(REL_A, Modifier::Integer).dynamic_delta(ValueComparison::DynEqu, 1);
        assert_eq!(update_value_from_delta(p, prev), Err(DynamicTypeMismatch));
    }

    #[test]
    fn test_ratio_update_rounds() {
        let prev = Predicator::new(REL_A, Modifier::Integer, 10);
        let p = Predicator::key_probe(REL_A, Modifier::Integer).dynamic_ratio(ValueComparison::DynLte, 0.25);
        assert_eq!(update_value_from_ratio(p, prev).unwrap().as_i32(), 3);
    }

    #[test]
    fn test_dynamic_match() {
        let prev = int(10);
        let p = Predicator::key_probe(REL_A, Modifier::Integer).dynamic_delta(ValueComparison::DynGte, 5);
        assert!(dynamic_predicator_match(p, prev, int(15)));
        assert!(!dynamic_predicator_match(p, prev, int(14)));
        let other_mod = Predicator::new(REL_A, Modifier::Unsigned, 10u32);
        assert!(!dynamic_predicator_match(p, other_mod, int(15)));
    }

    proptest! {
        #[test]
        fn prop_full_wildcard_always_hits(bits in any::<u64>()) {
            prop_assert!(match_generic(Predicator::NONE, Predicator::from_bits(bits)));
        }

        #[test]
        fn prop_synthetic_target_always_hits(bits in any::<u64>(), v in any::<u32>()) {
            let target = Predicator::synthetic().with_value_bits(v);
            prop_assert!(match_generic(Predicator::from_bits(bits), target));
        }

        #[test]
        fn prop_ratio_saturates_signed(ratio in -1.0e12f32..1.0e12f32, base in any::<i32>()) {
            let prev = Predicator::new(REL_A, Modifier::Integer, base);
            let p = Predicator::key_probe(REL_A, Modifier::Integer).dynamic_ratio(ValueComparison::DynEqu, ratio);
            let got = update_value_from_ratio(p, prev).unwrap().as_i32() as f64;
            let exact = (ratio as f64 * base as f64).round();
            prop_assert_eq!(got, exact.clamp(i32::MIN as f64, i32::MAX as f64));
        }

        #[test]
        fn prop_ratio_saturates_unsigned(ratio in -1.0e12f32..1.0e12f32, base in any::<u32>()) {
            let prev = Predicator::new(REL_A, Modifier::Unsigned, base);
            let p = Predicator::key_probe(REL_A, Modifier::Unsigned).dynamic_ratio(ValueComparison::DynEqu, ratio);
            let got = update_value_from_ratio(p, prev).unwrap().as_u32() as f64;
            let exact = (ratio as f64 * base as f64).round();
            prop_assert_eq!(got, exact.clamp(0.0, u32::MAX as f64));
        }
    }
}
