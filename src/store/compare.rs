//! # Value Ordering
//!
//! Total order over extended values used by filters and sorts.
//!
//! Types are ranked first:
//! Null < numbers < String < Object < Array < ObjectId < Bool < DateTime.
//! `Int64` and `Float64` share a rank and compare numerically; NaN sorts
//! below every other number.

use std::cmp::Ordering;

use crate::codec::ExtendedValue;

/// Rank of a value's type in the cross-type order
pub fn type_rank(value: &ExtendedValue) -> u8 {
    match value {
        ExtendedValue::Null => 1,
        ExtendedValue::Int64(_) | ExtendedValue::Float64(_) => 2,
        ExtendedValue::String(_) => 3,
        ExtendedValue::Object(_) => 4,
        ExtendedValue::Array(_) => 5,
        ExtendedValue::ObjectId(_) => 7,
        ExtendedValue::Bool(_) => 8,
        ExtendedValue::DateTime(_) => 9,
    }
}

/// Compare two values
pub fn compare_values(a: &ExtendedValue, b: &ExtendedValue) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (ExtendedValue::Int64(x), ExtendedValue::Int64(y)) => x.cmp(y),
        (ExtendedValue::String(x), ExtendedValue::String(y)) => x.cmp(y),
        (ExtendedValue::ObjectId(x), ExtendedValue::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (ExtendedValue::Bool(x), ExtendedValue::Bool(y)) => x.cmp(y),
        (ExtendedValue::DateTime(x), ExtendedValue::DateTime(y)) => x.cmp(y),
        (ExtendedValue::Array(x), ExtendedValue::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ord = compare_values(left, right);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (ExtendedValue::Object(x), ExtendedValue::Object(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y.iter()) {
                let ord = lk.cmp(rk).then_with(|| compare_values(lv, rv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => compare_numbers(x, y),
            _ => Ordering::Equal,
        },
    }
}

/// Equality as filters see it: numeric types compare by value
pub fn values_equal(a: &ExtendedValue, b: &ExtendedValue) -> bool {
    match (a, b) {
        (ExtendedValue::Object(x), ExtendedValue::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .zip(y.iter())
                    .all(|((lk, lv), (rk, rv))| lk == rk && values_equal(lv, rv))
        }
        _ => compare_values(a, b) == Ordering::Equal,
    }
}

fn compare_numbers(x: f64, y: f64) -> Ordering {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}
