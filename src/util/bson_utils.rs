use bson::spec::BinarySubtype;
use bson::Bson;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// Total order over BSON values following the MongoDB comparison rules:
///
/// 1. Values of different kinds compare by type rank
///    (MinKey < Null < numbers < strings < documents < arrays < binary
///     < object ids < booleans < dates < timestamps < regexes < MaxKey).
/// 2. Values of the same kind compare by value; the numeric family compares
///    across `Int32`/`Int64`/`Double`.
///
/// Deprecated BSON variants (`Undefined`, `Symbol`, `DBPointer`, ...) are not
/// supported.
pub fn cmp_bson(a: &Bson, b: &Bson) -> Ordering {
    use Bson::*;

    fn rank(v: &Bson) -> u8 {
        match v {
            MinKey => 0,
            Null => 1,
            Double(_) | Int32(_) | Int64(_) | Decimal128(_) => 2,
            String(_) => 3,
            Document(_) => 4,
            Array(_) => 5,
            Binary(_) => 6,
            ObjectId(_) => 7,
            Boolean(_) => 8,
            DateTime(_) => 9,
            Timestamp(_) => 10,
            RegularExpression(_) => 11,
            MaxKey => 12,
            _ => panic!(
                "Unsupported BSON type for comparison: {:?}. Use only supported types.",
                v
            ),
        }
    }

    let (ra, rb) = (rank(a), rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }

    match (a, b) {
        // numeric family
        (Double(x), Double(y)) => x.partial_cmp(y).unwrap_or(Ordering::Greater),
        (Int32(x), Int32(y)) => x.cmp(y),
        (Int64(x), Int64(y)) => x.cmp(y),
        (Decimal128(x), Decimal128(y)) => x.to_string().cmp(&y.to_string()),

        // cross-numeric
        (Int32(x), Double(y)) => (*x as f64).partial_cmp(y).unwrap_or(Ordering::Less),
        (Int64(x), Double(y)) => (*x as f64).partial_cmp(y).unwrap_or(Ordering::Less),
        (Double(x), Int32(y)) => x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Greater),
        (Double(x), Int64(y)) => x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Greater),
        (Int32(x), Int64(y)) => (*x as i64).cmp(y),
        (Int64(x), Int32(y)) => x.cmp(&(*y as i64)),

        // simple scalars
        (String(x), String(y)) => x.cmp(y),
        (Boolean(x), Boolean(y)) => x.cmp(y),
        (DateTime(x), DateTime(y)) => x.cmp(y),
        (ObjectId(x), ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Timestamp(x), Timestamp(y)) => (x.time, x.increment).cmp(&(y.time, y.increment)),

        (Binary(x), Binary(y)) => match subtype_code(x.subtype).cmp(&subtype_code(y.subtype)) {
            Ordering::Equal => x.bytes.cmp(&y.bytes),
            other => other,
        },

        (RegularExpression(x), RegularExpression(y)) => match x.pattern.cmp(&y.pattern) {
            Ordering::Equal => x.options.cmp(&y.options),
            other => other,
        },

        // compound types: element-wise, then by length
        (Array(av), Array(bv)) => {
            for (ai, bi) in av.iter().zip(bv.iter()) {
                let ord = cmp_bson(ai, bi);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            av.len().cmp(&bv.len())
        }
        (Document(ad), Document(bd)) => {
            for ((ak, av), (bk, bv)) in ad.iter().zip(bd.iter()) {
                match ak.cmp(bk) {
                    Ordering::Equal => {
                        let ord = cmp_bson(av, bv);
                        if ord != Ordering::Equal {
                            return ord;
                        }
                    }
                    other => return other,
                }
            }
            ad.len().cmp(&bd.len())
        }

        // identical MinKey / MaxKey / Null
        _ => Ordering::Equal,
    }
}

pub fn bson_eq(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        // MongoDB equality: NaN == NaN
        (Bson::Double(x), Bson::Double(y)) if x.is_nan() && y.is_nan() => true,
        (Bson::Int32(x), Bson::Int32(y)) => x == y,
        (Bson::Int64(x), Bson::Int64(y)) => x == y,
        (Bson::Double(x), Bson::Double(y)) => x == y,

        // normalized mixed numeric comparisons
        (Bson::Int32(x), Bson::Int64(y)) => *x as i64 == *y,
        (Bson::Int32(x), Bson::Double(y)) => *x as f64 == *y,
        (Bson::Int64(x), Bson::Double(y)) => *x as f64 == *y,
        (Bson::Int64(x), Bson::Int32(y)) => *x == *y as i64,
        (Bson::Double(x), Bson::Int32(y)) => *x == *y as f64,
        (Bson::Double(x), Bson::Int64(y)) => *x == *y as f64,

        // documents compare field-order independent
        (Bson::Document(a), Bson::Document(b)) => {
            let a_sorted: BTreeMap<_, _> = a.iter().collect();
            let b_sorted: BTreeMap<_, _> = b.iter().collect();
            a_sorted.len() == b_sorted.len()
                && a_sorted
                    .iter()
                    .zip(b_sorted.iter())
                    .all(|((ak, av), (bk, bv))| ak == bk && bson_eq(av, bv))
        }

        (Bson::Array(a), Bson::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| bson_eq(x, y))
        }

        (Bson::RegularExpression(a), Bson::RegularExpression(b)) => {
            a.pattern == b.pattern && a.options == b.options
        }

        _ => a == b,
    }
}

pub fn bson_hash<H: Hasher>(bson: &Bson, state: &mut H) {
    match bson {
        Bson::Int32(x) => x.hash(state),
        Bson::Int64(x) => x.hash(state),
        Bson::Double(x) => {
            // Normalize NaN to a fixed bit pattern.
            if x.is_nan() {
                0x7FF8_0000_0000_0000u64.hash(state)
            } else {
                x.to_bits().hash(state)
            }
        }
        Bson::String(s) => s.hash(state),
        Bson::Boolean(b) => b.hash(state),

        Bson::Array(arr) => {
            for elem in arr {
                bson_hash(elem, state);
            }
        }

        // documents hash in sorted field order to match bson_eq
        Bson::Document(doc) => {
            let sorted: BTreeMap<_, _> = doc.iter().collect();
            for (key, value) in sorted {
                key.hash(state);
                bson_hash(value, state);
            }
        }

        Bson::RegularExpression(regex) => {
            regex.pattern.hash(state);
            regex.options.hash(state);
        }

        _ => (),
    }
}

fn subtype_code(s: BinarySubtype) -> u8 {
    s.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::bson;

    #[test]
    fn test_type_rank_ordering() {
        assert_eq!(cmp_bson(&Bson::MinKey, &bson!(5)), Ordering::Less);
        assert_eq!(cmp_bson(&bson!(5), &bson!("5")), Ordering::Less);
        assert_eq!(cmp_bson(&Bson::MaxKey, &bson!("zzz")), Ordering::Greater);
        assert_eq!(cmp_bson(&Bson::Null, &bson!(0)), Ordering::Less);
    }

    #[test]
    fn test_cross_numeric_comparison() {
        assert_eq!(cmp_bson(&bson!(5), &bson!(5.0)), Ordering::Equal);
        assert_eq!(cmp_bson(&bson!(5_i64), &bson!(6)), Ordering::Less);
        assert_eq!(cmp_bson(&bson!(7.5), &bson!(7_i64)), Ordering::Greater);
    }

    #[test]
    fn test_eq_ignores_document_field_order() {
        let a = bson!({ "x": 1, "y": 2 });
        let b = bson!({ "y": 2, "x": 1 });
        assert!(bson_eq(&a, &b));
        assert!(!bson_eq(&a, &bson!({ "x": 1, "y": 3 })));
    }

    #[test]
    fn test_nan_equality() {
        assert!(bson_eq(&bson!(f64::NAN), &bson!(f64::NAN)));
        assert!(!bson_eq(&bson!(1.0), &bson!(f64::NAN)));
    }

    #[test]
    fn test_array_ordering_is_elementwise() {
        let shorter = bson!([1, 2]);
        let longer = bson!([1, 2, 3]);
        assert_eq!(cmp_bson(&shorter, &longer), Ordering::Less);
        assert_eq!(cmp_bson(&bson!([2]), &bson!([1, 9])), Ordering::Greater);
    }
}
