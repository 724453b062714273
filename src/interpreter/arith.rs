//! The numeric tower.
//!
//! Operands are widened pairwise to the narrowest common variant, ordered
//! `Int < BigInt < Float < BigFloat`, with two exceptions: `UInt` only meets
//! `UInt` (or a `BigFloat`), and `BigInt` with `Float` meets in `BigFloat`.
//! Signed integer overflow widens to `BigInt`; unsigned arithmetic wraps.

use crate::error::ErrorKind;
use crate::interpreter::error::ErrorObject;
use crate::interpreter::Object;
use crate::lexer::TokenKind;

use std::cmp::Ordering;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{FromPrimitive, One, Signed, ToPrimitive, Zero};

type Result<T> = std::result::Result<T, ErrorObject>;

#[derive(Debug, Clone)]
enum Number {
    Int(i64),
    UInt(u64),
    Big(BigInt),
    Float(f64),
    Decimal(BigDecimal),
}

impl Number {
    fn from_object(obj: &Object) -> Option<Number> {
        match obj {
            Object::Integer(n) => Some(Number::Int(*n)),
            Object::UInteger(n) => Some(Number::UInt(*n)),
            Object::BigInteger(n) => Some(Number::Big((**n).clone())),
            Object::Float(x) => Some(Number::Float(*x)),
            Object::BigFloat(x) => Some(Number::Decimal((**x).clone())),
            _ => None,
        }
    }

    fn into_object(self) -> Object {
        match self {
            Number::Int(n) => Object::Integer(n),
            Number::UInt(n) => Object::UInteger(n),
            Number::Big(n) => Object::big_integer(n),
            Number::Float(x) => Object::Float(x),
            Number::Decimal(x) => Object::big_float(x),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Number::Int(_) => 0,
            Number::UInt(_) => 1,
            Number::Big(_) => 2,
            Number::Float(_) => 3,
            Number::Decimal(_) => 4,
        }
    }

    fn to_big(&self) -> Option<BigInt> {
        match self {
            Number::Int(n) => Some(BigInt::from(*n)),
            Number::UInt(n) => Some(BigInt::from(*n)),
            Number::Big(n) => Some(n.clone()),
            _ => None,
        }
    }

    fn to_float(&self) -> f64 {
        match self {
            Number::Int(n) => *n as f64,
            Number::UInt(n) => *n as f64,
            Number::Big(n) => n.to_f64().unwrap_or(f64::NAN),
            Number::Float(x) => *x,
            Number::Decimal(x) => x.to_f64().unwrap_or(f64::NAN),
        }
    }

    fn to_decimal(&self) -> Result<BigDecimal> {
        match self {
            Number::Int(n) => Ok(BigDecimal::from(*n)),
            Number::UInt(n) => Ok(BigDecimal::from(*n)),
            Number::Big(n) => Ok(BigDecimal::new(n.clone(), 0)),
            Number::Float(x) => BigDecimal::from_f64(*x).ok_or_else(|| {
                ErrorObject::new(
                    ErrorKind::Arithmetic,
                    format!("cannot convert {} to a big float", x),
                )
            }),
            Number::Decimal(x) => Ok(x.clone()),
        }
    }
}

// Widens both operands to one variant. `strict` rejects mixing unsigned
// with signed operands, which is allowed only for comparisons.
fn promote(left: Number, right: Number, strict: bool) -> Result<(Number, Number)> {
    use Number::*;

    let pair = match (left, right) {
        (Decimal(a), b) => {
            let b = b.to_decimal()?;
            (Decimal(a), Decimal(b))
        }
        (a, Decimal(b)) => (Decimal(a.to_decimal()?), Decimal(b)),
        (UInt(a), UInt(b)) => (UInt(a), UInt(b)),
        (a @ UInt(_), b) | (a, b @ UInt(_)) if strict => {
            return Err(ErrorObject::type_mismatch(format!(
                "cannot mix {} and {} operands",
                name(&a),
                name(&b)
            )));
        }
        (Big(a), Float(b)) => (Decimal(BigDecimal::new(a, 0)), Decimal(Float(b).to_decimal()?)),
        (Float(a), Big(b)) => (Decimal(Float(a).to_decimal()?), Decimal(BigDecimal::new(b, 0))),
        (a, b) if a.rank() == b.rank() => (a, b),
        (a, b) if a.rank().max(b.rank()) == 3 => (Float(a.to_float()), Float(b.to_float())),
        (a, b) => match (a.to_big(), b.to_big()) {
            (Some(x), Some(y)) => (Big(x), Big(y)),
            _ => {
                return Err(ErrorObject::type_mismatch(format!(
                    "cannot combine {} and {}",
                    name(&a),
                    name(&b)
                )))
            }
        },
    };

    Ok(pair)
}

fn name(number: &Number) -> &'static str {
    match number {
        Number::Int(_) => "INTEGER",
        Number::UInt(_) => "UINTEGER",
        Number::Big(_) => "BIG_INTEGER",
        Number::Float(_) => "FLOAT",
        Number::Decimal(_) => "BIG_FLOAT",
    }
}

pub fn is_number(obj: &Object) -> bool {
    Number::from_object(obj).is_some()
}

/// Applies an arithmetic or bitwise operator to two numbers. Returns `None`
/// when either operand is not numeric.
pub fn binary(left: &Object, operator: TokenKind, right: &Object) -> Option<Object> {
    let left = Number::from_object(left)?;
    let right = Number::from_object(right)?;

    let result = promote(left, right, true).and_then(|pair| match pair {
        (Number::Int(a), Number::Int(b)) => int_op(a, operator, b),
        (Number::UInt(a), Number::UInt(b)) => uint_op(a, operator, b),
        (Number::Big(a), Number::Big(b)) => big_op(a, operator, b),
        (Number::Float(a), Number::Float(b)) => float_op(a, operator, b),
        (Number::Decimal(a), Number::Decimal(b)) => decimal_op(a, operator, b),
        (a, b) => Err(ErrorObject::type_mismatch(format!(
            "{} {} {}",
            name(&a),
            operator,
            name(&b)
        ))),
    });

    Some(result.map_or_else(Object::error, Number::into_object))
}

fn unsupported<T>(operator: TokenKind, kind: &str) -> Result<T> {
    Err(ErrorObject::type_mismatch(format!(
        "{} {} {}",
        kind, operator, kind
    )))
}

fn int_op(a: i64, operator: TokenKind, b: i64) -> Result<Number> {
    let widened = || big_op(BigInt::from(a), operator, BigInt::from(b));

    let checked = match operator {
        TokenKind::Plus => a.checked_add(b),
        TokenKind::Minus => a.checked_sub(b),
        TokenKind::Asterisk => a.checked_mul(b),
        TokenKind::Slash => {
            if b == 0 {
                return Err(ErrorObject::division_by_zero());
            }
            a.checked_div(b)
        }
        TokenKind::SlashSlash => {
            if b == 0 {
                return Err(ErrorObject::division_by_zero());
            }
            if a == i64::MIN && b == -1 {
                None
            } else {
                Some(a.div_floor(&b))
            }
        }
        TokenKind::Percent => {
            if b == 0 {
                return Err(ErrorObject::division_by_zero());
            }
            if a < 0 || b < 0 {
                return widened();
            }
            Some(a % b)
        }
        TokenKind::Power => {
            if b < 0 {
                return Ok(Number::Float((a as f64).powf(b as f64)));
            }
            u32::try_from(b).ok().and_then(|b| a.checked_pow(b))
        }
        TokenKind::Ampersand => Some(a & b),
        TokenKind::Pipe => Some(a | b),
        TokenKind::Caret => Some(a ^ b),
        TokenKind::Shl => {
            let shift = shift_amount(b)?;
            if shift < 64 && (a << shift) >> shift == a {
                Some(a << shift)
            } else {
                None
            }
        }
        TokenKind::Shr => Some(a >> shift_amount(b)?.min(63)),
        _ => return unsupported(operator, "INTEGER"),
    };

    match checked {
        Some(n) => Ok(Number::Int(n)),
        None => widened(),
    }
}

fn shift_amount(b: i64) -> Result<usize> {
    usize::try_from(b).map_err(|_| {
        ErrorObject::new(ErrorKind::Arithmetic, format!("negative shift amount {}", b))
    })
}

fn uint_op(a: u64, operator: TokenKind, b: u64) -> Result<Number> {
    let n = match operator {
        TokenKind::Plus => a.wrapping_add(b),
        TokenKind::Minus => a.wrapping_sub(b),
        TokenKind::Asterisk => a.wrapping_mul(b),
        TokenKind::Slash | TokenKind::SlashSlash => {
            if b == 0 {
                return Err(ErrorObject::division_by_zero());
            }
            a / b
        }
        TokenKind::Percent => {
            if b == 0 {
                return Err(ErrorObject::division_by_zero());
            }
            a % b
        }
        TokenKind::Power => a.wrapping_pow(u32::try_from(b).unwrap_or(u32::MAX)),
        TokenKind::Ampersand => a & b,
        TokenKind::Pipe => a | b,
        TokenKind::Caret => a ^ b,
        TokenKind::Shl => u32::try_from(b)
            .ok()
            .and_then(|b| a.checked_shl(b))
            .unwrap_or(0),
        TokenKind::Shr => u32::try_from(b)
            .ok()
            .and_then(|b| a.checked_shr(b))
            .unwrap_or(0),
        _ => return unsupported(operator, "UINTEGER"),
    };

    Ok(Number::UInt(n))
}

fn big_op(a: BigInt, operator: TokenKind, b: BigInt) -> Result<Number> {
    let n = match operator {
        TokenKind::Plus => a + b,
        TokenKind::Minus => a - b,
        TokenKind::Asterisk => a * b,
        TokenKind::Slash => {
            if b.is_zero() {
                return Err(ErrorObject::division_by_zero());
            }
            a / b
        }
        TokenKind::SlashSlash => {
            if b.is_zero() {
                return Err(ErrorObject::division_by_zero());
            }
            a.div_floor(&b)
        }
        TokenKind::Percent => {
            if b.is_zero() {
                return Err(ErrorObject::division_by_zero());
            }
            // euclidean: the result is never negative
            let r = a % &b;
            if r.is_negative() {
                r + b.abs()
            } else {
                r
            }
        }
        TokenKind::Power => {
            if b.is_negative() {
                let base = a.to_f64().unwrap_or(f64::NAN);
                let exp = b.to_f64().unwrap_or(f64::NAN);
                return Ok(Number::Float(base.powf(exp)));
            }
            let exp = b.to_u32().ok_or_else(|| {
                ErrorObject::new(ErrorKind::Arithmetic, format!("exponent {} is too large", b))
            })?;
            a.pow(exp)
        }
        TokenKind::Ampersand => a & b,
        TokenKind::Pipe => a | b,
        TokenKind::Caret => a ^ b,
        TokenKind::Shl | TokenKind::Shr => {
            let shift = b
                .to_i64()
                .ok_or_else(|| ErrorObject::new(ErrorKind::Arithmetic, "shift amount too large"))
                .and_then(shift_amount)?;
            if operator == TokenKind::Shl {
                a << shift
            } else {
                a >> shift
            }
        }
        _ => return unsupported(operator, "BIG_INTEGER"),
    };

    Ok(Number::Big(n))
}

fn float_op(a: f64, operator: TokenKind, b: f64) -> Result<Number> {
    let x = match operator {
        TokenKind::Plus => a + b,
        TokenKind::Minus => a - b,
        TokenKind::Asterisk => a * b,
        TokenKind::Slash | TokenKind::SlashSlash | TokenKind::Percent if b == 0.0 => {
            return Err(ErrorObject::division_by_zero());
        }
        TokenKind::Slash => a / b,
        TokenKind::SlashSlash => (a / b).floor(),
        TokenKind::Percent => a % b,
        TokenKind::Power => a.powf(b),
        _ => return unsupported(operator, "FLOAT"),
    };

    Ok(Number::Float(x))
}

fn decimal_op(a: BigDecimal, operator: TokenKind, b: BigDecimal) -> Result<Number> {
    let x = match operator {
        TokenKind::Plus => a + b,
        TokenKind::Minus => a - b,
        TokenKind::Asterisk => a * b,
        TokenKind::Slash | TokenKind::SlashSlash | TokenKind::Percent if b.is_zero() => {
            return Err(ErrorObject::division_by_zero());
        }
        TokenKind::Slash => a / b,
        TokenKind::SlashSlash => {
            let truncated = (&a / &b).with_scale(0);
            if &truncated * &b != a && (a.is_negative() != b.is_negative()) {
                truncated - BigDecimal::from(1)
            } else {
                truncated
            }
        }
        TokenKind::Percent => a % b,
        TokenKind::Power => decimal_pow(a, b)?,
        _ => return unsupported(operator, "BIG_FLOAT"),
    };

    Ok(Number::Decimal(x))
}

fn decimal_pow(base: BigDecimal, exp: BigDecimal) -> Result<BigDecimal> {
    if !exp.is_integer() {
        let x = base.to_f64().unwrap_or(f64::NAN).powf(exp.to_f64().unwrap_or(f64::NAN));
        return Number::Float(x).to_decimal();
    }

    let n = exp
        .to_i64()
        .and_then(|n| u32::try_from(n.unsigned_abs()).ok())
        .ok_or_else(|| ErrorObject::new(ErrorKind::Arithmetic, "exponent is too large"))?;

    let mut result = BigDecimal::from(1);
    for _ in 0..n {
        result = result * &base;
    }

    if exp.is_negative() {
        if result.is_zero() {
            return Err(ErrorObject::division_by_zero());
        }
        result = BigDecimal::from(1) / result;
    }

    Ok(result)
}

pub fn negate(obj: &Object) -> Option<Object> {
    let result = match Number::from_object(obj)? {
        Number::Int(n) => match n.checked_neg() {
            Some(n) => Number::Int(n),
            None => Number::Big(-BigInt::from(n)),
        },
        Number::UInt(n) => Number::UInt(n.wrapping_neg()),
        Number::Big(n) => Number::Big(-n),
        Number::Float(x) => Number::Float(-x),
        Number::Decimal(x) => Number::Decimal(-x),
    };

    Some(result.into_object())
}

/// Bitwise complement; `0xFFFF_FFFF_FFFF_FFFF ^ n` for unsigned values.
pub fn complement(obj: &Object) -> Option<Object> {
    let result = match Number::from_object(obj)? {
        Number::Int(n) => Number::Int(!n),
        Number::UInt(n) => Number::UInt(u64::MAX ^ n),
        Number::Big(n) => Number::Big(-(n + BigInt::one())),
        _ => return None,
    };

    Some(result.into_object())
}

/// Orders two numbers after promotion; `None` for non-numbers and NaN.
pub fn compare(left: &Object, right: &Object) -> Option<Ordering> {
    let left = Number::from_object(left)?;
    let right = Number::from_object(right)?;

    match promote(left, right, false).ok()? {
        (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
        (Number::UInt(a), Number::UInt(b)) => Some(a.cmp(&b)),
        (Number::Big(a), Number::Big(b)) => Some(a.cmp(&b)),
        (Number::Float(a), Number::Float(b)) => a.partial_cmp(&b),
        (Number::Decimal(a), Number::Decimal(b)) => Some(a.cmp(&b)),
        _ => None,
    }
}

/// Language-level `==`: numbers compare by promoted value, everything else
/// by structural hash.
pub fn equals(left: &Object, right: &Object) -> bool {
    if is_number(left) && is_number(right) {
        return compare(left, right) == Some(Ordering::Equal);
    }
    left.hash_key() == right.hash_key()
}

pub fn to_i64(obj: &Object) -> Option<i64> {
    match obj {
        Object::Integer(n) => Some(*n),
        Object::UInteger(n) => i64::try_from(*n).ok(),
        Object::BigInteger(n) => n.to_i64(),
        _ => None,
    }
}

pub fn to_f64(obj: &Object) -> Option<f64> {
    Number::from_object(obj).map(|number| number.to_float())
}

pub fn to_big(obj: &Object) -> Option<BigInt> {
    Number::from_object(obj).and_then(|number| match number {
        Number::Float(x) => BigInt::from_f64(x.trunc()),
        Number::Decimal(x) => Some(x.with_scale(0).as_bigint_and_exponent().0),
        number => number.to_big(),
    })
}

pub fn to_decimal(obj: &Object) -> Option<BigDecimal> {
    Number::from_object(obj).and_then(|number| number.to_decimal().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::str::FromStr;

    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn big(text: &str) -> Object {
        Object::big_integer(BigInt::from_str(text).unwrap())
    }

    #[test_case(Object::Integer(7), TokenKind::Slash, Object::Integer(2), Object::Integer(3) ; "truncating division")]
    #[test_case(Object::Integer(2), TokenKind::Slash, Object::Integer(7), Object::Integer(0) ; "small dividend")]
    #[test_case(Object::Integer(-7), TokenKind::SlashSlash, Object::Integer(2), Object::Integer(-4) ; "floor division")]
    #[test_case(Object::Integer(-7), TokenKind::Percent, Object::Integer(3), big("2") ; "negative modulus widens")]
    #[test_case(Object::Integer(i64::MAX), TokenKind::Plus, Object::Integer(1), big("9223372036854775808") ; "add overflow")]
    #[test_case(Object::Integer(i64::MIN), TokenKind::Minus, Object::Integer(1), big("-9223372036854775809") ; "sub overflow")]
    #[test_case(Object::Integer(2), TokenKind::Power, Object::Integer(64), big("18446744073709551616") ; "pow overflow")]
    #[test_case(Object::Integer(2), TokenKind::Power, Object::Integer(-1), Object::Float(0.5) ; "negative exponent")]
    #[test_case(Object::Integer(1), TokenKind::Plus, Object::Float(0.5), Object::Float(1.5) ; "int float")]
    #[test_case(Object::UInteger(0), TokenKind::Minus, Object::UInteger(1), Object::UInteger(u64::MAX) ; "unsigned wraps")]
    #[test_case(Object::Integer(1), TokenKind::Shl, Object::Integer(63), big("9223372036854775808") ; "shift overflow")]
    #[test_case(Object::Integer(6), TokenKind::Ampersand, Object::Integer(3), Object::Integer(2) ; "bitwise and")]
    fn arithmetic(left: Object, operator: TokenKind, right: Object, expected: Object) {
        assert_eq!(binary(&left, operator, &right), Some(expected))
    }

    #[test]
    fn big_float_widens() {
        let x = Object::big_float(BigDecimal::from_str("1.5").unwrap());
        assert_eq!(
            binary(&x, TokenKind::Plus, &Object::Integer(1)),
            Some(Object::big_float(BigDecimal::from_str("2.5").unwrap()))
        );
        assert_eq!(
            binary(&big("10"), TokenKind::Asterisk, &Object::Float(0.5)),
            Some(Object::big_float(BigDecimal::from_str("5").unwrap()))
        );
    }

    #[test_case(TokenKind::Slash ; "division")]
    #[test_case(TokenKind::SlashSlash ; "floor division")]
    #[test_case(TokenKind::Percent ; "modulus")]
    fn division_by_zero(operator: TokenKind) {
        match binary(&Object::Integer(1), operator, &Object::Integer(0)) {
            Some(Object::Error(error)) => assert_eq!(error.message, "Division by zero"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unsigned_does_not_mix_with_signed() {
        assert!(matches!(
            binary(&Object::UInteger(1), TokenKind::Plus, &Object::Integer(1)),
            Some(Object::Error(_))
        ));
        assert!(equals(&Object::UInteger(1), &Object::Integer(1)));
    }

    #[test_case(Object::UInteger(0), Object::UInteger(u64::MAX) ; "unsigned")]
    #[test_case(Object::Integer(0), Object::Integer(-1) ; "signed")]
    #[test_case(big("5"), big("-6") ; "big")]
    #[test_case(big("-9223372036854775809"), big("9223372036854775808") ; "big beyond machine range")]
    fn complements(value: Object, expected: Object) {
        assert_eq!(complement(&value), Some(expected))
    }

    #[test]
    fn equality_across_the_tower() {
        assert!(equals(&Object::Integer(1), &Object::Float(1.0)));
        assert!(equals(&big("3"), &Object::Integer(3)));
        assert!(!equals(&Object::Integer(1), &Object::string("1")));
        assert_eq!(
            compare(&Object::Integer(2), &Object::Float(2.5)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn overflow_matches_bignum() {
        let values = [i64::MIN, -3037000500, -1, 0, 1, 3037000500, i64::MAX];
        for a in values {
            for b in values {
                for (operator, expected) in [
                    (TokenKind::Plus, BigInt::from(a) + BigInt::from(b)),
                    (TokenKind::Minus, BigInt::from(a) - BigInt::from(b)),
                    (TokenKind::Asterisk, BigInt::from(a) * BigInt::from(b)),
                ] {
                    let result = binary(&Object::Integer(a), operator, &Object::Integer(b));
                    assert_eq!(result.as_ref().and_then(to_big), Some(expected));
                }
            }
        }
    }
}
