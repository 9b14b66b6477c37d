use crate::atom_table::*;
use crate::machine::heap::*;
use crate::machine::machine_errors::*;
use crate::types::*;

use ordered_float::OrderedFloat;

use std::cmp::Ordering;

/// The result of evaluating an arithmetic expression. Integers are
/// machine words; leaving their range is an evaluation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Number {
    Integer(i64),
    Float(OrderedFloat<f64>),
}

impl Number {
    #[inline]
    pub fn to_term(self) -> Term {
        match self {
            Number::Integer(n) => Term::Integer(n),
            Number::Float(f) => Term::Float(f),
        }
    }

    #[inline]
    fn as_f64(self) -> f64 {
        match self {
            Number::Integer(n) => n as f64,
            Number::Float(OrderedFloat(f)) => f,
        }
    }
}

// mixed comparisons go through f64, the way `=:=` and friends compare
// an integer with a float.
pub fn compare(n1: Number, n2: Number) -> Ordering {
    match (n1, n2) {
        (Number::Integer(n1), Number::Integer(n2)) => n1.cmp(&n2),
        (n1, n2) => OrderedFloat(n1.as_f64()).cmp(&OrderedFloat(n2.as_f64())),
    }
}

#[inline]
fn float(f: f64) -> Result<Number, EvalError> {
    if f.is_nan() {
        Err(EvalError::Undefined)
    } else if f.is_infinite() {
        Err(EvalError::FloatOverflow)
    } else {
        Ok(Number::Float(OrderedFloat(f)))
    }
}

fn integer_operand(n: Number) -> Result<i64, EngineError> {
    match n {
        Number::Integer(n) => Ok(n),
        Number::Float(f) => Err(EngineError::type_error(ValidType::Integer, Term::Float(f))),
    }
}

pub(crate) fn add(lhs: Number, rhs: Number) -> Result<Number, EvalError> {
    match (lhs, rhs) {
        (Number::Integer(n1), Number::Integer(n2)) => n1
            .checked_add(n2)
            .map(Number::Integer)
            .ok_or(EvalError::IntOverflow),
        (n1, n2) => float(n1.as_f64() + n2.as_f64()),
    }
}

pub(crate) fn neg(n: Number) -> Result<Number, EvalError> {
    match n {
        Number::Integer(n) => n
            .checked_neg()
            .map(Number::Integer)
            .ok_or(EvalError::IntOverflow),
        Number::Float(OrderedFloat(f)) => Ok(Number::Float(OrderedFloat(-f))),
    }
}

#[inline]
pub(crate) fn sub(lhs: Number, rhs: Number) -> Result<Number, EvalError> {
    match (lhs, rhs) {
        (Number::Integer(n1), Number::Integer(n2)) => n1
            .checked_sub(n2)
            .map(Number::Integer)
            .ok_or(EvalError::IntOverflow),
        (n1, n2) => float(n1.as_f64() - n2.as_f64()),
    }
}

pub(crate) fn mul(lhs: Number, rhs: Number) -> Result<Number, EvalError> {
    match (lhs, rhs) {
        (Number::Integer(n1), Number::Integer(n2)) => n1
            .checked_mul(n2)
            .map(Number::Integer)
            .ok_or(EvalError::IntOverflow),
        (n1, n2) => float(n1.as_f64() * n2.as_f64()),
    }
}

/// `/`: exact integer quotients stay integers, anything else is a float.
pub(crate) fn div(lhs: Number, rhs: Number) -> Result<Number, EvalError> {
    match (lhs, rhs) {
        (_, Number::Integer(0)) => Err(EvalError::ZeroDivisor),
        (Number::Integer(n1), Number::Integer(n2)) => match n1.checked_rem(n2) {
            Some(0) => n1
                .checked_div(n2)
                .map(Number::Integer)
                .ok_or(EvalError::IntOverflow),
            Some(_) => float(n1 as f64 / n2 as f64),
            None => Err(EvalError::IntOverflow),
        },
        (_, n2) if n2.as_f64() == 0.0 => Err(EvalError::ZeroDivisor),
        (n1, n2) => float(n1.as_f64() / n2.as_f64()),
    }
}

/// `//`: integer division truncating toward zero.
pub(crate) fn idiv(lhs: Number, rhs: Number) -> Result<Number, EngineError> {
    let (n1, n2) = (integer_operand(lhs)?, integer_operand(rhs)?);

    if n2 == 0 {
        return Err(EvalError::ZeroDivisor.into());
    }

    n1.checked_div(n2)
        .map(Number::Integer)
        .ok_or_else(|| EvalError::IntOverflow.into())
}

/// `mod`: the result takes the sign of the divisor.
pub(crate) fn modulus(lhs: Number, rhs: Number) -> Result<Number, EngineError> {
    let (n1, n2) = (integer_operand(lhs)?, integer_operand(rhs)?);

    if n2 == 0 {
        return Err(EvalError::ZeroDivisor.into());
    }

    let rem = n1.checked_rem(n2).unwrap_or(0);

    if rem != 0 && (rem < 0) != (n2 < 0) {
        Ok(Number::Integer(rem + n2))
    } else {
        Ok(Number::Integer(rem))
    }
}

/// `rem`: the result takes the sign of the dividend.
pub(crate) fn remainder(lhs: Number, rhs: Number) -> Result<Number, EngineError> {
    let (n1, n2) = (integer_operand(lhs)?, integer_operand(rhs)?);

    if n2 == 0 {
        return Err(EvalError::ZeroDivisor.into());
    }

    Ok(Number::Integer(n1.checked_rem(n2).unwrap_or(0)))
}

pub(crate) fn min(n1: Number, n2: Number) -> Number {
    if compare(n2, n1) == Ordering::Less {
        n2
    } else {
        n1
    }
}

pub(crate) fn max(n1: Number, n2: Number) -> Number {
    if compare(n2, n1) == Ordering::Greater {
        n2
    } else {
        n1
    }
}

pub(crate) fn abs(n: Number) -> Result<Number, EvalError> {
    match n {
        Number::Integer(n) => n
            .checked_abs()
            .map(Number::Integer)
            .ok_or(EvalError::IntOverflow),
        Number::Float(OrderedFloat(f)) => Ok(Number::Float(OrderedFloat(f.abs()))),
    }
}

pub(crate) fn sign(n: Number) -> Number {
    match n {
        Number::Integer(n) => Number::Integer(n.signum()),
        Number::Float(OrderedFloat(f)) if f == 0.0 => Number::Float(OrderedFloat(0.0)),
        Number::Float(OrderedFloat(f)) => Number::Float(OrderedFloat(f.signum())),
    }
}

/// `^`: integer exponentiation for integers, float otherwise.
pub(crate) fn int_pow(base: Number, exp: Number) -> Result<Number, EngineError> {
    match (base, exp) {
        (Number::Integer(b), Number::Integer(e)) => {
            if e < 0 {
                return match b {
                    1 => Ok(Number::Integer(1)),
                    -1 => Ok(Number::Integer(if e % 2 == 0 { 1 } else { -1 })),
                    0 => Err(EvalError::ZeroDivisor.into()),
                    _ => Err(EngineError::type_error(ValidType::Integer, Term::Integer(e))),
                };
            }

            let e = u32::try_from(e).map_err(|_| EvalError::IntOverflow)?;

            b.checked_pow(e)
                .map(Number::Integer)
                .ok_or_else(|| EvalError::IntOverflow.into())
        }
        (b, e) => Ok(float(b.as_f64().powf(e.as_f64()))?),
    }
}

fn shift(lhs: Number, rhs: Number, left: bool) -> Result<Number, EngineError> {
    let (n1, n2) = (integer_operand(lhs)?, integer_operand(rhs)?);
    let n2 = u32::try_from(n2).unwrap_or(u32::MAX).min(63);

    if left {
        let result = n1 << n2;

        if result >> n2 != n1 {
            return Err(EvalError::IntOverflow.into());
        }

        Ok(Number::Integer(result))
    } else {
        Ok(Number::Integer(n1 >> n2))
    }
}

fn bitwise(lhs: Number, rhs: Number, op: fn(i64, i64) -> i64) -> Result<Number, EngineError> {
    Ok(Number::Integer(op(integer_operand(lhs)?, integer_operand(rhs)?)))
}

fn to_integer(n: Number, round: fn(f64) -> f64) -> Result<Number, EvalError> {
    match n {
        Number::Integer(_) => Ok(n),
        Number::Float(OrderedFloat(f)) => {
            let f = round(f);

            if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                Ok(Number::Integer(f as i64))
            } else {
                Err(EvalError::IntOverflow)
            }
        }
    }
}

fn evaluable_error(name: Atom, arity: usize) -> EngineError {
    EngineError::type_error(
        ValidType::Evaluable,
        Term::from_parts(
            atom!("/"),
            vec![Term::from_atom(name), Term::Integer(arity as i64)],
        ),
    )
}

fn eval_constant(name: Atom) -> Result<Number, EngineError> {
    match name.as_str() {
        "pi" => Ok(Number::Float(OrderedFloat(std::f64::consts::PI))),
        "e" => Ok(Number::Float(OrderedFloat(std::f64::consts::E))),
        "inf" | "infinite" => Ok(Number::Float(OrderedFloat(f64::INFINITY))),
        "epsilon" => Ok(Number::Float(OrderedFloat(f64::EPSILON))),
        "max_tagged_integer" => Ok(Number::Integer(i64::MAX)),
        "min_tagged_integer" => Ok(Number::Integer(i64::MIN)),
        _ => Err(evaluable_error(name, 0)),
    }
}

/// Evaluates an arithmetic expression under the current bindings.
pub fn eval(heap: &Heap, term: &Term) -> Result<Number, EngineError> {
    match heap.deref(term) {
        Term::Var(_) => Err(EngineError::Instantiation),
        Term::Integer(n) => Ok(Number::Integer(*n)),
        Term::Float(f) => Ok(Number::Float(*f)),
        Term::Atom(name) => eval_constant(*name),
        Term::List(cons) if heap.deref(cons.tail()) == &Term::EmptyList => {
            eval(heap, cons.head())
        }
        Term::Compound(c) => match c.args() {
            [arg] => eval_unary(c.name(), eval(heap, arg)?),
            [lhs, rhs] => eval_binary(c.name(), eval(heap, lhs)?, eval(heap, rhs)?),
            _ => Err(evaluable_error(c.name(), c.arity())),
        },
        culprit => Err(EngineError::type_error(ValidType::Evaluable, culprit.clone())),
    }
}

fn eval_unary(name: Atom, n: Number) -> Result<Number, EngineError> {
    let result = match name.as_str() {
        "-" => neg(n)?,
        "+" => n,
        "abs" => abs(n)?,
        "sign" => sign(n),
        "\\" => Number::Integer(!integer_operand(n)?),
        "float" => float(n.as_f64())?,
        "integer" => to_integer(n, f64::round)?,
        "truncate" => to_integer(n, f64::trunc)?,
        "floor" => to_integer(n, f64::floor)?,
        "ceiling" => to_integer(n, f64::ceil)?,
        "round" => to_integer(n, f64::round)?,
        "sqrt" if n.as_f64() < 0.0 => return Err(EvalError::Undefined.into()),
        "sqrt" => float(n.as_f64().sqrt())?,
        _ => return Err(evaluable_error(name, 1)),
    };

    Ok(result)
}

fn eval_binary(name: Atom, n1: Number, n2: Number) -> Result<Number, EngineError> {
    let result = match name.as_str() {
        "+" => add(n1, n2)?,
        "-" => sub(n1, n2)?,
        "*" => mul(n1, n2)?,
        "/" => div(n1, n2)?,
        "//" => idiv(n1, n2)?,
        "mod" => modulus(n1, n2)?,
        "rem" => remainder(n1, n2)?,
        "min" => min(n1, n2),
        "max" => max(n1, n2),
        "**" => float(n1.as_f64().powf(n2.as_f64()))?,
        "^" => int_pow(n1, n2)?,
        ">>" => shift(n1, n2, false)?,
        "<<" => shift(n1, n2, true)?,
        "/\\" => bitwise(n1, n2, |a, b| a & b)?,
        "\\/" => bitwise(n1, n2, |a, b| a | b)?,
        "xor" => bitwise(n1, n2, |a, b| a ^ b)?,
        _ => return Err(evaluable_error(name, 2)),
    };

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::read_term;

    fn eval_str(src: &str) -> Result<Number, EngineError> {
        let read = read_term(src).unwrap();
        let mut heap = Heap::new();
        for _ in 0..read.var_count {
            heap.fresh_var();
        }
        eval(&heap, &read.term)
    }

    #[test]
    fn integer_arithmetic() {
        assert_eq!(eval_str("1 + 2 * 3 - 4."), Ok(Number::Integer(3)));
        assert_eq!(eval_str("7 // -2."), Ok(Number::Integer(-3)));
        assert_eq!(eval_str("-7 mod 2."), Ok(Number::Integer(1)));
        assert_eq!(eval_str("-7 rem 2."), Ok(Number::Integer(-1)));
        assert_eq!(eval_str("max(3, 4.0)."), Ok(Number::Float(OrderedFloat(4.0))));
        assert_eq!(eval_str("abs(-3) + sign(-2)."), Ok(Number::Integer(2)));
        assert_eq!(eval_str("2 ^ 10."), Ok(Number::Integer(1024)));
    }

    #[test]
    fn division() {
        assert_eq!(eval_str("6 / 3."), Ok(Number::Integer(2)));
        assert_eq!(eval_str("7 / 2."), Ok(Number::Float(OrderedFloat(3.5))));
        assert_eq!(
            eval_str("1 / 0."),
            Err(EngineError::Evaluation(EvalError::ZeroDivisor))
        );
        assert_eq!(
            eval_str("1 mod 0."),
            Err(EngineError::Evaluation(EvalError::ZeroDivisor))
        );
    }

    #[test]
    fn overflow_is_checked() {
        assert_eq!(
            eval_str("9223372036854775807 + 1."),
            Err(EngineError::Evaluation(EvalError::IntOverflow))
        );
        assert_eq!(
            eval_str("2 ^ 64."),
            Err(EngineError::Evaluation(EvalError::IntOverflow))
        );
    }

    #[test]
    fn non_evaluables() {
        assert_eq!(eval_str("X + 1."), Err(EngineError::Instantiation));
        assert!(matches!(
            eval_str("foo + 1."),
            Err(EngineError::Type { expected: ValidType::Evaluable, .. })
        ));
        assert!(matches!(
            eval_str("2.0 // 1."),
            Err(EngineError::Type { expected: ValidType::Integer, .. })
        ));
    }

    #[test]
    fn mixed_comparison() {
        assert_eq!(
            compare(Number::Integer(1), Number::Float(OrderedFloat(1.0))),
            Ordering::Equal
        );
        assert_eq!(
            compare(Number::Integer(2), Number::Float(OrderedFloat(1.5))),
            Ordering::Greater
        );
    }
}
