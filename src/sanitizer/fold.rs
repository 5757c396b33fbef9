//! Constant folding over literal operands
//!
//! Folding never changes what a program computes: integer operations that
//! would overflow or divide by zero, and float operations with a non-finite
//! result, are left in the tree.

use crate::ast::{BinaryOp, ExpressionType, Literal, PrimitiveType, UnaryOp};

pub fn fold_binary(op: BinaryOp, lhs: Literal, rhs: Literal) -> Option<Literal> {
    match (lhs, rhs) {
        (Literal::I32(a), Literal::I32(b)) => match op {
            BinaryOp::Add => a.checked_add(b).map(Literal::I32),
            BinaryOp::Subtract => a.checked_sub(b).map(Literal::I32),
            BinaryOp::Multiply => a.checked_mul(b).map(Literal::I32),
            BinaryOp::Divide => a.checked_div(b).map(Literal::I32),
            _ => compare(op, a, b),
        },
        (Literal::U32(a), Literal::U32(b)) => match op {
            BinaryOp::Add => a.checked_add(b).map(Literal::U32),
            BinaryOp::Subtract => a.checked_sub(b).map(Literal::U32),
            BinaryOp::Multiply => a.checked_mul(b).map(Literal::U32),
            BinaryOp::Divide => a.checked_div(b).map(Literal::U32),
            _ => compare(op, a, b),
        },
        (Literal::F32(a), Literal::F32(b)) => {
            let value = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Subtract => a - b,
                BinaryOp::Multiply => a * b,
                BinaryOp::Divide if b != 0.0 => a / b,
                BinaryOp::Divide => return None,
                _ => return compare(op, a, b),
            };
            value.is_finite().then_some(Literal::F32(value))
        }
        (Literal::Bool(a), Literal::Bool(b)) => match op {
            BinaryOp::LogicalAnd => Some(Literal::Bool(a && b)),
            BinaryOp::LogicalOr => Some(Literal::Bool(a || b)),
            BinaryOp::CompEq => Some(Literal::Bool(a == b)),
            BinaryOp::CompNe => Some(Literal::Bool(a != b)),
            _ => None,
        },
        _ => None,
    }
}

fn compare<T: PartialOrd>(op: BinaryOp, a: T, b: T) -> Option<Literal> {
    let result = match op {
        BinaryOp::CompEq => a == b,
        BinaryOp::CompNe => a != b,
        BinaryOp::CompLt => a < b,
        BinaryOp::CompLe => a <= b,
        BinaryOp::CompGt => a > b,
        BinaryOp::CompGe => a >= b,
        _ => return None,
    };
    Some(Literal::Bool(result))
}

pub fn fold_unary(op: UnaryOp, operand: Literal) -> Option<Literal> {
    match (op, operand) {
        (UnaryOp::Minus, Literal::I32(v)) => v.checked_neg().map(Literal::I32),
        (UnaryOp::Minus, Literal::F32(v)) => Some(Literal::F32(-v)),
        (UnaryOp::LogicalNot, Literal::Bool(v)) => Some(Literal::Bool(!v)),
        _ => None,
    }
}

/// Fold a scalar conversion of a literal when the value is representable
pub fn fold_cast(target: &ExpressionType, value: Literal) -> Option<Literal> {
    let ExpressionType::Primitive(target) = target else {
        return None;
    };
    match (*target, value) {
        (PrimitiveType::F32, Literal::F32(v)) => Some(Literal::F32(v)),
        (PrimitiveType::F32, Literal::I32(v)) => Some(Literal::F32(v as f32)),
        (PrimitiveType::F32, Literal::U32(v)) => Some(Literal::F32(v as f32)),
        (PrimitiveType::I32, Literal::I32(v)) => Some(Literal::I32(v)),
        (PrimitiveType::I32, Literal::U32(v)) => i32::try_from(v).ok().map(Literal::I32),
        (PrimitiveType::I32, Literal::F32(v)) => float_to_int(v)
            .and_then(|v| i32::try_from(v).ok())
            .map(Literal::I32),
        (PrimitiveType::U32, Literal::U32(v)) => Some(Literal::U32(v)),
        (PrimitiveType::U32, Literal::I32(v)) => u32::try_from(v).ok().map(Literal::U32),
        (PrimitiveType::U32, Literal::F32(v)) => float_to_int(v)
            .and_then(|v| u32::try_from(v).ok())
            .map(Literal::U32),
        _ => None,
    }
}

fn float_to_int(v: f32) -> Option<i64> {
    if !v.is_finite() || v.abs() >= 4_294_967_296.0 {
        return None;
    }
    Some(v.trunc() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(
            fold_binary(BinaryOp::Add, Literal::I32(2), Literal::I32(3)),
            Some(Literal::I32(5))
        );
        assert_eq!(
            fold_binary(BinaryOp::Divide, Literal::U32(7), Literal::U32(2)),
            Some(Literal::U32(3))
        );
    }

    #[test]
    fn test_overflow_is_not_folded() {
        assert_eq!(fold_binary(BinaryOp::Add, Literal::I32(i32::MAX), Literal::I32(1)), None);
        assert_eq!(fold_binary(BinaryOp::Subtract, Literal::U32(0), Literal::U32(1)), None);
        assert_eq!(fold_binary(BinaryOp::Divide, Literal::I32(1), Literal::I32(0)), None);
        assert_eq!(fold_unary(UnaryOp::Minus, Literal::I32(i32::MIN)), None);
    }

    #[test]
    fn test_float_division_by_zero_is_kept() {
        assert_eq!(fold_binary(BinaryOp::Divide, Literal::F32(1.0), Literal::F32(0.0)), None);
        assert_eq!(
            fold_binary(BinaryOp::Multiply, Literal::F32(1.5), Literal::F32(2.0)),
            Some(Literal::F32(3.0))
        );
    }

    #[test]
    fn test_mixed_types_are_not_folded() {
        assert_eq!(fold_binary(BinaryOp::Add, Literal::I32(1), Literal::U32(1)), None);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(
            fold_binary(BinaryOp::CompLt, Literal::F32(1.0), Literal::F32(2.0)),
            Some(Literal::Bool(true))
        );
        assert_eq!(
            fold_binary(BinaryOp::LogicalAnd, Literal::Bool(true), Literal::Bool(false)),
            Some(Literal::Bool(false))
        );
    }

    #[test]
    fn test_casts() {
        assert_eq!(fold_cast(&ExpressionType::f32(), Literal::I32(-2)), Some(Literal::F32(-2.0)));
        assert_eq!(fold_cast(&ExpressionType::u32(), Literal::I32(-1)), None);
        assert_eq!(fold_cast(&ExpressionType::i32(), Literal::F32(2.9)), Some(Literal::I32(2)));
        assert_eq!(fold_cast(&ExpressionType::i32(), Literal::F32(f32::NAN)), None);
    }
}
