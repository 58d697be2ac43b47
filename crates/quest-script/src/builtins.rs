use rand::Rng;
use rand::rngs::SmallRng;

use crate::value::Value;

/// Functions and constants reachable as `Math.<name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFn {
    Abs,
    Floor,
    Ceil,
    Round,
    Sqrt,
    Pow,
    Min,
    Max,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Log,
    Exp,
    Random,
}

impl MathFn {
    pub fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => MathFn::Abs,
            "floor" => MathFn::Floor,
            "ceil" => MathFn::Ceil,
            "round" => MathFn::Round,
            "sqrt" => MathFn::Sqrt,
            "pow" => MathFn::Pow,
            "min" => MathFn::Min,
            "max" => MathFn::Max,
            "sin" => MathFn::Sin,
            "cos" => MathFn::Cos,
            "tan" => MathFn::Tan,
            "asin" => MathFn::Asin,
            "acos" => MathFn::Acos,
            "atan" => MathFn::Atan,
            "atan2" => MathFn::Atan2,
            "log" => MathFn::Log,
            "exp" => MathFn::Exp,
            "random" => MathFn::Random,
            _ => return None,
        })
    }

    pub(crate) fn call(self, args: &[Value], rng: &mut SmallRng) -> Value {
        let arg = |i: usize| args.get(i).map_or(f64::NAN, Value::to_number);
        let n = match self {
            MathFn::Abs => arg(0).abs(),
            MathFn::Floor => arg(0).floor(),
            MathFn::Ceil => arg(0).ceil(),
            // Halves round toward +Infinity.
            MathFn::Round => (arg(0) + 0.5).floor(),
            MathFn::Sqrt => arg(0).sqrt(),
            MathFn::Pow => arg(0).powf(arg(1)),
            MathFn::Min => fold(args, f64::INFINITY, f64::min),
            MathFn::Max => fold(args, f64::NEG_INFINITY, f64::max),
            MathFn::Sin => arg(0).sin(),
            MathFn::Cos => arg(0).cos(),
            MathFn::Tan => arg(0).tan(),
            MathFn::Asin => arg(0).asin(),
            MathFn::Acos => arg(0).acos(),
            MathFn::Atan => arg(0).atan(),
            MathFn::Atan2 => arg(0).atan2(arg(1)),
            MathFn::Log => arg(0).ln(),
            MathFn::Exp => arg(0).exp(),
            MathFn::Random => rng.r#gen::<f64>(),
        };
        Value::Number(n)
    }
}

/// `Math.min`/`Math.max` propagate NaN, unlike `f64::min`.
fn fold(args: &[Value], init: f64, pick: fn(f64, f64) -> f64) -> f64 {
    args.iter().map(Value::to_number).try_fold(init, |acc, n| {
        if n.is_nan() { None } else { Some(pick(acc, n)) }
    }).unwrap_or(f64::NAN)
}

pub fn math_constant(name: &str) -> Option<f64> {
    Some(match name {
        "PI" => std::f64::consts::PI,
        "E" => std::f64::consts::E,
        "SQRT2" => std::f64::consts::SQRT_2,
        "SQRT1_2" => std::f64::consts::FRAC_1_SQRT_2,
        "LN2" => std::f64::consts::LN_2,
        "LN10" => std::f64::consts::LN_10,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn call(f: MathFn, args: &[f64]) -> f64 {
        let args: Vec<Value> = args.iter().map(|&n| Value::Number(n)).collect();
        let mut rng = SmallRng::seed_from_u64(1);
        f.call(&args, &mut rng).to_number()
    }

    #[test]
    fn round_halves_up() {
        assert_eq!(call(MathFn::Round, &[2.5]), 3.0);
        assert_eq!(call(MathFn::Round, &[-2.5]), -2.0);
    }

    #[test]
    fn min_max_of_nothing() {
        assert_eq!(call(MathFn::Min, &[]), f64::INFINITY);
        assert_eq!(call(MathFn::Max, &[]), f64::NEG_INFINITY);
        assert!(call(MathFn::Max, &[1.0, f64::NAN]).is_nan());
    }

    #[test]
    fn random_is_in_unit_interval() {
        let n = call(MathFn::Random, &[]);
        assert!((0.0..1.0).contains(&n));
    }
}
