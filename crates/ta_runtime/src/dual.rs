// crates/ta_runtime/src/dual.rs

//! 前向模式对偶数
//!
//! 实现 `a + b·ε` 形式的一阶对偶数，值与方向导数同步传播。
//! 与普通 `f64` 求值走同一份泛型公式代码，主值逐位一致。
//!
//! # 运算规则
//!
//! ```text
//! (a + a'ε) + (b + b'ε) = (a+b) + (a'+b')ε
//! (a + a'ε) × (b + b'ε) = (ab)  + (a'b + ab')ε
//! f(a + a'ε)            = f(a)  + f'(a)·a'ε
//! ```

use std::cmp::Ordering;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use num_traits::{One, Zero};

use crate::scalar::AdScalar;

/// 一阶对偶数（前向模式 AD）
#[derive(Debug, Clone, Copy, Default)]
pub struct Dual {
    /// 主值
    pub val: f64,
    /// 方向导数（切线分量）
    pub dot: f64,
}

impl Dual {
    /// 创建带切线的变量
    #[inline]
    pub const fn new(val: f64, dot: f64) -> Self {
        Self { val, dot }
    }

    /// 创建主动变量（切线 = 1）
    #[inline]
    pub const fn variable(val: f64) -> Self {
        Self { val, dot: 1.0 }
    }

    /// 创建被动常量（切线 = 0）
    #[inline]
    pub const fn constant(val: f64) -> Self {
        Self { val, dot: 0.0 }
    }
}

// 比较只看主值：保证与 f64 路径选择相同的 min/max 分支
impl PartialEq for Dual {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.val == other.val
    }
}

impl PartialOrd for Dual {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.val.partial_cmp(&other.val)
    }
}

impl Add for Dual {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.dot + rhs.dot)
    }
}

impl Sub for Dual {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.dot - rhs.dot)
    }
}

impl Mul for Dual {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.val * rhs.val, self.dot * rhs.val + self.val * rhs.dot)
    }
}

impl Div for Dual {
    type Output = Self;
    #[inline]
    fn div(self, rhs: Self) -> Self {
        // 主值用原生除法，保证与 f64 路径逐位一致
        let val = self.val / rhs.val;
        Self::new(val, (self.dot - val * rhs.dot) / rhs.val)
    }
}

impl Neg for Dual {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.val, -self.dot)
    }
}

impl AddAssign for Dual {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Dual {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for Dual {
    #[inline]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl DivAssign for Dual {
    #[inline]
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl Zero for Dual {
    #[inline]
    fn zero() -> Self {
        Self::constant(0.0)
    }

    #[inline]
    fn is_zero(&self) -> bool {
        self.val == 0.0 && self.dot == 0.0
    }
}

impl One for Dual {
    #[inline]
    fn one() -> Self {
        Self::constant(1.0)
    }
}

impl AdScalar for Dual {
    #[inline]
    fn from_f64(v: f64) -> Self {
        Self::constant(v)
    }

    #[inline]
    fn value(&self) -> f64 {
        self.val
    }

    #[inline]
    fn sqrt(self) -> Self {
        let r = self.val.sqrt();
        Self::new(r, 0.5 * self.dot / r)
    }

    #[inline]
    fn exp(self) -> Self {
        let e = self.val.exp();
        Self::new(e, e * self.dot)
    }

    #[inline]
    fn ln(self) -> Self {
        Self::new(self.val.ln(), self.dot / self.val)
    }

    #[inline]
    fn powi(self, n: i32) -> Self {
        Self::new(
            self.val.powi(n),
            f64::from(n) * self.val.powi(n - 1) * self.dot,
        )
    }

    #[inline]
    fn tanh(self) -> Self {
        let t = self.val.tanh();
        Self::new(t, (1.0 - t * t) * self.dot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-12;

    #[test]
    fn test_arithmetic_derivatives() {
        let x = Dual::variable(3.0);
        let c = Dual::constant(2.0);

        // d/dx (x*x + 2x) = 2x + 2 = 8
        let y = x * x + c * x;
        assert!((y.val - 15.0).abs() < TOL);
        assert!((y.dot - 8.0).abs() < TOL);

        // d/dx (1/x) = -1/x² = -1/9
        let z = Dual::constant(1.0) / x;
        assert!((z.dot + 1.0 / 9.0).abs() < TOL);
    }

    #[test]
    fn test_elementary_functions() {
        let x = Dual::variable(2.0);

        // d/dx sqrt(x) = 1/(2√2)
        assert!((AdScalar::sqrt(x).dot - 0.5 / 2.0_f64.sqrt()).abs() < TOL);
        // d/dx exp(x) = e²
        assert!((AdScalar::exp(x).dot - 2.0_f64.exp()).abs() < TOL);
        // d/dx ln(x) = 0.5
        assert!((AdScalar::ln(x).dot - 0.5).abs() < TOL);
        // d/dx x⁴ = 4x³ = 32
        assert!((AdScalar::powi(x, 4).dot - 32.0).abs() < TOL);
        // d/dx tanh(x) = 1 - tanh²(2)
        let t = 2.0_f64.tanh();
        assert!((AdScalar::tanh(x).dot - (1.0 - t * t)).abs() < TOL);
    }

    #[test]
    fn test_min_max_branch() {
        let x = Dual::variable(3.0);
        let c = Dual::constant(5.0);

        // max(x, 5) = 5 常量分支，导数为 0
        assert!((AdScalar::max(x, c).dot - 0.0).abs() < TOL);
        // min(x, 5) = x 变量分支，导数为 1
        assert!((AdScalar::min(x, c).dot - 1.0).abs() < TOL);
    }

    #[test]
    fn test_primal_matches_f64() {
        // 主值必须与 f64 路径逐位一致
        fn formula<S: AdScalar>(k: S, omega: S) -> S {
            let beta_star = S::from_f64(0.09);
            (k.sqrt() / (beta_star * omega)).tanh()
        }

        let plain = formula(0.1_f64, 10.0_f64);
        let dual = formula(Dual::variable(0.1), Dual::constant(10.0));
        assert_eq!(plain, dual.val);
    }
}
