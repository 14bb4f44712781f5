// crates/ta_runtime/src/scalar.rs

//! AdScalar - 可微标量类型抽象
//!
//! 提供单元级物理公式在三种求值模式之间零成本切换的唯一接口：
//!
//! - `f64`: 普通浮点求值（主值路径）
//! - [`Dual`](crate::Dual): 前向模式自动微分（值 + 方向导数）
//! - [`Rev`](crate::Rev): 反向模式自动微分（磁带记录）
//!
//! # 设计原则
//!
//! 1. **能力最小化**: 只暴露公式实际需要的运算
//!    （四则运算、比较、sqrt/exp/ln/powi/tanh、光滑钳位）
//! 2. **零成本抽象**: `#[inline]` + 编译期单态化
//! 3. **可微性红线**: 公式代码**禁止**根据场值做控制流分支，
//!    min/max/钳位必须通过本 trait 的方法表达，保证三种模式
//!    走完全相同的代码路径、主值逐位一致
//!
//! # 使用规范
//!
//! ```rust
//! use ta_runtime::AdScalar;
//!
//! // ✅ 正确：单元级公式使用泛型
//! fn eddy_viscosity<S: AdScalar>(a1: f64, k: S, omega: S) -> S {
//!     S::from_f64(a1) * k / omega
//! }
//! ```

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// 可微标量类型约束
///
/// 所有单元级公式必须使用此 trait 作为泛型边界。
/// 三种实现类型共享同一份公式代码，主值逐位一致。
///
/// # 架构约束
///
/// - **允许**: 作为泛型约束使用，如 `<S: AdScalar>`
/// - **禁止**: 作为 trait 对象使用，如 `&dyn AdScalar`
/// - **禁止**: 在公式中用 `if field_value > x { ... }` 分支，
///   改用 [`max`](AdScalar::max) / [`min`](AdScalar::min) /
///   [`clamp`](AdScalar::clamp)
pub trait AdScalar:
    Copy
    + Clone
    + Debug
    + PartialEq
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
{
    /// 从配置层 `f64` 创建被动常量（不参与微分）
    fn from_f64(v: f64) -> Self;

    /// 取主值（用于输出、日志和外部函数调用）
    fn value(&self) -> f64;

    /// 零值
    #[inline]
    fn zero() -> Self {
        Self::from_f64(0.0)
    }

    /// 单位值
    #[inline]
    fn one() -> Self {
        Self::from_f64(1.0)
    }

    /// 平方根
    fn sqrt(self) -> Self;

    /// 自然指数
    fn exp(self) -> Self;

    /// 自然对数
    fn ln(self) -> Self;

    /// 整数幂
    fn powi(self, n: i32) -> Self;

    /// 双曲正切（混合函数的核心）
    fn tanh(self) -> Self;

    /// 取较大值（按主值选择分支，导数取对应分支）
    #[inline]
    fn max(self, other: Self) -> Self {
        if self.value() >= other.value() {
            self
        } else {
            other
        }
    }

    /// 取较小值
    #[inline]
    fn min(self, other: Self) -> Self {
        if self.value() <= other.value() {
            self
        } else {
            other
        }
    }

    /// 钳位到 [lo, hi]
    #[inline]
    fn clamp(self, lo: f64, hi: f64) -> Self {
        self.max(Self::from_f64(lo)).min(Self::from_f64(hi))
    }

    /// 光滑化的绝对值: sqrt(x² + eps²)
    ///
    /// 特征量计算中代替 `abs()`，避免零点处不可微。
    #[inline]
    fn smooth_abs(self, eps: f64) -> Self {
        (self * self + Self::from_f64(eps * eps)).sqrt()
    }

    /// 检查主值是否有限（非 NaN、非 Inf）
    #[inline]
    fn is_safe(&self) -> bool {
        self.value().is_finite()
    }
}

// ============================================================
// f64 实现（普通求值）
// ============================================================

impl AdScalar for f64 {
    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }

    #[inline]
    fn value(&self) -> f64 {
        *self
    }

    #[inline]
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    #[inline]
    fn exp(self) -> Self {
        f64::exp(self)
    }

    #[inline]
    fn ln(self) -> Self {
        f64::ln(self)
    }

    #[inline]
    fn powi(self, n: i32) -> Self {
        f64::powi(self, n)
    }

    #[inline]
    fn tanh(self) -> Self {
        f64::tanh(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 泛型公式：三种模式共用
    fn generic_blend<S: AdScalar>(f1: S, near: f64, far: f64) -> S {
        f1 * (S::from_f64(near) - S::from_f64(far)) + S::from_f64(far)
    }

    #[test]
    fn test_f64_basics() {
        let x: f64 = AdScalar::from_f64(4.0);
        assert_eq!(x.value(), 4.0);
        assert_eq!(AdScalar::sqrt(x), 2.0);
        assert_eq!(AdScalar::powi(x, 2), 16.0);
    }

    #[test]
    fn test_blend_endpoints() {
        // blend(1,a,b) = a, blend(0,a,b) = b 必须精确成立
        assert_eq!(generic_blend(1.0_f64, 0.85, 1.0), 0.85);
        assert_eq!(generic_blend(0.0_f64, 0.85, 1.0), 1.0);
    }

    #[test]
    fn test_min_max_clamp() {
        let a: f64 = 3.0;
        let b: f64 = 5.0;
        assert_eq!(AdScalar::max(a, b), 5.0);
        assert_eq!(AdScalar::min(a, b), 3.0);
        assert_eq!(AdScalar::clamp(7.0_f64, 0.0, 4.0), 4.0);
        assert_eq!(AdScalar::clamp(-1.0_f64, 0.0, 4.0), 0.0);
    }

    #[test]
    fn test_smooth_abs() {
        // sqrt(3² + 4²) = 5
        let x: f64 = 3.0;
        assert!((x.smooth_abs(4.0) - 5.0).abs() < 1e-14);
        // 零点处非零但很小
        let z: f64 = 0.0;
        assert!(z.smooth_abs(1e-8) > 0.0);
    }

    #[test]
    fn test_is_safe() {
        assert!(1.0_f64.is_safe());
        assert!(!f64::NAN.is_safe());
        assert!(!f64::INFINITY.is_safe());
    }
}
