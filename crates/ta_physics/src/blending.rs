// crates/ta_physics/src/blending.rs

//! SST 混合函数引擎
//!
//! 计算近壁/远场切换的混合场 F1、F2、F3、F23，以及被所有系数
//! 共用的通用插值算子 [`blend`]。
//!
//! # 混合函数
//!
//! ```text
//! F1  = tanh(arg1⁴),  arg1 = min(min(max(√k/(β*ωy), 500ν/(y²ω)), 4σω₂k/(CDkω y²)), 10)
//! F2  = tanh(arg2²),  arg2 = min(max(2√k/(β*ωy), 500ν/(y²ω)), 100)
//! F3  = 1 - tanh(arg3⁴),  arg3 = min(150ν/(ωy²), 10)
//! F23 = max(F2, F3)（启用 F3 时），否则 F2
//! ```
//!
//! F1 近壁趋于 1（k-ω 行为），远场趋于 0（k-ε 行为）。
//! 壁面距离在进入公式前钳位，避免 y → 0 的奇异性。
//!
//! 所有公式对 [`AdScalar`] 泛型，普通/前向/反向三种模式共用同一代码路径。

use ta_runtime::AdScalar;

use crate::types::SstCoeffs;

/// 壁面距离下限 [m]，避免 y → 0 奇异
const Y_FLOOR: f64 = 1e-10;

/// CDkω 下限，避免 F1 参数除零
const CD_K_OMEGA_FLOOR: f64 = 1e-10;

/// 通用系数插值: F1·(near − far) + far
///
/// 对每个系数以及耗散系数 beta、产生系数 gamma 统一复用。
/// 端点精确: blend(1,a,b) = a, blend(0,a,b) = b。
#[inline]
pub fn blend<S: AdScalar>(f1: S, near: f64, far: f64) -> S {
    f1 * (S::from_f64(near) - S::from_f64(far)) + S::from_f64(far)
}

/// 交叉扩散项 CDkω = max(2σω₂(∇k·∇ω)/ω, 下限)
#[inline]
pub fn cd_k_omega<S: AdScalar>(coeffs: &SstCoeffs, grad_k_dot_grad_omega: S, omega: S) -> S {
    let raw = S::from_f64(2.0 * coeffs.alpha_omega2) * grad_k_dot_grad_omega / omega;
    raw.max(S::from_f64(CD_K_OMEGA_FLOOR))
}

/// 混合函数 F1
#[inline]
pub fn f1<S: AdScalar>(coeffs: &SstCoeffs, k: S, omega: S, y: f64, cd_kw: S, nu: f64) -> S {
    let y = S::from_f64(y.max(Y_FLOOR));
    let y2 = y * y;
    let beta_star = S::from_f64(coeffs.beta_star);
    let nu = S::from_f64(nu);

    let a = k.sqrt() / (beta_star * omega * y);
    let b = S::from_f64(500.0) * nu / (y2 * omega);
    let c = S::from_f64(4.0 * coeffs.alpha_omega2) * k / (cd_kw * y2);

    let arg1 = a.max(b).min(c).min(S::from_f64(10.0));
    arg1.powi(4).tanh()
}

/// 混合函数 F2
#[inline]
pub fn f2<S: AdScalar>(coeffs: &SstCoeffs, k: S, omega: S, y: f64, nu: f64) -> S {
    let y = S::from_f64(y.max(Y_FLOOR));
    let y2 = y * y;
    let beta_star = S::from_f64(coeffs.beta_star);
    let nu = S::from_f64(nu);

    let a = S::from_f64(2.0) * k.sqrt() / (beta_star * omega * y);
    let b = S::from_f64(500.0) * nu / (y2 * omega);

    let arg2 = a.max(b).min(S::from_f64(100.0));
    arg2.powi(2).tanh()
}

/// 混合函数 F3（粗糙壁面修正）
#[inline]
pub fn f3<S: AdScalar>(omega: S, y: f64, nu: f64) -> S {
    let y = S::from_f64(y.max(Y_FLOOR));
    let arg3 = (S::from_f64(150.0 * nu) / (omega * y * y)).min(S::from_f64(10.0));
    S::one() - arg3.powi(4).tanh()
}

/// 组合混合函数 F23
///
/// 启用 F3 开关时取 max(F2, F3)，否则直接取 F2。
#[inline]
pub fn f23<S: AdScalar>(coeffs: &SstCoeffs, k: S, omega: S, y: f64, nu: f64) -> S {
    let f2_val = f2(coeffs, k, omega, y, nu);
    if coeffs.use_f3 {
        f2_val.max(f3(omega, y, nu))
    } else {
        f2_val
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-12;

    fn coeffs() -> SstCoeffs {
        SstCoeffs::default()
    }

    #[test]
    fn test_blend_endpoints_exact() {
        // blend(1,a,b) = a 和 blend(0,a,b) = b 必须对任意系数对精确成立
        let pairs = [
            (0.85, 1.0),
            (0.5, 0.856),
            (0.075, 0.0828),
            (5.0 / 9.0, 0.44),
        ];
        for (near, far) in pairs {
            assert_eq!(blend(1.0_f64, near, far), near);
            assert_eq!(blend(0.0_f64, near, far), far);
        }
    }

    #[test]
    fn test_f1_near_wall_limit() {
        // 规定解析流动: k=0.1, ω=10, ν=1e-5
        // y → 0 时 500ν/(y²ω) 发散，arg1 被 10 封顶，F1 = tanh(10⁴) = 1
        let c = coeffs();
        let cd = cd_k_omega(&c, 0.0_f64, 10.0);
        let f1_wall = f1(&c, 0.1_f64, 10.0, 1e-8, cd, 1e-5);
        assert!((f1_wall - 1.0).abs() < TOL, "F1 近壁应为 1, 得 {}", f1_wall);
    }

    #[test]
    fn test_f1_far_field_limit() {
        // 远离壁面且交叉扩散显著时 arg1 → 0，F1 → 0
        let c = coeffs();
        let cd = cd_k_omega(&c, 100.0_f64, 10.0);
        let f1_far = f1(&c, 1e-6_f64, 10.0, 1e4, cd, 1e-5);
        assert!(f1_far < 1e-10, "F1 远场应趋于 0, 得 {}", f1_far);
    }

    #[test]
    fn test_f1_bounded_unit_interval() {
        let c = coeffs();
        for &y in &[1e-6, 1e-3, 0.1, 1.0, 100.0] {
            for &k in &[1e-8, 0.1, 10.0] {
                let cd = cd_k_omega(&c, 0.5_f64, 10.0);
                let v = f1(&c, k, 10.0_f64, y, cd, 1e-5);
                assert!((0.0..=1.0).contains(&v), "F1({}, {}) = {}", y, k, v);
            }
        }
    }

    #[test]
    fn test_cd_k_omega_floor() {
        // 梯度点积为负时取下限
        let c = coeffs();
        let v = cd_k_omega(&c, -5.0_f64, 2.0);
        assert_eq!(v, 1e-10);
    }

    #[test]
    fn test_f23_switch() {
        // 近壁粗糙修正: F3 在小 y 处接近 0, max 不改变 F2;
        // 开关关闭时 F23 == F2
        let c = coeffs();
        let k = 0.1_f64;
        let omega = 10.0_f64;
        let y = 0.05;
        let nu = 1e-5;

        let plain = f23(&c, k, omega, y, nu);
        assert_eq!(plain, f2(&c, k, omega, y, nu));

        let c3 = coeffs().with_f3();
        let with_f3 = f23(&c3, k, omega, y, nu);
        assert!(with_f3 >= plain - TOL);
    }

    #[test]
    fn test_zero_wall_distance_no_singularity() {
        // y = 0 经钳位后仍得有限值
        let c = coeffs();
        let cd = cd_k_omega(&c, 0.0_f64, 10.0);
        let v = f1(&c, 0.1_f64, 10.0, 0.0, cd, 1e-5);
        assert!(v.is_finite());
        assert!((v - 1.0).abs() < TOL);
    }
}
