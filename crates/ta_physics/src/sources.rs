// crates/ta_physics/src/sources.rs

//! SST 源项库
//!
//! k、ω 两条输运方程的产生、耗散与交叉扩散项，全部为无隐藏状态的
//! 单元级纯函数，对 [`AdScalar`] 泛型逐项可微。除光滑钳位外不得
//! 依据场值做分支。
//!
//! # 隐式贡献形式
//!
//! 产生/耗散项为隐式时间积分做线性化，以
//! [`ImplicitCoeffs`] `{su, sp}` 的形式交给外部方程组装器：
//!
//! ```text
//! 方程右端 = su + sp·φ      (sp ≤ 0 保证对角占优)
//! ```

use ta_runtime::AdScalar;

use crate::blending::blend;
use crate::types::SstCoeffs;

/// 单元级隐式源项贡献
///
/// `su` 为显式部分，`sp` 为乘在未知量上的隐式系数。
#[derive(Debug, Clone, Copy)]
pub struct ImplicitCoeffs<S> {
    /// 显式源 [φ/s]
    pub su: S,
    /// 隐式系数 [1/s]
    pub sp: S,
}

impl<S: AdScalar> ImplicitCoeffs<S> {
    /// 零贡献
    #[inline]
    pub fn zero() -> Self {
        Self {
            su: S::zero(),
            sp: S::zero(),
        }
    }

    /// 在给定场值处的总源强度 su + sp·φ
    #[inline]
    pub fn total(&self, phi: S) -> S {
        self.su + self.sp * phi
    }
}

/// k 方程有效扩散系数: blend(F1, αk1, αk2)·νt + ν
#[inline]
pub fn dk_eff<S: AdScalar>(coeffs: &SstCoeffs, f1: S, nut: S, nu: f64) -> S {
    blend(f1, coeffs.alpha_k1, coeffs.alpha_k2) * nut + S::from_f64(nu)
}

/// ω 方程有效扩散系数: blend(F1, αω1, αω2)·νt + ν
#[inline]
pub fn domega_eff<S: AdScalar>(coeffs: &SstCoeffs, f1: S, nut: S, nu: f64) -> S {
    blend(f1, coeffs.alpha_omega1, coeffs.alpha_omega2) * nut + S::from_f64(nu)
}

/// k 产生率，负产生置零
#[inline]
pub fn pk<S: AdScalar>(g: S) -> S {
    g.max(S::zero())
}

/// 比耗散率与 k 之比，标准闭合为 β*·ω
#[inline]
pub fn epsilon_by_k<S: AdScalar>(coeffs: &SstCoeffs, omega: S) -> S {
    S::from_f64(coeffs.beta_star) * omega
}

/// 归一化产生项 G/ν，以 10·β*·S² 封顶（可实现性限制）
#[inline]
pub fn g_by_nu<S: AdScalar>(coeffs: &SstCoeffs, g_by_nu0: S, s2: S) -> S {
    g_by_nu0.min(S::from_f64(10.0 * coeffs.beta_star) * s2)
}

/// SST 涡粘: νt = a1·k / max(a1·ω, b1·F23·√S²)
#[inline]
pub fn nut<S: AdScalar>(coeffs: &SstCoeffs, k: S, omega: S, f23: S, s2: S) -> S {
    let a1 = S::from_f64(coeffs.a1);
    a1 * k / (a1 * omega).max(S::from_f64(coeffs.b1) * f23 * s2.sqrt())
}

/// k 方程源项（隐式贡献）
///
/// ```text
/// su = Pk（产生，已封顶/置零）
/// sp = -β*·ω（耗散线性化到 k 上）
/// ```
#[inline]
pub fn k_source<S: AdScalar>(coeffs: &SstCoeffs, g: S, omega: S) -> ImplicitCoeffs<S> {
    ImplicitCoeffs {
        su: pk(g),
        sp: -epsilon_by_k(coeffs, omega),
    }
}

/// ω 方程源项（隐式贡献，修正场作用点）
///
/// 产生项乘以修正场 beta：
/// ```text
/// su = γ(F1)·(G/ν)·β_fi + (1-F1)·CDkω + Qsas
/// sp = -β(F1)·ω（耗散线性化到 ω 上）
/// ```
///
/// 修正场恒为 1 时逐位还原标准 SST。
#[inline]
pub fn omega_source<S: AdScalar>(
    coeffs: &SstCoeffs,
    f1: S,
    g_by_nu_capped: S,
    beta_fi: S,
    omega: S,
    cd_kw: S,
    qsas: S,
) -> ImplicitCoeffs<S> {
    let gamma = blend(f1, coeffs.gamma1, coeffs.gamma2);
    let beta = blend(f1, coeffs.beta1, coeffs.beta2);

    ImplicitCoeffs {
        su: gamma * g_by_nu_capped * beta_fi + (S::one() - f1) * cd_kw + qsas,
        sp: -beta * omega,
    }
}

/// SAS（尺度自适应）源项修正
///
/// ```text
/// L    = √k / (β*^(1/4)·ω)        湍流长度尺度
/// Lvk  = κ·y                       von Kármán 长度尺度（一阶梯度近似）
/// Qsas = max(ζ₂·κ²·S²·(L/Lvk)² − (γ/β)·S², 0)
/// ```
#[inline]
pub fn qsas<S: AdScalar>(
    coeffs: &SstCoeffs,
    s2: S,
    k: S,
    omega: S,
    y: f64,
    gamma_blend: S,
    beta_blend: S,
) -> S {
    let kappa = S::from_f64(coeffs.kappa);
    let l = k.sqrt() / (S::from_f64(coeffs.beta_star.powf(0.25)) * omega);
    let lvk = kappa * S::from_f64(y.max(1e-10));
    let ratio = l / lvk;

    let grow = S::from_f64(coeffs.zeta2) * kappa * kappa * s2 * ratio * ratio;
    let damp = gamma_blend / beta_blend * s2;
    (grow - damp).max(S::zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-14;

    fn coeffs() -> SstCoeffs {
        SstCoeffs::default()
    }

    #[test]
    fn test_pk_floor() {
        assert_eq!(pk(-3.0_f64), 0.0);
        assert_eq!(pk(2.5_f64), 2.5);
    }

    #[test]
    fn test_epsilon_by_k() {
        // β*·ω = 0.09 × 10 = 0.9
        let v = epsilon_by_k(&coeffs(), 10.0_f64);
        assert!((v - 0.9).abs() < TOL);
    }

    #[test]
    fn test_g_by_nu_cap_never_exceeded() {
        // 任意应变率下不得超过 10·β*·S²
        let c = coeffs();
        for &s2 in &[1e-8, 0.1, 1.0, 1e3, 1e8] {
            for &g0 in &[0.0, 1.0, 1e6, 1e12] {
                let capped = g_by_nu(&c, g0, s2);
                assert!(
                    capped <= 10.0 * c.beta_star * s2 + TOL,
                    "cap 被突破: g0={}, s2={}, 得 {}",
                    g0,
                    s2,
                    capped
                );
            }
        }
    }

    #[test]
    fn test_nut_limiter() {
        let c = coeffs();
        // 低应变率: a1·ω 占优, νt = k/ω = 0.01
        let low = nut(&c, 0.1_f64, 10.0, 1.0, 1e-6);
        assert!((low - 0.01).abs() < 1e-12);

        // 高应变率: b1·F23·√S² 占优, νt = a1·k/(b1·F23·√S²)
        let s2 = 1e4_f64;
        let high = nut(&c, 0.1_f64, 10.0, 1.0, s2);
        let expected = c.a1 * 0.1 / (c.b1 * 1.0 * s2.sqrt());
        assert!((high - expected).abs() < 1e-12);
    }

    #[test]
    fn test_k_source_split() {
        let c = coeffs();
        let src = k_source(&c, 5.0_f64, 10.0);
        assert!((src.su - 5.0).abs() < TOL);
        assert!((src.sp + 0.9).abs() < TOL);
        // total = su + sp·k
        assert!((src.total(0.1) - (5.0 - 0.09)).abs() < TOL);
    }

    #[test]
    fn test_omega_source_unit_beta_recovers_sst() {
        // 修正场 = 1 必须逐位还原标准 SST 源项
        let c = coeffs();
        let f1 = 0.3_f64;
        let g = 2.0_f64;
        let omega = 8.0_f64;
        let cd = 0.5_f64;

        let corrected = omega_source(&c, f1, g, 1.0, omega, cd, 0.0);

        let gamma = blend(f1, c.gamma1, c.gamma2);
        let beta = blend(f1, c.beta1, c.beta2);
        let su_std = gamma * g + (1.0 - f1) * cd;
        let sp_std = -beta * omega;

        assert_eq!(corrected.su, su_std);
        assert_eq!(corrected.sp, sp_std);
    }

    #[test]
    fn test_omega_source_beta_scales_production_only() {
        let c = coeffs();
        let base = omega_source(&c, 0.0_f64, 2.0, 1.0, 8.0, 0.0, 0.0);
        let scaled = omega_source(&c, 0.0_f64, 2.0, 0.5, 8.0, 0.0, 0.0);

        // 产生项减半，耗散不变
        assert!((scaled.su - 0.5 * base.su).abs() < TOL);
        assert_eq!(scaled.sp, base.sp);
    }

    #[test]
    fn test_qsas_nonnegative() {
        let c = coeffs().with_sas();
        for &s2 in &[0.0, 1.0, 100.0] {
            for &y in &[0.01, 0.1, 1.0] {
                let q = qsas(&c, s2, 0.1_f64, 10.0, y, 0.55, 0.075);
                assert!(q >= 0.0, "Qsas 必须非负, 得 {}", q);
            }
        }
    }

    #[test]
    fn test_diffusivities_blend() {
        let c = coeffs();
        let nu = 1e-5;
        // F1 = 1: 近壁系数
        let dk_wall = dk_eff(&c, 1.0_f64, 0.01, nu);
        assert!((dk_wall - (0.85 * 0.01 + nu)).abs() < TOL);
        // F1 = 0: 远场系数
        let dk_far = dk_eff(&c, 0.0_f64, 0.01, nu);
        assert!((dk_far - (1.0 * 0.01 + nu)).abs() < TOL);

        let dw_wall = domega_eff(&c, 1.0_f64, 0.01, nu);
        assert!((dw_wall - (0.5 * 0.01 + nu)).abs() < TOL);
    }
}
