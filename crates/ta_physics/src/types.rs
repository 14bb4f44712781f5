// crates/ta_physics/src/types.rs

//! k-ω SST 模型系数与求解控制参数
//!
//! 系数集在构造后不可变，逐单元由 F1 线性插值混合。
//!
//! # 默认系数（Menter 标准值）
//!
//! | 系数 | 值 |
//! |------|-----|
//! | alphaK1 | 0.85 |
//! | alphaK2 | 1.0 |
//! | alphaOmega1 | 0.5 |
//! | alphaOmega2 | 0.856 |
//! | gamma1 | 5/9 |
//! | gamma2 | 0.44 |
//! | beta1 | 0.075 |
//! | beta2 | 0.0828 |
//! | betaStar | 0.09 |
//! | a1 | 0.31 |
//! | b1 | 1.0 |
//! | c1 | 10.0 |

use serde::{Deserialize, Serialize};

/// 系数验证错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoeffsValidationError {
    /// 系数必须为正
    #[error("coefficient '{name}' must be positive, got {value}")]
    NonPositive {
        /// 系数名
        name: &'static str,
        /// 实际值
        value: f64,
    },

    /// 松弛因子超出 (0, 1]
    #[error("relaxation factor must be in (0, 1], got {0}")]
    InvalidRelaxation(f64),
}

/// k-ω SST 系数集（构造后不可变）
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SstCoeffs {
    /// k 方程湍流扩散系数（近壁）
    pub alpha_k1: f64,
    /// k 方程湍流扩散系数（远场）
    pub alpha_k2: f64,
    /// ω 方程湍流扩散系数（近壁）
    pub alpha_omega1: f64,
    /// ω 方程湍流扩散系数（远场）
    pub alpha_omega2: f64,
    /// ω 方程产生系数（近壁）
    pub gamma1: f64,
    /// ω 方程产生系数（远场）
    pub gamma2: f64,
    /// ω 方程耗散系数（近壁）
    pub beta1: f64,
    /// ω 方程耗散系数（远场）
    pub beta2: f64,
    /// k 耗散系数
    pub beta_star: f64,
    /// SST 涡粘限制系数
    pub a1: f64,
    /// F23 应变率限制系数
    pub b1: f64,
    /// 产生限制系数
    pub c1: f64,
    /// von Kármán 常数
    pub kappa: f64,
    /// SAS 源项系数 ζ₂
    pub zeta2: f64,
    /// 是否启用 F3 混合函数（粗糙壁面）
    pub use_f3: bool,
    /// 是否启用 SAS 源项修正
    pub use_sas: bool,
    /// k 下界 [m²/s²]
    pub k_min: f64,
    /// ω 下界 [1/s]
    pub omega_min: f64,
}

impl Default for SstCoeffs {
    fn default() -> Self {
        Self {
            alpha_k1: 0.85,
            alpha_k2: 1.0,
            alpha_omega1: 0.5,
            alpha_omega2: 0.856,
            gamma1: 5.0 / 9.0,
            gamma2: 0.44,
            beta1: 0.075,
            beta2: 0.0828,
            beta_star: 0.09,
            a1: 0.31,
            b1: 1.0,
            c1: 10.0,
            kappa: 0.41,
            zeta2: 3.51,
            use_f3: false,
            use_sas: false,
            k_min: 1e-14,
            omega_min: 1e-10,
        }
    }
}

impl SstCoeffs {
    /// 启用 F3 混合函数的变体
    pub fn with_f3(mut self) -> Self {
        self.use_f3 = true;
        self
    }

    /// 启用 SAS 源项修正的变体
    pub fn with_sas(mut self) -> Self {
        self.use_sas = true;
        self
    }

    /// 验证系数有效性
    pub fn validate(&self) -> Result<(), CoeffsValidationError> {
        let positives: [(&'static str, f64); 12] = [
            ("alphaK1", self.alpha_k1),
            ("alphaK2", self.alpha_k2),
            ("alphaOmega1", self.alpha_omega1),
            ("alphaOmega2", self.alpha_omega2),
            ("gamma1", self.gamma1),
            ("gamma2", self.gamma2),
            ("beta1", self.beta1),
            ("beta2", self.beta2),
            ("betaStar", self.beta_star),
            ("a1", self.a1),
            ("b1", self.b1),
            ("c1", self.c1),
        ];
        for (name, value) in positives {
            if value <= 0.0 || !value.is_finite() {
                return Err(CoeffsValidationError::NonPositive { name, value });
            }
        }
        Ok(())
    }
}

/// 隐式方程求解控制
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SolverControls {
    /// k 方程欠松弛因子
    pub relax_k: f64,
    /// ω 方程欠松弛因子
    pub relax_omega: f64,
    /// Gauss–Seidel 扫描次数上限
    pub max_sweeps: usize,
    /// 收敛容差（残差 L2 范数）
    pub tolerance: f64,
    /// 残差打印间隔（外层迭代次数）
    pub print_interval: usize,
}

impl Default for SolverControls {
    fn default() -> Self {
        Self {
            relax_k: 0.7,
            relax_omega: 0.7,
            max_sweeps: 20,
            tolerance: 1e-10,
            print_interval: 100,
        }
    }
}

impl SolverControls {
    /// 验证控制参数有效性
    pub fn validate(&self) -> Result<(), CoeffsValidationError> {
        for relax in [self.relax_k, self.relax_omega] {
            if !(relax > 0.0 && relax <= 1.0) {
                return Err(CoeffsValidationError::InvalidRelaxation(relax));
            }
        }
        Ok(())
    }
}
