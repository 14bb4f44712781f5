// crates/ta_physics/src/state.rs

//! 输运状态场
//!
//! k、ω 等输运状态场由外部求解器持有，逐次调用以 `&mut` 传入；
//! 模型内部的派生场（涡粘、混合场、修正场、残差场）由模型独占。
//!
//! # 布局设计
//!
//! 采用 SoA (Structure of Arrays) 布局：
//! ```text
//! k:     [k_0,  k_1,  k_2,  ...]
//! omega: [ω_0,  ω_1,  ω_2,  ...]
//! ```

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, PhysicsResult};

/// 输运状态场（外部求解器所有）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportState {
    /// 单元数量
    n_cells: usize,
    /// 湍动能 [m²/s²]
    pub k: Vec<f64>,
    /// 比耗散率 [1/s]
    pub omega: Vec<f64>,
    /// 运动学压力 [m²/s²]
    pub p: Vec<f64>,
    /// 速度 [m/s]
    pub u: Vec<DVec2>,
    /// 分子运动粘性 [m²/s]
    pub nu: f64,
}

impl TransportState {
    /// 创建零初始化状态
    pub fn new(n_cells: usize, nu: f64) -> Self {
        Self {
            n_cells,
            k: vec![0.0; n_cells],
            omega: vec![0.0; n_cells],
            p: vec![0.0; n_cells],
            u: vec![DVec2::ZERO; n_cells],
            nu,
        }
    }

    /// 创建均匀初始状态
    pub fn uniform(n_cells: usize, k0: f64, omega0: f64, u0: DVec2, nu: f64) -> Self {
        Self {
            n_cells,
            k: vec![k0; n_cells],
            omega: vec![omega0; n_cells],
            p: vec![0.0; n_cells],
            u: vec![u0; n_cells],
            nu,
        }
    }

    /// 单元数量
    #[inline]
    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    /// 检查全部状态场是否有限
    ///
    /// 求解步之后调用；任何非有限值对当前迭代都是致命错误。
    pub fn check_finite(&self) -> PhysicsResult<()> {
        for (cell, v) in self.k.iter().enumerate() {
            if !v.is_finite() {
                return Err(PhysicsError::NonFiniteField { field: "k", cell });
            }
        }
        for (cell, v) in self.omega.iter().enumerate() {
            if !v.is_finite() {
                return Err(PhysicsError::NonFiniteField { field: "omega", cell });
            }
        }
        Ok(())
    }

    /// 钳位到物理下界（修正后 k、ω 必须非负）
    pub fn clip(&mut self, k_min: f64, omega_min: f64) {
        for v in &mut self.k {
            *v = v.max(k_min);
        }
        for v in &mut self.omega {
            *v = v.max(omega_min);
        }
    }
}
