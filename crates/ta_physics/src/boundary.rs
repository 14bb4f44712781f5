// crates/ta_physics/src/boundary.rs

//! 近壁边界处理
//!
//! 本核心只携带最小近壁处理：固壁邻接单元的 ω 壁面值与
//! 近壁缓存。壁面函数会改写近壁单元的 ω，这对基于有限差分
//! 的偏导数提取是破坏性的——保存/恢复对在扰动求值与残差提取
//! 之间抵消该副作用（等效于近壁 ω 的零梯度边界条件）。

use crate::mesh::PhysicsMesh;
use crate::types::SstCoeffs;

/// 粘性底层 ω 壁面值: 6ν/(β₁·y²)
#[inline]
pub fn omega_wall_value(coeffs: &SstCoeffs, nu: f64, y: f64) -> f64 {
    let y = y.max(1e-10);
    6.0 * nu / (coeffs.beta1 * y * y)
}

/// 对固壁邻接单元施加 ω 壁面函数
pub fn apply_omega_wall(coeffs: &SstCoeffs, mesh: &PhysicsMesh, omega: &mut [f64], nu: f64) {
    for &cell in mesh.wall_adjacent_cells() {
        omega[cell] = omega_wall_value(coeffs, nu, mesh.wall_distance()[cell]);
    }
}

/// 近壁 ω 缓存
///
/// 每个固壁邻接单元一个标量，顺序与
/// [`PhysicsMesh::wall_adjacent_cells`] 一致，跨保存/恢复对持久。
#[derive(Debug, Clone, Default)]
pub struct OmegaNearWallCache {
    values: Vec<f64>,
}

impl OmegaNearWallCache {
    /// 按固壁邻接单元数创建
    pub fn new(n_wall_cells: usize) -> Self {
        Self {
            values: vec![0.0; n_wall_cells],
        }
    }

    /// 缓存长度
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 保存近壁 ω 值（任何状态扰动前调用）
    pub fn save(&mut self, mesh: &PhysicsMesh, omega: &[f64]) {
        for (slot, &cell) in mesh.wall_adjacent_cells().iter().enumerate() {
            self.values[slot] = omega[cell];
        }
    }

    /// 将缓存值写回近壁单元（通用边界更新之后调用）
    pub fn restore(&self, mesh: &PhysicsMesh, omega: &mut [f64]) {
        for (slot, &cell) in mesh.wall_adjacent_cells().iter().enumerate() {
            omega[cell] = self.values[slot];
        }
    }
}
