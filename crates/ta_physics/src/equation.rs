// crates/ta_physics/src/equation.rs

//! 标量输运方程组装器（参考实现）
//!
//! 消费方契约的参考实现：接受（通量、扩散系数、源项系数对）
//! 组装稳态有限体积标量输运方程
//!
//! ```text
//! div(F, φ) − laplacian(Γ, φ) = su + sp·φ
//! ```
//!
//! 对流取一阶迎风，扩散取中心差分；隐式欠松弛后用
//! Gauss–Seidel 扫描求解。残差定义为矩阵作用形式 r = A·φ − b，
//! 伴随侧的「实际/参考」残差均通过 [`residual_of`](ScalarTransportEquation::residual_of)
//! 在不同场值处求得。

use crate::error::{PhysicsError, PhysicsResult};
use crate::mesh::PhysicsMesh;
use crate::sources::ImplicitCoeffs;

/// 组装后的标量输运方程 A·φ = b
#[derive(Debug, Clone)]
pub struct ScalarTransportEquation {
    n_cells: usize,
    /// 对角系数
    diag: Vec<f64>,
    /// 右端项
    rhs: Vec<f64>,
    /// 行压缩的非对角项 (列索引, 系数)
    rows: Vec<Vec<(usize, f64)>>,
}

impl ScalarTransportEquation {
    /// 组装方程
    ///
    /// # 参数
    /// - `flux`: 内部面体积通量 [m³/s]（owner → neighbour 为正）
    /// - `boundary_flux`: 边界面体积通量 [m³/s]（外法向为正）
    /// - `diffusivity`: 单元有效扩散系数 [m²/s]
    /// - `coeffs`: 单元源项系数对（su 显式, sp 隐式, sp ≤ 0）
    /// - `phi`: 当前场值（欠松弛基准）
    /// - `relax`: 欠松弛因子，1.0 表示不松弛（残差计算用）
    pub fn assemble(
        mesh: &PhysicsMesh,
        flux: &[f64],
        boundary_flux: &[f64],
        diffusivity: &[f64],
        coeffs: &[ImplicitCoeffs<f64>],
        phi: &[f64],
        relax: f64,
    ) -> Self {
        let n_cells = mesh.n_cells();
        let mut diag = vec![0.0; n_cells];
        let mut rhs = vec![0.0; n_cells];
        let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n_cells];

        for (f, face) in mesh.faces().iter().enumerate() {
            let p = face.owner;
            let n = face.neighbour;
            let gamma_f = 0.5 * (diffusivity[p] + diffusivity[n]);
            let d = gamma_f * face.area / face.distance;
            let fl = flux[f];

            // 迎风离散: 流出侧贡献进对角，流入侧进非对角
            diag[p] += d + fl.max(0.0);
            diag[n] += d + (-fl).max(0.0);
            rows[p].push((n, -(d + (-fl).max(0.0))));
            rows[n].push((p, -(d + fl.max(0.0))));
        }

        // 边界面零梯度外推: φ_b = φ_P，扩散通量为零
        // 出流隐式进对角，入流按当前场值显式处理
        for (b, bf) in mesh.boundary_faces().iter().enumerate() {
            let fl_b = boundary_flux[b];
            diag[bf.cell] += fl_b.max(0.0);
            rhs[bf.cell] -= fl_b.min(0.0) * phi[bf.cell];
        }

        for i in 0..n_cells {
            let v = mesh.volume(i);
            diag[i] += -coeffs[i].sp * v;
            rhs[i] += coeffs[i].su * v;
        }

        // 隐式欠松弛 (Patankar): a_P/α, b + (1-α)/α·a_P·φ_old
        if relax < 1.0 {
            for i in 0..n_cells {
                let relaxed = diag[i] / relax;
                rhs[i] += (relaxed - diag[i]) * phi[i];
                diag[i] = relaxed;
            }
        }

        Self {
            n_cells,
            diag,
            rhs,
            rows,
        }
    }

    /// 单元数量
    #[inline]
    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    /// 矩阵作用残差 r = A·φ − b
    pub fn residual_of(&self, phi: &[f64]) -> Vec<f64> {
        let mut res = vec![0.0; self.n_cells];
        for i in 0..self.n_cells {
            let mut ax = self.diag[i] * phi[i];
            for &(j, a) in &self.rows[i] {
                ax += a * phi[j];
            }
            res[i] = ax - self.rhs[i];
        }
        res
    }

    /// 残差 L2 范数
    pub fn residual_norm(&self, phi: &[f64]) -> f64 {
        self.residual_of(phi)
            .iter()
            .map(|r| r * r)
            .sum::<f64>()
            .sqrt()
    }

    /// Gauss–Seidel 扫描求解
    ///
    /// 返回最终残差范数。求解后场值非有限视为致命数值错误。
    pub fn solve(
        &self,
        phi: &mut [f64],
        field: &'static str,
        max_sweeps: usize,
        tolerance: f64,
    ) -> PhysicsResult<f64> {
        let mut norm = self.residual_norm(phi);

        for sweep in 0..max_sweeps {
            if norm < tolerance {
                break;
            }
            for i in 0..self.n_cells {
                let mut acc = self.rhs[i];
                for &(j, a) in &self.rows[i] {
                    acc -= a * phi[j];
                }
                phi[i] = acc / self.diag[i];
            }
            norm = self.residual_norm(phi);
            log::trace!("GS sweep {}: residual = {:.6e}", sweep + 1, norm);
        }

        for (cell, v) in phi.iter().enumerate() {
            if !v.is_finite() {
                return Err(PhysicsError::NonFiniteField { field, cell });
            }
        }
        Ok(norm)
    }
}
