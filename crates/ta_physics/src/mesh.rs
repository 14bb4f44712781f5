// crates/ta_physics/src/mesh.rs

//! 网格适配层
//!
//! 封装外部求解器网格暴露给湍流模型的最小几何接口：
//! 单元数、单元体积、壁面距离、面拓扑（owner/neighbour）、
//! 边界面及 Green-Gauss 梯度算子。
//!
//! 真实网格由外部求解器持有；本模块提供的 [`PhysicsMesh`]
//! 是契约的参考实现，并附带一维槽道测试网格构造器。

use glam::DVec2;
use serde::{Deserialize, Serialize};

// ============================================================
// 拓扑类型
// ============================================================

/// 边界面类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchKind {
    /// 固壁（壁面函数作用范围）
    Wall,
    /// 入流
    Inlet,
    /// 出流（零梯度外推）
    Outlet,
}

impl PatchKind {
    /// 是否为固壁
    #[inline]
    pub fn is_wall(&self) -> bool {
        matches!(self, Self::Wall)
    }
}

/// 内部面
#[derive(Debug, Clone, Copy)]
pub struct Face {
    /// owner 单元索引
    pub owner: usize,
    /// neighbour 单元索引
    pub neighbour: usize,
    /// 单位法向（owner → neighbour）
    pub normal: DVec2,
    /// 面积 [m²]
    pub area: f64,
    /// 单元心间距 [m]
    pub distance: f64,
}

/// 边界面
#[derive(Debug, Clone, Copy)]
pub struct BoundaryFace {
    /// 所属单元索引
    pub cell: usize,
    /// 外法向
    pub normal: DVec2,
    /// 面积 [m²]
    pub area: f64,
    /// 单元心到面心距离 [m]
    pub distance: f64,
    /// 边界类型
    pub kind: PatchKind,
}

// ============================================================
// 速度梯度张量存储 (SoA 布局)
// ============================================================

/// 速度梯度张量存储
///
/// 存储 ∇u 和 ∇v:
/// ```text
/// ┌ du/dx  du/dy ┐
/// │              │
/// └ dv/dx  dv/dy ┘
/// ```
#[derive(Debug, Clone, Default)]
pub struct VelocityGradients {
    /// ∂u/∂x
    pub du_dx: Vec<f64>,
    /// ∂u/∂y
    pub du_dy: Vec<f64>,
    /// ∂v/∂x
    pub dv_dx: Vec<f64>,
    /// ∂v/∂y
    pub dv_dy: Vec<f64>,
}

impl VelocityGradients {
    /// 创建指定大小的存储
    pub fn new(n: usize) -> Self {
        Self {
            du_dx: vec![0.0; n],
            du_dy: vec![0.0; n],
            dv_dx: vec![0.0; n],
            dv_dy: vec![0.0; n],
        }
    }

    /// 存储大小
    pub fn len(&self) -> usize {
        self.du_dx.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.du_dx.is_empty()
    }

    /// 应变率不变量 S² = 2·S_ij·S_ij
    ///
    /// SST 模型的 S2，涡粘与产生项共用此定义。
    #[inline]
    pub fn strain_rate_sq(&self, i: usize) -> f64 {
        let s11 = self.du_dx[i];
        let s22 = self.dv_dy[i];
        let s12 = 0.5 * (self.du_dy[i] + self.dv_dx[i]);
        2.0 * (s11 * s11 + s22 * s22 + 2.0 * s12 * s12)
    }

    /// 涡量 (2D): Ω = ∂v/∂x - ∂u/∂y
    #[inline]
    pub fn vorticity(&self, i: usize) -> f64 {
        self.dv_dx[i] - self.du_dy[i]
    }

    /// 加速度项 (∇U)·U（流线曲率特征用）
    #[inline]
    pub fn convective_accel(&self, i: usize, u: DVec2) -> DVec2 {
        DVec2::new(
            self.du_dx[i] * u.x + self.du_dy[i] * u.y,
            self.dv_dx[i] * u.x + self.dv_dy[i] * u.y,
        )
    }
}

// ============================================================
// 网格
// ============================================================

/// 物理网格适配器
#[derive(Debug, Clone)]
pub struct PhysicsMesh {
    n_cells: usize,
    volumes: Vec<f64>,
    wall_distance: Vec<f64>,
    faces: Vec<Face>,
    boundary_faces: Vec<BoundaryFace>,
    /// 拥有固壁边界面的单元（升序、去重）
    wall_adjacent: Vec<usize>,
}

impl PhysicsMesh {
    /// 从拓扑组件构建
    pub fn new(
        volumes: Vec<f64>,
        wall_distance: Vec<f64>,
        faces: Vec<Face>,
        boundary_faces: Vec<BoundaryFace>,
    ) -> Self {
        let n_cells = volumes.len();
        debug_assert_eq!(wall_distance.len(), n_cells);

        let mut wall_adjacent: Vec<usize> = boundary_faces
            .iter()
            .filter(|bf| bf.kind.is_wall())
            .map(|bf| bf.cell)
            .collect();
        wall_adjacent.sort_unstable();
        wall_adjacent.dedup();

        Self {
            n_cells,
            volumes,
            wall_distance,
            faces,
            boundary_faces,
            wall_adjacent,
        }
    }

    /// 单元数量
    #[inline]
    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    /// 单元体积 [m³]
    #[inline]
    pub fn volume(&self, i: usize) -> f64 {
        self.volumes[i]
    }

    /// 壁面距离场 [m]
    #[inline]
    pub fn wall_distance(&self) -> &[f64] {
        &self.wall_distance
    }

    /// 内部面
    #[inline]
    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    /// 边界面
    #[inline]
    pub fn boundary_faces(&self) -> &[BoundaryFace] {
        &self.boundary_faces
    }

    /// 固壁邻接单元（升序）
    ///
    /// 近壁 ω 缓存的保存/恢复按此顺序一一对应。
    #[inline]
    pub fn wall_adjacent_cells(&self) -> &[usize] {
        &self.wall_adjacent
    }

    /// 内部面体积通量 F = U_f·n·A [m³/s]
    ///
    /// 面速度取两侧算术平均。
    pub fn face_flux(&self, u: &[DVec2]) -> Vec<f64> {
        self.faces
            .iter()
            .map(|f| {
                let uf = 0.5 * (u[f.owner] + u[f.neighbour]);
                uf.dot(f.normal) * f.area
            })
            .collect()
    }

    /// 边界面体积通量 F_b = U_P·n·A [m³/s]（外法向为正）
    pub fn boundary_face_flux(&self, u: &[DVec2]) -> Vec<f64> {
        self.boundary_faces
            .iter()
            .map(|bf| u[bf.cell].dot(bf.normal) * bf.area)
            .collect()
    }

    /// 标量场 Green-Gauss 梯度
    ///
    /// grad φ_P = (1/V_P) Σ_f φ_f n_f A_f，
    /// 边界面取零梯度外推 (φ_f = φ_P)。
    pub fn scalar_gradient(&self, field: &[f64]) -> Vec<DVec2> {
        let mut grad = vec![DVec2::ZERO; self.n_cells];

        for f in &self.faces {
            let phi_f = 0.5 * (field[f.owner] + field[f.neighbour]);
            let contrib = phi_f * f.area * f.normal;
            grad[f.owner] += contrib;
            grad[f.neighbour] -= contrib;
        }
        for bf in &self.boundary_faces {
            grad[bf.cell] += field[bf.cell] * bf.area * bf.normal;
        }
        for (g, &v) in grad.iter_mut().zip(&self.volumes) {
            *g /= v;
        }
        grad
    }

    /// 向量场 Green-Gauss 梯度（速度梯度张量）
    pub fn vector_gradient(&self, u: &[DVec2]) -> VelocityGradients {
        let mut out = VelocityGradients::new(self.n_cells);
        let mut acc = vec![[0.0; 4]; self.n_cells];

        for f in &self.faces {
            let uf = 0.5 * (u[f.owner] + u[f.neighbour]);
            let w = f.area;
            let c = [
                uf.x * f.normal.x * w,
                uf.x * f.normal.y * w,
                uf.y * f.normal.x * w,
                uf.y * f.normal.y * w,
            ];
            for (a, ci) in acc[f.owner].iter_mut().zip(c) {
                *a += ci;
            }
            for (a, ci) in acc[f.neighbour].iter_mut().zip(c) {
                *a -= ci;
            }
        }
        for bf in &self.boundary_faces {
            let ub = u[bf.cell];
            let w = bf.area;
            let c = [
                ub.x * bf.normal.x * w,
                ub.x * bf.normal.y * w,
                ub.y * bf.normal.x * w,
                ub.y * bf.normal.y * w,
            ];
            for (a, ci) in acc[bf.cell].iter_mut().zip(c) {
                *a += ci;
            }
        }
        for i in 0..self.n_cells {
            let inv_v = 1.0 / self.volumes[i];
            out.du_dx[i] = acc[i][0] * inv_v;
            out.du_dy[i] = acc[i][1] * inv_v;
            out.dv_dx[i] = acc[i][2] * inv_v;
            out.dv_dy[i] = acc[i][3] * inv_v;
        }
        out
    }

    /// 一维槽道测试网格
    ///
    /// n 个单元沿 x 排成一行，上下为固壁，左右为入流/出流。
    /// 壁面距离取半高，所有单元均为固壁邻接单元。
    pub fn channel_1d(n: usize, length: f64, height: f64) -> Self {
        let dx = length / n as f64;
        let volumes = vec![dx * height; n];
        let wall_distance = vec![0.5 * height; n];

        let faces: Vec<Face> = (0..n.saturating_sub(1))
            .map(|i| Face {
                owner: i,
                neighbour: i + 1,
                normal: DVec2::X,
                area: height,
                distance: dx,
            })
            .collect();

        let mut boundary_faces = Vec::with_capacity(2 * n + 2);
        boundary_faces.push(BoundaryFace {
            cell: 0,
            normal: -DVec2::X,
            area: height,
            distance: 0.5 * dx,
            kind: PatchKind::Inlet,
        });
        boundary_faces.push(BoundaryFace {
            cell: n - 1,
            normal: DVec2::X,
            area: height,
            distance: 0.5 * dx,
            kind: PatchKind::Outlet,
        });
        for i in 0..n {
            for normal in [DVec2::Y, -DVec2::Y] {
                boundary_faces.push(BoundaryFace {
                    cell: i,
                    normal,
                    area: dx,
                    distance: 0.5 * height,
                    kind: PatchKind::Wall,
                });
            }
        }

        Self::new(volumes, wall_distance, faces, boundary_faces)
    }
}
