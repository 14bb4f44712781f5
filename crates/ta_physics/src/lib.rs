// crates/ta_physics/src/lib.rs

//! 带 ML 修正场的可微 k-ω SST 湍流闭合
//!
//! 为外部离散伴随框架提供 k、ω 两方程闭合的非线性残差求值器，
//! 包括：
//! - 混合函数引擎 (blending) - F1/F2/F3/F23 与通用系数插值
//! - 源项库 (sources) - 产生、耗散、交叉扩散的单元级纯函数
//! - 外部模型桥 (bridge) - 9 维特征打包与回归模型调用的微分变体
//! - 残差组装与状态控制 (model) - 逐迭代状态机与伴随残差薄记
//! - 标量输运方程 (equation) - 消费方组装器契约的参考实现
//! - 近壁处理 (boundary) - ω 壁面值与近壁缓存的保存/恢复
//!
//! # 可微性
//!
//! 全部单元级公式对 [`ta_runtime::AdScalar`] 泛型，普通求值、
//! 前向对偶数与反向磁带三种模式共用同一代码路径，主值逐位一致。
//!
//! # 所有权
//!
//! 输运状态场 (k, ω) 由外部求解器持有，逐调用以 `&mut` 传入；
//! 特征/输出缓冲区与近壁缓存由本子系统独占。

pub mod blending;
pub mod boundary;
pub mod bridge;
pub mod equation;
pub mod error;
pub mod mesh;
pub mod model;
pub mod sources;
pub mod state;
pub mod types;

// 重导出常用类型
pub use boundary::{omega_wall_value, OmegaNearWallCache};
pub use bridge::{BetaBridge, BetaModel, CellEnv, UnitBetaModel, N_FEATURES};
pub use equation::ScalarTransportEquation;
pub use error::{PhysicsError, PhysicsResult};
pub use mesh::{BoundaryFace, Face, PatchKind, PhysicsMesh, VelocityGradients};
pub use model::{
    create_turbulence_model, EquationSet, ResidualOptions, SstFimlModel, TurbulenceModel,
};
pub use sources::ImplicitCoeffs;
pub use state::TransportState;
pub use types::{CoeffsValidationError, SolverControls, SstCoeffs};
