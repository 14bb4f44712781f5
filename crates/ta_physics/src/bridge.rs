// crates/ta_physics/src/bridge.rs

//! 外部回归模型桥
//!
//! 为每个单元打包 9 维特征向量，批量调用外部回归模型得到修正场
//! beta，并向自动微分磁带暴露该调用的微分变体。
//!
//! # 特征向量（固定 9 维）
//!
//! 1. 湍流强度
//! 2. 沿流线压力梯度
//! 3. 湍流雷诺数
//! 4. k 的对流输运
//! 5. 应力各向异性比
//! 6. 压力-应力度量
//! 7. 流线曲率
//! 8. 速度-梯度错位
//! 9. Q 判据
//!
//! 所有特征均为无量纲光滑归一化形式（分母取 |分子|+|尺度| 结构），
//! 不引入不可微分支，量级保持 O(1)。
//!
//! # 缓冲区所有权
//!
//! 特征缓冲区 (9×N) 与输出缓冲区 (N) 由桥独占持有，每次 beta
//! 计算前重建，随桥析构释放。
//!
//! # 失败模式
//!
//! 外部模型不可用或任一单元输出非有限时快速失败（带单元索引），
//! 不做静默零填充——被污染的修正场会无症状地污染所有下游残差。

use std::sync::Arc;

use glam::DVec2;
use rayon::prelude::*;
use ta_runtime::{AdScalar, Dual, FieldBuffer, Rev, RuntimeError, RuntimeResult, Tape};

use crate::error::{PhysicsError, PhysicsResult};

/// 每单元特征数量
pub const N_FEATURES: usize = 9;

/// 湍流雷诺数归一化尺度
const RE_T_SCALE: f64 = 50.0;

/// 特征分母光滑化小量
const EPS: f64 = 1e-16;

/// 单元被动环境量（冻结的几何与梯度信息）
#[derive(Debug, Clone, Copy)]
pub struct CellEnv {
    /// 速度 [m/s]
    pub u: DVec2,
    /// 压力梯度 [m/s²]
    pub grad_p: DVec2,
    /// k 梯度 [m/s²]
    pub grad_k: DVec2,
    /// 对流加速度 (∇U)·U [m/s²]
    pub accel: DVec2,
    /// 应变率不变量 S² [1/s²]
    pub s2: f64,
    /// 涡量平方 Ω² [1/s²]
    pub w2: f64,
    /// 分子粘性 [m²/s]
    pub nu: f64,
}

/// 单元级特征提取（三种求值模式共用的代码路径）
///
/// k、ω 为可微状态量；环境量视为冻结常量。
pub fn cell_features<S: AdScalar>(k: S, omega: S, env: &CellEnv) -> [S; N_FEATURES] {
    let eps = S::from_f64(EPS);
    let umag2 = env.u.length_squared();
    let umag = umag2.sqrt();
    let smag = env.s2.sqrt();

    // 1. 湍流强度: k / (动能 + k)
    let q_intensity = k / (S::from_f64(0.5 * umag2) + k + eps);

    // 2. 沿流线压力梯度（归一化投影）
    let pg = env.u.dot(env.grad_p);
    let q_pgrad = pg / (umag * env.grad_p.length() + pg.abs() + EPS);

    // 3. 湍流雷诺数: ReT/(ReT + 50)
    let re_t = k / (S::from_f64(env.nu) * omega);
    let q_ret = re_t / (re_t + S::from_f64(RE_T_SCALE));

    // 4. k 的对流输运（归一化投影）
    let ck = env.u.dot(env.grad_k);
    let q_conv = ck / (umag * env.grad_k.length() + ck.abs() + EPS);

    // 5. 应力各向异性比: τ/(τ + k), τ = (k/ω)·√S²
    let tau = k / omega * S::from_f64(smag);
    let q_tau = tau / (tau + k + eps);

    // 6. 压力-应力度量
    let pmag = env.grad_p.length();
    let q_pstress = pmag / (pmag + smag * umag + EPS);

    // 7. 流线曲率: |U×a| / (|U×a| + |U||a|)
    let cross = env.u.x * env.accel.y - env.u.y * env.accel.x;
    let cross_mag = (cross * cross + EPS * EPS).sqrt();
    let amag = env.accel.length();
    let q_curv = cross_mag / (cross_mag + umag * amag + EPS);

    // 8. 速度-梯度错位: (|U||a| − |U·a|) / (|U||a| + |U·a|)
    let d = (env.u.dot(env.accel).powi(2) + EPS * EPS).sqrt();
    let q_mis = (umag * amag - d) / (umag * amag + d + EPS);

    // 9. Q 判据（归一化）: (Ω² − S²)/(Ω² + S²)
    let q_crit = (env.w2 - env.s2) / (env.w2 + env.s2 + EPS);

    [
        q_intensity,
        S::from_f64(q_pgrad),
        q_ret,
        S::from_f64(q_conv),
        q_tau,
        S::from_f64(q_pstress),
        S::from_f64(q_curv),
        S::from_f64(q_mis),
        S::from_f64(q_crit),
    ]
}

// ============================================================
// 回归模型契约
// ============================================================

/// 外部回归模型契约（消费方接口）
///
/// 两个回调必须在数学上一致：[`jac_vec_prod`](BetaModel::jac_vec_prod)
/// 必须等于 [`predict`](BetaModel::predict) 的转置雅可比-向量积，
/// 违反会无声污染所有下游敏感度。
///
/// 每外层迭代调用一次，所有 N 个单元批量求值。
pub trait BetaModel: Send + Sync {
    /// 批量预测: features[9N] → outputs[N]
    fn predict(&self, features: &[f64], outputs: &mut [f64]) -> RuntimeResult<()>;

    /// 伴随回调（反向模式）: featureSeed = Jᵀ·outputSeed
    fn jac_vec_prod(
        &self,
        features: &[f64],
        output_seed: &[f64],
        feature_seed: &mut [f64],
    ) -> RuntimeResult<()>;

    /// 切线回调（前向模式）: outputDot = J·featureDot
    ///
    /// 默认实现对 `predict` 做一次一阶有限差分，主值保持与普通
    /// 求值逐位一致；有解析切线的实现应覆盖本方法。
    fn tangent_prod(
        &self,
        features: &[f64],
        feature_dot: &[f64],
        outputs: &mut [f64],
        output_dot: &mut [f64],
    ) -> RuntimeResult<()> {
        const H: f64 = 1e-7;
        self.predict(features, outputs)?;

        let perturbed: Vec<f64> = features
            .iter()
            .zip(feature_dot)
            .map(|(x, dx)| x + H * dx)
            .collect();
        self.predict(&perturbed, output_dot)?;

        for (dot, base) in output_dot.iter_mut().zip(outputs.iter()) {
            *dot = (*dot - base) / H;
        }
        Ok(())
    }
}

/// 恒等修正模型：所有单元 beta = 1
///
/// 未接入训练模型时的缺省实现；也是「修正场恒 1 还原标准 SST」
/// 回归锚点的载体。
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitBetaModel;

impl BetaModel for UnitBetaModel {
    fn predict(&self, features: &[f64], outputs: &mut [f64]) -> RuntimeResult<()> {
        if features.len() != N_FEATURES * outputs.len() {
            return Err(RuntimeError::BufferSizeMismatch {
                expected: N_FEATURES * outputs.len(),
                actual: features.len(),
            });
        }
        outputs.fill(1.0);
        Ok(())
    }

    fn jac_vec_prod(
        &self,
        _features: &[f64],
        _output_seed: &[f64],
        feature_seed: &mut [f64],
    ) -> RuntimeResult<()> {
        feature_seed.fill(0.0);
        Ok(())
    }
}

// ============================================================
// 桥
// ============================================================

/// 外部模型桥
///
/// 独占持有特征/输出缓冲区；生命周期与模型实例一致。
pub struct BetaBridge {
    n_cells: usize,
    /// 特征缓冲区，长度 9×N
    features: FieldBuffer,
    /// 输出缓冲区，长度 N
    outputs: FieldBuffer,
}

impl BetaBridge {
    /// 按单元数创建
    pub fn new(n_cells: usize) -> Self {
        Self {
            n_cells,
            features: FieldBuffer::zeros(N_FEATURES * n_cells),
            outputs: FieldBuffer::zeros(n_cells),
        }
    }

    /// 单元数量
    #[inline]
    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    /// 最近一次计算的特征缓冲区 (9×N)
    #[inline]
    pub fn features(&self) -> &[f64] {
        self.features.as_slice()
    }

    /// 最近一次计算的修正场 (N)
    #[inline]
    pub fn beta(&self) -> &[f64] {
        self.outputs.as_slice()
    }

    fn check_inputs(&self, k: &[f64], omega: &[f64], env: &[CellEnv]) -> PhysicsResult<()> {
        if k.len() != self.n_cells || omega.len() != self.n_cells || env.len() != self.n_cells {
            return Err(PhysicsError::ContractViolation(format!(
                "bridge expects {} cells, got k={}, omega={}, env={}",
                self.n_cells,
                k.len(),
                omega.len(),
                env.len()
            )));
        }
        self.features.check_pair(&self.outputs, N_FEATURES)?;
        Ok(())
    }

    /// 逐单元检查模型输出有限性，带出错单元索引快速失败
    fn check_outputs(outputs: &[f64]) -> PhysicsResult<()> {
        for (cell, v) in outputs.iter().enumerate() {
            if !v.is_finite() {
                return Err(PhysicsError::NonFiniteBeta { cell });
            }
        }
        Ok(())
    }

    /// 普通求值：重建特征缓冲区并批量调用外部模型
    ///
    /// 单元循环无跨单元依赖，并行执行；外部调用整体批量一次。
    pub fn calc_beta_field(
        &mut self,
        model: &dyn BetaModel,
        k: &[f64],
        omega: &[f64],
        env: &[CellEnv],
    ) -> PhysicsResult<&[f64]> {
        self.check_inputs(k, omega, env)?;

        self.features
            .as_mut_slice()
            .par_chunks_mut(N_FEATURES)
            .enumerate()
            .for_each(|(i, chunk)| {
                chunk.copy_from_slice(&cell_features(k[i], omega[i], &env[i]));
            });

        model.predict(self.features.as_slice(), self.outputs.as_mut_slice())?;
        Self::check_outputs(self.outputs.as_slice())?;
        Ok(self.outputs.as_slice())
    }

    /// 前向模式求值：特征提取与外部调用在对偶数上进行
    ///
    /// 与普通求值复用同一特征代码路径；主值逐位一致。
    pub fn calc_beta_field_dual(
        &mut self,
        model: &dyn BetaModel,
        k: &[Dual],
        omega: &[Dual],
        env: &[CellEnv],
    ) -> PhysicsResult<Vec<Dual>> {
        let k_val: Vec<f64> = k.iter().map(|d| d.val).collect();
        let omega_val: Vec<f64> = omega.iter().map(|d| d.val).collect();
        self.check_inputs(&k_val, &omega_val, env)?;

        let mut feature_dot = vec![0.0; N_FEATURES * self.n_cells];
        self.features
            .as_mut_slice()
            .par_chunks_mut(N_FEATURES)
            .zip(feature_dot.par_chunks_mut(N_FEATURES))
            .enumerate()
            .for_each(|(i, (vals, dots))| {
                let feats = cell_features(k[i], omega[i], &env[i]);
                for (j, f) in feats.iter().enumerate() {
                    vals[j] = f.val;
                    dots[j] = f.dot;
                }
            });

        let mut output_dot = vec![0.0; self.n_cells];
        model.tangent_prod(
            self.features.as_slice(),
            &feature_dot,
            self.outputs.as_mut_slice(),
            &mut output_dot,
        )?;
        Self::check_outputs(self.outputs.as_slice())?;

        Ok(self
            .outputs
            .as_slice()
            .iter()
            .zip(output_dot)
            .map(|(&v, d)| Dual::new(v, d))
            .collect())
    }

    /// 反向模式求值：外部调用注册为磁带上的不透明外部函数节点
    ///
    /// 求值回调为 [`BetaModel::predict`]，伴随回调为
    /// [`BetaModel::jac_vec_prod`]；模型内部不被磁带追踪。
    pub fn calc_beta_field_reverse<'t>(
        &mut self,
        tape: &'t Tape,
        model: Arc<dyn BetaModel>,
        k: &[Rev<'t>],
        omega: &[Rev<'t>],
        env: &[CellEnv],
    ) -> PhysicsResult<Vec<Rev<'t>>> {
        let k_val: Vec<f64> = k.iter().map(|r| r.val()).collect();
        let omega_val: Vec<f64> = omega.iter().map(|r| r.val()).collect();
        self.check_inputs(&k_val, &omega_val, env)?;

        // 特征提取被磁带记录（顺序执行）
        let mut feature_vars: Vec<Rev<'t>> = Vec::with_capacity(N_FEATURES * self.n_cells);
        for i in 0..self.n_cells {
            feature_vars.extend_from_slice(&cell_features(k[i], omega[i], &env[i]));
        }
        for (slot, f) in feature_vars.iter().enumerate() {
            self.features.as_mut_slice()[slot] = f.val();
        }

        let eval_model = Arc::clone(&model);
        let adj_model = Arc::clone(&model);

        let beta_vars = tape.external(
            &feature_vars,
            self.n_cells,
            move |x, y| eval_model.predict(x, y),
            Box::new(move |x, seed, out| adj_model.jac_vec_prod(x, seed, out)),
        )?;

        for (cell, b) in beta_vars.iter().enumerate() {
            self.outputs.as_mut_slice()[cell] = b.val();
            if !b.val().is_finite() {
                return Err(PhysicsError::NonFiniteBeta { cell });
            }
        }
        Ok(beta_vars)
    }
}
