// crates/ta_physics/src/model.rs

//! 残差组装与状态控制
//!
//! 驱动一次外层迭代的状态机：
//!
//! 1. `correct_model_states` — 申报参与伴随状态向量的状态场
//! 2. `update_intermediate_variables` — 重算涡粘、混合场、修正场
//! 3. `correct_boundary_conditions` — 近壁保存 → 通用边界更新 → 恢复
//! 4. `calc_residuals` — 组装 k、ω 输运方程残差（实际/参考/偏导变体）
//! 5. `correct` — 一次完整非线性更新：重算中间量、松弛求解隐式
//!    方程、钳位到物理界、更新涡粘
//!
//! 模型通过显式能力接口 [`TurbulenceModel`] 暴露，由模型名字符串
//! 经工厂函数构造一次。

use std::sync::Arc;

use crate::blending;
use crate::boundary::{self, OmegaNearWallCache};
use crate::bridge::{BetaBridge, BetaModel, CellEnv};
use crate::equation::ScalarTransportEquation;
use crate::error::{PhysicsError, PhysicsResult};
use crate::mesh::PhysicsMesh;
use crate::sources::{self, ImplicitCoeffs};
use crate::state::TransportState;
use crate::types::{SolverControls, SstCoeffs};

/// 残差计算覆盖的方程子集
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EquationSet {
    /// 仅 k 方程
    K,
    /// 仅 ω 方程
    Omega,
    /// 两条方程
    #[default]
    All,
}

impl EquationSet {
    #[inline]
    fn covers_k(&self) -> bool {
        matches!(self, Self::K | Self::All)
    }

    #[inline]
    fn covers_omega(&self) -> bool {
        matches!(self, Self::Omega | Self::All)
    }
}

/// 残差计算选项
#[derive(Debug, Clone, Copy, Default)]
pub struct ResidualOptions {
    /// 请求的方程子集
    pub equations: EquationSet,
    /// 将本次实际残差同时存为参考残差（冻结基准）
    pub update_reference: bool,
}

/// 湍流模型能力接口
///
/// 外部伴随/优化驱动器消费的显式契约，取代宿主框架的运行时
/// 类型注册表。
pub trait TurbulenceModel: Send {
    /// 申报参与伴随状态向量的状态场名
    fn correct_model_states(&self, states: &mut Vec<String>);

    /// 基于当前湍流状态更新涡粘
    fn correct_nut(&mut self, state: &TransportState);

    /// 湍流变量边界更新（近壁保存/恢复包裹）
    fn correct_boundary_conditions(&mut self, state: &mut TransportState);

    /// 重算依赖状态场的全部中间量（混合场、涡粘、修正场）
    fn update_intermediate_variables(&mut self, state: &TransportState) -> PhysicsResult<()>;

    /// 组装湍流输运方程残差
    fn calc_residuals(
        &mut self,
        state: &TransportState,
        options: &ResidualOptions,
    ) -> PhysicsResult<()>;

    /// 一次完整非线性更新
    fn correct(&mut self, state: &mut TransportState) -> PhysicsResult<()>;

    /// 残差-状态连通图（稀疏感知雅可比组装用）
    fn model_residual_connectivity(&self) -> Vec<(String, Vec<String>)>;

    /// 按状态名查询残差场（未注册名是配置错误）
    fn residual_for(&self, state_name: &str) -> PhysicsResult<&[f64]>;
}

/// 按模型名构造湍流模型（启动时调用一次）
pub fn create_turbulence_model(
    name: &str,
    mesh: PhysicsMesh,
    coeffs: SstCoeffs,
    controls: SolverControls,
    beta_model: Arc<dyn BetaModel>,
) -> PhysicsResult<Box<dyn TurbulenceModel>> {
    match name {
        "kOmegaSSTFIML" => Ok(Box::new(SstFimlModel::new(
            mesh, coeffs, controls, beta_model,
        )?)),
        other => Err(PhysicsError::UnknownModel(other.to_string())),
    }
}

/// 带 ML 修正场的 k-ω SST 模型
pub struct SstFimlModel {
    coeffs: SstCoeffs,
    controls: SolverControls,
    mesh: PhysicsMesh,
    beta_model: Arc<dyn BetaModel>,
    bridge: BetaBridge,

    // ========== 迭代中间场（逐迭代重算，无历史） ==========
    /// 涡粘 [m²/s]（派生量，每次 correct_nut 重算）
    nut: Vec<f64>,
    /// 混合场 F1
    f1: Vec<f64>,
    /// 组合混合场 F23
    f23: Vec<f64>,
    /// 应变率不变量 S²
    s2: Vec<f64>,
    /// 交叉扩散项 CDkω
    cd_kw: Vec<f64>,
    /// 特征提取环境量
    env: Vec<CellEnv>,

    // ========== 修正场（跨迭代持久） ==========
    /// 工作修正场（作用于 ω 方程产生项；源项库只读）
    beta_fi: Vec<f64>,
    /// ML 预测修正场
    beta_fi_ml: Vec<f64>,

    // ========== 伴随残差场 ==========
    k_res: Vec<f64>,
    k_res_ref: Vec<f64>,
    k_res_part_deriv: Vec<f64>,
    k_ref: Vec<f64>,
    omega_res: Vec<f64>,
    omega_res_ref: Vec<f64>,
    omega_res_part_deriv: Vec<f64>,
    omega_ref: Vec<f64>,

    // ========== 近壁处理 ==========
    near_wall_cache: OmegaNearWallCache,

    /// 湍流状态是否参与当前导数计算
    solve_turb_state: bool,
    /// 已注册的伴随状态名
    registered_states: Vec<&'static str>,
    /// 外层迭代计数（残差打印用）
    iteration: usize,
}

impl SstFimlModel {
    /// 从组件构造
    pub fn new(
        mesh: PhysicsMesh,
        coeffs: SstCoeffs,
        controls: SolverControls,
        beta_model: Arc<dyn BetaModel>,
    ) -> PhysicsResult<Self> {
        coeffs.validate()?;
        controls.validate()?;

        let n = mesh.n_cells();
        let n_wall = mesh.wall_adjacent_cells().len();

        Ok(Self {
            coeffs,
            controls,
            bridge: BetaBridge::new(n),
            beta_model,
            nut: vec![0.0; n],
            f1: vec![0.0; n],
            f23: vec![0.0; n],
            s2: vec![0.0; n],
            cd_kw: vec![0.0; n],
            env: Vec::with_capacity(n),
            beta_fi: vec![1.0; n],
            beta_fi_ml: vec![1.0; n],
            k_res: vec![0.0; n],
            k_res_ref: vec![0.0; n],
            k_res_part_deriv: vec![0.0; n],
            k_ref: vec![0.0; n],
            omega_res: vec![0.0; n],
            omega_res_ref: vec![0.0; n],
            omega_res_part_deriv: vec![0.0; n],
            omega_ref: vec![0.0; n],
            near_wall_cache: OmegaNearWallCache::new(n_wall),
            solve_turb_state: false,
            registered_states: vec!["k", "omega"],
            iteration: 0,
            mesh,
        })
    }

    /// 系数集
    pub fn coeffs(&self) -> &SstCoeffs {
        &self.coeffs
    }

    /// 网格
    pub fn mesh(&self) -> &PhysicsMesh {
        &self.mesh
    }

    /// 涡粘场
    pub fn nut(&self) -> &[f64] {
        &self.nut
    }

    /// 混合场 F1
    pub fn f1(&self) -> &[f64] {
        &self.f1
    }

    /// 工作修正场
    pub fn beta_field(&self) -> &[f64] {
        &self.beta_fi
    }

    /// ML 预测修正场
    pub fn beta_field_ml(&self) -> &[f64] {
        &self.beta_fi_ml
    }

    /// 特征提取环境量（磁带注册路径的调用方使用）
    pub fn cell_env(&self) -> &[CellEnv] {
        &self.env
    }

    /// 外部模型桥（可变访问，磁带注册路径使用）
    pub fn bridge_mut(&mut self) -> &mut BetaBridge {
        &mut self.bridge
    }

    /// 覆盖工作修正场（场反演驱动器设置训练中的 beta）
    pub fn set_beta_field(&mut self, beta: &[f64]) -> PhysicsResult<()> {
        if beta.len() != self.mesh.n_cells() {
            return Err(PhysicsError::ContractViolation(format!(
                "beta field length {} does not match cell count {}",
                beta.len(),
                self.mesh.n_cells()
            )));
        }
        self.beta_fi.copy_from_slice(beta);
        Ok(())
    }

    /// 保存近壁 ω 值（任何状态扰动之前）
    pub fn save_omega_near_wall(&mut self, state: &TransportState) {
        self.near_wall_cache.save(&self.mesh, &state.omega);
    }

    /// 将缓存写回近壁 ω（通用边界更新之后）
    pub fn set_omega_near_wall(&self, state: &mut TransportState) {
        self.near_wall_cache.restore(&self.mesh, &mut state.omega);
    }

    /// ω 边界特殊处理：固壁邻接单元取粘性底层壁面值
    pub fn correct_omega_boundary_conditions(&self, state: &mut TransportState) {
        boundary::apply_omega_wall(&self.coeffs, &self.mesh, &mut state.omega, state.nu);
    }

    /// k 方程实际残差
    pub fn k_residual(&self) -> &[f64] {
        &self.k_res
    }

    /// ω 方程实际残差
    pub fn omega_residual(&self) -> &[f64] {
        &self.omega_res
    }

    /// k 方程「实际 − 参考」残差
    pub fn k_residual_delta(&self) -> Vec<f64> {
        self.k_res
            .iter()
            .zip(&self.k_res_ref)
            .map(|(a, r)| a - r)
            .collect()
    }

    /// ω 方程「实际 − 参考」残差
    pub fn omega_residual_delta(&self) -> Vec<f64> {
        self.omega_res
            .iter()
            .zip(&self.omega_res_ref)
            .map(|(a, r)| a - r)
            .collect()
    }

    /// k 方程偏导变体残差（solve_turb_state 路径）
    pub fn k_residual_part_deriv(&self) -> &[f64] {
        &self.k_res_part_deriv
    }

    /// ω 方程偏导变体残差（solve_turb_state 路径）
    pub fn omega_residual_part_deriv(&self) -> &[f64] {
        &self.omega_res_part_deriv
    }

    /// 冻结的 k 参考状态快照
    pub fn k_reference(&self) -> &[f64] {
        &self.k_ref
    }

    /// 冻结的 ω 参考状态快照
    pub fn omega_reference(&self) -> &[f64] {
        &self.omega_ref
    }

    /// 残差 L2 范数
    pub fn residual_l2(res: &[f64]) -> f64 {
        res.iter().map(|r| r * r).sum::<f64>().sqrt()
    }

    /// ω 方程单元源项系数
    fn omega_coeffs(&self, state: &TransportState) -> Vec<ImplicitCoeffs<f64>> {
        let c = &self.coeffs;
        (0..self.mesh.n_cells())
            .map(|i| {
                let s2 = self.s2[i];
                let g_capped = sources::g_by_nu(c, s2, s2);
                let q = if c.use_sas {
                    let gamma = blending::blend(self.f1[i], c.gamma1, c.gamma2);
                    let beta = blending::blend(self.f1[i], c.beta1, c.beta2);
                    sources::qsas(
                        c,
                        s2,
                        state.k[i],
                        state.omega[i],
                        self.mesh.wall_distance()[i],
                        gamma,
                        beta,
                    )
                } else {
                    0.0
                };
                sources::omega_source(
                    c,
                    self.f1[i],
                    g_capped,
                    self.beta_fi[i],
                    state.omega[i],
                    self.cd_kw[i],
                    q,
                )
            })
            .collect()
    }

    /// k 方程单元源项系数
    fn k_coeffs(&self, state: &TransportState) -> Vec<ImplicitCoeffs<f64>> {
        let c = &self.coeffs;
        (0..self.mesh.n_cells())
            .map(|i| {
                let s2 = self.s2[i];
                let g = self.nut[i] * sources::g_by_nu(c, s2, s2);
                sources::k_source(c, g, state.omega[i])
            })
            .collect()
    }

    fn assemble_omega(&self, state: &TransportState, relax: f64) -> ScalarTransportEquation {
        let flux = self.mesh.face_flux(&state.u);
        let bflux = self.mesh.boundary_face_flux(&state.u);
        let gamma: Vec<f64> = (0..self.mesh.n_cells())
            .map(|i| sources::domega_eff(&self.coeffs, self.f1[i], self.nut[i], state.nu))
            .collect();
        let coeffs = self.omega_coeffs(state);
        ScalarTransportEquation::assemble(
            &self.mesh,
            &flux,
            &bflux,
            &gamma,
            &coeffs,
            &state.omega,
            relax,
        )
    }

    fn assemble_k(&self, state: &TransportState, relax: f64) -> ScalarTransportEquation {
        let flux = self.mesh.face_flux(&state.u);
        let bflux = self.mesh.boundary_face_flux(&state.u);
        let gamma: Vec<f64> = (0..self.mesh.n_cells())
            .map(|i| sources::dk_eff(&self.coeffs, self.f1[i], self.nut[i], state.nu))
            .collect();
        let coeffs = self.k_coeffs(state);
        ScalarTransportEquation::assemble(
            &self.mesh,
            &flux,
            &bflux,
            &gamma,
            &coeffs,
            &state.k,
            relax,
        )
    }
}

impl TurbulenceModel for SstFimlModel {
    fn correct_model_states(&self, states: &mut Vec<String>) {
        for name in &self.registered_states {
            states.push((*name).to_string());
        }
    }

    fn correct_nut(&mut self, state: &TransportState) {
        let c = &self.coeffs;
        for i in 0..self.mesh.n_cells() {
            let y = self.mesh.wall_distance()[i];
            let f23 = blending::f23(c, state.k[i], state.omega[i], y, state.nu);
            self.f23[i] = f23;
            self.nut[i] = sources::nut(c, state.k[i], state.omega[i], f23, self.s2[i]);
        }
    }

    fn correct_boundary_conditions(&mut self, state: &mut TransportState) {
        // 保存 → 通用边界更新 → 恢复：壁面函数对近壁 ω 的改写
        // 在扰动求值与残差提取之间必须被抵消
        self.save_omega_near_wall(state);
        self.correct_omega_boundary_conditions(state);
        self.set_omega_near_wall(state);
    }

    fn update_intermediate_variables(&mut self, state: &TransportState) -> PhysicsResult<()> {
        let n = self.mesh.n_cells();
        let c = self.coeffs;

        let grads = self.mesh.vector_gradient(&state.u);
        let grad_k = self.mesh.scalar_gradient(&state.k);
        let grad_omega = self.mesh.scalar_gradient(&state.omega);
        let grad_p = self.mesh.scalar_gradient(&state.p);

        self.env.clear();
        for i in 0..n {
            let s2 = grads.strain_rate_sq(i);
            let w = grads.vorticity(i);
            self.s2[i] = s2;

            let y = self.mesh.wall_distance()[i];
            let gkgw = grad_k[i].dot(grad_omega[i]);
            let cd = blending::cd_k_omega(&c, gkgw, state.omega[i]);
            self.cd_kw[i] = cd;
            self.f1[i] = blending::f1(&c, state.k[i], state.omega[i], y, cd, state.nu);

            self.env.push(CellEnv {
                u: state.u[i],
                grad_p: grad_p[i],
                grad_k: grad_k[i],
                accel: grads.convective_accel(i, state.u[i]),
                s2,
                w2: w * w,
                nu: state.nu,
            });
        }

        self.correct_nut(state);

        let beta = self
            .bridge
            .calc_beta_field(&*self.beta_model, &state.k, &state.omega, &self.env)?;
        self.beta_fi_ml.copy_from_slice(beta);
        self.beta_fi.copy_from_slice(beta);
        Ok(())
    }

    fn calc_residuals(
        &mut self,
        state: &TransportState,
        options: &ResidualOptions,
    ) -> PhysicsResult<()> {
        if options.equations.covers_k() && !self.registered_states.contains(&"k") {
            return Err(PhysicsError::UnregisteredState("k".to_string()));
        }
        if options.equations.covers_omega() && !self.registered_states.contains(&"omega") {
            return Err(PhysicsError::UnregisteredState("omega".to_string()));
        }

        if options.equations.covers_omega() {
            let eqn = self.assemble_omega(state, 1.0);
            self.omega_res = eqn.residual_of(&state.omega);
            if options.update_reference {
                self.omega_res_ref.copy_from_slice(&self.omega_res);
                self.omega_ref.copy_from_slice(&state.omega);
            }
            if self.solve_turb_state {
                self.omega_res_part_deriv.copy_from_slice(&self.omega_res);
            }
        }

        if options.equations.covers_k() {
            let eqn = self.assemble_k(state, 1.0);
            self.k_res = eqn.residual_of(&state.k);
            if options.update_reference {
                self.k_res_ref.copy_from_slice(&self.k_res);
                self.k_ref.copy_from_slice(&state.k);
            }
            if self.solve_turb_state {
                self.k_res_part_deriv.copy_from_slice(&self.k_res);
            }
        }

        Ok(())
    }

    fn correct(&mut self, state: &mut TransportState) -> PhysicsResult<()> {
        self.solve_turb_state = true;
        let result = (|| -> PhysicsResult<(f64, f64)> {
            self.iteration += 1;
            self.update_intermediate_variables(state)?;

            // 求解路径对近壁 ω 施加真实壁面值
            self.correct_omega_boundary_conditions(state);

            // ω 方程：松弛求解 → 钳位 → 重施壁面值
            let omega_eqn = self.assemble_omega(state, self.controls.relax_omega);
            let omega_norm = omega_eqn.solve(
                &mut state.omega,
                "omega",
                self.controls.max_sweeps,
                self.controls.tolerance,
            )?;
            state.clip(self.coeffs.k_min, self.coeffs.omega_min);
            self.correct_omega_boundary_conditions(state);

            // k 方程（用更新后的 ω 线性化耗散）
            let k_eqn = self.assemble_k(state, self.controls.relax_k);
            let k_norm = k_eqn.solve(
                &mut state.k,
                "k",
                self.controls.max_sweeps,
                self.controls.tolerance,
            )?;
            state.clip(self.coeffs.k_min, self.coeffs.omega_min);

            state.check_finite()?;
            self.correct_nut(state);
            Ok((k_norm, omega_norm))
        })();
        self.solve_turb_state = false;

        let (k_norm, omega_norm) = result?;
        if self.iteration % self.controls.print_interval.max(1) == 0 {
            log::info!(
                "kOmegaSSTFIML iter {}: k residual = {:.6e}, omega residual = {:.6e}",
                self.iteration,
                k_norm,
                omega_norm
            );
        }
        Ok(())
    }

    fn model_residual_connectivity(&self) -> Vec<(String, Vec<String>)> {
        vec![
            (
                "kRes".to_string(),
                vec!["k".to_string(), "omega".to_string()],
            ),
            (
                "omegaRes".to_string(),
                vec!["omega".to_string(), "k".to_string()],
            ),
        ]
    }

    fn residual_for(&self, state_name: &str) -> PhysicsResult<&[f64]> {
        match state_name {
            "k" => Ok(&self.k_res),
            "omega" => Ok(&self.omega_res),
            other => Err(PhysicsError::UnregisteredState(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::UnitBetaModel;
    use glam::DVec2;

    fn make_model(n: usize) -> SstFimlModel {
        let mesh = PhysicsMesh::channel_1d(n, 1.0, 1.0);
        SstFimlModel::new(
            mesh,
            SstCoeffs::default(),
            SolverControls::default(),
            Arc::new(UnitBetaModel),
        )
        .unwrap()
    }

    fn make_state(n: usize) -> TransportState {
        TransportState::uniform(n, 0.1, 10.0, DVec2::new(1.0, 0.0), 1.5e-3)
    }

    #[test]
    fn test_factory_by_name() {
        let mesh = PhysicsMesh::channel_1d(4, 1.0, 1.0);
        let model = create_turbulence_model(
            "kOmegaSSTFIML",
            mesh.clone(),
            SstCoeffs::default(),
            SolverControls::default(),
            Arc::new(UnitBetaModel),
        );
        assert!(model.is_ok());

        let unknown = create_turbulence_model(
            "kEpsilon",
            mesh,
            SstCoeffs::default(),
            SolverControls::default(),
            Arc::new(UnitBetaModel),
        );
        assert!(matches!(unknown, Err(PhysicsError::UnknownModel(_))));
    }

    #[test]
    fn test_state_registration() {
        let model = make_model(4);
        let mut states = Vec::new();
        model.correct_model_states(&mut states);
        assert_eq!(states, vec!["k".to_string(), "omega".to_string()]);
    }

    #[test]
    fn test_residual_for_unregistered_state_is_error() {
        let model = make_model(4);
        let err = model.residual_for("epsilon").unwrap_err();
        assert!(matches!(err, PhysicsError::UnregisteredState(_)));
    }

    #[test]
    fn test_connectivity_graph() {
        let model = make_model(4);
        let con = model.model_residual_connectivity();
        assert_eq!(con.len(), 2);
        assert_eq!(con[0].0, "kRes");
        assert!(con[0].1.contains(&"omega".to_string()));
        assert!(con[1].1.contains(&"k".to_string()));
    }

    #[test]
    fn test_update_intermediates_unit_beta() {
        let mut model = make_model(6);
        let state = make_state(6);
        model.update_intermediate_variables(&state).unwrap();

        // 均匀流: S² = 0, νt = k/ω
        for i in 0..6 {
            assert!((model.nut()[i] - 0.01).abs() < 1e-12);
            assert!((model.beta_field()[i] - 1.0).abs() < 1e-15);
        }
        // 均匀场 ∇k·∇ω = 0 → CDkω 取下限；F1 与单元级公式逐位一致
        let c = SstCoeffs::default();
        let cd = blending::cd_k_omega(&c, 0.0_f64, 10.0);
        let expected = blending::f1(&c, 0.1_f64, 10.0, 0.5, cd, 1.5e-3);
        for i in 0..6 {
            assert_eq!(model.f1()[i], expected, "cell {}", i);
        }
        assert!(expected > 0.0 && expected < 1.0);
    }

    #[test]
    fn test_boundary_conditions_neutralized() {
        let mut model = make_model(6);
        let mut state = make_state(6);
        let omega_before = state.omega.clone();

        model.correct_boundary_conditions(&mut state);
        assert_eq!(state.omega, omega_before, "保存/恢复应抵消壁面副作用");
    }

    #[test]
    fn test_save_set_idempotent_without_update() {
        let mut model = make_model(6);
        let mut state = make_state(6);
        let before = state.omega.clone();

        model.save_omega_near_wall(&state);
        model.set_omega_near_wall(&mut state);
        assert_eq!(state.omega, before);
    }

    #[test]
    fn test_calc_residuals_subset() {
        let mut model = make_model(6);
        let state = make_state(6);
        model.update_intermediate_variables(&state).unwrap();

        let opts = ResidualOptions {
            equations: EquationSet::Omega,
            update_reference: false,
        };
        model.calc_residuals(&state, &opts).unwrap();

        // 均匀初态下 ω 残差由耗散主导，必非零
        assert!(SstFimlModel::residual_l2(model.omega_residual()) > 1e-6);
        // k 方程未被请求，残差保持零
        assert!(SstFimlModel::residual_l2(model.k_residual()) == 0.0);
    }

    #[test]
    fn test_reference_residual_delta_zero_at_reference() {
        let mut model = make_model(6);
        let state = make_state(6);
        model.update_intermediate_variables(&state).unwrap();

        let opts = ResidualOptions {
            equations: EquationSet::All,
            update_reference: true,
        };
        model.calc_residuals(&state, &opts).unwrap();

        // 实际 == 参考 → delta 为零
        assert!(model.k_residual_delta().iter().all(|&d| d == 0.0));
        assert!(model.omega_residual_delta().iter().all(|&d| d == 0.0));
    }

    #[test]
    fn test_set_beta_field_length_contract() {
        let mut model = make_model(6);
        let err = model.set_beta_field(&[1.0; 5]).unwrap_err();
        assert!(matches!(err, PhysicsError::ContractViolation(_)));
        assert!(model.set_beta_field(&[0.9; 6]).is_ok());
        assert!((model.beta_field()[0] - 0.9).abs() < 1e-15);
    }
}
