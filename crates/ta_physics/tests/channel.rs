// crates/ta_physics/tests/channel.rs
//!
//! 一维槽道端到端场景测试
//!
//! 验证一次完整非线性更新在物理与伴随薄记两侧都成立

use std::sync::Arc;

use glam::DVec2;

use ta_physics::{
    create_turbulence_model, EquationSet, PhysicsMesh, ResidualOptions, SolverControls,
    SstCoeffs, SstFimlModel, TransportState, TurbulenceModel, UnitBetaModel,
};

fn channel_model(n: usize) -> SstFimlModel {
    SstFimlModel::new(
        PhysicsMesh::channel_1d(n, 1.0, 1.0),
        SstCoeffs::default(),
        SolverControls::default(),
        Arc::new(UnitBetaModel),
    )
    .unwrap()
}

fn residual_l2(res: &[f64]) -> f64 {
    res.iter().map(|r| r * r).sum::<f64>().sqrt()
}

// ============================================================
// Test 1: 端到端非线性更新
// ============================================================

#[test]
fn test_one_correct_reduces_residual_and_keeps_positivity() {
    // 验收标准：均匀初态 (k=0.1, ω=10, 修正场=1)，10 单元一维槽道，
    // 一次 correct() 后 k、ω 保持正值且残差范数严格下降

    let n = 10;
    let mut model = channel_model(n);
    let mut state = TransportState::uniform(n, 0.1, 10.0, DVec2::new(1.0, 0.0), 1.5e-3);

    // 初始猜测的残差范数
    model.update_intermediate_variables(&state).unwrap();
    let opts = ResidualOptions {
        equations: EquationSet::All,
        update_reference: false,
    };
    model.calc_residuals(&state, &opts).unwrap();
    let k_norm_0 = residual_l2(model.k_residual());
    let omega_norm_0 = residual_l2(model.omega_residual());
    assert!(omega_norm_0 > 0.0, "均匀初态的 ω 残差应非零");

    model.correct(&mut state).unwrap();

    // 正值性
    assert!(state.k.iter().all(|&v| v > 0.0), "k 必须保持正值");
    assert!(state.omega.iter().all(|&v| v > 0.0), "ω 必须保持正值");
    state.check_finite().unwrap();

    // 残差严格下降
    model.update_intermediate_variables(&state).unwrap();
    model.calc_residuals(&state, &opts).unwrap();
    let k_norm_1 = residual_l2(model.k_residual());
    let omega_norm_1 = residual_l2(model.omega_residual());

    assert!(
        omega_norm_1 < omega_norm_0,
        "ω 残差未下降: {} → {}",
        omega_norm_0,
        omega_norm_1
    );
    assert!(
        k_norm_1 < k_norm_0,
        "k 残差未下降: {} → {}",
        k_norm_0,
        k_norm_1
    );
}

// ============================================================
// Test 2: 参考残差薄记
// ============================================================

#[test]
fn test_reference_residual_bookkeeping() {
    // 冻结参考后扰动单个状态分量，「实际 − 参考」只在扰动影响到的
    // 模板范围内非零——这是有限差分偏导提取的基础

    let n = 10;
    let mut model = channel_model(n);
    let mut state = TransportState::uniform(n, 0.1, 10.0, DVec2::new(1.0, 0.0), 1.5e-3);

    model.update_intermediate_variables(&state).unwrap();
    let opts_ref = ResidualOptions {
        equations: EquationSet::All,
        update_reference: true,
    };
    model.calc_residuals(&state, &opts_ref).unwrap();
    assert!(model.omega_residual_delta().iter().all(|&d| d == 0.0));

    // 扰动中间单元的 ω
    state.omega[5] += 1e-4;
    let opts = ResidualOptions {
        equations: EquationSet::All,
        update_reference: false,
    };
    model.calc_residuals(&state, &opts).unwrap();

    let delta = model.omega_residual_delta();
    assert!(delta[5].abs() > 0.0, "被扰动单元的残差必须响应");
    // 远端单元不在扰动模板内（迎风+最近邻耦合）
    assert_eq!(delta[0], 0.0);
    assert_eq!(delta[9], 0.0);
}

// ============================================================
// Test 3: 近壁缓存在扰动回路中的作用
// ============================================================

#[test]
fn test_near_wall_cache_protects_fd_loop() {
    // 模拟有限差分回路: 保存 → 扰动 → 边界更新 → 恢复，
    // 近壁 ω 必须回到扰动后的值（壁面函数的改写被抵消）

    let n = 10;
    let mut model = channel_model(n);
    let mut state = TransportState::uniform(n, 0.1, 10.0, DVec2::new(1.0, 0.0), 1.5e-3);

    state.omega[3] += 1e-3;
    let perturbed = state.omega.clone();

    model.correct_boundary_conditions(&mut state);
    assert_eq!(state.omega, perturbed, "边界更新的副作用未被近壁缓存抵消");
}

// ============================================================
// Test 4: 工厂接口驱动
// ============================================================

#[test]
fn test_factory_driven_outer_loop() {
    // 通过能力接口（而非具体类型）驱动两次外层迭代
    let n = 10;
    let mut model = create_turbulence_model(
        "kOmegaSSTFIML",
        PhysicsMesh::channel_1d(n, 1.0, 1.0),
        SstCoeffs::default(),
        SolverControls::default(),
        Arc::new(UnitBetaModel),
    )
    .unwrap();

    let mut states = Vec::new();
    model.correct_model_states(&mut states);
    assert_eq!(states.len(), 2);

    let mut state = TransportState::uniform(n, 0.1, 10.0, DVec2::new(1.0, 0.0), 1.5e-3);
    model.correct(&mut state).unwrap();
    model.correct(&mut state).unwrap();

    state.check_finite().unwrap();
    assert!(state.k.iter().all(|&v| v > 0.0));
    assert!(state.omega.iter().all(|&v| v > 0.0));

    // 连通图暴露残差对状态的依赖
    let con = model.model_residual_connectivity();
    assert_eq!(con.len(), 2);
}
