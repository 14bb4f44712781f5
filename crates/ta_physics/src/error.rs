// crates/ta_physics/src/error.rs

//! 物理层错误类型
//!
//! 按规格分为三类：
//! - **配置错误**: 请求未注册状态的残差/导数，同步报告，不可重试
//! - **数值失败**: 求解后场值非有限、修正场输出非有限，当前迭代致命，
//!   向上抛出而非静默钳位（掩盖会污染伴随敏感度）
//! - **契约违反**: 缓冲区长度不匹配、回调次序错误，属编程错误，
//!   尽可能带上出错单元索引快速失败
//!
//! 核心内部不做任何重试，恢复策略归属外部求解器。

use ta_runtime::RuntimeError;

/// 物理层错误
#[derive(Debug, thiserror::Error)]
pub enum PhysicsError {
    /// 配置错误：请求未注册的伴随状态
    #[error("state '{0}' is not registered in the adjoint state list")]
    UnregisteredState(String),

    /// 数值失败：场值非有限
    #[error("non-finite value in field '{field}' at cell {cell}")]
    NonFiniteField {
        /// 字段名
        field: &'static str,
        /// 出错单元索引
        cell: usize,
    },

    /// 数值失败：外部模型的修正场输出非有限
    #[error("non-finite correction field output at cell {cell}")]
    NonFiniteBeta {
        /// 出错单元索引
        cell: usize,
    },

    /// 契约违反（缓冲区配对、回调次序等编程错误）
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// 未知湍流模型名称
    #[error("unknown turbulence model '{0}'")]
    UnknownModel(String),

    /// 系数验证失败
    #[error(transparent)]
    InvalidCoeffs(#[from] crate::types::CoeffsValidationError),

    /// 运行时层透传
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// 物理层结果类型
pub type PhysicsResult<T> = Result<T, PhysicsError>;
