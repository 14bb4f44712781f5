// crates/ta_runtime/src/error.rs

//! 运行时错误类型
//!
//! 定义 Runtime 层的错误类型，包括缓冲区错误、数值错误等。

use std::fmt;

/// 运行时错误
#[derive(Debug)]
pub enum RuntimeError {
    /// 缓冲区大小不匹配
    BufferSizeMismatch {
        /// 期望大小
        expected: usize,
        /// 实际大小
        actual: usize,
    },
    /// 索引越界
    IndexOutOfBounds {
        /// 索引值
        index: usize,
        /// 容量
        len: usize,
    },
    /// 数值错误（NaN/Inf）
    NumericalError {
        /// 错误描述
        message: String,
    },
    /// 外部函数调用失败
    ExternalFunction {
        /// 失败原因
        reason: String,
    },
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferSizeMismatch { expected, actual } => {
                write!(f, "缓冲区大小不匹配: 期望 {}, 实际 {}", expected, actual)
            }
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "索引 {} 越界，长度为 {}", index, len)
            }
            Self::NumericalError { message } => {
                write!(f, "数值错误: {}", message)
            }
            Self::ExternalFunction { reason } => {
                write!(f, "外部函数调用失败: {}", reason)
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

/// 运行时结果类型
pub type RuntimeResult<T> = Result<T, RuntimeError>;
