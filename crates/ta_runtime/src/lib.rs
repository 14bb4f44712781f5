// crates/ta_runtime/src/lib.rs

//! turbadj 运行时层
//!
//! 提供湍流伴随计算所需的底层抽象，包括：
//! - 可微标量抽象 (scalar) - 普通求值 / 前向 / 反向三种模式的统一接口
//! - 前向模式对偶数 (dual)
//! - 反向模式磁带 (tape) - 支持外部函数节点注册
//! - 定长字段缓冲区 (buffer)
//! - 运行时错误类型 (error)
//!
//! # 架构约束
//!
//! 本 crate 是叶子层，不依赖任何内部 crate。所有单元级公式
//! 必须通过 [`AdScalar`] 泛型化，禁止在公式代码中硬编码 `f64`。

pub mod buffer;
pub mod dual;
pub mod error;
pub mod scalar;
pub mod tape;

pub use buffer::FieldBuffer;
pub use dual::Dual;
pub use error::{RuntimeError, RuntimeResult};
pub use scalar::AdScalar;
pub use tape::{Adjoints, Rev, Tape};
