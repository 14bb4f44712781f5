// crates/ta_runtime/src/buffer.rs

//! 定长字段缓冲区
//!
//! 提供在构造时定长分配、随属主生命周期释放的 f64 缓冲区，
//! 取代手工 new/delete 的裸指针缓冲。特征缓冲区 (9×N) 与
//! 输出缓冲区 (N) 的配对长度在每次使用前校验。

use bytemuck::cast_slice;

use crate::error::{RuntimeError, RuntimeResult};

/// 定长 f64 字段缓冲区
///
/// 长度在创建后不可变；内容由属主组件独占可变访问。
#[derive(Debug, Clone)]
pub struct FieldBuffer {
    data: Box<[f64]>,
}

impl FieldBuffer {
    /// 创建零初始化缓冲区
    pub fn zeros(len: usize) -> Self {
        Self {
            data: vec![0.0; len].into_boxed_slice(),
        }
    }

    /// 从现有数据创建
    pub fn from_vec(data: Vec<f64>) -> Self {
        Self {
            data: data.into_boxed_slice(),
        }
    }

    /// 缓冲区长度
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 只读切片
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// 可变切片
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// 全部填充同一值
    pub fn fill(&mut self, v: f64) {
        self.data.fill(v);
    }

    /// 校验与配对缓冲区的宽度关系: self.len() == width × other.len()
    ///
    /// 特征缓冲区与输出缓冲区必须满足 9×N 对 N 的配对约定。
    pub fn check_pair(&self, other: &FieldBuffer, width: usize) -> RuntimeResult<()> {
        if self.len() != width * other.len() {
            return Err(RuntimeError::BufferSizeMismatch {
                expected: width * other.len(),
                actual: self.len(),
            });
        }
        Ok(())
    }

    /// 检查所有分量是否有限，返回首个非有限分量的索引
    pub fn check_finite(&self) -> RuntimeResult<()> {
        for (i, v) in self.data.iter().enumerate() {
            if !v.is_finite() {
                return Err(RuntimeError::NumericalError {
                    message: format!("缓冲区分量 {} 非有限: {}", i, v),
                });
            }
        }
        Ok(())
    }

    /// 字节视图（零拷贝，GPU 上传等场景）
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        cast_slice(&self.data)
    }
}
