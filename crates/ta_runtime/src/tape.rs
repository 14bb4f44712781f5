// crates/ta_runtime/src/tape.rs

//! 反向模式磁带
//!
//! 记录标量运算图并按逆序回传伴随量。磁带是显式对象，
//! 由调用方创建并以引用传入（不使用进程级全局注册表）。
//!
//! # 记录类型
//!
//! - 一元/二元算术节点：记录父节点索引与局部偏导权重
//! - 外部函数节点：输入为已记录变量，输出成为新变量，
//!   回传时调用显式的伴随回调（转置雅可比-向量积）
//!
//! # 外部函数约定
//!
//! 求值回调 `(features[n]) -> outputs[m]` 与伴随回调
//! `(features[n], outputSeed[m]) -> featureSeed[n]` 必须在数学上
//! 一致（伴随回调等于求值函数的转置雅可比-向量积），
//! 否则所有下游敏感度被无声污染。

use std::cell::RefCell;
use std::cmp::Ordering;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use crate::error::{RuntimeError, RuntimeResult};
use crate::scalar::AdScalar;

/// 被动变量标记（不在磁带上）
const PASSIVE: usize = usize::MAX;

/// 伴随回调类型: (features, output_seed, feature_seed)
pub type AdjointFn = Box<dyn Fn(&[f64], &[f64], &mut [f64]) -> RuntimeResult<()>>;

/// 磁带记录
enum Record {
    /// 输入变量
    Input,
    /// 一元运算
    Unary { p: usize, w: f64 },
    /// 二元运算
    Binary { p0: usize, w0: f64, p1: usize, w1: f64 },
    /// 外部函数的第 slot 个输出
    ExternalOutput { call: usize, slot: usize },
}

/// 外部函数调用记录
struct ExternalCall {
    /// 输入变量的记录索引（被动输入为 PASSIVE）
    input_idx: Vec<usize>,
    /// 调用时刻的输入主值
    input_vals: Vec<f64>,
    /// 输出数量
    n_outputs: usize,
    /// 伴随回调
    adjoint: AdjointFn,
}

/// 反向模式磁带
///
/// 单线程使用；记录阶段与回传阶段不得交叠。
#[derive(Default)]
pub struct Tape {
    records: RefCell<Vec<Record>>,
    externals: RefCell<Vec<ExternalCall>>,
}

impl Tape {
    /// 创建空磁带
    pub fn new() -> Self {
        Self::default()
    }

    /// 已记录的变量数量
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    /// 磁带是否为空
    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// 注册输入变量
    pub fn var(&self, val: f64) -> Rev<'_> {
        let idx = self.push(Record::Input);
        Rev {
            tape: Some(self),
            idx,
            val,
        }
    }

    fn push(&self, rec: Record) -> usize {
        let mut records = self.records.borrow_mut();
        records.push(rec);
        records.len() - 1
    }

    /// 注册外部函数节点
    ///
    /// 立即执行求值回调得到输出主值，并把 `n_outputs` 个输出
    /// 注册为新变量。回传阶段对每次调用恰好触发一次伴随回调。
    ///
    /// # 错误
    ///
    /// 求值回调失败时透传错误；调用后输出缓冲含非有限值时
    /// 返回 [`RuntimeError::NumericalError`]。
    pub fn external<F>(
        &self,
        inputs: &[Rev<'_>],
        n_outputs: usize,
        eval: F,
        adjoint: AdjointFn,
    ) -> RuntimeResult<Vec<Rev<'_>>>
    where
        F: FnOnce(&[f64], &mut [f64]) -> RuntimeResult<()>,
    {
        let input_idx: Vec<usize> = inputs.iter().map(|r| r.index()).collect();
        let input_vals: Vec<f64> = inputs.iter().map(|r| r.val).collect();

        let mut out_vals = vec![0.0; n_outputs];
        eval(&input_vals, &mut out_vals)?;

        for (i, v) in out_vals.iter().enumerate() {
            if !v.is_finite() {
                return Err(RuntimeError::NumericalError {
                    message: format!("外部函数输出 {} 非有限: {}", i, v),
                });
            }
        }

        let call = {
            let mut externals = self.externals.borrow_mut();
            externals.push(ExternalCall {
                input_idx,
                input_vals,
                n_outputs,
                adjoint,
            });
            externals.len() - 1
        };

        let outputs = out_vals
            .into_iter()
            .enumerate()
            .map(|(slot, val)| Rev {
                tape: Some(self),
                idx: self.push(Record::ExternalOutput { call, slot }),
                val,
            })
            .collect();

        Ok(outputs)
    }

    /// 从种子变量出发逆序回传，返回全部伴随量
    ///
    /// 种子变量的伴随量置 1，其余置 0。
    pub fn reverse(&self, seed: &Rev<'_>) -> RuntimeResult<Adjoints> {
        let records = self.records.borrow();
        let externals = self.externals.borrow();

        let mut adj = vec![0.0; records.len()];
        if seed.idx == PASSIVE {
            return Ok(Adjoints { adj });
        }
        adj[seed.idx] = 1.0;

        // 每次外部调用的输出种子缓冲
        let mut call_seeds: Vec<Option<Vec<f64>>> = vec![None; externals.len()];

        for i in (0..records.len()).rev() {
            let a = adj[i];
            match &records[i] {
                Record::Input => {}
                Record::Unary { p, w } => {
                    if *p != PASSIVE {
                        adj[*p] += w * a;
                    }
                }
                Record::Binary { p0, w0, p1, w1 } => {
                    if *p0 != PASSIVE {
                        adj[*p0] += w0 * a;
                    }
                    if *p1 != PASSIVE {
                        adj[*p1] += w1 * a;
                    }
                }
                Record::ExternalOutput { call, slot } => {
                    let ext = &externals[*call];
                    let seeds = call_seeds[*call]
                        .get_or_insert_with(|| vec![0.0; ext.n_outputs]);
                    seeds[*slot] = a;

                    // 输出记录连续，逆序扫描到 slot 0 时该调用的
                    // 全部输出伴随量已就位
                    if *slot == 0 {
                        let mut feature_seed = vec![0.0; ext.input_idx.len()];
                        (ext.adjoint)(&ext.input_vals, seeds, &mut feature_seed)?;
                        for (j, &pidx) in ext.input_idx.iter().enumerate() {
                            if pidx != PASSIVE {
                                adj[pidx] += feature_seed[j];
                            }
                        }
                    }
                }
            }
        }

        Ok(Adjoints { adj })
    }
}

/// 回传结果：每个记录变量的伴随量
pub struct Adjoints {
    adj: Vec<f64>,
}

impl Adjoints {
    /// 查询某变量的伴随量（被动变量为 0）
    #[inline]
    pub fn wrt(&self, var: &Rev<'_>) -> f64 {
        if var.idx == PASSIVE {
            0.0
        } else {
            self.adj[var.idx]
        }
    }
}

// ============================================================
// 磁带标量
// ============================================================

/// 反向模式标量
///
/// 被动常量不占用磁带记录；任意一侧在磁带上的运算结果
/// 会被记录。比较只看主值，保证与 f64 路径分支一致。
#[derive(Clone, Copy)]
pub struct Rev<'t> {
    tape: Option<&'t Tape>,
    idx: usize,
    val: f64,
}

impl<'t> Rev<'t> {
    /// 创建被动常量
    #[inline]
    pub fn constant(val: f64) -> Self {
        Self {
            tape: None,
            idx: PASSIVE,
            val,
        }
    }

    /// 主值
    #[inline]
    pub fn val(&self) -> f64 {
        self.val
    }

    #[inline]
    fn index(&self) -> usize {
        if self.tape.is_some() {
            self.idx
        } else {
            PASSIVE
        }
    }

    #[inline]
    fn unary(self, val: f64, w: f64) -> Self {
        match self.tape {
            Some(t) => Self {
                tape: Some(t),
                idx: t.push(Record::Unary { p: self.idx, w }),
                val,
            },
            None => Self::constant(val),
        }
    }

    #[inline]
    fn binary(a: Self, b: Self, val: f64, wa: f64, wb: f64) -> Self {
        match a.tape.or(b.tape) {
            Some(t) => Self {
                tape: Some(t),
                idx: t.push(Record::Binary {
                    p0: a.index(),
                    w0: wa,
                    p1: b.index(),
                    w1: wb,
                }),
                val,
            },
            None => Self::constant(val),
        }
    }
}

impl std::fmt::Debug for Rev<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rev")
            .field("idx", &self.idx)
            .field("val", &self.val)
            .finish()
    }
}

impl PartialEq for Rev<'_> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.val == other.val
    }
}

impl PartialOrd for Rev<'_> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.val.partial_cmp(&other.val)
    }
}

impl<'t> Add for Rev<'t> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::binary(self, rhs, self.val + rhs.val, 1.0, 1.0)
    }
}

impl<'t> Sub for Rev<'t> {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::binary(self, rhs, self.val - rhs.val, 1.0, -1.0)
    }
}

impl<'t> Mul for Rev<'t> {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self::binary(self, rhs, self.val * rhs.val, rhs.val, self.val)
    }
}

impl<'t> Div for Rev<'t> {
    type Output = Self;
    #[inline]
    fn div(self, rhs: Self) -> Self {
        // 主值用原生除法，保证与 f64 路径逐位一致
        let val = self.val / rhs.val;
        Self::binary(self, rhs, val, 1.0 / rhs.val, -val / rhs.val)
    }
}

impl<'t> Neg for Rev<'t> {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        self.unary(-self.val, -1.0)
    }
}

impl<'t> AddAssign for Rev<'t> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<'t> SubAssign for Rev<'t> {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<'t> MulAssign for Rev<'t> {
    #[inline]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl<'t> DivAssign for Rev<'t> {
    #[inline]
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl<'t> AdScalar for Rev<'t> {
    #[inline]
    fn from_f64(v: f64) -> Self {
        Self::constant(v)
    }

    #[inline]
    fn value(&self) -> f64 {
        self.val
    }

    #[inline]
    fn sqrt(self) -> Self {
        let r = self.val.sqrt();
        self.unary(r, 0.5 / r)
    }

    #[inline]
    fn exp(self) -> Self {
        let e = self.val.exp();
        self.unary(e, e)
    }

    #[inline]
    fn ln(self) -> Self {
        self.unary(self.val.ln(), 1.0 / self.val)
    }

    #[inline]
    fn powi(self, n: i32) -> Self {
        self.unary(
            self.val.powi(n),
            f64::from(n) * self.val.powi(n - 1),
        )
    }

    #[inline]
    fn tanh(self) -> Self {
        let t = self.val.tanh();
        self.unary(t, 1.0 - t * t)
    }
}
