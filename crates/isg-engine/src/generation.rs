//! 生成结果报告

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// 生成循环结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// 完成了请求的应用次数
    Completed,
    /// 超时
    TimedOut,
    /// 规则池中的规则都已找不到候选形状
    PoolExhausted,
    /// 合并规则找不到可合并的形状，整次生成结束
    MergeExhausted,
}

/// 一次生成的结果
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub requested: usize,
    pub applied: usize,
    pub elapsed: Duration,
    pub stop: StopReason,
}

impl GenerationReport {
    /// 是否完成了全部请求的应用次数
    pub fn completed(&self) -> bool {
        self.stop == StopReason::Completed
    }
}

impl fmt::Display for GenerationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "applied {} of {} rule applications in {:.2}s",
            self.applied,
            self.requested,
            self.elapsed.as_secs_f64()
        )?;
        match self.stop {
            StopReason::Completed => Ok(()),
            StopReason::TimedOut => write!(f, " (timed out)"),
            StopReason::PoolExhausted => write!(f, " (no rule could be applied)"),
            StopReason::MergeExhausted => write!(f, " (nothing left to merge)"),
        }
    }
}
