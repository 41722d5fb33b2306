use std::sync::Arc;
use std::time::Duration;

use crate::error::ExecuteError;
use crate::executor::{ExecutorInner, RunnerHandle};
use crate::result::{ExecutionStatus, ProcessResult};

/// 非阻塞执行的句柄 | Handle to a detached execution.
///
/// 由 [`crate::ProcessExecutor::run_unblocking`] 返回。持有者可以等待终局
/// 结果，也可以发起强制终止；两者都是竞争安全的，与进程的自然退出
/// 任意交错也不会丢结果或产生伪造的终局。
pub struct ProcessHandler {
    inner: Arc<ExecutorInner>,
    runner: RunnerHandle,
}

impl ProcessHandler {
    pub(crate) fn new(inner: Arc<ExecutorInner>, runner: RunnerHandle) -> Self {
        Self { inner, runner }
    }

    /// 阻塞等待终局结果，沿用配置里的超时。
    ///
    /// 结果恰好交付一次；在同一个句柄上重复调用，后续调用得到
    /// `Interrupted` 状态的兜底结果。
    pub fn get_result(&self) -> Result<ProcessResult, ExecuteError> {
        self.inner
            .get_process_result(true, &self.runner, self.inner.timeout())
    }

    /// 阻塞等待终局结果，最多等待 `timeout`（覆盖配置里的超时）。
    pub fn get_result_within(&self, timeout: Duration) -> Result<ProcessResult, ExecuteError> {
        self.inner
            .get_process_result(true, &self.runner, Some(timeout))
    }

    /// 强制终止进程。
    ///
    /// 返回 `true` 表示本次调用确实终结了一个仍在督管下的进程；
    /// `false` 表示杀手扑空（进程已经自然终结，或已被终结过），
    /// 此时真实结果仍可通过 [`ProcessHandler::get_result`] 取得。
    /// 阻塞时长有固定的短上限。
    pub fn terminate(&self) -> Result<bool, ExecuteError> {
        Ok(self
            .inner
            .kill_process(ExecutionStatus::TimedOut, true)?
            .is_some())
    }
}
