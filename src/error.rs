use thiserror::Error;

/// ExecuteError 表示在启动、等待或终止子进程过程中可能遇到的错误。
///
/// 超时不是错误：超时的执行以 `TimedOut` 状态的结果呈现。
#[derive(Error, Debug)]
pub enum ExecuteError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 等待结果时被中断（例如工作池已关闭），且调用方要求中断即停。
    /// Interrupted while waiting for the result and the caller opted into stop-on-interrupt.
    #[error("interrupted while waiting for the process result")]
    Interrupted,
}
