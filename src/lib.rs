//! # osproc
//!
//! 竞争安全的 OS 进程执行与督管子系统 | Race-safe OS process execution.
//!
//! 启动外部进程，捕获其 stdout/stderr（文本行或原始字节），施加超时，
//! 并在"进程自然退出"与"并发的强制终止"之间做无死锁、无结果丢失的仲裁。
//! 每次执行终结于恰好一个 [`ProcessResult`]。
//!
//! ## 快速开始
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use osproc::{ProcessConfig, ProcessExecutor, WorkerPool};
//!
//! let pool = Arc::new(WorkerPool::new("osproc", 10));
//!
//! // 阻塞执行
//! let config = ProcessConfig::new("echo", vec!["hello".to_string()])
//!     .with_timeout(Duration::from_secs(2));
//! let result = ProcessExecutor::new(config, Arc::clone(&pool)).run(false)?;
//! assert!(result.is_ok());
//!
//! // 非阻塞执行 + 强制终止
//! let config = ProcessConfig::new("sleep", vec!["60".to_string()]);
//! let handler = ProcessExecutor::new(config, pool).run_unblocking();
//! handler.terminate()?;
//! let result = handler.get_result()?;
//! assert!(result.is_timed_out());
//! # Ok::<(), osproc::ExecuteError>(())
//! ```
//!
//! ## 设计要点
//!
//! - 进程记录放在可原子换出的单槽里：取走记录即取得终结权，
//!   运行者与杀手之间至多一方能赢，绝无双重终结。
//! - 杀手扑空（进程已自然终结）时不伪造失败，调用方拿到运行者的真实结果。
//! - 所有等待都有界：超时执行以 `TimedOut` 状态终结，进程收到终止信号，
//!   拒不退出者升级为强杀。
//! - I/O 捕获只读取当前可读的数据，绝不无限阻塞在管道上。

/// 操作层日志目标：命令启动、执行结果等面向使用者的事件。
pub(crate) const OPERATION_TARGET: &str = "osproc::operation";

/// 机器层日志目标：杀手动作、I/O 异常、工作线程故障等内部事件。
pub(crate) const MACHINE_TARGET: &str = "osproc::machine";

mod callable;
mod config;
mod error;
mod executor;
mod handler;
mod io_handler;
mod io_strategy;
mod output;
mod pool;
mod result;
mod sys;

pub use callable::CallableExecutor;
pub use config::ProcessConfig;
pub use error::ExecuteError;
pub use executor::{ProcessExecutor, run, run_and_log};
pub use handler::ProcessHandler;
pub use io_handler::{BinaryIoHandler, PipeStream, ProcessIo, ProcessIoHandler, TextIoHandler};
pub use io_strategy::ProcessIoStrategy;
pub use output::{LineHandler, Output};
pub use pool::{Completion, TaskHandle, WorkerPool};
pub use result::{
    EXIT_VALUE_FOR_TERMINATION, EXIT_VALUE_OK, ExecutionStatus, IoResult, ProcessResult,
    ProcessStatus,
};
