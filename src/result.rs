use tracing::Level;

use crate::OPERATION_TARGET;
use crate::output::Output;
use crate::sys;

/// 干净退出的退出码。
pub const EXIT_VALUE_OK: i32 = 0;

/// 被强制终止的进程在本平台上呈现的退出码（POSIX 143 / Windows 1）。
pub const EXIT_VALUE_FOR_TERMINATION: i32 = sys::EXIT_VALUE_FOR_TERMINATION;

/// 等待层面的执行状态 | Wait-level execution status.
///
/// 描述"等待结果"这件事的结局，与子进程自身的退出码正交：
/// 一个 `TimedOut` 的执行仍然可能带有部分输出与一个（被杀后的）退出码。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// 正常等到了结果
    Complete,
    /// 等待超时，进程被强制终止
    TimedOut,
    /// 等待被中断（工作池关闭或任务被丢弃），进程被强制终止
    Interrupted,
    /// 启动或执行中抛出异常
    Exception,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Complete => write!(f, "complete"),
            ExecutionStatus::TimedOut => write!(f, "timed out"),
            ExecutionStatus::Interrupted => write!(f, "interrupted"),
            ExecutionStatus::Exception => write!(f, "exception"),
        }
    }
}

/// I/O 泵任务自身的子结果，嵌在 [`ProcessResult`] 里。
///
/// I/O 失败不推翻进程本身的退出（见 [`ProcessResult::is_ok_ignore_io`]），
/// 但会使严格的 [`ProcessResult::is_ok`] 为假。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoResult {
    status: ExecutionStatus,
    error: Option<String>,
}

impl IoResult {
    /// 顺利完成（或本次执行根本没有 I/O 任务）。
    pub fn complete() -> Self {
        Self {
            status: ExecutionStatus::Complete,
            error: None,
        }
    }

    pub(crate) fn new(status: ExecutionStatus, error: Option<String>) -> Self {
        Self { status, error }
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_ok(&self) -> bool {
        self.status == ExecutionStatus::Complete && self.error.is_none()
    }
}

/// 把丰富的执行结果折叠成三档，供重试决策使用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStatus {
    /// 进程干净退出且 I/O 无恙
    Ok,
    /// 可重试的错误（超时或中断），附错误详情
    RetriableError(String),
    /// 硬错误，附错误详情
    Error(String),
}

/// ProcessResult 是一次执行的最终快照，构造后不可变，每次执行恰好交付一次。
///
/// `exit_value` 为 `None` 表示"没有退出值"——典型于启动失败
/// （此时 `startup_failure` 非空）或杀手未能等到进程收尸。
#[derive(Debug, Clone)]
pub struct ProcessResult {
    command: Vec<String>,
    process_number: u64,
    status: ExecutionStatus,
    io_result: IoResult,
    startup_failure: Option<String>,
    exit_value: Option<i32>,
    output: Output,
    error_output: Vec<String>,
}

impl ProcessResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        command: Vec<String>,
        process_number: u64,
        status: ExecutionStatus,
        io_result: IoResult,
        startup_failure: Option<String>,
        exit_value: Option<i32>,
        output: Output,
        error_output: Vec<String>,
    ) -> Self {
        Self {
            command,
            process_number,
            status,
            io_result,
            startup_failure,
            exit_value,
            output,
            error_output,
        }
    }

    /// 没有任何载荷的结果，用于启动失败与极端竞争下的兜底路径。
    pub(crate) fn empty(
        command: Vec<String>,
        process_number: u64,
        status: ExecutionStatus,
        startup_failure: Option<String>,
        binary: bool,
    ) -> Self {
        Self::new(
            command,
            process_number,
            status,
            IoResult::complete(),
            startup_failure,
            None,
            if binary {
                Output::Binary(Vec::new())
            } else {
                Output::Text(Vec::new())
            },
            Vec::new(),
        )
    }

    /// # 获取命令行
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// # 获取执行编号（仅用于日志区分）
    pub fn process_number(&self) -> u64 {
        self.process_number
    }

    /// # 获取等待层面的执行状态
    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    /// # 获取 I/O 泵任务的子结果
    pub fn io_result(&self) -> &IoResult {
        &self.io_result
    }

    /// 启动失败的描述；进程根本没有跑起来时非空。
    pub fn startup_failure_message(&self) -> Option<&str> {
        self.startup_failure.as_deref()
    }

    /// 子进程退出值；`None` 表示没有退出值。
    pub fn exit_value(&self) -> Option<i32> {
        self.exit_value
    }

    /// 文本模式下捕获的 stdout 行（二进制模式返回空切片）。
    pub fn output(&self) -> &[String] {
        self.output.lines()
    }

    /// 二进制模式下捕获的 stdout 字节（文本模式返回空切片）。
    pub fn binary_output(&self) -> &[u8] {
        self.output.bytes()
    }

    /// 完整的输出载体（带类型标签）。
    pub fn raw_output(&self) -> &Output {
        &self.output
    }

    /// 单独捕获的 stderr 行；合并策略下为空。
    pub fn error_output(&self) -> &[String] {
        &self.error_output
    }

    /// 进程是否真正运行过（等到了退出值）。
    pub fn is_run(&self) -> bool {
        self.exit_value.is_some()
    }

    /// 进程干净退出（退出值为 0），不管 I/O 子结果如何。
    pub fn is_ok_ignore_io(&self) -> bool {
        self.exit_value == Some(EXIT_VALUE_OK)
    }

    /// 进程干净退出且 I/O 子结果也无恙。
    pub fn is_ok(&self) -> bool {
        self.is_ok_ignore_io() && self.io_result.is_ok()
    }

    pub fn is_timed_out(&self) -> bool {
        self.status == ExecutionStatus::TimedOut
    }

    pub fn is_interrupted(&self) -> bool {
        self.status == ExecutionStatus::Interrupted
    }

    /// 退出值是否等于本平台"被强制终止"的哨兵值。
    pub fn is_terminated(&self) -> bool {
        self.exit_value == Some(EXIT_VALUE_FOR_TERMINATION)
    }

    /// 错误详情，偏好顺序：stderr 文本 → stdout 文本 → 启动失败消息 → 退出值。
    fn error_detail(&self) -> String {
        if !self.error_output.is_empty() {
            return self.error_output.join("\n");
        }
        let stdout_lines = self.output.lines();
        if !stdout_lines.is_empty() {
            return stdout_lines.join("\n");
        }
        if let Some(msg) = &self.startup_failure {
            return msg.clone();
        }
        match self.exit_value {
            Some(v) => format!("exit value {v}"),
            None => format!("process {}", self.status),
        }
    }

    /// 折叠为三档状态：成功 / 可重试错误（超时、中断）/ 硬错误。
    pub fn to_status(&self) -> ProcessStatus {
        if self.is_ok() {
            return ProcessStatus::Ok;
        }
        let detail = self.error_detail();
        if self.is_timed_out() || self.is_interrupted() {
            ProcessStatus::RetriableError(detail)
        } else {
            ProcessStatus::Error(detail)
        }
    }

    fn command_line(&self) -> String {
        self.command.join(" ")
    }

    /// 多行结构化记录本次执行：命令、结局分类与捕获的输出。
    ///
    /// 成功的执行记在 DEBUG，失败的记在 WARN；级别未开启时零开销返回。
    pub fn log(&self) {
        if self.is_ok() {
            if tracing::enabled!(target: OPERATION_TARGET, Level::DEBUG) {
                self.log_at(Level::DEBUG);
            }
        } else if tracing::enabled!(target: OPERATION_TARGET, Level::WARN) {
            self.log_at(Level::WARN);
        }
    }

    /// 与 [`ProcessResult::log`] 相同的内容，强制记在 INFO。
    pub fn log_as_info(&self) {
        if tracing::enabled!(target: OPERATION_TARGET, Level::INFO) {
            self.log_at(Level::INFO);
        }
    }

    fn log_at(&self, level: Level) {
        macro_rules! emit {
            ($($arg:tt)*) => {
                match level {
                    Level::DEBUG => tracing::debug!(target: OPERATION_TARGET, $($arg)*),
                    Level::INFO => tracing::info!(target: OPERATION_TARGET, $($arg)*),
                    _ => tracing::warn!(target: OPERATION_TARGET, $($arg)*),
                }
            };
        }
        emit!(
            process = self.process_number,
            command = %self.command_line(),
            status = %self.status,
            exit_value = ?self.exit_value,
            ok = self.is_ok(),
            "process finished"
        );
        if let Some(msg) = &self.startup_failure {
            emit!(process = self.process_number, "startup failure: {msg}");
        }
        if !self.io_result.is_ok() {
            emit!(
                process = self.process_number,
                io_status = %self.io_result.status(),
                io_error = ?self.io_result.error(),
                "process I/O did not complete cleanly"
            );
        }
        match &self.output {
            Output::Text(lines) => {
                for line in lines {
                    emit!(process = self.process_number, "stdout> {line}");
                }
            }
            Output::Binary(bytes) => {
                emit!(process = self.process_number, "stdout: {} bytes (binary)", bytes.len());
            }
        }
        for line in &self.error_output {
            emit!(process = self.process_number, "stderr> {line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_result(
        status: ExecutionStatus,
        exit_value: Option<i32>,
        lines: Vec<String>,
        errors: Vec<String>,
    ) -> ProcessResult {
        ProcessResult::new(
            vec!["cmd".to_string()],
            7,
            status,
            IoResult::complete(),
            None,
            exit_value,
            Output::Text(lines),
            errors,
        )
    }

    #[test]
    fn clean_exit_is_ok() {
        let r = text_result(ExecutionStatus::Complete, Some(0), vec![], vec![]);
        assert!(r.is_ok());
        assert!(r.is_ok_ignore_io());
        assert!(r.is_run());
        assert_eq!(r.to_status(), ProcessStatus::Ok);
    }

    #[test]
    fn io_failure_fails_strict_ok_only() {
        let r = ProcessResult::new(
            vec!["cmd".to_string()],
            1,
            ExecutionStatus::Complete,
            IoResult::new(ExecutionStatus::Exception, Some("broken pipe".to_string())),
            None,
            Some(0),
            Output::Text(vec![]),
            vec![],
        );
        assert!(r.is_ok_ignore_io());
        assert!(!r.is_ok());
    }

    #[test]
    fn timed_out_result_is_retriable() {
        let r = text_result(ExecutionStatus::TimedOut, Some(EXIT_VALUE_FOR_TERMINATION), vec![], vec![]);
        assert!(r.is_timed_out());
        assert!(r.is_terminated());
        assert!(matches!(r.to_status(), ProcessStatus::RetriableError(_)));
    }

    #[test]
    fn error_detail_prefers_stderr_then_stdout_then_startup_message() {
        let r = text_result(
            ExecutionStatus::Complete,
            Some(2),
            vec!["from stdout".to_string()],
            vec!["from stderr".to_string()],
        );
        assert_eq!(r.to_status(), ProcessStatus::Error("from stderr".to_string()));

        let r = text_result(
            ExecutionStatus::Complete,
            Some(2),
            vec!["from stdout".to_string()],
            vec![],
        );
        assert_eq!(r.to_status(), ProcessStatus::Error("from stdout".to_string()));

        let r = ProcessResult::empty(
            vec!["cmd".to_string()],
            1,
            ExecutionStatus::Exception,
            Some("no such file".to_string()),
            false,
        );
        assert_eq!(r.to_status(), ProcessStatus::Error("no such file".to_string()));
    }

    #[test]
    fn startup_failure_has_no_exit_value() {
        let r = ProcessResult::empty(
            vec!["missing".to_string()],
            1,
            ExecutionStatus::Exception,
            Some("not found".to_string()),
            false,
        );
        assert!(!r.is_run());
        assert!(!r.is_ok());
        assert_eq!(r.exit_value(), None);
        assert_eq!(r.startup_failure_message(), Some("not found"));
    }

    #[test]
    #[cfg(unix)]
    fn termination_sentinel_is_143_on_posix() {
        assert_eq!(EXIT_VALUE_FOR_TERMINATION, 143);
    }

    #[test]
    #[cfg(windows)]
    fn termination_sentinel_is_1_on_windows() {
        assert_eq!(EXIT_VALUE_FOR_TERMINATION, 1);
    }

    #[test]
    fn log_is_cheap_smoke_test() {
        let r = text_result(ExecutionStatus::Complete, Some(0), vec!["x".to_string()], vec![]);
        r.log();
        r.log_as_info();
    }
}
