use std::collections::HashMap;
use std::time::Duration;

use crate::io_strategy::ProcessIoStrategy;
use crate::output::LineHandler;

/// ProcessConfig 表示要执行的外部命令及其执行参数。
///
/// 字段：
/// - `program`: 可执行程序名或路径。
/// - `args`: 传递给程序的参数列表。
/// - `environment`: 可选的环境变量映射；`replace_environment` 决定是整体替换
///   还是叠加在继承环境之上。
/// - `timeout`: 可选的完成超时，`None` 表示不设超时；超过后进程被强制终止。
/// - `io_strategy`: stdout/stderr 的捕获策略。
/// - 可选的 stdout/stderr 行级观察者。
///
/// 示例（构造一个带超时的命令配置）：
/// ```ignore
/// use osproc::{ProcessConfig, ProcessIoStrategy};
/// use std::time::Duration;
///
/// let cfg = ProcessConfig::new("sleep", vec!["5".to_string()])
///     .with_timeout(Duration::from_secs(2))
///     .with_io_strategy(ProcessIoStrategy::text());
/// ```
#[derive(Clone)]
pub struct ProcessConfig {
    program: String,
    args: Vec<String>,
    environment: Option<HashMap<String, String>>,
    replace_environment: bool,
    timeout: Option<Duration>,
    io_strategy: ProcessIoStrategy,
    stdout_line_handler: Option<LineHandler>,
    stderr_line_handler: Option<LineHandler>,
}

impl ProcessConfig {
    /// # 创建一个ProcessConfig结构体
    ///
    /// # 参数
    /// - `program`: 执行的命令
    /// - `args`: 命令参数列表
    ///
    /// 默认超时 10 秒，默认文本策略。
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
            environment: None,
            replace_environment: false,
            timeout: Some(Duration::from_secs(10)),
            io_strategy: ProcessIoStrategy::text(),
            stdout_line_handler: None,
            stderr_line_handler: None,
        }
    }

    /// 从完整命令行构造；首元素为可执行程序。空命令行退化为空程序名，
    /// 会在启动时以"启动失败"呈现。
    pub fn from_command_line(mut command_line: Vec<String>) -> Self {
        if command_line.is_empty() {
            return Self::new("", Vec::new());
        }
        let args = command_line.split_off(1);
        let program = command_line.remove(0);
        Self::new(&program, args)
    }

    /// # 设置任务超时时间
    ///
    /// 为该命令设置最大等待时长，超过后进程会被强制终止，
    /// 结果带 `TimedOut` 状态。
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// 取消超时限制（无限等待）。
    pub fn with_no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// 叠加环境变量：在继承的环境之上覆盖给定的键值。
    pub fn with_env(mut self, environment: HashMap<String, String>) -> Self {
        self.environment = Some(environment);
        self.replace_environment = false;
        self
    }

    /// 整体替换环境：子进程只看到给定的键值。
    pub fn with_replaced_env(mut self, environment: HashMap<String, String>) -> Self {
        self.environment = Some(environment);
        self.replace_environment = true;
        self
    }

    /// # 设置 I/O 策略
    pub fn with_io_strategy(mut self, strategy: ProcessIoStrategy) -> Self {
        self.io_strategy = strategy;
        self
    }

    /// 安装 stdout 行级观察者；文本模式下每捕获一行调用一次。
    pub fn with_stdout_line_handler(mut self, handler: LineHandler) -> Self {
        self.stdout_line_handler = Some(handler);
        self
    }

    /// 安装 stderr 行级观察者。
    pub fn with_stderr_line_handler(mut self, handler: LineHandler) -> Self {
        self.stderr_line_handler = Some(handler);
        self
    }

    /// # 获取程序名
    pub fn program(&self) -> &str {
        &self.program
    }

    /// # 获取命令参数
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// 完整命令行（程序 + 参数）。
    pub fn command_line(&self) -> Vec<String> {
        let mut command = Vec::with_capacity(1 + self.args.len());
        command.push(self.program.clone());
        command.extend(self.args.iter().cloned());
        command
    }

    /// # 获取环境变量映射
    pub fn environment(&self) -> Option<&HashMap<String, String>> {
        self.environment.as_ref()
    }

    /// # 环境是整体替换还是叠加
    pub fn is_replace_environment(&self) -> bool {
        self.replace_environment
    }

    /// # 获取超时时间（None 表示不设超时）
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// # 获取 I/O 策略
    pub fn io_strategy(&self) -> &ProcessIoStrategy {
        &self.io_strategy
    }

    pub(crate) fn stdout_line_handler(&self) -> Option<LineHandler> {
        self.stdout_line_handler.clone()
    }

    pub(crate) fn stderr_line_handler(&self) -> Option<LineHandler> {
        self.stderr_line_handler.clone()
    }
}

impl std::fmt::Debug for ProcessConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessConfig")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("environment", &self.environment)
            .field("replace_environment", &self.replace_environment)
            .field("timeout", &self.timeout)
            .field("io_strategy", &self.io_strategy)
            .finish()
    }
}
