use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use wait_timeout::ChildExt;

use crate::config::ProcessConfig;
use crate::error::ExecuteError;
use crate::handler::ProcessHandler;
use crate::io_handler::{
    BinaryIoHandler, Drainer, PipeStream, ProcessIo, ProcessIoHandler, TextIoHandler,
};
use crate::output::ProcessOutput;
use crate::pool::{Completion, TaskHandle, WorkerPool};
use crate::result::{ExecutionStatus, IoResult, ProcessResult};
use crate::sys;
use crate::{MACHINE_TARGET, OPERATION_TARGET};

/// 短超时：杀手收尸与兜底等待的单位时长（1/5 秒）。
pub(crate) const SHORT_TIMEOUT: Duration = Duration::from_millis(200);

/// 同线程运行者两次轮询之间的停顿（1/100 秒）。
const PAUSE_MILLIS: Duration = Duration::from_millis(10);

/// 等待尾部输出时按总超时折算的比例。
const OUTPUT_READING_TIMEOUT_FRACTION: f64 = 0.1;

/// 等待尾部输出的时长下限。
const OUTPUT_READING_TIMEOUT_MIN: Duration = Duration::from_millis(250);

/// 等待杀手任务完成的固定上限：覆盖 I/O 宽限下限、一次泵休眠与收尸。
const KILL_WAIT: Duration = Duration::from_millis(650);

/// 全局执行编号，只用于区分日志里的不同执行。
static PROCESS_COUNTER: AtomicU64 = AtomicU64::new(0);

/// 进程记录：存活的 OS 进程句柄、可选的在途 I/O 任务与存活标志的绑定。
///
/// 每次执行恰好一条记录，放在可原子换出的单槽里；取走记录（take）即取得
/// 终结权，运行者与杀手之间至多一方能赢。
pub(crate) struct ProcessRecord {
    child: Child,
    io_task: Option<TaskHandle<std::io::Result<()>>>,
    running: Arc<AtomicBool>,
}

/// 运行者任务的产出。
pub(crate) enum RunnerOutcome {
    /// 进程自然退出，运行者终结并给出结果
    Completed(ProcessResult),
    /// 记录被杀手抢走，终局结果由杀手交付
    Preempted,
}

pub(crate) type RunnerHandle = TaskHandle<Result<RunnerOutcome, ExecuteError>>;

/// 一次执行的共享内部状态；运行者、杀手与等待结果的线程都持有它。
pub(crate) struct ExecutorInner {
    config: ProcessConfig,
    pool: Arc<WorkerPool>,
    process_number: u64,
    output: Arc<Mutex<ProcessOutput>>,
    /// 唯一的同步点：记录的原子性取走决定谁来终结
    record_slot: Mutex<Option<ProcessRecord>>,
    /// 杀手终结时在此寄存终局结果，供阻塞等待的线程取用
    killed: Mutex<Option<ProcessResult>>,
    io_handler: Option<Arc<dyn ProcessIoHandler>>,
    /// 等待 I/O 任务收尾的时长；`None` 跟随"无超时"配置
    io_timeout: Option<Duration>,
}

/// ProcessExecutor 负责启动并督管一个外部 OS 进程。
///
/// 一个实例对应恰好一次执行，终结于恰好一个 [`ProcessResult`]，不可复用。
/// 启动、I/O 泵与强制终止都跑在注入的 [`WorkerPool`] 上。
///
/// # 示例
/// ```ignore
/// use std::sync::Arc;
/// use osproc::{ProcessConfig, ProcessExecutor, WorkerPool};
///
/// let pool = Arc::new(WorkerPool::new("osproc", 10));
/// let config = ProcessConfig::new("echo", vec!["hello".to_string()]);
/// let result = ProcessExecutor::new(config, pool).run(false)?;
/// assert!(result.is_ok());
/// # Ok::<(), osproc::ExecuteError>(())
/// ```
pub struct ProcessExecutor {
    inner: Arc<ExecutorInner>,
}

impl ProcessExecutor {
    /// # 创建一次执行
    ///
    /// # 参数
    /// - `config`: 命令行、环境、超时、I/O 策略与观察者。
    /// - `pool`: 执行各子任务的工作线程池。
    pub fn new(config: ProcessConfig, pool: Arc<WorkerPool>) -> Self {
        let process_number = PROCESS_COUNTER.fetch_add(1, Ordering::SeqCst);
        let strategy = config.io_strategy().clone();
        let output = Arc::new(Mutex::new(ProcessOutput::new(
            strategy.is_binary_output(),
            config.stdout_line_handler(),
            config.stderr_line_handler(),
        )));
        // 有自定义处理器则一律用它；否则按策略选默认处理器或同线程轮询
        let io_handler: Option<Arc<dyn ProcessIoHandler>> =
            if let Some(custom) = strategy.custom_handler() {
                Some(Arc::clone(custom))
            } else if strategy.is_io_in_same_thread() {
                None
            } else if strategy.is_binary_output() {
                Some(Arc::new(BinaryIoHandler::new(
                    strategy.clone(),
                    Arc::clone(&output),
                )))
            } else {
                Some(Arc::new(TextIoHandler::new(
                    strategy.clone(),
                    Arc::clone(&output),
                )))
            };
        let io_timeout = config
            .timeout()
            .map(|t| OUTPUT_READING_TIMEOUT_MIN.max(t.mul_f64(OUTPUT_READING_TIMEOUT_FRACTION)));
        Self {
            inner: Arc::new(ExecutorInner {
                config,
                pool,
                process_number,
                output,
                record_slot: Mutex::new(None),
                killed: Mutex::new(None),
                io_handler,
                io_timeout,
            }),
        }
    }

    /// # 获取执行编号（仅用于日志区分）
    pub fn process_number(&self) -> u64 {
        self.inner.process_number
    }

    /// 阻塞执行：启动进程并等待终局结果。
    ///
    /// # 参数
    /// - `stop_on_interrupt`: 为 true 时，等待被中断的执行在清理完成后
    ///   以 [`ExecuteError::Interrupted`] 上抛，而不是作为数据返回。
    pub fn run(self, stop_on_interrupt: bool) -> Result<ProcessResult, ExecuteError> {
        let timeout = self.inner.config.timeout();
        let runner = self.inner.launch_runner();
        self.inner
            .get_process_result(stop_on_interrupt, &runner, timeout)
    }

    /// 非阻塞执行：立即返回句柄，结果与终止都通过句柄操作。
    pub fn run_unblocking(self) -> ProcessHandler {
        let runner = self.inner.launch_runner();
        ProcessHandler::new(self.inner, runner)
    }
}

impl ExecutorInner {
    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.config.timeout()
    }

    /// 把运行者任务提交到池里；是否带独立 I/O 泵由处理器的有无决定。
    fn launch_runner(self: &Arc<Self>) -> RunnerHandle {
        if let Some(handler) = &self.io_handler {
            let inner = Arc::clone(self);
            let handler = Arc::clone(handler);
            self.pool.submit(move || inner.run_with_io_pump(handler))
        } else {
            let inner = Arc::clone(self);
            self.pool.submit(move || inner.run_io_in_same_thread())
        }
    }

    /// 启动 OS 进程并把三个流交出来。
    fn launch(&self) -> Result<(Child, ProcessIo), ExecuteError> {
        let mut command = Command::new(self.config.program());
        command.args(self.config.args());
        if self.config.is_replace_environment() {
            command.env_clear();
        }
        if let Some(environment) = self.config.environment() {
            command.envs(environment);
        }
        command.stdin(Stdio::piped());

        // OS 级合并：两个写端指向同一条管道（Unix）；其它平台退化为泵级折叠
        let mut merged_reader: Option<PipeStream> = None;
        #[cfg(unix)]
        if self.config.io_strategy().is_merge_stderr() {
            let (stdout_write, stderr_write, read_end) = sys::merged_output_pipe()?;
            sys::set_nonblocking(&read_end)?;
            command.stdout(stdout_write).stderr(stderr_write);
            merged_reader = Some(Box::new(read_end) as PipeStream);
        }
        if merged_reader.is_none() {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        if tracing::enabled!(target: OPERATION_TARGET, tracing::Level::DEBUG) {
            tracing::debug!(
                target: OPERATION_TARGET,
                process = self.process_number,
                command = %self.config.command_line().join(" "),
                same_thread_io = self.io_handler.is_none(),
                "running command"
            );
        }

        let mut child = command.spawn()?;
        let stdin = child.stdin.take();
        let stdout: Option<PipeStream> = match merged_reader {
            Some(reader) => Some(reader),
            None => match child.stdout.take() {
                Some(stream) => {
                    sys::set_nonblocking(&stream)?;
                    Some(Box::new(stream) as PipeStream)
                }
                None => None,
            },
        };
        let stderr: Option<PipeStream> = match child.stderr.take() {
            Some(stream) => {
                sys::set_nonblocking(&stream)?;
                Some(Box::new(stream) as PipeStream)
            }
            None => None,
        };
        Ok((
            child,
            ProcessIo {
                stdin,
                stdout,
                stderr,
            },
        ))
    }

    /// 把记录放进单槽，供并发的终止请求取用。
    fn publish_record(&self, record: ProcessRecord) {
        *self
            .record_slot
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(record);
    }

    /// 轮询等待进程退出；记录被杀手取走时返回 `None`，
    /// 否则连记录一起取走（取得终结权）并返回退出状态。
    fn await_exit(&self) -> Result<Option<(ProcessRecord, std::process::ExitStatus)>, ExecuteError> {
        loop {
            {
                let mut slot = self.record_slot.lock().unwrap_or_else(|e| e.into_inner());
                match slot.as_mut() {
                    // 杀手抢走了记录，终局由它交付
                    None => return Ok(None),
                    Some(record) => match record.child.try_wait() {
                        Ok(Some(status)) => {
                            let Some(record) = slot.take() else {
                                return Ok(None);
                            };
                            return Ok(Some((record, status)));
                        }
                        Ok(None) => {}
                        Err(e) => return Err(ExecuteError::Io(e)),
                    },
                }
            }
            thread::sleep(PAUSE_MILLIS);
        }
    }

    /// 带独立 I/O 泵的运行者。
    fn run_with_io_pump(
        self: Arc<Self>,
        handler: Arc<dyn ProcessIoHandler>,
    ) -> Result<RunnerOutcome, ExecuteError> {
        let result = self.try_run_with_io_pump(handler);
        if let Err(e) = &result {
            tracing::error!(
                target: MACHINE_TARGET,
                process = self.process_number,
                "exception when launching: {e}"
            );
        }
        result
    }

    fn try_run_with_io_pump(
        self: &Arc<Self>,
        handler: Arc<dyn ProcessIoHandler>,
    ) -> Result<RunnerOutcome, ExecuteError> {
        let (child, io) = self.launch()?;
        let running = Arc::new(AtomicBool::new(true));
        let pump_running = Arc::clone(&running);
        let io_task = self
            .pool
            .submit(move || handler.handle(&pump_running, io));
        self.publish_record(ProcessRecord {
            child,
            io_task: Some(io_task),
            running,
        });

        let Some((record, exit_status)) = self.await_exit()? else {
            return Ok(RunnerOutcome::Preempted);
        };
        // 给 I/O 泵时间冲刷尾部输出；I/O 子失败降级为 WARN，不推翻退出结果
        let io_result = self.wait_for_io(&record);
        Ok(RunnerOutcome::Completed(self.build_result(
            ExecutionStatus::Complete,
            io_result,
            Some(sys::exit_code(exit_status)),
        )))
    }

    /// 同线程运行者：排空、查退出状态、小睡，循环往复。
    fn run_io_in_same_thread(self: Arc<Self>) -> Result<RunnerOutcome, ExecuteError> {
        let result = self.try_run_io_in_same_thread();
        if let Err(e) = &result {
            tracing::error!(
                target: MACHINE_TARGET,
                process = self.process_number,
                "exception when launching: {e}"
            );
        }
        result
    }

    fn try_run_io_in_same_thread(self: &Arc<Self>) -> Result<RunnerOutcome, ExecuteError> {
        let (child, io) = self.launch()?;
        let running = Arc::new(AtomicBool::new(true));
        let mut drainer = Drainer::new(
            io,
            self.config.io_strategy().clone(),
            Arc::clone(&self.output),
        );
        self.publish_record(ProcessRecord {
            child,
            io_task: None,
            running,
        });

        let exit_status = loop {
            if let Err(e) = drainer.drain_once() {
                tracing::warn!(
                    target: MACHINE_TARGET,
                    process = self.process_number,
                    "IOException when reading stdout/stderr, msg='{e}'"
                );
            }
            {
                let mut slot = self.record_slot.lock().unwrap_or_else(|e| e.into_inner());
                match slot.as_mut() {
                    None => return Ok(RunnerOutcome::Preempted),
                    Some(record) => match record.child.try_wait() {
                        Ok(Some(status)) => {
                            slot.take();
                            break status;
                        }
                        Ok(None) => {}
                        Err(e) => return Err(ExecuteError::Io(e)),
                    },
                }
            }
            thread::sleep(PAUSE_MILLIS);
        };
        // 进程已退出：最后一轮排空收取尾部输出
        if let Err(e) = drainer.drain_final() {
            tracing::warn!(
                target: MACHINE_TARGET,
                process = self.process_number,
                "IOException when reading stdout/stderr, msg='{e}'"
            );
        }
        Ok(RunnerOutcome::Completed(self.build_result(
            ExecutionStatus::Complete,
            IoResult::complete(),
            Some(sys::exit_code(exit_status)),
        )))
    }

    /// 停掉 I/O 泵并在有界时限内等它收尾；失败只记 WARN。
    fn wait_for_io(&self, record: &ProcessRecord) -> IoResult {
        if self.io_handler.is_none() {
            return IoResult::complete();
        }
        let Some(io_task) = &record.io_task else {
            return IoResult::new(
                ExecutionStatus::Exception,
                Some("missing I/O task".to_string()),
            );
        };
        // 清掉存活标志即泵的停机信号；泵会再做恰好一轮排空
        record.running.store(false, Ordering::Release);
        let io_result = match io_task.wait(self.io_timeout) {
            Completion::Finished(Ok(())) => IoResult::complete(),
            Completion::Finished(Err(e)) => {
                IoResult::new(ExecutionStatus::Exception, Some(e.to_string()))
            }
            Completion::TimedOut => IoResult::new(ExecutionStatus::TimedOut, None),
            Completion::Aborted => IoResult::new(ExecutionStatus::Interrupted, None),
        };
        if !io_result.is_ok() {
            tracing::warn!(
                target: MACHINE_TARGET,
                process = self.process_number,
                io_status = %io_result.status(),
                io_error = ?io_result.error(),
                "exception when doing process I/O"
            );
        }
        io_result
    }

    /// 杀手本体：原子取走记录；扑空即让位（运行者已终结）。
    fn kill_now(&self, status: ExecutionStatus) -> Option<ProcessResult> {
        let record = self
            .record_slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        // 扑空说明运行者赢得了记录，真实结果从运行者处取
        let mut record = record?;
        let io_result = self.wait_for_io(&record);
        if let Err(e) = sys::terminate(&mut record.child) {
            tracing::warn!(
                target: MACHINE_TARGET,
                process = self.process_number,
                "failed to deliver termination signal: {e}"
            );
        }
        // 有界宽限期收尸；拒不退出则升级为强杀
        let exit_value = match record.child.wait_timeout(SHORT_TIMEOUT) {
            Ok(Some(exit_status)) => Some(sys::exit_code(exit_status)),
            Ok(None) => {
                let _ = record.child.kill();
                match record.child.wait_timeout(SHORT_TIMEOUT) {
                    Ok(Some(exit_status)) => Some(sys::exit_code(exit_status)),
                    _ => None,
                }
            }
            Err(e) => {
                tracing::warn!(
                    target: MACHINE_TARGET,
                    process = self.process_number,
                    "failed to reap killed process: {e}"
                );
                None
            }
        };
        if tracing::enabled!(target: MACHINE_TARGET, tracing::Level::INFO) {
            tracing::info!(
                target: MACHINE_TARGET,
                process = self.process_number,
                command = %self.config.command_line().join(" "),
                "killed process"
            );
        }
        let result = self.build_result(status, io_result, exit_value);
        // 寄存一份：另一线程可能正阻塞在 get_result 上等这个终局
        *self.killed.lock().unwrap_or_else(|e| e.into_inner()) = Some(result.clone());
        Some(result)
    }

    /// 提交杀手任务并在固定的短时限内等它交差，随后按需要上抛中断。
    pub(crate) fn kill_process(
        self: &Arc<Self>,
        status: ExecutionStatus,
        stop_on_interrupt: bool,
    ) -> Result<Option<ProcessResult>, ExecuteError> {
        let inner = Arc::clone(self);
        let killer = self.pool.submit(move || inner.kill_now(status));
        let killed = killer.wait(Some(KILL_WAIT)).finished().flatten();
        check_stop(status, stop_on_interrupt)?;
        Ok(killed)
    }

    /// 等待运行者结果，处理超时/中断/异常与两个方向的竞争。
    ///
    /// 竞争不变式：绝不向调用方交付"状态为 Complete 却没有载荷"的结果；
    /// 杀手扑空时必须改取运行者的真实结果，而不是伪造失败。
    pub(crate) fn get_process_result(
        self: &Arc<Self>,
        stop_on_interrupt: bool,
        runner: &RunnerHandle,
        timeout: Option<Duration>,
    ) -> Result<ProcessResult, ExecuteError> {
        let mut completion = runner.wait(timeout);
        let wait_status = wait_status_of(&completion);
        if wait_status != ExecutionStatus::Complete {
            // 等待没有干净结束：交给杀手确保进程不泄漏
            match self.kill_process(wait_status, stop_on_interrupt)? {
                Some(result) => return Ok(result),
                None => {
                    // 杀手扑空：运行者刚刚（或立刻将要）自然终结
                    if matches!(completion, Completion::TimedOut) {
                        completion = runner.wait(Some(Duration::ZERO));
                    }
                }
            }
        }
        match completion {
            Completion::Finished(Ok(RunnerOutcome::Completed(result))) => Ok(result),
            Completion::Finished(Ok(RunnerOutcome::Preempted)) => {
                // 另一线程的杀手抢先终结（terminate 路径）；取它寄存的终局
                match self.take_killed(KILL_WAIT) {
                    Some(result) => {
                        check_stop(result.status(), stop_on_interrupt)?;
                        Ok(result)
                    }
                    None => Ok(self.empty_result(ExecutionStatus::Interrupted, None)),
                }
            }
            Completion::Finished(Err(e)) => {
                Ok(self.empty_result(ExecutionStatus::Exception, startup_failure_of(&e)))
            }
            Completion::TimedOut => Ok(self.empty_result(ExecutionStatus::TimedOut, None)),
            // 中断即停的情形已在杀手路径里上抛过
            Completion::Aborted => Ok(self.empty_result(ExecutionStatus::Interrupted, None)),
        }
    }

    /// 从寄存槽取杀手的终局结果，最多等待 `max_wait`。
    fn take_killed(&self, max_wait: Duration) -> Option<ProcessResult> {
        let deadline = Instant::now() + max_wait;
        loop {
            if let Some(result) = self
                .killed
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take()
            {
                return Some(result);
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(PAUSE_MILLIS);
        }
    }

    fn build_result(
        &self,
        status: ExecutionStatus,
        io_result: IoResult,
        exit_value: Option<i32>,
    ) -> ProcessResult {
        let (output, error_output) = self
            .output
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot();
        ProcessResult::new(
            self.config.command_line(),
            self.process_number,
            status,
            io_result,
            None,
            exit_value,
            output,
            error_output,
        )
    }

    fn empty_result(&self, status: ExecutionStatus, startup_failure: Option<String>) -> ProcessResult {
        ProcessResult::empty(
            self.config.command_line(),
            self.process_number,
            status,
            startup_failure,
            self.config.io_strategy().is_binary_output(),
        )
    }
}

/// 中断即停：仅在调用方要求且确实发生中断时上抛，且必须在清理之后调用。
fn check_stop(status: ExecutionStatus, stop_on_interrupt: bool) -> Result<(), ExecuteError> {
    if stop_on_interrupt && status == ExecutionStatus::Interrupted {
        Err(ExecuteError::Interrupted)
    } else {
        Ok(())
    }
}

fn wait_status_of<T>(completion: &Completion<Result<T, ExecuteError>>) -> ExecutionStatus {
    match completion {
        Completion::Finished(Ok(_)) => ExecutionStatus::Complete,
        Completion::Finished(Err(_)) => ExecutionStatus::Exception,
        Completion::TimedOut => ExecutionStatus::TimedOut,
        Completion::Aborted => ExecutionStatus::Interrupted,
    }
}

/// 启动失败（可执行文件缺失、权限不足等）的消息；只有 IO 类错误算启动失败。
fn startup_failure_of(error: &ExecuteError) -> Option<String> {
    match error {
        ExecuteError::Io(e) => Some(e.to_string()),
        _ => None,
    }
}

/// 便捷入口：一次性执行并等待结果。
pub fn run(
    config: ProcessConfig,
    pool: &Arc<WorkerPool>,
    stop_on_interrupt: bool,
) -> Result<ProcessResult, ExecuteError> {
    ProcessExecutor::new(config, Arc::clone(pool)).run(stop_on_interrupt)
}

/// 便捷入口：执行、记录日志并返回是否干净成功。
pub fn run_and_log(config: ProcessConfig, pool: &Arc<WorkerPool>) -> Result<bool, ExecuteError> {
    let result = run(config, pool, false)?;
    result.log();
    Ok(result.is_ok())
}
