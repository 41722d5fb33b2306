use std::io::{self, Read};
use std::process::ChildStdin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::io_strategy::ProcessIoStrategy;
use crate::output::ProcessOutput;

/// 泵循环两次排空之间的休眠时长 | Sleep between pump iterations.
pub(crate) const IO_POLL_MILLIS: u64 = 200;

/// 单次 read 的缓冲区大小。
pub(crate) const BUFFER_SIZE: usize = 4096;

/// 子进程输出流的统一读取端类型。
///
/// stdout 可能是普通的 `ChildStdout`，也可能是 OS 级合并后的管道读端（File），
/// 统一装箱；Unix 下构造时已置为非阻塞。
pub type PipeStream = Box<dyn Read + Send>;

/// 一个子进程的三个标准流。流在 `None` 时表示未建立或已被 OS 级合并吸收。
pub struct ProcessIo {
    pub stdin: Option<ChildStdin>,
    pub stdout: Option<PipeStream>,
    pub stderr: Option<PipeStream>,
}

/// 进程 I/O 处理器 | Process I/O handler contract.
///
/// `handle` 在泵线程中被调用一次，拿到存活标志与全部流的所有权。约定：
/// 只要 `running` 为 true 就反复排空*当前可读*的数据（绝不无限阻塞等待），
/// 每轮之间短暂休眠；观察到 `running` 翻转为 false 后再做恰好一次排空，
/// 以收取尾部输出。
pub trait ProcessIoHandler: Send + Sync {
    fn handle(&self, running: &AtomicBool, io: ProcessIo) -> io::Result<()>;
}

/// 行累积器：把任意切分的字节块重组为文本行。
///
/// 按 `\n` 切分，去掉行尾 `\r`，非 UTF-8 字节做有损转换。
/// 最终排空时剩余的不完整行作为最后一行吐出（与按行读取到 EOF 的语义一致）。
pub(crate) struct LineAccumulator {
    partial: Vec<u8>,
}

impl LineAccumulator {
    pub(crate) fn new() -> Self {
        Self {
            partial: Vec::new(),
        }
    }

    /// 喂入一个字节块，完整的行依次交给 `emit`。
    pub(crate) fn push(&mut self, data: &[u8], emit: &mut dyn FnMut(String)) {
        for &byte in data {
            if byte == b'\n' {
                emit(Self::take_line(&mut self.partial));
            } else {
                self.partial.push(byte);
            }
        }
    }

    /// 吐出残余的不完整行（若有）。
    pub(crate) fn flush(&mut self, emit: &mut dyn FnMut(String)) {
        if !self.partial.is_empty() {
            emit(Self::take_line(&mut self.partial));
        }
    }

    fn take_line(buf: &mut Vec<u8>) -> String {
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        let line = String::from_utf8_lossy(buf).into_owned();
        buf.clear();
        line
    }
}

/// 排空一个流上当前可读的全部数据，不阻塞等待新数据。
///
/// 读到 EOF 时把流置回 `None`，后续调用自然跳过；`WouldBlock` 表示
/// 本轮已无可读数据，正常返回。
fn drain_stream(
    stream: &mut Option<PipeStream>,
    buf: &mut [u8],
    on_data: &mut dyn FnMut(&[u8]),
) -> io::Result<()> {
    let Some(reader) = stream.as_mut() else {
        return Ok(());
    };
    loop {
        match reader.read(buf) {
            Ok(0) => {
                *stream = None;
                return Ok(());
            }
            Ok(n) => on_data(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Drainer 是文本/二进制两种默认处理器与同线程运行者共用的排空引擎。
///
/// 持有流与行累积器，按策略决定每块数据的去向：文本行、二进制字节、
/// 错误行，或者（丢弃策略下）读掉即弃。
pub(crate) struct Drainer {
    io: ProcessIo,
    strategy: ProcessIoStrategy,
    /// 仅当 stderr 未能在 OS 层合并时为 true，由本层把 stderr 折入主输出。
    fold_stderr: bool,
    output: Arc<Mutex<ProcessOutput>>,
    stdout_lines: LineAccumulator,
    stderr_lines: LineAccumulator,
    buf: Vec<u8>,
}

impl Drainer {
    pub(crate) fn new(
        io: ProcessIo,
        strategy: ProcessIoStrategy,
        output: Arc<Mutex<ProcessOutput>>,
    ) -> Self {
        let fold_stderr = strategy.is_merge_stderr() && io.stderr.is_some();
        Self {
            io,
            strategy,
            fold_stderr,
            output,
            stdout_lines: LineAccumulator::new(),
            stderr_lines: LineAccumulator::new(),
            buf: vec![0u8; BUFFER_SIZE],
        }
    }

    /// 排空两个输出流上当前可读的数据各一轮。
    pub(crate) fn drain_once(&mut self) -> io::Result<()> {
        self.drain(false)
    }

    /// 最终排空：再读一轮并冲刷残余的不完整行。
    pub(crate) fn drain_final(&mut self) -> io::Result<()> {
        self.drain(true)
    }

    fn drain(&mut self, finish: bool) -> io::Result<()> {
        let Self {
            io,
            strategy,
            fold_stderr,
            output,
            stdout_lines,
            stderr_lines,
            buf,
        } = self;

        let mut lines: Vec<String> = Vec::new();
        let mut error_lines: Vec<String> = Vec::new();
        let mut bytes: Vec<u8> = Vec::new();

        // stdout：按策略走字节或行
        if strategy.is_binary_output() {
            let discard = strategy.is_discard_stdout();
            drain_stream(&mut io.stdout, buf, &mut |data| {
                if !discard {
                    bytes.extend_from_slice(data);
                }
            })?;
        } else {
            let discard = strategy.is_discard_stdout();
            drain_stream(&mut io.stdout, buf, &mut |data| {
                if !discard {
                    stdout_lines.push(data, &mut |line| lines.push(line));
                }
            })?;
            if finish && !discard {
                stdout_lines.flush(&mut |line| lines.push(line));
            }
        }

        // stderr：独立捕获，或（泵级合并的降级路径）折入主输出
        {
            let discard = strategy.is_discard_stderr();
            let binary_fold = *fold_stderr && strategy.is_binary_output();
            drain_stream(&mut io.stderr, buf, &mut |data| {
                if discard {
                    return;
                }
                if binary_fold {
                    bytes.extend_from_slice(data);
                } else if *fold_stderr {
                    stderr_lines.push(data, &mut |line| lines.push(line));
                } else {
                    stderr_lines.push(data, &mut |line| error_lines.push(line));
                }
            })?;
            if finish && !discard && !binary_fold {
                if *fold_stderr {
                    stderr_lines.flush(&mut |line| lines.push(line));
                } else {
                    stderr_lines.flush(&mut |line| error_lines.push(line));
                }
            }
        }

        if !lines.is_empty() || !error_lines.is_empty() || !bytes.is_empty() {
            let mut out = output.lock().unwrap_or_else(|e| e.into_inner());
            out.push_bytes(&bytes);
            for line in lines {
                out.push_line(line);
            }
            for line in error_lines {
                out.push_error_line(line);
            }
        }
        Ok(())
    }
}

/// 以 200ms 轮询纪律驱动 Drainer 的泵循环，默认处理器共用。
fn pump(running: &AtomicBool, mut drainer: Drainer) -> io::Result<()> {
    while running.load(Ordering::Acquire) {
        drainer.drain_once()?;
        thread::sleep(Duration::from_millis(IO_POLL_MILLIS));
    }
    // 存活标志翻转后的最后一轮，收取尾部输出
    drainer.drain_final()
}

/// 默认文本处理器：stdout/stderr 均按文本行解码。
pub struct TextIoHandler {
    strategy: ProcessIoStrategy,
    output: Arc<Mutex<ProcessOutput>>,
}

impl TextIoHandler {
    pub(crate) fn new(strategy: ProcessIoStrategy, output: Arc<Mutex<ProcessOutput>>) -> Self {
        Self { strategy, output }
    }
}

impl ProcessIoHandler for TextIoHandler {
    fn handle(&self, running: &AtomicBool, io: ProcessIo) -> io::Result<()> {
        let drainer = Drainer::new(io, self.strategy.clone(), Arc::clone(&self.output));
        pump(running, drainer)
    }
}

/// 默认二进制处理器：stdout 按原始字节读取，stderr 仍按文本行解码。
pub struct BinaryIoHandler {
    strategy: ProcessIoStrategy,
    output: Arc<Mutex<ProcessOutput>>,
}

impl BinaryIoHandler {
    pub(crate) fn new(strategy: ProcessIoStrategy, output: Arc<Mutex<ProcessOutput>>) -> Self {
        Self { strategy, output }
    }
}

impl ProcessIoHandler for BinaryIoHandler {
    fn handle(&self, running: &AtomicBool, io: ProcessIo) -> io::Result<()> {
        let drainer = Drainer::new(io, self.strategy.clone(), Arc::clone(&self.output));
        pump(running, drainer)
    }
}
