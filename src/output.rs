use std::sync::Arc;

/// 每行输出的观察者回调 | Per-line output observer callback.
///
/// 在行进入缓冲的同时被调用，适合做进度回显或实时过滤。
pub type LineHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// 一次执行的最终输出载体：文本行或原始字节，构造时二选一，之后不再切换。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Text(Vec<String>),
    Binary(Vec<u8>),
}

impl Output {
    /// 文本模式下的行集合；二进制模式返回空切片。
    pub fn lines(&self) -> &[String] {
        match self {
            Output::Text(lines) => lines,
            Output::Binary(_) => &[],
        }
    }

    /// 二进制模式下的字节；文本模式返回空切片。
    pub fn bytes(&self) -> &[u8] {
        match self {
            Output::Text(_) => &[],
            Output::Binary(bytes) => bytes,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Output::Binary(_))
    }
}

/// ProcessOutput 持有一次执行过程中不断增长的输出缓冲。
///
/// 每次执行创建一个，绝不复用。泵线程（或同线程运行者）通过共享引用向其
/// 追加数据，终结者在构造 [`crate::ProcessResult`] 时取快照。
/// 错误行始终单独累积；合并策略下错误行集合保持为空。
pub(crate) struct ProcessOutput {
    sink: Output,
    error_lines: Vec<String>,
    stdout_handler: Option<LineHandler>,
    stderr_handler: Option<LineHandler>,
}

impl ProcessOutput {
    pub(crate) fn new(
        binary: bool,
        stdout_handler: Option<LineHandler>,
        stderr_handler: Option<LineHandler>,
    ) -> Self {
        Self {
            sink: if binary {
                Output::Binary(Vec::new())
            } else {
                Output::Text(Vec::new())
            },
            error_lines: Vec::new(),
            stdout_handler,
            stderr_handler,
        }
    }

    /// 追加一行 stdout 文本并通知观察者。二进制模式下忽略（不应到达）。
    pub(crate) fn push_line(&mut self, line: String) {
        if let Some(handler) = &self.stdout_handler {
            handler(&line);
        }
        if let Output::Text(lines) = &mut self.sink {
            lines.push(line);
        }
    }

    /// 追加 stdout 原始字节。
    pub(crate) fn push_bytes(&mut self, data: &[u8]) {
        if let Output::Binary(bytes) = &mut self.sink {
            bytes.extend_from_slice(data);
        }
    }

    /// 追加一行 stderr 文本并通知观察者。
    pub(crate) fn push_error_line(&mut self, line: String) {
        if let Some(handler) = &self.stderr_handler {
            handler(&line);
        }
        self.error_lines.push(line);
    }

    /// 取当前累积内容的快照，供构造最终结果使用。
    pub(crate) fn snapshot(&self) -> (Output, Vec<String>) {
        (self.sink.clone(), self.error_lines.clone())
    }
}
