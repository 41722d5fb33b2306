use std::sync::Arc;

use crate::io_handler::ProcessIoHandler;

/// ProcessIoStrategy 描述一次执行中子进程 stdout/stderr 的处理方式。
///
/// 纯值对象，一旦构造不再变化。各字段相互独立，任意组合都不会使子进程
/// 因管道缓冲区写满而死锁：被"丢弃"的流仍会被持续排空，只是不保留内容。
///
/// 通过命名预设构造（文本/二进制 × 合并/分离 stderr × 丢弃变体 × 同线程轮询），
/// 或通过 [`ProcessIoStrategy::custom`] 安装自定义 I/O 处理器 —— 这也是
/// 唯一能够拿到子进程 stdin 的方式。
///
/// # 示例
/// ```ignore
/// use osproc::ProcessIoStrategy;
///
/// let strategy = ProcessIoStrategy::text().with_discard_stderr(true);
/// assert!(strategy.is_discard_stderr());
/// ```
#[derive(Clone)]
pub struct ProcessIoStrategy {
    discard_stdout: bool,
    discard_stderr: bool,
    merge_stderr: bool,
    binary_output: bool,
    io_in_same_thread: bool,
    custom_handler: Option<Arc<dyn ProcessIoHandler>>,
}

impl ProcessIoStrategy {
    /// 默认文本策略：stdout/stderr 按行分别捕获，I/O 在独立泵线程中进行。
    pub fn text() -> Self {
        Self {
            discard_stdout: false,
            discard_stderr: false,
            merge_stderr: false,
            binary_output: false,
            io_in_same_thread: false,
            custom_handler: None,
        }
    }

    /// 文本策略，且在 OS 层面把 stderr 合并进 stdout。
    ///
    /// 合并后错误输出集合保持为空，stderr 的行出现在主输出中。
    pub fn text_merged() -> Self {
        Self {
            merge_stderr: true,
            ..Self::text()
        }
    }

    /// 二进制策略：stdout 按原始字节捕获，stderr 仍按文本行捕获。
    pub fn binary() -> Self {
        Self {
            binary_output: true,
            ..Self::text()
        }
    }

    /// 二进制策略且合并 stderr：合并进来的 stderr 字节成为二进制流的一部分。
    ///
    /// 合并语义：stderr 的字节按到达顺序成为二进制流的一部分，不再按行解码。
    pub fn binary_merged() -> Self {
        Self {
            binary_output: true,
            merge_stderr: true,
            ..Self::text()
        }
    }

    /// 丢弃全部输出的文本策略。两个流仍被持续排空，内容不保留。
    pub fn discard_all() -> Self {
        Self {
            discard_stdout: true,
            discard_stderr: true,
            ..Self::text()
        }
    }

    /// 同线程轮询策略：不启动独立泵线程，由运行者线程交替排空输出与检查退出状态。
    pub fn same_thread() -> Self {
        Self {
            io_in_same_thread: true,
            ..Self::text()
        }
    }

    /// 安装自定义 I/O 处理器的策略。
    ///
    /// 自定义处理器接管全部三个流（包括 stdin），默认的文本/二进制排空逻辑不再介入。
    pub fn custom(handler: Arc<dyn ProcessIoHandler>) -> Self {
        Self {
            custom_handler: Some(handler),
            ..Self::text()
        }
    }

    /// 设置是否丢弃 stdout（仍持续排空）。
    pub fn with_discard_stdout(mut self, discard: bool) -> Self {
        self.discard_stdout = discard;
        self
    }

    /// 设置是否丢弃 stderr（仍持续排空）。
    pub fn with_discard_stderr(mut self, discard: bool) -> Self {
        self.discard_stderr = discard;
        self
    }

    /// # 是否丢弃 stdout
    pub fn is_discard_stdout(&self) -> bool {
        self.discard_stdout
    }

    /// # 是否丢弃 stderr
    pub fn is_discard_stderr(&self) -> bool {
        self.discard_stderr
    }

    /// # 是否在 OS 层面合并 stderr 到 stdout
    pub fn is_merge_stderr(&self) -> bool {
        self.merge_stderr
    }

    /// # stdout 是否按原始字节捕获
    pub fn is_binary_output(&self) -> bool {
        self.binary_output
    }

    /// # I/O 是否在运行者线程内轮询（不启动泵线程）
    pub fn is_io_in_same_thread(&self) -> bool {
        self.io_in_same_thread
    }

    /// 返回自定义 I/O 处理器（若有）。
    pub fn custom_handler(&self) -> Option<&Arc<dyn ProcessIoHandler>> {
        self.custom_handler.as_ref()
    }
}

impl Default for ProcessIoStrategy {
    fn default() -> Self {
        Self::text()
    }
}

impl std::fmt::Debug for ProcessIoStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessIoStrategy")
            .field("discard_stdout", &self.discard_stdout)
            .field("discard_stderr", &self.discard_stderr)
            .field("merge_stderr", &self.merge_stderr)
            .field("binary_output", &self.binary_output)
            .field("io_in_same_thread", &self.io_in_same_thread)
            .field("custom_handler", &self.custom_handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_preset_has_no_flags_set() {
        let s = ProcessIoStrategy::text();
        assert!(!s.is_discard_stdout());
        assert!(!s.is_discard_stderr());
        assert!(!s.is_merge_stderr());
        assert!(!s.is_binary_output());
        assert!(!s.is_io_in_same_thread());
        assert!(s.custom_handler().is_none());
    }

    #[test]
    fn merged_presets_set_merge_flag() {
        assert!(ProcessIoStrategy::text_merged().is_merge_stderr());
        assert!(ProcessIoStrategy::binary_merged().is_merge_stderr());
        assert!(ProcessIoStrategy::binary_merged().is_binary_output());
    }

    #[test]
    fn discard_flags_are_independent_of_other_flags() {
        let s = ProcessIoStrategy::binary()
            .with_discard_stdout(true)
            .with_discard_stderr(true);
        assert!(s.is_binary_output());
        assert!(s.is_discard_stdout());
        assert!(s.is_discard_stderr());
    }

    #[test]
    fn same_thread_preset_disables_pump_thread() {
        assert!(ProcessIoStrategy::same_thread().is_io_in_same_thread());
    }
}
