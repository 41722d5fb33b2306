use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};

use crate::MACHINE_TARGET;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// 等待任务结果的结局 | Outcome of waiting on a task handle.
#[derive(Debug)]
pub enum Completion<T> {
    /// 任务完成并交付了值
    Finished(T),
    /// 在给定时限内没有等到值
    TimedOut,
    /// 任务已不可能交付值（工作线程 panic、池已关闭或任务被丢弃）
    Aborted,
}

impl<T> Completion<T> {
    pub fn is_finished(&self) -> bool {
        matches!(self, Completion::Finished(_))
    }

    /// 取出完成值；未完成时返回 `None`。
    pub fn finished(self) -> Option<T> {
        match self {
            Completion::Finished(v) => Some(v),
            _ => None,
        }
    }
}

/// 任务句柄：提交后用来等待该任务的结果。
///
/// 结果通过容量为 1 的通道交付恰好一次；句柄可克隆，任意一个克隆收走
/// 结果后，其余克隆将观察到 `Aborted`。
pub struct TaskHandle<T> {
    receiver: Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// 等待任务结果。
    ///
    /// # 参数
    /// - `timeout`: `None` 表示无限等待；`Some(d)` 最多等待 `d`。
    pub fn wait(&self, timeout: Option<Duration>) -> Completion<T> {
        match timeout {
            None => match self.receiver.recv() {
                Ok(value) => Completion::Finished(value),
                Err(_) => Completion::Aborted,
            },
            Some(limit) => match self.receiver.recv_timeout(limit) {
                Ok(value) => Completion::Finished(value),
                Err(RecvTimeoutError::Timeout) => Completion::TimedOut,
                Err(RecvTimeoutError::Disconnected) => Completion::Aborted,
            },
        }
    }

    /// 立即查看任务结果（零超时等待）。
    pub fn wait_now(&self) -> Completion<T> {
        self.wait(Some(Duration::ZERO))
    }
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
        }
    }
}

/// 有界、命名、守护化的工作线程池 | Bounded, named, daemonized worker pool.
///
/// 运行者、I/O 泵和杀手任务都在这里执行；线程数决定了本子系统能同时
/// 照看多少个 OS 进程。线程命名为 `{name}-{i}`，且均为分离线程
/// （进程退出时不等待它们，与守护线程语义一致）。
///
/// 生命周期：[`WorkerPool::new`] 即刻生成全部工作线程；
/// [`WorkerPool::shutdown`] 关闭任务队列，工作线程在清空积压后退出。
/// 关闭后提交的任务不会运行，其句柄直接呈现 `Aborted`。
pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    name: String,
    workers: usize,
}

impl WorkerPool {
    /// 创建线程池并立即生成 `workers` 个工作线程。
    pub fn new(name: &str, workers: usize) -> Self {
        let (sender, receiver) = unbounded::<Job>();
        for i in 0..workers {
            let receiver: Receiver<Job> = receiver.clone();
            let thread_name = format!("{name}-{i}");
            // 分离线程；Builder::spawn 仅在线程名非法时失败
            let _ = thread::Builder::new().name(thread_name).spawn(move || {
                while let Ok(job) = receiver.recv() {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        tracing::warn!(target: MACHINE_TARGET, "worker task panicked");
                    }
                }
            });
        }
        Self {
            sender: Mutex::new(Some(sender)),
            name: name.to_string(),
            workers,
        }
    }

    /// 提交一个任务，返回用于等待其结果的句柄。
    ///
    /// 池已关闭时任务被静默丢弃，句柄对任何等待都呈现 `Aborted`。
    pub fn submit<T, F>(&self, f: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let job: Job = Box::new(move || {
            // 接收端先行放弃时投递失败，无需理会
            let _ = tx.send(f());
        });
        let guard = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sender) = guard.as_ref() {
            let _ = sender.send(job);
        }
        TaskHandle { receiver: rx }
    }

    /// 关闭任务队列；工作线程清空积压后退出。
    pub fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    /// # 获取线程池名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// # 获取工作线程数
    pub fn workers(&self) -> usize {
        self.workers
    }
}
