use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// 重试执行器 | Retry helper, independent of process management.
///
/// 反复调用一个零参工作单元，直到它给出结果或重试预算耗尽；
/// 两次尝试之间固定休眠（最后一次尝试之后不再休眠）。
/// `None` 表示"没有得到结果"，不是错误信号。
#[derive(Debug, Clone, Copy)]
pub struct CallableExecutor {
    max_retries_on_failure: usize,
    sleep_on_failure: Duration,
}

impl CallableExecutor {
    /// # 创建重试执行器
    ///
    /// # 参数
    /// - `max_retries_on_failure`: 失败后的最大重试次数（总尝试次数为该值 + 1）。
    /// - `sleep_on_failure`: 两次尝试之间的休眠时长。
    pub fn new(max_retries_on_failure: usize, sleep_on_failure: Duration) -> Self {
        Self {
            max_retries_on_failure,
            sleep_on_failure,
        }
    }

    /// 反复调用 `callable` 直到返回 `Some` 或预算耗尽，返回最后一次的结果。
    pub fn execute<T>(&self, mut callable: impl FnMut() -> Option<T>) -> Option<T> {
        static NEVER: AtomicBool = AtomicBool::new(false);
        self.execute_inner(&NEVER, &mut callable)
    }

    /// 与 [`CallableExecutor::execute`] 相同，但每次尝试前检查取消标志，
    /// 一旦置位立即放弃（不再尝试、不再休眠）。
    pub fn execute_cancellable<T>(
        &self,
        cancelled: &AtomicBool,
        mut callable: impl FnMut() -> Option<T>,
    ) -> Option<T> {
        self.execute_inner(cancelled, &mut callable)
    }

    fn execute_inner<T>(
        &self,
        cancelled: &AtomicBool,
        callable: &mut dyn FnMut() -> Option<T>,
    ) -> Option<T> {
        let mut result = None;
        for attempt in 0..=self.max_retries_on_failure {
            if cancelled.load(Ordering::Acquire) {
                return result;
            }
            result = callable();
            if result.is_some() {
                return result;
            }
            // 最后一次尝试之后不休眠
            if attempt < self.max_retries_on_failure {
                thread::sleep(self.sleep_on_failure);
            }
        }
        result
    }
}
