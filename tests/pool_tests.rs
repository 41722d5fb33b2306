//! 工作线程池的集成测试：并发提交、线程命名与关闭语义。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use osproc::{Completion, WorkerPool};

#[test]
fn many_concurrent_tasks_all_deliver() {
    let pool = WorkerPool::new("many", 4);
    let counter = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..100)
        .map(|i| {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                i * 2
            })
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        let completion = handle.wait(Some(Duration::from_secs(10)));
        assert!(completion.is_finished());
        match completion {
            Completion::Finished(v) => assert_eq!(v, i * 2),
            other => panic!("task {i} did not finish: {other:?}"),
        }
    }
    assert_eq!(counter.load(Ordering::SeqCst), 100);
}

#[test]
fn worker_threads_carry_the_pool_name() {
    let pool = WorkerPool::new("named-pool", 2);
    let handle = pool.submit(|| thread::current().name().map(str::to_string));
    match handle.wait(Some(Duration::from_secs(5))) {
        Completion::Finished(Some(name)) => assert!(name.starts_with("named-pool-")),
        other => panic!("unexpected completion: {other:?}"),
    }
}

#[test]
fn tasks_submitted_before_shutdown_still_run() {
    let pool = WorkerPool::new("draining", 1);
    let slow = pool.submit(|| {
        thread::sleep(Duration::from_millis(100));
        "done"
    });
    pool.shutdown();
    assert!(matches!(
        slow.wait(Some(Duration::from_secs(5))),
        Completion::Finished("done")
    ));
}

#[test]
fn pool_reports_its_shape() {
    let pool = WorkerPool::new("shape", 3);
    assert_eq!(pool.name(), "shape");
    assert_eq!(pool.workers(), 3);
}
