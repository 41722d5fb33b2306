use std::sync::Arc;
use std::time::Duration;

use osproc::{ProcessConfig, ProcessExecutor, WorkerPool};

/// 演示程序：跑一条会成功的命令和一条会超时的命令，观察结果与日志。
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .init();

    let pool = Arc::new(WorkerPool::new("osproc", 10));

    // 1. 正常完成的命令
    let config = ProcessConfig::new("echo", vec!["hello from osproc".to_string()])
        .with_timeout(Duration::from_secs(2));
    match ProcessExecutor::new(config, Arc::clone(&pool)).run(false) {
        Ok(result) => {
            result.log_as_info();
            println!("echo ok={} output={:?}", result.is_ok(), result.output());
        }
        Err(e) => eprintln!("echo failed: {e}"),
    }

    // 2. 超时后被强制终止的命令
    let config = ProcessConfig::new("sleep", vec!["60".to_string()])
        .with_timeout(Duration::from_millis(300));
    match ProcessExecutor::new(config, Arc::clone(&pool)).run(false) {
        Ok(result) => {
            result.log_as_info();
            println!(
                "sleep timed_out={} exit_value={:?}",
                result.is_timed_out(),
                result.exit_value()
            );
        }
        Err(e) => eprintln!("sleep failed: {e}"),
    }

    // 3. 非阻塞执行 + 主动终止
    let config = ProcessConfig::new("sleep", vec!["60".to_string()]).with_no_timeout();
    let handler = ProcessExecutor::new(config, Arc::clone(&pool)).run_unblocking();
    match handler.terminate() {
        Ok(found) => println!("terminate found a live process: {found}"),
        Err(e) => eprintln!("terminate failed: {e}"),
    }
    match handler.get_result() {
        Ok(result) => println!(
            "terminated status={} exit_value={:?}",
            result.status(),
            result.exit_value()
        ),
        Err(e) => eprintln!("get_result failed: {e}"),
    }

    pool.shutdown();
}
