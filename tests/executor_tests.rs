//! 端到端执行测试：真实启动 OS 进程，覆盖捕获、超时、终止与竞争路径。

#![cfg(unix)]

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use osproc::{
    EXIT_VALUE_FOR_TERMINATION, ExecuteError, ExecutionStatus, ProcessConfig, ProcessExecutor,
    ProcessIo, ProcessIoHandler, ProcessIoStrategy, ProcessStatus, WorkerPool,
};

fn pool() -> Arc<WorkerPool> {
    Arc::new(WorkerPool::new("osproc-test", 10))
}

fn sh(script: &str) -> ProcessConfig {
    ProcessConfig::new("/bin/sh", vec!["-c".to_string(), script.to_string()])
}

#[test]
fn captures_stdout_and_stderr_as_lines() {
    let result = ProcessExecutor::new(sh("echo one; echo two; echo oops >&2"), pool())
        .run(false)
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(result.output(), ["one", "two"]);
    assert_eq!(result.error_output(), ["oops"]);
    assert_eq!(result.exit_value(), Some(0));
}

#[test]
fn merged_stderr_folds_into_main_output() {
    let config = sh("echo one; echo oops >&2; echo two")
        .with_io_strategy(ProcessIoStrategy::text_merged());
    let result = ProcessExecutor::new(config, pool()).run(false).unwrap();
    assert!(result.is_ok());
    // OS 级合并：顺序写入同一条管道，顺序保持
    assert_eq!(result.output(), ["one", "oops", "two"]);
    assert!(result.error_output().is_empty());
}

#[test]
fn timed_out_process_is_terminated_with_sentinel_exit_value() {
    let config = sh("sleep 60").with_timeout(Duration::from_millis(200));
    let result = ProcessExecutor::new(config, pool()).run(false).unwrap();
    assert!(result.is_timed_out());
    assert!(result.is_run());
    assert!(!result.is_ok());
    assert_eq!(result.exit_value(), Some(EXIT_VALUE_FOR_TERMINATION));
    assert!(result.is_terminated());
    assert!(matches!(result.to_status(), ProcessStatus::RetriableError(_)));
}

#[test]
fn unblocking_execution_can_be_terminated() {
    let config = sh("sleep 60").with_no_timeout();
    let handler = ProcessExecutor::new(config, pool()).run_unblocking();
    // 给运行者时间把进程真正带起来
    thread::sleep(Duration::from_millis(300));
    assert!(handler.terminate().unwrap());
    let result = handler.get_result().unwrap();
    assert!(result.is_timed_out());
    assert_eq!(result.exit_value(), Some(EXIT_VALUE_FOR_TERMINATION));
}

#[test]
fn get_result_within_overrides_the_configured_timeout() {
    // 配置不设超时；等待方自己的时限到期后走杀手路径
    let config = sh("sleep 60").with_no_timeout();
    let handler = ProcessExecutor::new(config, pool()).run_unblocking();
    let result = handler
        .get_result_within(Duration::from_millis(300))
        .unwrap();
    assert!(result.is_timed_out());
    assert_eq!(result.exit_value(), Some(EXIT_VALUE_FOR_TERMINATION));
}

#[test]
fn binary_strategy_captures_raw_bytes() {
    let config = sh("printf 'ab\\ncd'").with_io_strategy(ProcessIoStrategy::binary());
    let result = ProcessExecutor::new(config, pool()).run(false).unwrap();
    assert!(result.is_ok());
    assert_eq!(result.binary_output(), b"ab\ncd");
    assert!(result.output().is_empty());
}

#[test]
fn binary_merged_folds_stderr_bytes_into_the_stream() {
    // 合并 + 二进制：stderr 字节按写入顺序成为二进制流的一部分
    let config = sh("printf a; printf b >&2; printf c")
        .with_io_strategy(ProcessIoStrategy::binary_merged());
    let result = ProcessExecutor::new(config, pool()).run(false).unwrap();
    assert!(result.is_ok());
    assert_eq!(result.binary_output(), b"abc");
    assert!(result.error_output().is_empty());
}

#[test]
fn discarded_large_output_does_not_block_completion() {
    // 128 KiB 远超管道缓冲区：不持续排空的话 dd 会卡死在写端
    let config = sh("dd if=/dev/zero bs=1024 count=128 2>/dev/null")
        .with_io_strategy(ProcessIoStrategy::discard_all())
        .with_timeout(Duration::from_secs(30));
    let result = ProcessExecutor::new(config, pool()).run(false).unwrap();
    assert!(result.is_ok());
    assert!(result.output().is_empty());
}

#[test]
fn missing_executable_reports_startup_failure() {
    let config = ProcessConfig::new("/definitely/not/there-osproc", vec![]);
    let result = ProcessExecutor::new(config, pool()).run(false).unwrap();
    assert_eq!(result.status(), ExecutionStatus::Exception);
    assert!(!result.is_run());
    assert!(result.startup_failure_message().is_some());
    assert_eq!(result.exit_value(), None);
}

#[test]
fn nonzero_exit_is_an_error_with_stderr_detail() {
    let result = ProcessExecutor::new(sh("echo bad >&2; exit 3"), pool())
        .run(false)
        .unwrap();
    assert!(result.is_run());
    assert!(!result.is_ok());
    assert_eq!(result.exit_value(), Some(3));
    match result.to_status() {
        ProcessStatus::Error(detail) => assert!(detail.contains("bad")),
        other => panic!("unexpected status: {other:?}"),
    }
}

#[test]
fn same_thread_strategy_captures_output_without_a_pump() {
    let config = sh("echo alpha; echo beta").with_io_strategy(ProcessIoStrategy::same_thread());
    let result = ProcessExecutor::new(config, pool()).run(false).unwrap();
    assert!(result.is_ok());
    assert_eq!(result.output(), ["alpha", "beta"]);
}

#[test]
fn line_handlers_observe_lines_as_they_arrive() {
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let config = sh("echo live")
        .with_stdout_line_handler(Arc::new(move |line: &str| {
            sink.lock().unwrap().push(line.to_string());
        }));
    let result = ProcessExecutor::new(config, pool()).run(false).unwrap();
    assert!(result.is_ok());
    assert_eq!(*seen.lock().unwrap(), ["live"]);
}

#[test]
fn overlay_environment_is_visible_to_the_child() {
    let mut env = HashMap::new();
    env.insert("OSPROC_TEST_VAR".to_string(), "xyz".to_string());
    let config = sh("echo \"$OSPROC_TEST_VAR\"").with_env(env);
    let result = ProcessExecutor::new(config, pool()).run(false).unwrap();
    assert_eq!(result.output(), ["xyz"]);
}

#[test]
fn replaced_environment_drops_inherited_variables() {
    let mut env = HashMap::new();
    env.insert("OSPROC_TEST_VAR".to_string(), "kept".to_string());
    let config = sh("echo \"${HOME:-unset}:$OSPROC_TEST_VAR\"").with_replaced_env(env);
    let result = ProcessExecutor::new(config, pool()).run(false).unwrap();
    assert_eq!(result.output(), ["unset:kept"]);
}

/// 写入 stdin 后立即放手的自定义处理器；`cat` 在 stdin 关闭后自然退出。
struct StdinFeeder;

impl ProcessIoHandler for StdinFeeder {
    fn handle(&self, _running: &AtomicBool, mut io: ProcessIo) -> std::io::Result<()> {
        if let Some(stdin) = io.stdin.as_mut() {
            stdin.write_all(b"ping\n")?;
        }
        // drop(io) 关闭 stdin 写端
        Ok(())
    }
}

#[test]
fn custom_handler_owns_all_three_streams() {
    let config = ProcessConfig::new("cat", vec![])
        .with_io_strategy(ProcessIoStrategy::custom(Arc::new(StdinFeeder)))
        .with_timeout(Duration::from_secs(10));
    let result = ProcessExecutor::new(config, pool()).run(false).unwrap();
    assert!(result.is_ok());
    assert_eq!(result.exit_value(), Some(0));
}

#[test]
fn terminate_racing_a_fast_natural_exit_never_fabricates_a_result() {
    let pool = pool();
    for _ in 0..20 {
        let config = ProcessConfig::new("true", vec![]).with_timeout(Duration::from_secs(10));
        let handler = ProcessExecutor::new(config, Arc::clone(&pool)).run_unblocking();
        // 与自然退出抢终结权；输掉是正常的
        let _ = handler.terminate().unwrap();
        let result = handler.get_result().unwrap();
        match result.status() {
            ExecutionStatus::Complete => assert_eq!(result.exit_value(), Some(0)),
            ExecutionStatus::TimedOut => {}
            other => panic!("fabricated terminal state: {other}"),
        }
    }
}

#[test]
fn shut_down_pool_surfaces_interruption_as_an_error() {
    let pool = pool();
    pool.shutdown();
    let err = ProcessExecutor::new(sh("echo never"), Arc::clone(&pool))
        .run(true)
        .unwrap_err();
    assert!(matches!(err, ExecuteError::Interrupted));
}

#[test]
fn shut_down_pool_surfaces_interruption_as_data_when_not_stopping() {
    let pool = pool();
    pool.shutdown();
    let result = ProcessExecutor::new(sh("echo never"), Arc::clone(&pool))
        .run(false)
        .unwrap();
    assert_eq!(result.status(), ExecutionStatus::Interrupted);
    assert!(!result.is_run());
}

#[test]
fn run_helper_executes_and_returns_the_result() {
    let pool = pool();
    let result = osproc::run(sh("echo helper"), &pool, false).unwrap();
    assert_eq!(result.output(), ["helper"]);
}

#[test]
fn run_and_log_reports_success() {
    let pool = pool();
    assert!(osproc::run_and_log(sh("true"), &pool).unwrap());
    assert!(!osproc::run_and_log(sh("exit 7"), &pool).unwrap());
}
