//! 平台相关的进程与管道操作 | Platform-specific process and pipe plumbing.
//!
//! Unix 下通过 `nix` 实现非阻塞管道读取、OS 级 stderr 合并与 SIGTERM 投递；
//! 其它平台提供可编译的降级实现（阻塞式排空、泵级合并、`Child::kill`）。

use std::process::{Child, ExitStatus};

/// 被强制终止的进程在本平台上呈现的退出码（POSIX: 128 + SIGTERM）。
#[cfg(unix)]
pub const EXIT_VALUE_FOR_TERMINATION: i32 = 143;

/// 被强制终止的进程在本平台上呈现的退出码（Windows: TerminateProcess 的退出码）。
#[cfg(not(unix))]
pub const EXIT_VALUE_FOR_TERMINATION: i32 = 1;

/// 将一个管道端设置为非阻塞模式，使 read 在无数据时立即返回 WouldBlock。
#[cfg(unix)]
pub(crate) fn set_nonblocking<F: std::os::fd::AsRawFd>(stream: &F) -> std::io::Result<()> {
    use nix::fcntl::{FcntlArg, OFlag, fcntl};

    let fd = stream.as_raw_fd();
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(std::io::Error::from)?;
    let flags = OFlag::from_bits_retain(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(std::io::Error::from)?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn set_nonblocking<F>(_stream: &F) -> std::io::Result<()> {
    // 无等价的可移植操作；读取端退化为"仅在最终排空时读取"。
    Ok(())
}

/// 构造一对共享写端的 Stdio，用于在 OS 层面把 stderr 合并进 stdout。
///
/// 返回 `(stdout 写端, stderr 写端, 读端)`；两个写端指向同一条管道，
/// 子进程对两个流的写入按真实顺序交织在读端出现。
#[cfg(unix)]
pub(crate) fn merged_output_pipe()
-> std::io::Result<(std::process::Stdio, std::process::Stdio, std::fs::File)> {
    let (read_end, write_end) = nix::unistd::pipe().map_err(std::io::Error::from)?;
    let write_clone = write_end.try_clone()?;
    Ok((
        std::process::Stdio::from(write_end),
        std::process::Stdio::from(write_clone),
        std::fs::File::from(read_end),
    ))
}

/// 请求强制终止子进程。
///
/// Unix 下发送 SIGTERM，给子进程一个体面收尾的机会（退出码呈现为 143）；
/// 其它平台直接使用 `Child::kill`。
#[cfg(unix)]
pub(crate) fn terminate(child: &mut Child) -> std::io::Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM).map_err(std::io::Error::from)
}

#[cfg(not(unix))]
pub(crate) fn terminate(child: &mut Child) -> std::io::Result<()> {
    child.kill()
}

/// 把 ExitStatus 折算成一个整数退出值。
///
/// 正常退出返回退出码；Unix 下被信号终止的进程按 shell 惯例折算为 `128 + 信号值`，
/// 因此 SIGTERM 终止呈现为 [`EXIT_VALUE_FOR_TERMINATION`]。
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status
            .code()
            .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
    }
    #[cfg(not(unix))]
    {
        status.code().unwrap_or(EXIT_VALUE_FOR_TERMINATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn exit_code_maps_signal_to_128_plus_signo() {
        use std::os::unix::process::ExitStatusExt;
        // 原始 wait 状态：低 7 位为信号值
        let status = ExitStatus::from_raw(15);
        assert_eq!(exit_code(status), EXIT_VALUE_FOR_TERMINATION);
    }

    #[test]
    #[cfg(unix)]
    fn exit_code_passes_through_normal_exit() {
        use std::os::unix::process::ExitStatusExt;
        let status = ExitStatus::from_raw(3 << 8);
        assert_eq!(exit_code(status), 3);
    }
}
