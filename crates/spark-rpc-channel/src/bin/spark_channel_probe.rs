//! 通道探针：创建非安全通道并记录连通性状态的每一次跃迁。
//!
//! # 使用方法
//! ```bash
//! RUST_LOG=debug cargo run --bin spark-channel-probe -- localhost:50051 --connect --watch-ms 3000
//! ```
//! - `<target>`：通道目标；
//! - `--connect`：读取初始状态时发起一次连接尝试；
//! - `--watch-ms`：观测总时长（毫秒），缺省 5000。到达截止时间或进入 `SHUTDOWN` 后退出。

use std::{env, time::Duration};

use anyhow::Context;
use spark_rpc_channel::{Channel, Deadline, WatchOutcome, telemetry};
use tracing::info;

const DEFAULT_WATCH: Duration = Duration::from_millis(5000);

struct ProbeArgs {
    target: String,
    connect: bool,
    watch: Duration,
}

fn usage(reason: &str) -> anyhow::Error {
    anyhow::anyhow!("{reason}\n用法: spark-channel-probe <target> [--connect] [--watch-ms N]")
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> anyhow::Result<ProbeArgs> {
    let mut args = raw.into_iter();
    let target = args.next().ok_or_else(|| usage("缺少通道目标"))?;
    let mut connect = false;
    let mut watch = DEFAULT_WATCH;

    while let Some(flag) = args.next() {
        match flag.as_str() {
            "--connect" => connect = true,
            "--watch-ms" => {
                let value = args
                    .next()
                    .ok_or_else(|| usage("--watch-ms 之后必须提供毫秒数"))?;
                let millis: u64 = value
                    .parse()
                    .with_context(|| format!("--watch-ms 取值 `{value}` 不是非负整数"))?;
                watch = Duration::from_millis(millis);
            }
            unknown => return Err(usage(&format!("未知参数: {unknown}"))),
        }
    }

    Ok(ProbeArgs {
        target,
        connect,
        watch,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();
    let args = parse_args(env::args().skip(1))?;

    let channel = Channel::new(args.target.as_str(), None, None)
        .with_context(|| format!("无法为 `{}` 创建通道", args.target))?;
    let mut state = channel.connectivity_state(args.connect)?;
    info!(state = %state, security = %channel.security(), "probe started");

    let deadline = Deadline::after(args.watch);
    loop {
        let outcome = channel
            .watch_connectivity_state_async(state, deadline)?
            .await?;
        match outcome {
            WatchOutcome::Changed(next) => {
                info!(from = %state, to = %next, "connectivity changed");
                state = next;
                if state.is_terminal() {
                    break;
                }
            }
            WatchOutcome::DeadlineExceeded(current) => {
                info!(state = %current, "watch deadline reached");
                break;
            }
        }
    }

    channel.close();
    Ok(())
}
