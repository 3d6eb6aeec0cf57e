//! Drive a wall on the simulated platform.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use multiwall_capture_engine::StreamState;
use multiwall_common::action::{KeyAction, ResetMode};
use multiwall_common::config::WallConfig;
use multiwall_controller::{Coordinator, CoordinatorHandle, HoverTarget, Platform, WallSnapshot};
use multiwall_instance_model::InstanceId;
use multiwall_platform_core::simulated::{
    ScriptedPointerTap, SimulatedCapture, SimulatedWindows, StaticPermissions,
};
use multiwall_platform_core::WindowSource;

const SETTLE_POLLS: usize = 100;

/// One scripted step.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    /// A key action, optionally with the pointer over an instance.
    Key {
        action: KeyAction,
        hover: Option<InstanceId>,
    },
    /// Close the window of an instance, then re-enumerate.
    Close(InstanceId),
}

impl FromStr for Step {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, target) = match s.split_once('@') {
            Some((name, target)) => {
                let n: u32 = target
                    .parse()
                    .with_context(|| format!("Bad instance in step '{s}'"))?;
                (name, Some(InstanceId(n)))
            }
            None => (s, None),
        };

        if name == "close" {
            let target = target.ok_or_else(|| anyhow!("Step 'close' needs an instance: close@N"))?;
            return Ok(Step::Close(target));
        }
        Ok(Step::Key {
            action: name.parse()?,
            hover: target,
        })
    }
}

pub async fn run(
    instances: usize,
    mode: Option<ResetMode>,
    sections: Option<usize>,
    print_events: bool,
    steps: Vec<String>,
) -> anyhow::Result<()> {
    let steps = steps
        .iter()
        .map(|s| s.parse::<Step>())
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut config = WallConfig::load();
    if let Some(mode) = mode {
        config.reset_mode = mode;
    }
    if let Some(sections) = sections {
        config.layout.sections = sections;
    }

    let windows = Arc::new(SimulatedWindows::new());
    let platform = Platform {
        windows: windows.clone(),
        capture: Arc::new(SimulatedCapture::new()),
        permissions: Arc::new(StaticPermissions::granted()),
        pointer: Arc::new(ScriptedPointerTap::new()),
    };
    let (handle, task) = Coordinator::new(config, platform)?.spawn();
    let mut events = handle.subscribe();

    let opened: Vec<_> = (0..instances).map(|_| windows.spawn()).collect();
    handle.windows(windows.enumerate()?).await?;
    settle(&handle).await?;

    for step in steps {
        tracing::debug!(?step, "Applying step");
        match step {
            Step::Key { action, hover } => {
                handle.key(action, hover.map(HoverTarget::Instance)).await?
            }
            Step::Close(instance) => {
                let window = opened
                    .get(instance.get() as usize)
                    .ok_or_else(|| anyhow!("No simulated window for instance {instance}"))?;
                windows.close(*window);
                handle.windows(windows.enumerate()?).await?;
            }
        }
        settle(&handle).await?;
    }

    let snapshot = handle.snapshot().await?;
    handle.shutdown().await?;
    task.await??;

    if print_events {
        while let Ok(event) = events.try_recv() {
            println!("{}", serde_json::to_string(&event)?);
        }
    }
    print_snapshot(&snapshot);
    Ok(())
}

/// Wait until no stream is mid-open.
async fn settle(handle: &CoordinatorHandle) -> anyhow::Result<()> {
    for _ in 0..SETTLE_POLLS {
        let snapshot = handle.snapshot().await?;
        if snapshot
            .instances
            .iter()
            .all(|i| i.stream != Some(StreamState::Starting))
        {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    tracing::warn!("Streams still starting; reporting anyway");
    Ok(())
}

fn print_snapshot(snapshot: &WallSnapshot) {
    println!(
        "mode: {}  sections: {}  focused: {}",
        snapshot.mode,
        snapshot.sections,
        snapshot
            .focused()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    for instance in &snapshot.instances {
        println!(
            "  {:<4} {:<12} {:<8} {}{}",
            instance.id.to_string(),
            instance.window.to_string(),
            instance
                .stream
                .map(|s| format!("{s:?}").to_lowercase())
                .unwrap_or_else(|| "-".to_string()),
            if instance.focused { "focused " } else { "" },
            if instance.locked { "locked" } else { "" },
        );
    }
}
