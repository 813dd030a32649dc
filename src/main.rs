use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use retarget::{DualArmModel, MotionStore, MotionTrajectory, MultiBody, RetargetConfig, RetargetSession};

/// Retarget recorded human arm motion onto a dual-arm robot.
#[derive(Parser, Debug)]
#[command(name = "arm_retarget", version)]
struct Cli {
    /// Motion store holding the recorded human poses
    #[arg(short, long, default_value = "test_imi_data_UR5.json")]
    input: PathBuf,

    /// Motion to retarget
    #[arg(short, long, default_value = "fengren")]
    group: String,

    /// Store the joint trajectory is written to
    #[arg(short, long, default_value = "mocap_ik_results.json")]
    output: PathBuf,

    /// Robot description
    #[arg(short, long, default_value = "urdf/dual_arm.urdf")]
    urdf: PathBuf,

    /// JSON run configuration; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// `RUST_LOG` directives when set, `info` otherwise.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    EnvFilter::new(directives.filter(|d| !d.trim().is_empty()).unwrap_or("info"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref()))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RetargetConfig::from_file(path)?,
        None => RetargetConfig::default(),
    };

    let multi_body = MultiBody::from_urdf(&cli.urdf)
        .with_context(|| format!("loading robot description {}", cli.urdf.display()))?;
    let model = DualArmModel::from_config(&multi_body, &config)?;
    tracing::info!("Robot: {}", multi_body.name);

    let input = MotionStore::open(&cli.input)?;
    let motion = MotionTrajectory::from_store(&input, &cli.group)?;
    tracing::info!("Motion `{}`: {} frames", cli.group, motion.len());

    let mut session = RetargetSession::new(&model, &config);
    let trajectory = session.run(&motion);

    let written = MotionStore::open_or_default(&cli.output).and_then(|mut output| {
        trajectory.write_to(&mut output, &cli.group);
        output.save(&cli.output)
    });
    match written {
        Ok(()) => {
            tracing::info!(
                "Wrote {} frames of `{}` to {}",
                trajectory.joints.len(),
                cli.group,
                cli.output.display()
            );
            Ok(())
        }
        Err(err) => {
            tracing::error!("Writing results failed: {}", err);
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_log_filter() {
        assert_eq!(log_filter(None).to_string(), "info");
        assert_eq!(log_filter(Some("")).to_string(), "info");
        // a bare level is not narrowed to this crate
        assert_eq!(log_filter(Some("debug")).to_string(), "debug");
        assert!(log_filter(Some("retarget=trace")).to_string().contains("retarget=trace"));
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["arm_retarget"]);
        assert_eq!(cli.group, "fengren");
        assert_eq!(cli.urdf, PathBuf::from("urdf/dual_arm.urdf"));
        assert!(cli.config.is_none());
    }
}
