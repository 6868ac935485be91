use crate::plugins::registry::{CliPlugin, FetchCliConfig};
use clap::{Arg, ArgMatches, Command};

pub struct SimulateCliPlugin;

impl SimulateCliPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl CliPlugin for SimulateCliPlugin {
    fn name(&self) -> &'static str {
        "simulate"
    }

    fn augment_fetch_command(&self, cmd: Command) -> Command {
        cmd.arg(
            Arg::new("sim_items")
                .long("sim-items")
                .help_heading("Simulation")
                .help("Number of items the simulated source contains")
                .default_value("1")
                .num_args(1),
        )
        .arg(
            Arg::new("sim_size_mb")
                .long("sim-size-mb")
                .help_heading("Simulation")
                .help("Size of each simulated item in MB")
                .default_value("8")
                .num_args(1),
        )
        .arg(
            Arg::new("sim_chunk_kb")
                .long("sim-chunk-kb")
                .help_heading("Simulation")
                .help("Bytes written per progress tick, in KB")
                .default_value("256")
                .num_args(1),
        )
        .arg(
            Arg::new("sim_delay_ms")
                .long("sim-delay-ms")
                .help_heading("Simulation")
                .help("Delay between progress ticks")
                .default_value("50")
                .num_args(1),
        )
        .arg(
            Arg::new("sim_fail")
                .long("sim-fail")
                .help_heading("Simulation")
                .help("Fail halfway through with this engine message, e.g. 'ERROR: Video unavailable'")
                .num_args(1),
        )
    }

    fn apply_fetch_matches(&self, matches: &ArgMatches, cfg: &mut FetchCliConfig) -> anyhow::Result<()> {
        if let Some(s) = matches.get_one::<String>("sim_items") {
            cfg.simulate.items = s.parse::<u32>()?.max(1);
        }
        if let Some(s) = matches.get_one::<String>("sim_size_mb") {
            cfg.simulate.item_bytes = s.parse::<u64>()? * 1024 * 1024;
        }
        if let Some(s) = matches.get_one::<String>("sim_chunk_kb") {
            cfg.simulate.chunk_bytes = (s.parse::<u64>()? * 1024).max(1);
        }
        if let Some(s) = matches.get_one::<String>("sim_delay_ms") {
            cfg.simulate.chunk_delay_ms = s.parse()?;
        }
        if let Some(msg) = matches.get_one::<String>("sim_fail") {
            cfg.simulate.fail_with = Some(msg.clone());
        }
        Ok(())
    }
}
