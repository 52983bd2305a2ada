use clap::{Arg, Command};

/// Boolean collection toggles, all enabled by default. Each gets an
/// enable/disable flag pair so a default can be turned off from the command
/// line (`--no-collect-logs-size`).
pub const COLLECT_FLAGS: &[&str] = &[
    "collect-instance-metrics",
    "collect-instance-tags",
    "collect-instance-types",
    "collect-logs-size",
    "collect-maintenances",
    "collect-quotas",
    "collect-usages",
];

pub fn add_collect_flags(mut cmd: Command) -> Command {
    for &name in COLLECT_FLAGS {
        let disable_flag: &'static str = Box::leak(format!("no-{name}").into_boxed_str());
        let enable_help: &'static str =
            Box::leak(format!("Enable {name} [default: enabled]").into_boxed_str());
        let disable_help: &'static str = Box::leak(format!("Disable {name}").into_boxed_str());

        cmd = cmd
            .arg(
                Arg::new(name)
                    .long(name)
                    .help(enable_help)
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new(disable_flag)
                    .long(disable_flag)
                    .help(disable_help)
                    .action(clap::ArgAction::SetTrue)
                    .overrides_with(name),
            );
    }
    cmd
}
