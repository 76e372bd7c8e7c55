use crate::constants::*;
use anyhow::{anyhow, Result};
use chrono::Datelike;
use clap::{ArgAction, Parser, Subcommand};
use env_logger::fmt::Color;
use log::{Level, LevelFilter};
use once_cell::sync::Lazy;
use std::{
    io::Write,
    path::{Path, PathBuf},
};

/// Full version string including the crate version and git description.
///
/// # Examples
/// * `0.1.0-1ba958a-dirty` - while on a dirty branch
/// * `0.1.0-1ba958a` - with a fresh commit
pub static FULL_VERSION: Lazy<String> = Lazy::new(|| {
    let git_describe = env!("VERGEN_GIT_DESCRIBE");
    if git_describe.is_empty() {
        env!("CARGO_PKG_VERSION").to_string()
    } else {
        format!("{}-{}", env!("CARGO_PKG_VERSION"), git_describe)
    }
});

#[derive(Parser, Debug)]
#[command(name="tuplemr",
          version=&**FULL_VERSION,
          about="Multi-schema tuple sorting, grouping and rollup",
          long_about = None,
          after_help = format!("Copyright (C) {}  tuplemr contributors.
          This program comes with ABSOLUTELY NO WARRANTY.", chrono::Utc::now().year()),
          help_template = "{name} {version}\n{about-section}\n{usage-heading}\n    {usage}\n\n{all-args}{after-help}",
          )]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Specify multiple times to increase verbosity level (e.g., -vv for more verbosity)
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        global = true
    )]
    pub verbosity: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a job configuration and print the derived schemas
    Check(CheckArgs),
    /// Count records per group (and per rollup level) of TSV inputs
    Run(RunArgs),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Check(_) => "check",
            Command::Run(_) => "run",
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(arg_required_else_help(true))]
pub struct CheckArgs {
    /// Job configuration (JSON)
    #[arg(
        short = 'c',
        long = "config",
        value_name = "JSON",
        value_parser = check_file_exists
    )]
    pub config: PathBuf,
}

/// One input file and the schema its lines follow.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    pub schema: String,
    pub path: PathBuf,
}

#[derive(Parser, Debug, Clone)]
#[command(arg_required_else_help(true))]
pub struct RunArgs {
    /// Job configuration (JSON)
    #[arg(
        short = 'c',
        long = "config",
        value_name = "JSON",
        value_parser = check_file_exists
    )]
    pub config: PathBuf,

    /// Tab-separated input as SCHEMA=FILE, optionally gzipped; repeatable
    #[arg(
        short = 'i',
        long = "input",
        value_name = "SCHEMA=FILE",
        required = true,
        num_args = 1..,
        value_parser = parse_input_spec
    )]
    pub inputs: Vec<InputSpec>,

    /// Write output to a file [default: standard output]
    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        value_parser = check_prefix_path
    )]
    pub output: Option<String>,

    /// Number of reduce partitions
    #[arg(
        short = 'p',
        long = "partitions",
        value_name = "PARTITIONS",
        default_value_t = DEFAULT_NUM_PARTITIONS,
        value_parser = partitions_in_range
    )]
    pub num_partitions: usize,

    /// Number of threads to use
    #[arg(
        short = '@',
        value_name = "THREADS",
        default_value_t = DEFAULT_NUM_THREADS,
        value_parser = threads_in_range
    )]
    pub num_threads: usize,

    /// Memory budget per partition sorter before spilling, in bytes
    #[arg(
        long = "sort-max-mem",
        value_name = "BYTES",
        default_value_t = DEFAULT_SORT_MAX_MEM,
        help_heading = "Advanced"
    )]
    pub sort_max_mem: usize,

    /// Maximum number of spill files open at once during a merge
    #[arg(
        long = "sort-max-open-files",
        value_name = "FILES",
        default_value_t = DEFAULT_SORT_MAX_OPEN_FILES,
        help_heading = "Advanced"
    )]
    pub sort_max_open_files: usize,

    /// Number of spill runs merged per pass
    #[arg(
        long = "sort-merge-fan-in",
        value_name = "RUNS",
        default_value_t = DEFAULT_SORT_MERGE_FAN_IN,
        help_heading = "Advanced"
    )]
    pub sort_merge_fan_in: usize,

    /// Directory for spill files [default: system temporary directory]
    #[arg(
        long = "tmp-dir",
        value_name = "DIR",
        value_parser = check_dir_exists,
        help_heading = "Advanced"
    )]
    pub tmp_dir: Option<PathBuf>,
}

/// Initializes the logger from the number of `-v` flags.
pub fn init_verbose(args: &Cli) {
    let filter_level: LevelFilter = match args.verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            let level = record.level();
            let mut style = buf.style();
            match record.level() {
                Level::Error => style.set_color(Color::Red),
                Level::Warn => style.set_color(Color::Yellow),
                Level::Info => style.set_color(Color::Green),
                Level::Debug => style.set_color(Color::Blue),
                Level::Trace => style.set_color(Color::Cyan),
            };

            writeln!(
                buf,
                "{} [{}] {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                style.value(level),
                record.module_path().unwrap_or("unknown_module"),
                record.args()
            )
        })
        .filter_level(filter_level)
        .init();
}

fn threads_in_range(s: &str) -> Result<usize> {
    let thread: usize = s
        .parse::<usize>()
        .map_err(|_| anyhow!("`{}` is not a valid thread number", s))?;
    if thread == 0 {
        return Err(anyhow!("Number of threads must be >= 1"));
    }
    Ok(thread)
}

fn partitions_in_range(s: &str) -> Result<usize> {
    let partitions: usize = s
        .parse::<usize>()
        .map_err(|_| anyhow!("`{}` is not a valid number of partitions", s))?;
    if partitions == 0 {
        return Err(anyhow!("Number of partitions must be >= 1"));
    }
    Ok(partitions)
}

fn check_file_exists(s: &str) -> Result<PathBuf> {
    let path = Path::new(s);
    if !path.exists() {
        return Err(anyhow!("File does not exist: {}", path.display()));
    }
    Ok(path.to_path_buf())
}

fn check_dir_exists(s: &str) -> Result<PathBuf> {
    let path = Path::new(s);
    if !path.is_dir() {
        return Err(anyhow!("Directory does not exist: {}", path.display()));
    }
    Ok(path.to_path_buf())
}

fn check_prefix_path(s: &str) -> Result<String> {
    let path = Path::new(s);
    if let Some(parent_dir) = path.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            return Err(anyhow!("Path does not exist: {}", parent_dir.display()));
        }
    }
    Ok(s.to_string())
}

fn parse_input_spec(s: &str) -> Result<InputSpec> {
    let (schema, file) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected SCHEMA=FILE, got `{}`", s))?;
    if schema.is_empty() {
        return Err(anyhow!("Missing schema name in `{}`", s));
    }
    Ok(InputSpec {
        schema: schema.to_string(),
        path: check_file_exists(file)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_arguments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = dir.path().join("job.json");
        let clicks = dir.path().join("clicks.tsv");
        std::fs::write(&config, "{}").expect("write config");
        std::fs::write(&clicks, "").expect("write input");

        let cli = Cli::try_parse_from([
            "tuplemr".to_string(),
            "-vv".to_string(),
            "run".to_string(),
            "--config".to_string(),
            config.display().to_string(),
            "--input".to_string(),
            format!("clicks={}", clicks.display()),
            "-@".to_string(),
            "3".to_string(),
        ])
        .expect("arguments should parse");
        assert_eq!(cli.verbosity, 2);
        assert_eq!(cli.command.name(), "run");
        let Command::Run(args) = cli.command else {
            panic!("expected the run command");
        };
        assert_eq!(
            args.inputs,
            [InputSpec {
                schema: "clicks".to_string(),
                path: clicks
            }]
        );
        assert_eq!(args.num_threads, 3);
        assert_eq!(args.num_partitions, DEFAULT_NUM_PARTITIONS);
        assert_eq!(args.sort_merge_fan_in, DEFAULT_SORT_MERGE_FAN_IN);
        assert!(args.output.is_none());
    }

    #[test]
    fn test_value_parsers_reject_bad_input() {
        assert!(threads_in_range("0").is_err());
        assert!(threads_in_range("many").is_err());
        assert_eq!(partitions_in_range("8").expect("eight partitions"), 8);
        assert!(partitions_in_range("0").is_err());
        assert!(parse_input_spec("no-separator").is_err());
        assert!(parse_input_spec("=file.tsv").is_err());
        let err = parse_input_spec("clicks=/definitely/not/here.tsv").expect_err("missing file");
        assert!(err.to_string().contains("File does not exist"));
        assert!(check_prefix_path("/definitely/not/here/out.tsv").is_err());
        assert!(check_prefix_path("out.tsv").is_ok());
    }
}
