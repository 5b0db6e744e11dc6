//! Command line and `harvester.ron` handling.
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use engine_logging::LogDestination;
use harvester_core::RunMode;
use harvester_engine::{ChromiumSettings, HarvestSettings};
use log::LevelFilter;
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "harvester.ron";
const DEFAULT_PROFILE_DIR: &str = ".browser_profile";
const DEFAULT_DOWNLOAD_DIR: &str = ".browser_downloads";

#[derive(Debug, Parser)]
#[command(
    name = "harvester",
    version,
    about = "Harvest attachments or post text from a paginated forum behind a login"
)]
pub struct Cli {
    /// RON configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Overrides the mode from the configuration file.
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    #[arg(long, value_enum, default_value_t = LogArg::Both)]
    pub log: LogArg,

    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[arg(long)]
    pub verbose: bool,

    /// DevTools endpoint of a running browser, e.g. http://127.0.0.1:9222.
    /// Without it a browser window is launched.
    #[arg(long)]
    pub connect: Option<String>,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
pub enum ModeArg {
    #[default]
    Attachments,
    Text,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Attachments => RunMode::Attachments,
            ModeArg::Text => RunMode::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogArg {
    File,
    Terminal,
    Both,
}

impl From<LogArg> for LogDestination {
    fn from(log: LogArg) -> Self {
        match log {
            LogArg::File => LogDestination::File,
            LogArg::Terminal => LogDestination::Terminal,
            LogArg::Both => LogDestination::Both,
        }
    }
}

/// Contents of `harvester.ron`. Only `start_url` is required.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub start_url: String,
    #[serde(default)]
    pub mode: ModeArg,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub checkpoint_path: Option<PathBuf>,
    #[serde(default)]
    pub artifact_prefix: Option<String>,
    #[serde(default)]
    pub batch_size: Option<u64>,
    #[serde(default)]
    pub connect_url: Option<String>,
    #[serde(default)]
    pub browser_executable: Option<PathBuf>,
    #[serde(default)]
    pub profile_dir: Option<PathBuf>,
    #[serde(default)]
    pub headless: bool,
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    #[serde(default)]
    pub page_settle_ms: Option<u64>,
    #[serde(default)]
    pub item_pause_ms: Option<u64>,
    #[serde(default)]
    pub selectors: SelectorOverrides,
    #[serde(default)]
    pub timeouts_secs: TimeoutOverrides,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectorOverrides {
    pub listing_frame: Option<String>,
    pub entry_link: Option<String>,
    pub next_link: Option<String>,
    pub download_link: Option<String>,
    pub preview_link: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeoutOverrides {
    pub listing: Option<u64>,
    pub detail_open: Option<u64>,
    pub detail_load: Option<u64>,
    pub download: Option<u64>,
    pub content: Option<u64>,
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid configuration {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(content)?)
    }
}

/// Everything a run needs, with defaults applied and the command line on top.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub start_url: Url,
    pub harvest: HarvestSettings,
    pub browser: ChromiumSettings,
}

impl RunPlan {
    pub fn resolve(cli: &Cli, config: AppConfig) -> anyhow::Result<Self> {
        let start_url = Url::parse(config.start_url.trim())
            .with_context(|| format!("start_url {:?} is not a valid URL", config.start_url))?;
        let mode = cli.mode.unwrap_or(config.mode);
        let run_mode = RunMode::from(mode);

        let output_dir = config
            .output_dir
            .unwrap_or_else(|| default_output_dir(run_mode));
        let checkpoint_path = config
            .checkpoint_path
            .unwrap_or_else(|| default_checkpoint_path(run_mode));
        let download_dir = config
            .download_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR));
        if download_dir == output_dir {
            bail!("download_dir and output_dir must differ");
        }

        let mut harvest = HarvestSettings::new(run_mode, output_dir, checkpoint_path);
        if let Some(prefix) = config.artifact_prefix {
            harvest.artifact_prefix = prefix;
        }
        if let Some(batch_size) = config.batch_size {
            if batch_size == 0 {
                bail!("batch_size must be at least 1");
            }
            harvest.batch_size = batch_size;
        }
        if let Some(ms) = config.page_settle_ms {
            harvest.page_settle = Duration::from_millis(ms);
        }
        if let Some(ms) = config.item_pause_ms {
            harvest.item_pause = Duration::from_millis(ms);
        }
        apply_selectors(&mut harvest, config.selectors);
        apply_timeouts(&mut harvest, config.timeouts_secs);

        let mut browser = ChromiumSettings::new(download_dir);
        if let Some(endpoint) = cli.connect.clone().or(config.connect_url) {
            Url::parse(&endpoint)
                .with_context(|| format!("browser endpoint {endpoint:?} is not a valid URL"))?;
            browser.connect_url = Some(endpoint);
        }
        browser.executable = config.browser_executable;
        browser.profile_dir = Some(
            config
                .profile_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROFILE_DIR)),
        );
        browser.headless = config.headless;

        Ok(Self {
            start_url,
            harvest,
            browser,
        })
    }
}

pub fn default_output_dir(mode: RunMode) -> PathBuf {
    match mode {
        RunMode::Attachments => PathBuf::from("downloads"),
        RunMode::Text => PathBuf::from("output"),
    }
}

pub fn default_checkpoint_path(mode: RunMode) -> PathBuf {
    match mode {
        RunMode::Attachments => PathBuf::from("download_progress.json"),
        RunMode::Text => PathBuf::from("crawl_progress.json"),
    }
}

fn apply_selectors(harvest: &mut HarvestSettings, overrides: SelectorOverrides) {
    let selectors = &mut harvest.selectors;
    if let Some(frame) = overrides.listing_frame {
        // An empty name reads the listing from the page itself.
        selectors.listing_frame = (!frame.is_empty()).then_some(frame);
    }
    if let Some(value) = overrides.entry_link {
        selectors.entry_link = value;
    }
    if let Some(value) = overrides.next_link {
        selectors.next_link = value;
    }
    if let Some(value) = overrides.download_link {
        selectors.download_link = value;
    }
    if let Some(value) = overrides.preview_link {
        selectors.preview_link = value;
    }
    if let Some(value) = overrides.content {
        selectors.content = value;
    }
}

fn apply_timeouts(harvest: &mut HarvestSettings, overrides: TimeoutOverrides) {
    let timeouts = &mut harvest.timeouts;
    let pairs = [
        (overrides.listing, &mut timeouts.listing),
        (overrides.detail_open, &mut timeouts.detail_open),
        (overrides.detail_load, &mut timeouts.detail_load),
        (overrides.download, &mut timeouts.download),
        (overrides.content, &mut timeouts.content),
    ];
    for (secs, slot) in pairs {
        if let Some(secs) = secs {
            *slot = Duration::from_secs(secs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["harvester"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn minimal_config_gets_attachment_defaults() {
        let config = AppConfig::parse(r#"(start_url: "https://bbs.example.org/")"#).unwrap();
        let plan = RunPlan::resolve(&cli(&[]), config).unwrap();

        assert_eq!(plan.harvest.mode, RunMode::Attachments);
        assert_eq!(plan.harvest.output_dir, PathBuf::from("downloads"));
        assert_eq!(
            plan.harvest.checkpoint_path,
            PathBuf::from("download_progress.json")
        );
        assert_eq!(plan.harvest.batch_size, 100);
        assert_eq!(plan.harvest.selectors.listing_frame.as_deref(), Some("f3"));
        assert_eq!(plan.browser.connect_url, None);
        assert_eq!(
            plan.browser.profile_dir,
            Some(PathBuf::from(".browser_profile"))
        );
        assert!(!plan.browser.headless);
    }

    #[test]
    fn command_line_mode_wins_and_picks_text_defaults() {
        let config = AppConfig::parse(
            r#"(start_url: "https://bbs.example.org/", mode: Attachments)"#,
        )
        .unwrap();
        let plan = RunPlan::resolve(
            &cli(&["--mode", "text", "--connect", "http://127.0.0.1:9222"]),
            config,
        )
        .unwrap();

        assert_eq!(plan.harvest.mode, RunMode::Text);
        assert_eq!(plan.harvest.output_dir, PathBuf::from("output"));
        assert_eq!(
            plan.harvest.checkpoint_path,
            PathBuf::from("crawl_progress.json")
        );
        assert_eq!(
            plan.browser.connect_url.as_deref(),
            Some("http://127.0.0.1:9222")
        );
    }

    #[test]
    fn overrides_are_applied() {
        let config = AppConfig::parse(
            r#"#![enable(implicit_some)]
            (
                start_url: "https://bbs.example.org/",
                mode: Text,
                output_dir: "corpus",
                batch_size: 50,
                artifact_prefix: "Board",
                item_pause_ms: 0,
                selectors: (listing_frame: "", content: "div.body"),
                timeouts_secs: (download: 30),
            )"#,
        )
        .unwrap();
        let plan = RunPlan::resolve(&cli(&[]), config).unwrap();

        assert_eq!(plan.harvest.output_dir, PathBuf::from("corpus"));
        assert_eq!(plan.harvest.batch_size, 50);
        assert_eq!(plan.harvest.artifact_prefix, "Board");
        assert_eq!(plan.harvest.item_pause, Duration::ZERO);
        assert_eq!(plan.harvest.selectors.listing_frame, None);
        assert_eq!(plan.harvest.selectors.content, "div.body");
        assert_eq!(plan.harvest.timeouts.download, Duration::from_secs(30));
        assert_eq!(plan.harvest.timeouts.listing, Duration::from_secs(20));
    }

    #[test]
    fn rejects_bad_values() {
        let bad_url = AppConfig::parse(r#"(start_url: "not a url")"#).unwrap();
        assert!(RunPlan::resolve(&cli(&[]), bad_url).is_err());

        let zero_batch = AppConfig::parse(
            r#"#![enable(implicit_some)]
            (start_url: "https://bbs.example.org/", batch_size: 0)"#,
        )
        .unwrap();
        assert!(RunPlan::resolve(&cli(&[]), zero_batch).is_err());

        assert!(AppConfig::parse("(mode: Text)").is_err());

        let bad_endpoint = AppConfig::parse(
            r#"#![enable(implicit_some)]
            (start_url: "https://bbs.example.org/", connect_url: "localhost 9222")"#,
        )
        .unwrap();
        assert!(RunPlan::resolve(&cli(&[]), bad_endpoint).is_err());
    }

    #[test]
    fn download_dir_must_not_be_the_output_dir() {
        let config = AppConfig::parse(
            r#"#![enable(implicit_some)]
            (start_url: "https://bbs.example.org/", output_dir: "same", download_dir: "same")"#,
        )
        .unwrap();
        assert!(RunPlan::resolve(&cli(&[]), config).is_err());
    }
}
