//! pixelprops CLI commands
//!
//! Drives the policy engine against an in-memory build holder so the
//! decisions for any package/process pair can be inspected.
//!
//! ## Commands
//!
//! - `pixelprops classify <PACKAGE> <PROCESS>` - Show which profiles apply
//! - `pixelprops attach <PACKAGE> [PROCESS]` - Attach and print the resulting build fields
//! - `pixelprops feature <PACKAGE> <NAME>` - Answer a system feature query
//! - `pixelprops attestation <PACKAGE> <PROCESS>` - Check the key attestation gate
//! - `pixelprops fetch` - Fetch and print the certified profile
//!
//! ## Exit Codes
//! - 0: Success
//! - 1: Error (config, engine or fetch)
//! - 2: Key attestation blocked

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use pixelprops_core::BuildFields;
use pixelprops_core::CallContext;
use pixelprops_core::Classification;
use pixelprops_core::EnvProperties;
use pixelprops_core::PackageClassifier;
use pixelprops_core::PolicyEngine;
use pixelprops_core::PolicyToggles;
use pixelprops_core::Profile;
use pixelprops_core::PropsConfig;
use pixelprops_core::RemoteConfigFetcher;
use pixelprops_core::RemoteProfileStore;
use serde_json::json;

/// Exit code when key attestation is refused.
pub const EXIT_BLOCKED: i32 = 2;

/// pixelprops: per-process device identity policy
#[derive(Debug, Parser)]
#[command(name = "pixelprops", version)]
pub struct PropsCli {
    /// Config file (takes precedence over PIXELPROPS_CONFIG)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: PropsSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum PropsSubcommand {
    /// Show which profiles apply to a package/process pair
    Classify(ClassifyArgs),

    /// Attach a process and print the build fields it would see
    Attach(AttachArgs),

    /// Answer a system feature query for a package
    Feature(FeatureArgs),

    /// Check whether key attestation is refused for a process
    Attestation(AttestationArgs),

    /// Fetch the certified profile and print it
    Fetch(FetchArgs),
}

#[derive(Debug, Parser)]
pub struct ClassifyArgs {
    pub package: String,
    pub process: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct AttachArgs {
    pub package: String,

    /// Process name; without one the attach is ignored
    pub process: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct FeatureArgs {
    pub package: String,
    pub name: String,

    /// Answer the host would give without the policy
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub default: bool,
}

#[derive(Debug, Parser)]
pub struct AttestationArgs {
    pub package: String,
    pub process: String,

    /// Treat the call as coming from DroidGuard
    #[arg(long)]
    pub droidguard: bool,
}

#[derive(Debug, Parser)]
pub struct FetchArgs {
    /// Endpoint override
    #[arg(long)]
    pub url: Option<String>,

    /// Wait budget override in milliseconds
    #[arg(long, value_name = "MS")]
    pub budget_ms: Option<u64>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl PropsCli {
    pub fn run(self) -> i32 {
        match self.dispatch() {
            Ok(code) => code,
            Err(err) => {
                eprintln!("error: {err:#}");
                1
            }
        }
    }

    fn dispatch(self) -> anyhow::Result<i32> {
        let config = self.load_config()?;
        match self.command {
            PropsSubcommand::Classify(args) => Ok(run_classify(&config, args)),
            PropsSubcommand::Attach(args) => run_attach(config, args),
            PropsSubcommand::Feature(args) => run_feature(config, args),
            PropsSubcommand::Attestation(args) => run_attestation(config, args),
            PropsSubcommand::Fetch(args) => run_fetch(&config, args),
        }
    }

    fn load_config(&self) -> anyhow::Result<PropsConfig> {
        match &self.config {
            Some(path) => PropsConfig::load_from_path(path)
                .with_context(|| format!("loading config from {}", path.display())),
            None => PropsConfig::load().context("loading config"),
        }
    }
}

fn build_engine(config: PropsConfig) -> anyhow::Result<(PolicyEngine, Arc<BuildFields>)> {
    let toggles = PolicyToggles::resolve(&EnvProperties, &config);
    let fields = Arc::new(BuildFields::new());
    let engine = PolicyEngine::new(config, toggles, fields.clone()).context("starting engine")?;
    Ok((engine, fields))
}

fn describe(classification: Classification) -> String {
    match classification {
        Classification::NoOverride => "no override".to_string(),
        Classification::ApplyProfile(id) => id.to_string(),
        Classification::ApplyProfileThenGameProfile(main, game) => format!("{main} + {game}"),
        Classification::GameProfileOnly(game) => format!("{game} (game only)"),
    }
}

fn profile_json(profile: &Profile) -> serde_json::Value {
    profile
        .iter()
        .map(|value| (value.key().target().to_string(), json!(value.to_string())))
        .collect::<serde_json::Map<_, _>>()
        .into()
}

fn run_classify(config: &PropsConfig, args: ClassifyArgs) -> i32 {
    let toggles = PolicyToggles::resolve(&EnvProperties, config);
    let classification =
        PackageClassifier::new(toggles.games_enabled).classify(&args.package, &args.process);

    if args.json {
        let output = json!({
            "package": args.package,
            "process": args.process,
            "main_profile": classification.main_profile().map(|id| id.to_string()),
            "game_profile": classification.game_profile().map(|id| id.to_string()),
        });
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
    } else {
        println!("{}", describe(classification));
    }
    0
}

fn run_attach(config: PropsConfig, args: AttachArgs) -> anyhow::Result<i32> {
    let (engine, fields) = build_engine(config)?;
    let report = engine.on_process_attach(&args.package, args.process.as_deref());
    let snapshot = fields.snapshot();

    if args.json {
        let fields: serde_json::Map<_, _> = snapshot
            .iter()
            .map(|(key, value)| (key.target().to_string(), json!(value.to_string())))
            .collect();
        let output = json!({
            "classification": report.as_ref().map(|r| describe(r.classification)),
            "certified_refresh": report
                .as_ref()
                .and_then(|r| r.certified_refresh.as_ref())
                .map(|outcome| match outcome {
                    Ok(()) => "ok".to_string(),
                    Err(err) => err.to_string(),
                }),
            "fields": fields,
        });
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
        return Ok(0);
    }

    match &report {
        None => println!("ignored"),
        Some(report) => {
            println!("profiles: {}", describe(report.classification));
            if let Some(Err(err)) = &report.certified_refresh {
                println!("certified profile: {err}");
            }
        }
    }
    for (key, value) in &snapshot {
        println!("{} = {value}", key.target());
    }
    Ok(0)
}

fn run_feature(config: PropsConfig, args: FeatureArgs) -> anyhow::Result<i32> {
    let (engine, _fields) = build_engine(config)?;
    engine.on_process_attach(&args.package, Some(&args.package));
    println!("{}", engine.has_system_feature(&args.name, args.default));
    Ok(0)
}

fn run_attestation(config: PropsConfig, args: AttestationArgs) -> anyhow::Result<i32> {
    let (engine, _fields) = build_engine(config)?;
    engine.on_process_attach(&args.package, Some(&args.process));

    let ctx = if args.droidguard {
        CallContext::droidguard()
    } else {
        CallContext::default()
    };
    match engine.check_attestation_for_attached(ctx) {
        Ok(()) => {
            println!("allowed");
            Ok(0)
        }
        Err(blocked) => {
            println!("{blocked}");
            Ok(EXIT_BLOCKED)
        }
    }
}

fn run_fetch(config: &PropsConfig, args: FetchArgs) -> anyhow::Result<i32> {
    let url = args.url.unwrap_or_else(|| config.remote.url.clone());
    let budget = args
        .budget_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.remote.wait_budget());

    let fetcher = RemoteConfigFetcher::new(
        Arc::new(RemoteProfileStore::new()),
        config.remote.request_timeout(),
    )?;
    let profile = fetcher
        .fetch_certified_profile(&url, budget)
        .with_context(|| format!("fetching {url}"))?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&profile_json(&profile)).unwrap_or_default()
        );
    } else {
        for value in profile.iter() {
            println!("{} = {value}", value.key().target());
        }
    }
    Ok(0)
}
