use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use conda_tos::channel::{Channel, ChannelContext, expand_channels};
use conda_tos::config::{Config, Settings};
use conda_tos::environment::Environment;
use conda_tos::error::{Error, Result};
use conda_tos::header::{ACCEPTANCE_HEADER, acceptance_header};
use conda_tos::interactive::{DecidedBy, GateOptions, Prompt, gate};
use conda_tos::models::{MetadataRecord, RemoteMetadata};
use conda_tos::path::{ENV_TOS_ROOT, SITE_TOS_ROOT, SYSTEM_TOS_ROOT, USER_TOS_ROOT};
use conda_tos::remote::HttpRemote;
use conda_tos::tos::TosClient;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const BIN_NAME: &str = env!("CARGO_BIN_NAME");

#[derive(Parser, Debug)]
#[command(name = BIN_NAME)]
#[command(about = "View, accept and reject channel Terms of Service", long_about = None)]
#[command(version = VERSION)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    channels: ChannelArgs,

    #[command(flatten)]
    location: LocationArgs,

    #[command(flatten)]
    cache: CacheArgs,

    /// Path to a configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Color output mode (also respects NO_COLOR and FORCE_COLOR env vars)
    #[arg(
        long,
        visible_alias = "colour",
        value_enum,
        default_value = "auto",
        global = true
    )]
    color: ColorMode,
}

#[derive(ClapArgs, Debug)]
struct ChannelArgs {
    /// Channel to operate on (repeatable); added to the configured channels
    #[arg(short = 'c', long = "channel", global = true)]
    channel: Vec<String>,

    /// Only use channels given with --channel
    #[arg(long, global = true)]
    override_channels: bool,
}

#[derive(ClapArgs, Debug)]
struct LocationArgs {
    /// Write decisions to the site-wide directory
    #[arg(long, global = true)]
    site: bool,

    /// Write decisions into the conda installation
    #[arg(long, global = true)]
    system: bool,

    /// Write decisions to the user's home directory
    #[arg(long, global = true)]
    user: bool,

    /// Write decisions into the active environment
    #[arg(long, global = true)]
    env: bool,

    /// Write decisions to a custom directory
    #[arg(
        long,
        value_name = "DIR",
        global = true,
        conflicts_with_all = ["site", "system", "user", "env"]
    )]
    tos_root: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
struct CacheArgs {
    /// Seconds before a channel's ToS is checked again
    #[arg(long, value_name = "SECS", global = true)]
    cache_timeout: Option<u64>,

    /// Always check the remote ToS
    #[arg(long, global = true, conflicts_with = "cache_timeout")]
    ignore_cache: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorMode {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List ToS state for active channels and every channel with a decision (default)
    List,
    /// Accept the ToS of the selected channels
    Accept,
    /// Reject the ToS of the selected channels
    Reject,
    /// Print the ToS text of the selected channels
    View,
    /// Prompt for every channel whose ToS has not been decided yet
    Interactive,
    /// Show search path, cache and environment details
    Info,
    /// Remove cached checks and/or stored decisions
    Clean {
        /// Remove cache markers
        #[arg(long)]
        cache: bool,
        /// Remove stored ToS decisions
        #[arg(long)]
        tos: bool,
        /// Remove both
        #[arg(long)]
        all: bool,
    },
}

/// Everything a command needs, resolved once from CLI args, config and environment
struct Context {
    settings: Settings,
    channels: Vec<Channel>,
    tos_root: PathBuf,
    cache_timeout: Option<Duration>,
    client: TosClient<HttpRemote>,
    env: Environment,
}

fn main() {
    conda_tos::init_tracing();

    tracing::debug!("{BIN_NAME} version {VERSION}");

    let args = Args::parse();
    let env = Environment::capture();

    // Configure color output
    if let Some(enabled) = color_override(args.color, &env) {
        colored::control::set_override(enabled);
    }

    if let Err(e) = run(args, env) {
        eprintln!("{} {e}", "error:".red().bold());
        process::exit(1);
    }
}

fn run(args: Args, env: Environment) -> Result<()> {
    let config = Config::load(args.config.as_deref(), &env)?;
    let ctx = Context::new(&args, &config, env)?;

    match args.command.unwrap_or(Commands::List) {
        Commands::List => run_list(&ctx),
        Commands::Accept => run_decide(&ctx, true),
        Commands::Reject => run_decide(&ctx, false),
        Commands::View => run_view(&ctx),
        Commands::Interactive => run_interactive(&ctx),
        Commands::Info => {
            print_info(&ctx);
            Ok(())
        }
        Commands::Clean { cache, tos, all } => {
            run_clean(&ctx, cache || all, tos || all);
            Ok(())
        }
    }
}

impl Context {
    fn new(args: &Args, config: &Config, env: Environment) -> Result<Self> {
        let settings = Settings::new(config, &env)?;

        let channel_context = ChannelContext::new(&config.channels);
        let references: Vec<&str> = if args.channels.override_channels {
            args.channels.channel.iter().map(String::as_str).collect()
        } else {
            args.channels
                .channel
                .iter()
                .chain(config.channels.channels.iter())
                .map(String::as_str)
                .collect()
        };
        let channels = expand_channels(&channel_context, references);

        let tos_root = tos_root(&args.location, &settings, &env)?;

        let cache_timeout = if args.cache.ignore_cache {
            Some(Duration::ZERO)
        } else {
            Some(
                args.cache
                    .cache_timeout
                    .map(Duration::from_secs)
                    .unwrap_or(settings.cache_timeout),
            )
        };

        let client = TosClient::from_settings(&settings, HttpRemote::from_settings(&settings)?);

        Ok(Self {
            settings,
            channels,
            tos_root,
            cache_timeout,
            client,
            env,
        })
    }
}

fn tos_root(location: &LocationArgs, settings: &Settings, env: &Environment) -> Result<PathBuf> {
    if let Some(dir) = &location.tos_root {
        return Ok(dir.clone());
    }

    let template = if location.site {
        SITE_TOS_ROOT
    } else if location.system {
        SYSTEM_TOS_ROOT
    } else if location.user {
        USER_TOS_ROOT
    } else if location.env {
        ENV_TOS_ROOT
    } else {
        return Ok(settings.default_tos_root.clone());
    };

    env.expand(template).ok_or_else(|| Error::Config {
        msg: format!("ToS location {template} references an unset variable"),
    })
}

fn run_list(ctx: &Context) -> Result<()> {
    let spinner = spinner("Checking Terms of Service...");
    let listing = ctx
        .client
        .list_all(&ctx.channels, &ctx.tos_root, ctx.cache_timeout);
    spinner.finish_and_clear();

    print_listing(&listing?, &ctx.env);
    Ok(())
}

fn run_decide(ctx: &Context, accept: bool) -> Result<()> {
    let verb = if accept { "accepted" } else { "rejected" };

    for channel in &ctx.channels {
        let result = if accept {
            ctx.client.accept(channel, &ctx.tos_root, ctx.cache_timeout)
        } else {
            ctx.client.reject(channel, &ctx.tos_root, ctx.cache_timeout)
        };

        match result {
            Ok(record) => {
                let status = format!("✓ ToS {verb}");
                let status = if accept {
                    status.green()
                } else {
                    status.yellow()
                };
                println!(
                    "{} {} (version {})",
                    status.bold(),
                    channel.to_string().cyan(),
                    record.version()
                );
            }
            Err(e) if e.is_missing() => {
                println!("{} {}", "No ToS for".bright_black(), channel);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn run_view(ctx: &Context) -> Result<()> {
    for channel in &ctx.channels {
        match ctx.client.resolve(channel, &ctx.tos_root, ctx.cache_timeout) {
            Ok(record) => print_tos(channel, record.current()),
            Err(e) if e.is_missing() => {
                println!("{} {}", "No ToS for".bright_black(), channel);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn run_interactive(ctx: &Context) -> Result<()> {
    let options = GateOptions {
        auto_accept: ctx.settings.auto_accept,
        ci: ctx.settings.ci,
    };

    let decisions = gate(
        &ctx.client,
        &ctx.channels,
        &ctx.tos_root,
        ctx.cache_timeout,
        options,
        &mut StdinPrompt,
    )?;

    for decision in &decisions {
        let how = match decision.decided_by {
            DecidedBy::Config => "auto-accepted",
            DecidedBy::Ci => "implicitly accepted (CI)",
            DecidedBy::User => "accepted",
        };
        println!(
            "{} {} (version {})",
            format!("✓ ToS {how}").green().bold(),
            decision.channel.to_string().cyan(),
            decision.record.version()
        );
    }

    println!("{}", "All channel Terms of Service accepted".green());
    Ok(())
}

fn run_clean(ctx: &Context, cache: bool, tos: bool) {
    if !cache && !tos {
        println!(
            "{}",
            "Nothing to clean, pass --cache, --tos or --all".yellow()
        );
        return;
    }

    if cache {
        let removed = ctx.client.clean_cache();
        print_removed("cache file(s)", &removed, &ctx.env);
    }
    if tos {
        let removed = ctx.client.clean_tos(&ctx.tos_root);
        print_removed("ToS file(s)", &removed, &ctx.env);
    }
}

/// Prompts on stdin/stdout
struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal()
    }

    fn ask(&mut self, channel: &Channel, metadata: &RemoteMetadata) -> Result<bool> {
        println!(
            "\n{} {}",
            "Terms of Service for".bold(),
            channel.to_string().cyan().bold()
        );

        let mut viewed = false;
        loop {
            let prompt = if viewed {
                "Accept the Terms of Service? [(a)ccept/(r)eject]: "
            } else {
                "Accept the Terms of Service? [(a)ccept/(r)eject/(v)iew]: "
            };
            let answer = read_confirmation(prompt)?.to_lowercase();
            match answer.as_str() {
                "a" | "accept" => return Ok(true),
                "r" | "reject" => return Ok(false),
                "v" | "view" if !viewed => {
                    print_tos(channel, metadata);
                    viewed = true;
                }
                _ => println!("{}", "Please answer (a)ccept or (r)eject".yellow()),
            }
        }
    }
}

fn read_confirmation(prompt: &str) -> Result<String> {
    let stdio_err = |error: std::io::Error| Error::Io {
        error,
        path: "<stdio>".to_string(),
    };

    print!("{prompt}");
    std::io::stdout().flush().map_err(stdio_err)?;
    let mut input = String::new();
    let read = std::io::stdin().read_line(&mut input).map_err(stdio_err)?;
    if read == 0 {
        // EOF: nobody is left to answer
        return Err(stdio_err(std::io::ErrorKind::UnexpectedEof.into()));
    }
    Ok(input.trim().to_string())
}

/// Forced color setting, if any; `None` leaves terminal detection to `colored`
fn color_override(mode: ColorMode, env: &Environment) -> Option<bool> {
    // environment variables take precedence
    if env.var("NO_COLOR").is_some() {
        return Some(false);
    }
    if env.var("FORCE_COLOR").is_some() {
        return Some(true);
    }

    match mode {
        ColorMode::Auto => None,
        ColorMode::Always => Some(true),
        ColorMode::Never => Some(false),
    }
}

fn spinner(message: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn print_listing(listing: &[(Channel, Option<MetadataRecord>)], env: &Environment) {
    if listing.is_empty() {
        println!("{}", "No channels found.".yellow());
        return;
    }

    let rows: Vec<[String; 5]> = listing
        .iter()
        .map(|(channel, record)| row(channel, record.as_ref(), env))
        .collect();

    let headers = ["CHANNEL", "VERSION", "ACCEPTED", "LOCATION", "SUPPORT"];
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .map(|r| r[i].chars().count())
                .max()
                .unwrap_or(0)
                .max(h.len())
        })
        .collect();

    // Print header
    let header_line: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, w)| format!("{}{:pad$}", h.cyan().bold(), "", pad = w - h.len()))
        .collect();
    println!("{}", header_line.join("  ").trim_end());
    println!(
        "{}",
        "-".repeat(widths.iter().sum::<usize>() + 2 * (widths.len() - 1))
            .bright_black()
    );

    // Print rows (padding computed on plain text, ANSI codes don't count)
    for ((_, record), cells) in listing.iter().zip(&rows) {
        let accepted = match record.as_ref().and_then(MetadataRecord::accepted) {
            Some(true) => cells[2].green(),
            Some(false) => cells[2].red(),
            None => cells[2].yellow(),
        };
        let colored = [
            cells[0].green(),
            cells[1].yellow(),
            accepted,
            cells[3].bright_black(),
            cells[4].normal(),
        ];
        let line: Vec<String> = colored
            .iter()
            .zip(cells)
            .zip(&widths)
            .map(|((c, plain), w)| format!("{c}{:pad$}", "", pad = w - plain.chars().count()))
            .collect();
        println!("{}", line.join("  ").trim_end());
    }

    println!();
    println!(
        "{} {} channel(s)",
        "Total:".cyan().bold(),
        listing.len().to_string().yellow()
    );
}

fn row(channel: &Channel, record: Option<&MetadataRecord>, env: &Environment) -> [String; 5] {
    let Some(record) = record else {
        return [
            channel.to_string(),
            "-".to_string(),
            "-".to_string(),
            "-".to_string(),
            "-".to_string(),
        ];
    };

    let accepted = match record.decision() {
        Some(decision) if decision.accepted => {
            decision.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
        }
        Some(_) => "rejected".to_string(),
        None => "pending".to_string(),
    };
    let location = record
        .path()
        .map(|path| tildify(path, env))
        .unwrap_or_else(|| "-".to_string());
    let support = record.current().support().unwrap_or("-").to_string();

    [
        channel.to_string(),
        record.version().to_string(),
        accepted,
        location,
        support,
    ]
}

fn print_tos(channel: &Channel, metadata: &RemoteMetadata) {
    println!();
    println!("  {:>9}  {}", "Channel:".cyan().bold(), channel);
    println!("  {:>9}  {}", "Version:".cyan().bold(), metadata.version);
    if let Some(support) = metadata.support() {
        println!("  {:>9}  {}", "Support:".cyan().bold(), support);
    }
    println!();
    println!("{}", metadata.text);
    println!();
}

fn print_info(ctx: &Context) {
    println!();
    println!("  {}", "Search path:".cyan().bold());
    for template in ctx.settings.search_path.templates() {
        println!("    - {template}");
    }
    println!(
        "  {:>14}  {}",
        "ToS root:".cyan().bold(),
        tildify(&ctx.tos_root, &ctx.env)
    );
    println!(
        "  {:>14}  {}",
        "Cache dir:".cyan().bold(),
        tildify(&ctx.settings.cache_dir, &ctx.env)
    );
    match ctx.cache_timeout {
        Some(timeout) => println!(
            "  {:>14}  {}s",
            "Cache timeout:".cyan().bold(),
            timeout.as_secs()
        ),
        None => println!("  {:>14}  none", "Cache timeout:".cyan().bold()),
    }
    println!(
        "  {:>14}  {}",
        "CI:".cyan().bold(),
        ctx.settings.ci.to_string().yellow()
    );
    println!(
        "  {:>14}  {}",
        "Auto accept:".cyan().bold(),
        ctx.settings.auto_accept.to_string().yellow()
    );
    println!("  {}", "Channels:".cyan().bold());
    for channel in &ctx.channels {
        println!("    - {channel}");
    }
    let header = acceptance_header(
        &ctx.channels,
        &ctx.settings.search_path.with_root(&ctx.tos_root),
        ctx.settings.ci,
    );
    println!(
        "  {}  {}",
        format!("{ACCEPTANCE_HEADER}:").cyan().bold(),
        header.bright_black()
    );
    println!();
}

fn print_removed(what: &str, removed: &[PathBuf], env: &Environment) {
    println!(
        "{}",
        format!("✓ Removed {} {what}", removed.len()).green().bold()
    );
    for path in removed {
        println!("    - {}", tildify(path, env).bright_black());
    }
}

/// Display `path` relative to the home directory when possible
fn tildify(path: &Path, env: &Environment) -> String {
    match env.home().and_then(|home| path.strip_prefix(home).ok()) {
        Some(rest) => Path::new("~").join(rest).display().to_string(),
        None => path.display().to_string(),
    }
}
