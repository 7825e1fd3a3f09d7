//! widgetsync - run one widget instance lifecycle from the command line.
//!
//! The host state comes from a JSON snapshot file and the shared store is a
//! jar file in the user cache directory, so several invocations (in
//! parallel, too) behave like several widget instances in one session.

mod host;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use widgetsync_core::{
    CachedSettings, CoreConfig, FileStore, HttpTransport, InitOptions, SaveData, WidgetContext,
    WidgetCore,
};

use host::FileHost;

const USAGE: &str = "\
Usage: widgetsync <command> --snapshot <file> --widget <id> [options]

Commands:
  init        account sync, notifications, activation check, settings
  settings    print the settings-page description HTML
  save        submit the settings form (--phone <n>, --save-settings)
  jwt         print a JWT for iframe applications

Options:
  --not-installed            the account has not installed the widget
  --chargeable               stop when the widget is inactive
  --load-settings            fetch settings from the backend
  --use-cache-settings       use settings cached by the host
  --cached-settings <json>   the host's cached settings blob";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[derive(Debug, Default)]
struct Args {
    command: String,
    snapshot: Option<PathBuf>,
    widget_id: Option<String>,
    not_installed: bool,
    chargeable: bool,
    load_settings: bool,
    use_cache_settings: bool,
    cached_settings: Option<String>,
    phone: Option<String>,
    save_settings: bool,
}

fn parse_args(raw: &[String]) -> Result<Args> {
    let mut iter = raw.iter();
    let mut args = Args {
        command: iter.next().cloned().unwrap_or_default(),
        ..Default::default()
    };

    while let Some(arg) = iter.next() {
        let mut value = || {
            iter.next()
                .cloned()
                .with_context(|| format!("{} needs a value", arg))
        };
        match arg.as_str() {
            "--snapshot" => args.snapshot = Some(PathBuf::from(value()?)),
            "--widget" => args.widget_id = Some(value()?),
            "--cached-settings" => args.cached_settings = Some(value()?),
            "--phone" => args.phone = Some(value()?),
            "--not-installed" => args.not_installed = true,
            "--chargeable" => args.chargeable = true,
            "--load-settings" => args.load_settings = true,
            "--use-cache-settings" => args.use_cache_settings = true,
            "--save-settings" => args.save_settings = true,
            other => bail!("Unknown argument: {}\n\n{}", other, USAGE),
        }
    }
    Ok(args)
}

fn load_config() -> Result<CoreConfig> {
    let mut config = CoreConfig::load().context("Failed to load config")?;
    if let Ok(url) = std::env::var("WIDGETSYNC_API_URL") {
        config.api_base_url = url;
    }
    if let Ok(token) = std::env::var("WIDGETSYNC_TOKEN") {
        config.bearer_token = Some(token);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    if raw.is_empty() || raw[0] == "--help" || raw[0] == "-h" {
        println!("{}", USAGE);
        return Ok(());
    }
    let args = parse_args(&raw)?;

    let snapshot_path = args.snapshot.clone().context("--snapshot is required")?;
    let widget = WidgetContext {
        widget_id: args.widget_id.clone().context("--widget is required")?,
        installed: !args.not_installed,
        cached_settings: args.cached_settings.clone().map(CachedSettings::Encoded),
    };

    let config = load_config()?;
    let store_dir = config.cache_dir()?;
    info!(?store_dir, api = %config.api_base_url, "widgetsync starting");

    let store = FileStore::new(&store_dir).context("Failed to open store")?;
    let mut transport = HttpTransport::new(config.api_base_url.clone(), config.request_timeout())
        .context("Failed to create HTTP transport")?;
    if let Some(ref token) = config.bearer_token {
        transport = transport.with_token(token.clone());
    }
    let host = FileHost::open(snapshot_path)?;

    let core = WidgetCore::new(
        &config,
        Arc::new(store),
        Arc::new(transport),
        Arc::new(host),
    );

    match args.command.as_str() {
        "init" => {
            let outcome = core
                .on_init(
                    &widget,
                    InitOptions {
                        load_settings: args.load_settings,
                        use_cache_settings: args.use_cache_settings,
                        chargeable: args.chargeable,
                    },
                )
                .await?;
            let output = serde_json::json!({
                "tariff": outcome.tariff,
                "settings": outcome.settings,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        "settings" => {
            println!("{}", core.on_settings(&widget).await?);
        }
        "save" => {
            let cached_settings = match args.cached_settings {
                Some(ref raw) => Some(
                    serde_json::from_str(raw).context("--cached-settings is not valid JSON")?,
                ),
                None => None,
            };
            let data = SaveData {
                phone: args.phone.clone(),
                cached_settings,
            };
            if !core.on_save(&widget, data, args.save_settings).await {
                std::process::exit(1);
            }
            println!("saved");
        }
        "jwt" => {
            println!("{}", core.jwt(&widget).await?);
        }
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }

    Ok(())
}
