//! Registration listing CLI.
//!
//! # Responsibility
//! - Load configuration, open the node store and list or show registrations
//!   as seen by one identity.
//! - Print one JSON document per line on stdout; diagnostics go to stderr.

use clap::Parser;
use log::info;
use regview_core::{
    init_from_config, open_db, AppConfig, ContributorAuthorizer, Identity, ListOptions,
    RegistrationVisibilityPolicy, SqliteNodeRepository,
};
use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "regview_cli")]
#[command(about = "List registrations visible to an identity", version)]
struct Cli {
    /// JSON configuration file; defaults apply when omitted
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Request as this user; anonymous when omitted
    #[arg(long = "as", value_name = "USER_ID")]
    as_user: Option<Uuid>,

    /// Show one registration instead of listing
    #[arg(long, value_name = "REGISTRATION_ID")]
    retrieve: Option<Uuid>,

    /// 1-based page number
    #[arg(long, default_value_t = 1)]
    page: u32,

    /// Page size; clamped to the configured maximum
    #[arg(long)]
    page_size: Option<u32>,

    /// Query parameters such as `filter[title]=survey`
    #[arg(value_name = "PARAM")]
    params: Vec<String>,
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("regview_cli: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = match cli.config.as_ref() {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    init_from_config(&config)?;

    let conn = open_db(&config.database_path)?;
    let repo = SqliteNodeRepository::try_new(&conn)?;
    let policy = RegistrationVisibilityPolicy::new(repo, ContributorAuthorizer, config.policy);
    let requester = Identity::from(cli.as_user);
    let mut out = std::io::stdout().lock();

    if let Some(id) = cli.retrieve {
        let view = policy.retrieve(requester, id)?;
        writeln!(out, "{}", serde_json::to_string(&view)?)?;
        return Ok(());
    }

    let params = cli
        .params
        .iter()
        .map(|raw| split_param(raw))
        .collect::<Result<Vec<_>, _>>()?;
    let options = ListOptions {
        page: cli.page,
        page_size: cli.page_size,
    };
    let page = policy.list_from_query_params(requester, params, options)?;

    for item in &page.items {
        writeln!(out, "{}", serde_json::to_string(item)?)?;
    }
    info!(
        "event=cli_list module=cli status=ok requester={requester} total={} page={} page_size={}",
        page.total, page.page, page.page_size
    );
    eprintln!(
        "total={} page={} page_size={}",
        page.total, page.page, page.page_size
    );
    Ok(())
}

fn split_param(raw: &str) -> Result<(&str, &str), String> {
    raw.split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}
