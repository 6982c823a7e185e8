use std::path::Path;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use lockstep::config::{AppConfig, LockstepConfig};
use lockstep::diff::find_untracked;
use lockstep::fetch::HttpFetcher;
use lockstep::ledger::{needs_update, VersionLedger};
use lockstep::orchestrator::{RunOutcome, UpdateOrchestrator};
use lockstep::store::LocalFileStore;
use lockstep::transfer::{CancelToken, Phase, ProgressEvent};
use lockstep::util::get_config_file;
use crate::cli::{LockstepCommand, CLI};

pub fn execute(cli: CLI) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => get_config_file()?,
    };
    if cli.command != LockstepCommand::Init && !config_path.exists() {
        bail!("{} not found. Run `lockstep init` to create one.", config_path.display())
    }
    match cli.command {
        LockstepCommand::Init => {
            execute_init(&config_path)
        }
        LockstepCommand::Add { name, version, manifest_url, download_url, path } => {
            let app = AppConfig {
                version,
                manifest_url,
                download_base_url: download_url,
                install_path: path,
            };
            execute_add(&config_path, &name, app)
        }
        LockstepCommand::Remove { name } => {
            execute_remove(&config_path, &name)
        }
        LockstepCommand::List => {
            execute_list(&config_path)
        }
        LockstepCommand::Status { name } => {
            execute_status(&config_path, &name)
        }
        LockstepCommand::Verify { name } => {
            execute_verify(&config_path, &name)
        }
        LockstepCommand::Update { name, all } => {
            execute_update(&config_path, name, all)
        }
    }
}

pub fn execute_init(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        bail!("{} already exists", config_path.display());
    }
    LockstepConfig::default().save(config_path)?;
    println!("Created {}", config_path.display());
    Ok(())
}

pub fn execute_add(config_path: &Path, name: &str, app: AppConfig) -> Result<()> {
    let mut config = LockstepConfig::load(config_path)?;
    config.add(name, app)?;
    config.save(config_path)?;
    println!("Added {}", name);
    Ok(())
}

pub fn execute_remove(config_path: &Path, name: &str) -> Result<()> {
    let mut config = LockstepConfig::load(config_path)?;
    if config.remove(name).is_none() {
        bail!("Application {} is not configured", name);
    }
    config.save(config_path)?;
    println!("Removed {}", name);
    Ok(())
}

pub fn execute_list(config_path: &Path) -> Result<()> {
    let config = LockstepConfig::load(config_path)?;
    if config.apps.is_empty() {
        println!("No applications");
        return Ok(());
    }
    let ledger = VersionLedger::new(&LocalFileStore);
    for (name, app) in &config.apps {
        println!("{}: {}", name, app.version);
        let root = config.install_root(name)?;
        let installed = ledger.read(&root);
        println!("   installed: {}", installed);
        println!("   path: {}", root.display());
        match needs_update(&installed, &app.version) {
            true => println!("   {}", "needs update".yellow()),
            false => println!("   {}", "up to date".green()),
        }
        println!();
    }
    Ok(())
}

pub fn execute_status(config_path: &Path, name: &str) -> Result<()> {
    let config = LockstepConfig::load(config_path)?;
    let app = config.app(name)?;
    let root = config.install_root(name)?;
    let installed = VersionLedger::new(&LocalFileStore).read(&root);
    println!("{}", name.bold());
    println!("   installed: {}", installed);
    println!("   target:    {}", app.version);
    match needs_update(&installed, &app.version) {
        true => println!("   {}", "needs update".yellow()),
        false => println!("   {}", "up to date".green()),
    }
    Ok(())
}

pub fn execute_verify(config_path: &Path, name: &str) -> Result<()> {
    let config = LockstepConfig::load(config_path)?;
    let request = config.request(name)?;
    let fetcher = HttpFetcher::new(config.settings.timeout())?;
    let hasher = config.settings.hash.provider();
    let orchestrator = UpdateOrchestrator::new(&fetcher, &LocalFileStore, hasher.as_ref());

    let report = orchestrator
        .check(&request)
        .with_context(|| format!("Could not verify {}", name))?;
    println!("{}: {} files in manifest, {} differ", name, report.entries.len(), report.diff.len());
    for entry in &report.diff {
        println!("   {} {}", "fetch".yellow(), entry.relative_path);
    }
    for path in find_untracked(&report.entries, &request.root) {
        println!("   {} {}", "untracked".dimmed(), path);
    }
    match report.needs_update() {
        true => println!("{}", "needs update".yellow()),
        false => println!("{}", "up to date".green()),
    }
    Ok(())
}

pub fn execute_update(config_path: &Path, name: Option<String>, all: bool) -> Result<()> {
    let config = LockstepConfig::load(config_path)?;
    let names: Vec<String> = match (name, all) {
        (Some(name), _) => vec![name],
        (None, true) => config.apps.keys().cloned().collect(),
        (None, false) => bail!("Name an application or pass --all"),
    };
    if names.is_empty() {
        println!("No applications");
        return Ok(());
    }
    let fetcher = HttpFetcher::new(config.settings.timeout())?;
    let hasher = config.settings.hash.provider();
    let orchestrator = UpdateOrchestrator::new(&fetcher, &LocalFileStore, hasher.as_ref());
    let cancel = CancelToken::new();

    for name in names {
        let request = config.request(&name)?;
        println!("{} {} -> {}", "Updating".cyan().bold(), name, request.target_version);
        let report = orchestrator
            .run(&request, &mut print_progress, &cancel)
            .with_context(|| format!("Update of {} failed; run it again to resume", name))?;
        match report.outcome {
            RunOutcome::UpToDate => println!("{} {} is up to date", "Done".green().bold(), name),
            RunOutcome::Updated { files } => {
                println!("{} {} updated, {} files fetched", "Done".green().bold(), name, files)
            }
        }
    }
    Ok(())
}

fn print_progress(event: &ProgressEvent) {
    match event.phase {
        Phase::FetchManifest => {
            if event.completed == 0 {
                println!("   fetching manifest")
            }
        }
        Phase::Diff => {
            if event.total > 0 && event.completed == event.total {
                println!("   checked {} files", event.total)
            }
        }
        Phase::Download => {
            if let Some(path) = &event.current_path {
                println!("   [{}/{}] {}", event.completed, event.total, path)
            }
        }
        Phase::Commit => {
            if event.completed == event.total {
                println!("   version committed")
            }
        }
    }
}
