use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use serde::Serialize;
use serde_json::json;
use vrepo_sdk::{
    Caller, LoadOutcome, NavigationEvent, PageType, RepoId, RepositoryManager, ServiceContext,
    VrepoConfig,
};
use vrepo_vfs::{NodeKind, SearchFilters};

use crate::cli::*;
use crate::origin::DirectoryOrigin;

/// Global options shared by every subcommand.
struct Globals {
    snapshot: PathBuf,
    repo: String,
    config: VrepoConfig,
    format: OutputFormat,
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        command,
        snapshot,
        repo,
        config,
        format,
        ..
    } = cli;
    let globals = Globals {
        config: load_config(config.as_deref())?,
        snapshot,
        repo,
        format,
    };

    match command {
        Command::Config(args) => cmd_config(&globals, args),
        Command::Nav(args) => cmd_nav(&globals, args).await,
        Command::Status(_) => cmd_status(&globals).await,
        command => {
            let (_ctx, manager) = open(&globals, true).await?;
            match command {
                Command::Ls(args) => cmd_ls(&globals, &manager, args),
                Command::Cat(args) => cmd_cat(&manager, args),
                Command::Stat(args) => cmd_stat(&globals, &manager, args),
                Command::Find(args) => cmd_find(&globals, &manager, args),
                Command::Search(args) => cmd_search(&globals, &manager, args),
                Command::Tree(args) => cmd_tree(&globals, &manager, args),
                Command::Config(_) | Command::Nav(_) | Command::Status(_) => Ok(()),
            }
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<VrepoConfig> {
    match path {
        Some(path) => Ok(VrepoConfig::load(path)?),
        None => Ok(VrepoConfig::default()),
    }
}

/// Build a context over the snapshot directory and open the repository.
/// With `require_snapshot`, a degraded load is an error.
async fn open(
    globals: &Globals,
    require_snapshot: bool,
) -> anyhow::Result<(ServiceContext, RepositoryManager)> {
    let repo = RepoId::new(globals.repo.as_str())?;
    let ctx = ServiceContext::builder(globals.config.clone())
        .with_origin(Arc::new(DirectoryOrigin::new(&globals.snapshot)))
        .build()?;
    let manager = ctx.open_repository(repo, Caller::new("cli")).await?;
    if let LoadOutcome::Degraded { reason } = &manager.load_report().outcome {
        if require_snapshot {
            bail!("no usable snapshot in {}: {reason}", globals.snapshot.display());
        }
    }
    Ok((ctx, manager))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_ls(globals: &Globals, manager: &RepositoryManager, args: LsArgs) -> anyhow::Result<()> {
    let dir = args.path.unwrap_or_default();
    let vfs = manager.vfs();
    if !vfs.is_directory(&dir) {
        bail!("not a directory: {dir}");
    }
    let entries = vfs.entries(&dir);
    if globals.format == OutputFormat::Json {
        return print_json(&entries);
    }
    for entry in entries {
        let name = match entry.kind {
            NodeKind::Directory => format!("{}/", entry.name).blue().bold(),
            NodeKind::File => entry.name.normal(),
        };
        if args.long {
            let size = entry.size.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
            println!("{:>4} {:>10}  {}", kind_label(entry.kind), size.dimmed(), name);
        } else {
            println!("{name}");
        }
    }
    Ok(())
}

fn kind_label(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Directory => "dir",
        NodeKind::File => "file",
    }
}

fn cmd_cat(manager: &RepositoryManager, args: CatArgs) -> anyhow::Result<()> {
    let body = if args.start.is_some() || args.end.is_some() {
        let start = args.start.unwrap_or(1);
        let end = args.end.unwrap_or(usize::MAX);
        manager.vfs().read_range(&args.path, start, end)
    } else {
        manager.read_file(&args.path).map(|c| c.to_string())
    };
    let body = body.with_context(|| format!("no such file: {}", args.path))?;
    println!("{body}");
    Ok(())
}

fn cmd_stat(globals: &Globals, manager: &RepositoryManager, args: StatArgs) -> anyhow::Result<()> {
    let meta = manager
        .vfs()
        .metadata(&args.path)
        .with_context(|| format!("no such file or directory: {}", args.path))?;
    if globals.format == OutputFormat::Json {
        return print_json(&meta);
    }
    let shown = if meta.path.is_empty() { "/" } else { meta.path.as_str() };
    println!("  Path: {}", shown.bold());
    println!("  Kind: {:?}", meta.kind);
    println!("  Size: {} bytes", meta.size);
    if let Some(language) = meta.language {
        println!("  Language: {}", language.cyan());
    }
    println!("  Binary: {}", meta.is_binary);
    println!("  Mtime: {}", meta.mtime);
    if let Some(checksum) = &meta.checksum {
        println!("  Checksum: {}", checksum.short_hex().yellow());
    }
    Ok(())
}

fn cmd_find(globals: &Globals, manager: &RepositoryManager, args: FindArgs) -> anyhow::Result<()> {
    let paths = manager.vfs().find_by_pattern(&args.pattern)?;
    if globals.format == OutputFormat::Json {
        return print_json(&paths);
    }
    for p in &paths {
        println!("{p}");
    }
    Ok(())
}

fn cmd_search(globals: &Globals, manager: &RepositoryManager, args: SearchArgs) -> anyhow::Result<()> {
    let mut filters = SearchFilters::default().limit(args.limit);
    if let Some(ext) = args.ext {
        filters = filters.extension(ext);
    }
    if let Some(language) = args.language {
        filters = filters.language(language);
    }
    if let Some(min) = args.min_size {
        filters = filters.min_size(min);
    }
    if let Some(max) = args.max_size {
        filters = filters.max_size(max);
    }
    if let Some(dir) = args.dir {
        filters = filters.directory(dir);
    }

    let hits = manager.vfs().search(&args.query, &filters)?;
    if globals.format == OutputFormat::Json {
        return print_json(&hits);
    }
    if hits.is_empty() {
        println!("No matches.");
    }
    for hit in hits {
        println!("{}  {} {}", hit.path.bold(), hit.language.cyan(), format!("({})", hit.bucket).dimmed());
    }
    Ok(())
}

fn cmd_tree(globals: &Globals, manager: &RepositoryManager, args: TreeArgs) -> anyhow::Result<()> {
    let prefix = args.dir.map(|d| d.trim_matches('/').to_string()).unwrap_or_default();
    let paths: Vec<String> = manager
        .vfs()
        .tree()
        .into_iter()
        .filter(|p| prefix.is_empty() || p.starts_with(&format!("{prefix}/")))
        .collect();
    if globals.format == OutputFormat::Json {
        return print_json(&paths);
    }
    for line in render_tree(&paths) {
        println!("{line}");
    }
    Ok(())
}

/// Indented outline of sorted file paths, directories suffixed with `/`.
fn render_tree(paths: &[String]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut open: Vec<&str> = Vec::new();
    for file_path in paths {
        let segments: Vec<&str> = file_path.split('/').collect();
        let (dirs, name) = segments.split_at(segments.len() - 1);
        let shared = open.iter().zip(dirs).take_while(|(a, b)| a == b).count();
        open.truncate(shared);
        for dir in &dirs[shared..] {
            lines.push(format!("{}{dir}/", "  ".repeat(open.len())));
            open.push(*dir);
        }
        lines.push(format!("{}{}", "  ".repeat(open.len()), name[0]));
    }
    lines
}

async fn cmd_status(globals: &Globals) -> anyhow::Result<()> {
    let (ctx, manager) = open(globals, false).await?;
    let load = manager.load_report();
    let stats = manager.vfs().stats();
    let vcs = manager.status();
    let health = ctx.health().await;

    if globals.format == OutputFormat::Json {
        return print_json(&json!({
            "repo": manager.repo().as_str(),
            "load": load,
            "vfs": stats,
            "vcs": vcs,
            "health": health,
        }));
    }

    println!("Repository {} on branch {}", manager.repo().to_string().bold(), vcs.branch.yellow());
    match &load.outcome {
        LoadOutcome::Cached => println!("  Snapshot: {}", "cached".green()),
        LoadOutcome::Recovered => println!("  Snapshot: {} from {}", "loaded".green(), globals.snapshot.display()),
        LoadOutcome::Degraded { reason } => println!("  Snapshot: {} ({reason})", "unavailable".red().bold()),
    }
    println!("  Files: {}, directories: {}, {} bytes", stats.files, stats.directories, stats.total_bytes);
    for (language, count) in &stats.languages {
        println!("    {:<14} {count}", language.cyan());
    }
    let report = &stats.extraction;
    if report.duplicates > 0 || report.checksum_mismatches > 0 || report.missing_from_content > 0 {
        println!(
            "  {} {} duplicate sections, {} checksum mismatches, {} listed files without content",
            "!".yellow().bold(),
            report.duplicates,
            report.checksum_mismatches,
            report.missing_from_content
        );
    }
    let health_label = match health.status {
        vrepo_sdk::HealthStatus::Healthy => health.status.to_string().green(),
        vrepo_sdk::HealthStatus::Degraded => health.status.to_string().yellow(),
        vrepo_sdk::HealthStatus::Unhealthy => health.status.to_string().red(),
    };
    println!("  Cache health: {health_label} (memory {})", health.memory_pressure);
    for reason in &health.reasons {
        println!("    {reason}");
    }
    Ok(())
}

async fn cmd_nav(globals: &Globals, args: NavArgs) -> anyhow::Result<()> {
    let (ctx, manager) = open(globals, false).await?;
    if args.table {
        let mut rules: Vec<_> = ctx.navigation().table().pairs().collect();
        rules.sort_by_key(|(from, to, _)| (from.as_str(), to.as_str()));
        if globals.format == OutputFormat::Json {
            let rows: Vec<_> = rules
                .iter()
                .map(|(from, to, cats)| json!({ "from": from, "to": to, "categories": cats }))
                .collect();
            return print_json(&rows);
        }
        for (from, to, categories) in rules {
            let names: Vec<&str> = categories.iter().map(|c| c.as_str()).collect();
            println!("{:<18} -> {:<18} {}", from.as_str(), to.as_str(), names.join(", ").yellow());
        }
        return Ok(());
    }

    let (Some(from), Some(to)) = (args.from, args.to) else {
        bail!("nav needs FROM and TO pages, or --table");
    };
    let (from, to) = (PageType::parse(&from), PageType::parse(&to));
    let mut event = NavigationEvent::new(args.user, from, to).with_repo(manager.repo().as_str());
    if let Some(session) = args.session {
        event = event.with_session(session);
    }
    let report = ctx.on_transition(event).await;

    if globals.format == OutputFormat::Json {
        return print_json(&report);
    }
    println!("{} -> {}", from.to_string().bold(), to.to_string().bold());
    if report.categories.is_empty() {
        println!("  Nothing to clear.");
    }
    for category in &report.categories {
        println!("  {} {}", "cleared".yellow(), category);
    }
    println!("  Keys removed: {}", report.keys_removed);
    Ok(())
}

fn cmd_config(globals: &Globals, args: ConfigArgs) -> anyhow::Result<()> {
    let config = if args.defaults {
        VrepoConfig::default()
    } else {
        globals.config.clone()
    };
    if globals.format == OutputFormat::Json {
        return print_json(&config);
    }
    print!("{}", config.to_toml_string()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn tree_outline_nests_directories() {
        let lines = render_tree(&paths(&["README.md", "src/lib.rs", "src/util/io.rs", "tests/a.rs"]));
        assert_eq!(
            lines,
            vec!["README.md", "src/", "  lib.rs", "  util/", "    io.rs", "tests/", "  a.rs"]
        );
    }

    #[test]
    fn tree_outline_reopens_sibling_directories() {
        let lines = render_tree(&paths(&["a/x/1", "a/y/2"]));
        assert_eq!(lines, vec!["a/", "  x/", "    1", "  y/", "    2"]);
    }

    #[tokio::test]
    async fn open_reads_snapshot_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("content.txt"), "FILE: src/a.rs\nfn a() {}").unwrap();
        std::fs::write(tmp.path().join("tree.txt"), "src/a.rs").unwrap();
        let globals = Globals {
            snapshot: tmp.path().to_path_buf(),
            repo: "local/snapshot".into(),
            config: VrepoConfig::default(),
            format: OutputFormat::Text,
        };
        let (_ctx, manager) = open(&globals, true).await.unwrap();
        assert_eq!(manager.read_file("src/a.rs").as_deref(), Some("fn a() {}"));
    }

    #[tokio::test]
    async fn open_rejects_missing_snapshot_when_required() {
        let tmp = tempfile::tempdir().unwrap();
        let globals = Globals {
            snapshot: tmp.path().to_path_buf(),
            repo: "local/snapshot".into(),
            config: VrepoConfig::default(),
            format: OutputFormat::Text,
        };
        assert!(open(&globals, true).await.is_err());
        let (_ctx, manager) = open(&globals, false).await.unwrap();
        assert!(manager.load_report().is_degraded());
    }
}
