//! Argus CLI
//!
//! Evidence-first OSINT collection and entity graphing.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use argus_core::{Case, Entity, Relationship, SOURCE_MANUAL};
use argus_engine::{
    assemble_registry, AnalysisBridge, AppConfig, Engine, EngineError,
};
use argus_collectors::EvidenceArchive;
use argus_net::RateGovernor;
use argus_store::Store;

#[derive(Parser)]
#[command(name = "argus")]
#[command(author, version, about = "Argus: evidence-first OSINT collection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,

    /// Config file path (default: ./argus.toml, then ~/.argus.toml)
    #[arg(long, env = "ARGUS_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage investigation cases
    Case {
        #[command(subcommand)]
        action: CaseAction,
    },

    /// Manage entities within a case
    Entity {
        #[command(subcommand)]
        action: EntityAction,
    },

    /// Manage links between entities
    Link {
        #[command(subcommand)]
        action: LinkAction,
    },

    /// Run a collector (or all) against a target
    Collect {
        /// Collector name, or "all"
        collector: String,

        /// Target domain, IP, or username
        target: String,

        /// Case ID
        #[arg(short, long)]
        case: String,

        /// Consent to active reconnaissance (port scans, probes)
        #[arg(long)]
        active: bool,
    },

    /// Automated end-to-end investigation (one-shot)
    Investigate {
        /// Target domain or IP
        target: String,
    },

    /// Run AI analysis over a case
    Analyze {
        /// Case ID
        #[arg(short, long)]
        case: String,
    },

    /// List registered collectors
    Collectors,
}

#[derive(Subcommand)]
enum CaseAction {
    /// Create a new case
    New {
        name: String,
        #[arg(default_value = "")]
        description: String,
    },
    /// List all cases
    List,
}

#[derive(Subcommand)]
enum EntityAction {
    /// Add a manual entity to a case
    Add {
        entity_type: String,
        value: String,
        #[arg(short, long)]
        case: String,
    },
    /// List entities in a case
    List {
        #[arg(short, long)]
        case: String,
    },
}

#[derive(Subcommand)]
enum LinkAction {
    /// Link two entities by value within a case
    Add {
        from_value: String,
        to_value: String,
        #[arg(short = 't', long = "type")]
        rel_type: String,
        #[arg(short, long)]
        case: String,
    },
    /// List links in a case
    List {
        #[arg(short, long)]
        case: String,
    },
}

/// Everything a command needs, assembled once at startup.
struct App {
    config: AppConfig,
    store: Arc<Store>,
    engine: Engine,
}

impl App {
    fn build(config: AppConfig) -> Result<Self> {
        let store = Arc::new(
            Store::open(config.database.path.as_ref())
                .with_context(|| format!("cannot open database '{}'", config.database.path))?,
        );

        let archive = Arc::new(EvidenceArchive::new(&config.storage.evidence_root));
        let governor = Arc::new(RateGovernor::new());
        config.apply_rate_limits(&governor);
        let scope = Arc::new(config.scope_policy());

        let registry = assemble_registry(&config, archive, governor.clone())
            .context("failed to assemble collector registry")?;

        let engine = Engine::new(Arc::new(registry), governor, scope, store.clone());
        Ok(Self {
            config,
            store,
            engine,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let config = AppConfig::load(cli.config.as_deref())?;
    let app = App::build(config)?;

    match cli.command {
        Commands::Case { action } => run_case(&app, action)?,
        Commands::Entity { action } => run_entity(&app, action)?,
        Commands::Link { action } => run_link(&app, action)?,
        Commands::Collect {
            collector,
            target,
            case,
            active,
        } => run_collect(&app, &collector, &target, &case, active).await?,
        Commands::Investigate { target } => run_investigate(&app, &target).await?,
        Commands::Analyze { case } => run_analyze(&app, &case).await?,
        Commands::Collectors => list_collectors(&app),
    }

    Ok(())
}

fn run_case(app: &App, action: CaseAction) -> Result<()> {
    match action {
        CaseAction::New { name, description } => {
            let case = Case::new(&name, &description);
            app.store.create_case(&case)?;
            println!("Created case '{}' (ID: {})", case.name, case.id);
        }
        CaseAction::List => {
            let cases = app.store.list_cases()?;
            if cases.is_empty() {
                println!("No cases yet.");
                return Ok(());
            }
            println!("{:<36} | {:<8} | NAME", "ID", "STATUS");
            for c in cases {
                println!("{:<36} | {:<8} | {}", c.id, c.status, c.name);
            }
        }
    }
    Ok(())
}

fn run_entity(app: &App, action: EntityAction) -> Result<()> {
    match action {
        EntityAction::Add {
            entity_type,
            value,
            case,
        } => {
            let entity = Entity::new(&case, &entity_type, &value, SOURCE_MANUAL);
            app.store.create_entity(&entity)?;
            println!("Added entity: {value} ({entity_type}) to case {case}");
        }
        EntityAction::List { case } => {
            let entities = app.store.list_entities(&case)?;
            if entities.is_empty() {
                println!("No entities found for case {case}");
                return Ok(());
            }
            println!("{:<36} | {:<12} | VALUE", "ID", "TYPE");
            for e in entities {
                println!("{:<36} | {:<12} | {}", e.id, e.entity_type, e.value);
            }
        }
    }
    Ok(())
}

fn run_link(app: &App, action: LinkAction) -> Result<()> {
    match action {
        LinkAction::Add {
            from_value,
            to_value,
            rel_type,
            case,
        } => {
            let from = app
                .store
                .get_entity_by_value(&case, &from_value)?
                .with_context(|| format!("source entity '{from_value}' not found in case {case}"))?;
            let to = app
                .store
                .get_entity_by_value(&case, &to_value)?
                .with_context(|| format!("target entity '{to_value}' not found in case {case}"))?;

            let link = Relationship::new(&case, &from.id, &to.id, &rel_type);
            app.store.create_relationship(&link)?;
            println!("Linked {from_value} -> {to_value} (type: {rel_type})");
        }
        LinkAction::List { case } => {
            let links = app.store.list_relationships(&case)?;
            if links.is_empty() {
                println!("No links found for case {case}");
                return Ok(());
            }
            for r in links {
                println!("{} --[{}]--> {}", r.from_entity_id, r.rel_type, r.to_entity_id);
            }
        }
    }
    Ok(())
}

async fn run_collect(
    app: &App,
    collector: &str,
    target: &str,
    case_id: &str,
    active: bool,
) -> Result<()> {
    if app.store.get_case(case_id)?.is_none() {
        bail!("case '{case_id}' not found");
    }

    if collector == "all" {
        let outcomes = app.engine.run_all(case_id, target, active).await;
        println!(
            "Collection against '{target}' finished ({} collectors):",
            outcomes.len()
        );
        for outcome in outcomes {
            match outcome.result {
                Ok(count) => println!("[+] {}: completed ({count} evidence items)", outcome.collector),
                Err(reason) => println!("[X] {}: failed - {reason}", outcome.collector),
            }
        }
        return Ok(());
    }

    match app.engine.run(collector, case_id, target, active).await {
        Ok(evidence) => {
            println!("[+] {collector}: completed ({} evidence items)", evidence.len());
        }
        // Asking for a collector that does not exist is an invalid
        // invocation; everything else is an ordinary per-collector failure.
        Err(EngineError::UnknownCollector(name)) => {
            bail!("collector '{name}' not found (see `argus collectors`)");
        }
        Err(e) => {
            println!("[X] {collector}: failed - {e}");
        }
    }
    Ok(())
}

async fn run_investigate(app: &App, target: &str) -> Result<()> {
    let case = Case::new(
        &format!("Auto-Investigation: {target}"),
        &format!(
            "Automated investigation triggered for {target} at {}",
            chrono::Utc::now().to_rfc3339()
        ),
    );
    app.store.create_case(&case)?;
    println!("[+] Created case: {} (ID: {})", case.name, case.id);

    let collectors = ["dns", "whois", "geo", "ports"];
    println!("[*] Running collectors: {collectors:?}");
    for name in collectors {
        match app.engine.run(name, &case.id, target, true).await {
            Ok(evidence) => println!("    [+] {name}: {} items", evidence.len()),
            Err(e) => println!("    [!] {name} failed: {e}"),
        }
    }

    println!("[*] Running AI analysis...");
    let bridge = AnalysisBridge::new(app.config.llm.clone());
    let report = bridge.analyze(&app.store, &case.id).await?;
    print_analysis(&report);

    println!("\nSaved to case ID: {}", case.id);
    Ok(())
}

async fn run_analyze(app: &App, case_id: &str) -> Result<()> {
    let bridge = AnalysisBridge::new(app.config.llm.clone());
    let report = bridge.analyze(&app.store, case_id).await?;
    print_analysis(&report);
    Ok(())
}

fn print_analysis(report: &argus_core::Analysis) {
    println!("\n--- ANALYSIS ---");
    println!("Confidence: {:.2}", report.confidence);

    println!("\n[ Findings ]");
    for f in &report.findings {
        println!("- {f}");
    }

    println!("\n[ Risks ]");
    for r in &report.risks {
        println!("- {r}");
    }

    println!("\n[ Next Steps ]");
    for s in &report.next_steps {
        println!("- {s}");
    }
}

fn list_collectors(app: &App) {
    println!("{:<12} | {:<7} | DESCRIPTION", "NAME", "KIND");
    for collector in app.engine.registry().list() {
        let kind = if collector.is_active() { "active" } else { "passive" };
        println!(
            "{:<12} | {:<7} | {}",
            collector.name(),
            kind,
            collector.description()
        );
    }
}
