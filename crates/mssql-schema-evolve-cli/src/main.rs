//! mssql-schema-evolve CLI - plan and apply store changes for dynamic data types.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use mssql_schema_evolve::executor::ddl;
use mssql_schema_evolve::{
    build_catalog, Config, EvolveConfig, EvolveError, MigrationPlan, MssqlExecutor, Planner,
    ShapeDocument, SqlExecutor, StoreInspector, StoreManipulator, StoreOperation,
};
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "mssql-schema-evolve")]
#[command(about = "Online schema evolution for dynamic data types on SQL Server")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output plans as JSON to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the store operations for a new or changed type without connecting
    Plan {
        /// Shape document of the type after the change
        #[arg(long)]
        new: PathBuf,

        /// Shape document of the type before the change (omit for a new type)
        #[arg(long)]
        old: Option<PathBuf>,
    },

    /// Create or migrate the stores of a type
    Apply {
        /// Shape document of the type after the change
        #[arg(long)]
        new: PathBuf,

        /// Shape document of the type before the change (omit for a new type)
        #[arg(long)]
        old: Option<PathBuf>,
    },

    /// Drop every store of a type
    Drop {
        /// Shape document of the type being removed
        #[arg(long)]
        old: PathBuf,
    },

    /// List tables, or the constraints and columns of one table
    Inspect {
        /// Table to describe
        #[arg(long)]
        table: Option<String>,
    },

    /// Test the database connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), EvolveError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(EvolveError::Config)?;

    match &cli.command {
        Commands::Plan { new, old } => {
            let (evolve, schema) = load_offline_config(&cli.config)?;
            let (new_doc, old_doc) = load_documents(new, old.as_deref())?;
            let planner = build_planner(&evolve, &new_doc, old_doc.as_ref())?;

            let plan = match &old_doc {
                Some(old_doc) => planner.plan_alter(
                    &old_doc.snapshot(),
                    &new_doc.snapshot(),
                    &new_doc.renames,
                )?,
                None => planner.plan_create(&new_doc.snapshot())?,
            };
            print_plan(&plan, &planner, &schema, &new_doc, cli.output_json)?;
        }

        Commands::Apply { new, old } => {
            let config = load_config(&cli.config)?;
            let (new_doc, old_doc) = load_documents(new, old.as_deref())?;
            let manipulator = connect(&config, &new_doc, old_doc.as_ref()).await?;

            let plan = match &old_doc {
                Some(old_doc) => {
                    manipulator
                        .alter_stores_for_type(
                            &old_doc.snapshot(),
                            &new_doc.snapshot(),
                            &new_doc.renames,
                        )
                        .await?
                }
                None => manipulator.create_stores_for_type(&new_doc.snapshot()).await?,
            };
            report_applied(&plan, cli.output_json)?;
        }

        Commands::Drop { old } => {
            let config = load_config(&cli.config)?;
            let doc = ShapeDocument::load(old)?;
            let manipulator = connect(&config, &doc, None).await?;

            let plan = manipulator.drop_stores_for_type(&doc.snapshot()).await?;
            report_applied(&plan, cli.output_json)?;
        }

        Commands::Inspect { table } => {
            let config = Config::load(&cli.config)?;
            let executor: Arc<dyn SqlExecutor> = Arc::new(MssqlExecutor::connect(&config.target).await?);
            let inspector = StoreInspector::new(executor, config.target.schema.clone());

            match table {
                Some(table) => {
                    if !inspector.table_exists(table).await? {
                        return Err(EvolveError::MissingStore(table.clone()));
                    }
                    println!("Table {}.{}", config.target.schema, table);
                    println!("  Columns:");
                    for column in inspector.list_columns(table).await? {
                        println!("    {}", column);
                    }
                    println!("  Constraints:");
                    for constraint in inspector.constraints(table).await? {
                        let kind = constraint
                            .kind
                            .map(|k| k.prefix().to_string())
                            .unwrap_or_else(|| "?".to_string());
                        println!("    {} ({})", constraint.name, kind);
                    }
                }
                None => {
                    let tables = inspector.list_tables().await?;
                    println!("{} tables in schema {}:", tables.len(), config.target.schema);
                    for table in tables {
                        println!("  {}", table);
                    }
                }
            }
        }

        Commands::HealthCheck => {
            let config = Config::load(&cli.config)?;
            let start = std::time::Instant::now();
            let result = match MssqlExecutor::connect(&config.target).await {
                Ok(executor) => executor.ping().await,
                Err(e) => Err(e),
            };
            let latency_ms = start.elapsed().as_millis();

            println!("Health Check Results:");
            match &result {
                Ok(()) => println!(
                    "  Target (MSSQL {}): OK ({}ms)",
                    config.target.describe(),
                    latency_ms
                ),
                Err(e) => {
                    println!(
                        "  Target (MSSQL {}): FAILED ({}ms)",
                        config.target.describe(),
                        latency_ms
                    );
                    println!("    Error: {}", e);
                }
            }
            result?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<Config, EvolveError> {
    let config = Config::load(path)?;
    info!("Loaded configuration from {:?} (hash {})", path, &config.hash()[..12]);
    Ok(config)
}

/// Evolve settings and target schema for offline planning: from the config
/// file when present, defaults otherwise.
fn load_offline_config(path: &Path) -> Result<(EvolveConfig, String), EvolveError> {
    if path.exists() {
        let config = load_config(path)?;
        Ok((config.evolve, config.target.schema))
    } else {
        info!("No configuration at {:?}, planning with defaults", path);
        Ok((EvolveConfig::default(), "dbo".to_string()))
    }
}

fn load_documents(
    new: &Path,
    old: Option<&Path>,
) -> Result<(ShapeDocument, Option<ShapeDocument>), EvolveError> {
    let new_doc = ShapeDocument::load(new)?;
    let old_doc = old.map(ShapeDocument::load).transpose()?;
    Ok((new_doc, old_doc))
}

fn build_planner(
    evolve: &EvolveConfig,
    new_doc: &ShapeDocument,
    old_doc: Option<&ShapeDocument>,
) -> Result<Planner, EvolveError> {
    let catalog = build_catalog(std::iter::once(new_doc).chain(old_doc), &evolve.aliases)?;
    Ok(Planner::new(evolve.naming_engine(), Arc::new(catalog))
        .with_default_locale(evolve.default_locale.clone()))
}

async fn connect(
    config: &Config,
    new_doc: &ShapeDocument,
    old_doc: Option<&ShapeDocument>,
) -> Result<StoreManipulator, EvolveError> {
    let planner = build_planner(&config.evolve, new_doc, old_doc)?;
    let executor = Arc::new(MssqlExecutor::connect(&config.target).await?);
    Ok(StoreManipulator::new(
        executor,
        planner,
        config.target.schema.clone(),
    ))
}

fn print_plan(
    plan: &MigrationPlan,
    planner: &Planner,
    schema: &str,
    doc: &ShapeDocument,
    output_json: bool,
) -> Result<(), EvolveError> {
    if output_json {
        println!("{}", serde_json::to_string_pretty(plan)?);
        return Ok(());
    }

    print!("{}", plan);
    for operation in &plan.operations {
        if let StoreOperation::Create(op) = operation {
            println!();
            println!("{};", ddl::create_table(schema, &op.table, &doc.shape, planner.naming())?);
        }
    }
    Ok(())
}

fn report_applied(plan: &MigrationPlan, output_json: bool) -> Result<(), EvolveError> {
    if output_json {
        println!("{}", serde_json::to_string_pretty(plan)?);
    } else {
        print!("{}", plan);
        println!("\nApplied {} store operations.", plan.len());
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("Unknown verbosity level: {}", other)),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("Unknown log format: {}", other)),
    }

    Ok(())
}
