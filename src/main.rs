use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

// Use library instead of local modules
use swift_registry::{config, import_registry, load_csv, Config, RegistryStore, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    config::init_tracing();

    let args: Vec<String> = env::args().collect();
    let config = Config::from_env();

    match args.get(1).map(String::as_str) {
        Some("import") => {
            let csv_path = args
                .get(2)
                .map(PathBuf::from)
                .unwrap_or_else(|| config.codes_file.clone());
            run_import(&config, csv_path).await?;
        }
        Some("stats") => run_stats(&config).await?,
        _ => {
            eprintln!("swift-registry {}", swift_registry::VERSION);
            eprintln!("Usage:");
            eprintln!("   swift-registry import [csv-path]   Load the registry from a CSV file");
            eprintln!("   swift-registry stats               Show headquarters/branch counts");
            std::process::exit(2);
        }
    }

    Ok(())
}

async fn run_import(config: &Config, csv_path: PathBuf) -> Result<()> {
    println!("🗄️  SWIFT Registry Import - CSV → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load CSV
    println!("\n📂 Loading {}...", csv_path.display());
    let loaded = load_csv(&csv_path)?;
    println!("✓ Parsed {} SWIFT codes", loaded.codes.len());

    // 2. Setup database
    println!("\n🔧 Opening database {}...", config.db_path.display());
    let store = SqliteStore::open(&config.db_path)?;

    // 3. Resolve hierarchy + replace registry
    println!("\n💾 Linking branches and writing registry...");
    let report = import_registry(&store, loaded)
        .await
        .context("Registry import failed")?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Inserted:               {}", report.inserted);
    println!("✓ Headquarters:           {}", report.headquarters);
    println!("✓ Linked branches:        {}", report.linked_branches);
    println!("✓ Orphaned branches:      {}", report.orphaned_branches);
    if !report.superseded_headquarters.is_empty() {
        println!(
            "⚠ Superseded headquarters: {}",
            report.superseded_headquarters.join(", ")
        );
    }
    if !report.duplicate_codes.is_empty() {
        println!("⚠ Duplicate rows skipped: {}", report.duplicate_codes.len());
    }
    for skipped in &report.skipped_rows {
        println!("⚠ Line {} skipped: {}", skipped.line, skipped.reason);
    }

    Ok(())
}

async fn run_stats(config: &Config) -> Result<()> {
    if !config.db_path.exists() {
        eprintln!("❌ Database not found at {}", config.db_path.display());
        eprintln!("   Run: swift-registry import");
        std::process::exit(1);
    }

    let store = SqliteStore::open(&config.db_path)?;
    let stats = store.stats().await?;

    println!("📊 SWIFT Registry");
    println!("   Total:              {}", stats.total);
    println!("   Headquarters:       {}", stats.headquarters);
    println!("   Branches:           {}", stats.branches);
    println!("   Linked branches:    {}", stats.linked_branches);
    println!("   Orphaned branches:  {}", stats.orphaned_branches);

    Ok(())
}
