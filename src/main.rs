//! PaperVault CLI - encrypted document vault on the command line
//!
//! Usage:
//!   pv init                - Create the vault and default config
//!   pv set-pin             - Configure or change the vault PIN
//!   pv add <image>         - Encrypt and store a document image
//!   pv list                - List stored items, newest first
//!   pv search <query>      - Search titles, categories, tags and OCR text
//!   pv export <id> <out>   - Decrypt an item's document to a file
//!   pv show-text <id>      - Print an item's extracted text
//!   pv delete <id>         - Remove an item, its blob and its key
//!   pv status              - Show vault, migration and config status

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use papervault::{
    crypto::pin::hash_pin, AccessController, AccessState, Config, ContentStore, KeyringSecretStore,
    MetadataStore, MigrationGate, NoopBiometrics, NullRecognizer, TesseractRecognizer, TextIndexer,
    TextRecognizer, VaultService,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// PaperVault CLI - encrypted vault for personal documents
#[derive(Parser)]
#[command(name = "pv")]
#[command(about = "Encrypted personal document vault", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the vault directories and default configuration
    Init,

    /// Set or change the vault PIN (enables PIN security)
    SetPin,

    /// Encrypt and add a document image to the vault
    Add {
        /// Path to the image file
        image: PathBuf,

        /// Item title
        #[arg(short, long)]
        title: String,

        /// Item category
        #[arg(short, long, default_value = "Uncategorized")]
        category: String,

        /// Tags (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Free-form notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// List all items, newest first
    List,

    /// Search titles, categories, tags and extracted text
    Search {
        /// Search query text
        query: String,
    },

    /// Decrypt an item's document and write it to a file
    Export {
        /// Item id
        id: String,

        /// Output file path
        output: PathBuf,
    },

    /// Print an item's extracted text
    ShowText {
        /// Item id
        id: String,
    },

    /// Delete an item together with its encrypted content and key
    Delete {
        /// Item id
        id: String,
    },

    /// Show vault status (item counts, migration, config)
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("papervault={}", log_level).parse().unwrap())
                .add_directive(format!("pv={}", log_level).parse().unwrap()),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init => cmd_init(),
        Commands::SetPin => cmd_set_pin(),
        Commands::Add {
            image,
            title,
            category,
            tags,
            notes,
        } => cmd_add(&image, &title, &category, tags, notes),
        Commands::List => cmd_list(),
        Commands::Search { query } => cmd_search(&query),
        Commands::Export { id, output } => cmd_export(&id, &output),
        Commands::ShowText { id } => cmd_show_text(&id),
        Commands::Delete { id } => cmd_delete(&id),
        Commands::Status => cmd_status(),
    }
}

// ============ VAULT SETUP ============

fn load_config() -> Result<Config> {
    Config::load_default().context("Failed to load configuration (run `pv init` first?)")
}

/// Open every store, run the legacy migration gate, unlock the session.
fn open_vault(config: &Config) -> Result<VaultService> {
    let mut store = MetadataStore::open(&config.vault_path)?;

    // Legacy blobs fold in before any read; safe to repeat on every start
    let report = MigrationGate::new(&config.legacy_path).run_once(&mut store)?;
    for (domain, count) in &report.migrated {
        if *count > 0 {
            println!("{}", format!("Migrated {} legacy {}", count, domain).yellow());
        }
    }
    for failure in &report.failures {
        eprintln!("{}", format!("{} (will retry)", failure).red());
    }

    let content = ContentStore::new(config.content_dir())?;
    let keys = Arc::new(KeyringSecretStore::new());
    let recognizer: Box<dyn TextRecognizer> = if config.ocr.enabled {
        Box::new(TesseractRecognizer::with_command(&config.ocr.command))
    } else {
        Box::new(NullRecognizer)
    };
    let indexer = TextIndexer::spawn(recognizer)?;
    let access = AccessController::new(
        config.security.enabled,
        config.security.pin_hash.clone(),
        Box::new(NoopBiometrics),
    );

    let mut vault = VaultService::new(store, content, keys, indexer, access);
    unlock(&mut vault)?;
    Ok(vault)
}

/// Drive the access state machine: open directly when security is off,
/// otherwise prompt for the PIN. Biometrics are unavailable on the CLI.
fn unlock(vault: &mut VaultService) -> Result<()> {
    match vault.access_mut().request_access() {
        Ok(AccessState::Unlocked) => Ok(()),
        Ok(AccessState::Authenticating) => {
            let pin = rpassword::prompt_password("Vault PIN: ")?;
            if vault.access_mut().submit_pin(&pin)? {
                Ok(())
            } else {
                bail!("Incorrect PIN");
            }
        }
        Ok(AccessState::Locked) => bail!("Vault is locked"),
        Err(papervault::Error::PinSetupRequired) => {
            bail!("PIN security is enabled but no PIN is set. Run `pv set-pin` first.")
        }
        Err(e) => Err(e.into()),
    }
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("'{}' is not a valid item id", raw))
}

// ============ INIT / PIN COMMANDS ============

fn cmd_init() -> Result<()> {
    println!("{}", "PaperVault Setup".bold().cyan());
    println!();

    let config = Config::new();
    fs::create_dir_all(&config.vault_path)
        .with_context(|| format!("Failed to create {}", config.vault_path.display()))?;
    fs::create_dir_all(config.content_dir())?;
    let path = config.save_default()?;

    println!("{}", "Vault initialized".green());
    println!("  Config: {}", path.display());
    println!("  Vault:  {}", config.vault_path.display());
    println!();
    println!("Run `pv set-pin` to enable PIN security.");
    Ok(())
}

fn cmd_set_pin() -> Result<()> {
    let mut config = load_config()?;

    // Changing an existing PIN requires the old one
    if let Some(current_hash) = &config.security.pin_hash {
        let current = rpassword::prompt_password("Current PIN: ")?;
        if !papervault::crypto::pin::verify_pin(&current, current_hash) {
            bail!("Incorrect PIN");
        }
    }

    let pin = rpassword::prompt_password("New PIN: ")?;
    if pin.len() < 4 {
        bail!("PIN must be at least 4 characters");
    }
    let confirm = rpassword::prompt_password("Confirm PIN: ")?;
    if pin != confirm {
        bail!("PINs do not match");
    }

    config.security.pin_hash = Some(hash_pin(&pin)?);
    config.security.enabled = true;
    config.save_default()?;

    println!("{}", "✓ PIN updated".green());
    Ok(())
}

// ============ ITEM COMMANDS ============

fn cmd_add(
    image: &Path,
    title: &str,
    category: &str,
    tags: Vec<String>,
    notes: Option<String>,
) -> Result<()> {
    let config = load_config()?;
    let mut vault = open_vault(&config)?;

    let bytes =
        fs::read(image).with_context(|| format!("Failed to read {}", image.display()))?;
    let item = vault.add(&bytes, title, category, tags, notes)?;

    println!("{} {}", "✓ Added".green(), item.title.bold());
    println!("  id: {}", item.id);

    if config.ocr.enabled {
        // Give the recognizer a moment so the text lands before exit
        let updated = vault.wait_for_indexing(Duration::from_secs(30))?;
        if updated > 0 {
            println!("  {}", "text indexed".cyan());
        }
    }
    Ok(())
}

fn cmd_list() -> Result<()> {
    let config = load_config()?;
    let vault = open_vault(&config)?;

    let items = vault.list()?;
    if items.is_empty() {
        println!("Vault is empty.");
        return Ok(());
    }

    for item in &items {
        print_item_line(item);
    }
    println!();
    println!("{} item(s)", items.len());
    Ok(())
}

fn cmd_search(query: &str) -> Result<()> {
    let config = load_config()?;
    let vault = open_vault(&config)?;

    let items = vault.search(query)?;
    if items.is_empty() {
        println!("No matches for '{}'.", query);
        return Ok(());
    }
    for item in &items {
        print_item_line(item);
    }
    Ok(())
}

fn print_item_line(item: &papervault::VaultItem) {
    let tags = if item.tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", item.tags.join(", "))
    };
    println!(
        "{}  {}  {}{}",
        item.created_at.format("%Y-%m-%d").to_string().dimmed(),
        item.id.simple().to_string().dimmed(),
        item.title.bold(),
        tags.cyan()
    );
    println!("          {}", item.category);
}

fn cmd_export(id: &str, output: &Path) -> Result<()> {
    let config = load_config()?;
    let vault = open_vault(&config)?;
    let id = parse_id(id)?;

    match vault.open(id)? {
        Some(bytes) => {
            fs::write(output, bytes)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("{} {}", "✓ Exported to".green(), output.display());
            Ok(())
        }
        None => bail!("Item not found or its content is unavailable"),
    }
}

fn cmd_show_text(id: &str) -> Result<()> {
    let config = load_config()?;
    let vault = open_vault(&config)?;
    let id = parse_id(id)?;

    match vault.get(id)? {
        Some(item) => match item.extracted_text {
            Some(text) => println!("{}", text),
            None => println!("{}", "No extracted text for this item.".dimmed()),
        },
        None => bail!("Item not found"),
    }
    Ok(())
}

fn cmd_delete(id: &str) -> Result<()> {
    let config = load_config()?;
    let mut vault = open_vault(&config)?;
    let id = parse_id(id)?;

    if vault.delete(id)? {
        println!("{}", "✓ Deleted".green());
    } else {
        println!("Item not found.");
    }
    Ok(())
}

// ============ STATUS COMMAND ============

fn cmd_status() -> Result<()> {
    println!("{}", "PaperVault Status".bold().cyan());
    println!();

    let config = load_config()?;
    println!("Vault path:   {}", config.vault_path.display());
    println!("Legacy path:  {}", config.legacy_path.display());
    println!(
        "PIN security: {}",
        if config.security.enabled {
            "enabled".green()
        } else {
            "disabled".yellow()
        }
    );
    println!(
        "OCR:          {}",
        if config.ocr.enabled {
            config.ocr.command.normal()
        } else {
            "disabled".yellow()
        }
    );
    println!();

    let vault = open_vault(&config)?;
    let (items, notes, tasks) = vault.counts()?;
    println!("Items: {}   Notes: {}   Tasks: {}", items, notes, tasks);
    Ok(())
}
