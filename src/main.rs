mod app;

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use drasa_core::config::{self, Config};
use drasa_core::provider::{OpenRouterClient, SlotId};
use drasa_core::types::{Attachment, ResponseResult};
use drasa_core::util::{format_file_size, truncate_string};

use app::App;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(
    name = "drasa",
    about = format!("{} drasa - terminal chat with free-model fallback", drasa_core::LOGO),
    version = drasa_core::VERSION,
)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat in the current conversation (omit the message for interactive mode)
    Chat {
        message: Vec<String>,
        /// Attach a file to the message (or to the first interactive message)
        #[arg(short, long = "attach")]
        attach: Vec<PathBuf>,
        /// Start a new conversation
        #[arg(long)]
        new: bool,
        /// Treat the network as unavailable
        #[arg(long)]
        offline: bool,
    },
    /// Validate and store an OpenRouter API key
    Login { key: String },
    /// Forget the stored API key
    Logout,
    /// List models available to the configured key
    Models,
    /// List conversations
    History,
    /// Search every message
    Search { query: String },
    /// Switch the current conversation
    Switch { id: String },
    /// Rename a conversation
    Rename { id: String, title: String },
    /// Delete a conversation
    Delete { id: String },
    /// Show chat statistics
    Stats,
    /// Export all conversations to a JSON file
    Export { path: PathBuf },
    /// Replace all conversations with an exported JSON file
    Import { path: PathBuf },
    /// Delete all conversations and the stored API key
    Clear,
    /// Write a default config file
    Onboard,
    /// Show configuration and slot status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "drasa=debug" } else { "drasa=info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    let cfg = config::load_config_from_env();

    match cli.command {
        Commands::Chat {
            message,
            attach,
            new,
            offline,
        } => cmd_chat(cfg, message, attach, new, offline).await?,
        Commands::Login { key } => cmd_login(cfg, key).await?,
        Commands::Logout => cmd_logout(cfg)?,
        Commands::Models => cmd_models(cfg).await?,
        Commands::History => cmd_history(cfg)?,
        Commands::Search { query } => cmd_search(cfg, query)?,
        Commands::Switch { id } => cmd_switch(cfg, id)?,
        Commands::Rename { id, title } => cmd_rename(cfg, id, title)?,
        Commands::Delete { id } => cmd_delete(cfg, id)?,
        Commands::Stats => cmd_stats(cfg)?,
        Commands::Export { path } => cmd_export(cfg, path)?,
        Commands::Import { path } => cmd_import(cfg, path)?,
        Commands::Clear => cmd_clear(cfg)?,
        Commands::Onboard => cmd_onboard()?,
        Commands::Status => cmd_status(cfg)?,
    }

    Ok(())
}

// ====== Chat ======

fn typing_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Thinking...");
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

fn print_reply(result: &ResponseResult) {
    println!("\n{} {}", drasa_core::LOGO, result.text);
    if result.success {
        println!("  ({})\n", result.model_used);
    } else {
        println!();
    }
}

async fn turn(app: &mut App, text: &str, attachments: Vec<Attachment>) -> Result<()> {
    let spinner = typing_spinner();
    let result = app.send(text, attachments).await;
    spinner.finish_and_clear();
    print_reply(&result?);
    Ok(())
}

fn load_attachments(paths: &[PathBuf]) -> Result<Vec<Attachment>> {
    let mut attachments = Vec::with_capacity(paths.len());
    for path in paths {
        let attachment = Attachment::from_path(path)?;
        println!(
            "Attached {} ({})",
            attachment.name,
            format_file_size(attachment.size_bytes)
        );
        attachments.push(attachment);
    }
    Ok(attachments)
}

/// Message words given on the command line mean a single turn. Without them
/// the REPL starts, and any `--attach` files ride along with the first line.
fn one_shot_text(message: &[String]) -> Option<String> {
    if message.is_empty() {
        None
    } else {
        Some(message.join(" "))
    }
}

async fn cmd_chat(
    cfg: Config,
    message: Vec<String>,
    attach: Vec<PathBuf>,
    new_chat: bool,
    offline: bool,
) -> Result<()> {
    let mut app = App::open(cfg, !offline)?;
    app.ensure_chat(new_chat);
    let mut pending = load_attachments(&attach)?;

    if let Some(text) = one_shot_text(&message) {
        return turn(&mut app, &text, pending).await;
    }

    println!("{} drasa (Ctrl+C to exit)", drasa_core::LOGO);
    if let Some(chat) = app.chats.current_chat() {
        println!("  Chat: {} ({})", chat.title, chat.id);
    }
    if !pending.is_empty() {
        println!("  {} attachment(s) will go with your first message", pending.len());
    }
    if !app.orchestrator.has_api_key() {
        println!("  No API key yet. Run: drasa login <KEY>");
    }
    println!();

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        turn(&mut app, input, std::mem::take(&mut pending)).await?;
    }

    Ok(())
}

// ====== Credentials ======

async fn cmd_login(cfg: Config, key: String) -> Result<()> {
    let key = key.trim().to_string();
    let client = OpenRouterClient::new(&cfg.provider);

    if !client.validate_api_key(&key).await {
        eprintln!("Error: Invalid API key. Please check and try again.");
        std::process::exit(1);
    }

    let mut app = App::open(cfg, true)?;
    app.save_api_key(&key)?;
    println!("✓ API key saved. Real API enabled.");
    Ok(())
}

fn cmd_logout(cfg: Config) -> Result<()> {
    let mut app = App::open(cfg, true)?;
    if app.forget_api_key()? {
        println!("✓ Stored API key removed");
    } else {
        println!("No stored API key");
    }
    Ok(())
}

async fn cmd_models(cfg: Config) -> Result<()> {
    let app = App::open(cfg, true)?;
    let key = app
        .config
        .slot_api_key(&app.config.slots.primary)
        .map(str::to_string)
        .or_else(|| app.stored_api_key());

    let Some(key) = key else {
        eprintln!("Error: No API key configured. Run: drasa login <KEY>");
        std::process::exit(1);
    };

    let models = OpenRouterClient::new(&app.config.provider)
        .list_models(&key)
        .await?;

    for model in &models {
        match model.context_length {
            Some(ctx) => println!("  {:<50} {:>9} ctx", model.id, ctx),
            None => println!("  {}", model.id),
        }
    }
    println!("\n{} models", models.len());
    Ok(())
}

// ====== Conversations ======

fn cmd_history(cfg: Config) -> Result<()> {
    let app = App::open(cfg, true)?;
    let history = app.chats.chat_history();
    if history.is_empty() {
        println!("No chats yet.");
        return Ok(());
    }

    for chat in history {
        println!(
            "{} {}  {:<50} {:>4} msgs  {}",
            if chat.is_active { "*" } else { " " },
            chat.id,
            chat.title,
            chat.message_count,
            chat.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn cmd_search(cfg: Config, query: String) -> Result<()> {
    let app = App::open(cfg, true)?;
    let hits = app.chats.search_messages(&query);
    if hits.is_empty() {
        println!("No messages match \"{}\".", query);
        return Ok(());
    }

    for hit in &hits {
        println!(
            "[{}] {}: {}",
            hit.chat_title,
            hit.message.role,
            truncate_string(&hit.message.text, 80, "...")
        );
    }
    Ok(())
}

fn cmd_switch(cfg: Config, id: String) -> Result<()> {
    let mut app = App::open(cfg, true)?;
    if app.chats.set_current_chat(&id) {
        app.persist()?;
        println!("✓ Switched to {}", id);
    } else {
        println!("Chat {} not found", id);
    }
    Ok(())
}

fn cmd_rename(cfg: Config, id: String, title: String) -> Result<()> {
    let mut app = App::open(cfg, true)?;
    if app.chats.update_chat_title(&id, &title) {
        app.persist()?;
        println!("✓ Renamed {}", id);
    } else {
        println!("Chat {} not found", id);
    }
    Ok(())
}

fn cmd_delete(cfg: Config, id: String) -> Result<()> {
    let mut app = App::open(cfg, true)?;
    if app.chats.delete_chat(&id) {
        app.persist()?;
        println!("✓ Deleted chat {}", id);
    } else {
        println!("Chat {} not found", id);
    }
    Ok(())
}

fn cmd_stats(cfg: Config) -> Result<()> {
    let app = App::open(cfg, true)?;
    let stats = app.chats.statistics();
    println!("Chats:          {}", stats.total_chats);
    println!("Messages:       {}", stats.total_messages);
    println!("  from you:     {}", stats.user_messages);
    println!("  from drasa:   {}", stats.ai_messages);
    Ok(())
}

fn cmd_export(cfg: Config, path: PathBuf) -> Result<()> {
    let app = App::open(cfg, true)?;
    app.export(&path)?;
    println!(
        "✓ Exported {} chats to {}",
        app.chats.chats().len(),
        path.display()
    );
    Ok(())
}

fn cmd_import(cfg: Config, path: PathBuf) -> Result<()> {
    let mut app = App::open(cfg, true)?;
    let count = app.import(&path)?;
    println!("✓ Imported {} chats from {}", count, path.display());
    Ok(())
}

fn cmd_clear(cfg: Config) -> Result<()> {
    let mut app = App::open(cfg, true)?;
    app.reset()?;
    println!("✓ All chats and the stored API key were removed");
    Ok(())
}

// ====== Setup ======

fn cmd_onboard() -> Result<()> {
    let config_path = config::get_config_path();

    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        println!("Delete it first to re-onboard.");
        return Ok(());
    }

    let cfg = Config::default();
    config::save_config(&cfg, None)?;
    println!("{} Created config at {}", drasa_core::LOGO, config_path.display());

    let data_dir = cfg.data_dir();
    std::fs::create_dir_all(&data_dir)?;
    println!("{} Created data dir at {}", drasa_core::LOGO, data_dir.display());

    println!("\n{} drasa is ready!", drasa_core::LOGO);
    println!("\nNext steps:");
    println!("  1. Get an API key at https://openrouter.ai/keys");
    println!("  2. drasa login <KEY>");
    println!("  3. drasa chat \"Hello!\"");
    Ok(())
}

fn cmd_status(cfg: Config) -> Result<()> {
    let config_path = config::get_config_path();
    let app = App::open(cfg, true)?;

    println!("{} drasa Status\n", drasa_core::LOGO);
    println!(
        "Config: {} {}",
        config_path.display(),
        if config_path.exists() { "✓" } else { "✗" }
    );
    println!("Store:  {}", app.store.path().display());
    println!(
        "Stored API key: {}",
        if app.stored_api_key().is_some() { "✓" } else { "not set" }
    );
    println!("Cooldown: {}s\n", app.config.fallback.cooldown_secs);

    for id in SlotId::ALL {
        let slot = app.orchestrator.slot(id);
        println!(
            "  {:<10} {:<45} {}",
            id.to_string(),
            slot.model_id(),
            if slot.has_credential() { "✓" } else { "no key" }
        );
    }
    Ok(())
}
