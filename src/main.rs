//! # FrameChanger
//!
//! Rotates the desktop wallpaper through backdrops of your favorite movies and
//! TV shows, fetched from The Movie Database (TMDB).
//!
//! ## Features
//! - Favorites list of movies and shows (SQLite)
//! - Random change that never repeats the previous title
//! - Change to a specific title, or to a local image
//! - Automatic changes on a timer (1 minute to 24 hours)
//! - Windows, macOS and Linux (COSMIC, GNOME, or `feh`)
//!
//! ## Architecture
//! - `changer.rs` - The wallpaper pipeline (random / specific change)
//! - `selection.rs` - Picks the next favorite, avoiding repeats
//! - `tmdb.rs` - TMDB client: title search and backdrop selection
//! - `cache.rs` - One downloaded image per title
//! - `platform.rs` - Applies an image as the desktop background per OS
//! - `favorites.rs` - Favorites list
//! - `config.rs` - Settings file, app directory, interval presets
//! - `timer.rs` - Auto-changer timer
//! - `service.rs` - Daemon with D-Bus service
//! - `dbus_client.rs` - Client proxy the CLI uses to reach the daemon
//!
//! ## CLI Usage
//! - `framechanger daemon` - Run the auto-changer and D-Bus service
//! - `framechanger random` - Change to a random favorite
//! - `framechanger set "Blade Runner 2049" --type movie` - Change to one title
//! - `framechanger favorites list` - Show the favorites

mod cache;       // Per-title image cache
mod changer;     // Wallpaper pipeline orchestration
mod config;      // Settings, paths, interval presets
mod dbus_client; // D-Bus client proxy (CLI → daemon)
mod error;       // Pipeline error type
mod favorites;   // Favorites list and SQLite store
mod logging;     // tracing setup
mod platform;    // OS wallpaper setters
mod selection;   // Next-favorite selection policy
mod service;     // Daemon: D-Bus service + timer loop
mod timer;       // Auto-changer timer
mod tmdb;        // TMDB API client

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use crate::cache::ImageCache;
use crate::changer::{Collaborators, WallpaperChanger, WallpaperResult};
use crate::config::{JsonSettings, KeyProvider, PromptKeyProvider, INTERVALS};
use crate::dbus_client::ChangerClient;
use crate::error::ChangeError;
use crate::favorites::{FavoriteTitle, MediaType, SortOrder, SqliteFavorites};

#[derive(Debug, Parser)]
#[command(name = "framechanger", version, about = "Movie and TV show backdrops as your desktop wallpaper")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run in the background: auto-changer timer and D-Bus service
    Daemon,
    /// Change the wallpaper to a random favorite
    Random {
        /// Download the image and print its path, then ask before applying it
        #[arg(long)]
        preview: bool,
    },
    /// Change the wallpaper to a specific movie or TV show
    Set {
        title: String,
        #[arg(short = 't', long = "type", value_enum, default_value_t = MediaType::Movie)]
        media_type: MediaType,
    },
    /// Set a local image file as the wallpaper
    Apply { path: PathBuf },
    /// Manage the favorites list
    Favorites {
        #[command(subcommand)]
        action: FavoritesCommand,
    },
    /// Show or configure automatic wallpaper changes
    AutoChange {
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
        /// Interval preset: 0=1m 1=5m 2=15m 3=30m 4=1h 5=3h 6=6h 7=12h 8=24h
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..9))]
        interval: Option<u32>,
    },
    /// Store the TMDB API key
    ApiKey { key: String },
    /// List the cached wallpaper images
    Cache,
    /// Print wallpaper changes made by the daemon as they happen
    Watch,
}

#[derive(Debug, Subcommand)]
enum FavoritesCommand {
    /// Show the favorites, optionally filtered by title
    List {
        #[arg(long)]
        filter: Option<String>,
        #[arg(long, value_enum, default_value_t = SortOrder::Name)]
        sort: SortOrder,
    },
    /// Add a title
    Add {
        title: String,
        #[arg(short = 't', long = "type", value_enum, default_value_t = MediaType::Movie)]
        media_type: MediaType,
    },
    /// Remove a title
    Remove {
        title: String,
        #[arg(short = 't', long = "type", value_enum, default_value_t = MediaType::Movie)]
        media_type: MediaType,
    },
    /// Rename a title or change its media type
    Rename {
        old: String,
        new: String,
        #[arg(short = 't', long = "type", value_enum, default_value_t = MediaType::Movie)]
        media_type: MediaType,
        /// Media type after the edit (defaults to the current one)
        #[arg(long, value_enum)]
        new_type: Option<MediaType>,
    },
    /// Remove every title
    Clear {
        /// Don't ask for confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Add the built-in starter titles
    Seed,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(&config::log_path());

    match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(stage = e.stage(), "{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<ExitCode, ChangeError> {
    match command {
        Command::Daemon => {
            open_favorites()?;
            service::run_daemon().await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Random { preview: true } => {
            let changer = local_changer()?;
            let (title, path) = changer.preview_random().await?;
            println!("{}: {}", title, path.display());

            let accepted = dialoguer::Confirm::new()
                .with_prompt(format!("Set {} as the wallpaper?", title.name))
                .default(true)
                .interact()
                .unwrap_or(false);
            if !accepted {
                return Ok(ExitCode::SUCCESS);
            }
            Ok(report(&changer.apply_local(&path).await))
        }
        Command::Random { preview: false } => {
            let result = match daemon_client().await {
                Some(client) => client.change_random().await.map_err(dbus_error)?,
                None => local_changer()?.change_random().await,
            };
            Ok(report(&result))
        }
        Command::Set { title, media_type } => {
            let result = match daemon_client().await {
                Some(client) => client.change_specific(&title, media_type).await.map_err(dbus_error)?,
                None => local_changer()?.change_specific(&title, media_type).await,
            };
            Ok(report(&result))
        }
        Command::Apply { path } => {
            let result = local_changer()?.apply_local(&path).await;
            Ok(report(&result))
        }
        Command::Favorites { action } => {
            run_favorites(action)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::AutoChange { enable, disable, interval } => {
            let enabled = if enable {
                Some(true)
            } else if disable {
                Some(false)
            } else {
                None
            };
            auto_change(enabled, interval).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::ApiKey { key } => {
            let key = key.trim().to_string();
            if key.is_empty() {
                return Err(ChangeError::MissingApiKey);
            }
            settings().update(|s| s.api_key = key)?;
            println!("API key saved to {}", config::settings_path().display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Cache => {
            let cache = ImageCache::new(config::image_dir());
            let entries = cache.entries();
            if entries.is_empty() {
                println!("No cached wallpapers in {}", cache.dir().display());
            }
            for entry in entries {
                println!("{:<40} {}", entry.title, entry.file_path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Watch => {
            let client = ChangerClient::connect().await.map_err(dbus_error)?;
            let mut stream = client.subscribe_wallpaper_changed().await.map_err(dbus_error)?;
            println!("Waiting for wallpaper changes (Ctrl+C to stop)...");
            while let Some(signal) = stream.next().await {
                match signal.args() {
                    Ok(args) => println!("Wallpaper changed to {}", args.title()),
                    Err(e) => tracing::warn!("malformed WallpaperChanged signal: {e}"),
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_favorites(action: FavoritesCommand) -> Result<(), ChangeError> {
    let store = open_favorites()?;
    match action {
        FavoritesCommand::List { filter, sort } => {
            let titles = store.search(filter.as_deref(), sort)?;
            for title in &titles {
                println!("{title}");
            }
            println!("Number of titles: {}", titles.len());
        }
        FavoritesCommand::Add { title, media_type } => {
            let favorite = FavoriteTitle::new(title.trim(), media_type);
            if store.add(&favorite)? {
                println!("Added {favorite}");
            } else {
                println!("{favorite} is already in the favorites list");
            }
        }
        FavoritesCommand::Remove { title, media_type } => {
            let favorite = FavoriteTitle::new(title, media_type);
            if store.remove(&favorite)? {
                println!("Removed {favorite}");
            } else {
                println!("{favorite} is not in the favorites list");
            }
        }
        FavoritesCommand::Rename { old, new, media_type, new_type } => {
            let old = FavoriteTitle::new(old, media_type);
            let new = FavoriteTitle::new(new.trim(), new_type.unwrap_or(media_type));
            store.rename(&old, &new)?;
            println!("Renamed {old} to {new}");
        }
        FavoritesCommand::Clear { yes } => {
            let confirmed = yes
                || dialoguer::Confirm::new()
                    .with_prompt("Delete all titles from the favorites list?")
                    .default(false)
                    .interact()
                    .unwrap_or(false);
            if confirmed {
                println!("Removed {} titles", store.clear()?);
            }
        }
        FavoritesCommand::Seed => {
            println!("Added {} starter titles", store.seed_defaults()?);
        }
    }
    Ok(())
}

async fn auto_change(enabled: Option<bool>, interval: Option<u32>) -> Result<(), ChangeError> {
    let client = daemon_client().await;

    if enabled.is_some() || interval.is_some() {
        match &client {
            Some(client) => {
                let (current_enabled, current_interval) = client.get_auto_change().await.map_err(dbus_error)?;
                client
                    .set_auto_change(enabled.unwrap_or(current_enabled), interval.unwrap_or(current_interval))
                    .await
                    .map_err(dbus_error)?;
            }
            None => {
                settings().update(|s| {
                    if let Some(enabled) = enabled {
                        s.auto_changer_enabled = enabled;
                    }
                    if let Some(interval) = interval {
                        s.auto_changer_interval = interval as usize;
                    }
                })?;
            }
        }
    }

    let stored = settings().load();
    let (enabled, index, next_run) = match &client {
        Some(client) => {
            let (enabled, index) = client.get_auto_change().await.map_err(dbus_error)?;
            let next_run = client.get_next_run().await.map_err(dbus_error)?;
            (enabled, index as usize, next_run)
        }
        None => (stored.auto_changer_enabled, stored.auto_changer_interval, String::new()),
    };

    let label = INTERVALS.get(index).map(|i| i.label).unwrap_or("3 Hours");
    println!(
        "Automatic changes: {} (every {label})",
        if enabled { "enabled" } else { "disabled" }
    );
    if !next_run.is_empty() {
        println!("Next change: {next_run}");
    } else if enabled && client.is_none() {
        println!("Start `framechanger daemon` to run automatic changes");
    }
    Ok(())
}

fn settings() -> JsonSettings {
    JsonSettings::new(config::settings_path())
}

/// Opens the favorites database, seeding the starter titles on first use.
fn open_favorites() -> Result<SqliteFavorites, ChangeError> {
    let path = config::database_path();
    let first_use = !path.exists();
    let store = SqliteFavorites::open(path)?;
    if first_use {
        let added = store.seed_defaults()?;
        tracing::info!(added, "Created favorites list with starter titles");
    }
    Ok(store)
}

/// A changer running in this process, prompting for the API key if needed.
fn local_changer() -> Result<WallpaperChanger, ChangeError> {
    open_favorites()?;
    let keys = Arc::new(PromptKeyProvider::new(settings()));
    Ok(WallpaperChanger::new(Collaborators::from_host(keys)?))
}

/// A client for the running daemon, if there is one.
///
/// The daemon never prompts, so make sure a key is stored before handing over.
async fn daemon_client() -> Option<ChangerClient> {
    if !dbus_client::is_service_available().await {
        return None;
    }

    let store = settings();
    if store.api_key().is_none() && PromptKeyProvider::new(store).provide_key().is_none() {
        tracing::warn!("no API key configured; the daemon will not be able to fetch wallpapers");
    }

    match ChangerClient::connect().await {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::warn!("daemon is running but not reachable, changing locally: {e}");
            None
        }
    }
}

fn dbus_error(e: zbus::Error) -> ChangeError {
    ChangeError::Network(format!("D-Bus call failed: {e}"))
}

/// Prints the outcome of a change; failures exit with status 1.
fn report(result: &WallpaperResult) -> ExitCode {
    if result.success {
        println!("Wallpaper changed to {}", result.display_title);
        ExitCode::SUCCESS
    } else {
        eprintln!("Failed to change wallpaper.");
        ExitCode::FAILURE
    }
}
