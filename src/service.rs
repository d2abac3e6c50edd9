//! # Changer Service Module
//!
//! Runs the background daemon: the auto-change timer plus a D-Bus service so
//! the CLI can route manual changes through the same process.
//!
//! ## D-Bus Interface
//!
//! Service name: `io.github.framechanger.Changer1`
//! Object path: `/io/github/framechanger/Changer1`
//!
//! ### Methods
//! - `ChangeRandom()` → `(success, title)` - Switch to a random favorite
//! - `ChangeSpecific(title, media_type)` → `(success, title)` - Switch to one title
//! - `ListFavorites()` → `[(title, media_type)]`
//! - `GetAutoChange()` → `(enabled, interval_index)`
//! - `SetAutoChange(enabled, interval_index)`
//! - `GetNextRun()` → formatted time of the next automatic change ("" if off)
//!
//! ### Signals
//! - `WallpaperChanged(title)` - Emitted after every successful change
//! - `AutoChangeChanged(enabled, interval_index)` - Emitted when the timer is reconfigured
//!
//! Because every change goes through the daemon's single [`WallpaperChanger`],
//! a manual change and a timer tick can never run side by side.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use zbus::{interface, SignalContext};

use crate::changer::{Collaborators, WallpaperChanger, WallpaperResult};
use crate::config::{self, JsonSettings, NoKeyProvider, INTERVALS};
use crate::error::ChangeError;
use crate::favorites::{FavoritesSource, MediaType, SqliteFavorites};
use crate::timer::AutoChanger;

/// D-Bus service name, unique on the session bus.
pub const SERVICE_NAME: &str = "io.github.framechanger.Changer1";

/// D-Bus object path where the interface lives.
pub const OBJECT_PATH: &str = "/io/github/framechanger/Changer1";

/// The D-Bus interface implementation.
pub struct ChangerService {
    changer: Arc<WallpaperChanger>,
    timer: Arc<AutoChanger>,
    favorites: SqliteFavorites,
}

impl ChangerService {
    pub fn new(changer: Arc<WallpaperChanger>, timer: Arc<AutoChanger>, favorites: SqliteFavorites) -> Self {
        Self { changer, timer, favorites }
    }

    async fn announce(ctx: &SignalContext<'_>, result: &WallpaperResult) -> zbus::fdo::Result<(bool, String)> {
        if result.success {
            Self::wallpaper_changed(ctx, &result.display_title).await?;
        }
        Ok((result.success, result.display_title.clone()))
    }
}

#[interface(name = "io.github.framechanger.Changer1")]
impl ChangerService {
    /// Switch to a random favorite
    async fn change_random(
        &self,
        #[zbus(signal_context)] ctx: SignalContext<'_>,
    ) -> zbus::fdo::Result<(bool, String)> {
        let result = self.changer.change_random().await;
        Self::announce(&ctx, &result).await
    }

    /// Switch to a specific title
    async fn change_specific(
        &self,
        title: String,
        media_type: String,
        #[zbus(signal_context)] ctx: SignalContext<'_>,
    ) -> zbus::fdo::Result<(bool, String)> {
        let media_type: MediaType = media_type.parse().map_err(zbus::fdo::Error::InvalidArgs)?;
        let result = self.changer.change_specific(&title, media_type).await;
        Self::announce(&ctx, &result).await
    }

    /// All favorites as (title, media_type) pairs
    async fn list_favorites(&self) -> zbus::fdo::Result<Vec<(String, String)>> {
        let titles = self
            .favorites
            .list_favorites()
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        Ok(titles
            .into_iter()
            .map(|t| (t.name, t.media_type.to_string()))
            .collect())
    }

    /// Whether the auto-changer is on, and its interval preset index
    async fn get_auto_change(&self) -> (bool, u32) {
        (self.timer.is_enabled(), self.timer.interval_index() as u32)
    }

    /// Turn the auto-changer on/off and pick its interval preset
    async fn set_auto_change(
        &self,
        enabled: bool,
        interval: u32,
        #[zbus(signal_context)] ctx: SignalContext<'_>,
    ) -> zbus::fdo::Result<()> {
        let index = interval as usize;
        if index >= INTERVALS.len() {
            return Err(zbus::fdo::Error::InvalidArgs(format!(
                "interval must be between 0 and {}",
                INTERVALS.len() - 1
            )));
        }
        self.timer.configure(enabled, Some(index));
        Self::auto_change_changed(&ctx, enabled, interval).await?;
        Ok(())
    }

    /// Next automatic change, formatted ("" when disabled)
    async fn get_next_run(&self) -> String {
        self.timer.next_run_string().await
    }

    // === Signals ===

    /// Signal emitted when the wallpaper changes
    #[zbus(signal)]
    async fn wallpaper_changed(ctx: &SignalContext<'_>, title: &str) -> zbus::Result<()>;

    /// Signal emitted when the auto-changer is reconfigured
    #[zbus(signal)]
    async fn auto_change_changed(ctx: &SignalContext<'_>, enabled: bool, interval: u32) -> zbus::Result<()>;
}

/// Runs the daemon until Ctrl+C.
///
/// 1. Builds the wallpaper changer (never prompts for a key: there is no terminal)
/// 2. Starts the auto-change timer
/// 3. Registers the D-Bus service; if the session bus is unavailable the timer still runs
/// 4. Changes the wallpaper every time the timer fires
pub async fn run_daemon() -> Result<(), ChangeError> {
    let changer = Arc::new(WallpaperChanger::new(Collaborators::from_host(Arc::new(NoKeyProvider))?));
    let favorites = SqliteFavorites::open(config::database_path())?;
    let timer = Arc::new(AutoChanger::new(JsonSettings::new(config::settings_path())));
    let timer_rx = timer.start();

    tracing::info!(
        enabled = timer.is_enabled(),
        interval = timer.interval().label,
        "Auto-changer started"
    );

    let service = ChangerService::new(changer.clone(), timer.clone(), favorites);
    let connection = match zbus::connection::Builder::session()
        .and_then(|b| b.name(SERVICE_NAME))
        .and_then(|b| b.serve_at(OBJECT_PATH, service))
    {
        Ok(builder) => match builder.build().await {
            Ok(conn) => {
                tracing::info!("D-Bus service running at {OBJECT_PATH} on {SERVICE_NAME}");
                Some(conn)
            }
            Err(e) => {
                tracing::warn!("Failed to build D-Bus connection: {e}");
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to configure D-Bus: {e}");
            None
        }
    };

    let changer = &*changer;
    let connection = connection.as_ref();
    drive_ticks(timer_rx, tokio::signal::ctrl_c(), move || on_timer_tick(changer, connection)).await;

    timer.stop();
    Ok(())
}

/// Runs `on_tick` for every timer tick until `shutdown` completes or the timer stops.
///
/// `shutdown` lives across iterations, so a request that arrives while a
/// change is running ends the loop as soon as that change returns.
async fn drive_ticks<S, F, Fut>(mut ticks: mpsc::Receiver<()>, shutdown: S, mut on_tick: F)
where
    S: Future,
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                tracing::info!("Shutting down");
                break;
            }
            tick = ticks.recv() => {
                if tick.is_none() {
                    break;
                }
                on_tick().await;
            }
        }
    }
}

async fn on_timer_tick(changer: &WallpaperChanger, connection: Option<&zbus::Connection>) {
    tracing::info!("Timer fired - changing wallpaper...");
    let outcome = changer.try_change_random().await;
    if let Some((summary, body)) = notification_for(&outcome) {
        notify(summary, &body);
    }

    if let (Ok(title), Some(conn)) = (&outcome, connection) {
        match SignalContext::new(conn, OBJECT_PATH) {
            Ok(ctx) => {
                if let Err(e) = ChangerService::wallpaper_changed(&ctx, title).await {
                    tracing::debug!("could not emit WallpaperChanged: {e}");
                }
            }
            Err(e) => tracing::debug!("invalid signal context: {e}"),
        }
    }
}

/// Notification summary and body for a timer-driven change.
///
/// A tick dropped because another change was running gets none.
fn notification_for(outcome: &Result<String, ChangeError>) -> Option<(&'static str, String)> {
    match outcome {
        Ok(title) => Some(("Wallpaper Changed", format!("Wallpaper changed to {title}"))),
        Err(ChangeError::Busy) => None,
        Err(_) => Some(("Error", "Failed to change wallpaper.".to_string())),
    }
}

/// Shows a transient desktop notification, where `notify-send` exists.
fn notify(summary: &str, body: &str) {
    if !cfg!(target_os = "linux") {
        return;
    }

    if let Err(e) = std::process::Command::new("notify-send")
        .args(["-i", "preferences-desktop-wallpaper", "-t", "3000", summary, body])
        .spawn()
    {
        tracing::debug!("notify-send unavailable: {e}");
    }
}
