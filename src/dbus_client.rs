//! # D-Bus Client Module
//!
//! Lets the CLI hand work to a running daemon, so manual changes share the
//! daemon's one-run-at-a-time guard instead of racing it.
//!
//! ## Usage
//!
//! ```ignore
//! let client = ChangerClient::connect().await?;
//! let result = client.change_random().await?;
//! println!("Wallpaper changed to {}", result.display_title);
//! ```

use zbus::{proxy, Connection};

use crate::changer::WallpaperResult;
use crate::favorites::MediaType;
use crate::service::SERVICE_NAME;

/// D-Bus proxy for the changer service
#[proxy(
    interface = "io.github.framechanger.Changer1",
    default_service = "io.github.framechanger.Changer1",
    default_path = "/io/github/framechanger/Changer1"
)]
trait ChangerService {
    /// Switch to a random favorite
    async fn change_random(&self) -> zbus::Result<(bool, String)>;

    /// Switch to a specific title
    async fn change_specific(&self, title: &str, media_type: &str) -> zbus::Result<(bool, String)>;

    /// All favorites as (title, media_type) pairs
    async fn list_favorites(&self) -> zbus::Result<Vec<(String, String)>>;

    /// Whether the auto-changer is on, and its interval preset index
    async fn get_auto_change(&self) -> zbus::Result<(bool, u32)>;

    /// Turn the auto-changer on/off and pick its interval preset
    async fn set_auto_change(&self, enabled: bool, interval: u32) -> zbus::Result<()>;

    /// Next automatic change, formatted ("" when disabled)
    async fn get_next_run(&self) -> zbus::Result<String>;

    /// Signal emitted when the wallpaper changes
    #[zbus(signal)]
    async fn wallpaper_changed(&self, title: String) -> zbus::Result<()>;
}

/// High-level client for the changer service (running in the daemon)
pub struct ChangerClient {
    proxy: ChangerServiceProxy<'static>,
}

impl ChangerClient {
    /// Connect to the changer service
    ///
    /// Returns an error if the session bus is unreachable
    pub async fn connect() -> zbus::Result<Self> {
        let connection = Connection::session().await?;
        let proxy = ChangerServiceProxy::new(&connection).await?;
        Ok(Self { proxy })
    }

    pub async fn change_random(&self) -> zbus::Result<WallpaperResult> {
        let (success, display_title) = self.proxy.change_random().await?;
        Ok(WallpaperResult { success, display_title })
    }

    pub async fn change_specific(&self, title: &str, media_type: MediaType) -> zbus::Result<WallpaperResult> {
        let (success, display_title) = self.proxy.change_specific(title, media_type.as_str()).await?;
        Ok(WallpaperResult { success, display_title })
    }

    pub async fn get_auto_change(&self) -> zbus::Result<(bool, u32)> {
        self.proxy.get_auto_change().await
    }

    pub async fn set_auto_change(&self, enabled: bool, interval: u32) -> zbus::Result<()> {
        self.proxy.set_auto_change(enabled, interval).await
    }

    pub async fn get_next_run(&self) -> zbus::Result<String> {
        self.proxy.get_next_run().await
    }

    /// Subscribe to wallpaper changed signals
    pub async fn subscribe_wallpaper_changed(&self) -> zbus::Result<WallpaperChangedStream<'static>> {
        self.proxy.receive_wallpaper_changed().await
    }
}

/// Check if the daemon is running and registered on D-Bus
pub async fn is_service_available() -> bool {
    if let Ok(connection) = Connection::session().await {
        connection
            .call_method(
                Some("org.freedesktop.DBus"),
                "/org/freedesktop/DBus",
                Some("org.freedesktop.DBus"),
                "NameHasOwner",
                &SERVICE_NAME,
            )
            .await
            .and_then(|reply| reply.body().deserialize::<bool>())
            .unwrap_or(false)
    } else {
        false
    }
}
