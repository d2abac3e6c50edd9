//! # Wallpaper Changer
//!
//! Composes the pipeline stages into the two operations the rest of the app
//! calls:
//!
//! ```text
//! change_random:   favorites → pick_next → record last title → resolve → select_image → cache → apply
//! change_specific:                                             resolve → select_image → cache → apply → record last title
//! ```
//!
//! Each stage can stop the run. Whatever goes wrong is logged with the title and
//! stage and reduced to `WallpaperResult { success: false, display_title: "" }`.
//!
//! ## Last Title Bookkeeping
//! A random change records its pick as the last shown title *before* resolving
//! it, so a title that fails to resolve still counts as shown and won't be drawn
//! twice in a row. A specific change only records the title once the wallpaper
//! has actually been applied.
//!
//! ## One Run at a Time
//! The RNG lives behind an async mutex that is held for a whole run. A trigger
//! arriving while another run holds it (timer firing during a manual change) is
//! dropped, so two runs never write the same cache file or the last title at
//! once.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::cache::{ImageCache, ImageFetcher};
use crate::config::{self, JsonSettings, KeyProvider, Settings, SettingsStore};
use crate::error::ChangeError;
use crate::favorites::{FavoriteTitle, FavoritesSource, MediaType, SqliteFavorites};
use crate::platform::{PlatformSetter, WallpaperSetter};
use crate::selection::pick_next;
use crate::tmdb::{self, MediaCatalog, TmdbClient};

/// Outcome of a change, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WallpaperResult {
    pub success: bool,
    /// Title now on the desktop; empty on failure
    pub display_title: String,
}

impl WallpaperResult {
    pub fn changed(title: impl Into<String>) -> Self {
        Self { success: true, display_title: title.into() }
    }

    pub fn failed() -> Self {
        Self::default()
    }
}

/// Everything the changer talks to.
pub struct Collaborators {
    pub favorites: Arc<dyn FavoritesSource>,
    pub settings: Arc<dyn SettingsStore>,
    pub keys: Arc<dyn KeyProvider>,
    pub catalog: Arc<dyn MediaCatalog>,
    pub fetcher: Arc<dyn ImageFetcher>,
    pub cache: ImageCache,
    pub setter: Arc<dyn WallpaperSetter>,
}

impl Collaborators {
    /// The real thing: SQLite favorites, `settings.json`, TMDB, the image
    /// cache in the app directory, and this host's wallpaper mechanism.
    pub fn from_host(keys: Arc<dyn KeyProvider>) -> Result<Self, ChangeError> {
        let tmdb = Arc::new(TmdbClient::new()?);
        Ok(Self {
            favorites: Arc::new(SqliteFavorites::open(config::database_path())?),
            settings: Arc::new(JsonSettings::new(config::settings_path())),
            keys,
            catalog: tmdb.clone(),
            fetcher: tmdb,
            cache: ImageCache::new(config::image_dir()),
            setter: Arc::new(PlatformSetter::detect()),
        })
    }
}

/// Runs wallpaper changes. See the module docs for the pipeline.
pub struct WallpaperChanger {
    parts: Collaborators,
    /// Random source for both selection steps; locking it is the run guard
    run_guard: Mutex<StdRng>,
}

impl WallpaperChanger {
    pub fn new(parts: Collaborators) -> Self {
        Self::with_rng(parts, StdRng::from_entropy())
    }

    /// Uses the given random source (seed it for reproducible picks).
    pub fn with_rng(parts: Collaborators, rng: StdRng) -> Self {
        Self { parts, run_guard: Mutex::new(rng) }
    }

    pub fn cache(&self) -> &ImageCache {
        &self.parts.cache
    }

    /// Changes the wallpaper to a random favorite, avoiding the last one shown.
    pub async fn change_random(&self) -> WallpaperResult {
        self.try_change_random()
            .await
            .map_or_else(|_| WallpaperResult::failed(), WallpaperResult::changed)
    }

    /// Like [`change_random`](Self::change_random), but keeps the error so
    /// callers can tell a dropped trigger ([`ChangeError::Busy`]) from a
    /// failed run. Failures are logged either way.
    pub async fn try_change_random(&self) -> Result<String, ChangeError> {
        let Ok(mut rng) = self.run_guard.try_lock() else {
            return Err(report_failure(None, ChangeError::Busy));
        };

        let snapshot = self.parts.settings.snapshot();
        let picked = self
            .api_key(&snapshot)
            .and_then(|key| Ok((key, self.pick_random(&mut rng, &snapshot.last_title)?)));
        let (api_key, title) = picked.map_err(|e| report_failure(None, e))?;

        match self.download_and_apply(&title, &api_key, &mut rng).await {
            Ok(path) => {
                tracing::info!(title = %title.name, path = %path.display(), "Wallpaper changed");
                Ok(title.name)
            }
            Err(e) => Err(report_failure(Some(&title.name), e)),
        }
    }

    /// Changes the wallpaper to one particular title.
    pub async fn change_specific(&self, name: &str, media_type: MediaType) -> WallpaperResult {
        let Ok(mut rng) = self.run_guard.try_lock() else {
            report_failure(Some(name), ChangeError::Busy);
            return WallpaperResult::failed();
        };

        let title = FavoriteTitle::new(name, media_type);
        let snapshot = self.parts.settings.snapshot();
        let result = match self.api_key(&snapshot) {
            Ok(api_key) => self.download_and_apply(&title, &api_key, &mut rng).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(path) => {
                self.record_last_shown(name);
                tracing::info!(title = name, path = %path.display(), "Wallpaper changed");
                WallpaperResult::changed(name)
            }
            Err(e) => {
                report_failure(Some(name), e);
                WallpaperResult::failed()
            }
        }
    }

    /// Picks and downloads a random favorite without applying it.
    ///
    /// The pick still counts as shown, like a random change.
    pub async fn preview_random(&self) -> Result<(FavoriteTitle, PathBuf), ChangeError> {
        let mut rng = self.run_guard.try_lock().map_err(|_| ChangeError::Busy)?;

        let snapshot = self.parts.settings.snapshot();
        let api_key = self.api_key(&snapshot)?;
        let title = self.pick_random(&mut rng, &snapshot.last_title)?;
        let path = self.download(&title, &api_key, &mut rng).await.inspect_err(|e| {
            tracing::error!(title = %title.name, stage = e.stage(), "Could not fetch wallpaper: {e}");
        })?;
        Ok((title, path))
    }

    /// Applies a local image file, no network involved.
    pub async fn apply_local(&self, image_path: &Path) -> WallpaperResult {
        let Ok(_rng) = self.run_guard.try_lock() else {
            report_failure(None, ChangeError::Busy);
            return WallpaperResult::failed();
        };

        let display = image_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| image_path.display().to_string());

        match self.apply(image_path.to_path_buf()).await {
            Ok(()) => WallpaperResult::changed(display),
            Err(e) => {
                report_failure(Some(&display), e);
                WallpaperResult::failed()
            }
        }
    }

    /// Reads the favorites, picks one and records it as shown.
    fn pick_random(&self, rng: &mut StdRng, last_shown: &str) -> Result<FavoriteTitle, ChangeError> {
        let candidates = self.parts.favorites.list_favorites()?;
        let title = pick_next(&candidates, last_shown, rng)?.clone();
        tracing::debug!(title = %title.name, last_shown = %last_shown, count = candidates.len(), "picked favorite");

        self.record_last_shown(&title.name);
        Ok(title)
    }

    async fn download_and_apply(
        &self,
        title: &FavoriteTitle,
        api_key: &str,
        rng: &mut StdRng,
    ) -> Result<PathBuf, ChangeError> {
        let path = self.download(title, api_key, rng).await?;
        self.apply(path.clone()).await?;
        Ok(path)
    }

    /// The key in this run's settings snapshot, or one from the key provider.
    fn api_key(&self, snapshot: &Settings) -> Result<String, ChangeError> {
        Some(snapshot.api_key.clone())
            .filter(|key| !key.trim().is_empty())
            .or_else(|| self.parts.keys.provide_key())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(ChangeError::MissingApiKey)
    }

    /// Resolve, pick a backdrop, and cache it.
    async fn download(&self, title: &FavoriteTitle, api_key: &str, rng: &mut StdRng) -> Result<PathBuf, ChangeError> {
        let catalog = self.parts.catalog.as_ref();
        let media = tmdb::resolve(catalog, &title.name, title.media_type, api_key).await?;
        let image = tmdb::select_image(catalog, media, api_key, rng).await?;
        self.parts
            .cache
            .store(self.parts.fetcher.as_ref(), &image, &title.name)
            .await
    }

    async fn apply(&self, path: PathBuf) -> Result<(), ChangeError> {
        let setter = Arc::clone(&self.parts.setter);
        let target = path.clone();
        let applied = tokio::task::spawn_blocking(move || setter.apply(&target))
            .await
            .map_err(|e| ChangeError::PlatformApply(format!("wallpaper task failed: {e}")))?;

        if applied {
            Ok(())
        } else {
            Err(ChangeError::PlatformApply(format!("could not apply {}", path.display())))
        }
    }

    fn record_last_shown(&self, title: &str) {
        if let Err(e) = self.parts.settings.set_last_shown(title) {
            tracing::warn!(title, "could not record last shown title: {e}");
        }
    }
}

/// Logs a failed or skipped run and hands the error back.
fn report_failure(title: Option<&str>, error: ChangeError) -> ChangeError {
    match &error {
        ChangeError::Busy => tracing::warn!(title, "Skipping wallpaper change: {error}"),
        _ => tracing::error!(title, stage = error.stage(), "Failed to change wallpaper: {error}"),
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmdb::{ImageDescriptor, ResolvedMedia, SearchHit};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct MemFavorites(Vec<FavoriteTitle>);

    impl FavoritesSource for MemFavorites {
        fn list_favorites(&self) -> Result<Vec<FavoriteTitle>, ChangeError> {
            Ok(self.0.clone())
        }
    }

    struct MemSettings {
        key: Option<String>,
        last: StdMutex<String>,
        snapshots: AtomicUsize,
    }

    impl MemSettings {
        fn last_shown(&self) -> String {
            self.last.lock().unwrap().clone()
        }
    }

    impl SettingsStore for MemSettings {
        fn snapshot(&self) -> Settings {
            self.snapshots.fetch_add(1, Ordering::SeqCst);
            Settings {
                api_key: self.key.clone().unwrap_or_default(),
                last_title: self.last_shown(),
                ..Settings::default()
            }
        }

        fn set_last_shown(&self, title: &str) -> Result<(), ChangeError> {
            *self.last.lock().unwrap() = title.to_string();
            Ok(())
        }
    }

    struct FixedKey(Option<&'static str>);

    impl KeyProvider for FixedKey {
        fn provide_key(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    /// Resolves every title to media id 27205 with one textless 16:9 backdrop.
    #[derive(Default)]
    struct MockCatalog {
        fail_search: bool,
        no_results: bool,
        calls: AtomicUsize,
        searched: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl MediaCatalog for MockCatalog {
        async fn search(&self, title: &str, _: MediaType, _: &str) -> Result<Vec<SearchHit>, ChangeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.searched.lock().unwrap().push(title.to_string());
            if self.fail_search {
                return Err(ChangeError::Network("503 Service Unavailable".into()));
            }
            if self.no_results {
                return Ok(vec![]);
            }
            Ok(vec![SearchHit { id: 27205 }])
        }

        async fn backdrops(&self, media: ResolvedMedia, _: &str) -> Result<Vec<ImageDescriptor>, ChangeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(media.media_id, 27205);
            Ok(vec![ImageDescriptor {
                file_path: "/s3TBrRGB1iav7gFOCNx3H31MoES.jpg".into(),
                width: 3840,
                height: 2160,
                language: None,
            }])
        }
    }

    #[derive(Default)]
    struct RecordingFetcher {
        urls: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageFetcher for RecordingFetcher {
        async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ChangeError> {
            self.urls.lock().unwrap().push(url.to_string());
            Ok(vec![0xFF, 0xD8, 0xFF, 0xE0])
        }
    }

    struct RecordingSetter {
        succeed: bool,
        paths: StdMutex<Vec<PathBuf>>,
    }

    impl WallpaperSetter for RecordingSetter {
        fn apply(&self, image_path: &Path) -> bool {
            self.paths.lock().unwrap().push(image_path.to_path_buf());
            self.succeed
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        settings: Arc<MemSettings>,
        catalog: Arc<MockCatalog>,
        fetcher: Arc<RecordingFetcher>,
        setter: Arc<RecordingSetter>,
        changer: WallpaperChanger,
    }

    struct Setup {
        favorites: Vec<FavoriteTitle>,
        stored_key: Option<&'static str>,
        provided_key: Option<&'static str>,
        last_shown: &'static str,
        catalog: MockCatalog,
        setter_succeeds: bool,
    }

    impl Default for Setup {
        fn default() -> Self {
            Self {
                favorites: vec![
                    FavoriteTitle::new("Inception", MediaType::Movie),
                    FavoriteTitle::new("Dark", MediaType::Tv),
                ],
                stored_key: Some("KEY"),
                provided_key: None,
                last_shown: "",
                catalog: MockCatalog::default(),
                setter_succeeds: true,
            }
        }
    }

    impl Setup {
        fn build(self) -> Harness {
            let dir = tempfile::tempdir().unwrap();
            let settings = Arc::new(MemSettings {
                key: self.stored_key.map(str::to_string),
                last: StdMutex::new(self.last_shown.to_string()),
                snapshots: AtomicUsize::new(0),
            });
            let catalog = Arc::new(self.catalog);
            let fetcher = Arc::new(RecordingFetcher::default());
            let setter = Arc::new(RecordingSetter { succeed: self.setter_succeeds, paths: StdMutex::new(vec![]) });

            let parts = Collaborators {
                favorites: Arc::new(MemFavorites(self.favorites)),
                settings: settings.clone(),
                keys: Arc::new(FixedKey(self.provided_key)),
                catalog: catalog.clone(),
                fetcher: fetcher.clone(),
                cache: ImageCache::new(dir.path().join("images")),
                setter: setter.clone(),
            };
            let changer = WallpaperChanger::with_rng(parts, StdRng::seed_from_u64(42));
            Harness { _dir: dir, settings, catalog, fetcher, setter, changer }
        }
    }

    #[tokio::test]
    async fn specific_change_runs_every_stage_once() {
        let h = Setup::default().build();

        let result = h.changer.change_specific("Inception", MediaType::Movie).await;

        assert_eq!(result, WallpaperResult::changed("Inception"));
        assert_eq!(
            *h.fetcher.urls.lock().unwrap(),
            vec!["https://image.tmdb.org/t/p/original/s3TBrRGB1iav7gFOCNx3H31MoES.jpg"]
        );
        let expected_path = h.changer.cache().path_for("Inception");
        assert_eq!(*h.setter.paths.lock().unwrap(), vec![expected_path]);
        assert_eq!(h.settings.last_shown(), "Inception");
    }

    #[tokio::test]
    async fn each_run_reads_the_settings_once() {
        let h = Setup { last_shown: "Inception", ..Default::default() }.build();

        assert!(h.changer.change_random().await.success);
        assert_eq!(h.settings.snapshots.load(Ordering::SeqCst), 1);

        assert!(h.changer.change_specific("Inception", MediaType::Movie).await.success);
        assert_eq!(h.settings.snapshots.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn search_network_error_stops_before_download() {
        let h = Setup { catalog: MockCatalog { fail_search: true, ..Default::default() }, ..Default::default() }.build();

        let result = h.changer.change_specific("Inception", MediaType::Movie).await;

        assert_eq!(result, WallpaperResult::failed());
        assert!(h.fetcher.urls.lock().unwrap().is_empty());
        assert!(h.setter.paths.lock().unwrap().is_empty());
        assert_eq!(h.settings.last_shown(), "");
    }

    #[tokio::test]
    async fn empty_favorites_never_touch_the_network() {
        let h = Setup { favorites: vec![], ..Default::default() }.build();

        assert_eq!(h.changer.change_random().await, WallpaperResult::failed());
        assert_eq!(h.catalog.calls.load(Ordering::SeqCst), 0);
        assert!(h.fetcher.urls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn random_change_avoids_the_last_title() {
        let h = Setup { last_shown: "Inception", ..Default::default() }.build();

        let result = h.changer.change_random().await;

        assert_eq!(result, WallpaperResult::changed("Dark"));
        assert_eq!(h.settings.last_shown(), "Dark");
        assert_eq!(*h.catalog.searched.lock().unwrap(), vec!["Dark"]);
    }

    #[tokio::test]
    async fn random_change_counts_a_failed_pick_as_shown() {
        let h = Setup {
            last_shown: "Inception",
            catalog: MockCatalog { no_results: true, ..Default::default() },
            ..Default::default()
        }
        .build();

        assert_eq!(h.changer.change_random().await, WallpaperResult::failed());
        assert_eq!(h.settings.last_shown(), "Dark");
    }

    #[tokio::test]
    async fn specific_change_only_records_after_apply() {
        let h = Setup { setter_succeeds: false, last_shown: "Dark", ..Default::default() }.build();

        let result = h.changer.change_specific("Inception", MediaType::Movie).await;

        assert_eq!(result, WallpaperResult::failed());
        assert_eq!(h.setter.paths.lock().unwrap().len(), 1);
        assert_eq!(h.settings.last_shown(), "Dark");
    }

    #[tokio::test]
    async fn missing_api_key_aborts() {
        let h = Setup { stored_key: None, ..Default::default() }.build();

        assert_eq!(h.changer.change_specific("Dark", MediaType::Tv).await, WallpaperResult::failed());
        assert_eq!(h.catalog.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn key_provider_fills_in_a_missing_key() {
        let h = Setup { stored_key: None, provided_key: Some("PROMPTED"), ..Default::default() }.build();

        assert_eq!(h.changer.change_specific("Dark", MediaType::Tv).await, WallpaperResult::changed("Dark"));
    }

    #[tokio::test]
    async fn concurrent_trigger_is_dropped() {
        let h = Setup::default().build();
        let _running = h.changer.run_guard.try_lock().unwrap();

        assert_eq!(h.changer.change_random().await, WallpaperResult::failed());
        assert!(matches!(h.changer.try_change_random().await, Err(ChangeError::Busy)));
        assert_eq!(h.catalog.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.settings.last_shown(), "");
    }

    #[tokio::test]
    async fn try_change_random_keeps_the_failure_reason() {
        let h = Setup { favorites: vec![], ..Default::default() }.build();
        assert!(matches!(h.changer.try_change_random().await, Err(ChangeError::EmptyFavorites)));

        let h = Setup { last_shown: "Dark", ..Default::default() }.build();
        assert_eq!(h.changer.try_change_random().await.unwrap(), "Inception");
    }

    #[tokio::test]
    async fn preview_downloads_without_applying() {
        let h = Setup { last_shown: "Dark", ..Default::default() }.build();

        let (title, path) = h.changer.preview_random().await.unwrap();

        assert_eq!(title.name, "Inception");
        assert_eq!(path, h.changer.cache().path_for("Inception"));
        assert!(path.is_file());
        assert!(h.setter.paths.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn accepted_preview_applies_the_cached_image() {
        let h = Setup { last_shown: "Dark", ..Default::default() }.build();

        let (title, path) = h.changer.preview_random().await.unwrap();
        let result = h.changer.apply_local(&path).await;

        assert_eq!(result, WallpaperResult::changed(title.name));
        assert_eq!(*h.setter.paths.lock().unwrap(), vec![path]);
        assert_eq!(h.catalog.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn local_image_skips_the_network() {
        let h = Setup::default().build();
        let image = h._dir.path().join("holiday.png");
        std::fs::write(&image, [0x89, 0x50, 0x4E, 0x47]).unwrap();

        assert_eq!(h.changer.apply_local(&image).await, WallpaperResult::changed("holiday"));
        assert_eq!(h.catalog.calls.load(Ordering::SeqCst), 0);
        assert_eq!(*h.setter.paths.lock().unwrap(), vec![image]);
    }
}
