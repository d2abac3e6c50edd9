//! # Favorites Module
//!
//! The list of movies and TV shows the wallpaper is picked from.
//!
//! The wallpaper pipeline only ever reads this list through [`FavoritesSource`].
//! [`SqliteFavorites`] is the store the CLI edits, kept in `titles.db` inside
//! the app directory:
//!
//! ```text
//! CREATE TABLE titles (name TEXT NOT NULL, media_type TEXT NOT NULL, UNIQUE(name, media_type))
//! ```

use rusqlite::{params, Connection, ErrorCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ChangeError;

/// Whether a favorite is a movie or a TV show.
///
/// Also selects which TMDB endpoints are queried (`/search/movie` vs `/search/tv`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    /// Lowercase name, as stored in the database and used in TMDB URLs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv => "tv",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "movie" => Ok(Self::Movie),
            "tv" => Ok(Self::Tv),
            other => Err(format!("unknown media type '{other}' (expected 'movie' or 'tv')")),
        }
    }
}

/// One entry of the favorites list. Unique on (name, media_type).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FavoriteTitle {
    pub name: String,
    pub media_type: MediaType,
}

impl FavoriteTitle {
    pub fn new(name: impl Into<String>, media_type: MediaType) -> Self {
        Self { name: name.into(), media_type }
    }
}

impl fmt::Display for FavoriteTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {}", self.name, self.media_type)
    }
}

/// Read access to the favorites list, which is all the wallpaper pipeline needs.
pub trait FavoritesSource: Send + Sync {
    /// All favorites, in no particular order.
    fn list_favorites(&self) -> Result<Vec<FavoriteTitle>, ChangeError>;
}

/// How [`SqliteFavorites::search`] orders its results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SortOrder {
    /// Alphabetical by title
    #[default]
    Name,
    /// Movies first, then shows, each alphabetical
    Type,
}

/// The starter list inserted by [`SqliteFavorites::seed_defaults`].
const DEFAULT_TITLES: &[(&str, MediaType)] = &[
    ("The Grand Budapest Hotel", MediaType::Movie),
    ("The Truman Show", MediaType::Movie),
    ("500 Days of Summer", MediaType::Movie),
    ("Blade Runner 2049", MediaType::Movie),
    ("Inception", MediaType::Movie),
    ("Spirited Away", MediaType::Movie),
    ("Her", MediaType::Movie),
    ("Whiplash", MediaType::Movie),
    ("Mad Max Fury Road", MediaType::Movie),
    ("Inglourious Basterds", MediaType::Movie),
    ("Fargo", MediaType::Tv),
    ("True Detective", MediaType::Tv),
    ("The Crown", MediaType::Tv),
    ("The Handmaid's Tale", MediaType::Tv),
    ("Peaky Blinders", MediaType::Tv),
    ("Dark", MediaType::Tv),
    ("Mindhunter", MediaType::Tv),
    ("The Expanse", MediaType::Tv),
    ("Better Call Saul", MediaType::Tv),
    ("Fleabag", MediaType::Tv),
];

/// SQLite-backed favorites store.
///
/// Opens a fresh connection per operation, so the store can be shared between
/// the daemon's tasks without a lock around a `Connection`.
#[derive(Debug, Clone)]
pub struct SqliteFavorites {
    path: PathBuf,
}

impl SqliteFavorites {
    /// Opens (creating if needed) the database at `path` and ensures the table exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ChangeError> {
        let store = Self { path: path.into() };
        if let Some(parent) = store.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        store.connect()?.execute(
            "CREATE TABLE IF NOT EXISTS titles (
                name TEXT NOT NULL,
                media_type TEXT NOT NULL,
                UNIQUE(name, media_type)
            )",
            [],
        )?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, ChangeError> {
        Ok(Connection::open(&self.path)?)
    }

    /// Inserts the built-in starter titles. Existing rows are left alone.
    ///
    /// Returns how many titles were actually added.
    pub fn seed_defaults(&self) -> Result<usize, ChangeError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut added = 0;
        {
            let mut stmt = tx.prepare("INSERT OR IGNORE INTO titles (name, media_type) VALUES (?1, ?2)")?;
            for (name, media_type) in DEFAULT_TITLES {
                added += stmt.execute(params![name, media_type.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(added)
    }

    /// Adds a favorite. Returns `false` if it was already in the list.
    pub fn add(&self, title: &FavoriteTitle) -> Result<bool, ChangeError> {
        let name = title.name.trim();
        if name.is_empty() {
            return Err(ChangeError::Store("title name cannot be empty".to_string()));
        }
        let changed = self.connect()?.execute(
            "INSERT OR IGNORE INTO titles (name, media_type) VALUES (?1, ?2)",
            params![name, title.media_type.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Removes a favorite. Returns `false` if it wasn't in the list.
    pub fn remove(&self, title: &FavoriteTitle) -> Result<bool, ChangeError> {
        let changed = self.connect()?.execute(
            "DELETE FROM titles WHERE name = ?1 AND media_type = ?2",
            params![title.name, title.media_type.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Replaces `old` with `new`.
    ///
    /// Fails if `old` doesn't exist or `new` is already in the list.
    pub fn rename(&self, old: &FavoriteTitle, new: &FavoriteTitle) -> Result<(), ChangeError> {
        let new_name = new.name.trim();
        if new_name.is_empty() {
            return Err(ChangeError::Store("title name cannot be empty".to_string()));
        }
        let result = self.connect()?.execute(
            "UPDATE titles SET name = ?1, media_type = ?2 WHERE name = ?3 AND media_type = ?4",
            params![new_name, new.media_type.as_str(), old.name, old.media_type.as_str()],
        );
        match result {
            Ok(0) => Err(ChangeError::Store(format!("'{old}' is not in the favorites list"))),
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(ChangeError::Store(format!("'{new}' is already in the favorites list")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes every favorite. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, ChangeError> {
        Ok(self.connect()?.execute("DELETE FROM titles", [])?)
    }

    pub fn count(&self) -> Result<usize, ChangeError> {
        let count: i64 = self
            .connect()?
            .query_row("SELECT COUNT(*) FROM titles", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Favorites whose name contains `filter` (case-insensitive), in `order`.
    pub fn search(&self, filter: Option<&str>, order: SortOrder) -> Result<Vec<FavoriteTitle>, ChangeError> {
        let order_by = match order {
            SortOrder::Name => "name COLLATE NOCASE, media_type",
            SortOrder::Type => "media_type, name COLLATE NOCASE",
        };
        let pattern = format!("%{}%", filter.unwrap_or("").trim());
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT name, media_type FROM titles WHERE name LIKE ?1 ORDER BY {order_by}"
        ))?;
        let rows = stmt.query_map(params![pattern], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut titles = Vec::new();
        for row in rows {
            let (name, media_type) = row?;
            match media_type.parse() {
                Ok(media_type) => titles.push(FavoriteTitle { name, media_type }),
                Err(e) => tracing::warn!(title = %name, "skipping favorite: {e}"),
            }
        }
        Ok(titles)
    }
}

impl FavoritesSource for SqliteFavorites {
    fn list_favorites(&self) -> Result<Vec<FavoriteTitle>, ChangeError> {
        self.search(None, SortOrder::Name)
    }
}
