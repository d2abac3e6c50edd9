//! # Platform Wallpaper Setter
//!
//! Applies a local image as the desktop background, dispatching on the host OS:
//!
//! | Platform | Mechanism |
//! |----------|-----------|
//! | Windows  | `SystemParametersInfoW(SPI_SETDESKWALLPAPER, ...)` |
//! | macOS    | `osascript` telling System Events to set the picture of every desktop |
//! | Linux    | COSMIC background config, or `gsettings` elsewhere; `feh --bg-scale` as fallback |
//!
//! Every OS-specific call goes through [`SystemBackend`], so the dispatch logic
//! can be exercised on any host.

use std::path::{Path, PathBuf};

use crate::error::ChangeError;

/// Applies an image file as the desktop background.
pub trait WallpaperSetter: Send + Sync {
    /// Returns `false` on any failure (already logged), never panics.
    fn apply(&self, image_path: &Path) -> bool;
}

/// The operating systems we know how to set a wallpaper on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Unsupported,
}

impl Platform {
    /// The platform this binary is running on.
    pub fn current() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Maps an OS name (`std::env::consts::OS` style, or `Darwin`) to a platform.
    pub fn from_os_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "windows" => Self::Windows,
            "macos" | "darwin" => Self::MacOs,
            "linux" => Self::Linux,
            _ => Self::Unsupported,
        }
    }
}

/// Which Linux desktop mechanism is tried before the `feh` fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinuxDesktop {
    /// COSMIC: background config file + `cosmic-bg` restart
    Cosmic,
    /// GNOME and anything else that honours `org.gnome.desktop.background`
    Gnome,
}

impl LinuxDesktop {
    /// Detects the running desktop from `XDG_CURRENT_DESKTOP`.
    pub fn detect() -> Self {
        let desktop = std::env::var("XDG_CURRENT_DESKTOP").unwrap_or_default();
        if desktop.to_uppercase().contains("COSMIC") {
            Self::Cosmic
        } else {
            Self::Gnome
        }
    }
}

/// The raw OS-level operations the setter is built from.
pub trait SystemBackend: Send + Sync {
    /// Runs a program to completion; non-zero exit is an error.
    fn run(&self, program: &str, args: &[&str]) -> Result<(), String>;

    /// Calls the Windows desktop-background API.
    fn set_windows_wallpaper(&self, image_path: &Path) -> Result<(), String>;

    /// Points the COSMIC background config at the image and restarts `cosmic-bg`.
    fn apply_cosmic(&self, image_path: &Path) -> Result<(), String>;
}

/// [`WallpaperSetter`] for one platform, selected once at startup.
pub struct PlatformSetter {
    platform: Platform,
    desktop: LinuxDesktop,
    backend: Box<dyn SystemBackend>,
}

impl PlatformSetter {
    pub fn new(platform: Platform, desktop: LinuxDesktop, backend: Box<dyn SystemBackend>) -> Self {
        Self { platform, desktop, backend }
    }

    /// Setter for the current host, using the real OS calls.
    pub fn detect() -> Self {
        Self::new(Platform::current(), LinuxDesktop::detect(), Box::new(HostBackend))
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    fn try_apply(&self, image_path: &Path) -> Result<(), ChangeError> {
        if self.platform == Platform::Unsupported {
            return Err(ChangeError::UnsupportedPlatform(std::env::consts::OS.to_string()));
        }

        if !image_path.is_file() {
            return Err(ChangeError::PlatformApply(format!("no image at {}", image_path.display())));
        }
        let absolute: PathBuf = std::path::absolute(image_path)?;
        let path_str = absolute.to_string_lossy();

        let result = match self.platform {
            Platform::Windows => self.backend.set_windows_wallpaper(&absolute),
            Platform::MacOs => {
                let script = format!(
                    "tell application \"System Events\" to set picture of every desktop to POSIX file \"{}\"",
                    escape_quoted(&path_str)
                );
                self.backend.run("osascript", &["-e", &script])
            }
            Platform::Linux => {
                let primary = match self.desktop {
                    LinuxDesktop::Cosmic => self.backend.apply_cosmic(&absolute),
                    LinuxDesktop::Gnome => {
                        let uri = format!("file://{path_str}");
                        self.backend.run(
                            "gsettings",
                            &["set", "org.gnome.desktop.background", "picture-uri", &uri],
                        )
                    }
                };
                primary.or_else(|e| {
                    tracing::warn!(desktop = ?self.desktop, "desktop background call failed ({e}), falling back to feh");
                    self.backend.run("feh", &["--bg-scale", &path_str])
                })
            }
            Platform::Unsupported => unreachable!("handled above"),
        };
        result.map_err(ChangeError::PlatformApply)
    }
}

impl WallpaperSetter for PlatformSetter {
    fn apply(&self, image_path: &Path) -> bool {
        match self.try_apply(image_path) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(platform = ?self.platform, path = %image_path.display(), "Error setting wallpaper: {e}");
                false
            }
        }
    }
}

/// Checks if the application is running inside a Flatpak sandbox.
///
/// Flatpak creates a `/.flatpak-info` file inside the sandbox; commands then
/// have to go through `flatpak-spawn --host` to reach the host system.
pub fn is_flatpak() -> bool {
    Path::new("/.flatpak-info").exists()
}

/// Runs a command on the host system, automatically handling Flatpak sandboxing.
fn host_command(cmd: &str, args: &[&str]) -> std::process::Command {
    if is_flatpak() {
        let mut command = std::process::Command::new("flatpak-spawn");
        command.arg("--host").arg(cmd).args(args);
        command
    } else {
        let mut command = std::process::Command::new(cmd);
        command.args(args);
        command
    }
}

/// The real OS calls.
pub struct HostBackend;

impl SystemBackend for HostBackend {
    fn run(&self, program: &str, args: &[&str]) -> Result<(), String> {
        let output = host_command(program, args)
            .output()
            .map_err(|e| format!("failed to run {program}: {e}"))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(format!(
                "{program} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }

    #[cfg(windows)]
    fn set_windows_wallpaper(&self, image_path: &Path) -> Result<(), String> {
        use std::iter::once;
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::winuser::{
            SystemParametersInfoW, SPIF_SENDCHANGE, SPIF_UPDATEINIFILE, SPI_SETDESKWALLPAPER,
        };

        // NUL-terminated UTF-16 path
        let wide: Vec<u16> = image_path.as_os_str().encode_wide().chain(once(0)).collect();
        let ok = unsafe {
            SystemParametersInfoW(
                SPI_SETDESKWALLPAPER,
                0,
                wide.as_ptr() as *mut _,
                SPIF_UPDATEINIFILE | SPIF_SENDCHANGE,
            )
        };
        if ok == 0 {
            Err(format!("SystemParametersInfoW failed: {}", std::io::Error::last_os_error()))
        } else {
            Ok(())
        }
    }

    #[cfg(not(windows))]
    fn set_windows_wallpaper(&self, _image_path: &Path) -> Result<(), String> {
        Err("SystemParametersInfoW is only available on Windows".to_string())
    }

    fn apply_cosmic(&self, image_path: &Path) -> Result<(), String> {
        // home_dir() rather than config_dir(): inside Flatpak config_dir() is the
        // sandboxed path, but COSMIC reads the host's ~/.config
        let config_path = dirs::home_dir()
            .ok_or("Could not find home directory")?
            .join(".config/cosmic/com.system76.CosmicBackground/v1/all");

        let config_content = cosmic_background_config(image_path);

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| format!("Failed to create config dir: {e}"))?;
        }
        std::fs::write(&config_path, config_content).map_err(|e| format!("Failed to write config: {e}"))?;

        // COSMIC has no reload call; cosmic-bg re-reads its config when restarted
        let _ = self.run("pkill", &["-TERM", "-x", "cosmic-bg"]);
        std::thread::sleep(std::time::Duration::from_millis(1000));

        if self.run("pgrep", &["-x", "cosmic-bg"]).is_err() {
            host_command("cosmic-bg", &[])
                .spawn()
                .map_err(|e| format!("Failed to start cosmic-bg: {e}"))?;
            std::thread::sleep(std::time::Duration::from_millis(500));
        }
        Ok(())
    }
}

/// Contents of cosmic-bg's `all` output entry showing `image_path`.
fn cosmic_background_config(image_path: &Path) -> String {
    format!(
        r#"(
    output: "all",
    source: Path("{}"),
    filter_by_theme: false,
    rotation_frequency: 300,
    filter_method: Lanczos,
    scaling_mode: Zoom,
    sampling_method: Alphanumeric,
)"#,
        escape_quoted(&image_path.to_string_lossy())
    )
}

/// Escapes `\` and `"` for a double-quoted AppleScript or RON string literal.
fn escape_quoted(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Run(String, Vec<String>),
        Windows(PathBuf),
        Cosmic(PathBuf),
    }

    /// Records every call; programs listed in `failing` exit non-zero.
    #[derive(Clone, Default)]
    struct RecordingBackend {
        calls: Arc<Mutex<Vec<Call>>>,
        failing: Vec<&'static str>,
    }

    impl SystemBackend for RecordingBackend {
        fn run(&self, program: &str, args: &[&str]) -> Result<(), String> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Run(program.to_string(), args.iter().map(|a| a.to_string()).collect()));
            if self.failing.contains(&program) {
                Err(format!("{program} failed"))
            } else {
                Ok(())
            }
        }

        fn set_windows_wallpaper(&self, image_path: &Path) -> Result<(), String> {
            self.calls.lock().unwrap().push(Call::Windows(image_path.to_path_buf()));
            Ok(())
        }

        fn apply_cosmic(&self, image_path: &Path) -> Result<(), String> {
            self.calls.lock().unwrap().push(Call::Cosmic(image_path.to_path_buf()));
            if self.failing.contains(&"cosmic") {
                Err("cosmic-bg config not writable".to_string())
            } else {
                Ok(())
            }
        }
    }

    fn setter(platform: Platform, desktop: LinuxDesktop, backend: &RecordingBackend) -> PlatformSetter {
        PlatformSetter::new(platform, desktop, Box::new(backend.clone()))
    }

    fn image() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test img.jpg");
        std::fs::write(&path, [0xFF, 0xD8, 0xFF]).unwrap();
        (dir, path)
    }

    #[test]
    fn os_names_map_to_platforms() {
        assert_eq!(Platform::from_os_name("windows"), Platform::Windows);
        assert_eq!(Platform::from_os_name("Darwin"), Platform::MacOs);
        assert_eq!(Platform::from_os_name("macos"), Platform::MacOs);
        assert_eq!(Platform::from_os_name("linux"), Platform::Linux);
        assert_eq!(Platform::from_os_name("freebsd"), Platform::Unsupported);
    }

    #[test]
    fn unsupported_platform_touches_nothing() {
        let backend = RecordingBackend::default();
        let (_dir, path) = image();
        assert!(!setter(Platform::Unsupported, LinuxDesktop::Gnome, &backend).apply(&path));
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn windows_uses_the_system_call() {
        let backend = RecordingBackend::default();
        let (_dir, path) = image();
        assert!(setter(Platform::Windows, LinuxDesktop::Gnome, &backend).apply(&path));
        assert_eq!(*backend.calls.lock().unwrap(), vec![Call::Windows(path)]);
    }

    #[test]
    fn macos_sets_every_desktop() {
        let backend = RecordingBackend::default();
        let (_dir, path) = image();
        assert!(setter(Platform::MacOs, LinuxDesktop::Gnome, &backend).apply(&path));

        let calls = backend.calls.lock().unwrap();
        let Call::Run(program, args) = &calls[0] else { panic!("expected a command") };
        assert_eq!(program, "osascript");
        assert!(args[1].contains("every desktop"));
        assert!(args[1].contains(path.to_str().unwrap()));
    }

    #[test]
    fn quotes_in_the_path_are_escaped_for_applescript() {
        let backend = RecordingBackend::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("\"Weird Al\" Yankovic.jpg");
        std::fs::write(&path, [0xFF, 0xD8, 0xFF]).unwrap();
        assert!(setter(Platform::MacOs, LinuxDesktop::Gnome, &backend).apply(&path));

        let calls = backend.calls.lock().unwrap();
        let Call::Run(_, args) = &calls[0] else { panic!("expected a command") };
        assert!(args[1].ends_with("/\\\"Weird Al\\\" Yankovic.jpg\""), "{}", args[1]);
        // "System Events" and the path literal; the title's own quotes are escaped
        assert_eq!(args[1].matches('"').count() - args[1].matches("\\\"").count(), 4);
    }

    #[test]
    fn cosmic_config_escapes_the_path() {
        let config = cosmic_background_config(Path::new("/cache/\"Weird Al\" Yankovic.jpg"));
        assert!(config.contains(r#"source: Path("/cache/\"Weird Al\" Yankovic.jpg"),"#));
        assert_eq!(escape_quoted(r"C:\img"), r"C:\\img");
    }

    #[test]
    fn gnome_sets_the_picture_uri() {
        let backend = RecordingBackend::default();
        let (_dir, path) = image();
        assert!(setter(Platform::Linux, LinuxDesktop::Gnome, &backend).apply(&path));

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let Call::Run(program, args) = &calls[0] else { panic!("expected a command") };
        assert_eq!(program, "gsettings");
        assert_eq!(args[3], format!("file://{}", path.display()));
    }

    #[test]
    fn linux_falls_back_to_feh() {
        let backend = RecordingBackend { failing: vec!["gsettings"], ..Default::default() };
        let (_dir, path) = image();
        assert!(setter(Platform::Linux, LinuxDesktop::Gnome, &backend).apply(&path));

        let calls = backend.calls.lock().unwrap();
        assert_eq!(
            calls[1],
            Call::Run("feh".to_string(), vec!["--bg-scale".to_string(), path.display().to_string()])
        );
    }

    #[test]
    fn cosmic_failure_falls_back_to_feh() {
        let backend = RecordingBackend { failing: vec!["cosmic"], ..Default::default() };
        let (_dir, path) = image();
        assert!(setter(Platform::Linux, LinuxDesktop::Cosmic, &backend).apply(&path));

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls[0], Call::Cosmic(path.clone()));
        assert!(matches!(&calls[1], Call::Run(program, _) if program == "feh"));
    }

    #[test]
    fn linux_reports_failure_when_feh_fails_too() {
        let backend = RecordingBackend { failing: vec!["gsettings", "feh"], ..Default::default() };
        let (_dir, path) = image();
        assert!(!setter(Platform::Linux, LinuxDesktop::Gnome, &backend).apply(&path));
    }

    #[test]
    fn missing_image_is_a_failure() {
        let backend = RecordingBackend::default();
        let dir = tempfile::tempdir().unwrap();
        assert!(!setter(Platform::Linux, LinuxDesktop::Gnome, &backend).apply(&dir.path().join("gone.jpg")));
        assert!(backend.calls.lock().unwrap().is_empty());
    }
}
