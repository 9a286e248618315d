//! Where tvplayer keeps its files and how it finds mpv.
//!
//! `TVPLAYER_HOME` overrides both the config and data directories, which is
//! handy for portable installs and for tests.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "tvplayer";
const HOME_ENV: &str = "TVPLAYER_HOME";

fn home_override() -> Option<PathBuf> {
    std::env::var_os(HOME_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Logs and mpv's stderr capture live here.
pub fn data_dir() -> PathBuf {
    if let Some(home) = home_override() {
        return home.join("data");
    }
    // XDG layout on unix; Windows gets %LOCALAPPDATA%
    let base = if cfg!(windows) {
        dirs::data_local_dir()
    } else {
        dirs::home_dir().map(|h| h.join(".local").join("share"))
    };
    base.unwrap_or_else(std::env::temp_dir).join(APP_DIR)
}

pub fn config_dir() -> PathBuf {
    if let Some(home) = home_override() {
        return home;
    }
    let base = if cfg!(windows) {
        dirs::config_dir()
    } else {
        dirs::home_dir().map(|h| h.join(".config"))
    };
    base.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
}

/// IPC endpoint name, unique per process so two players never share a socket.
pub fn mpv_socket_name() -> String {
    let name = format!("tvplayer-mpv-{}", std::process::id());
    if cfg!(windows) {
        name
    } else {
        std::env::temp_dir()
            .join(format!("{}.sock", name))
            .display()
            .to_string()
    }
}

pub fn mpv_socket_arg() -> String {
    if cfg!(windows) {
        format!("--input-ipc-server=\\\\.\\pipe\\{}", mpv_socket_name())
    } else {
        format!("--input-ipc-server={}", mpv_socket_name())
    }
}

fn mpv_binary_name() -> &'static OsStr {
    OsStr::new(if cfg!(windows) { "mpv.exe" } else { "mpv" })
}

/// Locate mpv: an explicit override first, then beside the executable, then
/// every directory on `PATH`.
pub fn find_mpv_binary(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit.filter(|p| p.exists()) {
        return Some(path.to_path_buf());
    }

    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    let path_dirs = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).collect::<Vec<_>>())
        .unwrap_or_default();

    beside_exe
        .into_iter()
        .chain(path_dirs)
        .map(|dir| dir.join(mpv_binary_name()))
        .find(|candidate| candidate.is_file())
}
