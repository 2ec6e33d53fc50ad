//! Schema constants shared by the stores
//!
//! The tables themselves live in `migrations/*.sql`.

/// Default permission strings
pub mod permissions {
    pub const DEFAULT_FILE: &str = "rw-r--r--"; // 644
    pub const EXECUTABLE_FILE: &str = "rwxr-xr-x"; // 755
    pub const DEFAULT_DIR: &str = "rwxr-xr-x"; // 755
}

/// Values of the `fs_entries.kind` column
pub mod kind {
    pub const FILE: &str = "file";
    pub const DIRECTORY: &str = "directory";
}

/// Values of the `accounts.role` column
pub mod role {
    pub const USER: &str = "user";
    pub const ADMIN: &str = "admin";
}

/// Values of the `login_history.action` column
pub mod action {
    pub const REGISTER: &str = "register";
    pub const LOGIN: &str = "login";
    pub const LOGOUT: &str = "logout";
    pub const PASSWORD_RESET: &str = "password_reset";
    pub const PASSWORD_CHANGE: &str = "password_change";
}

/// Root of every namespace
pub const ROOT_PATH: &str = "/";

/// Parent of every home directory
pub const HOME_ROOT: &str = "/home";

/// Subdirectories created in every new home directory
pub const HOME_SUBDIRS: &[&str] = &["documents", "downloads", ".config"];

/// Home directory for a username
pub fn home_dir(username: &str) -> String {
    format!("{HOME_ROOT}/{username}")
}
