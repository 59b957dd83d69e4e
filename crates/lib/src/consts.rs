/// Application name used for default directories.
pub const APP_NAME: &str = "externa";
