use indicatif::{ProgressBar, ProgressStyle};

pub mod applications;
pub mod config;
pub mod error;
pub mod name;
pub mod services;
pub mod stream;
pub mod transport;

pub fn default_spinner() -> ProgressBar {
    let spinner_style = ProgressStyle::with_template("{spinner} {prefix:.bold.dim} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

    let progress = ProgressBar::new_spinner();
    progress.set_style(spinner_style);
    progress.enable_steady_tick(std::time::Duration::from_millis(50));
    progress
}
