use indicatif::{ProgressBar, ProgressStyle};

/// Byte-count progress bar for a transfer, pre-positioned so resumed
/// transfers start where the partial file left off
pub fn transfer_bar(label: &str, total: u64, position: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template(
            "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );
    bar.set_message(label.to_string());
    bar.set_position(position);
    bar
}
