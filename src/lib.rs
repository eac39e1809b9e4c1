pub mod arena;
pub mod error;
pub mod infer;
pub mod probe;

pub use error::ProbeError;
pub use infer::{CacheInfo, characterize};

/// Convert number of bytes to formatted string
pub fn format_size(bytes: u64) -> String {
    const GB: u64 = 1024 * 1024 * 1024;
    const MB: u64 = 1024 * 1024;
    const KB: u64 = 1024;

    if bytes >= GB {
        format!("{} GiB", bytes / GB)
    } else if bytes >= MB {
        format!("{} MiB", bytes / MB)
    } else if bytes >= KB {
        format!("{} KiB", bytes / KB)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_size_picks_the_right_unit() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(256 * 1024), "256 KiB");
        assert_eq!(format_size(3 * 1024 * 1024), "3 MiB");
        assert_eq!(format_size(1 << 30), "1 GiB");
    }
}
