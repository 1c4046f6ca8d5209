const KB: i64 = 1024;
const MB: i64 = 1024 * KB;
const GB: i64 = 1024 * MB;

/// Human readable size using 1024-based units, e.g. `1.5 MB`.
pub fn format_bytes(bytes: i64) -> String {
    let value = bytes.max(0);
    if value < KB {
        format!("{} B", value)
    } else if value < MB {
        format!("{:.1} KB", value as f64 / KB as f64)
    } else if value < GB {
        format!("{:.1} MB", value as f64 / MB as f64)
    } else {
        format!("{:.1} GB", value as f64 / GB as f64)
    }
}

pub fn plan_display_name(quota_bytes: i64) -> &'static str {
    if quota_bytes <= 5 * GB {
        "Free Plan"
    } else if quota_bytes <= 100 * GB {
        "Pro Plan"
    } else {
        "Enterprise Plan"
    }
}
