const KB: f64 = 1024.0;
const MB: f64 = 1024.0 * 1024.0;
const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Human byte count: KB (1 decimal) below 1 MiB, MB (1 decimal) below 1 GiB,
/// GB (2 decimals) above. These thresholds are part of the UI contract.
pub fn fmt_bytes(n: u64) -> String {
    let f = n as f64;
    if n >= 1024 * 1024 * 1024 {
        format!("{:.2} GB", f / GB)
    } else if n >= 1024 * 1024 {
        format!("{:.1} MB", f / MB)
    } else {
        format!("{:.1} KB", f / KB)
    }
}

pub fn fmt_speed(bps: f64) -> String {
    if !bps.is_finite() || bps <= 0.0 {
        return "-".to_string();
    }
    format!("{}/s", fmt_bytes(bps as u64))
}

/// Two-decimal rounding used for `ProgressSnapshot::percent`.
pub fn round_percent(p: f64) -> f64 {
    (p * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_boundaries() {
        let cases: [(u64, &str); 7] = [
            (0, "0.0 KB"),
            (1023, "1.0 KB"),
            (1024, "1.0 KB"),
            (1_048_575, "1024.0 KB"),
            (1_048_576, "1.0 MB"),
            (1_073_741_823, "1024.0 MB"),
            (1_073_741_824, "1.00 GB"),
        ];
        for (n, want) in cases {
            assert_eq!(fmt_bytes(n), want, "bytes={}", n);
            assert_eq!(fmt_bytes(n), fmt_bytes(n));
        }
    }

    #[test]
    fn mid_range_values() {
        assert_eq!(fmt_bytes(512_000), "500.0 KB");
        assert_eq!(fmt_bytes(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
        assert_eq!(fmt_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn speed() {
        assert_eq!(fmt_speed(0.0), "-");
        assert_eq!(fmt_speed(f64::NAN), "-");
        assert_eq!(fmt_speed(1_572_864.0), "1.5 MB/s");
    }

    #[test]
    fn percent_rounding() {
        assert_eq!(round_percent(512_000.0 / 1_048_576.0 * 100.0), 48.83);
        assert_eq!(round_percent(100.0), 100.0);
    }
}
