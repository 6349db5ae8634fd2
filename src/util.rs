use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub fn format_seconds(seconds: f64) -> String {
    if seconds < 1.0 {
        format!("{:.0} ms", seconds * 1000.0)
    } else {
        format!("{seconds:.2} s")
    }
}

/// Shortens `text` to at most `max` characters, ending in an ellipsis.
pub fn truncate_label(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Seed derived from the token sequence, so the same input lays out the
/// same way every time.
pub fn stable_seed<T: Hash>(items: &[T]) -> u64 {
    let mut hasher = DefaultHasher::new();
    items.hash(&mut hasher);
    hasher.finish()
}

pub fn vector_norm(values: &[f32]) -> f32 {
    values.iter().map(|value| value * value).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_and_truncates() {
        assert_eq!(format_seconds(0.25), "250 ms");
        assert_eq!(format_seconds(1.5), "1.50 s");
        assert_eq!(truncate_label("attention", 5), "atte…");
        assert_eq!(truncate_label("dog", 5), "dog");
    }

    #[test]
    fn seed_is_stable_per_input() {
        let a = ["[CLS]", "hi"];
        assert_eq!(stable_seed(&a), stable_seed(&a));
        assert_ne!(stable_seed(&a), stable_seed(&["[CLS]", "ho"]));
        assert_eq!(vector_norm(&[3.0, 4.0]), 5.0);
    }
}
