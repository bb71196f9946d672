//! Helpers for showing tokens in a terminal

/// Make whitespace in a token visible: space -> `·`, newline -> `↵`, tab -> `→`
pub fn visible_token(token: &str) -> String {
    token
        .chars()
        .map(|c| match c {
            ' ' => '·',
            '\n' => '↵',
            '\t' => '→',
            other => other,
        })
        .collect()
}

/// Fixed-width probability bar, `width` cells for 100%
pub fn probability_bar(pct: f64, width: usize) -> String {
    let filled = ((pct.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_token() {
        assert_eq!(visible_token(" world"), "·world");
        assert_eq!(visible_token("a\nb\t"), "a↵b→");
    }

    #[test]
    fn test_probability_bar() {
        assert_eq!(probability_bar(50.0, 4), "██░░");
        assert_eq!(probability_bar(150.0, 2), "██");
        assert_eq!(probability_bar(-3.0, 2), "░░");
    }
}
