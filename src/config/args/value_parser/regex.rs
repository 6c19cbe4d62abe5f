use fancy_regex::Regex;

pub fn parse_regex(pattern: &str) -> Result<String, String> {
    Regex::new(pattern).map_err(|e| e.to_string())?;
    Ok(pattern.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_pattern_passes_through() {
        assert_eq!(parse_regex(r"\.txt$").unwrap(), r"\.txt$");
        assert_eq!(parse_regex("photos/2020").unwrap(), "photos/2020");
    }

    #[test]
    fn lookaround_patterns_are_supported() {
        assert!(parse_regex(r"^(?!tmp/).+").is_ok());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(parse_regex("[invalid").is_err());
        assert!(parse_regex("(unclosed").is_err());
    }
}
