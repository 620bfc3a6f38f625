use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // `regex` has no look-behind, so the leading boundary is matched explicitly.
    static ref MENTION_REGEX: Regex =
        Regex::new(r"(?:^|[^A-Za-z0-9_])@([A-Za-z0-9_]{3,30})\b").unwrap();
}

/// Extract the distinct usernames mentioned in `text`, in order of first
/// appearance and lowercased.
///
/// A mention is `@` followed by 3 to 30 username characters, not glued to a
/// preceding word character, so e-mail addresses are not picked up.
///
/// ```
/// use eventshare::mentions::extract_mentions;
///
/// let names = extract_mentions("Picnic with @Ana and @bob_99, ping @ana again");
/// assert_eq!(names, vec!["ana", "bob_99"]);
/// ```
pub fn extract_mentions(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();

    for caps in MENTION_REGEX.captures_iter(text) {
        let name = caps[1].to_lowercase();
        if !names.contains(&name) {
            names.push(name);
        }
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_mentions_at_start_and_after_punctuation() {
        assert_eq!(
            extract_mentions("@carol see (@dave), thanks!"),
            vec!["carol", "dave"]
        );
    }

    #[test]
    fn ignores_email_addresses() {
        assert!(extract_mentions("mail me at someone@example.com").is_empty());
    }

    #[test]
    fn ignores_too_short_and_too_long_names() {
        assert!(extract_mentions("hi @ab").is_empty());
        let long = format!("@{}", "x".repeat(31));
        assert!(extract_mentions(&long).is_empty());
    }

    #[test]
    fn adjacent_mentions_need_a_separator() {
        assert_eq!(extract_mentions("@ann @bob"), vec!["ann", "bob"]);
        assert_eq!(extract_mentions("@ann@bob"), vec!["ann"]);
    }

    #[test]
    fn deduplicates_case_insensitively() {
        assert_eq!(extract_mentions("@Eve @EVE @eve"), vec!["eve"]);
    }
}
