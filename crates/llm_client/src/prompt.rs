/// Escape `$$` so an embedded SQL dollar-quoted body can't be mistaken for
/// a dollar-quoted argument's own delimiters when a prompt carries
/// converted/repaired SQL text (SPEC_FULL.md §4.3, §9). Every prompt
/// builder that embeds SQL-derived text calls this before splicing it in.
pub fn escape_dollar_quote(text: &str) -> String {
    text.replace("$$", "$ $")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_dollar_quote_delimiters() {
        assert_eq!(escape_dollar_quote("$$body$$"), "$ $body$ $");
    }
}
