//! HTML stripping and word counting.
//!
//! `word_count` over the four content fields is the source of truth for
//! `PageContent.word_count`: whitespace-separated tokens after tag stripping.

use std::sync::OnceLock;

use regex::Regex;

use seoforge_types::PageContent;

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]*>").expect("static regex"))
}

/// Remove HTML tags, leaving the text content.
pub fn strip_html(html: &str) -> String {
    tag_pattern().replace_all(html, " ").to_string()
}

/// Whitespace-separated token count after tag stripping.
pub fn word_count(text: &str) -> u32 {
    strip_html(text).split_whitespace().count() as u32
}

/// Word count across the four content fields of a page.
pub fn content_word_count(content: &PageContent) -> u32 {
    content
        .content_fields()
        .iter()
        .filter_map(|(_, value)| *value)
        .map(word_count)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn strips_tags_and_counts_words() {
        assert_eq!(word_count("<p>Hello <b>world</b></p>"), 2);
        assert_eq!(word_count("plain text here"), 3);
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("<br/><hr>"), 0);
    }

    #[test]
    fn adjacent_tags_do_not_join_words() {
        // Tag boundary must count as whitespace, not concatenate.
        assert_eq!(word_count("<p>one</p><p>two</p>"), 2);
    }

    #[test]
    fn content_word_count_sums_all_four_fields() {
        let mut content = PageContent::new(Uuid::new_v4());
        content.page_title = Some("Coffee Storage Guide".to_string());
        content.meta_description = Some("How to store coffee".to_string());
        content.top_description = Some("<p>Keep beans fresh</p>".to_string());
        content.bottom_description = Some("Buy airtight".to_string());
        assert_eq!(content_word_count(&content), 12);
    }
}
