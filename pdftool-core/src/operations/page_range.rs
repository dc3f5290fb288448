//! Page range parsing
//!
//! Grammar: comma-separated tokens, each a 1-based page number or an
//! inclusive `start-end` span with `start <= end`. Whitespace around tokens
//! and around the dash is ignored. Request order and duplicates are kept.

use std::fmt;
use std::str::FromStr;

use crate::error::{PdfError, Result};

/// Highest page number accepted by the parser. A PDF cannot address more
/// indirect objects than this, so it bounds any real page count.
pub const MAX_PAGE_NUMBER: u32 = 8_388_607;

/// A parsed page selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRange {
    /// Inclusive spans in request order; a single page is `(n, n)`.
    spans: Vec<(u32, u32)>,
}

impl PageRange {
    /// Parses a selection such as `"1,3-5,8"`.
    pub fn parse(spec: &str) -> Result<Self> {
        if spec.trim().is_empty() {
            return Err(syntax(spec));
        }
        let spans = spec
            .split(',')
            .map(parse_token)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { spans })
    }

    /// Every page of a document with `page_count` pages.
    pub fn all(page_count: u32) -> Self {
        let spans = if page_count == 0 {
            Vec::new()
        } else {
            vec![(1, page_count)]
        };
        Self { spans }
    }

    /// Page numbers in request order, duplicates included.
    pub fn pages(&self) -> Vec<u32> {
        self.spans
            .iter()
            .flat_map(|&(start, end)| start..=end)
            .collect()
    }

    /// Distinct page numbers, ascending.
    pub fn unique_sorted(&self) -> Vec<u32> {
        let mut pages = self.pages();
        pages.sort_unstable();
        pages.dedup();
        pages
    }

    /// Number of pages selected, duplicates included.
    pub fn len(&self) -> usize {
        self.spans
            .iter()
            .map(|&(start, end)| (end - start) as usize + 1)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Checks the selection against a document. Every page number beyond
    /// `page_count` is reported in one error, as merged runs.
    pub fn validate(&self, page_count: u32) -> Result<()> {
        let mut outside: Vec<(u32, u32)> = self
            .spans
            .iter()
            .filter(|&&(_, end)| end > page_count)
            .map(|&(start, end)| (start.max(page_count + 1), end))
            .collect();
        if outside.is_empty() {
            return Ok(());
        }
        outside.sort_unstable();
        Err(PdfError::PageOutOfRange {
            spans: merge_spans(outside),
            page_count,
        })
    }
}

impl FromStr for PageRange {
    type Err = PdfError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, &(start, end)) in self.spans.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            if start == end {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}-{end}")?;
            }
        }
        Ok(())
    }
}

/// Merges sorted spans that overlap or touch.
fn merge_spans(sorted: Vec<(u32, u32)>) -> Vec<(u32, u32)> {
    let mut merged: Vec<(u32, u32)> = Vec::with_capacity(sorted.len());
    for (start, end) in sorted {
        match merged.last_mut() {
            Some(last) if start <= last.1.saturating_add(1) => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

fn syntax(token: &str) -> PdfError {
    PdfError::InvalidPageRangeSyntax {
        token: token.trim().to_string(),
    }
}

fn parse_token(token: &str) -> Result<(u32, u32)> {
    let trimmed = token.trim();
    let (start, end) = match trimmed.split_once('-') {
        Some((start, end)) => (parse_number(start, token)?, parse_number(end, token)?),
        None => {
            let page = parse_number(trimmed, token)?;
            (page, page)
        }
    };
    if start > end {
        return Err(syntax(token));
    }
    Ok((start, end))
}

fn parse_number(text: &str, token: &str) -> Result<u32> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(syntax(token));
    }
    match text.parse::<u32>() {
        Ok(page) if (1..=MAX_PAGE_NUMBER).contains(&page) => Ok(page),
        _ => Err(syntax(token)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn token_of(error: PdfError) -> String {
        match error {
            PdfError::InvalidPageRangeSyntax { token } => token,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_mixed_tokens_keep_order_and_duplicates() {
        let range = PageRange::parse("3, 1-2 ,3,5 - 6").unwrap();
        assert_eq!(range.pages(), vec![3, 1, 2, 3, 5, 6]);
        assert_eq!(range.unique_sorted(), vec![1, 2, 3, 5, 6]);
        assert_eq!(range.len(), 6);
        assert_eq!(range.to_string(), "3,1-2,3,5-6");
    }

    #[test]
    fn test_reversed_range_names_token() {
        let error = PageRange::parse("1,5-3").unwrap_err();
        assert_eq!(token_of(error), "5-3");
    }

    #[test]
    fn test_zero_is_rejected() {
        assert_eq!(token_of(PageRange::parse("0-2").unwrap_err()), "0-2");
        assert_eq!(token_of(PageRange::parse("0").unwrap_err()), "0");
    }

    #[test]
    fn test_empty_spec_and_empty_token() {
        assert_eq!(token_of(PageRange::parse("").unwrap_err()), "");
        assert_eq!(token_of(PageRange::parse("   ").unwrap_err()), "");
        assert_eq!(token_of(PageRange::parse("1,,2").unwrap_err()), "");
        assert_eq!(token_of(PageRange::parse("1,").unwrap_err()), "");
    }

    #[test]
    fn test_garbage_tokens() {
        for spec in ["a", "1-", "-3", "1-2-3", "+4", "2.5", "1 2", "99999999999"] {
            assert!(
                matches!(
                    PageRange::parse(spec),
                    Err(PdfError::InvalidPageRangeSyntax { .. })
                ),
                "{spec} should be rejected"
            );
        }
    }

    /// Consecutive runs of sorted, distinct pages.
    fn runs(pages: &[u32]) -> Vec<(u32, u32)> {
        let mut runs: Vec<(u32, u32)> = Vec::new();
        for &page in pages {
            match runs.last_mut() {
                Some(last) if last.1 + 1 == page => last.1 = page,
                _ => runs.push((page, page)),
            }
        }
        runs
    }

    #[test]
    fn test_validate_reports_every_page_outside() {
        let range = PageRange::parse("2,7,4-6,9,7").unwrap();
        match range.validate(5).unwrap_err() {
            PdfError::PageOutOfRange { spans, page_count } => {
                assert_eq!(spans, vec![(6, 7), (9, 9)]);
                assert_eq!(page_count, 5);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(PageRange::parse("1-5").unwrap().validate(5).is_ok());
    }

    #[test]
    fn test_huge_span_past_end_stays_compact() {
        let range = PageRange::parse("1-8000000,2-9,8000000").unwrap();
        let error = range.validate(3).unwrap_err();
        match &error {
            PdfError::PageOutOfRange { spans, page_count } => {
                assert_eq!(spans, &vec![(4, 8_000_000)]);
                assert_eq!(*page_count, 3);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(
            error.to_string(),
            "Pages 4-8000000 out of range (document has 3 pages)"
        );
    }

    #[test]
    fn test_merge_spans() {
        assert_eq!(
            merge_spans(vec![(1, 3), (2, 5), (6, 6), (9, 10)]),
            vec![(1, 6), (9, 10)]
        );
        assert_eq!(merge_spans(Vec::new()), Vec::<(u32, u32)>::new());
    }

    #[test]
    fn test_all() {
        assert_eq!(PageRange::all(3).pages(), vec![1, 2, 3]);
        assert!(PageRange::all(0).is_empty());
    }

    proptest! {
        #[test]
        fn prop_listed_pages_parse_back(pages in prop::collection::vec(1u32..500, 1..20)) {
            let spec = pages.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
            let range = PageRange::parse(&spec).unwrap();
            prop_assert_eq!(range.pages(), pages);
        }

        #[test]
        fn prop_spans_expand_inclusively(start in 1u32..1000, length in 0u32..50) {
            let end = start + length;
            let range = PageRange::parse(&format!(" {start} - {end} ")).unwrap();
            prop_assert_eq!(range.len(), length as usize + 1);
            prop_assert_eq!(range.pages().first().copied(), Some(start));
            prop_assert_eq!(range.pages().last().copied(), Some(end));
        }

        #[test]
        fn prop_reversed_spans_rejected(start in 2u32..1000, gap in 1u32..100) {
            let end = start.saturating_sub(gap).max(1);
            prop_assume!(end < start);
            let spec = format!("{start}-{end}");
            prop_assert!(
                matches!(
                    PageRange::parse(&spec),
                    Err(PdfError::InvalidPageRangeSyntax { .. })
                ),
                "reversed span accepted"
            );
        }

        #[test]
        fn prop_validation_matches_page_count(pages in prop::collection::vec(1u32..40, 1..10), count in 1u32..30) {
            let spec = pages.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
            let range = PageRange::parse(&spec).unwrap();
            let mut outside: Vec<u32> = pages.iter().copied().filter(|&p| p > count).collect();
            outside.sort_unstable();
            outside.dedup();
            let expected = runs(&outside);
            match range.validate(count) {
                Ok(()) => prop_assert!(expected.is_empty()),
                Err(PdfError::PageOutOfRange { spans, .. }) => prop_assert_eq!(spans, expected),
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }
        }
    }
}
