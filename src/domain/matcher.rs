use crate::domain::model::MatchKind;
use std::cmp::Ordering;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Case- and diacritics-insensitive form used on both sides of a match.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchScore {
    pub kind: MatchKind,
    pub distance: usize,
    pub field_len: usize,
}

impl MatchScore {
    /// Score for a record the remote service matched on its own terms.
    pub fn weakest(field_len: usize) -> Self {
        Self {
            kind: MatchKind::Fuzzy,
            distance: usize::MAX,
            field_len,
        }
    }

    pub fn score(&self) -> u32 {
        match self.kind {
            MatchKind::Exact => 300,
            MatchKind::Prefix => 200,
            MatchKind::Substring => 100,
            MatchKind::Fuzzy => 99u32.saturating_sub(self.distance.min(99) as u32),
        }
    }

    // Greater is better
    fn strength_cmp(&self, other: &Self) -> Ordering {
        self.kind
            .cmp(&other.kind)
            .then_with(|| other.distance.cmp(&self.distance))
            .then_with(|| other.field_len.cmp(&self.field_len))
    }
}

/// One rankable row: its identity code and pre-normalized fields.
pub struct Candidate<'a> {
    pub index: usize,
    pub code: &'a str,
    pub fields: &'a [String],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ranked {
    pub index: usize,
    pub score: MatchScore,
}

/// Tiered literal matcher: exact, prefix, substring, then bounded edit
/// distance. Query text is only ever compared as a plain string.
#[derive(Debug, Clone, Copy)]
pub struct FuzzyMatcher {
    max_distance: usize,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self { max_distance: 2 }
    }
}

impl FuzzyMatcher {
    pub const MIN_FUZZY_LEN: usize = 3;

    pub fn new(max_distance: usize) -> Self {
        Self { max_distance }
    }

    fn threshold(&self, query_len: usize) -> usize {
        if query_len < Self::MIN_FUZZY_LEN {
            return 0;
        }
        self.max_distance.min(query_len / 3)
    }

    /// Best match of an already normalized query against one field.
    pub fn match_field(&self, query: &str, field: &str) -> Option<MatchScore> {
        if query.is_empty() || field.is_empty() {
            return None;
        }
        let field_len = field.chars().count();
        let tiered = |kind| {
            Some(MatchScore {
                kind,
                distance: 0,
                field_len,
            })
        };
        if field == query {
            return tiered(MatchKind::Exact);
        }
        if field.starts_with(query) {
            return tiered(MatchKind::Prefix);
        }
        if field.contains(query) {
            return tiered(MatchKind::Substring);
        }

        let query_len = query.chars().count();
        let threshold = self.threshold(query_len);
        if threshold == 0 {
            return None;
        }
        let mut best: Option<usize> = None;
        for part in std::iter::once(field).chain(field.split(' ')) {
            let part_len = part.chars().count();
            if part_len.abs_diff(query_len) > threshold {
                continue;
            }
            let d = strsim::levenshtein(query, part);
            if d <= threshold && best.map_or(true, |b| d < b) {
                best = Some(d);
            }
        }
        best.map(|distance| MatchScore {
            kind: MatchKind::Fuzzy,
            distance,
            field_len,
        })
    }

    /// Best match over all fields of a row.
    pub fn match_fields<'a, I>(&self, query: &str, fields: I) -> Option<MatchScore>
    where
        I: IntoIterator<Item = &'a str>,
    {
        fields
            .into_iter()
            .filter_map(|field| self.match_field(query, field))
            .max_by(|a, b| a.strength_cmp(b))
    }

    /// Ranks candidates against a raw query; at most `limit` results.
    ///
    /// Order: score descending, then shorter matched field, then identity
    /// code ascending.
    pub fn rank<'a, I>(&self, query: &str, candidates: I, limit: usize) -> Vec<Ranked>
    where
        I: IntoIterator<Item = Candidate<'a>>,
    {
        let query = normalize(query);
        if query.is_empty() || limit == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(Ranked, &str)> = candidates
            .into_iter()
            .filter_map(|c| {
                self.match_fields(&query, c.fields.iter().map(String::as_str))
                    .map(|score| {
                        (
                            Ranked {
                                index: c.index,
                                score,
                            },
                            c.code,
                        )
                    })
            })
            .collect();
        scored.sort_by(|(a, code_a), (b, code_b)| {
            b.score
                .score()
                .cmp(&a.score.score())
                .then_with(|| a.score.field_len.cmp(&b.score.field_len))
                .then_with(|| code_a.cmp(code_b))
        });
        scored.truncate(limit);
        scored.into_iter().map(|(ranked, _)| ranked).collect()
    }
}
