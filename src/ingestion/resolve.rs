//! Column resolution: canonical field name -> best raw header.
//!
//! Headers and aliases are compared in a normalised form (trimmed, lower-cased, runs of
//! whitespace / `_` / `-` collapsed to one space), so `" Tipo_de  Cliente "` and
//! `"tipo de cliente"` are the same column.
//!
//! Containment is checked on whole words: `"total venta"` contains `"venta"`, but `"nombre"`
//! does not contain `"mb"`. A header that is an exact spelling of some field's alias is
//! reserved for that field and never matched by containment for any other field, so with
//! `Cliente` present, `"tipo de cliente"` does not claim it.

use serde::Deserialize;

use crate::catalog::Catalog;

/// How a field picks among several candidate headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Alias priority wins: exact matches first (alias by alias), then containment.
    #[default]
    FirstMatch,
    /// Score every (alias, header) pair and keep the strongest.
    BestScore,
}

/// How a header matched an alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchKind {
    /// Normalised forms are equal.
    Exact,
    /// One normalised form contains the other.
    Contains,
}

/// Outcome of resolving one canonical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved {
        /// Header as it appears in the upload.
        header: String,
        /// Column position in the upload.
        index: usize,
        /// Catalog alias that matched.
        alias: String,
        kind: MatchKind,
    },
    Absent,
}

/// One entry of a [`ColumnMapping`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub field: String,
    pub resolution: Resolution,
}

/// Canonical field -> resolved header, in catalog order.
///
/// A pure function of (headers, catalog, policy): the same inputs always give the same mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    fields: Vec<FieldMapping>,
    headers: Vec<String>,
}

impl ColumnMapping {
    pub fn fields(&self) -> &[FieldMapping] {
        &self.fields
    }

    /// Column index for a field, if it resolved.
    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.fields.iter().find(|m| m.field == field).and_then(|m| match &m.resolution {
            Resolution::Resolved { index, .. } => Some(*index),
            Resolution::Absent => None,
        })
    }

    /// Upload header for a field, if it resolved.
    pub fn header_of(&self, field: &str) -> Option<&str> {
        self.fields.iter().find(|m| m.field == field).and_then(|m| match &m.resolution {
            Resolution::Resolved { header, .. } => Some(header.as_str()),
            Resolution::Absent => None,
        })
    }

    /// Fields that matched, with their headers.
    pub fn matched(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .filter_map(|m| match &m.resolution {
                Resolution::Resolved { header, .. } => Some((m.field.clone(), header.clone())),
                Resolution::Absent => None,
            })
            .collect()
    }

    /// Fields no header matched.
    pub fn unmatched_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|m| m.resolution == Resolution::Absent)
            .map(|m| m.field.clone())
            .collect()
    }

    /// Upload headers no field uses.
    pub fn extra_headers(&self) -> Vec<String> {
        self.headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.fields.iter().any(|m| matches!(m.resolution, Resolution::Resolved { index, .. } if index == *i)))
            .map(|(_, h)| h.clone())
            .collect()
    }

    /// Members of `required` that did not resolve.
    pub fn missing_required(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|r| self.index_of(r).is_none())
            .cloned()
            .collect()
    }
}

/// Normalise a header or alias for comparison.
pub fn normalize_header(s: &str) -> String {
    let lowered = s.trim().to_lowercase();
    lowered
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve every catalog field against `headers`.
pub fn resolve_columns(headers: &[String], catalog: &Catalog, policy: MatchPolicy) -> ColumnMapping {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();

    let aliases: Vec<Vec<(String, &str)>> = catalog
        .fields()
        .iter()
        .map(|spec| {
            spec.aliases
                .iter()
                .map(|a| (normalize_header(a), a.as_str()))
                .filter(|(n, _)| !n.is_empty())
                .collect()
        })
        .collect();

    // Fields whose aliases spell each header exactly.
    let exact_owners: Vec<Vec<usize>> = normalized
        .iter()
        .map(|h| {
            aliases
                .iter()
                .enumerate()
                .filter(|(_, field_aliases)| field_aliases.iter().any(|(a, _)| a == h))
                .map(|(f, _)| f)
                .collect()
        })
        .collect();

    let fields = catalog
        .fields()
        .iter()
        .zip(&aliases)
        .enumerate()
        .map(|(f, (spec, field_aliases))| {
            let candidates = Candidates {
                headers: &normalized,
                containable: exact_owners.iter().map(|owners| owners.iter().all(|&o| o == f)).collect(),
            };
            let found = match policy {
                MatchPolicy::FirstMatch => candidates.first_match(field_aliases),
                MatchPolicy::BestScore => candidates.best_score(field_aliases),
            };

            let resolution = match found {
                Some((index, alias, kind)) => Resolution::Resolved {
                    header: headers[index].clone(),
                    index,
                    alias: alias.to_owned(),
                    kind,
                },
                None => Resolution::Absent,
            };
            FieldMapping {
                field: spec.name.clone(),
                resolution,
            }
        })
        .collect();

    ColumnMapping {
        fields,
        headers: headers.to_vec(),
    }
}

/// `needle`'s words appear contiguously in `haystack`'s words.
fn contains_words(haystack: &str, needle: &str) -> bool {
    let hay: Vec<&str> = haystack.split(' ').collect();
    let pin: Vec<&str> = needle.split(' ').collect();
    !pin.is_empty() && hay.windows(pin.len()).any(|w| w == pin.as_slice())
}

/// Headers as seen by one field.
struct Candidates<'h> {
    headers: &'h [String],
    /// `containable[i]`: header `i` is not reserved by another field's exact alias.
    containable: Vec<bool>,
}

impl Candidates<'_> {
    fn kind(&self, i: usize, alias: &str) -> Option<MatchKind> {
        let h = &self.headers[i];
        if h.is_empty() {
            None
        } else if h == alias {
            Some(MatchKind::Exact)
        } else if self.containable[i] && (contains_words(h, alias) || contains_words(alias, h)) {
            Some(MatchKind::Contains)
        } else {
            None
        }
    }

    fn first_match<'a>(&self, aliases: &[(String, &'a str)]) -> Option<(usize, &'a str, MatchKind)> {
        for wanted in [MatchKind::Exact, MatchKind::Contains] {
            for (alias, raw) in aliases {
                if let Some(i) = (0..self.headers.len()).find(|&i| self.kind(i, alias) == Some(wanted)) {
                    return Some((i, raw, wanted));
                }
            }
        }
        None
    }

    fn best_score<'a>(&self, aliases: &[(String, &'a str)]) -> Option<(usize, &'a str, MatchKind)> {
        // Lower key is better: (kind, length difference, alias priority, header position).
        let mut best: Option<((MatchKind, usize, usize, usize), &'a str)> = None;
        for (priority, (alias, raw)) in aliases.iter().enumerate() {
            for i in 0..self.headers.len() {
                let Some(kind) = self.kind(i, alias) else {
                    continue;
                };
                let key = (kind, self.headers[i].len().abs_diff(alias.len()), priority, i);
                if best.as_ref().is_none_or(|(k, _)| key < *k) {
                    best = Some((key, raw));
                }
            }
        }
        best.map(|((kind, _, _, i), raw)| (i, raw, kind))
    }
}
