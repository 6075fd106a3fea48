//! Parser for the Prometheus text exposition format (version 0.0.4).
//!
//! Parsing is best effort: a malformed line is skipped and counted while the
//! rest of the payload is still used. Only a payload whose framing is broken
//! (not UTF-8) or in which no sample line survives fails as a whole.

use std::collections::HashMap;
use std::collections::HashSet;

use chrono::DateTime;
use chrono::Utc;
use error_stack::Report;

use crate::errors::ScrapeError;
use crate::model::Bucket;
use crate::model::Labels;
use crate::model::MetricFamily;
use crate::model::MetricKind;
use crate::model::Sample;
use crate::model::SampleValue;

const BUCKET_LABEL: &str = "le";
const QUANTILE_LABEL: &str = "quantile";

/// Outcome of parsing one payload.
#[derive(Debug, Default)]
pub struct ParseReport {
    pub families: Vec<MetricFamily>,
    /// Sample and TYPE lines that were rejected.
    pub skipped_lines: usize,
    /// Non-comment, non-blank lines seen.
    pub sample_lines: usize,
}

/// Parses an exposition payload. Every resulting sample carries `timestamp`.
pub fn parse(payload: &[u8], timestamp: DateTime<Utc>) -> Result<ParseReport, Report<ScrapeError>> {
    let text = std::str::from_utf8(payload).map_err(|e| {
        Report::new(ScrapeError::Parse {
            message: format!("payload is not valid UTF-8: {e}"),
        })
    })?;

    let mut state = ParserState::default();
    let mut report = ParseReport::default();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let result = if let Some(comment) = line.strip_prefix('#') {
            state.comment(comment.trim_start())
        } else {
            report.sample_lines += 1;
            parse_sample_line(line).and_then(|parsed| state.sample(parsed))
        };
        if let Err(reason) = result {
            tracing::debug!(line = idx + 1, "skipping exposition line: {reason}");
            report.skipped_lines += 1;
        }
    }

    let accepted = state.accepted;
    report.families = state.finish(timestamp);

    if report.sample_lines > 0 && accepted == 0 {
        return Err(Report::new(ScrapeError::Parse {
            message: format!(
                "all {} sample lines were malformed",
                report.sample_lines
            ),
        }));
    }

    Ok(report)
}

#[derive(Debug, Default)]
struct Grouped {
    entries: Vec<Bucket>,
    sum: Option<f64>,
    count: Option<f64>,
}

#[derive(Debug)]
struct FamilyBuilder {
    name: String,
    kind: MetricKind,
    help: Option<String>,
    scalars: Vec<(Labels, f64)>,
    scalar_labels: HashSet<Labels>,
    groups: Vec<(Labels, Grouped)>,
    group_index: HashMap<Labels, usize>,
}

impl FamilyBuilder {
    fn new(name: &str, kind: MetricKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            help: None,
            scalars: Vec::new(),
            scalar_labels: HashSet::new(),
            groups: Vec::new(),
            group_index: HashMap::new(),
        }
    }

    fn has_samples(&self) -> bool {
        !self.scalars.is_empty() || !self.groups.is_empty()
    }

    fn group(&mut self, labels: Labels) -> &mut Grouped {
        let idx = match self.group_index.get(&labels) {
            Some(idx) => *idx,
            None => {
                let idx = self.groups.len();
                self.group_index.insert(labels.clone(), idx);
                self.groups.push((labels, Grouped::default()));
                idx
            }
        };
        &mut self.groups[idx].1
    }

    fn build(self, timestamp: DateTime<Utc>) -> MetricFamily {
        let kind = self.kind;
        let samples = match kind {
            MetricKind::Histogram | MetricKind::Summary => self
                .groups
                .into_iter()
                .map(|(labels, mut grouped)| {
                    grouped.entries.sort_by(|a, b| a.bound.total_cmp(&b.bound));
                    let value = if kind == MetricKind::Histogram {
                        SampleValue::Histogram {
                            buckets: grouped.entries,
                            sum: grouped.sum,
                            count: grouped.count,
                        }
                    } else {
                        SampleValue::Summary {
                            quantiles: grouped.entries,
                            sum: grouped.sum,
                            count: grouped.count,
                        }
                    };
                    Sample {
                        labels,
                        value,
                        timestamp,
                    }
                })
                .collect(),
            _ => self
                .scalars
                .into_iter()
                .map(|(labels, v)| Sample {
                    labels,
                    value: SampleValue::Scalar(v),
                    timestamp,
                })
                .collect(),
        };
        MetricFamily {
            name: self.name,
            kind,
            help: self.help,
            samples,
        }
    }
}

#[derive(Debug, Default)]
struct ParserState {
    families: Vec<FamilyBuilder>,
    index: HashMap<String, usize>,
    typed: HashMap<String, MetricKind>,
    accepted: usize,
}

impl ParserState {
    fn family(&mut self, name: &str, kind: MetricKind) -> &mut FamilyBuilder {
        let idx = match self.index.get(name) {
            Some(idx) => *idx,
            None => {
                let idx = self.families.len();
                self.index.insert(name.to_string(), idx);
                self.families.push(FamilyBuilder::new(name, kind));
                idx
            }
        };
        &mut self.families[idx]
    }

    fn comment(&mut self, comment: &str) -> Result<(), String> {
        let mut parts = comment.splitn(3, char::is_whitespace);
        match parts.next() {
            Some("TYPE") => {
                let name = parts.next().ok_or("TYPE line without metric name")?;
                let keyword = parts.next().map(str::trim).unwrap_or_default();
                if !is_metric_name(name) {
                    return Err(format!("invalid metric name `{name}` in TYPE line"));
                }
                if self.typed.contains_key(name) {
                    return Err(format!("duplicate TYPE line for `{name}`"));
                }
                let kind = MetricKind::from_type_keyword(keyword);
                if self.index.get(name).is_some_and(|i| self.families[*i].has_samples()) {
                    return Err(format!("TYPE line for `{name}` after its samples"));
                }
                self.typed.insert(name.to_string(), kind);
                self.family(name, kind).kind = kind;
                Ok(())
            }
            Some("HELP") => {
                let Some(name) = parts.next() else {
                    return Ok(());
                };
                let text = unescape_help(parts.next().unwrap_or_default().trim());
                let kind = self.typed.get(name).copied().unwrap_or(MetricKind::Untyped);
                self.family(name, kind).help = Some(text);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Maps a sample name to (family name, role) using the declared TYPEs.
    fn resolve(&self, name: &str) -> (String, Role) {
        let typed = |base: &str| self.typed.get(base).copied();

        match typed(name) {
            Some(MetricKind::Histogram) => return (name.to_string(), Role::Invalid),
            Some(MetricKind::Summary) => return (name.to_string(), Role::Quantile),
            Some(_) => return (name.to_string(), Role::Scalar),
            None => {}
        }
        if let Some(base) = name.strip_suffix("_bucket") {
            if typed(base) == Some(MetricKind::Histogram) {
                return (base.to_string(), Role::Bucket);
            }
        }
        for (suffix, role) in [("_sum", Role::Sum), ("_count", Role::Count)] {
            if let Some(base) = name.strip_suffix(suffix) {
                if matches!(
                    typed(base),
                    Some(MetricKind::Histogram) | Some(MetricKind::Summary)
                ) {
                    return (base.to_string(), role);
                }
            }
        }
        (name.to_string(), Role::Scalar)
    }

    fn sample(&mut self, parsed: ParsedLine) -> Result<(), String> {
        let (family_name, role) = self.resolve(&parsed.name);
        let kind = self
            .typed
            .get(&family_name)
            .copied()
            .unwrap_or(MetricKind::Untyped);
        let mut labels = parsed.labels;
        let family = self.family(&family_name, kind);

        match role {
            Role::Invalid => {
                return Err(format!(
                    "bare sample `{}` for histogram family",
                    parsed.name
                ))
            }
            Role::Scalar => {
                if !family.scalar_labels.insert(labels.clone()) {
                    return Err(format!("duplicate series for `{}`", parsed.name));
                }
                family.scalars.push((labels, parsed.value));
            }
            Role::Bucket => {
                let label = labels
                    .remove(BUCKET_LABEL)
                    .ok_or_else(|| format!("bucket of `{family_name}` without `le` label"))?;
                push_bound(family.group(labels), &family_name, label, parsed.value)?;
            }
            Role::Quantile => {
                let label = labels.remove(QUANTILE_LABEL).ok_or_else(|| {
                    format!("summary sample of `{family_name}` without `quantile` label")
                })?;
                push_bound(family.group(labels), &family_name, label, parsed.value)?;
            }
            Role::Sum => set_once(&mut family.group(labels).sum, &parsed.name, parsed.value)?,
            Role::Count => set_once(&mut family.group(labels).count, &parsed.name, parsed.value)?,
        }

        self.accepted += 1;
        Ok(())
    }

    fn finish(self, timestamp: DateTime<Utc>) -> Vec<MetricFamily> {
        self.families
            .into_iter()
            .filter(FamilyBuilder::has_samples)
            .map(|f| f.build(timestamp))
            .collect()
    }
}

/// Adds a bucket or quantile; a bound may appear once per label set.
fn push_bound(group: &mut Grouped, family: &str, label: String, value: f64) -> Result<(), String> {
    let bound = parse_float(&label)
        .filter(|b| !b.is_nan())
        .ok_or_else(|| format!("invalid bound `{label}` for `{family}`"))?;
    if group.entries.iter().any(|b| b.bound == bound) {
        return Err(format!("duplicate bound `{label}` for `{family}`"));
    }
    group.entries.push(Bucket::new(bound, label, value));
    Ok(())
}

fn set_once(slot: &mut Option<f64>, name: &str, value: f64) -> Result<(), String> {
    if slot.is_some() {
        return Err(format!("duplicate series for `{name}`"));
    }
    *slot = Some(value);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Scalar,
    Bucket,
    Quantile,
    Sum,
    Count,
    Invalid,
}

#[derive(Debug)]
struct ParsedLine {
    name: String,
    labels: Labels,
    value: f64,
}

fn is_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn parse_float(token: &str) -> Option<f64> {
    match token {
        "+Inf" | "Inf" | "+inf" | "inf" => Some(f64::INFINITY),
        "-Inf" | "-inf" => Some(f64::NEG_INFINITY),
        "NaN" | "nan" => Some(f64::NAN),
        _ => token.parse().ok(),
    }
}

fn unescape_help(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

struct Cursor<'a> {
    line: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<char> {
        self.line[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c == ' ' || c == '\t') {
            self.pos += 1;
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
        &self.line[start..self.pos]
    }

    fn expect(&mut self, expected: char) -> Result<(), String> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(format!("expected `{expected}`, found `{c}`")),
            None => Err(format!("expected `{expected}`, found end of line")),
        }
    }
}

fn parse_sample_line(line: &str) -> Result<ParsedLine, String> {
    let mut cur = Cursor { line, pos: 0 };

    let name = cur.take_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':');
    if !is_metric_name(name) {
        return Err(format!("invalid metric name in `{line}`"));
    }

    let mut labels = Labels::new();
    cur.skip_ws();
    if cur.peek() == Some('{') {
        cur.bump();
        loop {
            cur.skip_ws();
            if cur.peek() == Some('}') {
                cur.bump();
                break;
            }
            let label = cur.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
            if label.is_empty() || label.starts_with(|c: char| c.is_ascii_digit()) {
                return Err(format!("invalid label name in `{line}`"));
            }
            cur.skip_ws();
            cur.expect('=')?;
            cur.skip_ws();
            cur.expect('"')?;
            let value = parse_label_value(&mut cur)?;
            if labels.insert(label.to_string(), value).is_some() {
                return Err(format!("duplicate label `{label}`"));
            }
            cur.skip_ws();
            match cur.bump() {
                Some(',') => continue,
                Some('}') => break,
                Some(c) => return Err(format!("unexpected `{c}` in label set")),
                None => return Err("unterminated label set".to_string()),
            }
        }
    }

    cur.skip_ws();
    let value_token = cur.take_while(|c| !c.is_whitespace());
    let value = parse_float(value_token)
        .ok_or_else(|| format!("invalid sample value `{value_token}`"))?;

    cur.skip_ws();
    let ts_token = cur.take_while(|c| !c.is_whitespace());
    if !ts_token.is_empty() && ts_token.parse::<i64>().is_err() {
        return Err(format!("invalid timestamp `{ts_token}`"));
    }
    cur.skip_ws();
    if cur.peek().is_some() {
        return Err(format!("trailing data in `{line}`"));
    }

    Ok(ParsedLine {
        name: name.to_string(),
        labels,
        value,
    })
}

fn parse_label_value(cur: &mut Cursor<'_>) -> Result<String, String> {
    let mut value = String::new();
    loop {
        match cur.bump() {
            Some('"') => return Ok(value),
            Some('\\') => match cur.bump() {
                Some('n') => value.push('\n'),
                Some('\\') => value.push('\\'),
                Some('"') => value.push('"'),
                Some(c) => return Err(format!("invalid escape `\\{c}` in label value")),
                None => return Err("unterminated label value".to_string()),
            },
            Some(c) => value.push(c),
            None => return Err("unterminated label value".to_string()),
        }
    }
}
