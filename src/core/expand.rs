// src/core/expand.rs

//! Expansion of compact range-notation name specs into ordered name sequences.
//!
//! A spec is a token mixing literal text with bracket groups, e.g.
//! `orion-[01-08]-[10001-10128]`. Bracket groups hold comma-separated items;
//! an item is either a literal or a zero-padded numeric range. Multiple groups
//! in one token form the Cartesian product in left-to-right order.

use crate::core::errors::ConductorError;

/// One parsed piece of a spec token.
enum Part {
    Literal(String),
    Group(Vec<String>),
}

/// Expands a single range-notation spec into the ordered list of names it denotes.
pub fn expand(spec: &str) -> Result<Vec<String>, ConductorError> {
    let parts = parse_parts(spec)?;

    let mut out: Vec<String> = vec![String::new()];
    for part in parts {
        match part {
            Part::Literal(text) => {
                for name in &mut out {
                    name.push_str(&text);
                }
            }
            Part::Group(items) => {
                let mut next = Vec::with_capacity(out.len() * items.len());
                for name in &out {
                    for item in &items {
                        next.push(format!("{name}{item}"));
                    }
                }
                out = next;
            }
        }
    }

    if out.is_empty() || out.iter().all(|n| n.is_empty()) {
        return Err(ConductorError::InvalidSpec(spec.to_string()));
    }
    Ok(out)
}

/// Expands a sequence of specs, concatenating the expansions in input order.
pub fn expand_many<I, S>(specs: I) -> Result<Vec<String>, ConductorError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = Vec::new();
    for spec in specs {
        out.extend(expand(spec.as_ref())?);
    }
    if out.is_empty() {
        return Err(ConductorError::InvalidSpec(String::new()));
    }
    Ok(out)
}

fn parse_parts(spec: &str) -> Result<Vec<Part>, ConductorError> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = spec.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '[' => {
                if !literal.is_empty() {
                    parts.push(Part::Literal(std::mem::take(&mut literal)));
                }
                let mut body = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    match inner {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '[' => return Err(ConductorError::InvalidSpec(spec.to_string())),
                        other => body.push(other),
                    }
                }
                if !closed {
                    return Err(ConductorError::InvalidSpec(spec.to_string()));
                }
                parts.push(Part::Group(expand_group(spec, &body)?));
            }
            ']' => return Err(ConductorError::InvalidSpec(spec.to_string())),
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        parts.push(Part::Literal(literal));
    }
    Ok(parts)
}

/// Expands the body of one bracket group into its ordered items.
fn expand_group(spec: &str, body: &str) -> Result<Vec<String>, ConductorError> {
    let mut items = Vec::new();
    for item in body.split(',') {
        let item = item.trim();
        if item.is_empty() {
            return Err(ConductorError::InvalidSpec(spec.to_string()));
        }
        match numeric_range(item) {
            Some((start, end, width)) => {
                if start > end {
                    return Err(ConductorError::InvalidSpec(spec.to_string()));
                }
                for n in start..=end {
                    items.push(format!("{n:0width$}"));
                }
            }
            None => items.push(item.to_string()),
        }
    }
    if items.is_empty() {
        return Err(ConductorError::InvalidSpec(spec.to_string()));
    }
    Ok(items)
}

/// Recognizes `<digits>-<digits>` items. The zero-padding width of the start
/// bound is preserved across the whole range.
fn numeric_range(item: &str) -> Option<(u64, u64, usize)> {
    let (lo, hi) = item.split_once('-')?;
    if lo.is_empty() || hi.is_empty() {
        return None;
    }
    if !lo.bytes().all(|b| b.is_ascii_digit()) || !hi.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let start: u64 = lo.parse().ok()?;
    let end: u64 = hi.parse().ok()?;
    Some((start, end, lo.len()))
}
