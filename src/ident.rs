// todos/src/ident.rs

use parking_lot::Mutex;
use regex::Regex;
use std::{collections::HashMap, convert::Infallible, sync::LazyLock};

pub const MAX_ID_LEN: usize = 100;
pub const FALLBACK_ID: &str = "todo";

static DASH_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").expect("static regex"));

/// Slug a task description into a file-safe base id.
///
/// Whitespace and path separators become `-`; anything else outside
/// `[a-z0-9-]` after lowercasing is dropped. Dash runs collapse, edges are
/// trimmed, and the result is capped at [`MAX_ID_LEN`] characters.
pub fn derive_base_id(task: &str) -> String {
    let lowered = task.replace('\0', "").to_lowercase();
    let mapped: String = lowered
        .chars()
        .filter_map(|c| match c {
            ' ' | '_' | '/' | '\\' | '\n' | '\r' | '\t' => Some('-'),
            'a'..='z' | '0'..='9' | '-' => Some(c),
            _ => None,
        })
        .collect();
    let collapsed = DASH_RUNS.replace_all(&mapped, "-");
    let trimmed = collapsed.trim_matches('-');
    let capped: String = trimmed.chars().take(MAX_ID_LEN).collect();
    let capped = capped.trim_end_matches('-');
    if capped.is_empty() { FALLBACK_ID.to_string() } else { capped.to_string() }
}

/// Hands out unique ids per base: `base`, `base-2`, `base-3`, ...
#[derive(Debug, Default)]
pub struct IdAllocator {
    counts: Mutex<HashMap<String, u64>>,
}

impl IdAllocator {
    pub fn new() -> Self { Self::default() }

    /// Next id for `base`, skipping candidates that `taken` reports as already in use.
    ///
    /// Counts are never rolled back, so a failed save leaves a gap in the sequence.
    pub fn allocate(&self, base: &str, mut taken: impl FnMut(&str) -> bool) -> String {
        match self.try_allocate(base, |c| Ok::<_, Infallible>(taken(c))) {
            Ok(id) => id,
            Err(never) => match never {},
        }
    }

    /// [`IdAllocator::allocate`] with a fallible check; the first error aborts allocation.
    pub fn try_allocate<E>(&self, base: &str, mut taken: impl FnMut(&str) -> Result<bool, E>) -> Result<String, E> {
        let mut counts = self.counts.lock();
        loop {
            let candidate = match counts.get_mut(base) {
                None => {
                    counts.insert(base.to_string(), 1);
                    base.to_string()
                }
                Some(n) => {
                    *n += 1;
                    format!("{base}-{n}")
                }
            };
            if !taken(&candidate)? {
                return Ok(candidate);
            }
        }
    }

    pub fn count(&self, base: &str) -> u64 {
        self.counts.lock().get(base).copied().unwrap_or(0)
    }
}
