//! Recognizing pushes the remote refused because a file was too large.
//!
//! Hosting providers word this differently, so recognition is driven by a
//! list of [`Signature`]s: substrings that identify the rejection, and
//! regexes whose first capture group is the offending path.

use anyhow::{Context, Result, bail};
use regex::Regex;

#[derive(Debug, Clone)]
pub struct Signature {
    pub name: String,
    markers: Vec<String>,
    path_patterns: Vec<Regex>,
}

impl Signature {
    pub fn new(name: &str, markers: &[&str], path_patterns: &[&str]) -> Result<Signature> {
        if markers.is_empty() {
            bail!("signature {:?} has no markers", name);
        }
        let mut compiled = Vec::with_capacity(path_patterns.len());
        for pattern in path_patterns {
            let re = Regex::new(pattern)
                .with_context(|| format!("signature {:?}: invalid pattern {:?}", name, pattern))?;
            if re.captures_len() < 2 {
                bail!(
                    "signature {:?}: pattern {:?} has no capture group for the path",
                    name,
                    pattern
                );
            }
            compiled.push(re);
        }
        Ok(Signature {
            name: name.to_string(),
            markers: markers.iter().map(|m| m.to_string()).collect(),
            path_patterns: compiled,
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        let text = strip_ansi(text);
        self.markers.iter().any(|m| text.contains(m.as_str()))
    }

    /// First non-empty path captured by any of this signature's patterns.
    pub fn extract(&self, text: &str) -> Option<String> {
        let text = strip_ansi(text);
        self.path_patterns.iter().find_map(|re| {
            re.captures_iter(&text)
                .filter_map(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_string())
                .find(|path| !path.is_empty())
        })
    }
}

/// Removes terminal escape sequences. On a terminal git colours keywords
/// such as `error` in `remote:` lines.
pub fn strip_ansi(text: &str) -> String {
    strip_ansi_escapes::strip_str(text)
}

/// Signatures recognized without any configuration.
pub fn builtin() -> Result<Vec<Signature>> {
    let specs: [(&str, &[&str], &[&str]); 2] = [
        (
            "github",
            &[
                "GH001: Large files detected",
                "exceeds GitHub's file size limit",
            ],
            &[
                r"remote: error: File (.+?) is \d+(?:\.\d+)? ?[KMGT]i?B; this exceeds",
                r"remote: error: File (.+?) is ",
            ],
        ),
        (
            "generic",
            &["File is too large", "size exceeds"],
            &[
                r"File is too large: (.+?);",
                r"remote: error: File (.+?) is ",
            ],
        ),
    ];
    specs
        .into_iter()
        .map(|(name, markers, patterns)| Signature::new(name, markers, patterns))
        .collect()
}

/// The first signature whose markers appear in `text`.
pub fn detect<'a>(text: &str, signatures: &'a [Signature]) -> Option<&'a Signature> {
    signatures.iter().find(|s| s.matches(text))
}

/// Path of the rejected file, trying the detected signature's patterns
/// before every other signature's. `None` means the caller must ask.
pub fn extract_path(text: &str, signatures: &[Signature]) -> Option<String> {
    let detected = detect(text, signatures);
    detected
        .and_then(|s| s.extract(text))
        .or_else(|| {
            signatures
                .iter()
                .filter(|s| detected.is_none_or(|d| d.name != s.name))
                .find_map(|s| s.extract(text))
        })
}
