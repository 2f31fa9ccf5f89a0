#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Reduces validator output to a short, stable identifier so the round loop
//! can detect "same error again" across repair rounds. Determinism is the
//! whole point: timestamps, line numbers and absolute paths never reach the
//! hash.

use itertools::Itertools;
use sha2::{Digest, Sha256};

use crate::types::{ParsedError, Severity};

/// Signature of an empty validator output.
pub const EMPTY_OUTPUT: &str = "EMPTY_OUTPUT";

const UNKNOWN_PREFIX: &str = "UNKNOWN_";
const FALLBACK_TRUNCATE_CHARS: usize = 500;

/// Known error kinds, matched against validator output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    SymbolNotFound,
    IncompatibleTypes,
    PackageNotFound,
    MethodNotApplicable,
    UnreportedException,
    MissingReturn,
    SyntaxExpectedToken,
    IllegalStart,
    DependencyResolve,
    ArtifactNotFound,
    ParentPomError,
    PluginFailure,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SymbolNotFound => "SYMBOL_NOT_FOUND",
            Self::IncompatibleTypes => "INCOMPATIBLE_TYPES",
            Self::PackageNotFound => "PACKAGE_NOT_FOUND",
            Self::MethodNotApplicable => "METHOD_NOT_APPLICABLE",
            Self::UnreportedException => "UNREPORTED_EXCEPTION",
            Self::MissingReturn => "MISSING_RETURN",
            Self::SyntaxExpectedToken => "SYNTAX_EXPECTED_TOKEN",
            Self::IllegalStart => "ILLEGAL_START",
            Self::DependencyResolve => "DEPENDENCY_RESOLVE",
            Self::ArtifactNotFound => "ARTIFACT_NOT_FOUND",
            Self::ParentPomError => "PARENT_POM_ERROR",
            Self::PluginFailure => "PLUGIN_FAILURE",
        }
    }

    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::SymbolNotFound => "symbol not found",
            Self::IncompatibleTypes => "type mismatch",
            Self::PackageNotFound => "package not found",
            Self::MethodNotApplicable => "method not applicable for arguments",
            Self::UnreportedException => "unhandled checked exception",
            Self::MissingReturn => "missing return statement",
            Self::SyntaxExpectedToken => "syntax error, token expected",
            Self::IllegalStart => "illegal start of expression",
            Self::DependencyResolve => "dependency resolution failed",
            Self::ArtifactNotFound => "build artifact not found",
            Self::ParentPomError => "parent build descriptor error",
            Self::PluginFailure => "build plugin failure",
        }
    }
}

/// Substring markers for each kind, checked per line of output.
const KIND_MARKERS: &[(ErrorKind, &[&str])] = &[
    (ErrorKind::SymbolNotFound, &["cannot find symbol", "cannot resolve symbol"]),
    (ErrorKind::IncompatibleTypes, &["incompatible types"]),
    (ErrorKind::PackageNotFound, &["does not exist"]),
    (
        ErrorKind::MethodNotApplicable,
        &["not applicable for the arguments", "no suitable method found"],
    ),
    (ErrorKind::UnreportedException, &["unreported exception"]),
    (ErrorKind::MissingReturn, &["missing return statement"]),
    (ErrorKind::SyntaxExpectedToken, &["' expected", "\u{2018} expected"]),
    (ErrorKind::IllegalStart, &["illegal start of"]),
    (
        ErrorKind::DependencyResolve,
        &["could not resolve dependencies", "unresolved dependency"],
    ),
    (ErrorKind::ArtifactNotFound, &["could not find artifact"]),
    (ErrorKind::ParentPomError, &["non-resolvable parent pom"]),
    (ErrorKind::PluginFailure, &["failed to execute goal"]),
];

/// Compute the stable signature of raw validator output.
#[must_use]
pub fn compute(compiler_output: &str) -> String {
    if compiler_output.trim().is_empty() {
        return EMPTY_OUTPUT.to_string();
    }

    let tokens = scan_tokens(compiler_output);
    if tokens.is_empty() {
        return fallback_signature(compiler_output);
    }
    hash_tokens(&tokens)
}

/// Compute the signature of parsed diagnostics. Only error-severity entries
/// participate.
#[must_use]
pub fn compute_from_parsed(parsed_errors: &[ParsedError]) -> String {
    let messages: Vec<&str> = parsed_errors
        .iter()
        .filter(|e| e.severity == Severity::Error)
        .map(|e| e.message.as_str())
        .collect();
    if messages.is_empty() {
        return EMPTY_OUTPUT.to_string();
    }

    let mut tokens: Vec<String> = messages
        .iter()
        .flat_map(|message| scan_tokens(message))
        .collect();
    tokens.sort_unstable();
    tokens.dedup();
    if tokens.is_empty() {
        return fallback_signature(&messages.join("\n"));
    }
    hash_tokens(&tokens)
}

/// Prefer the parsed-diagnostics signature when it is non-trivial, else fall
/// back to the raw-output signature.
#[must_use]
pub fn compute_combined(compiler_output: &str, parsed_errors: &[ParsedError]) -> String {
    let parsed = compute_from_parsed(parsed_errors);
    if parsed != EMPTY_OUTPUT && !parsed.starts_with(UNKNOWN_PREFIX) {
        return parsed;
    }
    compute(compiler_output)
}

/// Human-readable summary of the error kinds present in validator output.
#[must_use]
pub fn describe(compiler_output: &str) -> String {
    if compiler_output.trim().is_empty() {
        return "no output".to_string();
    }

    let kinds: Vec<ErrorKind> = scan_kinds(compiler_output);
    if kinds.is_empty() {
        return "unclassified failure".to_string();
    }
    kinds.iter().map(|kind| kind.describe()).join(", ")
}

fn scan_kinds(output: &str) -> Vec<ErrorKind> {
    scan_tokens(output)
        .iter()
        .filter_map(|token| {
            let name = token.split(':').next().unwrap_or(token);
            KIND_MARKERS
                .iter()
                .map(|(kind, _)| *kind)
                .find(|kind| kind.as_str() == name)
        })
        .dedup()
        .collect()
}

/// Scan output lines against the marker catalog. Each hit yields `KIND` or
/// `KIND:symbol`, deduplicated and sorted.
fn scan_tokens(output: &str) -> Vec<String> {
    let lowered = output.to_ascii_lowercase();
    let mut tokens: Vec<String> = Vec::new();

    for (index, line) in lowered.lines().enumerate() {
        for (kind, markers) in KIND_MARKERS {
            if !line_matches(*kind, line, markers) {
                continue;
            }
            let symbol = capture_symbol(*kind, line, lowered.lines().skip(index + 1));
            let token = symbol.map_or_else(
                || kind.as_str().to_string(),
                |symbol| format!("{}:{}", kind.as_str(), symbol),
            );
            tokens.push(token);
        }
    }

    tokens.sort_unstable();
    tokens.dedup();
    tokens
}

fn line_matches(kind: ErrorKind, line: &str, markers: &[&str]) -> bool {
    // javac places the package name mid-phrase: "package x.y does not exist".
    if kind == ErrorKind::PackageNotFound {
        return line.contains("package ") && line.contains("does not exist");
    }
    markers.iter().any(|marker| line.contains(marker))
}

/// Best-effort symbol capture for kinds that name one. Lines arrive
/// lowercased.
fn capture_symbol<'a>(
    kind: ErrorKind,
    line: &str,
    mut following: impl Iterator<Item = &'a str>,
) -> Option<String> {
    match kind {
        ErrorKind::SymbolNotFound => {
            // javac prints the symbol on a follow-up "symbol: kind Name" line.
            let detail = following.find(|next| next.trim_start().starts_with("symbol"))?;
            let name = detail.split_whitespace().last()?;
            Some(normalize_symbol(name))
        }
        ErrorKind::PackageNotFound => {
            let rest = line.split("package ").nth(1)?;
            let name = rest.split_whitespace().next()?;
            Some(normalize_symbol(name))
        }
        ErrorKind::ArtifactNotFound => {
            let rest = line.split("could not find artifact ").nth(1)?;
            let name = rest.split_whitespace().next()?;
            Some(normalize_symbol(name))
        }
        _ => None,
    }
}

/// Strip generic parameters, drop qualification, lowercase.
fn normalize_symbol(raw: &str) -> String {
    let without_generics = raw.split('<').next().unwrap_or(raw);
    let unqualified = without_generics
        .rsplit('.')
        .next()
        .unwrap_or(without_generics);
    unqualified
        .trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .to_ascii_lowercase()
}

fn hash_tokens(tokens: &[String]) -> String {
    short_hash(&tokens.join("|"))
}

/// Unmatched output: strip volatile detail, truncate, hash with a marker
/// prefix so combined computation can tell it apart from a catalog hit.
fn fallback_signature(output: &str) -> String {
    let normalized = normalize_unknown_output(output);
    if normalized.is_empty() {
        return EMPTY_OUTPUT.to_string();
    }
    format!("{}{}", UNKNOWN_PREFIX, short_hash(&normalized))
}

/// Drop absolute-path tokens and all digits, collapse whitespace. Digits
/// carry timestamps and line/column numbers, both unstable across runs.
fn normalize_unknown_output(output: &str) -> String {
    let cleaned: String = output
        .split_whitespace()
        .filter(|token| !token.starts_with('/'))
        .map(|token| {
            token
                .chars()
                .filter(|c| !c.is_ascii_digit())
                .collect::<String>()
        })
        .filter(|token| !token.is_empty())
        .join(" ");
    cleaned.chars().take(FALLBACK_TRUNCATE_CHARS).collect()
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    digest
        .iter()
        .take(8)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
