//! CI failure classification, grounded in
//! `athena_ai/ci/analysis/error_classifier.py::CIErrorClassifier`.
//!
//! Classification runs two paths: a semantic path scoring log text
//! against per-type example embeddings with cosine similarity (when an
//! [`Embedder`] is wired in), falling back to a keyword-count heuristic
//! otherwise — exactly the original's `classify`/`_classify_keywords` split.

use std::sync::OnceLock;

use crate::models::{CIErrorType, FailureAnalysis, Run, RunLogs};

/// Narrow embedding interface so the classifier doesn't depend on any
/// specific model backend. Mirrors the original's reliance on an
/// injected `EmbeddingProvider`.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
}

struct ErrorPattern {
    error_type: CIErrorType,
    keywords: &'static [&'static str],
    examples: &'static [&'static str],
    suggestions: &'static [&'static str],
}

/// The 13 non-Unknown error patterns, ported verbatim (keywords,
/// examples, suggestions) from `error_classifier.py::ERROR_PATTERNS`.
static PATTERNS: &[ErrorPattern] = &[
    ErrorPattern {
        error_type: CIErrorType::CompilationError,
        keywords: &["compile", "compilation", "syntax error", "cannot find", "undefined reference", "undeclared"],
        examples: &[
            "error: cannot find value `x` in this scope",
            "SyntaxError: invalid syntax",
            "fatal error: 'foo.h' file not found",
            "undefined reference to `main'",
            "error[E0433]: failed to resolve: use of undeclared crate",
        ],
        suggestions: &["Check for syntax errors in the changed files", "Verify all imports resolve correctly", "Run the build locally to reproduce"],
    },
    ErrorPattern {
        error_type: CIErrorType::TestFailure,
        keywords: &["test failed", "assertion", "expected", "panicked at", "failures:"],
        examples: &[
            "FAILED tests/test_foo.py::test_bar - AssertionError",
            "thread 'main' panicked at 'assertion failed: left == right'",
            "1 failed, 12 passed",
            "AssertionError: expected 200 but got 500",
            "test result: FAILED. 3 passed; 1 failed",
        ],
        suggestions: &["Review the failing assertion's expected vs actual values", "Check if a recent change broke the tested behavior", "Run the failing test locally in isolation"],
    },
    ErrorPattern {
        error_type: CIErrorType::DependencyError,
        keywords: &["could not find", "no matching package", "version conflict", "dependency", "module not found"],
        examples: &[
            "error: no matching package named `foo` found",
            "ModuleNotFoundError: No module named 'bar'",
            "npm ERR! peer dep missing",
            "Could not resolve dependency conflict",
            "error: failed to select a version for `serde`",
        ],
        suggestions: &["Check lockfile is up to date", "Verify the dependency version constraints", "Clear and rebuild the dependency cache"],
    },
    ErrorPattern {
        error_type: CIErrorType::LintError,
        keywords: &["lint", "clippy", "eslint", "style violation", "warning treated as error"],
        examples: &[
            "error: this function has too many arguments (clippy::too_many_arguments)",
            "eslint: 'foo' is defined but never used",
            "style: line too long (E501)",
            "warning: unused variable `x`",
            "error: denied by lint attribute",
        ],
        suggestions: &["Run the linter locally and fix reported issues", "Check if the lint rule was recently tightened", "Consider an explicit allow with justification if the lint is a false positive"],
    },
    ErrorPattern {
        error_type: CIErrorType::TypeError,
        keywords: &["type error", "type mismatch", "expected type", "incompatible types", "cannot assign"],
        examples: &[
            "error[E0308]: mismatched types",
            "TypeError: argument of type 'int' is not iterable",
            "Type 'string' is not assignable to type 'number'",
            "cannot assign value of type 'Int' to type 'String'",
            "error: incompatible types in assignment",
        ],
        suggestions: &["Check the changed function signatures for type drift", "Verify the types flowing through the failing call", "Review any recent type annotation changes"],
    },
    ErrorPattern {
        error_type: CIErrorType::TimeoutError,
        keywords: &["timed out", "timeout", "deadline exceeded", "context deadline"],
        examples: &[
            "Error: The operation was canceled (timeout)",
            "context deadline exceeded",
            "test timed out after 30000ms",
            "Error: Job exceeded maximum time limit",
            "TimeoutError: waiting for element to be visible",
        ],
        suggestions: &["Check for resource contention or slow dependencies", "Consider raising the timeout if the operation has grown legitimately slower", "Look for a hang or infinite loop introduced recently"],
    },
    ErrorPattern {
        error_type: CIErrorType::PermissionError,
        keywords: &["permission denied", "forbidden", "unauthorized", "access denied", "403"],
        examples: &[
            "Error: Permission denied (publickey)",
            "HttpError: Resource not accessible by integration (403)",
            "Error: The requested URL returned error: 403",
            "fatal: could not read Username for 'https://github.com'",
            "PermissionError: [Errno 13] Permission denied",
        ],
        suggestions: &["Check the workflow token's permissions scope", "Verify required secrets are configured on this repository", "Confirm the service account still has access"],
    },
    ErrorPattern {
        error_type: CIErrorType::ConfigurationError,
        keywords: &["invalid configuration", "config error", "missing required", "malformed", "yaml"],
        examples: &[
            "Error: Invalid workflow file: .github/workflows/ci.yml",
            "yaml.scanner.ScannerError: mapping values are not allowed here",
            "Error: missing required input 'token'",
            "Configuration error: unknown key 'stages'",
            "Error parsing config.toml: malformed",
        ],
        suggestions: &["Validate the CI configuration file's syntax", "Check for a recently added required field", "Compare against a known-good configuration"],
    },
    ErrorPattern {
        error_type: CIErrorType::NetworkError,
        keywords: &["connection refused", "network unreachable", "dns", "econnreset", "could not resolve host"],
        examples: &[
            "curl: (6) Could not resolve host: registry.npmjs.org",
            "Error: connect ECONNREFUSED 127.0.0.1:5432",
            "fatal: unable to access 'https://github.com/': Could not resolve host",
            "dial tcp: lookup api.example.com: no such host",
            "Network is unreachable",
        ],
        suggestions: &["Check the status of the remote service or registry", "Retry — this may be a transient network blip", "Verify DNS and outbound network access from the runner"],
    },
    ErrorPattern {
        error_type: CIErrorType::FlakyTest,
        keywords: &["intermittent", "flaky", "sometimes fails", "race condition", "non-deterministic"],
        examples: &[
            "This test has been flagged as flaky in the last 10 runs",
            "Test passed on retry after initial failure",
            "Warning: possible race condition detected in test",
            "Non-deterministic test failure — order dependent",
            "Retrying flaky test (attempt 2 of 3)",
        ],
        suggestions: &["Re-run the job to confirm it's transient", "Check for shared mutable state or timing assumptions in the test", "Consider quarantining the test until root-caused"],
    },
    ErrorPattern {
        error_type: CIErrorType::ResourceExhaustion,
        keywords: &["out of memory", "oom", "disk space", "no space left", "resource exhausted"],
        examples: &[
            "fatal error: runtime: out of memory",
            "Error: ENOSPC: no space left on device",
            "The job was terminated because it ran out of memory",
            "java.lang.OutOfMemoryError: Java heap space",
            "container killed due to memory limit",
        ],
        suggestions: &["Check for a memory leak or unbounded cache growth", "Clean up build artifacts or caches to free disk space", "Consider a larger runner or splitting the job"],
    },
    ErrorPattern {
        error_type: CIErrorType::SecurityVulnerability,
        keywords: &["vulnerability", "cve-", "security audit", "known vulnerabilities", "advisory"],
        examples: &[
            "found 3 high severity vulnerabilities",
            "error: security advisory GHSA-xxxx-xxxx-xxxx affects this dependency",
            "cargo audit: CVE-2023-xxxxx detected in crate `foo`",
            "npm audit found vulnerabilities requiring manual review",
            "Dependabot alert: critical severity vulnerability",
        ],
        suggestions: &["Review the flagged advisory and update the affected dependency", "Check if a patched version is available", "Assess whether the vulnerable code path is actually reachable"],
    },
    ErrorPattern {
        error_type: CIErrorType::InfrastructureError,
        keywords: &["runner", "internal server error", "service unavailable", "500", "ci system"],
        examples: &[
            "Error: The runner has received a shutdown signal",
            "This job failed due to an infrastructure error",
            "Error: Server Error: 503 Service Unavailable",
            "##[error]The hosted runner encountered an error",
            "Error: self-hosted runner lost connection",
        ],
        suggestions: &["Re-run the job — this looks like a platform-side issue", "Check the CI provider's status page", "Report to the CI platform if this persists"],
    },
];

/// Rescales cosine similarity from `[-1, 1]` to `[0, 1]` before
/// comparing against the confidence threshold, matching the original's
/// `(similarity + 1) / 2`.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

const SEMANTIC_THRESHOLD: f32 = 0.5;

fn pattern_embeddings<'a>(embedder: &dyn Embedder, pattern: &'a ErrorPattern) -> Vec<f32> {
    let embeddings: Vec<Vec<f32>> = pattern.examples.iter().map(|e| embedder.embed(e)).collect();
    average_vectors(&embeddings)
}

fn average_vectors(vectors: &[Vec<f32>]) -> Vec<f32> {
    if vectors.is_empty() {
        return Vec::new();
    }
    let len = vectors[0].len();
    let mut avg = vec![0.0f32; len];
    for v in vectors {
        for i in 0..len.min(v.len()) {
            avg[i] += v[i];
        }
    }
    for x in avg.iter_mut() {
        *x /= vectors.len() as f32;
    }
    avg
}

fn classify_semantic(embedder: &dyn Embedder, text: &str) -> (CIErrorType, f32) {
    let text_embedding = embedder.embed(text);
    let mut best = (CIErrorType::Unknown, 0.0f32);
    for pattern in PATTERNS {
        let pattern_embedding = pattern_embeddings(embedder, pattern);
        let similarity = (cosine_similarity(&text_embedding, &pattern_embedding) + 1.0) / 2.0;
        if similarity > best.1 {
            best = (pattern.error_type, similarity);
        }
    }
    if best.1 < SEMANTIC_THRESHOLD {
        (CIErrorType::Unknown, best.1)
    } else {
        best
    }
}

fn classify_keywords(text: &str) -> (CIErrorType, f32) {
    let lower = text.to_lowercase();
    let mut best = (CIErrorType::Unknown, 0.0f32);
    for pattern in PATTERNS {
        let count = pattern.keywords.iter().filter(|kw| lower.contains(*kw)).count();
        if count == 0 {
            continue;
        }
        let confidence = (0.3 + count as f32 * 0.1).min(0.7);
        if confidence > best.1 {
            best = (pattern.error_type, confidence);
        }
    }
    best
}

/// Public hook for swapping in a real embedder at process startup.
static EMBEDDER: OnceLock<Box<dyn Embedder>> = OnceLock::new();

pub fn set_embedder(embedder: Box<dyn Embedder>) {
    let _ = EMBEDDER.set(embedder);
}

pub fn classify(text: &str) -> (CIErrorType, f32) {
    match EMBEDDER.get() {
        Some(embedder) => classify_semantic(embedder.as_ref(), text),
        None => classify_keywords(text),
    }
}

pub fn suggestions_for(error_type: CIErrorType) -> Vec<String> {
    PATTERNS
        .iter()
        .find(|p| p.error_type == error_type)
        .map(|p| p.suggestions.iter().map(|s| s.to_string()).collect())
        .unwrap_or_else(|| {
            vec![
                "Review the run logs for the specific failure".to_string(),
                "Check recent changes to the affected files".to_string(),
                "Re-run the job to rule out a transient failure".to_string(),
            ]
        })
}

/// Builds a [`FailureAnalysis`] for a failed run, extracting the
/// dominant error type from its logs and attaching ready-made
/// suggestions, grounded in `GitHubCIAdapter._build_failure_summary`.
pub fn analyze(run: &Run, logs: &RunLogs) -> FailureAnalysis {
    let extracted: Vec<String> = logs
        .full_log
        .lines()
        .filter(|l| l.to_lowercase().contains("error") || l.to_lowercase().contains("fail"))
        .map(|l| l.trim().to_string())
        .filter(|l| l.len() > 10)
        .take(50)
        .collect();

    let (error_type, confidence) = classify(&logs.full_log);
    let failed_jobs: Vec<String> = run.failed_jobs().into_iter().map(|j| j.name.clone()).collect();

    let summary = if failed_jobs.is_empty() {
        format!("Run {} failed ({error_type})", run.id)
    } else {
        format!("Run {} failed in job(s) {} ({error_type})", run.id, failed_jobs.join(", "))
    };

    FailureAnalysis {
        run_id: run.id.clone(),
        error_type,
        confidence,
        failed_jobs,
        summary,
        suggestions: suggestions_for(error_type),
        extracted_errors: extracted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_path_classifies_compilation_error() {
        let (error_type, confidence) = classify_keywords("error: cannot find value `x` in this scope, compile failed");
        assert_eq!(error_type, CIErrorType::CompilationError);
        assert!(confidence > 0.0);
    }

    #[test]
    fn keyword_path_falls_back_to_unknown_with_no_matches() {
        let (error_type, _) = classify_keywords("everything is fine, build succeeded");
        assert_eq!(error_type, CIErrorType::Unknown);
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn suggestions_for_unknown_returns_generic_fallback() {
        let suggestions = suggestions_for(CIErrorType::Unknown);
        assert_eq!(suggestions.len(), 3);
    }
}
