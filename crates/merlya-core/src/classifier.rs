//! Request classifier, grounded in `athena_ai/agents/request_classifier.py`.
//!
//! Deterministic, rule-based: no LLM call. Scores a lowercased request
//! against three keyword buckets, estimates step count and duration, and
//! decides an [`ExecutionStrategy`] plus whether to surface chain-of-thought
//! to the user. Vague requests are flagged for reformulation and offered a
//! concrete rewrite.

use std::collections::HashMap;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestComplexity {
    Simple,
    Moderate,
    Complex,
}

impl RequestComplexity {
    fn as_str(&self) -> &'static str {
        match self {
            RequestComplexity::Simple => "simple",
            RequestComplexity::Moderate => "moderate",
            RequestComplexity::Complex => "complex",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    Direct,
    CotSilent,
    CotVerbose,
}

impl ExecutionStrategy {
    fn as_str(&self) -> &'static str {
        match self {
            ExecutionStrategy::Direct => "direct",
            ExecutionStrategy::CotSilent => "cot_silent",
            ExecutionStrategy::CotVerbose => "cot_verbose",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub complexity: RequestComplexity,
    pub strategy: ExecutionStrategy,
    pub show_thinking: bool,
    pub needs_reformulation: bool,
    pub estimated_steps: u32,
    pub estimated_duration: u32,
    pub reasoning: String,
    pub suggested_prompt: Option<String>,
}

const SIMPLE_KEYWORDS: &[&str] = &[
    "status", "check", "is", "what is", "show", "list", "get", "display", "current", "uptime",
];

const MODERATE_KEYWORDS: &[&str] = &[
    "find", "search", "which", "where", "compare", "verify", "validate", "test", "monitor",
];

const COMPLEX_KEYWORDS: &[&str] = &[
    "analyze",
    "analysis",
    "full analysis",
    "comprehensive",
    "investigate",
    "diagnose",
    "troubleshoot",
    "optimize",
    "benchmark",
    "audit",
    "review",
    "deep dive",
];

const MULTI_TARGET_KEYWORDS: &[&str] = &[
    "all", "every", "each", "hosts", "servers", "machines", "across", "multiple",
];

const REFORMULATION_TRIGGERS: &[&str] = &["make", "do", "perform", "execute", "run"];

const SERVICES: &[&str] = &[
    "nginx",
    "apache",
    "mysql",
    "mariadb",
    "postgres",
    "mongodb",
    "redis",
    "memcached",
    "elasticsearch",
    "kafka",
    "rabbitmq",
    "docker",
    "kubernetes",
    "tomcat",
];

/// Deterministic keyword-scoring classifier. Stateless: one instance can be
/// shared across every request.
#[derive(Default)]
pub struct RequestClassifier;

impl RequestClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, request: &str) -> ClassificationResult {
        let request_lower = request.to_lowercase();

        let complexity = determine_complexity(&request_lower);
        let is_multi_target = is_multi_target(&request_lower);
        let needs_reformulation = needs_reformulation(&request_lower);

        let estimated_steps = estimate_steps(complexity, is_multi_target);
        let estimated_duration = estimate_duration(complexity, is_multi_target);
        let (strategy, show_thinking) =
            determine_strategy(complexity, estimated_steps, is_multi_target);

        let reasoning = generate_reasoning(complexity, strategy, estimated_steps, is_multi_target);

        let suggested_prompt = if needs_reformulation {
            Some(reformulate_prompt(&request_lower, complexity))
        } else {
            None
        };

        let result = ClassificationResult {
            complexity,
            strategy,
            show_thinking,
            needs_reformulation,
            estimated_steps,
            estimated_duration,
            reasoning,
            suggested_prompt,
        };

        tracing::info!(
            complexity = complexity.as_str(),
            strategy = strategy.as_str(),
            steps = estimated_steps,
            duration_s = estimated_duration,
            "request classified"
        );

        result
    }
}

/// A keyword matches either as a substring (multi-word phrases like
/// `"what is"` or `"full analysis"`) or as a whole word (single-word
/// keywords) — a bare substring check would let short keywords like `"is"`
/// match spuriously inside unrelated words (e.g. "analys**is**"), tipping
/// the complexity score toward the wrong bucket.
fn keyword_matches(request_lower: &str, keyword: &str) -> bool {
    if keyword.contains(' ') {
        request_lower.contains(keyword)
    } else {
        request_lower
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| word == keyword)
    }
}

fn determine_complexity(request_lower: &str) -> RequestComplexity {
    let score = |keywords: &[&str]| keywords.iter().filter(|k| keyword_matches(request_lower, k)).count();

    let simple = score(SIMPLE_KEYWORDS);
    let moderate = score(MODERATE_KEYWORDS);
    let complex = score(COMPLEX_KEYWORDS);

    let max_score = simple.max(moderate).max(complex);
    if max_score == 0 {
        return RequestComplexity::Moderate;
    }

    // Matches the dict-iteration order of the original: simple, then
    // moderate, then complex, first one hitting the max wins ties.
    if simple == max_score {
        RequestComplexity::Simple
    } else if moderate == max_score {
        RequestComplexity::Moderate
    } else {
        RequestComplexity::Complex
    }
}

fn is_multi_target(request_lower: &str) -> bool {
    MULTI_TARGET_KEYWORDS.iter().any(|k| request_lower.contains(k))
}

fn needs_reformulation(request_lower: &str) -> bool {
    let has_vague_verb = REFORMULATION_TRIGGERS
        .iter()
        .any(|verb| request_lower.starts_with(verb));

    let is_short = request_lower.split_whitespace().count() < 5;
    let lacks_target = !request_lower.contains("on") && !request_lower.contains("of");

    has_vague_verb || (is_short && lacks_target)
}

fn estimate_steps(complexity: RequestComplexity, is_multi_target: bool) -> u32 {
    let base = match complexity {
        RequestComplexity::Simple => 2,
        RequestComplexity::Moderate => 4,
        RequestComplexity::Complex => 8,
    };
    let steps = if is_multi_target { (base as f64 * 1.5) as u32 } else { base };
    steps.min(12)
}

fn estimate_duration(complexity: RequestComplexity, is_multi_target: bool) -> u32 {
    let base = match complexity {
        RequestComplexity::Simple => 5,
        RequestComplexity::Moderate => 20,
        RequestComplexity::Complex => 45,
    };
    if is_multi_target { base * 2 } else { base }
}

fn determine_strategy(
    complexity: RequestComplexity,
    estimated_steps: u32,
    is_multi_target: bool,
) -> (ExecutionStrategy, bool) {
    if complexity == RequestComplexity::Simple && estimated_steps <= 2 {
        return (ExecutionStrategy::Direct, false);
    }

    if complexity == RequestComplexity::Moderate {
        return if estimated_steps <= 4 {
            (ExecutionStrategy::CotSilent, false)
        } else {
            (ExecutionStrategy::CotVerbose, true)
        };
    }

    if complexity == RequestComplexity::Complex {
        return (ExecutionStrategy::CotVerbose, true);
    }

    if is_multi_target {
        return (ExecutionStrategy::CotVerbose, true);
    }

    (ExecutionStrategy::CotSilent, false)
}

fn generate_reasoning(
    complexity: RequestComplexity,
    strategy: ExecutionStrategy,
    estimated_steps: u32,
    is_multi_target: bool,
) -> String {
    let mut reasons = vec![
        format!("Complexity: {}", complexity.as_str()),
        format!("Estimated steps: {estimated_steps}"),
    ];
    if is_multi_target {
        reasons.push("Multi-target detected".to_string());
    }
    reasons.push(format!("Strategy: {}", strategy.as_str()));
    reasons.join(" | ")
}

/// Picks a concrete rewrite for a vague request. Unlike the keyword scoring
/// above, the complex-complexity branch always opens with "Perform
/// comprehensive analysis" regardless of whether a specific service or host
/// could be pulled out of the text — callers rely on that prefix to detect a
/// reformulated prompt rather than parsing the service/host back out.
fn reformulate_prompt(request_lower: &str, complexity: RequestComplexity) -> String {
    let service = extract_service(request_lower);
    let host = extract_host(request_lower);

    match complexity {
        RequestComplexity::Complex => match (service, host) {
            (Some(service), Some(host)) => format!(
                "Perform comprehensive analysis of {service} service on {host}, including: \
                 service status, configuration, logs, performance metrics, resource usage, \
                 and backup status. Provide detailed findings and recommendations."
            ),
            (Some(service), None) => format!(
                "Perform comprehensive analysis of {service} service, including: service \
                 status, configuration, logs for errors, performance metrics, and backup \
                 verification."
            ),
            (None, _) => "Perform comprehensive analysis including: service status, \
                 configuration, logs, performance metrics, resource usage, and backup status. \
                 Provide detailed findings and recommendations."
                .to_string(),
        },
        RequestComplexity::Moderate => match (service, host) {
            (Some(service), Some(host)) => {
                format!("Check {service} service status on {host} and analyze recent logs for issues.")
            }
            (Some(service), None) => {
                format!("Investigate {service} service: check status, review recent logs.")
            }
            (None, _) => request_lower.to_string(),
        },
        RequestComplexity::Simple => match (service, host) {
            (Some(service), Some(host)) => format!("Check {service} status on {host}."),
            (Some(service), None) => format!("Check {service} status."),
            (None, _) => request_lower.to_string(),
        },
    }
}

fn extract_service(text: &str) -> Option<&'static str> {
    SERVICES.iter().find(|s| text.contains(*s)).copied()
}

fn extract_host(text: &str) -> Option<String> {
    let (_, after) = text.split_once(" on ")?;
    after
        .split_whitespace()
        .next()
        .map(|h| h.trim_matches(|c| ",.;:".contains(c)).to_string())
}

/// Cache of classification results keyed by normalized request text, with
/// FIFO eviction once `max_size` is reached.
pub struct ClassifierCache {
    max_size: usize,
    entries: Mutex<HashMap<String, ClassificationResult>>,
    order: Mutex<Vec<String>>,
}

impl ClassifierCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            entries: Mutex::new(HashMap::new()),
            order: Mutex::new(Vec::new()),
        }
    }

    pub fn get(&self, request: &str) -> Option<ClassificationResult> {
        let key = normalize_key(request);
        self.entries.lock().get(&key).cloned()
    }

    pub fn put(&self, request: &str, result: ClassificationResult) {
        let key = normalize_key(request);
        let mut entries = self.entries.lock();
        let mut order = self.order.lock();

        if !entries.contains_key(&key) && entries.len() >= self.max_size {
            if let Some(oldest) = order.first().cloned() {
                entries.remove(&oldest);
                order.remove(0);
            }
        }
        if !entries.contains_key(&key) {
            order.push(key.clone());
        }
        entries.insert(key, result);
    }
}

impl Clone for ClassificationResult {
    fn clone(&self) -> Self {
        ClassificationResult {
            complexity: self.complexity,
            strategy: self.strategy,
            show_thinking: self.show_thinking,
            needs_reformulation: self.needs_reformulation,
            estimated_steps: self.estimated_steps,
            estimated_duration: self.estimated_duration,
            reasoning: self.reasoning.clone(),
            suggested_prompt: self.suggested_prompt.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_status_check_is_direct_and_unreformulated() {
        let result = RequestClassifier::new().classify("check mongo status");
        assert_eq!(result.complexity, RequestComplexity::Simple);
        assert_eq!(result.strategy, ExecutionStrategy::Direct);
        assert!(!result.show_thinking);
        assert_eq!(result.estimated_steps, 2);
        assert_eq!(result.estimated_duration, 5);
        assert!(!result.needs_reformulation);
    }

    #[test]
    fn vague_make_analysis_is_reformulated() {
        let result = RequestClassifier::new().classify("make analysis");
        assert!(result.needs_reformulation);
        let suggested = result.suggested_prompt.expect("suggested prompt");
        assert!(suggested.starts_with("Perform comprehensive analysis"));
    }

    #[test]
    fn multi_target_complex_request_caps_steps_at_twelve() {
        let result =
            RequestClassifier::new().classify("audit configuration across all servers");
        assert_eq!(result.complexity, RequestComplexity::Complex);
        assert_eq!(result.estimated_steps, 12);
        assert_eq!(result.strategy, ExecutionStrategy::CotVerbose);
        assert!(result.show_thinking);
    }

    #[test]
    fn cache_evicts_oldest_entry_past_capacity() {
        let cache = ClassifierCache::new(2);
        let classifier = RequestClassifier::new();
        cache.put("first request", classifier.classify("first request"));
        cache.put("second request", classifier.classify("second request"));
        cache.put("third request", classifier.classify("third request"));

        assert!(cache.get("first request").is_none());
        assert!(cache.get("second request").is_some());
        assert!(cache.get("third request").is_some());
    }
}
