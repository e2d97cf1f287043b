//! robots.txt parsing: directive extraction and agent-block selection.
//!
//! A single linear scan over `directive: value` pairs (case-insensitive
//! directive names, `#`-prefixed comments stripped) producing per-agent
//! rule groups.

use crate::util::compile_glob_pattern;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentRules {
    pub allow: Vec<String>,
    pub disallow: Vec<String>,
    pub crawl_delay: Option<f64>,
    pub request_rate: Option<(u32, u32)>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RobotsRules {
    agents: HashMap<String, AgentRules>,
    pub sitemaps: Vec<String>,
}

impl RobotsRules {
    /// Select the rule block for `user_agent`: exact (case-insensitive)
    /// match, else the longest agent token that is a prefix of it, else
    /// `*`. Falls back to an all-allow empty block if robots.txt declares
    /// no applicable group.
    #[must_use]
    pub fn rules_for(&self, user_agent: &str) -> AgentRules {
        let ua_lower = user_agent.to_ascii_lowercase();

        if let Some(exact) = self.agents.get(&ua_lower) {
            return exact.clone();
        }

        let mut best: Option<(&String, &AgentRules)> = None;
        for (agent, rules) in &self.agents {
            if agent == "*" {
                continue;
            }
            if ua_lower.starts_with(agent.as_str()) {
                if best.map(|(b, _)| agent.len() > b.len()).unwrap_or(true) {
                    best = Some((agent, rules));
                }
            }
        }
        if let Some((_, rules)) = best {
            return rules.clone();
        }

        self.agents.get("*").cloned().unwrap_or_default()
    }

    /// Longest matching path rule wins; an equal-length Allow beats
    /// Disallow (standard robots.txt tie-break). No matching rule allows.
    #[must_use]
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let rules = self.rules_for(user_agent);
        let mut best_len = -1i64;
        let mut allowed = true;

        for pattern in &rules.disallow {
            if pattern.is_empty() {
                continue;
            }
            if path_matches(pattern, path) {
                let len = pattern.len() as i64;
                if len > best_len {
                    best_len = len;
                    allowed = false;
                }
            }
        }
        for pattern in &rules.allow {
            if path_matches(pattern, path) {
                let len = pattern.len() as i64;
                if len >= best_len {
                    best_len = len;
                    allowed = true;
                }
            }
        }
        allowed
    }
}

fn path_matches(pattern: &str, path: &str) -> bool {
    if !pattern.contains('*') && !pattern.ends_with('$') {
        return path.starts_with(pattern);
    }
    let trimmed = pattern.strip_suffix('$').unwrap_or(pattern);
    match compile_glob_pattern(trimmed) {
        Ok(re) => {
            if pattern.ends_with('$') {
                re.find(path).map(|m| m.end() == path.len()).unwrap_or(false)
            } else {
                re.is_match(path)
            }
        }
        Err(_) => path.starts_with(trimmed),
    }
}

/// Parse raw robots.txt content into agent-keyed rule groups.
#[must_use]
pub fn parse(text: &str) -> RobotsRules {
    let mut result = RobotsRules::default();
    let mut current_agents: Vec<String> = Vec::new();
    let mut in_record = false;

    for raw_line in text.lines() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let Some((directive, value)) = line.split_once(':') else {
            continue;
        };
        let directive = directive.trim().to_ascii_lowercase();
        let value = value.trim();

        match directive.as_str() {
            "user-agent" => {
                if in_record {
                    current_agents.clear();
                }
                current_agents.push(value.to_ascii_lowercase());
                in_record = false;
            }
            "allow" => {
                in_record = true;
                for agent in &current_agents {
                    result.agents.entry(agent.clone()).or_default().allow.push(value.to_string());
                }
            }
            "disallow" => {
                in_record = true;
                for agent in &current_agents {
                    result
                        .agents
                        .entry(agent.clone())
                        .or_default()
                        .disallow
                        .push(value.to_string());
                }
            }
            "crawl-delay" => {
                in_record = true;
                if let Ok(secs) = value.parse::<f64>() {
                    for agent in &current_agents {
                        result.agents.entry(agent.clone()).or_default().crawl_delay = Some(secs);
                    }
                }
            }
            "request-rate" => {
                in_record = true;
                if let Some((count, per)) = value.split_once('/') {
                    if let (Ok(count), Ok(per)) = (count.parse::<u32>(), per.parse::<u32>()) {
                        for agent in &current_agents {
                            result.agents.entry(agent.clone()).or_default().request_rate =
                                Some((count, per));
                        }
                    }
                }
            }
            "sitemap" => {
                result.sitemaps.push(value.to_string());
            }
            _ => {}
        }
    }

    result
}

fn strip_comment(line: &str) -> &str {
    line.find('#').map(|i| &line[..i]).unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
User-agent: *\n\
Disallow: /private/\n\
Allow: /private/public/\n\
Crawl-delay: 2\n\
\n\
User-agent: GoodBot\n\
Disallow:\n\
\n\
Sitemap: https://example.com/sitemap.xml\n\
";

    #[test]
    fn wildcard_disallow_with_allow_override() {
        let rules = parse(SAMPLE);
        assert!(!rules.is_allowed("AnyBot", "/private/secret"));
        assert!(rules.is_allowed("AnyBot", "/private/public/page"));
    }

    #[test]
    fn exact_agent_match_overrides_wildcard() {
        let rules = parse(SAMPLE);
        assert!(rules.is_allowed("GoodBot", "/private/secret"));
    }

    #[test]
    fn crawl_delay_is_parsed() {
        let rules = parse(SAMPLE);
        assert_eq!(rules.rules_for("AnyBot").crawl_delay, Some(2.0));
    }

    #[test]
    fn sitemap_directives_collected() {
        let rules = parse(SAMPLE);
        assert_eq!(rules.sitemaps, vec!["https://example.com/sitemap.xml".to_string()]);
    }

    #[test]
    fn empty_robots_allows_everything() {
        let rules = parse("");
        assert!(rules.is_allowed("AnyBot", "/anything"));
    }
}
